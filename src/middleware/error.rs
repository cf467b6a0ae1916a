//! Handler-error recovery.

use http::StatusCode;
use tracing::{error, warn};

use crate::context::Context;
use crate::error::HandlerResult;
use crate::handler::BoxedHandler;
use crate::logger::Logger;
use crate::middleware::Middleware;

/// Body written by [`error_handler`] when it recovers a failure.
pub const ERROR_BODY: &[u8] = b"Internal server error";

/// Turns handler failures into `500` responses.
///
/// The wrapped handler's error is logged through `logger` and swallowed:
/// everything outside this middleware sees success. The `500` and
/// [`ERROR_BODY`] are only written when the handler has not committed a
/// response of its own.
pub fn error_handler<T: Context>(logger: Logger) -> Middleware<T> {
    Middleware::new(move |next: BoxedHandler<T>| {
        let logger = logger.clone();
        move |ctx: T| {
            let writer = ctx.response_writer().clone();
            let logger = logger.clone();
            let inner = next.call(ctx);
            async move {
                let Err(err) = inner.await else {
                    return HandlerResult::Ok(());
                };

                logger.scope(|| error!(error = %err, "error from handler"));

                if writer.is_committed() {
                    logger.scope(|| warn!(status = ?writer.status(), "response already committed, leaving it as written"));
                    return Ok(());
                }

                writer.write_header(StatusCode::INTERNAL_SERVER_ERROR);
                if let Err(e) = writer.write(ERROR_BODY) {
                    logger.scope(|| warn!(error = %e, "failed to write error response"));
                }
                Ok(())
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::BaseContext;
    use crate::error::BoxError;
    use crate::handler::Handler;
    use crate::middleware::wrap_middleware;
    use crate::testing::Capture;

    async fn fails(_ctx: BaseContext) -> HandlerResult {
        Err("database unreachable".into())
    }

    async fn fails_after_writing(ctx: BaseContext) -> HandlerResult {
        ctx.response_writer().write_header(StatusCode::ACCEPTED);
        Err(BoxError::from("late failure"))
    }

    #[tokio::test]
    async fn failure_becomes_500_and_is_swallowed() {
        let capture = Capture::new();
        let chain = wrap_middleware(
            &[Some(error_handler(capture.dispatch().into()))],
            fails.into_boxed_handler(),
        );

        let ctx = BaseContext::default();
        let writer = ctx.response_writer().clone();
        let result = chain.call(ctx).await;

        assert!(result.is_ok());
        assert_eq!(writer.status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
        assert_eq!(&writer.body()[..], ERROR_BODY);
        assert_eq!(capture.lines(), vec!["error from handler".to_owned()]);
    }

    #[tokio::test]
    async fn success_leaves_response_alone() {
        let ok = |ctx: BaseContext| async move {
            ctx.response_writer().write(b"fine")?;
            HandlerResult::Ok(())
        };
        let chain = wrap_middleware(&[Some(error_handler(Logger::noop()))], ok.into_boxed_handler());

        let ctx = BaseContext::default();
        let writer = ctx.response_writer().clone();
        chain.call(ctx).await.unwrap();

        assert_eq!(writer.status(), Some(StatusCode::OK));
        assert_eq!(&writer.body()[..], b"fine");
    }

    #[tokio::test]
    async fn committed_response_is_not_overwritten() {
        let chain = wrap_middleware(
            &[Some(error_handler(Logger::noop()))],
            fails_after_writing.into_boxed_handler(),
        );

        let ctx = BaseContext::default();
        let writer = ctx.response_writer().clone();
        chain.call(ctx).await.unwrap();

        assert_eq!(writer.status(), Some(StatusCode::ACCEPTED));
        assert!(writer.body().is_empty());
    }
}
