//! A server whose handlers receive an application-defined context.
//!
//! `AppContext` embeds the base context and adds a logger. The built-in
//! middleware only knows about `Context`, and works with it unchanged.
//!
//! Run with:
//!   cargo run --example custom_context
//!
//! Try:
//!   curl -i http://localhost:4000/
//!   curl -i http://localhost:4000/error
//!   curl -i http://localhost:4000/unhandled
//!   curl -i http://localhost:4000/healthz

use std::time::Duration;

use http::StatusCode;
use tern::middleware::{default_formatter, error_handler, request_logger, trace};
use tern::{BaseContext, Context, HandlerResult, Logger, Server, ServerConfig, health};
use tracing::{info, warn};

struct AppContext {
    base: BaseContext,
    logger: Logger,
}

impl Context for AppContext {
    fn base(&self) -> &BaseContext { &self.base }
    fn base_mut(&mut self) -> &mut BaseContext { &mut self.base }
}

#[tokio::main]
async fn main() -> Result<(), tern::Error> {
    let logger = Logger::from(tracing::Dispatch::new(
        tracing_subscriber::fmt().with_target(false).finish(),
    ));

    let ctx_logger = logger.clone();
    let server = Server::with_context(
        ServerConfig::new("localhost", "4000"),
        move |base| AppContext { base, logger: ctx_logger.clone() },
    );

    server.use_middleware([
        error_handler(logger.clone()),
        request_logger(default_formatter, logger.clone()),
    ]);

    server.handle("/", hello)?;
    server.handle("/error", handled_error)?;
    server.handle("/unhandled", unhandled_error)?;
    server.handle_with("GET /healthz", health::liveness, [trace(logger.clone())])?;

    let handle = server.shutdown_handle();
    let mut serving = tokio::spawn(server.serve());

    tokio::select! {
        () = tern::shutdown_signal() => {
            logger.scope(|| info!("shutdown signal received"));
            if let Err(e) = handle.shutdown(Duration::from_secs(10)).await {
                logger.scope(|| warn!("{e}, closing"));
                handle.close();
            }
            serving.await.expect("serve task panicked")
        }
        res = &mut serving => res.expect("serve task panicked"),
    }
}

async fn hello(ctx: AppContext) -> HandlerResult {
    ctx.response_writer().write(b"Hello World!")?;
    Ok(())
}

async fn handled_error(ctx: AppContext) -> HandlerResult {
    ctx.logger.scope(|| info!("handled error"));
    ctx.response_writer().text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error")?;
    Ok(())
}

async fn unhandled_error(_ctx: AppContext) -> HandlerResult {
    Err("unhandled error".into())
}
