//! Request logging.

use std::sync::Arc;

use tracing::info;

use crate::context::Context;
use crate::handler::BoxedHandler;
use crate::logger::Logger;
use crate::middleware::Middleware;
use crate::request::Request;

/// Renders one request as a log line.
pub type RequestFormatter = Arc<dyn Fn(&Request) -> String + Send + Sync>;

/// `[METHOD] target | remote-ip`, e.g. `[GET] /users?page=2 | 10.0.0.7`.
///
/// The port is dropped from the remote address; `-` stands in when the
/// address is unknown.
pub fn default_formatter(req: &Request) -> String {
    let remote = req
        .remote_addr()
        .map_or_else(|| "-".to_owned(), |addr| addr.ip().to_string());
    format!("[{}] {} | {}", req.method(), req.target(), remote)
}

/// Logs every request through `logger` before handing it on.
///
/// The result of the inner handler is returned untouched.
pub fn request_logger<T: Context>(
    formatter: impl Fn(&Request) -> String + Send + Sync + 'static,
    logger: Logger,
) -> Middleware<T> {
    let formatter: RequestFormatter = Arc::new(formatter);
    Middleware::new(move |next: BoxedHandler<T>| {
        let formatter = Arc::clone(&formatter);
        let logger = logger.clone();
        move |ctx: T| {
            let line = formatter(ctx.request());
            logger.scope(|| info!("{line}"));
            next.call(ctx)
        }
    })
}
