//! # tern
//!
//! Typed request contexts and composable middleware on top of hyper.
//!
//! ## The contract
//!
//! hyper owns the wire: HTTP/1.1 and HTTP/2, connection management, body
//! framing. [`matchit`] owns path matching. tern adds the part that changes
//! between applications:
//!
//! - **A context per request.** Handlers receive a value implementing
//!   [`Context`]. The default is [`BaseContext`] (request + response writer);
//!   a server built with [`Server::with_context`] hands out your own type
//!   instead, say one that also carries a database pool or a logger.
//! - **Middleware as handler transformers.** A [`Middleware<T>`] wraps a
//!   handler into another handler. Chains are resolved once per route at
//!   registration: server-wide middleware outermost, route middleware
//!   inside it, first-registered first.
//! - **Failures that stay local.** A handler error never brings the server
//!   down. [`middleware::error_handler`] turns it into a `500`; without it,
//!   the server does the same after logging.
//! - **Controlled shutdown.** [`ShutdownHandle`] drains in-flight requests
//!   within a deadline, or closes at once.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::time::Duration;
//!
//! use tern::middleware::{default_formatter, error_handler, request_logger};
//! use tern::{BaseContext, Context, HandlerResult, Logger, Server, ServerConfig};
//!
//! async fn hello(ctx: BaseContext) -> HandlerResult {
//!     ctx.response_writer().write(b"Hello World!")?;
//!     Ok(())
//! }
//!
//! async fn broken(_ctx: BaseContext) -> HandlerResult {
//!     Err("something went wrong".into())
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), tern::Error> {
//!     let server = Server::new(ServerConfig::new("0.0.0.0", "3000"));
//!     server.use_middleware([
//!         error_handler(Logger::ambient()),
//!         request_logger(default_formatter, Logger::ambient()),
//!     ]);
//!     server.handle("GET /", hello)?;
//!     server.handle("/broken", broken)?;
//!
//!     let handle = server.shutdown_handle();
//!     let serving = tokio::spawn(server.serve());
//!
//!     tern::shutdown_signal().await;
//!     if handle.shutdown(Duration::from_secs(10)).await.is_err() {
//!         handle.close();
//!     }
//!     serving.await.expect("serve task panicked")
//! }
//! ```

mod config;
mod context;
mod error;
mod handler;
mod logger;
mod request;
mod response;
mod router;
mod server;
mod signal;

#[cfg(test)]
mod testing;

pub mod health;
pub mod middleware;

pub use config::ServerConfig;
pub use context::{BaseContext, Context};
pub use error::{BoxError, Error, HandlerResult};
pub use handler::{BoxFuture, BoxedHandler, Handler};
pub use logger::Logger;
pub use middleware::{Middleware, wrap_middleware};
pub use request::Request;
pub use response::{ContentType, ResponseWriter};
pub use server::{ContextFn, Phase, Server, ShutdownHandle};
pub use signal::shutdown_signal;
