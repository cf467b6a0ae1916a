//! Built-in Kubernetes health-check handlers.
//!
//! | Probe | Suggested path | Question |
//! |---|---|---|
//! | **Liveness** | `/healthz` | Is the process alive? Failure → restart. |
//! | **Readiness** | `/readyz` | Can the pod serve traffic? Failure → pulled from load-balancer. |
//!
//! Both are generic over the context type, so they register on any server:
//!
//! ```rust,no_run
//! use tern::{Server, ServerConfig, health};
//!
//! let server = Server::new(ServerConfig::default());
//! server.handle("GET /healthz", health::liveness).unwrap();
//! server.handle("GET /readyz", health::readiness).unwrap();
//! ```
//!
//! Replace `readiness` with your own handler if you need to gate on
//! dependency availability.

use http::StatusCode;

use crate::context::Context;
use crate::error::HandlerResult;

/// Always `200 OK` with body `ok`.
pub async fn liveness<T: Context>(ctx: T) -> HandlerResult {
    ctx.response_writer().text(StatusCode::OK, "ok")?;
    Ok(())
}

/// `200 OK` with body `ready`.
pub async fn readiness<T: Context>(ctx: T) -> HandlerResult {
    ctx.response_writer().text(StatusCode::OK, "ready")?;
    Ok(())
}
