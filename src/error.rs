//! Unified error type.

use std::time::Duration;

/// The error a handler reports.
///
/// Anything implementing [`std::error::Error`] converts into it with `?`, and
/// string literals convert with `.into()`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// What every handler and middleware returns.
pub type HandlerResult = Result<(), BoxError>;

/// The error type returned by tern's fallible operations.
///
/// Handler failures are not represented here: they travel as [`BoxError`]
/// through the middleware chain and end up as a `500` response. This type
/// surfaces configuration and infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The listener could not be bound.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// A route pattern was malformed or conflicts with one already registered.
    #[error("invalid route `{pattern}`: {reason}")]
    Route { pattern: String, reason: String },

    /// In-flight requests did not finish before the shutdown deadline.
    #[error("graceful shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),

    /// The response was already handed to the transport.
    #[error("response already sent")]
    ResponseClosed,

    /// A header name or value was rejected.
    #[error("invalid header `{name}`")]
    InvalidHeader { name: String },
}
