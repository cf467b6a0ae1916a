//! Middleware layer.
//!
//! A [`Middleware<T>`] turns one handler into another of the same type. It
//! is the place for cross-cutting concerns: logging, error translation,
//! tracing, header inspection. A middleware receives the next handler in the
//! chain and returns a handler that usually does some work, calls `next`,
//! and maybe does more work on the way out:
//!
//! ```rust
//! use tern::{BoxedHandler, Context, Middleware};
//!
//! fn powered_by<T: Context>() -> Middleware<T> {
//!     Middleware::new(|next: BoxedHandler<T>| move |ctx: T| {
//!         let _ = ctx.response_writer().insert_header("x-powered-by", "tern");
//!         next.call(ctx)
//!     })
//! }
//! ```
//!
//! # Ordering
//!
//! Chains are resolved once, when a route is registered, never per request.
//! The first middleware in a list is the outermost wrapper: it runs first on
//! the way in and last on the way out. Server-wide middleware wraps outside
//! route middleware, so for global `[g0, g1]` and route `[r0]` a request sees
//!
//! ```text
//! g0 → g1 → r0 → handler → r0 → g1 → g0
//! ```

use std::sync::Arc;

use crate::handler::{BoxedHandler, Handler};

mod error;
mod logger;
mod trace;

pub use error::{ERROR_BODY, error_handler};
pub use logger::{RequestFormatter, default_formatter, request_logger};
pub use trace::trace;

type WrapFn<T> = dyn Fn(BoxedHandler<T>) -> BoxedHandler<T> + Send + Sync;

/// A handler-to-handler transformer.
pub struct Middleware<T>(Arc<WrapFn<T>>);

impl<T> Clone for Middleware<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: 'static> Middleware<T> {
    /// Builds a middleware from a function of the next handler.
    ///
    /// `f` may return any handler, including `next` itself.
    pub fn new<F, H>(f: F) -> Self
    where
        F: Fn(BoxedHandler<T>) -> H + Send + Sync + 'static,
        H: Handler<T>,
    {
        Self(Arc::new(move |next: BoxedHandler<T>| f(next).into_boxed_handler()))
    }

    /// Wraps `next`, returning the combined handler.
    pub fn wrap(&self, next: BoxedHandler<T>) -> BoxedHandler<T> {
        (self.0)(next)
    }
}

/// Composes `middleware` around `handler`.
///
/// Walks the list back to front so the first entry ends up outermost.
/// `None` entries are skipped and leave the order of the rest untouched; an
/// empty list returns `handler` itself.
pub fn wrap_middleware<T: 'static>(
    middleware: &[Option<Middleware<T>>],
    handler: BoxedHandler<T>,
) -> BoxedHandler<T> {
    middleware
        .iter()
        .rev()
        .flatten()
        .fold(handler, |next, mw| mw.wrap(next))
}
