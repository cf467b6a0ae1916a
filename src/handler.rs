//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! Routes hold handlers of *different* concrete types, and middleware needs
//! to wrap any of them. Both work on a single type-erased form,
//! [`BoxedHandler<T>`], so a chain of wrappers is just a chain of trait
//! objects:
//!
//! ```text
//! async fn hello(ctx: C) -> HandlerResult { … }   ← user writes this
//!        ↓ server.handle("/", hello)
//! hello.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! BoxedHandler(Arc::new(FnHandler(hello)))         ← heap-allocated wrapper
//!        ↓ middleware.wrap(boxed)                  ← once, at registration
//! handler.call(ctx)  at request time               ← one vtable dispatch per layer
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::error::HandlerResult;

/// A heap-allocated, type-erased future resolving to a [`HandlerResult`].
pub type BoxFuture = Pin<Box<dyn Future<Output = HandlerResult> + Send + 'static>>;

/// Internal dispatch interface behind [`BoxedHandler`].
pub(crate) trait ErasedHandler<T>: Send + Sync + 'static {
    fn call(&self, ctx: T) -> BoxFuture;
}

/// A type-erased handler shared across concurrent requests.
///
/// This is what middleware receives as `next` and what it returns. Cloning
/// is one atomic increment.
pub struct BoxedHandler<T>(Arc<dyn ErasedHandler<T>>);

impl<T> Clone for BoxedHandler<T> {
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0))
    }
}

impl<T: 'static> BoxedHandler<T> {
    /// Runs the handler (and everything it wraps) against `ctx`.
    pub fn call(&self, ctx: T) -> BoxFuture {
        self.0.call(ctx)
    }

    #[cfg(test)]
    pub(crate) fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

// ── Public Handler trait ──────────────────────────────────────────────────────

/// Implemented for every valid handler over context type `T`.
///
/// You never implement this yourself. It is satisfied by any `async fn` (or
/// closure returning a future) with the shape
///
/// ```text
/// async fn name(ctx: T) -> HandlerResult
/// ```
///
/// and by [`BoxedHandler<T>`] itself, so middleware can hand `next` back
/// unchanged. The trait is sealed.
pub trait Handler<T>: private::Sealed<T> + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler<T>;
}

mod private {
    pub trait Sealed<T> {}
}

impl<F, Fut, T> private::Sealed<T> for F
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
}

impl<F, Fut, T> Handler<T> for F
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler<T> {
        BoxedHandler(Arc::new(FnHandler(self)))
    }
}

impl<T> private::Sealed<T> for BoxedHandler<T> {}

impl<T: 'static> Handler<T> for BoxedHandler<T> {
    fn into_boxed_handler(self) -> BoxedHandler<T> {
        self
    }
}

// ── Concrete wrapper ──────────────────────────────────────────────────────────

/// Holds a concrete handler `F` and bridges it to [`ErasedHandler`].
struct FnHandler<F>(F);

impl<F, Fut, T> ErasedHandler<T> for FnHandler<F>
where
    F: Fn(T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    fn call(&self, ctx: T) -> BoxFuture {
        Box::pin((self.0)(ctx))
    }
}
