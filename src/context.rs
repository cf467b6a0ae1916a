//! Per-request context.
//!
//! Every handler and middleware receives a value implementing [`Context`]:
//! something that can hand out the incoming [`Request`] and the outgoing
//! [`ResponseWriter`]. The server builds one [`BaseContext`] per request and
//! passes it through the server's context function, which may lift it into a
//! richer application type.
//!
//! A richer context embeds a `BaseContext` and points the trait at it. All
//! accessors come for free, so middleware written against `Context` alone
//! works with it unchanged:
//!
//! ```rust
//! use tern::{BaseContext, Context};
//!
//! struct AppContext {
//!     base: BaseContext,
//!     tenant: String,
//! }
//!
//! impl Context for AppContext {
//!     fn base(&self) -> &BaseContext { &self.base }
//!     fn base_mut(&mut self) -> &mut BaseContext { &mut self.base }
//! }
//! ```

use crate::request::Request;
use crate::response::ResponseWriter;

/// The capability set every request context carries.
///
/// Implementors only supply [`base`](Context::base) and
/// [`base_mut`](Context::base_mut); the accessors are provided.
pub trait Context: Send + 'static {
    fn base(&self) -> &BaseContext;
    fn base_mut(&mut self) -> &mut BaseContext;

    fn request(&self) -> &Request {
        &self.base().request
    }

    fn set_request(&mut self, request: Request) {
        self.base_mut().request = request;
    }

    fn response_writer(&self) -> &ResponseWriter {
        &self.base().writer
    }

    /// Replaces the response sink seen by everything further down the chain.
    ///
    /// The server still sends whatever was written to the sink it created,
    /// so a replacement is expected to forward to it.
    fn set_response_writer(&mut self, writer: ResponseWriter) {
        self.base_mut().writer = writer;
    }
}

/// The context the server constructs for each request.
#[derive(Debug, Default)]
pub struct BaseContext {
    request: Request,
    writer: ResponseWriter,
}

impl BaseContext {
    pub fn new(request: Request, writer: ResponseWriter) -> Self {
        Self { request, writer }
    }
}

impl Context for BaseContext {
    fn base(&self) -> &BaseContext { self }
    fn base_mut(&mut self) -> &mut BaseContext { self }
}
