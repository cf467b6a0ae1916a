//! Per-request tracing span.

use std::time::Instant;

use tracing::{Instrument, info, info_span};

use crate::context::Context;
use crate::handler::BoxedHandler;
use crate::logger::Logger;
use crate::middleware::Middleware;

/// Runs each request inside a `request` span carrying method and path, and
/// logs status and latency through `logger` once the inner handler returns.
///
/// Register it first, with the same `logger` as the middleware after it, so
/// their events are recorded inside the span.
pub fn trace<T: Context>(logger: Logger) -> Middleware<T> {
    Middleware::new(move |next: BoxedHandler<T>| {
        let logger = logger.clone();
        move |ctx: T| {
            let req = ctx.request();
            let span = logger.scope(|| info_span!("request", method = %req.method(), path = %req.path()));
            let writer = ctx.response_writer().clone();
            let inner = span.in_scope(|| next.call(ctx));
            let logger = logger.clone();

            async move {
                let started = Instant::now();
                let result = inner.await;
                logger.scope(|| {
                    info!(
                        status = writer.status().map_or(0, |s| s.as_u16()),
                        latency_us = started.elapsed().as_micros() as u64,
                        failed = result.is_err(),
                        "request completed"
                    )
                });
                result
            }
            .instrument(span)
        }
    })
}
