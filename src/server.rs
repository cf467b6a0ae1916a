//! HTTP server, request dispatch, and shutdown control.
//!
//! A [`Server`] has two phases. While it is being configured, routes and
//! middleware are registered through `&self` methods guarded by locks, so a
//! shared server may be configured from several threads. [`Server::serve`]
//! consumes it, freezes the route table into an immutable snapshot, and
//! dispatches requests without taking any lock.
//!
//! Shutdown is driven through a [`ShutdownHandle`] taken before serving:
//!
//! 1. [`signal_shutdown`](ShutdownHandle::signal_shutdown) stops
//!    `listener.accept()` at once and asks every open connection to finish
//!    its in-flight request and close.
//! 2. [`shutdown`](ShutdownHandle::shutdown) does the same and waits for the
//!    drain, bounded by a deadline.
//! 3. [`close`](ShutdownHandle::close) aborts whatever is still open.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use bytes::Bytes;
use http::header::{ALLOW, HeaderValue};
use http::{Method, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use hyper_util::server::graceful::GracefulShutdown;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::context::{BaseContext, Context};
use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::logger::Logger;
use crate::middleware::{Middleware, wrap_middleware};
use crate::request::Request;
use crate::response::{ResponseWriter, status_only};
use crate::router::{Lookup, Routes};

/// Lifts the per-request [`BaseContext`] into the application's context type.
pub type ContextFn<T> = Arc<dyn Fn(BaseContext) -> T + Send + Sync>;

// ── Server ────────────────────────────────────────────────────────────────────

/// The HTTP server, generic over the context type its handlers receive.
///
/// ```rust,no_run
/// use tern::{BaseContext, Context, HandlerResult, Server, ServerConfig};
///
/// async fn hello(ctx: BaseContext) -> HandlerResult {
///     ctx.response_writer().write(b"Hello World!")?;
///     Ok(())
/// }
///
/// #[tokio::main]
/// async fn main() -> Result<(), tern::Error> {
///     let server = Server::new(ServerConfig::new("localhost", "4000"));
///     server.handle("/", hello)?;
///     server.serve_with_shutdown(tern::shutdown_signal()).await
/// }
/// ```
pub struct Server<T = BaseContext> {
    addr: String,
    logger: Logger,
    context_fn: ContextFn<T>,
    middleware: RwLock<Vec<Option<Middleware<T>>>>,
    routes: Mutex<Routes<T>>,
    handle: ShutdownHandle,
}

impl Server<BaseContext> {
    /// A server whose handlers receive the [`BaseContext`] itself.
    pub fn new(config: ServerConfig) -> Self {
        Self::with_context(config, |ctx| ctx)
    }
}

impl<T: Context> Server<T> {
    /// A server whose handlers receive whatever `context_fn` builds from the
    /// base context of each request.
    pub fn with_context<F>(config: ServerConfig, context_fn: F) -> Self
    where
        F: Fn(BaseContext) -> T + Send + Sync + 'static,
    {
        Self {
            addr: config.addr(),
            logger: config.logger.unwrap_or_default(),
            context_fn: Arc::new(context_fn),
            middleware: RwLock::new(Vec::new()),
            routes: Mutex::new(Routes::new()),
            handle: ShutdownHandle::new(),
        }
    }

    /// Registers `handler` under `pattern` with the server-wide middleware.
    ///
    /// See [`handle_with`](Server::handle_with) for the pattern syntax.
    pub fn handle(&self, pattern: &str, handler: impl Handler<T>) -> Result<(), Error> {
        self.handle_with(pattern, handler, std::iter::empty::<Middleware<T>>())
    }

    /// Registers `handler` under `pattern`, wrapped in `middleware` and then
    /// in the server-wide middleware registered so far.
    ///
    /// `pattern` is a path (`/users/{id}`, any method) or a method and a
    /// path (`GET /users/{id}`). Path syntax is [`matchit`]'s: `{name}` for
    /// one segment, `{*name}` for the rest. Registering a pattern that
    /// conflicts with an existing one fails with [`Error::Route`].
    ///
    /// The chain is built here, once. Middleware added with
    /// [`use_middleware`](Server::use_middleware) afterwards does not apply
    /// to this route.
    pub fn handle_with<I>(&self, pattern: &str, handler: impl Handler<T>, middleware: I) -> Result<(), Error>
    where
        I: IntoIterator,
        I::Item: Into<Option<Middleware<T>>>,
    {
        let route_mw: Vec<Option<Middleware<T>>> = middleware.into_iter().map(Into::into).collect();
        let handler = wrap_middleware(&route_mw, handler.into_boxed_handler());
        let handler = {
            let global = self.middleware.read().unwrap_or_else(PoisonError::into_inner);
            wrap_middleware(&global, handler)
        };

        self.routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pattern, handler)?;

        self.logger.scope(|| debug!(pattern, "route registered"));
        Ok(())
    }

    /// Appends server-wide middleware. `None` entries are kept and ignored.
    ///
    /// Only routes registered after this call are wrapped.
    pub fn use_middleware<I>(&self, middleware: I)
    where
        I: IntoIterator,
        I::Item: Into<Option<Middleware<T>>>,
    {
        let added: Vec<Option<Middleware<T>>> = middleware.into_iter().map(Into::into).collect();
        self.middleware
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(added);
    }

    #[cfg(test)]
    fn middleware_len(&self) -> usize {
        self.middleware.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// A handle for stopping the server once it is serving.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.handle.clone()
    }

    /// Binds the listener and serves until shutdown completes.
    pub async fn serve(self) -> Result<(), Error> {
        self.serve_with_shutdown(std::future::pending()).await
    }

    /// Like [`serve`](Server::serve), also starting a graceful shutdown when
    /// `signal` resolves.
    ///
    /// `signal` is just another trigger for
    /// [`ShutdownHandle::signal_shutdown`], typically [`shutdown_signal`].
    ///
    /// [`shutdown_signal`]: crate::shutdown_signal
    pub async fn serve_with_shutdown(self, signal: impl Future<Output = ()>) -> Result<(), Error> {
        let Self { addr, logger, context_fn, routes, handle, .. } = self;

        // Published before the cancellation check: a `shutdown` that still
        // sees `Configured` has cancelled first, so this returns below.
        handle.set_phase(Phase::Starting);
        if handle.graceful.is_cancelled() {
            handle.set_phase(Phase::Stopped);
            return Ok(());
        }

        let (listener, local_addr) = match bind(&addr).await {
            Ok(bound) => bound,
            Err(source) => {
                handle.set_phase(Phase::Stopped);
                return Err(Error::Bind { addr, source });
            }
        };

        let app = Arc::new(App {
            routes: routes.into_inner().unwrap_or_else(PoisonError::into_inner),
            context_fn,
            logger: logger.clone(),
        });

        handle.set_phase(Phase::Serving(local_addr));
        logger.scope(|| info!(addr = %local_addr, "tern listening"));

        let builder = ConnBuilder::new(TokioExecutor::new());
        let graceful = GracefulShutdown::new();
        let mut tasks = JoinSet::new();

        tokio::pin!(signal);
        let mut signalled = false;

        loop {
            tokio::select! {
                // Shutdown is checked first so a request to stop wins over
                // connections still queued on the listener.
                biased;

                () = handle.graceful.cancelled() => {
                    logger.scope(|| info!(in_flight = tasks.len(), "shutdown requested, draining connections"));
                    break;
                }

                () = &mut signal, if !signalled => {
                    signalled = true;
                    handle.signal_shutdown();
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            logger.scope(|| error!("accept error: {e}"));
                            continue;
                        }
                    };

                    let app = Arc::clone(&app);
                    let svc = service_fn(move |req| {
                        let app = Arc::clone(&app);
                        async move { app.dispatch(req, remote_addr).await }
                    });

                    let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), svc);
                    let conn = graceful.watch(conn.into_owned());
                    let logger = logger.clone();
                    tasks.spawn(async move {
                        if let Err(e) = conn.await {
                            logger.scope(|| debug!(peer = %remote_addr, "connection error: {e}"));
                        }
                    });
                }

                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        drop(listener);
        handle.set_phase(Phase::ShuttingDown);

        tokio::select! {
            () = graceful.shutdown() => {}
            () = handle.force.cancelled() => {
                logger.scope(|| warn!(open = tasks.len(), "closing open connections"));
                tasks.abort_all();
            }
        }
        while tasks.join_next().await.is_some() {}

        handle.set_phase(Phase::Stopped);
        logger.scope(|| info!("tern stopped"));
        Ok(())
    }
}

async fn bind(addr: &str) -> std::io::Result<(TcpListener, SocketAddr)> {
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    Ok((listener, local_addr))
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Everything a connection task needs, frozen when serving starts.
struct App<T> {
    routes: Routes<T>,
    context_fn: ContextFn<T>,
    logger: Logger,
}

impl<T: Context> App<T> {
    /// Routes one request and produces one response.
    ///
    /// The error type is [`Infallible`]: every failure becomes a status code
    /// here, so hyper never sees an error.
    async fn dispatch(
        &self,
        req: hyper::Request<Incoming>,
        remote_addr: SocketAddr,
    ) -> Result<http::Response<Full<Bytes>>, Infallible> {
        let (parts, body) = req.into_parts();

        let (handler, params) = match self.routes.lookup(&parts.method, parts.uri.path()) {
            Lookup::Found(handler, params) => (handler, params),
            Lookup::MethodNotAllowed(allowed) => return Ok(method_not_allowed(&allowed)),
            Lookup::NotFound => return Ok(status_only(StatusCode::NOT_FOUND)),
        };

        let body = match body.collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                self.logger.scope(|| warn!(peer = %remote_addr, "failed to read request body: {e}"));
                return Ok(status_only(StatusCode::BAD_REQUEST));
            }
        };

        let request = Request::new(parts, body, params, Some(remote_addr));
        Ok(self.run(&handler, request).await)
    }

    /// Builds the context, runs the handler chain, and takes the response.
    ///
    /// A failure that reaches this point is logged and, unless the handler
    /// already committed a response, answered with a bare `500`. It never
    /// stops the server.
    async fn run(&self, handler: &BoxedHandler<T>, request: Request) -> http::Response<Full<Bytes>> {
        let writer = ResponseWriter::new();
        let ctx = (self.context_fn)(BaseContext::new(request, writer.clone()));

        if let Err(err) = handler.call(ctx).await {
            self.logger.scope(|| error!(error = %err, "unhandled error from handler"));
            if !writer.is_committed() {
                if let Err(e) = writer.text(StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error") {
                    self.logger.scope(|| warn!(error = %e, "failed to write error response"));
                }
            }
        }

        writer.finish()
    }
}

/// `405` carrying the `Allow` header.
fn method_not_allowed(allowed: &[Method]) -> http::Response<Full<Bytes>> {
    let mut response = status_only(StatusCode::METHOD_NOT_ALLOWED);
    let list = allowed.iter().map(Method::as_str).collect::<Vec<_>>().join(", ");
    if let Ok(value) = HeaderValue::from_str(&list) {
        response.headers_mut().insert(ALLOW, value);
    }
    response
}

// ── Shutdown control ──────────────────────────────────────────────────────────

/// Where a server is in its life.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// `serve` has not been called.
    Configured,
    /// `serve` was called and is binding its listener.
    Starting,
    /// Accepting connections on the given address.
    Serving(SocketAddr),
    /// No longer accepting; draining open connections.
    ShuttingDown,
    /// `serve` has returned or is about to.
    Stopped,
}

/// Stops a server from outside its serve loop. Cheap to clone.
#[derive(Clone, Debug)]
pub struct ShutdownHandle {
    graceful: CancellationToken,
    force: CancellationToken,
    phase: Arc<watch::Sender<Phase>>,
}

impl ShutdownHandle {
    fn new() -> Self {
        let (phase, _) = watch::channel(Phase::Configured);
        Self {
            graceful: CancellationToken::new(),
            force: CancellationToken::new(),
            phase: Arc::new(phase),
        }
    }

    fn set_phase(&self, phase: Phase) {
        self.phase.send_replace(phase);
    }

    /// Requests a graceful stop and returns immediately.
    ///
    /// A server that has not started serving yet will return from `serve`
    /// straight away.
    pub fn signal_shutdown(&self) {
        self.graceful.cancel();
    }

    /// Requests a graceful stop and waits for in-flight requests to finish.
    ///
    /// Fails with [`Error::ShutdownTimeout`] if they are still running after
    /// `deadline`; the server keeps draining, and [`close`](Self::close)
    /// cuts it short. Returns at once if `serve` was never called.
    pub async fn shutdown(&self, deadline: Duration) -> Result<(), Error> {
        self.signal_shutdown();

        let mut phase = self.phase.subscribe();
        let drained = phase.wait_for(|p| matches!(p, Phase::Configured | Phase::Stopped));

        match tokio::time::timeout(deadline, drained).await {
            Ok(_) => Ok(()),
            Err(_) => Err(Error::ShutdownTimeout(deadline)),
        }
    }

    /// Stops immediately, aborting open connections.
    pub fn close(&self) {
        self.graceful.cancel();
        self.force.cancel();
    }

    pub fn phase(&self) -> Phase {
        *self.phase.borrow()
    }

    /// The bound address while serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match self.phase() {
            Phase::Serving(addr) => Some(addr),
            _ => None,
        }
    }

    /// Waits until the server has either bound its listener or given up.
    ///
    /// Returns the bound address, or `None` if the server stopped without
    /// serving (for example because binding failed).
    pub async fn ready(&self) -> Option<SocketAddr> {
        let mut phase = self.phase.subscribe();
        let current = match phase.wait_for(|p| !matches!(p, Phase::Configured | Phase::Starting)).await {
            Ok(p) => *p,
            Err(_) => return None,
        };
        match current {
            Phase::Serving(addr) => Some(addr),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::error::{BoxError, HandlerResult};
    use crate::middleware::error_handler;
    use crate::testing::Capture;

    fn local() -> ServerConfig {
        ServerConfig::new("127.0.0.1", "0").with_logger(Logger::noop())
    }

    fn app<T: Context>(server: Server<T>) -> App<T> {
        App {
            routes: server.routes.into_inner().unwrap(),
            context_fn: server.context_fn,
            logger: server.logger,
        }
    }

    async fn call<T: Context>(app: &App<T>, method: http::Method, path: &str) -> http::Response<Full<Bytes>> {
        let Lookup::Found(handler, params) = app.routes.lookup(&method, path) else {
            panic!("no route for {path}");
        };
        let mut request: Request = http::Request::builder()
            .method(method)
            .uri(path)
            .body(Bytes::new())
            .unwrap()
            .into();
        request.params = params;
        app.run(&handler, request).await
    }

    async fn body_of(response: http::Response<Full<Bytes>>) -> Bytes {
        response.into_body().collect().await.unwrap().to_bytes()
    }

    async fn hello(ctx: BaseContext) -> HandlerResult {
        ctx.response_writer().write(b"Hello World!")?;
        Ok(())
    }

    async fn oops(_ctx: BaseContext) -> HandlerResult {
        Err("oopsie".into())
    }

    #[tokio::test]
    async fn handler_output_passes_through_unchanged() {
        let server = Server::new(local());
        server.handle("/", hello).unwrap();

        let response = call(&app(server), http::Method::GET, "/").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_of(response).await, "Hello World!");
    }

    #[tokio::test]
    async fn unhandled_error_becomes_500_and_is_logged() {
        let capture = Capture::new();
        let server = Server::new(ServerConfig::new("127.0.0.1", "0").with_logger(capture.dispatch()));
        server.handle("/error", oops).unwrap();

        let response = call(&app(server), http::Method::GET, "/error").await;
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body_of(response).await, "Internal Server Error");
        assert!(capture.lines().contains(&"unhandled error from handler".to_owned()));
    }

    #[tokio::test]
    async fn committed_response_survives_handler_error() {
        let server = Server::new(local());
        let partial = |ctx: BaseContext| async move {
            ctx.response_writer().text(StatusCode::ACCEPTED, "queued")?;
            Err::<(), BoxError>("then failed".into())
        };
        server.handle("/partial", partial).unwrap();

        let response = call(&app(server), http::Method::GET, "/partial").await;
        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(body_of(response).await, "queued");
    }

    #[tokio::test]
    async fn global_then_route_middleware_order() {
        let journal = Arc::new(Mutex::new(Vec::new()));
        let tag = |name: &'static str| {
            let journal = Arc::clone(&journal);
            Middleware::new(move |next: BoxedHandler<BaseContext>| {
                let journal = Arc::clone(&journal);
                move |ctx: BaseContext| {
                    journal.lock().unwrap().push(name);
                    next.call(ctx)
                }
            })
        };

        let server = Server::new(local());
        server.use_middleware([tag("g0"), tag("g1")]);
        server.handle_with("/", hello, [Some(tag("r0")), None, Some(tag("r1"))]).unwrap();
        // Registered after the route: not part of its chain.
        server.use_middleware([tag("late")]);

        call(&app(server), http::Method::GET, "/").await;
        assert_eq!(*journal.lock().unwrap(), ["g0", "g1", "r0", "r1"]);
    }

    #[tokio::test]
    async fn custom_context_carries_extra_fields() {
        struct Tenant {
            base: BaseContext,
            name: &'static str,
        }

        impl Context for Tenant {
            fn base(&self) -> &BaseContext { &self.base }
            fn base_mut(&mut self) -> &mut BaseContext { &mut self.base }
        }

        async fn greet(ctx: Tenant) -> HandlerResult {
            let line = format!("{} asked for {}", ctx.name, ctx.request().path());
            ctx.response_writer().write(line.as_bytes())?;
            Ok(())
        }

        let server = Server::with_context(local(), |base| Tenant { base, name: "acme" });
        server.use_middleware([error_handler(Logger::noop())]);
        server.handle("/who", greet).unwrap();

        let response = call(&app(server), http::Method::GET, "/who").await;
        assert_eq!(body_of(response).await, "acme asked for /who");
    }

    #[test]
    fn concurrent_use_middleware_keeps_every_entry() {
        let server: Server = Server::new(local());
        let built = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..25 {
                        built.fetch_add(1, Ordering::Relaxed);
                        server.use_middleware([error_handler(Logger::noop())]);
                    }
                });
            }
        });

        assert_eq!(server.middleware_len(), built.load(Ordering::Relaxed));
        assert_eq!(server.middleware_len(), 200);
    }

    #[test]
    fn duplicate_route_is_a_registration_error() {
        let server = Server::new(local());
        server.handle("/", hello).unwrap();
        assert!(matches!(server.handle("/", hello), Err(Error::Route { .. })));
    }

    #[tokio::test]
    async fn shutdown_before_serve_returns_immediately() {
        let server = Server::new(local());
        let handle = server.shutdown_handle();

        handle.shutdown(Duration::from_secs(5)).await.unwrap();
        server.serve().await.unwrap();
        assert_eq!(handle.phase(), Phase::Stopped);
    }

    #[tokio::test]
    async fn shutdown_during_startup_waits_for_serve_to_finish() {
        // A host name goes through address resolution, so the first poll
        // leaves `serve` inside `bind`.
        let server = Server::new(ServerConfig::new("localhost", "0").with_logger(Logger::noop()));
        let handle = server.shutdown_handle();

        let mut serving = Box::pin(server.serve());
        tokio::select! {
            biased;
            res = &mut serving => panic!("serve returned early: {res:?}"),
            () = std::future::ready(()) => {}
        }
        assert_ne!(handle.phase(), Phase::Configured);

        let serving = tokio::spawn(serving);
        handle.shutdown(Duration::from_secs(5)).await.unwrap();
        assert_eq!(handle.phase(), Phase::Stopped);
        let _ = serving.await.unwrap();
    }

    #[tokio::test]
    async fn bind_failure_is_reported() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port().to_string();

        let server = Server::new(ServerConfig::new("127.0.0.1", port).with_logger(Logger::noop()));
        let handle = server.shutdown_handle();

        assert!(matches!(server.serve().await, Err(Error::Bind { .. })));
        assert_eq!(handle.ready().await, None);
    }
}
