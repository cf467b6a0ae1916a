//! Minimal tern example: one greeting route, one failing route.
//!
//! Run with:
//!   RUST_LOG=info cargo run --example basic
//!
//! Try:
//!   curl -i http://localhost:4000/
//!   curl -i http://localhost:4000/error     # 500, server keeps running

use std::time::Duration;

use tern::{BaseContext, Context, HandlerResult, Server, ServerConfig};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), tern::Error> {
    tracing_subscriber::fmt::init();

    let server = Server::new(ServerConfig::new("localhost", "4000"));
    server.handle("/", hello)?;
    server.handle("/error", oops)?;

    let handle = server.shutdown_handle();
    let mut serving = tokio::spawn(server.serve());

    tokio::select! {
        () = tern::shutdown_signal() => {
            info!("shutdown signal received");
            if let Err(e) = handle.shutdown(Duration::from_secs(10)).await {
                warn!("{e}, closing");
                handle.close();
            }
            serving.await.expect("serve task panicked")
        }
        res = &mut serving => res.expect("serve task panicked"),
    }
}

async fn hello(ctx: BaseContext) -> HandlerResult {
    ctx.response_writer().write_header(http::StatusCode::OK);
    ctx.response_writer().write(b"Hello World!")?;
    Ok(())
}

async fn oops(_ctx: BaseContext) -> HandlerResult {
    Err("oopsie".into())
}
