use std::sync::Arc;

use nvrd::config::Config;
use nvrd::handlers;
use nvrd::server::{self, ServerContext};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .init();

    let cfg = Config::load()?;
    let mut ctx = ServerContext::new(cfg)?;
    handlers::register_builtin(&mut ctx.router, ctx.sessions.clone());
    let ctx = Arc::new(ctx);

    tokio::select! {
        res = server::listener::run(ctx.clone()) => {
            res?;
        }

        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown signal received");
            ctx.begin_shutdown();
        }
    }

    Ok(())
}
