use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::http::connection::Connection;
use crate::server::context::ServerContext;

/// A bound listener ready to accept connections.
///
/// Binding and serving are split so callers (and tests) can learn the local
/// address before the accept loop starts.
pub struct Listener {
    inner: TcpListener,
    ctx: Arc<ServerContext>,
}

impl Listener {
    pub async fn bind(ctx: Arc<ServerContext>) -> anyhow::Result<Self> {
        let inner = TcpListener::bind(&ctx.config.server.listen_addr).await?;
        info!("listening on {}", inner.local_addr()?);
        Ok(Self { inner, ctx })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.inner.local_addr()?)
    }

    /// Accepts connections forever, one task per connection.
    pub async fn serve(self) -> anyhow::Result<()> {
        loop {
            let (socket, peer) = self.inner.accept().await?;
            tracing::debug!(%peer, "accepted connection");

            let ctx = self.ctx.clone();
            tokio::spawn(async move {
                let mut conn = Connection::new(socket, peer, ctx);
                if let Err(e) = conn.run().await {
                    tracing::debug!(%peer, error = %e, "connection error");
                }
            });
        }
    }
}

/// Binds and serves in one step; the binary's entry point.
pub async fn run(ctx: Arc<ServerContext>) -> anyhow::Result<()> {
    Listener::bind(ctx).await?.serve().await
}
