//! WebSocket front end of the proxy.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use relaychat_transport::{Transport, TransportError, WebSocketTransport};

use crate::{ProxyConfig, ProxyError, ProxyHub};

/// Accepts game-server connections and serves each on its own task.
///
/// ```rust,no_run
/// use relaychat_proxy::{ProxyConfig, ProxyServer};
///
/// # async fn run() -> Result<(), relaychat_proxy::ProxyError> {
/// let server = ProxyServer::bind(ProxyConfig::default()).await?;
/// server.run_until(async { let _ = tokio::signal::ctrl_c().await; }).await
/// # }
/// ```
pub struct ProxyServer {
    transport: WebSocketTransport,
    hub: Arc<ProxyHub>,
}

impl ProxyServer {
    pub async fn bind(config: ProxyConfig) -> Result<Self, ProxyError> {
        let transport = WebSocketTransport::bind(&config.bind_addr).await?;
        let hub = Arc::new(ProxyHub::new(&config));
        Ok(Self { transport, hub })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, ProxyError> {
        Ok(self.transport.local_addr()?)
    }

    /// The hub shared by every connection this server accepts.
    pub fn hub(&self) -> Arc<ProxyHub> {
        Arc::clone(&self.hub)
    }

    /// Runs the accept loop until the process ends.
    pub async fn run(self) -> Result<(), ProxyError> {
        self.run_until(std::future::pending()).await
    }

    /// Runs the accept loop until `shutdown` completes. Connections that
    /// are already being served keep running.
    pub async fn run_until(mut self, shutdown: impl Future<Output = ()>) -> Result<(), ProxyError> {
        tracing::info!(addr = ?self.transport.local_addr().ok(), "relaychat proxy running");
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let hub = Arc::clone(&self.hub);
                        tokio::spawn(async move {
                            if let Err(e) = hub.serve_connection(conn).await {
                                tracing::debug!(error = %e, "downstream connection ended with error");
                            }
                        });
                    }
                    Err(TransportError::Shutdown) => break,
                    Err(e) => tracing::error!(error = %e, "accept failed"),
                },
                () = &mut shutdown => break,
            }
        }

        self.transport.shutdown().await?;
        tracing::info!("relaychat proxy stopped");
        Ok(())
    }
}
