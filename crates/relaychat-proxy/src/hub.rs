//! Per-connection handling: hello, frame loop, cleanup.
//!
//! Each downstream connection runs [`ProxyHub::serve_connection`]:
//!   1. Wait for `SERVER_HELLO` and register the server
//!   2. Read frames: control frames update the roster, envelopes are routed
//!   3. In parallel, drain this server's outbound queue onto the connection
//!   4. On exit, unregister (unless a newer connection took over)

use std::time::Duration;

use relaychat_protocol::{ControlFrame, RelayCodec, RelayFrame, ServerHello, ServerId};
use relaychat_transport::{Connection, ConnectionId, TransportError};
use tokio::sync::{Mutex, mpsc};

use crate::{DownstreamRegistry, ProxyConfig, ProxyError, ProxyRouter};

/// Shared proxy state: the registry plus the routing rules.
///
/// One hub serves any number of connections concurrently. WebSocket
/// connections and in-process [`Connection`]s are served the same way.
pub struct ProxyHub {
    registry: Mutex<DownstreamRegistry>,
    router: ProxyRouter,
    codec: RelayCodec,
    hello_timeout: Duration,
}

impl ProxyHub {
    pub fn new(config: &ProxyConfig) -> Self {
        Self {
            registry: Mutex::new(DownstreamRegistry::new()),
            router: ProxyRouter::new(),
            codec: RelayCodec,
            hello_timeout: config.hello_timeout(),
        }
    }

    /// Ids of the currently registered downstreams.
    pub async fn downstreams(&self) -> Vec<ServerId> {
        self.registry.lock().await.server_ids()
    }

    /// The server currently hosting `name`, if any.
    pub async fn locate(&self, name: &str) -> Option<ServerId> {
        self.registry.lock().await.locate(name).cloned()
    }

    /// Serves one downstream connection until it closes or is replaced.
    ///
    /// # Errors
    /// [`ProxyError::HelloTimeout`], [`ProxyError::ExpectedHello`] or
    /// [`ProxyError::ClosedBeforeHello`] if the server never introduces
    /// itself; [`ProxyError::Transport`] if reading fails afterwards.
    pub async fn serve_connection<C>(&self, conn: C) -> Result<(), ProxyError>
    where
        C: Connection<Error = TransportError>,
    {
        let conn_id = conn.id();
        tracing::debug!(%conn_id, "downstream connected");

        let hello = match self.await_hello(&conn).await {
            Ok(hello) => hello,
            Err(e) => {
                let _ = conn.close().await;
                return Err(e);
            }
        };
        let server_id = hello.server_id.clone();

        let (tx, rx) = mpsc::unbounded_channel();
        self.registry.lock().await.register(hello, conn_id, tx);

        let result = tokio::select! {
            r = self.read_loop(&conn, &server_id, conn_id) => r,
            superseded = write_loop(&conn, rx) => {
                if superseded {
                    tracing::info!(%server_id, %conn_id, "connection superseded");
                }
                Ok(())
            }
        };

        self.registry.lock().await.unregister(&server_id, conn_id);
        let _ = conn.close().await;
        result
    }

    async fn await_hello<C>(&self, conn: &C) -> Result<ServerHello, ProxyError>
    where
        C: Connection<Error = TransportError>,
    {
        let data = match tokio::time::timeout(self.hello_timeout, conn.recv()).await {
            Ok(Ok(Some(data))) => data,
            Ok(Ok(None)) => return Err(ProxyError::ClosedBeforeHello),
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => return Err(ProxyError::HelloTimeout(self.hello_timeout)),
        };

        match self.codec.decode_frame(&data) {
            Ok(RelayFrame::Control(ControlFrame::Hello(hello))) => Ok(hello),
            Ok(RelayFrame::Control(other)) => {
                Err(ProxyError::ExpectedHello(other.kind().to_string()))
            }
            Ok(RelayFrame::Envelope(env)) => Err(ProxyError::ExpectedHello(env.kind().to_string())),
            Err(e) => Err(e.into()),
        }
    }

    async fn read_loop<C>(
        &self,
        conn: &C,
        server_id: &ServerId,
        conn_id: ConnectionId,
    ) -> Result<(), ProxyError>
    where
        C: Connection<Error = TransportError>,
    {
        loop {
            let Some(data) = conn.recv().await? else {
                tracing::info!(%server_id, %conn_id, "downstream closed");
                return Ok(());
            };

            match self.codec.decode_frame(&data) {
                Ok(RelayFrame::Control(control)) => {
                    self.apply_control(server_id, conn_id, control).await;
                }
                Ok(RelayFrame::Envelope(envelope)) => {
                    let registry = self.registry.lock().await;
                    let route = self.router.plan_envelope(&envelope, &registry);
                    let delivered = self.router.deliver(&data, route, &registry);
                    tracing::trace!(%server_id, kind = %envelope.kind(), delivered, "frame routed");
                }
                Err(e) => {
                    tracing::debug!(%server_id, error = %e, "undecodable frame dropped");
                }
            }
        }
    }

    async fn apply_control(&self, server_id: &ServerId, conn_id: ConnectionId, control: ControlFrame) {
        let mut registry = self.registry.lock().await;
        match control {
            ControlFrame::Presence(presence) => {
                if !registry.apply_presence(server_id, conn_id, presence) {
                    tracing::debug!(%server_id, %conn_id, "presence from unregistered or superseded connection ignored");
                }
            }
            ControlFrame::Hello(hello) if hello.server_id == *server_id => {
                registry.replace_roster(server_id, conn_id, hello.players);
            }
            ControlFrame::Hello(hello) => {
                tracing::warn!(
                    %server_id,
                    claimed = %hello.server_id,
                    "hello with a different server id ignored"
                );
            }
        }
    }
}

/// Drains the outbound queue onto the connection.
///
/// Returns `true` when the registry dropped the queue's sender (a newer
/// connection took over), `false` when the connection stopped accepting
/// frames.
async fn write_loop<C>(conn: &C, mut rx: mpsc::UnboundedReceiver<Vec<u8>>) -> bool
where
    C: Connection<Error = TransportError>,
{
    while let Some(frame) = rx.recv().await {
        if let Err(e) = conn.send(&frame).await {
            tracing::debug!(conn_id = %conn.id(), error = %e, "send to downstream failed");
            return false;
        }
    }
    true
}
