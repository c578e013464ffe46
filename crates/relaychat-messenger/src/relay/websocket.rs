//! Reconnecting WebSocket link to the proxy.

use std::time::Duration;

use relaychat_transport::{ClientConnection, Connection, connect};
use tokio::runtime::Handle;

use super::{LinkIo, RelayLink};
use crate::MessengerError;

/// Dials the proxy and keeps the connection up until shutdown.
///
/// On every successful connect the link re-sends `SERVER_HELLO` with the
/// current roster. Frames published while disconnected are dropped rather
/// than replayed: stale chat is worse than missing chat.
#[derive(Debug, Clone)]
pub struct WebSocketRelayLink {
    url: String,
    reconnect_delay: Duration,
}

impl WebSocketRelayLink {
    pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect_delay: Self::DEFAULT_RECONNECT_DELAY,
        }
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl RelayLink for WebSocketRelayLink {
    fn open(&self, io: LinkIo) -> Result<(), MessengerError> {
        let runtime = Handle::try_current().map_err(|_| MessengerError::NoRuntime)?;
        runtime.spawn(run_link(self.url.clone(), self.reconnect_delay, io));
        Ok(())
    }
}

enum LinkExit {
    Shutdown,
    Lost,
}

async fn run_link(url: String, reconnect_delay: Duration, mut io: LinkIo) {
    loop {
        if *io.shutdown.borrow() {
            break;
        }

        let attempt = tokio::select! {
            attempt = connect(&url) => attempt,
            _ = io.shutdown.changed() => break,
        };

        match attempt {
            Ok(conn) => {
                let dropped = drain_stale(&mut io);
                if dropped > 0 {
                    tracing::debug!(dropped, "discarded frames queued while disconnected");
                }
                tracing::info!(%url, "connected to relay proxy");

                let exit = match (io.hello)() {
                    Some(hello) => match conn.send(&hello).await {
                        Ok(()) => pump(&conn, &mut io).await,
                        Err(e) => {
                            tracing::warn!(error = %e, "failed to send SERVER_HELLO");
                            LinkExit::Lost
                        }
                    },
                    None => pump(&conn, &mut io).await,
                };
                let _ = conn.close().await;

                match exit {
                    LinkExit::Shutdown => break,
                    LinkExit::Lost => tracing::warn!(%url, "relay connection lost"),
                }
            }
            Err(e) => tracing::warn!(%url, error = %e, "relay connect failed"),
        }

        tokio::select! {
            _ = tokio::time::sleep(reconnect_delay) => {}
            _ = io.shutdown.changed() => break,
        }
    }
    tracing::debug!(%url, "relay link stopped");
}

fn drain_stale(io: &mut LinkIo) -> usize {
    let mut dropped = 0;
    while io.outbound.try_recv().is_ok() {
        dropped += 1;
    }
    dropped
}

async fn pump(conn: &ClientConnection, io: &mut LinkIo) -> LinkExit {
    loop {
        tokio::select! {
            frame = io.outbound.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = conn.send(&frame).await {
                        tracing::debug!(error = %e, "relay send failed");
                        return LinkExit::Lost;
                    }
                }
                None => return LinkExit::Shutdown,
            },
            incoming = conn.recv() => match incoming {
                Ok(Some(frame)) => {
                    if io.inbound.send(frame).is_err() {
                        return LinkExit::Shutdown;
                    }
                }
                Ok(None) => return LinkExit::Lost,
                Err(e) => {
                    tracing::debug!(error = %e, "relay receive failed");
                    return LinkExit::Lost;
                }
            },
            _ = io.shutdown.changed() => return LinkExit::Shutdown,
        }
    }
}
