//! Byte links between game servers and the relay proxy.
//!
//! The proxy accepts links through a [`Transport`]; each accepted link is a
//! [`Connection`] that moves whole frames in both directions. Game servers
//! dial out with [`connect`]. Nothing in this crate looks inside a frame:
//! `relaychat-protocol` decides what the bytes mean.
//!
//! ```text
//! game server ──connect()──→ ClientConnection ═══ ServerConnection ←──accept()── proxy
//! ```
//!
//! # Feature Flags
//!
//! - `websocket` (default): binary WebSocket frames via `tokio-tungstenite`

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "websocket")]
pub use websocket::{
    ClientConnection, ServerConnection, WebSocketConnection, WebSocketTransport, connect,
};

use std::fmt;

/// Identifies one link for as long as it is open.
///
/// Socket links number upwards from 1. In-process links number downwards
/// from `u64::MAX`, so both kinds can be registered side by side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }

    /// Whether the id came from the upper half, where in-process links live.
    pub fn is_in_process(self) -> bool {
        self.0 > u64::MAX / 2
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_in_process() {
            write!(f, "mem-{}", u64::MAX - self.0)
        } else {
            write!(f, "conn-{}", self.0)
        }
    }
}

/// Hands out incoming links.
pub trait Transport: Send + Sync + 'static {
    type Connection: Connection;
    type Error: std::error::Error + Send + Sync;

    /// Waits for the next game server to connect.
    async fn accept(&mut self) -> Result<Self::Connection, Self::Error>;

    /// Stops accepting. Links already handed out keep working.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}

/// One open link carrying whole frames.
///
/// `send` and `recv` may run concurrently from different tasks: a reader
/// parked in `recv` never blocks a writer.
pub trait Connection: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync;

    async fn send(&self, frame: &[u8]) -> Result<(), Self::Error>;

    /// Next frame from the peer, or `Ok(None)` once the peer has closed.
    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error>;

    async fn close(&self) -> Result<(), Self::Error>;

    fn id(&self) -> ConnectionId;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_id_display_socket_link() {
        assert_eq!(ConnectionId::new(7).to_string(), "conn-7");
        assert!(!ConnectionId::new(7).is_in_process());
    }

    #[test]
    fn test_connection_id_display_in_process_link() {
        let id = ConnectionId::new(u64::MAX - 2);
        assert!(id.is_in_process());
        assert_eq!(id.to_string(), "mem-2");
        assert_eq!(id.get(), u64::MAX - 2);
    }

    #[test]
    fn test_connect_error_display_names_url() {
        let err = TransportError::ConnectFailed {
            url: "ws://127.0.0.1:1".into(),
            source: std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused"),
        };
        assert_eq!(err.to_string(), "connect to ws://127.0.0.1:1 failed: refused");
    }
}
