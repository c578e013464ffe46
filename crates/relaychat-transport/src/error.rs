use std::io;
use std::net::SocketAddr;

/// Link-level failures. None of them are fatal to the process; callers
/// drop the link and, on the game server side, dial again.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("cannot listen: {0}")]
    Bind(#[source] io::Error),

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    /// A TCP client connected but never completed the WebSocket upgrade.
    #[error("handshake with {peer} failed: {source}")]
    Handshake {
        peer: SocketAddr,
        #[source]
        source: io::Error,
    },

    #[error("connect to {url} failed: {source}")]
    ConnectFailed {
        url: String,
        #[source]
        source: io::Error,
    },

    #[error("send failed: {0}")]
    SendFailed(#[source] io::Error),

    #[error("receive failed: {0}")]
    ReceiveFailed(#[source] io::Error),

    /// The other end of the link is gone.
    #[error("link closed: {0}")]
    ConnectionClosed(String),

    #[error("transport shut down")]
    Shutdown,
}
