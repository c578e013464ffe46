//! Error types for the proxy.

use relaychat_protocol::ProtocolError;
use relaychat_transport::TransportError;

/// Errors that end one downstream connection, or stop the proxy from
/// starting. Routing problems are never errors; those frames are dropped.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The downstream did not introduce itself in time.
    #[error("no SERVER_HELLO within {0:?}")]
    HelloTimeout(std::time::Duration),

    /// The first frame from a downstream was something other than a hello.
    #[error("expected SERVER_HELLO, got {0}")]
    ExpectedHello(String),

    /// The downstream hung up before saying hello.
    #[error("connection closed before SERVER_HELLO")]
    ClosedBeforeHello,
}
