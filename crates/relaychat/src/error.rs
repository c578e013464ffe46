//! Unified error type for relaychat.

use relaychat_messenger::{BrokerError, MessengerError};
use relaychat_protocol::ProtocolError;
use relaychat_proxy::ProxyError;
use relaychat_session::LookupError;
use relaychat_transport::TransportError;

/// Top-level error that wraps every crate-specific error.
///
/// `#[from]` on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum RelaychatError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Messenger(#[from] MessengerError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Lookup(#[from] LookupError),

    #[error(transparent)]
    Proxy(#[from] ProxyError),

    /// The node was built without something it cannot run without.
    #[error("invalid node configuration: {0}")]
    Config(String),
}
