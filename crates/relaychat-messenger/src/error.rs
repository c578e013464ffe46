//! Error types for the messenger layer.

use relaychat_protocol::ProtocolError;
use relaychat_transport::TransportError;

use crate::{BrokerError, MessengerState};

/// Errors a [`ChatMessenger`](crate::ChatMessenger) can report.
///
/// None of these are fatal to the host. A failed send means the message
/// was not delivered, nothing more.
#[derive(Debug, thiserror::Error)]
pub enum MessengerError {
    /// The operation is not allowed in the messenger's current state,
    /// e.g. a second `initialize()` or a send after `shutdown()`.
    #[error("cannot {action} while messenger is {state}")]
    InvalidState {
        state: MessengerState,
        action: &'static str,
    },

    /// Process relay needs at least one connected player to carry frames.
    #[error("no connected player to carry relay frames")]
    NoCarrier,

    /// `initialize()` was called outside a Tokio runtime.
    #[error("no tokio runtime available for background tasks")]
    NoRuntime,

    /// The relay link task has gone away.
    #[error("relay link closed")]
    LinkClosed,

    /// The relay link could not be opened.
    #[error("relay link unavailable: {0}")]
    LinkUnavailable(String),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}
