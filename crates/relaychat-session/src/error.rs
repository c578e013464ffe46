//! Error types for the session layer.

/// Failure to reach a player lookup service.
///
/// Returned when the host tries to provide a
/// [`NetworkDirectory`](crate::NetworkDirectory) and the backing service
/// is not installed or not answering. The node keeps working without
/// network lookups.
#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    /// The lookup service is not available on this server.
    #[error("player lookup unavailable: {0}")]
    Unavailable(String),
}

/// A chat mode string that names neither mode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown chat mode: {0}")]
pub struct UnknownChatMode(pub String);
