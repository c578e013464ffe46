//! The [`ChatMessenger`] trait: one interface over every transport mode.

use std::sync::Arc;

use relaychat_protocol::{
    Envelope, GlobalChatEnvelope, NoticeEnvelope, PlayerId, ServerId, ServerIdentity,
    TransportMode, WhisperAckEnvelope, WhisperEnvelope,
};

use crate::{InboundQueue, MessengerError, MessengerState};

/// A messenger shared between orchestrators.
pub type SharedMessenger = Arc<dyn ChatMessenger>;

/// Carries envelopes between this server and the rest of the fleet.
///
/// Sends never block: implementations queue the frame for a background
/// task and return. An `Err` means the envelope was not handed off; the
/// caller logs it and carries on.
///
/// # Lifecycle
///
/// `initialize()` opens links and starts consumers, exactly once. It must
/// run inside a Tokio runtime for transports with background work.
/// `shutdown()` may be called at any point, any number of times.
pub trait ChatMessenger: Send + Sync + 'static {
    fn mode(&self) -> TransportMode;

    /// Who this server is. Constant for the process lifetime.
    fn identity(&self) -> &ServerIdentity;

    fn state(&self) -> MessengerState;

    /// Starts background work. Decoded inbound envelopes go to `inbound`.
    ///
    /// # Errors
    /// [`MessengerError::InvalidState`] on a second call. Other failures
    /// leave the messenger shut down.
    fn initialize(&self, inbound: InboundQueue) -> Result<(), MessengerError>;

    /// Stops background work and releases links.
    fn shutdown(&self);

    /// Hands an envelope to the transport.
    fn publish(&self, envelope: Envelope) -> Result<(), MessengerError>;

    /// A player connected to this server.
    fn player_joined(&self, _name: &str, _display_name: &str) {}

    /// A player disconnected from this server.
    fn player_left(&self, _name: &str) {}

    fn broadcast_global_chat(
        &self,
        player_id: PlayerId,
        player_name: &str,
        text: &str,
    ) -> Result<(), MessengerError> {
        let envelope = GlobalChatEnvelope::new(self.identity(), player_id, player_name, text);
        self.publish(envelope.into())
    }

    fn broadcast_notice(&self, sender_name: &str, text: &str) -> Result<(), MessengerError> {
        self.publish(NoticeEnvelope::new(self.identity(), sender_name, text).into())
    }

    fn send_whisper(
        &self,
        sender_id: PlayerId,
        sender_name: &str,
        target_name: &str,
        text: &str,
    ) -> Result<(), MessengerError> {
        let envelope =
            WhisperEnvelope::new(self.identity(), sender_id, sender_name, target_name, text);
        self.publish(envelope.into())
    }

    /// Confirms delivery of a whisper back to its sender's server.
    fn send_whisper_ack(
        &self,
        target_id: PlayerId,
        success: bool,
        target_server_id: Option<ServerId>,
    ) -> Result<(), MessengerError> {
        self.publish(WhisperAckEnvelope::new(target_id, success, target_server_id).into())
    }
}
