//! Whispers and replies, on one server or across the network.
//!
//! ```text
//! send(sender, "bob", text)
//!   ├─ "bob" is the sender          → ToSelf
//!   ├─ bob is online here           → deliver to both, Success
//!   ├─ transport enabled
//!   │    ├─ network says no bob     → NotFound
//!   │    └─ otherwise               → publish WHISPER, SentRemote
//!   └─ otherwise                    → NotFound
//! ```

use std::sync::Arc;

use relaychat_messenger::{ChatMessenger, SharedMessenger};
use relaychat_protocol::{PlayerId, WhisperAckEnvelope, WhisperEnvelope};
use relaychat_session::{
    MessageSink, NetworkDirectory, PartnerLocation, PlayerDirectory, PlayerRef, ReplyTarget,
    ReplyTracker,
};

use crate::ChatFormatter;

/// Result of a whisper or reply attempt. The sender has already been told.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhisperOutcome {
    /// Delivered to a player on this server.
    Success,
    /// Handed to the transport for another server.
    SentRemote,
    NotFound,
    /// `/r` with nobody to reply to.
    NoTarget,
    /// The sender tried to whisper themselves.
    ToSelf,
}

/// Routes whispers and keeps reply targets current.
pub struct WhisperService {
    messenger: SharedMessenger,
    players: Arc<dyn PlayerDirectory>,
    network: Option<Arc<dyn NetworkDirectory>>,
    sink: Arc<dyn MessageSink>,
    formatter: Arc<dyn ChatFormatter>,
    tracker: Arc<ReplyTracker>,
}

impl WhisperService {
    pub fn new(
        messenger: SharedMessenger,
        players: Arc<dyn PlayerDirectory>,
        network: Option<Arc<dyn NetworkDirectory>>,
        sink: Arc<dyn MessageSink>,
        formatter: Arc<dyn ChatFormatter>,
        tracker: Arc<ReplyTracker>,
    ) -> Self {
        Self {
            messenger,
            players,
            network,
            sink,
            formatter,
            tracker,
        }
    }

    /// Whispers `text` from `sender` to the player called `target_name`.
    pub fn send(&self, sender: &PlayerRef, target_name: &str, text: &str) -> WhisperOutcome {
        if sender.matches(target_name) {
            self.sink.deliver(sender.id, &self.formatter.whisper_self());
            return WhisperOutcome::ToSelf;
        }

        if let Some(target) = self.players.find_local(target_name) {
            self.deliver_local(sender, &target, text);
            return WhisperOutcome::Success;
        }

        if !self.messenger.mode().is_enabled() {
            return self.not_found(sender.id, target_name);
        }

        if let Some(network) = &self.network {
            if network.find_network(target_name).is_none() {
                return self.not_found(sender.id, target_name);
            }
        }

        self.send_remote(sender, target_name, text);
        WhisperOutcome::SentRemote
    }

    /// Whispers `text` to `sender`'s last whisper partner.
    pub fn reply(&self, sender: &PlayerRef, text: &str) -> WhisperOutcome {
        let Some(target) = self.tracker.get_target(sender.id) else {
            self.sink.deliver(sender.id, &self.formatter.no_reply_target());
            return WhisperOutcome::NoTarget;
        };

        match target.location() {
            PartnerLocation::Local => match self.players.find_local_by_id(target.partner_id()) {
                Some(partner) => {
                    self.deliver_local(sender, &partner, text);
                    WhisperOutcome::Success
                }
                None => self.not_found(sender.id, target.partner_name()),
            },
            PartnerLocation::Remote { .. } if self.messenger.mode().is_enabled() => {
                self.send_remote(sender, target.partner_name(), text);
                WhisperOutcome::SentRemote
            }
            PartnerLocation::Remote { .. } => self.not_found(sender.id, target.partner_name()),
        }
    }

    /// Delivers a whisper that arrived from another server. Whispers for
    /// players who are not here are dropped.
    pub fn handle_remote(&self, envelope: &WhisperEnvelope) -> bool {
        let Some(target) = self.players.find_local(envelope.target_name()) else {
            tracing::debug!(
                target_name = envelope.target_name(),
                origin = %envelope.origin_server_id(),
                "whisper target not on this server"
            );
            return false;
        };

        // Only the sender's display name travels, so it fills both slots.
        let line = self.formatter.whisper_received(
            envelope.sender_name(),
            envelope.sender_name(),
            envelope.text(),
        );
        self.sink.deliver(target.id, &line);

        self.tracker.set_target(
            target.id,
            ReplyTarget::remote(
                envelope.sender_id(),
                envelope.sender_name(),
                Some(envelope.origin_server_id().clone()),
            ),
        );

        if self.messenger.mode().is_enabled() {
            if let Err(e) = self.messenger.send_whisper_ack(
                envelope.sender_id(),
                true,
                Some(envelope.origin_server_id().clone()),
            ) {
                tracing::debug!(error = %e, "whisper ack not sent");
            }
        }
        true
    }

    /// Tells a local sender that their remote whisper found nobody.
    pub fn handle_not_found(&self, sender_id: PlayerId, target_name: &str) -> bool {
        match self.players.find_local_by_id(sender_id) {
            Some(sender) => {
                self.sink
                    .deliver(sender.id, &self.formatter.player_not_found(target_name));
                true
            }
            None => false,
        }
    }

    pub fn handle_ack(&self, envelope: &WhisperAckEnvelope) {
        tracing::debug!(
            target_id = %envelope.target_id(),
            success = envelope.success(),
            "whisper delivery confirmed"
        );
    }

    /// Forgets the reply target of a player who left.
    pub fn clear_player(&self, player: PlayerId) {
        self.tracker.clear(player);
    }

    fn deliver_local(&self, sender: &PlayerRef, target: &PlayerRef, text: &str) {
        self.sink.deliver(
            sender.id,
            &self
                .formatter
                .whisper_sent(&target.name, &target.display_name, text),
        );
        self.sink.deliver(
            target.id,
            &self
                .formatter
                .whisper_received(&sender.name, &sender.display_name, text),
        );

        self.tracker
            .set_target(target.id, ReplyTarget::local(sender.id, &sender.name));
        self.tracker
            .set_target(sender.id, ReplyTarget::local(target.id, &target.name));
    }

    fn send_remote(&self, sender: &PlayerRef, target_name: &str, text: &str) {
        if let Err(e) =
            self.messenger
                .send_whisper(sender.id, &sender.display_name, target_name, text)
        {
            tracing::warn!(sender = %sender.id, target_name, error = %e, "remote whisper not sent");
        }

        self.sink.deliver(
            sender.id,
            &self.formatter.whisper_sent(target_name, target_name, text),
        );
        self.tracker.set_target(
            sender.id,
            ReplyTarget::remote(PlayerId::UNKNOWN, target_name, None),
        );
    }

    fn not_found(&self, sender: PlayerId, target_name: &str) -> WhisperOutcome {
        self.sink
            .deliver(sender, &self.formatter.player_not_found(target_name));
        WhisperOutcome::NotFound
    }
}
