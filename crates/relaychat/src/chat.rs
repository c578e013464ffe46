//! Global chat and notices.

use std::sync::Arc;

use relaychat_messenger::{ChatMessenger, MessengerError, SharedMessenger};
use relaychat_protocol::{GlobalChatEnvelope, NoticeEnvelope};
use relaychat_session::{ChatMode, ChatModeStore, MessageSink, PlayerDirectory, PlayerRef};

use crate::ChatFormatter;

/// What happened to one global chat line or notice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Broadcast {
    /// Local players the line was delivered to.
    pub local_recipients: usize,
    /// Whether the line was handed to the transport for other servers.
    pub relayed: bool,
}

/// Where a plain chat line should go, per the sender's chat mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRoute {
    /// Sent as global chat.
    Global(Broadcast),
    /// Proximity chat; the host delivers it to nearby players.
    Distance,
}

/// Sends global chat and notices, and shows the ones other servers send.
pub struct GlobalChatService {
    messenger: SharedMessenger,
    players: Arc<dyn PlayerDirectory>,
    sink: Arc<dyn MessageSink>,
    formatter: Arc<dyn ChatFormatter>,
    modes: Arc<ChatModeStore>,
}

impl GlobalChatService {
    pub fn new(
        messenger: SharedMessenger,
        players: Arc<dyn PlayerDirectory>,
        sink: Arc<dyn MessageSink>,
        formatter: Arc<dyn ChatFormatter>,
        modes: Arc<ChatModeStore>,
    ) -> Self {
        Self {
            messenger,
            players,
            sink,
            formatter,
            modes,
        }
    }

    /// Sends `text` as global chat: every local player sees it, and other
    /// servers get it when a transport is enabled.
    pub fn send(&self, sender: &PlayerRef, text: &str) -> Broadcast {
        let identity = self.messenger.identity();
        let line = self.formatter.global_chat(
            &identity.display_name,
            &sender.name,
            &sender.display_name,
            text,
        );
        let local_recipients = self.deliver_to_all(&line);

        let relayed = self.relay(|| {
            self.messenger
                .broadcast_global_chat(sender.id, &sender.display_name, text)
        });
        Broadcast {
            local_recipients,
            relayed,
        }
    }

    /// Sends a server notice, same shape as global chat.
    pub fn send_notice(&self, sender_name: &str, text: &str) -> Broadcast {
        let line = self.formatter.notice(sender_name, text);
        let local_recipients = self.deliver_to_all(&line);
        let relayed = self.relay(|| self.messenger.broadcast_notice(sender_name, text));
        Broadcast {
            local_recipients,
            relayed,
        }
    }

    /// Sends a plain chat line according to the sender's chat mode.
    pub fn route_chat(&self, sender: &PlayerRef, text: &str) -> ChatRoute {
        match self.modes.get(sender.id) {
            ChatMode::Global => ChatRoute::Global(self.send(sender, text)),
            ChatMode::Distance => ChatRoute::Distance,
        }
    }

    /// Renders a proximity chat line for the host to deliver.
    pub fn format_distance(&self, sender: &PlayerRef, text: &str) -> String {
        self.formatter
            .distance_chat(&sender.name, &sender.display_name, text)
    }

    /// Shows global chat from another server. This server's own echoes
    /// are ignored.
    pub fn handle_remote(&self, envelope: &GlobalChatEnvelope) -> usize {
        if envelope.origin_server_id() == &self.messenger.identity().id {
            return 0;
        }
        // Remote lines only carry one name, so it fills both slots.
        let line = self.formatter.global_chat(
            envelope.origin_server_display_name(),
            envelope.player_name(),
            envelope.player_name(),
            envelope.text(),
        );
        self.deliver_to_all(&line)
    }

    /// Shows a notice from another server. Echoes are ignored.
    pub fn handle_remote_notice(&self, envelope: &NoticeEnvelope) -> usize {
        if envelope.origin_server_id() == &self.messenger.identity().id {
            return 0;
        }
        let line = self.formatter.notice(envelope.sender_name(), envelope.text());
        self.deliver_to_all(&line)
    }

    fn deliver_to_all(&self, line: &str) -> usize {
        let players = self.players.online_players();
        for player in &players {
            self.sink.deliver(player.id, line);
        }
        players.len()
    }

    fn relay(&self, publish: impl FnOnce() -> Result<(), MessengerError>) -> bool {
        if !self.messenger.mode().is_enabled() {
            return false;
        }
        match publish() {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "chat line not relayed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use relaychat_messenger::DisabledMessenger;
    use relaychat_protocol::{PlayerId, ServerIdentity};
    use relaychat_session::{CollectingSink, InMemoryDirectory};

    use super::*;
    use crate::PlainFormatter;

    struct Fixture {
        service: GlobalChatService,
        sink: Arc<CollectingSink>,
        modes: Arc<ChatModeStore>,
        ann: PlayerRef,
        bob: PlayerRef,
    }

    fn fixture() -> Fixture {
        let players = Arc::new(InMemoryDirectory::new());
        let ann = PlayerRef::new(PlayerId::random(), "ann", "Annie");
        let bob = PlayerRef::new(PlayerId::random(), "bob", "Bob");
        players.join(ann.clone());
        players.join(bob.clone());
        let sink = Arc::new(CollectingSink::new());
        let modes = Arc::new(ChatModeStore::new(ChatMode::Distance));
        let service = GlobalChatService::new(
            Arc::new(DisabledMessenger::new("Lobby")),
            players,
            sink.clone(),
            Arc::new(PlainFormatter::default()),
            modes.clone(),
        );
        Fixture {
            service,
            sink,
            modes,
            ann,
            bob,
        }
    }

    #[test]
    fn test_send_delivers_locally_without_relay_when_disabled() {
        let f = fixture();
        let outcome = f.service.send(&f.ann, "hello");

        assert_eq!(
            outcome,
            Broadcast {
                local_recipients: 2,
                relayed: false
            }
        );
        assert_eq!(f.sink.lines_for(f.bob.id), vec!["[Global] [Lobby] Annie: hello"]);
    }

    #[test]
    fn test_handle_remote_ignores_own_echo() {
        let f = fixture();
        let own = GlobalChatEnvelope::new(&ServerIdentity::local("Lobby"), f.ann.id, "Annie", "x");
        assert_eq!(f.service.handle_remote(&own), 0);
        assert!(f.sink.is_empty());
    }

    #[test]
    fn test_handle_remote_shows_origin_server_name() {
        let f = fixture();
        let remote = GlobalChatEnvelope::new(
            &ServerIdentity::new("s2", "Survival"),
            PlayerId::random(),
            "Cid",
            "hi from afar",
        );
        assert_eq!(f.service.handle_remote(&remote), 2);
        assert_eq!(
            f.sink.lines_for(f.ann.id),
            vec!["[Global] [Survival] Cid: hi from afar"]
        );
    }

    #[test]
    fn test_handle_remote_notice_ignores_own_echo() {
        let f = fixture();
        let own = NoticeEnvelope::new(&ServerIdentity::local("Lobby"), "Console", "restart");
        let remote = NoticeEnvelope::new(&ServerIdentity::new("s2", "Survival"), "Console", "restart");

        assert_eq!(f.service.handle_remote_notice(&own), 0);
        assert_eq!(f.service.handle_remote_notice(&remote), 2);
        assert_eq!(f.sink.lines_for(f.bob.id), vec!["[Notice] Console: restart"]);
    }

    #[test]
    fn test_route_chat_follows_chat_mode() {
        let f = fixture();
        assert_eq!(f.service.route_chat(&f.ann, "near"), ChatRoute::Distance);
        assert!(f.sink.is_empty());

        f.modes.set(f.ann.id, ChatMode::Global);
        assert!(matches!(f.service.route_chat(&f.ann, "far"), ChatRoute::Global(_)));
        assert_eq!(f.sink.len(), 2);
    }

    #[test]
    fn test_format_distance_uses_display_name() {
        let f = fixture();
        assert_eq!(f.service.format_distance(&f.ann, "psst"), "[Nearby] Annie: psst");
    }
}
