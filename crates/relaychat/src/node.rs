//! `ChatNode` builder and the glue between transport and orchestrators.
//!
//! A node is everything one game server runs: a messenger for the
//! configured transport mode, the global chat and whisper services, and
//! the per-player stores they share. Inbound envelopes are queued by the
//! messenger and only reach the services when the host calls
//! [`ChatNode::pump`] on its main thread.

use std::sync::Arc;

use relaychat_messenger::{
    BrokerStreamMessenger, ChatMessenger, DisabledMessenger, InboundHandler,
    MainThreadDispatcher, ProcessRelayMessenger, SharedMessenger, StreamBroker, inbound_queue,
};
use relaychat_protocol::{
    GlobalChatEnvelope, NoticeEnvelope, PlayerId, ServerIdentity, TransportMode,
    WhisperAckEnvelope, WhisperEnvelope,
};
use relaychat_session::{
    ChatMode, ChatModeStore, LookupError, MessageSink, NetworkDirectory, PlayerDirectory,
    PlayerRef, ReplyTracker,
};

use crate::{
    Broadcast, BrokerConfig, ChatFormatter, ChatRoute, GlobalChatService, NodeConfig,
    PlainFormatter, RelaychatError, WhisperOutcome, WhisperService,
};

type BrokerFactory = Box<dyn FnOnce(ServerIdentity, &BrokerConfig) -> SharedMessenger + Send>;

/// Builder for a [`ChatNode`].
///
/// The host supplies its player list and a way to show text to players;
/// everything else has a default taken from the [`NodeConfig`].
///
/// # Example
///
/// ```rust,ignore
/// use relaychat::prelude::*;
///
/// let mut node = ChatNode::builder(config)
///     .players(directory.clone())
///     .sink(chat_output)
///     .build()?;
///
/// node.player_joined(&ann);
/// node.whisper(&ann, "bob", "hi");
/// node.pump();
/// ```
pub struct ChatNodeBuilder {
    config: NodeConfig,
    players: Option<Arc<dyn PlayerDirectory>>,
    sink: Option<Arc<dyn MessageSink>>,
    network: Option<Arc<dyn NetworkDirectory>>,
    formatter: Option<Arc<dyn ChatFormatter>>,
    messenger: Option<SharedMessenger>,
    broker: Option<BrokerFactory>,
}

impl ChatNodeBuilder {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            players: None,
            sink: None,
            network: None,
            formatter: None,
            messenger: None,
            broker: None,
        }
    }

    /// Who is online on this server. Required.
    pub fn players(mut self, players: Arc<dyn PlayerDirectory>) -> Self {
        self.players = Some(players);
        self
    }

    /// Where rendered lines go. Required.
    pub fn sink(mut self, sink: Arc<dyn MessageSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Network-wide lookup used to reject whispers to nobody before they
    /// leave this server. When the lookup could not be set up, remote
    /// whispers are sent unchecked.
    pub fn network_directory(
        mut self,
        network: Result<Arc<dyn NetworkDirectory>, LookupError>,
    ) -> Self {
        match network {
            Ok(network) => self.network = Some(network),
            Err(e) => {
                tracing::warn!(error = %e, "network lookup unavailable, remote whispers unchecked");
                self.network = None;
            }
        }
        self
    }

    /// Overrides the formatter built from the configured templates.
    pub fn formatter(mut self, formatter: Arc<dyn ChatFormatter>) -> Self {
        self.formatter = Some(formatter);
        self
    }

    /// Uses `messenger` instead of building one from the transport mode.
    pub fn messenger(mut self, messenger: SharedMessenger) -> Self {
        self.messenger = Some(messenger);
        self
    }

    /// The broker to use in [`TransportMode::BrokerStream`].
    pub fn broker<B: StreamBroker>(mut self, broker: Arc<B>) -> Self {
        self.broker = Some(Box::new(move |identity: ServerIdentity, config: &BrokerConfig| {
            let messenger = BrokerStreamMessenger::new(identity, broker, config.stream_names())
                .with_settings(config.settings());
            Arc::new(messenger) as SharedMessenger
        }));
        self
    }

    /// Creates the messenger, starts it, and wires inbound envelopes to
    /// the services.
    ///
    /// Must run inside a Tokio runtime unless the mode is
    /// [`TransportMode::Disabled`].
    ///
    /// # Errors
    /// [`RelaychatError::Config`] if players or sink are missing, or the
    /// mode is broker-stream without a broker.
    /// [`RelaychatError::Messenger`] if the messenger fails to start.
    pub fn build(self) -> Result<ChatNode, RelaychatError> {
        let players = self
            .players
            .ok_or_else(|| RelaychatError::Config("no player directory".into()))?;
        let sink = self
            .sink
            .ok_or_else(|| RelaychatError::Config("no message sink".into()))?;
        let formatter = self
            .formatter
            .unwrap_or_else(|| Arc::new(PlainFormatter::new(self.config.messages.clone())));

        let messenger = match self.messenger {
            Some(messenger) => messenger,
            None => create_messenger(&self.config, self.broker)?,
        };

        let modes = Arc::new(ChatModeStore::new(self.config.default_chat_mode));
        let tracker = Arc::new(ReplyTracker::new());
        let chat = Arc::new(GlobalChatService::new(
            messenger.clone(),
            players.clone(),
            sink.clone(),
            formatter.clone(),
            modes.clone(),
        ));
        let whisper = Arc::new(WhisperService::new(
            messenger.clone(),
            players,
            self.network,
            sink,
            formatter,
            tracker.clone(),
        ));

        let (queue, mut dispatcher) = inbound_queue();
        dispatcher.subscriptions_mut().subscribe_all(Arc::new(NodeHandler {
            chat: chat.clone(),
            whisper: whisper.clone(),
        }));
        messenger.initialize(queue)?;

        let identity = messenger.identity();
        tracing::info!(
            server_id = %identity.id,
            server = %identity.display_name,
            mode = %messenger.mode(),
            "chat node started"
        );

        Ok(ChatNode {
            messenger,
            chat,
            whisper,
            modes,
            tracker,
            dispatcher,
        })
    }
}

fn create_messenger(
    config: &NodeConfig,
    broker: Option<BrokerFactory>,
) -> Result<SharedMessenger, RelaychatError> {
    let identity = config.identity();
    let messenger: SharedMessenger = match config.mode {
        TransportMode::Disabled => Arc::new(DisabledMessenger::new(identity.display_name)),
        TransportMode::ProcessRelay => {
            Arc::new(ProcessRelayMessenger::new(identity, config.relay.link()))
        }
        TransportMode::BrokerStream => {
            let factory = broker.ok_or_else(|| {
                RelaychatError::Config("broker-stream mode needs a broker".into())
            })?;
            factory(identity, &config.broker)
        }
    };
    Ok(messenger)
}

/// Routes dispatched envelopes to the services.
struct NodeHandler {
    chat: Arc<GlobalChatService>,
    whisper: Arc<WhisperService>,
}

impl InboundHandler for NodeHandler {
    fn on_global_chat(&self, envelope: &GlobalChatEnvelope) {
        self.chat.handle_remote(envelope);
    }

    fn on_notice(&self, envelope: &NoticeEnvelope) {
        self.chat.handle_remote_notice(envelope);
    }

    fn on_whisper(&self, envelope: &WhisperEnvelope) {
        self.whisper.handle_remote(envelope);
    }

    fn on_whisper_ack(&self, envelope: &WhisperAckEnvelope) {
        self.whisper.handle_ack(envelope);
    }

    fn on_whisper_not_found(&self, sender_id: PlayerId, target_name: &str) {
        self.whisper.handle_not_found(sender_id, target_name);
    }
}

/// Chat for one game server.
///
/// Every method is meant for the host's main thread. Nothing arriving
/// from other servers is shown until [`pump`](Self::pump) runs.
pub struct ChatNode {
    messenger: SharedMessenger,
    chat: Arc<GlobalChatService>,
    whisper: Arc<WhisperService>,
    modes: Arc<ChatModeStore>,
    tracker: Arc<ReplyTracker>,
    dispatcher: MainThreadDispatcher,
}

impl ChatNode {
    pub fn builder(config: NodeConfig) -> ChatNodeBuilder {
        ChatNodeBuilder::new(config)
    }

    pub fn identity(&self) -> &ServerIdentity {
        self.messenger.identity()
    }

    pub fn mode(&self) -> TransportMode {
        self.messenger.mode()
    }

    pub fn messenger(&self) -> &SharedMessenger {
        &self.messenger
    }

    pub fn chat(&self) -> &GlobalChatService {
        &self.chat
    }

    pub fn whisper_service(&self) -> &WhisperService {
        &self.whisper
    }

    pub fn modes(&self) -> &ChatModeStore {
        &self.modes
    }

    pub fn tracker(&self) -> &ReplyTracker {
        &self.tracker
    }

    /// Call after the host adds `player` to its player list.
    pub fn player_joined(&self, player: &PlayerRef) {
        self.messenger
            .player_joined(&player.name, &player.display_name);
    }

    /// Call when `player` disconnects. Forgets their reply target and
    /// chat mode.
    pub fn player_left(&self, player: &PlayerRef) {
        self.whisper.clear_player(player.id);
        self.modes.reset(player.id);
        self.messenger.player_left(&player.name);
    }

    /// Sends a plain chat line according to the player's chat mode.
    pub fn route_chat(&self, sender: &PlayerRef, text: &str) -> ChatRoute {
        self.chat.route_chat(sender, text)
    }

    pub fn send_global(&self, sender: &PlayerRef, text: &str) -> Broadcast {
        self.chat.send(sender, text)
    }

    pub fn send_notice(&self, sender_name: &str, text: &str) -> Broadcast {
        self.chat.send_notice(sender_name, text)
    }

    pub fn toggle_chat_mode(&self, player: &PlayerRef) -> ChatMode {
        self.modes.toggle(player.id)
    }

    pub fn whisper(&self, sender: &PlayerRef, target_name: &str, text: &str) -> WhisperOutcome {
        self.whisper.send(sender, target_name, text)
    }

    pub fn reply(&self, sender: &PlayerRef, text: &str) -> WhisperOutcome {
        self.whisper.reply(sender, text)
    }

    /// Handles every envelope received so far. Returns how many were
    /// dispatched.
    pub fn pump(&mut self) -> usize {
        self.dispatcher.pump()
    }

    /// Stops the messenger. Envelopes already queued can still be pumped.
    pub fn shutdown(&self) {
        tracing::info!(server_id = %self.identity().id, "chat node stopping");
        self.messenger.shutdown();
    }
}
