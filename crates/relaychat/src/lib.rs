//! # Relaychat
//!
//! Cross-server chat and whispers for a fleet of game servers.
//!
//! Each game server runs one [`ChatNode`]. Global chat, notices and
//! whispers reach players on other servers through the configured
//! transport: the relay proxy ([`relaychat_proxy`]) or a shared stream
//! broker. With the transport disabled, the same node gives single-server
//! chat.
//!
//! ```text
//! ChatNode ── GlobalChatService ──┐
//!          └─ WhisperService ─────┴─→ ChatMessenger ──→ proxy / broker
//!                                        │
//!                 pump() ←── InboundQueue ┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use relaychat::prelude::*;
//!
//! # fn main() -> Result<(), RelaychatError> {
//! let players = Arc::new(InMemoryDirectory::new());
//! let sink = Arc::new(CollectingSink::new());
//! let ann = PlayerRef::new(PlayerId::random(), "ann", "Ann");
//! players.join(ann.clone());
//!
//! let mut node = ChatNode::builder(NodeConfig::default())
//!     .players(players)
//!     .sink(sink)
//!     .build()?;
//! node.player_joined(&ann);
//! node.send_global(&ann, "hello");
//! node.pump();
//! # Ok(())
//! # }
//! ```

mod chat;
mod config;
mod error;
mod format;
mod node;
mod whisper;

pub use chat::{Broadcast, ChatRoute, GlobalChatService};
pub use config::{BrokerConfig, NodeConfig, RelayConfig};
pub use error::RelaychatError;
pub use format::{ChatFormatter, MessageTemplates, PlainFormatter};
pub use node::{ChatNode, ChatNodeBuilder};
pub use whisper::{WhisperOutcome, WhisperService};

pub mod prelude {
    pub use crate::{
        Broadcast, ChatFormatter, ChatNode, ChatNodeBuilder, ChatRoute, MessageTemplates,
        NodeConfig, PlainFormatter, RelaychatError, WhisperOutcome,
    };
    pub use relaychat_messenger::{ChatMessenger, MemoryBroker, SharedMessenger};
    pub use relaychat_protocol::{PlayerId, ServerId, ServerIdentity, TransportMode};
    pub use relaychat_proxy::{ProxyConfig, ProxyServer};
    pub use relaychat_session::{
        ChatMode, CollectingSink, InMemoryDirectory, MessageSink, NetworkDirectory,
        PlayerDirectory, PlayerRef,
    };
}
