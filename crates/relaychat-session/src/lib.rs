//! Per-player state and host collaborators for relaychat.
//!
//! Everything a chat node remembers about a player lives here:
//!
//! 1. **Reply targets**: who a player last whispered with ([`ReplyTracker`])
//! 2. **Chat modes**: whether plain chat goes to nearby players or the
//!    whole network ([`ChatModeStore`])
//!
//! The crate also defines the traits through which the node sees the host
//! game server ([`PlayerDirectory`], [`NetworkDirectory`], [`MessageSink`]).
//! Both stores are concurrent maps, so they can be shared by `Arc` between
//! the main thread and background tasks without extra locking.
//!
//! ```text
//! Orchestrators (relaychat)  ← read and write per-player state
//!     ↕
//! Session layer (this crate)  ← ReplyTracker, ChatModeStore, host traits
//!     ↕
//! Protocol layer  ← PlayerId, ServerId
//! ```

mod directory;
mod error;
mod mode;
mod tracker;

pub use directory::{
    CollectingSink, InMemoryDirectory, MessageSink, NetworkDirectory, NetworkPlayer,
    PlayerDirectory, PlayerRef,
};
pub use error::{LookupError, UnknownChatMode};
pub use mode::{ChatMode, ChatModeStore};
pub use tracker::{PartnerLocation, ReplyTarget, ReplyTracker};
