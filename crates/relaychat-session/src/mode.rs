//! Per-player chat mode.

use std::fmt;
use std::str::FromStr;

use dashmap::DashMap;
use relaychat_protocol::PlayerId;
use serde::{Deserialize, Serialize};

use crate::UnknownChatMode;

/// Where a player's plain chat lines go.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChatMode {
    /// Players within range on the same server. Delivery is up to the host.
    #[default]
    Distance,
    /// Every server in the network.
    Global,
}

impl ChatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Distance => "distance",
            Self::Global => "global",
        }
    }

    /// The other mode.
    pub fn toggled(self) -> Self {
        match self {
            Self::Distance => Self::Global,
            Self::Global => Self::Distance,
        }
    }
}

impl FromStr for ChatMode {
    type Err = UnknownChatMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "distance" | "거리" => Ok(Self::Distance),
            "global" | "전체" => Ok(Self::Global),
            _ => Err(UnknownChatMode(s.to_string())),
        }
    }
}

/// Lenient conversion for configuration: unknown strings select
/// [`ChatMode::Distance`].
impl From<String> for ChatMode {
    fn from(s: String) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl From<ChatMode> for String {
    fn from(mode: ChatMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chat mode of every player who changed it from the default.
///
/// Players without an entry use the store's default mode, so resetting a
/// player is just removing the entry.
#[derive(Debug, Default)]
pub struct ChatModeStore {
    default_mode: ChatMode,
    modes: DashMap<PlayerId, ChatMode>,
}

impl ChatModeStore {
    pub fn new(default_mode: ChatMode) -> Self {
        Self {
            default_mode,
            modes: DashMap::new(),
        }
    }

    pub fn default_mode(&self) -> ChatMode {
        self.default_mode
    }

    pub fn get(&self, player: PlayerId) -> ChatMode {
        self.modes
            .get(&player)
            .map(|mode| *mode)
            .unwrap_or(self.default_mode)
    }

    pub fn set(&self, player: PlayerId, mode: ChatMode) {
        self.modes.insert(player, mode);
    }

    /// Flips the player's mode and returns the new one.
    pub fn toggle(&self, player: PlayerId) -> ChatMode {
        let default_mode = self.default_mode;
        let mut entry = self.modes.entry(player).or_insert(default_mode);
        *entry = entry.toggled();
        *entry
    }

    /// Drops the player's entry; they are back on the default mode.
    pub fn reset(&self, player: PlayerId) {
        self.modes.remove(&player);
    }

    pub fn clear(&self) {
        self.modes.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_str_is_case_insensitive() {
        assert_eq!("GLOBAL".parse::<ChatMode>().unwrap(), ChatMode::Global);
        assert_eq!(" Distance ".parse::<ChatMode>().unwrap(), ChatMode::Distance);
        assert_eq!("전체".parse::<ChatMode>().unwrap(), ChatMode::Global);
    }

    #[test]
    fn test_from_str_unknown_returns_error() {
        assert_eq!(
            "shout".parse::<ChatMode>(),
            Err(UnknownChatMode("shout".into()))
        );
    }

    #[test]
    fn test_from_string_unknown_falls_back_to_distance() {
        assert_eq!(ChatMode::from("whatever".to_string()), ChatMode::Distance);
    }

    #[test]
    fn test_get_without_entry_returns_default() {
        let store = ChatModeStore::new(ChatMode::Global);
        assert_eq!(store.get(PlayerId::random()), ChatMode::Global);
    }

    #[test]
    fn test_toggle_starts_from_default() {
        let store = ChatModeStore::new(ChatMode::Distance);
        let ann = PlayerId::random();

        assert_eq!(store.toggle(ann), ChatMode::Global);
        assert_eq!(store.toggle(ann), ChatMode::Distance);
        assert_eq!(store.get(ann), ChatMode::Distance);
    }

    #[test]
    fn test_reset_restores_default() {
        let store = ChatModeStore::new(ChatMode::Distance);
        let ann = PlayerId::random();
        store.set(ann, ChatMode::Global);

        store.reset(ann);

        assert_eq!(store.get(ann), ChatMode::Distance);
    }
}
