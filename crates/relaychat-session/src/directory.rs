//! How the chat node sees the host game server.
//!
//! The node never talks to the game engine directly. It asks a
//! [`PlayerDirectory`] who is online here, an optional [`NetworkDirectory`]
//! who is online anywhere, and hands finished lines to a [`MessageSink`].
//! All three are synchronous: they are called from the main thread, where
//! the host's player list is safe to read.
//!
//! [`InMemoryDirectory`] and [`CollectingSink`] are ready-made
//! implementations for embedded setups and tests.

use std::sync::Mutex;

use dashmap::DashMap;
use relaychat_protocol::{PlayerId, names_match};

/// A player connected to this server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRef {
    pub id: PlayerId,
    /// Login name.
    pub name: String,
    /// Nickname shown in chat. Equal to `name` when the player has none.
    pub display_name: String,
}

impl PlayerRef {
    pub fn new(id: PlayerId, name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            display_name: display_name.into(),
        }
    }

    /// Case-insensitive match against the login name or the nickname.
    pub fn matches(&self, query: &str) -> bool {
        names_match(&self.name, query) || names_match(&self.display_name, query)
    }
}

/// Players connected to this server.
pub trait PlayerDirectory: Send + Sync + 'static {
    /// Finds an online player by login name or nickname, ignoring case.
    fn find_local(&self, name: &str) -> Option<PlayerRef>;

    fn find_local_by_id(&self, id: PlayerId) -> Option<PlayerRef>;

    fn online_players(&self) -> Vec<PlayerRef>;

    /// Names of online players starting with `prefix`, for command
    /// completion. Sorted, at most `limit` entries.
    fn search_by_prefix(&self, prefix: &str, limit: usize) -> Vec<String> {
        let prefix = prefix.to_lowercase();
        let mut names: Vec<String> = self
            .online_players()
            .into_iter()
            .map(|p| p.display_name)
            .filter(|name| name.to_lowercase().starts_with(&prefix))
            .collect();
        names.sort();
        names.truncate(limit);
        names
    }
}

/// A player known somewhere in the network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkPlayer {
    pub name: String,
    pub display_name: String,
}

/// Network-wide player lookup, usually backed by the proxy's user service.
///
/// Optional: a node without one sends remote whispers blind and lets the
/// proxy answer "not found".
pub trait NetworkDirectory: Send + Sync + 'static {
    fn find_network(&self, name: &str) -> Option<NetworkPlayer>;
}

/// Delivers rendered text to one local player.
pub trait MessageSink: Send + Sync + 'static {
    fn deliver(&self, player: PlayerId, text: &str);
}

// ---------------------------------------------------------------------------
// In-memory implementations
// ---------------------------------------------------------------------------

/// A player roster kept in a concurrent map.
///
/// Implements both directory traits, so one instance can stand for the
/// local server and another for the whole network.
#[derive(Debug, Default)]
pub struct InMemoryDirectory {
    players: DashMap<PlayerId, PlayerRef>,
}

impl InMemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a player.
    pub fn join(&self, player: PlayerRef) {
        self.players.insert(player.id, player);
    }

    pub fn leave(&self, id: PlayerId) -> Option<PlayerRef> {
        self.players.remove(&id).map(|(_, player)| player)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }
}

impl PlayerDirectory for InMemoryDirectory {
    fn find_local(&self, name: &str) -> Option<PlayerRef> {
        // Exact login names beat nickname matches.
        let mut by_nickname = None;
        for entry in self.players.iter() {
            if names_match(&entry.name, name) {
                return Some(entry.value().clone());
            }
            if by_nickname.is_none() && entry.matches(name) {
                by_nickname = Some(entry.value().clone());
            }
        }
        by_nickname
    }

    fn find_local_by_id(&self, id: PlayerId) -> Option<PlayerRef> {
        self.players.get(&id).map(|p| p.value().clone())
    }

    fn online_players(&self) -> Vec<PlayerRef> {
        self.players.iter().map(|p| p.value().clone()).collect()
    }
}

impl NetworkDirectory for InMemoryDirectory {
    fn find_network(&self, name: &str) -> Option<NetworkPlayer> {
        self.find_local(name).map(|p| NetworkPlayer {
            name: p.name,
            display_name: p.display_name,
        })
    }
}

/// A [`MessageSink`] that records every delivered line.
#[derive(Debug, Default)]
pub struct CollectingSink {
    lines: Mutex<Vec<(PlayerId, String)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lines delivered to `player`, oldest first.
    pub fn lines_for(&self, player: PlayerId) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(to, _)| *to == player)
            .map(|(_, text)| text.clone())
            .collect()
    }

    /// Removes and returns everything delivered so far.
    pub fn take(&self) -> Vec<(PlayerId, String)> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(PlayerId, String)>> {
        self.lines.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl MessageSink for CollectingSink {
    fn deliver(&self, player: PlayerId, text: &str) {
        self.lock().push((player, text.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> (InMemoryDirectory, PlayerId, PlayerId) {
        let dir = InMemoryDirectory::new();
        let ann = PlayerId::random();
        let bob = PlayerId::random();
        dir.join(PlayerRef::new(ann, "ann", "Annie"));
        dir.join(PlayerRef::new(bob, "bob", "ann"));
        (dir, ann, bob)
    }

    #[test]
    fn test_find_local_matches_nickname_ignoring_case() {
        let (dir, ann, _) = roster();
        assert_eq!(dir.find_local("ANNIE").map(|p| p.id), Some(ann));
    }

    #[test]
    fn test_find_local_prefers_login_name_over_nickname() {
        let (dir, ann, _) = roster();
        // "ann" is Ann's login and Bob's nickname.
        assert_eq!(dir.find_local("Ann").map(|p| p.id), Some(ann));
    }

    #[test]
    fn test_find_local_non_ascii_name_ignores_case() {
        let dir = InMemoryDirectory::new();
        let emile = PlayerRef::new(PlayerId::random(), "Émile", "Émile");
        dir.join(emile.clone());

        assert!(emile.matches("émile"));
        assert_eq!(dir.find_local("émile").map(|p| p.id), Some(emile.id));
        assert_eq!(dir.find_local("ÉMILE").map(|p| p.id), Some(emile.id));
    }

    #[test]
    fn test_find_local_unknown_returns_none() {
        let (dir, _, _) = roster();
        assert!(dir.find_local("carol").is_none());
    }

    #[test]
    fn test_search_by_prefix_sorts_and_limits() {
        let dir = InMemoryDirectory::new();
        for name in ["Steve", "stella", "Alex", "Stan"] {
            dir.join(PlayerRef::new(PlayerId::random(), name, name));
        }
        assert_eq!(dir.search_by_prefix("st", 2), vec!["Stan", "Steve"]);
    }

    #[test]
    fn test_leave_removes_player() {
        let (dir, ann, _) = roster();
        assert!(dir.leave(ann).is_some());
        assert!(dir.find_local_by_id(ann).is_none());
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_collecting_sink_groups_lines_by_player() {
        let sink = CollectingSink::new();
        let ann = PlayerId::random();
        sink.deliver(ann, "one");
        sink.deliver(PlayerId::random(), "other");
        sink.deliver(ann, "two");

        assert_eq!(sink.lines_for(ann), vec!["one", "two"]);
        assert_eq!(sink.take().len(), 3);
        assert!(sink.is_empty());
    }
}
