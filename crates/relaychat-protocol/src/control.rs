//! Control frames exchanged between a game server and the proxy.
//!
//! The proxy needs to know which players each downstream server hosts so
//! it can route whispers to exactly one server. Game servers announce
//! themselves with [`ServerHello`] on every (re)connect and then keep the
//! roster current with [`PlayerPresence`] updates.
//!
//! Control frames share the relay framing with envelopes but are never
//! handed to chat handlers.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{ProtocolError, ServerId};

/// Compares two player names the way every lookup does: ignoring case,
/// including for non-ASCII letters.
///
/// Agrees with the lowercased keys rosters are stored under.
pub fn names_match(a: &str, b: &str) -> bool {
    a == b || a.to_lowercase() == b.to_lowercase()
}

/// One connected player as listed in a roster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterEntry {
    pub name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

impl RosterEntry {
    pub fn new(name: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            display_name: display_name.into(),
        }
    }

    /// Case-insensitive match against either the login name or the
    /// display name.
    pub fn matches(&self, query: &str) -> bool {
        names_match(&self.name, query) || names_match(&self.display_name, query)
    }
}

/// First frame a game server sends after connecting to the proxy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerHello {
    #[serde(rename = "serverId")]
    pub server_id: ServerId,
    #[serde(rename = "serverDisplayName")]
    pub server_display_name: String,
    #[serde(default)]
    pub players: Vec<RosterEntry>,
}

/// A player joined or left a game server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerPresence {
    #[serde(rename = "playerName")]
    pub player_name: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub online: bool,
}

/// Roster bookkeeping frames.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlFrame {
    Hello(ServerHello),
    Presence(PlayerPresence),
}

impl ControlFrame {
    pub fn kind(&self) -> ControlKind {
        match self {
            Self::Hello(_) => ControlKind::ServerHello,
            Self::Presence(_) => ControlKind::PlayerPresence,
        }
    }
}

/// Discriminator for control frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKind {
    ServerHello,
    PlayerPresence,
}

impl ControlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ServerHello => "SERVER_HELLO",
            Self::PlayerPresence => "PLAYER_PRESENCE",
        }
    }
}

impl FromStr for ControlKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SERVER_HELLO" => Ok(Self::ServerHello),
            "PLAYER_PRESENCE" => Ok(Self::PlayerPresence),
            other => Err(ProtocolError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roster_entry_matches_name_or_display_name() {
        let entry = RosterEntry::new("bob_42", "Bobby");
        assert!(entry.matches("BOB_42"));
        assert!(entry.matches("bobby"));
        assert!(!entry.matches("bob"));
    }

    #[test]
    fn test_roster_entry_matches_non_ascii_name_in_any_case() {
        let entry = RosterEntry::new("Émile", "Élodie");
        assert!(entry.matches("émile"));
        assert!(entry.matches("ÉMILE"));
        assert!(entry.matches("élodie"));
        assert!(!entry.matches("emile"));
    }

    #[test]
    fn test_names_match_ignores_case() {
        assert!(names_match("ÅSA", "åsa"));
        assert!(names_match("Zoë", "ZOË"));
        assert!(names_match("bob", "Bob"));
        assert!(!names_match("ann", "anne"));
    }

    #[test]
    fn test_hello_without_players_defaults_to_empty_roster() {
        let json = r#"{"serverId": "s1", "serverDisplayName": "Lobby"}"#;
        let hello: ServerHello = serde_json::from_str(json).unwrap();
        assert!(hello.players.is_empty());
    }

    #[test]
    fn test_control_kind_rejects_envelope_types() {
        assert!("WHISPER".parse::<ControlKind>().is_err());
    }
}
