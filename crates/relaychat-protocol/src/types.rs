//! Core protocol types for relaychat's wire format.
//!
//! Everything in this module travels between processes: game server →
//! proxy → game server, or game server → broker → game server. Field names
//! on the wire are the camelCase names older deployments already speak,
//! so a fleet can roll forward one server at a time.

use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ProtocolError;

/// Milliseconds since the Unix epoch, used to stamp envelopes.
///
/// A clock set before 1970 yields 0 rather than an error.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn default_server_display_name() -> String {
    "Server".to_string()
}

fn default_player_name() -> String {
    "Unknown".to_string()
}

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A player's identity, stable across servers.
///
/// Newtype over a UUID so it cannot be mixed up with other ids. Serializes
/// as the plain hyphenated UUID string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub Uuid);

impl PlayerId {
    /// Sentinel for "we do not know this partner's id", used when a
    /// whisper went out to a remote player we only know by name.
    pub const UNKNOWN: PlayerId = PlayerId(Uuid::nil());

    /// Generates a fresh random id.
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns `true` for the [`PlayerId::UNKNOWN`] sentinel.
    pub fn is_unknown(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PlayerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Identifier of one game-server process in the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(String);

impl ServerId {
    /// Creates a server id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The fixed id used by single-server deployments.
    pub fn local() -> Self {
        Self("local".to_string())
    }

    /// Returns the id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ServerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ServerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Who this process is. Resolved once at startup and never changed.
///
/// Every outbound envelope is tagged with `id`, and inbound envelopes
/// carrying the same id are this server's own echoes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerIdentity {
    pub id: ServerId,
    pub display_name: String,
}

impl ServerIdentity {
    pub fn new(id: impl Into<ServerId>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }

    /// Identity of a single-server deployment: id `local`.
    pub fn local(display_name: impl Into<String>) -> Self {
        Self {
            id: ServerId::local(),
            display_name: display_name.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// TransportMode
// ---------------------------------------------------------------------------

/// Which transport carries envelopes between processes.
///
/// Chosen once at startup. Switching modes means restarting the process.
///
/// Parsing is lenient: unrecognised strings select [`TransportMode::Disabled`]
/// so a typo in configuration degrades to single-server chat instead of
/// refusing to start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransportMode {
    /// Single server; nothing leaves the process.
    #[default]
    Disabled,
    /// Frames go through the proxy tier over a relay channel.
    ProcessRelay,
    /// Entries go through named streams on a shared broker.
    BrokerStream,
}

impl TransportMode {
    /// Canonical configuration spelling.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "DISABLED",
            Self::ProcessRelay => "PROCESS_RELAY",
            Self::BrokerStream => "BROKER_STREAM",
        }
    }

    /// Returns `true` unless the mode is [`TransportMode::Disabled`].
    pub fn is_enabled(&self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

impl FromStr for TransportMode {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mode = match s.trim().to_ascii_uppercase().as_str() {
            "PROCESS_RELAY" | "RELAY" | "PLUGIN_MESSAGE" | "PLUGINMESSAGE" => {
                Self::ProcessRelay
            }
            "BROKER_STREAM" | "BROKER" | "REDIS" => Self::BrokerStream,
            _ => Self::Disabled,
        };
        Ok(mode)
    }
}

impl From<String> for TransportMode {
    fn from(s: String) -> Self {
        match s.parse() {
            Ok(mode) => mode,
            Err(never) => match never {},
        }
    }
}

impl From<TransportMode> for String {
    fn from(mode: TransportMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for TransportMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// EnvelopeKind
// ---------------------------------------------------------------------------

/// Discriminator for the five envelope variants.
///
/// The string forms are the type strings written in relay frames and in
/// the `type` field of broker entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnvelopeKind {
    GlobalChat,
    Notice,
    Whisper,
    WhisperAck,
    WhisperNotFound,
}

impl EnvelopeKind {
    pub const ALL: [EnvelopeKind; 5] = [
        Self::GlobalChat,
        Self::Notice,
        Self::Whisper,
        Self::WhisperAck,
        Self::WhisperNotFound,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GlobalChat => "GLOBAL_CHAT",
            Self::Notice => "NOTICE",
            Self::Whisper => "WHISPER",
            Self::WhisperAck => "WHISPER_ACK",
            Self::WhisperNotFound => "WHISPER_NOT_FOUND",
        }
    }
}

impl FromStr for EnvelopeKind {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| ProtocolError::UnknownKind(s.to_string()))
    }
}

impl fmt::Display for EnvelopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Envelopes
// ---------------------------------------------------------------------------

/// A global chat line, broadcast to every server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalChatEnvelope {
    #[serde(rename = "serverId")]
    pub(crate) origin_server_id: ServerId,
    #[serde(rename = "serverDisplayName", default = "default_server_display_name")]
    pub(crate) origin_server_display_name: String,
    #[serde(rename = "playerUuid")]
    pub(crate) player_id: PlayerId,
    #[serde(rename = "playerName", default = "default_player_name")]
    pub(crate) player_name: String,
    #[serde(rename = "message")]
    pub(crate) text: String,
    #[serde(rename = "timestamp", default = "now_millis")]
    pub(crate) sent_at_millis: u64,
}

impl GlobalChatEnvelope {
    /// Builds a global chat envelope stamped with the current time.
    pub fn new(
        origin: &ServerIdentity,
        player_id: PlayerId,
        player_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            origin_server_id: origin.id.clone(),
            origin_server_display_name: origin.display_name.clone(),
            player_id,
            player_name: player_name.into(),
            text: text.into(),
            sent_at_millis: now_millis(),
        }
    }

    /// Replaces the construction timestamp. Only meaningful before the
    /// envelope is handed to anyone else.
    pub fn with_sent_at_millis(mut self, millis: u64) -> Self {
        self.sent_at_millis = millis;
        self
    }

    pub fn origin_server_id(&self) -> &ServerId {
        &self.origin_server_id
    }

    pub fn origin_server_display_name(&self) -> &str {
        &self.origin_server_display_name
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn player_name(&self) -> &str {
        &self.player_name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sent_at_millis(&self) -> u64 {
        self.sent_at_millis
    }
}

/// A server-wide announcement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoticeEnvelope {
    #[serde(rename = "serverId")]
    pub(crate) origin_server_id: ServerId,
    #[serde(rename = "senderName", default = "default_player_name")]
    pub(crate) sender_name: String,
    #[serde(rename = "message")]
    pub(crate) text: String,
    #[serde(rename = "timestamp", default = "now_millis")]
    pub(crate) sent_at_millis: u64,
}

impl NoticeEnvelope {
    pub fn new(
        origin: &ServerIdentity,
        sender_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            origin_server_id: origin.id.clone(),
            sender_name: sender_name.into(),
            text: text.into(),
            sent_at_millis: now_millis(),
        }
    }

    pub fn with_sent_at_millis(mut self, millis: u64) -> Self {
        self.sent_at_millis = millis;
        self
    }

    pub fn origin_server_id(&self) -> &ServerId {
        &self.origin_server_id
    }

    pub fn sender_name(&self) -> &str {
        &self.sender_name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sent_at_millis(&self) -> u64 {
        self.sent_at_millis
    }
}

/// A private message addressed to a player by name.
///
/// The sender does not know which server hosts the target; routing is the
/// proxy's (or every consumer's) job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhisperEnvelope {
    #[serde(rename = "senderUuid")]
    pub(crate) sender_id: PlayerId,
    #[serde(rename = "senderName", default = "default_player_name")]
    pub(crate) sender_name: String,
    #[serde(rename = "senderServerId")]
    pub(crate) origin_server_id: ServerId,
    #[serde(rename = "targetName")]
    pub(crate) target_name: String,
    #[serde(rename = "message")]
    pub(crate) text: String,
    #[serde(rename = "timestamp", default = "now_millis")]
    pub(crate) sent_at_millis: u64,
}

impl WhisperEnvelope {
    pub fn new(
        origin: &ServerIdentity,
        sender_id: PlayerId,
        sender_name: impl Into<String>,
        target_name: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            sender_id,
            sender_name: sender_name.into(),
            origin_server_id: origin.id.clone(),
            target_name: target_name.into(),
            text: text.into(),
            sent_at_millis: now_millis(),
        }
    }

    pub fn with_sent_at_millis(mut self, millis: u64) -> Self {
        self.sent_at_millis = millis;
        self
    }

    pub fn sender_id(&self) -> PlayerId {
        self.sender_id
    }

    pub fn sender_name(&self) -> &str {
        &self.sender_name
    }

    pub fn origin_server_id(&self) -> &ServerId {
        &self.origin_server_id
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sent_at_millis(&self) -> u64 {
        self.sent_at_millis
    }
}

/// Confirmation that a whisper reached its target.
///
/// `target_id` is the original whisper's sender (the player the ack is
/// for); `target_server_id` is the server that player is on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhisperAckEnvelope {
    #[serde(rename = "targetUuid")]
    pub(crate) target_id: PlayerId,
    pub(crate) success: bool,
    #[serde(rename = "targetServerId", default)]
    pub(crate) target_server_id: Option<ServerId>,
}

impl WhisperAckEnvelope {
    pub fn new(target_id: PlayerId, success: bool, target_server_id: Option<ServerId>) -> Self {
        Self {
            target_id,
            success,
            target_server_id,
        }
    }

    pub fn target_id(&self) -> PlayerId {
        self.target_id
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn target_server_id(&self) -> Option<&ServerId> {
        self.target_server_id.as_ref()
    }
}

/// Reply from the proxy: nobody by `target_name` is connected anywhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhisperNotFoundEnvelope {
    #[serde(rename = "senderUuid")]
    pub(crate) sender_id: PlayerId,
    #[serde(rename = "targetName")]
    pub(crate) target_name: String,
}

impl WhisperNotFoundEnvelope {
    pub fn new(sender_id: PlayerId, target_name: impl Into<String>) -> Self {
        Self {
            sender_id,
            target_name: target_name.into(),
        }
    }

    pub fn sender_id(&self) -> PlayerId {
        self.sender_id
    }

    pub fn target_name(&self) -> &str {
        &self.target_name
    }
}

/// Any message that crosses a process boundary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    GlobalChat(GlobalChatEnvelope),
    Notice(NoticeEnvelope),
    Whisper(WhisperEnvelope),
    WhisperAck(WhisperAckEnvelope),
    WhisperNotFound(WhisperNotFoundEnvelope),
}

impl Envelope {
    pub fn kind(&self) -> EnvelopeKind {
        match self {
            Self::GlobalChat(_) => EnvelopeKind::GlobalChat,
            Self::Notice(_) => EnvelopeKind::Notice,
            Self::Whisper(_) => EnvelopeKind::Whisper,
            Self::WhisperAck(_) => EnvelopeKind::WhisperAck,
            Self::WhisperNotFound(_) => EnvelopeKind::WhisperNotFound,
        }
    }

    /// The server that produced this envelope, when the envelope says.
    ///
    /// Acks and not-found replies are addressed *to* a server rather than
    /// *from* one, so they return `None`.
    pub fn origin_server_id(&self) -> Option<&ServerId> {
        match self {
            Self::GlobalChat(e) => Some(e.origin_server_id()),
            Self::Notice(e) => Some(e.origin_server_id()),
            Self::Whisper(e) => Some(e.origin_server_id()),
            Self::WhisperAck(_) | Self::WhisperNotFound(_) => None,
        }
    }

    /// Returns `true` if `local` produced this envelope.
    pub fn is_echo_of(&self, local: &ServerId) -> bool {
        self.origin_server_id() == Some(local)
    }
}

impl From<GlobalChatEnvelope> for Envelope {
    fn from(e: GlobalChatEnvelope) -> Self {
        Self::GlobalChat(e)
    }
}

impl From<NoticeEnvelope> for Envelope {
    fn from(e: NoticeEnvelope) -> Self {
        Self::Notice(e)
    }
}

impl From<WhisperEnvelope> for Envelope {
    fn from(e: WhisperEnvelope) -> Self {
        Self::Whisper(e)
    }
}

impl From<WhisperAckEnvelope> for Envelope {
    fn from(e: WhisperAckEnvelope) -> Self {
        Self::WhisperAck(e)
    }
}

impl From<WhisperNotFoundEnvelope> for Envelope {
    fn from(e: WhisperNotFoundEnvelope) -> Self {
        Self::WhisperNotFound(e)
    }
}

// =========================================================================
// Tests
// =========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> ServerIdentity {
        ServerIdentity::new("lobby-1", "Lobby")
    }

    // =====================================================================
    // Identity types
    // =====================================================================

    #[test]
    fn test_player_id_serializes_as_plain_uuid_string() {
        let id: PlayerId = "6f1c2a44-0f3e-4f0e-9d55-3c2b1a0e9f10".parse().unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"6f1c2a44-0f3e-4f0e-9d55-3c2b1a0e9f10\"");
    }

    #[test]
    fn test_player_id_unknown_is_nil() {
        assert!(PlayerId::UNKNOWN.is_unknown());
        assert!(!PlayerId::random().is_unknown());
        assert_eq!(
            PlayerId::UNKNOWN.to_string(),
            "00000000-0000-0000-0000-000000000000"
        );
    }

    #[test]
    fn test_server_id_serializes_transparently() {
        let json = serde_json::to_string(&ServerId::new("survival")).unwrap();
        assert_eq!(json, "\"survival\"");
    }

    #[test]
    fn test_server_identity_local_uses_local_id() {
        let identity = ServerIdentity::local("Main");
        assert_eq!(identity.id.as_str(), "local");
        assert_eq!(identity.display_name, "Main");
    }

    // =====================================================================
    // TransportMode
    // =====================================================================

    #[test]
    fn test_transport_mode_parses_aliases_case_insensitively() {
        assert_eq!(
            "plugin_message".parse::<TransportMode>().unwrap(),
            TransportMode::ProcessRelay
        );
        assert_eq!(
            "PluginMessage".parse::<TransportMode>().unwrap(),
            TransportMode::ProcessRelay
        );
        assert_eq!(
            "redis".parse::<TransportMode>().unwrap(),
            TransportMode::BrokerStream
        );
        assert_eq!(
            "Broker_Stream".parse::<TransportMode>().unwrap(),
            TransportMode::BrokerStream
        );
    }

    #[test]
    fn test_transport_mode_unknown_string_is_disabled() {
        assert_eq!("OFF".parse::<TransportMode>().unwrap(), TransportMode::Disabled);
        assert_eq!("carrier-pigeon".parse::<TransportMode>().unwrap(), TransportMode::Disabled);
    }

    #[test]
    fn test_transport_mode_deserializes_leniently() {
        let mode: TransportMode = serde_json::from_str("\"relay\"").unwrap();
        assert_eq!(mode, TransportMode::ProcessRelay);
        let json = serde_json::to_string(&TransportMode::BrokerStream).unwrap();
        assert_eq!(json, "\"BROKER_STREAM\"");
    }

    #[test]
    fn test_transport_mode_is_enabled() {
        assert!(!TransportMode::Disabled.is_enabled());
        assert!(TransportMode::ProcessRelay.is_enabled());
        assert!(TransportMode::BrokerStream.is_enabled());
    }

    // =====================================================================
    // EnvelopeKind
    // =====================================================================

    #[test]
    fn test_envelope_kind_parses_every_type_string() {
        for kind in EnvelopeKind::ALL {
            assert_eq!(kind.as_str().parse::<EnvelopeKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_envelope_kind_unknown_returns_typed_error() {
        let err = "TELEPORT".parse::<EnvelopeKind>().unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownKind(k) if k == "TELEPORT"));
    }

    // =====================================================================
    // Envelopes
    // =====================================================================

    #[test]
    fn test_global_chat_new_tags_origin() {
        let env = GlobalChatEnvelope::new(&identity(), PlayerId::random(), "Ann", "hi");
        assert_eq!(env.origin_server_id().as_str(), "lobby-1");
        assert_eq!(env.origin_server_display_name(), "Lobby");
        assert!(env.sent_at_millis() > 0);
    }

    #[test]
    fn test_global_chat_json_uses_legacy_field_names() {
        let env = GlobalChatEnvelope::new(&identity(), PlayerId::UNKNOWN, "Ann", "hi")
            .with_sent_at_millis(42);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["serverId"], "lobby-1");
        assert_eq!(json["serverDisplayName"], "Lobby");
        assert_eq!(json["playerName"], "Ann");
        assert_eq!(json["message"], "hi");
        assert_eq!(json["timestamp"], 42);
    }

    #[test]
    fn test_global_chat_missing_timestamp_defaults_to_now() {
        let before = now_millis();
        let json = r#"{
            "serverId": "s2",
            "serverDisplayName": "Survival",
            "playerUuid": "6f1c2a44-0f3e-4f0e-9d55-3c2b1a0e9f10",
            "playerName": "Bob",
            "message": "legacy"
        }"#;
        let env: GlobalChatEnvelope = serde_json::from_str(json).unwrap();
        assert!(env.sent_at_millis() >= before);
    }

    #[test]
    fn test_whisper_ack_target_server_is_optional() {
        let json = r#"{"targetUuid": "6f1c2a44-0f3e-4f0e-9d55-3c2b1a0e9f10", "success": true}"#;
        let ack: WhisperAckEnvelope = serde_json::from_str(json).unwrap();
        assert!(ack.success());
        assert!(ack.target_server_id().is_none());
    }

    #[test]
    fn test_envelope_echo_detection() {
        let local = ServerId::new("lobby-1");
        let env: Envelope =
            GlobalChatEnvelope::new(&identity(), PlayerId::random(), "Ann", "hi").into();
        assert!(env.is_echo_of(&local));
        assert!(!env.is_echo_of(&ServerId::new("other")));
    }

    #[test]
    fn test_ack_and_not_found_have_no_origin() {
        let ack: Envelope = WhisperAckEnvelope::new(PlayerId::random(), true, None).into();
        let nf: Envelope = WhisperNotFoundEnvelope::new(PlayerId::random(), "Bob").into();
        assert!(ack.origin_server_id().is_none());
        assert!(nf.origin_server_id().is_none());
        assert_eq!(nf.kind(), EnvelopeKind::WhisperNotFound);
    }

    #[test]
    fn test_decode_whisper_missing_target_returns_error() {
        let json = r#"{"senderUuid": "6f1c2a44-0f3e-4f0e-9d55-3c2b1a0e9f10", "senderServerId": "s1", "message": "x"}"#;
        let result: Result<WhisperEnvelope, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
