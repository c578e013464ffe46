//! Node configuration.
//!
//! Plain structs with defaults. Hosts usually deserialize a [`NodeConfig`]
//! from their own config file; every field is optional there. Durations
//! are whole milliseconds.

use std::time::Duration;

use rand::Rng;
use relaychat_messenger::{BrokerSettings, StreamNames, WebSocketRelayLink};
use relaychat_protocol::{ServerIdentity, TransportMode};
use relaychat_session::ChatMode;
use serde::{Deserialize, Serialize};

use crate::MessageTemplates;

/// Everything a [`ChatNode`](crate::ChatNode) needs to know up front.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Which transport carries envelopes between servers.
    pub mode: TransportMode,

    /// This server's id. Ignored in disabled mode, where the id is always
    /// `local`. Generated when missing.
    pub server_id: Option<String>,

    /// Name other servers show next to this server's global chat.
    pub server_display_name: String,

    /// Chat mode of players who never picked one.
    pub default_chat_mode: ChatMode,

    pub relay: RelayConfig,
    pub broker: BrokerConfig,
    pub messages: MessageTemplates,
}

impl NodeConfig {
    /// Resolves the identity this node runs under. Call once; a generated
    /// id is different every time.
    pub fn identity(&self) -> ServerIdentity {
        let display_name = if self.server_display_name.is_empty() {
            "Server".to_string()
        } else {
            self.server_display_name.clone()
        };

        if !self.mode.is_enabled() {
            return ServerIdentity::local(display_name);
        }

        let id = match self.server_id.as_deref().map(str::trim) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => {
                let generated = generate_server_id();
                tracing::warn!(server_id = %generated, "no server id configured, generated one");
                generated
            }
        };
        ServerIdentity::new(id, display_name)
    }
}

/// `server-NNNN` with four random digits.
fn generate_server_id() -> String {
    format!("server-{:04}", rand::rng().random_range(0..10_000))
}

/// Process-relay settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// WebSocket URL of the proxy.
    pub url: String,

    /// Pause between reconnect attempts.
    pub reconnect_delay_ms: u64,
}

impl RelayConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn link(&self) -> WebSocketRelayLink {
        WebSocketRelayLink::new(self.url.clone()).with_reconnect_delay(self.reconnect_delay())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:25580".to_string(),
            reconnect_delay_ms: millis(WebSocketRelayLink::DEFAULT_RECONNECT_DELAY),
        }
    }
}

/// Broker-stream settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Prefix of the stream and group names.
    pub namespace: String,
    pub batch_size: usize,
    /// How long one read waits for new entries.
    pub block_ms: u64,
    /// Pause after a failed read.
    pub retry_delay_ms: u64,
}

impl BrokerConfig {
    pub fn stream_names(&self) -> StreamNames {
        StreamNames::new(&self.namespace)
    }

    pub fn settings(&self) -> BrokerSettings {
        BrokerSettings {
            batch_size: self.batch_size,
            block: Duration::from_millis(self.block_ms),
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        let settings = BrokerSettings::default();
        Self {
            namespace: "relaychat".to_string(),
            batch_size: settings.batch_size,
            block_ms: millis(settings.block),
            retry_delay_ms: millis(settings.retry_delay),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
