//! Proxy configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for a [`ProxyServer`](crate::ProxyServer).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,

    /// Milliseconds a new downstream has to send `SERVER_HELLO`.
    pub hello_timeout_ms: u64,
}

impl ProxyConfig {
    pub fn hello_timeout(&self) -> Duration {
        Duration::from_millis(self.hello_timeout_ms)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:25580".to_string(),
            hello_timeout_ms: 5_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_timeout_in_millis() {
        let config: ProxyConfig = serde_json::from_str(r#"{"hello_timeout_ms": 250}"#).unwrap();
        assert_eq!(config.hello_timeout(), Duration::from_millis(250));
        assert_eq!(config.bind_addr, "127.0.0.1:25580");
    }
}
