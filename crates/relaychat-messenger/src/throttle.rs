//! Rate limiting for repetitive warnings.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

/// Allows one log line per window.
///
/// A server with nobody online would otherwise warn on every chat send
/// attempt.
#[derive(Debug)]
pub struct LogThrottle {
    window: Duration,
    last: Mutex<Option<Instant>>,
}

impl LogThrottle {
    /// Window used for the relay carrier warning.
    pub const CARRIER_WINDOW: Duration = Duration::from_secs(30);

    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last: Mutex::new(None),
        }
    }

    /// Returns `true` if the caller should log now, and starts a new
    /// window if so.
    pub fn should_log(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock().unwrap_or_else(|p| p.into_inner());
        match *last {
            Some(at) if now.duration_since(at) < self.window => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

impl Default for LogThrottle {
    fn default() -> Self {
        Self::new(Self::CARRIER_WINDOW)
    }
}
