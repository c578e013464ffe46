//! Messenger lifecycle state machine.
//!
//! ```text
//!   Uninitialized ──initialize()──→ Initialized ──shutdown()──→ ShutDown
//!         │                                                        ↑
//!         └─────────────────────────shutdown()─────────────────────┘
//! ```
//!
//! `initialize()` succeeds at most once. `shutdown()` is accepted from any
//! state and is a no-op once the messenger is already shut down.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};

use crate::MessengerError;

const UNINITIALIZED: u8 = 0;
const INITIALIZED: u8 = 1;
const SHUT_DOWN: u8 = 2;

/// Where a messenger is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessengerState {
    Uninitialized,
    Initialized,
    ShutDown,
}

impl MessengerState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            UNINITIALIZED => Self::Uninitialized,
            INITIALIZED => Self::Initialized,
            _ => Self::ShutDown,
        }
    }
}

impl fmt::Display for MessengerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Uninitialized => "uninitialized",
            Self::Initialized => "initialized",
            Self::ShutDown => "shut down",
        })
    }
}

/// Lock-free holder for a [`MessengerState`].
#[derive(Debug)]
pub(crate) struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self(AtomicU8::new(UNINITIALIZED))
    }

    pub(crate) fn state(&self) -> MessengerState {
        MessengerState::from_raw(self.0.load(Ordering::Acquire))
    }

    /// Claims the single `Uninitialized → Initialized` transition.
    pub(crate) fn begin(&self) -> Result<(), MessengerError> {
        self.0
            .compare_exchange(UNINITIALIZED, INITIALIZED, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|raw| MessengerError::InvalidState {
                state: MessengerState::from_raw(raw),
                action: "initialize",
            })
    }

    /// Moves to `ShutDown` and returns the state it left.
    pub(crate) fn shut_down(&self) -> MessengerState {
        MessengerState::from_raw(self.0.swap(SHUT_DOWN, Ordering::AcqRel))
    }

    pub(crate) fn ensure_running(&self, action: &'static str) -> Result<(), MessengerError> {
        match self.state() {
            MessengerState::Initialized => Ok(()),
            state => Err(MessengerError::InvalidState { state, action }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_once_then_invalid_state() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.begin().is_ok());
        assert_eq!(lifecycle.state(), MessengerState::Initialized);

        let err = lifecycle.begin().unwrap_err();
        assert!(matches!(
            err,
            MessengerError::InvalidState {
                state: MessengerState::Initialized,
                action: "initialize"
            }
        ));
    }

    #[test]
    fn test_shut_down_is_idempotent() {
        let lifecycle = Lifecycle::new();
        lifecycle.begin().unwrap();
        assert_eq!(lifecycle.shut_down(), MessengerState::Initialized);
        assert_eq!(lifecycle.shut_down(), MessengerState::ShutDown);
        assert_eq!(lifecycle.state(), MessengerState::ShutDown);
    }

    #[test]
    fn test_begin_after_shut_down_is_rejected() {
        let lifecycle = Lifecycle::new();
        lifecycle.shut_down();
        assert!(lifecycle.begin().is_err());
    }

    #[test]
    fn test_ensure_running_only_when_initialized() {
        let lifecycle = Lifecycle::new();
        assert!(lifecycle.ensure_running("publish").is_err());
        lifecycle.begin().unwrap();
        assert!(lifecycle.ensure_running("publish").is_ok());
    }
}
