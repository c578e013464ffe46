//! Single-server mode: nothing leaves the process.

use relaychat_protocol::{Envelope, ServerIdentity, TransportMode};

use crate::lifecycle::Lifecycle;
use crate::{ChatMessenger, InboundQueue, MessengerError, MessengerState};

/// A messenger that never sends anything.
///
/// Its identity is always `local`, so nothing it sees is ever mistaken for
/// another server's traffic.
#[derive(Debug)]
pub struct DisabledMessenger {
    identity: ServerIdentity,
    lifecycle: Lifecycle,
}

impl DisabledMessenger {
    pub fn new(display_name: impl Into<String>) -> Self {
        Self {
            identity: ServerIdentity::local(display_name),
            lifecycle: Lifecycle::new(),
        }
    }
}

impl Default for DisabledMessenger {
    fn default() -> Self {
        Self::new("Server")
    }
}

impl ChatMessenger for DisabledMessenger {
    fn mode(&self) -> TransportMode {
        TransportMode::Disabled
    }

    fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    fn state(&self) -> MessengerState {
        self.lifecycle.state()
    }

    fn initialize(&self, _inbound: InboundQueue) -> Result<(), MessengerError> {
        self.lifecycle.begin()?;
        tracing::info!("cross-server chat disabled, running standalone");
        Ok(())
    }

    fn shutdown(&self) {
        self.lifecycle.shut_down();
    }

    fn publish(&self, envelope: Envelope) -> Result<(), MessengerError> {
        tracing::trace!(kind = %envelope.kind(), "transport disabled, not publishing");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use relaychat_protocol::PlayerId;

    use super::*;
    use crate::inbound_queue;

    #[test]
    fn test_disabled_identity_is_local() {
        let messenger = DisabledMessenger::new("Main");
        assert_eq!(messenger.identity().id.as_str(), "local");
        assert_eq!(messenger.mode(), TransportMode::Disabled);
    }

    #[test]
    fn test_disabled_sends_are_noops_in_any_state() {
        let messenger = DisabledMessenger::default();
        assert!(messenger.broadcast_notice("Console", "hi").is_ok());

        let (queue, _dispatcher) = inbound_queue();
        messenger.initialize(queue).unwrap();
        assert!(
            messenger
                .send_whisper(PlayerId::random(), "Ann", "Bob", "hi")
                .is_ok()
        );
    }

    #[test]
    fn test_disabled_second_initialize_is_rejected() {
        let messenger = DisabledMessenger::default();
        let (queue, _dispatcher) = inbound_queue();
        messenger.initialize(queue.clone()).unwrap();
        assert!(matches!(
            messenger.initialize(queue),
            Err(MessengerError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_disabled_shutdown_twice_is_safe() {
        let messenger = DisabledMessenger::default();
        messenger.shutdown();
        messenger.shutdown();
        assert_eq!(messenger.state(), MessengerState::ShutDown);
    }
}
