//! Routing decisions for relay frames.
//!
//! [`ProxyRouter::plan`] looks at one frame and the current registry and
//! decides where it goes. It never touches a connection, which keeps the
//! rules testable on their own; [`ProxyRouter::deliver`] then pushes the
//! bytes onto the chosen downstream queues.

use relaychat_protocol::{
    Envelope, PlayerId, ProtocolError, RelayCodec, RelayFrame, ServerId,
    WhisperNotFoundEnvelope,
};

use crate::DownstreamRegistry;

/// Where a frame goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// The original bytes go to every downstream.
    Broadcast,
    /// The original bytes go to one downstream.
    Forward(ServerId),
    /// A frame built by the proxy goes to one downstream instead.
    Reply { to: ServerId, frame: Vec<u8> },
    /// Nobody gets anything.
    Drop(DropReason),
}

/// Why a frame was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    Undecodable(String),
    /// Control frames are handled by the hub, never routed.
    Control,
    /// A whisper ack without a registered `targetServerId`.
    NoAckTarget,
    /// Only the proxy produces not-found replies.
    NotFoundFromDownstream,
    /// A whisper target is offline and its origin is not registered either.
    UnknownOrigin(ServerId),
}

/// Stateless routing rules.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProxyRouter {
    codec: RelayCodec,
}

impl ProxyRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decides where a raw relay frame goes.
    pub fn plan(&self, frame: &[u8], registry: &DownstreamRegistry) -> Route {
        match self.codec.decode_frame(frame) {
            Ok(RelayFrame::Envelope(envelope)) => self.plan_envelope(&envelope, registry),
            Ok(RelayFrame::Control(_)) => Route::Drop(DropReason::Control),
            Err(e) => Route::Drop(DropReason::Undecodable(e.to_string())),
        }
    }

    /// Decides where a decoded envelope goes.
    pub fn plan_envelope(&self, envelope: &Envelope, registry: &DownstreamRegistry) -> Route {
        match envelope {
            Envelope::GlobalChat(_) | Envelope::Notice(_) => Route::Broadcast,
            Envelope::Whisper(whisper) => {
                if let Some(host) = registry.locate(whisper.target_name()) {
                    return Route::Forward(host.clone());
                }

                let origin = whisper.origin_server_id();
                if !registry.contains(origin) {
                    return Route::Drop(DropReason::UnknownOrigin(origin.clone()));
                }
                match self.not_found_frame(whisper.sender_id(), whisper.target_name()) {
                    Ok(frame) => Route::Reply {
                        to: origin.clone(),
                        frame,
                    },
                    Err(e) => Route::Drop(DropReason::Undecodable(e.to_string())),
                }
            }
            Envelope::WhisperAck(ack) => match ack.target_server_id() {
                Some(target) if registry.contains(target) => Route::Forward(target.clone()),
                _ => Route::Drop(DropReason::NoAckTarget),
            },
            Envelope::WhisperNotFound(_) => Route::Drop(DropReason::NotFoundFromDownstream),
        }
    }

    /// Queues `frame` according to `route`. Returns how many downstreams
    /// it was queued for.
    pub fn deliver(&self, frame: &[u8], route: Route, registry: &DownstreamRegistry) -> usize {
        match route {
            Route::Broadcast => registry
                .senders()
                .filter(|(_, sender)| sender.send(frame.to_vec()).is_ok())
                .count(),
            Route::Forward(to) => send_to(registry, &to, frame.to_vec()),
            Route::Reply { to, frame } => send_to(registry, &to, frame),
            Route::Drop(reason) => {
                tracing::debug!(?reason, "frame dropped");
                0
            }
        }
    }

    /// Plans and delivers in one step.
    pub fn route(&self, frame: &[u8], registry: &DownstreamRegistry) -> usize {
        let route = self.plan(frame, registry);
        self.deliver(frame, route, registry)
    }

    fn not_found_frame(
        &self,
        sender_id: PlayerId,
        target_name: &str,
    ) -> Result<Vec<u8>, ProtocolError> {
        self.codec
            .encode(&WhisperNotFoundEnvelope::new(sender_id, target_name).into())
    }
}

fn send_to(registry: &DownstreamRegistry, to: &ServerId, frame: Vec<u8>) -> usize {
    match registry.sender(to) {
        Some(sender) if sender.send(frame).is_ok() => 1,
        _ => {
            tracing::debug!(server_id = %to, "downstream gone, frame dropped");
            0
        }
    }
}

#[cfg(test)]
mod tests {
    use relaychat_protocol::{
        GlobalChatEnvelope, PlayerPresence, ServerHello, ServerIdentity, WhisperAckEnvelope,
        WhisperEnvelope,
    };
    use relaychat_transport::ConnectionId;
    use tokio::sync::mpsc;

    use super::*;

    fn registry_with(ids: &[&str]) -> (DownstreamRegistry, Vec<mpsc::UnboundedReceiver<Vec<u8>>>) {
        let mut registry = DownstreamRegistry::new();
        let mut receivers = Vec::new();
        for (n, id) in ids.iter().enumerate() {
            let (tx, rx) = mpsc::unbounded_channel();
            registry.register(
                ServerHello {
                    server_id: ServerId::new(*id),
                    server_display_name: id.to_string(),
                    players: vec![],
                },
                ConnectionId::new(n as u64),
                tx,
            );
            receivers.push(rx);
        }
        (registry, receivers)
    }

    fn whisper(from: &str, target: &str) -> Envelope {
        WhisperEnvelope::new(
            &ServerIdentity::new(from, from),
            PlayerId::random(),
            "Ann",
            target,
            "psst",
        )
        .into()
    }

    #[test]
    fn test_plan_global_chat_broadcasts() {
        let (registry, _rx) = registry_with(&["s1"]);
        let env: Envelope =
            GlobalChatEnvelope::new(&ServerIdentity::new("s1", "One"), PlayerId::random(), "Ann", "hi")
                .into();
        assert_eq!(ProxyRouter::new().plan_envelope(&env, &registry), Route::Broadcast);
    }

    #[test]
    fn test_plan_whisper_forwards_to_host() {
        let (mut registry, _rx) = registry_with(&["s1", "s2"]);
        registry.apply_presence(
            &ServerId::new("s2"),
            ConnectionId::new(1),
            PlayerPresence {
                player_name: "bob".into(),
                display_name: "Bob".into(),
                online: true,
            },
        );

        let route = ProxyRouter::new().plan_envelope(&whisper("s1", "BOB"), &registry);
        assert_eq!(route, Route::Forward(ServerId::new("s2")));
    }

    #[test]
    fn test_plan_whisper_offline_target_replies_to_origin() {
        let (registry, _rx) = registry_with(&["s1", "s2"]);
        let env = whisper("s1", "Ghost");
        let sender = match &env {
            Envelope::Whisper(w) => w.sender_id(),
            _ => unreachable!(),
        };

        match ProxyRouter::new().plan_envelope(&env, &registry) {
            Route::Reply { to, frame } => {
                assert_eq!(to, ServerId::new("s1"));
                assert_eq!(
                    RelayCodec.decode(&frame).unwrap(),
                    Envelope::WhisperNotFound(WhisperNotFoundEnvelope::new(sender, "Ghost"))
                );
            }
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn test_plan_whisper_unknown_origin_drops() {
        let (registry, _rx) = registry_with(&["s2"]);
        let route = ProxyRouter::new().plan_envelope(&whisper("s9", "Ghost"), &registry);
        assert_eq!(route, Route::Drop(DropReason::UnknownOrigin(ServerId::new("s9"))));
    }

    #[test]
    fn test_plan_ack_routes_by_target_server() {
        let (registry, _rx) = registry_with(&["s1", "s2"]);
        let router = ProxyRouter::new();

        let ack: Envelope =
            WhisperAckEnvelope::new(PlayerId::random(), true, Some(ServerId::new("s2"))).into();
        assert_eq!(router.plan_envelope(&ack, &registry), Route::Forward(ServerId::new("s2")));

        let unknown: Envelope =
            WhisperAckEnvelope::new(PlayerId::random(), true, Some(ServerId::new("s7"))).into();
        assert_eq!(router.plan_envelope(&unknown, &registry), Route::Drop(DropReason::NoAckTarget));

        let missing: Envelope = WhisperAckEnvelope::new(PlayerId::random(), true, None).into();
        assert_eq!(router.plan_envelope(&missing, &registry), Route::Drop(DropReason::NoAckTarget));
    }

    #[test]
    fn test_plan_not_found_from_downstream_drops() {
        let (registry, _rx) = registry_with(&["s1"]);
        let env: Envelope = WhisperNotFoundEnvelope::new(PlayerId::random(), "x").into();
        assert_eq!(
            ProxyRouter::new().plan_envelope(&env, &registry),
            Route::Drop(DropReason::NotFoundFromDownstream)
        );
    }

    #[test]
    fn test_plan_garbage_is_undecodable() {
        let (registry, _rx) = registry_with(&["s1"]);
        assert!(matches!(
            ProxyRouter::new().plan(&[0, 9, b'x'], &registry),
            Route::Drop(DropReason::Undecodable(_))
        ));
    }

    #[test]
    fn test_route_broadcast_reaches_every_downstream_with_original_bytes() {
        let (registry, mut receivers) = registry_with(&["s1", "s2", "s3"]);
        let env: Envelope =
            GlobalChatEnvelope::new(&ServerIdentity::new("s1", "One"), PlayerId::random(), "Ann", "hi")
                .into();
        let frame = RelayCodec.encode(&env).unwrap();

        assert_eq!(ProxyRouter::new().route(&frame, &registry), 3);
        for rx in &mut receivers {
            assert_eq!(rx.try_recv().unwrap(), frame);
        }
    }
}
