//! Process relay: frames travel through the proxy tier.
//!
//! The messenger itself never touches a socket. It owns a [`RelayLink`]
//! and talks to it over channels:
//!
//! ```text
//! publish() ──encode──→ outbound ──→ link task ──→ proxy
//! InboundQueue ←─decode── decode task ←── inbound ←── link task ←── proxy
//! ```
//!
//! The relay channel only works while some player is connected to this
//! server (the *carrier*). With nobody online, sends are dropped and a
//! warning is logged at most once per [`LogThrottle::CARRIER_WINDOW`].

mod memory;
mod websocket;

pub use memory::{MemoryRelayLink, MemoryRelayPeer, memory_relay};
pub use websocket::WebSocketRelayLink;

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use relaychat_protocol::{
    ControlFrame, Envelope, PlayerPresence, RELAY_CHANNEL, RelayCodec, RelayFrame, RosterEntry,
    ServerHello, ServerIdentity, TransportMode,
};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use crate::lifecycle::Lifecycle;
use crate::{ChatMessenger, InboundQueue, LogThrottle, MessengerError, MessengerState};

/// Produces the `SERVER_HELLO` frame a link sends on every (re)connect.
/// `None` means the frame could not be encoded and was already logged.
pub type HelloFrame = Arc<dyn Fn() -> Option<Vec<u8>> + Send + Sync>;

/// Channels handed to a [`RelayLink`] when it is opened.
pub struct LinkIo {
    /// Encoded frames to write to the proxy.
    pub outbound: mpsc::UnboundedReceiver<Vec<u8>>,
    /// Raw frames read from the proxy.
    pub inbound: mpsc::UnboundedSender<Vec<u8>>,
    pub hello: HelloFrame,
    /// Flips to `true` when the messenger shuts down.
    pub shutdown: watch::Receiver<bool>,
}

/// A bidirectional byte link to the proxy tier.
pub trait RelayLink: Send + Sync + 'static {
    /// Starts the link's background task. Called once, from inside a
    /// Tokio runtime.
    fn open(&self, io: LinkIo) -> Result<(), MessengerError>;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Players currently connected to this server, keyed by lowercase name.
#[derive(Debug, Default)]
struct Roster {
    players: Mutex<BTreeMap<String, RosterEntry>>,
}

impl Roster {
    fn insert(&self, name: &str, display_name: &str) {
        lock(&self.players).insert(name.to_lowercase(), RosterEntry::new(name, display_name));
    }

    fn remove(&self, name: &str) -> Option<RosterEntry> {
        lock(&self.players).remove(&name.to_lowercase())
    }

    fn snapshot(&self) -> Vec<RosterEntry> {
        lock(&self.players).values().cloned().collect()
    }

    fn len(&self) -> usize {
        lock(&self.players).len()
    }
}

/// [`ChatMessenger`] over a relay link to the proxy.
pub struct ProcessRelayMessenger<L: RelayLink> {
    identity: ServerIdentity,
    link: L,
    lifecycle: Lifecycle,
    roster: Arc<Roster>,
    outbound: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    shutdown_tx: watch::Sender<bool>,
    carrier_log: LogThrottle,
}

impl<L: RelayLink> ProcessRelayMessenger<L> {
    pub fn new(identity: ServerIdentity, link: L) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            identity,
            link,
            lifecycle: Lifecycle::new(),
            roster: Arc::new(Roster::default()),
            outbound: Mutex::new(None),
            shutdown_tx,
            carrier_log: LogThrottle::default(),
        }
    }

    /// Number of players that can carry frames right now.
    pub fn online_count(&self) -> usize {
        self.roster.len()
    }

    fn start(&self, inbound: InboundQueue) -> Result<(), MessengerError> {
        let runtime = Handle::try_current().map_err(|_| MessengerError::NoRuntime)?;
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (in_tx, in_rx) = mpsc::unbounded_channel();

        self.link.open(LinkIo {
            outbound: out_rx,
            inbound: in_tx,
            hello: self.hello_frame(),
            shutdown: self.shutdown_tx.subscribe(),
        })?;
        runtime.spawn(decode_inbound(in_rx, inbound, self.shutdown_tx.subscribe()));

        *lock(&self.outbound) = Some(out_tx);
        Ok(())
    }

    fn hello_frame(&self) -> HelloFrame {
        let identity = self.identity.clone();
        let roster = Arc::clone(&self.roster);
        Arc::new(move || {
            let hello = ControlFrame::Hello(ServerHello {
                server_id: identity.id.clone(),
                server_display_name: identity.display_name.clone(),
                players: roster.snapshot(),
            });
            RelayCodec
                .encode_control(&hello)
                .inspect_err(|e| tracing::warn!(error = %e, "failed to encode SERVER_HELLO"))
                .ok()
        })
    }

    fn send_frame(&self, frame: Vec<u8>) -> Result<(), MessengerError> {
        lock(&self.outbound)
            .as_ref()
            .ok_or(MessengerError::LinkClosed)?
            .send(frame)
            .map_err(|_| MessengerError::LinkClosed)
    }

    /// Presence frames are roster bookkeeping, so they skip the carrier
    /// check: the last player leaving still has to be reported.
    fn send_presence(&self, name: &str, display_name: &str, online: bool) {
        if self.lifecycle.state() != MessengerState::Initialized {
            return;
        }
        let presence = ControlFrame::Presence(PlayerPresence {
            player_name: name.to_string(),
            display_name: display_name.to_string(),
            online,
        });
        let result = RelayCodec
            .encode_control(&presence)
            .map_err(MessengerError::from)
            .and_then(|frame| self.send_frame(frame));
        if let Err(e) = result {
            tracing::debug!(player = name, online, error = %e, "presence update not sent");
        }
    }
}

impl<L: RelayLink> ChatMessenger for ProcessRelayMessenger<L> {
    fn mode(&self) -> TransportMode {
        TransportMode::ProcessRelay
    }

    fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    fn state(&self) -> MessengerState {
        self.lifecycle.state()
    }

    fn initialize(&self, inbound: InboundQueue) -> Result<(), MessengerError> {
        self.lifecycle.begin()?;
        if let Err(e) = self.start(inbound) {
            tracing::warn!(error = %e, "relay messenger failed to start");
            self.shutdown();
            return Err(e);
        }
        tracing::info!(
            server_id = %self.identity.id,
            channel = RELAY_CHANNEL,
            "relay messenger initialized"
        );
        Ok(())
    }

    fn shutdown(&self) {
        if self.lifecycle.shut_down() == MessengerState::ShutDown {
            return;
        }
        self.shutdown_tx.send_replace(true);
        lock(&self.outbound).take();
        tracing::info!(server_id = %self.identity.id, "relay messenger shut down");
    }

    fn publish(&self, envelope: Envelope) -> Result<(), MessengerError> {
        self.lifecycle.ensure_running("publish")?;

        if self.roster.len() == 0 {
            if self.carrier_log.should_log() {
                tracing::warn!(
                    kind = %envelope.kind(),
                    "no player online to carry relay frames, dropping"
                );
            }
            return Err(MessengerError::NoCarrier);
        }

        let frame = RelayCodec.encode(&envelope)?;
        self.send_frame(frame)
    }

    fn player_joined(&self, name: &str, display_name: &str) {
        self.roster.insert(name, display_name);
        self.send_presence(name, display_name, true);
    }

    fn player_left(&self, name: &str) {
        if let Some(entry) = self.roster.remove(name) {
            self.send_presence(&entry.name, &entry.display_name, false);
        }
    }
}

/// Decodes raw frames from the link and queues envelopes for the main
/// thread. Control frames from the proxy are ignored.
async fn decode_inbound(
    mut frames: mpsc::UnboundedReceiver<Vec<u8>>,
    inbound: InboundQueue,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let frame = tokio::select! {
            frame = frames.recv() => frame,
            _ = shutdown.changed() => None,
        };
        let Some(frame) = frame else { break };

        match RelayCodec.decode_frame(&frame) {
            Ok(RelayFrame::Envelope(envelope)) => {
                if !inbound.push(envelope) {
                    break;
                }
            }
            Ok(RelayFrame::Control(control)) => {
                tracing::debug!(kind = %control.kind(), "ignoring control frame from proxy");
            }
            Err(e) => tracing::debug!(error = %e, "dropping undecodable relay frame"),
        }
    }
    tracing::debug!("relay decode task stopped");
}
