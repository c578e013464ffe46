//! In-process relay link.
//!
//! [`memory_relay`] returns both ends of a link: the [`MemoryRelayLink`]
//! goes into a [`ProcessRelayMessenger`](crate::ProcessRelayMessenger), and
//! the [`MemoryRelayPeer`] plays the proxy's side. The peer implements
//! [`Connection`], so a proxy can serve it exactly like a WebSocket.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use relaychat_transport::{Connection, ConnectionId, TransportError};
use tokio::runtime::Handle;
use tokio::sync::mpsc;

use super::{LinkIo, RelayLink, lock};
use crate::MessengerError;

/// Memory peers count down from the top so their ids never collide with
/// socket connections in the same process.
static NEXT_PEER_ID: AtomicU64 = AtomicU64::new(u64::MAX);

type Ends = (mpsc::UnboundedSender<Vec<u8>>, mpsc::UnboundedReceiver<Vec<u8>>);

/// Server-side end of an in-process link. Can be opened once.
pub struct MemoryRelayLink {
    ends: Mutex<Option<Ends>>,
}

/// Proxy-side end of an in-process link.
pub struct MemoryRelayPeer {
    id: ConnectionId,
    to_server: Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    from_server: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

/// Creates a connected link/peer pair.
pub fn memory_relay() -> (MemoryRelayLink, MemoryRelayPeer) {
    let (to_server_tx, to_server_rx) = mpsc::unbounded_channel();
    let (from_server_tx, from_server_rx) = mpsc::unbounded_channel();

    let link = MemoryRelayLink {
        ends: Mutex::new(Some((from_server_tx, to_server_rx))),
    };
    let peer = MemoryRelayPeer {
        id: ConnectionId::new(NEXT_PEER_ID.fetch_sub(1, Ordering::Relaxed)),
        to_server: Mutex::new(Some(to_server_tx)),
        from_server: tokio::sync::Mutex::new(from_server_rx),
    };
    (link, peer)
}

impl RelayLink for MemoryRelayLink {
    fn open(&self, io: LinkIo) -> Result<(), MessengerError> {
        let runtime = Handle::try_current().map_err(|_| MessengerError::NoRuntime)?;
        let (to_peer, from_peer) = lock(&self.ends)
            .take()
            .ok_or_else(|| MessengerError::LinkUnavailable("memory link already opened".into()))?;
        runtime.spawn(run_memory_link(to_peer, from_peer, io));
        Ok(())
    }
}

async fn run_memory_link(
    to_peer: mpsc::UnboundedSender<Vec<u8>>,
    mut from_peer: mpsc::UnboundedReceiver<Vec<u8>>,
    mut io: LinkIo,
) {
    if let Some(hello) = (io.hello)() {
        let _ = to_peer.send(hello);
    }

    loop {
        tokio::select! {
            frame = io.outbound.recv() => match frame {
                Some(frame) => {
                    if to_peer.send(frame).is_err() {
                        break;
                    }
                }
                None => break,
            },
            frame = from_peer.recv() => match frame {
                Some(frame) => {
                    if io.inbound.send(frame).is_err() {
                        break;
                    }
                }
                None => break,
            },
            _ = io.shutdown.changed() => break,
        }
    }
    tracing::debug!("memory relay link closed");
}

impl Connection for MemoryRelayPeer {
    type Error = TransportError;

    async fn send(&self, data: &[u8]) -> Result<(), Self::Error> {
        let closed = || TransportError::ConnectionClosed("memory relay link closed".into());
        lock(&self.to_server)
            .as_ref()
            .ok_or_else(closed)?
            .send(data.to_vec())
            .map_err(|_| closed())
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, Self::Error> {
        Ok(self.from_server.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), Self::Error> {
        lock(&self.to_server).take();
        Ok(())
    }

    fn id(&self) -> ConnectionId {
        self.id
    }
}
