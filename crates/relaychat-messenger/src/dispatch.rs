//! Inbound subscriptions and main-thread delivery.
//!
//! Network tasks decode envelopes and push them onto an [`InboundQueue`].
//! Nothing else happens off-thread: handlers run only when the host drives
//! the [`MainThreadDispatcher`], either by calling [`pump`] from its tick
//! or by spawning [`run`] on a dedicated task.
//!
//! [`pump`]: MainThreadDispatcher::pump
//! [`run`]: MainThreadDispatcher::run

use std::collections::HashMap;
use std::sync::Arc;

use relaychat_protocol::{
    Envelope, EnvelopeKind, GlobalChatEnvelope, NoticeEnvelope, PlayerId, WhisperAckEnvelope,
    WhisperEnvelope,
};
use tokio::sync::mpsc;

/// Receives inbound envelopes on the main coordination thread.
///
/// Every hook has an empty default, so an implementor only overrides the
/// kinds it cares about.
pub trait InboundHandler: Send + Sync + 'static {
    fn on_global_chat(&self, _envelope: &GlobalChatEnvelope) {}

    fn on_notice(&self, _envelope: &NoticeEnvelope) {}

    fn on_whisper(&self, _envelope: &WhisperEnvelope) {}

    fn on_whisper_ack(&self, _envelope: &WhisperAckEnvelope) {}

    /// The proxy found no player called `target_name` anywhere.
    fn on_whisper_not_found(&self, _sender_id: PlayerId, _target_name: &str) {}
}

/// At most one handler per envelope kind.
#[derive(Default)]
pub struct Subscriptions {
    handlers: HashMap<EnvelopeKind, Arc<dyn InboundHandler>>,
}

impl Subscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `kind`, returning the handler it replaced.
    pub fn subscribe(
        &mut self,
        kind: EnvelopeKind,
        handler: Arc<dyn InboundHandler>,
    ) -> Option<Arc<dyn InboundHandler>> {
        let previous = self.handlers.insert(kind, handler);
        if previous.is_some() {
            tracing::debug!(%kind, "inbound handler replaced");
        }
        previous
    }

    /// Registers `handler` for every kind.
    pub fn subscribe_all(&mut self, handler: Arc<dyn InboundHandler>) {
        for kind in EnvelopeKind::ALL {
            self.subscribe(kind, Arc::clone(&handler));
        }
    }

    pub fn unsubscribe(&mut self, kind: EnvelopeKind) -> Option<Arc<dyn InboundHandler>> {
        self.handlers.remove(&kind)
    }

    pub fn is_subscribed(&self, kind: EnvelopeKind) -> bool {
        self.handlers.contains_key(&kind)
    }

    /// Hands `envelope` to its kind's handler. Returns `false` if nobody
    /// is subscribed.
    pub fn dispatch(&self, envelope: &Envelope) -> bool {
        let Some(handler) = self.handlers.get(&envelope.kind()) else {
            tracing::trace!(kind = %envelope.kind(), "no handler subscribed, dropping");
            return false;
        };

        match envelope {
            Envelope::GlobalChat(e) => handler.on_global_chat(e),
            Envelope::Notice(e) => handler.on_notice(e),
            Envelope::Whisper(e) => handler.on_whisper(e),
            Envelope::WhisperAck(e) => handler.on_whisper_ack(e),
            Envelope::WhisperNotFound(e) => {
                handler.on_whisper_not_found(e.sender_id(), e.target_name())
            }
        }
        true
    }
}

/// Sending half of the main coordination queue. Cheap to clone.
#[derive(Debug, Clone)]
pub struct InboundQueue {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl InboundQueue {
    /// Enqueues an envelope for main-thread delivery. Returns `false` if
    /// the dispatcher is gone.
    pub fn push(&self, envelope: Envelope) -> bool {
        self.tx.send(envelope).is_ok()
    }
}

/// Receiving half of the main coordination queue plus the subscriptions
/// it delivers to.
pub struct MainThreadDispatcher {
    rx: mpsc::UnboundedReceiver<Envelope>,
    subscriptions: Subscriptions,
}

/// Creates a connected queue/dispatcher pair.
pub fn inbound_queue() -> (InboundQueue, MainThreadDispatcher) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        InboundQueue { tx },
        MainThreadDispatcher {
            rx,
            subscriptions: Subscriptions::new(),
        },
    )
}

impl MainThreadDispatcher {
    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    pub fn subscriptions_mut(&mut self) -> &mut Subscriptions {
        &mut self.subscriptions
    }

    /// Delivers everything queued so far, in order, on the caller's
    /// thread. Returns how many envelopes were taken off the queue.
    pub fn pump(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(envelope) = self.rx.try_recv() {
            self.subscriptions.dispatch(&envelope);
            delivered += 1;
        }
        delivered
    }

    /// Delivers envelopes as they arrive until every [`InboundQueue`] is
    /// dropped.
    pub async fn run(mut self) {
        while let Some(envelope) = self.rx.recv().await {
            self.subscriptions.dispatch(&envelope);
        }
        tracing::debug!("inbound queue closed, dispatcher stopping");
    }
}
