//! Broker stream transport.
//!
//! Envelopes are flattened into field maps and appended to one stream per
//! category on a shared broker:
//!
//! | stream            | carries                                   |
//! |-------------------|-------------------------------------------|
//! | `<ns>:global`     | global chat                               |
//! | `<ns>:notice`     | notices                                   |
//! | `<ns>:whisper`    | whispers, acks, not-found (`type` field)  |
//!
//! Every server reads every stream through the consumer group
//! `<ns>-group` under its own server id, skipping entries it published
//! itself. There is no proxy in this mode, so each server decides for
//! itself whether an inbound whisper is for one of its players.

mod memory;

pub use memory::MemoryBroker;

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use relaychat_protocol::{
    Envelope, EnvelopeKind, FieldCodec, FieldMap, ServerId, ServerIdentity, TransportMode,
};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};

use crate::lifecycle::Lifecycle;
use crate::{ChatMessenger, InboundQueue, LogThrottle, MessengerError, MessengerState};

/// Errors reported by a [`StreamBroker`].
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("broker unreachable: {0}")]
    Unreachable(String),

    #[error("no consumer group {group} on stream {stream}")]
    NoSuchGroup { stream: String, group: String },

    #[error("broker connection closed")]
    Closed,
}

/// One entry read from a stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    pub id: String,
    pub fields: FieldMap,
}

/// An append-only stream store with consumer groups.
///
/// Implementations must deliver every entry appended after a group was
/// created to every consumer of that group exactly once, tracking each
/// consumer's position durably. This is fan-out, not work sharing: every
/// server must see every chat line.
pub trait StreamBroker: Send + Sync + 'static {
    /// Creates `group` on `stream` if it does not exist yet, creating the
    /// stream as well if needed. New groups start at the end of the stream.
    fn ensure_group(
        &self,
        stream: &str,
        group: &str,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Appends an entry and returns its id.
    fn publish(
        &self,
        stream: &str,
        fields: FieldMap,
    ) -> impl Future<Output = Result<String, BrokerError>> + Send;

    /// Reads up to `count` entries this consumer has not seen, waiting up
    /// to `block` for at least one. An empty batch means the wait timed out.
    fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> impl Future<Output = Result<Vec<StreamEntry>, BrokerError>> + Send;

    /// Acknowledges processed entries.
    fn ack(
        &self,
        stream: &str,
        group: &str,
        ids: &[String],
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Releases the connection. Pending reads return [`BrokerError::Closed`].
    ///
    /// Only the broker's owner calls this. One broker may serve several
    /// messengers, and [`BrokerStreamMessenger::shutdown`] leaves it open.
    fn close(&self) -> impl Future<Output = ()> + Send;
}

/// Stream and group names derived from a namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamNames {
    pub global: String,
    pub notice: String,
    pub whisper: String,
    pub group: String,
}

impl StreamNames {
    pub fn new(namespace: &str) -> Self {
        Self {
            global: format!("{namespace}:global"),
            notice: format!("{namespace}:notice"),
            whisper: format!("{namespace}:whisper"),
            group: format!("{namespace}-group"),
        }
    }

    /// The stream an envelope of `kind` is published to.
    pub fn for_kind(&self, kind: EnvelopeKind) -> &str {
        match kind {
            EnvelopeKind::GlobalChat => &self.global,
            EnvelopeKind::Notice => &self.notice,
            EnvelopeKind::Whisper | EnvelopeKind::WhisperAck | EnvelopeKind::WhisperNotFound => {
                &self.whisper
            }
        }
    }
}

impl Default for StreamNames {
    fn default() -> Self {
        Self::new("relaychat")
    }
}

/// Consumer tuning.
#[derive(Debug, Clone)]
pub struct BrokerSettings {
    /// Entries per read.
    pub batch_size: usize,
    /// How long one read waits for new entries.
    pub block: Duration,
    /// Pause after a failed read before retrying.
    pub retry_delay: Duration,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            batch_size: 10,
            block: Duration::from_secs(1),
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// [`ChatMessenger`] over a [`StreamBroker`].
pub struct BrokerStreamMessenger<B: StreamBroker> {
    identity: ServerIdentity,
    broker: Arc<B>,
    names: StreamNames,
    settings: BrokerSettings,
    lifecycle: Lifecycle,
    publisher: Mutex<Option<mpsc::UnboundedSender<(String, FieldMap)>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl<B: StreamBroker> BrokerStreamMessenger<B> {
    pub fn new(identity: ServerIdentity, broker: Arc<B>, names: StreamNames) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            identity,
            broker,
            names,
            settings: BrokerSettings::default(),
            lifecycle: Lifecycle::new(),
            publisher: Mutex::new(None),
            shutdown_tx,
        }
    }

    pub fn with_settings(mut self, settings: BrokerSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn names(&self) -> &StreamNames {
        &self.names
    }

    fn start(&self, inbound: InboundQueue) -> Result<(), MessengerError> {
        let runtime = Handle::try_current().map_err(|_| MessengerError::NoRuntime)?;

        let (tx, rx) = mpsc::unbounded_channel();
        runtime.spawn(publish_loop(Arc::clone(&self.broker), rx));

        let streams = [
            (self.names.global.clone(), Some(EnvelopeKind::GlobalChat)),
            (self.names.notice.clone(), Some(EnvelopeKind::Notice)),
            (self.names.whisper.clone(), None),
        ];
        for (stream, kind) in streams {
            let consumer = StreamConsumer {
                broker: Arc::clone(&self.broker),
                stream,
                kind,
                group: self.names.group.clone(),
                local: self.identity.id.clone(),
                settings: self.settings.clone(),
                inbound: inbound.clone(),
                shutdown: self.shutdown_tx.subscribe(),
            };
            runtime.spawn(consumer.run());
        }

        *self.publisher.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        Ok(())
    }
}

impl<B: StreamBroker> ChatMessenger for BrokerStreamMessenger<B> {
    fn mode(&self) -> TransportMode {
        TransportMode::BrokerStream
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
            tracing::warn!(error = %e, "broker messenger failed to start");
            self.shutdown();
            return Err(e);
        }
        tracing::info!(
            server_id = %self.identity.id,
            group = %self.names.group,
            "broker messenger initialized"
        );
        Ok(())
    }

    /// Stops this server's publisher and consumers. The broker itself stays
    /// open for the other servers sharing it.
    fn shutdown(&self) {
        if self.lifecycle.shut_down() == MessengerState::ShutDown {
            return;
        }
        self.shutdown_tx.send_replace(true);
        // Dropping the sender ends the publish loop once its queue drains.
        self.publisher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        tracing::info!(server_id = %self.identity.id, "broker messenger shut down");
    }

    fn publish(&self, envelope: Envelope) -> Result<(), MessengerError> {
        self.lifecycle.ensure_running("publish")?;
        let stream = self.names.for_kind(envelope.kind()).to_string();
        let fields = FieldCodec.encode(&envelope);

        self.publisher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .ok_or(MessengerError::LinkClosed)?
            .send((stream, fields))
            .map_err(|_| MessengerError::LinkClosed)
    }
}

/// Appends queued entries in order. Failures are logged and the entry is
/// dropped.
async fn publish_loop<B: StreamBroker>(
    broker: Arc<B>,
    mut queue: mpsc::UnboundedReceiver<(String, FieldMap)>,
) {
    let failure_log = LogThrottle::new(Duration::from_secs(10));
    while let Some((stream, fields)) = queue.recv().await {
        if let Err(e) = broker.publish(&stream, fields).await {
            if failure_log.should_log() {
                tracing::warn!(%stream, error = %e, "broker publish failed, entry dropped");
            }
        }
    }
    tracing::debug!("broker publisher stopped");
}

struct StreamConsumer<B: StreamBroker> {
    broker: Arc<B>,
    stream: String,
    /// Fixed kind for single-kind streams; `None` means read `type`.
    kind: Option<EnvelopeKind>,
    group: String,
    local: ServerId,
    settings: BrokerSettings,
    inbound: InboundQueue,
    shutdown: watch::Receiver<bool>,
}

impl<B: StreamBroker> StreamConsumer<B> {
    async fn run(mut self) {
        let mut group_ready = false;
        let failure_log = LogThrottle::new(self.settings.retry_delay * 6);

        loop {
            if *self.shutdown.borrow() {
                break;
            }

            if !group_ready {
                match self.broker.ensure_group(&self.stream, &self.group).await {
                    Ok(()) => group_ready = true,
                    Err(e) => {
                        if failure_log.should_log() {
                            tracing::warn!(stream = %self.stream, error = %e, "cannot create consumer group");
                        }
                        if !self.pause().await {
                            break;
                        }
                        continue;
                    }
                }
            }

            let read = tokio::select! {
                read = self.broker.read_group(
                    &self.stream,
                    &self.group,
                    self.local.as_str(),
                    self.settings.batch_size,
                    self.settings.block,
                ) => read,
                _ = self.shutdown.changed() => break,
            };

            match read {
                Ok(entries) => {
                    if !self.deliver(entries).await {
                        break;
                    }
                }
                Err(BrokerError::Closed) => break,
                Err(e) => {
                    if failure_log.should_log() {
                        tracing::warn!(stream = %self.stream, error = %e, "broker read failed");
                    }
                    if matches!(e, BrokerError::NoSuchGroup { .. }) {
                        group_ready = false;
                    }
                    if !self.pause().await {
                        break;
                    }
                }
            }
        }
        tracing::debug!(stream = %self.stream, "broker consumer stopped");
    }

    /// Decodes, acknowledges and queues a batch. Returns `false` once the
    /// dispatcher is gone.
    async fn deliver(&self, entries: Vec<StreamEntry>) -> bool {
        if entries.is_empty() {
            return true;
        }

        let mut ids = Vec::with_capacity(entries.len());
        let mut open = true;
        for entry in entries {
            ids.push(entry.id);
            let decoded = match self.kind {
                Some(kind) => FieldCodec.decode_as(kind, &entry.fields),
                None => FieldCodec.decode(&entry.fields),
            };
            match decoded {
                Ok(envelope) if envelope.is_echo_of(&self.local) => {
                    tracing::trace!(stream = %self.stream, "skipping own entry");
                }
                Ok(envelope) => {
                    if open && !self.inbound.push(envelope) {
                        open = false;
                    }
                }
                Err(e) => {
                    tracing::debug!(stream = %self.stream, error = %e, "dropping undecodable entry");
                }
            }
        }

        if let Err(e) = self.broker.ack(&self.stream, &self.group, &ids).await {
            tracing::debug!(stream = %self.stream, error = %e, "ack failed");
        }
        open
    }

    /// Sleeps for the retry delay. Returns `false` if shutdown arrived first.
    async fn pause(&mut self) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.settings.retry_delay) => true,
            _ = self.shutdown.changed() => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_names_from_namespace() {
        let names = StreamNames::new("net");
        assert_eq!(names.global, "net:global");
        assert_eq!(names.notice, "net:notice");
        assert_eq!(names.whisper, "net:whisper");
        assert_eq!(names.group, "net-group");
    }

    #[test]
    fn test_for_kind_routes_whisper_family_to_one_stream() {
        let names = StreamNames::default();
        assert_eq!(names.for_kind(EnvelopeKind::GlobalChat), "relaychat:global");
        assert_eq!(names.for_kind(EnvelopeKind::Notice), "relaychat:notice");
        for kind in [
            EnvelopeKind::Whisper,
            EnvelopeKind::WhisperAck,
            EnvelopeKind::WhisperNotFound,
        ] {
            assert_eq!(names.for_kind(kind), "relaychat:whisper");
        }
    }

    #[test]
    fn test_broker_error_display() {
        let err = BrokerError::NoSuchGroup {
            stream: "a:global".into(),
            group: "a-group".into(),
        };
        assert_eq!(err.to_string(), "no consumer group a-group on stream a:global");
    }
}
