//! In-process [`StreamBroker`].
//!
//! Good enough to run a whole fleet inside one test binary, or a handful
//! of servers embedded in one process. Everything lives in memory and is
//! gone when the broker is dropped.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use relaychat_protocol::{FieldMap, now_millis};
use tokio::sync::watch;

use super::{BrokerError, StreamBroker, StreamEntry};

#[derive(Debug, Default)]
struct StreamLog {
    entries: Vec<StreamEntry>,
    groups: HashMap<String, GroupState>,
}

#[derive(Debug, Default)]
struct GroupState {
    /// Offset the group was created at; new consumers start here.
    start: usize,
    cursors: HashMap<String, usize>,
    pending: HashSet<String>,
}

#[derive(Debug, Default)]
struct BrokerState {
    streams: HashMap<String, StreamLog>,
    next_seq: u64,
}

/// A [`StreamBroker`] backed by process memory.
#[derive(Debug)]
pub struct MemoryBroker {
    state: Mutex<BrokerState>,
    /// Bumped on every append so blocked readers wake up.
    appended: watch::Sender<u64>,
    closed: AtomicBool,
    unreachable: AtomicBool,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    pub fn new() -> Self {
        let (appended, _) = watch::channel(0);
        Self {
            state: Mutex::new(BrokerState::default()),
            appended,
            closed: AtomicBool::new(false),
            unreachable: AtomicBool::new(false),
        }
    }

    /// Simulates a network partition: while set, every call fails with
    /// [`BrokerError::Unreachable`].
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::Release);
    }

    /// Number of entries ever appended to `stream`.
    pub fn stream_len(&self, stream: &str) -> usize {
        self.lock().streams.get(stream).map_or(0, |log| log.entries.len())
    }

    /// Entries delivered to `group` but not yet acknowledged.
    pub fn pending_count(&self, stream: &str, group: &str) -> usize {
        self.lock()
            .streams
            .get(stream)
            .and_then(|log| log.groups.get(group))
            .map_or(0, |g| g.pending.len())
    }

    /// Every entry in `stream`, oldest first.
    pub fn entries(&self, stream: &str) -> Vec<StreamEntry> {
        self.lock()
            .streams
            .get(stream)
            .map(|log| log.entries.clone())
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, BrokerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), BrokerError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(BrokerError::Closed);
        }
        if self.unreachable.load(Ordering::Acquire) {
            return Err(BrokerError::Unreachable("memory broker partitioned".into()));
        }
        Ok(())
    }

    /// Takes the next batch for a consumer, if any is ready.
    fn take_batch(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
    ) -> Result<Vec<StreamEntry>, BrokerError> {
        let no_group = || BrokerError::NoSuchGroup {
            stream: stream.to_string(),
            group: group.to_string(),
        };

        let mut state = self.lock();
        let log = state.streams.get_mut(stream).ok_or_else(no_group)?;
        let available = log.entries.len();
        let group_state = log.groups.get_mut(group).ok_or_else(no_group)?;

        let start = group_state.start;
        let cursor = group_state.cursors.entry(consumer.to_string()).or_insert(start);
        let end = available.min(*cursor + count.max(1));
        let batch: Vec<StreamEntry> = log.entries[*cursor..end].to_vec();
        *cursor = end;

        group_state
            .pending
            .extend(batch.iter().map(|entry| entry.id.clone()));
        Ok(batch)
    }
}

impl StreamBroker for MemoryBroker {
    async fn ensure_group(&self, stream: &str, group: &str) -> Result<(), BrokerError> {
        self.check_available()?;
        let mut state = self.lock();
        let log = state.streams.entry(stream.to_string()).or_default();
        let start = log.entries.len();
        log.groups
            .entry(group.to_string())
            .or_insert_with(|| GroupState {
                start,
                ..GroupState::default()
            });
        Ok(())
    }

    async fn publish(&self, stream: &str, fields: FieldMap) -> Result<String, BrokerError> {
        self.check_available()?;
        let id = {
            let mut state = self.lock();
            state.next_seq += 1;
            let id = format!("{}-{}", now_millis(), state.next_seq);
            state
                .streams
                .entry(stream.to_string())
                .or_default()
                .entries
                .push(StreamEntry {
                    id: id.clone(),
                    fields,
                });
            id
        };
        self.appended.send_modify(|n| *n += 1);
        Ok(id)
    }

    async fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> Result<Vec<StreamEntry>, BrokerError> {
        let deadline = tokio::time::Instant::now() + block;
        let mut appended = self.appended.subscribe();

        loop {
            self.check_available()?;
            let batch = self.take_batch(stream, group, consumer, count)?;
            if !batch.is_empty() {
                return Ok(batch);
            }

            match tokio::time::timeout_at(deadline, appended.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return Err(BrokerError::Closed),
                Err(_) => return Ok(Vec::new()),
            }
        }
    }

    async fn ack(&self, stream: &str, group: &str, ids: &[String]) -> Result<(), BrokerError> {
        self.check_available()?;
        let mut state = self.lock();
        if let Some(group_state) = state
            .streams
            .get_mut(stream)
            .and_then(|log| log.groups.get_mut(group))
        {
            for id in ids {
                group_state.pending.remove(id);
            }
        }
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.appended.send_modify(|n| *n += 1);
    }
}
