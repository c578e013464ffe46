//! Reply targets: who each player last whispered with.
//!
//! Every successful whisper, sent or received, overwrites the entry of the
//! local player involved. `/r` then reads it back. Entries are only ever
//! about players on this server and are never shared between processes.

use dashmap::DashMap;
use relaychat_protocol::{PlayerId, ServerId};

/// Where a reply partner was when the entry was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartnerLocation {
    /// On this server. Replies re-resolve the partner by id.
    Local,
    /// Somewhere else in the network. `server_id` is `None` when the
    /// hosting server is not known yet, which is the case for whispers
    /// this server sent out.
    Remote { server_id: Option<ServerId> },
}

/// The last whisper partner of one player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplyTarget {
    partner_id: PlayerId,
    partner_name: String,
    location: PartnerLocation,
}

impl ReplyTarget {
    /// A partner connected to this server.
    pub fn local(partner_id: PlayerId, partner_name: impl Into<String>) -> Self {
        Self {
            partner_id,
            partner_name: partner_name.into(),
            location: PartnerLocation::Local,
        }
    }

    /// A partner on another server.
    ///
    /// Remote partners whose id is unknown use [`PlayerId::UNKNOWN`].
    pub fn remote(
        partner_id: PlayerId,
        partner_name: impl Into<String>,
        server_id: Option<ServerId>,
    ) -> Self {
        Self {
            partner_id,
            partner_name: partner_name.into(),
            location: PartnerLocation::Remote { server_id },
        }
    }

    pub fn partner_id(&self) -> PlayerId {
        self.partner_id
    }

    /// Name used to address the partner in a reply.
    pub fn partner_name(&self) -> &str {
        &self.partner_name
    }

    pub fn location(&self) -> &PartnerLocation {
        &self.location
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.location, PartnerLocation::Remote { .. })
    }
}

/// Concurrent map from a local player to their reply target.
///
/// Reads and writes may come from any thread. The last write wins.
#[derive(Debug, Default)]
pub struct ReplyTracker {
    targets: DashMap<PlayerId, ReplyTarget>,
}

impl ReplyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `target` as the reply partner of `owner`, replacing any
    /// previous entry.
    pub fn set_target(&self, owner: PlayerId, target: ReplyTarget) {
        tracing::trace!(%owner, partner = %target.partner_name, "reply target set");
        self.targets.insert(owner, target);
    }

    /// Returns a copy of `owner`'s reply target, if any.
    pub fn get_target(&self, owner: PlayerId) -> Option<ReplyTarget> {
        self.targets.get(&owner).map(|entry| entry.value().clone())
    }

    /// Forgets `owner`'s reply target. Entries that point *at* `owner`
    /// are left alone; they resolve to "not found" on the next reply.
    pub fn clear(&self, owner: PlayerId) -> Option<ReplyTarget> {
        self.targets.remove(&owner).map(|(_, target)| target)
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_set_target_overwrites_previous_entry() {
        let tracker = ReplyTracker::new();
        let ann = PlayerId::random();
        let bob = PlayerId::random();

        tracker.set_target(ann, ReplyTarget::local(bob, "Bob"));
        tracker.set_target(
            ann,
            ReplyTarget::remote(PlayerId::UNKNOWN, "Cid", Some(ServerId::new("s2"))),
        );

        let target = tracker.get_target(ann).unwrap();
        assert_eq!(target.partner_name(), "Cid");
        assert!(target.partner_id().is_unknown());
        assert_eq!(
            target.location(),
            &PartnerLocation::Remote {
                server_id: Some(ServerId::new("s2"))
            }
        );
        assert_eq!(tracker.len(), 1);
    }

    #[test]
    fn test_get_target_missing_owner_returns_none() {
        let tracker = ReplyTracker::new();
        assert!(tracker.get_target(PlayerId::random()).is_none());
    }

    #[test]
    fn test_clear_removes_only_owner_entry() {
        let tracker = ReplyTracker::new();
        let ann = PlayerId::random();
        let bob = PlayerId::random();
        tracker.set_target(ann, ReplyTarget::local(bob, "Bob"));
        tracker.set_target(bob, ReplyTarget::local(ann, "Ann"));

        let removed = tracker.clear(ann);

        assert_eq!(removed.map(|t| t.partner_id()), Some(bob));
        assert!(tracker.get_target(ann).is_none());
        // Bob still points at Ann even though Ann's entry is gone.
        assert_eq!(tracker.get_target(bob).unwrap().partner_id(), ann);
    }

    #[test]
    fn test_set_target_from_many_threads_keeps_one_entry_per_owner() {
        let tracker = Arc::new(ReplyTracker::new());
        let owners: Vec<PlayerId> = (0..8).map(|_| PlayerId::random()).collect();

        let handles: Vec<_> = (0..4)
            .map(|n| {
                let tracker = Arc::clone(&tracker);
                let owners = owners.clone();
                std::thread::spawn(move || {
                    for owner in owners {
                        tracker.set_target(owner, ReplyTarget::local(PlayerId::random(), format!("p{n}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tracker.len(), owners.len());
    }
}
