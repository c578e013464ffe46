//! Shared per-player stores used from several tasks at once.

use std::sync::Arc;

use relaychat_protocol::{PlayerId, ServerId};
use relaychat_session::{
    ChatMode, ChatModeStore, PartnerLocation, ReplyTarget, ReplyTracker,
};

#[tokio::test]
async fn test_tracker_shared_between_tasks_sees_last_write() {
    let tracker = Arc::new(ReplyTracker::new());
    let ann = PlayerId::random();

    let writer = {
        let tracker = Arc::clone(&tracker);
        tokio::spawn(async move {
            tracker.set_target(ann, ReplyTarget::local(PlayerId::random(), "Bob"));
            tracker.set_target(
                ann,
                ReplyTarget::remote(PlayerId::UNKNOWN, "Cid", Some(ServerId::new("s2"))),
            );
        })
    };
    writer.await.unwrap();

    let target = tracker.get_target(ann).unwrap();
    assert!(target.is_remote());
    assert_eq!(target.partner_name(), "Cid");
}

#[tokio::test]
async fn test_disconnect_clears_tracker_and_mode_for_leaving_player_only() {
    let tracker = ReplyTracker::new();
    let modes = ChatModeStore::new(ChatMode::Distance);
    let ann = PlayerId::random();
    let bob = PlayerId::random();

    tracker.set_target(ann, ReplyTarget::local(bob, "Bob"));
    tracker.set_target(bob, ReplyTarget::local(ann, "Ann"));
    modes.set(ann, ChatMode::Global);
    modes.set(bob, ChatMode::Global);

    tracker.clear(ann);
    modes.reset(ann);

    assert!(tracker.get_target(ann).is_none());
    assert_eq!(modes.get(ann), ChatMode::Distance);
    assert_eq!(
        tracker.get_target(bob).map(|t| t.location().clone()),
        Some(PartnerLocation::Local)
    );
    assert_eq!(modes.get(bob), ChatMode::Global);
}
