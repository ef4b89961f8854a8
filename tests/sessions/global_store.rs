//! Sessions sharing the process-wide store.
//!
//! The global store is shared by every test in this binary, so these run serially.

use std::sync::Arc;

use battle_sync::telemetry::CollectingObserver;
use battle_sync::{
    assert_no_violations, BattleEventKind, BattleId, BattleStoreHandle, BattleSyncError,
    LocalTransport, Phase, SessionBuilder, StreamId, VoteDispatch,
};
use serial_test::serial;

use crate::common::battle;

#[test]
#[serial]
fn global_store_is_shared_and_cleared_by_last_subscriber() {
    let transport = LocalTransport::new();
    let first = SessionBuilder::new()
        .with_global_store()
        .start(Arc::new(transport.clone()), "s1")
        .unwrap();
    let second = SessionBuilder::new()
        .with_global_store()
        .start(Arc::new(transport.clone()), "s1")
        .unwrap();
    assert!(first.store().ptr_eq(BattleStoreHandle::global()));
    assert!(first.store().ptr_eq(second.store()));

    transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Active, (0, 0)));
    assert!(BattleStoreHandle::global().get_state().is_some());

    drop(first);
    assert!(BattleStoreHandle::global().get_state().is_some());
    drop(second);
    assert!(BattleStoreHandle::global().get_state().is_none());
}

#[test]
#[serial]
fn reading_global_store_without_subscribers() {
    let store = BattleStoreHandle::global();
    assert_eq!(store.listener_count(), 0);
    assert!(store.get_state().is_none());
}

#[test]
#[serial]
fn global_store_follows_one_stream_at_a_time() {
    let transport = LocalTransport::new();
    let observer = Arc::new(CollectingObserver::new());
    let viewer = SessionBuilder::new()
        .with_global_store()
        .with_violation_observer(observer.clone())
        .start(Arc::new(transport.clone()), "s1")
        .unwrap();
    let other = SessionBuilder::new()
        .with_global_store()
        .start(Arc::new(transport.clone()), "s2");
    assert!(matches!(other, Err(BattleSyncError::InvalidRequest { .. })));

    transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Pending, (0, 0)));
    transport.deliver_battle(BattleEventKind::Start, &battle("b2", "s2", Phase::Active, (0, 0)));
    assert_eq!(viewer.current().unwrap().id, BattleId::new("b1"));
    assert_eq!(
        viewer.vote("alice"),
        VoteDispatch::Sent {
            battle_id: BattleId::new("b1")
        }
    );
    assert_no_violations!(observer);

    drop(viewer);
    assert_eq!(BattleStoreHandle::global().followed_stream(), None);
    let next = SessionBuilder::new()
        .with_global_store()
        .start(Arc::new(transport.clone()), "s2")
        .unwrap();
    assert_eq!(next.stream_id(), Some(&StreamId::new("s2")));
}
