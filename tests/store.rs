//! Store behavior observed through the shared handle.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]

#[path = "common/mod.rs"]
mod common;

use std::sync::{Arc, Mutex};

use battle_sync::store::{RejectReason, StoreChange};
use battle_sync::{ApplyOutcome, BattleId, BattleStoreHandle, OrderingPolicy, Phase, Side};

use common::{battle, t0};

#[test]
fn listeners_see_only_accepted_changes() {
    let store = BattleStoreHandle::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let _listener = store.subscribe(move |change: &StoreChange| {
        sink.lock().unwrap().push(change.clone());
    });

    let _ = store.apply(battle("b1", "s1", Phase::Active, (1, 0)));
    let _ = store.apply(battle("b1", "s1", Phase::Active, (1, 0)));
    let _ = store.apply(battle("b1", "s1", Phase::Pending, (1, 0)));
    let _ = store.apply(battle("b1", "s1", Phase::Voting, (2, 0)));

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert!(matches!(
        seen[0],
        StoreChange::Applied {
            outcome: ApplyOutcome::Created,
            ..
        }
    ));
    assert!(matches!(
        seen[1],
        StoreChange::Applied {
            outcome: ApplyOutcome::Replaced {
                from: Phase::Active,
                to: Phase::Voting
            },
            ..
        }
    ));
}

#[test]
fn listener_may_read_the_store() {
    let store = BattleStoreHandle::new();
    let reader = store.clone();
    let phases = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&phases);
    let _listener = store.subscribe(move |_| {
        sink.lock().unwrap().push(reader.get_state().map(|b| b.phase));
    });
    let _ = store.apply(battle("b1", "s1", Phase::Pending, (0, 0)));
    assert_eq!(*phases.lock().unwrap(), vec![Some(Phase::Pending)]);
}

#[test]
fn last_listener_clears_first_keeps() {
    let store = BattleStoreHandle::new();
    let a = store.subscribe(|_| {});
    let b = store.subscribe(|_| {});
    let _ = store.apply(battle("b1", "s1", Phase::Active, (0, 0)));

    a.unsubscribe();
    assert!(store.get_state().is_some());
    drop(b);
    assert!(store.get_state().is_none());
    assert_eq!(store.listener_count(), 0);
}

#[test]
fn score_regression_names_the_side() {
    let store = BattleStoreHandle::new();
    let _ = store.apply(battle("b1", "s1", Phase::Active, (5, 7)));
    let outcome = store.apply(battle("b1", "s1", Phase::Active, (5, 6)));
    assert_eq!(
        outcome,
        ApplyOutcome::Rejected(RejectReason::ScoreRegression {
            side: Side::B,
            held: 7,
            incoming: 6
        })
    );
}

#[test]
fn finished_battle_is_superseded_by_next_one() {
    let store = BattleStoreHandle::new();
    let _ = store.apply(battle("b1", "s1", Phase::Completed, (3, 1)));
    let outcome = store.apply(battle("b2", "s1", Phase::Pending, (0, 0)));
    assert_eq!(
        outcome,
        ApplyOutcome::Superseded {
            previous: BattleId::new("b1")
        }
    );
    assert_eq!(store.get_state().unwrap().id, BattleId::new("b2"));
}

#[test]
fn older_battle_never_displaces_newer() {
    let store = BattleStoreHandle::new();
    let mut newer = battle("b2", "s1", Phase::Active, (0, 0));
    newer.started_at = Some(t0() + chrono::TimeDelta::minutes(10));
    let _ = store.apply(newer);
    let outcome = store.apply(battle("b1", "s1", Phase::Completed, (3, 1)));
    assert!(matches!(
        outcome,
        ApplyOutcome::Rejected(RejectReason::ForeignBattle { .. })
    ));
}

#[test]
fn strict_sequence_orders_by_stamp() {
    let store = BattleStoreHandle::with_policy(OrderingPolicy::StrictSequence);
    let stamped = |phase, score, seq| {
        let mut b = battle("b1", "s1", phase, (score, 0));
        b.sequence = Some(seq);
        b
    };
    assert_eq!(store.apply(stamped(Phase::Active, 1, 1)), ApplyOutcome::Created);
    assert!(store.apply(stamped(Phase::Active, 3, 3)).is_accepted());
    assert!(matches!(
        store.apply(stamped(Phase::Active, 2, 2)),
        ApplyOutcome::Rejected(RejectReason::StaleSequence { held: 3, incoming: 2 })
    ));
    assert_eq!(
        store.apply(battle("b1", "s1", Phase::Voting, (4, 0))),
        ApplyOutcome::Rejected(RejectReason::MissingSequence)
    );
}
