//! Stream filtering and re-subscription.

use std::sync::Arc;

use battle_sync::telemetry::CollectingObserver;
use battle_sync::{
    assert_no_violations, BattleEventKind, BattleId, LocalTransport, Phase, SessionBuilder,
    SessionEvent, StreamId,
};

use crate::common::battle;

#[test]
fn snapshot_for_other_stream_is_a_silent_noop() {
    let transport = LocalTransport::new();
    let observer = Arc::new(CollectingObserver::new());
    let mut session = SessionBuilder::new()
        .with_violation_observer(observer.clone())
        .start(Arc::new(transport.clone()), "s1")
        .unwrap();
    transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Active, (2, 2)));
    let _ = session.events().count();

    let foreign = battle("b9", "s2", Phase::Voting, (50, 0));
    for kind in BattleEventKind::ALL {
        transport.deliver_battle(kind, &foreign);
    }

    assert_eq!(session.current().unwrap().id, BattleId::new("b1"));
    assert_eq!(session.events().len(), 0);
    assert_no_violations!(observer);
}

#[test]
fn resubscribe_leaves_no_old_handler_live() {
    let transport = LocalTransport::new();
    let mut session = SessionBuilder::new()
        .start(Arc::new(transport.clone()), "s1")
        .unwrap();

    for target in ["s2", "s3", "s4"] {
        session.switch_stream(target).unwrap();
        assert_eq!(transport.handler_count(), 3);
        for kind in BattleEventKind::ALL {
            assert_eq!(transport.handler_count_for(kind), 1);
        }
    }
    assert_eq!(session.stream_id(), Some(&StreamId::new("s4")));
}

#[test]
fn late_events_for_the_old_stream_change_nothing() {
    let transport = LocalTransport::new();
    let mut session = SessionBuilder::new()
        .start(Arc::new(transport.clone()), "s1")
        .unwrap();
    transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Active, (0, 0)));
    session.switch_stream("s2").unwrap();
    let _ = session.events().count();

    transport.deliver_battle(BattleEventKind::Update, &battle("b1", "s1", Phase::Voting, (4, 1)));
    transport.deliver_battle(BattleEventKind::End, &battle("b1", "s1", Phase::Completed, (4, 1)));
    assert!(session.current().is_none());
    assert_eq!(session.events().len(), 0);

    transport.deliver_battle(BattleEventKind::Start, &battle("b2", "s2", Phase::Pending, (0, 0)));
    assert_eq!(session.current().unwrap().id, BattleId::new("b2"));
}

#[test]
fn switching_reports_clear_then_switch() {
    let transport = LocalTransport::new();
    let mut session = SessionBuilder::new()
        .start(Arc::new(transport.clone()), "s1")
        .unwrap();
    transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Active, (0, 0)));
    let _ = session.events().count();

    session.switch_stream("s2").unwrap();
    let events: Vec<_> = session.events().collect();
    assert_eq!(
        events,
        vec![
            SessionEvent::BattleCleared {
                battle_id: BattleId::new("b1")
            },
            SessionEvent::StreamSwitched {
                from: StreamId::new("s1"),
                to: StreamId::new("s2"),
            },
        ]
    );
}

#[test]
fn two_sessions_on_one_transport_stay_independent() {
    let transport = LocalTransport::new();
    let first = SessionBuilder::new()
        .start(Arc::new(transport.clone()), "s1")
        .unwrap();
    let second = SessionBuilder::new()
        .start(Arc::new(transport.clone()), "s2")
        .unwrap();
    assert_eq!(transport.handler_count(), 6);

    transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Active, (0, 0)));
    transport.deliver_battle(BattleEventKind::Start, &battle("b2", "s2", Phase::Active, (0, 0)));
    assert_eq!(first.current().unwrap().id, BattleId::new("b1"));
    assert_eq!(second.current().unwrap().id, BattleId::new("b2"));

    drop(first);
    assert_eq!(transport.handler_count(), 3);
    assert!(second.current().is_some());
}
