//! A full battle driven through the transport, from announcement to result.

use std::sync::Arc;

use battle_sync::network::codec::WireFormat;
use battle_sync::telemetry::{CollectingObserver, ViolationKind, ViolationSeverity};
use battle_sync::{
    assert_no_violations, assert_violation, BattleEventKind, CountdownPoll, LocalTransport,
    ManualClock, Phase, SessionBuilder, SessionEvent, StopReason, UserId,
};
use chrono::TimeDelta;

use crate::common::{battle, init_tracing, t0};

const START_JSON: &str = r#"{
    "id": "b-100",
    "streamId": "s1",
    "status": "active",
    "participant1": {"userId": "alice", "username": "Alice", "score": 0, "giftValue": 0},
    "participant2": {"userId": "bob", "username": "Bob", "avatar": "https://cdn.example/bob.png", "score": 0, "giftValue": 0},
    "duration": 120,
    "startedAt": "2024-05-01T20:00:00Z"
}"#;

#[test]
fn json_snapshots_drive_the_session() {
    init_tracing();
    let transport = LocalTransport::new();
    let clock = Arc::new(ManualClock::new(t0()));
    let observer = Arc::new(CollectingObserver::new());
    let mut session = SessionBuilder::new()
        .with_clock(clock.clone())
        .with_violation_observer(observer.clone())
        .start(Arc::new(transport.clone()), "s1")
        .unwrap();

    let delivered = transport
        .deliver_encoded(BattleEventKind::Start, WireFormat::Json, START_JSON.as_bytes())
        .unwrap();
    assert_eq!(delivered, 1);

    let current = session.current().unwrap();
    assert_eq!(current.phase, Phase::Active);
    assert_eq!(current.participant_a.username, "Alice");
    assert_eq!(current.started_at, Some(t0()));

    clock.advance(TimeDelta::seconds(45));
    assert_eq!(session.remaining_seconds(), Some(75));
    let board = session.scoreboard().unwrap();
    assert_eq!(board.countdown.as_deref(), Some("1:15"));
    assert!(board.voting_open);
    assert_eq!((board.left.percent, board.right.percent), (50, 50));

    assert_no_violations!(observer);
    let events: Vec<_> = session.events().collect();
    assert!(matches!(
        events.as_slice(),
        [SessionEvent::BattleStarted { phase: Phase::Active, .. }]
    ));
}

#[test]
fn countdown_reaches_zero_without_changing_phase() {
    let transport = LocalTransport::new();
    let clock = Arc::new(ManualClock::new(t0()));
    let mut session = SessionBuilder::new()
        .with_clock(clock.clone())
        .start(Arc::new(transport.clone()), "s1")
        .unwrap();
    transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Active, (0, 0)));

    assert_eq!(session.poll_countdown(), CountdownPoll::Tick { remaining: 120 });
    assert_eq!(session.poll_countdown(), CountdownPoll::NotDue);

    clock.advance(TimeDelta::seconds(130));
    assert_eq!(session.remaining_seconds(), Some(0));
    assert_eq!(session.poll_countdown(), CountdownPoll::Tick { remaining: 0 });
    assert_eq!(
        session.poll_countdown(),
        CountdownPoll::Stopped(StopReason::ReachedZero)
    );
    assert_eq!(session.poll_countdown(), CountdownPoll::Inactive);
    assert_eq!(session.phase(), Some(Phase::Active));

    // The server moves the phase on; the countdown stays out of it.
    transport.deliver_battle(BattleEventKind::Update, &battle("b1", "s1", Phase::Voting, (0, 0)));
    assert_eq!(session.remaining_seconds(), None);
    assert_eq!(session.poll_countdown(), CountdownPoll::Inactive);
}

#[test]
fn phase_exit_stops_countdown() {
    let transport = LocalTransport::new();
    let clock = Arc::new(ManualClock::new(t0()));
    let mut session = SessionBuilder::new()
        .with_clock(clock.clone())
        .start(Arc::new(transport.clone()), "s1")
        .unwrap();
    transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Active, (0, 0)));
    assert!(matches!(session.poll_countdown(), CountdownPoll::Tick { .. }));

    transport.deliver_battle(BattleEventKind::End, &battle("b1", "s1", Phase::Cancelled, (0, 0)));
    assert_eq!(
        session.poll_countdown(),
        CountdownPoll::Stopped(StopReason::PhaseExit)
    );
    let events: Vec<_> = session.events().collect();
    assert!(events.contains(&SessionEvent::CountdownStopped {
        reason: StopReason::PhaseExit
    }));
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::BattleEnded {
            phase: Phase::Cancelled,
            winner_id: None,
            ..
        }
    )));
}

#[test]
fn terminal_battle_is_immutable() {
    let transport = LocalTransport::new();
    let observer = Arc::new(CollectingObserver::new());
    let session = SessionBuilder::new()
        .with_violation_observer(observer.clone())
        .start(Arc::new(transport.clone()), "s1")
        .unwrap();

    transport.deliver_battle(BattleEventKind::End, &battle("b1", "s1", Phase::Completed, (9, 3)));
    let mut other_winner = battle("b1", "s1", Phase::Completed, (9, 3));
    other_winner.winner_id = Some(UserId::new("bob"));
    transport.deliver_battle(BattleEventKind::End, &other_winner);
    transport.deliver_battle(BattleEventKind::Update, &battle("b1", "s1", Phase::Active, (9, 3)));

    let current = session.current().unwrap();
    assert_eq!(current.winner_id, Some(UserId::new("alice")));
    assert_eq!(current.phase, Phase::Completed);
    assert_violation!(observer, ViolationKind::TerminalState);
    let rejected = observer.violations_of_kind(ViolationKind::TerminalState);
    assert_eq!(rejected.len(), 2);
    assert!(rejected
        .iter()
        .all(|v| v.severity == ViolationSeverity::Warning));
}

#[test]
fn malformed_json_is_a_decode_error_not_a_state_change() {
    let transport = LocalTransport::new();
    let session = SessionBuilder::new()
        .start(Arc::new(transport.clone()), "s1")
        .unwrap();
    let result = transport.deliver_encoded(BattleEventKind::Update, WireFormat::Json, b"{not json");
    assert!(result.is_err());
    assert!(session.current().is_none());
}

#[test]
fn missing_field_is_reported_with_its_wire_name() {
    let transport = LocalTransport::new();
    let observer = Arc::new(CollectingObserver::new());
    let session = SessionBuilder::new()
        .with_violation_observer(observer.clone())
        .start(Arc::new(transport.clone()), "s1")
        .unwrap();
    let json = START_JSON.replace(r#""duration": 120,"#, "");
    transport
        .deliver_encoded(BattleEventKind::Start, WireFormat::Json, json.as_bytes())
        .unwrap();

    assert!(session.current().is_none());
    assert_violation!(observer, ViolationKind::MalformedSnapshot, "missing duration");
    let violations = observer.violations_of_kind(ViolationKind::MalformedSnapshot);
    assert_eq!(violations.len(), 1);
    assert!(violations[0].message.contains("duration"));
}
