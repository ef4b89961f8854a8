//! The transport seam, exercised through a hand-written implementation.

use std::sync::Arc;

use battle_sync::telemetry::CollectingObserver;
use battle_sync::{
    assert_no_violations, BattleEventKind, BattleTransport, OutboundMessage, Phase,
    SessionBuilder, SnapshotHandler, Unsubscribe, WireSnapshot,
};
use parking_lot::Mutex;

use crate::common::battle;

/// Records registrations and releases; delivery is driven by the test.
#[derive(Default)]
struct RecordingTransport {
    handlers: Mutex<Vec<(BattleEventKind, Arc<Mutex<SnapshotHandler>>)>>,
    released: Arc<Mutex<Vec<BattleEventKind>>>,
    sent: Mutex<Vec<OutboundMessage>>,
}

impl RecordingTransport {
    fn emit(&self, kind: BattleEventKind, snapshot: &WireSnapshot) {
        let handlers: Vec<_> = self
            .handlers
            .lock()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, h)| Arc::clone(h))
            .collect();
        for handler in handlers {
            let mut handler = handler.lock();
            (*handler)(snapshot.clone());
        }
    }
}

impl BattleTransport for RecordingTransport {
    fn subscribe(&self, kind: BattleEventKind, handler: SnapshotHandler) -> Unsubscribe {
        self.handlers.lock().push((kind, Arc::new(Mutex::new(handler))));
        let released = Arc::clone(&self.released);
        Unsubscribe::new(move || released.lock().push(kind))
    }

    fn send(&self, message: &OutboundMessage) {
        self.sent.lock().push(message.clone());
    }
}

#[test]
fn session_registers_one_handler_per_event() {
    let transport = Arc::new(RecordingTransport::default());
    let session = SessionBuilder::new().start(transport.clone(), "s1").unwrap();
    let kinds: Vec<_> = transport.handlers.lock().iter().map(|(k, _)| *k).collect();
    assert_eq!(kinds, BattleEventKind::ALL.to_vec());

    drop(session);
    let mut released = transport.released.lock().clone();
    released.sort_by_key(|k| k.topic());
    let mut expected = BattleEventKind::ALL.to_vec();
    expected.sort_by_key(|k| k.topic());
    assert_eq!(released, expected);
}

#[test]
fn handlers_kept_by_a_sloppy_transport_go_inert() {
    let transport = Arc::new(RecordingTransport::default());
    let observer = Arc::new(CollectingObserver::new());
    let mut session = SessionBuilder::new()
        .with_violation_observer(observer.clone())
        .start(transport.clone(), "s1")
        .unwrap();
    session.switch_stream("s2").unwrap();

    // RecordingTransport never removes handlers, so the s1 ones are still called.
    transport.emit(
        BattleEventKind::Start,
        &WireSnapshot::from(&battle("b1", "s1", Phase::Active, (0, 0))),
    );
    assert!(session.current().is_none());
    assert_no_violations!(observer);

    transport.emit(
        BattleEventKind::Start,
        &WireSnapshot::from(&battle("b2", "s2", Phase::Active, (0, 0))),
    );
    assert_eq!(session.current().unwrap().stream_id.as_str(), "s2");
}

#[test]
fn provided_helpers_map_to_topics() {
    let transport = RecordingTransport::default();
    let _start = transport.on_battle_start(Box::new(|_| {}));
    let _update = transport.on_battle_update(Box::new(|_| {}));
    let _end = transport.on_battle_end(Box::new(|_| {}));
    let topics: Vec<_> = transport
        .handlers
        .lock()
        .iter()
        .map(|(k, _)| k.topic())
        .collect();
    assert_eq!(topics, ["battle:start", "battle:update", "battle:end"]);
}
