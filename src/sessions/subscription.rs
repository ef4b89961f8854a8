//! Binding of the three battle event handlers to a transport.
//!
//! A [`BattleSubscription`] registers `battle:start`, `battle:update` and
//! `battle:end` handlers for one stream. Each handler validates the snapshot,
//! filters out other streams and hands the result to the store. Nothing that
//! arrives on the transport can fail the subscription: malformed and stale
//! snapshots are dropped and reported through telemetry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use smallvec::SmallVec;

use crate::battle::{Battle, BattleId, Phase, StreamId};
use crate::network::messages::{BattleEventKind, WireSnapshot};
use crate::network::transport::{BattleTransport, SnapshotHandler, Unsubscribe};
use crate::report_violation_to;
use crate::store::{ApplyOutcome, BattleStoreHandle, RejectReason};
use crate::telemetry::{
    report_to_observer, SyncViolation, ViolationKind, ViolationObserver, ViolationSeverity,
};

/// Live handler registrations for one stream.
///
/// Releasing is idempotent and also happens on drop. Re-subscribing to a
/// new stream releases every old handler before the new ones are registered.
pub struct BattleSubscription {
    transport: Arc<dyn BattleTransport>,
    store: BattleStoreHandle,
    observer: Option<Arc<dyn ViolationObserver>>,
    stream_id: Option<StreamId>,
    active: Arc<AtomicBool>,
    handles: SmallVec<[Unsubscribe; 3]>,
}

impl BattleSubscription {
    /// Registers the three handlers for `stream_id`.
    pub fn subscribe(
        transport: Arc<dyn BattleTransport>,
        stream_id: StreamId,
        store: BattleStoreHandle,
        observer: Option<Arc<dyn ViolationObserver>>,
    ) -> Self {
        let mut subscription = Self {
            transport,
            store,
            observer,
            stream_id: None,
            active: Arc::new(AtomicBool::new(false)),
            handles: SmallVec::new(),
        };
        subscription.bind(stream_id);
        subscription
    }

    /// The stream currently subscribed to, or `None` after [`unsubscribe`](Self::unsubscribe).
    #[must_use]
    pub fn stream_id(&self) -> Option<&StreamId> {
        self.stream_id.as_ref()
    }

    /// Returns `true` while handlers are registered.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Releases every handler, then registers fresh ones for `stream_id`.
    ///
    /// The store is left untouched; clearing it on a stream switch is the
    /// caller's decision.
    pub fn resubscribe(&mut self, stream_id: StreamId) {
        self.unsubscribe();
        self.bind(stream_id);
    }

    /// Releases every handler. Calling it again is a no-op.
    pub fn unsubscribe(&mut self) {
        // Handlers already queued by the transport see the flag and return.
        self.active.store(false, Ordering::Release);
        let released = self.handles.len();
        for handle in self.handles.drain(..) {
            handle.release();
        }
        if let Some(stream_id) = self.stream_id.take() {
            tracing::debug!(stream = %stream_id, released, "battle handlers released");
        }
    }

    fn bind(&mut self, stream_id: StreamId) {
        // A fresh flag, so late calls into the previous handlers stay inert.
        self.active = Arc::new(AtomicBool::new(true));
        for kind in BattleEventKind::ALL {
            let handler = SnapshotFilter {
                kind,
                stream_id: stream_id.clone(),
                store: self.store.clone(),
                observer: self.observer.clone(),
                active: Arc::clone(&self.active),
            }
            .into_handler();
            self.handles.push(self.transport.subscribe(kind, handler));
        }
        tracing::debug!(stream = %stream_id, "battle handlers registered");
        self.stream_id = Some(stream_id);
    }
}

impl Drop for BattleSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for BattleSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BattleSubscription")
            .field("stream_id", &self.stream_id)
            .field("active", &self.is_active())
            .field("handles", &self.handles.len())
            .finish_non_exhaustive()
    }
}

struct SnapshotFilter {
    kind: BattleEventKind,
    stream_id: StreamId,
    store: BattleStoreHandle,
    observer: Option<Arc<dyn ViolationObserver>>,
    active: Arc<AtomicBool>,
}

impl SnapshotFilter {
    fn into_handler(self) -> SnapshotHandler {
        Box::new(move |snapshot| self.handle(snapshot))
    }

    fn handle(&self, snapshot: WireSnapshot) {
        if !self.active.load(Ordering::Acquire) {
            report_violation_to!(
                &self.observer,
                ViolationSeverity::Warning,
                ViolationKind::Subscription,
                "{} handler for stream {} fired after release, snapshot ignored",
                self.kind,
                self.stream_id
            );
            return;
        }

        let wire_id = snapshot.id.clone();
        let battle = match Battle::try_from(snapshot) {
            Ok(battle) => battle,
            Err(err) => {
                let mut violation = SyncViolation::new(
                    ViolationSeverity::Error,
                    ViolationKind::MalformedSnapshot,
                    format!("{} snapshot dropped: {}", self.kind, err),
                    concat!(file!(), ":", line!()),
                )
                .with_context("stream", self.stream_id.as_str());
                if let Some(id) = wire_id.filter(|id| !id.is_empty()) {
                    violation = violation.with_battle(BattleId::new(id));
                }
                report_to_observer(self.observer.as_ref(), &violation);
                return;
            },
        };

        if battle.stream_id != self.stream_id {
            tracing::trace!(
                topic = self.kind.topic(),
                expected = %self.stream_id,
                actual = %battle.stream_id,
                "snapshot for another stream ignored"
            );
            return;
        }

        let battle_id = battle.id.clone();
        let phase = battle.phase;
        match self.store.apply(battle) {
            ApplyOutcome::Rejected(RejectReason::ForeignStream { followed }) => {
                // The store moved on while this handler was in flight.
                tracing::trace!(
                    topic = self.kind.topic(),
                    %followed,
                    "snapshot for a stream the store no longer follows ignored"
                );
            },
            ApplyOutcome::Rejected(reason) => self.report_rejection(&reason, battle_id, phase),
            _ => {},
        }
    }

    fn report_rejection(&self, reason: &RejectReason, battle_id: BattleId, phase: Phase) {
        let violation = SyncViolation::new(
            ViolationSeverity::Warning,
            reason.violation_kind(),
            format!("{} snapshot discarded: {}", self.kind, reason),
            concat!(file!(), ":", line!()),
        )
        .with_battle(battle_id)
        .with_context("incoming_phase", phase.as_str());
        report_to_observer(self.observer.as_ref(), &violation);
    }
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use crate::battle::{Participant, Phase, UserId};
    use crate::network::local_transport::LocalTransport;
    use crate::telemetry::CollectingObserver;

    fn battle(stream: &str, phase: Phase, score_a: u64) -> Battle {
        let participant = |id: &str, score| Participant {
            user_id: UserId::new(id),
            username: id.to_owned(),
            avatar: None,
            score,
            gift_value: 0.0,
        };
        Battle {
            id: BattleId::new(format!("{stream}-battle")),
            stream_id: StreamId::new(stream),
            phase,
            participant_a: participant("alice", score_a),
            participant_b: participant("bob", 0),
            duration_secs: 120,
            started_at: None,
            ended_at: None,
            winner_id: None,
            sequence: None,
        }
    }

    fn setup() -> (
        LocalTransport,
        BattleStoreHandle,
        Arc<CollectingObserver>,
        BattleSubscription,
    ) {
        let transport = LocalTransport::new();
        let store = BattleStoreHandle::new();
        let observer = Arc::new(CollectingObserver::new());
        let subscription = BattleSubscription::subscribe(
            Arc::new(transport.clone()),
            StreamId::new("s1"),
            store.clone(),
            Some(observer.clone()),
        );
        (transport, store, observer, subscription)
    }

    #[test]
    fn registers_exactly_three_handlers() {
        let (transport, _store, _observer, subscription) = setup();
        assert_eq!(transport.handler_count(), 3);
        for kind in BattleEventKind::ALL {
            assert_eq!(transport.handler_count_for(kind), 1);
        }
        assert!(subscription.is_active());
    }

    #[test]
    fn matching_snapshot_reaches_store() {
        let (transport, store, observer, _subscription) = setup();
        transport.deliver_battle(BattleEventKind::Start, &battle("s1", Phase::Active, 0));
        assert_eq!(store.get_state().unwrap().stream_id, StreamId::new("s1"));
        assert!(observer.is_empty());
    }

    #[test]
    fn other_stream_is_ignored_silently() {
        let (transport, store, observer, _subscription) = setup();
        transport.deliver_battle(BattleEventKind::Start, &battle("s2", Phase::Active, 0));
        assert!(store.get_state().is_none());
        assert!(observer.is_empty());
    }

    #[test]
    fn malformed_snapshot_is_reported_and_dropped() {
        let (transport, store, observer, _subscription) = setup();
        let mut wire = WireSnapshot::from(&battle("s1", Phase::Active, 0));
        wire.participant2 = None;
        transport.deliver(BattleEventKind::Update, &wire);

        assert!(store.get_state().is_none());
        let violations = observer.violations_of_kind(ViolationKind::MalformedSnapshot);
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].severity, ViolationSeverity::Error);
        assert_eq!(violations[0].battle, Some(BattleId::new("s1-battle")));
        assert!(violations[0].message.contains("participant2"));
    }

    #[test]
    fn stale_snapshot_is_reported_as_warning() {
        let (transport, store, observer, _subscription) = setup();
        transport.deliver_battle(BattleEventKind::Update, &battle("s1", Phase::Voting, 5));
        transport.deliver_battle(BattleEventKind::Update, &battle("s1", Phase::Active, 5));

        assert_eq!(store.get_state().unwrap().phase, Phase::Voting);
        assert!(observer.has_violation(ViolationKind::StaleSnapshot));
        assert!(observer.has_severity(ViolationSeverity::Warning));
    }

    #[test]
    fn duplicate_is_not_reported() {
        let (transport, _store, observer, _subscription) = setup();
        let snapshot = battle("s1", Phase::Active, 1);
        transport.deliver_battle(BattleEventKind::Update, &snapshot);
        transport.deliver_battle(BattleEventKind::Update, &snapshot);
        assert!(observer.is_empty());
    }

    #[test]
    fn unsubscribe_is_idempotent_and_releases_everything() {
        let (transport, store, _observer, mut subscription) = setup();
        subscription.unsubscribe();
        subscription.unsubscribe();
        assert_eq!(transport.handler_count(), 0);
        assert!(!subscription.is_active());
        assert_eq!(subscription.stream_id(), None);

        transport.deliver_battle(BattleEventKind::Start, &battle("s1", Phase::Active, 0));
        assert!(store.get_state().is_none());
    }

    #[test]
    fn resubscribe_leaves_no_old_handler_live() {
        let (transport, store, _observer, mut subscription) = setup();
        subscription.resubscribe(StreamId::new("s2"));
        assert_eq!(transport.handler_count(), 3);
        assert_eq!(subscription.stream_id(), Some(&StreamId::new("s2")));

        transport.deliver_battle(BattleEventKind::Update, &battle("s1", Phase::Active, 0));
        assert!(store.get_state().is_none());

        transport.deliver_battle(BattleEventKind::Start, &battle("s2", Phase::Active, 0));
        assert_eq!(store.get_state().unwrap().stream_id, StreamId::new("s2"));
    }

    #[test]
    fn drop_releases_handlers() {
        let (transport, _store, _observer, subscription) = setup();
        drop(subscription);
        assert_eq!(transport.handler_count(), 0);
    }

    #[test]
    fn retained_old_handler_is_inert() {
        // A transport that hands out handlers but never removes them.
        #[derive(Default)]
        struct LeakyTransport {
            handlers: parking_lot::Mutex<Vec<SnapshotHandler>>,
        }
        impl BattleTransport for LeakyTransport {
            fn subscribe(&self, _kind: BattleEventKind, handler: SnapshotHandler) -> Unsubscribe {
                self.handlers.lock().push(handler);
                Unsubscribe::noop()
            }
            fn send(&self, _message: &crate::network::messages::OutboundMessage) {}
        }

        let transport = Arc::new(LeakyTransport::default());
        let store = BattleStoreHandle::new();
        let observer = Arc::new(CollectingObserver::new());
        let mut subscription = BattleSubscription::subscribe(
            transport.clone(),
            StreamId::new("s1"),
            store.clone(),
            Some(observer.clone()),
        );
        subscription.resubscribe(StreamId::new("s2"));

        let stale = WireSnapshot::from(&battle("s1", Phase::Active, 0));
        for handler in transport.handlers.lock().iter_mut().take(3) {
            handler(stale.clone());
        }
        assert!(store.get_state().is_none());
        assert_eq!(observer.violations_of_kind(ViolationKind::Subscription).len(), 3);
    }

    #[test]
    fn snapshot_the_store_no_longer_follows_is_not_reported() {
        let (transport, store, observer, _subscription) = setup();
        let _binding = store.follow(StreamId::new("s2")).unwrap();

        transport.deliver_battle(BattleEventKind::Start, &battle("s1", Phase::Active, 0));
        assert!(store.get_state().is_none());
        crate::assert_no_violations!(observer);
    }
}
