//! The per-stream session façade.
//!
//! A [`BattleSession`] ties together everything a view of one stream needs:
//! the transport subscription feeding the store, a store listener turning
//! accepted changes into [`SessionEvent`]s, the countdown and the vote
//! emitter. The store is bound to the session's stream for the session's
//! lifetime, so a shared store never mixes battles from two streams.
//!
//! Notifications wait in a bounded queue until drained with
//! [`BattleSession::events`]; past the configured size the oldest are dropped.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::battle::{Battle, BattleId, Phase, StreamId, UserId};
use crate::countdown::{self, Clock, Countdown, CountdownPoll};
use crate::error::BattleSyncError;
use crate::network::transport::BattleTransport;
use crate::presentation::{vote_split, ScoreboardView, VoteSplit};
use crate::sessions::config::SyncConfig;
use crate::sessions::event_drain::EventDrain;
use crate::sessions::subscription::BattleSubscription;
use crate::store::{ApplyOutcome, BattleStoreHandle, StoreChange, StoreListener, StreamBinding};
use crate::telemetry::ViolationObserver;
use crate::vote::{VoteDispatch, VoteEmitter};
use crate::{BattleSyncResult, SessionEvent};

/// Bounded notification queue. The oldest events are dropped when full.
#[derive(Debug)]
struct EventQueue {
    events: Mutex<VecDeque<SessionEvent>>,
    capacity: usize,
}

impl EventQueue {
    fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(64))),
            capacity,
        }
    }

    fn push(&self, event: SessionEvent) {
        let mut events = self.events.lock();
        events.push_back(event);
        // check event queue size and discard oldest events if too big
        while events.len() > self.capacity {
            if let Some(dropped) = events.pop_front() {
                tracing::trace!(?dropped, "session event queue full, oldest event dropped");
            }
        }
    }

    fn take(&self) -> VecDeque<SessionEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    fn len(&self) -> usize {
        self.events.lock().len()
    }
}

/// Scores last seen by the change listener, keyed by battle.
type LastScores = Mutex<Option<(BattleId, u64, u64)>>;

fn change_listener(queue: Arc<EventQueue>) -> impl Fn(&StoreChange) + Send + Sync + 'static {
    let last_scores: LastScores = Mutex::new(None);
    move |change| match change {
        StoreChange::Applied { outcome, battle } => {
            let scores = (battle.participant_a.score, battle.participant_b.score);
            let previous = last_scores
                .lock()
                .replace((battle.id.clone(), scores.0, scores.1));
            for event in events_for(outcome, battle, previous) {
                queue.push(event);
            }
        },
        StoreChange::Cleared { previous } => {
            *last_scores.lock() = None;
            queue.push(SessionEvent::BattleCleared {
                battle_id: previous.id.clone(),
            });
        },
    }
}

fn events_for(
    outcome: &ApplyOutcome,
    battle: &Battle,
    previous: Option<(BattleId, u64, u64)>,
) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    let ended = SessionEvent::BattleEnded {
        battle_id: battle.id.clone(),
        phase: battle.phase,
        winner_id: battle.winner_id.clone(),
    };
    match *outcome {
        ApplyOutcome::Created | ApplyOutcome::Superseded { .. } => {
            events.push(SessionEvent::BattleStarted {
                battle_id: battle.id.clone(),
                phase: battle.phase,
            });
            if battle.phase.is_terminal() {
                events.push(ended);
            }
        },
        ApplyOutcome::Replaced { from, to } => {
            if from != to {
                events.push(SessionEvent::PhaseChanged {
                    battle_id: battle.id.clone(),
                    from,
                    to,
                });
            }
            let scores = (battle.participant_a.score, battle.participant_b.score);
            let unchanged = matches!(
                &previous,
                Some((id, a, b)) if *id == battle.id && (*a, *b) == scores
            );
            if !unchanged {
                events.push(SessionEvent::ScoresChanged {
                    battle_id: battle.id.clone(),
                    score_a: scores.0,
                    score_b: scores.1,
                });
            }
            if to.is_terminal() && !from.is_terminal() {
                events.push(ended);
            }
        },
        ApplyOutcome::Duplicate | ApplyOutcome::Rejected(_) => {},
    }
    events
}

/// A live view of the battle on one stream.
///
/// A session owns the transport subscription, a shared store listener, the
/// countdown trigger and the vote emitter. Create one with
/// [`SessionBuilder::start`](crate::SessionBuilder::start).
///
/// Snapshots are applied as they arrive on the transport. The session itself
/// is poll-driven: read the battle with [`current`](Self::current), advance
/// the countdown with [`poll_countdown`](Self::poll_countdown), and drain
/// notifications with [`events`](Self::events).
///
/// Dropping the session tears it down.
pub struct BattleSession {
    config: SyncConfig,
    transport: Arc<dyn BattleTransport>,
    store: BattleStoreHandle,
    clock: Arc<dyn Clock>,
    observer: Option<Arc<dyn ViolationObserver>>,
    subscription: BattleSubscription,
    countdown: Countdown,
    events: Arc<EventQueue>,
    listener: Option<StoreListener>,
    binding: Option<StreamBinding>,
    votes: VoteEmitter,
}

impl BattleSession {
    pub(crate) fn new(
        config: SyncConfig,
        transport: Arc<dyn BattleTransport>,
        binding: StreamBinding,
        store: BattleStoreHandle,
        clock: Arc<dyn Clock>,
        observer: Option<Arc<dyn ViolationObserver>>,
    ) -> Self {
        let stream_id = binding.stream().clone();
        let events = Arc::new(EventQueue::new(config.event_queue_size));
        // Subscribe to the store before the transport can deliver anything.
        let listener = store.subscribe(change_listener(Arc::clone(&events)));
        let subscription = BattleSubscription::subscribe(
            Arc::clone(&transport),
            stream_id,
            store.clone(),
            observer.clone(),
        );
        let votes = VoteEmitter::new(Arc::clone(&transport), store.clone());
        tracing::info!(
            stream = ?subscription.stream_id(),
            policy = ?config.ordering_policy,
            "battle session started"
        );
        Self {
            config,
            transport,
            store,
            clock,
            subscription,
            countdown: Countdown::new(config.tick_period).with_observer(observer.clone()),
            observer,
            events,
            listener: Some(listener),
            binding: Some(binding),
            votes,
        }
    }

    /// The stream this session follows, or `None` after teardown.
    #[must_use]
    pub fn stream_id(&self) -> Option<&StreamId> {
        self.subscription.stream_id()
    }

    /// The configuration the session was started with.
    #[must_use]
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The store this session writes into.
    #[must_use]
    pub fn store(&self) -> &BattleStoreHandle {
        &self.store
    }

    /// A copy of the current battle, if any.
    #[must_use]
    pub fn current(&self) -> Option<Battle> {
        self.store.get_state()
    }

    /// The phase of the current battle, if any.
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        self.store.with_state(|battle| battle.map(|b| b.phase))
    }

    /// Remaining seconds derived from the session clock.
    ///
    /// `None` unless the battle is active with a known start.
    #[must_use]
    pub fn remaining_seconds(&self) -> Option<u64> {
        let now = self.clock.now();
        self.store
            .with_state(|battle| countdown::remaining_seconds(battle, now))
    }

    /// Advances the countdown trigger.
    ///
    /// Call this at least once per configured tick period. A stop is also
    /// queued as [`SessionEvent::CountdownStopped`].
    pub fn poll_countdown(&mut self) -> CountdownPoll {
        let now = self.clock.now();
        let countdown = &mut self.countdown;
        let poll = self.store.with_state(|battle| countdown.poll(battle, now));
        if let CountdownPoll::Stopped(reason) = poll {
            tracing::debug!(?reason, "countdown stopped");
            self.events.push(SessionEvent::CountdownStopped { reason });
        }
        poll
    }

    /// Sends a vote for `participant_id` in the current battle.
    ///
    /// Nothing changes locally; the effect arrives as a later snapshot.
    pub fn vote(&self, participant_id: impl Into<UserId>) -> VoteDispatch {
        self.votes.vote(participant_id)
    }

    /// The vote bar split for the current battle.
    #[must_use]
    pub fn vote_split(&self) -> Option<VoteSplit> {
        self.store.with_state(|battle| {
            battle.map(|b| vote_split(b.participant_a.score, b.participant_b.score))
        })
    }

    /// A render-ready view of the current battle.
    #[must_use]
    pub fn scoreboard(&self) -> Option<ScoreboardView> {
        let now = self.clock.now();
        self.store.with_state(|battle| {
            battle.map(|b| ScoreboardView::new(b, countdown::remaining_seconds(Some(b), now)))
        })
    }

    /// Follows a different stream.
    ///
    /// The old handlers are released before anything else happens, the store
    /// is cleared and the countdown starts over. Switching to the stream
    /// already followed is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`BattleSyncError::InvalidRequest`] for an empty stream id, a
    /// session that was torn down, or a store other sessions share. Nothing
    /// changes on error.
    pub fn switch_stream(&mut self, stream_id: impl Into<StreamId>) -> BattleSyncResult<()> {
        let stream_id = stream_id.into();
        if stream_id.as_str().is_empty() {
            return Err(BattleSyncError::InvalidRequest {
                info: "stream id must not be empty".to_owned(),
            });
        }
        let Some(from) = self.subscription.stream_id().cloned() else {
            return Err(BattleSyncError::InvalidRequest {
                info: "session was torn down".to_owned(),
            });
        };
        if from == stream_id {
            return Ok(());
        }
        if let Some(binding) = self.binding.as_mut() {
            binding.switch(stream_id.clone())?;
        }

        self.subscription.unsubscribe();
        self.countdown.cancel();
        self.store.clear();
        self.countdown.reset();
        self.subscription.resubscribe(stream_id.clone());
        tracing::info!(%from, to = %stream_id, "battle session switched stream");
        self.events.push(SessionEvent::StreamSwitched {
            from,
            to: stream_id,
        });
        Ok(())
    }

    /// Drains every queued notification.
    pub fn events(&mut self) -> EventDrain {
        EventDrain::new(self.events.take())
    }

    /// Number of queued notifications.
    #[must_use]
    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    /// Releases the transport handlers, stops the countdown and leaves the
    /// store. Calling it again is a no-op.
    ///
    /// If this session was the store's last subscriber the store is cleared.
    pub fn teardown(&mut self) {
        let Some(listener) = self.listener.take() else {
            return;
        };
        let stream = self.subscription.stream_id().cloned();
        self.subscription.unsubscribe();
        self.countdown.cancel();
        listener.unsubscribe();
        self.binding = None;
        tracing::info!(stream = ?stream, "battle session torn down");
    }

    /// Returns `true` until [`teardown`](Self::teardown).
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.listener.is_some()
    }

    /// Spawns the countdown as a tokio task on the current runtime.
    ///
    /// The task reads the same store, clock and violation observer as this
    /// session and ticks at the configured period.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[cfg(feature = "tokio")]
    pub fn spawn_countdown(&self) -> crate::sessions::countdown_task::CountdownTask {
        crate::sessions::countdown_task::CountdownTask::spawn_with_observer(
            self.store.clone(),
            Arc::clone(&self.clock),
            self.config.tick_period,
            self.observer.clone(),
        )
    }
}

impl Drop for BattleSession {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for BattleSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            config,
            transport: _,
            store,
            clock,
            observer,
            subscription,
            countdown,
            events,
            listener,
            binding: _,
            votes: _,
        } = self;

        f.debug_struct("BattleSession")
            .field("config", config)
            .field("store", store)
            .field("clock", clock)
            .field("has_observer", &observer.is_some())
            .field("subscription", subscription)
            .field("countdown", countdown)
            .field("pending_events", &events.len())
            .field("active", &listener.is_some())
            .finish_non_exhaustive()
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
    use crate::battle::Participant;
    use crate::countdown::{ManualClock, StopReason};
    use crate::network::local_transport::LocalTransport;
    use crate::telemetry::{CollectingObserver, ViolationKind};
    use crate::network::messages::{BattleEventKind, OutboundMessage};
    use crate::SessionBuilder;
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap()
    }

    fn battle(id: &str, stream: &str, phase: Phase, scores: (u64, u64)) -> Battle {
        let participant = |id: &str, score| Participant {
            user_id: UserId::new(id),
            username: id.to_owned(),
            avatar: None,
            score,
            gift_value: 0.0,
        };
        Battle {
            id: BattleId::new(id),
            stream_id: StreamId::new(stream),
            phase,
            participant_a: participant("alice", scores.0),
            participant_b: participant("bob", scores.1),
            duration_secs: 120,
            started_at: (phase.rank() >= Phase::Active.rank()).then(t0),
            ended_at: None,
            winner_id: (phase == Phase::Completed).then(|| UserId::new("alice")),
            sequence: None,
        }
    }

    fn start(transport: &LocalTransport, clock: &Arc<ManualClock>) -> BattleSession {
        SessionBuilder::new()
            .with_clock(clock.clone())
            .start(Arc::new(transport.clone()), "s1")
            .unwrap()
    }

    #[test]
    fn lifecycle_produces_events_in_order() {
        let transport = LocalTransport::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let mut session = start(&transport, &clock);

        transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Pending, (0, 0)));
        transport.deliver_battle(BattleEventKind::Update, &battle("b1", "s1", Phase::Active, (3, 1)));
        transport.deliver_battle(BattleEventKind::End, &battle("b1", "s1", Phase::Completed, (3, 1)));

        let events: Vec<_> = session.events().collect();
        let id = BattleId::new("b1");
        assert_eq!(
            events,
            vec![
                SessionEvent::BattleStarted {
                    battle_id: id.clone(),
                    phase: Phase::Pending
                },
                SessionEvent::PhaseChanged {
                    battle_id: id.clone(),
                    from: Phase::Pending,
                    to: Phase::Active
                },
                SessionEvent::ScoresChanged {
                    battle_id: id.clone(),
                    score_a: 3,
                    score_b: 1
                },
                SessionEvent::PhaseChanged {
                    battle_id: id.clone(),
                    from: Phase::Active,
                    to: Phase::Completed
                },
                SessionEvent::BattleEnded {
                    battle_id: id,
                    phase: Phase::Completed,
                    winner_id: Some(UserId::new("alice"))
                },
            ]
        );
        assert_eq!(session.pending_events(), 0);
    }

    #[test]
    fn event_queue_drops_oldest() {
        let transport = LocalTransport::new();
        let mut session = SessionBuilder::new()
            .with_event_queue_size(2)
            .unwrap()
            .start(Arc::new(transport.clone()), "s1")
            .unwrap();
        for score in 1..=4 {
            transport.deliver_battle(
                BattleEventKind::Update,
                &battle("b1", "s1", Phase::Active, (score, 0)),
            );
        }
        let events: Vec<_> = session.events().collect();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[1],
            SessionEvent::ScoresChanged { score_a: 4, .. }
        ));
    }

    #[test]
    fn countdown_follows_clock_and_stops_at_zero() {
        let transport = LocalTransport::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let mut session = start(&transport, &clock);
        transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Active, (0, 0)));

        clock.advance(TimeDelta::seconds(45));
        assert_eq!(session.remaining_seconds(), Some(75));
        assert_eq!(session.poll_countdown(), CountdownPoll::Tick { remaining: 75 });
        assert_eq!(session.scoreboard().unwrap().countdown.as_deref(), Some("1:15"));

        clock.advance(TimeDelta::seconds(85));
        assert_eq!(session.remaining_seconds(), Some(0));
        assert_eq!(session.poll_countdown(), CountdownPoll::Tick { remaining: 0 });
        assert_eq!(
            session.poll_countdown(),
            CountdownPoll::Stopped(StopReason::ReachedZero)
        );
        assert_eq!(session.phase(), Some(Phase::Active));
        assert!(session
            .events()
            .any(|e| e == SessionEvent::CountdownStopped { reason: StopReason::ReachedZero }));
    }

    #[test]
    fn vote_goes_out_on_transport() {
        let transport = LocalTransport::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let session = start(&transport, &clock);
        assert_eq!(session.vote("alice"), VoteDispatch::NoBattle);

        transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Active, (30, 10)));
        assert!(matches!(session.vote("alice"), VoteDispatch::Sent { .. }));
        assert_eq!(
            transport.sent(),
            vec![OutboundMessage::Vote {
                battle_id: BattleId::new("b1"),
                participant_id: UserId::new("alice"),
            }]
        );
        assert_eq!(session.vote_split(), Some(VoteSplit { a: 75, b: 25 }));
    }

    #[test]
    fn switch_stream_clears_and_rebinds() {
        let transport = LocalTransport::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let mut session = start(&transport, &clock);
        transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Active, (0, 0)));
        let _ = session.events().count();

        session.switch_stream("s2").unwrap();
        assert!(session.current().is_none());
        assert_eq!(session.stream_id(), Some(&StreamId::new("s2")));
        assert_eq!(transport.handler_count(), 3);

        transport.deliver_battle(BattleEventKind::Update, &battle("b1", "s1", Phase::Voting, (1, 0)));
        assert!(session.current().is_none());

        let events: Vec<_> = session.events().collect();
        assert_eq!(
            events,
            vec![
                SessionEvent::BattleCleared {
                    battle_id: BattleId::new("b1")
                },
                SessionEvent::StreamSwitched {
                    from: StreamId::new("s1"),
                    to: StreamId::new("s2")
                },
            ]
        );
    }

    #[test]
    fn switch_to_same_stream_is_noop() {
        let transport = LocalTransport::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let mut session = start(&transport, &clock);
        transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Active, (0, 0)));
        session.switch_stream("s1").unwrap();
        assert!(session.current().is_some());
    }

    #[test]
    fn switch_stream_rejects_empty_id() {
        let transport = LocalTransport::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let mut session = start(&transport, &clock);
        assert!(matches!(
            session.switch_stream(""),
            Err(BattleSyncError::InvalidRequest { .. })
        ));
        assert_eq!(session.stream_id(), Some(&StreamId::new("s1")));
    }

    #[test]
    fn teardown_is_idempotent_and_clears_private_store() {
        let transport = LocalTransport::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let mut session = start(&transport, &clock);
        let store = session.store().clone();
        transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Active, (0, 0)));

        session.teardown();
        session.teardown();
        assert!(!session.is_active());
        assert_eq!(transport.handler_count(), 0);
        assert!(store.get_state().is_none());
        assert_eq!(session.poll_countdown(), CountdownPoll::Inactive);
        assert!(session.switch_stream("s2").is_err());
    }

    #[test]
    fn drop_releases_everything() {
        let transport = LocalTransport::new();
        let clock = Arc::new(ManualClock::new(t0()));
        let session = start(&transport, &clock);
        let store = session.store().clone();
        drop(session);
        assert_eq!(transport.handler_count(), 0);
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn shared_store_survives_one_session_leaving() {
        let transport = LocalTransport::new();
        let store = BattleStoreHandle::new();
        let first = SessionBuilder::new()
            .with_store(store.clone())
            .start(Arc::new(transport.clone()), "s1")
            .unwrap();
        let second = SessionBuilder::new()
            .with_store(store.clone())
            .start(Arc::new(transport.clone()), "s1")
            .unwrap();
        transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Active, (0, 0)));

        drop(first);
        assert!(store.get_state().is_some());
        assert_eq!(second.current().unwrap().id, BattleId::new("b1"));
        drop(second);
        assert!(store.get_state().is_none());
    }

    #[test]
    fn shared_store_keeps_out_other_streams() {
        let transport = LocalTransport::new();
        let store = BattleStoreHandle::new();
        let first = SessionBuilder::new()
            .with_store(store.clone())
            .start(Arc::new(transport.clone()), "s1")
            .unwrap();
        let second = SessionBuilder::new()
            .with_store(store.clone())
            .start(Arc::new(transport.clone()), "s2");
        assert!(matches!(second, Err(BattleSyncError::InvalidRequest { .. })));

        transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Pending, (0, 0)));
        transport.deliver_battle(BattleEventKind::Start, &battle("b2", "s2", Phase::Active, (0, 0)));
        assert_eq!(first.current().unwrap().id, BattleId::new("b1"));
        assert_eq!(
            first.vote("alice"),
            VoteDispatch::Sent {
                battle_id: BattleId::new("b1")
            }
        );
    }

    #[test]
    fn shared_store_refuses_stream_switch() {
        let transport = LocalTransport::new();
        let store = BattleStoreHandle::new();
        let mut first = SessionBuilder::new()
            .with_store(store.clone())
            .start(Arc::new(transport.clone()), "s1")
            .unwrap();
        let second = SessionBuilder::new()
            .with_store(store.clone())
            .start(Arc::new(transport.clone()), "s1")
            .unwrap();
        transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Active, (0, 0)));

        assert!(matches!(
            first.switch_stream("s2"),
            Err(BattleSyncError::InvalidRequest { .. })
        ));
        assert_eq!(first.stream_id(), Some(&StreamId::new("s1")));
        assert_eq!(transport.handler_count(), 6);
        assert!(second.current().is_some());

        drop(second);
        first.switch_stream("s2").unwrap();
        assert_eq!(store.followed_stream(), Some(StreamId::new("s2")));
        assert!(first.current().is_none());
    }

    #[test]
    fn teardown_unbinds_store() {
        let transport = LocalTransport::new();
        let store = BattleStoreHandle::new();
        let mut first = SessionBuilder::new()
            .with_store(store.clone())
            .start(Arc::new(transport.clone()), "s1")
            .unwrap();
        first.teardown();
        assert_eq!(store.followed_stream(), None);
        let second = SessionBuilder::new()
            .with_store(store.clone())
            .start(Arc::new(transport.clone()), "s2")
            .unwrap();
        assert_eq!(second.stream_id(), Some(&StreamId::new("s2")));
    }

    #[test]
    fn clock_anomaly_reaches_session_observer() {
        let transport = LocalTransport::new();
        let observer = Arc::new(CollectingObserver::new());
        let clock = Arc::new(ManualClock::new(t0() - TimeDelta::seconds(600)));
        let mut session = SessionBuilder::new()
            .with_clock(clock)
            .with_violation_observer(observer.clone())
            .start(Arc::new(transport.clone()), "s1")
            .unwrap();
        transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Active, (0, 0)));

        assert_eq!(session.poll_countdown(), CountdownPoll::Tick { remaining: 120 });
        crate::assert_violation!(observer, ViolationKind::Countdown);
    }
}
