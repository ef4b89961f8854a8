//! Tokio-driven countdown.
//!
//! [`CountdownTask`] runs the same [`Countdown`] trigger a session polls by
//! hand, but on a spawned task woken by a `tokio::time::interval`. The
//! interval is the only pacing: every tick recomputes from the wall clock, so
//! wake-up jitter never swallows a second. Each recomputation is published
//! into a `watch` channel, so any number of views can await fresh values.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use battle_sync::countdown::SystemClock;
//! use battle_sync::sessions::countdown_task::CountdownTask;
//! use battle_sync::store::BattleStoreHandle;
//! use web_time::Duration;
//!
//! # async fn run() {
//! let store = BattleStoreHandle::new();
//! let task = CountdownTask::spawn(store, Arc::new(SystemClock), Duration::from_secs(1));
//! let mut remaining = task.subscribe();
//! while remaining.changed().await.is_ok() {
//!     println!("{:?}", *remaining.borrow());
//! }
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use web_time::Duration;

use crate::countdown::{Clock, Countdown, CountdownPoll, StopReason, DEFAULT_TICK_PERIOD};
use crate::store::BattleStoreHandle;
use crate::telemetry::ViolationObserver;

/// Handle to a spawned countdown. Dropping it cancels the task.
#[must_use = "dropping the CountdownTask cancels it"]
pub struct CountdownTask {
    remaining: watch::Receiver<Option<u64>>,
    cancel: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<StopReason>>,
}

impl CountdownTask {
    /// Spawns the countdown on the current tokio runtime.
    ///
    /// The task waits for the held battle to become active, then publishes
    /// the remaining seconds every `period`. A zero period falls back to one
    /// second.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(store: BattleStoreHandle, clock: Arc<dyn Clock>, period: Duration) -> Self {
        Self::spawn_with_observer(store, clock, period, None)
    }

    /// Like [`spawn`](Self::spawn), reporting clock anomalies to `observer`.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn_with_observer(
        store: BattleStoreHandle,
        clock: Arc<dyn Clock>,
        period: Duration,
        observer: Option<Arc<dyn ViolationObserver>>,
    ) -> Self {
        let period = if period.is_zero() {
            DEFAULT_TICK_PERIOD
        } else {
            period
        };
        let countdown = Countdown::new(period).with_observer(observer);
        let (publish, remaining) = watch::channel(None);
        let (cancel, cancelled) = oneshot::channel();
        let handle = tokio::spawn(run(store, clock, countdown, period, publish, cancelled));
        Self {
            remaining,
            cancel: Some(cancel),
            handle: Some(handle),
        }
    }

    /// The last published remaining time.
    #[must_use]
    pub fn remaining(&self) -> Option<u64> {
        *self.remaining.borrow()
    }

    /// A receiver that observes every published value.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<u64>> {
        self.remaining.clone()
    }

    /// Asks the task to stop. Returns `false` if it was already asked.
    pub fn cancel(&mut self) -> bool {
        match self.cancel.take() {
            Some(cancel) => {
                // The task may already be gone.
                let _ = cancel.send(());
                true
            },
            None => false,
        }
    }

    /// Returns `true` once the task has returned.
    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Waits for the task and returns why it stopped.
    ///
    /// A task that panicked or was aborted reports [`StopReason::Cancelled`].
    pub async fn join(mut self) -> StopReason {
        match self.handle.take() {
            Some(handle) => handle.await.unwrap_or_else(|err| {
                tracing::warn!(error = %err, "countdown task did not complete");
                StopReason::Cancelled
            }),
            None => StopReason::Cancelled,
        }
    }
}

impl Drop for CountdownTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

impl std::fmt::Debug for CountdownTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountdownTask")
            .field("remaining", &self.remaining())
            .field("finished", &self.is_finished())
            .finish_non_exhaustive()
    }
}

async fn run(
    store: BattleStoreHandle,
    clock: Arc<dyn Clock>,
    mut countdown: Countdown,
    period: Duration,
    publish: watch::Sender<Option<u64>>,
    mut cancelled: oneshot::Receiver<()>,
) -> StopReason {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            // Resolves on cancel() and when the handle is dropped.
            _ = &mut cancelled => {
                countdown.cancel();
                publish.send_replace(None);
                tracing::debug!("countdown task cancelled");
                return StopReason::Cancelled;
            }
            _ = interval.tick() => {
                let now = clock.now();
                match store.with_state(|battle| countdown.tick_now(battle, now)) {
                    CountdownPoll::Inactive | CountdownPoll::NotDue => {},
                    CountdownPoll::Tick { remaining } => {
                        publish.send_replace(Some(remaining));
                        if remaining == 0 {
                            tracing::debug!("countdown task reached zero");
                            return StopReason::ReachedZero;
                        }
                    },
                    CountdownPoll::Stopped(reason) => {
                        if reason != StopReason::ReachedZero {
                            publish.send_replace(None);
                        }
                        tracing::debug!(?reason, "countdown task stopped");
                        return reason;
                    },
                }
            }
        }
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
    use crate::battle::{Battle, BattleId, Participant, Phase, StreamId, UserId};
    use crate::countdown::ManualClock;
    use crate::telemetry::{CollectingObserver, ViolationKind};
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap()
    }

    fn battle(phase: Phase) -> Battle {
        let participant = |id: &str| Participant {
            user_id: UserId::new(id),
            username: id.to_owned(),
            avatar: None,
            score: 0,
            gift_value: 0.0,
        };
        Battle {
            id: BattleId::new("b1"),
            stream_id: StreamId::new("s1"),
            phase,
            participant_a: participant("alice"),
            participant_b: participant("bob"),
            duration_secs: 120,
            started_at: Some(t0()),
            ended_at: None,
            winner_id: None,
            sequence: None,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_then_stops_at_zero() {
        let store = BattleStoreHandle::new();
        let _ = store.apply(battle(Phase::Active));
        let clock = Arc::new(ManualClock::new(t0() + TimeDelta::seconds(45)));
        let task = CountdownTask::spawn(store, clock.clone(), Duration::from_secs(1));

        let mut remaining = task.subscribe();
        remaining.changed().await.unwrap();
        assert_eq!(*remaining.borrow(), Some(75));

        clock.set(t0() + TimeDelta::seconds(130));
        assert_eq!(task.join().await, StopReason::ReachedZero);
        assert_eq!(*remaining.borrow(), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn every_tick_recomputes_despite_wake_up_jitter() {
        let store = BattleStoreHandle::new();
        let _ = store.apply(battle(Phase::Active));
        let clock = Arc::new(ManualClock::new(t0() + TimeDelta::milliseconds(45_010)));
        let task = CountdownTask::spawn(store, clock.clone(), Duration::from_secs(1));

        let mut remaining = task.subscribe();
        remaining.changed().await.unwrap();
        assert_eq!(*remaining.borrow(), Some(75));

        // the next wake-up lands 995ms later on the wall clock
        clock.set(t0() + TimeDelta::milliseconds(46_005));
        remaining.changed().await.unwrap();
        assert_eq!(*remaining.borrow(), Some(74));

        clock.set(t0() + TimeDelta::milliseconds(47_001));
        remaining.changed().await.unwrap();
        assert_eq!(*remaining.borrow(), Some(73));
    }

    #[tokio::test(start_paused = true)]
    async fn clock_anomaly_reaches_observer() {
        let store = BattleStoreHandle::new();
        let mut early = battle(Phase::Active);
        early.started_at = Some(t0() + TimeDelta::seconds(600));
        let _ = store.apply(early);
        let observer = Arc::new(CollectingObserver::new());
        let task = CountdownTask::spawn_with_observer(
            store,
            Arc::new(ManualClock::new(t0())),
            Duration::from_secs(1),
            Some(observer.clone()),
        );

        let mut remaining = task.subscribe();
        remaining.changed().await.unwrap();
        assert_eq!(*remaining.borrow(), Some(120));
        crate::assert_violation!(observer, ViolationKind::Countdown);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_on_phase_exit() {
        let store = BattleStoreHandle::new();
        let _ = store.apply(battle(Phase::Active));
        let clock = Arc::new(ManualClock::new(t0()));
        let task = CountdownTask::spawn(store.clone(), clock, Duration::from_secs(1));

        let mut remaining = task.subscribe();
        remaining.changed().await.unwrap();
        assert_eq!(*remaining.borrow(), Some(120));

        let _ = store.apply(battle(Phase::Voting));
        assert_eq!(task.join().await, StopReason::PhaseExit);
        assert_eq!(*remaining.borrow(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_idle_task() {
        let store = BattleStoreHandle::new();
        let mut task = CountdownTask::spawn(store, Arc::new(ManualClock::new(t0())), Duration::from_secs(1));
        assert!(task.cancel());
        assert!(!task.cancel());
        assert_eq!(task.join().await, StopReason::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_for_battle_to_become_active() {
        let store = BattleStoreHandle::new();
        let clock = Arc::new(ManualClock::new(t0() + TimeDelta::seconds(20)));
        let task = CountdownTask::spawn(store.clone(), clock, Duration::from_secs(1));

        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        assert_eq!(task.remaining(), None);
        assert!(!task.is_finished());

        let _ = store.apply(battle(Phase::Active));
        let mut remaining = task.subscribe();
        remaining.changed().await.unwrap();
        assert_eq!(*remaining.borrow(), Some(100));
    }
}
