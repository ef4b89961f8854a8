//! Wall-clock countdown derivation.
//!
//! The remaining time of a battle is always re-derived from the server's
//! `started_at` anchor and the current wall-clock time. There is no local
//! decrementing counter, so a suspended process or a late tick cannot drift.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use web_time::Duration;

use crate::battle::{Battle, BattleId, Phase};
use crate::report_violation_to;
use crate::telemetry::{ViolationKind, ViolationObserver, ViolationSeverity};

/// Nominal recomputation period.
pub const DEFAULT_TICK_PERIOD: Duration = Duration::from_secs(1);

/// Source of wall-clock time.
pub trait Clock: Send + Sync + std::fmt::Debug {
    /// The current instant in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// [`Clock`] backed by the system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// [`Clock`] that only moves when told to. Intended for tests and replays.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Creates a clock frozen at `at`.
    #[must_use]
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(at) }
    }

    /// Moves the clock to `at`. Moving backwards is allowed.
    pub fn set(&self, at: DateTime<Utc>) {
        *self.now.lock() = at;
    }

    /// Moves the clock forward by `by`.
    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Seconds left in a battle of `duration_secs` that started at `started_at`.
///
/// `max(0, duration - floor(now - started_at))`. If `now` precedes
/// `started_at` the full duration is returned.
#[must_use]
pub fn remaining(started_at: DateTime<Utc>, duration_secs: u64, now: DateTime<Utc>) -> u64 {
    let elapsed = now.signed_duration_since(started_at).num_seconds();
    if elapsed <= 0 {
        return duration_secs;
    }
    duration_secs.saturating_sub(elapsed as u64)
}

/// Seconds left in the given battle, or `None` when no countdown applies.
///
/// A countdown only exists while the battle is [`Phase::Active`] and the
/// server has stamped `started_at`.
#[must_use]
pub fn remaining_seconds(battle: Option<&Battle>, now: DateTime<Utc>) -> Option<u64> {
    let battle = battle?;
    if battle.phase != Phase::Active {
        return None;
    }
    let started_at = battle.started_at?;
    Some(remaining(started_at, battle.duration_secs, now))
}

/// Why a running countdown stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StopReason {
    /// The remaining time reached zero. The phase is untouched.
    ReachedZero,
    /// The battle left the active phase, lost its anchor, or went away.
    PhaseExit,
    /// The owner cancelled the countdown.
    Cancelled,
}

/// The result of polling a [`Countdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownPoll {
    /// No countdown applies to the current state.
    Inactive,
    /// Running, but less than one period has passed since the last tick.
    NotDue,
    /// A recomputation happened.
    Tick {
        /// Freshly derived remaining seconds.
        remaining: u64,
    },
    /// The countdown stopped on this poll.
    Stopped(StopReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Idle,
    Running {
        battle: BattleId,
        last_tick: DateTime<Utc>,
    },
    /// The zero tick was emitted; the next poll reports the stop.
    Draining { battle: BattleId },
    /// Reached zero for this battle. Only a different battle re-arms.
    Finished { battle: BattleId },
    Cancelled,
}

/// Poll-driven periodic countdown trigger.
///
/// Call [`Countdown::poll`] as often as convenient; it recomputes at most once
/// per period. A caller that already runs on a timer uses
/// [`Countdown::tick_now`] instead, which recomputes on every call. The
/// trigger arms itself when the battle is active with a start anchor, and
/// stops on zero, on phase exit, or on [`Countdown::cancel`].
///
/// Clock anomalies are reported to the observer set with
/// [`Countdown::with_observer`], or logged via `tracing` without one.
///
/// # Example
///
/// ```
/// use battle_sync::countdown::{Countdown, CountdownPoll};
///
/// let mut countdown = Countdown::default();
/// assert_eq!(countdown.poll(None, chrono::Utc::now()), CountdownPoll::Inactive);
/// ```
#[derive(Clone)]
pub struct Countdown {
    period: TimeDelta,
    state: State,
    observer: Option<Arc<dyn ViolationObserver>>,
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new(DEFAULT_TICK_PERIOD)
    }
}

impl Countdown {
    /// Creates a countdown recomputing every `period`.
    ///
    /// A zero or unrepresentable period falls back to [`DEFAULT_TICK_PERIOD`].
    #[must_use]
    pub fn new(period: Duration) -> Self {
        let period = TimeDelta::from_std(period)
            .ok()
            .filter(|p| *p > TimeDelta::zero())
            .unwrap_or(TimeDelta::seconds(1));
        Self {
            period,
            state: State::Idle,
            observer: None,
        }
    }

    /// Reports clock anomalies to `observer` instead of `tracing`.
    #[must_use]
    pub fn with_observer(mut self, observer: Option<Arc<dyn ViolationObserver>>) -> Self {
        self.observer = observer;
        self
    }

    /// Returns `true` while recomputation continues.
    ///
    /// Turns `false` as soon as the zero tick is emitted, one poll before
    /// [`StopReason::ReachedZero`] is reported.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }

    /// Stops the trigger. Returns `true` if it was armed.
    ///
    /// A cancelled countdown stays inactive until [`Countdown::reset`].
    pub fn cancel(&mut self) -> bool {
        let was_running = matches!(self.state, State::Running { .. } | State::Draining { .. });
        self.state = State::Cancelled;
        was_running
    }

    /// Returns the countdown to its initial idle state.
    pub fn reset(&mut self) {
        self.state = State::Idle;
    }

    /// Advances the trigger against the given battle state.
    ///
    /// Returns [`CountdownPoll::NotDue`] if less than one period passed on
    /// `now` since the last tick.
    pub fn poll(&mut self, battle: Option<&Battle>, now: DateTime<Utc>) -> CountdownPoll {
        self.advance(battle, now, true)
    }

    /// Advances the trigger and recomputes regardless of the period.
    ///
    /// For callers woken by their own timer, whose wake-up jitter would
    /// otherwise make some ticks look early.
    pub fn tick_now(&mut self, battle: Option<&Battle>, now: DateTime<Utc>) -> CountdownPoll {
        self.advance(battle, now, false)
    }

    fn advance(&mut self, battle: Option<&Battle>, now: DateTime<Utc>, gated: bool) -> CountdownPoll {
        let anchored = battle.and_then(|b| {
            (b.phase == Phase::Active)
                .then_some(b.started_at)
                .flatten()
                .map(|started_at| (b, started_at))
        });

        match &self.state {
            State::Cancelled => CountdownPoll::Inactive,
            State::Idle => match anchored {
                Some((battle, started_at)) => self.arm(battle, started_at, now),
                None => CountdownPoll::Inactive,
            },
            State::Finished { battle: finished } => match anchored {
                Some((battle, started_at)) if &battle.id != finished => {
                    self.arm(battle, started_at, now)
                },
                _ => CountdownPoll::Inactive,
            },
            State::Draining { battle: draining } => {
                self.state = State::Finished {
                    battle: draining.clone(),
                };
                CountdownPoll::Stopped(StopReason::ReachedZero)
            },
            State::Running {
                battle: running,
                last_tick,
            } => match anchored {
                Some((battle, started_at)) if &battle.id == running => {
                    if gated && now.signed_duration_since(*last_tick) < self.period {
                        return CountdownPoll::NotDue;
                    }
                    self.tick(battle, started_at, now)
                },
                Some((battle, started_at)) => {
                    tracing::debug!(
                        from = %running,
                        to = %battle.id,
                        "countdown re-anchored to a new battle"
                    );
                    self.arm(battle, started_at, now)
                },
                None => {
                    tracing::trace!(battle = %running, "countdown stopped on phase exit");
                    self.state = State::Idle;
                    CountdownPoll::Stopped(StopReason::PhaseExit)
                },
            },
        }
    }

    fn arm(&mut self, battle: &Battle, started_at: DateTime<Utc>, now: DateTime<Utc>) -> CountdownPoll {
        let lead = started_at.signed_duration_since(now);
        let duration = i64::try_from(battle.duration_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX);
        if lead > duration {
            report_violation_to!(
                &self.observer,
                ViolationSeverity::Warning,
                ViolationKind::Countdown,
                "battle {} starts {}s ahead of the local clock",
                battle.id,
                lead.num_seconds()
            );
        }
        tracing::trace!(battle = %battle.id, %started_at, "countdown armed");
        self.tick(battle, started_at, now)
    }

    fn tick(&mut self, battle: &Battle, started_at: DateTime<Utc>, now: DateTime<Utc>) -> CountdownPoll {
        let remaining = remaining(started_at, battle.duration_secs, now);
        self.state = if remaining == 0 {
            State::Draining {
                battle: battle.id.clone(),
            }
        } else {
            State::Running {
                battle: battle.id.clone(),
                last_tick: now,
            }
        };
        CountdownPoll::Tick { remaining }
    }
}

impl std::fmt::Debug for Countdown {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let Self {
            period,
            state,
            observer,
        } = self;

        f.debug_struct("Countdown")
            .field("period", period)
            .field("state", state)
            .field("has_observer", &observer.is_some())
            .finish()
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
    use crate::battle::{Participant, StreamId, UserId};
    use crate::telemetry::CollectingObserver;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap()
    }

    fn participant(id: &str) -> Participant {
        Participant {
            user_id: UserId::new(id),
            username: id.to_owned(),
            avatar: None,
            score: 0,
            gift_value: 0.0,
        }
    }

    fn active(id: &str, started_at: DateTime<Utc>, duration_secs: u64) -> Battle {
        Battle {
            id: BattleId::new(id),
            stream_id: StreamId::new("s1"),
            phase: Phase::Active,
            participant_a: participant("a"),
            participant_b: participant("b"),
            duration_secs,
            started_at: Some(started_at),
            ended_at: None,
            winner_id: None,
            sequence: None,
        }
    }

    #[test]
    fn remaining_at_45_seconds_in() {
        assert_eq!(remaining(t0(), 120, t0() + TimeDelta::seconds(45)), 75);
    }

    #[test]
    fn remaining_clamps_at_zero() {
        assert_eq!(remaining(t0(), 120, t0() + TimeDelta::seconds(130)), 0);
    }

    #[test]
    fn remaining_floors_partial_seconds() {
        let now = t0() + TimeDelta::milliseconds(45_900);
        assert_eq!(remaining(t0(), 120, now), 75);
    }

    #[test]
    fn remaining_before_start_is_full_duration() {
        assert_eq!(remaining(t0(), 120, t0() - TimeDelta::seconds(5)), 120);
    }

    #[test]
    fn remaining_seconds_only_while_active_and_anchored() {
        let mut battle = active("b1", t0(), 120);
        let now = t0() + TimeDelta::seconds(10);
        assert_eq!(remaining_seconds(Some(&battle), now), Some(110));

        battle.phase = Phase::Voting;
        assert_eq!(remaining_seconds(Some(&battle), now), None);

        battle.phase = Phase::Active;
        battle.started_at = None;
        assert_eq!(remaining_seconds(Some(&battle), now), None);

        assert_eq!(remaining_seconds(None, now), None);
    }

    #[test]
    fn manual_clock_advances() {
        let clock = ManualClock::new(t0());
        clock.advance(TimeDelta::seconds(3));
        assert_eq!(clock.now(), t0() + TimeDelta::seconds(3));
        clock.set(t0());
        assert_eq!(clock.now(), t0());
    }

    #[test]
    fn countdown_ticks_once_per_period() {
        let battle = active("b1", t0(), 120);
        let mut countdown = Countdown::default();

        assert_eq!(
            countdown.poll(Some(&battle), t0()),
            CountdownPoll::Tick { remaining: 120 }
        );
        assert_eq!(
            countdown.poll(Some(&battle), t0() + TimeDelta::milliseconds(400)),
            CountdownPoll::NotDue
        );
        assert_eq!(
            countdown.poll(Some(&battle), t0() + TimeDelta::seconds(1)),
            CountdownPoll::Tick { remaining: 119 }
        );
    }

    #[test]
    fn countdown_rederives_after_a_long_gap() {
        let battle = active("b1", t0(), 120);
        let mut countdown = Countdown::default();
        countdown.poll(Some(&battle), t0());
        assert_eq!(
            countdown.poll(Some(&battle), t0() + TimeDelta::seconds(45)),
            CountdownPoll::Tick { remaining: 75 }
        );
    }

    #[test]
    fn countdown_emits_zero_then_stops() {
        let battle = active("b1", t0(), 120);
        let mut countdown = Countdown::default();
        countdown.poll(Some(&battle), t0());

        let late = t0() + TimeDelta::seconds(130);
        assert_eq!(
            countdown.poll(Some(&battle), late),
            CountdownPoll::Tick { remaining: 0 }
        );
        assert!(!countdown.is_running());
        assert_eq!(
            countdown.poll(Some(&battle), late),
            CountdownPoll::Stopped(StopReason::ReachedZero)
        );
        assert!(!countdown.is_running());
        assert_eq!(
            countdown.poll(Some(&battle), late + TimeDelta::seconds(5)),
            CountdownPoll::Inactive
        );
        // zero does not touch the phase
        assert_eq!(battle.phase, Phase::Active);
    }

    #[test]
    fn countdown_stops_on_phase_exit() {
        let mut battle = active("b1", t0(), 120);
        let mut countdown = Countdown::default();
        countdown.poll(Some(&battle), t0());

        battle.phase = Phase::Voting;
        assert_eq!(
            countdown.poll(Some(&battle), t0() + TimeDelta::seconds(2)),
            CountdownPoll::Stopped(StopReason::PhaseExit)
        );
        assert!(!countdown.is_running());
    }

    #[test]
    fn countdown_stops_when_battle_disappears() {
        let battle = active("b1", t0(), 120);
        let mut countdown = Countdown::default();
        countdown.poll(Some(&battle), t0());
        assert_eq!(
            countdown.poll(None, t0() + TimeDelta::seconds(1)),
            CountdownPoll::Stopped(StopReason::PhaseExit)
        );
    }

    #[test]
    fn cancelled_countdown_stays_quiet_until_reset() {
        let battle = active("b1", t0(), 120);
        let mut countdown = Countdown::default();
        countdown.poll(Some(&battle), t0());

        assert!(countdown.cancel());
        assert!(!countdown.cancel());
        assert_eq!(
            countdown.poll(Some(&battle), t0() + TimeDelta::seconds(3)),
            CountdownPoll::Inactive
        );

        countdown.reset();
        assert_eq!(
            countdown.poll(Some(&battle), t0() + TimeDelta::seconds(3)),
            CountdownPoll::Tick { remaining: 117 }
        );
    }

    #[test]
    fn finished_countdown_rearms_for_a_new_battle() {
        let first = active("b1", t0(), 10);
        let mut countdown = Countdown::default();
        let late = t0() + TimeDelta::seconds(20);
        countdown.poll(Some(&first), late);
        countdown.poll(Some(&first), late);

        let second = active("b2", late, 60);
        assert_eq!(
            countdown.poll(Some(&second), late),
            CountdownPoll::Tick { remaining: 60 }
        );
        assert!(countdown.is_running());
    }

    #[test]
    fn tick_now_ignores_wake_up_jitter() {
        let battle = active("b1", t0(), 120);
        let mut countdown = Countdown::default();
        // woken 10ms late, then 5ms late: 995ms apart on the wall clock
        assert_eq!(
            countdown.tick_now(Some(&battle), t0() + TimeDelta::milliseconds(45_010)),
            CountdownPoll::Tick { remaining: 75 }
        );
        assert_eq!(
            countdown.tick_now(Some(&battle), t0() + TimeDelta::milliseconds(46_005)),
            CountdownPoll::Tick { remaining: 74 }
        );
    }

    #[test]
    fn future_start_is_reported_to_observer() {
        let observer = Arc::new(CollectingObserver::new());
        let mut countdown = Countdown::default().with_observer(Some(observer.clone()));
        let battle = active("b1", t0() + TimeDelta::seconds(300), 120);

        assert_eq!(
            countdown.poll(Some(&battle), t0()),
            CountdownPoll::Tick { remaining: 120 }
        );
        crate::assert_violation!(observer, ViolationKind::Countdown);
        assert_eq!(observer.violations()[0].severity, ViolationSeverity::Warning);
    }

    #[test]
    fn small_clock_lead_is_not_reported() {
        let observer = Arc::new(CollectingObserver::new());
        let mut countdown = Countdown::default().with_observer(Some(observer.clone()));
        let battle = active("b1", t0() + TimeDelta::seconds(2), 120);
        let _ = countdown.poll(Some(&battle), t0());
        crate::assert_no_violations!(observer);
    }

    #[test]
    fn zero_period_falls_back_to_default() {
        let battle = active("b1", t0(), 120);
        let mut countdown = Countdown::new(Duration::ZERO);
        countdown.poll(Some(&battle), t0());
        assert_eq!(
            countdown.poll(Some(&battle), t0() + TimeDelta::milliseconds(10)),
            CountdownPoll::NotDue
        );
    }
}
