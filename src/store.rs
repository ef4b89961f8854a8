//! The battle state store.
//!
//! Holds the single canonical [`Battle`] for the viewed stream. The only
//! mutation entry point is [`BattleStore::apply`], which implements a
//! full-state replace protocol: every snapshot carries the complete truth, so
//! reordering and duplication reduce to deciding whether a snapshot is older
//! than what is already held.
//!
//! # Staleness
//!
//! For a snapshot of the battle already held, the following checks run in
//! order and the first failure rejects the snapshot:
//!
//! 1. A terminal battle accepts nothing but an identical duplicate.
//! 2. When both carry a sequence number, the incoming one must be strictly greater.
//! 3. The phase rank may not decrease.
//! 4. A recorded `started_at` may not be omitted or changed.
//! 5. The duration may not change once the battle has started.
//! 6. The participants may not change.
//! 7. No score may decrease.
//!
//! A snapshot of a *different* battle replaces the held one only if the held
//! battle is terminal or the new one started strictly later.
//!
//! # Followed stream
//!
//! A store holds one battle, so it follows one stream at a time. Sessions
//! bind it with [`BattleStoreHandle::follow`]; while any [`StreamBinding`] is
//! alive, snapshots of other streams are rejected and a session on another
//! stream cannot share the store.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::battle::{Battle, BattleId, Phase, Side, StreamId};
use crate::debug_check_invariants;
use crate::error::BattleSyncError;
use crate::BattleSyncResult;
use crate::telemetry::ViolationKind;

/// How strictly snapshot ordering is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum OrderingPolicy {
    /// Phase rank and field presence decide staleness. Sequence numbers are
    /// compared whenever both snapshots carry one.
    #[default]
    PhaseOrder,
    /// Every snapshot must carry a sequence number.
    StrictSequence,
}

/// Why a snapshot was discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The held battle is completed or cancelled.
    TerminalState {
        /// The held terminal phase.
        held: Phase,
    },
    /// The sequence number is not newer than the held one.
    StaleSequence {
        /// Held sequence.
        held: u64,
        /// Incoming sequence.
        incoming: u64,
    },
    /// [`OrderingPolicy::StrictSequence`] is in force and the snapshot has no sequence.
    MissingSequence,
    /// The phase would move backwards.
    PhaseRegression {
        /// Held phase.
        held: Phase,
        /// Incoming phase.
        incoming: Phase,
    },
    /// The snapshot omits a `started_at` already recorded.
    StartedAtOmitted,
    /// The snapshot carries a different `started_at` than the recorded one.
    StartedAtChanged,
    /// The duration changed after the battle started.
    DurationChanged {
        /// Held duration in seconds.
        held: u64,
        /// Incoming duration in seconds.
        incoming: u64,
    },
    /// A participant slot names a different user.
    ParticipantMismatch {
        /// The slot that changed.
        side: Side,
    },
    /// A score would decrease.
    ScoreRegression {
        /// The slot whose score dropped.
        side: Side,
        /// Held score.
        held: u64,
        /// Incoming score.
        incoming: u64,
    },
    /// A different battle that does not supersede the held one.
    ForeignBattle {
        /// The battle currently held.
        held: BattleId,
    },
    /// The snapshot belongs to a stream the store does not follow.
    ForeignStream {
        /// The stream the store follows.
        followed: StreamId,
    },
}

impl RejectReason {
    /// The telemetry category this rejection is reported under.
    #[must_use]
    pub const fn violation_kind(&self) -> ViolationKind {
        match self {
            Self::TerminalState { .. } => ViolationKind::TerminalState,
            Self::ForeignStream { .. } => ViolationKind::Subscription,
            _ => ViolationKind::StaleSnapshot,
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TerminalState { held } => write!(f, "battle is already {held}"),
            Self::StaleSequence { held, incoming } => {
                write!(f, "sequence {incoming} is not newer than {held}")
            },
            Self::MissingSequence => write!(f, "snapshot carries no sequence number"),
            Self::PhaseRegression { held, incoming } => {
                write!(f, "phase would regress from {held} to {incoming}")
            },
            Self::StartedAtOmitted => write!(f, "recorded startedAt was omitted"),
            Self::StartedAtChanged => write!(f, "recorded startedAt was changed"),
            Self::DurationChanged { held, incoming } => {
                write!(f, "duration changed from {held}s to {incoming}s")
            },
            Self::ParticipantMismatch { side } => write!(f, "participant {side:?} changed"),
            Self::ScoreRegression {
                side,
                held,
                incoming,
            } => write!(f, "score of participant {side:?} would drop from {held} to {incoming}"),
            Self::ForeignBattle { held } => {
                write!(f, "does not supersede held battle {held}")
            },
            Self::ForeignStream { followed } => {
                write!(f, "store follows stream {followed}")
            },
        }
    }
}

/// What [`BattleStore::apply`] did with a snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum ApplyOutcome {
    /// The store was empty; the snapshot is now the current battle.
    Created,
    /// The held battle was replaced by a newer snapshot of itself.
    Replaced {
        /// Phase before.
        from: Phase,
        /// Phase after.
        to: Phase,
    },
    /// A different battle on the stream replaced the held one.
    Superseded {
        /// The battle that was dropped.
        previous: BattleId,
    },
    /// Identical to the held snapshot; nothing changed.
    Duplicate,
    /// Discarded; the held battle is unchanged.
    Rejected(RejectReason),
}

impl ApplyOutcome {
    /// Returns `true` if the store's state changed.
    #[must_use]
    pub const fn is_accepted(&self) -> bool {
        matches!(
            self,
            Self::Created | Self::Replaced { .. } | Self::Superseded { .. }
        )
    }
}

/// Holds at most one battle and applies snapshots to it.
#[derive(Debug, Clone, Default)]
pub struct BattleStore {
    current: Option<Battle>,
    policy: OrderingPolicy,
    stream: Option<StreamId>,
    // Live `StreamBinding`s on the owning handle.
    followers: usize,
}

impl BattleStore {
    /// Creates an empty store with the default ordering policy.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty store with the given ordering policy.
    #[must_use]
    pub fn with_policy(policy: OrderingPolicy) -> Self {
        Self {
            policy,
            ..Self::default()
        }
    }

    /// The current battle, or `None` before the first accepted snapshot.
    #[must_use]
    pub fn current(&self) -> Option<&Battle> {
        self.current.as_ref()
    }

    /// The ordering policy in force.
    #[must_use]
    pub const fn policy(&self) -> OrderingPolicy {
        self.policy
    }

    /// Changes the ordering policy. The held battle is kept.
    pub fn set_policy(&mut self, policy: OrderingPolicy) {
        self.policy = policy;
    }

    /// The stream snapshots must belong to, if one is followed.
    #[must_use]
    pub fn stream(&self) -> Option<&StreamId> {
        self.stream.as_ref()
    }

    /// Restricts the store to snapshots of `stream`, or lifts the restriction.
    ///
    /// A held battle of another stream is discarded and returned.
    pub fn follow(&mut self, stream: Option<StreamId>) -> Option<Battle> {
        let foreign = match (&self.current, &stream) {
            (Some(held), Some(stream)) => held.stream_id != *stream,
            _ => false,
        };
        self.stream = stream;
        if foreign {
            self.current.take()
        } else {
            None
        }
    }

    /// Discards the held battle and returns it.
    pub fn clear(&mut self) -> Option<Battle> {
        self.current.take()
    }

    /// Applies a snapshot. Never fails; rejections leave the store unchanged.
    pub fn apply(&mut self, incoming: Battle) -> ApplyOutcome {
        let foreign_stream = self
            .stream
            .as_ref()
            .filter(|followed| **followed != incoming.stream_id);
        let outcome = match (&self.current, foreign_stream) {
            (_, Some(followed)) => ApplyOutcome::Rejected(RejectReason::ForeignStream {
                followed: followed.clone(),
            }),
            (None, None) => self
                .check_sequence_present(&incoming)
                .map_or(ApplyOutcome::Created, ApplyOutcome::Rejected),
            (Some(held), None) if held.id != incoming.id => {
                match self
                    .check_sequence_present(&incoming)
                    .or_else(|| Self::check_supersedes(held, &incoming))
                {
                    Some(reason) => ApplyOutcome::Rejected(reason),
                    None => ApplyOutcome::Superseded {
                        previous: held.id.clone(),
                    },
                }
            },
            (Some(held), None) => self.check_same_battle(held, &incoming),
        };

        match &outcome {
            ApplyOutcome::Rejected(reason) => {
                tracing::trace!(battle = %incoming.id, %reason, "snapshot rejected");
            },
            ApplyOutcome::Duplicate => {
                tracing::trace!(battle = %incoming.id, "duplicate snapshot ignored");
            },
            accepted => {
                tracing::debug!(
                    battle = %incoming.id,
                    phase = %incoming.phase,
                    sequence = ?incoming.sequence,
                    outcome = ?accepted,
                    "snapshot applied"
                );
                debug_check_invariants!(incoming, "after apply");
                self.current = Some(incoming);
            },
        }
        outcome
    }

    fn check_sequence_present(&self, incoming: &Battle) -> Option<RejectReason> {
        (self.policy == OrderingPolicy::StrictSequence && incoming.sequence.is_none())
            .then_some(RejectReason::MissingSequence)
    }

    fn check_supersedes(held: &Battle, incoming: &Battle) -> Option<RejectReason> {
        let started_earlier = matches!(
            (held.started_at, incoming.started_at),
            (Some(held_start), Some(incoming_start)) if incoming_start < held_start
        );
        // `None < Some(_)`, so an announced-but-unstarted battle never outranks a started one.
        let started_later = incoming.started_at > held.started_at;
        if !started_earlier && (held.phase.is_terminal() || started_later) {
            None
        } else {
            Some(RejectReason::ForeignBattle {
                held: held.id.clone(),
            })
        }
    }

    fn check_same_battle(&self, held: &Battle, incoming: &Battle) -> ApplyOutcome {
        let identical = held == incoming;

        if held.phase.is_terminal() {
            return if identical {
                ApplyOutcome::Duplicate
            } else {
                ApplyOutcome::Rejected(RejectReason::TerminalState { held: held.phase })
            };
        }

        match (held.sequence, incoming.sequence) {
            (Some(held_seq), Some(incoming_seq)) if incoming_seq <= held_seq => {
                return if identical {
                    ApplyOutcome::Duplicate
                } else {
                    ApplyOutcome::Rejected(RejectReason::StaleSequence {
                        held: held_seq,
                        incoming: incoming_seq,
                    })
                };
            },
            (_, None) if self.policy == OrderingPolicy::StrictSequence => {
                return ApplyOutcome::Rejected(RejectReason::MissingSequence);
            },
            _ => {},
        }

        match Self::check_progress(held, incoming) {
            Some(reason) => ApplyOutcome::Rejected(reason),
            None if identical => ApplyOutcome::Duplicate,
            None => ApplyOutcome::Replaced {
                from: held.phase,
                to: incoming.phase,
            },
        }
    }

    fn check_progress(held: &Battle, incoming: &Battle) -> Option<RejectReason> {
        if !incoming.phase.can_follow(held.phase) {
            return Some(RejectReason::PhaseRegression {
                held: held.phase,
                incoming: incoming.phase,
            });
        }
        if let Some(started_at) = held.started_at {
            match incoming.started_at {
                None => return Some(RejectReason::StartedAtOmitted),
                Some(other) if other != started_at => return Some(RejectReason::StartedAtChanged),
                Some(_) => {},
            }
        }
        if held.phase.rank() >= Phase::Active.rank() && held.duration_secs != incoming.duration_secs {
            return Some(RejectReason::DurationChanged {
                held: held.duration_secs,
                incoming: incoming.duration_secs,
            });
        }
        for side in [Side::A, Side::B] {
            let (before, after) = (held.participant(side), incoming.participant(side));
            if before.user_id != after.user_id {
                return Some(RejectReason::ParticipantMismatch { side });
            }
            if after.score < before.score {
                return Some(RejectReason::ScoreRegression {
                    side,
                    held: before.score,
                    incoming: after.score,
                });
            }
        }
        None
    }
}

/// A change published to store listeners.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreChange {
    /// A snapshot was accepted.
    Applied {
        /// How it was accepted.
        outcome: ApplyOutcome,
        /// The battle now held.
        battle: Battle,
    },
    /// The held battle was discarded.
    Cleared {
        /// The battle that was held.
        previous: Battle,
    },
}

type Listener = Arc<dyn Fn(&StoreChange) + Send + Sync>;

struct Shared {
    store: Mutex<BattleStore>,
    listeners: Mutex<SmallVec<[(u64, Listener); 4]>>,
    next_listener: AtomicU64,
}

/// A shareable store with a `get_state` / `subscribe` capability pair.
///
/// Clones refer to the same store. The first subscriber initializes it and
/// the last one to leave clears it. [`BattleStoreHandle::global`] is the
/// process-wide instance.
///
/// Listeners are invoked after the store lock is released, so a listener may
/// read the store.
///
/// # Example
///
/// ```
/// use battle_sync::store::BattleStoreHandle;
///
/// let store = BattleStoreHandle::new();
/// let listener = store.subscribe(|change| println!("{change:?}"));
/// assert!(store.get_state().is_none());
/// drop(listener);
/// ```
#[derive(Clone)]
pub struct BattleStoreHandle {
    shared: Arc<Shared>,
}

impl Default for BattleStoreHandle {
    fn default() -> Self {
        Self::with_store(BattleStore::default())
    }
}

impl BattleStoreHandle {
    /// Creates an independent store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an independent store with the given ordering policy.
    #[must_use]
    pub fn with_policy(policy: OrderingPolicy) -> Self {
        Self::with_store(BattleStore::with_policy(policy))
    }

    fn with_store(store: BattleStore) -> Self {
        Self {
            shared: Arc::new(Shared {
                store: Mutex::new(store),
                listeners: Mutex::new(SmallVec::new()),
                next_listener: AtomicU64::new(0),
            }),
        }
    }

    /// The process-wide store.
    #[must_use]
    pub fn global() -> &'static Self {
        static GLOBAL: OnceLock<BattleStoreHandle> = OnceLock::new();
        GLOBAL.get_or_init(Self::new)
    }

    /// A copy of the current battle.
    #[must_use]
    pub fn get_state(&self) -> Option<Battle> {
        self.shared.store.lock().current().cloned()
    }

    /// Runs `f` against the current battle without cloning it.
    ///
    /// `f` runs under the store lock and must not call back into this store.
    pub fn with_state<R>(&self, f: impl FnOnce(Option<&Battle>) -> R) -> R {
        f(self.shared.store.lock().current())
    }

    /// The ordering policy in force.
    #[must_use]
    pub fn policy(&self) -> OrderingPolicy {
        self.shared.store.lock().policy()
    }

    /// Changes the ordering policy.
    pub fn set_policy(&self, policy: OrderingPolicy) {
        self.shared.store.lock().set_policy(policy);
    }

    /// Applies a snapshot and notifies listeners if it was accepted.
    pub fn apply(&self, snapshot: Battle) -> ApplyOutcome {
        let (outcome, change) = {
            let mut store = self.shared.store.lock();
            let outcome = store.apply(snapshot);
            let change = if outcome.is_accepted() {
                store.current().cloned().map(|battle| StoreChange::Applied {
                    outcome: outcome.clone(),
                    battle,
                })
            } else {
                None
            };
            (outcome, change)
        };
        if let Some(change) = change {
            self.notify(&change);
        }
        outcome
    }

    /// Discards the held battle, notifying listeners if there was one.
    pub fn clear(&self) -> Option<Battle> {
        let previous = self.shared.store.lock().clear();
        if let Some(previous) = &previous {
            tracing::debug!(battle = %previous.id, "battle store cleared");
            self.notify(&StoreChange::Cleared {
                previous: previous.clone(),
            });
        }
        previous
    }

    /// Binds the store to `stream` until the returned [`StreamBinding`] drops.
    ///
    /// Any number of bindings may share a stream. The first binding after the
    /// store went unbound discards a held battle of another stream.
    ///
    /// # Errors
    ///
    /// Returns [`BattleSyncError::InvalidRequest`] if live bindings hold the
    /// store on a different stream.
    pub fn follow(&self, stream: StreamId) -> BattleSyncResult<StreamBinding> {
        let discarded = {
            let mut store = self.shared.store.lock();
            if let Some(followed) = store.stream() {
                if *followed != stream && store.followers > 0 {
                    return Err(BattleSyncError::InvalidRequest {
                        info: format!(
                            "store already follows stream {followed}, cannot follow {stream}"
                        ),
                    });
                }
            }
            store.followers += 1;
            store.follow(Some(stream.clone()))
        };
        tracing::debug!(%stream, "battle store bound to stream");
        if let Some(previous) = discarded {
            self.notify(&StoreChange::Cleared { previous });
        }
        Ok(StreamBinding {
            shared: Arc::clone(&self.shared),
            stream,
        })
    }

    /// The stream the store follows, if any binding is alive.
    #[must_use]
    pub fn followed_stream(&self) -> Option<StreamId> {
        self.shared.store.lock().stream().cloned()
    }

    /// Registers a listener for accepted changes.
    ///
    /// The listener stays registered until the returned [`StoreListener`] is dropped.
    pub fn subscribe(&self, listener: impl Fn(&StoreChange) + Send + Sync + 'static) -> StoreListener {
        let id = self.shared.next_listener.fetch_add(1, Ordering::Relaxed);
        let mut listeners = self.shared.listeners.lock();
        if listeners.is_empty() {
            tracing::debug!("battle store initialized by first subscriber");
        }
        listeners.push((id, Arc::new(listener)));
        StoreListener {
            id,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Number of live listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.shared.listeners.lock().len()
    }

    /// Returns `true` if both handles refer to the same store.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    fn notify(&self, change: &StoreChange) {
        let listeners: SmallVec<[Listener; 4]> = self
            .shared
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in &listeners {
            listener(change);
        }
    }
}

impl std::fmt::Debug for BattleStoreHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BattleStoreHandle")
            .field("current", &self.with_state(|battle| battle.map(|b| b.id.clone())))
            .field("stream", &self.followed_stream())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Keeps a store listener registered. Dropping the last one clears the store.
#[must_use = "dropping the StoreListener immediately unsubscribes"]
pub struct StoreListener {
    id: u64,
    shared: Arc<Shared>,
}

impl StoreListener {
    /// Unsubscribes now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for StoreListener {
    fn drop(&mut self) {
        let mut listeners = self.shared.listeners.lock();
        listeners.retain(|(id, _)| *id != self.id);
        if listeners.is_empty() {
            if let Some(previous) = self.shared.store.lock().clear() {
                tracing::debug!(battle = %previous.id, "last subscriber left, battle store cleared");
            }
        }
    }
}

impl std::fmt::Debug for StoreListener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreListener").field("id", &self.id).finish()
    }
}

/// Keeps a [`BattleStoreHandle`] bound to one stream.
///
/// Dropping the last binding lifts the restriction.
#[must_use = "dropping the StreamBinding immediately unbinds the store"]
pub struct StreamBinding {
    shared: Arc<Shared>,
    stream: StreamId,
}

impl StreamBinding {
    /// The stream this binding holds the store on.
    #[must_use]
    pub fn stream(&self) -> &StreamId {
        &self.stream
    }

    /// Returns `true` if no other binding shares the store.
    #[must_use]
    pub fn is_exclusive(&self) -> bool {
        self.shared.store.lock().followers == 1
    }

    /// Moves the store to `stream`.
    ///
    /// The held battle is left in place; clearing it is the caller's job.
    ///
    /// # Errors
    ///
    /// Returns [`BattleSyncError::InvalidRequest`] if other bindings share
    /// the store.
    pub fn switch(&mut self, stream: StreamId) -> BattleSyncResult<()> {
        let mut store = self.shared.store.lock();
        if store.followers > 1 {
            return Err(BattleSyncError::InvalidRequest {
                info: format!(
                    "store is shared by {} sessions on stream {}",
                    store.followers, self.stream
                ),
            });
        }
        store.stream = Some(stream.clone());
        self.stream = stream;
        Ok(())
    }
}

impl Drop for StreamBinding {
    fn drop(&mut self) {
        let mut store = self.shared.store.lock();
        store.followers = store.followers.saturating_sub(1);
        if store.followers == 0 {
            store.stream = None;
            tracing::debug!(stream = %self.stream, "battle store unbound");
        }
    }
}

impl std::fmt::Debug for StreamBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamBinding")
            .field("stream", &self.stream)
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
    use crate::battle::{Participant, StreamId, UserId};
    use chrono::{DateTime, TimeDelta, TimeZone, Utc};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0).unwrap()
    }

    fn participant(id: &str, score: u64) -> Participant {
        Participant {
            user_id: UserId::new(id),
            username: id.to_owned(),
            avatar: None,
            score,
            gift_value: 0.0,
        }
    }

    fn battle(id: &str, phase: Phase, scores: (u64, u64)) -> Battle {
        Battle {
            id: BattleId::new(id),
            stream_id: StreamId::new("s1"),
            phase,
            participant_a: participant("alice", scores.0),
            participant_b: participant("bob", scores.1),
            duration_secs: 120,
            started_at: (phase.rank() >= Phase::Active.rank()).then(t0),
            ended_at: None,
            winner_id: None,
            sequence: None,
        }
    }

    fn completed(winner: &str) -> Battle {
        let mut b = battle("b1", Phase::Completed, (5, 5));
        b.ended_at = Some(t0() + TimeDelta::seconds(120));
        b.winner_id = Some(UserId::new(winner));
        b
    }

    #[test]
    fn empty_store_has_no_battle() {
        assert!(BattleStore::new().current().is_none());
    }

    #[test]
    fn first_snapshot_creates() {
        let mut store = BattleStore::new();
        assert_eq!(
            store.apply(battle("b1", Phase::Pending, (0, 0))),
            ApplyOutcome::Created
        );
        assert_eq!(store.current().unwrap().phase, Phase::Pending);
    }

    #[test]
    fn update_first_seeds_an_empty_store() {
        let mut store = BattleStore::new();
        assert_eq!(
            store.apply(battle("b1", Phase::Voting, (4, 2))),
            ApplyOutcome::Created
        );
    }

    #[test]
    fn forward_progress_replaces_whole_snapshot() {
        let mut store = BattleStore::new();
        let _ = store.apply(battle("b1", Phase::Active, (1, 1)));
        let mut next = battle("b1", Phase::Voting, (3, 1));
        next.participant_b.username = "Bobby".to_owned();
        assert_eq!(
            store.apply(next.clone()),
            ApplyOutcome::Replaced {
                from: Phase::Active,
                to: Phase::Voting
            }
        );
        assert_eq!(store.current(), Some(&next));
    }

    #[test]
    fn applying_twice_is_a_duplicate() {
        let mut store = BattleStore::new();
        let snapshot = battle("b1", Phase::Active, (2, 3));
        let _ = store.apply(snapshot.clone());
        let before = store.current().cloned();
        assert_eq!(store.apply(snapshot), ApplyOutcome::Duplicate);
        assert_eq!(store.current().cloned(), before);
    }

    #[test]
    fn phase_regression_is_rejected() {
        let mut store = BattleStore::new();
        let _ = store.apply(battle("b1", Phase::Voting, (2, 2)));
        assert_eq!(
            store.apply(battle("b1", Phase::Active, (2, 2))),
            ApplyOutcome::Rejected(RejectReason::PhaseRegression {
                held: Phase::Voting,
                incoming: Phase::Active
            })
        );
        assert_eq!(store.current().unwrap().phase, Phase::Voting);
    }

    #[test]
    fn omitted_started_at_is_rejected() {
        let mut store = BattleStore::new();
        let _ = store.apply(battle("b1", Phase::Active, (0, 0)));
        let mut stale = battle("b1", Phase::Active, (1, 0));
        stale.started_at = None;
        assert_eq!(
            store.apply(stale),
            ApplyOutcome::Rejected(RejectReason::StartedAtOmitted)
        );
    }

    #[test]
    fn changed_started_at_is_rejected() {
        let mut store = BattleStore::new();
        let _ = store.apply(battle("b1", Phase::Active, (0, 0)));
        let mut moved = battle("b1", Phase::Active, (0, 0));
        moved.started_at = Some(t0() + TimeDelta::seconds(9));
        assert_eq!(
            store.apply(moved),
            ApplyOutcome::Rejected(RejectReason::StartedAtChanged)
        );
    }

    #[test]
    fn duration_is_fixed_once_started() {
        let mut store = BattleStore::new();
        let mut pending = battle("b1", Phase::Pending, (0, 0));
        let _ = store.apply(pending.clone());
        pending.duration_secs = 180;
        assert!(store.apply(pending).is_accepted());

        let mut active = battle("b1", Phase::Active, (0, 0));
        active.duration_secs = 180;
        let _ = store.apply(active.clone());
        active.duration_secs = 60;
        assert_eq!(
            store.apply(active),
            ApplyOutcome::Rejected(RejectReason::DurationChanged {
                held: 180,
                incoming: 60
            })
        );
    }

    #[test]
    fn score_regression_is_rejected() {
        let mut store = BattleStore::new();
        let _ = store.apply(battle("b1", Phase::Active, (10, 4)));
        assert_eq!(
            store.apply(battle("b1", Phase::Active, (9, 8))),
            ApplyOutcome::Rejected(RejectReason::ScoreRegression {
                side: Side::A,
                held: 10,
                incoming: 9
            })
        );
    }

    #[test]
    fn participant_swap_is_rejected() {
        let mut store = BattleStore::new();
        let _ = store.apply(battle("b1", Phase::Active, (0, 0)));
        let mut swapped = battle("b1", Phase::Active, (0, 0));
        swapped.participant_b = participant("carol", 0);
        assert_eq!(
            store.apply(swapped),
            ApplyOutcome::Rejected(RejectReason::ParticipantMismatch { side: Side::B })
        );
    }

    #[test]
    fn second_completed_with_other_winner_is_rejected() {
        let mut store = BattleStore::new();
        let _ = store.apply(completed("alice"));
        assert_eq!(
            store.apply(completed("bob")),
            ApplyOutcome::Rejected(RejectReason::TerminalState {
                held: Phase::Completed
            })
        );
        assert_eq!(store.apply(completed("alice")), ApplyOutcome::Duplicate);
        assert_eq!(
            store.current().unwrap().winner_id,
            Some(UserId::new("alice"))
        );
    }

    #[test]
    fn cancelled_is_terminal() {
        let mut store = BattleStore::new();
        let _ = store.apply(battle("b1", Phase::Cancelled, (0, 0)));
        let outcome = store.apply(battle("b1", Phase::Active, (0, 0)));
        assert_eq!(
            outcome,
            ApplyOutcome::Rejected(RejectReason::TerminalState {
                held: Phase::Cancelled
            })
        );
        if let ApplyOutcome::Rejected(reason) = outcome {
            assert_eq!(reason.violation_kind(), ViolationKind::TerminalState);
        }
    }

    #[test]
    fn sequence_must_strictly_increase() {
        let mut store = BattleStore::new();
        let mut first = battle("b1", Phase::Active, (1, 1));
        first.sequence = Some(5);
        let _ = store.apply(first.clone());

        let mut older = battle("b1", Phase::Active, (2, 1));
        older.sequence = Some(4);
        assert_eq!(
            store.apply(older),
            ApplyOutcome::Rejected(RejectReason::StaleSequence {
                held: 5,
                incoming: 4
            })
        );

        let mut conflicting = battle("b1", Phase::Active, (3, 1));
        conflicting.sequence = Some(5);
        assert!(matches!(
            store.apply(conflicting),
            ApplyOutcome::Rejected(RejectReason::StaleSequence { .. })
        ));

        assert_eq!(store.apply(first), ApplyOutcome::Duplicate);
    }

    #[test]
    fn strict_policy_requires_sequence() {
        let mut store = BattleStore::with_policy(OrderingPolicy::StrictSequence);
        assert_eq!(
            store.apply(battle("b1", Phase::Active, (0, 0))),
            ApplyOutcome::Rejected(RejectReason::MissingSequence)
        );
        let mut stamped = battle("b1", Phase::Active, (0, 0));
        stamped.sequence = Some(1);
        assert_eq!(store.apply(stamped), ApplyOutcome::Created);
    }

    #[test]
    fn newer_battle_supersedes_terminal_one() {
        let mut store = BattleStore::new();
        let _ = store.apply(completed("alice"));
        let mut next = battle("b2", Phase::Pending, (0, 0));
        next.started_at = None;
        assert_eq!(
            store.apply(next),
            ApplyOutcome::Superseded {
                previous: BattleId::new("b1")
            }
        );
    }

    #[test]
    fn later_started_battle_supersedes_live_one() {
        let mut store = BattleStore::new();
        let _ = store.apply(battle("b1", Phase::Active, (0, 0)));
        let mut next = battle("b2", Phase::Active, (0, 0));
        next.started_at = Some(t0() + TimeDelta::seconds(300));
        assert!(store.apply(next).is_accepted());
        assert_eq!(store.current().unwrap().id, BattleId::new("b2"));
    }

    #[test]
    fn earlier_started_battle_is_foreign() {
        let mut store = BattleStore::new();
        let _ = store.apply(completed("alice"));
        let mut old = battle("b0", Phase::Active, (0, 0));
        old.started_at = Some(t0() - TimeDelta::seconds(600));
        assert_eq!(
            store.apply(old),
            ApplyOutcome::Rejected(RejectReason::ForeignBattle {
                held: BattleId::new("b1")
            })
        );
    }

    #[test]
    fn unstarted_foreign_battle_does_not_displace_live_one() {
        let mut store = BattleStore::new();
        let _ = store.apply(battle("b1", Phase::Active, (0, 0)));
        let mut other = battle("b2", Phase::Pending, (0, 0));
        other.started_at = None;
        assert!(matches!(
            store.apply(other),
            ApplyOutcome::Rejected(RejectReason::ForeignBattle { .. })
        ));
    }

    #[test]
    fn handle_notifies_listeners_on_accept_only() {
        let store = BattleStoreHandle::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _listener = store.subscribe(move |change| sink.lock().push(change.clone()));

        let snapshot = battle("b1", Phase::Active, (0, 0));
        let _ = store.apply(snapshot.clone());
        let _ = store.apply(snapshot);
        let _ = store.apply(battle("b1", Phase::Pending, (0, 0)));

        let seen = seen.lock();
        assert_eq!(seen.len(), 1);
        assert!(matches!(
            &seen[0],
            StoreChange::Applied {
                outcome: ApplyOutcome::Created,
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
            sink.lock().push(reader.get_state().map(|b| b.phase));
        });
        let _ = store.apply(battle("b1", Phase::Active, (0, 0)));
        assert_eq!(*phases.lock(), vec![Some(Phase::Active)]);
    }

    #[test]
    fn last_listener_leaving_clears_store() {
        let store = BattleStoreHandle::new();
        let first = store.subscribe(|_| {});
        let second = store.subscribe(|_| {});
        let _ = store.apply(battle("b1", Phase::Active, (0, 0)));

        drop(first);
        assert!(store.get_state().is_some());
        second.unsubscribe();
        assert!(store.get_state().is_none());
        assert_eq!(store.listener_count(), 0);
    }

    #[test]
    fn clear_publishes_previous_battle() {
        let store = BattleStoreHandle::new();
        let cleared = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&cleared);
        let _listener = store.subscribe(move |change| {
            if let StoreChange::Cleared { previous } = change {
                *sink.lock() = Some(previous.id.clone());
            }
        });
        let _ = store.apply(battle("b1", Phase::Active, (0, 0)));
        assert!(store.clear().is_some());
        assert!(store.clear().is_none());
        assert_eq!(*cleared.lock(), Some(BattleId::new("b1")));
    }

    #[test]
    fn followed_store_rejects_other_streams() {
        let mut store = BattleStore::new();
        assert!(store.follow(Some(StreamId::new("s1"))).is_none());
        let mut other = battle("b2", Phase::Active, (0, 0));
        other.stream_id = StreamId::new("s2");
        assert_eq!(
            store.apply(other),
            ApplyOutcome::Rejected(RejectReason::ForeignStream {
                followed: StreamId::new("s1")
            })
        );
        assert_eq!(store.apply(battle("b1", Phase::Active, (0, 0))), ApplyOutcome::Created);
    }

    #[test]
    fn following_another_stream_discards_held_battle() {
        let mut store = BattleStore::new();
        let _ = store.apply(battle("b1", Phase::Active, (0, 0)));
        assert!(store.follow(Some(StreamId::new("s1"))).is_none());
        let discarded = store.follow(Some(StreamId::new("s2")));
        assert_eq!(discarded.map(|b| b.id), Some(BattleId::new("b1")));
        assert!(store.current().is_none());
    }

    #[test]
    fn bindings_share_one_stream_only() {
        let store = BattleStoreHandle::new();
        let first = store.follow(StreamId::new("s1")).unwrap();
        let second = store.follow(StreamId::new("s1")).unwrap();
        assert!(!first.is_exclusive());
        assert!(matches!(
            store.follow(StreamId::new("s2")),
            Err(BattleSyncError::InvalidRequest { .. })
        ));

        drop(first);
        assert!(second.is_exclusive());
        drop(second);
        assert_eq!(store.followed_stream(), None);
        let third = store.follow(StreamId::new("s2")).unwrap();
        assert_eq!(third.stream(), &StreamId::new("s2"));
    }

    #[test]
    fn shared_binding_cannot_switch() {
        let store = BattleStoreHandle::new();
        let mut first = store.follow(StreamId::new("s1")).unwrap();
        let second = store.follow(StreamId::new("s1")).unwrap();
        assert!(first.switch(StreamId::new("s2")).is_err());
        assert_eq!(store.followed_stream(), Some(StreamId::new("s1")));

        drop(second);
        first.switch(StreamId::new("s2")).unwrap();
        assert_eq!(store.followed_stream(), Some(StreamId::new("s2")));
    }

    #[test]
    fn clones_share_state() {
        let store = BattleStoreHandle::new();
        let other = store.clone();
        let _ = store.apply(battle("b1", Phase::Active, (0, 0)));
        assert!(other.ptr_eq(&store));
        assert_eq!(other.get_state().unwrap().id, BattleId::new("b1"));
        assert!(!BattleStoreHandle::new().ptr_eq(&store));
    }
}
