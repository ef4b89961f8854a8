//! Battle data model and phase state machine.
//!
//! # Phase State Machine
//!
//! ```text
//! ┌─────────┐      ┌────────┐      ┌────────┐      ┌───────────┐
//! │ Pending │ ───► │ Active │ ───► │ Voting │ ───► │ Completed │
//! └────┬────┘      └───┬────┘      └───┬────┘      └───────────┘
//!      │               │               │
//!      └───────────────┴───────┬───────┘
//!                              ▼
//!                        ┌───────────┐
//!                        │ Cancelled │
//!                        └───────────┘
//! ```
//!
//! Phases only move forward. `Completed` and `Cancelled` are terminal. The
//! client never transitions a phase on its own: every transition arrives as an
//! authoritative snapshot from the server.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::telemetry::{InvariantChecker, InvariantViolation};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier from anything string-like.
            #[must_use]
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the identifier as a string slice.
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Opaque identifier of a battle, stable for the battle's lifetime.
    BattleId
);
string_id!(
    /// Identifier of the live stream hosting a battle. Used as the subscription filter key.
    StreamId
);
string_id!(
    /// Identifier of a participant (a streamer taking part in a battle).
    UserId
);

/// The lifecycle position of a battle.
///
/// Staleness ordering uses [`Phase::rank`]. `Completed` and `Cancelled` share
/// a rank, so `Phase` is not `Ord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Announced, not yet started.
    Pending,
    /// Running; the countdown is live.
    Active,
    /// Time is up and the audience vote is open.
    Voting,
    /// Finished with a result. Terminal.
    Completed,
    /// Aborted (for example a participant dropped). Terminal.
    Cancelled,
}

impl Phase {
    /// Position in the forward-only lifecycle.
    ///
    /// `pending (0) < active (1) < voting (2) < {completed, cancelled} (3)`
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Active => 1,
            Self::Voting => 2,
            Self::Completed | Self::Cancelled => 3,
        }
    }

    /// Returns `true` for `Completed` and `Cancelled`.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Returns `true` if a snapshot in `self` may follow one in `held`.
    ///
    /// Staying in the same non-terminal phase is allowed (score updates),
    /// skipping phases forward is allowed, anything out of a terminal phase is not.
    #[must_use]
    pub const fn can_follow(self, held: Self) -> bool {
        if held.is_terminal() {
            return false;
        }
        self.rank() >= held.rank()
    }

    /// Wire name of the phase.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Voting => "voting",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One side of a battle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Participant {
    /// The participant's user id.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
    /// Optional avatar URL.
    pub avatar: Option<String>,
    /// Score as computed by the server. Never decreases within a battle.
    pub score: u64,
    /// Value of gifts received, as computed by the server.
    pub gift_value: f64,
}

/// Which participant slot a value refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// `participant1` on the wire.
    A,
    /// `participant2` on the wire.
    B,
}

/// The canonical battle snapshot held by the store.
///
/// Every snapshot is a complete description of the battle; the store
/// replaces, never merges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Battle {
    /// Battle identifier.
    pub id: BattleId,
    /// Hosting stream.
    pub stream_id: StreamId,
    /// Current phase.
    pub phase: Phase,
    /// First participant (`participant1` on the wire).
    pub participant_a: Participant,
    /// Second participant (`participant2` on the wire).
    pub participant_b: Participant,
    /// Total battle length in seconds, fixed at start.
    pub duration_secs: u64,
    /// Set once, when the battle becomes active.
    pub started_at: Option<DateTime<Utc>>,
    /// Set once, when the battle completes.
    pub ended_at: Option<DateTime<Utc>>,
    /// Winner, only when completed.
    pub winner_id: Option<UserId>,
    /// Optional per-battle monotonic sequence number stamped by the server.
    pub sequence: Option<u64>,
}

impl Battle {
    /// Returns the participant in the given slot.
    #[must_use]
    pub const fn participant(&self, side: Side) -> &Participant {
        match side {
            Side::A => &self.participant_a,
            Side::B => &self.participant_b,
        }
    }

    /// Returns which side the given user plays on, if any.
    #[must_use]
    pub fn side_of(&self, user_id: &UserId) -> Option<Side> {
        if &self.participant_a.user_id == user_id {
            Some(Side::A)
        } else if &self.participant_b.user_id == user_id {
            Some(Side::B)
        } else {
            None
        }
    }

    /// The winning participant, if the battle has completed with a winner.
    #[must_use]
    pub fn winner(&self) -> Option<&Participant> {
        let winner = self.winner_id.as_ref()?;
        self.side_of(winner).map(|side| self.participant(side))
    }

    /// Combined score of both participants.
    #[must_use]
    pub const fn total_score(&self) -> u64 {
        self.participant_a.score.saturating_add(self.participant_b.score)
    }
}

impl InvariantChecker for Battle {
    fn check_invariants(&self) -> Result<(), InvariantViolation> {
        if self.participant_a.user_id == self.participant_b.user_id {
            return Err(InvariantViolation::new(
                "Battle",
                "participants must be distinct users",
            )
            .with_details(format!("user_id={}", self.participant_a.user_id)));
        }
        if let Some(winner) = &self.winner_id {
            if self.side_of(winner).is_none() {
                return Err(InvariantViolation::new(
                    "Battle",
                    "winner must be one of the two participants",
                )
                .with_details(format!("winner_id={winner}")));
            }
            if self.phase != Phase::Completed {
                return Err(InvariantViolation::new(
                    "Battle",
                    "winner is only set on completed battles",
                )
                .with_details(format!("phase={}", self.phase)));
            }
        }
        if let (Some(started), Some(ended)) = (self.started_at, self.ended_at) {
            if ended < started {
                return Err(InvariantViolation::new(
                    "Battle",
                    "ended_at must not precede started_at",
                )
                .with_details(format!("started_at={started}, ended_at={ended}")));
            }
        }
        for participant in [&self.participant_a, &self.participant_b] {
            if !participant.gift_value.is_finite() || participant.gift_value < 0.0 {
                return Err(InvariantViolation::new(
                    "Battle",
                    "gift_value must be a finite non-negative number",
                )
                .with_details(format!(
                    "user_id={}, gift_value={}",
                    participant.user_id, participant.gift_value
                )));
            }
        }
        Ok(())
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

    fn participant(id: &str, score: u64) -> Participant {
        Participant {
            user_id: UserId::new(id),
            username: format!("{id}-name"),
            avatar: None,
            score,
            gift_value: 0.0,
        }
    }

    fn battle(phase: Phase) -> Battle {
        Battle {
            id: BattleId::new("b1"),
            stream_id: StreamId::new("s1"),
            phase,
            participant_a: participant("alice", 3),
            participant_b: participant("bob", 4),
            duration_secs: 120,
            started_at: None,
            ended_at: None,
            winner_id: None,
            sequence: None,
        }
    }

    #[test]
    fn phase_ranks_are_ordered() {
        assert!(Phase::Pending.rank() < Phase::Active.rank());
        assert!(Phase::Active.rank() < Phase::Voting.rank());
        assert!(Phase::Voting.rank() < Phase::Completed.rank());
        assert_eq!(Phase::Completed.rank(), Phase::Cancelled.rank());
    }

    #[test]
    fn terminal_phases_accept_nothing() {
        for next in [
            Phase::Pending,
            Phase::Active,
            Phase::Voting,
            Phase::Completed,
            Phase::Cancelled,
        ] {
            assert!(!next.can_follow(Phase::Completed));
            assert!(!next.can_follow(Phase::Cancelled));
        }
    }

    #[test]
    fn cancelled_reachable_from_every_live_phase() {
        for held in [Phase::Pending, Phase::Active, Phase::Voting] {
            assert!(Phase::Cancelled.can_follow(held));
        }
    }

    #[test]
    fn phase_may_skip_forward_but_not_back() {
        assert!(Phase::Completed.can_follow(Phase::Pending));
        assert!(Phase::Active.can_follow(Phase::Active));
        assert!(!Phase::Active.can_follow(Phase::Voting));
    }

    #[test]
    fn phase_serializes_lowercase() {
        let json = serde_json::to_string(&Phase::Voting).unwrap();
        assert_eq!(json, r#""voting""#);
        let phase: Phase = serde_json::from_str(r#""cancelled""#).unwrap();
        assert_eq!(phase, Phase::Cancelled);
    }

    #[test]
    fn winner_resolves_to_participant() {
        let mut b = battle(Phase::Completed);
        b.winner_id = Some(UserId::new("bob"));
        assert_eq!(b.winner().map(|p| p.username.as_str()), Some("bob-name"));
        assert_eq!(b.side_of(&UserId::new("alice")), Some(Side::A));
        assert_eq!(b.side_of(&UserId::new("carol")), None);
    }

    #[test]
    fn invariants_hold_for_well_formed_battle() {
        let b = battle(Phase::Active);
        assert!(b.check_invariants().is_ok());
    }

    #[test]
    fn invariants_reject_foreign_winner() {
        let mut b = battle(Phase::Completed);
        b.winner_id = Some(UserId::new("mallory"));
        let violation = b.check_invariants().unwrap_err();
        assert!(violation.invariant.contains("winner"));
    }

    #[test]
    fn invariants_reject_winner_outside_completed() {
        let mut b = battle(Phase::Voting);
        b.winner_id = Some(UserId::new("alice"));
        assert!(b.check_invariants().is_err());
    }

    #[test]
    fn invariants_reject_negative_gift_value() {
        let mut b = battle(Phase::Active);
        b.participant_b.gift_value = -1.0;
        assert!(b.check_invariants().is_err());
    }

    #[test]
    fn total_score_saturates() {
        let mut b = battle(Phase::Active);
        b.participant_a.score = u64::MAX;
        assert_eq!(b.total_score(), u64::MAX);
    }
}
