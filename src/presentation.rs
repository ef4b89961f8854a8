//! Pure view-model helpers for the scoreboard and vote bar.

use crate::battle::{Battle, BattleId, Participant, Phase, Side, UserId};

/// Vote bar percentages. Always sums to 100.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoteSplit {
    /// Share of participant A, 0..=100.
    pub a: u8,
    /// Share of participant B, `100 - a`.
    pub b: u8,
}

/// Splits the vote bar between two scores.
///
/// `a = round(score_a / total * 100)` with halves rounded up, `b = 100 - a`.
/// A zero total renders as an even 50/50 split.
///
/// ```
/// use battle_sync::presentation::{vote_split, VoteSplit};
///
/// assert_eq!(vote_split(0, 0), VoteSplit { a: 50, b: 50 });
/// assert_eq!(vote_split(30, 10), VoteSplit { a: 75, b: 25 });
/// ```
#[must_use]
pub fn vote_split(score_a: u64, score_b: u64) -> VoteSplit {
    let total = u128::from(score_a) + u128::from(score_b);
    if total == 0 {
        return VoteSplit { a: 50, b: 50 };
    }
    // floor(a * 100 / total + 1/2) in integer arithmetic
    let a = (u128::from(score_a) * 200 + total) / (total * 2);
    let a = u8::try_from(a).unwrap_or(100).min(100);
    VoteSplit { a, b: 100 - a }
}

/// Formats seconds as `m:ss`.
///
/// ```
/// assert_eq!(battle_sync::presentation::format_countdown(75), "1:15");
/// ```
#[must_use]
pub fn format_countdown(secs: u64) -> String {
    format!("{}:{:02}", secs / 60, secs % 60)
}

/// One participant's column on the scoreboard.
#[derive(Debug, Clone, PartialEq)]
pub struct SideView {
    /// Participant id.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
    /// Avatar URL, if any.
    pub avatar: Option<String>,
    /// Server score.
    pub score: u64,
    /// Gift value received.
    pub gift_value: f64,
    /// Vote bar share.
    pub percent: u8,
}

impl SideView {
    fn new(participant: &Participant, percent: u8) -> Self {
        Self {
            user_id: participant.user_id.clone(),
            username: participant.username.clone(),
            avatar: participant.avatar.clone(),
            score: participant.score,
            gift_value: participant.gift_value,
            percent,
        }
    }
}

/// Everything a scoreboard needs to render one frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreboardView {
    /// Battle id.
    pub battle_id: BattleId,
    /// Current phase.
    pub phase: Phase,
    /// Participant A column.
    pub left: SideView,
    /// Participant B column.
    pub right: SideView,
    /// The side with the higher score, `None` on a tie.
    pub leader: Option<Side>,
    /// Winner's display name once completed.
    pub winner: Option<String>,
    /// `m:ss` countdown, present only while a countdown applies.
    pub countdown: Option<String>,
    /// `true` while votes are meaningful (active or voting).
    pub voting_open: bool,
}

impl ScoreboardView {
    /// Builds the view from a battle and its derived remaining time.
    #[must_use]
    pub fn new(battle: &Battle, remaining: Option<u64>) -> Self {
        let (a, b) = (&battle.participant_a, &battle.participant_b);
        let split = vote_split(a.score, b.score);
        let leader = match a.score.cmp(&b.score) {
            std::cmp::Ordering::Greater => Some(Side::A),
            std::cmp::Ordering::Less => Some(Side::B),
            std::cmp::Ordering::Equal => None,
        };
        Self {
            battle_id: battle.id.clone(),
            phase: battle.phase,
            left: SideView::new(a, split.a),
            right: SideView::new(b, split.b),
            leader,
            winner: battle.winner().map(|p| p.username.clone()),
            countdown: remaining.map(format_countdown),
            voting_open: matches!(battle.phase, Phase::Active | Phase::Voting),
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
    use crate::battle::StreamId;

    #[test]
    fn zero_total_is_even() {
        assert_eq!(vote_split(0, 0), VoteSplit { a: 50, b: 50 });
    }

    #[test]
    fn three_to_one() {
        assert_eq!(vote_split(30, 10), VoteSplit { a: 75, b: 25 });
    }

    #[test]
    fn halves_round_up() {
        // 1/8 = 12.5%
        assert_eq!(vote_split(1, 7), VoteSplit { a: 13, b: 87 });
        // 7/8 = 87.5%
        assert_eq!(vote_split(7, 1), VoteSplit { a: 88, b: 12 });
    }

    #[test]
    fn one_sided() {
        assert_eq!(vote_split(5, 0), VoteSplit { a: 100, b: 0 });
        assert_eq!(vote_split(0, 5), VoteSplit { a: 0, b: 100 });
    }

    #[test]
    fn huge_scores_do_not_overflow() {
        assert_eq!(vote_split(u64::MAX, u64::MAX), VoteSplit { a: 50, b: 50 });
    }

    #[test]
    fn countdown_format() {
        assert_eq!(format_countdown(0), "0:00");
        assert_eq!(format_countdown(9), "0:09");
        assert_eq!(format_countdown(120), "2:00");
        assert_eq!(format_countdown(3600), "60:00");
    }

    #[test]
    fn scoreboard_for_completed_battle() {
        let participant = |id: &str, score| Participant {
            user_id: UserId::new(id),
            username: format!("{id}!"),
            avatar: None,
            score,
            gift_value: 0.0,
        };
        let battle = Battle {
            id: BattleId::new("b1"),
            stream_id: StreamId::new("s1"),
            phase: Phase::Completed,
            participant_a: participant("alice", 30),
            participant_b: participant("bob", 10),
            duration_secs: 120,
            started_at: None,
            ended_at: None,
            winner_id: Some(UserId::new("alice")),
            sequence: None,
        };
        let view = ScoreboardView::new(&battle, None);
        assert_eq!(view.left.percent, 75);
        assert_eq!(view.right.percent, 25);
        assert_eq!(view.leader, Some(Side::A));
        assert_eq!(view.winner.as_deref(), Some("alice!"));
        assert_eq!(view.countdown, None);
        assert!(!view.voting_open);
    }
}
