//! Battle snapshots used across integration tests.

#![allow(dead_code)]

use battle_sync::{Battle, BattleId, Participant, Phase, StreamId, UserId};
use chrono::{DateTime, TimeZone, Utc};

/// A fixed reference instant: 2024-05-01T20:00:00Z.
pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 20, 0, 0)
        .single()
        .unwrap_or_default()
}

pub fn participant(id: &str, score: u64) -> Participant {
    Participant {
        user_id: UserId::new(id),
        username: format!("{id} live"),
        avatar: Some(format!("https://cdn.example/{id}.png")),
        score,
        gift_value: score as f64 * 0.5,
    }
}

/// A snapshot of battle `id` on `stream` between alice and bob.
///
/// Active and later phases carry `t0()` as start; completed battles name the
/// leader (alice on a tie) as winner.
pub fn battle(id: &str, stream: &str, phase: Phase, scores: (u64, u64)) -> Battle {
    let winner = if scores.1 > scores.0 { "bob" } else { "alice" };
    Battle {
        id: BattleId::new(id),
        stream_id: StreamId::new(stream),
        phase,
        participant_a: participant("alice", scores.0),
        participant_b: participant("bob", scores.1),
        duration_secs: 120,
        started_at: (phase.rank() >= Phase::Active.rank()).then(t0),
        ended_at: phase.is_terminal().then(|| t0() + chrono::TimeDelta::seconds(120)),
        winner_id: (phase == Phase::Completed).then(|| UserId::new(winner)),
        sequence: None,
    }
}

/// An active 120 s battle on stream `s1` with zero scores.
pub fn active_battle(id: &str) -> Battle {
    battle(id, "s1", Phase::Active, (0, 0))
}
