//! Property-based tests for the store, the countdown and the vote split.
//!
//! # Properties Tested
//!
//! - The held phase never moves backwards
//! - Scores of the held battle never decrease
//! - Applying the same snapshot twice changes nothing the second time
//! - A terminal battle is never modified
//! - The vote split always sums to 100 and favors the leader
//! - Remaining time is bounded by the duration and never increases

use battle_sync::countdown::remaining;
use battle_sync::presentation::vote_split;
use battle_sync::store::BattleStore;
use battle_sync::{ApplyOutcome, Battle, Phase};
use chrono::TimeDelta;
use proptest::prelude::*;

use crate::common::{battle, t0};

fn phase() -> impl Strategy<Value = Phase> {
    prop_oneof![
        Just(Phase::Pending),
        Just(Phase::Active),
        Just(Phase::Voting),
        Just(Phase::Completed),
        Just(Phase::Cancelled),
    ]
}

fn snapshot() -> impl Strategy<Value = Battle> {
    (phase(), 0u64..40, 0u64..40).prop_map(|(phase, a, b)| battle("b1", "s1", phase, (a, b)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn phase_never_decreases(snapshots in prop::collection::vec(snapshot(), 1..40)) {
        let mut store = BattleStore::new();
        let mut last_rank = 0;
        for snapshot in snapshots {
            let _ = store.apply(snapshot);
            if let Some(held) = store.current() {
                prop_assert!(held.phase.rank() >= last_rank);
                last_rank = held.phase.rank();
            }
        }
    }

    #[test]
    fn scores_never_decrease(snapshots in prop::collection::vec(snapshot(), 1..40)) {
        let mut store = BattleStore::new();
        let mut last = (0, 0);
        for snapshot in snapshots {
            let _ = store.apply(snapshot);
            if let Some(held) = store.current() {
                let scores = (held.participant_a.score, held.participant_b.score);
                prop_assert!(scores.0 >= last.0 && scores.1 >= last.1);
                last = scores;
            }
        }
    }

    #[test]
    fn apply_is_idempotent(
        prefix in prop::collection::vec(snapshot(), 0..20),
        repeated in snapshot(),
    ) {
        let mut store = BattleStore::new();
        for snapshot in prefix {
            let _ = store.apply(snapshot);
        }
        let first = store.apply(repeated.clone());
        let after_first = store.current().cloned();
        let second = store.apply(repeated);
        prop_assert_eq!(store.current().cloned(), after_first);
        if first.is_accepted() || first == ApplyOutcome::Duplicate {
            prop_assert_eq!(second, ApplyOutcome::Duplicate);
        } else {
            prop_assert_eq!(second, first);
        }
    }

    #[test]
    fn terminal_battle_is_frozen(
        terminal in (0u64..40, 0u64..40, any::<bool>()),
        later in prop::collection::vec(snapshot(), 1..20),
    ) {
        let (a, b, completed) = terminal;
        let phase = if completed { Phase::Completed } else { Phase::Cancelled };
        let mut store = BattleStore::new();
        let _ = store.apply(battle("b1", "s1", phase, (a, b)));
        let frozen = store.current().cloned();
        for snapshot in later {
            let outcome = store.apply(snapshot);
            prop_assert!(!outcome.is_accepted());
            prop_assert_eq!(store.current().cloned(), frozen.clone());
        }
    }

    #[test]
    fn vote_split_sums_to_hundred(a in any::<u64>(), b in any::<u64>()) {
        let split = vote_split(a, b);
        prop_assert_eq!(u16::from(split.a) + u16::from(split.b), 100);
        if a > b {
            prop_assert!(split.a >= split.b);
        }
        if b > a {
            prop_assert!(split.b >= split.a);
        }
    }

    #[test]
    fn remaining_is_bounded_and_monotone(
        duration in 0u64..10_000,
        first in -500i64..20_000,
        step in 0i64..5_000,
    ) {
        let early = t0() + TimeDelta::seconds(first);
        let late = early + TimeDelta::seconds(step);
        let r_early = remaining(t0(), duration, early);
        let r_late = remaining(t0(), duration, late);
        prop_assert!(r_early <= duration);
        prop_assert!(r_late <= r_early);
    }
}
