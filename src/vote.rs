//! Vote intent emission.
//!
//! A vote is an at-most-once, fire-and-forget message. Nothing is mutated
//! locally; the score change arrives later as an authoritative snapshot.

use std::sync::Arc;

use crate::battle::{BattleId, UserId};
use crate::network::messages::OutboundMessage;
use crate::network::transport::BattleTransport;
use crate::store::BattleStoreHandle;

/// What [`VoteEmitter::vote`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteDispatch {
    /// The intent was handed to the transport.
    Sent {
        /// The battle the vote was addressed to.
        battle_id: BattleId,
    },
    /// No battle is held; nothing was sent.
    NoBattle,
}

/// Translates a user's vote action into a `battle:vote` message.
#[derive(Clone)]
pub struct VoteEmitter {
    transport: Arc<dyn BattleTransport>,
    store: BattleStoreHandle,
}

impl VoteEmitter {
    /// Creates an emitter sending on `transport` for the battle held in `store`.
    #[must_use]
    pub fn new(transport: Arc<dyn BattleTransport>, store: BattleStoreHandle) -> Self {
        Self { transport, store }
    }

    /// Sends a vote for `participant_id` in the current battle.
    ///
    /// A no-op when no battle is held. The participant is not validated
    /// against the battle's two participants.
    pub fn vote(&self, participant_id: impl Into<UserId>) -> VoteDispatch {
        let Some(battle_id) = self.store.with_state(|battle| battle.map(|b| b.id.clone())) else {
            tracing::debug!("vote ignored, no current battle");
            return VoteDispatch::NoBattle;
        };
        let message = OutboundMessage::Vote {
            battle_id: battle_id.clone(),
            participant_id: participant_id.into(),
        };
        tracing::debug!(battle = %battle_id, "vote sent");
        self.transport.send(&message);
        VoteDispatch::Sent { battle_id }
    }
}

impl std::fmt::Debug for VoteEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VoteEmitter")
            .field("store", &self.store)
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
    use crate::battle::{Battle, Participant, Phase, StreamId};
    use crate::network::local_transport::LocalTransport;

    fn battle() -> Battle {
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
            phase: Phase::Active,
            participant_a: participant("alice"),
            participant_b: participant("bob"),
            duration_secs: 60,
            started_at: None,
            ended_at: None,
            winner_id: None,
            sequence: None,
        }
    }

    #[test]
    fn vote_without_battle_sends_nothing() {
        let transport = LocalTransport::new();
        let emitter = VoteEmitter::new(Arc::new(transport.clone()), BattleStoreHandle::new());
        assert_eq!(emitter.vote("alice"), VoteDispatch::NoBattle);
        assert!(transport.sent().is_empty());
    }

    #[test]
    fn vote_sends_once_and_leaves_store_alone() {
        let transport = LocalTransport::new();
        let store = BattleStoreHandle::new();
        let _ = store.apply(battle());
        let emitter = VoteEmitter::new(Arc::new(transport.clone()), store.clone());

        assert_eq!(
            emitter.vote("bob"),
            VoteDispatch::Sent {
                battle_id: BattleId::new("b1")
            }
        );
        assert_eq!(
            transport.sent(),
            vec![OutboundMessage::Vote {
                battle_id: BattleId::new("b1"),
                participant_id: UserId::new("bob"),
            }]
        );
        assert_eq!(store.get_state(), Some(battle()));
    }

    #[test]
    fn vote_for_unknown_participant_is_passed_through() {
        let transport = LocalTransport::new();
        let store = BattleStoreHandle::new();
        let _ = store.apply(battle());
        let emitter = VoteEmitter::new(Arc::new(transport.clone()), store);
        assert!(matches!(emitter.vote("mallory"), VoteDispatch::Sent { .. }));
        assert_eq!(transport.sent().len(), 1);
    }
}
