//! Vote intents leave through the transport and nothing changes locally.

use std::sync::Arc;

use battle_sync::network::codec::{self, WireFormat};
use battle_sync::{
    BattleEventKind, BattleId, LocalTransport, OutboundMessage, Phase, SessionBuilder,
    UserId, VoteDispatch, VoteSplit,
};

use crate::common::battle;

#[test]
fn vote_is_fire_and_forget() {
    let transport = LocalTransport::new();
    let session = SessionBuilder::new()
        .start(Arc::new(transport.clone()), "s1")
        .unwrap();
    transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Voting, (30, 10)));
    let before = session.current();

    assert_eq!(
        session.vote("bob"),
        VoteDispatch::Sent {
            battle_id: BattleId::new("b1")
        }
    );
    assert_eq!(session.current(), before);
    assert_eq!(session.vote_split(), Some(VoteSplit { a: 75, b: 25 }));

    let sent = transport.take_sent();
    assert_eq!(sent.len(), 1);
    let json = String::from_utf8(codec::encode_outbound(WireFormat::Json, &sent[0]).unwrap()).unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(value["type"], "battle:vote");
    assert_eq!(value["battleId"], "b1");
    assert_eq!(value["participantId"], "bob");
}

#[test]
fn vote_without_battle_is_a_noop() {
    let transport = LocalTransport::new();
    let session = SessionBuilder::new()
        .start(Arc::new(transport.clone()), "s1")
        .unwrap();
    assert_eq!(session.vote("alice"), VoteDispatch::NoBattle);
    assert!(transport.sent().is_empty());
}

#[test]
fn score_change_arrives_as_a_later_snapshot() {
    let transport = LocalTransport::new();
    let session = SessionBuilder::new()
        .start(Arc::new(transport.clone()), "s1")
        .unwrap();
    transport.deliver_battle(BattleEventKind::Start, &battle("b1", "s1", Phase::Active, (0, 0)));
    assert_eq!(session.vote_split(), Some(VoteSplit { a: 50, b: 50 }));

    let _ = session.vote("alice");
    assert_eq!(
        transport.sent(),
        vec![OutboundMessage::Vote {
            battle_id: BattleId::new("b1"),
            participant_id: UserId::new("alice"),
        }]
    );
    assert_eq!(session.vote_split(), Some(VoteSplit { a: 50, b: 50 }));

    transport.deliver_battle(BattleEventKind::Update, &battle("b1", "s1", Phase::Active, (1, 0)));
    assert_eq!(session.vote_split(), Some(VoteSplit { a: 100, b: 0 }));
}
