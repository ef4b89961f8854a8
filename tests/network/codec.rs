//! Wire formats as seen by a transport bridge.

use std::sync::Arc;

use battle_sync::network::codec::{self, WireFormat};
use battle_sync::{
    Battle, BattleEventKind, BattleId, BattleSyncError, LocalTransport, OutboundMessage, Phase,
    SessionBuilder, UserId, WireSnapshot,
};

use crate::common::battle;

#[test]
fn binary_snapshot_reaches_the_store() {
    let transport = LocalTransport::new();
    let session = SessionBuilder::new()
        .start(Arc::new(transport.clone()), "s1")
        .unwrap();
    let original = battle("b1", "s1", Phase::Completed, (12, 4));
    let bytes = codec::encode_snapshot(WireFormat::Binary, &WireSnapshot::from(&original)).unwrap();

    transport
        .deliver_encoded(BattleEventKind::End, WireFormat::Binary, &bytes)
        .unwrap();
    assert_eq!(session.current(), Some(original));
}

#[test]
fn json_and_binary_decode_to_the_same_battle() {
    let original = battle("b7", "s1", Phase::Voting, (8, 9));
    let wire = WireSnapshot::from(&original);
    for format in [WireFormat::Json, WireFormat::Binary] {
        let bytes = codec::encode_snapshot(format, &wire).unwrap();
        let decoded = codec::decode_snapshot(format, &bytes).unwrap();
        assert_eq!(Battle::try_from(decoded).unwrap(), original, "{format:?}");
    }
}

#[test]
fn truncated_binary_is_a_codec_error() {
    let wire = WireSnapshot::from(&battle("b1", "s1", Phase::Active, (0, 0)));
    let bytes = codec::encode_snapshot(WireFormat::Binary, &wire).unwrap();
    let err = codec::decode_snapshot(WireFormat::Binary, &bytes[..bytes.len() / 2]).unwrap_err();
    assert!(matches!(err, BattleSyncError::Codec { .. }));
}

#[test]
fn unknown_status_is_malformed() {
    let mut wire = WireSnapshot::from(&battle("b1", "s1", Phase::Active, (0, 0)));
    wire.status = Some("paused".to_owned());
    let err = Battle::try_from(wire).unwrap_err();
    assert!(matches!(
        err,
        BattleSyncError::MalformedSnapshot {
            field: "status",
            ..
        }
    ));
}

#[test]
fn outbound_vote_in_both_formats() {
    let vote = OutboundMessage::Vote {
        battle_id: BattleId::new("b1"),
        participant_id: UserId::new("alice"),
    };
    let json = codec::encode_outbound(WireFormat::Json, &vote).unwrap();
    assert_eq!(
        std::str::from_utf8(&json).unwrap(),
        r#"{"type":"battle:vote","battleId":"b1","participantId":"alice"}"#
    );
    for format in [WireFormat::Json, WireFormat::Binary] {
        let bytes = codec::encode_outbound(format, &vote).unwrap();
        assert_eq!(codec::decode_outbound(format, &bytes).unwrap(), vote);
    }
}
