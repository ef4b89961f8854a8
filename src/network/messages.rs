//! Wire shapes exchanged with the battle event stream.
//!
//! Inbound snapshots are decoded into [`WireSnapshot`], where every field is
//! optional so that a missing field is detected and reported by name instead
//! of failing the whole decode. [`Battle::try_from`] performs the validation.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::battle::{Battle, BattleId, Participant, Phase, StreamId, UserId};
use crate::error::BattleSyncError;

/// The three inbound battle event topics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BattleEventKind {
    /// `battle:start`
    Start,
    /// `battle:update`
    Update,
    /// `battle:end`
    End,
}

impl BattleEventKind {
    /// All inbound kinds, in registration order.
    pub const ALL: [Self; 3] = [Self::Start, Self::Update, Self::End];

    /// The transport topic name.
    #[must_use]
    pub const fn topic(self) -> &'static str {
        match self {
            Self::Start => "battle:start",
            Self::Update => "battle:update",
            Self::End => "battle:end",
        }
    }

    /// Parses a topic name.
    #[must_use]
    pub fn from_topic(topic: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.topic() == topic)
    }
}

impl std::fmt::Display for BattleEventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.topic())
    }
}

/// Topic of the outbound vote intent.
pub const VOTE_TOPIC: &str = "battle:vote";

/// A participant as it appears on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireParticipant {
    /// `userId`, required.
    #[serde(default)]
    pub user_id: Option<String>,
    /// `username`, required.
    #[serde(default)]
    pub username: Option<String>,
    /// `avatar` URL.
    #[serde(default)]
    pub avatar: Option<String>,
    /// `score`, required.
    #[serde(default)]
    pub score: Option<u64>,
    /// `giftValue`, required.
    #[serde(default)]
    pub gift_value: Option<f64>,
}

/// A battle snapshot as delivered by the transport.
///
/// Timestamps are RFC 3339 strings; `status` carries the phase name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireSnapshot {
    /// Battle id, required.
    #[serde(default)]
    pub id: Option<String>,
    /// Hosting stream, required.
    #[serde(default)]
    pub stream_id: Option<String>,
    /// Phase name, required.
    #[serde(default)]
    pub status: Option<String>,
    /// First participant, required.
    #[serde(default)]
    pub participant1: Option<WireParticipant>,
    /// Second participant, required.
    #[serde(default)]
    pub participant2: Option<WireParticipant>,
    /// Battle length in seconds, required.
    #[serde(default)]
    pub duration: Option<u64>,
    /// RFC 3339 start instant.
    #[serde(default)]
    pub started_at: Option<String>,
    /// RFC 3339 end instant.
    #[serde(default)]
    pub ended_at: Option<String>,
    /// Winner's user id.
    #[serde(default)]
    pub winner_id: Option<String>,
    /// Per-battle monotonic sequence number, when the server stamps one.
    #[serde(default)]
    pub sequence: Option<u64>,
}

struct SlotFields {
    root: &'static str,
    user_id: &'static str,
    username: &'static str,
    score: &'static str,
    gift_value: &'static str,
}

const SLOT_1: SlotFields = SlotFields {
    root: "participant1",
    user_id: "participant1.userId",
    username: "participant1.username",
    score: "participant1.score",
    gift_value: "participant1.giftValue",
};

const SLOT_2: SlotFields = SlotFields {
    root: "participant2",
    user_id: "participant2.userId",
    username: "participant2.username",
    score: "participant2.score",
    gift_value: "participant2.giftValue",
};

fn parse_phase(status: &str) -> Result<Phase, BattleSyncError> {
    match status {
        "pending" => Ok(Phase::Pending),
        "active" => Ok(Phase::Active),
        "voting" => Ok(Phase::Voting),
        "completed" => Ok(Phase::Completed),
        "cancelled" => Ok(Phase::Cancelled),
        other => Err(BattleSyncError::malformed(
            "status",
            format!("unknown status `{other}`"),
        )),
    }
}

fn parse_timestamp(
    field: &'static str,
    raw: Option<String>,
) -> Result<Option<DateTime<Utc>>, BattleSyncError> {
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|err| BattleSyncError::malformed(field, format!("`{raw}`: {err}")))
    })
    .transpose()
}

fn non_empty(field: &'static str, raw: Option<String>) -> Result<String, BattleSyncError> {
    match raw {
        Some(value) if !value.is_empty() => Ok(value),
        Some(_) => Err(BattleSyncError::malformed(field, "must not be empty")),
        None => Err(BattleSyncError::missing(field)),
    }
}

fn participant(
    fields: &SlotFields,
    wire: Option<WireParticipant>,
) -> Result<Participant, BattleSyncError> {
    let wire = wire.ok_or_else(|| BattleSyncError::missing(fields.root))?;
    let gift_value = wire
        .gift_value
        .ok_or_else(|| BattleSyncError::missing(fields.gift_value))?;
    if !gift_value.is_finite() || gift_value < 0.0 {
        return Err(BattleSyncError::malformed(
            fields.gift_value,
            format!("{gift_value} is not a finite non-negative number"),
        ));
    }
    Ok(Participant {
        user_id: UserId::new(non_empty(fields.user_id, wire.user_id)?),
        username: wire
            .username
            .ok_or_else(|| BattleSyncError::missing(fields.username))?,
        avatar: wire.avatar,
        score: wire
            .score
            .ok_or_else(|| BattleSyncError::missing(fields.score))?,
        gift_value,
    })
}

impl TryFrom<WireSnapshot> for Battle {
    type Error = BattleSyncError;

    fn try_from(wire: WireSnapshot) -> Result<Self, Self::Error> {
        let id = BattleId::new(non_empty("id", wire.id)?);
        let stream_id = StreamId::new(non_empty("streamId", wire.stream_id)?);
        let phase = parse_phase(
            wire.status
                .as_deref()
                .ok_or_else(|| BattleSyncError::missing("status"))?,
        )?;
        let participant_a = participant(&SLOT_1, wire.participant1)?;
        let participant_b = participant(&SLOT_2, wire.participant2)?;
        if participant_a.user_id == participant_b.user_id {
            return Err(BattleSyncError::malformed(
                "participant2.userId",
                format!("same user as participant1 (`{}`)", participant_a.user_id),
            ));
        }
        let duration_secs = wire
            .duration
            .ok_or_else(|| BattleSyncError::missing("duration"))?;
        let started_at = parse_timestamp("startedAt", wire.started_at)?;
        let ended_at = parse_timestamp("endedAt", wire.ended_at)?;
        if let (Some(started), Some(ended)) = (started_at, ended_at) {
            if ended < started {
                return Err(BattleSyncError::malformed(
                    "endedAt",
                    "precedes startedAt",
                ));
            }
        }

        let winner_id = wire.winner_id.map(UserId::new);
        if let Some(winner) = &winner_id {
            if winner != &participant_a.user_id && winner != &participant_b.user_id {
                return Err(BattleSyncError::malformed(
                    "winnerId",
                    format!("`{winner}` is not a participant"),
                ));
            }
            if phase != Phase::Completed {
                return Err(BattleSyncError::malformed(
                    "winnerId",
                    format!("set while status is `{phase}`"),
                ));
            }
        }

        Ok(Self {
            id,
            stream_id,
            phase,
            participant_a,
            participant_b,
            duration_secs,
            started_at,
            ended_at,
            winner_id,
            sequence: wire.sequence,
        })
    }
}

impl From<&Participant> for WireParticipant {
    fn from(participant: &Participant) -> Self {
        Self {
            user_id: Some(participant.user_id.to_string()),
            username: Some(participant.username.clone()),
            avatar: participant.avatar.clone(),
            score: Some(participant.score),
            gift_value: Some(participant.gift_value),
        }
    }
}

impl From<&Battle> for WireSnapshot {
    fn from(battle: &Battle) -> Self {
        let timestamp = |ts: DateTime<Utc>| ts.to_rfc3339_opts(SecondsFormat::Millis, true);
        Self {
            id: Some(battle.id.to_string()),
            stream_id: Some(battle.stream_id.to_string()),
            status: Some(battle.phase.as_str().to_owned()),
            participant1: Some(WireParticipant::from(&battle.participant_a)),
            participant2: Some(WireParticipant::from(&battle.participant_b)),
            duration: Some(battle.duration_secs),
            started_at: battle.started_at.map(timestamp),
            ended_at: battle.ended_at.map(timestamp),
            winner_id: battle.winner_id.as_ref().map(ToString::to_string),
            sequence: battle.sequence,
        }
    }
}

/// Body of a vote intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VotePayload {
    /// The battle voted in.
    pub battle_id: BattleId,
    /// The participant voted for.
    pub participant_id: UserId,
}

/// Messages this engine publishes on the transport.
///
/// JSON form is `{"type":"battle:vote","battleId":…,"participantId":…}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    /// A fire-and-forget vote for one participant.
    #[serde(rename = "battle:vote", rename_all = "camelCase")]
    Vote {
        /// The battle voted in.
        battle_id: BattleId,
        /// The participant voted for.
        participant_id: UserId,
    },
}

impl OutboundMessage {
    /// The transport topic this message is published on.
    #[must_use]
    pub const fn topic(&self) -> &'static str {
        match self {
            Self::Vote { .. } => VOTE_TOPIC,
        }
    }

    /// The message body without its topic.
    #[must_use]
    pub fn payload(&self) -> VotePayload {
        match self {
            Self::Vote {
                battle_id,
                participant_id,
            } => VotePayload {
                battle_id: battle_id.clone(),
                participant_id: participant_id.clone(),
            },
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

    fn wire_participant(id: &str, score: u64) -> WireParticipant {
        WireParticipant {
            user_id: Some(id.to_owned()),
            username: Some(format!("{id}-name")),
            avatar: None,
            score: Some(score),
            gift_value: Some(1.5),
        }
    }

    fn wire(status: &str) -> WireSnapshot {
        WireSnapshot {
            id: Some("b1".to_owned()),
            stream_id: Some("s1".to_owned()),
            status: Some(status.to_owned()),
            participant1: Some(wire_participant("alice", 3)),
            participant2: Some(wire_participant("bob", 5)),
            duration: Some(120),
            started_at: Some("2024-05-01T20:00:00Z".to_owned()),
            ended_at: None,
            winner_id: None,
            sequence: Some(7),
        }
    }

    fn field_of(err: BattleSyncError) -> &'static str {
        match err {
            BattleSyncError::MalformedSnapshot { field, .. } => field,
            other => panic!("expected MalformedSnapshot, got {other:?}"),
        }
    }

    #[test]
    fn valid_snapshot_converts() {
        let battle = Battle::try_from(wire("active")).unwrap();
        assert_eq!(battle.id, BattleId::new("b1"));
        assert_eq!(battle.phase, Phase::Active);
        assert_eq!(battle.participant_b.score, 5);
        assert_eq!(battle.sequence, Some(7));
        assert_eq!(
            battle.started_at.unwrap().to_rfc3339(),
            "2024-05-01T20:00:00+00:00"
        );
    }

    #[test]
    fn missing_stream_id_is_named() {
        let mut snapshot = wire("active");
        snapshot.stream_id = None;
        assert_eq!(field_of(Battle::try_from(snapshot).unwrap_err()), "streamId");
    }

    #[test]
    fn missing_participant_score_is_named() {
        let mut snapshot = wire("active");
        snapshot.participant2.as_mut().unwrap().score = None;
        assert_eq!(
            field_of(Battle::try_from(snapshot).unwrap_err()),
            "participant2.score"
        );
    }

    #[test]
    fn unknown_status_is_malformed() {
        assert_eq!(
            field_of(Battle::try_from(wire("paused")).unwrap_err()),
            "status"
        );
    }

    #[test]
    fn bad_timestamp_is_malformed() {
        let mut snapshot = wire("active");
        snapshot.started_at = Some("yesterday".to_owned());
        assert_eq!(
            field_of(Battle::try_from(snapshot).unwrap_err()),
            "startedAt"
        );
    }

    #[test]
    fn foreign_winner_is_malformed() {
        let mut snapshot = wire("completed");
        snapshot.winner_id = Some("carol".to_owned());
        assert_eq!(field_of(Battle::try_from(snapshot).unwrap_err()), "winnerId");
    }

    #[test]
    fn winner_before_completion_is_malformed() {
        let mut snapshot = wire("voting");
        snapshot.winner_id = Some("alice".to_owned());
        assert_eq!(field_of(Battle::try_from(snapshot).unwrap_err()), "winnerId");
    }

    #[test]
    fn negative_gift_value_is_malformed() {
        let mut snapshot = wire("active");
        snapshot.participant1.as_mut().unwrap().gift_value = Some(-2.0);
        assert_eq!(
            field_of(Battle::try_from(snapshot).unwrap_err()),
            "participant1.giftValue"
        );
    }

    #[test]
    fn same_user_on_both_sides_is_malformed() {
        let mut snapshot = wire("active");
        snapshot.participant2 = Some(wire_participant("alice", 1));
        assert_eq!(
            field_of(Battle::try_from(snapshot).unwrap_err()),
            "participant2.userId"
        );
    }

    #[test]
    fn json_with_absent_fields_decodes_to_none() {
        let snapshot: WireSnapshot =
            serde_json::from_str(r#"{"id":"b1","status":"pending"}"#).unwrap();
        assert_eq!(snapshot.stream_id, None);
        assert_eq!(field_of(Battle::try_from(snapshot).unwrap_err()), "streamId");
    }

    #[test]
    fn battle_to_wire_and_back() {
        let battle = Battle::try_from(wire("active")).unwrap();
        let back = Battle::try_from(WireSnapshot::from(&battle)).unwrap();
        assert_eq!(battle, back);
    }

    #[test]
    fn vote_serializes_with_type_tag() {
        let vote = OutboundMessage::Vote {
            battle_id: BattleId::new("b1"),
            participant_id: UserId::new("alice"),
        };
        let json = serde_json::to_value(&vote).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"type": "battle:vote", "battleId": "b1", "participantId": "alice"})
        );
        assert_eq!(vote.topic(), "battle:vote");
        assert_eq!(vote.payload().participant_id, UserId::new("alice"));
    }

    #[test]
    fn event_kind_topics() {
        assert_eq!(BattleEventKind::Update.topic(), "battle:update");
        assert_eq!(
            BattleEventKind::from_topic("battle:end"),
            Some(BattleEventKind::End)
        );
        assert_eq!(BattleEventKind::from_topic("battle:vote"), None);
    }
}
