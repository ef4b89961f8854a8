//! Encoding and decoding of wire messages.
//!
//! Two formats are supported: JSON, which is what the event stream speaks,
//! and a compact bincode form for embedders that bridge the stream over a
//! binary channel. The bincode configuration is defined once here.
//!
//! # Examples
//!
//! ```
//! use battle_sync::network::codec::{decode_snapshot, encode_snapshot, WireFormat};
//! use battle_sync::network::messages::WireSnapshot;
//!
//! let snapshot = WireSnapshot {
//!     id: Some("b1".to_owned()),
//!     ..WireSnapshot::default()
//! };
//! let bytes = encode_snapshot(WireFormat::Binary, &snapshot).expect("encoding should succeed");
//! let decoded = decode_snapshot(WireFormat::Binary, &bytes).expect("decoding should succeed");
//! assert_eq!(decoded, snapshot);
//! ```

use serde::{de::DeserializeOwned, Serialize};
use std::fmt;

use crate::error::BattleSyncError;
use crate::network::messages::{OutboundMessage, VotePayload, WireSnapshot, VOTE_TOPIC};
use crate::BattleSyncResult;

// Fixed-size integers keep encoded sizes independent of values, which makes
// binary snapshots comparable byte for byte.
fn config() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// Serialization format of a wire message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum WireFormat {
    /// UTF-8 JSON, camelCase field names.
    #[default]
    Json,
    /// bincode 2, standard configuration with fixed-width integers.
    Binary,
}

/// Represents what operation was being performed when a codec error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecOperation {
    /// Encoding an inbound battle snapshot.
    EncodeSnapshot,
    /// Decoding an inbound battle snapshot.
    DecodeSnapshot,
    /// Encoding an outbound message.
    EncodeOutbound,
    /// Decoding an outbound message.
    DecodeOutbound,
    /// A generic encoding operation.
    Encode,
    /// A generic decoding operation.
    Decode,
}

impl fmt::Display for CodecOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeSnapshot => write!(f, "encoding battle snapshot"),
            Self::DecodeSnapshot => write!(f, "decoding battle snapshot"),
            Self::EncodeOutbound => write!(f, "encoding outbound message"),
            Self::DecodeOutbound => write!(f, "decoding outbound message"),
            Self::Encode => write!(f, "encoding"),
            Self::Decode => write!(f, "decoding"),
        }
    }
}

/// Errors that can occur during encoding or decoding.
///
/// Neither bincode nor serde_json expose structured failure reasons, so the
/// underlying message is kept as a `String`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CodecError {
    /// The encoding operation failed.
    EncodeError {
        /// The underlying error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// The decoding operation failed.
    DecodeError {
        /// The underlying error message.
        message: String,
        /// The operation that was being performed.
        operation: CodecOperation,
    },
    /// An outbound message arrived under a topic this engine does not publish.
    UnknownTopic {
        /// The topic found in the message.
        topic: String,
    },
}

impl CodecError {
    /// Creates a new encode error with the given message and operation.
    pub fn encode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::EncodeError {
            message: message.into(),
            operation,
        }
    }

    /// Creates a new decode error with the given message and operation.
    pub fn decode(message: impl Into<String>, operation: CodecOperation) -> Self {
        Self::DecodeError {
            message: message.into(),
            operation,
        }
    }

    fn with_operation(self, op: CodecOperation) -> Self {
        match self {
            Self::EncodeError { message, .. } => Self::encode(message, op),
            Self::DecodeError { message, .. } => Self::decode(message, op),
            other => other,
        }
    }
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EncodeError { message, operation } => {
                write!(f, "encoding failed while {operation}: {message}")
            },
            Self::DecodeError { message, operation } => {
                write!(f, "decoding failed while {operation}: {message}")
            },
            Self::UnknownTopic { topic } => write!(f, "unknown outbound topic `{topic}`"),
        }
    }
}

impl std::error::Error for CodecError {}

impl From<CodecError> for BattleSyncError {
    fn from(err: CodecError) -> Self {
        Self::Codec {
            context: err.to_string(),
        }
    }
}

/// Result type for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Encodes a value with the crate's bincode configuration.
///
/// # Examples
///
/// ```
/// use battle_sync::network::codec::encode;
///
/// let bytes = encode(&42u32).expect("encoding should succeed");
/// assert_eq!(bytes.len(), 4);
/// ```
pub fn encode<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, config())
        .map_err(|e| CodecError::encode(e.to_string(), CodecOperation::Encode))
}

/// Decodes a value from a byte slice.
///
/// Returns the decoded value and the number of bytes consumed.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<(T, usize)> {
    bincode::serde::decode_from_slice(bytes, config())
        .map_err(|e| CodecError::decode(e.to_string(), CodecOperation::Decode))
}

/// Decodes a value from a byte slice, ignoring the bytes consumed.
pub fn decode_value<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    decode(bytes).map(|(value, _)| value)
}

/// Encodes an inbound snapshot. Used by servers, bridges and tests.
pub fn encode_snapshot(format: WireFormat, snapshot: &WireSnapshot) -> BattleSyncResult<Vec<u8>> {
    let bytes = match format {
        WireFormat::Json => serde_json::to_vec(snapshot)
            .map_err(|e| CodecError::encode(e.to_string(), CodecOperation::EncodeSnapshot))?,
        WireFormat::Binary => {
            encode(snapshot).map_err(|e| e.with_operation(CodecOperation::EncodeSnapshot))?
        },
    };
    Ok(bytes)
}

/// Decodes an inbound snapshot.
///
/// Absent fields decode to `None`; only structurally broken input is an error.
pub fn decode_snapshot(format: WireFormat, bytes: &[u8]) -> BattleSyncResult<WireSnapshot> {
    let snapshot: WireSnapshot = match format {
        WireFormat::Json => serde_json::from_slice(bytes)
            .map_err(|e| CodecError::decode(e.to_string(), CodecOperation::DecodeSnapshot))?,
        WireFormat::Binary => decode_value(bytes)
            .map_err(|e| e.with_operation(CodecOperation::DecodeSnapshot))?,
    };
    Ok(snapshot)
}

/// Encodes an outbound message.
///
/// The binary form is the `(topic, payload)` pair since bincode cannot carry
/// the JSON type tag.
pub fn encode_outbound(format: WireFormat, message: &OutboundMessage) -> BattleSyncResult<Vec<u8>> {
    let bytes = match format {
        WireFormat::Json => serde_json::to_vec(message)
            .map_err(|e| CodecError::encode(e.to_string(), CodecOperation::EncodeOutbound))?,
        WireFormat::Binary => encode(&(message.topic(), message.payload()))
            .map_err(|e| e.with_operation(CodecOperation::EncodeOutbound))?,
    };
    Ok(bytes)
}

/// Decodes an outbound message.
pub fn decode_outbound(format: WireFormat, bytes: &[u8]) -> BattleSyncResult<OutboundMessage> {
    match format {
        WireFormat::Json => Ok(serde_json::from_slice(bytes)
            .map_err(|e| CodecError::decode(e.to_string(), CodecOperation::DecodeOutbound))?),
        WireFormat::Binary => {
            let (topic, payload): (String, VotePayload) = decode_value(bytes)
                .map_err(|e| e.with_operation(CodecOperation::DecodeOutbound))?;
            if topic != VOTE_TOPIC {
                return Err(CodecError::UnknownTopic { topic }.into());
            }
            Ok(OutboundMessage::Vote {
                battle_id: payload.battle_id,
                participant_id: payload.participant_id,
            })
        },
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
    use crate::battle::{BattleId, UserId};
    use crate::network::messages::WireParticipant;

    fn snapshot() -> WireSnapshot {
        WireSnapshot {
            id: Some("b1".to_owned()),
            stream_id: Some("s1".to_owned()),
            status: Some("active".to_owned()),
            participant1: Some(WireParticipant {
                user_id: Some("alice".to_owned()),
                username: Some("Alice".to_owned()),
                avatar: Some("https://cdn.example/a.png".to_owned()),
                score: Some(10),
                gift_value: Some(2.5),
            }),
            participant2: Some(WireParticipant {
                user_id: Some("bob".to_owned()),
                username: Some("Bob".to_owned()),
                avatar: None,
                score: Some(4),
                gift_value: Some(0.0),
            }),
            duration: Some(120),
            started_at: Some("2024-05-01T20:00:00.000Z".to_owned()),
            ended_at: None,
            winner_id: None,
            sequence: Some(3),
        }
    }

    fn vote() -> OutboundMessage {
        OutboundMessage::Vote {
            battle_id: BattleId::new("b1"),
            participant_id: UserId::new("bob"),
        }
    }

    #[test]
    fn test_snapshot_binary_roundtrip() {
        let bytes = encode_snapshot(WireFormat::Binary, &snapshot()).unwrap();
        assert_eq!(decode_snapshot(WireFormat::Binary, &bytes).unwrap(), snapshot());
    }

    #[test]
    fn test_snapshot_json_uses_camel_case() {
        let bytes = encode_snapshot(WireFormat::Json, &snapshot()).unwrap();
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.contains(r#""streamId":"s1""#));
        assert!(text.contains(r#""giftValue":2.5"#));
    }

    #[test]
    fn test_decode_snapshot_json_from_server_payload() {
        let payload = br#"{
            "id": "b1", "streamId": "s1", "status": "voting",
            "participant1": {"userId": "alice", "username": "Alice", "score": 30, "giftValue": 12.0},
            "participant2": {"userId": "bob", "username": "Bob", "score": 10, "giftValue": 4.0},
            "duration": 120, "startedAt": "2024-05-01T20:00:00Z"
        }"#;
        let decoded = decode_snapshot(WireFormat::Json, payload).unwrap();
        assert_eq!(decoded.status.as_deref(), Some("voting"));
        assert_eq!(decoded.winner_id, None);
        assert_eq!(decoded.sequence, None);
    }

    #[test]
    fn test_decode_snapshot_rejects_garbage() {
        let err = decode_snapshot(WireFormat::Json, b"{not json").unwrap_err();
        assert!(matches!(err, BattleSyncError::Codec { .. }));
        assert!(err.to_string().contains("decoding battle snapshot"));

        let err = decode_snapshot(WireFormat::Binary, &[0xFF, 0xFF, 0xFF]).unwrap_err();
        assert!(matches!(err, BattleSyncError::Codec { .. }));
    }

    #[test]
    fn test_outbound_json_shape() {
        let bytes = encode_outbound(WireFormat::Json, &vote()).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "battle:vote");
        assert_eq!(value["battleId"], "b1");
        assert_eq!(value["participantId"], "bob");
    }

    #[test]
    fn test_outbound_roundtrip_both_formats() {
        for format in [WireFormat::Json, WireFormat::Binary] {
            let bytes = encode_outbound(format, &vote()).unwrap();
            assert_eq!(decode_outbound(format, &bytes).unwrap(), vote(), "{format:?}");
        }
    }

    #[test]
    fn test_binary_outbound_with_unknown_topic() {
        let payload = VotePayload {
            battle_id: BattleId::new("b1"),
            participant_id: UserId::new("bob"),
        };
        let bytes = encode(&("battle:gift", payload)).unwrap();
        let err = decode_outbound(WireFormat::Binary, &bytes).unwrap_err();
        assert!(err.to_string().contains("battle:gift"));
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let first = encode_snapshot(WireFormat::Binary, &snapshot()).unwrap();
        let second = encode_snapshot(WireFormat::Binary, &snapshot()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::encode("boom", CodecOperation::EncodeOutbound);
        assert_eq!(
            err.to_string(),
            "encoding failed while encoding outbound message: boom"
        );
        let err = CodecError::decode("eof", CodecOperation::Decode);
        assert!(err.to_string().contains("decoding failed"));
    }

    #[test]
    fn test_fixed_int_encoding() {
        assert_eq!(encode(&1u64).unwrap().len(), 8);
    }
}
