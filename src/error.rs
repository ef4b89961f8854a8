use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// This enum contains all error messages this library can return.
///
/// Snapshot handling never surfaces errors to callers: anomalies on the inbound
/// path are dropped and reported through [`telemetry`](crate::telemetry). Errors
/// are returned by configuration, session construction and the wire codec.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BattleSyncError {
    /// A wire snapshot is missing a required field or carries an impossible value.
    MalformedSnapshot {
        /// The offending field, in wire (camelCase) naming.
        field: &'static str,
        /// What was wrong with it.
        reason: String,
    },
    /// A configuration value is out of range or inconsistent.
    InvalidConfig {
        /// Further specifies why the configuration was rejected.
        info: String,
    },
    /// You made an invalid request, usually by using wrong parameters for function calls.
    InvalidRequest {
        /// Further specifies why the request was invalid.
        info: String,
    },
    /// Encoding or decoding of a wire message failed.
    Codec {
        /// A description of what failed to encode/decode.
        context: String,
    },
}

impl BattleSyncError {
    pub(crate) fn missing(field: &'static str) -> Self {
        Self::MalformedSnapshot {
            field,
            reason: "required field is missing".to_owned(),
        }
    }

    pub(crate) fn malformed(field: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedSnapshot {
            field,
            reason: reason.into(),
        }
    }
}

impl Display for BattleSyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MalformedSnapshot { field, reason } => {
                write!(f, "Malformed snapshot: field `{}`: {}", field, reason)
            }
            Self::InvalidConfig { info } => {
                write!(f, "Invalid configuration: {}", info)
            }
            Self::InvalidRequest { info } => {
                write!(f, "Invalid Request: {}", info)
            }
            Self::Codec { context } => {
                write!(f, "Codec error: {}", context)
            }
        }
    }
}

impl Error for BattleSyncError {}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_missing_field() {
        let err = BattleSyncError::missing("streamId");
        assert_eq!(
            err.to_string(),
            "Malformed snapshot: field `streamId`: required field is missing"
        );
    }

    #[test]
    fn display_invalid_config() {
        let err = BattleSyncError::InvalidConfig {
            info: "tick period must be non-zero".to_owned(),
        };
        assert!(err.to_string().contains("tick period"));
    }

    #[test]
    fn error_is_std_error() {
        let err: Box<dyn Error> = Box::new(BattleSyncError::Codec {
            context: "eof".to_owned(),
        });
        assert_eq!(err.to_string(), "Codec error: eof");
    }
}
