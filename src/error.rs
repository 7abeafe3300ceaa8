//! Error types for shardseek.
//!
//! All errors are strongly typed using thiserror. Validation and resolution
//! failures carry the structured context (bounds, minimum date, user id) a
//! presentation layer needs to build a message without re-deriving the
//! constraint.

use std::fmt;

use chrono::NaiveDate;
use thiserror::Error;

use crate::entity::UserId;

/// Upper end of a numeric range reported by [`ValidationError::NotInRange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
    /// Inclusive upper bound.
    Inclusive(i64),
    /// No upper bound.
    Unbounded,
}

impl fmt::Display for Bound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inclusive(v) => write!(f, "{v}"),
            Self::Unbounded => write!(f, "infinity"),
        }
    }
}

/// Errors raised while validating a raw argument.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{message}")]
    BadArgument {
        message: String,
    },

    #[error("{text}")]
    NotInRange {
        text: String,
        from: i64,
        to: Bound,
    },

    #[error("Invalid {kind}")]
    InvalidEnumChoice {
        kind: String,
    },

    #[error("Date must be between {min} and today")]
    DateOutOfRange {
        min: NaiveDate,
    },
}

impl ValidationError {
    /// Creates a generic parse failure.
    #[must_use]
    pub fn bad_argument(message: impl Into<String>) -> Self {
        Self::BadArgument {
            message: message.into(),
        }
    }
}

/// Errors raised while resolving an identifier to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    /// No local or remote match. `confirmed` is false when at least one
    /// sibling shard did not answer before the deadline.
    #[error("Unknown user: {input}")]
    UnknownUser {
        input: String,
        confirmed: bool,
    },

    #[error("Member '{input}' not found")]
    MemberNotFound {
        input: String,
    },

    #[error("User has no character: {user_id}")]
    UserHasNoChar {
        user_id: UserId,
    },

    #[error("Malformed shard reply: {reason}")]
    MalformedReply {
        reason: String,
    },
}

/// Transport errors for shard-to-shard communication.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connection failed: {message}")]
    ConnectionFailed {
        message: String,
    },

    #[error("Failed to serialize request: {message}")]
    SerializationFailed {
        message: String,
    },

    #[error("Failed to deserialize reply: {message}")]
    DeserializationFailed {
        message: String,
    },
}

/// Errors from the profile store backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),
}

/// Errors raised while loading or checking configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {message}")]
    Parse {
        message: String,
    },

    #[error("Invalid config value for '{field}': {reason}")]
    Invalid {
        field: String,
        reason: String,
    },
}

/// Top-level error type for shardseek.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConvertError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ConvertError {
    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if the identifier did not resolve to any user or member.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::Resolution(
                ResolutionError::UnknownUser { .. } | ResolutionError::MemberNotFound { .. }
            )
        )
    }

    /// Returns true if the user resolved but has no character.
    #[must_use]
    pub const fn is_missing_character(&self) -> bool {
        matches!(self, Self::Resolution(ResolutionError::UserHasNoChar { .. }))
    }

    /// Returns true if this is a transport error.
    #[must_use]
    pub const fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Message suitable for showing to the user who typed the argument.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(ValidationError::BadArgument { message }) if message.is_empty() => {
                "Invalid argument.".to_string()
            }
            Self::Validation(ValidationError::NotInRange { from, to, .. }) => {
                format!("The supplied number must be in range of {from} to {to}.")
            }
            Self::Validation(ValidationError::InvalidEnumChoice { kind }) => {
                format!("That is not a valid {kind}.")
            }
            Self::Validation(ValidationError::DateOutOfRange { min }) => {
                format!("The date must be between {min} and today.")
            }
            Self::Validation(v) => v.to_string(),
            Self::Resolution(ResolutionError::UnknownUser { .. }) => "Unknown user.".to_string(),
            Self::Resolution(ResolutionError::MemberNotFound { input }) => {
                format!("Member '{input}' not found.")
            }
            Self::Resolution(ResolutionError::UserHasNoChar { .. }) => {
                "That user has no character yet. They need to create one first.".to_string()
            }
            Self::Resolution(ResolutionError::MalformedReply { .. })
            | Self::Transport(_)
            | Self::Storage(_) => "Something went wrong while looking that up.".to_string(),
        }
    }
}

/// Result type alias for shardseek operations.
pub type ConvertResult<T> = Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_in_range_display_uses_text() {
        let err = ValidationError::NotInRange {
            text: "The supplied number must be in range of 1 to 10.".to_string(),
            from: 1,
            to: Bound::Inclusive(10),
        };
        assert_eq!(err.to_string(), "The supplied number must be in range of 1 to 10.");
    }

    #[test]
    fn test_unbounded_renders_infinity() {
        assert_eq!(Bound::Unbounded.to_string(), "infinity");
        assert_eq!(Bound::Inclusive(7).to_string(), "7");
    }

    #[test]
    fn test_date_out_of_range_carries_min() {
        let min = NaiveDate::from_ymd_opt(2018, 1, 1).unwrap();
        let err = ValidationError::DateOutOfRange { min };
        assert!(err.to_string().contains("2018-01-01"));
    }

    #[test]
    fn test_convert_error_from_validation() {
        let err: ConvertError = ValidationError::bad_argument("Converting to int failed.").into();
        assert!(err.is_validation());
        assert!(!err.is_not_found());
        assert_eq!(err.user_message(), "Converting to int failed.");
    }

    #[test]
    fn test_no_character_is_not_not_found() {
        let err: ConvertError = ResolutionError::UserHasNoChar {
            user_id: UserId::new(42),
        }
        .into();
        assert!(err.is_missing_character());
        assert!(!err.is_not_found());
        assert!(err.user_message().contains("create one first"));
    }

    #[test]
    fn test_unknown_user_message_hides_confirmation() {
        let confirmed: ConvertError = ResolutionError::UnknownUser {
            input: "ghost".to_string(),
            confirmed: true,
        }
        .into();
        let timed_out: ConvertError = ResolutionError::UnknownUser {
            input: "ghost".to_string(),
            confirmed: false,
        }
        .into();
        assert!(confirmed.is_not_found());
        assert!(timed_out.is_not_found());
        assert_eq!(confirmed.user_message(), timed_out.user_message());
    }

    #[test]
    fn test_transport_error() {
        let err: ConvertError = TransportError::ConnectionFailed {
            message: "refused".to_string(),
        }
        .into();
        assert!(err.is_transport());
        assert!(err.to_string().contains("refused"));
    }

    #[test]
    fn test_storage_error_message_is_generic() {
        let err: ConvertError = StorageError::BackendError("lock poisoned".to_string()).into();
        assert!(!err.is_not_found());
        assert_eq!(err.user_message(), "Something went wrong while looking that up.");
    }
}
