//! Wire types for the cross-shard `fetch_user` protocol.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TransportError;

/// Upper bound for the user argument carried in a request.
pub const MAX_INPUT_LEN: usize = 512;

/// Upper bound for the reply ceiling a request may ask for.
pub const MAX_EXPECTED_REPLIES: u32 = 64;

/// Operations understood by shard nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShardOperation {
    /// Find a user by id, tag or name.
    FetchUser,
}

/// Payload of a `fetch_user` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchUserPayload {
    /// Normalized user argument (mentions already reduced to ids).
    pub user_inp: String,
}

/// One in-flight cross-shard lookup.
///
/// Serialized as `{correlation, operation: "fetch_user", expected_replies,
/// payload: {user_inp}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRequest {
    /// Token matching replies to this request.
    pub correlation: Uuid,

    /// Always `fetch_user` today.
    pub operation: ShardOperation,

    /// Stop collecting after this many matching replies.
    pub expected_replies: u32,

    /// Operation arguments.
    pub payload: FetchUserPayload,
}

impl ResolutionRequest {
    /// Builds a `fetch_user` request with a fresh correlation token.
    #[must_use]
    pub fn fetch_user(user_inp: impl Into<String>, expected_replies: u32) -> Self {
        Self {
            correlation: Uuid::new_v4(),
            operation: ShardOperation::FetchUser,
            expected_replies: expected_replies.max(1),
            payload: FetchUserPayload {
                user_inp: user_inp.into(),
            },
        }
    }

    /// Checks limits on a request received from the wire.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::DeserializationFailed` if the argument is
    /// empty or too long, or the reply ceiling is out of bounds.
    pub fn validate(&self) -> Result<(), TransportError> {
        let input = &self.payload.user_inp;
        if input.is_empty() {
            return Err(TransportError::DeserializationFailed {
                message: "user_inp is required".to_string(),
            });
        }
        if input.len() > MAX_INPUT_LEN {
            return Err(TransportError::DeserializationFailed {
                message: format!("user_inp exceeds {MAX_INPUT_LEN} bytes"),
            });
        }
        if self.expected_replies == 0 || self.expected_replies > MAX_EXPECTED_REPLIES {
            return Err(TransportError::DeserializationFailed {
                message: format!(
                    "expected_replies must be between 1 and {MAX_EXPECTED_REPLIES}, got {}",
                    self.expected_replies
                ),
            });
        }
        Ok(())
    }
}

/// A sibling shard's answer to a [`ResolutionRequest`].
///
/// `records` holds raw user records in the remote format; an empty list
/// means the shard does not know the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShardReply {
    /// Token of the request being answered.
    pub correlation: Uuid,

    /// Shard that produced the reply.
    pub shard_id: u32,

    /// Matching records, first match first.
    #[serde(default)]
    pub records: Vec<serde_json::Value>,
}

impl ShardReply {
    /// A reply reporting no match.
    #[must_use]
    pub const fn empty(correlation: Uuid, shard_id: u32) -> Self {
        Self {
            correlation,
            shard_id,
            records: Vec::new(),
        }
    }

    /// Returns true if the shard found a user.
    #[must_use]
    pub fn is_match(&self) -> bool {
        !self.records.is_empty()
    }
}
