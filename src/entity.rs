//! User identity types.
//!
//! A user id is a 64-bit snowflake assigned by the platform. It never
//! changes, so it is the only key the cache, the shard protocol and the
//! profile store agree on.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Platform-assigned, immutable user identifier.
///
/// # Examples
///
/// ```
/// use shardseek::UserId;
///
/// let id = UserId::new(80_351_110_224_678_912);
/// assert_eq!(id.get(), 80_351_110_224_678_912);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(u64);

impl UserId {
    /// Wraps a raw snowflake.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw snowflake.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Shard that owns this id in a cluster of `shard_count` shards.
    ///
    /// Uses the platform's partitioning rule: the timestamp bits of the
    /// snowflake, modulo the shard count.
    #[must_use]
    pub const fn shard_for(self, shard_count: u32) -> u32 {
        if shard_count == 0 {
            return 0;
        }
        #[allow(clippy::cast_possible_truncation)]
        let shard = ((self.0 >> 22) % shard_count as u64) as u32;
        shard
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for UserId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<UserId> for u64 {
    fn from(id: UserId) -> Self {
        id.0
    }
}

/// A platform user as known to this process.
///
/// The record is a point-in-time snapshot: names can change upstream, but a
/// cached `Entity` is never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    /// Platform snowflake
    pub id: UserId,

    /// Account name, matched case-sensitively
    pub name: String,

    /// Four-character discriminator, absent for users migrated to unique names.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,

    /// Avatar hash, if the user set one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,

    /// Whether the account is a bot
    #[serde(default)]
    pub bot: bool,
}

impl Entity {
    /// Creates a user without a discriminator.
    #[must_use]
    pub fn new(id: UserId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            discriminator: None,
            avatar: None,
            bot: false,
        }
    }

    /// Creates a user with a `name#discriminator` tag.
    #[must_use]
    pub fn with_tag(id: UserId, name: impl Into<String>, discriminator: impl Into<String>) -> Self {
        Self {
            discriminator: Some(discriminator.into()),
            ..Self::new(id, name)
        }
    }

    /// Returns true if both name and discriminator match exactly.
    #[must_use]
    pub fn matches_tag(&self, name: &str, discriminator: &str) -> bool {
        self.name == name && self.discriminator.as_deref() == Some(discriminator)
    }

    /// `name#discriminator`, or the bare name when there is no discriminator.
    #[must_use]
    pub fn tag(&self) -> String {
        match &self.discriminator {
            Some(d) => format!("{}#{d}", self.name),
            None => self.name.clone(),
        }
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Entity {}

impl std::hash::Hash for Entity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Anything that resolves to a platform user.
pub trait HasUserId {
    /// The underlying user's id.
    fn user_id(&self) -> UserId;
}

impl HasUserId for Entity {
    fn user_id(&self) -> UserId {
        self.id
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}
