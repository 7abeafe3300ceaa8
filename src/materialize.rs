//! Conversion of remote user records into cached entities.
//!
//! Sibling shards answer with records in the platform's user format. This
//! module owns that schema, validates it, and maps it onto [`Entity`].

use std::sync::Arc;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::cache::EntityCache;
use crate::entity::{Entity, UserId};
use crate::error::ResolutionError;

/// Maximum accepted length of a user name, in bytes.
pub const MAX_NAME_LEN: usize = 128;

/// Discriminator sent for users without one.
const NO_DISCRIMINATOR: &str = "0";

/// A user record as exchanged between shards.
///
/// Ids travel as strings (snowflakes overflow JSON numbers in some
/// clients); integer ids are accepted too. `username` is accepted as an
/// alias for `name`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawUserRecord {
    /// User snowflake
    #[serde(serialize_with = "ser_snowflake", deserialize_with = "de_snowflake")]
    pub id: u64,

    /// Account name
    #[serde(alias = "username")]
    pub name: String,

    /// Discriminator; `"0"` means none
    #[serde(default)]
    pub discriminator: Option<String>,

    /// Avatar hash
    #[serde(default)]
    pub avatar: Option<String>,

    /// Whether the account is a bot
    #[serde(default)]
    pub bot: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Snowflake {
    Int(u64),
    Str(String),
}

fn de_snowflake<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    match Snowflake::deserialize(deserializer)? {
        Snowflake::Int(v) => Ok(v),
        Snowflake::Str(s) => s
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("invalid snowflake: {s:?}"))),
    }
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn ser_snowflake<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&id.to_string())
}

impl RawUserRecord {
    /// Validates the record and converts it into an [`Entity`].
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError::MalformedReply` for an empty or oversized
    /// name, or a discriminator that is not four ASCII digits.
    pub fn into_entity(self) -> Result<Entity, ResolutionError> {
        if self.name.is_empty() {
            return Err(malformed("name is empty"));
        }
        if self.name.len() > MAX_NAME_LEN {
            return Err(malformed(format!("name exceeds {MAX_NAME_LEN} bytes")));
        }

        let discriminator = match self.discriminator {
            None => None,
            Some(d) if d == NO_DISCRIMINATOR => None,
            Some(d) if d.len() == 4 && d.bytes().all(|b| b.is_ascii_digit()) => Some(d),
            Some(d) => return Err(malformed(format!("invalid discriminator: {d:?}"))),
        };

        Ok(Entity {
            id: UserId::new(self.id),
            name: self.name,
            discriminator,
            avatar: self.avatar,
            bot: self.bot,
        })
    }
}

impl From<&Entity> for RawUserRecord {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id.get(),
            name: entity.name.clone(),
            discriminator: Some(
                entity
                    .discriminator
                    .clone()
                    .unwrap_or_else(|| NO_DISCRIMINATOR.to_string()),
            ),
            avatar: entity.avatar.clone(),
            bot: entity.bot,
        }
    }
}

fn malformed(reason: impl Into<String>) -> ResolutionError {
    ResolutionError::MalformedReply {
        reason: reason.into(),
    }
}

/// Encodes an entity in the wire format sibling shards expect.
///
/// # Errors
///
/// Returns `ResolutionError::MalformedReply` if serialization fails.
pub fn to_wire(entity: &Entity) -> Result<serde_json::Value, ResolutionError> {
    serde_json::to_value(RawUserRecord::from(entity)).map_err(|e| malformed(e.to_string()))
}

/// Turns remote records into entities and caches them.
#[derive(Debug, Clone)]
pub struct Materializer {
    cache: Arc<EntityCache>,
}

impl Materializer {
    /// Creates a materializer writing into `cache`.
    #[must_use]
    pub fn new(cache: Arc<EntityCache>) -> Self {
        Self { cache }
    }

    /// Parses one remote record and caches the resulting entity.
    ///
    /// If another resolution already cached the same id, the cached record
    /// is returned and the new one is dropped. Malformed records are never
    /// cached.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError::MalformedReply` if required fields are
    /// missing or invalid.
    pub fn materialize(&self, raw: serde_json::Value) -> Result<Entity, ResolutionError> {
        let record: RawUserRecord = serde_json::from_value(raw).map_err(|e| {
            tracing::warn!(error = %e, "rejecting malformed shard record");
            malformed(e.to_string())
        })?;
        let entity = record.into_entity()?;

        if self.cache.insert(entity.clone()) {
            tracing::debug!(user_id = %entity.id, name = %entity.name, "cached remote user");
            return Ok(entity);
        }
        Ok(self.cache.get(entity.id).unwrap_or(entity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    #[test]
    fn test_materialize_caches() {
        let cache = Arc::new(EntityCache::default());
        let m = Materializer::new(Arc::clone(&cache));
        let entity = m
            .materialize(json!({"id": "356091260429402122", "name": "Adrian", "discriminator": "0001"}))
            .unwrap();
        assert_eq!(entity.id, UserId::new(356_091_260_429_402_122));
        assert_eq!(entity.discriminator.as_deref(), Some("0001"));
        assert!(cache.contains(entity.id));
    }

    #[test]
    fn test_username_alias_and_integer_id() {
        let m = Materializer::new(Arc::new(EntityCache::default()));
        let entity = m
            .materialize(json!({"id": 42, "username": "Mira", "discriminator": "1234", "bot": true}))
            .unwrap();
        assert_eq!(entity.name, "Mira");
        assert!(entity.bot);
    }

    #[test]
    fn test_zero_discriminator_means_none() {
        let m = Materializer::new(Arc::new(EntityCache::default()));
        let entity = m
            .materialize(json!({"id": "7", "name": "unique", "discriminator": "0"}))
            .unwrap();
        assert!(entity.discriminator.is_none());
    }

    #[test]
    fn test_missing_fields_are_rejected_and_not_cached() {
        let cache = Arc::new(EntityCache::default());
        let m = Materializer::new(Arc::clone(&cache));

        let err = m.materialize(json!({"name": "no id"})).unwrap_err();
        assert!(matches!(err, ResolutionError::MalformedReply { .. }));

        let err = m.materialize(json!({"id": "8"})).unwrap_err();
        assert!(matches!(err, ResolutionError::MalformedReply { .. }));

        let err = m
            .materialize(json!({"id": "not-a-number", "name": "x"}))
            .unwrap_err();
        assert!(matches!(err, ResolutionError::MalformedReply { .. }));

        let err = m
            .materialize(json!({"id": "9", "name": "x", "discriminator": "12a4"}))
            .unwrap_err();
        assert!(matches!(err, ResolutionError::MalformedReply { .. }));

        assert!(cache.is_empty());
    }

    #[test]
    fn test_race_returns_first_cached_record() {
        let cache = Arc::new(EntityCache::default());
        cache.insert(Entity::with_tag(UserId::new(5), "first", "0001"));
        let m = Materializer::new(Arc::clone(&cache));
        let entity = m
            .materialize(json!({"id": "5", "name": "second", "discriminator": "0002"}))
            .unwrap();
        assert_eq!(entity.name, "first");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_wire_format_round_trip_through_materializer() {
        let original = Entity::with_tag(UserId::new(11), "Wire", "4321");
        let wire = to_wire(&original).unwrap();
        assert_eq!(wire["id"], "11");
        assert_eq!(wire["name"], "Wire");

        let m = Materializer::new(Arc::new(EntityCache::default()));
        let back = m.materialize(wire).unwrap();
        assert_eq!(back.tag(), "Wire#4321");
    }
}
