//! Character records and the gate that requires them.
//!
//! Some arguments are only valid for users who have created a character.
//! The gate looks the resolved user up in the profile store and returns the
//! user together with the record, or a dedicated `UserHasNoChar` error.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::entity::{HasUserId, UserId};
use crate::error::{ConvertResult, ResolutionError, StorageError};

fn lock_err(context: &'static str) -> StorageError {
    StorageError::BackendError(format!("poisoned lock: {context}"))
}

/// A user's character. Fields are opaque to this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Owner of the character
    pub user_id: UserId,

    /// Game data, passed through untouched
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

impl ProfileRecord {
    /// A record with no fields.
    #[must_use]
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            fields: serde_json::Map::new(),
        }
    }

    /// Adds a field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.fields.insert(key.into(), value);
        self
    }

    /// Returns a field by name.
    #[must_use]
    pub fn field(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }
}

/// Point lookups into the profile store.
pub trait ProfileStore: Send + Sync {
    /// Returns the profile for `user_id`, if one exists.
    fn fetch(&self, user_id: UserId) -> Result<Option<ProfileRecord>, StorageError>;
}

/// Thread-safe in-memory profile store.
#[derive(Debug, Default)]
pub struct InMemoryProfileStore {
    profiles: RwLock<HashMap<UserId, ProfileRecord>>,
}

impl InMemoryProfileStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a new profile. Returns an error if the user already has one.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::DuplicateKey` on a second insert for the same
    /// user.
    pub fn insert(&self, record: ProfileRecord) -> Result<(), StorageError> {
        let mut profiles = self.profiles.write().map_err(|_| lock_err("profile.insert"))?;
        if profiles.contains_key(&record.user_id) {
            return Err(StorageError::DuplicateKey(record.user_id.to_string()));
        }
        profiles.insert(record.user_id, record);
        Ok(())
    }

    /// Deletes a profile, returning it if it existed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::BackendError` if the lock is poisoned.
    pub fn remove(&self, user_id: UserId) -> Result<Option<ProfileRecord>, StorageError> {
        let mut profiles = self.profiles.write().map_err(|_| lock_err("profile.remove"))?;
        Ok(profiles.remove(&user_id))
    }

    /// Number of stored profiles.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::BackendError` if the lock is poisoned.
    pub fn len(&self) -> Result<usize, StorageError> {
        let profiles = self.profiles.read().map_err(|_| lock_err("profile.len"))?;
        Ok(profiles.len())
    }
}

impl ProfileStore for InMemoryProfileStore {
    fn fetch(&self, user_id: UserId) -> Result<Option<ProfileRecord>, StorageError> {
        let profiles = self.profiles.read().map_err(|_| lock_err("profile.fetch"))?;
        Ok(profiles.get(&user_id).cloned())
    }
}

/// A resolved user or member together with their character.
#[derive(Debug, Clone, PartialEq)]
pub struct WithCharacter<T> {
    /// The resolved user or member
    pub entity: T,
    /// Their character
    pub profile: ProfileRecord,
}

impl<T> WithCharacter<T> {
    /// Splits into the entity and its profile.
    pub fn into_parts(self) -> (T, ProfileRecord) {
        (self.entity, self.profile)
    }
}

/// Requires a profile record before an entity is accepted.
#[derive(Clone)]
pub struct CharacterGate {
    store: Arc<dyn ProfileStore>,
}

impl std::fmt::Debug for CharacterGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CharacterGate").finish_non_exhaustive()
    }
}

impl CharacterGate {
    /// Creates a gate backed by `store`.
    #[must_use]
    pub fn new(store: Arc<dyn ProfileStore>) -> Self {
        Self { store }
    }

    /// Returns the entity with its profile, or `UserHasNoChar`.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError::UserHasNoChar` if no profile exists, or a
    /// storage error if the lookup failed.
    pub fn check<T: HasUserId>(&self, entity: T) -> ConvertResult<WithCharacter<T>> {
        let user_id = entity.user_id();
        match self.store.fetch(user_id)? {
            Some(profile) => Ok(WithCharacter { entity, profile }),
            None => {
                tracing::debug!(%user_id, "user has no character");
                Err(ResolutionError::UserHasNoChar { user_id }.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use serde_json::json;

    use crate::entity::Entity;
    use crate::error::ConvertError;

    fn _assert_profile_store_object_safe(_: &dyn ProfileStore) {}

    #[test]
    fn test_insert_and_fetch() {
        let store = InMemoryProfileStore::new();
        store
            .insert(ProfileRecord::new(UserId::new(1)).with_field("money", json!(100)))
            .unwrap();
        let record = store.fetch(UserId::new(1)).unwrap().unwrap();
        assert_eq!(record.field("money"), Some(&json!(100)));
        assert!(store.fetch(UserId::new(2)).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_insert_fails() {
        let store = InMemoryProfileStore::new();
        store.insert(ProfileRecord::new(UserId::new(1))).unwrap();
        let err = store.insert(ProfileRecord::new(UserId::new(1))).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateKey(_)));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_gate_passes_with_profile() {
        let store = Arc::new(InMemoryProfileStore::new());
        store.insert(ProfileRecord::new(UserId::new(3))).unwrap();
        let gate = CharacterGate::new(store);

        let checked = gate.check(Entity::new(UserId::new(3), "has char")).unwrap();
        assert_eq!(checked.entity.id, UserId::new(3));
        assert_eq!(checked.profile.user_id, UserId::new(3));
    }

    #[test]
    fn test_gate_rejects_without_profile() {
        let gate = CharacterGate::new(Arc::new(InMemoryProfileStore::new()));
        let err = gate.check(Entity::new(UserId::new(4), "no char")).unwrap_err();
        assert_eq!(
            err,
            ConvertError::Resolution(ResolutionError::UserHasNoChar {
                user_id: UserId::new(4)
            })
        );
    }

    #[test]
    fn test_gate_propagates_storage_errors() {
        struct Broken;
        impl ProfileStore for Broken {
            fn fetch(&self, _user_id: UserId) -> Result<Option<ProfileRecord>, StorageError> {
                Err(StorageError::BackendError("db down".to_string()))
            }
        }

        let gate = CharacterGate::new(Arc::new(Broken));
        let err = gate.check(Entity::new(UserId::new(5), "x")).unwrap_err();
        assert!(matches!(err, ConvertError::Storage(_)));
    }

    #[test]
    fn test_remove() {
        let store = InMemoryProfileStore::new();
        store.insert(ProfileRecord::new(UserId::new(1))).unwrap();
        assert!(store.remove(UserId::new(1)).unwrap().is_some());
        assert!(store.fetch(UserId::new(1)).unwrap().is_none());
    }
}
