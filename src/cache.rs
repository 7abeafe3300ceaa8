//! Process-local user cache.
//!
//! Users fetched from sibling shards are kept here so the next lookup of the
//! same argument is served locally. The cache is bounded: once it holds
//! `capacity` users, inserting another evicts the least recently used one.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::entity::{Entity, UserId};
use crate::identifier::Identifier;

/// Default number of users kept per process.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the cache
    pub hits: u64,
    /// Lookups that found nothing
    pub misses: u64,
    /// Records newly stored
    pub inserts: u64,
    /// Records dropped to stay within capacity
    pub evictions: u64,
    /// Records currently held
    pub len: usize,
}

#[derive(Debug)]
struct Slot {
    entity: Entity,
    /// Insertion sequence; orders name matches deterministically.
    seq: u64,
    last_used: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    by_id: HashMap<UserId, Slot>,
    by_name: HashMap<String, BTreeMap<u64, UserId>>,
    recency: BTreeMap<u64, UserId>,
    next_seq: u64,
    clock: u64,
}

impl CacheState {
    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn touch(&mut self, id: UserId) -> Option<Entity> {
        let now = self.tick();
        let slot = self.by_id.get_mut(&id)?;
        let previous = std::mem::replace(&mut slot.last_used, now);
        let entity = slot.entity.clone();
        self.recency.remove(&previous);
        self.recency.insert(now, id);
        Some(entity)
    }

    fn find_by_name(&self, name: &str, discriminator: Option<&str>) -> Option<UserId> {
        let bucket = self.by_name.get(name)?;
        bucket.values().copied().find(|id| match discriminator {
            None => true,
            Some(d) => self
                .by_id
                .get(id)
                .is_some_and(|slot| slot.entity.matches_tag(name, d)),
        })
    }

    fn evict_oldest(&mut self) -> Option<UserId> {
        let (_, id) = self.recency.pop_first()?;
        let slot = self.by_id.remove(&id)?;
        if let Some(bucket) = self.by_name.get_mut(&slot.entity.name) {
            bucket.remove(&slot.seq);
            if bucket.is_empty() {
                self.by_name.remove(&slot.entity.name);
            }
        }
        Some(id)
    }
}

/// Thread-safe, bounded LRU cache of users keyed by id, with a name index.
#[derive(Debug)]
pub struct EntityCache {
    capacity: usize,
    state: Mutex<CacheState>,
    hits: AtomicU64,
    misses: AtomicU64,
    inserts: AtomicU64,
    evictions: AtomicU64,
}

impl Default for EntityCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl EntityCache {
    /// Creates an empty cache holding at most `capacity` users (minimum 1).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(CacheState::default()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            inserts: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn state(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Maximum number of users held.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of users currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.state().by_id.len()
    }

    /// Returns true if the cache holds no users.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if a user with this id is cached. Does not refresh recency.
    #[must_use]
    pub fn contains(&self, id: UserId) -> bool {
        self.state().by_id.contains_key(&id)
    }

    /// Looks up a parsed argument.
    ///
    /// Ids are matched directly. Names and `name#discriminator` tags are
    /// matched exactly and case-sensitively; when several users share a
    /// name, the one inserted first wins.
    pub fn lookup(&self, identifier: &Identifier) -> Option<Entity> {
        let mut state = self.state();
        let id = match identifier {
            Identifier::Id(id) => Some(*id),
            Identifier::NameTag {
                name,
                discriminator,
            } => state.find_by_name(name, Some(discriminator)),
            Identifier::Name(name) => state.find_by_name(name, None),
        };
        let found = id.and_then(|id| state.touch(id));
        drop(state);

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Returns the user with this id, refreshing its recency.
    pub fn get(&self, id: UserId) -> Option<Entity> {
        self.lookup(&Identifier::Id(id))
    }

    /// Inserts a user.
    ///
    /// Returns false and leaves the cached record untouched if a user with
    /// the same id is already present.
    pub fn insert(&self, entity: Entity) -> bool {
        let mut state = self.state();
        if state.by_id.contains_key(&entity.id) {
            return false;
        }

        let seq = state.next_seq;
        state.next_seq += 1;
        let now = state.tick();
        let id = entity.id;

        state
            .by_name
            .entry(entity.name.clone())
            .or_default()
            .insert(seq, id);
        state.recency.insert(now, id);
        state.by_id.insert(
            id,
            Slot {
                entity,
                seq,
                last_used: now,
            },
        );

        let mut evicted = 0u64;
        while state.by_id.len() > self.capacity {
            if state.evict_oldest().is_none() {
                break;
            }
            evicted += 1;
        }
        drop(state);

        self.inserts.fetch_add(1, Ordering::Relaxed);
        if evicted > 0 {
            self.evictions.fetch_add(evicted, Ordering::Relaxed);
            tracing::trace!(evicted, capacity = self.capacity, "evicted least recently used users");
        }
        true
    }

    /// Inserts every user, returning how many were new.
    pub fn extend<I: IntoIterator<Item = Entity>>(&self, entities: I) -> usize {
        entities.into_iter().filter(|e| self.insert(e.clone())).count()
    }

    /// Snapshot of the cache counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            inserts: self.inserts.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            len: self.len(),
        }
    }
}
