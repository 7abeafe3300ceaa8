//! # Shardseek - Cross-Shard User Resolution
//!
//! A sharded bot runs as several processes, each connected to a subset of
//! guilds and each seeing only the users of those guilds. Shardseek turns a
//! raw command argument (a mention, an id, `name#1234` or a bare name) into
//! a user record, asking sibling shards when the local process has never
//! seen the user, and caching what they return.
//!
//! ## Core Concepts
//!
//! - **Identifier**: the classified form of a raw argument
//! - **EntityCache**: bounded, process-local user cache
//! - **ShardClient**: one broadcast per miss, first reply wins, hard deadline
//! - **Resolver**: parse, cache, remote, materialize, optional character gate
//! - **Validator**: integer ranges, fixed choices and dates
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use shardseek::{ClusterConfig, Entity, InMemoryProfileStore, LocalCluster, UserId};
//!
//! let cluster = LocalCluster::start(&ClusterConfig::default()).unwrap();
//! cluster
//!     .cache(1)
//!     .unwrap()
//!     .insert(Entity::with_tag(UserId::new(42), "Adrian", "0001"));
//!
//! let resolver = cluster
//!     .resolver(0, &Default::default(), Arc::new(InMemoryProfileStore::new()))
//!     .unwrap();
//! let user = resolver.resolve_user("Adrian#0001").unwrap();
//! assert_eq!(user.id, UserId::new(42));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod entity;
pub mod error;
pub mod identifier;

// Caching and resolution
pub mod cache;
pub mod config;
pub mod guild;
pub mod materialize;
pub mod profile;
pub mod resolver;
pub mod shard;

// Argument validation
pub mod validate;

// gRPC transport (feature-gated)
#[cfg(feature = "transport-grpc")]
pub mod transport;

// Re-export primary types at crate root for convenience
pub use cache::{CacheStats, EntityCache, DEFAULT_CACHE_CAPACITY};
pub use config::{ClusterConfig, NodeConfig, ResolverConfig};
pub use entity::{Entity, HasUserId, UserId};
pub use error::{
    Bound, ConfigError, ConvertError, ConvertResult, ResolutionError, StorageError, TransportError,
    ValidationError,
};
pub use guild::{Guild, GuildDirectory, GuildId, Member, MemberScope};
pub use identifier::Identifier;
pub use materialize::{Materializer, RawUserRecord};
pub use profile::{CharacterGate, InMemoryProfileStore, ProfileRecord, ProfileStore, WithCharacter};
pub use resolver::{ResolutionStage, Resolver};
pub use shard::{
    ChannelTransport, LocalCluster, NoSiblings, ResolutionRequest, ShardClient, ShardLookup,
    ShardNode, ShardReply, ShardTransport,
};
pub use validate::{
    coin_side, crate_rarity, date_or_today, int_from_to, int_greater_than, Validated, Validator,
};
