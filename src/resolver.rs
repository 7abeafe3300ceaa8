//! Resolution pipeline.
//!
//! A raw argument is parsed, looked up in the local cache, and on a miss
//! broadcast to sibling shards. A remote match is materialized into the
//! cache so the next lookup stays local. Member lookups never leave the
//! guild data held by this process.

use std::fmt;
use std::sync::Arc;

use crate::cache::EntityCache;
use crate::config::ResolverConfig;
use crate::entity::{Entity, HasUserId};
use crate::error::{ConvertResult, ResolutionError};
use crate::guild::{Member, MemberScope};
use crate::identifier::Identifier;
use crate::materialize::Materializer;
use crate::profile::{CharacterGate, ProfileStore, WithCharacter};
use crate::shard::client::ShardClient;
use crate::shard::transport::ShardTransport;

/// Pipeline states, as reported in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolutionStage {
    /// Argument classified
    Parsed,
    /// Found in the local cache
    LocalHit,
    /// Not in the local cache
    LocalMiss,
    /// Waiting on sibling shards
    RemotePending,
    /// Remote record stored locally
    Materialized,
    /// User or member returned
    Resolved,
    /// User returned together with its profile
    ResolvedWithCharacter,
    /// Nobody knows the argument
    NotFound,
    /// User exists but has no profile
    NoCharacter,
    /// Winning remote record failed validation
    MalformedReply,
}

impl ResolutionStage {
    /// Stable name used in log fields.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Parsed => "parsed",
            Self::LocalHit => "local_hit",
            Self::LocalMiss => "local_miss",
            Self::RemotePending => "remote_pending",
            Self::Materialized => "materialized",
            Self::Resolved => "resolved",
            Self::ResolvedWithCharacter => "resolved_with_character",
            Self::NotFound => "not_found",
            Self::NoCharacter => "no_character",
            Self::MalformedReply => "malformed_reply",
        }
    }

    /// Returns true for states a resolution ends in.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Resolved
                | Self::ResolvedWithCharacter
                | Self::NotFound
                | Self::NoCharacter
                | Self::MalformedReply
        )
    }
}

impl fmt::Display for ResolutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolves user and member arguments for one shard.
pub struct Resolver {
    cache: Arc<EntityCache>,
    client: ShardClient,
    materializer: Materializer,
    gate: CharacterGate,
    expected_replies: u32,
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("cache_len", &self.cache.len())
            .field("client", &self.client)
            .field("expected_replies", &self.expected_replies)
            .finish_non_exhaustive()
    }
}

impl Resolver {
    /// Creates a resolver over a shared cache.
    ///
    /// The cache is usually also served to siblings by this shard's
    /// [`crate::ShardNode`], so users fetched here become visible to them.
    #[must_use]
    pub fn new(
        config: &ResolverConfig,
        cache: Arc<EntityCache>,
        transport: Arc<dyn ShardTransport>,
        profiles: Arc<dyn ProfileStore>,
    ) -> Self {
        Self {
            client: ShardClient::new(transport, config.remote_timeout()),
            materializer: Materializer::new(Arc::clone(&cache)),
            gate: CharacterGate::new(profiles),
            expected_replies: config.expected_replies.max(1),
            cache,
        }
    }

    /// The cache this resolver reads and fills.
    #[must_use]
    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    /// The sibling lookup client, for its counters.
    #[must_use]
    pub fn client(&self) -> &ShardClient {
        &self.client
    }

    /// Resolves a user argument, asking sibling shards on a local miss.
    ///
    /// # Errors
    ///
    /// - `ResolutionError::UnknownUser` if nobody knows the user, including
    ///   when siblings did not answer in time
    /// - `ResolutionError::MalformedReply` if the winning record is invalid
    /// - `TransportError` if the broadcast could not be dispatched
    pub fn resolve_user(&self, raw: &str) -> ConvertResult<Entity> {
        let identifier = Identifier::parse(raw);
        trace_stage(ResolutionStage::Parsed, raw);

        if let Some(entity) = self.cache.lookup(&identifier) {
            trace_stage(ResolutionStage::LocalHit, raw);
            return Ok(entity);
        }
        trace_stage(ResolutionStage::LocalMiss, raw);

        let query = identifier.query();
        if query.is_empty() {
            return Err(ResolutionError::UnknownUser {
                input: raw.to_string(),
                confirmed: true,
            }
            .into());
        }
        trace_stage(ResolutionStage::RemotePending, &query);
        let lookup = self.client.resolve(&query, self.expected_replies)?;

        let Some(record) = lookup.first_record().cloned() else {
            let confirmed = lookup.is_confirmed_absent();
            tracing::debug!(
                stage = %ResolutionStage::NotFound,
                input = raw,
                confirmed,
                "user not found"
            );
            return Err(ResolutionError::UnknownUser {
                input: raw.to_string(),
                confirmed,
            }
            .into());
        };

        match self.materializer.materialize(record) {
            Ok(entity) => {
                trace_stage(ResolutionStage::Materialized, raw);
                tracing::debug!(
                    stage = %ResolutionStage::Resolved,
                    input = raw,
                    user_id = %entity.id,
                    "resolved remote user"
                );
                Ok(entity)
            }
            Err(e) => {
                tracing::warn!(stage = %ResolutionStage::MalformedReply, input = raw, error = %e);
                Err(e.into())
            }
        }
    }

    /// Resolves a user who must have a character.
    ///
    /// # Errors
    ///
    /// As [`Resolver::resolve_user`], plus `ResolutionError::UserHasNoChar`
    /// when the user exists but has no profile.
    pub fn resolve_user_with_character(&self, raw: &str) -> ConvertResult<WithCharacter<Entity>> {
        let entity = self.resolve_user(raw)?;
        self.gate_checked(raw, entity)
    }

    /// Resolves a guild member from guild data in `scope`.
    ///
    /// # Errors
    ///
    /// Returns `ResolutionError::MemberNotFound` if no member matches.
    pub fn resolve_member(&self, scope: MemberScope<'_>, raw: &str) -> ConvertResult<Member> {
        if let Some(member) = scope.find(raw) {
            tracing::debug!(
                stage = %ResolutionStage::Resolved,
                %scope,
                input = raw,
                user_id = %member.user.id,
                "resolved member"
            );
            return Ok(member.clone());
        }
        tracing::debug!(stage = %ResolutionStage::NotFound, %scope, input = raw, "member not found");
        Err(ResolutionError::MemberNotFound {
            input: raw.to_string(),
        }
        .into())
    }

    /// Resolves a guild member who must have a character.
    ///
    /// # Errors
    ///
    /// As [`Resolver::resolve_member`], plus `ResolutionError::UserHasNoChar`.
    pub fn resolve_member_with_character(
        &self,
        scope: MemberScope<'_>,
        raw: &str,
    ) -> ConvertResult<WithCharacter<Member>> {
        let member = self.resolve_member(scope, raw)?;
        self.gate_checked(raw, member)
    }

    fn gate_checked<T: HasUserId>(
        &self,
        raw: &str,
        entity: T,
    ) -> ConvertResult<WithCharacter<T>> {
        let checked = self.gate.check(entity);
        match &checked {
            Ok(_) => trace_stage(ResolutionStage::ResolvedWithCharacter, raw),
            Err(e) if e.is_missing_character() => trace_stage(ResolutionStage::NoCharacter, raw),
            Err(e) => tracing::warn!(input = raw, error = %e, "character lookup failed"),
        }
        checked
    }
}

fn trace_stage(stage: ResolutionStage, input: &str) {
    tracing::trace!(stage = %stage, input, "resolution step");
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::time::Duration;

    use crossbeam_channel::Sender;
    use serde_json::json;

    use crate::entity::UserId;
    use crate::error::{ConvertError, TransportError};
    use crate::guild::{Guild, GuildDirectory, GuildId};
    use crate::profile::{InMemoryProfileStore, ProfileRecord};
    use crate::shard::request::{ResolutionRequest, ShardReply};
    use crate::shard::transport::NoSiblings;

    /// Answers every broadcast with a fixed set of records from shard 1.
    struct OneSibling {
        records: Vec<serde_json::Value>,
    }

    impl ShardTransport for OneSibling {
        fn siblings(&self) -> usize {
            1
        }

        fn broadcast(
            &self,
            request: &ResolutionRequest,
            replies: Sender<ShardReply>,
        ) -> Result<usize, TransportError> {
            let mut reply = ShardReply::empty(request.correlation, 1);
            reply.records.clone_from(&self.records);
            let _ = replies.try_send(reply);
            Ok(1)
        }
    }

    /// Accepts every broadcast and never answers.
    struct Silent;

    impl ShardTransport for Silent {
        fn siblings(&self) -> usize {
            2
        }

        fn broadcast(
            &self,
            _request: &ResolutionRequest,
            replies: Sender<ShardReply>,
        ) -> Result<usize, TransportError> {
            std::mem::forget(replies);
            Ok(2)
        }
    }

    fn config() -> ResolverConfig {
        ResolverConfig {
            remote_timeout_ms: 50,
            ..ResolverConfig::default()
        }
    }

    fn resolver(transport: Arc<dyn ShardTransport>, profiles: Arc<InMemoryProfileStore>) -> Resolver {
        Resolver::new(&config(), Arc::new(EntityCache::default()), transport, profiles)
    }

    #[test]
    fn test_local_hit_skips_remote() {
        let r = resolver(Arc::new(NoSiblings), Arc::new(InMemoryProfileStore::new()));
        r.cache().insert(Entity::with_tag(UserId::new(5), "Local", "0005"));

        assert_eq!(r.resolve_user("<@5>").unwrap().name, "Local");
        assert_eq!(r.resolve_user("Local#0005").unwrap().id, UserId::new(5));
        assert_eq!(r.client().stats().dispatches, 0);
    }

    #[test]
    fn test_remote_hit_is_materialized() {
        let transport = Arc::new(OneSibling {
            records: vec![json!({"id": "9", "name": "Far", "discriminator": "0009"})],
        });
        let r = resolver(transport, Arc::new(InMemoryProfileStore::new()));

        let entity = r.resolve_user("9").unwrap();
        assert_eq!(entity.name, "Far");
        assert!(r.cache().contains(UserId::new(9)));
        assert_eq!(r.client().stats().dispatches, 1);

        r.resolve_user("9").unwrap();
        assert_eq!(r.client().stats().dispatches, 1);
    }

    #[test]
    fn test_absent_is_confirmed_unknown_user() {
        let r = resolver(
            Arc::new(OneSibling { records: vec![] }),
            Arc::new(InMemoryProfileStore::new()),
        );
        let err = r.resolve_user("ghost").unwrap_err();
        assert_eq!(
            err,
            ConvertError::Resolution(ResolutionError::UnknownUser {
                input: "ghost".to_string(),
                confirmed: true,
            })
        );
    }

    #[test]
    fn test_timeout_is_unconfirmed_unknown_user() {
        let r = resolver(Arc::new(Silent), Arc::new(InMemoryProfileStore::new()));
        let err = r.resolve_user("ghost").unwrap_err();
        assert!(err.is_not_found());
        assert!(matches!(
            err,
            ConvertError::Resolution(ResolutionError::UnknownUser { confirmed: false, .. })
        ));
    }

    #[test]
    fn test_malformed_record_is_not_cached() {
        let transport = Arc::new(OneSibling {
            records: vec![json!({"name": "no id"})],
        });
        let r = resolver(transport, Arc::new(InMemoryProfileStore::new()));
        let err = r.resolve_user("no id").unwrap_err();
        assert!(matches!(
            err,
            ConvertError::Resolution(ResolutionError::MalformedReply { .. })
        ));
        assert!(r.cache().is_empty());
    }

    #[test]
    fn test_user_with_character() {
        let profiles = Arc::new(InMemoryProfileStore::new());
        profiles.insert(ProfileRecord::new(UserId::new(1))).unwrap();
        let r = resolver(Arc::new(NoSiblings), Arc::clone(&profiles));
        r.cache().insert(Entity::new(UserId::new(1), "Hero"));
        r.cache().insert(Entity::new(UserId::new(2), "Bystander"));

        let ok = r.resolve_user_with_character("Hero").unwrap();
        assert_eq!(ok.profile.user_id, UserId::new(1));

        let err = r.resolve_user_with_character("Bystander").unwrap_err();
        assert!(err.is_missing_character());
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_member_resolution_never_dispatches() {
        let r = resolver(Arc::new(Silent), Arc::new(InMemoryProfileStore::new()));
        let mut guild = Guild::new(GuildId::new(1));
        guild.add_member(Entity::new(UserId::new(3), "Member"), Some("Nick".to_string()));

        assert_eq!(
            r.resolve_member(MemberScope::Guild(&guild), "Nick").unwrap().user.id,
            UserId::new(3)
        );
        let err = r.resolve_member(MemberScope::Guild(&guild), "Stranger").unwrap_err();
        assert_eq!(
            err,
            ConvertError::Resolution(ResolutionError::MemberNotFound {
                input: "Stranger".to_string()
            })
        );
        assert_eq!(r.client().stats().dispatches, 0);
    }

    #[test]
    fn test_member_with_character_across_guilds() {
        let profiles = Arc::new(InMemoryProfileStore::new());
        profiles.insert(ProfileRecord::new(UserId::new(8))).unwrap();
        let r = resolver(Arc::new(NoSiblings), Arc::clone(&profiles));

        let mut guild = Guild::new(GuildId::new(4));
        guild.add_member(Entity::new(UserId::new(8), "Adventurer"), None);
        guild.add_member(Entity::new(UserId::new(9), "Lurker"), None);
        let mut directory = GuildDirectory::new();
        directory.insert(guild);

        let scope = MemberScope::AllGuilds(&directory);
        let ok = r.resolve_member_with_character(scope, "Adventurer").unwrap();
        assert_eq!(ok.entity.guild_id, GuildId::new(4));
        assert!(r
            .resolve_member_with_character(scope, "Lurker")
            .unwrap_err()
            .is_missing_character());
    }

    #[test]
    fn test_empty_argument_is_not_dispatched() {
        let r = resolver(Arc::new(Silent), Arc::new(InMemoryProfileStore::new()));
        assert!(r.resolve_user("").unwrap_err().is_not_found());
        assert_eq!(r.client().stats().dispatches, 0);
    }

    #[test]
    fn test_stage_terminality() {
        assert!(ResolutionStage::Resolved.is_terminal());
        assert!(ResolutionStage::NoCharacter.is_terminal());
        assert!(!ResolutionStage::RemotePending.is_terminal());
        assert_eq!(ResolutionStage::LocalHit.to_string(), "local_hit");
    }

    #[test]
    fn test_timeout_is_bounded() {
        let r = resolver(Arc::new(Silent), Arc::new(InMemoryProfileStore::new()));
        let start = std::time::Instant::now();
        let _ = r.resolve_user("ghost");
        assert!(start.elapsed() < Duration::from_secs(2));
    }
}
