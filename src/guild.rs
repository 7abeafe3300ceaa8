//! Guild membership.
//!
//! Members are resolved only from guild data this process already holds.
//! There is no remote fallback for members.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, HasUserId, UserId};
use crate::identifier::Identifier;

/// Platform-assigned guild identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GuildId(u64);

impl GuildId {
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
}

impl fmt::Display for GuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user as a member of one guild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// The underlying user
    pub user: Entity,
    /// Guild this membership belongs to
    pub guild_id: GuildId,
    /// Guild-specific nickname
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nick: Option<String>,
}

impl Member {
    /// A membership without a nickname.
    #[must_use]
    pub fn new(guild_id: GuildId, user: Entity) -> Self {
        Self {
            user,
            guild_id,
            nick: None,
        }
    }

    /// Sets the guild nickname.
    #[must_use]
    pub fn with_nick(mut self, nick: impl Into<String>) -> Self {
        self.nick = Some(nick.into());
        self
    }

    /// Guild nickname if set, otherwise the user name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.nick.as_deref().unwrap_or(&self.user.name)
    }
}

impl HasUserId for Member {
    fn user_id(&self) -> UserId {
        self.user.id
    }
}

/// Members of one guild, kept in join order.
#[derive(Debug, Clone)]
pub struct Guild {
    id: GuildId,
    members: Vec<Member>,
    by_id: HashMap<UserId, usize>,
}

impl Guild {
    /// An empty guild.
    #[must_use]
    pub fn new(id: GuildId) -> Self {
        Self {
            id,
            members: Vec::new(),
            by_id: HashMap::new(),
        }
    }

    /// The guild's id.
    #[must_use]
    pub const fn id(&self) -> GuildId {
        self.id
    }

    /// Adds a user as a member. Returns false if they already are one.
    pub fn add_member(&mut self, user: Entity, nick: Option<String>) -> bool {
        if self.by_id.contains_key(&user.id) {
            return false;
        }
        self.by_id.insert(user.id, self.members.len());
        let member = Member::new(self.id, user);
        self.members.push(match nick {
            Some(nick) => member.with_nick(nick),
            None => member,
        });
        true
    }

    /// Number of members.
    #[must_use]
    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    /// Member with the given user id.
    #[must_use]
    pub fn get_member(&self, id: UserId) -> Option<&Member> {
        self.by_id.get(&id).map(|&idx| &self.members[idx])
    }

    /// Finds a member by `name#discriminator`, then by exact name or
    /// nickname.
    ///
    /// A tag that matches nobody is retried as a whole name, since names
    /// may legitimately contain `#`.
    #[must_use]
    pub fn get_member_named(&self, name: &str) -> Option<&Member> {
        if let Identifier::NameTag {
            name: bare,
            discriminator,
        } = Identifier::parse_member(name)
        {
            let hit = self
                .members
                .iter()
                .find(|m| m.user.matches_tag(&bare, &discriminator));
            if hit.is_some() {
                return hit;
            }
        }
        self.members
            .iter()
            .find(|m| m.user.name == name || m.nick.as_deref() == Some(name))
    }

    /// Resolves a member argument within this guild.
    #[must_use]
    pub fn find(&self, identifier: &Identifier, raw: &str) -> Option<&Member> {
        match identifier {
            Identifier::Id(id) => self.get_member(*id),
            Identifier::NameTag { .. } | Identifier::Name(_) => self.get_member_named(raw),
        }
    }
}

/// Every guild this process knows about.
#[derive(Debug, Clone, Default)]
pub struct GuildDirectory {
    guilds: Vec<Guild>,
}

impl GuildDirectory {
    /// An empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a guild, replacing any guild with the same id.
    pub fn insert(&mut self, guild: Guild) {
        match self.guilds.iter_mut().find(|g| g.id == guild.id) {
            Some(existing) => *existing = guild,
            None => self.guilds.push(guild),
        }
    }

    /// Guild with the given id.
    #[must_use]
    pub fn guild(&self, id: GuildId) -> Option<&Guild> {
        self.guilds.iter().find(|g| g.id == id)
    }

    /// Number of guilds.
    #[must_use]
    pub fn len(&self) -> usize {
        self.guilds.len()
    }

    /// Returns true if no guild is known.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.guilds.is_empty()
    }

    /// First member matching the argument in any guild.
    #[must_use]
    pub fn find(&self, identifier: &Identifier, raw: &str) -> Option<&Member> {
        self.guilds.iter().find_map(|g| g.find(identifier, raw))
    }
}

/// Where a member argument is looked up.
#[derive(Debug, Clone, Copy)]
pub enum MemberScope<'a> {
    /// The guild the command was used in.
    Guild(&'a Guild),
    /// No guild context (direct messages): search every known guild.
    AllGuilds(&'a GuildDirectory),
}

impl<'a> MemberScope<'a> {
    /// Resolves a member argument in this scope.
    #[must_use]
    pub fn find(self, raw: &str) -> Option<&'a Member> {
        let identifier = Identifier::parse_member(raw);
        match self {
            Self::Guild(guild) => guild.find(&identifier, raw),
            Self::AllGuilds(directory) => directory.find(&identifier, raw),
        }
    }
}

impl fmt::Display for MemberScope<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Guild(g) => write!(f, "guild:{}", g.id),
            Self::AllGuilds(_) => write!(f, "all_guilds"),
        }
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user.tag())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNOWFLAKE: u64 = 356_091_260_429_402_122;

    fn guild() -> Guild {
        let mut g = Guild::new(GuildId::new(1));
        g.add_member(Entity::with_tag(UserId::new(SNOWFLAKE), "Adrian", "0001"), None);
        g.add_member(
            Entity::with_tag(UserId::new(20), "Mira", "0002"),
            Some("Captain".to_string()),
        );
        g.add_member(Entity::with_tag(UserId::new(30), "odd#name", "0003"), None);
        g
    }

    #[test]
    fn test_member_by_snowflake_and_mention() {
        let g = guild();
        let scope = MemberScope::Guild(&g);
        assert_eq!(scope.find(&SNOWFLAKE.to_string()).unwrap().user.name, "Adrian");
        assert_eq!(scope.find(&format!("<@!{SNOWFLAKE}>")).unwrap().user.name, "Adrian");
        assert_eq!(scope.find("<@20>").unwrap().user.name, "Mira");
    }

    #[test]
    fn test_member_by_tag_name_and_nick() {
        let g = guild();
        let scope = MemberScope::Guild(&g);
        assert_eq!(scope.find("Mira#0002").unwrap().user.id, UserId::new(20));
        assert_eq!(scope.find("Mira").unwrap().user.id, UserId::new(20));
        assert_eq!(scope.find("Captain").unwrap().user.id, UserId::new(20));
        assert!(scope.find("Mira#9999").is_none());
    }

    #[test]
    fn test_tag_miss_falls_back_to_whole_name() {
        let mut g = Guild::new(GuildId::new(2));
        g.add_member(Entity::new(UserId::new(40), "team#2024"), None);
        let found = MemberScope::Guild(&g).find("team#2024").unwrap();
        assert_eq!(found.user.id, UserId::new(40));
    }

    #[test]
    fn test_add_member_is_idempotent() {
        let mut g = guild();
        assert!(!g.add_member(Entity::new(UserId::new(20), "Other"), None));
        assert_eq!(g.member_count(), 3);
    }

    #[test]
    fn test_directory_searches_all_guilds() {
        let mut other = Guild::new(GuildId::new(9));
        other.add_member(Entity::with_tag(UserId::new(90), "Elsewhere", "0009"), None);

        let mut directory = GuildDirectory::new();
        directory.insert(guild());
        directory.insert(other);

        let found = MemberScope::AllGuilds(&directory).find("Elsewhere").unwrap();
        assert_eq!(found.guild_id, GuildId::new(9));
        assert!(MemberScope::AllGuilds(&directory).find("Nobody").is_none());
    }

    #[test]
    fn test_member_builder() {
        let plain = Member::new(GuildId::new(3), Entity::new(UserId::new(50), "Rook"));
        assert_eq!(plain.display_name(), "Rook");
        assert_eq!(plain.guild_id, GuildId::new(3));

        let nicked = plain.clone().with_nick("Castle");
        assert_eq!(nicked.display_name(), "Castle");
        assert_eq!(nicked.user, plain.user);
    }

    #[test]
    fn test_display_name_prefers_nick() {
        let g = guild();
        assert_eq!(g.get_member(UserId::new(20)).unwrap().display_name(), "Captain");
        assert_eq!(g.get_member(UserId::new(30)).unwrap().display_name(), "odd#name");
    }
}
