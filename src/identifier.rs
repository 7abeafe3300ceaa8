//! Classification of raw user arguments.
//!
//! An argument is tried as a mention, then a numeric id, then a
//! `name#discriminator` tag, and finally falls back to a bare name. Parsing
//! never fails; an unusable string simply becomes a name that will not
//! resolve.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::entity::UserId;

/// Separator between a name and its discriminator.
pub const TAG_SEPARATOR: char = '#';

/// Number of characters in a discriminator.
pub const TAG_LEN: usize = 4;

static MENTION: OnceLock<Regex> = OnceLock::new();
static MEMBER_MENTION: OnceLock<Regex> = OnceLock::new();
static SNOWFLAKE: OnceLock<Regex> = OnceLock::new();

fn mention_regex() -> &'static Regex {
    MENTION.get_or_init(|| Regex::new(r"<@!?([0-9]+)>").expect("mention pattern is valid"))
}

fn member_mention_regex() -> &'static Regex {
    MEMBER_MENTION.get_or_init(|| Regex::new(r"^<@!?([0-9]+)>$").expect("mention pattern is valid"))
}

fn snowflake_regex() -> &'static Regex {
    SNOWFLAKE.get_or_init(|| Regex::new(r"^([0-9]{15,20})$").expect("snowflake pattern is valid"))
}

/// A parsed user argument.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// Numeric id, given directly or through a mention.
    Id(UserId),
    /// `name#discriminator`.
    NameTag {
        /// Name part, before the separator
        name: String,
        /// Discriminator part, after the separator
        discriminator: String,
    },
    /// Anything else, matched by exact name.
    Name(String),
}

impl Identifier {
    /// Classifies a user argument.
    ///
    /// # Examples
    ///
    /// ```
    /// use shardseek::{Identifier, UserId};
    ///
    /// assert_eq!(Identifier::parse("<@!1234>"), Identifier::Id(UserId::new(1234)));
    /// assert_eq!(
    ///     Identifier::parse("Adrian#0001"),
    ///     Identifier::NameTag { name: "Adrian".into(), discriminator: "0001".into() },
    /// );
    /// assert_eq!(Identifier::parse("Adrian"), Identifier::Name("Adrian".into()));
    /// ```
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let argument = mention_regex()
            .captures(raw)
            .and_then(|caps| caps.get(1))
            .map_or(raw, |m| m.as_str());

        if let Some(id) = parse_id(argument) {
            return Self::Id(id);
        }
        if let Some((name, discriminator)) = split_tag(argument) {
            return Self::NameTag {
                name: name.to_string(),
                discriminator: discriminator.to_string(),
            };
        }
        Self::Name(argument.to_string())
    }

    /// Classifies an argument for guild member lookup.
    ///
    /// Member lookup only treats the argument as an id when the whole string
    /// is a mention or a 15 to 20 digit snowflake. Everything else is a name,
    /// tag or nickname.
    #[must_use]
    pub fn parse_member(raw: &str) -> Self {
        let id_match = snowflake_regex()
            .captures(raw)
            .or_else(|| member_mention_regex().captures(raw))
            .and_then(|caps| caps.get(1));

        if let Some(id) = id_match.and_then(|m| m.as_str().parse::<u64>().ok()) {
            return Self::Id(UserId::new(id));
        }
        match split_tag(raw) {
            Some((name, discriminator)) => Self::NameTag {
                name: name.to_string(),
                discriminator: discriminator.to_string(),
            },
            None => Self::Name(raw.to_string()),
        }
    }

    /// Normalized argument sent to sibling shards.
    ///
    /// Mentions are reduced to their id, so every shard parses the same
    /// input the local lookup did.
    #[must_use]
    pub fn query(&self) -> String {
        self.to_string()
    }

    /// Returns the id if this identifier is numeric.
    #[must_use]
    pub const fn id(&self) -> Option<UserId> {
        match self {
            Self::Id(id) => Some(*id),
            _ => None,
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::NameTag {
                name,
                discriminator,
            } => write!(f, "{name}{TAG_SEPARATOR}{discriminator}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

fn parse_id(argument: &str) -> Option<UserId> {
    if argument.is_empty() || !argument.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    argument.parse::<u64>().ok().map(UserId::new)
}

/// Splits `name#abcd` into its parts when the separator sits exactly
/// `TAG_LEN + 1` characters from the end and a name precedes it.
fn split_tag(argument: &str) -> Option<(&str, &str)> {
    let chars = argument.chars().count();
    if chars <= TAG_LEN + 1 {
        return None;
    }
    let (sep_idx, sep) = argument.char_indices().nth(chars - TAG_LEN - 1)?;
    if sep != TAG_SEPARATOR {
        return None;
    }
    Some((&argument[..sep_idx], &argument[sep_idx + sep.len_utf8()..]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mention_forms() {
        assert_eq!(Identifier::parse("<@42>"), Identifier::Id(UserId::new(42)));
        assert_eq!(Identifier::parse("<@!42>"), Identifier::Id(UserId::new(42)));
        // Searched anywhere in the argument.
        assert_eq!(Identifier::parse("hey <@42> there"), Identifier::Id(UserId::new(42)));
    }

    #[test]
    fn test_mention_requires_ascii_digits() {
        // Arabic-Indic digits are not a mention; the argument stays whole.
        assert_eq!(
            Identifier::parse("<@\u{661}\u{662}\u{663}>"),
            Identifier::Name("<@\u{661}\u{662}\u{663}>".to_string())
        );
    }

    #[test]
    fn test_numeric_id() {
        assert_eq!(
            Identifier::parse("356091260429402122"),
            Identifier::Id(UserId::new(356_091_260_429_402_122))
        );
    }

    #[test]
    fn test_overflowing_digits_fall_through_to_name() {
        let raw = "99999999999999999999999";
        assert_eq!(Identifier::parse(raw), Identifier::Name(raw.to_string()));
    }

    #[test]
    fn test_name_tag_split() {
        assert_eq!(
            Identifier::parse("Some User#1234"),
            Identifier::NameTag {
                name: "Some User".to_string(),
                discriminator: "1234".to_string(),
            }
        );
    }

    #[test]
    fn test_name_tag_requires_more_than_five_chars() {
        // "#1234" has no name in front of the separator.
        assert_eq!(Identifier::parse("#1234"), Identifier::Name("#1234".to_string()));
        assert_eq!(
            Identifier::parse("a#1234"),
            Identifier::NameTag {
                name: "a".to_string(),
                discriminator: "1234".to_string(),
            }
        );
    }

    #[test]
    fn test_name_tag_counts_characters_not_bytes() {
        assert_eq!(
            Identifier::parse("Zoë#0042"),
            Identifier::NameTag {
                name: "Zoë".to_string(),
                discriminator: "0042".to_string(),
            }
        );
    }

    #[test]
    fn test_bare_name() {
        assert_eq!(Identifier::parse("Adrian"), Identifier::Name("Adrian".to_string()));
        assert_eq!(Identifier::parse("a#12345"), Identifier::Name("a#12345".to_string()));
    }

    #[test]
    fn test_query_normalizes_mentions() {
        assert_eq!(Identifier::parse("<@!77>").query(), "77");
        assert_eq!(Identifier::parse("Adrian#0001").query(), "Adrian#0001");
    }

    #[test]
    fn test_member_parse_requires_snowflake_length() {
        assert_eq!(
            Identifier::parse_member("356091260429402122"),
            Identifier::Id(UserId::new(356_091_260_429_402_122))
        );
        // Short digit strings are names in member mode.
        assert_eq!(Identifier::parse_member("1234"), Identifier::Name("1234".to_string()));
    }

    #[test]
    fn test_member_parse_requires_full_mention() {
        assert_eq!(Identifier::parse_member("<@!55>"), Identifier::Id(UserId::new(55)));
        assert_eq!(
            Identifier::parse_member("hi <@55>"),
            Identifier::Name("hi <@55>".to_string())
        );
    }
}
