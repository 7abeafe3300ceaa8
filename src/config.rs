//! Runtime configuration.
//!
//! Every field has a default, so an empty JSON object is a valid config.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::error::ConfigError;
use crate::shard::request::MAX_EXPECTED_REPLIES;

/// Settings for a [`crate::Resolver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Maximum number of users cached per process.
    pub cache_capacity: usize,
    /// How long to wait for sibling shards, in milliseconds.
    pub remote_timeout_ms: u64,
    /// Matching replies after which a lookup stops waiting.
    pub expected_replies: u32,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            remote_timeout_ms: 1_000,
            expected_replies: 1,
        }
    }
}

impl ResolverConfig {
    /// Sibling reply deadline.
    #[must_use]
    pub const fn remote_timeout(&self) -> Duration {
        Duration::from_millis(self.remote_timeout_ms)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_capacity == 0 {
            return Err(invalid("cache_capacity", "must be at least 1"));
        }
        if self.remote_timeout_ms == 0 {
            return Err(invalid("remote_timeout_ms", "must be at least 1"));
        }
        if self.expected_replies == 0 || self.expected_replies > MAX_EXPECTED_REPLIES {
            return Err(invalid(
                "expected_replies",
                format!("must be between 1 and {MAX_EXPECTED_REPLIES}"),
            ));
        }
        Ok(())
    }

    /// Parses and validates a JSON config.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for invalid JSON and
    /// `ConfigError::Invalid` for out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = parse_json(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io` if the file cannot be read, otherwise as
    /// [`ResolverConfig::from_json_str`].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&read(path.as_ref())?)
    }
}

/// Settings for an in-process [`crate::LocalCluster`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Number of shards to start.
    pub shard_count: u32,
    /// Max queued lookups per shard worker.
    pub queue_capacity: usize,
    /// Settings applied to every shard's resolver and cache.
    pub resolver: ResolverConfig,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            shard_count: 2,
            queue_capacity: 1024,
            resolver: ResolverConfig::default(),
        }
    }
}

impl ClusterConfig {
    /// Checks value ranges, including the nested resolver settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.shard_count == 0 {
            return Err(invalid("shard_count", "must be at least 1"));
        }
        if self.queue_capacity == 0 {
            return Err(invalid("queue_capacity", "must be at least 1"));
        }
        self.resolver.validate()
    }

    /// Reads, parses and validates a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Io`, `ConfigError::Parse` or
    /// `ConfigError::Invalid`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config: Self = parse_json(&read(path.as_ref())?)?;
        config.validate()?;
        Ok(config)
    }
}

/// Settings for a standalone shard node process.
///
/// A node only answers siblings from its cache, so resolver settings are
/// rejected rather than ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NodeConfig {
    /// Maximum number of users held by the node's cache.
    pub cache_capacity: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }
}

impl NodeConfig {
    /// Parses and validates a JSON config.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Parse` for invalid JSON or unknown keys and
    /// `ConfigError::Invalid` for a zero capacity.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = parse_json(json)?;
        if config.cache_capacity == 0 {
            return Err(invalid("cache_capacity", "must be at least 1"));
        }
        Ok(config)
    }

    /// Reads, parses and validates a JSON config file.
    ///
    /// # Errors
    ///
    /// As [`NodeConfig::from_json_str`], plus `ConfigError::Io`.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_json_str(&read(path.as_ref())?)
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

fn parse_json<T: for<'de> Deserialize<'de>>(json: &str) -> Result<T, ConfigError> {
    serde_json::from_str(json).map_err(|e| ConfigError::Parse {
        message: e.to_string(),
    })
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.into(),
    }
}
