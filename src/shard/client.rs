//! Broadcast lookup against sibling shards.
//!
//! A request is retired as soon as its reply ceiling is met, every reached
//! sibling has answered, or the deadline passes. Retiring drops the reply
//! receiver, so anything arriving later is discarded by the sender side.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError};

use crate::error::TransportError;

use super::request::{ResolutionRequest, ShardReply};
use super::transport::ShardTransport;

/// Default wait for sibling replies.
pub const DEFAULT_REMOTE_TIMEOUT: Duration = Duration::from_secs(1);

/// Outcome of a broadcast lookup.
#[derive(Debug, Clone, PartialEq)]
pub enum ShardLookup {
    /// At least one sibling matched. Replies are in arrival order; the
    /// first one wins.
    Found {
        /// Matching replies
        replies: Vec<ShardReply>,
    },
    /// Every sibling answered and none knew the user.
    Absent,
    /// No sibling matched, but some did not answer in time or could not be
    /// reached.
    Indeterminate {
        /// Siblings that never answered
        unanswered: usize,
    },
}

impl ShardLookup {
    /// First record of the winning reply.
    #[must_use]
    pub fn first_record(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Found { replies } => replies.first().and_then(|r| r.records.first()),
            Self::Absent | Self::Indeterminate { .. } => None,
        }
    }

    /// Returns true if absence was confirmed by every sibling.
    #[must_use]
    pub const fn is_confirmed_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }
}

/// Point-in-time client counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Broadcasts handed to the transport.
    pub dispatches: u64,
    /// Broadcasts retired by the deadline.
    pub timeouts: u64,
    /// Replies ignored because their correlation token did not match.
    pub stray_replies: u64,
}

/// Sends `fetch_user` requests to sibling shards and collects replies.
pub struct ShardClient {
    transport: Arc<dyn ShardTransport>,
    timeout: Duration,
    dispatches: AtomicU64,
    timeouts: AtomicU64,
    stray_replies: AtomicU64,
}

impl std::fmt::Debug for ShardClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardClient")
            .field("siblings", &self.transport.siblings())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ShardClient {
    /// Creates a client waiting at most `timeout` per request.
    pub fn new(transport: Arc<dyn ShardTransport>, timeout: Duration) -> Self {
        Self {
            transport,
            timeout,
            dispatches: AtomicU64::new(0),
            timeouts: AtomicU64::new(0),
            stray_replies: AtomicU64::new(0),
        }
    }

    /// Per-request deadline.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Asks every sibling whether it knows `input`.
    ///
    /// Waits until `expected_replies` siblings matched, all reached siblings
    /// answered, or the timeout elapsed, whichever comes first.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the request could not be dispatched.
    pub fn resolve(&self, input: &str, expected_replies: u32) -> Result<ShardLookup, TransportError> {
        let siblings = self.transport.siblings();
        if siblings == 0 {
            return Ok(ShardLookup::Absent);
        }

        let request = ResolutionRequest::fetch_user(input, expected_replies);
        let ceiling = request.expected_replies as usize;
        let (tx, rx) = bounded::<ShardReply>(siblings);

        let reached = self.transport.broadcast(&request, tx)?;
        self.dispatches.fetch_add(1, Ordering::Relaxed);
        let unreachable = siblings.saturating_sub(reached);
        if unreachable > 0 {
            tracing::warn!(
                correlation = %request.correlation,
                siblings,
                reached,
                "some sibling shards could not be reached"
            );
        }

        let deadline = Instant::now() + self.timeout;
        let mut heard = 0usize;
        let mut matches: Vec<ShardReply> = Vec::new();
        let mut timed_out = false;

        while heard < reached && matches.len() < ceiling {
            match rx.recv_deadline(deadline) {
                Ok(reply) if reply.correlation != request.correlation => {
                    self.stray_replies.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!(
                        expected = %request.correlation,
                        got = %reply.correlation,
                        "ignoring reply for another request"
                    );
                }
                Ok(reply) => {
                    heard += 1;
                    if reply.is_match() {
                        tracing::debug!(
                            correlation = %request.correlation,
                            shard_id = reply.shard_id,
                            "sibling shard matched"
                        );
                        matches.push(reply);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {
                    timed_out = true;
                    break;
                }
                // Every sender is gone: the remaining siblings will never answer.
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        drop(rx);

        if timed_out {
            self.timeouts.fetch_add(1, Ordering::Relaxed);
        }

        if !matches.is_empty() {
            return Ok(ShardLookup::Found { replies: matches });
        }

        let unanswered = (reached - heard) + unreachable;
        if unanswered == 0 {
            Ok(ShardLookup::Absent)
        } else {
            tracing::debug!(
                correlation = %request.correlation,
                unanswered,
                timed_out,
                "lookup retired without hearing from every sibling"
            );
            Ok(ShardLookup::Indeterminate { unanswered })
        }
    }

    /// Snapshot of the client counters.
    #[must_use]
    pub fn stats(&self) -> ClientStats {
        ClientStats {
            dispatches: self.dispatches.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            stray_replies: self.stray_replies.load(Ordering::Relaxed),
        }
    }
}
