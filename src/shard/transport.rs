//! Transport abstraction between sibling shards.
//!
//! The resolution client does not care how a request reaches the other
//! shards. In-process clusters use channels, separate processes use gRPC;
//! both deliver replies into the same crossbeam channel.

use crossbeam_channel::Sender;

use crate::error::TransportError;

use super::request::{ResolutionRequest, ShardReply};

/// Delivers resolution requests to every sibling shard.
pub trait ShardTransport: Send + Sync {
    /// Number of sibling shards a broadcast targets (excluding this shard).
    fn siblings(&self) -> usize;

    /// Sends `request` to every sibling.
    ///
    /// Replies are pushed into `replies` as they arrive, possibly after this
    /// call returns. Implementations must never block on `replies`; once the
    /// receiving side is dropped, sends fail and the reply is discarded.
    ///
    /// Returns how many siblings the request was handed to. Siblings that
    /// could not be reached are not counted.
    ///
    /// # Errors
    ///
    /// Returns an error if the request could not be dispatched at all.
    fn broadcast(
        &self,
        request: &ResolutionRequest,
        replies: Sender<ShardReply>,
    ) -> Result<usize, TransportError>;
}

/// A transport for a single-shard deployment: there is nobody to ask.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoSiblings;

impl ShardTransport for NoSiblings {
    fn siblings(&self) -> usize {
        0
    }

    fn broadcast(
        &self,
        _request: &ResolutionRequest,
        _replies: Sender<ShardReply>,
    ) -> Result<usize, TransportError> {
        Ok(0)
    }
}
