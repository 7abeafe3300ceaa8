//! Responder side of the `fetch_user` protocol.

use std::sync::Arc;

use crate::cache::EntityCache;
use crate::identifier::Identifier;
use crate::materialize::to_wire;

use super::request::{ResolutionRequest, ShardOperation, ShardReply};

/// Answers sibling lookups from this shard's own cache.
#[derive(Debug, Clone)]
pub struct ShardNode {
    shard_id: u32,
    cache: Arc<EntityCache>,
}

impl ShardNode {
    /// Creates a node answering from `cache`.
    #[must_use]
    pub fn new(shard_id: u32, cache: Arc<EntityCache>) -> Self {
        Self { shard_id, cache }
    }

    /// Shard id reported in replies.
    #[must_use]
    pub const fn shard_id(&self) -> u32 {
        self.shard_id
    }

    /// Cache this node answers from.
    #[must_use]
    pub fn cache(&self) -> &Arc<EntityCache> {
        &self.cache
    }

    /// Handles one request.
    ///
    /// The argument is parsed with the same rules the requesting shard used,
    /// so a hit here is exactly what a local hit there would have been.
    /// Invalid requests get an empty reply.
    #[must_use]
    pub fn handle(&self, request: &ResolutionRequest) -> ShardReply {
        let mut reply = ShardReply::empty(request.correlation, self.shard_id);

        if let Err(e) = request.validate() {
            tracing::warn!(shard_id = self.shard_id, error = %e, "rejecting invalid request");
            return reply;
        }

        match request.operation {
            ShardOperation::FetchUser => {
                let identifier = Identifier::parse(&request.payload.user_inp);
                let Some(entity) = self.cache.lookup(&identifier) else {
                    tracing::trace!(shard_id = self.shard_id, input = %identifier, "no local match");
                    return reply;
                };
                match to_wire(&entity) {
                    Ok(record) => reply.records.push(record),
                    Err(e) => {
                        tracing::warn!(shard_id = self.shard_id, error = %e, "failed to encode user");
                    }
                }
            }
        }
        reply
    }
}
