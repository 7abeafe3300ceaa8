//! In-process shard cluster.
//!
//! Each shard runs a worker thread that answers `fetch_user` requests from
//! its own cache. Shards talk to each other over bounded crossbeam channels,
//! which makes the cluster usable for embedded deployments and end-to-end
//! tests of the resolution protocol without any network.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};

use crate::cache::EntityCache;
use crate::config::{ClusterConfig, ResolverConfig};
use crate::error::TransportError;
use crate::profile::ProfileStore;
use crate::resolver::Resolver;

use super::node::ShardNode;
use super::request::{ResolutionRequest, ShardReply};
use super::transport::ShardTransport;

enum Job {
    Fetch {
        request: ResolutionRequest,
        reply: Sender<ShardReply>,
    },
    Shutdown,
}

struct ShardWorker {
    shard_id: u32,
    tx: Sender<Job>,
    handle: Option<JoinHandle<()>>,
}

impl ShardWorker {
    fn start(node: ShardNode, queue_capacity: usize) -> Result<Self, TransportError> {
        let shard_id = node.shard_id();
        let (tx, rx) = bounded::<Job>(queue_capacity.max(1));
        let handle = thread::Builder::new()
            .name(format!("shardseek-shard-{shard_id}"))
            .spawn(move || worker_loop(&node, &rx))
            .map_err(|e| TransportError::ConnectionFailed {
                message: format!("failed to spawn shard {shard_id} worker: {e}"),
            })?;
        Ok(Self {
            shard_id,
            tx,
            handle: Some(handle),
        })
    }
}

fn worker_loop(node: &ShardNode, rx: &Receiver<Job>) {
    loop {
        match rx.recv() {
            Ok(Job::Fetch { request, reply }) => {
                let answer = node.handle(&request);
                // The requester may already have retired this request.
                let _ = reply.try_send(answer);
            }
            Ok(Job::Shutdown) | Err(_) => break,
        }
    }
    tracing::debug!(shard_id = node.shard_id(), "shard worker stopped");
}

/// Channel transport from one shard to all of its in-process siblings.
#[derive(Clone)]
pub struct ChannelTransport {
    origin: u32,
    peers: Vec<(u32, Sender<Job>)>,
}

impl std::fmt::Debug for ChannelTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelTransport")
            .field("origin", &self.origin)
            .field("peers", &self.peers.iter().map(|(id, _)| *id).collect::<Vec<_>>())
            .finish()
    }
}

impl ShardTransport for ChannelTransport {
    fn siblings(&self) -> usize {
        self.peers.len()
    }

    fn broadcast(
        &self,
        request: &ResolutionRequest,
        replies: Sender<ShardReply>,
    ) -> Result<usize, TransportError> {
        let mut reached = 0usize;
        for (shard_id, tx) in &self.peers {
            let job = Job::Fetch {
                request: request.clone(),
                reply: replies.clone(),
            };
            match tx.try_send(job) {
                Ok(()) => reached += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(origin = self.origin, shard_id, "shard queue full, skipping");
                }
                Err(TrySendError::Disconnected(_)) => {
                    tracing::warn!(origin = self.origin, shard_id, "shard worker is gone, skipping");
                }
            }
        }
        Ok(reached)
    }
}

/// A set of shard workers running in this process.
pub struct LocalCluster {
    workers: Vec<ShardWorker>,
    caches: Vec<Arc<EntityCache>>,
}

impl LocalCluster {
    /// Starts `config.shard_count` shards, each with an empty cache.
    ///
    /// # Errors
    ///
    /// Returns an error if a worker thread cannot be spawned.
    pub fn start(config: &ClusterConfig) -> Result<Self, TransportError> {
        let shard_count = config.shard_count.max(1);
        let mut workers = Vec::with_capacity(shard_count as usize);
        let mut caches = Vec::with_capacity(shard_count as usize);

        for shard_id in 0..shard_count {
            let cache = Arc::new(EntityCache::with_capacity(config.resolver.cache_capacity));
            let node = ShardNode::new(shard_id, Arc::clone(&cache));
            workers.push(ShardWorker::start(node, config.queue_capacity)?);
            caches.push(cache);
        }

        tracing::info!(shard_count, "local shard cluster started");
        Ok(Self { workers, caches })
    }

    /// Number of shards.
    #[must_use]
    pub fn shard_count(&self) -> u32 {
        u32::try_from(self.workers.len()).unwrap_or(u32::MAX)
    }

    /// Cache owned by `shard_id`.
    #[must_use]
    pub fn cache(&self, shard_id: u32) -> Option<&Arc<EntityCache>> {
        self.caches.get(shard_id as usize)
    }

    /// Transport from `shard_id` to every other shard.
    #[must_use]
    pub fn transport(&self, shard_id: u32) -> ChannelTransport {
        let peers = self
            .workers
            .iter()
            .filter(|w| w.shard_id != shard_id)
            .map(|w| (w.shard_id, w.tx.clone()))
            .collect();
        ChannelTransport {
            origin: shard_id,
            peers,
        }
    }

    /// Builds a resolver running on `shard_id`.
    #[must_use]
    pub fn resolver(
        &self,
        shard_id: u32,
        config: &ResolverConfig,
        profiles: Arc<dyn ProfileStore>,
    ) -> Option<Resolver> {
        let cache = Arc::clone(self.cache(shard_id)?);
        let transport: Arc<dyn ShardTransport> = Arc::new(self.transport(shard_id));
        Some(Resolver::new(config, cache, transport, profiles))
    }

    /// Stops every worker and waits for it to exit.
    pub fn shutdown(mut self) {
        self.stop_workers();
    }

    fn stop_workers(&mut self) {
        for worker in &self.workers {
            // Blocking send: queued lookups are answered before the worker exits.
            let _ = worker.tx.send(Job::Shutdown);
        }
        for worker in &mut self.workers {
            if let Some(handle) = worker.handle.take() {
                let _ = handle.join();
            }
        }
    }
}

impl Drop for LocalCluster {
    fn drop(&mut self) {
        self.stop_workers();
    }
}

impl std::fmt::Debug for LocalCluster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCluster")
            .field("shard_count", &self.workers.len())
            .finish_non_exhaustive()
    }
}
