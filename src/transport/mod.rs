//! gRPC transport between shard processes.
//!
//! The wire protocol is the JSON `fetch_user` request/reply; gRPC only
//! frames it. A shard process runs [`ShardServiceImpl`] in front of its
//! [`ShardNode`] and reaches its siblings through [`GrpcTransport`].

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Sender;
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::runtime::Handle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::{Channel, Endpoint, Server};
use tonic::{Request, Response, Status};

use crate::error::TransportError;
use crate::shard::node::ShardNode;
use crate::shard::request::{ResolutionRequest, ShardReply};
use crate::shard::transport::ShardTransport;

/// Generated gRPC types.
#[allow(missing_docs, clippy::pedantic)]
pub mod proto {
    tonic::include_proto!("shardseek");
}

use proto::shard_service_client::ShardServiceClient;
use proto::shard_service_server::{ShardService, ShardServiceServer};

// ----------------------------------------------------------------------------
// Limits (DoS protection)
// ----------------------------------------------------------------------------

/// Maximum size of a request JSON payload.
const MAX_REQUEST_JSON_BYTES: usize = 64 * 1024; // 64 KiB

/// Maximum size of a reply JSON payload.
const MAX_REPLY_JSON_BYTES: usize = 1024 * 1024; // 1 MiB

/// gRPC service answering sibling lookups from one shard's cache.
#[derive(Debug, Clone)]
pub struct ShardServiceImpl {
    node: Arc<ShardNode>,
}

impl ShardServiceImpl {
    /// Wraps a node.
    #[must_use]
    pub fn new(node: Arc<ShardNode>) -> Self {
        Self { node }
    }

    /// Wraps the service for `tonic`'s router.
    #[must_use]
    pub fn into_server(self) -> ShardServiceServer<Self> {
        ShardServiceServer::new(self)
    }
}

fn invalid_argument(msg: impl Into<String>) -> Status {
    Status::invalid_argument(msg.into())
}

fn parse_request(bytes: &[u8]) -> Result<ResolutionRequest, Status> {
    if bytes.is_empty() {
        return Err(invalid_argument("request_json is required"));
    }
    if bytes.len() > MAX_REQUEST_JSON_BYTES {
        return Err(invalid_argument("request_json exceeds maximum size"));
    }

    let request: ResolutionRequest = serde_json::from_slice(bytes)
        .map_err(|e| invalid_argument(format!("invalid request JSON: {e}")))?;
    request
        .validate()
        .map_err(|e| invalid_argument(e.to_string()))?;
    Ok(request)
}

fn encode_json<T: Serialize>(value: &T, max: usize) -> Result<Vec<u8>, Status> {
    let bytes = serde_json::to_vec(value)
        .map_err(|e| Status::internal(format!("failed to serialize reply JSON: {e}")))?;
    if bytes.len() > max {
        return Err(Status::resource_exhausted("serialized JSON exceeds size limit"));
    }
    Ok(bytes)
}

#[tonic::async_trait]
impl ShardService for ShardServiceImpl {
    async fn fetch_user(
        &self,
        request: Request<proto::FetchUserRequest>,
    ) -> Result<Response<proto::FetchUserResponse>, Status> {
        let req = request.into_inner();
        let request = parse_request(&req.request_json)?;

        let reply = self.node.handle(&request);
        let reply_json = encode_json(&reply, MAX_REPLY_JSON_BYTES)?;
        Ok(Response::new(proto::FetchUserResponse { reply_json }))
    }
}

/// Serves `node` on an already bound listener until `shutdown` resolves.
///
/// # Errors
///
/// Returns `TransportError::ConnectionFailed` if the server fails.
pub async fn serve<F>(
    node: Arc<ShardNode>,
    listener: TcpListener,
    shutdown: F,
) -> Result<(), TransportError>
where
    F: std::future::Future<Output = ()> + Send,
{
    Server::builder()
        .add_service(ShardServiceImpl::new(node).into_server())
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await
        .map_err(|e| TransportError::ConnectionFailed {
            message: e.to_string(),
        })
}

/// Address of one sibling shard process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrpcPeer {
    /// Shard the peer answers for.
    pub shard_id: u32,
    /// For example `http://10.0.0.7:50051`.
    pub endpoint: String,
}

/// Reaches sibling shard processes over gRPC.
///
/// `broadcast` spawns one call per sibling on `runtime` and returns
/// immediately. Callers block on the reply channel, so they must not run on
/// a thread driving that runtime.
#[derive(Clone)]
pub struct GrpcTransport {
    runtime: Handle,
    peers: Vec<(u32, ShardServiceClient<Channel>)>,
}

impl std::fmt::Debug for GrpcTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GrpcTransport")
            .field("peers", &self.peers.iter().map(|(id, _)| *id).collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl GrpcTransport {
    /// Creates lazily connected clients for every peer.
    ///
    /// # Errors
    ///
    /// Returns `TransportError::ConnectionFailed` if an endpoint is not a
    /// valid URI.
    pub fn new(runtime: Handle, peers: &[GrpcPeer], call_timeout: Duration) -> Result<Self, TransportError> {
        let _guard = runtime.enter();
        let mut clients = Vec::with_capacity(peers.len());
        for peer in peers {
            let endpoint = Endpoint::from_shared(peer.endpoint.clone())
                .map_err(|e| TransportError::ConnectionFailed {
                    message: format!("invalid endpoint for shard {}: {e}", peer.shard_id),
                })?
                .connect_timeout(call_timeout)
                .timeout(call_timeout);
            clients.push((peer.shard_id, ShardServiceClient::new(endpoint.connect_lazy())));
        }
        Ok(Self {
            runtime,
            peers: clients,
        })
    }
}

impl ShardTransport for GrpcTransport {
    fn siblings(&self) -> usize {
        self.peers.len()
    }

    fn broadcast(
        &self,
        request: &ResolutionRequest,
        replies: Sender<ShardReply>,
    ) -> Result<usize, TransportError> {
        let request_json =
            serde_json::to_vec(request).map_err(|e| TransportError::SerializationFailed {
                message: e.to_string(),
            })?;

        for (shard_id, client) in &self.peers {
            let shard_id = *shard_id;
            let mut client = client.clone();
            let replies = replies.clone();
            let request_json = request_json.clone();
            self.runtime.spawn(async move {
                let response = match client
                    .fetch_user(proto::FetchUserRequest { request_json })
                    .await
                {
                    Ok(r) => r.into_inner(),
                    Err(status) => {
                        tracing::warn!(shard_id, code = ?status.code(), message = status.message(), "sibling call failed");
                        return;
                    }
                };
                match serde_json::from_slice::<ShardReply>(&response.reply_json) {
                    // The requester may already have retired this request.
                    Ok(reply) => {
                        let _ = replies.try_send(reply);
                    }
                    Err(e) => tracing::warn!(shard_id, error = %e, "undecodable sibling reply"),
                }
            });
        }
        Ok(self.peers.len())
    }
}
