//! Cross-shard lookup protocol.
//!
//! - [`request`]: wire types for `fetch_user`
//! - [`transport`]: how a request reaches sibling shards
//! - [`client`]: broadcast, collect and retire
//! - [`node`]: the answering side
//! - [`local`]: in-process cluster over channels

pub mod client;
pub mod local;
pub mod node;
pub mod request;
pub mod transport;

pub use client::{ClientStats, ShardClient, ShardLookup, DEFAULT_REMOTE_TIMEOUT};
pub use local::{ChannelTransport, LocalCluster};
pub use node::ShardNode;
pub use request::{FetchUserPayload, ResolutionRequest, ShardOperation, ShardReply};
pub use transport::{NoSiblings, ShardTransport};
