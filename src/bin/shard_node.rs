//! Shardseek shard node
//!
//! Serves `fetch_user` lookups for one shard over gRPC.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shardseek::transport::serve;
use shardseek::{EntityCache, NodeConfig, RawUserRecord, ShardNode};

/// Node configuration
struct Config {
    /// Address to bind to
    addr: SocketAddr,
    /// Shard this process answers for
    shard_id: u32,
    /// JSON array of user records to preload
    users: Option<PathBuf>,
    /// Node settings (cache capacity)
    config: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 50051)),
            shard_id: 0,
            users: None,
            config: None,
        }
    }
}

fn value_of(args: &[String], i: usize, flag: &str) -> String {
    if let Some(v) = args.get(i + 1) {
        v.clone()
    } else {
        eprintln!("error: {flag} requires a value");
        std::process::exit(1);
    }
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut config = Config::default();

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--port" | "-p" => {
                let raw = value_of(&args, i, "--port");
                let port: u16 = raw.parse().unwrap_or_else(|_| {
                    eprintln!("error: invalid port number: {raw}");
                    std::process::exit(1);
                });
                config.addr.set_port(port);
                i += 2;
            }
            "--shard-id" | "-s" => {
                let raw = value_of(&args, i, "--shard-id");
                config.shard_id = raw.parse().unwrap_or_else(|_| {
                    eprintln!("error: invalid shard id: {raw}");
                    std::process::exit(1);
                });
                i += 2;
            }
            "--users" | "-u" => {
                config.users = Some(PathBuf::from(value_of(&args, i, "--users")));
                i += 2;
            }
            "--config" | "-c" => {
                config.config = Some(PathBuf::from(value_of(&args, i, "--config")));
                i += 2;
            }
            "--help" | "-h" => {
                println!("shard-node - Shardseek shard node");
                println!();
                println!("USAGE:");
                println!("    shard-node [OPTIONS]");
                println!();
                println!("OPTIONS:");
                println!("    -p, --port <PORT>         Port to listen on [default: 50051]");
                println!("    -s, --shard-id <ID>       Shard id reported in replies [default: 0]");
                println!("    -u, --users <FILE>        JSON array of user records to preload");
                println!("    -c, --config <FILE>       Node config JSON");
                println!("    -h, --help                Print help information");
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    config
}

fn load_users(path: &PathBuf, cache: &EntityCache) -> Result<usize, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    let records: Vec<RawUserRecord> = serde_json::from_str(&raw)?;
    let mut entities = Vec::with_capacity(records.len());
    for record in records {
        entities.push(record.into_entity()?);
    }
    Ok(cache.extend(entities))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "shardseek=info,shard_node=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = parse_args();
    let node_config = match &config.config {
        Some(path) => NodeConfig::from_json_file(path)?,
        None => NodeConfig::default(),
    };

    let cache = Arc::new(EntityCache::with_capacity(node_config.cache_capacity));
    if let Some(path) = &config.users {
        let loaded = load_users(path, &cache)?;
        tracing::info!(loaded, path = %path.display(), "preloaded users");
    }

    let node = Arc::new(ShardNode::new(config.shard_id, cache));
    let listener = TcpListener::bind(config.addr).await?;
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        shard_id = config.shard_id,
        addr = %listener.local_addr()?,
        "shard node listening"
    );

    serve(node, listener, async {
        let _ = signal::ctrl_c().await;
    })
    .await?;

    tracing::info!("shut down");
    Ok(())
}
