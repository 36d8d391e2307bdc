//! ObjVault server - S3-compatible object storage
//!
//! Binds the S3 request pipeline to a redb metadata store and a filesystem
//! byte engine, and runs the background workers (access-time flusher, STS
//! pruner, lifecycle sweeper, replication dispatcher).

mod workers;

use anyhow::{Context, Result};
use clap::Parser;
use objvault_common::ServerConfig;
use objvault_engine::FsEngine;
use objvault_s3::{build_router, AppState};
use objvault_store::Store;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "objvault-server")]
#[command(about = "S3-compatible object storage server")]
#[command(version)]
struct Args {
    /// Listen address for the S3 API
    #[arg(short, long, default_value = "0.0.0.0:9000", env = "OBJVAULT_LISTEN")]
    listen: SocketAddr,

    /// Region reported in SigV4 scopes and ?location responses
    #[arg(long, default_value = "us-east-1", env = "OBJVAULT_REGION")]
    region: String,

    /// Base domain for virtual-hosted-style requests (empty = path style only)
    #[arg(long, default_value = "", env = "OBJVAULT_BASE_DOMAIN")]
    base_domain: String,

    /// Directory for object bytes
    #[arg(long, default_value = "/var/lib/objvault/data", env = "OBJVAULT_DATA_DIR")]
    data_dir: std::path::PathBuf,

    /// Path of the metadata database
    #[arg(long, default_value = "/var/lib/objvault/meta.redb", env = "OBJVAULT_META_PATH")]
    metadata_path: std::path::PathBuf,

    /// Admin access key
    #[arg(long, default_value = "objvaultadmin", env = "OBJVAULT_ADMIN_KEY")]
    admin_access_key: String,

    /// Admin secret key
    #[arg(long, default_value = "objvaultadmin", env = "OBJVAULT_ADMIN_SECRET")]
    admin_secret_key: String,

    /// Report SSE headers on reads
    #[arg(long, default_value_t = false, env = "OBJVAULT_ENCRYPTION")]
    encryption: bool,

    /// Disable authentication (for development)
    #[arg(long, default_value_t = false)]
    no_auth: bool,

    /// Source-IP allowlist CIDRs (repeatable); empty admits everyone
    #[arg(long = "ip-allow")]
    ip_allowlist: Vec<String>,

    /// Source-IP blocklist CIDRs (repeatable); applies to admin too
    #[arg(long = "ip-block")]
    ip_blocklist: Vec<String>,

    /// Seconds to wait for a replicated command to apply locally
    #[arg(long, default_value_t = 10)]
    apply_timeout_secs: u64,

    /// Replication peers to track in the dispatcher (repeatable)
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Log level
    #[arg(long, default_value = "info", env = "OBJVAULT_LOG")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| args.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig {
        listen: args.listen,
        region: args.region,
        base_domain: args.base_domain,
        data_dir: args.data_dir.clone(),
        metadata_path: args.metadata_path.clone(),
        admin_access_key: args.admin_access_key,
        admin_secret_key: args.admin_secret_key,
        encryption_enabled: args.encryption,
        apply_timeout_secs: args.apply_timeout_secs,
        ip_allowlist: args.ip_allowlist,
        ip_blocklist: args.ip_blocklist,
        ..Default::default()
    };

    if let Some(parent) = config.metadata_path.parent() {
        std::fs::create_dir_all(parent).context("create metadata directory")?;
    }
    let store = Arc::new(Store::open(&config.metadata_path).context("open metadata store")?);
    let engine = Arc::new(FsEngine::open(&config.data_dir).context("open data directory")?);

    let state = if args.no_auth {
        info!("authentication disabled");
        AppState::single_node_no_auth(config.clone(), store, engine)
    } else {
        AppState::single_node(config.clone(), store, engine)
    };
    let state = Arc::new(state);

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let worker_handles = workers::spawn_all(state.clone(), args.peers, shutdown_rx);

    let router = build_router(state.clone());
    let listener = TcpListener::bind(config.listen)
        .await
        .with_context(|| format!("bind {}", config.listen))?;
    info!(listen = %config.listen, region = %state.config.region, "objvault server started");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    })
    .await
    .context("serve")?;

    // Stop the workers; each flushes pending state before returning.
    let _ = shutdown_tx.send(true);
    for handle in worker_handles {
        let _ = handle.await;
    }
    info!("shutdown complete");
    Ok(())
}
