//! Background workers.
//!
//! Each worker runs on an interval with a shutdown watch channel, logs and
//! continues on per-record failures, and flushes pending state before
//! returning. Workers talk to the core only through the replicated store
//! and the engine capability interface.

use objvault_common::types::{ObjectMeta, ReplicationStatus, VersioningStatus};
use objvault_raft::Command;
use objvault_s3::AppState;
use objvault_store::{bucket as bucket_store, system, Keyspace};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const ACCESS_FLUSH_INTERVAL: Duration = Duration::from_secs(5);
const STS_PRUNE_INTERVAL: Duration = Duration::from_secs(60);
const LIFECYCLE_INTERVAL: Duration = Duration::from_secs(300);
const REPLICATION_INTERVAL: Duration = Duration::from_secs(5);
const REPLICATION_BATCH: usize = 256;

/// Spawn the full worker set.
pub fn spawn_all(
    state: Arc<AppState>,
    peers: Vec<String>,
    shutdown: watch::Receiver<bool>,
) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(access_time_flusher(state.clone(), shutdown.clone())),
        tokio::spawn(sts_pruner(state.clone(), shutdown.clone())),
        tokio::spawn(lifecycle_sweeper(state.clone(), shutdown.clone())),
        tokio::spawn(replication_dispatcher(state, peers, shutdown)),
    ]
}

/// Wait one interval; returns false when shutdown was requested.
async fn tick(interval: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        () = tokio::time::sleep(interval) => true,
        _ = shutdown.changed() => false,
    }
}

/// Flush coalesced access times every few seconds, once more on shutdown.
async fn access_time_flusher(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    loop {
        let keep_going = tick(ACCESS_FLUSH_INTERVAL, &mut shutdown).await;
        state.access_times.flush(&state.replicated).await;
        if !keep_going {
            info!("access-time flusher stopped");
            return;
        }
    }
}

/// Remove expired STS access keys. The cutoff rides in the command payload
/// so replicas prune identically.
async fn sts_pruner(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    while tick(STS_PRUNE_INTERVAL, &mut shutdown).await {
        let now = chrono::Utc::now().timestamp();
        if let Err(e) = state
            .replicated
            .apply(&Command::PruneExpiredAccessKeys { now })
            .await
        {
            warn!(error = %e, "sts prune failed");
        }
    }
    info!("sts pruner stopped");
}

#[derive(Debug, Deserialize)]
struct LifecycleConfiguration {
    #[serde(rename = "Rule", default)]
    rules: Vec<LifecycleRule>,
}

#[derive(Debug, Deserialize)]
struct LifecycleRule {
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "Prefix", default)]
    prefix: Option<String>,
    #[serde(rename = "Expiration", default)]
    expiration: Option<Expiration>,
}

#[derive(Debug, Deserialize)]
struct Expiration {
    #[serde(rename = "Days", default)]
    days: Option<u32>,
}

/// Expire objects per bucket lifecycle rules. On a versioned bucket the
/// current version gets a delete marker; unversioned objects are removed
/// outright.
async fn lifecycle_sweeper(state: Arc<AppState>, mut shutdown: watch::Receiver<bool>) {
    while tick(LIFECYCLE_INTERVAL, &mut shutdown).await {
        if let Err(e) = sweep_once(&state).await {
            warn!(error = %e, "lifecycle sweep failed");
        }
    }
    info!("lifecycle sweeper stopped");
}

async fn sweep_once(state: &AppState) -> anyhow::Result<()> {
    let now = chrono::Utc::now().timestamp();

    // Collect buckets with lifecycle rules under one read transaction.
    let targets: Vec<(objvault_common::types::BucketInfo, LifecycleConfiguration)> = {
        let rtx = state.store().begin_read()?;
        let mut out = Vec::new();
        for info in bucket_store::list_buckets(&rtx)? {
            let Some(raw) =
                bucket_store::get_bucket_config(&rtx, Keyspace::LifecycleRules, &info.name)?
            else {
                continue;
            };
            let Ok(text) = String::from_utf8(raw) else {
                continue;
            };
            match quick_xml::de::from_str::<LifecycleConfiguration>(&text) {
                Ok(config) => out.push((info, config)),
                Err(e) => warn!(bucket = %info.name, error = %e, "unparseable lifecycle config"),
            }
        }
        out
    };

    for (info, config) in targets {
        for rule in &config.rules {
            if rule.status != "Enabled" {
                continue;
            }
            let Some(days) = rule.expiration.as_ref().and_then(|e| e.days) else {
                continue;
            };
            let cutoff = now - i64::from(days) * 86_400;
            let prefix = rule.prefix.clone().unwrap_or_default();

            let expired: Vec<ObjectMeta> = {
                let rtx = state.store().begin_read()?;
                let mut out = Vec::new();
                let scan_prefix = format!("{}/{prefix}", info.name).into_bytes();
                rtx.range(Keyspace::Objects, &scan_prefix, |k, v| {
                    if !k.starts_with(&scan_prefix) {
                        return false;
                    }
                    if let Some(meta) =
                        objvault_store::decode_json::<ObjectMeta>(Keyspace::Objects, k, v)
                    {
                        if !meta.delete_marker && meta.last_modified < cutoff {
                            out.push(meta);
                        }
                    }
                    true
                })?;
                out
            };

            for meta in expired {
                if let Err(e) = expire_object(state, &info.versioning, &meta).await {
                    warn!(bucket = %meta.bucket, key = %meta.key, error = %e, "expiration failed");
                }
            }
        }
    }
    Ok(())
}

async fn expire_object(
    state: &AppState,
    versioning: &VersioningStatus,
    meta: &ObjectMeta,
) -> anyhow::Result<()> {
    debug!(bucket = %meta.bucket, key = %meta.key, "expiring object");
    match versioning {
        VersioningStatus::Unversioned => {
            state
                .replicated
                .apply(&Command::DeleteObjectMeta(objvault_raft::codec::ObjectRef {
                    bucket: meta.bucket.clone(),
                    key: meta.key.clone(),
                }))
                .await?;
            state.engine.delete_object(&meta.bucket, &meta.key).await?;
        }
        // AWS semantics: expiration of a current version creates a marker.
        VersioningStatus::Enabled | VersioningStatus::Suspended => {
            let marker_vid = if *versioning == VersioningStatus::Enabled {
                objvault_s3::utils::generate_version_id()
            } else {
                "null".to_string()
            };
            let marker = ObjectMeta {
                bucket: meta.bucket.clone(),
                key: meta.key.clone(),
                last_modified: chrono::Utc::now().timestamp(),
                version_id: Some(marker_vid),
                is_latest: true,
                delete_marker: true,
                ..Default::default()
            };
            state
                .replicated
                .apply(&Command::PutObjectVersion(Box::new(marker)))
                .await?;
            state.engine.delete_object(&meta.bucket, &meta.key).await?;
        }
    }
    Ok(())
}

/// Track per-peer progress through the replication queue and retire fully
/// dispatched events. Shipping the bytes themselves is a separate concern;
/// this worker owns the queue bookkeeping.
async fn replication_dispatcher(
    state: Arc<AppState>,
    peers: Vec<String>,
    mut shutdown: watch::Receiver<bool>,
) {
    if peers.is_empty() {
        info!("replication dispatcher idle: no peers configured");
        return;
    }

    while tick(REPLICATION_INTERVAL, &mut shutdown).await {
        if let Err(e) = dispatch_once(&state, &peers).await {
            warn!(error = %e, "replication dispatch failed");
        }
    }
    info!("replication dispatcher stopped");
}

async fn dispatch_once(state: &AppState, peers: &[String]) -> anyhow::Result<()> {
    let events = {
        let rtx = state.store().begin_read()?;
        system::read_replication_queue(&rtx, 0, REPLICATION_BATCH)?
    };
    if events.is_empty() {
        return Ok(());
    }

    let last = events.last().map_or(0, |e| e.id);
    for peer in peers {
        state
            .replicated
            .apply(&Command::SetReplicationStatus(ReplicationStatus {
                peer: peer.clone(),
                last_sequence: last,
                last_success: chrono::Utc::now().timestamp(),
                last_error: None,
            }))
            .await?;
    }
    for event in &events {
        state
            .replicated
            .apply(&Command::DequeueReplication { id: event.id })
            .await?;
    }
    debug!(count = events.len(), last, "dispatched replication events");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use objvault_common::ServerConfig;
    use objvault_engine::FsEngine;
    use objvault_store::{object as object_store, Store};

    async fn temp_state() -> (tempfile::TempDir, Arc<AppState>) {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open(dir.path().join("meta.redb")).unwrap());
        let engine = Arc::new(FsEngine::open(dir.path().join("data")).unwrap());
        let state = AppState::single_node_no_auth(ServerConfig::default(), store, engine);
        (dir, Arc::new(state))
    }

    #[tokio::test]
    async fn test_sweep_expires_unversioned_object() {
        let (_dir, state) = temp_state().await;

        state
            .replicated
            .apply(&Command::CreateBucket(objvault_common::types::BucketInfo {
                name: "b".into(),
                created_at: 0,
                ..Default::default()
            }))
            .await
            .unwrap();
        state
            .replicated
            .apply(&Command::PutLifecycleRules(objvault_raft::codec::ConfigPayload {
                bucket: "b".into(),
                config: "<LifecycleConfiguration><Rule><Status>Enabled</Status>\
                         <Expiration><Days>1</Days></Expiration></Rule></LifecycleConfiguration>"
                    .into(),
            }))
            .await
            .unwrap();
        state
            .replicated
            .apply(&Command::PutObjectMeta(Box::new(ObjectMeta {
                bucket: "b".into(),
                key: "stale".into(),
                last_modified: 1, // far past
                ..Default::default()
            })))
            .await
            .unwrap();

        sweep_once(&state).await.unwrap();

        let rtx = state.store().begin_read().unwrap();
        assert!(object_store::get_object(&rtx, "b", "stale").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_sweep_creates_marker_on_versioned_bucket() {
        let (_dir, state) = temp_state().await;

        state
            .replicated
            .apply(&Command::CreateBucket(objvault_common::types::BucketInfo {
                name: "b".into(),
                created_at: 0,
                versioning: VersioningStatus::Enabled,
                ..Default::default()
            }))
            .await
            .unwrap();
        state
            .replicated
            .apply(&Command::PutLifecycleRules(objvault_raft::codec::ConfigPayload {
                bucket: "b".into(),
                config: "<LifecycleConfiguration><Rule><Status>Enabled</Status>\
                         <Expiration><Days>1</Days></Expiration></Rule></LifecycleConfiguration>"
                    .into(),
            }))
            .await
            .unwrap();
        state
            .replicated
            .apply(&Command::PutObjectVersion(Box::new(ObjectMeta {
                bucket: "b".into(),
                key: "old".into(),
                last_modified: 1,
                version_id: Some("v1".into()),
                is_latest: true,
                ..Default::default()
            })))
            .await
            .unwrap();

        sweep_once(&state).await.unwrap();

        let rtx = state.store().begin_read().unwrap();
        let latest = object_store::get_object(&rtx, "b", "old").unwrap().unwrap();
        assert!(latest.delete_marker);
        // The original version survives under its id.
        assert!(object_store::get_version(&rtx, "b", "old", "v1").unwrap().is_some());
    }

    #[tokio::test]
    async fn test_dispatcher_drains_queue_and_tracks_status() {
        let (_dir, state) = temp_state().await;

        for id in 1..=3u64 {
            state
                .replicated
                .apply(&Command::EnqueueReplication(
                    objvault_common::types::ReplicationEvent {
                        id,
                        op: objvault_common::types::ReplicationOp::Put,
                        bucket: "b".into(),
                        key: format!("k{id}"),
                        version_id: None,
                        created_at: 0,
                    },
                ))
                .await
                .unwrap();
        }

        dispatch_once(&state, &["peer-a".to_string()]).await.unwrap();

        let rtx = state.store().begin_read().unwrap();
        assert!(system::read_replication_queue(&rtx, 0, 10).unwrap().is_empty());
        let status = system::get_replication_status(&rtx, "peer-a").unwrap().unwrap();
        assert_eq!(status.last_sequence, 3);
    }
}
