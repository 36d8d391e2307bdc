//! Request handlers, split by target: service, bucket, object, multipart.

pub mod bucket;
pub mod multipart;
pub mod object;
pub mod service;

use crate::error::{S3Error, S3Result};
use crate::state::AppState;
use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use objvault_auth::Identity;
use objvault_common::types::BucketInfo;
use objvault_common::Error;
use objvault_raft::Command;
use objvault_store::bucket as bucket_store;
use std::sync::Arc;
use tracing::warn;

/// Everything a handler needs about the request.
pub struct ReqCtx {
    pub state: Arc<AppState>,
    /// `None` means the request was admitted anonymously (public-read or
    /// website bypass) and must stay read-only.
    pub identity: Option<Identity>,
    pub method: Method,
    pub bucket: String,
    pub key: Option<String>,
    /// Decoded query pairs, original order.
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ReqCtx {
    pub fn query_value(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// The object key, or an invalid-argument error for bucket-level URLs.
    pub fn require_key(&self) -> S3Result<&str> {
        self.key
            .as_deref()
            .ok_or_else(|| S3Error::invalid_argument("missing object key"))
    }

    /// Load the bucket record or fail with `NoSuchBucket`.
    pub fn require_bucket(&self) -> S3Result<BucketInfo> {
        let rtx = self.state.read()?;
        bucket_store::get_bucket(&rtx, &self.bucket)?
            .ok_or_else(|| S3Error(Error::BucketNotFound(self.bucket.clone())))
    }

    /// Submit a command through the replicated store.
    pub async fn submit(&self, command: Command) -> S3Result<()> {
        self.state.replicated.apply(&command).await?;
        Ok(())
    }

    /// Append an audit record for a completed mutation; fire-and-forget.
    pub fn audit(&self, action: &str, status: u16) {
        let entry = objvault_common::types::AuditEntry {
            timestamp: crate::utils::now_unix_nanos(),
            access_key: self
                .identity
                .as_ref()
                .map_or_else(|| "anonymous".to_string(), |i| i.audit_key().to_string()),
            action: action.to_string(),
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            status,
            source_ip: None,
        };
        let state = self.state.clone();
        tokio::spawn(async move {
            if let Err(e) = state.replicated.apply(&Command::AppendAudit(entry)).await {
                warn!(error = %e, "audit append failed");
            }
        });
    }
}
