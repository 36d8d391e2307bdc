//! Service-level handlers (`GET /`).

use super::ReqCtx;
use crate::error::S3Result;
use crate::xml::{xml_response, BucketEntry, ListAllMyBucketsResult, Owner};
use axum::response::Response;
use objvault_store::bucket as bucket_store;

/// `GET /`: list every bucket.
pub async fn list_buckets(ctx: &ReqCtx) -> S3Result<Response> {
    let rtx = ctx.state.read()?;
    let buckets = bucket_store::list_buckets(&rtx)?
        .into_iter()
        .map(|info| BucketEntry {
            name: info.name,
            creation_date: crate::xml::iso8601(info.created_at),
        })
        .collect();

    let owner = Owner {
        id: "objvault".to_string(),
        display_name: "objvault".to_string(),
    };
    Ok(xml_response(&ListAllMyBucketsResult::new(owner, buckets)))
}
