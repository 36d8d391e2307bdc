//! Bucket-level handlers: lifecycle of the bucket itself, per-bucket
//! configuration subresources, and listings.

use super::ReqCtx;
use crate::error::{S3Error, S3Result};
use crate::xml::{
    self, parse_xml, xml_response, CommonPrefix, DefaultRetentionXml, ListBucketResult,
    ListVersionsResult, LocationConstraint, ObjectEntry, ObjectLockConfiguration, ObjectLockRule,
    Tagging, VersioningConfiguration,
};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use objvault_common::types::{BucketInfo, DefaultRetention, RetentionMode, VersioningStatus};
use objvault_common::Error;
use objvault_raft::codec::{
    BucketRef, ConfigPayload, ObjectLockConfigPayload, QuotaPayload, VersioningPayload,
};
use objvault_raft::Command;
use objvault_store::{bucket as bucket_store, object as object_store, Keyspace};
use serde::{Deserialize, Serialize};

/// `PUT /<bucket>`: create a bucket.
pub async fn create_bucket(ctx: &ReqCtx) -> S3Result<Response> {
    {
        let rtx = ctx.state.read()?;
        if bucket_store::bucket_exists(&rtx, &ctx.bucket)? {
            return Err(S3Error(Error::BucketAlreadyExists(ctx.bucket.clone())));
        }
    }

    let object_lock = ctx
        .header("x-amz-bucket-object-lock-enabled")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));

    ctx.state.engine.create_bucket_dir(&ctx.bucket).await?;
    ctx.submit(Command::CreateBucket(BucketInfo {
        name: ctx.bucket.clone(),
        created_at: crate::utils::now_unix(),
        // Object Lock requires versioning from the first write.
        versioning: if object_lock {
            VersioningStatus::Enabled
        } else {
            VersioningStatus::Unversioned
        },
        object_lock_enabled: object_lock,
        ..Default::default()
    }))
    .await?;

    ctx.audit("s3:CreateBucket", 200);
    Ok((
        StatusCode::OK,
        [(header::LOCATION, format!("/{}", ctx.bucket))],
    )
        .into_response())
}

/// `HEAD /<bucket>`
pub async fn head_bucket(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    Ok(StatusCode::OK.into_response())
}

/// `DELETE /<bucket>`: only when the engine's listing is empty; cascades
/// every per-bucket metadata record.
pub async fn delete_bucket(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;

    let listed = ctx.state.engine.list_objects(&ctx.bucket, "", "", 1).await;
    match listed {
        Ok(objects) if !objects.is_empty() => {
            return Err(S3Error(Error::BucketNotEmpty(ctx.bucket.clone())));
        }
        Ok(_) | Err(objvault_engine::EngineError::BucketNotFound) => {}
        Err(e) => return Err(e.into()),
    }

    ctx.submit(Command::DeleteBucket(BucketRef {
        name: ctx.bucket.clone(),
    }))
    .await?;
    ctx.state.engine.delete_bucket_dir(&ctx.bucket).await?;

    ctx.audit("s3:DeleteBucket", 204);
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `GET /<bucket>?location`
pub async fn get_location(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    Ok(xml_response(&LocationConstraint::new(
        ctx.state.config.region.clone(),
    )))
}

// ── Versioning ────────────────────────────────────────────────────────────────

/// `PUT /<bucket>?versioning`
pub async fn put_versioning(ctx: &ReqCtx) -> S3Result<Response> {
    let info = ctx.require_bucket()?;
    let config: VersioningConfiguration = parse_xml(&ctx.body)?;
    let status = config
        .status
        .as_deref()
        .and_then(VersioningStatus::parse)
        .ok_or(S3Error(Error::MalformedXml))?;

    if info.object_lock_enabled && status != VersioningStatus::Enabled {
        return Err(S3Error(Error::InvalidBucketState(
            "versioning cannot be suspended while Object Lock is enabled".into(),
        )));
    }

    ctx.submit(Command::SetBucketVersioning(VersioningPayload {
        bucket: ctx.bucket.clone(),
        status,
    }))
    .await?;
    Ok(StatusCode::OK.into_response())
}

/// `GET /<bucket>?versioning`
pub async fn get_versioning(ctx: &ReqCtx) -> S3Result<Response> {
    let info = ctx.require_bucket()?;
    let status = match info.versioning {
        VersioningStatus::Unversioned => None,
        other => Some(other.as_str().to_string()),
    };
    Ok(xml_response(&VersioningConfiguration {
        xmlns: xml::S3_XMLNS.to_string(),
        status,
    }))
}

// ── Policy (JSON) ─────────────────────────────────────────────────────────────

/// `PUT /<bucket>?policy`
pub async fn put_policy(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    if ctx.body.len() > ctx.state.config.limits.max_policy_size {
        return Err(S3Error::invalid_argument("policy document too large"));
    }
    let text = std::str::from_utf8(&ctx.body)
        .map_err(|_| S3Error::invalid_argument("policy is not valid UTF-8"))?;
    objvault_auth::PolicyDocument::from_json(text)
        .map_err(|e| S3Error::invalid_argument(format!("invalid policy document: {e}")))?;

    ctx.submit(Command::PutBucketPolicy(ConfigPayload {
        bucket: ctx.bucket.clone(),
        config: text.to_string(),
    }))
    .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `GET /<bucket>?policy`
pub async fn get_policy(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    let rtx = ctx.state.read()?;
    match bucket_store::get_bucket_config(&rtx, Keyspace::BucketPolicies, &ctx.bucket)? {
        Some(policy) => Ok((
            [(header::CONTENT_TYPE, "application/json")],
            policy,
        )
            .into_response()),
        None => Ok(S3Error::xml_response(
            "NoSuchBucketPolicy",
            "The bucket policy does not exist",
            StatusCode::NOT_FOUND,
        )),
    }
}

/// `DELETE /<bucket>?policy`
pub async fn delete_policy(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    ctx.submit(Command::DeleteBucketPolicy(BucketRef {
        name: ctx.bucket.clone(),
    }))
    .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ── Quota (JSON) ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
struct QuotaDoc {
    #[serde(default)]
    max_size_bytes: u64,
    #[serde(default)]
    max_objects: u64,
    #[serde(default)]
    fifo: bool,
}

/// `PUT /<bucket>?quota`
pub async fn put_quota(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    let doc: QuotaDoc = serde_json::from_slice(&ctx.body)
        .map_err(|e| S3Error::invalid_argument(format!("invalid quota document: {e}")))?;
    ctx.submit(Command::PutBucketQuota(QuotaPayload {
        bucket: ctx.bucket.clone(),
        max_size_bytes: doc.max_size_bytes,
        max_objects: doc.max_objects,
        fifo: doc.fifo,
    }))
    .await?;
    Ok(StatusCode::OK.into_response())
}

/// `GET /<bucket>?quota`
pub async fn get_quota(ctx: &ReqCtx) -> S3Result<Response> {
    let info = ctx.require_bucket()?;
    let doc = QuotaDoc {
        max_size_bytes: info.max_size_bytes,
        max_objects: info.max_objects,
        fifo: info.fifo_quota,
    };
    let body = serde_json::to_string(&doc).map_err(|e| S3Error::internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response())
}

// ── Bucket tagging ────────────────────────────────────────────────────────────

/// `PUT /<bucket>?tagging`
pub async fn put_tagging(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    let tagging: Tagging = parse_xml(&ctx.body)?;
    ctx.submit(Command::PutBucketTags(objvault_raft::codec::BucketTagsPayload {
        bucket: ctx.bucket.clone(),
        tags: tagging.into_map(),
    }))
    .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `GET /<bucket>?tagging`
pub async fn get_tagging(ctx: &ReqCtx) -> S3Result<Response> {
    let info = ctx.require_bucket()?;
    Ok(xml_response(&Tagging::from_map(&info.tags)))
}

/// `DELETE /<bucket>?tagging`
pub async fn delete_tagging(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    ctx.submit(Command::PutBucketTags(objvault_raft::codec::BucketTagsPayload {
        bucket: ctx.bucket.clone(),
        tags: Default::default(),
    }))
    .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ── Lambda triggers (JSON) ────────────────────────────────────────────────────

/// `PUT /<bucket>?lambda`
pub async fn put_lambda_trigger(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    if ctx.body.len() > ctx.state.config.limits.max_config_size {
        return Err(S3Error::invalid_argument("trigger document too large"));
    }
    let text = std::str::from_utf8(&ctx.body)
        .map_err(|_| S3Error::invalid_argument("trigger document is not valid UTF-8"))?;
    serde_json::from_str::<serde_json::Value>(text)
        .map_err(|e| S3Error::invalid_argument(format!("invalid trigger document: {e}")))?;

    ctx.submit(Command::PutLambdaTrigger(ConfigPayload {
        bucket: ctx.bucket.clone(),
        config: text.to_string(),
    }))
    .await?;
    Ok(StatusCode::OK.into_response())
}

/// `GET /<bucket>?lambda`
pub async fn get_lambda_trigger(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    let rtx = ctx.state.read()?;
    match bucket_store::get_bucket_config(&rtx, Keyspace::LambdaTriggers, &ctx.bucket)? {
        Some(body) => Ok(([(header::CONTENT_TYPE, "application/json")], body).into_response()),
        None => Ok(S3Error::xml_response(
            "NoSuchConfiguration",
            "The configuration does not exist",
            StatusCode::NOT_FOUND,
        )),
    }
}

/// `DELETE /<bucket>?lambda`
pub async fn delete_lambda_trigger(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    ctx.submit(Command::DeleteLambdaTrigger(BucketRef {
        name: ctx.bucket.clone(),
    }))
    .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

// ── Object lock configuration ─────────────────────────────────────────────────

/// `PUT /<bucket>?object-lock`
pub async fn put_object_lock_config(ctx: &ReqCtx) -> S3Result<Response> {
    let info = ctx.require_bucket()?;
    if info.versioning != VersioningStatus::Enabled {
        return Err(S3Error(Error::InvalidBucketState(
            "Object Lock requires versioning to be enabled".into(),
        )));
    }

    let config: ObjectLockConfiguration = parse_xml(&ctx.body)?;
    let enabled = config
        .object_lock_enabled
        .as_deref()
        .is_some_and(|v| v == "Enabled");
    let retention = match config.rule {
        Some(rule) => {
            let dr = rule.default_retention;
            let mode = RetentionMode::parse(&dr.mode).ok_or(S3Error(Error::MalformedXml))?;
            let days = dr
                .days
                .or_else(|| dr.years.map(|y| y.saturating_mul(365)))
                .ok_or(S3Error(Error::MalformedXml))?;
            Some(DefaultRetention { mode, days })
        }
        None => None,
    };

    ctx.submit(Command::PutObjectLockConfig(ObjectLockConfigPayload {
        bucket: ctx.bucket.clone(),
        enabled,
        retention,
    }))
    .await?;
    Ok(StatusCode::OK.into_response())
}

/// `GET /<bucket>?object-lock`
pub async fn get_object_lock_config(ctx: &ReqCtx) -> S3Result<Response> {
    let info = ctx.require_bucket()?;
    if !info.object_lock_enabled {
        return Ok(S3Error::xml_response(
            "ObjectLockConfigurationNotFoundError",
            "Object Lock configuration does not exist for this bucket",
            StatusCode::NOT_FOUND,
        ));
    }
    Ok(xml_response(&ObjectLockConfiguration {
        xmlns: xml::S3_XMLNS.to_string(),
        object_lock_enabled: Some("Enabled".to_string()),
        rule: info.default_retention.map(|dr| ObjectLockRule {
            default_retention: DefaultRetentionXml {
                mode: dr.mode.as_str().to_string(),
                days: Some(dr.days),
                years: None,
            },
        }),
    }))
}

// ── Raw config subresources ───────────────────────────────────────────────────

/// One stored-verbatim config family (lifecycle, website, CORS, ...).
pub struct ConfigKind {
    pub keyspace: Keyspace,
    pub missing_code: &'static str,
    put: fn(ConfigPayload) -> Command,
    delete: fn(BucketRef) -> Command,
}

/// Resolve a raw-config subresource name.
#[must_use]
pub fn config_kind(subresource: &str) -> Option<ConfigKind> {
    let kind = match subresource {
        "lifecycle" => ConfigKind {
            keyspace: Keyspace::LifecycleRules,
            missing_code: "NoSuchLifecycleConfiguration",
            put: Command::PutLifecycleRules,
            delete: Command::DeleteLifecycleRules,
        },
        "website" => ConfigKind {
            keyspace: Keyspace::WebsiteConfigs,
            missing_code: "NoSuchWebsiteConfiguration",
            put: Command::PutWebsiteConfig,
            delete: Command::DeleteWebsiteConfig,
        },
        "cors" => ConfigKind {
            keyspace: Keyspace::CorsConfigs,
            missing_code: "NoSuchCORSConfiguration",
            put: Command::PutCorsConfig,
            delete: Command::DeleteCorsConfig,
        },
        "notification" => ConfigKind {
            keyspace: Keyspace::NotificationConfigs,
            missing_code: "NoSuchConfiguration",
            put: Command::PutNotificationConfig,
            delete: Command::DeleteNotificationConfig,
        },
        "encryption" => ConfigKind {
            keyspace: Keyspace::EncryptionConfigs,
            missing_code: "ServerSideEncryptionConfigurationNotFoundError",
            put: Command::PutEncryptionConfig,
            delete: Command::DeleteEncryptionConfig,
        },
        "publicAccessBlock" => ConfigKind {
            keyspace: Keyspace::PublicAccessBlocks,
            missing_code: "NoSuchPublicAccessBlockConfiguration",
            put: Command::PutPublicAccessBlock,
            delete: Command::DeletePublicAccessBlock,
        },
        "logging" => ConfigKind {
            keyspace: Keyspace::LoggingConfigs,
            missing_code: "NoSuchConfiguration",
            put: Command::PutLoggingConfig,
            delete: Command::DeleteLoggingConfig,
        },
        _ => return None,
    };
    Some(kind)
}

/// `PUT /<bucket>?<config>`: validate well-formedness, store verbatim.
pub async fn put_config(ctx: &ReqCtx, kind: &ConfigKind) -> S3Result<Response> {
    ctx.require_bucket()?;
    if ctx.body.len() > ctx.state.config.limits.max_config_size {
        return Err(S3Error::invalid_argument("configuration document too large"));
    }
    let text = std::str::from_utf8(&ctx.body).map_err(|_| S3Error(Error::MalformedXml))?;
    validate_xml(text)?;

    ctx.submit((kind.put)(ConfigPayload {
        bucket: ctx.bucket.clone(),
        config: text.to_string(),
    }))
    .await?;
    Ok(StatusCode::OK.into_response())
}

/// `GET /<bucket>?<config>`
pub async fn get_config(ctx: &ReqCtx, kind: &ConfigKind) -> S3Result<Response> {
    ctx.require_bucket()?;
    let rtx = ctx.state.read()?;
    match bucket_store::get_bucket_config(&rtx, kind.keyspace, &ctx.bucket)? {
        Some(body) => Ok((
            [(header::CONTENT_TYPE, "application/xml")],
            body,
        )
            .into_response()),
        None => Ok(S3Error::xml_response(
            kind.missing_code,
            "The configuration does not exist",
            StatusCode::NOT_FOUND,
        )),
    }
}

/// `DELETE /<bucket>?<config>`
pub async fn delete_config(ctx: &ReqCtx, kind: &ConfigKind) -> S3Result<Response> {
    ctx.require_bucket()?;
    ctx.submit((kind.delete)(BucketRef {
        name: ctx.bucket.clone(),
    }))
    .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

fn validate_xml(text: &str) -> S3Result<()> {
    let mut reader = quick_xml::Reader::from_str(text);
    loop {
        match reader.read_event() {
            Ok(quick_xml::events::Event::Eof) => return Ok(()),
            Ok(_) => {}
            Err(_) => return Err(S3Error(Error::MalformedXml)),
        }
    }
}

// ── Listings ──────────────────────────────────────────────────────────────────

/// `GET /<bucket>`: ListObjects (V1) and ListObjectsV2 (`list-type=2`).
pub async fn list_objects(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;

    let v2 = ctx.query_value("list-type") == Some("2");
    let prefix = ctx.query_value("prefix").unwrap_or_default().to_string();
    let delimiter = ctx.query_value("delimiter").map(str::to_string);
    let max_keys: u64 = ctx
        .query_value("max-keys")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1000);
    let marker = if v2 {
        ctx.query_value("continuation-token")
            .or_else(|| ctx.query_value("start-after"))
            .unwrap_or_default()
            .to_string()
    } else {
        ctx.query_value("marker").unwrap_or_default().to_string()
    };

    let listed = ctx
        .state
        .engine
        .list_objects(&ctx.bucket, &prefix, &marker, 0)
        .await?;

    // Group by delimiter, join metadata, paginate.
    let rtx = ctx.state.read()?;
    let mut contents: Vec<ObjectEntry> = Vec::new();
    let mut common_prefixes: Vec<String> = Vec::new();
    let mut truncated = false;
    let mut next_token = None;

    for obj in listed {
        if contents.len() as u64 + common_prefixes.len() as u64 >= max_keys {
            truncated = true;
            next_token = Some(obj.key.clone());
            break;
        }

        if let Some(delim) = &delimiter {
            let rest = &obj.key[prefix.len()..];
            if let Some(pos) = rest.find(delim.as_str()) {
                let cp = format!("{prefix}{}{delim}", &rest[..pos]);
                if common_prefixes.last() != Some(&cp) {
                    common_prefixes.push(cp);
                }
                continue;
            }
        }

        let meta = object_store::get_object(&rtx, &ctx.bucket, &obj.key)?;
        if meta.as_ref().is_some_and(|m| m.delete_marker) {
            continue;
        }
        let (etag, size, modified, tier) = match meta {
            Some(m) => (
                m.etag,
                m.size,
                m.last_modified,
                match m.storage_tier {
                    objvault_common::types::StorageTier::Hot => "STANDARD",
                    objvault_common::types::StorageTier::Cold => "GLACIER",
                },
            ),
            None => (String::new(), obj.size, obj.modified, "STANDARD"),
        };
        contents.push(ObjectEntry {
            key: obj.key,
            last_modified: xml::iso8601(modified),
            etag,
            size,
            storage_class: tier.to_string(),
        });
    }

    let key_count = contents.len() as u64 + common_prefixes.len() as u64;
    let result = ListBucketResult {
        xmlns: xml::S3_XMLNS.to_string(),
        name: ctx.bucket.clone(),
        prefix,
        delimiter,
        marker: if v2 { None } else { Some(marker) },
        key_count: v2.then_some(key_count),
        max_keys,
        is_truncated: truncated,
        next_continuation_token: if v2 { next_token } else { None },
        contents,
        common_prefixes: common_prefixes
            .into_iter()
            .map(|prefix| CommonPrefix { prefix })
            .collect(),
    };
    Ok(xml_response(&result))
}

/// `GET /<bucket>?versions`
pub async fn list_versions(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    let prefix = ctx.query_value("prefix").unwrap_or_default().to_string();
    let max_keys: u64 = ctx
        .query_value("max-keys")
        .and_then(|v| v.parse().ok())
        .unwrap_or(1000);

    let rtx = ctx.state.read()?;
    let mut all = object_store::list_bucket_versions(&rtx, &ctx.bucket)?;
    all.retain(|m| m.key.starts_with(&prefix));
    all.sort_by(|a, b| {
        a.key
            .cmp(&b.key)
            .then_with(|| b.last_modified.cmp(&a.last_modified))
    });

    let truncated = all.len() as u64 > max_keys;
    all.truncate(max_keys as usize);

    let mut versions = Vec::new();
    let mut delete_markers = Vec::new();
    for meta in all {
        let version_id = meta.version_id.clone().unwrap_or_else(|| "null".into());
        if meta.delete_marker {
            delete_markers.push(xml::DeleteMarkerEntry {
                key: meta.key,
                version_id,
                is_latest: meta.is_latest,
                last_modified: xml::iso8601(meta.last_modified),
            });
        } else {
            versions.push(xml::VersionEntry {
                key: meta.key,
                version_id,
                is_latest: meta.is_latest,
                last_modified: xml::iso8601(meta.last_modified),
                etag: meta.etag,
                size: meta.size,
            });
        }
    }

    Ok(xml_response(&ListVersionsResult {
        xmlns: xml::S3_XMLNS.to_string(),
        name: ctx.bucket.clone(),
        prefix,
        max_keys,
        is_truncated: truncated,
        versions,
        delete_markers,
    }))
}
