//! Object handlers: the write path (PUT/COPY), the read path (GET/HEAD),
//! deletes with versioning and object-lock semantics, tagging, retention,
//! and legal hold.

use super::ReqCtx;
use crate::conditions;
use crate::error::{S3Error, S3Result};
use crate::events::ObjectEvent;
use crate::lock;
use crate::range::parse_range_header;
use crate::utils;
use crate::xml::{
    self, parse_xml, xml_response, CopyObjectResult, DeleteRequest, DeleteResult, DeletedEntry,
    GetObjectAttributesOutput, LegalHold, Retention, Tagging,
};
use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use objvault_common::checksum::{self, ChecksumAlgorithm};
use objvault_common::types::{
    BucketInfo, ChecksumSet, HttpMetadata, ObjectMeta, ReplicationEvent, ReplicationOp,
    RetentionMode, StorageTier, VersioningStatus,
};
use objvault_common::Error;
use objvault_raft::codec::{LegalHoldPayload, ObjectRef, ObjectTagsPayload, RetentionPayload, VersionRef};
use objvault_raft::Command;
use objvault_store::{object as object_store, Keyspace};
use std::collections::HashMap;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, warn};

/// Everything needed to persist one object write; shared by PUT, COPY, TAR
/// extraction, and multipart Complete.
pub struct WriteRequest {
    pub key: String,
    pub body: Bytes,
    pub content_type: String,
    pub user_metadata: HashMap<String, String>,
    pub http_metadata: HttpMetadata,
    pub tags: HashMap<String, String>,
    pub checksums: ChecksumSet,
}

// ── PUT ───────────────────────────────────────────────────────────────────────

/// `PUT /<bucket>/<key>`
pub async fn put_object(ctx: &ReqCtx) -> S3Result<Response> {
    let info = ctx.require_bucket()?;
    let key = ctx.require_key()?.to_string();

    if ctx.header("x-amz-copy-source").is_some() {
        return copy_object(ctx, &info).await;
    }
    if ctx
        .header("x-amz-meta-snowball-auto-extract")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
    {
        return extract_archive(ctx, &info).await;
    }

    let max = ctx.state.config.limits.max_object_size;
    if ctx.body.len() as u64 > max {
        return Err(S3Error(Error::EntityTooLarge { max_size: max }));
    }

    enforce_quota(ctx, &info, ctx.body.len() as u64).await?;

    {
        let rtx = ctx.state.read()?;
        let existing = object_store::get_object(&rtx, &ctx.bucket, &key)?;
        conditions::check_write_conditions(&ctx.headers, existing.as_ref())?;
    }

    let checksums = validate_checksums(&ctx.headers, &ctx.body)?;
    let content_type = utils::resolve_content_type(&ctx.headers, &key);

    let request = WriteRequest {
        key,
        body: ctx.body.clone(),
        content_type,
        user_metadata: utils::extract_user_metadata(&ctx.headers),
        http_metadata: extract_http_metadata(&ctx.headers),
        tags: HashMap::new(),
        checksums,
    };
    let meta = write_object(ctx, &info, request).await?;

    ctx.audit("s3:PutObject", 200);
    let mut response = StatusCode::OK.into_response();
    put_response_headers(response.headers_mut(), &meta);
    Ok(response)
}

/// Persist one object write: bytes first, then the metadata command, with a
/// compensating byte delete if the command fails. Metadata is authoritative
/// once committed.
pub async fn write_object(
    ctx: &ReqCtx,
    info: &BucketInfo,
    request: WriteRequest,
) -> S3Result<ObjectMeta> {
    let now = utils::now_unix();
    let size = request.body.len() as u64;
    let etag = checksum::etag(&request.body);

    let mut meta = ObjectMeta {
        bucket: info.name.clone(),
        key: request.key.clone(),
        content_type: request.content_type,
        etag,
        size,
        last_modified: now,
        tags: request.tags,
        user_metadata: request.user_metadata,
        http_metadata: request.http_metadata,
        checksums: request.checksums,
        ..Default::default()
    };
    apply_object_lock_headers(ctx, info, &mut meta, now)?;

    let command = match info.versioning {
        VersioningStatus::Enabled | VersioningStatus::Suspended => {
            let version_id = if info.versioning == VersioningStatus::Enabled {
                utils::generate_version_id()
            } else {
                "null".to_string()
            };
            ctx.state
                .engine
                .put_object_version(&info.name, &request.key, &version_id, request.body)
                .await?;
            ctx.state
                .engine
                .promote_version(&info.name, &request.key, &version_id)
                .await?;
            meta.version_id = Some(version_id);
            meta.is_latest = true;
            Command::PutObjectVersion(Box::new(meta.clone()))
        }
        VersioningStatus::Unversioned => {
            ctx.state
                .engine
                .put_object(&info.name, &request.key, request.body)
                .await?;
            Command::PutObjectMeta(Box::new(meta.clone()))
        }
    };

    if let Err(e) = ctx.submit(command).await {
        // Bytes without metadata are invisible garbage; clean them up.
        rollback_bytes(ctx, &request.key, meta.version_id.as_deref()).await;
        return Err(e);
    }

    fire_object_created(ctx, &meta);
    Ok(meta)
}

async fn rollback_bytes(ctx: &ReqCtx, key: &str, version_id: Option<&str>) {
    let engine = &ctx.state.engine;
    let result = match version_id {
        Some(vid) => engine.delete_object_version(&ctx.bucket, key, vid).await,
        None => engine.delete_object(&ctx.bucket, key).await,
    };
    if let Err(e) = result {
        warn!(bucket = %ctx.bucket, key, error = %e, "rollback of written bytes failed");
    }
}

fn fire_object_created(ctx: &ReqCtx, meta: &ObjectMeta) {
    ctx.state.hooks.fire(ObjectEvent::Created {
        bucket: meta.bucket.clone(),
        key: meta.key.clone(),
        version_id: meta.version_id.clone(),
        size: meta.size,
    });
    enqueue_replication(ctx, ReplicationOp::Put, &meta.key, meta.version_id.clone());
}

/// Queue a replication event. The id comes from the leader's local sequence
/// allocator before submission, so the applier stays deterministic.
fn enqueue_replication(ctx: &ReqCtx, op: ReplicationOp, key: &str, version_id: Option<String>) {
    let state = ctx.state.clone();
    let bucket = ctx.bucket.clone();
    let key = key.to_string();
    tokio::spawn(async move {
        let id = {
            let store = state.store().clone();
            let allocated = tokio::task::spawn_blocking(move || -> Result<u64, objvault_store::StoreError> {
                let mut txn = store.begin_write()?;
                let id = txn.next_sequence(Keyspace::ReplicationQueue)?;
                txn.commit()?;
                Ok(id)
            })
            .await;
            match allocated {
                Ok(Ok(id)) => id,
                other => {
                    warn!(?other, "replication id allocation failed");
                    return;
                }
            }
        };
        let event = ReplicationEvent {
            id,
            op,
            bucket,
            key,
            version_id,
            created_at: utils::now_unix(),
        };
        if let Err(e) = state.replicated.apply(&Command::EnqueueReplication(event)).await {
            warn!(error = %e, "replication enqueue failed");
        }
    });
}

/// Quota gate: current usage comes from the engine. With `fifo_quota` set,
/// oldest objects (by last-modified) are evicted until the write fits.
async fn enforce_quota(ctx: &ReqCtx, info: &BucketInfo, incoming: u64) -> S3Result<()> {
    if info.max_size_bytes == 0 && info.max_objects == 0 {
        return Ok(());
    }
    let (mut current_size, current_count) = ctx.state.engine.bucket_size(&info.name).await?;

    if info.max_objects > 0 && current_count >= info.max_objects && !info.fifo_quota {
        return Err(S3Error(Error::QuotaExceeded(info.name.clone())));
    }

    if info.max_size_bytes > 0 && current_size + incoming > info.max_size_bytes {
        if !info.fifo_quota {
            return Err(S3Error(Error::QuotaExceeded(info.name.clone())));
        }

        // Evict oldest live objects until the incoming write fits.
        let mut victims: Vec<ObjectMeta> = {
            let rtx = ctx.state.read()?;
            let mut all = Vec::new();
            let prefix = format!("{}/", info.name).into_bytes();
            rtx.range(Keyspace::Objects, &prefix, |k, v| {
                if !k.starts_with(&prefix) {
                    return false;
                }
                if let Some(meta) = objvault_store::decode_json::<ObjectMeta>(Keyspace::Objects, k, v)
                {
                    if !meta.delete_marker {
                        all.push(meta);
                    }
                }
                true
            })?;
            all.sort_by_key(|m| m.last_modified);
            all
        };
        victims.reverse(); // pop() yields oldest first

        while current_size + incoming > info.max_size_bytes {
            let Some(victim) = victims.pop() else {
                return Err(S3Error(Error::QuotaExceeded(info.name.clone())));
            };
            debug!(bucket = %info.name, key = %victim.key, "fifo quota eviction");
            delete_permanently(ctx, info, &victim).await?;
            current_size = current_size.saturating_sub(victim.size);
        }
    }
    Ok(())
}

fn extract_http_metadata(headers: &HeaderMap) -> HttpMetadata {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };
    HttpMetadata {
        content_encoding: get("content-encoding"),
        content_disposition: get("content-disposition"),
        cache_control: get("cache-control"),
        content_language: get("content-language"),
        website_redirect_location: get("x-amz-website-redirect-location"),
    }
}

/// Validate `Content-MD5` and every provided `x-amz-checksum-*` header
/// against the body; record provided and requested checksums.
fn validate_checksums(headers: &HeaderMap, body: &Bytes) -> S3Result<ChecksumSet> {
    if let Some(expected) = headers.get("content-md5").and_then(|v| v.to_str().ok()) {
        let actual = checksum::md5_base64(body);
        if expected != actual {
            return Err(S3Error(Error::BadDigest {
                expected: expected.to_string(),
                actual,
            }));
        }
    }

    let mut set = ChecksumSet::default();
    for algorithm in ChecksumAlgorithm::ALL {
        let header = format!("x-amz-checksum-{}", algorithm.as_str().to_lowercase());
        if let Some(expected) = headers.get(header.as_str()).and_then(|v| v.to_str().ok()) {
            let actual = checksum::compute(algorithm, body);
            if expected != actual {
                return Err(S3Error(Error::BadDigest {
                    expected: expected.to_string(),
                    actual,
                }));
            }
            checksum::record(&mut set, algorithm, actual);
        }
    }

    // A bare algorithm request (SDK trailer mode) computes without comparing.
    if let Some(requested) = headers
        .get("x-amz-sdk-checksum-algorithm")
        .and_then(|v| v.to_str().ok())
    {
        if let Ok(algorithm) = requested.parse::<ChecksumAlgorithm>() {
            if checksum::recorded(&set, algorithm).is_none() {
                checksum::record(&mut set, algorithm, checksum::compute(algorithm, body));
            }
        }
    }
    Ok(set)
}

/// Inline `X-Amz-Object-Lock-*` headers win; otherwise the bucket default
/// retention is inherited.
fn apply_object_lock_headers(
    ctx: &ReqCtx,
    info: &BucketInfo,
    meta: &mut ObjectMeta,
    now: i64,
) -> S3Result<()> {
    let inline_mode = ctx
        .header("x-amz-object-lock-mode")
        .map(|v| RetentionMode::parse(v).ok_or_else(|| S3Error::invalid_argument("invalid object lock mode")))
        .transpose()?;

    if let Some(mode) = inline_mode {
        let until = ctx
            .header("x-amz-object-lock-retain-until-date")
            .ok_or_else(|| S3Error::invalid_argument("missing retain-until date"))?;
        let until = chrono::DateTime::parse_from_rfc3339(until)
            .map_err(|_| S3Error::invalid_argument("invalid retain-until date"))?
            .timestamp();
        meta.retention_mode = Some(mode);
        meta.retention_until = until;
    } else if let Some(default) = &info.default_retention {
        meta.retention_mode = Some(default.mode);
        meta.retention_until = now + i64::from(default.days) * 86_400;
    }

    if let Some(hold) = ctx.header("x-amz-object-lock-legal-hold") {
        meta.legal_hold = hold.eq_ignore_ascii_case("ON");
    }
    Ok(())
}

fn put_response_headers(headers: &mut HeaderMap, meta: &ObjectMeta) {
    if let Ok(value) = meta.etag.parse() {
        headers.insert(header::ETAG, value);
    }
    if let Some(vid) = meta.reported_version_id() {
        if let Ok(value) = vid.parse() {
            headers.insert("x-amz-version-id", value);
        }
    }
    checksum_headers(headers, &meta.checksums);
}

fn checksum_headers(headers: &mut HeaderMap, set: &ChecksumSet) {
    for algorithm in ChecksumAlgorithm::ALL {
        if let Some(value) = checksum::recorded(set, algorithm) {
            let name = format!("x-amz-checksum-{}", algorithm.as_str().to_lowercase());
            if let (Ok(name), Ok(value)) = (name.parse::<HeaderName>(), value.parse::<HeaderValue>())
            {
                headers.insert(name, value);
            }
        }
    }
}

// ── Snowball TAR extraction ───────────────────────────────────────────────────

/// `PUT` with `X-Amz-Meta-Snowball-Auto-Extract: true`: each archive entry
/// recurses into the ordinary write path under its own key.
async fn extract_archive(ctx: &ReqCtx, info: &BucketInfo) -> S3Result<Response> {
    let entries = crate::tar::entries(&ctx.body).map_err(S3Error)?;
    debug!(bucket = %info.name, count = entries.len(), "auto-extracting archive");

    for entry in entries {
        enforce_quota(ctx, info, entry.data.len() as u64).await?;
        let content_type = utils::content_type_by_extension(&entry.name).to_string();
        let request = WriteRequest {
            key: entry.name,
            body: entry.data,
            content_type,
            user_metadata: HashMap::new(),
            http_metadata: HttpMetadata::default(),
            tags: HashMap::new(),
            checksums: ChecksumSet::default(),
        };
        write_object(ctx, info, request).await?;
    }
    Ok(StatusCode::OK.into_response())
}

// ── COPY ──────────────────────────────────────────────────────────────────────

/// `PUT /<bucket>/<key>` with `X-Amz-Copy-Source`.
async fn copy_object(ctx: &ReqCtx, info: &BucketInfo) -> S3Result<Response> {
    let raw_source = ctx.header("x-amz-copy-source").unwrap_or_default();
    let (src_bucket, src_key, src_version) = parse_copy_source(raw_source)?;

    let source = {
        let rtx = ctx.state.read()?;
        match &src_version {
            Some(vid) => object_store::get_version(&rtx, &src_bucket, &src_key, vid)?
                .ok_or(S3Error(Error::NoSuchVersion {
                    version_id: vid.clone(),
                }))?,
            None => object_store::get_object(&rtx, &src_bucket, &src_key)?
                .filter(|m| !m.delete_marker)
                .ok_or_else(|| S3Error(Error::ObjectNotFound {
                    bucket: src_bucket.clone(),
                    key: src_key.clone(),
                }))?,
        }
    };
    conditions::check_copy_conditions(&ctx.headers, &source)?;

    let body = read_object_bytes(ctx, &source, None).await?;
    enforce_quota(ctx, info, body.len() as u64).await?;

    let replace = ctx
        .header("x-amz-metadata-directive")
        .is_some_and(|d| d.eq_ignore_ascii_case("REPLACE"));
    let key = ctx.require_key()?.to_string();
    let request = if replace {
        WriteRequest {
            content_type: utils::resolve_content_type(&ctx.headers, &key),
            user_metadata: utils::extract_user_metadata(&ctx.headers),
            http_metadata: extract_http_metadata(&ctx.headers),
            tags: HashMap::new(),
            checksums: validate_checksums(&ctx.headers, &body)?,
            key,
            body,
        }
    } else {
        WriteRequest {
            content_type: source.content_type.clone(),
            user_metadata: source.user_metadata.clone(),
            http_metadata: source.http_metadata.clone(),
            tags: source.tags.clone(),
            checksums: source.checksums.clone(),
            key,
            body,
        }
    };

    let meta = write_object(ctx, info, request).await?;
    ctx.audit("s3:PutObject", 200);

    let mut response = xml_response(&CopyObjectResult::new(meta.etag.clone(), meta.last_modified));
    put_response_headers(response.headers_mut(), &meta);
    response.headers_mut().remove(header::ETAG); // the body carries it
    Ok(response)
}

/// Parse `/<bucket>/<key>[?versionId=...]`, URL-unescaped once; `..`
/// segments and NUL bytes are rejected.
pub fn parse_copy_source(raw: &str) -> S3Result<(String, String, Option<String>)> {
    let (path, version) = match raw.split_once('?') {
        Some((path, query)) => {
            let version = query
                .split('&')
                .find_map(|p| p.strip_prefix("versionId="))
                .map(str::to_string);
            (path, version)
        }
        None => (raw, None),
    };

    let decoded = urlencoding::decode(path)
        .map_err(|_| S3Error::invalid_argument("invalid copy source encoding"))?;
    let decoded = decoded.trim_start_matches('/');
    if decoded.contains('\0') || decoded.split('/').any(|seg| seg == "..") {
        return Err(S3Error::invalid_argument("invalid copy source path"));
    }
    let (bucket, key) = decoded
        .split_once('/')
        .filter(|(b, k)| !b.is_empty() && !k.is_empty())
        .ok_or_else(|| S3Error::invalid_argument("copy source must be /<bucket>/<key>"))?;
    Ok((bucket.to_string(), key.to_string(), version))
}

// ── GET / HEAD ────────────────────────────────────────────────────────────────

/// `GET /<bucket>/<key>` and `HEAD /<bucket>/<key>`
pub async fn get_object(ctx: &ReqCtx, head: bool) -> S3Result<Response> {
    ctx.require_bucket()?;
    let key = ctx.require_key()?.to_string();

    let meta = {
        let rtx = ctx.state.read()?;
        match ctx.query_value("versionId") {
            Some(vid) => object_store::get_version(&rtx, &ctx.bucket, &key, vid)?.ok_or(
                S3Error(Error::NoSuchVersion {
                    version_id: vid.to_string(),
                }),
            )?,
            None => object_store::get_object(&rtx, &ctx.bucket, &key)?.ok_or_else(|| {
                S3Error(Error::ObjectNotFound {
                    bucket: ctx.bucket.clone(),
                    key: key.clone(),
                })
            })?,
        }
    };

    if meta.delete_marker {
        let mut response = S3Error(Error::ObjectNotFound {
            bucket: ctx.bucket.clone(),
            key: key.clone(),
        })
        .into_response();
        response
            .headers_mut()
            .insert("x-amz-delete-marker", HeaderValue::from_static("true"));
        if let Some(vid) = meta.version_id.as_deref() {
            if let Ok(value) = vid.parse() {
                response.headers_mut().insert("x-amz-version-id", value);
            }
        }
        return Ok(response);
    }

    conditions::check_read_conditions(&ctx.headers, &meta.etag, meta.last_modified)?;

    let mut headers = HeaderMap::new();
    read_response_headers(ctx, &mut headers, &meta);
    apply_response_overrides(ctx, &mut headers);

    // Resolve the requested byte window: ?partNumber, then Range.
    let window = resolve_read_window(ctx, &meta)?;

    ctx.state
        .access_times
        .record(&ctx.bucket, &key, utils::now_unix());

    let (status, body_range) = match window {
        Some(range) => {
            headers.insert(
                header::CONTENT_RANGE,
                range
                    .content_range(meta.size)
                    .parse()
                    .map_err(|_| S3Error::internal("content-range header"))?,
            );
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(range.len()));
            (StatusCode::PARTIAL_CONTENT, Some(range))
        }
        None => {
            headers.insert(header::CONTENT_LENGTH, HeaderValue::from(meta.size));
            (StatusCode::OK, None)
        }
    };

    let mut response = if head {
        status.into_response()
    } else {
        let bytes = read_object_bytes(ctx, &meta, body_range.map(|r| (r.start, r.end))).await?;
        (status, Body::from(bytes)).into_response()
    };
    response.headers_mut().extend(headers);
    Ok(response)
}

/// `?partNumber=N` resolves against recorded part boundaries; otherwise the
/// `Range` header applies.
fn resolve_read_window(
    ctx: &ReqCtx,
    meta: &ObjectMeta,
) -> S3Result<Option<crate::range::ByteRange>> {
    if let Some(part) = ctx.query_value("partNumber") {
        let n: usize = part
            .parse()
            .map_err(|_| S3Error::invalid_argument("invalid partNumber"))?;
        if n == 0 || n > meta.part_boundaries.len() {
            return Err(S3Error(Error::InvalidPart {
                part_number: n as u32,
            }));
        }
        let start = if n == 1 { 0 } else { meta.part_boundaries[n - 2] };
        let end = meta.part_boundaries[n - 1] - 1;
        return Ok(Some(crate::range::ByteRange { start, end }));
    }

    if let Some(range_header) = ctx.header("range") {
        let range = parse_range_header(range_header, meta.size)
            .ok_or(S3Error(Error::InvalidRange))?;
        return Ok(Some(range));
    }
    Ok(None)
}

fn set_header(headers: &mut HeaderMap, name: &str, value: &str) {
    if let (Ok(name), Ok(value)) = (name.parse::<HeaderName>(), value.parse::<HeaderValue>()) {
        headers.insert(name, value);
    }
}

fn read_response_headers(ctx: &ReqCtx, headers: &mut HeaderMap, meta: &ObjectMeta) {
    set_header(headers, "content-type", &meta.content_type);
    set_header(headers, "etag", &meta.etag);
    set_header(
        headers,
        "last-modified",
        &conditions::http_date(meta.last_modified),
    );
    set_header(headers, "accept-ranges", "bytes");

    for (key, value) in &meta.user_metadata {
        set_header(headers, &format!("x-amz-meta-{key}"), value);
    }

    let http = &meta.http_metadata;
    if let Some(v) = &http.content_encoding {
        set_header(headers, "content-encoding", v);
    }
    if let Some(v) = &http.content_disposition {
        set_header(headers, "content-disposition", v);
    }
    if let Some(v) = &http.cache_control {
        set_header(headers, "cache-control", v);
    }
    if let Some(v) = &http.content_language {
        set_header(headers, "content-language", v);
    }
    if let Some(v) = &http.website_redirect_location {
        set_header(headers, "x-amz-website-redirect-location", v);
    }

    checksum_headers(headers, &meta.checksums);

    if let Some(vid) = meta.reported_version_id() {
        set_header(headers, "x-amz-version-id", vid);
    }
    if meta.parts_count > 0 {
        set_header(headers, "x-amz-mp-parts-count", &meta.parts_count.to_string());
    }
    if meta.storage_tier == StorageTier::Cold {
        set_header(headers, "x-amz-storage-class", "GLACIER");
    }
    if ctx.state.config.encryption_enabled {
        set_header(headers, "x-amz-server-side-encryption", "AES256");
    }
}

const RESPONSE_OVERRIDES: [(&str, &str); 6] = [
    ("response-content-type", "content-type"),
    ("response-content-disposition", "content-disposition"),
    ("response-content-encoding", "content-encoding"),
    ("response-content-language", "content-language"),
    ("response-cache-control", "cache-control"),
    ("response-expires", "expires"),
];

fn apply_response_overrides(ctx: &ReqCtx, headers: &mut HeaderMap) {
    for (param, header_name) in RESPONSE_OVERRIDES {
        if let Some(value) = ctx.query_value(param) {
            if let (Ok(name), Ok(value)) =
                (header_name.parse::<HeaderName>(), value.parse::<HeaderValue>())
            {
                headers.insert(name, value);
            }
        }
    }
}

/// Read an object's bytes from the engine, optionally a `[start, end]`
/// window. Versioned records read their version bytes.
pub(crate) async fn read_object_bytes(
    ctx: &ReqCtx,
    meta: &ObjectMeta,
    window: Option<(u64, u64)>,
) -> S3Result<Bytes> {
    let engine = &ctx.state.engine;
    let opened = match meta.version_id.as_deref() {
        Some(vid) => engine.get_object_version(&meta.bucket, &meta.key, vid).await,
        None => engine.get_object(&meta.bucket, &meta.key).await,
    };
    let (mut reader, size) = match opened {
        Ok(opened) => opened,
        Err(objvault_engine::EngineError::NotFound) => {
            return Err(S3Error(Error::ObjectNotFound {
                bucket: meta.bucket.clone(),
                key: meta.key.clone(),
            }));
        }
        Err(e) => return Err(e.into()),
    };

    match window {
        Some((start, end)) => {
            let len = (end - start + 1).min(size.saturating_sub(start)) as usize;
            reader
                .seek(std::io::SeekFrom::Start(start))
                .await
                .map_err(|e| S3Error(Error::DiskIo(e)))?;
            let mut buf = vec![0u8; len];
            reader
                .read_exact(&mut buf)
                .await
                .map_err(|e| S3Error(Error::DiskIo(e)))?;
            Ok(Bytes::from(buf))
        }
        None => {
            let mut buf = Vec::with_capacity(size as usize);
            reader
                .read_to_end(&mut buf)
                .await
                .map_err(|e| S3Error(Error::DiskIo(e)))?;
            Ok(Bytes::from(buf))
        }
    }
}

// ── DELETE ────────────────────────────────────────────────────────────────────

/// `DELETE /<bucket>/<key>[?versionId=...]`
pub async fn delete_object(ctx: &ReqCtx) -> S3Result<Response> {
    let info = ctx.require_bucket()?;
    let key = ctx.require_key()?.to_string();
    let version_id = ctx.query_value("versionId").map(str::to_string);

    let deleted = delete_one(ctx, &info, &key, version_id.as_deref()).await?;

    ctx.audit("s3:DeleteObject", 204);
    let mut response = StatusCode::NO_CONTENT.into_response();
    if deleted.delete_marker == Some(true) {
        response
            .headers_mut()
            .insert("x-amz-delete-marker", HeaderValue::from_static("true"));
    }
    if let Some(vid) = &deleted.version_id {
        if let Ok(value) = vid.parse() {
            response.headers_mut().insert("x-amz-version-id", value);
        }
    }
    Ok(response)
}

/// Shared delete core for `DELETE` and `POST ?delete`.
pub async fn delete_one(
    ctx: &ReqCtx,
    info: &BucketInfo,
    key: &str,
    version_id: Option<&str>,
) -> S3Result<DeletedEntry> {
    match version_id {
        Some(vid) => {
            // Permanent delete of one version, guarded by object lock.
            let meta = {
                let rtx = ctx.state.read()?;
                object_store::get_version(&rtx, &ctx.bucket, key, vid)?.ok_or(S3Error(
                    Error::NoSuchVersion {
                        version_id: vid.to_string(),
                    },
                ))?
            };
            check_delete_guard(ctx, &meta)?;

            ctx.submit(Command::DeleteObjectVersion(VersionRef {
                bucket: ctx.bucket.clone(),
                key: key.to_string(),
                version_id: vid.to_string(),
            }))
            .await?;
            ctx.state
                .engine
                .delete_object_version(&ctx.bucket, key, vid)
                .await?;
            sync_latest_bytes(ctx, key).await?;

            ctx.state.hooks.fire(ObjectEvent::Removed {
                bucket: ctx.bucket.clone(),
                key: key.to_string(),
                version_id: Some(vid.to_string()),
                delete_marker: meta.delete_marker,
            });
            enqueue_replication(ctx, ReplicationOp::Delete, key, Some(vid.to_string()));

            Ok(DeletedEntry {
                key: key.to_string(),
                version_id: Some(vid.to_string()),
                delete_marker: meta.delete_marker.then_some(true),
            })
        }
        None if info.versioning != VersioningStatus::Unversioned => {
            // Versioned delete: a delete marker becomes the latest version.
            let marker_vid = if info.versioning == VersioningStatus::Enabled {
                utils::generate_version_id()
            } else {
                "null".to_string()
            };
            let marker = ObjectMeta {
                bucket: ctx.bucket.clone(),
                key: key.to_string(),
                last_modified: utils::now_unix(),
                version_id: Some(marker_vid.clone()),
                is_latest: true,
                delete_marker: true,
                ..Default::default()
            };
            ctx.submit(Command::PutObjectVersion(Box::new(marker))).await?;
            // The plain path no longer names a live object.
            ctx.state.engine.delete_object(&ctx.bucket, key).await?;

            ctx.state.hooks.fire(ObjectEvent::Removed {
                bucket: ctx.bucket.clone(),
                key: key.to_string(),
                version_id: Some(marker_vid.clone()),
                delete_marker: true,
            });
            enqueue_replication(ctx, ReplicationOp::Delete, key, Some(marker_vid.clone()));

            Ok(DeletedEntry {
                key: key.to_string(),
                version_id: Some(marker_vid),
                delete_marker: Some(true),
            })
        }
        None => {
            let meta = {
                let rtx = ctx.state.read()?;
                object_store::get_object(&rtx, &ctx.bucket, key)?
            };
            if let Some(meta) = &meta {
                check_delete_guard(ctx, meta)?;
                delete_permanently(ctx, info, meta).await?;
            }
            Ok(DeletedEntry {
                key: key.to_string(),
                version_id: None,
                delete_marker: None,
            })
        }
    }
}

/// Permanent unversioned delete (also the FIFO-quota eviction path).
async fn delete_permanently(ctx: &ReqCtx, _info: &BucketInfo, meta: &ObjectMeta) -> S3Result<()> {
    ctx.submit(Command::DeleteObjectMeta(ObjectRef {
        bucket: meta.bucket.clone(),
        key: meta.key.clone(),
    }))
    .await?;
    ctx.state.engine.delete_object(&meta.bucket, &meta.key).await?;

    ctx.state.hooks.fire(ObjectEvent::Removed {
        bucket: meta.bucket.clone(),
        key: meta.key.clone(),
        version_id: None,
        delete_marker: false,
    });
    enqueue_replication(ctx, ReplicationOp::Delete, &meta.key, None);
    Ok(())
}

fn check_delete_guard(ctx: &ReqCtx, meta: &ObjectMeta) -> S3Result<()> {
    let bypass = bypass_governance(ctx);
    lock::check_version_delete(meta, utils::now_unix(), bypass).map_err(S3Error)
}

/// The bypass header only works for callers holding
/// `s3:BypassGovernanceRetention`.
fn bypass_governance(ctx: &ReqCtx) -> bool {
    let requested = ctx
        .header("x-amz-bypass-governance-retention")
        .is_some_and(|v| v.eq_ignore_ascii_case("true"));
    if !requested {
        return false;
    }
    ctx.identity
        .as_ref()
        .is_some_and(|identity| crate::auth::can_bypass_governance(identity, &ctx.bucket))
}

/// After a permanent version delete, make the plain-path bytes match the
/// new latest version (or remove them if none survives).
async fn sync_latest_bytes(ctx: &ReqCtx, key: &str) -> S3Result<()> {
    let latest = {
        let rtx = ctx.state.read()?;
        object_store::get_object(&rtx, &ctx.bucket, key)?
    };
    match latest {
        Some(meta) if !meta.delete_marker => {
            if let Some(vid) = meta.version_id.as_deref() {
                ctx.state
                    .engine
                    .promote_version(&ctx.bucket, key, vid)
                    .await?;
            }
        }
        _ => {
            ctx.state.engine.delete_object(&ctx.bucket, key).await?;
        }
    }
    Ok(())
}

/// `POST /<bucket>?delete`: batch delete.
pub async fn delete_objects(ctx: &ReqCtx) -> S3Result<Response> {
    let info = ctx.require_bucket()?;
    let request: DeleteRequest = parse_xml(&ctx.body)?;

    let mut deleted = Vec::new();
    let mut errors = Vec::new();
    for target in request.objects {
        match delete_one(ctx, &info, &target.key, target.version_id.as_deref()).await {
            Ok(entry) => deleted.push(entry),
            Err(e) => errors.push(xml::DeleteErrorEntry {
                key: target.key,
                code: e.0.s3_error_code().to_string(),
                message: e.0.to_string(),
            }),
        }
    }
    if request.quiet {
        deleted.clear();
    }

    ctx.audit("s3:DeleteObject", 200);
    Ok(xml_response(&DeleteResult::new(deleted, errors)))
}

// ── Tagging / retention / legal hold / attributes ─────────────────────────────

fn load_meta(ctx: &ReqCtx, key: &str) -> S3Result<ObjectMeta> {
    let rtx = ctx.state.read()?;
    match ctx.query_value("versionId") {
        Some(vid) => object_store::get_version(&rtx, &ctx.bucket, key, vid)?.ok_or(S3Error(
            Error::NoSuchVersion {
                version_id: vid.to_string(),
            },
        )),
        None => object_store::get_object(&rtx, &ctx.bucket, key)?
            .filter(|m| !m.delete_marker)
            .ok_or_else(|| {
                S3Error(Error::ObjectNotFound {
                    bucket: ctx.bucket.clone(),
                    key: key.to_string(),
                })
            }),
    }
}

/// `GET /<bucket>/<key>?tagging`
pub async fn get_object_tagging(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    let meta = load_meta(ctx, ctx.require_key()?)?;
    Ok(xml_response(&Tagging::from_map(&meta.tags)))
}

/// `PUT /<bucket>/<key>?tagging`
pub async fn put_object_tagging(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    let key = ctx.require_key()?.to_string();
    load_meta(ctx, &key)?;
    let tagging: Tagging = parse_xml(&ctx.body)?;

    ctx.submit(Command::PutObjectTags(ObjectTagsPayload {
        bucket: ctx.bucket.clone(),
        key,
        version_id: ctx.query_value("versionId").map(str::to_string),
        tags: tagging.into_map(),
    }))
    .await?;
    Ok(StatusCode::OK.into_response())
}

/// `DELETE /<bucket>/<key>?tagging`
pub async fn delete_object_tagging(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    let key = ctx.require_key()?.to_string();
    ctx.submit(Command::PutObjectTags(ObjectTagsPayload {
        bucket: ctx.bucket.clone(),
        key,
        version_id: ctx.query_value("versionId").map(str::to_string),
        tags: HashMap::new(),
    }))
    .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `GET /<bucket>/<key>?legal-hold`
pub async fn get_legal_hold(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    let meta = load_meta(ctx, ctx.require_key()?)?;
    Ok(xml_response(&LegalHold::new(meta.legal_hold)))
}

/// `PUT /<bucket>/<key>?legal-hold`
pub async fn put_legal_hold(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    let key = ctx.require_key()?.to_string();
    load_meta(ctx, &key)?;
    let hold: LegalHold = parse_xml(&ctx.body)?;
    let on = match hold.status.as_str() {
        "ON" => true,
        "OFF" => false,
        _ => return Err(S3Error(Error::MalformedXml)),
    };

    ctx.submit(Command::SetObjectLegalHold(LegalHoldPayload {
        bucket: ctx.bucket.clone(),
        key,
        version_id: ctx.query_value("versionId").map(str::to_string),
        legal_hold: on,
    }))
    .await?;
    Ok(StatusCode::OK.into_response())
}

/// `GET /<bucket>/<key>?retention`
pub async fn get_retention(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    let meta = load_meta(ctx, ctx.require_key()?)?;
    let Some(mode) = meta.retention_mode else {
        return Ok(S3Error::xml_response(
            "NoSuchObjectLockConfiguration",
            "The specified object does not have an ObjectLock configuration",
            StatusCode::NOT_FOUND,
        ));
    };
    Ok(xml_response(&Retention {
        xmlns: xml::S3_XMLNS.to_string(),
        mode: mode.as_str().to_string(),
        retain_until_date: chrono::DateTime::from_timestamp(meta.retention_until, 0)
            .unwrap_or_default()
            .to_rfc3339(),
    }))
}

/// `PUT /<bucket>/<key>?retention`
pub async fn put_retention(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    let key = ctx.require_key()?.to_string();
    let meta = load_meta(ctx, &key)?;

    let retention: Retention = parse_xml(&ctx.body)?;
    let mode = RetentionMode::parse(&retention.mode).ok_or(S3Error(Error::MalformedXml))?;
    let until = chrono::DateTime::parse_from_rfc3339(&retention.retain_until_date)
        .map_err(|_| S3Error(Error::MalformedXml))?
        .timestamp();

    lock::check_retention_change(
        &meta,
        Some(mode),
        until,
        utils::now_unix(),
        bypass_governance(ctx),
    )
    .map_err(S3Error)?;

    ctx.submit(Command::SetObjectRetention(RetentionPayload {
        bucket: ctx.bucket.clone(),
        key,
        version_id: ctx.query_value("versionId").map(str::to_string),
        mode: Some(mode),
        retain_until: until,
    }))
    .await?;
    Ok(StatusCode::OK.into_response())
}

/// `GET /<bucket>/<key>?attributes`
pub async fn get_object_attributes(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    let meta = load_meta(ctx, ctx.require_key()?)?;
    let storage_class = match meta.storage_tier {
        StorageTier::Hot => "STANDARD",
        StorageTier::Cold => "GLACIER",
    };
    Ok(xml_response(&GetObjectAttributesOutput::new(
        meta.etag.trim_matches('"').to_string(),
        meta.size,
        storage_class.to_string(),
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_copy_source() {
        assert_eq!(
            parse_copy_source("/src-bucket/dir/key.txt").unwrap(),
            ("src-bucket".into(), "dir/key.txt".into(), None)
        );
        assert_eq!(
            parse_copy_source("src-bucket/key?versionId=v7").unwrap(),
            ("src-bucket".into(), "key".into(), Some("v7".into()))
        );
        // One unescape pass.
        assert_eq!(
            parse_copy_source("/b/a%20file").unwrap(),
            ("b".into(), "a file".into(), None)
        );
    }

    #[test]
    fn test_parse_copy_source_rejects_traversal() {
        assert!(parse_copy_source("/b/../etc/passwd").is_err());
        assert!(parse_copy_source("/b/%2e%2e/escape").is_err());
        assert!(parse_copy_source("/bucket-only").is_err());
        assert!(parse_copy_source("").is_err());
    }
}
