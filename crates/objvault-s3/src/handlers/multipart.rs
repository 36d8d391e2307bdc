//! Multipart upload handlers: Initiate, UploadPart, UploadPartCopy,
//! Complete, Abort, and the part/upload listings.
//!
//! Part bytes stage under a per-upload directory on the engine; Complete is
//! the linearization point where the composed object becomes visible.

use super::object::{parse_copy_source, WriteRequest};
use super::ReqCtx;
use crate::error::{S3Error, S3Result};
use crate::utils;
use crate::xml::{
    self, parse_xml, xml_response, CompleteMultipartUpload, CompleteMultipartUploadResult,
    CopyPartResult, InitiateMultipartUploadResult, ListMultipartUploadsResult, ListPartsResult,
    PartEntry, UploadEntry,
};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use objvault_common::checksum;
use objvault_common::types::{MultipartUpload, ObjectMeta, PartInfo, VersioningStatus};
use objvault_common::Error;
use objvault_raft::codec::PutPartPayload;
use objvault_raft::Command;
use objvault_store::object as object_store;
use tracing::debug;

const MAX_PART_NUMBER: u32 = 10_000;

/// `POST /<bucket>/<key>?uploads`: initiate.
pub async fn initiate(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    let key = ctx.require_key()?.to_string();

    let upload = MultipartUpload {
        upload_id: utils::generate_upload_id(),
        bucket: ctx.bucket.clone(),
        key: key.clone(),
        content_type: utils::resolve_content_type(&ctx.headers, &key),
        created_at: utils::now_unix(),
        user_metadata: utils::extract_user_metadata(&ctx.headers),
    };

    ctx.state.engine.create_upload_dir(&upload.upload_id).await?;
    ctx.submit(Command::CreateMultipartUpload(upload.clone())).await?;

    debug!(bucket = %ctx.bucket, key = %key, upload_id = %upload.upload_id, "initiated multipart upload");
    Ok(xml_response(&InitiateMultipartUploadResult::new(
        ctx.bucket.clone(),
        key,
        upload.upload_id,
    )))
}

fn require_upload(ctx: &ReqCtx, upload_id: &str) -> S3Result<MultipartUpload> {
    let rtx = ctx.state.read()?;
    object_store::get_upload(&rtx, upload_id)?
        .filter(|u| u.bucket == ctx.bucket)
        .ok_or(S3Error(Error::NoSuchUpload {
            upload_id: upload_id.to_string(),
        }))
}

fn parse_part_number(ctx: &ReqCtx) -> S3Result<u32> {
    let n: u32 = ctx
        .query_value("partNumber")
        .and_then(|v| v.parse().ok())
        .ok_or_else(|| S3Error::invalid_argument("invalid partNumber"))?;
    if n == 0 || n > MAX_PART_NUMBER {
        return Err(S3Error::invalid_argument(format!(
            "partNumber must be in [1, {MAX_PART_NUMBER}], got {n}"
        )));
    }
    Ok(n)
}

/// `PUT /<bucket>/<key>?partNumber=N&uploadId=U`: upload or copy a part.
pub async fn upload_part(ctx: &ReqCtx, upload_id: &str) -> S3Result<Response> {
    ctx.require_bucket()?;
    require_upload(ctx, upload_id)?;
    let part_number = parse_part_number(ctx)?;

    let is_copy = ctx.header("x-amz-copy-source").is_some();
    let body = if is_copy {
        copy_source_bytes(ctx).await?
    } else {
        ctx.body.clone()
    };

    let max = ctx.state.config.limits.max_part_size;
    if body.len() as u64 > max {
        return Err(S3Error(Error::EntityTooLarge { max_size: max }));
    }

    let etag = checksum::etag(&body);
    let size = body.len() as u64;
    ctx.state
        .engine
        .put_part_file(upload_id, part_number, body)
        .await?;
    ctx.submit(Command::PutPart(PutPartPayload {
        upload_id: upload_id.to_string(),
        part: PartInfo {
            part_number,
            etag: etag.clone(),
            size,
        },
    }))
    .await?;

    if is_copy {
        Ok(xml_response(&CopyPartResult {
            xmlns: xml::S3_XMLNS.to_string(),
            etag,
        }))
    } else {
        let mut response = StatusCode::OK.into_response();
        if let Ok(value) = etag.parse() {
            response.headers_mut().insert(header::ETAG, value);
        }
        Ok(response)
    }
}

/// Resolve the bytes for UploadPartCopy, honoring
/// `x-amz-copy-source-range: bytes=start-end`.
async fn copy_source_bytes(ctx: &ReqCtx) -> S3Result<Bytes> {
    let raw = ctx.header("x-amz-copy-source").unwrap_or_default();
    let (src_bucket, src_key, src_version) = parse_copy_source(raw)?;

    let source = {
        let rtx = ctx.state.read()?;
        match &src_version {
            Some(vid) => object_store::get_version(&rtx, &src_bucket, &src_key, vid)?,
            None => object_store::get_object(&rtx, &src_bucket, &src_key)?,
        }
        .filter(|m| !m.delete_marker)
        .ok_or_else(|| S3Error(Error::ObjectNotFound {
            bucket: src_bucket.clone(),
            key: src_key.clone(),
        }))?
    };

    let window = match ctx.header("x-amz-copy-source-range") {
        Some(range_header) => {
            let range = crate::range::parse_range_header(range_header, source.size)
                .ok_or(S3Error(Error::InvalidRange))?;
            Some((range.start, range.end))
        }
        None => None,
    };
    super::object::read_object_bytes(ctx, &source, window).await
}

/// `POST /<bucket>/<key>?uploadId=U`: complete.
pub async fn complete(ctx: &ReqCtx) -> S3Result<Response> {
    let info = ctx.require_bucket()?;
    let key = ctx.require_key()?.to_string();
    let upload_id = ctx
        .query_value("uploadId")
        .ok_or_else(|| S3Error::invalid_argument("missing uploadId"))?
        .to_string();
    let upload = require_upload(ctx, &upload_id)?;

    let request: CompleteMultipartUpload = parse_xml(&ctx.body)?;
    if request.parts.is_empty() {
        return Err(S3Error(Error::MalformedXml));
    }
    let mut requested = request.parts;
    requested.sort_by_key(|p| p.part_number);
    if requested.windows(2).any(|w| w[0].part_number == w[1].part_number) {
        return Err(S3Error(Error::InvalidPartOrder));
    }

    // Every referenced part must exist with a matching ETag.
    let stored = {
        let rtx = ctx.state.read()?;
        object_store::list_parts(&rtx, &upload_id)?
    };
    let mut ordered: Vec<PartInfo> = Vec::with_capacity(requested.len());
    for want in &requested {
        let part = stored
            .iter()
            .find(|p| p.part_number == want.part_number)
            .ok_or(S3Error(Error::InvalidPart {
                part_number: want.part_number,
            }))?;
        if !crate::conditions::etag_matches(&want.etag, &part.etag) {
            return Err(S3Error(Error::InvalidPart {
                part_number: want.part_number,
            }));
        }
        ordered.push(part.clone());
    }

    let part_numbers: Vec<u32> = ordered.iter().map(|p| p.part_number).collect();
    let version_id = match info.versioning {
        VersioningStatus::Enabled => Some(utils::generate_version_id()),
        VersioningStatus::Suspended => Some("null".to_string()),
        VersioningStatus::Unversioned => None,
    };

    let total = match ctx
        .state
        .engine
        .compose_parts(
            &upload_id,
            &part_numbers,
            &ctx.bucket,
            &key,
            version_id.as_deref(),
        )
        .await
    {
        Ok(total) => total,
        Err(objvault_engine::EngineError::NotFound) => {
            return Err(S3Error(Error::InvalidPart {
                part_number: part_numbers[0],
            }));
        }
        Err(e) => return Err(e.into()),
    };
    if let Some(vid) = version_id.as_deref() {
        ctx.state.engine.promote_version(&ctx.bucket, &key, vid).await?;
    }

    let etag = checksum::multipart_etag(
        &ordered.iter().map(|p| p.etag.as_str()).collect::<Vec<_>>(),
    );
    let mut boundaries = Vec::with_capacity(ordered.len());
    let mut offset = 0u64;
    for part in &ordered {
        offset += part.size;
        boundaries.push(offset);
    }
    debug_assert_eq!(offset, total);

    let meta = ObjectMeta {
        bucket: ctx.bucket.clone(),
        key: key.clone(),
        content_type: upload.content_type.clone(),
        etag: etag.clone(),
        size: total,
        last_modified: utils::now_unix(),
        user_metadata: upload.user_metadata.clone(),
        version_id: version_id.clone(),
        is_latest: version_id.is_some(),
        parts_count: ordered.len() as u32,
        part_boundaries: boundaries,
        ..Default::default()
    };

    let command = if version_id.is_some() {
        Command::PutObjectVersion(Box::new(meta.clone()))
    } else {
        Command::PutObjectMeta(Box::new(meta.clone()))
    };
    if let Err(e) = ctx.submit(command).await {
        // The composed object must not outlive a failed metadata commit.
        let _ = ctx.state.engine.delete_object(&ctx.bucket, &key).await;
        if let Some(vid) = version_id.as_deref() {
            let _ = ctx
                .state
                .engine
                .delete_object_version(&ctx.bucket, &key, vid)
                .await;
        }
        return Err(e);
    }

    ctx.state.engine.delete_upload_dir(&upload_id).await?;
    ctx.submit(Command::DeleteMultipartUpload {
        upload_id: upload_id.clone(),
    })
    .await?;

    ctx.state.hooks.fire(crate::events::ObjectEvent::Created {
        bucket: ctx.bucket.clone(),
        key: key.clone(),
        version_id: meta.version_id.clone(),
        size: total,
    });
    ctx.audit("s3:PutObject", 200);

    let mut response = xml_response(&CompleteMultipartUploadResult {
        xmlns: xml::S3_XMLNS.to_string(),
        location: format!("/{}/{key}", ctx.bucket),
        bucket: ctx.bucket.clone(),
        key,
        etag,
    });
    if let Some(vid) = meta.reported_version_id() {
        if let Ok(value) = vid.parse() {
            response.headers_mut().insert("x-amz-version-id", value);
        }
    }
    Ok(response)
}

/// `DELETE /<bucket>/<key>?uploadId=U`: abort.
pub async fn abort(ctx: &ReqCtx, upload_id: &str) -> S3Result<Response> {
    ctx.require_bucket()?;
    require_upload(ctx, upload_id)?;

    ctx.state.engine.delete_upload_dir(upload_id).await?;
    ctx.submit(Command::DeleteMultipartUpload {
        upload_id: upload_id.to_string(),
    })
    .await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `GET /<bucket>/<key>?uploadId=U`: list parts.
pub async fn list_parts(ctx: &ReqCtx, upload_id: &str) -> S3Result<Response> {
    ctx.require_bucket()?;
    let upload = require_upload(ctx, upload_id)?;

    let parts = {
        let rtx = ctx.state.read()?;
        object_store::list_parts(&rtx, upload_id)?
    };
    Ok(xml_response(&ListPartsResult {
        xmlns: xml::S3_XMLNS.to_string(),
        bucket: ctx.bucket.clone(),
        key: upload.key,
        upload_id: upload_id.to_string(),
        is_truncated: false,
        parts: parts
            .into_iter()
            .map(|p| PartEntry {
                part_number: p.part_number,
                etag: p.etag,
                size: p.size,
            })
            .collect(),
    }))
}

/// `GET /<bucket>?uploads`: list in-progress uploads.
pub async fn list_uploads(ctx: &ReqCtx) -> S3Result<Response> {
    ctx.require_bucket()?;
    let uploads = {
        let rtx = ctx.state.read()?;
        object_store::list_uploads(&rtx, &ctx.bucket)?
    };
    Ok(xml_response(&ListMultipartUploadsResult {
        xmlns: xml::S3_XMLNS.to_string(),
        bucket: ctx.bucket.clone(),
        is_truncated: false,
        uploads: uploads
            .into_iter()
            .map(|u| UploadEntry {
                key: u.key,
                upload_id: u.upload_id,
                initiated: xml::iso8601(u.created_at),
            })
            .collect(),
    }))
}
