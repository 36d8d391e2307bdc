//! S3 XML bodies: response documents and request-body parsing.
//!
//! Responses are serialized with quick-xml into the S3 namespace with a
//! leading `<?xml?>` declaration. Request bodies (CompleteMultipartUpload,
//! Delete, VersioningConfiguration, ...) deserialize through the same
//! structs; parse failures surface as `MalformedXML`.

use axum::http::header;
use axum::response::{IntoResponse, Response};
use objvault_common::Error;
use serde::{Deserialize, Serialize};

pub const S3_XMLNS: &str = "http://s3.amazonaws.com/doc/2006-03-01/";
const XML_DECL: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";

fn xmlns() -> String {
    S3_XMLNS.to_string()
}

/// Serialize a document and wrap it in a 200 XML response.
pub fn xml_response<T: Serialize>(value: &T) -> Response {
    match quick_xml::se::to_string(value) {
        Ok(body) => (
            [(header::CONTENT_TYPE, "application/xml")],
            format!("{XML_DECL}{body}"),
        )
            .into_response(),
        Err(e) => crate::error::S3Error(Error::Internal(format!("serialize response: {e}")))
            .into_response(),
    }
}

/// Parse an XML request body, mapping failures to `MalformedXML`.
pub fn parse_xml<T: for<'de> Deserialize<'de>>(body: &[u8]) -> Result<T, Error> {
    let text = std::str::from_utf8(body).map_err(|_| Error::MalformedXml)?;
    quick_xml::de::from_str(text).map_err(|_| Error::MalformedXml)
}

/// Format a unix-seconds timestamp as the ISO8601 form S3 uses in XML.
#[must_use]
pub fn iso8601(unix_secs: i64) -> String {
    chrono::DateTime::from_timestamp(unix_secs, 0)
        .unwrap_or_default()
        .format("%Y-%m-%dT%H:%M:%S%.3fZ")
        .to_string()
}

// ── Service / bucket listings ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename = "ListAllMyBucketsResult")]
pub struct ListAllMyBucketsResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,
    #[serde(rename = "Owner")]
    pub owner: Owner,
    #[serde(rename = "Buckets")]
    pub buckets: Buckets,
}

impl ListAllMyBucketsResult {
    #[must_use]
    pub fn new(owner: Owner, buckets: Vec<BucketEntry>) -> Self {
        Self {
            xmlns: xmlns(),
            owner,
            buckets: Buckets { bucket: buckets },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Owner {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "DisplayName")]
    pub display_name: String,
}

#[derive(Debug, Serialize)]
pub struct Buckets {
    #[serde(rename = "Bucket")]
    pub bucket: Vec<BucketEntry>,
}

#[derive(Debug, Serialize)]
pub struct BucketEntry {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "CreationDate")]
    pub creation_date: String,
}

#[derive(Debug, Serialize)]
#[serde(rename = "ListBucketResult")]
pub struct ListBucketResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Prefix")]
    pub prefix: String,
    #[serde(rename = "Delimiter", skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    #[serde(rename = "Marker", skip_serializing_if = "Option::is_none")]
    pub marker: Option<String>,
    #[serde(rename = "KeyCount", skip_serializing_if = "Option::is_none")]
    pub key_count: Option<u64>,
    #[serde(rename = "MaxKeys")]
    pub max_keys: u64,
    #[serde(rename = "IsTruncated")]
    pub is_truncated: bool,
    #[serde(
        rename = "NextContinuationToken",
        skip_serializing_if = "Option::is_none"
    )]
    pub next_continuation_token: Option<String>,
    #[serde(rename = "Contents")]
    pub contents: Vec<ObjectEntry>,
    #[serde(rename = "CommonPrefixes")]
    pub common_prefixes: Vec<CommonPrefix>,
}

#[derive(Debug, Serialize)]
pub struct ObjectEntry {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "LastModified")]
    pub last_modified: String,
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "Size")]
    pub size: u64,
    #[serde(rename = "StorageClass")]
    pub storage_class: String,
}

#[derive(Debug, Serialize)]
pub struct CommonPrefix {
    #[serde(rename = "Prefix")]
    pub prefix: String,
}

#[derive(Debug, Serialize)]
#[serde(rename = "ListVersionsResult")]
pub struct ListVersionsResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Prefix")]
    pub prefix: String,
    #[serde(rename = "MaxKeys")]
    pub max_keys: u64,
    #[serde(rename = "IsTruncated")]
    pub is_truncated: bool,
    #[serde(rename = "Version")]
    pub versions: Vec<VersionEntry>,
    #[serde(rename = "DeleteMarker")]
    pub delete_markers: Vec<DeleteMarkerEntry>,
}

#[derive(Debug, Serialize)]
pub struct VersionEntry {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "VersionId")]
    pub version_id: String,
    #[serde(rename = "IsLatest")]
    pub is_latest: bool,
    #[serde(rename = "LastModified")]
    pub last_modified: String,
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "Size")]
    pub size: u64,
}

#[derive(Debug, Serialize)]
pub struct DeleteMarkerEntry {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "VersionId")]
    pub version_id: String,
    #[serde(rename = "IsLatest")]
    pub is_latest: bool,
    #[serde(rename = "LastModified")]
    pub last_modified: String,
}

// ── Multipart ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename = "InitiateMultipartUploadResult")]
pub struct InitiateMultipartUploadResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "UploadId")]
    pub upload_id: String,
}

impl InitiateMultipartUploadResult {
    #[must_use]
    pub fn new(bucket: String, key: String, upload_id: String) -> Self {
        Self {
            xmlns: xmlns(),
            bucket,
            key,
            upload_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename = "CompleteMultipartUploadResult")]
pub struct CompleteMultipartUploadResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,
    #[serde(rename = "Location")]
    pub location: String,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "ETag")]
    pub etag: String,
}

#[derive(Debug, Serialize)]
#[serde(rename = "ListMultipartUploadsResult")]
pub struct ListMultipartUploadsResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "IsTruncated")]
    pub is_truncated: bool,
    #[serde(rename = "Upload")]
    pub uploads: Vec<UploadEntry>,
}

#[derive(Debug, Serialize)]
pub struct UploadEntry {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "UploadId")]
    pub upload_id: String,
    #[serde(rename = "Initiated")]
    pub initiated: String,
}

#[derive(Debug, Serialize)]
#[serde(rename = "ListPartsResult")]
pub struct ListPartsResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,
    #[serde(rename = "Bucket")]
    pub bucket: String,
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "UploadId")]
    pub upload_id: String,
    #[serde(rename = "IsTruncated")]
    pub is_truncated: bool,
    #[serde(rename = "Part")]
    pub parts: Vec<PartEntry>,
}

#[derive(Debug, Serialize)]
pub struct PartEntry {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "Size")]
    pub size: u64,
}

/// `CompleteMultipartUpload` request body
#[derive(Debug, Deserialize)]
pub struct CompleteMultipartUpload {
    #[serde(rename = "Part", default)]
    pub parts: Vec<CompletePart>,
}

#[derive(Debug, Deserialize)]
pub struct CompletePart {
    #[serde(rename = "PartNumber")]
    pub part_number: u32,
    #[serde(rename = "ETag")]
    pub etag: String,
}

// ── Copy ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename = "CopyObjectResult")]
pub struct CopyObjectResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "LastModified")]
    pub last_modified: String,
}

impl CopyObjectResult {
    #[must_use]
    pub fn new(etag: String, last_modified: i64) -> Self {
        Self {
            xmlns: xmlns(),
            etag,
            last_modified: iso8601(last_modified),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename = "CopyPartResult")]
pub struct CopyPartResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,
    #[serde(rename = "ETag")]
    pub etag: String,
}

// ── Batch delete ──────────────────────────────────────────────────────────────

/// `Delete` request body (`POST /<bucket>?delete`)
#[derive(Debug, Deserialize)]
pub struct DeleteRequest {
    #[serde(rename = "Object", default)]
    pub objects: Vec<DeleteTarget>,
    #[serde(rename = "Quiet", default)]
    pub quiet: bool,
}

#[derive(Debug, Deserialize)]
pub struct DeleteTarget {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "VersionId", default)]
    pub version_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename = "DeleteResult")]
pub struct DeleteResult {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,
    #[serde(rename = "Deleted")]
    pub deleted: Vec<DeletedEntry>,
    #[serde(rename = "Error")]
    pub errors: Vec<DeleteErrorEntry>,
}

impl DeleteResult {
    #[must_use]
    pub fn new(deleted: Vec<DeletedEntry>, errors: Vec<DeleteErrorEntry>) -> Self {
        Self {
            xmlns: xmlns(),
            deleted,
            errors,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeletedEntry {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "VersionId", skip_serializing_if = "Option::is_none")]
    pub version_id: Option<String>,
    #[serde(rename = "DeleteMarker", skip_serializing_if = "Option::is_none")]
    pub delete_marker: Option<bool>,
}

#[derive(Debug, Serialize)]
pub struct DeleteErrorEntry {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Code")]
    pub code: String,
    #[serde(rename = "Message")]
    pub message: String,
}

// ── Bucket configuration ──────────────────────────────────────────────────────

/// `VersioningConfiguration`, request and response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "VersioningConfiguration")]
pub struct VersioningConfiguration {
    #[serde(rename = "@xmlns", skip_deserializing, default = "xmlns")]
    pub xmlns: String,
    #[serde(rename = "Status", default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename = "LocationConstraint")]
pub struct LocationConstraint {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,
    #[serde(rename = "$text")]
    pub region: String,
}

impl LocationConstraint {
    #[must_use]
    pub fn new(region: String) -> Self {
        Self {
            xmlns: xmlns(),
            region,
        }
    }
}

/// `Tagging`, request and response
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "Tagging")]
pub struct Tagging {
    #[serde(rename = "@xmlns", skip_deserializing, default = "xmlns")]
    pub xmlns: String,
    #[serde(rename = "TagSet")]
    pub tag_set: TagSet,
}

impl Tagging {
    #[must_use]
    pub fn from_map(tags: &std::collections::HashMap<String, String>) -> Self {
        let mut tag: Vec<Tag> = tags
            .iter()
            .map(|(k, v)| Tag {
                key: k.clone(),
                value: v.clone(),
            })
            .collect();
        tag.sort_by(|a, b| a.key.cmp(&b.key));
        Self {
            xmlns: xmlns(),
            tag_set: TagSet { tag },
        }
    }

    #[must_use]
    pub fn into_map(self) -> std::collections::HashMap<String, String> {
        self.tag_set
            .tag
            .into_iter()
            .map(|t| (t.key, t.value))
            .collect()
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TagSet {
    #[serde(rename = "Tag", default)]
    pub tag: Vec<Tag>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Tag {
    #[serde(rename = "Key")]
    pub key: String,
    #[serde(rename = "Value")]
    pub value: String,
}

// ── Object lock ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "LegalHold")]
pub struct LegalHold {
    #[serde(rename = "@xmlns", skip_deserializing, default = "xmlns")]
    pub xmlns: String,
    #[serde(rename = "Status")]
    pub status: String,
}

impl LegalHold {
    #[must_use]
    pub fn new(on: bool) -> Self {
        Self {
            xmlns: xmlns(),
            status: if on { "ON" } else { "OFF" }.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "Retention")]
pub struct Retention {
    #[serde(rename = "@xmlns", skip_deserializing, default = "xmlns")]
    pub xmlns: String,
    #[serde(rename = "Mode")]
    pub mode: String,
    #[serde(rename = "RetainUntilDate")]
    pub retain_until_date: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename = "ObjectLockConfiguration")]
pub struct ObjectLockConfiguration {
    #[serde(rename = "@xmlns", skip_deserializing, default = "xmlns")]
    pub xmlns: String,
    #[serde(
        rename = "ObjectLockEnabled",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub object_lock_enabled: Option<String>,
    #[serde(rename = "Rule", default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<ObjectLockRule>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ObjectLockRule {
    #[serde(rename = "DefaultRetention")]
    pub default_retention: DefaultRetentionXml,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DefaultRetentionXml {
    #[serde(rename = "Mode")]
    pub mode: String,
    #[serde(rename = "Days", default, skip_serializing_if = "Option::is_none")]
    pub days: Option<u32>,
    #[serde(rename = "Years", default, skip_serializing_if = "Option::is_none")]
    pub years: Option<u32>,
}

// ── Object attributes ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename = "GetObjectAttributesOutput")]
pub struct GetObjectAttributesOutput {
    #[serde(rename = "@xmlns")]
    pub xmlns: String,
    #[serde(rename = "ETag")]
    pub etag: String,
    #[serde(rename = "ObjectSize")]
    pub object_size: u64,
    #[serde(rename = "StorageClass")]
    pub storage_class: String,
}

impl GetObjectAttributesOutput {
    #[must_use]
    pub fn new(etag: String, object_size: u64, storage_class: String) -> Self {
        Self {
            xmlns: xmlns(),
            etag,
            object_size,
            storage_class,
        }
    }
}
