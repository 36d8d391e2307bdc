//! Small helpers shared by the handlers.

use axum::http::HeaderMap;
use std::collections::HashMap;

/// Generate a version id: hex nanos concatenated with 64 random bits, so ids
/// sort roughly by creation time while staying unguessable.
#[must_use]
pub fn generate_version_id() -> String {
    let nanos = chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .unsigned_abs();
    format!("{nanos:016x}{:016x}", rand::random::<u64>())
}

/// Generate a multipart upload id: 16 random bytes, hex encoded.
#[must_use]
pub fn generate_upload_id() -> String {
    let bytes: [u8; 16] = rand::random();
    hex::encode(bytes)
}

/// Resolve an object's content type: the `Content-Type` header, else by
/// extension, else `application/octet-stream`.
#[must_use]
pub fn resolve_content_type(headers: &HeaderMap, key: &str) -> String {
    if let Some(ct) = headers.get("content-type").and_then(|v| v.to_str().ok()) {
        if !ct.is_empty() {
            return ct.to_string();
        }
    }
    content_type_by_extension(key).to_string()
}

/// Content type by file extension, for clients that send none.
#[must_use]
pub fn content_type_by_extension(key: &str) -> &'static str {
    let ext = key.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "xml" => "application/xml",
        "txt" | "log" => "text/plain",
        "csv" => "text/csv",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "webp" => "image/webp",
        "ico" => "image/x-icon",
        "mp4" => "video/mp4",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "zip" => "application/zip",
        "gz" => "application/gzip",
        "tar" => "application/x-tar",
        "parquet" => "application/vnd.apache.parquet",
        _ => "application/octet-stream",
    }
}

/// Collect `x-amz-meta-*` headers into the user-metadata map, prefix
/// stripped and names lowercased.
#[must_use]
pub fn extract_user_metadata(headers: &HeaderMap) -> HashMap<String, String> {
    let mut metadata = HashMap::new();
    for (name, value) in headers {
        let name = name.as_str();
        if let Some(key) = name.strip_prefix("x-amz-meta-") {
            if let Ok(value) = value.to_str() {
                metadata.insert(key.to_string(), value.to_string());
            }
        }
    }
    metadata
}

/// Current time, unix seconds.
#[must_use]
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Current time, unix nanoseconds.
#[must_use]
pub fn now_unix_nanos() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .unwrap_or_default()
        .unsigned_abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_version_ids_unique_and_ordered_prefix() {
        let a = generate_version_id();
        let b = generate_version_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 32);
        assert!(a.bytes().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_upload_id_shape() {
        let id = generate_upload_id();
        assert_eq!(id.len(), 32);
        assert!(id.bytes().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_content_type_resolution() {
        let mut headers = HeaderMap::new();
        assert_eq!(resolve_content_type(&headers, "a.json"), "application/json");
        assert_eq!(
            resolve_content_type(&headers, "no-extension"),
            "application/octet-stream"
        );
        headers.insert("content-type", HeaderValue::from_static("text/custom"));
        assert_eq!(resolve_content_type(&headers, "a.json"), "text/custom");
    }

    #[test]
    fn test_user_metadata_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert("x-amz-meta-owner", HeaderValue::from_static("alice"));
        headers.insert("content-type", HeaderValue::from_static("text/plain"));
        let meta = extract_user_metadata(&headers);
        assert_eq!(meta.len(), 1);
        assert_eq!(meta.get("owner").map(String::as_str), Some("alice"));
    }
}
