//! Conditional request evaluation for reads, writes, and copies.

use axum::http::HeaderMap;
use chrono::{DateTime, Utc};
use objvault_common::types::ObjectMeta;
use objvault_common::Error;

/// Format a unix-seconds timestamp as an HTTP date (IMF-fixdate).
#[must_use]
pub fn http_date(unix_secs: i64) -> String {
    DateTime::from_timestamp(unix_secs, 0)
        .unwrap_or_default()
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Parse an HTTP date header value to unix seconds.
#[must_use]
pub fn parse_http_date(value: &str) -> Option<i64> {
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.timestamp())
}

/// Does an `If-Match` / `If-None-Match` header value cover this ETag?
/// Handles `*`, comma-separated lists, and missing quotes.
#[must_use]
pub fn etag_matches(header_value: &str, etag: &str) -> bool {
    let bare = etag.trim_matches('"');
    header_value.split(',').any(|candidate| {
        let candidate = candidate.trim();
        candidate == "*" || candidate.trim_matches('"') == bare
    })
}

/// Evaluate conditional GET/HEAD headers in the order S3 applies them:
/// `If-Match` (412), `If-None-Match` (304), `If-Modified-Since` (304),
/// `If-Unmodified-Since` (412).
pub fn check_read_conditions(
    headers: &HeaderMap,
    etag: &str,
    last_modified: i64,
) -> Result<(), Error> {
    if let Some(value) = header_str(headers, "if-match") {
        if !etag_matches(value, etag) {
            return Err(Error::PreconditionFailed("If-Match".into()));
        }
    }
    if let Some(value) = header_str(headers, "if-none-match") {
        if etag_matches(value, etag) {
            return Err(Error::NotModified);
        }
    }
    if let Some(since) = header_str(headers, "if-modified-since").and_then(parse_http_date) {
        if last_modified <= since {
            return Err(Error::NotModified);
        }
    }
    if let Some(until) = header_str(headers, "if-unmodified-since").and_then(parse_http_date) {
        if last_modified > until {
            return Err(Error::PreconditionFailed("If-Unmodified-Since".into()));
        }
    }
    Ok(())
}

/// Conditional PUT: `If-Match` requires the existing ETag to match;
/// `If-None-Match: *` requires the key to be absent.
pub fn check_write_conditions(
    headers: &HeaderMap,
    existing: Option<&ObjectMeta>,
) -> Result<(), Error> {
    if let Some(value) = header_str(headers, "if-match") {
        match existing {
            Some(meta) if etag_matches(value, &meta.etag) => {}
            _ => return Err(Error::PreconditionFailed("If-Match".into())),
        }
    }
    if let Some(value) = header_str(headers, "if-none-match") {
        if value.trim() == "*" && existing.is_some_and(|m| !m.delete_marker) {
            return Err(Error::PreconditionFailed("If-None-Match".into()));
        }
    }
    Ok(())
}

/// Copy-source preconditions (`x-amz-copy-source-if-*`).
pub fn check_copy_conditions(headers: &HeaderMap, source: &ObjectMeta) -> Result<(), Error> {
    if let Some(value) = header_str(headers, "x-amz-copy-source-if-match") {
        if !etag_matches(value, &source.etag) {
            return Err(Error::PreconditionFailed("x-amz-copy-source-if-match".into()));
        }
    }
    if let Some(value) = header_str(headers, "x-amz-copy-source-if-none-match") {
        if etag_matches(value, &source.etag) {
            return Err(Error::PreconditionFailed(
                "x-amz-copy-source-if-none-match".into(),
            ));
        }
    }
    if let Some(since) =
        header_str(headers, "x-amz-copy-source-if-modified-since").and_then(parse_http_date)
    {
        if source.last_modified <= since {
            return Err(Error::PreconditionFailed(
                "x-amz-copy-source-if-modified-since".into(),
            ));
        }
    }
    if let Some(until) =
        header_str(headers, "x-amz-copy-source-if-unmodified-since").and_then(parse_http_date)
    {
        if source.last_modified > until {
            return Err(Error::PreconditionFailed(
                "x-amz-copy-source-if-unmodified-since".into(),
            ));
        }
    }
    Ok(())
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
