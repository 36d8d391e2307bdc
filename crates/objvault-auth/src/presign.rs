//! AWS SigV4 presigned URL generation
//!
//! Generates pre-signed GET URLs for objects. The URLs are verified by the
//! same SigV4 verifier that handles header-mode requests.
//!
//! Reference: https://docs.aws.amazon.com/AmazonS3/latest/API/sigv4-query-string-auth.html

use crate::sigv4::{derive_signing_key, hex_sha256, hmac_sha256, uri_encode};
use chrono::Utc;
use std::time::Duration;

/// Generate a presigned S3 GET URL.
///
/// # Arguments
/// - `endpoint` — base URL of the server (e.g. `http://localhost:9000`)
/// - `region` — region string used in the credential scope
/// - `access_key_id` / `secret_access_key` — signing credentials
/// - `bucket` / `key` — target object
/// - `expires_in` — validity window, clamped by the verifier to 7 days
///
/// The returned URL can be fetched with a plain HTTP GET and no headers.
pub fn presign_get(
    endpoint: &str,
    region: &str,
    access_key_id: &str,
    secret_access_key: &str,
    bucket: &str,
    key: &str,
    expires_in: Duration,
) -> String {
    let now = Utc::now();
    let date_str = now.format("%Y%m%d").to_string();
    let datetime_str = now.format("%Y%m%dT%H%M%SZ").to_string();
    let expires_secs = expires_in.as_secs();

    let credential_scope = format!("{date_str}/{region}/s3/aws4_request");
    let credential = format!("{access_key_id}/{credential_scope}");

    let host = endpoint
        .trim_start_matches("https://")
        .trim_start_matches("http://");

    // Canonical query string (parameters in sorted order)
    let canonical_qs = format!(
        "X-Amz-Algorithm=AWS4-HMAC-SHA256\
         &X-Amz-Credential={cred}\
         &X-Amz-Date={dt}\
         &X-Amz-Expires={exp}\
         &X-Amz-SignedHeaders=host",
        cred = uri_encode(&credential),
        dt = datetime_str,
        exp = expires_secs,
    );

    // Canonical URI: /{bucket}/{key}, each segment percent-encoded
    let canonical_uri = format!(
        "/{}/{}",
        uri_encode(bucket),
        key.split('/').map(uri_encode).collect::<Vec<_>>().join("/")
    );

    let canonical_request = format!(
        "GET\n{canonical_uri}\n{canonical_qs}\nhost:{host}\n\nhost\nUNSIGNED-PAYLOAD"
    );

    let string_to_sign = format!(
        "AWS4-HMAC-SHA256\n{datetime_str}\n{credential_scope}\n{}",
        hex_sha256(canonical_request.as_bytes())
    );

    let signing_key = derive_signing_key(secret_access_key, &date_str, region, "s3");
    let signature = hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

    format!(
        "{endpoint}{canonical_uri}?{canonical_qs}&X-Amz-Signature={signature}",
        endpoint = endpoint.trim_end_matches('/'),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presign_produces_valid_url() {
        let url = presign_get(
            "http://localhost:9000",
            "us-east-1",
            "AKID",
            "secret",
            "my-bucket",
            "path/to/file.parquet",
            Duration::from_secs(3600),
        );
        assert!(url.starts_with("http://localhost:9000/my-bucket/path/to/file.parquet"));
        assert!(url.contains("X-Amz-Algorithm=AWS4-HMAC-SHA256"));
        assert!(url.contains("X-Amz-Signature="));
        assert!(url.contains("X-Amz-Expires=3600"));
    }

    #[test]
    fn test_presign_encodes_key_segments() {
        let url = presign_get(
            "http://localhost:9000",
            "us-east-1",
            "AKID",
            "secret",
            "b",
            "dir with space/x.txt",
            Duration::from_secs(60),
        );
        assert!(url.contains("/b/dir%20with%20space/x.txt"));
    }
}
