//! AWS Signature V4 verification
//!
//! Implements AWS Signature Version 4 for authenticating S3 API requests,
//! in both Authorization-header and presigned-URL (query string) modes.
//! Both modes reconstruct the full canonical request and compare HMACs;
//! presigned URLs are never accepted on expiry checks alone.
//!
//! Reference: https://docs.aws.amazon.com/AmazonS3/latest/API/sig-v4-authenticating-requests.html

use crate::error::AuthError;
use crate::identity::{check_ip_policy, Identity};
use chrono::{DateTime, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use http::Request;
use objvault_common::types::AccessKey;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::net::IpAddr;
use std::sync::{Arc, OnceLock};
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// Maximum clock skew accepted in header mode
const MAX_SKEW_SECS: i64 = 15 * 60;
/// Presign expiry bounds, seconds
const MIN_PRESIGN_EXPIRES: i64 = 1;
const MAX_PRESIGN_EXPIRES: i64 = 604_800;

/// Credential backend the verifier resolves identities against.
pub trait CredentialProvider: Send + Sync {
    /// Fetch a stored access key record.
    fn lookup(&self, access_key: &str) -> Result<Option<AccessKey>, AuthError>;

    /// Raw policy documents effective for a user (own plus groups).
    fn user_policies(&self, user_id: &str) -> Result<Vec<String>, AuthError>;

    /// Extra allowed CIDRs attached to a user record.
    fn user_cidrs(&self, _user_id: &str) -> Result<Vec<String>, AuthError> {
        Ok(Vec::new())
    }
}

/// AWS Signature V4 verifier
pub struct SigV4Verifier {
    provider: Arc<dyn CredentialProvider>,
    region: String,
    admin_access_key: String,
    admin_secret_key: String,
    ip_allowlist: Vec<String>,
    ip_blocklist: Vec<String>,
}

impl SigV4Verifier {
    pub fn new(
        provider: Arc<dyn CredentialProvider>,
        region: impl Into<String>,
        admin_access_key: impl Into<String>,
        admin_secret_key: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            region: region.into(),
            admin_access_key: admin_access_key.into(),
            admin_secret_key: admin_secret_key.into(),
            ip_allowlist: Vec::new(),
            ip_blocklist: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_ip_policy(mut self, allowlist: Vec<String>, blocklist: Vec<String>) -> Self {
        self.ip_allowlist = allowlist;
        self.ip_blocklist = blocklist;
        self
    }

    /// Verify an incoming request and resolve its identity.
    pub fn verify<B>(
        &self,
        request: &Request<B>,
        source_ip: Option<IpAddr>,
    ) -> Result<Identity, AuthError> {
        let now = Utc::now();
        let query = parse_query(request.uri().query().unwrap_or(""));

        let identity = if let Some(auth_header) = request.headers().get("authorization") {
            let header = auth_header
                .to_str()
                .map_err(|_| AuthError::InvalidAuthHeader)?;
            self.verify_header_mode(request, header, &query, now)?
        } else if query.iter().any(|(k, _)| k == "X-Amz-Algorithm") {
            self.verify_presigned(request, &query, now)?
        } else {
            return Err(AuthError::MissingAuth);
        };

        check_ip_policy(&identity, source_ip, &self.ip_allowlist, &self.ip_blocklist)?;
        Ok(identity)
    }

    // ── Header mode ───────────────────────────────────────────────────────────

    fn verify_header_mode<B>(
        &self,
        request: &Request<B>,
        auth_header: &str,
        query: &[(String, String)],
        now: DateTime<Utc>,
    ) -> Result<Identity, AuthError> {
        let parsed = parse_authorization_header(auth_header)?;
        let (identity, secret) = self.resolve_identity(&parsed.access_key_id, now)?;

        let date_str = get_request_date(request)?;
        let date = parse_amz_date(&date_str)?;
        if (now - date).num_seconds().abs() > MAX_SKEW_SECS {
            return Err(AuthError::RequestTimeTooSkewed);
        }

        let payload_hash = request
            .headers()
            .get("x-amz-content-sha256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("UNSIGNED-PAYLOAD");

        let canonical_query = canonical_query_string(query, false);
        let canonical_request = build_canonical_request(
            request,
            &canonical_query,
            &parsed.signed_headers,
            payload_hash,
        )?;
        let expected = self.sign(&canonical_request, &date_str, &secret)?;

        if !constant_time_eq(&expected, &parsed.signature) {
            debug!("header-mode signature mismatch");
            return Err(AuthError::SignatureMismatch);
        }
        Ok(identity)
    }

    // ── Presigned mode ────────────────────────────────────────────────────────

    fn verify_presigned<B>(
        &self,
        request: &Request<B>,
        query: &[(String, String)],
        now: DateTime<Utc>,
    ) -> Result<Identity, AuthError> {
        let get = |name: &str| {
            query
                .iter()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.as_str())
        };

        if get("X-Amz-Algorithm") != Some("AWS4-HMAC-SHA256") {
            return Err(AuthError::InvalidAuthHeader);
        }
        let credential = get("X-Amz-Credential").ok_or(AuthError::InvalidAuthHeader)?;
        let access_key_id = credential
            .split('/')
            .next()
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::InvalidAuthHeader)?;
        let date_str = get("X-Amz-Date").ok_or(AuthError::InvalidDateFormat)?.to_string();
        let signature = get("X-Amz-Signature").ok_or(AuthError::InvalidAuthHeader)?.to_string();
        let signed_headers: Vec<String> = get("X-Amz-SignedHeaders")
            .ok_or(AuthError::InvalidAuthHeader)?
            .split(';')
            .map(str::to_lowercase)
            .collect();

        let (identity, secret) = self.resolve_identity(access_key_id, now)?;

        let expires: i64 = get("X-Amz-Expires")
            .ok_or_else(|| AuthError::InvalidExpires("missing X-Amz-Expires".into()))?
            .parse()
            .map_err(|_| AuthError::InvalidExpires("X-Amz-Expires is not a number".into()))?;
        if !(MIN_PRESIGN_EXPIRES..=MAX_PRESIGN_EXPIRES).contains(&expires) {
            return Err(AuthError::InvalidExpires(format!(
                "X-Amz-Expires must be in [{MIN_PRESIGN_EXPIRES}, {MAX_PRESIGN_EXPIRES}], got {expires}"
            )));
        }
        let date = parse_amz_date(&date_str)?;
        if (now - date).num_seconds() > expires {
            return Err(AuthError::PresignedUrlExpired);
        }

        // The signature parameter itself is excluded from the canonical query.
        let canonical_query = canonical_query_string(query, true);
        let canonical_request =
            build_canonical_request(request, &canonical_query, &signed_headers, "UNSIGNED-PAYLOAD")?;
        let expected = self.sign(&canonical_request, &date_str, &secret)?;

        if !constant_time_eq(&expected, &signature) {
            debug!("presigned signature mismatch");
            return Err(AuthError::SignatureMismatch);
        }
        Ok(identity)
    }

    // ── Identity resolution ───────────────────────────────────────────────────

    /// Resolve the access key to an identity plus its signing secret.
    fn resolve_identity(
        &self,
        access_key_id: &str,
        now: DateTime<Utc>,
    ) -> Result<(Identity, String), AuthError> {
        if access_key_id == self.admin_access_key {
            return Ok((Identity::Admin, self.admin_secret_key.clone()));
        }

        let record = self
            .provider
            .lookup(access_key_id)?
            .ok_or_else(|| AuthError::UnknownAccessKey(access_key_id.to_string()))?;
        if record.is_expired(now.timestamp()) {
            return Err(AuthError::CredentialsExpired);
        }

        // STS keys act as the user that minted them.
        let effective_user = record.source_user_id.clone().or_else(|| record.user_id.clone());
        let mut policies = Vec::new();
        let mut allowed_cidrs = record.allowed_cidrs.clone();
        if let Some(user_id) = &effective_user {
            policies = self.provider.user_policies(user_id)?;
            allowed_cidrs.extend(self.provider.user_cidrs(user_id)?);
        }

        let secret = record.secret_key.clone();
        Ok((
            Identity::User {
                access_key: record.access_key,
                user_id: effective_user,
                policies,
                allowed_cidrs,
            },
            secret,
        ))
    }

    fn sign(
        &self,
        canonical_request: &str,
        date_str: &str,
        secret: &str,
    ) -> Result<String, AuthError> {
        let date_stamp = date_str.get(..8).ok_or(AuthError::InvalidDateFormat)?;
        let credential_scope = format!("{date_stamp}/{}/s3/aws4_request", self.region);
        let string_to_sign = format!(
            "AWS4-HMAC-SHA256\n{date_str}\n{credential_scope}\n{}",
            hex_sha256(canonical_request.as_bytes())
        );
        let signing_key = derive_signing_key(secret, date_stamp, &self.region, "s3");
        Ok(hex::encode(hmac_sha256(&signing_key, string_to_sign.as_bytes())))
    }
}

/// Parsed Authorization header
struct ParsedAuth {
    access_key_id: String,
    signed_headers: Vec<String>,
    signature: String,
}

fn auth_header_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"AWS4-HMAC-SHA256\s+Credential=([^/]+)/[^,]+,\s*SignedHeaders=([^,]+),\s*Signature=([0-9a-f]+)",
        )
        .expect("authorization header regex compiles")
    })
}

fn parse_authorization_header(header: &str) -> Result<ParsedAuth, AuthError> {
    if !header.starts_with("AWS4-HMAC-SHA256") {
        return Err(AuthError::InvalidAuthHeader);
    }
    let captures = auth_header_regex()
        .captures(header)
        .ok_or(AuthError::InvalidAuthHeader)?;
    Ok(ParsedAuth {
        access_key_id: captures[1].to_string(),
        signed_headers: captures[2].split(';').map(str::to_lowercase).collect(),
        signature: captures[3].to_string(),
    })
}

fn get_request_date<B>(request: &Request<B>) -> Result<String, AuthError> {
    for name in ["x-amz-date", "date"] {
        if let Some(value) = request.headers().get(name) {
            return value
                .to_str()
                .map(str::to_string)
                .map_err(|_| AuthError::InvalidDateFormat);
        }
    }
    Err(AuthError::InvalidDateFormat)
}

/// Parse `20130524T000000Z`
fn parse_amz_date(date_str: &str) -> Result<DateTime<Utc>, AuthError> {
    NaiveDateTime::parse_from_str(date_str, "%Y%m%dT%H%M%SZ")
        .map(|dt| DateTime::<Utc>::from_naive_utc_and_offset(dt, Utc))
        .map_err(|_| AuthError::InvalidDateFormat)
}

/// Split a raw query string into decoded pairs, preserving order.
fn parse_query(query: &str) -> Vec<(String, String)> {
    if query.is_empty() {
        return Vec::new();
    }
    query
        .split('&')
        .filter(|p| !p.is_empty())
        .map(|param| {
            let (k, v) = param.split_once('=').unwrap_or((param, ""));
            (url_decode(k), url_decode(v))
        })
        .collect()
}

/// Canonical query: RFC3986-encode each decoded key and value, sort by
/// encoded key (then value), join `k=v&...`.
fn canonical_query_string(query: &[(String, String)], exclude_signature: bool) -> String {
    let mut params: Vec<(String, String)> = query
        .iter()
        .filter(|(k, _)| !(exclude_signature && k == "X-Amz-Signature"))
        .map(|(k, v)| (uri_encode(k), uri_encode(v)))
        .collect();
    params.sort();
    params
        .into_iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

fn build_canonical_request<B>(
    request: &Request<B>,
    canonical_query: &str,
    signed_headers: &[String],
    payload_hash: &str,
) -> Result<String, AuthError> {
    let path = request.uri().path();
    let canonical_uri = if path.is_empty() { "/" } else { path };

    let mut headers_map: BTreeMap<String, String> = BTreeMap::new();
    for name in signed_headers {
        let value = if name == "host" {
            request
                .headers()
                .get("host")
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
                .or_else(|| request.uri().authority().map(ToString::to_string))
                .ok_or_else(|| AuthError::MissingSignedHeader(name.clone()))?
        } else {
            request
                .headers()
                .get(name.as_str())
                .ok_or_else(|| AuthError::MissingSignedHeader(name.clone()))?
                .to_str()
                .map_err(|_| AuthError::InvalidAuthHeader)?
                .to_string()
        };
        headers_map.insert(name.clone(), value.trim().to_string());
    }

    let canonical_headers: String = headers_map
        .iter()
        .map(|(k, v)| format!("{k}:{v}\n"))
        .collect();

    Ok(format!(
        "{}\n{}\n{}\n{}\n{}\n{}",
        request.method().as_str(),
        canonical_uri,
        canonical_query,
        canonical_headers,
        signed_headers.join(";"),
        payload_hash
    ))
}

// ── Signing primitives (shared with presign) ──────────────────────────────────

/// Percent-encode per the RFC3986 unreserved set, uppercase hex. Space is
/// `%20`, never `+`.
#[must_use]
pub(crate) fn uri_encode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char);
            }
            _ => {
                out.push('%');
                out.push(char::from_digit(u32::from(b >> 4), 16).unwrap().to_ascii_uppercase());
                out.push(char::from_digit(u32::from(b & 0xf), 16).unwrap().to_ascii_uppercase());
            }
        }
    }
    out
}

fn url_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                if let Some(byte) = s
                    .get(i + 1..i + 3)
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok())
                {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                out.push(b'%');
                i += 1;
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            other => {
                out.push(other);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Derive the SigV4 signing key from the secret and scope components.
#[must_use]
pub(crate) fn derive_signing_key(secret: &str, date: &str, region: &str, service: &str) -> Vec<u8> {
    let k_date = hmac_sha256(format!("AWS4{secret}").as_bytes(), date.as_bytes());
    let k_region = hmac_sha256(&k_date, region.as_bytes());
    let k_service = hmac_sha256(&k_region, service.as_bytes());
    hmac_sha256(&k_service, b"aws4_request")
}

pub(crate) fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

pub(crate) fn hex_sha256(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// Constant-time string comparison to prevent timing attacks
fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }
    result == 0
}
