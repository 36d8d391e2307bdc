//! Checksum computation for object bodies
//!
//! MD5 backs the ETag; the `x-amz-checksum-*` algorithms (SHA256, SHA1,
//! CRC32, CRC32C) are computed on demand and stored base64-encoded.

use crate::types::ChecksumSet;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha1::Digest as _;
use std::fmt;
use std::str::FromStr;

/// S3 checksum algorithms selectable via `x-amz-checksum-*` headers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChecksumAlgorithm {
    Sha256,
    Sha1,
    Crc32,
    Crc32c,
}

impl ChecksumAlgorithm {
    /// Canonical name as used in S3 headers
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sha256 => "SHA256",
            Self::Sha1 => "SHA1",
            Self::Crc32 => "CRC32",
            Self::Crc32c => "CRC32C",
        }
    }

    /// All supported algorithms, in header-emission order
    pub const ALL: [Self; 4] = [Self::Sha256, Self::Sha1, Self::Crc32, Self::Crc32c];
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for unrecognized algorithm names
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown checksum algorithm: {0}")]
pub struct ParseChecksumAlgorithmError(String);

impl FromStr for ChecksumAlgorithm {
    type Err = ParseChecksumAlgorithmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SHA256" => Ok(Self::Sha256),
            "SHA1" => Ok(Self::Sha1),
            "CRC32" => Ok(Self::Crc32),
            "CRC32C" => Ok(Self::Crc32c),
            _ => Err(ParseChecksumAlgorithmError(s.to_owned())),
        }
    }
}

/// Hex-encoded MD5 digest of `data`
#[must_use]
pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Quoted MD5 hex digest, the single-part ETag form
#[must_use]
pub fn etag(data: &[u8]) -> String {
    format!("\"{}\"", md5_hex(data))
}

/// Composite multipart ETag: MD5 over the concatenated raw part digests,
/// formatted `"<hex>-<n>"`.
///
/// Entries may be quoted or unquoted part MD5 hex strings.
#[must_use]
pub fn multipart_etag(part_md5_hexes: &[impl AsRef<str>]) -> String {
    let mut combined = Vec::with_capacity(part_md5_hexes.len() * 16);
    for part in part_md5_hexes {
        if let Ok(raw) = hex::decode(part.as_ref().trim_matches('"')) {
            combined.extend_from_slice(&raw);
        }
    }
    format!(
        "\"{:x}-{}\"",
        md5::compute(&combined),
        part_md5_hexes.len()
    )
}

/// Base64 MD5 digest, the `Content-MD5` form
#[must_use]
pub fn md5_base64(data: &[u8]) -> String {
    BASE64.encode(md5::compute(data).0)
}

/// Compute one algorithm's base64-encoded checksum
#[must_use]
pub fn compute(algorithm: ChecksumAlgorithm, data: &[u8]) -> String {
    match algorithm {
        ChecksumAlgorithm::Sha256 => BASE64.encode(sha2::Sha256::digest(data)),
        ChecksumAlgorithm::Sha1 => BASE64.encode(sha1::Sha1::digest(data)),
        ChecksumAlgorithm::Crc32 => {
            let mut hasher = crc32fast::Hasher::new();
            hasher.update(data);
            BASE64.encode(hasher.finalize().to_be_bytes())
        }
        ChecksumAlgorithm::Crc32c => BASE64.encode(crc32c::crc32c(data).to_be_bytes()),
    }
}

/// Store a computed checksum into the matching `ChecksumSet` slot
pub fn record(set: &mut ChecksumSet, algorithm: ChecksumAlgorithm, value: String) {
    match algorithm {
        ChecksumAlgorithm::Sha256 => set.sha256 = Some(value),
        ChecksumAlgorithm::Sha1 => set.sha1 = Some(value),
        ChecksumAlgorithm::Crc32 => set.crc32 = Some(value),
        ChecksumAlgorithm::Crc32c => set.crc32c = Some(value),
    }
}

/// Read a recorded checksum back out of a `ChecksumSet`
#[must_use]
pub fn recorded(set: &ChecksumSet, algorithm: ChecksumAlgorithm) -> Option<&str> {
    match algorithm {
        ChecksumAlgorithm::Sha256 => set.sha256.as_deref(),
        ChecksumAlgorithm::Sha1 => set.sha1.as_deref(),
        ChecksumAlgorithm::Crc32 => set.crc32.as_deref(),
        ChecksumAlgorithm::Crc32c => set.crc32c.as_deref(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md5_hex() {
        assert_eq!(md5_hex(b"hello"), "5d41402abc4b2a76b9719d911017c592");
        assert_eq!(etag(b""), "\"d41d8cd98f00b204e9800998ecf8427e\"");
    }

    #[test]
    fn test_multipart_etag_shape() {
        let parts = ["5d41402abc4b2a76b9719d911017c592", "\"d41d8cd98f00b204e9800998ecf8427e\""];
        let tag = multipart_etag(&parts);
        assert!(tag.starts_with('"'));
        assert!(tag.ends_with("-2\""));
    }

    #[test]
    fn test_multipart_etag_known_value() {
        // md5("AAA") ++ md5("BBB"), hashed again
        let a = md5_hex(b"AAA");
        let b = md5_hex(b"BBB");
        let mut combined = hex::decode(&a).unwrap();
        combined.extend_from_slice(&hex::decode(&b).unwrap());
        let expected = format!("\"{:x}-2\"", md5::compute(&combined));
        assert_eq!(multipart_etag(&[a, b]), expected);
    }

    #[test]
    fn test_checksum_algorithms() {
        // SHA256("") and CRC32("") are well-known
        assert_eq!(
            compute(ChecksumAlgorithm::Sha256, b""),
            "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU="
        );
        assert_eq!(compute(ChecksumAlgorithm::Crc32, b""), "AAAAAA==");
        // CRC32("123456789") = 0xCBF43926
        assert_eq!(compute(ChecksumAlgorithm::Crc32, b"123456789"), "y/Q5Jg==");
        // CRC32C("123456789") = 0xE3069283
        assert_eq!(compute(ChecksumAlgorithm::Crc32c, b"123456789"), "4waSgw==");
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("crc32c".parse::<ChecksumAlgorithm>().unwrap(), ChecksumAlgorithm::Crc32c);
        assert!("md5".parse::<ChecksumAlgorithm>().is_err());
    }

    #[test]
    fn test_record_and_recorded() {
        let mut set = ChecksumSet::default();
        record(&mut set, ChecksumAlgorithm::Crc32, "y/Q5Jg==".into());
        assert_eq!(recorded(&set, ChecksumAlgorithm::Crc32), Some("y/Q5Jg=="));
        assert_eq!(recorded(&set, ChecksumAlgorithm::Sha1), None);
    }
}
