//! Configuration types for ObjVault
//!
//! This module defines the configuration structure shared by the server
//! binary and the request pipeline. Values come from CLI flags or
//! environment variables; behavior must not depend on how they were set.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Root server configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address for the S3 API listener
    pub listen: SocketAddr,
    /// Region name used in SigV4 credential scopes and `?location` responses
    pub region: String,
    /// Base domain for virtual-hosted-style addressing; empty disables it
    pub base_domain: String,
    /// Root directory for object bytes
    pub data_dir: PathBuf,
    /// Path of the embedded metadata database
    pub metadata_path: PathBuf,
    /// Admin credentials (full access, bypasses IAM policies)
    pub admin_access_key: String,
    pub admin_secret_key: String,
    /// Report SSE headers on reads
    pub encryption_enabled: bool,
    /// Seconds to wait for a replicated command to apply locally
    pub apply_timeout_secs: u64,
    /// Global source-IP allowlist (CIDRs); empty admits everyone
    pub ip_allowlist: Vec<String>,
    /// Global source-IP blocklist (CIDRs); applies to admin too
    pub ip_blocklist: Vec<String>,
    /// Limits for request bodies and uploads
    pub limits: Limits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:9000".parse().unwrap(),
            region: "us-east-1".to_string(),
            base_domain: String::new(),
            data_dir: PathBuf::from("/var/lib/objvault/data"),
            metadata_path: PathBuf::from("/var/lib/objvault/meta.redb"),
            admin_access_key: "objvaultadmin".to_string(),
            admin_secret_key: "objvaultadmin".to_string(),
            encryption_enabled: false,
            apply_timeout_secs: 10,
            ip_allowlist: Vec::new(),
            ip_blocklist: Vec::new(),
            limits: Limits::default(),
        }
    }
}

/// Hard limits for the request pipeline
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Limits {
    /// Maximum single-object PUT body
    pub max_object_size: u64,
    /// Maximum multipart part size
    pub max_part_size: u64,
    /// Maximum part number
    pub max_parts: u32,
    /// Maximum bucket policy document
    pub max_policy_size: usize,
    /// Maximum lifecycle/website/CORS/notification configuration body
    pub max_config_size: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_object_size: 5 * 1024 * 1024 * 1024, // 5 GiB
            max_part_size: 5 * 1024 * 1024 * 1024,   // 5 GiB
            max_parts: 10_000,
            max_policy_size: 20 * 1024,   // 20 KiB
            max_config_size: 256 * 1024,  // 256 KiB
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.listen.port(), 9000);
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.limits.max_parts, 10_000);
        assert_eq!(config.limits.max_object_size, 5 * 1024 * 1024 * 1024);
    }
}
