//! Resolved request identity and source-IP policy.

use crate::error::AuthError;
use std::net::IpAddr;
use tracing::debug;

/// Who a request is acting as, after authentication.
///
/// The admin identity is a tagged variant, not an implicit singleton: code
/// that grants admin powers has to match on it explicitly.
#[derive(Clone, Debug)]
pub enum Identity {
    /// The configured admin credentials; bypasses IAM policies.
    Admin,
    /// A stored access key.
    User {
        access_key: String,
        user_id: Option<String>,
        /// Raw policy documents effective for this user (own + groups).
        policies: Vec<String>,
        /// Extra CIDRs this identity may connect from.
        allowed_cidrs: Vec<String>,
    },
}

impl Identity {
    #[must_use]
    pub fn is_admin(&self) -> bool {
        matches!(self, Identity::Admin)
    }

    /// The access key id for audit records; admin reports the fixed marker.
    #[must_use]
    pub fn audit_key(&self) -> &str {
        match self {
            Identity::Admin => "admin",
            Identity::User { access_key, .. } => access_key,
        }
    }
}

/// Source-IP gates, evaluated after signature verification:
/// admin is subject only to the global blocklist; a user must pass the
/// global allowlist (when one is set, extended by the identity's own CIDRs)
/// and must not match the blocklist.
pub fn check_ip_policy(
    identity: &Identity,
    source_ip: Option<IpAddr>,
    global_allow: &[String],
    global_block: &[String],
) -> Result<(), AuthError> {
    let Some(ip) = source_ip else {
        // No peer address (e.g. a unix socket): nothing to evaluate.
        return Ok(());
    };

    if global_block.iter().any(|cidr| ip_matches_cidr(&ip, cidr)) {
        debug!(%ip, "source address blocklisted");
        return Err(AuthError::IpRejected);
    }

    if identity.is_admin() {
        return Ok(());
    }

    if global_allow.is_empty() {
        return Ok(());
    }

    let user_cidrs: &[String] = match identity {
        Identity::User { allowed_cidrs, .. } => allowed_cidrs,
        Identity::Admin => &[],
    };
    let admitted = global_allow
        .iter()
        .chain(user_cidrs.iter())
        .any(|cidr| ip_matches_cidr(&ip, cidr));
    if admitted {
        Ok(())
    } else {
        debug!(%ip, "source address not in allowlist");
        Err(AuthError::IpRejected)
    }
}

/// Match an address against a CIDR block (`10.0.0.0/8`, `::1/128`) or a
/// bare address. Malformed blocks never match.
#[must_use]
pub fn ip_matches_cidr(ip: &IpAddr, cidr: &str) -> bool {
    let Some((network_str, prefix_str)) = cidr.split_once('/') else {
        return cidr.parse::<IpAddr>().is_ok_and(|addr| addr == *ip);
    };
    let Ok(prefix_len) = prefix_str.parse::<u32>() else {
        return false;
    };
    let Ok(network_ip) = network_str.parse::<IpAddr>() else {
        return false;
    };

    match (ip, &network_ip) {
        (IpAddr::V4(addr), IpAddr::V4(net)) => {
            if prefix_len == 0 {
                return true;
            }
            if prefix_len > 32 {
                return false;
            }
            let mask = u32::MAX << (32 - prefix_len);
            (u32::from(*addr) & mask) == (u32::from(*net) & mask)
        }
        (IpAddr::V6(addr), IpAddr::V6(net)) => {
            if prefix_len == 0 {
                return true;
            }
            if prefix_len > 128 {
                return false;
            }
            let mask = u128::MAX << (128 - prefix_len);
            (u128::from(*addr) & mask) == (u128::from(*net) & mask)
        }
        _ => false,
    }
}
