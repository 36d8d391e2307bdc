//! Object-lock guards for permanent version deletes and retention changes.

use objvault_common::types::{ObjectMeta, RetentionMode};
use objvault_common::Error;

/// May this specific version be permanently deleted right now?
///
/// Denied while a legal hold is on or retention is active, except that
/// GOVERNANCE retention yields to a caller that carries the bypass header
/// (the IAM `s3:BypassGovernanceRetention` check happens before this).
pub fn check_version_delete(
    meta: &ObjectMeta,
    now: i64,
    bypass_governance: bool,
) -> Result<(), Error> {
    if meta.legal_hold {
        return Err(Error::AccessDenied);
    }
    let Some(mode) = meta.retention_mode else {
        return Ok(());
    };
    if now >= meta.retention_until {
        return Ok(());
    }
    match mode {
        RetentionMode::Governance if bypass_governance => Ok(()),
        _ => Err(Error::AccessDenied),
    }
}

/// May the retention on this version be replaced with `(new_mode,
/// new_until)`? COMPLIANCE retention can never be weakened or shortened
/// while active; GOVERNANCE can, for bypass-privileged callers.
pub fn check_retention_change(
    meta: &ObjectMeta,
    new_mode: Option<RetentionMode>,
    new_until: i64,
    now: i64,
    bypass_governance: bool,
) -> Result<(), Error> {
    let Some(current) = meta.retention_mode else {
        return Ok(());
    };
    if now >= meta.retention_until {
        return Ok(());
    }
    match current {
        RetentionMode::Compliance => {
            let weakened = new_mode != Some(RetentionMode::Compliance)
                || new_until < meta.retention_until;
            if weakened {
                return Err(Error::AccessDenied);
            }
            Ok(())
        }
        RetentionMode::Governance => {
            if bypass_governance {
                return Ok(());
            }
            let weakened = new_mode.is_none() || new_until < meta.retention_until;
            if weakened {
                Err(Error::AccessDenied)
            } else {
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn locked(mode: RetentionMode, until: i64) -> ObjectMeta {
        ObjectMeta {
            retention_mode: Some(mode),
            retention_until: until,
            ..Default::default()
        }
    }

    #[test]
    fn test_legal_hold_blocks_delete() {
        let meta = ObjectMeta {
            legal_hold: true,
            ..Default::default()
        };
        assert!(check_version_delete(&meta, 0, true).is_err());
    }

    #[test]
    fn test_active_compliance_blocks_delete_even_with_bypass() {
        let meta = locked(RetentionMode::Compliance, 1000);
        assert!(check_version_delete(&meta, 500, false).is_err());
        assert!(check_version_delete(&meta, 500, true).is_err());
        assert!(check_version_delete(&meta, 1000, false).is_ok());
    }

    #[test]
    fn test_governance_bypass() {
        let meta = locked(RetentionMode::Governance, 1000);
        assert!(check_version_delete(&meta, 500, false).is_err());
        assert!(check_version_delete(&meta, 500, true).is_ok());
    }

    #[test]
    fn test_no_lock_allows_delete() {
        assert!(check_version_delete(&ObjectMeta::default(), 0, false).is_ok());
    }

    #[test]
    fn test_compliance_cannot_shorten() {
        let meta = locked(RetentionMode::Compliance, 1000);
        assert!(
            check_retention_change(&meta, Some(RetentionMode::Compliance), 900, 500, true).is_err()
        );
        assert!(
            check_retention_change(&meta, Some(RetentionMode::Governance), 2000, 500, true)
                .is_err()
        );
        assert!(
            check_retention_change(&meta, Some(RetentionMode::Compliance), 2000, 500, false)
                .is_ok()
        );
        // Expired compliance retention can be replaced freely.
        assert!(check_retention_change(&meta, None, 0, 1500, false).is_ok());
    }

    #[test]
    fn test_governance_shorten_requires_bypass() {
        let meta = locked(RetentionMode::Governance, 1000);
        assert!(
            check_retention_change(&meta, Some(RetentionMode::Governance), 900, 500, false)
                .is_err()
        );
        assert!(
            check_retention_change(&meta, Some(RetentionMode::Governance), 900, 500, true).is_ok()
        );
    }
}
