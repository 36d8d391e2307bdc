//! Glue between the auth crate and the request pipeline: credential lookup
//! from the metadata store, HTTP-to-action mapping, authorization, and the
//! two anonymous-read bypasses.

use crate::error::{S3Error, S3Result};
use axum::http::Method;
use objvault_auth::{
    allows_public_read, evaluate_documents, AuthError, CredentialProvider, Identity,
    PolicyDecision,
};
use objvault_common::types::AccessKey;
use objvault_store::{bucket, iam, Keyspace, ReadTxn, Store};
use std::sync::Arc;

/// Credential provider over the metadata store.
pub struct StoreCredentials {
    store: Arc<Store>,
}

impl StoreCredentials {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    fn read(&self) -> Result<objvault_store::ReadTxn, AuthError> {
        self.store
            .begin_read()
            .map_err(|e| AuthError::Lookup(e.to_string()))
    }
}

impl CredentialProvider for StoreCredentials {
    fn lookup(&self, access_key: &str) -> Result<Option<AccessKey>, AuthError> {
        let rtx = self.read()?;
        iam::get_access_key(&rtx, access_key).map_err(|e| AuthError::Lookup(e.to_string()))
    }

    fn user_policies(&self, user_id: &str) -> Result<Vec<String>, AuthError> {
        let rtx = self.read()?;
        iam::policy_documents_for_user(&rtx, user_id)
            .map_err(|e| AuthError::Lookup(e.to_string()))
    }

    fn user_cidrs(&self, user_id: &str) -> Result<Vec<String>, AuthError> {
        let rtx = self.read()?;
        Ok(iam::get_user(&rtx, user_id)
            .map_err(|e| AuthError::Lookup(e.to_string()))?
            .map(|u| u.allowed_cidrs)
            .unwrap_or_default())
    }
}

/// ARN for a bucket or object resource.
#[must_use]
pub fn resource_arn(bucket: Option<&str>, key: Option<&str>) -> String {
    match (bucket, key) {
        (Some(b), Some(k)) => format!("arn:aws:s3:::{b}/{k}"),
        (Some(b), None) => format!("arn:aws:s3:::{b}"),
        _ => "*".to_string(),
    }
}

/// Map the request shape to an S3 action name.
#[must_use]
pub fn s3_action(method: &Method, has_key: bool, subresource: Option<&str>) -> &'static str {
    if has_key {
        return match *method {
            Method::PUT | Method::POST => "s3:PutObject",
            Method::DELETE => "s3:DeleteObject",
            _ => "s3:GetObject",
        };
    }
    let is_put = *method == Method::PUT;
    let is_delete = *method == Method::DELETE;
    match subresource {
        Some("policy") => {
            if is_put {
                "s3:PutBucketPolicy"
            } else if is_delete {
                "s3:DeleteBucketPolicy"
            } else {
                "s3:GetBucketPolicy"
            }
        }
        Some("versioning") => {
            if is_put {
                "s3:PutBucketVersioning"
            } else {
                "s3:GetBucketVersioning"
            }
        }
        Some("tagging") => {
            if is_put {
                "s3:PutBucketTagging"
            } else if is_delete {
                "s3:DeleteBucketTagging"
            } else {
                "s3:GetBucketTagging"
            }
        }
        Some("lifecycle") => {
            if is_put {
                "s3:PutLifecycleConfiguration"
            } else {
                "s3:GetLifecycleConfiguration"
            }
        }
        Some("website") => {
            if is_put {
                "s3:PutBucketWebsite"
            } else if is_delete {
                "s3:DeleteBucketWebsite"
            } else {
                "s3:GetBucketWebsite"
            }
        }
        Some("cors") => {
            if is_put {
                "s3:PutBucketCORS"
            } else {
                "s3:GetBucketCORS"
            }
        }
        Some("notification") => {
            if is_put {
                "s3:PutBucketNotification"
            } else {
                "s3:GetBucketNotification"
            }
        }
        Some("encryption") => {
            if is_put {
                "s3:PutEncryptionConfiguration"
            } else {
                "s3:GetEncryptionConfiguration"
            }
        }
        Some("publicAccessBlock") => {
            if is_put {
                "s3:PutBucketPublicAccessBlock"
            } else {
                "s3:GetBucketPublicAccessBlock"
            }
        }
        Some("logging") => {
            if is_put {
                "s3:PutBucketLogging"
            } else {
                "s3:GetBucketLogging"
            }
        }
        Some("object-lock") => {
            if is_put {
                "s3:PutBucketObjectLockConfiguration"
            } else {
                "s3:GetBucketObjectLockConfiguration"
            }
        }
        Some("quota") => {
            if is_put {
                "s3:PutBucketQuota"
            } else {
                "s3:GetBucketQuota"
            }
        }
        Some("lambda") => {
            if is_put {
                "s3:PutBucketNotification"
            } else {
                "s3:GetBucketNotification"
            }
        }
        Some("uploads") => "s3:ListBucketMultipartUploads",
        Some("versions") => "s3:ListBucketVersions",
        Some("location") => "s3:GetBucketLocation",
        Some("delete") => "s3:DeleteObject",
        _ => match *method {
            Method::PUT => "s3:CreateBucket",
            Method::DELETE => "s3:DeleteBucket",
            _ => "s3:ListBucket",
        },
    }
}

/// Authorize an identity for an action on a resource. Admin passes; users
/// need an Allow from their effective policies, and any Deny wins.
pub fn authorize(identity: &Identity, action: &str, resource: &str) -> S3Result<()> {
    match identity {
        Identity::Admin => Ok(()),
        Identity::User { policies, .. } => {
            match evaluate_documents(policies, action, resource) {
                PolicyDecision::Allow => Ok(()),
                PolicyDecision::Deny | PolicyDecision::ImplicitDeny => {
                    Err(S3Error::access_denied())
                }
            }
        }
    }
}

/// May this identity bypass GOVERNANCE retention?
#[must_use]
pub fn can_bypass_governance(identity: &Identity, bucket: &str) -> bool {
    match identity {
        Identity::Admin => true,
        Identity::User { policies, .. } => matches!(
            evaluate_documents(
                policies,
                "s3:BypassGovernanceRetention",
                &resource_arn(Some(bucket), None),
            ),
            PolicyDecision::Allow
        ),
    }
}

/// Anonymous-read bypass (i): the bucket policy grants `s3:GetObject` (or
/// `s3:*`) to everyone and the request is a GET/HEAD on an object.
pub fn public_read_bypass(rtx: &ReadTxn, bucket_name: &str) -> S3Result<bool> {
    let Some(policy) = bucket::get_bucket_config(rtx, Keyspace::BucketPolicies, bucket_name)?
    else {
        return Ok(false);
    };
    Ok(std::str::from_utf8(&policy).is_ok_and(allows_public_read))
}

/// Anonymous-read bypass (ii): the bucket has a website configuration and
/// the request carries no subresource query.
pub fn website_bypass(rtx: &ReadTxn, bucket_name: &str) -> S3Result<bool> {
    Ok(bucket::get_bucket_config(rtx, Keyspace::WebsiteConfigs, bucket_name)?.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_mapping() {
        assert_eq!(s3_action(&Method::GET, true, None), "s3:GetObject");
        assert_eq!(s3_action(&Method::PUT, true, Some("tagging")), "s3:PutObject");
        assert_eq!(s3_action(&Method::DELETE, true, None), "s3:DeleteObject");
        assert_eq!(s3_action(&Method::PUT, false, None), "s3:CreateBucket");
        assert_eq!(s3_action(&Method::GET, false, None), "s3:ListBucket");
        assert_eq!(
            s3_action(&Method::PUT, false, Some("policy")),
            "s3:PutBucketPolicy"
        );
        assert_eq!(
            s3_action(&Method::GET, false, Some("versions")),
            "s3:ListBucketVersions"
        );
    }

    #[test]
    fn test_default_deny_for_empty_policies() {
        let user = Identity::User {
            access_key: "AK".into(),
            user_id: Some("u".into()),
            policies: Vec::new(),
            allowed_cidrs: Vec::new(),
        };
        assert!(authorize(&user, "s3:GetObject", "arn:aws:s3:::b/k").is_err());
        assert!(authorize(&Identity::Admin, "s3:GetObject", "arn:aws:s3:::b/k").is_ok());
    }

    #[test]
    fn test_allow_policy_admits() {
        let user = Identity::User {
            access_key: "AK".into(),
            user_id: Some("u".into()),
            policies: vec![
                r#"{"Statement":[{"Effect":"Allow","Action":"s3:GetObject","Resource":"arn:aws:s3:::b/*"}]}"#
                    .to_string(),
            ],
            allowed_cidrs: Vec::new(),
        };
        assert!(authorize(&user, "s3:GetObject", "arn:aws:s3:::b/k").is_ok());
        assert!(authorize(&user, "s3:PutObject", "arn:aws:s3:::b/k").is_err());
    }

    #[test]
    fn test_resource_arn() {
        assert_eq!(resource_arn(Some("b"), Some("k/x")), "arn:aws:s3:::b/k/x");
        assert_eq!(resource_arn(Some("b"), None), "arn:aws:s3:::b");
        assert_eq!(resource_arn(None, None), "*");
    }
}
