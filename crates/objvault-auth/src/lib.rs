//! Authentication and authorization for ObjVault.
//!
//! SigV4 verification (header and presigned modes), presigned URL
//! generation, IAM-style policy evaluation, and source-IP policy. The
//! verifier resolves identities through a [`CredentialProvider`], so this
//! crate stays independent of the metadata store.

pub mod error;
pub mod identity;
pub mod policy;
pub mod presign;
pub mod sigv4;

pub use error::AuthError;
pub use identity::{check_ip_policy, ip_matches_cidr, Identity};
pub use policy::{
    allows_public_read, evaluate_documents, wildcard_match, PolicyDecision, PolicyDocument,
};
pub use presign::presign_get;
pub use sigv4::{CredentialProvider, SigV4Verifier};
