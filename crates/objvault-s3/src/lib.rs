//! S3 request pipeline for ObjVault.
//!
//! Routes authenticated S3 requests into the replicated metadata store and
//! the byte engine: SigV4 gating, IAM authorization, bucket and object
//! lifecycle, versioning and delete markers, multipart uploads, object
//! lock, conditional requests, range reads, tagging, and quotas.

pub mod auth;
pub mod batcher;
pub mod conditions;
pub mod error;
pub mod events;
pub mod handlers;
pub mod lock;
pub mod range;
pub mod router;
pub mod state;
pub mod tar;
pub mod utils;
pub mod xml;

pub use error::{S3Error, S3Result};
pub use router::build_router;
pub use state::AppState;
