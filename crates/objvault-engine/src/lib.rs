//! Filesystem data plane for ObjVault object bytes.
//!
//! The metadata plane treats this engine as authoritative for bytes and
//! transient for listings. [`ByteEngine`] is the capability contract the
//! request pipeline consumes; [`FsEngine`] is the shipped implementation:
//! one directory per bucket, version bytes under a `.versions` tree, and a
//! per-upload multipart staging directory.

pub mod engine;
pub mod error;
pub mod fs;

pub use engine::{ByteEngine, EngineObject, ObjectReader};
pub use error::{EngineError, Result};
pub use fs::FsEngine;
