//! Embedded transactional metadata store for ObjVault.
//!
//! A fixed set of keyspaces over one redb database: snapshot-isolated
//! readers, a single bounded-wait writer, per-keyspace sequence allocators,
//! a sequenced change log, and whole-store snapshot/restore. Typed accessors
//! for each record family sit on top; the `apply_*` mutations are reserved
//! for the command applier so replicas stay byte-identical.

pub mod bucket;
pub mod error;
pub mod iam;
pub mod object;
pub mod store;
pub mod system;
pub mod tables;

pub use error::{Result, StoreError};
pub use store::{decode_json, ReadTxn, Store, WriteTxn};
pub use tables::Keyspace;
