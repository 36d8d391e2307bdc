//! Replicated command layer for ObjVault metadata.
//!
//! Every metadata mutation is one of the commands in [`codec`], encoded as a
//! tagged JSON envelope and fed through a consensus log. The [`Applier`]
//! executes committed commands deterministically on every replica; the
//! [`ReplicatedStore`] is the leader-gated write surface the request
//! pipeline talks to. The command-tag table lives only in the codec module;
//! the replicated store depends on the codec and the applier owns dispatch.

pub mod applier;
pub mod codec;
pub mod replicated;

pub use applier::Applier;
pub use codec::{Command, CodecError};
pub use replicated::{Consensus, ConsensusError, LocalNode, ReplicatedStore, DEFAULT_APPLY_TIMEOUT};
