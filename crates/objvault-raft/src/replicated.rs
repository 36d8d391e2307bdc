//! Replicated store: the leader-gated write surface over the consensus log.
//!
//! Writes are encoded as commands and submitted through the [`Consensus`]
//! implementation; the call returns once the command has applied locally or
//! the bounded wait elapses. Reads never touch consensus: every replica
//! serves them from its own store.

use crate::applier::Applier;
use crate::codec::Command;
use async_trait::async_trait;
use objvault_common::Error;
use objvault_store::Store;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error as ThisError;
use tracing::warn;

/// Default bound on waiting for local apply.
pub const DEFAULT_APPLY_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors surfaced by a consensus implementation.
#[derive(Debug, ThisError)]
pub enum ConsensusError {
    #[error("not the leader")]
    NotLeader { leader_hint: Option<String> },
    #[error("consensus unavailable: {0}")]
    Unavailable(String),
}

/// The contract this crate needs from a consensus engine. The algorithm
/// itself lives elsewhere; only the applier/leader/submit surface is fixed.
#[async_trait]
pub trait Consensus: Send + Sync {
    /// True when this node may accept writes.
    fn is_leader(&self) -> bool;

    /// Best-effort address of the current leader, for redirect hints.
    fn leader_hint(&self) -> Option<String>;

    /// Submit a command envelope; resolves once it has applied locally.
    async fn submit(&self, command: Vec<u8>) -> Result<u64, ConsensusError>;
}

/// Single-node consensus: every submission applies immediately.
pub struct LocalNode {
    applier: Applier,
}

impl LocalNode {
    pub fn new(applier: Applier) -> Self {
        Self { applier }
    }
}

#[async_trait]
impl Consensus for LocalNode {
    fn is_leader(&self) -> bool {
        true
    }

    fn leader_hint(&self) -> Option<String> {
        None
    }

    async fn submit(&self, command: Vec<u8>) -> Result<u64, ConsensusError> {
        // The redb commit is synchronous; run it off the async workers.
        let applier = self.applier.clone();
        tokio::task::spawn_blocking(move || applier.apply(&command))
            .await
            .map_err(|e| ConsensusError::Unavailable(e.to_string()))?
            .map_err(|e| ConsensusError::Unavailable(e.to_string()))
    }
}

/// Store wrapper routing every mutation through the consensus log.
pub struct ReplicatedStore {
    store: Arc<Store>,
    consensus: Arc<dyn Consensus>,
    apply_timeout: Duration,
}

impl ReplicatedStore {
    pub fn new(store: Arc<Store>, consensus: Arc<dyn Consensus>) -> Self {
        Self {
            store,
            consensus,
            apply_timeout: DEFAULT_APPLY_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_apply_timeout(mut self, timeout: Duration) -> Self {
        self.apply_timeout = timeout;
        self
    }

    /// Open a single-node deployment: a local store applied directly.
    pub fn single_node(store: Arc<Store>) -> Self {
        let applier = Applier::new(store.clone());
        Self::new(store, Arc::new(LocalNode::new(applier)))
    }

    /// The local store, for reads on any replica.
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// True when this node accepts writes.
    #[must_use]
    pub fn is_leader(&self) -> bool {
        self.consensus.is_leader()
    }

    /// Submit a command and wait for local apply.
    ///
    /// Always returns 0 for counting commands: counts are a local-apply
    /// detail and not replicated, so callers must not rely on them here.
    pub async fn apply(&self, command: &Command) -> Result<(), Error> {
        if !self.consensus.is_leader() {
            return Err(Error::NotLeader {
                leader_hint: self.consensus.leader_hint(),
            });
        }

        let bytes = command.encode();
        match tokio::time::timeout(self.apply_timeout, self.consensus.submit(bytes)).await {
            Ok(Ok(_count)) => Ok(()),
            Ok(Err(ConsensusError::NotLeader { leader_hint })) => {
                Err(Error::NotLeader { leader_hint })
            }
            Ok(Err(ConsensusError::Unavailable(msg))) => Err(Error::ServiceUnavailable(msg)),
            Err(_elapsed) => {
                warn!(tag = command.tag(), "command apply timed out");
                Err(Error::ApplyTimeout)
            }
        }
    }
}
