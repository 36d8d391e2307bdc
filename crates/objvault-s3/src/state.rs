//! Shared application state for the request pipeline.

use crate::batcher::AccessTimeBatcher;
use crate::error::S3Result;
use crate::events::EventHooks;
use objvault_auth::SigV4Verifier;
use objvault_common::ServerConfig;
use objvault_engine::ByteEngine;
use objvault_raft::ReplicatedStore;
use objvault_store::{ReadTxn, Store};
use std::sync::Arc;

/// State shared across handlers.
pub struct AppState {
    pub config: ServerConfig,
    pub replicated: ReplicatedStore,
    pub engine: Arc<dyn ByteEngine>,
    /// `None` disables authentication (development / tests only).
    pub verifier: Option<SigV4Verifier>,
    pub hooks: EventHooks,
    pub access_times: AccessTimeBatcher,
}

impl AppState {
    /// Assemble a single-node deployment with SigV4 enabled.
    pub fn single_node(
        config: ServerConfig,
        store: Arc<Store>,
        engine: Arc<dyn ByteEngine>,
    ) -> Self {
        let provider = Arc::new(crate::auth::StoreCredentials::new(store.clone()));
        let verifier = SigV4Verifier::new(
            provider,
            config.region.clone(),
            config.admin_access_key.clone(),
            config.admin_secret_key.clone(),
        )
        .with_ip_policy(config.ip_allowlist.clone(), config.ip_blocklist.clone());
        let replicated = ReplicatedStore::single_node(store)
            .with_apply_timeout(std::time::Duration::from_secs(config.apply_timeout_secs.max(1)));

        Self {
            config,
            replicated,
            engine,
            verifier: Some(verifier),
            hooks: EventHooks::new(),
            access_times: AccessTimeBatcher::new(),
        }
    }

    /// Assemble with authentication disabled; every request acts as admin.
    pub fn single_node_no_auth(
        config: ServerConfig,
        store: Arc<Store>,
        engine: Arc<dyn ByteEngine>,
    ) -> Self {
        let mut state = Self::single_node(config, store, engine);
        state.verifier = None;
        state
    }

    /// Open a read transaction on the local store.
    pub fn read(&self) -> S3Result<ReadTxn> {
        Ok(self.replicated.store().begin_read()?)
    }

    /// The local store (reads are always local, even on followers).
    #[must_use]
    pub fn store(&self) -> &Arc<Store> {
        self.replicated.store()
    }
}
