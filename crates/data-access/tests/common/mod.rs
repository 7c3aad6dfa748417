//! Test infrastructure for the data-access layer.
//!
//! Builds a [`DataAccess`] over the in-memory backends and provides small
//! helpers for records.

#![allow(dead_code)]

use std::sync::Arc;

use helios_data_access::backends::memory::{MemoryColumnStore, MemorySearchIndex};
use helios_data_access::config::{DataAccessConfig, TableKeyConfig};
use helios_data_access::{DataAccess, Record};
use serde_json::Value;
use tracing_subscriber::EnvFilter;

/// Installs a fmt subscriber once; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Converts a JSON object literal into a record.
pub fn record(value: Value) -> Record {
    value.as_object().cloned().expect("record literal must be an object")
}

/// A façade over fresh in-memory backends.
pub struct TestContext {
    pub access: DataAccess,
    pub store: Arc<MemoryColumnStore>,
    pub index: Arc<MemorySearchIndex>,
}

impl TestContext {
    /// Tables keyed by `id`, no declared columns.
    pub fn new() -> Self {
        Self::with_store(DataAccessConfig::default(), |store| store)
    }

    /// Builds the store from the config's registry and lets the caller
    /// declare columns on it.
    pub fn with_store(
        config: DataAccessConfig,
        declare: impl FnOnce(MemoryColumnStore) -> MemoryColumnStore,
    ) -> Self {
        init_tracing();
        let registry = config
            .column_store
            .registry()
            .expect("test key schemas are valid");
        let store = Arc::new(declare(MemoryColumnStore::with_registry(registry)));
        let index = Arc::new(MemorySearchIndex::new(config.search.raw_suffix.clone()));
        let access = DataAccess::with_backends(config, store.clone(), index.clone())
            .expect("test config is valid");
        Self {
            access,
            store,
            index,
        }
    }
}

/// The `user_org` table keyed by `userid` and clustered by `orgid`.
pub fn user_org_config() -> DataAccessConfig {
    DataAccessConfig::default().with_table(TableKeyConfig::new(
        "app",
        "user_org",
        ["userid"],
        ["orgid"],
    ))
}
