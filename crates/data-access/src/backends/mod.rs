//! Backend implementations of the session and client seams.
//!
//! | Backend | Feature | Description |
//! |---------|---------|-------------|
//! | Memory | always | In-process column store and search index |
//! | Cassandra | `cassandra` | Column store through `cdrs-tokio` |
//! | Elasticsearch | `elasticsearch` | Search index through the official client |
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use helios_data_access::backends::memory::{MemoryColumnStore, MemorySearchIndex};
//! use helios_data_access::core::{ColumnSession, SearchClient};
//!
//! let sessions: Arc<dyn ColumnSession> = Arc::new(MemoryColumnStore::new());
//! let clients: Arc<dyn SearchClient> = Arc::new(MemorySearchIndex::default());
//! # let _ = (sessions, clients);
//! ```

pub mod memory;

#[cfg(feature = "cassandra")]
pub mod cassandra;

#[cfg(feature = "elasticsearch")]
pub mod elasticsearch;
