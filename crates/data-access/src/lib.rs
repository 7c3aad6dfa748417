//! Helios Data Access Layer
//!
//! This crate gives services one uniform way to read and write records in a
//! wide-column store (Cassandra) and to search, facet and maintain documents
//! in a search index (Elasticsearch). Callers describe what they want with
//! plain records, keys and filters; the layer compiles that into native
//! statements or query bodies, runs them, and normalizes the answer into an
//! [`OperationResponse`].
//!
//! # Features
//!
//! - **Column store**: inserts, updates with TTL, composite-key reads,
//!   map-column edits and atomic batches, all with bound parameters
//! - **Search index**: filters with ranges and prefixes, OR groups, nested
//!   fields, fuzzy matching, boosts, sorting, pagination and facets
//! - **Typed errors**: validation, unknown-property and execution failures
//!   are told apart by [`ErrorKind`]
//! - **Shared handles**: one session per keyspace and one client per index,
//!   created on first use
//!
//! # Backend Features
//!
//! Enable the native drivers with feature flags in `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! helios-data-access = { version = "0.1", features = ["cassandra", "elasticsearch"] }
//! ```
//!
//! - `cassandra` - Apache Cassandra via cdrs-tokio
//! - `elasticsearch` - Elasticsearch via the official client
//!
//! The in-memory backends are always available.
//!
//! # Architecture
//!
//! - [`types`] - records, keys, filters, search requests and responses
//! - [`column`] - compiles column-store operations into statements
//! - [`search`] - compiles search requests into query bodies
//! - [`normalize`] - turns native results into responses
//! - [`core`] - the session and client seams and the handle pool
//! - [`backends`] - in-memory, Cassandra and Elasticsearch implementations
//! - [`gateway`] - the [`DataAccess`] façade
//! - [`config`] - serde configuration
//! - [`error`] - error types
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use helios_data_access::backends::memory::{MemoryColumnStore, MemorySearchIndex};
//! use helios_data_access::types::{Filter, RangeOp, OperatorSet, SearchRequest};
//! use helios_data_access::{DataAccess, DataAccessConfig};
//! use serde_json::json;
//!
//! # async fn example() -> helios_data_access::DataAccessResult<()> {
//! let index = Arc::new(MemorySearchIndex::default());
//! let access = DataAccess::with_backends(
//!     DataAccessConfig::default(),
//!     Arc::new(MemoryColumnStore::new()),
//!     index.clone(),
//! )?;
//!
//! let doc = json!({"name": "Ann", "age": 30}).as_object().cloned().unwrap();
//! access.save("users", Some("u1"), &doc).await?;
//!
//! let request = SearchRequest::new().with_filters(
//!     Filter::new().with("age", OperatorSet::new().range(RangeOp::Gte, 18)),
//! );
//! let response = access.search("users", &request).await?;
//! assert_eq!(response.count, 1);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod backends;
pub mod column;
pub mod config;
pub mod core;
pub mod error;
pub mod gateway;
pub mod normalize;
pub mod search;
pub mod types;

// Re-export commonly used types at crate root
pub use config::{ColumnStoreConfig, DataAccessConfig, SearchConfig};
pub use error::{DataAccessError, DataAccessResult, ErrorKind};
pub use gateway::{DataAccess, Request};
pub use types::{Filter, OperationResponse, Record, RecordKey, SearchRequest};

// Re-export core traits
pub use core::{BackendKind, ColumnSession, HandlePool, SearchClient};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name.
pub const NAME: &str = env!("CARGO_PKG_NAME");
