//! The operation façade.
//!
//! [`DataAccess`] is the single entry point callers use. Each operation
//! validates and compiles its input, obtains the namespace's session or
//! client from a [`HandlePool`], runs the native call, and normalizes the
//! result into an [`OperationResponse`]. Failures are logged with the
//! operation context and returned as a
//! [`DataAccessError`](crate::error::DataAccessError).
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use helios_data_access::backends::memory::{MemoryColumnStore, MemorySearchIndex};
//! use helios_data_access::config::DataAccessConfig;
//! use helios_data_access::gateway::DataAccess;
//! use serde_json::json;
//!
//! # async fn example() -> helios_data_access::DataAccessResult<()> {
//! let access = DataAccess::with_backends(
//!     DataAccessConfig::default(),
//!     Arc::new(MemoryColumnStore::new()),
//!     Arc::new(MemorySearchIndex::default()),
//! )?;
//!
//! let record = json!({"id": "u1", "name": "Ann"}).as_object().cloned().unwrap();
//! access.insert_record("app", "user", &record).await?;
//!
//! let found = access.get_record_by_id("app", "user", "u1", None).await?;
//! assert_eq!(found.first().unwrap()["name"], "Ann");
//! # Ok(())
//! # }
//! ```

mod callback;
mod column_ops;
mod search_ops;

use std::sync::Arc;

use crate::column::ColumnRequest;
use crate::config::DataAccessConfig;
use crate::core::{ColumnSession, Connector, HandlePool, SearchClient};
use crate::error::{DataAccessResult, ValidationError};
use crate::normalize::ColumnMapping;
use crate::types::{OperationResponse, SearchRequest, TableRegistry};

use callback::CallbackPool;

/// A request for [`DataAccess::execute`].
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// A column-store operation.
    Column(ColumnRequest),
    /// A search against one index.
    Search {
        /// Index name.
        index: String,
        /// The search.
        request: SearchRequest,
    },
}

/// Uniform access to the column store and the search index.
///
/// Cheap to clone; clones share handles and the callback pool.
#[derive(Debug, Clone)]
pub struct DataAccess {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: DataAccessConfig,
    registry: TableRegistry,
    mapping: ColumnMapping,
    sessions: HandlePool<dyn ColumnSession>,
    clients: HandlePool<dyn SearchClient>,
    callbacks: CallbackPool,
}

impl DataAccess {
    /// Creates the façade over handle pools.
    pub fn new(
        config: DataAccessConfig,
        sessions: HandlePool<dyn ColumnSession>,
        clients: HandlePool<dyn SearchClient>,
    ) -> DataAccessResult<Self> {
        let problems = config.validate();
        if !problems.is_empty() {
            return Err(ValidationError::InvalidRequest {
                field: "config".to_string(),
                message: problems.join("; "),
            }
            .into());
        }

        let registry = config.column_store.registry()?;
        let mapping = ColumnMapping::new(&config.column_store.column_mapping);
        let callbacks = CallbackPool::new(config.callback_workers)?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                registry,
                mapping,
                sessions,
                clients,
                callbacks,
            }),
        })
    }

    /// Creates the façade over connectors that open one handle per
    /// keyspace or index on first use.
    pub fn with_connectors(
        config: DataAccessConfig,
        sessions: Arc<dyn Connector<dyn ColumnSession>>,
        clients: Arc<dyn Connector<dyn SearchClient>>,
    ) -> DataAccessResult<Self> {
        Self::new(config, HandlePool::new(sessions), HandlePool::new(clients))
    }

    /// Creates the façade over one shared session and one shared client.
    pub fn with_backends(
        config: DataAccessConfig,
        session: Arc<dyn ColumnSession>,
        client: Arc<dyn SearchClient>,
    ) -> DataAccessResult<Self> {
        Self::new(config, HandlePool::shared(session), HandlePool::shared(client))
    }

    /// Creates the façade over Cassandra and Elasticsearch.
    ///
    /// No connection is opened until the first operation on a namespace.
    #[cfg(all(feature = "cassandra", feature = "elasticsearch"))]
    pub fn connect(config: DataAccessConfig) -> DataAccessResult<Self> {
        use crate::backends::cassandra::CassandraConnector;
        use crate::backends::elasticsearch::ElasticsearchConnector;

        let sessions = Arc::new(CassandraConnector::new(config.column_store.clone()));
        let clients = Arc::new(ElasticsearchConnector::new(config.search.clone()));
        Self::with_connectors(config, sessions, clients)
    }

    /// Returns the configuration.
    pub fn config(&self) -> &DataAccessConfig {
        &self.inner.config
    }

    /// Executes a request of either kind.
    pub async fn execute(&self, request: Request) -> DataAccessResult<OperationResponse> {
        match request {
            Request::Column(request) => {
                let name = request.operation.name();
                self.run_column(name, &request.keyspace, &request.table, &request.operation)
                    .await
            }
            Request::Search { index, request } => self.search(&index, &request).await,
        }
    }
}

