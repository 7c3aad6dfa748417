//! Configuration for the data-access layer.
//!
//! All structs deserialize with `serde`, fill missing fields from their
//! defaults, and offer `with_*` builders for programmatic setup.
//!
//! ```
//! use helios_data_access::config::{DataAccessConfig, SearchConfig, TableKeyConfig};
//!
//! let config = DataAccessConfig::default()
//!     .with_search(SearchConfig::default().with_default_limit(25))
//!     .with_table(TableKeyConfig::new("app", "user_org", ["userid"], ["orgid"]));
//!
//! assert!(config.validate().is_empty());
//! assert_eq!(config.search.default_limit, 25);
//! ```

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::types::{KeySchema, TableRegistry};

/// Credentials for the column store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnCredentials {
    /// User name.
    pub username: String,
    /// Password.
    pub password: String,
}

/// The declared primary key of one table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableKeyConfig {
    /// Keyspace of the table.
    pub keyspace: String,
    /// Table name.
    pub table: String,
    /// Partition key columns, in order.
    pub partition: Vec<String>,
    /// Clustering columns, in order.
    #[serde(default)]
    pub clustering: Vec<String>,
}

impl TableKeyConfig {
    /// Declares a table key.
    pub fn new<P, C>(
        keyspace: impl Into<String>,
        table: impl Into<String>,
        partition: P,
        clustering: C,
    ) -> Self
    where
        P: IntoIterator,
        P::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
            partition: partition.into_iter().map(Into::into).collect(),
            clustering: clustering.into_iter().map(Into::into).collect(),
        }
    }

    fn schema(&self) -> Result<KeySchema, ValidationError> {
        KeySchema::new(self.partition.clone(), self.clustering.clone())
    }
}

/// Column-store settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnStoreConfig {
    /// Contact points as `host:port`.
    #[serde(default = "default_contact_points")]
    pub contact_points: Vec<String>,

    /// Optional credentials.
    #[serde(default)]
    pub credentials: Option<ColumnCredentials>,

    /// Request timeout in milliseconds (default: 12000).
    #[serde(default = "default_column_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Logical field name to physical column name. Result rows are
    /// renamed back to the logical names.
    #[serde(default)]
    pub column_mapping: HashMap<String, String>,

    /// Declared key layouts. Undeclared tables are keyed by `id`.
    #[serde(default)]
    pub tables: Vec<TableKeyConfig>,
}

fn default_contact_points() -> Vec<String> {
    vec!["127.0.0.1:9042".to_string()]
}

fn default_column_timeout_ms() -> u64 {
    12000
}

impl Default for ColumnStoreConfig {
    fn default() -> Self {
        Self {
            contact_points: default_contact_points(),
            credentials: None,
            request_timeout_ms: default_column_timeout_ms(),
            column_mapping: HashMap::new(),
            tables: Vec::new(),
        }
    }
}

impl ColumnStoreConfig {
    /// Sets the contact points.
    pub fn with_contact_points<I, S>(mut self, points: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.contact_points = points.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(ColumnCredentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// Maps a logical field to a physical column.
    pub fn with_column_mapping(mut self, logical: impl Into<String>, physical: impl Into<String>) -> Self {
        self.column_mapping.insert(logical.into(), physical.into());
        self
    }

    /// Declares a table key.
    pub fn with_table(mut self, table: TableKeyConfig) -> Self {
        self.tables.push(table);
        self
    }

    /// Returns the request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Builds the key registry from the declared tables.
    pub fn registry(&self) -> Result<TableRegistry, ValidationError> {
        let mut registry = TableRegistry::new();
        for table in &self.tables {
            registry.register(table.keyspace.clone(), table.table.clone(), table.schema()?);
        }
        Ok(registry)
    }

    fn problems(&self, out: &mut Vec<String>) {
        if self.contact_points.is_empty() {
            out.push("column_store.contact_points must not be empty".to_string());
        }
        if self.request_timeout_ms == 0 {
            out.push("column_store.request_timeout_ms must be positive".to_string());
        }
        for (logical, physical) in &self.column_mapping {
            if physical.trim().is_empty() {
                out.push(format!("column_store.column_mapping.{} is blank", logical));
            }
        }
        for table in &self.tables {
            if let Err(err) = table.schema() {
                out.push(format!("column_store.tables.{}.{}: {}", table.keyspace, table.table, err));
            }
        }
    }
}

/// Authentication for the search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchAuth {
    /// Basic username/password authentication.
    Basic {
        /// The username.
        username: String,
        /// The password.
        password: String,
    },
    /// Bearer token authentication.
    Bearer {
        /// The token.
        token: String,
    },
}

/// Search-index settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Node URLs. The first one is used.
    #[serde(default = "default_nodes")]
    pub nodes: Vec<String>,

    /// Optional authentication.
    #[serde(default)]
    pub auth: Option<SearchAuth>,

    /// Transport timeout in milliseconds (default: 30000).
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// How long a search call waits for its response (default: 5000).
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,

    /// Suffix of the keyword sub-field used for exact matching.
    #[serde(default = "default_raw_suffix")]
    pub raw_suffix: String,

    /// Page size when a request has no limit (default: 10).
    #[serde(default = "default_limit")]
    pub default_limit: u64,

    /// Largest accepted page size (default: 10000).
    #[serde(default = "default_max_limit")]
    pub max_limit: u64,

    /// Whether to disable certificate validation. Development only.
    #[serde(default)]
    pub disable_certificate_validation: bool,
}

fn default_nodes() -> Vec<String> {
    vec!["http://localhost:9200".to_string()]
}

fn default_request_timeout_ms() -> u64 {
    30000
}

fn default_search_timeout_ms() -> u64 {
    5000
}

fn default_raw_suffix() -> String {
    ".raw".to_string()
}

fn default_limit() -> u64 {
    10
}

fn default_max_limit() -> u64 {
    10000
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            nodes: default_nodes(),
            auth: None,
            request_timeout_ms: default_request_timeout_ms(),
            search_timeout_ms: default_search_timeout_ms(),
            raw_suffix: default_raw_suffix(),
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            disable_certificate_validation: false,
        }
    }
}

impl SearchConfig {
    /// Sets the node URLs.
    pub fn with_nodes<I, S>(mut self, nodes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.nodes = nodes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the authentication.
    pub fn with_auth(mut self, auth: SearchAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Sets the search wait timeout.
    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the raw sub-field suffix.
    pub fn with_raw_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.raw_suffix = suffix.into();
        self
    }

    /// Sets the default page size.
    pub fn with_default_limit(mut self, limit: u64) -> Self {
        self.default_limit = limit;
        self
    }

    /// Sets the largest accepted page size.
    pub fn with_max_limit(mut self, limit: u64) -> Self {
        self.max_limit = limit;
        self
    }

    /// Returns the search wait timeout.
    pub fn search_timeout(&self) -> Duration {
        Duration::from_millis(self.search_timeout_ms)
    }

    /// Returns the transport timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn problems(&self, out: &mut Vec<String>) {
        if self.nodes.is_empty() {
            out.push("search.nodes must not be empty".to_string());
        }
        if self.search_timeout_ms == 0 {
            out.push("search.search_timeout_ms must be positive".to_string());
        }
        if self.default_limit == 0 {
            out.push("search.default_limit must be positive".to_string());
        }
        if self.default_limit > self.max_limit {
            out.push(format!(
                "search.default_limit ({}) exceeds search.max_limit ({})",
                self.default_limit, self.max_limit
            ));
        }
    }
}

/// Settings for the whole layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataAccessConfig {
    /// Column-store settings.
    #[serde(default)]
    pub column_store: ColumnStoreConfig,

    /// Search-index settings.
    #[serde(default)]
    pub search: SearchConfig,

    /// Worker threads running asynchronous read callbacks (default: 2).
    #[serde(default = "default_callback_workers")]
    pub callback_workers: usize,
}

fn default_callback_workers() -> usize {
    2
}

impl Default for DataAccessConfig {
    fn default() -> Self {
        Self {
            column_store: ColumnStoreConfig::default(),
            search: SearchConfig::default(),
            callback_workers: default_callback_workers(),
        }
    }
}

impl DataAccessConfig {
    /// Replaces the column-store settings.
    pub fn with_column_store(mut self, column_store: ColumnStoreConfig) -> Self {
        self.column_store = column_store;
        self
    }

    /// Replaces the search settings.
    pub fn with_search(mut self, search: SearchConfig) -> Self {
        self.search = search;
        self
    }

    /// Declares a table key on the column store.
    pub fn with_table(mut self, table: TableKeyConfig) -> Self {
        self.column_store.tables.push(table);
        self
    }

    /// Sets the callback worker count.
    pub fn with_callback_workers(mut self, workers: usize) -> Self {
        self.callback_workers = workers;
        self
    }

    /// Returns every problem found; empty when the config is usable.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        self.column_store.problems(&mut problems);
        self.search.problems(&mut problems);
        if self.callback_workers == 0 {
            problems.push("callback_workers must be positive".to_string());
        }
        problems
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: DataAccessConfig = serde_json::from_value(json!({})).unwrap();
        assert_eq!(config.search.search_timeout_ms, 5000);
        assert_eq!(config.search.raw_suffix, ".raw");
        assert_eq!(config.search.default_limit, 10);
        assert_eq!(config.search.max_limit, 10000);
        assert_eq!(config.callback_workers, 2);
        assert!(config.validate().is_empty());
    }

    #[test]
    fn test_partial_document_keeps_other_defaults() {
        let config: DataAccessConfig = serde_json::from_value(json!({
            "search": {"nodes": ["http://es:9200"], "auth": {"Bearer": {"token": "t"}}},
            "column_store": {"tables": [{"keyspace": "ks", "table": "t", "partition": ["a"]}]}
        }))
        .unwrap();
        assert_eq!(config.search.nodes, vec!["http://es:9200"]);
        assert_eq!(config.search.auth, Some(SearchAuth::Bearer { token: "t".to_string() }));
        assert_eq!(config.search.search_timeout_ms, 5000);
        assert!(config.column_store.tables[0].clustering.is_empty());
    }

    #[test]
    fn test_validate_collects_all_problems() {
        let config = DataAccessConfig::default()
            .with_search(SearchConfig::default().with_default_limit(50).with_max_limit(20))
            .with_column_store(ColumnStoreConfig::default().with_contact_points(Vec::<String>::new()))
            .with_callback_workers(0);
        let problems = config.validate();
        assert_eq!(problems.len(), 3);
        assert!(problems[0].contains("contact_points"));
    }

    #[test]
    fn test_registry_from_declared_tables() {
        let config = ColumnStoreConfig::default().with_table(TableKeyConfig::new(
            "app",
            "user_org",
            ["userid"],
            ["orgid"],
        ));
        let registry = config.registry().unwrap();
        let schema = registry.get("app", "user_org");
        assert!(schema.is_key_column("orgid"));
        assert!(registry.get("app", "other").is_key_column("id"));
    }
}
