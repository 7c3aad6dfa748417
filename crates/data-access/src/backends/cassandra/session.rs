//! cdrs-tokio session wrapper.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use cdrs_tokio::authenticators::StaticPasswordAuthenticatorProvider;
use cdrs_tokio::cluster::session::{Session, SessionBuilder, TcpSessionBuilder};
use cdrs_tokio::cluster::{NodeTcpConfigBuilder, TcpConnectionManager};
use cdrs_tokio::load_balancing::RoundRobinLoadBalancingStrategy;
use cdrs_tokio::query::{BatchQueryBuilder, QueryValues};
use cdrs_tokio::transport::TransportTcp;
use cdrs_tokio::types::IntoRustByName;
use cdrs_tokio::types::value::Value as CqlValue;
use serde_json::Value;
use tracing::info;

use crate::column::{Dialect, Statement};
use crate::config::ColumnStoreConfig;
use crate::core::{BackendKind, ColumnSession, Connector, RowSet};
use crate::error::{BackendError, DriverError, FailureCause};
use crate::types::Record;

const BACKEND_NAME: &str = "cassandra";
const JSON_COLUMN: &str = "[json]";

type TcpSession = Session<
    TransportTcp,
    TcpConnectionManager,
    RoundRobinLoadBalancingStrategy<TransportTcp, TcpConnectionManager>,
>;

fn driver_error(err: cdrs_tokio::error::Error) -> DriverError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    let cause = if lower.contains("timeout") || lower.contains("timed out") {
        FailureCause::Timeout
    } else if lower.contains("unavailable")
        || lower.contains("no available")
        || lower.contains("connection")
    {
        FailureCause::Unavailable
    } else {
        FailureCause::Rejected
    };
    DriverError::new(cause, message)
}

/// Binds every value as JSON text for a `fromJson(?)` marker.
fn bind_values(values: &[Value]) -> QueryValues {
    QueryValues::SimpleValues(
        values
            .iter()
            .map(|value| CqlValue::from(value.to_string()))
            .collect(),
    )
}

/// A [`ColumnSession`] over a live cluster connection.
pub struct CassandraSession {
    session: TcpSession,
    keyspace: String,
}

impl Debug for CassandraSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CassandraSession")
            .field("keyspace", &self.keyspace)
            .finish_non_exhaustive()
    }
}

impl CassandraSession {
    /// Connects to the configured contact points.
    pub async fn connect(config: &ColumnStoreConfig, keyspace: &str) -> Result<Self, BackendError> {
        let failed = |message: String| BackendError::ConnectionFailed {
            backend_name: BACKEND_NAME.to_string(),
            namespace: keyspace.to_string(),
            message,
        };

        let mut builder = NodeTcpConfigBuilder::new();
        for point in &config.contact_points {
            builder = builder.with_contact_point(point.clone().into());
        }
        if let Some(credentials) = &config.credentials {
            builder = builder.with_authenticator_provider(Arc::new(
                StaticPasswordAuthenticatorProvider::new(
                    credentials.username.clone(),
                    credentials.password.clone(),
                ),
            ));
        }
        let cluster_config = builder
            .build()
            .await
            .map_err(|e| failed(format!("Invalid cluster configuration: {}", e)))?;

        let session = TcpSessionBuilder::new(RoundRobinLoadBalancingStrategy::new(), cluster_config)
            .build()
            .await
            .map_err(|e| failed(format!("Failed to open session: {}", e)))?;

        Ok(Self {
            session,
            keyspace: keyspace.to_string(),
        })
    }
}

#[async_trait]
impl ColumnSession for CassandraSession {
    fn kind(&self) -> BackendKind {
        BackendKind::Cassandra
    }

    async fn execute(&self, statement: &Statement) -> Result<RowSet, DriverError> {
        let text = statement.render(Dialect::Json);
        let envelope = self
            .session
            .query_with_values(text.cql, bind_values(&text.values))
            .await
            .map_err(driver_error)?;

        if !statement.is_read() {
            return Ok(RowSet::default());
        }

        let body = envelope.response_body().map_err(driver_error)?;
        let mut columns: Vec<String> = Vec::new();
        let mut records: Vec<Record> = Vec::new();
        for row in body.into_rows().unwrap_or_default() {
            let json: Option<String> = row.get_by_name(JSON_COLUMN).map_err(driver_error)?;
            let Some(json) = json else { continue };
            let record: Record = serde_json::from_str(&json).map_err(|e| {
                DriverError::new(FailureCause::Other, format!("Malformed JSON row: {}", e))
            })?;
            for name in record.keys() {
                if !columns.iter().any(|c| c == name) {
                    columns.push(name.clone());
                }
            }
            records.push(record);
        }
        Ok(RowSet::new(columns, records))
    }

    async fn execute_batch(&self, statements: &[Statement]) -> Result<(), DriverError> {
        let mut builder = BatchQueryBuilder::new();
        for statement in statements {
            let text = statement.render(Dialect::Json);
            builder = builder.add_query(text.cql, bind_values(&text.values));
        }
        let batch = builder.build().map_err(driver_error)?;
        self.session.batch(batch).await.map_err(driver_error)?;
        Ok(())
    }
}

/// Opens one [`CassandraSession`] per keyspace.
#[derive(Debug, Clone)]
pub struct CassandraConnector {
    config: ColumnStoreConfig,
}

impl CassandraConnector {
    /// Creates a connector.
    pub fn new(config: ColumnStoreConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector<dyn ColumnSession> for CassandraConnector {
    async fn connect(&self, namespace: &str) -> Result<Arc<dyn ColumnSession>, BackendError> {
        let session = CassandraSession::connect(&self.config, namespace).await?;
        info!(
            keyspace = namespace,
            contact_points = ?self.config.contact_points,
            "Opened Cassandra session"
        );
        Ok(Arc::new(session))
    }
}
