//! Elasticsearch client implementation.

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use elasticsearch::auth::Credentials;
use elasticsearch::cert::CertificateValidation;
use elasticsearch::cluster::ClusterHealthParts;
use elasticsearch::http::response::Response;
use elasticsearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use elasticsearch::{
    BulkOperation, BulkParts, DeleteParts, Elasticsearch, GetParts, IndexParts, MgetParts,
    SearchParts, UpdateParts,
};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::{SearchAuth, SearchConfig};
use crate::core::{BackendKind, Connector, SearchClient};
use crate::error::{BackendError, DriverError, FailureCause};
use crate::types::Record;

const BACKEND_NAME: &str = "elasticsearch";

fn transport_error(err: elasticsearch::Error) -> DriverError {
    let cause = if err.is_timeout() {
        FailureCause::Timeout
    } else {
        FailureCause::Unavailable
    };
    DriverError::new(cause, err.to_string())
}

/// Turns a non-success response into a driver error carrying the body text.
async fn status_error(response: Response) -> DriverError {
    let status = response.status_code();
    let body = response.text().await.unwrap_or_default();
    let cause = match status.as_u16() {
        429 | 502..=504 => FailureCause::Unavailable,
        400..=499 => FailureCause::Rejected,
        _ => FailureCause::Other,
    };
    DriverError::new(cause, format!("status {}: {}", status, body))
}

async fn json_body(response: Response) -> Result<Value, DriverError> {
    response
        .json::<Value>()
        .await
        .map_err(|e| DriverError::new(FailureCause::Other, format!("Failed to parse response: {}", e)))
}

/// A [`SearchClient`] backed by an Elasticsearch cluster.
pub struct ElasticsearchClient {
    client: Elasticsearch,
    config: SearchConfig,
}

impl Debug for ElasticsearchClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchClient")
            .field("nodes", &self.config.nodes)
            .finish_non_exhaustive()
    }
}

impl ElasticsearchClient {
    /// Creates a client from configuration. No request is sent.
    pub fn new(config: SearchConfig) -> Result<Self, BackendError> {
        let client = Self::build_client(&config)?;
        Ok(Self { client, config })
    }

    fn build_client(config: &SearchConfig) -> Result<Elasticsearch, BackendError> {
        let url = config
            .nodes
            .first()
            .cloned()
            .unwrap_or_else(|| "http://localhost:9200".to_string());

        let parsed_url: elasticsearch::http::Url =
            url.parse().map_err(|e| BackendError::ConnectionFailed {
                backend_name: BACKEND_NAME.to_string(),
                namespace: url.clone(),
                message: format!("Invalid URL: {}", e),
            })?;

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let mut builder = TransportBuilder::new(conn_pool).timeout(config.request_timeout());

        if config.disable_certificate_validation {
            builder = builder.cert_validation(CertificateValidation::None);
        }

        if let Some(ref auth) = config.auth {
            builder = match auth {
                SearchAuth::Basic { username, password } => {
                    builder.auth(Credentials::Basic(username.clone(), password.clone()))
                }
                SearchAuth::Bearer { token } => builder.auth(Credentials::Bearer(token.clone())),
            };
        }

        let transport = builder.build().map_err(|e| BackendError::ConnectionFailed {
            backend_name: BACKEND_NAME.to_string(),
            namespace: url,
            message: format!("Failed to build transport: {}", e),
        })?;

        Ok(Elasticsearch::new(transport))
    }

    /// Refreshes an index so recent writes become searchable.
    ///
    /// Only needed by tests; the cluster refreshes on its own schedule.
    pub async fn refresh(&self, index: &str) -> Result<(), DriverError> {
        let response = self
            .client
            .indices()
            .refresh(elasticsearch::indices::IndicesRefreshParts::Index(&[index]))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status_code().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }
}

#[async_trait]
impl SearchClient for ElasticsearchClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Elasticsearch
    }

    async fn search(&self, index: &str, body: Value) -> Result<Value, DriverError> {
        let response = self
            .client
            .search(SearchParts::Index(&[index]))
            .body(body)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status_code().is_success() {
            return Err(status_error(response).await);
        }
        json_body(response).await
    }

    async fn index(&self, index: &str, id: &str, document: &Record) -> Result<(), DriverError> {
        let response = self
            .client
            .index(IndexParts::IndexId(index, id))
            .body(Value::Object(document.clone()))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status_code().is_success() {
            return Err(status_error(response).await);
        }
        Ok(())
    }

    async fn get(&self, index: &str, id: &str) -> Result<Option<Record>, DriverError> {
        let response = self
            .client
            .get(GetParts::IndexId(index, id))
            .send()
            .await
            .map_err(transport_error)?;
        if response.status_code().as_u16() == 404 {
            return Ok(None);
        }
        if !response.status_code().is_success() {
            return Err(status_error(response).await);
        }
        let body = json_body(response).await?;
        Ok(body.get("_source").and_then(Value::as_object).cloned())
    }

    async fn update(
        &self,
        index: &str,
        id: &str,
        partial: &Record,
        upsert: bool,
    ) -> Result<bool, DriverError> {
        let response = self
            .client
            .update(UpdateParts::IndexId(index, id))
            .body(json!({ "doc": partial, "doc_as_upsert": upsert }))
            .send()
            .await
            .map_err(transport_error)?;
        if response.status_code().as_u16() == 404 {
            return Ok(false);
        }
        if !response.status_code().is_success() {
            return Err(status_error(response).await);
        }
        Ok(true)
    }

    async fn delete(&self, index: &str, id: &str) -> Result<bool, DriverError> {
        let response = self
            .client
            .delete(DeleteParts::IndexId(index, id))
            .send()
            .await
            .map_err(transport_error)?;
        if response.status_code().as_u16() == 404 {
            return Ok(false);
        }
        if !response.status_code().is_success() {
            return Err(status_error(response).await);
        }
        Ok(true)
    }

    async fn bulk_index(
        &self,
        index: &str,
        documents: &[(String, Record)],
    ) -> Result<(), DriverError> {
        let operations: Vec<BulkOperation<Value>> = documents
            .iter()
            .map(|(id, document)| {
                BulkOperation::index(Value::Object(document.clone()))
                    .id(id.as_str())
                    .into()
            })
            .collect();

        let response = self
            .client
            .bulk(BulkParts::Index(index))
            .body(operations)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status_code().is_success() {
            return Err(status_error(response).await);
        }

        let body = json_body(response).await?;
        if body.get("errors").and_then(Value::as_bool) == Some(true) {
            let first = body
                .get("items")
                .and_then(Value::as_array)
                .and_then(|items| {
                    items
                        .iter()
                        .find_map(|item| item.get("index").and_then(|op| op.get("error")))
                })
                .map(Value::to_string)
                .unwrap_or_default();
            return Err(DriverError::rejected(format!("bulk request had failures: {}", first)));
        }
        debug!(index, count = documents.len(), "Bulk indexed documents");
        Ok(())
    }

    async fn mget(
        &self,
        index: &str,
        ids: &[String],
        fields: &[String],
    ) -> Result<Value, DriverError> {
        let docs: Vec<Value> = ids
            .iter()
            .map(|id| {
                if fields.is_empty() {
                    json!({ "_id": id })
                } else {
                    json!({ "_id": id, "_source": fields })
                }
            })
            .collect();

        let response = self
            .client
            .mget(MgetParts::Index(index))
            .body(json!({ "docs": docs }))
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status_code().is_success() {
            return Err(status_error(response).await);
        }
        json_body(response).await
    }

    async fn health(&self) -> Result<bool, DriverError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status_code().is_success() {
            return Ok(false);
        }
        let body = json_body(response).await?;
        let status = body.get("status").and_then(Value::as_str).unwrap_or("unknown");
        Ok(matches!(status, "green" | "yellow"))
    }
}

/// Builds one [`ElasticsearchClient`] per index.
#[derive(Debug, Clone)]
pub struct ElasticsearchConnector {
    config: SearchConfig,
}

impl ElasticsearchConnector {
    /// Creates a connector.
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Connector<dyn SearchClient> for ElasticsearchConnector {
    async fn connect(&self, namespace: &str) -> Result<Arc<dyn SearchClient>, BackendError> {
        let client = ElasticsearchClient::new(self.config.clone())?;
        info!(index = namespace, nodes = ?self.config.nodes, "Built Elasticsearch client");
        Ok(Arc::new(client))
    }
}
