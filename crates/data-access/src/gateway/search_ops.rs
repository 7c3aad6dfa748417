//! Search-index operations.

use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use serde_json::{Map, Value};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::core::SearchClient;
use crate::error::{
    DataAccessResult, DriverError, OperationContext, ValidationError, classify, timed_out,
};
use crate::normalize::{normalize_hits, normalize_mget};
use crate::search::EsQueryBuilder;
use crate::types::{ID_COLUMN, OperationResponse, Record, SearchRequest, require_non_blank};

use super::DataAccess;

/// Namespace under which the cluster-level client is pooled.
const CLUSTER_NAMESPACE: &str = "_cluster";

impl DataAccess {
    /// Runs one document call against the client for `index`, timing it
    /// and classifying failures.
    async fn document_call<T, F, Fut>(
        &self,
        operation: &'static str,
        index: &str,
        call: F,
    ) -> DataAccessResult<T>
    where
        F: FnOnce(Arc<dyn SearchClient>) -> Fut,
        Fut: Future<Output = Result<T, DriverError>>,
    {
        require_non_blank(index, "index")?;
        let client = self.inner.clients.get(index).await?;
        let start = Instant::now();
        let outcome = call(client).await;
        let elapsed = start.elapsed();
        debug!(
            operation,
            index,
            elapsed_ms = elapsed.as_millis() as u64,
            "{} completed in {}",
            operation,
            humantime::format_duration(elapsed)
        );
        outcome.map_err(|driver| {
            let err = classify(&OperationContext::new(operation, index, index), elapsed, driver);
            error!(operation, index, error = %err, "Search index operation failed");
            err
        })
    }

    /// Runs a search and returns the page of documents, the total number
    /// of matches and the requested facets.
    ///
    /// The request is validated against the configured maximum page size.
    /// The call waits at most the configured search timeout.
    pub async fn search(
        &self,
        index: &str,
        request: &SearchRequest,
    ) -> DataAccessResult<OperationResponse> {
        let settings = &self.inner.config.search;
        require_non_blank(index, "index")?;
        request.validate(settings.max_limit).map_err(|err| {
            warn!(operation = "search", index, error = %err, "Rejected search request");
            err
        })?;

        let query = EsQueryBuilder::new(index)
            .raw_suffix(&settings.raw_suffix)
            .default_limit(settings.default_limit)
            .build(request);

        let context = OperationContext::new("search", index, index);
        let client = self.inner.clients.get(index).await?;
        let wait = settings.search_timeout();
        let start = Instant::now();
        let outcome = tokio::time::timeout(wait, client.search(&query.index, query.body.clone())).await;
        let elapsed = start.elapsed();

        debug!(
            operation = "search",
            index,
            body = %query.body,
            elapsed_ms = elapsed.as_millis() as u64,
            "search completed in {}",
            humantime::format_duration(elapsed)
        );

        match outcome {
            Ok(Ok(body)) => Ok(normalize_hits(&body, &request.facets)),
            Ok(Err(driver)) => {
                let err = classify(&context, elapsed, driver);
                error!(operation = "search", index, body = %query.body, error = %err, "Search failed");
                Err(err)
            }
            Err(_) => {
                let err = timed_out(&context, wait);
                error!(operation = "search", index, body = %query.body, error = %err, "Search timed out");
                Err(err)
            }
        }
    }

    /// Stores a document and returns its id. A fresh id is generated when
    /// none is given.
    pub async fn save(
        &self,
        index: &str,
        id: Option<&str>,
        document: &Record,
    ) -> DataAccessResult<String> {
        let id = match id {
            Some(id) => {
                require_non_blank(id, "document id")?;
                id.to_string()
            }
            None => Uuid::new_v4().to_string(),
        };
        self.document_call("save", index, |client| {
            let id = id.clone();
            async move { client.index(index, &id, document).await }
        })
        .await?;
        Ok(id)
    }

    /// Merges `partial` into an existing document. Returns false if the
    /// document does not exist.
    pub async fn update(&self, index: &str, id: &str, partial: &Record) -> DataAccessResult<bool> {
        require_non_blank(id, "document id")?;
        self.document_call("update", index, |client| async move {
            client.update(index, id, partial, false).await
        })
        .await
    }

    /// Merges `document` into an existing document, creating it if absent.
    pub async fn upsert(&self, index: &str, id: &str, document: &Record) -> DataAccessResult<bool> {
        require_non_blank(id, "document id")?;
        self.document_call("upsert", index, |client| async move {
            client.update(index, id, document, true).await
        })
        .await
    }

    /// Fetches a document; missing documents yield an empty record.
    pub async fn get_by_id(&self, index: &str, id: &str) -> DataAccessResult<Record> {
        require_non_blank(id, "document id")?;
        let found = self
            .document_call("get_by_id", index, |client| async move {
                client.get(index, id).await
            })
            .await?;
        Ok(found.unwrap_or_default())
    }

    /// Deletes a document. Returns false if it did not exist.
    pub async fn delete(&self, index: &str, id: &str) -> DataAccessResult<bool> {
        require_non_blank(id, "document id")?;
        self.document_call("delete", index, |client| async move {
            client.delete(index, id).await
        })
        .await
    }

    /// Stores several documents in one request. Each document carries its
    /// own `id`.
    pub async fn bulk_insert(&self, index: &str, documents: &[Record]) -> DataAccessResult<()> {
        if documents.is_empty() {
            return Err(ValidationError::EmptyBatch.into());
        }
        let keyed = documents
            .iter()
            .map(|document| match document.get(ID_COLUMN) {
                Some(Value::String(id)) if !id.trim().is_empty() => {
                    Ok((id.clone(), document.clone()))
                }
                Some(Value::Number(n)) => Ok((n.to_string(), document.clone())),
                _ => Err(ValidationError::MissingKeyColumn {
                    column: ID_COLUMN.to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.document_call("bulk_insert", index, |client| async move {
            client.bulk_index(index, &keyed).await
        })
        .await
    }

    /// Fetches several documents, restricted to `fields` when not empty.
    /// Returns id to document for the ids that exist.
    pub async fn get_by_ids(
        &self,
        index: &str,
        ids: &[&str],
        fields: &[&str],
    ) -> DataAccessResult<Map<String, Value>> {
        if ids.is_empty() {
            return Err(ValidationError::EmptyList { what: "document ids" }.into());
        }
        let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
        let fields: Vec<String> = fields.iter().map(|f| f.to_string()).collect();
        let body = self
            .document_call("get_by_ids", index, |client| async move {
                client.mget(index, &ids, &fields).await
            })
            .await?;
        Ok(normalize_mget(&body))
    }

    /// Returns true if the search cluster reports itself usable.
    pub async fn health_check(&self) -> DataAccessResult<bool> {
        let client = self.inner.clients.get(CLUSTER_NAMESPACE).await?;
        match client.health().await {
            Ok(healthy) => Ok(healthy),
            Err(err) => {
                warn!(error = %err, "Search cluster health check failed");
                Ok(false)
            }
        }
    }
}
