//! The search-index client seam.

use std::fmt::Debug;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::DriverError;
use crate::types::Record;

use super::BackendKind;

/// A live search-index client.
///
/// Bodies in and out use the Elasticsearch wire shapes, so the in-memory
/// index and the real client are interchangeable.
#[async_trait]
pub trait SearchClient: Send + Sync + Debug {
    /// Returns the kind of backend.
    fn kind(&self) -> BackendKind;

    /// Runs a search body and returns the raw response body.
    async fn search(&self, index: &str, body: Value) -> Result<Value, DriverError>;

    /// Stores a document under `id`, replacing an existing one.
    async fn index(&self, index: &str, id: &str, document: &Record) -> Result<(), DriverError>;

    /// Fetches a document; `None` if it does not exist.
    async fn get(&self, index: &str, id: &str) -> Result<Option<Record>, DriverError>;

    /// Merges `partial` into a document. With `upsert`, a missing document
    /// is created from `partial`; otherwise returns false for a missing one.
    async fn update(
        &self,
        index: &str,
        id: &str,
        partial: &Record,
        upsert: bool,
    ) -> Result<bool, DriverError>;

    /// Deletes a document; returns false if it did not exist.
    async fn delete(&self, index: &str, id: &str) -> Result<bool, DriverError>;

    /// Stores several documents in one request.
    async fn bulk_index(&self, index: &str, documents: &[(String, Record)]) -> Result<(), DriverError>;

    /// Fetches several documents; returns the raw `mget` body.
    async fn mget(&self, index: &str, ids: &[String], fields: &[String]) -> Result<Value, DriverError>;

    /// Returns true if the cluster reports green or yellow.
    async fn health(&self) -> Result<bool, DriverError>;
}
