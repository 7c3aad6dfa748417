//! The uniform response envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::record::Record;

/// One bucket of a facet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FacetValue {
    /// Bucket key.
    pub name: Value,
    /// Number of matching documents in the bucket.
    pub count: u64,
}

/// Buckets computed for one requested field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Facet {
    /// The requested field.
    pub name: String,
    /// Buckets in backend order.
    pub values: Vec<FacetValue>,
}

/// Result of any operation: records, a total count and optional facets.
///
/// Built once per call and handed to the caller by value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationResponse {
    /// Returned records in backend order.
    pub records: Vec<Record>,
    /// Total number of matches; for searches this is the backend's hit total,
    /// not the page size.
    pub count: u64,
    /// Facets, present only when requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facets: Option<Vec<Facet>>,
}

impl OperationResponse {
    /// Response of a write: no records, zero count.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Wraps records whose count is the number of records.
    pub fn from_records(records: Vec<Record>) -> Self {
        let count = records.len() as u64;
        Self {
            records,
            count,
            facets: None,
        }
    }

    /// Returns the first record, if any.
    pub fn first(&self) -> Option<&Record> {
        self.records.first()
    }

    /// Returns true if no record was returned.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the facet computed for `field`.
    pub fn facet(&self, field: &str) -> Option<&Facet> {
        self.facets
            .as_ref()
            .and_then(|facets| facets.iter().find(|f| f.name == field))
    }
}
