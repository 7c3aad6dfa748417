//! Result normalization.
//!
//! Both backends return their own result shapes: rows from the column store,
//! hits and aggregation buckets from the search index. The functions here
//! turn either into an [`OperationResponse`].

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::core::RowSet;
use crate::types::{AggregationKind, Facet, FacetRequest, FacetValue, OperationResponse, Record};

/// Renames physical column names to the logical names callers use.
///
/// Built from a logical to physical map. Columns without an entry keep their
/// physical name.
#[derive(Debug, Clone, Default)]
pub struct ColumnMapping {
    to_logical: HashMap<String, String>,
}

impl ColumnMapping {
    /// Creates a mapping from logical to physical names.
    pub fn new(logical_to_physical: &HashMap<String, String>) -> Self {
        Self {
            to_logical: logical_to_physical
                .iter()
                .map(|(logical, physical)| (physical.clone(), logical.clone()))
                .collect(),
        }
    }

    /// Returns the logical name for a physical column.
    pub fn logical<'a>(&'a self, physical: &'a str) -> &'a str {
        self.to_logical
            .get(physical)
            .map(String::as_str)
            .unwrap_or(physical)
    }

    /// Resolves every column of a result set once.
    fn resolve(&self, columns: &[String]) -> Vec<(String, String)> {
        columns
            .iter()
            .map(|physical| (physical.clone(), self.logical(physical).to_string()))
            .collect()
    }
}

/// Converts a row set into a response whose count is the number of rows.
pub fn normalize_rows(rows: RowSet, mapping: &ColumnMapping) -> OperationResponse {
    let resolved = mapping.resolve(&rows.columns);
    let records = rows
        .rows
        .into_iter()
        .map(|mut row| {
            resolved
                .iter()
                .map(|(physical, logical)| {
                    let value = row.remove(physical).unwrap_or(Value::Null);
                    (logical.clone(), value)
                })
                .collect::<Record>()
        })
        .collect();
    OperationResponse::from_records(records)
}

/// Converts a search response body into records, total count and facets.
///
/// Each hit's `_source` is returned as stored. The count is the backend's
/// total, not the page size. Facets follow the order of `requested`; a
/// requested facet missing from the body yields an empty bucket list.
pub fn normalize_hits(body: &Value, requested: &[FacetRequest]) -> OperationResponse {
    let records = body
        .pointer("/hits/hits")
        .and_then(Value::as_array)
        .map(|hits| {
            hits.iter()
                .map(|hit| {
                    hit.get("_source")
                        .and_then(Value::as_object)
                        .cloned()
                        .unwrap_or_default()
                })
                .collect()
        })
        .unwrap_or_default();

    let count = match body.pointer("/hits/total") {
        Some(Value::Object(total)) => total.get("value").and_then(Value::as_u64),
        Some(total) => total.as_u64(),
        None => None,
    }
    .unwrap_or(0);

    let facets = (!requested.is_empty()).then(|| {
        requested
            .iter()
            .map(|facet| Facet {
                name: facet.field.clone(),
                values: buckets(body, facet),
            })
            .collect()
    });

    OperationResponse {
        records,
        count,
        facets,
    }
}

fn buckets(body: &Value, facet: &FacetRequest) -> Vec<FacetValue> {
    let Some(buckets) = body
        .get("aggregations")
        .and_then(|aggs| aggs.get(&facet.field))
        .and_then(|agg| agg.get("buckets"))
        .and_then(Value::as_array)
    else {
        return Vec::new();
    };

    buckets
        .iter()
        .map(|bucket| {
            let name = match facet.kind {
                AggregationKind::DateHistogram => bucket
                    .get("key_as_string")
                    .or_else(|| bucket.get("key"))
                    .cloned(),
                AggregationKind::Terms => bucket.get("key").cloned(),
            }
            .unwrap_or(Value::Null);
            FacetValue {
                name,
                count: bucket.get("doc_count").and_then(Value::as_u64).unwrap_or(0),
            }
        })
        .collect()
}

/// Collects an `mget` response into id to document, skipping missing ids.
pub fn normalize_mget(body: &Value) -> Map<String, Value> {
    body.get("docs")
        .and_then(Value::as_array)
        .map(|docs| {
            docs.iter()
                .filter(|doc| doc.get("found").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|doc| {
                    let id = doc.get("_id")?.as_str()?.to_string();
                    Some((id, doc.get("_source").cloned().unwrap_or(Value::Null)))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_rows_renamed_once_per_result_set() {
        let mapping = ColumnMapping::new(&HashMap::from([(
            "firstName".to_string(),
            "firstname".to_string(),
        )]));
        let rows = RowSet {
            columns: vec!["id".to_string(), "firstname".to_string()],
            rows: vec![
                row(json!({"id": "u1", "firstname": "Ann"})),
                row(json!({"id": "u2"})),
            ],
        };
        let response = normalize_rows(rows, &mapping);
        assert_eq!(response.count, 2);
        assert_eq!(response.records[0], row(json!({"id": "u1", "firstName": "Ann"})));
        assert_eq!(response.records[1], row(json!({"id": "u2", "firstName": null})));
        assert!(response.facets.is_none());
    }

    #[test]
    fn test_empty_rows_not_an_error() {
        let response = normalize_rows(RowSet::default(), &ColumnMapping::default());
        assert_eq!(response, OperationResponse::empty());
    }

    #[test]
    fn test_hits_count_from_total() {
        let body = json!({
            "hits": {
                "total": {"value": 42, "relation": "eq"},
                "hits": [
                    {"_id": "1", "_source": {"id": "1", "name": "Ann"}},
                    {"_id": "2", "_source": {"id": "2", "name": "Bob"}}
                ]
            }
        });
        let response = normalize_hits(&body, &[]);
        assert_eq!(response.count, 42);
        assert_eq!(response.records.len(), 2);
        assert_eq!(response.records[1]["name"], json!("Bob"));
        assert!(response.facets.is_none());
    }

    #[test]
    fn test_legacy_numeric_total() {
        let body = json!({"hits": {"total": 3, "hits": []}});
        assert_eq!(normalize_hits(&body, &[]).count, 3);
    }

    #[test]
    fn test_facets_follow_request_order() {
        let body = json!({
            "hits": {"total": {"value": 0}, "hits": []},
            "aggregations": {
                "createdDate": {"buckets": [
                    {"key": 1704067200000_i64, "key_as_string": "2024-01-01T00:00:00.000Z", "doc_count": 2}
                ]},
                "city": {"buckets": [
                    {"key": "pune", "doc_count": 3},
                    {"key": "goa", "doc_count": 1}
                ]}
            }
        });
        let requested = vec![
            FacetRequest {
                field: "city".to_string(),
                kind: AggregationKind::Terms,
            },
            FacetRequest {
                field: "createdDate".to_string(),
                kind: AggregationKind::DateHistogram,
            },
            FacetRequest {
                field: "state".to_string(),
                kind: AggregationKind::Terms,
            },
        ];
        let facets = normalize_hits(&body, &requested).facets.unwrap();
        assert_eq!(facets[0].name, "city");
        assert_eq!(facets[0].values[0], FacetValue { name: json!("pune"), count: 3 });
        assert_eq!(facets[1].values[0].name, json!("2024-01-01T00:00:00.000Z"));
        assert!(facets[2].values.is_empty());
    }

    #[test]
    fn test_mget_skips_missing() {
        let body = json!({"docs": [
            {"_id": "a", "found": true, "_source": {"name": "Ann"}},
            {"_id": "b", "found": false}
        ]});
        let docs = normalize_mget(&body);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs["a"], json!({"name": "Ann"}));
    }
}
