//! Facet aggregations and sort clauses.

use serde_json::{Map, Value, json};

use crate::types::{AggregationKind, FacetRequest, SortSpec};

/// Builds the `aggs` section, one aggregation per facet named after its field.
///
/// Returns `None` when no facet is requested.
pub fn build_aggregations(facets: &[FacetRequest], raw_suffix: &str) -> Option<Value> {
    if facets.is_empty() {
        return None;
    }
    let mut aggs = Map::new();
    for facet in facets {
        let raw = format!("{}{}", facet.field, raw_suffix);
        let aggregation = match facet.kind {
            AggregationKind::DateHistogram => json!({
                "date_histogram": {
                    "field": raw,
                    "calendar_interval": "1d"
                }
            }),
            AggregationKind::Terms => json!({
                "terms": { "field": raw }
            }),
        };
        aggs.insert(facet.field.clone(), aggregation);
    }
    Some(Value::Object(aggs))
}

/// Builds the `sort` section on the raw sub-fields, in priority order.
pub fn build_sort(sort: &[SortSpec], raw_suffix: &str) -> Option<Value> {
    if sort.is_empty() {
        return None;
    }
    let clauses = sort
        .iter()
        .map(|spec| {
            let mut clause = Map::new();
            clause.insert(
                format!("{}{}", spec.field, raw_suffix),
                json!({ "order": spec.direction.as_str() }),
            );
            Value::Object(clause)
        })
        .collect();
    Some(Value::Array(clauses))
}
