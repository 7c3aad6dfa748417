//! In-memory search index.
//!
//! Stores documents per index and answers search bodies in the
//! Elasticsearch response shape: hits with a total, and `terms` or
//! `date_histogram` aggregations.

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use parking_lot::RwLock;
use serde_json::{Map, Value, json};
use tracing::trace;

use crate::core::{BackendKind, SearchClient};
use crate::error::DriverError;
use crate::types::Record;

use super::column_store::compare;
use super::query_eval::Evaluator;

const DEFAULT_TERMS_SIZE: usize = 10;
const DAY_MILLIS: i64 = 86_400_000;

fn index_not_found(index: &str) -> DriverError {
    DriverError::rejected(format!(
        "index_not_found_exception: no such index [{}]",
        index
    ))
}

/// An in-process document index.
#[derive(Debug)]
pub struct MemorySearchIndex {
    raw_suffix: String,
    indices: RwLock<HashMap<String, Vec<(String, Record)>>>,
}

impl Default for MemorySearchIndex {
    fn default() -> Self {
        Self::new(".raw")
    }
}

impl MemorySearchIndex {
    /// Creates an empty index set whose raw sub-fields use `raw_suffix`.
    pub fn new(raw_suffix: impl Into<String>) -> Self {
        Self {
            raw_suffix: raw_suffix.into(),
            indices: RwLock::new(HashMap::new()),
        }
    }

    /// Creates an empty index so searches against it succeed.
    pub fn create_index(&self, index: &str) {
        self.indices.write().entry(index.to_string()).or_default();
    }

    /// Number of documents in an index.
    pub fn document_count(&self, index: &str) -> usize {
        self.indices.read().get(index).map_or(0, Vec::len)
    }

    fn put(docs: &mut Vec<(String, Record)>, id: &str, document: Record) {
        match docs.iter_mut().find(|(existing, _)| existing == id) {
            Some(entry) => entry.1 = document,
            None => docs.push((id.to_string(), document)),
        }
    }

    fn run_search(&self, index: &str, body: &Value) -> Result<Value, DriverError> {
        let indices = self.indices.read();
        let docs = indices.get(index).ok_or_else(|| index_not_found(index))?;
        let evaluator = Evaluator::new(&self.raw_suffix);

        let query = body.get("query").cloned().unwrap_or(json!({"match_all": {}}));
        let mut hits: Vec<(f64, &String, Value)> = Vec::new();
        for (id, document) in docs {
            let doc = Value::Object(document.clone());
            if let Some(score) = evaluator.score(&query, &doc)? {
                hits.push((score, id, doc));
            }
        }

        match body.get("sort").and_then(Value::as_array) {
            Some(sort) => {
                let keys = sort_keys(sort)?;
                hits.sort_by(|a, b| {
                    for (field, descending) in &keys {
                        let left = evaluator.values(&a.2, field).into_iter().next();
                        let right = evaluator.values(&b.2, field).into_iter().next();
                        let ordering = match (left, right) {
                            (Some(l), Some(r)) => {
                                let o = compare(&l, &r).unwrap_or(Ordering::Equal);
                                if *descending { o.reverse() } else { o }
                            }
                            (Some(_), None) => Ordering::Less,
                            (None, Some(_)) => Ordering::Greater,
                            (None, None) => Ordering::Equal,
                        };
                        if ordering != Ordering::Equal {
                            return ordering;
                        }
                    }
                    Ordering::Equal
                });
            }
            None => hits.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal)),
        }

        let total = hits.len();
        let aggregations = match body.get("aggs").or_else(|| body.get("aggregations")) {
            Some(aggs) => Some(aggregate(&evaluator, aggs, &hits)?),
            None => None,
        };

        let from = body.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;
        let size = body.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
        let source_fields: Option<Vec<&str>> = body
            .get("_source")
            .and_then(Value::as_array)
            .map(|fields| fields.iter().filter_map(Value::as_str).collect());

        let page: Vec<Value> = hits
            .iter()
            .skip(from)
            .take(size)
            .map(|(score, id, doc)| {
                let source = match &source_fields {
                    Some(fields) => filter_source(doc, fields),
                    None => doc.clone(),
                };
                json!({
                    "_index": index,
                    "_id": id,
                    "_score": score,
                    "_source": source
                })
            })
            .collect();

        let mut response = json!({
            "took": 0,
            "timed_out": false,
            "hits": {
                "total": { "value": total, "relation": "eq" },
                "hits": page
            }
        });
        if let Some(aggregations) = aggregations {
            response["aggregations"] = aggregations;
        }
        Ok(response)
    }
}

fn sort_keys(sort: &[Value]) -> Result<Vec<(String, bool)>, DriverError> {
    sort.iter()
        .map(|clause| {
            let (field, spec) = clause
                .as_object()
                .and_then(|m| m.iter().next())
                .ok_or_else(|| DriverError::rejected("parsing_exception: malformed sort"))?;
            let descending = spec.get("order").and_then(Value::as_str) == Some("desc");
            Ok((field.clone(), descending))
        })
        .collect()
}

fn filter_source(doc: &Value, fields: &[&str]) -> Value {
    let Some(map) = doc.as_object() else {
        return doc.clone();
    };
    Value::Object(
        map.iter()
            .filter(|(key, _)| fields.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect(),
    )
}

fn aggregate(
    evaluator: &Evaluator<'_>,
    aggs: &Value,
    hits: &[(f64, &String, Value)],
) -> Result<Value, DriverError> {
    let aggs = aggs
        .as_object()
        .ok_or_else(|| DriverError::rejected("parsing_exception: aggs must be an object"))?;
    let mut out = Map::new();
    for (name, spec) in aggs {
        let result = if let Some(terms) = spec.get("terms") {
            terms_buckets(evaluator, terms, hits)?
        } else if let Some(histogram) = spec.get("date_histogram") {
            date_buckets(evaluator, histogram, hits)?
        } else {
            return Err(DriverError::rejected(format!(
                "parsing_exception: unsupported aggregation [{}]",
                name
            )));
        };
        out.insert(name.clone(), result);
    }
    Ok(Value::Object(out))
}

fn agg_field(spec: &Value) -> Result<&str, DriverError> {
    spec.get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| DriverError::rejected("parsing_exception: aggregation requires a field"))
}

fn terms_buckets(
    evaluator: &Evaluator<'_>,
    spec: &Value,
    hits: &[(f64, &String, Value)],
) -> Result<Value, DriverError> {
    let field = agg_field(spec)?;
    let size = spec
        .get("size")
        .and_then(Value::as_u64)
        .map_or(DEFAULT_TERMS_SIZE, |s| s as usize);

    let mut counts: Vec<(Value, u64)> = Vec::new();
    for (_, _, doc) in hits {
        let mut seen: Vec<Value> = Vec::new();
        for value in evaluator.values(doc, field) {
            if seen.contains(&value) {
                continue;
            }
            match counts.iter_mut().find(|(key, _)| *key == value) {
                Some(entry) => entry.1 += 1,
                None => counts.push((value.clone(), 1)),
            }
            seen.push(value);
        }
    }
    counts.sort_by(|a, b| {
        b.1.cmp(&a.1)
            .then_with(|| compare(&a.0, &b.0).unwrap_or(Ordering::Equal))
    });

    let buckets: Vec<Value> = counts
        .into_iter()
        .take(size)
        .map(|(key, count)| json!({ "key": key, "doc_count": count }))
        .collect();
    Ok(json!({ "buckets": buckets }))
}

fn parse_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| dt.timestamp_millis())
            .ok()
            .or_else(|| {
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| Utc.from_utc_datetime(&dt).timestamp_millis())
            }),
        _ => None,
    }
}

fn date_buckets(
    evaluator: &Evaluator<'_>,
    spec: &Value,
    hits: &[(f64, &String, Value)],
) -> Result<Value, DriverError> {
    let field = agg_field(spec)?;
    let mut days: Vec<i64> = Vec::new();
    for (_, _, doc) in hits {
        if let Some(millis) = evaluator.source_values(doc, field).iter().find_map(parse_millis) {
            days.push(millis.div_euclid(DAY_MILLIS) * DAY_MILLIS);
        }
    }
    let (Some(&first), Some(&last)) = (days.iter().min(), days.iter().max()) else {
        return Ok(json!({ "buckets": [] }));
    };

    let mut buckets = Vec::new();
    let mut day = first;
    while day <= last {
        let count = days.iter().filter(|d| **d == day).count();
        let key_as_string = Utc
            .timestamp_millis_opt(day)
            .single()
            .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
            .unwrap_or_default();
        buckets.push(json!({
            "key_as_string": key_as_string,
            "key": day,
            "doc_count": count
        }));
        day += DAY_MILLIS;
    }
    Ok(json!({ "buckets": buckets }))
}

/// Recursively merges `patch` into `target`, as a partial document update.
fn merge(target: &mut Map<String, Value>, patch: &Map<String, Value>) {
    for (key, value) in patch {
        match (target.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => merge(existing, incoming),
            _ => {
                target.insert(key.clone(), value.clone());
            }
        }
    }
}

#[async_trait]
impl SearchClient for MemorySearchIndex {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn search(&self, index: &str, body: Value) -> Result<Value, DriverError> {
        trace!(index, body = %body, "Searching in memory");
        self.run_search(index, &body)
    }

    async fn index(&self, index: &str, id: &str, document: &Record) -> Result<(), DriverError> {
        let mut indices = self.indices.write();
        Self::put(indices.entry(index.to_string()).or_default(), id, document.clone());
        Ok(())
    }

    async fn get(&self, index: &str, id: &str) -> Result<Option<Record>, DriverError> {
        let indices = self.indices.read();
        Ok(indices
            .get(index)
            .and_then(|docs| docs.iter().find(|(existing, _)| existing == id))
            .map(|(_, doc)| doc.clone()))
    }

    async fn update(
        &self,
        index: &str,
        id: &str,
        partial: &Record,
        upsert: bool,
    ) -> Result<bool, DriverError> {
        let mut indices = self.indices.write();
        let docs = indices.entry(index.to_string()).or_default();
        match docs.iter_mut().find(|(existing, _)| existing == id) {
            Some((_, doc)) => {
                merge(doc, partial);
                Ok(true)
            }
            None if upsert => {
                docs.push((id.to_string(), partial.clone()));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, index: &str, id: &str) -> Result<bool, DriverError> {
        let mut indices = self.indices.write();
        let Some(docs) = indices.get_mut(index) else {
            return Ok(false);
        };
        let before = docs.len();
        docs.retain(|(existing, _)| existing != id);
        Ok(docs.len() < before)
    }

    async fn bulk_index(
        &self,
        index: &str,
        documents: &[(String, Record)],
    ) -> Result<(), DriverError> {
        let mut indices = self.indices.write();
        let docs = indices.entry(index.to_string()).or_default();
        for (id, document) in documents {
            Self::put(docs, id, document.clone());
        }
        Ok(())
    }

    async fn mget(
        &self,
        index: &str,
        ids: &[String],
        fields: &[String],
    ) -> Result<Value, DriverError> {
        let indices = self.indices.read();
        let field_refs: Vec<&str> = fields.iter().map(String::as_str).collect();
        let docs: Vec<Value> = ids
            .iter()
            .map(|id| {
                let found = indices
                    .get(index)
                    .and_then(|docs| docs.iter().find(|(existing, _)| existing == id));
                match found {
                    Some((_, doc)) => {
                        let doc = Value::Object(doc.clone());
                        let source = if field_refs.is_empty() {
                            doc
                        } else {
                            filter_source(&doc, &field_refs)
                        };
                        json!({"_index": index, "_id": id, "found": true, "_source": source})
                    }
                    None => json!({"_index": index, "_id": id, "found": false}),
                }
            })
            .collect();
        Ok(json!({ "docs": docs }))
    }

    async fn health(&self) -> Result<bool, DriverError> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    async fn seeded() -> MemorySearchIndex {
        let index = MemorySearchIndex::default();
        let docs = vec![
            ("1".to_string(), doc(json!({"name": "Ann", "city": "Pune", "createdDate": "2024-01-01T10:00:00Z"}))),
            ("2".to_string(), doc(json!({"name": "Bob", "city": "pune", "createdDate": "2024-01-03T09:00:00Z"}))),
            ("3".to_string(), doc(json!({"name": "Cid", "city": "Goa", "createdDate": "2024-01-01T23:00:00Z"}))),
        ];
        index.bulk_index("users", &docs).await.unwrap();
        index
    }

    #[tokio::test]
    async fn test_missing_index_is_an_error() {
        let index = MemorySearchIndex::default();
        let err = index.search("nope", json!({})).await.unwrap_err();
        assert!(err.message.contains("index_not_found_exception"));
    }

    #[tokio::test]
    async fn test_total_independent_of_page() {
        let index = seeded().await;
        let body = index
            .search("users", json!({"query": {"match_all": {}}, "from": 1, "size": 1}))
            .await
            .unwrap();
        assert_eq!(body["hits"]["total"]["value"], json!(3));
        assert_eq!(body["hits"]["hits"].as_array().unwrap().len(), 1);
        assert_eq!(body["hits"]["hits"][0]["_id"], json!("2"));
    }

    #[tokio::test]
    async fn test_terms_aggregation_normalized_keys() {
        let index = seeded().await;
        let body = index
            .search("users", json!({"aggs": {"city": {"terms": {"field": "city.raw"}}}}))
            .await
            .unwrap();
        assert_eq!(
            body["aggregations"]["city"]["buckets"],
            json!([{"key": "pune", "doc_count": 2}, {"key": "goa", "doc_count": 1}])
        );
    }

    #[tokio::test]
    async fn test_date_histogram_daily_buckets() {
        let index = seeded().await;
        let body = index
            .search(
                "users",
                json!({"aggs": {"createdDate": {"date_histogram": {"field": "createdDate.raw", "calendar_interval": "1d"}}}}),
            )
            .await
            .unwrap();
        let buckets = body["aggregations"]["createdDate"]["buckets"].as_array().unwrap();
        assert_eq!(buckets.len(), 3);
        assert_eq!(buckets[0]["key_as_string"], json!("2024-01-01T00:00:00.000Z"));
        assert_eq!(buckets[0]["doc_count"], json!(2));
        assert_eq!(buckets[1]["doc_count"], json!(0));
        assert_eq!(buckets[2]["doc_count"], json!(1));
    }

    #[tokio::test]
    async fn test_sort_and_source_filter() {
        let index = seeded().await;
        let body = index
            .search(
                "users",
                json!({"sort": [{"name.raw": {"order": "desc"}}], "_source": ["name"]}),
            )
            .await
            .unwrap();
        let hits = body["hits"]["hits"].as_array().unwrap();
        assert_eq!(hits[0]["_source"], json!({"name": "Cid"}));
        assert_eq!(hits[2]["_source"], json!({"name": "Ann"}));
    }

    #[tokio::test]
    async fn test_document_operations() {
        let index = MemorySearchIndex::default();
        index.index("users", "1", &doc(json!({"name": "Ann", "address": {"city": "Pune"}}))).await.unwrap();

        assert!(index.update("users", "1", &doc(json!({"address": {"zip": "411001"}})), false).await.unwrap());
        let stored = index.get("users", "1").await.unwrap().unwrap();
        assert_eq!(stored["address"], json!({"city": "Pune", "zip": "411001"}));

        assert!(!index.update("users", "2", &doc(json!({"name": "Bob"})), false).await.unwrap());
        assert!(index.update("users", "2", &doc(json!({"name": "Bob"})), true).await.unwrap());
        assert_eq!(index.document_count("users"), 2);

        let mget = index
            .mget("users", &["1".to_string(), "9".to_string()], &["name".to_string()])
            .await
            .unwrap();
        assert_eq!(mget["docs"][0]["_source"], json!({"name": "Ann"}));
        assert_eq!(mget["docs"][1]["found"], json!(false));

        assert!(index.delete("users", "1").await.unwrap());
        assert!(!index.delete("users", "1").await.unwrap());
    }
}
