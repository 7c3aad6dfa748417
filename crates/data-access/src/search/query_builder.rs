//! Elasticsearch Query DSL builder.
//!
//! Translates a [`SearchRequest`] into a complete search body.

use serde_json::{Value, json};

use crate::types::{Filter, SearchRequest};

use super::aggregations::{build_aggregations, build_sort};
use super::clauses;

/// A complete Elasticsearch query body ready to be sent.
#[derive(Debug, Clone, PartialEq)]
pub struct EsQuery {
    /// The complete query body.
    pub body: Value,
    /// The index to search.
    pub index: String,
}

/// Builds Elasticsearch queries from search requests.
#[derive(Debug, Clone)]
pub struct EsQueryBuilder<'a> {
    index: &'a str,
    raw_suffix: &'a str,
    default_limit: u64,
}

impl<'a> EsQueryBuilder<'a> {
    /// Creates a builder with the `.raw` suffix and a default page of 10.
    pub fn new(index: &'a str) -> Self {
        Self {
            index,
            raw_suffix: ".raw",
            default_limit: 10,
        }
    }

    /// Sets the suffix of the untokenized sub-field.
    pub fn raw_suffix(mut self, suffix: &'a str) -> Self {
        self.raw_suffix = suffix;
        self
    }

    /// Sets the page size used when the request has no limit.
    pub fn default_limit(mut self, limit: u64) -> Self {
        self.default_limit = limit;
        self
    }

    /// Builds the search body.
    ///
    /// The request is expected to be validated already.
    pub fn build(&self, request: &SearchRequest) -> EsQuery {
        let mut must: Vec<Value> = Vec::new();
        let mut must_not: Vec<Value> = Vec::new();

        if let Some(query) = &request.query {
            must.push(self.text_clause(query, &request.query_fields, request));
        }

        for (field, text) in &request.fuzzy {
            must.push(clauses::fuzzy_match(field, text, self.boost(request, field)));
        }

        if let Some(filters) = &request.filters {
            self.filter_clauses(filters, request, &mut must);
        }

        let exists = |field: &String| clauses::exists(field, self.boost(request, field));
        must.extend(request.exists.iter().map(exists));
        must_not.extend(request.not_exists.iter().map(exists));

        must.extend(
            request
                .nested_exists
                .iter()
                .map(|(field, path)| clauses::nested(path, exists(field))),
        );
        must_not.extend(
            request
                .nested_not_exists
                .iter()
                .map(|(field, path)| clauses::nested(path, exists(field))),
        );

        let query = if must.is_empty() && must_not.is_empty() {
            json!({ "match_all": {} })
        } else {
            let mut bool_query = serde_json::Map::new();
            if !must.is_empty() {
                bool_query.insert("must".to_string(), Value::Array(must));
            }
            if !must_not.is_empty() {
                bool_query.insert("must_not".to_string(), Value::Array(must_not));
            }
            json!({ "bool": bool_query })
        };

        let mut body = json!({
            "query": query,
            "from": request.offset.unwrap_or(0),
            "size": request.limit.map(|l| l as u64).unwrap_or(self.default_limit),
            "track_total_hits": true,
        });

        if let Some(sort) = build_sort(&request.sort, self.raw_suffix) {
            body["sort"] = sort;
        }
        if let Some(aggs) = build_aggregations(&request.facets, self.raw_suffix) {
            body["aggs"] = aggs;
        }
        if !request.fields.is_empty() {
            body["_source"] = json!(request.fields);
        }

        EsQuery {
            body,
            index: self.index.to_string(),
        }
    }

    fn boost(&self, request: &SearchRequest, field: &str) -> Option<i64> {
        request.soft_constraints.get(field).copied()
    }

    fn text_clause(&self, query: &str, fields: &[String], request: &SearchRequest) -> Value {
        if fields.is_empty() {
            return json!({
                "multi_match": {
                    "query": query,
                    "fields": ["*"],
                    "fuzziness": "AUTO",
                    "lenient": true
                }
            });
        }
        clauses::any_of(
            fields
                .iter()
                .map(|field| clauses::fuzzy_match(field, query, self.boost(request, field)))
                .collect(),
        )
    }

    fn filter_clauses(&self, filters: &Filter, request: &SearchRequest, must: &mut Vec<Value>) {
        for (field, value) in filters.entries() {
            must.extend(clauses::filter_entry(
                field,
                value,
                self.raw_suffix,
                self.boost(request, field),
            ));
        }

        if !filters.any_of().is_empty() {
            let should = filters
                .any_of()
                .iter()
                .map(|(field, value)| {
                    clauses::all_of(clauses::filter_entry(
                        field,
                        value,
                        self.raw_suffix,
                        self.boost(request, field),
                    ))
                })
                .collect();
            must.push(clauses::any_of(should));
        }
    }
}
