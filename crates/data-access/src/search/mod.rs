//! Search-index query compilation.
//!
//! [`EsQueryBuilder`] turns a [`SearchRequest`](crate::types::SearchRequest)
//! into an Elasticsearch search body:
//!
//! - filter entries become mandatory `term`/`terms`/`range`/`prefix`/`regexp`
//!   clauses on the raw sub-field, lower-cased for strings
//! - dotted fields are wrapped in `nested` scopes with `score_mode: none`
//! - the OR group becomes a `should` group with `minimum_should_match: 1`
//! - soft constraints attach a `boost` to every clause on their field
//! - facets become `terms` or daily `date_histogram` aggregations

mod aggregations;
pub mod clauses;
mod query_builder;

pub use aggregations::{build_aggregations, build_sort};
pub use query_builder::{EsQuery, EsQueryBuilder};
