//! Elasticsearch adapter.
//!
//! [`ElasticsearchClient`] implements [`SearchClient`](crate::core::SearchClient)
//! over the official `elasticsearch` crate. [`ElasticsearchConnector`] builds
//! one client per index for the handle pool.

mod client;

pub use client::{ElasticsearchClient, ElasticsearchConnector};
