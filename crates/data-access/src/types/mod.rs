//! Core types for the data-access layer.
//!
//! - [`Record`], [`RecordKey`], [`CompositeKey`] - rows and how to address them
//! - [`Filter`], [`FilterValue`] - the filter DSL shared by both backends
//! - [`KeySchema`], [`TableRegistry`] - declared primary-key layouts
//! - [`SearchRequest`] - a stateless search against the document index
//! - [`OperationResponse`] - the envelope every operation returns
//!
//! # Examples
//!
//! ## Parsing a Filter
//!
//! ```
//! use helios_data_access::types::{Filter, FilterValue};
//! use serde_json::json;
//!
//! let filter = Filter::from_json(&json!({
//!     "status": "active",
//!     "roles": ["admin", "editor"],
//!     "age": {">=": 18, "<": 65}
//! }))
//! .unwrap();
//!
//! assert_eq!(filter.entries().len(), 3);
//! assert!(matches!(filter.entries()[0].1, FilterValue::Scalar(_)));
//! ```
//!
//! ## Building a Search Request
//!
//! ```
//! use helios_data_access::types::{AggregationKind, Filter, SearchRequest, SortDirection};
//!
//! let request = SearchRequest::new()
//!     .with_filters(Filter::new().with("status", "active"))
//!     .with_facet("city", AggregationKind::Terms)
//!     .with_sort("createdDate", SortDirection::Desc)
//!     .with_offset(0)
//!     .with_limit(20);
//!
//! assert!(request.validate(10_000).is_ok());
//! ```

mod filter;
mod record;
mod response;
mod schema;
mod search_request;

pub use filter::{
    Filter, FilterValue, LexicalOp, OR_GROUP_KEY, OperatorSet, RangeOp, nested_path,
};
pub use record::{CompositeKey, ID_COLUMN, Record, RecordKey, Ttl, TtlProjection};
pub(crate) use record::{is_scalar, require_non_blank};
pub use response::{Facet, FacetValue, OperationResponse};
pub use schema::{KeyColumn, KeyKind, KeySchema, TableRegistry};
pub use search_request::{
    AggregationKind, FacetRequest, SearchRequest, SortDirection, SortSpec,
};
