//! In-memory backends.
//!
//! [`MemoryColumnStore`] and [`MemorySearchIndex`] implement the same seams
//! as the native drivers and are always compiled. They back the test suite
//! and local development.

mod column_store;
mod query_eval;
mod search_index;

pub use column_store::MemoryColumnStore;
pub use search_index::MemorySearchIndex;
