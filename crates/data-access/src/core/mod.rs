//! Backend seams.
//!
//! - [`ColumnSession`] - executes compiled column-store statements
//! - [`SearchClient`] - runs search bodies and document operations
//! - [`HandlePool`] - one lazily created handle per namespace
//!
//! The operation layer only talks to these traits, so the in-memory
//! backends and the native drivers are interchangeable.

mod backend;
mod provider;
mod search_client;
mod session;

pub use backend::BackendKind;
pub use provider::{Connector, HandlePool, SharedConnector};
pub use search_client::SearchClient;
pub use session::{ColumnSession, RowSet};
