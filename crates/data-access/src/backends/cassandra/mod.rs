//! Cassandra adapter.
//!
//! [`CassandraSession`] runs compiled statements through `cdrs-tokio` in the
//! JSON dialect: values are bound as JSON text behind `fromJson(?)` and rows
//! come back from `SELECT JSON`, so the server converts types using the
//! column definitions.

mod session;

pub use session::{CassandraConnector, CassandraSession};
