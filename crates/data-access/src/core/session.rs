//! The column-store session seam.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::column::Statement;
use crate::error::DriverError;
use crate::types::Record;

use super::BackendKind;

/// Rows returned by a statement, keyed by physical column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowSet {
    /// Column names in result order.
    pub columns: Vec<String>,
    /// Rows in backend order.
    pub rows: Vec<Record>,
}

impl RowSet {
    /// Creates a row set.
    pub fn new(columns: Vec<String>, rows: Vec<Record>) -> Self {
        Self { columns, rows }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if there are no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A live column-store session for one keyspace.
///
/// Implementations are shared between concurrent callers.
#[async_trait]
pub trait ColumnSession: Send + Sync + Debug {
    /// Returns the kind of backend.
    fn kind(&self) -> BackendKind;

    /// Executes a single statement. Writes return an empty row set.
    async fn execute(&self, statement: &Statement) -> Result<RowSet, DriverError>;

    /// Executes statements as one native batch.
    async fn execute_batch(&self, statements: &[Statement]) -> Result<(), DriverError>;
}
