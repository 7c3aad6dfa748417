//! Column-store request compilation.
//!
//! [`compile`] turns a [`ColumnOperation`] into a [`Compiled`] statement (or
//! batch of statements). Statements keep their structure so they can be
//! rendered as CQL for a real cluster or evaluated directly by the
//! in-memory store.

mod compiler;
mod statement;

pub use compiler::{
    BatchItem, ColumnOperation, ColumnRequest, Criteria, Projection, compile, key_filter,
    split_id, validate_identifier,
};
pub use statement::{
    Assignment, Compiled, Condition, CqlText, Dialect, Relation, Selection, Statement,
    StatementKind,
};
