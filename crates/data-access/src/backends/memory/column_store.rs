//! In-memory column store.
//!
//! Evaluates compiled [`Statement`]s against per-table rows addressed by the
//! declared [`KeySchema`]. Behaves like the column store where callers can
//! observe it:
//!
//! - `INSERT` and `UPDATE` are upserts
//! - every cell carries its own expiry, read back through `TTL(column)`
//! - tables with declared columns reject other names with the native
//!   `Undefined column name` message
//! - a batch applies completely or not at all

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tracing::trace;

use crate::column::{Assignment, Condition, Relation, Selection, Statement, StatementKind};
use crate::core::{BackendKind, ColumnSession, RowSet};
use crate::error::DriverError;
use crate::types::{KeySchema, RangeOp, Record, TableRegistry};

type TableId = (String, String);

#[derive(Debug, Clone)]
struct Cell {
    value: Value,
    expires_at: Option<Instant>,
}

impl Cell {
    fn new(value: Value, ttl: Option<i64>, now: Instant) -> Self {
        Self {
            value,
            // An unrepresentable deadline never expires.
            expires_at: ttl.and_then(|seconds| {
                now.checked_add(Duration::from_secs(u64::try_from(seconds).unwrap_or(0)))
            }),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }

    fn remaining_seconds(&self, now: Instant) -> Value {
        match self.expires_at {
            Some(at) => {
                let remaining = at.saturating_duration_since(now);
                Value::from(remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0))
            }
            None => Value::Null,
        }
    }
}

#[derive(Debug, Clone)]
struct Row {
    key: Vec<Value>,
    cells: HashMap<String, Cell>,
    /// Set by `INSERT`; keeps the row visible while it has no live cell.
    marker: Option<Cell>,
}

impl Row {
    fn is_live(&self, schema: &KeySchema, now: Instant) -> bool {
        self.marker.as_ref().is_some_and(|m| m.is_live(now))
            || self
                .cells
                .iter()
                .any(|(name, cell)| !schema.is_key_column(name) && cell.is_live(now))
    }

    fn value(&self, column: &str, now: Instant) -> Option<&Value> {
        self.cells
            .get(column)
            .filter(|cell| cell.is_live(now))
            .map(|cell| &cell.value)
    }
}

#[derive(Debug, Clone)]
struct Table {
    schema: KeySchema,
    declared: Option<Vec<String>>,
    /// Every column written so far, in first-write order.
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl Table {
    fn new(schema: KeySchema, declared: Option<Vec<String>>) -> Self {
        let columns = match &declared {
            Some(declared) => declared.clone(),
            None => schema.columns().iter().map(|c| c.name.clone()).collect(),
        };
        Self {
            schema,
            declared,
            columns,
            rows: Vec::new(),
        }
    }

    fn check_column(&self, column: &str) -> Result<(), DriverError> {
        match &self.declared {
            Some(declared) if !declared.iter().any(|c| c == column) => Err(
                DriverError::rejected(format!("Undefined column name {}", column)),
            ),
            _ => Ok(()),
        }
    }

    fn note_column(&mut self, column: &str) {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
    }

    fn row_mut(&mut self, key: Vec<Value>) -> &mut Row {
        match self.rows.iter().position(|row| row.key == key) {
            Some(index) => &mut self.rows[index],
            None => {
                self.rows.push(Row {
                    key,
                    cells: HashMap::new(),
                    marker: None,
                });
                let last = self.rows.len() - 1;
                &mut self.rows[last]
            }
        }
    }

    /// Resolves a full primary key from equality conditions or written columns.
    fn full_key<'a>(
        &self,
        lookup: impl Fn(&str) -> Option<&'a Value>,
    ) -> Result<Vec<Value>, DriverError> {
        self.schema
            .columns()
            .iter()
            .map(|column| {
                lookup(&column.name).cloned().ok_or_else(|| {
                    DriverError::rejected(format!(
                        "Some primary key parts are missing: {}",
                        column.name
                    ))
                })
            })
            .collect()
    }
}

/// An in-process column store shared by every keyspace.
#[derive(Debug, Default)]
pub struct MemoryColumnStore {
    registry: TableRegistry,
    declared: HashMap<TableId, Vec<String>>,
    tables: RwLock<HashMap<TableId, Table>>,
}

impl MemoryColumnStore {
    /// Creates a store where every table is keyed by `id`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store using the declared key layouts.
    pub fn with_registry(registry: TableRegistry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    /// Declares the complete column list of a table. Statements naming any
    /// other column fail like they would against the real schema.
    pub fn declare_columns(
        mut self,
        keyspace: impl Into<String>,
        table: impl Into<String>,
        columns: &[&str],
    ) -> Self {
        self.declared.insert(
            (keyspace.into(), table.into()),
            columns.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    /// Number of live rows in a table.
    pub fn row_count(&self, keyspace: &str, table: &str) -> usize {
        let now = Instant::now();
        self.tables
            .read()
            .get(&(keyspace.to_string(), table.to_string()))
            .map(|t| t.rows.iter().filter(|r| r.is_live(&t.schema, now)).count())
            .unwrap_or(0)
    }

    fn table_for<'a>(
        &self,
        tables: &'a mut HashMap<TableId, Table>,
        keyspace: &str,
        table: &str,
    ) -> &'a mut Table {
        let id = (keyspace.to_string(), table.to_string());
        tables.entry(id.clone()).or_insert_with(|| {
            Table::new(
                self.registry.get(keyspace, table).clone(),
                self.declared.get(&id).cloned(),
            )
        })
    }

    fn apply(
        &self,
        tables: &mut HashMap<TableId, Table>,
        statement: &Statement,
        now: Instant,
    ) -> Result<RowSet, DriverError> {
        let table = self.table_for(tables, &statement.keyspace, &statement.table);
        match &statement.kind {
            StatementKind::Insert { columns, ttl } => {
                insert(table, columns, *ttl, now)?;
                Ok(RowSet::default())
            }
            StatementKind::Update {
                assignments,
                conditions,
                ttl,
            } => {
                update(table, assignments, conditions, *ttl, now)?;
                Ok(RowSet::default())
            }
            StatementKind::Delete { conditions } => {
                delete(table, conditions, now)?;
                Ok(RowSet::default())
            }
            StatementKind::Select {
                selection,
                conditions,
            } => select(table, selection, conditions, now),
        }
    }
}

fn insert(
    table: &mut Table,
    columns: &[(String, Value)],
    ttl: Option<i64>,
    now: Instant,
) -> Result<(), DriverError> {
    for (name, _) in columns {
        table.check_column(name)?;
    }
    let key = table.full_key(|name| {
        columns
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    })?;
    for (name, _) in columns {
        table.note_column(name);
    }

    let schema = table.schema.clone();
    let row = table.row_mut(key);
    row.marker = Some(Cell::new(Value::Null, ttl, now));
    for (name, value) in columns {
        if schema.is_key_column(name) {
            row.cells.insert(name.clone(), Cell::new(value.clone(), None, now));
        } else if value.is_null() {
            row.cells.remove(name);
        } else {
            row.cells.insert(name.clone(), Cell::new(value.clone(), ttl, now));
        }
    }
    Ok(())
}

fn equality_key(table: &Table, conditions: &[Condition]) -> Result<Vec<Value>, DriverError> {
    for condition in conditions {
        table.check_column(&condition.column)?;
        if !table.schema.is_key_column(&condition.column) {
            return Err(DriverError::rejected(format!(
                "Non PRIMARY KEY columns found in where clause: {}",
                condition.column
            )));
        }
    }
    table.full_key(|name| {
        conditions.iter().find_map(|c| match &c.relation {
            Relation::Eq(value) if c.column == name => Some(value),
            _ => None,
        })
    })
}

fn update(
    table: &mut Table,
    assignments: &[Assignment],
    conditions: &[Condition],
    ttl: Option<i64>,
    now: Instant,
) -> Result<(), DriverError> {
    for assignment in assignments {
        table.check_column(assignment.column())?;
        if table.schema.is_key_column(assignment.column()) {
            return Err(DriverError::rejected(format!(
                "PRIMARY KEY part {} found in SET part",
                assignment.column()
            )));
        }
    }
    let key = equality_key(table, conditions)?;
    for assignment in assignments {
        table.note_column(assignment.column());
    }

    let key_columns: Vec<(String, Value)> = table
        .schema
        .columns()
        .iter()
        .map(|c| c.name.clone())
        .zip(key.iter().cloned())
        .collect();
    let row = table.row_mut(key);
    for (name, value) in key_columns {
        row.cells.insert(name, Cell::new(value, None, now));
    }

    for assignment in assignments {
        match assignment {
            Assignment::Set { column, value } => {
                if value.is_null() {
                    row.cells.remove(column);
                } else {
                    row.cells
                        .insert(column.clone(), Cell::new(value.clone(), ttl, now));
                }
            }
            Assignment::PutEntry { column, key, value } => {
                let mut entries = match row.value(column, now) {
                    Some(Value::Object(existing)) => existing.clone(),
                    _ => Map::new(),
                };
                entries.insert(key.clone(), value.clone());
                row.cells
                    .insert(column.clone(), Cell::new(Value::Object(entries), ttl, now));
            }
            Assignment::RemoveEntry { column, key } => {
                if let Some(Value::Object(existing)) = row.value(column, now) {
                    let remaining: Map<String, Value> = existing
                        .iter()
                        .filter(|(entry, _)| *entry != key)
                        .map(|(entry, value)| (entry.clone(), value.clone()))
                        .collect();
                    let expires_at = row.cells.get(column).and_then(|c| c.expires_at);
                    row.cells.insert(
                        column.clone(),
                        Cell {
                            value: Value::Object(remaining),
                            expires_at,
                        },
                    );
                }
            }
        }
    }
    Ok(())
}

fn delete(table: &mut Table, conditions: &[Condition], now: Instant) -> Result<(), DriverError> {
    if conditions.is_empty() {
        return Err(DriverError::rejected("DELETE requires a WHERE clause"));
    }
    for condition in conditions {
        table.check_column(&condition.column)?;
        if !table.schema.is_key_column(&condition.column) {
            return Err(DriverError::rejected(format!(
                "Non PRIMARY KEY columns found in where clause: {}",
                condition.column
            )));
        }
    }
    table
        .rows
        .retain(|row| !conditions.iter().all(|c| matches(row, c, now)));
    Ok(())
}

fn select(
    table: &Table,
    selection: &Selection,
    conditions: &[Condition],
    now: Instant,
) -> Result<RowSet, DriverError> {
    for condition in conditions {
        table.check_column(&condition.column)?;
    }
    let mut columns = match &selection.columns {
        Some(columns) => columns.clone(),
        None if selection.ttl.is_empty() => table.columns.clone(),
        None => Vec::new(),
    };
    for column in &columns {
        table.check_column(column)?;
    }
    for (column, _) in &selection.ttl {
        table.check_column(column)?;
    }
    columns.extend(selection.ttl.iter().map(|(_, alias)| alias.clone()));

    let rows = table
        .rows
        .iter()
        .filter(|row| row.is_live(&table.schema, now))
        .filter(|row| conditions.iter().all(|c| matches(row, c, now)))
        .map(|row| {
            let mut record = Record::new();
            if let Some(selected) = &selection.columns {
                for column in selected {
                    record.insert(
                        column.clone(),
                        row.value(column, now).cloned().unwrap_or(Value::Null),
                    );
                }
            } else if selection.ttl.is_empty() {
                for column in &table.columns {
                    record.insert(
                        column.clone(),
                        row.value(column, now).cloned().unwrap_or(Value::Null),
                    );
                }
            }
            for (column, alias) in &selection.ttl {
                let remaining = row
                    .cells
                    .get(column)
                    .filter(|cell| cell.is_live(now))
                    .map(|cell| cell.remaining_seconds(now))
                    .unwrap_or(Value::Null);
                record.insert(alias.clone(), remaining);
            }
            record
        })
        .collect();

    Ok(RowSet::new(columns, rows))
}

fn matches(row: &Row, condition: &Condition, now: Instant) -> bool {
    let Some(value) = row.value(&condition.column, now) else {
        return false;
    };
    match &condition.relation {
        Relation::Eq(expected) => value == expected,
        Relation::In(candidates) => candidates.contains(value),
        Relation::Range(op, bound) => compare(value, bound).is_some_and(|ordering| match op {
            RangeOp::Gt => ordering == Ordering::Greater,
            RangeOp::Gte => ordering != Ordering::Less,
            RangeOp::Lt => ordering == Ordering::Less,
            RangeOp::Lte => ordering != Ordering::Greater,
        }),
        Relation::Contains(needle) => match value {
            Value::Array(items) => items.contains(needle),
            Value::Object(entries) => entries.values().any(|v| v == needle),
            _ => false,
        },
    }
}

/// Orders two scalars of the same type.
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

#[async_trait]
impl ColumnSession for MemoryColumnStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Memory
    }

    async fn execute(&self, statement: &Statement) -> Result<RowSet, DriverError> {
        trace!(statement = %statement, "Executing in memory");
        let now = Instant::now();
        let mut tables = self.tables.write();
        self.apply(&mut tables, statement, now)
    }

    async fn execute_batch(&self, statements: &[Statement]) -> Result<(), DriverError> {
        let now = Instant::now();
        let mut tables = self.tables.write();
        let mut staged = tables.clone();
        for statement in statements {
            if statement.is_read() {
                return Err(DriverError::rejected(
                    "Only INSERT, UPDATE and DELETE statements are allowed in a batch",
                ));
            }
            self.apply(&mut staged, statement, now)?;
        }
        *tables = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnOperation, Criteria, Projection, compile};
    use crate::types::{CompositeKey, RecordKey, Ttl, TtlProjection};
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    async fn run(store: &MemoryColumnStore, op: ColumnOperation) -> Result<RowSet, DriverError> {
        let compiled = compile("ks", "users", &op).unwrap();
        match compiled.statements() {
            [single] => store.execute(single).await,
            many => store.execute_batch(many).await.map(|_| RowSet::default()),
        }
    }

    fn select_id(id: &str) -> ColumnOperation {
        ColumnOperation::Select {
            criteria: Criteria::Key(RecordKey::id(id)),
            projection: Projection::all(),
        }
    }

    #[tokio::test]
    async fn test_insert_is_upsert() {
        let store = MemoryColumnStore::new();
        let insert = ColumnOperation::Insert {
            record: record(json!({"id": "u1", "name": "Ann"})),
            ttl: Ttl::NONE,
        };
        run(&store, insert.clone()).await.unwrap();
        run(&store, insert).await.unwrap();
        assert_eq!(store.row_count("ks", "users"), 1);

        let rows = run(&store, select_id("u1")).await.unwrap();
        assert_eq!(rows.columns, vec!["id", "name"]);
        assert_eq!(rows.rows, vec![record(json!({"id": "u1", "name": "Ann"}))]);
    }

    #[tokio::test]
    async fn test_missing_key_part_rejected() {
        let store = MemoryColumnStore::new();
        let err = run(
            &store,
            ColumnOperation::Insert {
                record: record(json!({"name": "Ann"})),
                ttl: Ttl::NONE,
            },
        )
        .await
        .unwrap_err();
        assert!(err.message.contains("primary key parts are missing: id"));
    }

    #[tokio::test]
    async fn test_undeclared_column_native_message() {
        let store = MemoryColumnStore::new().declare_columns("ks", "users", &["id", "name"]);
        let err = run(
            &store,
            ColumnOperation::Insert {
                record: record(json!({"id": "u1", "nickname": "A"})),
                ttl: Ttl::NONE,
            },
        )
        .await
        .unwrap_err();
        assert_eq!(err.message, "Undefined column name nickname");
    }

    #[test]
    fn test_unrepresentable_deadline_never_expires() {
        let now = Instant::now();
        let cell = Cell::new(json!("t"), Some(i64::MAX), now);
        assert!(cell.is_live(now));
        assert_eq!(cell.remaining_seconds(now), Value::Null);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cell_expiry_and_remaining_ttl() {
        let store = MemoryColumnStore::new();
        run(
            &store,
            ColumnOperation::Insert {
                record: record(json!({"id": "s1", "token": "abc"})),
                ttl: Ttl(60),
            },
        )
        .await
        .unwrap();

        tokio::time::advance(Duration::from_secs(20)).await;
        let rows = run(
            &store,
            ColumnOperation::Select {
                criteria: Criteria::Key(RecordKey::id("s1")),
                projection: Projection::all()
                    .with_ttl(TtlProjection::new().with("token", "token_ttl")),
            },
        )
        .await
        .unwrap();
        assert_eq!(rows.rows[0]["token"], json!("abc"));
        assert_eq!(rows.rows[0]["token_ttl"], json!(40));

        tokio::time::advance(Duration::from_secs(41)).await;
        assert!(run(&store, select_id("s1")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_map_entry_updates() {
        let store = MemoryColumnStore::new();
        let key = RecordKey::id("u1");
        for (map_key, value) in [("lang", "en"), ("tz", "IST")] {
            run(
                &store,
                ColumnOperation::PutMapEntry {
                    key: key.clone(),
                    column: "prefs".to_string(),
                    map_key: map_key.to_string(),
                    value: json!(value),
                },
            )
            .await
            .unwrap();
        }
        run(
            &store,
            ColumnOperation::RemoveMapEntry {
                key: key.clone(),
                column: "prefs".to_string(),
                map_key: "lang".to_string(),
            },
        )
        .await
        .unwrap();

        let rows = run(&store, select_id("u1")).await.unwrap();
        assert_eq!(rows.rows[0]["prefs"], json!({"tz": "IST"}));
    }

    #[tokio::test]
    async fn test_failed_batch_leaves_no_partial_writes() {
        let store = MemoryColumnStore::new();
        let op = ColumnOperation::Batch {
            items: vec![
                crate::column::BatchItem::Insert {
                    record: record(json!({"id": "u1", "name": "Ann"})),
                    ttl: Ttl::NONE,
                },
                crate::column::BatchItem::Insert {
                    record: record(json!({"name": "no key"})),
                    ttl: Ttl::NONE,
                },
            ],
        };
        assert!(run(&store, op).await.is_err());
        assert_eq!(store.row_count("ks", "users"), 0);
    }

    #[tokio::test]
    async fn test_composite_key_range_read() {
        let registry = TableRegistry::new().with_table(
            "ks",
            "users",
            KeySchema::new(["userid"], ["createdon"]).unwrap(),
        );
        let store = MemoryColumnStore::with_registry(registry);
        for (day, score) in [("2024-01-01", 1), ("2024-01-15", 2), ("2024-02-01", 3)] {
            run(
                &store,
                ColumnOperation::Insert {
                    record: record(json!({"userid": "u1", "createdon": day, "score": score})),
                    ttl: Ttl::NONE,
                },
            )
            .await
            .unwrap();
        }
        let filter = crate::types::Filter::from_json(&json!({
            "userid": "u1",
            "createdon": {">=": "2024-01-10", "<": "2024-02-01"}
        }))
        .unwrap();
        let rows = run(
            &store,
            ColumnOperation::Select {
                criteria: Criteria::KeyRange(filter),
                projection: Projection::all(),
            },
        )
        .await
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows.rows[0]["score"], json!(2));

        run(
            &store,
            ColumnOperation::Delete {
                criteria: Criteria::Key(RecordKey::Composite(
                    CompositeKey::new()
                        .with("userid", "u1")
                        .with("createdon", "2024-01-01"),
                )),
            },
        )
        .await
        .unwrap();
        assert_eq!(store.row_count("ks", "users"), 2);
    }
}
