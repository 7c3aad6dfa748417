//! Column-store statements.
//!
//! A [`Statement`] is a structured CQL statement. It renders to text with
//! positional bind markers plus the ordered bind values, the same way
//! a SQL fragment carries its parameters. Keeping the structure around lets
//! the in-memory store evaluate statements without parsing CQL.

use std::fmt;

use serde_json::Value;

use crate::types::RangeOp;

/// How bind markers and selections are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// `?` markers and plain selections; used for audit logs.
    #[default]
    Plain,
    /// `fromJson(?)` markers bound to JSON text and `SELECT JSON`, so values
    /// are converted by the server using the column types.
    Json,
}

impl Dialect {
    fn marker(self) -> &'static str {
        match self {
            Dialect::Plain => "?",
            Dialect::Json => "fromJson(?)",
        }
    }
}

/// Rendered CQL text and its bind values.
#[derive(Debug, Clone, PartialEq)]
pub struct CqlText {
    /// The statement text.
    pub cql: String,
    /// Bind values in marker order.
    pub values: Vec<Value>,
}

impl CqlText {
    fn new() -> Self {
        Self {
            cql: String::new(),
            values: Vec::new(),
        }
    }

    /// Records a bind value and returns its marker.
    fn bind(&mut self, value: &Value, dialect: Dialect) -> &'static str {
        self.values.push(value.clone());
        dialect.marker()
    }
}

/// A single `SET` entry of an update.
#[derive(Debug, Clone, PartialEq)]
pub enum Assignment {
    /// `column = value`
    Set { column: String, value: Value },
    /// Adds one entry to a map column.
    PutEntry {
        column: String,
        key: String,
        value: Value,
    },
    /// Removes one entry from a map column.
    RemoveEntry { column: String, key: String },
}

impl Assignment {
    /// Returns the column the assignment writes.
    pub fn column(&self) -> &str {
        match self {
            Assignment::Set { column, .. }
            | Assignment::PutEntry { column, .. }
            | Assignment::RemoveEntry { column, .. } => column,
        }
    }
}

/// A WHERE relation on one column.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// `column = ?`
    Eq(Value),
    /// `column IN (?, ...)`
    In(Vec<Value>),
    /// `column < ?` and friends.
    Range(RangeOp, Value),
    /// `column CONTAINS ?`
    Contains(Value),
}

/// A WHERE condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    /// Column the relation applies to.
    pub column: String,
    /// The relation.
    pub relation: Relation,
}

impl Condition {
    /// Equality condition.
    pub fn eq(column: impl Into<String>, value: Value) -> Self {
        Self {
            column: column.into(),
            relation: Relation::Eq(value),
        }
    }

    /// Membership condition.
    pub fn is_in(column: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            column: column.into(),
            relation: Relation::In(values),
        }
    }
}

/// Columns returned by a select.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Explicit columns; `None` selects every column.
    pub columns: Option<Vec<String>>,
    /// `(column, alias)` pairs returned as remaining TTL.
    pub ttl: Vec<(String, String)>,
}

/// The statement variants.
#[derive(Debug, Clone, PartialEq)]
pub enum StatementKind {
    /// `INSERT INTO ... VALUES ...` (an upsert in CQL).
    Insert {
        columns: Vec<(String, Value)>,
        ttl: Option<i64>,
    },
    /// `UPDATE ... SET ... WHERE ...`
    Update {
        assignments: Vec<Assignment>,
        conditions: Vec<Condition>,
        ttl: Option<i64>,
    },
    /// `DELETE FROM ... WHERE ...`
    Delete { conditions: Vec<Condition> },
    /// `SELECT ... FROM ... [WHERE ...]`
    Select {
        selection: Selection,
        conditions: Vec<Condition>,
    },
}

/// A statement against one table.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    /// Keyspace.
    pub keyspace: String,
    /// Table.
    pub table: String,
    /// What the statement does.
    pub kind: StatementKind,
}

impl Statement {
    /// Returns true for selects.
    pub fn is_read(&self) -> bool {
        matches!(self.kind, StatementKind::Select { .. })
    }

    /// Returns the plain-dialect CQL text.
    pub fn cql(&self) -> String {
        self.render(Dialect::Plain).cql
    }

    /// Returns the bind values in marker order.
    pub fn values(&self) -> Vec<Value> {
        self.render(Dialect::Plain).values
    }

    /// Renders the statement in the given dialect.
    pub fn render(&self, dialect: Dialect) -> CqlText {
        let mut out = CqlText::new();
        let target = format!("{}.{}", self.keyspace, self.table);

        match &self.kind {
            StatementKind::Insert { columns, ttl } => {
                let names: Vec<&str> = columns.iter().map(|(name, _)| name.as_str()).collect();
                let markers: Vec<&str> = columns
                    .iter()
                    .map(|(_, value)| out.bind(value, dialect))
                    .collect();
                out.cql = format!(
                    "INSERT INTO {} ({}) VALUES ({})",
                    target,
                    names.join(", "),
                    markers.join(", ")
                );
                if let Some(seconds) = ttl {
                    out.cql.push_str(&format!(" USING TTL {}", seconds));
                }
            }
            StatementKind::Update {
                assignments,
                conditions,
                ttl,
            } => {
                out.cql = format!("UPDATE {}", target);
                if let Some(seconds) = ttl {
                    out.cql.push_str(&format!(" USING TTL {}", seconds));
                }
                let sets: Vec<String> = assignments
                    .iter()
                    .map(|assignment| render_assignment(assignment, &mut out, dialect))
                    .collect();
                out.cql.push_str(&format!(" SET {}", sets.join(", ")));
                render_where(conditions, &mut out, dialect);
            }
            StatementKind::Delete { conditions } => {
                out.cql = format!("DELETE FROM {}", target);
                render_where(conditions, &mut out, dialect);
            }
            StatementKind::Select {
                selection,
                conditions,
            } => {
                let mut selectors: Vec<String> = match &selection.columns {
                    Some(columns) => columns.clone(),
                    None if selection.ttl.is_empty() => vec!["*".to_string()],
                    None => Vec::new(),
                };
                selectors.extend(
                    selection
                        .ttl
                        .iter()
                        .map(|(column, alias)| format!("TTL({}) AS {}", column, alias)),
                );
                let keyword = match dialect {
                    Dialect::Plain => "SELECT",
                    Dialect::Json => "SELECT JSON",
                };
                out.cql = format!("{} {} FROM {}", keyword, selectors.join(", "), target);
                render_where(conditions, &mut out, dialect);
            }
        }
        out
    }
}

fn render_assignment(assignment: &Assignment, out: &mut CqlText, dialect: Dialect) -> String {
    match assignment {
        Assignment::Set { column, value } => {
            format!("{} = {}", column, out.bind(value, dialect))
        }
        Assignment::PutEntry { column, key, value } => {
            let mut entry = serde_json::Map::new();
            entry.insert(key.clone(), value.clone());
            let marker = out.bind(&Value::Object(entry), dialect);
            format!("{} = {} + {}", column, column, marker)
        }
        Assignment::RemoveEntry { column, key } => {
            let marker = out.bind(&Value::Array(vec![Value::String(key.clone())]), dialect);
            format!("{} = {} - {}", column, column, marker)
        }
    }
}

fn render_where(conditions: &[Condition], out: &mut CqlText, dialect: Dialect) {
    if conditions.is_empty() {
        return;
    }
    let rendered: Vec<String> = conditions
        .iter()
        .map(|condition| {
            let column = &condition.column;
            match &condition.relation {
                Relation::Eq(value) => format!("{} = {}", column, out.bind(value, dialect)),
                Relation::In(values) => {
                    let markers: Vec<&str> =
                        values.iter().map(|v| out.bind(v, dialect)).collect();
                    format!("{} IN ({})", column, markers.join(", "))
                }
                Relation::Range(op, value) => {
                    format!("{} {} {}", column, op.symbol(), out.bind(value, dialect))
                }
                Relation::Contains(value) => {
                    format!("{} CONTAINS {}", column, out.bind(value, dialect))
                }
            }
        })
        .collect();
    out.cql.push_str(&format!(" WHERE {}", rendered.join(" AND ")));
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.cql())
    }
}

/// One compiled unit of work: a statement or a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Compiled {
    /// A single statement.
    Single(Statement),
    /// Statements applied together by the native batch primitive.
    Batch(Vec<Statement>),
}

impl Compiled {
    /// Returns the statements in execution order.
    pub fn statements(&self) -> &[Statement] {
        match self {
            Compiled::Single(statement) => std::slice::from_ref(statement),
            Compiled::Batch(statements) => statements,
        }
    }
}

impl fmt::Display for Compiled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compiled::Single(statement) => write!(f, "{}", statement),
            Compiled::Batch(statements) => {
                write!(f, "BEGIN BATCH ")?;
                for statement in statements {
                    write!(f, "{}; ", statement)?;
                }
                write!(f, "APPLY BATCH")
            }
        }
    }
}
