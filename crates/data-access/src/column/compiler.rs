//! Compiles column-store operations into statements.
//!
//! The compiler is pure: it validates the request, chooses the WHERE shape
//! for every filter entry (`IN` for lists, `=` for scalars) and never talks
//! to a backend. Identifiers are validated here because they are spliced
//! into the statement text; values are always bound.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::error::ValidationError;
use crate::types::{
    CompositeKey, Filter, FilterValue, ID_COLUMN, Record, RecordKey, Ttl, TtlProjection,
    is_scalar, require_non_blank,
};

use super::statement::{
    Assignment, Compiled, Condition, Relation, Selection, Statement, StatementKind,
};

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static regex"));

/// Rejects names that are not plain CQL identifiers.
pub fn validate_identifier(name: &str) -> Result<(), ValidationError> {
    if IDENTIFIER.is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::InvalidIdentifier {
            name: name.to_string(),
        })
    }
}

/// Which rows a read or delete addresses.
#[derive(Debug, Clone, PartialEq)]
pub enum Criteria {
    /// Every row of the table.
    All,
    /// One row by id or composite key.
    Key(RecordKey),
    /// Rows whose `column` is one of `values`.
    In { column: String, values: Vec<Value> },
    /// Equality (`=`) or membership (`IN`) per entry; operator maps are rejected.
    Properties(Filter),
    /// Like [`Criteria::Properties`] but range operators are allowed, for
    /// reads bounded on clustering columns.
    KeyRange(Filter),
    /// Rows whose collection `column` contains `value`, narrowed by `filter`.
    Contains {
        column: String,
        value: Value,
        filter: Filter,
    },
}

/// Columns to return.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    /// Explicit fields; `None` returns every column.
    pub fields: Option<Vec<String>>,
    /// TTL-tracked fields and their aliases.
    pub ttl: TtlProjection,
}

impl Projection {
    /// Every column.
    pub fn all() -> Self {
        Self::default()
    }

    /// The given fields; an empty list means every column.
    pub fn fields(fields: Option<Vec<String>>) -> Self {
        Self {
            fields: fields.filter(|f| !f.is_empty()),
            ttl: TtlProjection::new(),
        }
    }

    /// Adds TTL-tracked fields.
    pub fn with_ttl(mut self, ttl: TtlProjection) -> Self {
        self.ttl = ttl;
        self
    }
}

/// An item of a mixed batch.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchItem {
    /// Insert a full record.
    Insert { record: Record, ttl: Ttl },
    /// Set `values` on the row addressed by `key`.
    Update { key: RecordKey, values: Record },
}

/// A column-store operation against one table.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnOperation {
    /// Insert (or overwrite) a full record.
    Insert { record: Record, ttl: Ttl },
    /// Set `values` on the row addressed by `key`.
    Update {
        key: RecordKey,
        values: Record,
        ttl: Ttl,
    },
    /// Delete rows.
    Delete { criteria: Criteria },
    /// Read rows.
    Select {
        criteria: Criteria,
        projection: Projection,
    },
    /// Add one entry to a map column.
    PutMapEntry {
        key: RecordKey,
        column: String,
        map_key: String,
        value: Value,
    },
    /// Remove one entry from a map column.
    RemoveMapEntry {
        key: RecordKey,
        column: String,
        map_key: String,
    },
    /// Several writes applied as one native batch.
    Batch { items: Vec<BatchItem> },
}

impl ColumnOperation {
    /// Default operation name used in logs and errors.
    pub fn name(&self) -> &'static str {
        match self {
            ColumnOperation::Insert { .. } => "insert_record",
            ColumnOperation::Update { .. } => "update_record",
            ColumnOperation::Delete { .. } => "delete_record",
            ColumnOperation::Select { .. } => "get_records",
            ColumnOperation::PutMapEntry { .. } => "update_add_map_record",
            ColumnOperation::RemoveMapEntry { .. } => "update_remove_map_record",
            ColumnOperation::Batch { .. } => "perform_batch_action",
        }
    }
}

/// A column-store request: a target table and an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRequest {
    /// Keyspace.
    pub keyspace: String,
    /// Table.
    pub table: String,
    /// Operation.
    pub operation: ColumnOperation,
}

impl ColumnRequest {
    /// Creates a request.
    pub fn new(
        keyspace: impl Into<String>,
        table: impl Into<String>,
        operation: ColumnOperation,
    ) -> Self {
        Self {
            keyspace: keyspace.into(),
            table: table.into(),
            operation,
        }
    }

    /// Compiles the request.
    pub fn compile(&self) -> Result<Compiled, ValidationError> {
        compile(&self.keyspace, &self.table, &self.operation)
    }
}

/// Compiles one operation against `keyspace.table`.
pub fn compile(
    keyspace: &str,
    table: &str,
    operation: &ColumnOperation,
) -> Result<Compiled, ValidationError> {
    require_non_blank(keyspace, "keyspace")?;
    require_non_blank(table, "table")?;
    validate_identifier(keyspace)?;
    validate_identifier(table)?;

    let target = Target { keyspace, table };
    match operation {
        ColumnOperation::Insert { record, ttl } => target.insert(record, *ttl).map(Compiled::Single),
        ColumnOperation::Update { key, values, ttl } => {
            target.update(key, values, *ttl).map(Compiled::Single)
        }
        ColumnOperation::Delete { criteria } => {
            if matches!(criteria, Criteria::All) {
                return Err(ValidationError::InvalidRequest {
                    field: "criteria".to_string(),
                    message: "delete requires a key or a list of ids".to_string(),
                });
            }
            let conditions = target.conditions(criteria)?;
            Ok(Compiled::Single(target.statement(StatementKind::Delete { conditions })))
        }
        ColumnOperation::Select {
            criteria,
            projection,
        } => target.select(criteria, projection).map(Compiled::Single),
        ColumnOperation::PutMapEntry {
            key,
            column,
            map_key,
            value,
        } => target
            .map_entry(
                key,
                Assignment::PutEntry {
                    column: column.clone(),
                    key: map_key.clone(),
                    value: value.clone(),
                },
            )
            .map(Compiled::Single),
        ColumnOperation::RemoveMapEntry {
            key,
            column,
            map_key,
        } => target
            .map_entry(
                key,
                Assignment::RemoveEntry {
                    column: column.clone(),
                    key: map_key.clone(),
                },
            )
            .map(Compiled::Single),
        ColumnOperation::Batch { items } => {
            if items.is_empty() {
                return Err(ValidationError::EmptyBatch);
            }
            let statements = items
                .iter()
                .map(|item| match item {
                    BatchItem::Insert { record, ttl } => target.insert(record, *ttl),
                    BatchItem::Update { key, values } => target.update(key, values, Ttl::NONE),
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Compiled::Batch(statements))
        }
    }
}

struct Target<'a> {
    keyspace: &'a str,
    table: &'a str,
}

impl Target<'_> {
    fn statement(&self, kind: StatementKind) -> Statement {
        Statement {
            keyspace: self.keyspace.to_string(),
            table: self.table.to_string(),
            kind,
        }
    }

    fn insert(&self, record: &Record, ttl: Ttl) -> Result<Statement, ValidationError> {
        if record.is_empty() {
            return Err(ValidationError::EmptyRecord {
                operation: "insert",
            });
        }
        let columns = record
            .iter()
            .map(|(name, value)| {
                validate_identifier(name)?;
                Ok((name.clone(), value.clone()))
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        Ok(self.statement(StatementKind::Insert {
            columns,
            ttl: ttl.effective()?,
        }))
    }

    fn update(&self, key: &RecordKey, values: &Record, ttl: Ttl) -> Result<Statement, ValidationError> {
        key.validate()?;
        if values.is_empty() {
            return Err(ValidationError::EmptyRecord {
                operation: "update",
            });
        }
        let assignments = values
            .iter()
            .map(|(column, value)| {
                validate_identifier(column)?;
                if key.binds(column) {
                    return Err(ValidationError::KeyColumnInValues {
                        column: column.clone(),
                    });
                }
                Ok(Assignment::Set {
                    column: column.clone(),
                    value: value.clone(),
                })
            })
            .collect::<Result<Vec<_>, ValidationError>>()?;

        Ok(self.statement(StatementKind::Update {
            assignments,
            conditions: key_conditions(key)?,
            ttl: ttl.effective()?,
        }))
    }

    fn map_entry(&self, key: &RecordKey, assignment: Assignment) -> Result<Statement, ValidationError> {
        key.validate()?;
        validate_identifier(assignment.column())?;
        if key.binds(assignment.column()) {
            return Err(ValidationError::KeyColumnInValues {
                column: assignment.column().to_string(),
            });
        }
        Ok(self.statement(StatementKind::Update {
            assignments: vec![assignment],
            conditions: key_conditions(key)?,
            ttl: None,
        }))
    }

    fn select(&self, criteria: &Criteria, projection: &Projection) -> Result<Statement, ValidationError> {
        projection.ttl.validate()?;
        let mut columns = projection.fields.clone();
        if let Some(fields) = &columns {
            for field in fields {
                validate_identifier(field)?;
            }
        }
        for (field, alias) in projection.ttl.fields() {
            validate_identifier(field)?;
            validate_identifier(alias)?;
        }
        // A TTL read without explicit fields still returns the tracked values.
        if columns.is_none() && !projection.ttl.is_empty() {
            columns = Some(
                projection
                    .ttl
                    .fields()
                    .iter()
                    .map(|(field, _)| field.clone())
                    .collect(),
            );
        }

        Ok(self.statement(StatementKind::Select {
            selection: Selection {
                columns,
                ttl: projection.ttl.fields().to_vec(),
            },
            conditions: self.conditions(criteria)?,
        }))
    }

    fn conditions(&self, criteria: &Criteria) -> Result<Vec<Condition>, ValidationError> {
        match criteria {
            Criteria::All => Ok(Vec::new()),
            Criteria::Key(key) => {
                key.validate()?;
                key_conditions(key)
            }
            Criteria::In { column, values } => {
                validate_identifier(column)?;
                if values.is_empty() {
                    return Err(ValidationError::EmptyList { what: "key list" });
                }
                for value in values {
                    if !is_scalar(value) || value.as_str().is_some_and(|s| s.trim().is_empty()) {
                        return Err(ValidationError::BlankIdentifier { what: "key value" });
                    }
                }
                Ok(vec![Condition::is_in(column.clone(), values.clone())])
            }
            Criteria::Properties(filter) => filter_conditions(filter, false),
            Criteria::KeyRange(filter) => filter_conditions(filter, true),
            Criteria::Contains {
                column,
                value,
                filter,
            } => {
                validate_identifier(column)?;
                if !is_scalar(value) {
                    return Err(ValidationError::InvalidFilter {
                        field: column.clone(),
                        message: "contains value must be a scalar".to_string(),
                    });
                }
                let mut conditions = vec![Condition {
                    column: column.clone(),
                    relation: Relation::Contains(value.clone()),
                }];
                conditions.extend(filter_conditions(filter, false)?);
                Ok(conditions)
            }
        }
    }
}

fn key_conditions(key: &RecordKey) -> Result<Vec<Condition>, ValidationError> {
    key.conditions()
        .into_iter()
        .map(|(column, value)| {
            validate_identifier(&column)?;
            Ok(Condition::eq(column, value))
        })
        .collect()
}

fn filter_conditions(filter: &Filter, allow_range: bool) -> Result<Vec<Condition>, ValidationError> {
    if !filter.any_of().is_empty() {
        return Err(ValidationError::InvalidFilter {
            field: crate::types::OR_GROUP_KEY.to_string(),
            message: "OR groups are only supported by the search index".to_string(),
        });
    }

    let mut conditions = Vec::new();
    for (field, value) in filter.entries() {
        validate_identifier(field)?;
        match value {
            FilterValue::Scalar(v) => conditions.push(Condition::eq(field.clone(), v.clone())),
            FilterValue::List(values) => {
                conditions.push(Condition::is_in(field.clone(), values.clone()))
            }
            FilterValue::Ops(ops) => {
                if !allow_range || ops.has_lexical() {
                    return Err(ValidationError::InvalidFilter {
                        field: field.clone(),
                        message: "range and lexical operators are only supported by the search index"
                            .to_string(),
                    });
                }
                for (op, bound) in ops.range_bounds() {
                    conditions.push(Condition {
                        column: field.clone(),
                        relation: Relation::Range(*op, bound.clone()),
                    });
                }
            }
        }
    }
    Ok(conditions)
}

/// Splits an id-keyed record into its id and the columns to set.
pub fn split_id(record: &Record) -> Result<(RecordKey, Record), ValidationError> {
    let id = match record.get(ID_COLUMN) {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => {
            return Err(ValidationError::MissingKeyColumn {
                column: ID_COLUMN.to_string(),
            });
        }
    };
    let key = RecordKey::Id(id);
    key.validate()?;
    let values = record
        .iter()
        .filter(|(name, _)| name.as_str() != ID_COLUMN)
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();
    Ok((key, values))
}

/// Converts a composite key into a read filter.
pub fn key_filter(key: &CompositeKey) -> Filter {
    key.columns()
        .iter()
        .fold(Filter::new(), |filter, (column, value)| {
            filter.with(column.clone(), FilterValue::Scalar(value.clone()))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn single(compiled: Compiled) -> Statement {
        match compiled {
            Compiled::Single(statement) => statement,
            other => panic!("expected a single statement, got {other:?}"),
        }
    }

    #[test]
    fn test_insert_binds_every_column_in_order() {
        let op = ColumnOperation::Insert {
            record: record(json!({"id": "u1", "name": "Ann", "age": 30})),
            ttl: Ttl::NONE,
        };
        let statement = single(compile("app", "users", &op).unwrap());
        assert_eq!(
            statement.cql(),
            "INSERT INTO app.users (id, name, age) VALUES (?, ?, ?)"
        );
        assert_eq!(statement.values(), vec![json!("u1"), json!("Ann"), json!(30)]);
    }

    #[test]
    fn test_non_positive_ttl_not_attached() {
        for ttl in [0, -10] {
            let op = ColumnOperation::Insert {
                record: record(json!({"id": "u1"})),
                ttl: Ttl(ttl),
            };
            let statement = single(compile("app", "users", &op).unwrap());
            assert!(!statement.cql().contains("TTL"));
        }
    }

    #[test]
    fn test_update_by_id_excludes_key_from_set() {
        let (key, values) = split_id(&record(json!({"id": "u1", "name": "Ann"}))).unwrap();
        let op = ColumnOperation::Update {
            key,
            values,
            ttl: Ttl::NONE,
        };
        let statement = single(compile("app", "users", &op).unwrap());
        assert_eq!(statement.cql(), "UPDATE app.users SET name = ? WHERE id = ?");
        assert_eq!(statement.values(), vec![json!("Ann"), json!("u1")]);
    }

    #[test]
    fn test_update_values_containing_key_text() {
        // Column values are bound, so text that looks like CQL is harmless.
        let (key, values) = split_id(&record(json!({
            "id": "u1",
            "bio": "SET id = ? WHERE"
        })))
        .unwrap();
        let op = ColumnOperation::Update {
            key,
            values,
            ttl: Ttl::NONE,
        };
        let statement = single(compile("app", "users", &op).unwrap());
        assert_eq!(statement.cql(), "UPDATE app.users SET bio = ? WHERE id = ?");
    }

    #[test]
    fn test_composite_update_rejects_key_in_values() {
        let key = RecordKey::Composite(CompositeKey::new().with("userid", "u1").with("courseid", "c1"));
        let op = ColumnOperation::Update {
            key,
            values: record(json!({"courseid": "c2"})),
            ttl: Ttl::NONE,
        };
        assert_eq!(
            compile("app", "user_courses", &op).unwrap_err(),
            ValidationError::KeyColumnInValues {
                column: "courseid".to_string()
            }
        );
    }

    #[test]
    fn test_composite_update_with_ttl() {
        let key = RecordKey::Composite(CompositeKey::new().with("userid", "u1").with("courseid", "c1"));
        let op = ColumnOperation::Update {
            key,
            values: record(json!({"progress": 50})),
            ttl: Ttl(120),
        };
        let statement = single(compile("app", "user_courses", &op).unwrap());
        assert_eq!(
            statement.cql(),
            "UPDATE app.user_courses USING TTL 120 SET progress = ? WHERE userid = ? AND courseid = ?"
        );
    }

    #[test]
    fn test_ttl_above_maximum_rejected_before_execution() {
        let op = ColumnOperation::Insert {
            record: record(json!({"id": "u1", "token": "t"})),
            ttl: Ttl(i64::MAX),
        };
        assert!(matches!(
            compile("app", "sessions", &op).unwrap_err(),
            ValidationError::InvalidTtl { max: Ttl::MAX_SECONDS, .. }
        ));
    }

    #[test]
    fn test_property_filter_shape_dispatch() {
        let filter = Filter::from_json(&json!({
            "status": "active",
            "role": ["admin", "editor"],
            "org": "o1"
        }))
        .unwrap();
        let op = ColumnOperation::Select {
            criteria: Criteria::Properties(filter),
            projection: Projection::all(),
        };
        let statement = single(compile("app", "users", &op).unwrap());
        assert_eq!(
            statement.cql(),
            "SELECT * FROM app.users WHERE status = ? AND role IN (?, ?) AND org = ?"
        );
    }

    #[test]
    fn test_property_filter_rejects_operators() {
        let filter = Filter::from_json(&json!({"age": {">=": 18}})).unwrap();
        let op = ColumnOperation::Select {
            criteria: Criteria::Properties(filter),
            projection: Projection::all(),
        };
        assert!(matches!(
            compile("app", "users", &op),
            Err(ValidationError::InvalidFilter { .. })
        ));
    }

    #[test]
    fn test_key_range_allows_range_operators() {
        let filter = Filter::from_json(&json!({
            "userid": "u1",
            "createdon": {">=": "2024-01-01", "<": "2024-02-01"}
        }))
        .unwrap();
        let op = ColumnOperation::Select {
            criteria: Criteria::KeyRange(filter),
            projection: Projection::fields(Some(vec!["userid".to_string()])),
        };
        let statement = single(compile("app", "events", &op).unwrap());
        assert_eq!(
            statement.cql(),
            "SELECT userid FROM app.events WHERE userid = ? AND createdon >= ? AND createdon < ?"
        );
    }

    #[test]
    fn test_or_group_rejected() {
        let filter = Filter::from_json(&json!({"$or": {"a": "x", "b": "y"}})).unwrap();
        let op = ColumnOperation::Select {
            criteria: Criteria::Properties(filter),
            projection: Projection::all(),
        };
        assert!(compile("app", "users", &op).is_err());
    }

    #[test]
    fn test_delete_variants() {
        let by_id = ColumnOperation::Delete {
            criteria: Criteria::Key(RecordKey::id("u1")),
        };
        assert_eq!(
            single(compile("app", "users", &by_id).unwrap()).cql(),
            "DELETE FROM app.users WHERE id = ?"
        );

        let many = ColumnOperation::Delete {
            criteria: Criteria::In {
                column: "id".to_string(),
                values: vec![json!("u1"), json!("u2")],
            },
        };
        assert_eq!(
            single(compile("app", "users", &many).unwrap()).cql(),
            "DELETE FROM app.users WHERE id IN (?, ?)"
        );

        let everything = ColumnOperation::Delete {
            criteria: Criteria::All,
        };
        assert!(compile("app", "users", &everything).is_err());
    }

    #[test]
    fn test_blank_id_rejected_before_compile() {
        let op = ColumnOperation::Select {
            criteria: Criteria::Key(RecordKey::id("")),
            projection: Projection::all(),
        };
        assert_eq!(
            compile("app", "users", &op).unwrap_err(),
            ValidationError::BlankIdentifier { what: "record id" }
        );
    }

    #[test]
    fn test_ttl_read_without_fields_selects_tracked_columns() {
        let op = ColumnOperation::Select {
            criteria: Criteria::Key(RecordKey::id("u1")),
            projection: Projection::all()
                .with_ttl(TtlProjection::new().with("token", "token_ttl")),
        };
        assert_eq!(
            single(compile("app", "sessions", &op).unwrap()).cql(),
            "SELECT token, TTL(token) AS token_ttl FROM app.sessions WHERE id = ?"
        );
    }

    #[test]
    fn test_ttl_read_blank_alias_rejected() {
        let op = ColumnOperation::Select {
            criteria: Criteria::Key(RecordKey::id("u1")),
            projection: Projection::all().with_ttl(TtlProjection::new().with("token", "")),
        };
        assert_eq!(
            compile("app", "sessions", &op).unwrap_err(),
            ValidationError::MissingTtlAlias {
                field: "token".to_string()
            }
        );
    }

    #[test]
    fn test_contains_with_filter() {
        let op = ColumnOperation::Select {
            criteria: Criteria::Contains {
                column: "roles".to_string(),
                value: json!("admin"),
                filter: Filter::new().with("org", "o1"),
            },
            projection: Projection::all(),
        };
        assert_eq!(
            single(compile("app", "users", &op).unwrap()).cql(),
            "SELECT * FROM app.users WHERE roles CONTAINS ? AND org = ?"
        );
    }

    #[test]
    fn test_identifier_injection_rejected() {
        let op = ColumnOperation::Insert {
            record: record(json!({"id; DROP TABLE users": "x"})),
            ttl: Ttl::NONE,
        };
        assert!(matches!(
            compile("app", "users", &op),
            Err(ValidationError::InvalidIdentifier { .. })
        ));
        assert!(compile("bad-ks", "users", &ColumnOperation::Select {
            criteria: Criteria::All,
            projection: Projection::all(),
        })
        .is_err());
    }

    #[test]
    fn test_batch_mixed_items() {
        let op = ColumnOperation::Batch {
            items: vec![
                BatchItem::Insert {
                    record: record(json!({"id": "u1", "name": "Ann"})),
                    ttl: Ttl(30),
                },
                BatchItem::Update {
                    key: RecordKey::id("u2"),
                    values: record(json!({"name": "Bob"})),
                },
            ],
        };
        let compiled = compile("app", "users", &op).unwrap();
        let statements = compiled.statements();
        assert_eq!(statements.len(), 2);
        assert!(statements[0].cql().ends_with("USING TTL 30"));
        assert_eq!(statements[1].cql(), "UPDATE app.users SET name = ? WHERE id = ?");

        let empty = ColumnOperation::Batch { items: vec![] };
        assert_eq!(
            compile("app", "users", &empty).unwrap_err(),
            ValidationError::EmptyBatch
        );
    }

    #[test]
    fn test_map_entry_requires_key() {
        let op = ColumnOperation::PutMapEntry {
            key: RecordKey::id(" "),
            column: "prefs".to_string(),
            map_key: "lang".to_string(),
            value: json!("en"),
        };
        assert!(compile("app", "users", &op).is_err());
    }

    #[test]
    fn test_split_id_requires_id() {
        assert_eq!(
            split_id(&record(json!({"name": "Ann"}))).unwrap_err(),
            ValidationError::MissingKeyColumn {
                column: "id".to_string()
            }
        );
    }
}
