//! Declared primary-key layouts for column-store tables.
//!
//! Key columns are declared up front, either in code or through
//! [`TableKeyConfig`](crate::config::TableKeyConfig) entries. Operations that
//! need to separate key columns from value columns (batch updates, row
//! identity in the in-memory store) look the layout up in a [`TableRegistry`].

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ValidationError;

use super::record::{CompositeKey, ID_COLUMN, Record};

/// Role of a key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyKind {
    /// Part of the partition key.
    Partition,
    /// Clustering column within a partition.
    Clustering,
}

/// One column of a primary key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyColumn {
    /// Column name.
    pub name: String,
    /// Partition or clustering.
    pub kind: KeyKind,
}

/// Ordered primary-key layout of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySchema {
    columns: Vec<KeyColumn>,
}

impl Default for KeySchema {
    fn default() -> Self {
        Self {
            columns: vec![KeyColumn {
                name: ID_COLUMN.to_string(),
                kind: KeyKind::Partition,
            }],
        }
    }
}

impl KeySchema {
    /// Creates a schema from partition and clustering column names.
    ///
    /// Requires at least one partition column and no repeated names.
    pub fn new<P, C>(partition: P, clustering: C) -> Result<Self, ValidationError>
    where
        P: IntoIterator,
        P::Item: Into<String>,
        C: IntoIterator,
        C::Item: Into<String>,
    {
        let columns: Vec<KeyColumn> = partition
            .into_iter()
            .map(|name| KeyColumn {
                name: name.into(),
                kind: KeyKind::Partition,
            })
            .chain(clustering.into_iter().map(|name| KeyColumn {
                name: name.into(),
                kind: KeyKind::Clustering,
            }))
            .collect();

        if !columns.iter().any(|c| c.kind == KeyKind::Partition) {
            return Err(ValidationError::InvalidKeySchema {
                message: "at least one partition column is required".to_string(),
            });
        }
        for (i, column) in columns.iter().enumerate() {
            if column.name.trim().is_empty() {
                return Err(ValidationError::InvalidKeySchema {
                    message: "key column names must not be blank".to_string(),
                });
            }
            if columns[i + 1..].iter().any(|c| c.name == column.name) {
                return Err(ValidationError::InvalidKeySchema {
                    message: format!("column '{}' declared twice", column.name),
                });
            }
        }
        Ok(Self { columns })
    }

    /// All key columns, partition columns first.
    pub fn columns(&self) -> &[KeyColumn] {
        &self.columns
    }

    /// Names of the partition columns.
    pub fn partition_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.kind == KeyKind::Partition)
            .map(|c| c.name.as_str())
    }

    /// Names of the clustering columns.
    pub fn clustering_columns(&self) -> impl Iterator<Item = &str> {
        self.columns
            .iter()
            .filter(|c| c.kind == KeyKind::Clustering)
            .map(|c| c.name.as_str())
    }

    /// Returns true if `name` is a key column.
    pub fn is_key_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// Separates a full record into its key and the remaining value columns.
    pub fn split(&self, record: &Record) -> Result<(CompositeKey, Record), ValidationError> {
        let mut key = CompositeKey::new();
        for column in &self.columns {
            let value = record
                .get(&column.name)
                .filter(|v| !v.is_null())
                .ok_or_else(|| ValidationError::MissingKeyColumn {
                    column: column.name.clone(),
                })?;
            key = key.with(column.name.clone(), value.clone());
        }
        key.validate()?;

        let values = record
            .iter()
            .filter(|(name, _)| !self.is_key_column(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Ok((key, values))
    }

    /// Extracts the key values of a record, in schema order.
    pub fn key_of(&self, record: &Record) -> Option<Vec<Value>> {
        self.columns
            .iter()
            .map(|c| record.get(&c.name).filter(|v| !v.is_null()).cloned())
            .collect()
    }
}

/// Key layouts per `(keyspace, table)`, falling back to a single `id` column.
#[derive(Debug, Clone, Default)]
pub struct TableRegistry {
    tables: HashMap<(String, String), KeySchema>,
    fallback: KeySchema,
}

impl TableRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares the key layout of a table.
    pub fn register(
        &mut self,
        keyspace: impl Into<String>,
        table: impl Into<String>,
        schema: KeySchema,
    ) {
        self.tables.insert((keyspace.into(), table.into()), schema);
    }

    /// Builder form of [`TableRegistry::register`].
    pub fn with_table(
        mut self,
        keyspace: impl Into<String>,
        table: impl Into<String>,
        schema: KeySchema,
    ) -> Self {
        self.register(keyspace, table, schema);
        self
    }

    /// Returns the layout of a table.
    pub fn get(&self, keyspace: &str, table: &str) -> &KeySchema {
        self.tables
            .get(&(keyspace.to_string(), table.to_string()))
            .unwrap_or(&self.fallback)
    }

    /// Returns the number of declared tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if no table is declared.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_default_schema_is_id() {
        let schema = KeySchema::default();
        assert_eq!(schema.partition_columns().collect::<Vec<_>>(), vec!["id"]);
        assert_eq!(schema.clustering_columns().count(), 0);
    }

    #[test]
    fn test_schema_requires_partition_column() {
        let err = KeySchema::new(Vec::<String>::new(), ["createdon"]).unwrap_err();
        assert!(matches!(err, ValidationError::InvalidKeySchema { .. }));
    }

    #[test]
    fn test_schema_rejects_duplicates() {
        assert!(KeySchema::new(["userid"], ["userid"]).is_err());
    }

    #[test]
    fn test_split_record() {
        let schema = KeySchema::new(["userid"], ["courseid"]).unwrap();
        let (key, values) = schema
            .split(&record(json!({
                "userid": "u1",
                "courseid": "c1",
                "progress": 40
            })))
            .unwrap();
        assert_eq!(key.get("userid"), Some(&json!("u1")));
        assert_eq!(key.get("courseid"), Some(&json!("c1")));
        assert_eq!(values.len(), 1);
        assert_eq!(values.get("progress"), Some(&json!(40)));
    }

    #[test]
    fn test_split_missing_key_column() {
        let schema = KeySchema::new(["userid"], ["courseid"]).unwrap();
        let err = schema
            .split(&record(json!({"userid": "u1", "progress": 40})))
            .unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingKeyColumn {
                column: "courseid".to_string()
            }
        );
    }

    #[test]
    fn test_registry_fallback() {
        let registry = TableRegistry::new().with_table(
            "app",
            "user_courses",
            KeySchema::new(["userid"], ["courseid"]).unwrap(),
        );
        assert_eq!(registry.get("app", "user_courses").columns().len(), 2);
        assert_eq!(registry.get("app", "users"), &KeySchema::default());
    }
}
