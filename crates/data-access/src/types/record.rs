//! Records, keys and TTL annotations.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// A single row or document: field name to JSON value.
pub type Record = Map<String, Value>;

/// Name of the single-column primary key used by id-based operations.
pub const ID_COLUMN: &str = "id";

/// Returns true for values that can be bound as a single key or filter term.
pub(crate) fn is_scalar(value: &Value) -> bool {
    matches!(value, Value::String(_) | Value::Number(_) | Value::Bool(_))
}

/// Rejects empty or whitespace-only identifiers.
pub(crate) fn require_non_blank(value: &str, what: &'static str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::BlankIdentifier { what })
    } else {
        Ok(())
    }
}

/// A multi-column key: partition and clustering column names mapped to values.
///
/// Entries keep their insertion order, which is also the order of the
/// generated WHERE conditions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompositeKey {
    columns: Vec<(String, Value)>,
}

impl CompositeKey {
    /// Creates an empty key; add columns with [`CompositeKey::with`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a key column, replacing an earlier value for the same column.
    pub fn with(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        let column = column.into();
        let value = value.into();
        match self.columns.iter_mut().find(|(name, _)| *name == column) {
            Some(entry) => entry.1 = value,
            None => self.columns.push((column, value)),
        }
        self
    }

    /// Builds a key from a record map.
    pub fn from_record(record: &Record) -> Result<Self, ValidationError> {
        let key = Self {
            columns: record
                .iter()
                .map(|(name, value)| (name.clone(), value.clone()))
                .collect(),
        };
        key.validate()?;
        Ok(key)
    }

    /// Checks that the key is non-empty and every value is a scalar.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.columns.is_empty() {
            return Err(ValidationError::EmptyCompositeKey);
        }
        for (column, value) in &self.columns {
            require_non_blank(column, "key column name")?;
            if !is_scalar(value) {
                return Err(ValidationError::InvalidKeyValue {
                    column: column.clone(),
                });
            }
        }
        Ok(())
    }

    /// Returns the key columns in order.
    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }

    /// Returns the value bound to `column`.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value)
    }

    /// Returns true if `column` is part of this key.
    pub fn contains(&self, column: &str) -> bool {
        self.get(column).is_some()
    }

    /// Returns the number of key columns.
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    /// Returns true if the key has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// Identifies a row: either by its `id` or by a composite key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordKey {
    /// Single string identifier bound to the `id` column.
    Id(String),
    /// Multi-column key.
    Composite(CompositeKey),
}

impl RecordKey {
    /// Creates an id key.
    pub fn id(id: impl Into<String>) -> Self {
        RecordKey::Id(id.into())
    }

    /// Rejects blank ids and empty composite keys.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match self {
            RecordKey::Id(id) => require_non_blank(id, "record id"),
            RecordKey::Composite(key) => key.validate(),
        }
    }

    /// Returns the key as `(column, value)` equality pairs.
    pub fn conditions(&self) -> Vec<(String, Value)> {
        match self {
            RecordKey::Id(id) => vec![(ID_COLUMN.to_string(), Value::String(id.clone()))],
            RecordKey::Composite(key) => key.columns().to_vec(),
        }
    }

    /// Returns true if `column` participates in the key.
    pub fn binds(&self, column: &str) -> bool {
        match self {
            RecordKey::Id(_) => column == ID_COLUMN,
            RecordKey::Composite(key) => key.contains(column),
        }
    }
}

impl From<&str> for RecordKey {
    fn from(id: &str) -> Self {
        RecordKey::Id(id.to_string())
    }
}

impl From<String> for RecordKey {
    fn from(id: String) -> Self {
        RecordKey::Id(id)
    }
}

impl From<CompositeKey> for RecordKey {
    fn from(key: CompositeKey) -> Self {
        RecordKey::Composite(key)
    }
}

/// Time-to-live requested at write time, in seconds.
///
/// Zero or negative values mean "no expiry" and are never attached to a
/// statement. Values above [`Ttl::MAX_SECONDS`] are rejected.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ttl(pub i64);

impl Ttl {
    /// No expiry.
    pub const NONE: Ttl = Ttl(0);

    /// Largest TTL the column store accepts (twenty years).
    pub const MAX_SECONDS: i64 = 630_720_000;

    /// Returns the seconds to attach, if any.
    pub fn effective(self) -> Result<Option<i64>, ValidationError> {
        if self.0 > Self::MAX_SECONDS {
            return Err(ValidationError::InvalidTtl {
                seconds: self.0,
                max: Self::MAX_SECONDS,
            });
        }
        Ok((self.0 > 0).then_some(self.0))
    }
}

impl From<i64> for Ttl {
    fn from(seconds: i64) -> Self {
        Ttl(seconds)
    }
}

/// TTL-tracked fields requested at read time, each with the alias under
/// which the remaining TTL is returned.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlProjection {
    fields: Vec<(String, String)>,
}

impl TtlProjection {
    /// Creates an empty projection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a field and its alias.
    pub fn with(mut self, field: impl Into<String>, alias: impl Into<String>) -> Self {
        self.fields.push((field.into(), alias.into()));
        self
    }

    /// Pairs each TTL field with its configured alias.
    ///
    /// A field without an alias, or with a blank one, is rejected here so the
    /// mistake never reaches the backend.
    pub fn from_aliases(
        fields: &[impl AsRef<str>],
        aliases: &HashMap<String, String>,
    ) -> Result<Self, ValidationError> {
        let mut projection = Self::new();
        for field in fields {
            let field = field.as_ref();
            let alias = aliases.get(field).cloned().unwrap_or_default();
            projection = projection.with(field, alias);
        }
        projection.validate()?;
        Ok(projection)
    }

    /// Checks every field has a non-blank alias.
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (field, alias) in &self.fields {
            require_non_blank(field, "ttl field")?;
            if alias.trim().is_empty() {
                return Err(ValidationError::MissingTtlAlias {
                    field: field.clone(),
                });
            }
        }
        Ok(())
    }

    /// Returns `(field, alias)` pairs.
    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    /// Returns true if no field is tracked.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
