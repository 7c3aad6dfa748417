//! The filter DSL.
//!
//! A filter maps field names to one of three value shapes:
//!
//! | JSON shape | Variant | Meaning |
//! |------------|---------|---------|
//! | `"active"`, `18`, `true` | [`FilterValue::Scalar`] | equality |
//! | `["a", "b"]` | [`FilterValue::List`] | membership (IN) |
//! | `{">=": 18, "startsWith": "an"}` | [`FilterValue::Ops`] | range and/or lexical match |
//!
//! The shape is resolved once, when the filter is parsed, so the compilers
//! never re-inspect raw JSON. A field containing `.` (`certs.level`) addresses
//! a nested document path.
//!
//! The key [`OR_GROUP_KEY`] holds a sub-map whose entries are combined with OR
//! instead of AND.

use std::fmt;

use serde_json::{Map, Value};

use crate::error::ValidationError;

use super::record::is_scalar;

/// Filter key whose sub-map entries are combined with OR.
pub const OR_GROUP_KEY: &str = "$or";

/// A range comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RangeOp {
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
}

impl RangeOp {
    /// Parses the DSL spelling of an operator.
    pub fn parse(symbol: &str) -> Option<Self> {
        match symbol {
            ">" => Some(RangeOp::Gt),
            ">=" => Some(RangeOp::Gte),
            "<" => Some(RangeOp::Lt),
            "<=" => Some(RangeOp::Lte),
            _ => None,
        }
    }

    /// Returns the DSL and CQL spelling.
    pub fn symbol(self) -> &'static str {
        match self {
            RangeOp::Gt => ">",
            RangeOp::Gte => ">=",
            RangeOp::Lt => "<",
            RangeOp::Lte => "<=",
        }
    }

    /// Returns the key used inside an Elasticsearch `range` clause.
    pub fn es_key(self) -> &'static str {
        match self {
            RangeOp::Gt => "gt",
            RangeOp::Gte => "gte",
            RangeOp::Lt => "lt",
            RangeOp::Lte => "lte",
        }
    }

    fn is_lower_bound(self) -> bool {
        matches!(self, RangeOp::Gt | RangeOp::Gte)
    }
}

impl fmt::Display for RangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// A prefix or suffix match operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LexicalOp {
    /// `startsWith`
    StartsWith,
    /// `endsWith`
    EndsWith,
}

impl LexicalOp {
    /// Parses the DSL spelling of an operator.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "startsWith" => Some(LexicalOp::StartsWith),
            "endsWith" => Some(LexicalOp::EndsWith),
            _ => None,
        }
    }

    /// Returns the DSL spelling.
    pub fn name(self) -> &'static str {
        match self {
            LexicalOp::StartsWith => "startsWith",
            LexicalOp::EndsWith => "endsWith",
        }
    }
}

/// The operators attached to one field.
///
/// At most one lower bound and one upper bound may be present; `>` together
/// with `>=` (or `<` with `<=`) is a conflict and is rejected while parsing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperatorSet {
    range: Vec<(RangeOp, Value)>,
    lexical: Vec<(LexicalOp, String)>,
}

impl OperatorSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a range bound.
    pub fn range(mut self, op: RangeOp, value: impl Into<Value>) -> Self {
        self.range.push((op, value.into()));
        self.range.sort_by_key(|(op, _)| *op);
        self
    }

    /// Adds a lexical match.
    pub fn lexical(mut self, op: LexicalOp, value: impl Into<String>) -> Self {
        self.lexical.push((op, value.into()));
        self
    }

    /// Returns the range bounds, lower bound first.
    pub fn range_bounds(&self) -> &[(RangeOp, Value)] {
        &self.range
    }

    /// Returns the lexical matches.
    pub fn lexical_ops(&self) -> &[(LexicalOp, String)] {
        &self.lexical
    }

    /// Returns true if any range operator is present.
    pub fn has_range(&self) -> bool {
        !self.range.is_empty()
    }

    /// Returns true if any lexical operator is present.
    pub fn has_lexical(&self) -> bool {
        !self.lexical.is_empty()
    }

    fn check(&self, field: &str) -> Result<(), ValidationError> {
        if self.range.is_empty() && self.lexical.is_empty() {
            return Err(ValidationError::InvalidFilter {
                field: field.to_string(),
                message: "operator map must not be empty".to_string(),
            });
        }
        for (i, (op, _)) in self.range.iter().enumerate() {
            for (other, _) in &self.range[i + 1..] {
                if op.is_lower_bound() == other.is_lower_bound() {
                    return Err(ValidationError::ConflictingOperators {
                        field: field.to_string(),
                        first: op.symbol().to_string(),
                        second: other.symbol().to_string(),
                    });
                }
            }
        }
        for (i, (op, _)) in self.lexical.iter().enumerate() {
            if self.lexical[i + 1..].iter().any(|(other, _)| other == op) {
                return Err(ValidationError::ConflictingOperators {
                    field: field.to_string(),
                    first: op.name().to_string(),
                    second: op.name().to_string(),
                });
            }
        }
        Ok(())
    }
}

/// The value attached to one filter field, resolved by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterValue {
    /// Equality against a string, number or boolean.
    Scalar(Value),
    /// Membership in a non-empty list of scalars.
    List(Vec<Value>),
    /// Range and/or lexical operators.
    Ops(OperatorSet),
}

impl FilterValue {
    /// Resolves the shape of a raw JSON filter value.
    pub fn from_json(field: &str, value: &Value) -> Result<Self, ValidationError> {
        let invalid = |message: &str| ValidationError::InvalidFilter {
            field: field.to_string(),
            message: message.to_string(),
        };

        match value {
            Value::Null => Err(invalid("null is not a filter value")),
            Value::Array(items) => {
                if items.is_empty() {
                    return Err(invalid("list must not be empty"));
                }
                if !items.iter().all(is_scalar) {
                    return Err(invalid("list elements must be scalars"));
                }
                Ok(FilterValue::List(items.clone()))
            }
            Value::Object(ops) => {
                let mut set = OperatorSet::new();
                for (name, operand) in ops {
                    if let Some(op) = RangeOp::parse(name) {
                        if !is_scalar(operand) {
                            return Err(invalid("range bounds must be scalars"));
                        }
                        set = set.range(op, operand.clone());
                    } else if let Some(op) = LexicalOp::parse(name) {
                        let text = operand
                            .as_str()
                            .ok_or_else(|| invalid("lexical operands must be strings"))?;
                        set = set.lexical(op, text);
                    } else {
                        return Err(ValidationError::UnsupportedOperator {
                            field: field.to_string(),
                            operator: name.clone(),
                        });
                    }
                }
                set.check(field)?;
                Ok(FilterValue::Ops(set))
            }
            scalar => Ok(FilterValue::Scalar(scalar.clone())),
        }
    }

    /// Returns a short name of the shape, for error messages.
    pub fn shape(&self) -> &'static str {
        match self {
            FilterValue::Scalar(_) => "scalar",
            FilterValue::List(_) => "list",
            FilterValue::Ops(_) => "operators",
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Scalar(Value::String(value.to_string()))
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Scalar(Value::String(value))
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Scalar(Value::from(value))
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Scalar(Value::Bool(value))
    }
}

impl From<OperatorSet> for FilterValue {
    fn from(ops: OperatorSet) -> Self {
        FilterValue::Ops(ops)
    }
}

/// An ordered filter map with at most one entry per field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    entries: Vec<(String, FilterValue)>,
    any_of: Vec<(String, FilterValue)>,
}

impl Filter {
    /// Creates an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a JSON object into a filter.
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let map = value
            .as_object()
            .ok_or_else(|| ValidationError::InvalidRequest {
                field: "filters".to_string(),
                message: "expected a map of field to value".to_string(),
            })?;
        Self::from_map(map)
    }

    /// Parses a JSON map into a filter.
    pub fn from_map(map: &Map<String, Value>) -> Result<Self, ValidationError> {
        let mut filter = Self::new();
        for (field, value) in map {
            if field == OR_GROUP_KEY {
                let group = value
                    .as_object()
                    .ok_or_else(|| ValidationError::InvalidFilter {
                        field: field.clone(),
                        message: "OR group must be a map".to_string(),
                    })?;
                for (member, member_value) in group {
                    filter.push_any(member.clone(), FilterValue::from_json(member, member_value)?)?;
                }
            } else {
                filter.push(field.clone(), FilterValue::from_json(field, value)?)?;
            }
        }
        Ok(filter)
    }

    /// Adds a mandatory entry, rejecting a field that is already present.
    pub fn push(&mut self, field: impl Into<String>, value: FilterValue) -> Result<(), ValidationError> {
        let field = field.into();
        Self::check_field(&self.entries, &field)?;
        self.entries.push((field, value));
        Ok(())
    }

    /// Adds an entry to the OR group.
    pub fn push_any(&mut self, field: impl Into<String>, value: FilterValue) -> Result<(), ValidationError> {
        let field = field.into();
        Self::check_field(&self.any_of, &field)?;
        self.any_of.push((field, value));
        Ok(())
    }

    /// Builder form of [`Filter::push`] for statically known, distinct fields.
    ///
    /// A repeated field replaces the earlier value.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        let field = field.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(name, _)| *name == field) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((field, value)),
        }
        self
    }

    /// Returns the mandatory entries in order.
    pub fn entries(&self) -> &[(String, FilterValue)] {
        &self.entries
    }

    /// Returns the OR group entries in order.
    pub fn any_of(&self) -> &[(String, FilterValue)] {
        &self.any_of
    }

    /// Returns true if the filter has neither entries nor an OR group.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty() && self.any_of.is_empty()
    }

    fn check_field(existing: &[(String, FilterValue)], field: &str) -> Result<(), ValidationError> {
        if field.trim().is_empty() {
            return Err(ValidationError::BlankIdentifier {
                what: "filter field",
            });
        }
        if existing.iter().any(|(name, _)| name == field) {
            return Err(ValidationError::DuplicateField {
                field: field.to_string(),
            });
        }
        Ok(())
    }
}

/// Splits a dotted field into its nested path and the full field name.
///
/// `certs.level` yields `Some("certs")`; plain fields yield `None`.
pub fn nested_path(field: &str) -> Option<&str> {
    field.split_once('.').map(|(path, _)| path)
}
