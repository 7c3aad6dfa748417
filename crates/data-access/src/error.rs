//! Error types for the data-access layer.
//!
//! Every failure surfaces as a [`DataAccessError`]. Callers branch on
//! [`DataAccessError::kind`] instead of inspecting message text:
//!
//! - [`ErrorKind::Validation`] - the request was rejected before any native call
//! - [`ErrorKind::Schema`] - the backend reported an unknown column or property
//! - [`ErrorKind::Execution`] - the backend failed, timed out or was unreachable
//!
//! Native driver failures enter the layer as a [`DriverError`] and are turned
//! into one of the above by [`classify`], which attaches the operation context.

// Error enum variant fields are self-documenting via their #[error(...)] messages
#![allow(missing_docs)]

use std::fmt;
use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use thiserror::Error;

/// The primary error type for all data-access operations.
#[derive(Error, Debug)]
pub enum DataAccessError {
    /// Request validation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Unknown property reported by the backend
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Native execution errors
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    /// Handle establishment and serialization errors
    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Coarse classification used by callers to map failures to external status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Rejected before reaching the backend.
    Validation,
    /// The backend does not know a referenced column/property.
    Schema,
    /// The backend failed to execute the request.
    Execution,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "validation"),
            ErrorKind::Schema => write!(f, "schema"),
            ErrorKind::Execution => write!(f, "execution"),
        }
    }
}

impl DataAccessError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DataAccessError::Validation(_) => ErrorKind::Validation,
            DataAccessError::Schema(_) => ErrorKind::Schema,
            DataAccessError::Execution(_) | DataAccessError::Backend(_) => ErrorKind::Execution,
        }
    }

    /// Returns true if the caller is responsible for the failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self.kind(), ErrorKind::Validation | ErrorKind::Schema)
    }

    /// Returns true if repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            DataAccessError::Execution(err) => err.is_retryable(),
            DataAccessError::Backend(BackendError::Unavailable { .. })
            | DataAccessError::Backend(BackendError::ConnectionFailed { .. }) => true,
            _ => false,
        }
    }
}

/// Errors raised while validating a request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required identifier was empty or whitespace.
    #[error("{what} must not be blank")]
    BlankIdentifier { what: &'static str },

    /// A keyspace, table, column or alias is not a plain identifier.
    #[error("invalid identifier '{name}'")]
    InvalidIdentifier { name: String },

    /// A composite key map was supplied without entries.
    #[error("composite key must not be empty")]
    EmptyCompositeKey,

    /// A composite key value is not a scalar.
    #[error("composite key column '{column}' must hold a scalar value")]
    InvalidKeyValue { column: String },

    /// A list of identifiers was supplied without entries.
    #[error("{what} must not be empty")]
    EmptyList { what: &'static str },

    /// A write carried no columns.
    #[error("{operation} requires at least one column")]
    EmptyRecord { operation: &'static str },

    /// A record is missing one of its key columns.
    #[error("missing key column '{column}'")]
    MissingKeyColumn { column: String },

    /// A key column was supplied among the values to set.
    #[error("key column '{column}' cannot be updated")]
    KeyColumnInValues { column: String },

    /// A declared key schema is malformed.
    #[error("invalid key schema: {message}")]
    InvalidKeySchema { message: String },

    /// A TTL-tracked field has no alias.
    #[error("missing alias for ttl field '{field}'")]
    MissingTtlAlias { field: String },

    /// A write TTL exceeds the column store's maximum.
    #[error("ttl of {seconds} seconds exceeds the maximum of {max}")]
    InvalidTtl { seconds: i64, max: i64 },

    /// A filter entry could not be interpreted.
    #[error("invalid filter for '{field}': {message}")]
    InvalidFilter { field: String, message: String },

    /// The filter map was present but empty.
    #[error("filters must not be empty when supplied")]
    EmptyFilter,

    /// A field received an operator outside the supported set.
    #[error("unsupported operator '{operator}' for '{field}'")]
    UnsupportedOperator { field: String, operator: String },

    /// Two operators bound the same side of a range.
    #[error("conflicting operators '{first}' and '{second}' for '{field}'")]
    ConflictingOperators {
        field: String,
        first: String,
        second: String,
    },

    /// A field appears twice in one filter map.
    #[error("duplicate filter field '{field}'")]
    DuplicateField { field: String },

    /// The page size is outside `1..=max`.
    #[error("limit must be between 1 and {max}, got {limit}")]
    InvalidLimit { limit: i64, max: u64 },

    /// The page offset is negative.
    #[error("offset must not be negative, got {offset}")]
    InvalidOffset { offset: i64 },

    /// A search envelope entry has the wrong shape.
    #[error("invalid search request field '{field}': {message}")]
    InvalidRequest { field: String, message: String },

    /// A batch was supplied without statements.
    #[error("batch must contain at least one record")]
    EmptyBatch,

    /// Batch records and TTL values do not line up.
    #[error("batch has {records} records but {ttls} ttl values")]
    BatchSizeMismatch { records: usize, ttls: usize },
}

/// Errors raised when the backend rejects a column or property name.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SchemaError {
    /// The backend does not know the named property.
    #[error("invalid property '{property}' for {namespace}.{table}")]
    InvalidProperty {
        property: String,
        namespace: String,
        table: String,
        message: String,
    },
}

impl SchemaError {
    /// Returns the offending property name.
    pub fn property(&self) -> &str {
        match self {
            SchemaError::InvalidProperty { property, .. } => property,
        }
    }
}

/// A native execution failure with the operation context attached.
#[derive(Error, Debug)]
#[error(
    "{operation} on {namespace}.{table} failed after {elapsed_ms}ms ({cause}): {message}"
)]
pub struct ExecutionError {
    pub operation: &'static str,
    pub namespace: String,
    pub table: String,
    pub elapsed_ms: u64,
    pub cause: FailureCause,
    pub message: String,
    #[source]
    pub source: Option<DriverError>,
}

impl ExecutionError {
    /// Returns true if the failure is transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self.cause, FailureCause::Timeout | FailureCause::Unavailable)
    }
}

/// Why a native call failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureCause {
    /// The call or the wait on it exceeded its time bound.
    Timeout,
    /// No host could serve the request.
    Unavailable,
    /// The backend refused the request.
    Rejected,
    /// Anything else reported by the driver.
    Other,
}

impl fmt::Display for FailureCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureCause::Timeout => write!(f, "timeout"),
            FailureCause::Unavailable => write!(f, "unavailable"),
            FailureCause::Rejected => write!(f, "rejected"),
            FailureCause::Other => write!(f, "other"),
        }
    }
}

/// Errors establishing or talking to a backend outside of a single operation.
#[derive(Error, Debug)]
pub enum BackendError {
    /// The backend is currently unavailable.
    #[error("backend unavailable: {backend_name}: {message}")]
    Unavailable {
        backend_name: String,
        message: String,
    },

    /// A handle for the namespace could not be established.
    #[error("connection failed to {backend_name} for '{namespace}': {message}")]
    ConnectionFailed {
        backend_name: String,
        namespace: String,
        message: String,
    },

    /// Internal backend error.
    #[error("internal error in {backend_name}: {message}")]
    Internal {
        backend_name: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization error.
    #[error("serialization error: {message}")]
    SerializationError { message: String },
}

/// A failure reported by a native driver, before classification.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{message}")]
pub struct DriverError {
    pub cause: FailureCause,
    pub message: String,
}

impl DriverError {
    /// Creates a driver error.
    pub fn new(cause: FailureCause, message: impl Into<String>) -> Self {
        Self {
            cause,
            message: message.into(),
        }
    }

    /// A request the backend refused.
    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(FailureCause::Rejected, message)
    }

    /// A backend that could not be reached.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(FailureCause::Unavailable, message)
    }
}

/// Identifies the call an error or audit record belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    /// Name of the public operation.
    pub operation: &'static str,
    /// Keyspace or index.
    pub namespace: String,
    /// Table, or the index again for search calls.
    pub table: String,
}

impl OperationContext {
    /// Creates a context.
    pub fn new(
        operation: &'static str,
        namespace: impl Into<String>,
        table: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            namespace: namespace.into(),
            table: table.into(),
        }
    }
}

static UNKNOWN_PROPERTY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?:Undefined column name|Unknown identifier)\s+"?([A-Za-z0-9_.]+)"?"#)
        .expect("static regex")
});

/// Extracts the offending name from a native "unknown column" message.
///
/// Drivers expose no structured code for this case, so the message text is
/// the only signal.
pub fn unknown_property(message: &str) -> Option<String> {
    UNKNOWN_PROPERTY
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim_end_matches('.').to_string())
}

/// Turns a native failure into a typed error carrying the call context.
pub fn classify(context: &OperationContext, elapsed: Duration, err: DriverError) -> DataAccessError {
    if let Some(property) = unknown_property(&err.message) {
        return SchemaError::InvalidProperty {
            property,
            namespace: context.namespace.clone(),
            table: context.table.clone(),
            message: err.message,
        }
        .into();
    }

    ExecutionError {
        operation: context.operation,
        namespace: context.namespace.clone(),
        table: context.table.clone(),
        elapsed_ms: elapsed.as_millis() as u64,
        cause: err.cause,
        message: err.message.clone(),
        source: Some(err),
    }
    .into()
}

/// Builds the error returned when a wait on a native call runs out.
pub fn timed_out(context: &OperationContext, waited: Duration) -> DataAccessError {
    ExecutionError {
        operation: context.operation,
        namespace: context.namespace.clone(),
        table: context.table.clone(),
        elapsed_ms: waited.as_millis() as u64,
        cause: FailureCause::Timeout,
        message: format!("no response within {}", humantime::format_duration(waited)),
        source: None,
    }
    .into()
}

/// Result type alias for data-access operations.
pub type DataAccessResult<T> = Result<T, DataAccessError>;

impl From<serde_json::Error> for DataAccessError {
    fn from(err: serde_json::Error) -> Self {
        DataAccessError::Backend(BackendError::SerializationError {
            message: err.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> OperationContext {
        OperationContext::new("get_record_by_id", "app", "users")
    }

    #[test]
    fn test_unknown_property_extraction() {
        assert_eq!(
            unknown_property("Undefined column name foo").as_deref(),
            Some("foo")
        );
        assert_eq!(
            unknown_property("Undefined column name email in table app.users").as_deref(),
            Some("email")
        );
        assert_eq!(
            unknown_property("line 1:7 Unknown identifier bar").as_deref(),
            Some("bar")
        );
        assert_eq!(unknown_property("Cannot achieve consistency level ONE"), None);
    }

    #[test]
    fn test_classify_schema_mismatch() {
        let err = classify(
            &ctx(),
            Duration::from_millis(3),
            DriverError::rejected("Undefined column name nickname"),
        );
        assert_eq!(err.kind(), ErrorKind::Schema);
        assert!(err.is_client_error());
        match err {
            DataAccessError::Schema(schema) => assert_eq!(schema.property(), "nickname"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_classify_execution_failure() {
        let err = classify(
            &ctx(),
            Duration::from_millis(12),
            DriverError::unavailable("Cannot achieve consistency level QUORUM"),
        );
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert!(!err.is_client_error());
        assert!(err.is_retryable());

        let message = err.to_string();
        assert!(message.contains("get_record_by_id"));
        assert!(message.contains("app.users"));
        assert!(message.contains("12ms"));
    }

    #[test]
    fn test_rejected_is_not_retryable() {
        let err = classify(&ctx(), Duration::ZERO, DriverError::rejected("syntax error"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_timed_out() {
        let err = timed_out(&ctx(), Duration::from_secs(5));
        assert_eq!(err.kind(), ErrorKind::Execution);
        assert!(err.is_retryable());
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn test_validation_is_client_error() {
        let err: DataAccessError = ValidationError::EmptyFilter.into();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.is_client_error());
        assert!(!err.is_retryable());
    }
}
