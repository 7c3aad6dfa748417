//! Backend identification.

use std::fmt;

/// Identifies the type of backend behind a session or client.
///
/// Used in logs and error context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    /// Apache Cassandra (wide-column store).
    Cassandra,
    /// Elasticsearch (search engine).
    Elasticsearch,
    /// In-process store used by tests and local development.
    Memory,
}

impl BackendKind {
    /// Returns the backend name used in error messages.
    pub fn name(self) -> &'static str {
        match self {
            BackendKind::Cassandra => "cassandra",
            BackendKind::Elasticsearch => "elasticsearch",
            BackendKind::Memory => "memory",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_kind_display() {
        assert_eq!(BackendKind::Cassandra.to_string(), "cassandra");
        assert_eq!(BackendKind::Elasticsearch.to_string(), "elasticsearch");
        assert_eq!(BackendKind::Memory.to_string(), "memory");
    }
}
