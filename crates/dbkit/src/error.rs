//! Error types for dbkit

use thiserror::Error;

/// Result type alias for dbkit operations
pub type DbResult<T> = Result<T, DbError>;

/// Error types for database operations
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DbError {
    /// Neither the primary configuration nor any failover produced a live link
    #[error("Connection error: {0}")]
    Connection(String),

    /// The backend rejected a compiled statement
    #[error("Statement error [{code}]: {message}")]
    Statement {
        code: String,
        message: String,
        sql: String,
    },

    /// Bracket groups were left open (or closed too often) when compiling
    #[error("Unbalanced bracket group: depth {depth} at compile time")]
    UnbalancedBracket { depth: isize },

    /// A batch update row does not carry the index column
    #[error("Batch row {row} is missing index column '{index}'")]
    MissingBatchIndex { index: String, row: usize },

    /// Structural misuse of the builder or connection
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// A transaction block could not start, or was rolled back
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// No driver is registered under the requested tag
    #[error("Unknown backend: {0}")]
    UnknownBackend(String),

    /// Configuration could not be parsed or is inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Row decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// The platform has no equivalent for the requested operation
    #[error("Unsupported by platform: {0}")]
    Unsupported(String),
}

impl DbError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create an invalid query error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a statement error from backend-native code and message
    pub fn statement(
        code: impl Into<String>,
        message: impl Into<String>,
        sql: impl Into<String>,
    ) -> Self {
        Self::Statement {
            code: code.into(),
            message: message.into(),
            sql: sql.into(),
        }
    }

    /// Create a transaction error
    pub fn transaction(message: impl Into<String>) -> Self {
        Self::Transaction(message.into())
    }

    /// Check if this is a connection failure
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// Check if this is a backend statement error
    pub fn is_statement(&self) -> bool {
        matches!(self, Self::Statement { .. })
    }

    /// Backend-native error code, when the backend produced one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Statement { code, .. } => Some(code),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statement_error_carries_native_code() {
        let err = DbError::statement("1064", "syntax error", "SELEC 1");
        assert!(err.is_statement());
        assert_eq!(err.code(), Some("1064"));
        assert_eq!(err.to_string(), "Statement error [1064]: syntax error");
    }

    #[test]
    fn non_statement_errors_have_no_code() {
        assert_eq!(DbError::invalid("x").code(), None);
        assert!(DbError::Connection("down".into()).is_connection());
    }
}
