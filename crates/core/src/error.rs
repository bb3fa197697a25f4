//! Error types for kvorm.

use alloc::string::String;
use core::fmt;

/// Result type alias for kvorm operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types shared by the compiler, the tuple engine, the session manager
/// and the query façade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Malformed or unsupported query text.
    Parse { message: String, position: usize },
    /// Lock acquisition or version check failed during commit.
    Conflict { message: String },
    /// The storage or lock service could not be reached.
    BackendUnavailable { message: String },
    /// A table or column is absent from the schema registry.
    /// `column` is empty when the table itself is unknown.
    SchemaMismatch { table: String, column: String },
    /// Invalid schema definition.
    InvalidSchema { message: String },
    /// Invalid operation.
    InvalidOperation { message: String },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Parse { message, position } => {
                write!(f, "Parse error at position {}: {}", position, message)
            }
            Error::Conflict { message } => write!(f, "Conflict: {}", message),
            Error::BackendUnavailable { message } => {
                write!(f, "Backend unavailable: {}", message)
            }
            Error::SchemaMismatch { table, column } => {
                if column.is_empty() {
                    write!(f, "Table {} not found in schema registry", table)
                } else {
                    write!(f, "Column {} not found in table {}", column, table)
                }
            }
            Error::InvalidSchema { message } => write!(f, "Invalid schema: {}", message),
            Error::InvalidOperation { message } => {
                write!(f, "Invalid operation: {}", message)
            }
        }
    }
}

impl Error {
    /// Creates a parse error.
    pub fn parse(message: impl Into<String>, position: usize) -> Self {
        Error::Parse {
            message: message.into(),
            position,
        }
    }

    /// Creates a conflict error.
    pub fn conflict(message: impl Into<String>) -> Self {
        Error::Conflict {
            message: message.into(),
        }
    }

    /// Creates a backend unavailable error.
    pub fn backend_unavailable(message: impl Into<String>) -> Self {
        Error::BackendUnavailable {
            message: message.into(),
        }
    }

    /// Creates a schema mismatch error for an unknown table.
    pub fn unknown_table(table: impl Into<String>) -> Self {
        Error::SchemaMismatch {
            table: table.into(),
            column: String::new(),
        }
    }

    /// Creates a schema mismatch error for an unknown column.
    pub fn unknown_column(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::SchemaMismatch {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates an invalid schema error.
    pub fn invalid_schema(message: impl Into<String>) -> Self {
        Error::InvalidSchema {
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Error::InvalidOperation {
            message: message.into(),
        }
    }

    /// Whether a caller may re-run the whole unit of work after this error.
    #[inline]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Conflict { .. })
    }
}
