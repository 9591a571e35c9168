//! Error types for Tarn local store and query operations.

use crate::types::DataType;
use crate::value::Value;
use alloc::string::String;
use core::fmt;

/// Result type alias for Tarn operations.
pub type Result<T> = core::result::Result<T, Error>;

/// Error types for local store and query operations.
///
/// None of these are fatal: a failed operation leaves the store untouched and
/// the error is reported to the caller.
#[derive(Clone, Debug, PartialEq)]
pub enum Error {
    /// Insert of a primary key that already exists.
    Conflict {
        table: String,
        key: Value,
    },
    /// Update or delete of a primary key that does not exist.
    NotFound {
        table: String,
        key: Value,
    },
    /// Unknown or missing query parameter.
    Binding {
        parameter: String,
        message: String,
    },
    /// Malformed statement text.
    Parse {
        message: String,
        position: usize,
    },
    /// Type mismatch error.
    TypeMismatch {
        column: String,
        expected: DataType,
        got: DataType,
    },
    /// Null constraint violation.
    NullConstraint {
        column: String,
    },
    /// Column not found.
    ColumnNotFound {
        table: String,
        column: String,
    },
    /// Table not found.
    TableNotFound {
        name: String,
    },
    /// Invalid schema definition.
    InvalidSchema {
        message: String,
    },
    /// Invalid operation.
    InvalidOperation {
        message: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Conflict { table, key } => {
                write!(f, "Duplicate primary key in table {}: {}", table, key)
            }
            Error::NotFound { table, key } => {
                write!(f, "Not found in table {}: {}", table, key)
            }
            Error::Binding { parameter, message } => {
                write!(f, "Binding error for @{}: {}", parameter, message)
            }
            Error::Parse { message, position } => {
                write!(f, "Parse error at {}: {}", position, message)
            }
            Error::TypeMismatch {
                column,
                expected,
                got,
            } => {
                write!(
                    f,
                    "Type mismatch on column {}: expected {:?}, got {:?}",
                    column, expected, got
                )
            }
            Error::NullConstraint { column } => {
                write!(f, "Null constraint violation on column: {}", column)
            }
            Error::ColumnNotFound { table, column } => {
                write!(f, "Column {} not found in table {}", column, table)
            }
            Error::TableNotFound { name } => {
                write!(f, "Table not found: {}", name)
            }
            Error::InvalidSchema { message } => {
                write!(f, "Invalid schema: {}", message)
            }
            Error::InvalidOperation { message } => {
                write!(f, "Invalid operation: {}", message)
            }
        }
    }
}

impl core::error::Error for Error {}

impl Error {
    /// Creates a duplicate key error.
    pub fn conflict(table: impl Into<String>, key: Value) -> Self {
        Error::Conflict {
            table: table.into(),
            key,
        }
    }

    /// Creates a not found error.
    pub fn not_found(table: impl Into<String>, key: Value) -> Self {
        Error::NotFound {
            table: table.into(),
            key,
        }
    }

    /// Creates a binding error.
    pub fn binding(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Binding {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Creates a parse error.
    pub fn parse(message: impl Into<String>, position: usize) -> Self {
        Error::Parse {
            message: message.into(),
            position,
        }
    }

    /// Creates a type mismatch error.
    pub fn type_mismatch(column: impl Into<String>, expected: DataType, got: DataType) -> Self {
        Error::TypeMismatch {
            column: column.into(),
            expected,
            got,
        }
    }

    /// Creates a null constraint error.
    pub fn null_constraint(column: impl Into<String>) -> Self {
        Error::NullConstraint {
            column: column.into(),
        }
    }

    /// Creates a column not found error.
    pub fn column_not_found(table: impl Into<String>, column: impl Into<String>) -> Self {
        Error::ColumnNotFound {
            table: table.into(),
            column: column.into(),
        }
    }

    /// Creates a table not found error.
    pub fn table_not_found(name: impl Into<String>) -> Self {
        Error::TableNotFound { name: name.into() }
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
}
