use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by table sources (database side)
#[derive(Debug, Error)]
pub enum TableError {
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Table not found: {0}")]
    NotFound(String),

    #[error("Column '{column}' does not exist in table '{table}'")]
    UnknownColumn {
        table: String,
        column: String,
    },

    #[error("Failed to decode column '{column}': {reason}")]
    Decode {
        column: String,
        reason: String,
    },
}

/// Archive (serializer) errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Failed to write archive {}: {reason}", .path.display())]
    WriteFailure {
        path: PathBuf,
        reason: String,
    },

    #[error("Failed to read archive {}: {reason}", .path.display())]
    ReadFailure {
        path: PathBuf,
        reason: String,
    },

    #[error("Table '{table}' not found in archive {}", .path.display())]
    NotFound {
        table: String,
        path: PathBuf,
    },

    #[error("Invalid table identifier: '{0}'")]
    InvalidIdentifier(String),

    #[error("Row {row} has columns [{}], expected [{}]", .found.join(", "), .expected.join(", "))]
    InconsistentColumns {
        row: usize,
        expected: Vec<String>,
        found: Vec<String>,
    },

    #[error("Cannot save zero rows without an explicit column list")]
    MissingColumns,

    #[error("Duplicate column: '{0}'")]
    DuplicateColumn(String),

    #[error("Table '{0}' is registered more than once")]
    DuplicateTable(String),

    #[error("Table source error: {0}")]
    Source(#[from] TableError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArchiveError {
    pub fn write_failure(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::WriteFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn read_failure(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::ReadFailure {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn not_found(table: &str, path: impl Into<PathBuf>) -> Self {
        Self::NotFound {
            table: table.to_string(),
            path: path.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
