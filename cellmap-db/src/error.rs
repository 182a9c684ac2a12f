//! Error types for cellmap-db

use thiserror::Error;

/// Result type alias using DbError
pub type Result<T> = std::result::Result<T, DbError>;

/// Database errors
#[derive(Error, Debug)]
pub enum DbError {
    /// Error raised by the DuckDB engine
    #[error("DuckDB error: {0}")]
    DuckDb(#[from] duckdb::Error),

    /// A query expected at least one row and got none
    #[error("No rows returned: {0}")]
    NoRows(String),

    /// A column held a value of an unexpected type
    #[error("Column {index}: expected {expected}, found {found}")]
    ColumnType {
        index: usize,
        expected: &'static str,
        found: String,
    },

    /// Column index past the end of the row
    #[error("Column {index} out of range (row has {width} columns)")]
    ColumnOutOfRange { index: usize, width: usize },

    /// The blocking task running the statement failed
    #[error("Database task failed: {0}")]
    Task(String),
}

impl DbError {
    /// Create a no-rows error
    pub fn no_rows(msg: impl Into<String>) -> Self {
        DbError::NoRows(msg.into())
    }

    /// Create a task error
    pub fn task(msg: impl Into<String>) -> Self {
        DbError::Task(msg.into())
    }
}
