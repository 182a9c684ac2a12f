//! Query error types.

use cellmap_db::DbError;
use cellmap_spatial::SpatialError;
use thiserror::Error;

/// Query errors.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Deployment misconfiguration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The coverage index has no rows for a served resolution.
    #[error("Coverage index has no rows for resolution {resolution} at precision {precision}; run rebuild-index")]
    IndexMissing { resolution: u8, precision: u8 },

    /// The last rebuild of a served resolution failed.
    #[error("Coverage index for resolution {resolution} is incomplete: {reason}")]
    IndexIncomplete { resolution: u8, reason: String },

    /// Filter is malformed or names a column that cannot be filtered.
    #[error("{0}")]
    InvalidFilter(String),

    /// Malformed or disallowed request input.
    #[error("{0}")]
    Validation(String),

    /// Referenced attribute does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Database error.
    #[error(transparent)]
    Database(#[from] DbError),
}

impl QueryError {
    pub fn validation(msg: impl Into<String>) -> Self {
        QueryError::Validation(msg.into())
    }

    pub fn invalid_filter(msg: impl Into<String>) -> Self {
        QueryError::InvalidFilter(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        QueryError::NotFound(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        QueryError::Config(msg.into())
    }
}

impl From<SpatialError> for QueryError {
    fn from(err: SpatialError) -> Self {
        match err {
            SpatialError::Config(msg) => QueryError::Config(msg),
            SpatialError::IndexMissing {
                resolution,
                precision,
            } => QueryError::IndexMissing {
                resolution,
                precision,
            },
            SpatialError::IndexIncomplete { resolution, reason } => {
                QueryError::IndexIncomplete { resolution, reason }
            }
            SpatialError::InvalidTile(msg) | SpatialError::InvalidCell(msg) => {
                QueryError::Validation(msg)
            }
            SpatialError::Database(e) => QueryError::Database(e),
        }
    }
}

/// Result type for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;
