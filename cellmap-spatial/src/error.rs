//! Error types for the spatial crate.

use cellmap_db::DbError;
use thiserror::Error;

/// Spatial errors.
#[derive(Error, Debug)]
pub enum SpatialError {
    /// Configuration error (stop table, missing paths, ...).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid H3 cell id.
    #[error("Invalid cell: {0}")]
    InvalidCell(String),

    /// Invalid tile address.
    #[error("Invalid tile: {0}")]
    InvalidTile(String),

    /// The coverage index holds no rows for a served resolution.
    #[error("Coverage index has no rows for resolution {resolution} at precision {precision}")]
    IndexMissing { resolution: u8, precision: u8 },

    /// The last rebuild of a served resolution did not complete.
    #[error("Coverage index for resolution {resolution} is incomplete: {reason}")]
    IndexIncomplete { resolution: u8, reason: String },

    /// Database error.
    #[error(transparent)]
    Database(#[from] DbError),
}

impl SpatialError {
    pub fn config(msg: impl Into<String>) -> Self {
        SpatialError::Config(msg.into())
    }

    pub fn invalid_tile(msg: impl Into<String>) -> Self {
        SpatialError::InvalidTile(msg.into())
    }

    /// True for errors that indicate a deployment misconfiguration.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SpatialError::Config(_)
                | SpatialError::IndexMissing { .. }
                | SpatialError::IndexIncomplete { .. }
        )
    }
}

/// Result type for spatial operations.
pub type Result<T> = std::result::Result<T, SpatialError>;
