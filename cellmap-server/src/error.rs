//! Server error types with HTTP status code mapping

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cellmap_query::QueryError;
use cellmap_spatial::SpatialError;
use serde::Serialize;
use thiserror::Error;

/// Compact error type codes carried in the `@type` field of error bodies.
pub mod errors {
    pub const BAD_REQUEST: &str = "err:cellmap/BadRequest";
    pub const INVALID_FILTER: &str = "err:cellmap/InvalidFilter";
    pub const INVALID_TILE: &str = "err:cellmap/InvalidTile";
    pub const JSON_PARSE: &str = "err:cellmap/JsonParse";
    pub const NOT_FOUND: &str = "err:cellmap/NotFound";
    pub const CONFIG: &str = "err:cellmap/Config";
    pub const INDEX_MISSING: &str = "err:cellmap/IndexMissing";
    pub const INDEX_INCOMPLETE: &str = "err:cellmap/IndexIncomplete";
    pub const DATABASE: &str = "err:cellmap/Database";
    pub const INTERNAL: &str = "err:cellmap/Internal";
}

/// Server error type wrapping query errors with an HTTP status mapping
#[derive(Error, Debug)]
pub enum ServerError {
    /// Query layer error
    #[error("{0}")]
    Query(#[from] QueryError),

    /// Request body is not valid JSON
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Tile address is not three integers inside the tile grid
    #[error("Invalid tile: {0}")]
    InvalidTile(String),

    /// Startup configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected server-side failure
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServerError {
    /// Map error to error type code
    pub fn error_type(&self) -> &'static str {
        match self {
            ServerError::Query(QueryError::InvalidFilter(_)) => errors::INVALID_FILTER,
            ServerError::Query(QueryError::Validation(_)) => errors::BAD_REQUEST,
            ServerError::Query(QueryError::NotFound(_)) => errors::NOT_FOUND,
            ServerError::Query(QueryError::Config(_)) => errors::CONFIG,
            ServerError::Query(QueryError::IndexMissing { .. }) => errors::INDEX_MISSING,
            ServerError::Query(QueryError::IndexIncomplete { .. }) => errors::INDEX_INCOMPLETE,
            ServerError::Query(QueryError::Database(_)) => errors::DATABASE,
            ServerError::Json(_) => errors::JSON_PARSE,
            ServerError::InvalidTile(_) => errors::INVALID_TILE,
            ServerError::Config(_) => errors::CONFIG,
            ServerError::Internal(_) => errors::INTERNAL,
        }
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 - Bad Request (client errors)
            ServerError::Query(QueryError::InvalidFilter(_)) => StatusCode::BAD_REQUEST,
            ServerError::Query(QueryError::Validation(_)) => StatusCode::BAD_REQUEST,
            ServerError::Json(_) => StatusCode::BAD_REQUEST,
            ServerError::InvalidTile(_) => StatusCode::BAD_REQUEST,

            // 404 - Not Found
            ServerError::Query(QueryError::NotFound(_)) => StatusCode::NOT_FOUND,

            // 503 - the coverage index cannot serve this resolution
            ServerError::Query(QueryError::IndexMissing { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Query(QueryError::IndexIncomplete { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }

            // 500 - Internal Server Error
            ServerError::Query(QueryError::Config(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Query(QueryError::Database(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Create an invalid tile error
    pub fn invalid_tile(msg: impl Into<String>) -> Self {
        ServerError::InvalidTile(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        ServerError::Config(msg.into())
    }

    /// Create an internal error
    pub fn internal(msg: impl Into<String>) -> Self {
        ServerError::Internal(msg.into())
    }
}

impl From<SpatialError> for ServerError {
    fn from(e: SpatialError) -> Self {
        match e {
            SpatialError::InvalidTile(msg) => ServerError::InvalidTile(msg),
            other => ServerError::Query(QueryError::from(other)),
        }
    }
}

impl From<cellmap_db::DbError> for ServerError {
    fn from(e: cellmap_db::DbError) -> Self {
        ServerError::Query(QueryError::Database(e))
    }
}

/// JSON error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
    /// HTTP status code
    pub status: u16,
    /// Error type (e.g. "err:cellmap/InvalidFilter")
    #[serde(rename = "@type")]
    pub error_type: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error_type = self.error_type();

        if status.is_server_error() {
            tracing::error!(error = %self, error_type, status = status.as_u16(), "request failed");
        } else {
            tracing::debug!(error = %self, error_type, status = status.as_u16(), "request rejected");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            status: status.as_u16(),
            error_type: error_type.to_string(),
        };

        let json = serde_json::to_string(&body).unwrap_or_else(|_| {
            format!(
                r#"{{"error":"{}","status":{},"@type":"{}"}}"#,
                self,
                status.as_u16(),
                error_type
            )
        });

        (status, [("content-type", "application/json")], json).into_response()
    }
}

/// Result type for server operations
pub type Result<T> = std::result::Result<T, ServerError>;
