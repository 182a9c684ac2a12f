//! Admin endpoints: /health

use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use cellmap_spatial::IndexStatus;
use serde::Serialize;
use std::sync::Arc;

/// Serving status of one stop
#[derive(Serialize)]
pub struct StopHealth {
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub resolution: u8,
    pub precision: u8,
    /// False when tiles of this zoom range will be refused
    pub servable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index: Option<IndexStatus>,
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    /// `ok` when every stop can be served, `degraded` otherwise
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub index: Vec<StopHealth>,
}

/// Health check endpoint
///
/// GET /health
///
/// Reports per-stop coverage index status so a partial rebuild is visible to
/// operators.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    tracing::debug!("health check requested");

    let index: Vec<StopHealth> = state
        .stops
        .iter()
        .map(|stop| {
            let servable = state.catalog.ensure_servable(stop);
            StopHealth {
                min_zoom: stop.min_zoom,
                max_zoom: stop.max_zoom,
                resolution: stop.resolution,
                precision: stop.index_precision,
                servable: servable.is_ok(),
                error: servable.err().map(|e| e.to_string()),
                index: state
                    .catalog
                    .status(stop.resolution, stop.index_precision)
                    .cloned(),
            }
        })
        .collect();

    let status = if index.iter().all(|s| s.servable) {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.uptime_secs(),
        index,
    })
}
