//! Footprint statistics endpoint: /stats

use crate::error::Result;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use bytes::Bytes;
use cellmap_query::{PropertyStats, StatsRequest};
use std::sync::Arc;
use tracing::Instrument;

/// POST /stats
///
/// Body: `{"cells": [...]} | {"feature": {...}}` plus
/// `"properties": [{"type": "number", "column": "depth"}]`.
pub async fn stats(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<Vec<PropertyStats>>> {
    let request: StatsRequest = serde_json::from_slice(&body)?;
    let span = tracing::debug_span!(
        "stats",
        properties = request.properties.len(),
        cells = request.cells.as_ref().map(Vec::len),
        feature = request.feature.is_some(),
    );
    let results = state.stats.run(&request).instrument(span).await?;
    Ok(Json(results))
}
