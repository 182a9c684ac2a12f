//! Vector tile endpoint: /{version}/mvt/{z}/{x}/{y}

use crate::error::{Result, ServerError};
use crate::state::AppState;
use axum::extract::{Path, Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use cellmap_query::{FilterSpec, TileFormat, TileRequest};
use cellmap_spatial::{cells_to_features, empty_tile, to_feature_collection, TileId};
use http::header::{CACHE_CONTROL, CONTENT_TYPE};
use http::HeaderValue;
use serde::Deserialize;
use std::sync::Arc;

/// Content type of protobuf vector tiles
pub const MVT_CONTENT_TYPE: &str = "application/x-protobuf";

#[derive(Debug, Deserialize)]
pub struct TileParams {
    /// `pbf` (default) or `geojson`
    pub format: Option<String>,
    /// URL-encoded JSON filter
    pub filter: Option<String>,
    /// Report matching and total counts per cell
    #[serde(default)]
    pub fraction: bool,
}

/// GET /{version}/mvt/{z}/{x}/{y}
///
/// Resolution lookup, candidate pruning and aggregation run in the query
/// engine; encoding runs on the blocking pool. Empty tiles return the
/// precomputed empty buffer.
pub async fn tile(
    State(state): State<Arc<AppState>>,
    Path((version, z, x, y)): Path<(String, String, String, String)>,
    Query(params): Query<TileParams>,
) -> Result<Response> {
    let tile = parse_tile(&z, &x, &y)?;
    let format = match params.format.as_deref() {
        None | Some("") => TileFormat::default(),
        Some(raw) => raw.parse::<TileFormat>()?,
    };
    let filter = FilterSpec::parse(params.filter.as_deref())?;
    tracing::debug!(
        version = %version,
        tile = %tile,
        ?format,
        filters = filter.len(),
        fraction = params.fraction,
        "tile requested"
    );

    let request = TileRequest::new(tile)
        .with_format(format)
        .with_filter(filter)
        .with_fraction(params.fraction);
    let rows = state.tiles.query(&request).await?;

    if format == TileFormat::GeoJson {
        let features = cells_to_features(rows.resolution, &rows.rows);
        return Ok((
            [(CACHE_CONTROL, state.geojson_cache_control.clone())],
            Json(to_feature_collection(&features)),
        )
            .into_response());
    }

    let bytes = if rows.rows.is_empty() {
        empty_tile()
    } else {
        let encoder = state.encoder.clone();
        tokio::task::spawn_blocking(move || {
            let features = cells_to_features(rows.resolution, &rows.rows);
            encoder.encode(tile, &features)
        })
        .await
        .map_err(|e| ServerError::internal(format!("tile encoding task failed: {e}")))?
    };

    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static(MVT_CONTENT_TYPE)),
            (CACHE_CONTROL, state.tile_cache_control.clone()),
        ],
        bytes,
    )
        .into_response())
}

/// Parse path segments into a tile address. Rejected before any query runs.
fn parse_tile(z: &str, x: &str, y: &str) -> Result<TileId> {
    let z: u8 = z
        .parse()
        .map_err(|_| ServerError::invalid_tile(format!("z must be an integer, got '{z}'")))?;
    let x: u32 = x
        .parse()
        .map_err(|_| ServerError::invalid_tile(format!("x must be an integer, got '{x}'")))?;
    let y: u32 = y
        .parse()
        .map_err(|_| ServerError::invalid_tile(format!("y must be an integer, got '{y}'")))?;
    Ok(TileId::new(z, x, y)?)
}
