//! Per-tile cell aggregation.
//!
//! A tile request is answered in one statement: the coverage index narrows the
//! fact table to cells whose cover tiles share the requested quadkey, and the
//! fact rows of those cells are counted per cell. Candidate pruning only has
//! false positives; the encoder drops cells that miss the tile.

use crate::error::{QueryError, Result};
use crate::filter::{FilterColumns, FilterSpec};
use cellmap_db::schema::{CELLS_TABLE, GEOHASH_TABLE};
use cellmap_db::{ancestor_column, SharedDatabase, SqlValue};
use cellmap_spatial::{cell_from_u64, CellCount, IndexCatalog, Stop, StopTable, TileId};
use std::str::FromStr;
use std::sync::Arc;

/// Output format of a tile response.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TileFormat {
    #[default]
    Pbf,
    GeoJson,
}

impl FromStr for TileFormat {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pbf" | "mvt" => Ok(TileFormat::Pbf),
            "geojson" | "json" => Ok(TileFormat::GeoJson),
            other => Err(QueryError::validation(format!(
                "unknown tile format '{other}' (expected pbf or geojson)"
            ))),
        }
    }
}

/// A decoded tile request.
#[derive(Debug, Clone)]
pub struct TileRequest {
    pub tile: TileId,
    pub format: TileFormat,
    pub filter: FilterSpec,
    /// Count all rows alongside matching rows and keep cells without matches.
    pub fraction: bool,
}

impl TileRequest {
    pub fn new(tile: TileId) -> Self {
        Self {
            tile,
            format: TileFormat::Pbf,
            filter: FilterSpec::default(),
            fraction: false,
        }
    }

    pub fn with_filter(mut self, filter: FilterSpec) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_fraction(mut self, fraction: bool) -> Self {
        self.fraction = fraction;
        self
    }

    pub fn with_format(mut self, format: TileFormat) -> Self {
        self.format = format;
        self
    }
}

/// Aggregated rows of one tile.
#[derive(Debug, Clone, PartialEq)]
pub struct TileRows {
    pub resolution: u8,
    pub rows: Vec<CellCount>,
}

/// Answers tile requests against the fact table and coverage index.
#[derive(Debug, Clone)]
pub struct TileQueryEngine {
    db: SharedDatabase,
    stops: Arc<StopTable>,
    catalog: Arc<IndexCatalog>,
    columns: Arc<FilterColumns>,
}

impl TileQueryEngine {
    pub fn new(
        db: SharedDatabase,
        stops: Arc<StopTable>,
        catalog: Arc<IndexCatalog>,
        columns: Arc<FilterColumns>,
    ) -> Self {
        Self {
            db,
            stops,
            catalog,
            columns,
        }
    }

    pub fn stops(&self) -> &StopTable {
        &self.stops
    }

    pub async fn query(&self, request: &TileRequest) -> Result<TileRows> {
        let stop = self.stops.stop_for_zoom(request.tile.z)?;
        self.catalog.ensure_servable(stop)?;
        request.filter.check_columns(&self.columns)?;

        let (sql, params) = tile_statement(stop, request);
        let rows = self.db.query(&sql, &params).await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in &rows {
            out.push(CellCount {
                cell: cell_from_u64(row.get_u64(0)?)?,
                count: row.get_u64(1)?,
                total: if request.fraction {
                    Some(row.get_u64(2)?)
                } else {
                    None
                },
            });
        }
        tracing::debug!(
            tile = %request.tile,
            resolution = stop.resolution,
            cells = out.len(),
            fraction = request.fraction,
            "tile aggregated"
        );
        Ok(TileRows {
            resolution: stop.resolution,
            rows: out,
        })
    }
}

/// Candidate pattern for `cover_tile LIKE $3`.
///
/// Tiles at or above the index precision match every cover tile below them;
/// deeper tiles match the single cover tile that is their ancestor.
pub fn cover_pattern(tile: &TileId, precision: u8) -> String {
    let mut key = tile.quadkey();
    if tile.z <= precision {
        key.push('%');
    } else {
        key.truncate(usize::from(precision));
    }
    key
}

fn tile_statement(stop: &Stop, request: &TileRequest) -> (String, Vec<SqlValue>) {
    let compiled = request.filter.compile(4);
    let col = ancestor_column(stop.resolution);
    let aggregate = if request.fraction {
        format!(
            "count(*) FILTER (WHERE {}) AS count, count(*) AS total",
            compiled.predicate
        )
    } else {
        "count(*) AS count".to_string()
    };
    let restriction = if request.fraction {
        String::new()
    } else {
        format!(" AND ({})", compiled.predicate)
    };
    let sql = format!(
        "WITH tile_members AS (\
             SELECT DISTINCT cell_id FROM {GEOHASH_TABLE} \
             WHERE resolution = $1 AND precision = $2 AND cover_tile LIKE $3\
         ) \
         SELECT {col} AS id, {aggregate} FROM {CELLS_TABLE} \
         WHERE {col} IN (SELECT cell_id FROM tile_members){restriction} \
         GROUP BY {col} ORDER BY {col}"
    );

    let mut params = Vec::with_capacity(3 + compiled.params.len());
    params.push(SqlValue::from(stop.resolution));
    params.push(SqlValue::from(stop.index_precision));
    params.push(SqlValue::Text(cover_pattern(&request.tile, stop.index_precision)));
    params.extend(compiled.params);
    (sql, params)
}
