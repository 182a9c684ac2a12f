//! Snapshot of what the coverage index holds.
//!
//! Loaded once when the server starts. Lets the query engine tell a missing or
//! half-built index apart from a tile that simply has no cells.

use crate::error::{Result, SpatialError};
use crate::stops::{Stop, StopTable};
use cellmap_db::schema::{table_exists, BUILD_TABLE, GEOHASH_TABLE};
use cellmap_db::Database;
use serde::Serialize;
use std::collections::BTreeMap;

/// Build status of one resolution, as recorded by the last rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "error")]
pub enum BuildState {
    Complete,
    Failed(Option<String>),
    /// No status row; the index predates build tracking.
    Unrecorded,
}

/// Catalog entry for one `(resolution, precision)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexStatus {
    pub resolution: u8,
    pub precision: u8,
    /// Index rows present.
    pub entries: u64,
    /// Distinct cells present.
    pub cells: u64,
    pub build: BuildState,
}

/// Which resolutions the coverage index can serve.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexCatalog {
    entries: BTreeMap<(u8, u8), IndexStatus>,
}

impl IndexCatalog {
    /// Read row counts from `geohashes` and statuses from `geohash_builds`.
    /// A missing `geohashes` table yields an empty catalog.
    pub async fn load(db: &dyn Database) -> Result<Self> {
        let mut entries = BTreeMap::new();
        if !table_exists(db, GEOHASH_TABLE).await? {
            tracing::warn!("coverage index table is missing; run rebuild-index");
            return Ok(Self { entries });
        }

        let rows = db
            .query(
                &format!(
                    "SELECT resolution, precision, count(*), count(DISTINCT cell_id) \
                     FROM {GEOHASH_TABLE} GROUP BY resolution, precision"
                ),
                &[],
            )
            .await?;
        for row in &rows {
            let resolution = small(row.get_i64(0)?)?;
            let precision = small(row.get_i64(1)?)?;
            entries.insert(
                (resolution, precision),
                IndexStatus {
                    resolution,
                    precision,
                    entries: row.get_u64(2)?,
                    cells: row.get_u64(3)?,
                    build: BuildState::Unrecorded,
                },
            );
        }

        if table_exists(db, BUILD_TABLE).await? {
            let rows = db
                .query(
                    &format!(
                        "SELECT resolution, precision, status, cells, entries, error \
                         FROM {BUILD_TABLE} ORDER BY finished_at"
                    ),
                    &[],
                )
                .await?;
            for row in &rows {
                let resolution = small(row.get_i64(0)?)?;
                let precision = small(row.get_i64(1)?)?;
                let build = match row.get_str(2)? {
                    "complete" => BuildState::Complete,
                    _ => BuildState::Failed(row.get_opt_str(5)?.map(str::to_string)),
                };
                let status = entries
                    .entry((resolution, precision))
                    .or_insert_with(|| IndexStatus {
                        resolution,
                        precision,
                        entries: 0,
                        cells: 0,
                        build: BuildState::Unrecorded,
                    });
                status.build = build;
            }
        }

        tracing::debug!(resolutions = entries.len(), "loaded coverage index catalog");
        Ok(Self { entries })
    }

    /// Build a catalog directly; used by tests and tools.
    pub fn from_statuses(statuses: impl IntoIterator<Item = IndexStatus>) -> Self {
        Self {
            entries: statuses
                .into_iter()
                .map(|s| ((s.resolution, s.precision), s))
                .collect(),
        }
    }

    pub fn status(&self, resolution: u8, precision: u8) -> Option<&IndexStatus> {
        self.entries.get(&(resolution, precision))
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexStatus> {
        self.entries.values()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check that `stop` can be served.
    ///
    /// A failed build is refused even if some rows survived. Rows without a
    /// recorded status are served. An empty complete build is served too,
    /// since a resolution may legitimately have no cells.
    pub fn ensure_servable(&self, stop: &Stop) -> Result<()> {
        let missing = || SpatialError::IndexMissing {
            resolution: stop.resolution,
            precision: stop.index_precision,
        };
        let status = self
            .status(stop.resolution, stop.index_precision)
            .ok_or_else(missing)?;
        match &status.build {
            BuildState::Complete => Ok(()),
            BuildState::Unrecorded if status.entries > 0 => Ok(()),
            BuildState::Unrecorded => Err(missing()),
            BuildState::Failed(error) => Err(SpatialError::IndexIncomplete {
                resolution: stop.resolution,
                reason: error
                    .clone()
                    .unwrap_or_else(|| "last rebuild failed".to_string()),
            }),
        }
    }

    /// True when every stop of `stops` can be served.
    pub fn covers(&self, stops: &StopTable) -> bool {
        stops.iter().all(|s| self.ensure_servable(s).is_ok())
    }
}

fn small(v: i64) -> Result<u8> {
    u8::try_from(v).map_err(|_| SpatialError::config(format!("unexpected index value {v}")))
}
