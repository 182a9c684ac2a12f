//! Geohash coverage index builder.
//!
//! Rebuilds the `geohashes` table from the `cells` fact table. The builder:
//! 1. Drops and recreates `geohashes` and `geohash_builds`
//! 2. Visits stops from the finest resolution to the coarsest
//! 3. Pages through the distinct `r{res}_id` values of each stop
//! 4. Computes each cell's boundary and its single-level tile cover at the
//!    stop's index precision
//! 5. Inserts one `(resolution, cell_id, cover_tile, precision)` row per
//!    cover tile
//!
//! Each stop runs in its own transaction. A stop that fails is rolled back and
//! recorded as `failed` in `geohash_builds`; the remaining stops still run.
//!
//! # Usage
//!
//! ```ignore
//! let builder = GeohashIndexBuilder::new(db.clone(), StopTable::default());
//! let report = builder.rebuild(&mut NoopObserver).await?;
//! assert!(report.is_complete());
//! ```

use crate::cover::cover_tiles;
use crate::error::Result;
use crate::geometry::{cell_from_u64, cell_polygon};
use crate::stops::{Stop, StopTable};
use cellmap_db::schema::{BUILD_TABLE, CELLS_TABLE, GEOHASH_TABLE, RECREATE_INDEX_TABLES};
use cellmap_db::{ancestor_column, SharedDatabase, SqlValue};
use std::fmt::Write as _;
use std::time::Instant;

/// Default number of distinct cell ids fetched per page.
pub const DEFAULT_BATCH_SIZE: u64 = 100_000;

/// Default number of rows per INSERT statement.
pub const DEFAULT_INSERT_CHUNK: usize = 10_000;

/// Builder tuning.
#[derive(Debug, Clone)]
pub struct BuilderConfig {
    /// Distinct cell ids fetched per page.
    pub batch_size: u64,
    /// Index rows per INSERT statement.
    pub insert_chunk: usize,
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            insert_chunk: DEFAULT_INSERT_CHUNK,
        }
    }
}

impl BuilderConfig {
    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_insert_chunk(mut self, insert_chunk: usize) -> Self {
        self.insert_chunk = insert_chunk.max(1);
        self
    }
}

/// Result of one page fetch.
#[derive(Debug)]
pub enum BatchOutcome {
    /// A non-empty page of cell ids.
    Page(Vec<u64>),
    /// No ids remain for this stop.
    Done,
    /// The fetch or its processing failed; the stop is abandoned.
    Failed(String),
}

/// Final state of one stop pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopStatus {
    Complete,
    Failed(String),
}

impl StopStatus {
    /// Value stored in `geohash_builds.status`.
    pub fn as_str(&self) -> &'static str {
        match self {
            StopStatus::Complete => "complete",
            StopStatus::Failed(_) => "failed",
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            StopStatus::Complete => None,
            StopStatus::Failed(e) => Some(e),
        }
    }
}

/// Outcome of one stop pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StopOutcome {
    pub resolution: u8,
    pub precision: u8,
    /// Distinct cells processed (committed cells for complete stops).
    pub cells: u64,
    /// Index rows written.
    pub entries: u64,
    pub status: StopStatus,
}

impl StopOutcome {
    pub fn is_complete(&self) -> bool {
        self.status == StopStatus::Complete
    }
}

/// Outcome of a full rebuild.
#[derive(Debug, Clone, Default)]
pub struct RebuildReport {
    /// One outcome per stop, finest resolution first.
    pub stops: Vec<StopOutcome>,
    pub elapsed_ms: u64,
}

impl RebuildReport {
    /// True when every stop committed.
    pub fn is_complete(&self) -> bool {
        self.stops.iter().all(StopOutcome::is_complete)
    }

    pub fn failed(&self) -> impl Iterator<Item = &StopOutcome> {
        self.stops.iter().filter(|s| !s.is_complete())
    }

    pub fn total_entries(&self) -> u64 {
        self.stops.iter().map(|s| s.entries).sum()
    }
}

/// Progress callbacks for a rebuild.
pub trait BuildObserver: Send {
    /// A stop pass is starting; `total` distinct cells are expected.
    fn stop_started(&mut self, _stop: &Stop, _total: u64) {}

    /// `cells` more cells of `stop` were indexed.
    fn batch_processed(&mut self, _stop: &Stop, _cells: u64) {}

    fn stop_finished(&mut self, _outcome: &StopOutcome) {}
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl BuildObserver for NoopObserver {}

/// Rebuilds the coverage index for a stop table.
#[derive(Debug)]
pub struct GeohashIndexBuilder {
    db: SharedDatabase,
    stops: StopTable,
    config: BuilderConfig,
}

impl GeohashIndexBuilder {
    pub fn new(db: SharedDatabase, stops: StopTable) -> Self {
        Self {
            db,
            stops,
            config: BuilderConfig::default(),
        }
    }

    pub fn with_config(mut self, config: BuilderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn stops(&self) -> &StopTable {
        &self.stops
    }

    /// Drop, recreate and refill the coverage index.
    ///
    /// Returns `Err` only when the tables cannot be recreated or a status row
    /// cannot be written. Per-stop failures are reported in the
    /// [`RebuildReport`].
    pub async fn rebuild(&self, observer: &mut dyn BuildObserver) -> Result<RebuildReport> {
        let started = Instant::now();
        self.db.execute_batch(RECREATE_INDEX_TABLES).await?;
        tracing::info!(stops = self.stops.len(), "recreated coverage index tables");

        let mut report = RebuildReport::default();
        for stop in self.stops.iter_finest_first() {
            let outcome = self.build_stop(stop, observer).await;
            self.record(&outcome).await?;
            match &outcome.status {
                StopStatus::Complete => tracing::info!(
                    resolution = outcome.resolution,
                    precision = outcome.precision,
                    cells = outcome.cells,
                    entries = outcome.entries,
                    "stop indexed"
                ),
                StopStatus::Failed(error) => tracing::error!(
                    resolution = outcome.resolution,
                    precision = outcome.precision,
                    error = %error,
                    "stop failed; rolled back"
                ),
            }
            observer.stop_finished(&outcome);
            report.stops.push(outcome);
        }

        report.elapsed_ms = started.elapsed().as_millis() as u64;
        tracing::info!(
            complete = report.is_complete(),
            entries = report.total_entries(),
            elapsed_ms = report.elapsed_ms,
            "coverage index rebuild finished"
        );
        Ok(report)
    }

    async fn build_stop(&self, stop: &Stop, observer: &mut dyn BuildObserver) -> StopOutcome {
        let mut outcome = StopOutcome {
            resolution: stop.resolution,
            precision: stop.index_precision,
            cells: 0,
            entries: 0,
            status: StopStatus::Complete,
        };

        let total = match self.count_cells(stop).await {
            Ok(total) => total,
            Err(e) => {
                outcome.status = StopStatus::Failed(e.to_string());
                return outcome;
            }
        };
        observer.stop_started(stop, total);
        tracing::debug!(resolution = stop.resolution, total, "indexing stop");

        if let Err(e) = self.db.execute_batch("BEGIN TRANSACTION").await {
            outcome.status = StopStatus::Failed(e.to_string());
            return outcome;
        }

        let mut offset = 0u64;
        loop {
            let ids = match self.fetch_batch(stop, offset).await {
                BatchOutcome::Page(ids) => ids,
                BatchOutcome::Done => break,
                BatchOutcome::Failed(error) => {
                    outcome.status = StopStatus::Failed(error);
                    break;
                }
            };
            match self.index_batch(stop, &ids).await {
                Ok(entries) => {
                    outcome.cells += ids.len() as u64;
                    outcome.entries += entries;
                    offset += ids.len() as u64;
                    observer.batch_processed(stop, ids.len() as u64);
                }
                Err(e) => {
                    outcome.status = StopStatus::Failed(e.to_string());
                    break;
                }
            }
        }

        let end = if outcome.is_complete() {
            "COMMIT"
        } else {
            "ROLLBACK"
        };
        if let Err(e) = self.db.execute_batch(end).await {
            outcome.status = StopStatus::Failed(format!("{end} failed: {e}"));
        }
        if !outcome.is_complete() {
            outcome.entries = 0;
        }
        outcome
    }

    async fn count_cells(&self, stop: &Stop) -> Result<u64> {
        let col = ancestor_column(stop.resolution);
        let row = self
            .db
            .query_one(
                &format!("SELECT count(DISTINCT {col}) FROM {CELLS_TABLE}"),
                &[],
            )
            .await?;
        Ok(row.get_u64(0)?)
    }

    /// Fetch the page of distinct ids starting at `offset`.
    pub async fn fetch_batch(&self, stop: &Stop, offset: u64) -> BatchOutcome {
        let col = ancestor_column(stop.resolution);
        let sql = format!(
            "SELECT DISTINCT {col} FROM {CELLS_TABLE} WHERE {col} IS NOT NULL \
             ORDER BY {col} LIMIT {} OFFSET {offset}",
            self.config.batch_size
        );
        let rows = match self.db.query(&sql, &[]).await {
            Ok(rows) => rows,
            Err(e) => return BatchOutcome::Failed(e.to_string()),
        };
        if rows.is_empty() {
            return BatchOutcome::Done;
        }
        match rows
            .iter()
            .map(|r| r.get_u64(0))
            .collect::<cellmap_db::Result<Vec<u64>>>()
        {
            Ok(ids) => BatchOutcome::Page(ids),
            Err(e) => BatchOutcome::Failed(e.to_string()),
        }
    }

    /// Cover and insert one page of cells; returns the number of rows written.
    async fn index_batch(&self, stop: &Stop, ids: &[u64]) -> Result<u64> {
        let mut pending: Vec<(u64, String)> = Vec::new();
        let mut written = 0u64;
        for &id in ids {
            let cell = cell_from_u64(id)?;
            for tile in cover_tiles(&cell_polygon(cell), stop.index_precision)? {
                pending.push((id, tile));
            }
            if pending.len() >= self.config.insert_chunk {
                written += self.insert_entries(stop, &pending).await?;
                pending.clear();
            }
        }
        if !pending.is_empty() {
            written += self.insert_entries(stop, &pending).await?;
        }
        Ok(written)
    }

    async fn insert_entries(&self, stop: &Stop, entries: &[(u64, String)]) -> Result<u64> {
        // Every value is an integer or a quadkey of digits 0-3.
        let mut sql = format!(
            "INSERT INTO {GEOHASH_TABLE} (resolution, cell_id, cover_tile, precision) VALUES "
        );
        for (i, (cell_id, tile)) in entries.iter().enumerate() {
            if i > 0 {
                sql.push_str(", ");
            }
            let _ = write!(
                sql,
                "({}, {cell_id}, '{tile}', {})",
                stop.resolution, stop.index_precision
            );
        }
        self.db.execute_batch(&sql).await?;
        Ok(entries.len() as u64)
    }

    async fn record(&self, outcome: &StopOutcome) -> Result<()> {
        let error = match outcome.status.error() {
            Some(e) => SqlValue::from(e),
            None => SqlValue::Null,
        };
        self.db
            .execute(
                &format!(
                    "INSERT INTO {BUILD_TABLE} \
                     (resolution, precision, status, cells, entries, error, finished_at) \
                     VALUES ($1, $2, $3, $4, $5, $6, now()::TIMESTAMP)"
                ),
                &[
                    SqlValue::from(outcome.resolution),
                    SqlValue::from(outcome.precision),
                    SqlValue::from(outcome.status.as_str()),
                    SqlValue::from(outcome.cells),
                    SqlValue::from(outcome.entries),
                    error,
                ],
            )
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellmap_db::{Database, DuckDbDatabase};
    use h3o::{LatLng, Resolution};
    use std::sync::Arc;

    fn two_stop_table() -> StopTable {
        StopTable::new(vec![Stop::new(0, 5, 4, 5), Stop::new(6, 9, 7, 9)]).unwrap()
    }

    /// Fact table with one res-7 cell per point and its res-4 ancestor.
    async fn seeded_db(points: &[(f64, f64)]) -> SharedDatabase {
        let db = DuckDbDatabase::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE cells (r4_id UBIGINT, r7_id UBIGINT, depth DOUBLE)")
            .await
            .unwrap();
        for (lat, lng) in points {
            let cell = LatLng::new(*lat, *lng).unwrap().to_cell(Resolution::Seven);
            let parent = cell.parent(Resolution::Four).unwrap();
            db.execute(
                "INSERT INTO cells VALUES ($1, $2, 1.0)",
                &[u64::from(parent).into(), u64::from(cell).into()],
            )
            .await
            .unwrap();
        }
        Arc::new(db)
    }

    #[derive(Default)]
    struct Recording {
        started: Vec<(u8, u64)>,
        batches: Vec<u64>,
        finished: Vec<StopStatus>,
    }

    impl BuildObserver for Recording {
        fn stop_started(&mut self, stop: &Stop, total: u64) {
            self.started.push((stop.resolution, total));
        }
        fn batch_processed(&mut self, _stop: &Stop, cells: u64) {
            self.batches.push(cells);
        }
        fn stop_finished(&mut self, outcome: &StopOutcome) {
            self.finished.push(outcome.status.clone());
        }
    }

    async fn index_rows(db: &SharedDatabase) -> Vec<(u64, u64, String, u64)> {
        db.query(
            "SELECT resolution, cell_id, cover_tile, precision FROM geohashes \
             ORDER BY resolution, cell_id, cover_tile",
            &[],
        )
        .await
        .unwrap()
        .iter()
        .map(|r| {
            (
                r.get_u64(0).unwrap(),
                r.get_u64(1).unwrap(),
                r.get_str(2).unwrap().to_string(),
                r.get_u64(3).unwrap(),
            )
        })
        .collect()
    }

    #[tokio::test]
    async fn test_rebuild_indexes_every_stop() {
        let db = seeded_db(&[(44.5, -68.2), (44.6, -68.3), (10.0, 10.0)]).await;
        let builder = GeohashIndexBuilder::new(db.clone(), two_stop_table())
            .with_config(BuilderConfig::default().with_batch_size(2));
        let mut observer = Recording::default();
        let report = builder.rebuild(&mut observer).await.unwrap();

        assert!(report.is_complete());
        assert_eq!(report.stops.len(), 2);
        assert_eq!(report.stops[0].resolution, 7);
        assert_eq!(report.stops[0].cells, 3);
        assert_eq!(observer.started[0], (7, 3));
        // batch size 2 over 3 cells
        assert_eq!(&observer.batches[..2], &[2, 1]);
        assert_eq!(observer.finished, vec![StopStatus::Complete; 2]);

        let rows = index_rows(&db).await;
        assert_eq!(rows.len() as u64, report.total_entries());
        for (res, _, tile, precision) in &rows {
            let expected = if *res == 7 { 9 } else { 5 };
            assert_eq!(*precision, expected);
            assert_eq!(tile.len() as u64, expected);
        }

        let builds = db
            .query("SELECT resolution, status FROM geohash_builds ORDER BY resolution", &[])
            .await
            .unwrap();
        assert_eq!(builds.len(), 2);
        assert_eq!(builds[0].get_str(1).unwrap(), "complete");
    }

    #[tokio::test]
    async fn test_rebuild_twice_is_identical() {
        let db = seeded_db(&[(44.5, -68.2), (-33.9, 151.2)]).await;
        let builder = GeohashIndexBuilder::new(db.clone(), two_stop_table());
        builder.rebuild(&mut NoopObserver).await.unwrap();
        let first = index_rows(&db).await;
        builder.rebuild(&mut NoopObserver).await.unwrap();
        assert_eq!(first, index_rows(&db).await);
        let builds = db.query("SELECT count(*) FROM geohash_builds", &[]).await.unwrap();
        assert_eq!(builds[0].get_u64(0).unwrap(), 2);
    }

    #[tokio::test]
    async fn test_failed_stop_rolls_back_and_continues() {
        // r7_id holds an id that is not a valid H3 cell
        let db = DuckDbDatabase::open_in_memory().unwrap();
        let cell = LatLng::new(44.5, -68.2).unwrap().to_cell(Resolution::Seven);
        let parent = cell.parent(Resolution::Four).unwrap();
        db.execute_batch(&format!(
            "CREATE TABLE cells (r4_id UBIGINT, r7_id UBIGINT);
             INSERT INTO cells VALUES ({}, {}), ({}, 12345);",
            u64::from(parent),
            u64::from(cell),
            u64::from(parent),
        ))
        .await
        .unwrap();
        let db: SharedDatabase = Arc::new(db);

        let report = GeohashIndexBuilder::new(db.clone(), two_stop_table())
            .rebuild(&mut NoopObserver)
            .await
            .unwrap();
        assert!(!report.is_complete());
        let failed: Vec<_> = report.failed().map(|s| s.resolution).collect();
        assert_eq!(failed, vec![7]);
        assert!(report.stops[1].is_complete());

        let res7 = db
            .query("SELECT count(*) FROM geohashes WHERE resolution = 7", &[])
            .await
            .unwrap();
        assert_eq!(res7[0].get_u64(0).unwrap(), 0);
        let status = db
            .query_one(
                "SELECT status, error FROM geohash_builds WHERE resolution = 7",
                &[],
            )
            .await
            .unwrap();
        assert_eq!(status.get_str(0).unwrap(), "failed");
        assert!(status.get_opt_str(1).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_missing_ancestor_column_fails_stop() {
        let db = DuckDbDatabase::open_in_memory().unwrap();
        db.execute_batch("CREATE TABLE cells (r4_id UBIGINT)").await.unwrap();
        let db: SharedDatabase = Arc::new(db);
        let report = GeohashIndexBuilder::new(db, two_stop_table())
            .rebuild(&mut NoopObserver)
            .await
            .unwrap();
        assert!(!report.stops[0].is_complete());
        assert!(report.stops[1].is_complete());
    }
}
