use crate::error::{CliError, CliResult};
use crate::progress::RebuildProgress;
use cellmap_db::schema::{table_exists, CELLS_TABLE};
use cellmap_db::{DuckDbDatabase, SharedDatabase};
use cellmap_spatial::{
    BuildObserver, BuilderConfig, GeohashIndexBuilder, RebuildReport, StopTable,
};
use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use std::path::Path;
use std::sync::Arc;

/// Tunables for a rebuild.
#[derive(Debug, Clone)]
pub struct RebuildOpts {
    pub batch_size: u64,
    pub insert_chunk: usize,
    pub quiet: bool,
}

pub async fn run(db_path: &Path, stops: StopTable, opts: &RebuildOpts) -> CliResult<()> {
    if !db_path.exists() {
        return Err(CliError::Config(format!(
            "database file {} does not exist",
            db_path.display()
        )));
    }
    let db: SharedDatabase = Arc::new(DuckDbDatabase::open(db_path)?);

    if !opts.quiet {
        eprintln!(
            "Rebuilding coverage index in {} for {} stops",
            db_path.display(),
            stops.len()
        );
    }

    let mut progress = RebuildProgress::new(opts.quiet);
    let report = rebuild(db, stops.clone(), opts, &mut progress).await?;

    if !opts.quiet {
        println!("{}", summary(&report, &stops));
    }
    check_report(&report)
}

/// Rebuild against an open database. Fails when the fact table is missing or
/// the index tables cannot be recreated; per-stop failures are in the report.
pub async fn rebuild(
    db: SharedDatabase,
    stops: StopTable,
    opts: &RebuildOpts,
    observer: &mut dyn BuildObserver,
) -> CliResult<RebuildReport> {
    if !table_exists(db.as_ref(), CELLS_TABLE).await? {
        return Err(CliError::Config(format!(
            "database has no '{CELLS_TABLE}' table to index"
        )));
    }

    let config = BuilderConfig::default()
        .with_batch_size(opts.batch_size)
        .with_insert_chunk(opts.insert_chunk);
    let builder = GeohashIndexBuilder::new(db, stops).with_config(config);
    let report = builder.rebuild(observer).await?;

    tracing::info!(
        stops = report.stops.len(),
        entries = report.total_entries(),
        elapsed_ms = report.elapsed_ms,
        complete = report.is_complete(),
        "coverage index rebuild finished"
    );
    Ok(report)
}

/// `Err(PartialRebuild)` listing failed resolutions, if any.
pub fn check_report(report: &RebuildReport) -> CliResult<()> {
    let failed: Vec<u8> = report.failed().map(|s| s.resolution).collect();
    if failed.is_empty() {
        Ok(())
    } else {
        Err(CliError::PartialRebuild(failed))
    }
}

fn summary(report: &RebuildReport, stops: &StopTable) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ZOOMS", "RESOLUTION", "PRECISION", "CELLS", "ENTRIES", "STATUS"]);
    for stop in &report.stops {
        let zooms = stops
            .stop_for_resolution(stop.resolution)
            .map_or_else(|| "-".to_string(), |s| format!("{}-{}", s.min_zoom, s.max_zoom));
        let status = match stop.status.error() {
            None => stop.status.as_str().green().to_string(),
            Some(e) => format!("{} ({e})", stop.status.as_str().red()),
        };
        table.add_row(vec![
            zooms,
            stop.resolution.to_string(),
            stop.precision.to_string(),
            stop.cells.to_string(),
            stop.entries.to_string(),
            status,
        ]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use cellmap_spatial::{Stop, StopOutcome, StopStatus};

    fn outcome(resolution: u8, status: StopStatus) -> StopOutcome {
        StopOutcome {
            resolution,
            precision: resolution + 2,
            cells: 10,
            entries: 12,
            status,
        }
    }

    #[test]
    fn test_check_report_lists_failed_resolutions() {
        let report = RebuildReport {
            stops: vec![
                outcome(7, StopStatus::Complete),
                outcome(4, StopStatus::Failed("disk full".to_string())),
            ],
            elapsed_ms: 5,
        };
        match check_report(&report) {
            Err(CliError::PartialRebuild(failed)) => assert_eq!(failed, vec![4]),
            other => panic!("expected partial rebuild, got {other:?}"),
        }

        let report = RebuildReport {
            stops: vec![outcome(7, StopStatus::Complete)],
            elapsed_ms: 1,
        };
        assert!(check_report(&report).is_ok());
    }

    #[test]
    fn test_summary_shows_errors() {
        colored::control::set_override(false);
        let report = RebuildReport {
            stops: vec![outcome(4, StopStatus::Failed("disk full".to_string()))],
            elapsed_ms: 5,
        };
        let stops = StopTable::new(vec![Stop::new(0, 9, 4, 9)]).unwrap();
        let rendered = summary(&report, &stops).to_string();
        assert!(rendered.contains("failed (disk full)"), "{rendered}");
        assert!(rendered.contains("0-9"), "{rendered}");
    }
}
