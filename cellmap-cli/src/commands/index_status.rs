use crate::error::{CliError, CliResult};
use cellmap_db::DuckDbDatabase;
use cellmap_spatial::{BuildState, IndexCatalog, StopTable};
use colored::Colorize;
use comfy_table::{ContentArrangement, Table};
use serde::Serialize;
use std::path::Path;

/// One configured stop and whether the index can serve it.
#[derive(Debug, Serialize)]
pub struct StopReport {
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub resolution: u8,
    pub precision: u8,
    /// `complete`, `failed`, `unrecorded` or `missing`
    pub build: &'static str,
    pub servable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub entries: u64,
    pub cells: u64,
}

pub async fn run(db_path: &Path, stops: &StopTable, json: bool) -> CliResult<()> {
    if !db_path.exists() {
        return Err(CliError::Config(format!(
            "database file {} does not exist",
            db_path.display()
        )));
    }
    let db = DuckDbDatabase::open_read_only(db_path)?;
    let catalog = IndexCatalog::load(&db).await?;
    let reports = report(&catalog, stops);

    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
        return Ok(());
    }

    println!("{}", render(&reports));
    if reports.iter().all(|r| r.servable) {
        println!("{}", "coverage index serves every stop".green());
    } else {
        println!(
            "{} run `cellmap rebuild-index` to index the missing resolutions",
            "hint:".cyan().bold()
        );
    }
    Ok(())
}

/// Match the configured stops against the catalog.
pub fn report(catalog: &IndexCatalog, stops: &StopTable) -> Vec<StopReport> {
    stops
        .iter()
        .map(|stop| {
            let status = catalog.status(stop.resolution, stop.index_precision);
            let error = catalog.ensure_servable(stop).err().map(|e| e.to_string());
            StopReport {
                min_zoom: stop.min_zoom,
                max_zoom: stop.max_zoom,
                resolution: stop.resolution,
                precision: stop.index_precision,
                build: status.map_or("missing", |s| build_label(&s.build)),
                servable: error.is_none(),
                error,
                entries: status.map_or(0, |s| s.entries),
                cells: status.map_or(0, |s| s.cells),
            }
        })
        .collect()
}

fn render(reports: &[StopReport]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        "ZOOMS",
        "RESOLUTION",
        "PRECISION",
        "CELLS",
        "ENTRIES",
        "BUILD",
        "SERVABLE",
    ]);
    for r in reports {
        let servable = match &r.error {
            None => "yes".green().to_string(),
            Some(e) => format!("{} ({e})", "no".red()),
        };
        table.add_row(vec![
            format!("{}-{}", r.min_zoom, r.max_zoom),
            r.resolution.to_string(),
            r.precision.to_string(),
            r.cells.to_string(),
            r.entries.to_string(),
            r.build.to_string(),
            servable,
        ]);
    }
    table
}

fn build_label(state: &BuildState) -> &'static str {
    match state {
        BuildState::Complete => "complete",
        BuildState::Failed(_) => "failed",
        BuildState::Unrecorded => "unrecorded",
    }
}
