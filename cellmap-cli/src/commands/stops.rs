use cellmap_spatial::StopTable;
use comfy_table::{ContentArrangement, Table};

pub fn run(stops: &StopTable) {
    println!("{}", render(stops));
}

fn render(stops: &StopTable) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec!["ZOOMS", "RESOLUTION", "INDEX PRECISION"]);
    for stop in stops.iter() {
        table.add_row(vec![
            format!("{}-{}", stop.min_zoom, stop.max_zoom),
            stop.resolution.to_string(),
            stop.index_precision.to_string(),
        ]);
    }
    table
}
