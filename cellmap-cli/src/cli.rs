use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "cellmap", about = "cellmap coverage index maintenance", version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output (also respects NO_COLOR env var)
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Config file with a `[[stops]]` array (defaults to the built-in stops)
    #[arg(long, global = true, env = "CELLMAP_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Drop and rebuild the geohash coverage index from the cells table.
    ///
    /// Must not run while a server is reading the same database.
    RebuildIndex {
        /// DuckDB database file
        #[arg(long, env = "DUCKDB_PATH")]
        db: PathBuf,

        /// Distinct cell ids fetched per page
        #[arg(long, default_value_t = cellmap_spatial::builder::DEFAULT_BATCH_SIZE)]
        batch_size: u64,

        /// Index rows per INSERT statement
        #[arg(long, default_value_t = cellmap_spatial::builder::DEFAULT_INSERT_CHUNK)]
        insert_chunk: usize,
    },

    /// Show what the coverage index can serve
    IndexStatus {
        /// DuckDB database file
        #[arg(long, env = "DUCKDB_PATH")]
        db: PathBuf,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Print the stop table in effect
    Stops,
}
