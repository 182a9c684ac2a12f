//! cellmap maintenance CLI library.
//!
//! Command handlers behind the `cellmap` binary. The binary parses args,
//! initializes tracing and calls [`run`].

pub mod cli;
pub mod commands;
pub mod config;
pub mod error;
pub mod progress;

use cli::{Cli, Commands};

/// Dispatch a parsed [`Cli`] to the appropriate command handler.
pub async fn run(cli: Cli) -> error::CliResult<()> {
    let stops = config::load_stops(cli.config.as_deref())?;

    match cli.command {
        Commands::RebuildIndex {
            db,
            batch_size,
            insert_chunk,
        } => {
            let opts = commands::rebuild_index::RebuildOpts {
                batch_size,
                insert_chunk,
                quiet: cli.quiet,
            };
            commands::rebuild_index::run(&db, stops, &opts).await
        }
        Commands::IndexStatus { db, json } => commands::index_status::run(&db, &stops, json).await,
        Commands::Stops => {
            commands::stops::run(&stops);
            Ok(())
        }
    }
}
