//! cellmap server CLI
//!
//! Run with: `cargo run -p cellmap-server -- --help`

use cellmap_server::{
    config_file::load_and_merge_config,
    telemetry::{init_logging, TelemetryConfig},
    CellmapServer, ServerConfig,
};
use clap::{CommandFactory, FromArgMatches};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Parse CLI + env via clap (get both typed config and raw matches)
    let matches = ServerConfig::command().get_matches();
    let mut config = ServerConfig::from_arg_matches(&matches)?;

    // 2. Merge the config file; an invalid stop table is fatal
    load_and_merge_config(&mut config, &matches)?;

    let telemetry_config = TelemetryConfig::with_server_config(&config);
    init_logging(&telemetry_config);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        addr = %config.effective_listen_addr(),
        db = %config.db_path.display(),
        attributes = %config.attributes_path.display(),
        cors = config.cors_enabled,
        stops = config.stops.len(),
        "Starting cellmap server"
    );

    let server = CellmapServer::new(config).await?;
    server.run().await.map_err(Into::into)
}
