//! Server configuration

use cellmap_query::stats::DEFAULT_MAX_FOOTPRINT_CELLS;
use cellmap_spatial::StopTable;
use clap::Parser;
use http::HeaderValue;
use std::net::SocketAddr;
use std::path::PathBuf;

/// Cache header sent with every tile response.
pub const DEFAULT_TILE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Cache header sent with GeoJSON tile responses.
pub const DEFAULT_GEOJSON_CACHE_CONTROL: &str = "public, max-age=300";

/// Cache header sent with the attribute document.
pub const DEFAULT_METADATA_CACHE_CONTROL: &str = "public, max-age=900";

/// Cellmap tile server configuration
#[derive(Parser, Debug, Clone)]
#[command(name = "cellmap-server")]
#[command(about = "Vector tile server for H3 hex-cell datasets")]
#[command(version)]
pub struct ServerConfig {
    /// Path to a TOML or JSON configuration file
    #[arg(long = "config", env = "CELLMAP_CONFIG")]
    pub config_file: Option<PathBuf>,

    /// Server listen address
    #[arg(long, env = "CELLMAP_LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: SocketAddr,

    /// Port override; replaces the port of the listen address
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// DuckDB database holding the `cells` fact table and the coverage index
    #[arg(long, env = "DUCKDB_PATH", default_value = "cells.duckdb")]
    pub db_path: PathBuf,

    /// Precomputed attribute document served by /metadata
    #[arg(long, env = "ATTRIBUTES_PATH", default_value = "attributes.json")]
    pub attributes_path: PathBuf,

    /// Enable CORS (Cross-Origin Resource Sharing)
    #[arg(long, env = "CELLMAP_CORS_ENABLED", default_value = "true", action = clap::ArgAction::Set)]
    pub cors_enabled: bool,

    /// Request body size limit in bytes (default 10MB)
    #[arg(long, env = "CELLMAP_BODY_LIMIT", default_value = "10485760")]
    pub body_limit: usize,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "CELLMAP_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Cache-Control header for vector tile responses
    #[arg(long, env = "CELLMAP_TILE_CACHE_CONTROL", default_value = DEFAULT_TILE_CACHE_CONTROL)]
    pub tile_cache_control: String,

    /// Cache-Control header for `format=geojson` tile responses
    #[arg(long, env = "CELLMAP_GEOJSON_CACHE_CONTROL", default_value = DEFAULT_GEOJSON_CACHE_CONTROL)]
    pub geojson_cache_control: String,

    /// Cache-Control header for /metadata and /attributes
    #[arg(long, env = "CELLMAP_METADATA_CACHE_CONTROL", default_value = DEFAULT_METADATA_CACHE_CONTROL)]
    pub metadata_cache_control: String,

    /// Most finest-resolution cells a /stats footprint may expand to
    #[arg(long, env = "CELLMAP_MAX_FOOTPRINT_CELLS", default_value = "250000")]
    pub max_footprint_cells: usize,

    /// Zoom stops; only settable through the `[[stops]]` section of the config file
    #[arg(skip)]
    pub stops: StopTable,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            port: None,
            db_path: PathBuf::from("cells.duckdb"),
            attributes_path: PathBuf::from("attributes.json"),
            cors_enabled: true,
            body_limit: 10 * 1024 * 1024,
            log_level: "info".to_string(),
            tile_cache_control: DEFAULT_TILE_CACHE_CONTROL.to_string(),
            geojson_cache_control: DEFAULT_GEOJSON_CACHE_CONTROL.to_string(),
            metadata_cache_control: DEFAULT_METADATA_CACHE_CONTROL.to_string(),
            max_footprint_cells: DEFAULT_MAX_FOOTPRINT_CELLS,
            stops: StopTable::default(),
        }
    }
}

impl ServerConfig {
    /// Validate all configuration at startup
    pub fn validate(&self) -> Result<(), String> {
        if self.body_limit == 0 {
            return Err("body_limit must be > 0".to_string());
        }
        if self.max_footprint_cells == 0 {
            return Err("max_footprint_cells must be > 0".to_string());
        }
        if HeaderValue::from_str(&self.tile_cache_control).is_err() {
            return Err(format!(
                "tile_cache_control is not a valid header value: {:?}",
                self.tile_cache_control
            ));
        }
        if HeaderValue::from_str(&self.geojson_cache_control).is_err() {
            return Err(format!(
                "geojson_cache_control is not a valid header value: {:?}",
                self.geojson_cache_control
            ));
        }
        if HeaderValue::from_str(&self.metadata_cache_control).is_err() {
            return Err(format!(
                "metadata_cache_control is not a valid header value: {:?}",
                self.metadata_cache_control
            ));
        }
        Ok(())
    }

    /// Listen address with the `PORT` override applied.
    pub fn effective_listen_addr(&self) -> SocketAddr {
        match self.port {
            Some(port) => SocketAddr::new(self.listen_addr.ip(), port),
            None => self.listen_addr,
        }
    }
}
