//! Configuration file support for the cellmap server.
//!
//! The file is TOML (or JSON when the extension is `.json`) with a `[server]`
//! section and an optional `[[stops]]` array:
//!
//! ```toml
//! [server]
//! db_path = "/data/cells.duckdb"
//! attributes_path = "/data/attributes.json"
//!
//! [[stops]]
//! min_zoom = 0
//! max_zoom = 5
//! resolution = 4
//! index_precision = 5
//! ```
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI arguments
//! 2. Environment variables
//! 3. Config file
//! 4. Hardcoded defaults
//!
//! Stops can only come from the config file; without a `[[stops]]` array the
//! built-in table is used.

use cellmap_spatial::{Stop, StopTable};
use clap::ArgMatches;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::ServerConfig;

/// Top-level config file structure.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CellmapFileConfig {
    /// Server configuration section `[server]`
    #[serde(default)]
    pub server: Option<ServerFileConfig>,

    /// Zoom stops `[[stops]]`, validated when applied
    #[serde(default)]
    pub stops: Option<Vec<Stop>>,
}

/// The `[server]` section. Every field is `Option` so the file only needs to
/// contain values the user wants to set.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct ServerFileConfig {
    pub listen_addr: Option<String>,
    pub port: Option<u16>,
    pub db_path: Option<String>,
    pub attributes_path: Option<String>,
    pub log_level: Option<String>,
    pub cors_enabled: Option<bool>,
    pub body_limit: Option<usize>,
    pub tile_cache_control: Option<String>,
    pub metadata_cache_control: Option<String>,
    pub geojson_cache_control: Option<String>,
    pub max_footprint_cells: Option<usize>,
}

/// Errors from config file loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {detail}")]
    Parse { path: PathBuf, detail: String },
    #[error("Invalid config value: {0}")]
    InvalidValue(String),
}

/// Load a config file from the given path. Detects format by extension:
/// `.json` → JSON, everything else → TOML.
pub fn load_config(path: &Path) -> Result<CellmapFileConfig, ConfigFileError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigFileError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    if content.trim().is_empty() {
        return Ok(CellmapFileConfig::default());
    }

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    if is_json {
        serde_json::from_str(&content).map_err(|e| ConfigFileError::Parse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    } else {
        toml::from_str(&content).map_err(|e| ConfigFileError::Parse {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }
}

/// Apply config file values to a `ServerConfig`, but only for fields where
/// the user did NOT provide a CLI argument or environment variable.
pub fn apply_to_server_config(
    file: &CellmapFileConfig,
    config: &mut ServerConfig,
    matches: &ArgMatches,
) -> Result<(), ConfigFileError> {
    use clap::parser::ValueSource;

    // Fields with a `default_value` report Some(DefaultValue); Option fields
    // without one report None.
    let is_default = |arg_name: &str| -> bool {
        matches!(
            matches.value_source(arg_name),
            None | Some(ValueSource::DefaultValue)
        )
    };

    if let Some(ref server) = file.server {
        // NOTE: clap derive uses the field name (underscores) as the arg ID.
        if is_default("listen_addr") {
            if let Some(ref addr_str) = server.listen_addr {
                config.listen_addr = addr_str.parse::<SocketAddr>().map_err(|e| {
                    ConfigFileError::InvalidValue(format!("listen_addr '{addr_str}': {e}"))
                })?;
            }
        }
        if is_default("port") {
            if let Some(port) = server.port {
                config.port = Some(port);
            }
        }
        if is_default("db_path") {
            if let Some(ref path) = server.db_path {
                config.db_path = PathBuf::from(path);
            }
        }
        if is_default("attributes_path") {
            if let Some(ref path) = server.attributes_path {
                config.attributes_path = PathBuf::from(path);
            }
        }
        if is_default("log_level") {
            if let Some(ref level) = server.log_level {
                config.log_level = level.clone();
            }
        }
        if is_default("cors_enabled") {
            if let Some(v) = server.cors_enabled {
                config.cors_enabled = v;
            }
        }
        if is_default("body_limit") {
            if let Some(v) = server.body_limit {
                config.body_limit = v;
            }
        }
        if is_default("tile_cache_control") {
            if let Some(ref v) = server.tile_cache_control {
                config.tile_cache_control = v.clone();
            }
        }
        if is_default("metadata_cache_control") {
            if let Some(ref v) = server.metadata_cache_control {
                config.metadata_cache_control = v.clone();
            }
        }
        if is_default("geojson_cache_control") {
            if let Some(ref v) = server.geojson_cache_control {
                config.geojson_cache_control = v.clone();
            }
        }
        if is_default("max_footprint_cells") {
            if let Some(v) = server.max_footprint_cells {
                config.max_footprint_cells = v;
            }
        }
    }

    if let Some(ref stops) = file.stops {
        config.stops = StopTable::new(stops.clone())
            .map_err(|e| ConfigFileError::InvalidValue(format!("stops: {e}")))?;
        info!(stops = config.stops.len(), "Using stop table from config file");
    }

    Ok(())
}

/// Load the config file named by `--config` (if any) and merge it into
/// `config`.
pub fn load_and_merge_config(
    config: &mut ServerConfig,
    matches: &ArgMatches,
) -> Result<(), ConfigFileError> {
    let Some(path) = config.config_file.clone() else {
        debug!("No config file given, using CLI args and defaults only");
        return Ok(());
    };

    info!(path = %path.display(), "Loading configuration file");
    let file_config = load_config(&path)?;
    apply_to_server_config(&file_config, config, matches)
}
