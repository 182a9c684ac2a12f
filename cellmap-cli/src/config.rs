//! Stop table loading.
//!
//! Reads the `[[stops]]` array of the same config file the server uses;
//! other sections are ignored.

use crate::error::{CliError, CliResult};
use cellmap_spatial::{Stop, StopTable};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Default, Deserialize)]
struct StopsFile {
    #[serde(default)]
    stops: Option<Vec<Stop>>,
}

/// The stop table from `path`, or the built-in one when no file is given or
/// the file has no `[[stops]]`.
pub fn load_stops(path: Option<&Path>) -> CliResult<StopTable> {
    let Some(path) = path else {
        return Ok(StopTable::default());
    };
    let content = std::fs::read_to_string(path)
        .map_err(|e| CliError::Config(format!("failed to read {}: {e}", path.display())))?;

    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let file: StopsFile = if is_json {
        serde_json::from_str(&content)?
    } else {
        toml::from_str(&content)
            .map_err(|e| CliError::Config(format!("failed to parse {}: {e}", path.display())))?
    };

    match file.stops {
        Some(stops) => Ok(StopTable::new(stops)?),
        None => {
            tracing::debug!(path = %path.display(), "no [[stops]] in config file, using defaults");
            Ok(StopTable::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(suffix: &str, content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
        write!(file, "{content}").unwrap();
        file
    }

    #[test]
    fn test_defaults_without_file() {
        assert_eq!(load_stops(None).unwrap(), StopTable::default());
    }

    #[test]
    fn test_stops_from_toml_ignore_server_section() {
        let file = write_file(
            ".toml",
            "[server]\ndb_path = \"x.duckdb\"\n\n[[stops]]\nmin_zoom = 0\nmax_zoom = 9\nresolution = 6\nindex_precision = 9\n",
        );
        let stops = load_stops(Some(file.path())).unwrap();
        assert_eq!(stops.len(), 1);
        assert_eq!(stops.resolution_for_zoom(9).unwrap(), 6);
    }

    #[test]
    fn test_invalid_stops_are_rejected() {
        let file = write_file(
            ".json",
            r#"{"stops": [{"min_zoom": 1, "max_zoom": 5, "resolution": 4, "index_precision": 5}]}"#,
        );
        assert!(matches!(load_stops(Some(file.path())), Err(CliError::Spatial(_))));
    }
}
