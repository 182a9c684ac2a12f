use colored::Colorize;
use std::fmt;
use std::process;

/// Exit codes for the CLI.
pub const EXIT_ERROR: i32 = 1;
/// Argument errors; emitted by clap itself.
pub const EXIT_USAGE: i32 = 2;
/// The rebuild ran but at least one stop failed.
pub const EXIT_PARTIAL: i32 = 3;

/// Unified error type for CLI operations.
pub enum CliError {
    /// Database errors.
    Db(cellmap_db::DbError),
    /// Index build or stop table errors.
    Spatial(cellmap_spatial::SpatialError),
    /// Configuration issues.
    Config(String),
    /// A rebuild finished with failed stops.
    PartialRebuild(Vec<u8>),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Db(e) => write!(f, "{} {e}", "error:".red().bold()),
            CliError::Spatial(e) => write!(f, "{} {e}", "error:".red().bold()),
            CliError::Config(msg) => write!(f, "{} {msg}", "error:".red().bold()),
            CliError::PartialRebuild(resolutions) => {
                let list: Vec<String> = resolutions.iter().map(u8::to_string).collect();
                write!(
                    f,
                    "{} coverage index is incomplete; failed resolutions: {}\n  {} tiles at these resolutions will be refused until a rebuild succeeds",
                    "error:".red().bold(),
                    list.join(", "),
                    "help:".cyan().bold(),
                )
            }
        }
    }
}

impl fmt::Debug for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

impl From<cellmap_db::DbError> for CliError {
    fn from(e: cellmap_db::DbError) -> Self {
        CliError::Db(e)
    }
}

impl From<cellmap_spatial::SpatialError> for CliError {
    fn from(e: cellmap_spatial::SpatialError) -> Self {
        CliError::Spatial(e)
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        CliError::Config(format!("JSON error: {e}"))
    }
}

/// Print error and exit with the appropriate code.
pub fn exit_with_error(err: CliError) -> ! {
    eprintln!("{err}");
    let code = match &err {
        CliError::PartialRebuild(_) => EXIT_PARTIAL,
        _ => EXIT_ERROR,
    };
    process::exit(code)
}

pub type CliResult<T> = std::result::Result<T, CliError>;
