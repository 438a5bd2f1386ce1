//! Console and optional rotating-file log output.

use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::Directive;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::CliError;

const DEFAULT_LEVEL: &str = "info";
const LOG_FILE_PREFIX: &str = "abcp-sync";
const RETAINED_LOG_FILES: usize = 14;

/// `abcp_sync=<level>`; the target prefix also covers `abcp_sync_core`.
pub fn level_directive(level: Option<&str>) -> Result<Directive, CliError> {
    let level = level
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .unwrap_or(DEFAULT_LEVEL)
        .to_ascii_lowercase();

    format!("abcp_sync={level}")
        .parse()
        .map_err(|error| CliError::Logging(format!("invalid log level {level:?}: {error}")))
}

/// Install the global subscriber. `RUST_LOG` directives are kept alongside
/// the level directive.
pub fn init_logging(level: Option<&str>, log_dir: Option<&Path>) -> Result<(), CliError> {
    let filter = EnvFilter::from_default_env().add_directive(level_directive(level)?);

    let console_layer = fmt::layer().with_target(true).with_writer(std::io::stderr);

    let file_layer = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(RETAINED_LOG_FILES)
                .filename_prefix(LOG_FILE_PREFIX)
                .filename_suffix("log")
                .build(dir)
                .map_err(|error| CliError::Logging(error.to_string()))?;
            Some(fmt::layer().with_ansi(false).with_writer(appender))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|error| CliError::Logging(error.to_string()))
}
