use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] abcp_sync_core::Error),
    #[error(transparent)]
    Config(#[from] abcp_sync_core::config::ConfigError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Logging setup failed: {0}")]
    Logging(String),
    #[error("--limit must be greater than zero")]
    ZeroLimit,
}
