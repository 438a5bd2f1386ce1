//! abcp-sync CLI - ABCP to Bitrix24 user replication
//!
//! Imports ABCP users into a local SQLite store and pushes unsynced records to
//! Bitrix24 as a contact plus a deal, once or on a schedule.

mod cli;
mod commands;
mod error;
mod logging;

use std::env;

use abcp_sync_core::config::resolve_db_path;
use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::daemon::run_daemon;
use crate::commands::import::{run_import_all, run_import_file, run_import_today};
use crate::commands::init_db::run_init_db;
use crate::commands::run::run_cycle;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    logging::init_logging(cli.log_level.as_deref(), cli.log_dir.as_deref())?;

    let db_path = resolve_db_path(cli.db_path, |name| env::var(name).ok());
    tracing::debug!(db_path = %db_path.display(), "Resolved store location");

    match cli.command {
        Commands::InitDb => run_init_db(&db_path).await?,
        Commands::ImportAll => run_import_all(&db_path).await?,
        Commands::ImportToday { date } => run_import_today(date, &db_path).await?,
        Commands::ImportFile { path } => run_import_file(&path, &db_path).await?,
        Commands::Sync { limit } => run_sync(limit, &db_path).await?,
        Commands::Run { limit } => run_cycle(limit, &db_path).await?,
        Commands::Status { json } => run_status(json, &db_path).await?,
        Commands::Daemon { limit } => run_daemon(limit, &db_path).await?,
    }

    Ok(())
}
