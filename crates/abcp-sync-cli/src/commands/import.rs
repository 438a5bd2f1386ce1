use std::path::Path;

use abcp_sync_core::source::ImportMode;
use chrono::{Local, NaiveDate};

use crate::commands::common::{
    format_import_summary, import, import_file, load_config, open_database,
};
use crate::error::CliError;

pub async fn run_import_all(db_path: &Path) -> Result<(), CliError> {
    run_import(db_path, ImportMode::Full).await
}

/// Defaults to the local calendar day, which is how ABCP stamps registrations.
pub async fn run_import_today(date: Option<NaiveDate>, db_path: &Path) -> Result<(), CliError> {
    let day = date.unwrap_or_else(|| Local::now().date_naive());
    run_import(db_path, ImportMode::Incremental(day)).await
}

pub async fn run_import_file(path: &Path, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;

    let summary = import_file(&db, path).await?;
    println!("{}", format_import_summary(&summary));
    Ok(())
}

async fn run_import(db_path: &Path, mode: ImportMode) -> Result<(), CliError> {
    let config = load_config(db_path)?;
    let db = open_database(&config.db_path).await?;

    let summary = import(&config, &db, mode).await?;
    println!("{}", format_import_summary(&summary));
    Ok(())
}
