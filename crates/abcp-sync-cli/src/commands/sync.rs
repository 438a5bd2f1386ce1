use std::path::Path;

use crate::commands::common::{
    format_sync_report, load_config, open_database, reconcile, validate_limit,
};
use crate::error::CliError;

pub async fn run_sync(limit: Option<usize>, db_path: &Path) -> Result<(), CliError> {
    let limit = validate_limit(limit)?;
    let config = load_config(db_path)?;
    let db = open_database(&config.db_path).await?;

    let report = reconcile(&config, &db, limit).await?;
    for line in format_sync_report(&report) {
        println!("{line}");
    }
    Ok(())
}
