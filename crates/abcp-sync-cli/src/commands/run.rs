use std::path::Path;

use abcp_sync_core::source::ImportMode;

use crate::commands::common::{
    format_import_summary, format_sync_report, import, load_config, open_database, reconcile,
    validate_limit,
};
use crate::error::CliError;

/// One full cycle: full import, then a sync batch.
pub async fn run_cycle(limit: Option<usize>, db_path: &Path) -> Result<(), CliError> {
    let limit = validate_limit(limit)?;
    let config = load_config(db_path)?;
    let db = open_database(&config.db_path).await?;

    let summary = import(&config, &db, ImportMode::Full).await?;
    println!("{}", format_import_summary(&summary));

    let report = reconcile(&config, &db, limit).await?;
    for line in format_sync_report(&report) {
        println!("{line}");
    }
    Ok(())
}
