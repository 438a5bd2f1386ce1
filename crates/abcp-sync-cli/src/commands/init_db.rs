use std::path::Path;

use crate::commands::common::open_database;
use crate::error::CliError;

pub async fn run_init_db(db_path: &Path) -> Result<(), CliError> {
    open_database(db_path).await?;
    tracing::info!(db_path = %db_path.display(), "Database initialized");
    println!("Database ready: {}", db_path.display());
    Ok(())
}
