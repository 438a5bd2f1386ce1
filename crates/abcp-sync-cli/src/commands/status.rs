use std::path::Path;

use abcp_sync_core::db::{
    LibSqlMetaRepository, LibSqlUserRepository, MetaRepository, UserRepository,
    LAST_FULL_IMPORT_AT, LAST_INCREMENTAL_IMPORT_AT,
};

use crate::commands::common::{format_status_lines, open_database, StatusItem};
use crate::error::CliError;

pub async fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path).await?;
    let users = LibSqlUserRepository::new(db.connection());
    let meta = LibSqlMetaRepository::new(db.connection());

    let status = StatusItem::new(
        db_path,
        users.counts().await?,
        meta.get(LAST_FULL_IMPORT_AT).await?,
        meta.get(LAST_INCREMENTAL_IMPORT_AT).await?,
    );

    if as_json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        for line in format_status_lines(&status) {
            println!("{line}");
        }
    }
    Ok(())
}
