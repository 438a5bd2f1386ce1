use std::path::Path;

use abcp_sync_core::config::AppConfig;
use abcp_sync_core::db::{Database, LibSqlMetaRepository, LibSqlUserRepository, UserCounts};
use abcp_sync_core::gateway::BitrixClient;
use abcp_sync_core::reconcile::{DealSettings, Reconciler, SyncReport};
use abcp_sync_core::source::{
    extract_items, import_items, import_users, AbcpClient, ImportMode, ImportSummary, Paging,
};
use serde::Serialize;

use crate::error::CliError;

pub async fn open_database(db_path: &Path) -> Result<Database, CliError> {
    Ok(Database::open(db_path).await?)
}

/// Full configuration with the store location resolved by the caller.
pub fn load_config(db_path: &Path) -> Result<AppConfig, CliError> {
    let mut config = AppConfig::from_env()?;
    config.db_path = db_path.to_path_buf();
    tracing::debug!(?config, "Configuration loaded");
    Ok(config)
}

pub fn validate_limit(limit: Option<usize>) -> Result<Option<usize>, CliError> {
    match limit {
        Some(0) => Err(CliError::ZeroLimit),
        other => Ok(other),
    }
}

pub async fn import(
    config: &AppConfig,
    db: &Database,
    mode: ImportMode,
) -> Result<ImportSummary, CliError> {
    let source = AbcpClient::new(&config.source, &config.http)?;
    let users = LibSqlUserRepository::new(db.connection());
    let meta = LibSqlMetaRepository::new(db.connection());

    Ok(import_users(
        &source,
        &users,
        &meta,
        Paging::from_source(&config.source),
        mode,
    )
    .await?)
}

/// Upsert the listing saved in `path`. Needs only the store, not the remote systems.
pub async fn import_file(db: &Database, path: &Path) -> Result<ImportSummary, CliError> {
    let contents = std::fs::read_to_string(path)?;
    let payload: serde_json::Value = serde_json::from_str(&contents)?;
    let items = extract_items(payload, &path.display().to_string())?;
    tracing::info!(path = %path.display(), items = items.len(), "Read listing file");

    let users = LibSqlUserRepository::new(db.connection());
    Ok(import_items(&users, &items).await?)
}

pub async fn reconcile(
    config: &AppConfig,
    db: &Database,
    limit: Option<usize>,
) -> Result<SyncReport, CliError> {
    let gateway = BitrixClient::new(&config.destination.webhook_url, &config.http)?
        .with_contact_inn_field(config.destination.fields.contact_inn.clone());
    let users = LibSqlUserRepository::new(db.connection());
    let reconciler = Reconciler::new(
        &users,
        &gateway,
        DealSettings::from_destination(&config.destination),
    );

    Ok(reconciler.sync_batch(limit).await?)
}

pub fn format_import_summary(summary: &ImportSummary) -> String {
    let mut line = format!(
        "Imported ({}): {} stored of {} fetched across {} page(s)",
        summary.mode, summary.upserted, summary.fetched, summary.pages
    );
    if summary.skipped > 0 {
        line.push_str(&format!(", {} skipped without user id", summary.skipped));
    }
    line
}

pub fn format_sync_report(report: &SyncReport) -> Vec<String> {
    let mut lines = vec![format!(
        "Synced to Bitrix24: {} of {} (contacts created: {}, reused: {})",
        report.synced, report.selected, report.contacts_created, report.contacts_reused
    )];

    lines.extend(report.failures.iter().map(|failure| {
        format!(
            "warning: userId {} failed at {}: {}",
            failure.abcp_user_id, failure.step, failure.error
        )
    }));
    lines
}

#[derive(Debug, Serialize)]
pub struct StatusItem {
    pub db_path: String,
    pub total: u64,
    pub synced: u64,
    pub pending: u64,
    pub contact_only: u64,
    pub last_full_import_at: Option<String>,
    pub last_incremental_import_at: Option<String>,
}

impl StatusItem {
    pub fn new(
        db_path: &Path,
        counts: UserCounts,
        last_full_import_at: Option<String>,
        last_incremental_import_at: Option<String>,
    ) -> Self {
        Self {
            db_path: db_path.display().to_string(),
            total: counts.total,
            synced: counts.synced,
            pending: counts.pending,
            contact_only: counts.contact_only,
            last_full_import_at,
            last_incremental_import_at,
        }
    }
}

pub fn format_status_lines(status: &StatusItem) -> Vec<String> {
    let never = || "never".to_string();
    vec![
        format!("Store:            {}", status.db_path),
        format!("Records:          {}", status.total),
        format!("Synced:           {}", status.synced),
        format!("Pending:          {}", status.pending),
        format!("Contact only:     {}", status.contact_only),
        format!(
            "Last full import: {}",
            status.last_full_import_at.clone().unwrap_or_else(never)
        ),
        format!(
            "Last today sweep: {}",
            status
                .last_incremental_import_at
                .clone()
                .unwrap_or_else(never)
        ),
    ]
}
