use std::path::Path;

use abcp_sync_core::config::AppConfig;
use abcp_sync_core::db::{Database, LibSqlMetaRepository, MetaRepository, LAST_FULL_IMPORT_AT};
use abcp_sync_core::source::ImportMode;
use chrono::Local;
use tokio::time::MissedTickBehavior;

use crate::commands::common::{
    format_import_summary, import, load_config, open_database, reconcile, validate_limit,
};
use crate::error::CliError;

/// Run import-today plus a sync batch every `SYNC_INTERVAL_SECONDS`.
///
/// A full import runs first when none was ever recorded. A failing tick is
/// logged and the next one runs on schedule; Ctrl-C or SIGTERM stops the
/// loop between ticks.
pub async fn run_daemon(limit: Option<usize>, db_path: &Path) -> Result<(), CliError> {
    let limit = validate_limit(limit)?;
    let config = load_config(db_path)?;
    let db = open_database(&config.db_path).await?;

    let meta = LibSqlMetaRepository::new(db.connection());
    if meta.get(LAST_FULL_IMPORT_AT).await?.is_none() {
        tracing::info!("No full import recorded yet, running it first");
        match import(&config, &db, ImportMode::Full).await {
            Ok(summary) => tracing::info!("{}", format_import_summary(&summary)),
            Err(error) => tracing::error!(%error, "Initial full import failed"),
        }
    }

    tracing::info!(
        interval_secs = config.sync_interval.as_secs(),
        ?limit,
        "Daemon started"
    );

    let mut ticker = tokio::time::interval(config.sync_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(error) = tick(&config, &db, limit).await {
                    tracing::error!(%error, "Daemon tick failed");
                }
            }
            signal = &mut shutdown => {
                let signal = signal?;
                tracing::info!(signal, "Shutdown requested, stopping daemon");
                break;
            }
        }
    }

    Ok(())
}

#[cfg(unix)]
pub async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.map(|()| "SIGINT"),
        _ = terminate.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
pub async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}

async fn tick(config: &AppConfig, db: &Database, limit: Option<usize>) -> Result<(), CliError> {
    let today = Local::now().date_naive();
    let summary = import(config, db, ImportMode::Incremental(today)).await?;
    tracing::info!("{}", format_import_summary(&summary));

    let report = reconcile(config, db, limit).await?;
    if !report.failures.is_empty() {
        tracing::warn!(
            failed = report.failures.len(),
            "Records left unsynced, they will be retried next tick"
        );
    }
    Ok(())
}
