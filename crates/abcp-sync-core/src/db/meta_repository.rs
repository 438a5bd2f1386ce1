//! Key/value import bookkeeping (`meta` table)

use crate::error::Result;
use libsql::Connection;

/// Timestamp of the last completed full import sweep
pub const LAST_FULL_IMPORT_AT: &str = "last_full_import_at";
/// Timestamp of the last completed "registered today" sweep
pub const LAST_INCREMENTAL_IMPORT_AT: &str = "last_incremental_import_at";

/// Trait for meta storage operations (async)
#[allow(async_fn_in_trait)]
pub trait MetaRepository {
    /// Read a meta value, `None` when the key was never written
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Insert or replace a meta value
    async fn set(&self, key: &str, value: &str) -> Result<()>;
}

/// libSQL implementation of `MetaRepository`
pub struct LibSqlMetaRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlMetaRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl MetaRepository for LibSqlMetaRepository<'_> {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query("SELECT value FROM meta WHERE key = ?", [key])
            .await?;

        if let Some(row) = rows.next().await? {
            let value: String = row.get(0)?;
            Ok(Some(value))
        } else {
            Ok(None)
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        tracing::debug!(key, value, "Meta set");
        self.conn
            .execute(
                "INSERT OR REPLACE INTO meta (key, value) VALUES (?, ?)",
                [key, value],
            )
            .await?;
        Ok(())
    }
}
