//! Full and "registered today" import sweeps into the local store

use chrono::{NaiveDate, SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;

use super::SourceApi;
use crate::config::SourceConfig;
use crate::db::{MetaRepository, UserRepository, LAST_FULL_IMPORT_AT, LAST_INCREMENTAL_IMPORT_AT};
use crate::error::Result;
use crate::models::SourceUser;

/// Which source users a sweep persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Every user in the listing
    Full,
    /// Only users whose registration date is the given day
    Incremental(NaiveDate),
}

impl ImportMode {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Incremental(_) => "incremental",
        }
    }

    /// Meta key stamped when the sweep completes
    pub const fn meta_key(self) -> &'static str {
        match self {
            Self::Full => LAST_FULL_IMPORT_AT,
            Self::Incremental(_) => LAST_INCREMENTAL_IMPORT_AT,
        }
    }

    fn includes(self, user: &SourceUser) -> bool {
        match self {
            Self::Full => true,
            Self::Incremental(day) => user.registered_on(day),
        }
    }
}

/// Listing page size and optional page cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Paging {
    pub page_size: u32,
    pub max_pages: Option<u32>,
}

impl Paging {
    pub const fn from_source(source: &SourceConfig) -> Self {
        Self {
            page_size: source.page_size,
            max_pages: source.max_pages,
        }
    }
}

/// Outcome of one import sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub mode: &'static str,
    /// Items received from the source
    pub fetched: usize,
    /// Items written to the store
    pub upserted: usize,
    /// Items without a usable identity
    pub skipped: usize,
    pub pages: u32,
}

/// Walk the source listing page by page and upsert the users `mode` selects.
///
/// Each page is committed on its own, so a sweep aborted by an exhausted
/// retry keeps every page stored before it. The meta timestamp is written
/// only after the listing is exhausted or the page cap is reached.
pub async fn import_users<S, U, M>(
    source: &S,
    users: &U,
    meta: &M,
    paging: Paging,
    mode: ImportMode,
) -> Result<ImportSummary>
where
    S: SourceApi,
    U: UserRepository,
    M: MetaRepository,
{
    let mut summary = ImportSummary {
        mode: mode.label(),
        fetched: 0,
        upserted: 0,
        skipped: 0,
        pages: 0,
    };
    let mut skip = 0u64;

    tracing::info!(
        mode = mode.label(),
        page_size = paging.page_size,
        max_pages = ?paging.max_pages,
        "Import started"
    );

    loop {
        if paging.max_pages.is_some_and(|max| summary.pages >= max) {
            tracing::warn!(page = summary.pages, "Page cap reached, stopping import");
            break;
        }

        let items = source.fetch_page(skip, paging.page_size).await?;
        if items.is_empty() {
            tracing::debug!(page = summary.pages, skip, "Empty page, listing exhausted");
            break;
        }

        let batch = parse_items(&items, mode, &mut summary);
        if !batch.is_empty() {
            summary.upserted += users.upsert_page(&batch).await?;
        }
        summary.fetched += items.len();
        summary.pages += 1;
        skip += items.len() as u64;

        tracing::info!(
            page = summary.pages,
            items = items.len(),
            stored = batch.len(),
            "Imported page"
        );
    }

    let finished_at = Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true);
    meta.set(mode.meta_key(), &finished_at).await?;

    tracing::info!(
        mode = summary.mode,
        fetched = summary.fetched,
        upserted = summary.upserted,
        skipped = summary.skipped,
        "Import finished"
    );
    Ok(summary)
}

/// Upsert an already loaded listing, such as a saved `{"items": [...]}` export.
///
/// Every item with an identity is stored in one transaction. No meta
/// timestamp is written, so the scheduled sweeps are unaffected.
pub async fn import_items<U: UserRepository>(users: &U, items: &[Value]) -> Result<ImportSummary> {
    let mut summary = ImportSummary {
        mode: "file",
        fetched: items.len(),
        upserted: 0,
        skipped: 0,
        pages: 0,
    };

    let batch = parse_items(items, ImportMode::Full, &mut summary);
    if !batch.is_empty() {
        summary.upserted = users.upsert_page(&batch).await?;
        summary.pages = 1;
    }

    tracing::info!(
        fetched = summary.fetched,
        upserted = summary.upserted,
        skipped = summary.skipped,
        "Loaded items into the store"
    );
    Ok(summary)
}

fn parse_items(items: &[Value], mode: ImportMode, summary: &mut ImportSummary) -> Vec<SourceUser> {
    let mut batch = Vec::with_capacity(items.len());
    for item in items {
        match SourceUser::from_value(item) {
            Ok(user) if mode.includes(&user) => batch.push(user),
            Ok(user) => {
                tracing::trace!(abcp_user_id = %user.abcp_user_id, "Outside import scope");
            }
            Err(error) => {
                summary.skipped += 1;
                tracing::warn!(page = summary.pages, %error, "Skipping source item");
            }
        }
    }
    batch
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use serde_json::json;

    use super::*;
    use crate::db::{Database, LibSqlMetaRepository, LibSqlUserRepository};
    use crate::error::Error;
    use pretty_assertions::assert_eq;

    /// Serves fixed pages and records the offsets it was asked for.
    struct PagedSource {
        pages: Vec<Vec<Value>>,
        requests: Mutex<Vec<u64>>,
        fail_at_skip: Option<u64>,
    }

    impl PagedSource {
        fn new(pages: Vec<Vec<Value>>) -> Self {
            Self {
                pages,
                requests: Mutex::new(Vec::new()),
                fail_at_skip: None,
            }
        }

        fn requests(&self) -> Vec<u64> {
            self.requests.lock().unwrap().clone()
        }
    }

    impl SourceApi for PagedSource {
        async fn fetch_page(&self, skip: u64, _limit: u32) -> Result<Vec<Value>> {
            self.requests.lock().unwrap().push(skip);
            if self.fail_at_skip == Some(skip) {
                return Err(Error::RetriesExhausted {
                    operation: "abcp.users".to_string(),
                    attempts: 4,
                    last_error: "HTTP 502".to_string(),
                });
            }

            let mut offset = 0u64;
            for page in &self.pages {
                if offset == skip {
                    return Ok(page.clone());
                }
                offset += page.len() as u64;
            }
            Ok(Vec::new())
        }
    }

    fn user(id: u32, registered: &str) -> Value {
        json!({
            "userId": id,
            "name": format!("User {id}"),
            "registrationDate": registered,
        })
    }

    const PAGING: Paging = Paging {
        page_size: 2,
        max_pages: None,
    };

    #[tokio::test(flavor = "multi_thread")]
    async fn test_full_import_walks_all_pages() {
        let db = Database::open_in_memory().await.unwrap();
        let users = LibSqlUserRepository::new(db.connection());
        let meta = LibSqlMetaRepository::new(db.connection());
        let source = PagedSource::new(vec![
            vec![user(1, "2024-05-01 09:00:00"), user(2, "2024-05-02 09:00:00")],
            vec![user(3, "2024-05-03 09:00:00")],
        ]);

        let summary = import_users(&source, &users, &meta, PAGING, ImportMode::Full)
            .await
            .unwrap();

        assert_eq!(summary.fetched, 3);
        assert_eq!(summary.upserted, 3);
        assert_eq!(summary.pages, 2);
        // A short page does not end the sweep; only the empty one does
        assert_eq!(source.requests(), vec![0, 2, 3]);
        assert!(meta.get(LAST_FULL_IMPORT_AT).await.unwrap().is_some());
        assert_eq!(meta.get(LAST_INCREMENTAL_IMPORT_AT).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_incremental_import_only_stores_today() {
        let db = Database::open_in_memory().await.unwrap();
        let users = LibSqlUserRepository::new(db.connection());
        let meta = LibSqlMetaRepository::new(db.connection());
        let source = PagedSource::new(vec![
            vec![user(1, "2024-05-01 09:00:00"), user(2, "2024-05-02 10:00:00")],
            vec![user(3, "2024-05-03 11:00:00"), user(4, "2024-05-02 23:59:59")],
        ]);
        let today = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();

        let summary = import_users(&source, &users, &meta, PAGING, ImportMode::Incremental(today))
            .await
            .unwrap();

        assert_eq!(summary.fetched, 4);
        assert_eq!(summary.upserted, 2);
        assert!(users.get_by_abcp_id("1").await.unwrap().is_none());
        assert!(users.get_by_abcp_id("2").await.unwrap().is_some());
        assert!(users.get_by_abcp_id("3").await.unwrap().is_none());
        assert!(users.get_by_abcp_id("4").await.unwrap().is_some());
        assert!(meta.get(LAST_INCREMENTAL_IMPORT_AT).await.unwrap().is_some());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_incremental_import_leaves_other_days_untouched() {
        let db = Database::open_in_memory().await.unwrap();
        let users = LibSqlUserRepository::new(db.connection());
        let meta = LibSqlMetaRepository::new(db.connection());
        let full = PagedSource::new(vec![vec![json!({
            "userId": 1,
            "name": "Old",
            "registrationDate": "2024-05-01 09:00:00",
        })]]);
        import_users(&full, &users, &meta, PAGING, ImportMode::Full)
            .await
            .unwrap();

        let sweep = PagedSource::new(vec![vec![json!({
            "userId": 1,
            "name": "New",
            "registrationDate": "2024-05-01 09:00:00",
        })]]);
        let today = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();
        let summary = import_users(&sweep, &users, &meta, PAGING, ImportMode::Incremental(today))
            .await
            .unwrap();

        assert_eq!(summary.fetched, 1);
        assert_eq!(summary.upserted, 0);
        let stored = users.get_by_abcp_id("1").await.unwrap().unwrap();
        assert_eq!(stored.name.as_deref(), Some("Old"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_import_items_skips_missing_ids_without_meta() {
        let db = Database::open_in_memory().await.unwrap();
        let users = LibSqlUserRepository::new(db.connection());
        let meta = LibSqlMetaRepository::new(db.connection());
        let items = vec![
            user(1, "2024-05-01 09:00:00"),
            json!({ "name": "No id" }),
            user(2, "2023-01-15 12:00:00"),
        ];

        let summary = import_items(&users, &items).await.unwrap();

        assert_eq!(
            summary,
            ImportSummary {
                mode: "file",
                fetched: 3,
                upserted: 2,
                skipped: 1,
                pages: 1,
            }
        );
        assert_eq!(users.counts().await.unwrap().total, 2);
        assert_eq!(meta.get(LAST_FULL_IMPORT_AT).await.unwrap(), None);
        assert_eq!(meta.get(LAST_INCREMENTAL_IMPORT_AT).await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_reimport_is_idempotent() {
        let db = Database::open_in_memory().await.unwrap();
        let users = LibSqlUserRepository::new(db.connection());
        let meta = LibSqlMetaRepository::new(db.connection());
        let first = PagedSource::new(vec![vec![user(1, "2024-05-01 09:00:00")]]);
        import_users(&first, &users, &meta, PAGING, ImportMode::Full)
            .await
            .unwrap();

        let stored = users.get_by_abcp_id("1").await.unwrap().unwrap();
        users.save_contact_id(stored.id, 501).await.unwrap();

        let second = PagedSource::new(vec![vec![json!({
            "userId": "1",
            "name": "Renamed",
            "registrationDate": "2024-05-01 09:00:00",
        })]]);
        import_users(&second, &users, &meta, PAGING, ImportMode::Full)
            .await
            .unwrap();

        assert_eq!(users.counts().await.unwrap().total, 1);
        let refreshed = users.get_by_abcp_id("1").await.unwrap().unwrap();
        assert_eq!(refreshed.name.as_deref(), Some("Renamed"));
        assert_eq!(refreshed.b24_contact_id, Some(501));
        assert!(!refreshed.synced);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_items_without_identity_are_skipped() {
        let db = Database::open_in_memory().await.unwrap();
        let users = LibSqlUserRepository::new(db.connection());
        let meta = LibSqlMetaRepository::new(db.connection());
        let source = PagedSource::new(vec![vec![
            json!({ "name": "No id" }),
            user(7, "2024-05-01 09:00:00"),
        ]]);

        let summary = import_users(&source, &users, &meta, PAGING, ImportMode::Full)
            .await
            .unwrap();

        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.upserted, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_page_cap_stops_sweep() {
        let db = Database::open_in_memory().await.unwrap();
        let users = LibSqlUserRepository::new(db.connection());
        let meta = LibSqlMetaRepository::new(db.connection());
        let source = PagedSource::new(vec![
            vec![user(1, "2024-05-01 09:00:00"), user(2, "2024-05-01 09:00:00")],
            vec![user(3, "2024-05-01 09:00:00"), user(4, "2024-05-01 09:00:00")],
        ]);
        let paging = Paging {
            page_size: 2,
            max_pages: Some(1),
        };

        let summary = import_users(&source, &users, &meta, paging, ImportMode::Full)
            .await
            .unwrap();

        assert_eq!(summary.pages, 1);
        assert_eq!(source.requests(), vec![0]);
        assert_eq!(users.counts().await.unwrap().total, 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_failed_sweep_keeps_committed_pages() {
        let db = Database::open_in_memory().await.unwrap();
        let users = LibSqlUserRepository::new(db.connection());
        let meta = LibSqlMetaRepository::new(db.connection());
        let mut source = PagedSource::new(vec![
            vec![user(1, "2024-05-01 09:00:00"), user(2, "2024-05-01 09:00:00")],
            vec![user(3, "2024-05-01 09:00:00")],
        ]);
        source.fail_at_skip = Some(2);

        let error = import_users(&source, &users, &meta, PAGING, ImportMode::Full)
            .await
            .unwrap_err();

        assert!(matches!(error, Error::RetriesExhausted { .. }));
        assert_eq!(users.counts().await.unwrap().total, 2);
        assert_eq!(meta.get(LAST_FULL_IMPORT_AT).await.unwrap(), None);
    }
}
