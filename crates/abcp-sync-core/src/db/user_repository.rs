//! User record repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::{Error, Result};
use crate::models::{SourceUser, UserRecord};
use crate::util::unix_millis_now;
use libsql::{params, Connection, Row};

const USER_COLUMNS: &str = "id, abcp_user_id, name, second_name, surname, email, mobile, phone,
    city, state, organization_name, inn, balance, registration_date, update_time, raw_json,
    synced, synced_at, b24_contact_id, b24_deal_id, created_at, updated_at";

/// Aggregate counters for status reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserCounts {
    pub total: u64,
    pub synced: u64,
    /// Not yet synced, no contact created
    pub pending: u64,
    /// Not yet synced, contact created by an earlier attempt
    pub contact_only: u64,
}

/// Trait for user record storage operations (async)
#[allow(async_fn_in_trait)]
pub trait UserRepository {
    /// Insert or refresh profile/provenance fields keyed by `abcp_user_id`.
    ///
    /// Synchronization columns are never touched.
    async fn upsert(&self, user: &SourceUser) -> Result<()>;

    /// Upsert a whole page atomically.
    async fn upsert_page(&self, users: &[SourceUser]) -> Result<usize>;

    /// Get a record by its source id
    async fn get_by_abcp_id(&self, abcp_user_id: &str) -> Result<Option<UserRecord>>;

    /// Records with `synced = false`, oldest local row first
    async fn list_unsynced(&self, limit: Option<usize>) -> Result<Vec<UserRecord>>;

    /// Durability checkpoint after a destination contact was created
    async fn save_contact_id(&self, id: i64, contact_id: i64) -> Result<()>;

    /// Terminal commit: deal id, `synced = true` and `synced_at` in one statement
    async fn mark_synced(&self, id: i64, deal_id: i64, synced_at: i64) -> Result<()>;

    /// Record counters by synchronization state
    async fn counts(&self) -> Result<UserCounts>;
}

/// libSQL implementation of `UserRepository`
pub struct LibSqlUserRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlUserRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a user record from a database row
    fn parse_user(row: &Row) -> Result<UserRecord> {
        Ok(UserRecord {
            id: row.get(0)?,
            abcp_user_id: row.get(1)?,
            name: row.get(2)?,
            second_name: row.get(3)?,
            surname: row.get(4)?,
            email: row.get(5)?,
            mobile: row.get(6)?,
            phone: row.get(7)?,
            city: row.get(8)?,
            state: row.get(9)?,
            organization_name: row.get(10)?,
            inn: row.get(11)?,
            balance: row.get(12)?,
            registration_date: row.get(13)?,
            update_time: row.get(14)?,
            raw_json: row.get(15)?,
            synced: row.get::<i64>(16)? != 0,
            synced_at: row.get(17)?,
            b24_contact_id: row.get(18)?,
            b24_deal_id: row.get(19)?,
            created_at: row.get(20)?,
            updated_at: row.get(21)?,
        })
    }

    async fn count_where(&self, condition: &str) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM users WHERE {condition}");
        let mut rows = self.conn.query(&sql, ()).await?;
        let count = match rows.next().await? {
            Some(row) => row.get::<i64>(0)?,
            None => 0,
        };
        Ok(u64::try_from(count).unwrap_or_default())
    }
}

impl UserRepository for LibSqlUserRepository<'_> {
    async fn upsert(&self, user: &SourceUser) -> Result<()> {
        let now = unix_millis_now();

        // Empty incoming values keep what is already stored
        self.conn
            .execute(
                "INSERT INTO users (
                    abcp_user_id, name, second_name, surname, email, mobile, phone, city, state,
                    organization_name, inn, balance, registration_date, update_time, raw_json,
                    synced, created_at, updated_at
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, 0, ?16, ?16)
                 ON CONFLICT(abcp_user_id) DO UPDATE SET
                    name = COALESCE(excluded.name, users.name),
                    second_name = COALESCE(excluded.second_name, users.second_name),
                    surname = COALESCE(excluded.surname, users.surname),
                    email = COALESCE(excluded.email, users.email),
                    mobile = COALESCE(excluded.mobile, users.mobile),
                    phone = COALESCE(excluded.phone, users.phone),
                    city = COALESCE(excluded.city, users.city),
                    state = COALESCE(excluded.state, users.state),
                    organization_name = COALESCE(excluded.organization_name, users.organization_name),
                    inn = COALESCE(excluded.inn, users.inn),
                    balance = COALESCE(excluded.balance, users.balance),
                    registration_date = COALESCE(excluded.registration_date, users.registration_date),
                    update_time = COALESCE(excluded.update_time, users.update_time),
                    raw_json = excluded.raw_json,
                    updated_at = excluded.updated_at",
                params![
                    user.abcp_user_id.as_str(),
                    user.name.as_deref(),
                    user.second_name.as_deref(),
                    user.surname.as_deref(),
                    user.email.as_deref(),
                    user.mobile.as_deref(),
                    user.phone.as_deref(),
                    user.city.as_deref(),
                    user.state.as_deref(),
                    user.organization_name.as_deref(),
                    user.inn.as_deref(),
                    user.balance.as_deref(),
                    user.registration_date.as_deref(),
                    user.update_time.as_deref(),
                    user.raw_json.as_str(),
                    now
                ],
            )
            .await?;

        tracing::debug!(abcp_user_id = %user.abcp_user_id, "Upserted user");
        Ok(())
    }

    async fn upsert_page(&self, users: &[SourceUser]) -> Result<usize> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;

        for user in users {
            if let Err(e) = self.upsert(user).await {
                self.conn.execute("ROLLBACK", ()).await.ok();
                return Err(e);
            }
        }

        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }

        Ok(users.len())
    }

    async fn get_by_abcp_id(&self, abcp_user_id: &str) -> Result<Option<UserRecord>> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE abcp_user_id = ?");
        let mut rows = self.conn.query(&sql, [abcp_user_id]).await?;

        match rows.next().await? {
            Some(row) => Ok(Some(Self::parse_user(&row)?)),
            None => Ok(None),
        }
    }

    async fn list_unsynced(&self, limit: Option<usize>) -> Result<Vec<UserRecord>> {
        // LIMIT -1 means unbounded in SQLite
        let limit = limit.map_or(-1, |value| value as i64);
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE synced = 0 ORDER BY id ASC LIMIT ?"
        );
        let mut rows = self.conn.query(&sql, params![limit]).await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_user(&row)?);
        }
        Ok(records)
    }

    async fn save_contact_id(&self, id: i64, contact_id: i64) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE users SET b24_contact_id = ?, updated_at = ? WHERE id = ? AND synced = 0",
                params![contact_id, unix_millis_now(), id],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!("unsynced user row {id}")));
        }
        Ok(())
    }

    async fn mark_synced(&self, id: i64, deal_id: i64, synced_at: i64) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE users
                 SET b24_deal_id = ?, synced = 1, synced_at = ?, updated_at = ?
                 WHERE id = ? AND synced = 0",
                params![deal_id, synced_at, unix_millis_now(), id],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(format!("unsynced user row {id}")));
        }
        Ok(())
    }

    async fn counts(&self) -> Result<UserCounts> {
        Ok(UserCounts {
            total: self.count_where("1 = 1").await?,
            synced: self.count_where("synced = 1").await?,
            pending: self
                .count_where("synced = 0 AND b24_contact_id IS NULL")
                .await?,
            contact_only: self
                .count_where("synced = 0 AND b24_contact_id IS NOT NULL")
                .await?,
        })
    }
}
