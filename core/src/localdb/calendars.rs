// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! `Calendar` DAO (spec §3 `Calendar`).

use sqlx::SqlitePool;

use crate::model::Calendar;

#[derive(Debug, sqlx::FromRow)]
struct CalendarRow {
    id: i64,
    account_id: i64,
    caldav_url: String,
    display_name: String,
    color: i64,
    ctag: Option<String>,
    sync_token: Option<String>,
    is_read_only: bool,
    is_visible: bool,
    is_default: bool,
}

impl CalendarRow {
    fn into_calendar(self) -> Calendar {
        Calendar {
            id: self.id,
            account_id: self.account_id,
            caldav_url: self.caldav_url,
            display_name: self.display_name,
            #[allow(clippy::cast_sign_loss)]
            color: self.color as u32,
            ctag: self.ctag,
            sync_token: self.sync_token,
            is_read_only: self.is_read_only,
            is_visible: self.is_visible,
            is_default: self.is_default,
        }
    }
}

const SELECT_COLUMNS: &str = "
id, account_id, caldav_url, display_name, color, ctag, sync_token, is_read_only, is_visible, is_default";

/// DAO over the `calendars` table.
#[derive(Debug, Clone)]
pub struct Calendars {
    pool: SqlitePool,
}

impl Calendars {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a calendar discovered under `account_id` (spec §4.4 step 5).
    #[allow(clippy::too_many_arguments)]
    pub async fn insert(
        &self,
        account_id: i64,
        caldav_url: &str,
        display_name: &str,
        color: u32,
        is_read_only: bool,
    ) -> Result<i64, sqlx::Error> {
        const SQL: &str = "
INSERT INTO calendars (account_id, caldav_url, display_name, color, is_read_only)
VALUES (?, ?, ?, ?, ?)";
        let result = sqlx::query(SQL)
            .bind(account_id)
            .bind(caldav_url)
            .bind(display_name)
            .bind(i64::from(color))
            .bind(is_read_only)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Fetches a calendar by id.
    pub async fn get(&self, id: i64) -> Result<Option<Calendar>, sqlx::Error> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM calendars WHERE id = ?");
        let row: Option<CalendarRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(CalendarRow::into_calendar))
    }

    /// Lists every visible calendar under `account_id`.
    pub async fn list_for_account(&self, account_id: i64) -> Result<Vec<Calendar>, sqlx::Error> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM calendars WHERE account_id = ? ORDER BY id");
        let rows: Vec<CalendarRow> = sqlx::query_as(&sql).bind(account_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(CalendarRow::into_calendar).collect())
    }

    /// Lists every enabled calendar across every enabled account (spec
    /// §4.8 orchestrator fan-out).
    pub async fn list_syncable(&self) -> Result<Vec<Calendar>, sqlx::Error> {
        let sql = format!(
            "SELECT c.id, c.account_id, c.caldav_url, c.display_name, c.color, c.ctag, c.sync_token, \
             c.is_read_only, c.is_visible, c.is_default \
             FROM calendars c JOIN accounts a ON a.id = c.account_id \
             WHERE a.is_enabled = 1 ORDER BY c.id"
        );
        let rows: Vec<CalendarRow> = sqlx::query_as(&sql).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(CalendarRow::into_calendar).collect())
    }

    /// Atomically writes back `{ctag, syncToken}` after a successful pull
    /// (spec §4.6 step 3 "write back ctag/syncToken atomically with the
    /// last upsert").
    pub async fn set_sync_metadata(&self, id: i64, ctag: Option<&str>, sync_token: Option<&str>) -> Result<(), sqlx::Error> {
        const SQL: &str = "UPDATE calendars SET ctag = ?, sync_token = ? WHERE id = ?";
        sqlx::query(SQL).bind(ctag).bind(sync_token).bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// The parse-failure retry counter gating sync-token advancement (spec
    /// §4.6 "parse-failure retry gate").
    pub async fn parse_retry_count(&self, id: i64) -> Result<u32, sqlx::Error> {
        let count: i64 =
            sqlx::query_scalar("SELECT parse_retry_count FROM calendars WHERE id = ?").bind(id).fetch_one(&self.pool).await?;
        #[allow(clippy::cast_sign_loss)]
        Ok(count as u32)
    }

    /// Sets the parse-failure retry counter.
    pub async fn set_parse_retry_count(&self, id: i64, count: u32) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE calendars SET parse_retry_count = ? WHERE id = ?").bind(i64::from(count)).bind(id).execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localdb::LocalDb;
    use crate::model::Provider;

    async fn account(db: &LocalDb) -> i64 {
        db.accounts.insert(Provider::Caldav, "a@example.com", "A").await.unwrap()
    }

    #[tokio::test]
    async fn insert_then_get_round_trips() {
        let db = LocalDb::open(None).await.unwrap();
        let account_id = account(&db).await;
        let id = db.calendars.insert(account_id, "https://example.com/dav/personal/", "Personal", 0xFF00_00FF, false).await.unwrap();

        let calendar = db.calendars.get(id).await.unwrap().unwrap();
        assert_eq!(calendar.caldav_url, "https://example.com/dav/personal/");
        assert_eq!(calendar.color, 0xFF00_00FF);
        assert!(!calendar.is_read_only);
    }

    #[tokio::test]
    async fn set_sync_metadata_is_visible_on_reread() {
        let db = LocalDb::open(None).await.unwrap();
        let account_id = account(&db).await;
        let id = db.calendars.insert(account_id, "https://example.com/dav/p/", "P", 0, false).await.unwrap();

        db.calendars.set_sync_metadata(id, Some("ctag-1"), Some("token-1")).await.unwrap();
        let calendar = db.calendars.get(id).await.unwrap().unwrap();
        assert_eq!(calendar.ctag.as_deref(), Some("ctag-1"));
        assert_eq!(calendar.sync_token.as_deref(), Some("token-1"));
    }

    #[tokio::test]
    async fn list_syncable_excludes_disabled_accounts() {
        let db = LocalDb::open(None).await.unwrap();
        let account_id = account(&db).await;
        db.calendars.insert(account_id, "https://example.com/dav/p/", "P", 0, false).await.unwrap();

        assert_eq!(db.calendars.list_syncable().await.unwrap().len(), 1);
    }
}
