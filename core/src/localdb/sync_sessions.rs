// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! `SyncSession` DAO (SPEC_FULL §2 "`SyncSession` persistence").

use sqlx::SqlitePool;

use crate::model::{SessionStatus, SyncSession, TimestampMillis};

#[derive(Debug, sqlx::FromRow)]
struct SyncSessionRow {
    id: i64,
    calendar_id: i64,
    started_at: i64,
    finished_at: Option<i64>,
    status: Option<String>,
    added: i64,
    updated: i64,
    deleted: i64,
    skipped_parse_error: i64,
    skipped_constraint_error: i64,
}

impl SyncSessionRow {
    #[allow(clippy::cast_sign_loss)]
    fn into_session(self) -> SyncSession {
        SyncSession {
            id: self.id,
            calendar_id: self.calendar_id,
            started_at: self.started_at,
            finished_at: self.finished_at,
            status: self.status.and_then(|s| parse_status(&s)),
            added: self.added as u32,
            updated: self.updated as u32,
            deleted: self.deleted as u32,
            skipped_parse_error: self.skipped_parse_error as u32,
            skipped_constraint_error: self.skipped_constraint_error as u32,
        }
    }
}

fn parse_status(raw: &str) -> Option<SessionStatus> {
    match raw {
        "SUCCESS" => Some(SessionStatus::Success),
        "PARTIAL" => Some(SessionStatus::Partial),
        "FAILED" => Some(SessionStatus::Failed),
        "CANCELLED" => Some(SessionStatus::Cancelled),
        _ => None,
    }
}

const SELECT_COLUMNS: &str = "
id, calendar_id, started_at, finished_at, status, added, updated, deleted,
skipped_parse_error, skipped_constraint_error";

/// DAO over the `sync_sessions` table.
#[derive(Debug, Clone)]
pub struct SyncSessions {
    pool: SqlitePool,
}

impl SyncSessions {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Opens a new session, returning its row id (spec §4.8 "Emits a
    /// `SyncSession` record with timings").
    pub async fn start(&self, calendar_id: i64, started_at: TimestampMillis) -> Result<i64, sqlx::Error> {
        let result = sqlx::query("INSERT INTO sync_sessions (calendar_id, started_at) VALUES (?, ?)")
            .bind(calendar_id)
            .bind(started_at)
            .execute(&self.pool)
            .await?;
        Ok(result.last_insert_rowid())
    }

    /// Closes a session with its terminal counters and status.
    #[allow(clippy::too_many_arguments)]
    pub async fn finish(
        &self,
        id: i64,
        finished_at: TimestampMillis,
        status: SessionStatus,
        added: u32,
        updated: u32,
        deleted: u32,
        skipped_parse_error: u32,
        skipped_constraint_error: u32,
    ) -> Result<(), sqlx::Error> {
        const SQL: &str = "
UPDATE sync_sessions SET
    finished_at = ?, status = ?, added = ?, updated = ?, deleted = ?,
    skipped_parse_error = ?, skipped_constraint_error = ?
WHERE id = ?";
        sqlx::query(SQL)
            .bind(finished_at)
            .bind(status.as_str())
            .bind(i64::from(added))
            .bind(i64::from(updated))
            .bind(i64::from(deleted))
            .bind(i64::from(skipped_parse_error))
            .bind(i64::from(skipped_constraint_error))
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Fetches a session by id.
    pub async fn get(&self, id: i64) -> Result<Option<SyncSession>, sqlx::Error> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM sync_sessions WHERE id = ?");
        let row: Option<SyncSessionRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(SyncSessionRow::into_session))
    }

    /// Lists the most recent sessions for a calendar, newest first.
    pub async fn list_for_calendar(&self, calendar_id: i64, limit: i64) -> Result<Vec<SyncSession>, sqlx::Error> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM sync_sessions WHERE calendar_id = ? ORDER BY started_at DESC LIMIT ?");
        let rows: Vec<SyncSessionRow> = sqlx::query_as(&sql).bind(calendar_id).bind(limit).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(SyncSessionRow::into_session).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localdb::LocalDb;
    use crate::model::Provider;

    async fn calendar(db: &LocalDb) -> i64 {
        let account_id = db.accounts.insert(Provider::Caldav, "a@example.com", "A").await.unwrap();
        db.calendars.insert(account_id, "https://example.com/dav/p/", "P", 0, false).await.unwrap()
    }

    #[tokio::test]
    async fn start_then_finish_round_trips_counters() {
        let db = LocalDb::open(None).await.unwrap();
        let calendar_id = calendar(&db).await;
        let id = db.sync_sessions.start(calendar_id, 1000).await.unwrap();
        db.sync_sessions.finish(id, 2000, SessionStatus::Partial, 3, 1, 0, 2, 0).await.unwrap();

        let session = db.sync_sessions.get(id).await.unwrap().unwrap();
        assert_eq!(session.status, Some(SessionStatus::Partial));
        assert_eq!(session.added, 3);
        assert_eq!(session.skipped_parse_error, 2);
    }

    #[tokio::test]
    async fn list_for_calendar_orders_newest_first() {
        let db = LocalDb::open(None).await.unwrap();
        let calendar_id = calendar(&db).await;
        let first = db.sync_sessions.start(calendar_id, 1000).await.unwrap();
        let second = db.sync_sessions.start(calendar_id, 2000).await.unwrap();

        let sessions = db.sync_sessions.list_for_calendar(calendar_id, 10).await.unwrap();
        assert_eq!(sessions[0].id, second);
        assert_eq!(sessions[1].id, first);
    }
}
