// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! `PendingOperation` DAO: append, conflate, fetch-order, retry/backoff
//! (spec §4.5).

use rand::Rng;
use sqlx::SqlitePool;

use crate::model::{MovePhase, OperationKind, PendingOperation, TimestampMillis};

const BASE_BACKOFF_MILLIS: i64 = 30_000;
const MAX_BACKOFF_MILLIS: i64 = 3_600_000;

/// `min(2^retryCount × 30s, 1h)` with full jitter (spec §4.5 "Retry
/// policy").
#[must_use]
pub fn backoff_delay_millis(retry_count: u32) -> i64 {
    let capped_exponent = retry_count.min(16);
    let ceiling = BASE_BACKOFF_MILLIS.saturating_mul(1_i64 << capped_exponent).min(MAX_BACKOFF_MILLIS);
    rand::thread_rng().gen_range(0..=ceiling)
}

#[derive(Debug, sqlx::FromRow)]
struct PendingOpRow {
    id: i64,
    event_id: i64,
    operation: String,
    target_url: Option<String>,
    source_calendar_id: Option<i64>,
    target_calendar_id: Option<i64>,
    move_phase: Option<i64>,
    retry_count: i64,
    last_error: Option<String>,
    next_retry_at: i64,
    created_at: i64,
    is_poisoned: bool,
    is_conflicted: bool,
}

impl PendingOpRow {
    fn into_op(self) -> PendingOperation {
        PendingOperation {
            id: self.id,
            event_id: self.event_id,
            operation: OperationKind::parse(&self.operation).unwrap_or(OperationKind::Update),
            target_url: self.target_url,
            source_calendar_id: self.source_calendar_id,
            target_calendar_id: self.target_calendar_id,
            move_phase: self.move_phase.and_then(MovePhase::from_i64),
            #[allow(clippy::cast_sign_loss)]
            retry_count: self.retry_count as u32,
            last_error: self.last_error,
            next_retry_at: self.next_retry_at,
            created_at: self.created_at,
            is_poisoned: self.is_poisoned,
            is_conflicted: self.is_conflicted,
        }
    }
}

const SELECT_COLUMNS: &str = "
id, event_id, operation, target_url, source_calendar_id, target_calendar_id, move_phase,
retry_count, last_error, next_retry_at, created_at, is_poisoned, is_conflicted";

/// DAO over the `pending_operations` table.
#[derive(Debug, Clone)]
pub struct PendingOps {
    pool: SqlitePool,
}

impl PendingOps {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Enqueues a mutation for `event_id`, applying the spec §4.5
    /// conflation table when a non-`MOVE` op already exists for the same
    /// event. `MOVE` never conflates and is always inserted fresh.
    #[allow(clippy::too_many_arguments)]
    pub async fn enqueue(
        &self,
        event_id: i64,
        operation: OperationKind,
        target_url: Option<&str>,
        source_calendar_id: Option<i64>,
        target_calendar_id: Option<i64>,
        move_phase: Option<MovePhase>,
        now: TimestampMillis,
    ) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if operation != OperationKind::Move {
            let existing: Option<(i64, String)> = sqlx::query_as("SELECT id, operation FROM pending_operations WHERE event_id = ? AND operation != 'MOVE'")
                .bind(event_id)
                .fetch_optional(&mut *tx)
                .await?;

            if let Some((existing_id, existing_op)) = existing {
                let existing_kind = OperationKind::parse(&existing_op).unwrap_or(OperationKind::Update);
                match (existing_kind, operation) {
                    (OperationKind::Create, OperationKind::Update) => {
                        sqlx::query("UPDATE pending_operations SET next_retry_at = 0 WHERE id = ?").bind(existing_id).execute(&mut *tx).await?;
                    }
                    (OperationKind::Update, OperationKind::Update) => {
                        sqlx::query("UPDATE pending_operations SET next_retry_at = 0, created_at = ? WHERE id = ?")
                            .bind(now)
                            .bind(existing_id)
                            .execute(&mut *tx)
                            .await?;
                    }
                    (OperationKind::Create, OperationKind::Delete) => {
                        sqlx::query("DELETE FROM pending_operations WHERE id = ?").bind(existing_id).execute(&mut *tx).await?;
                    }
                    (OperationKind::Update, OperationKind::Delete) => {
                        sqlx::query(
                            "UPDATE pending_operations SET operation = 'DELETE', target_url = ?, source_calendar_id = ?, \
                             next_retry_at = 0, created_at = ? WHERE id = ?",
                        )
                        .bind(target_url)
                        .bind(source_calendar_id)
                        .bind(now)
                        .bind(existing_id)
                        .execute(&mut *tx)
                        .await?;
                    }
                    _ => {
                        insert(&mut tx, event_id, operation, target_url, source_calendar_id, target_calendar_id, move_phase, now).await?;
                    }
                }
                tx.commit().await?;
                return Ok(());
            }
        }

        insert(&mut tx, event_id, operation, target_url, source_calendar_id, target_calendar_id, move_phase, now).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Fetches ops for `effectiveCalendarId(op) == calendar_id` (spec
    /// §4.5 "Calendar filter") whose `nextRetryAt <= now`, not poisoned,
    /// in fetch order: `nextRetryAt` ascending then `createdAt` ascending.
    pub async fn list_ready_for_calendar(&self, calendar_id: i64, now: TimestampMillis) -> Result<Vec<PendingOperation>, sqlx::Error> {
        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM pending_operations
WHERE is_poisoned = 0 AND next_retry_at <= ? AND (
    (operation = 'MOVE' AND move_phase = 0 AND source_calendar_id = ?)
    OR (operation = 'MOVE' AND move_phase = 1 AND target_calendar_id = ?)
    OR (operation != 'MOVE' AND COALESCE(source_calendar_id, (SELECT calendar_id FROM events WHERE events.id = pending_operations.event_id)) = ?)
)
ORDER BY next_retry_at ASC, created_at ASC"
        );
        let rows: Vec<PendingOpRow> =
            sqlx::query_as(&sql).bind(now).bind(calendar_id).bind(calendar_id).bind(calendar_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(PendingOpRow::into_op).collect())
    }

    /// Deletes an op, e.g. after a successful push (spec §4.7).
    pub async fn delete(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM pending_operations WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// Records a transient failure: bumps `retry_count`, computes the next
    /// backoff window, stores `last_error`; marks the op poisoned once
    /// `retry_count` reaches `retry_cap` (spec §4.5/§7 "Poisoned op").
    pub async fn record_failure(&self, id: i64, now: TimestampMillis, error: &str, retry_cap: u32) -> Result<bool, sqlx::Error> {
        let retry_count: i64 = sqlx::query_scalar("SELECT retry_count FROM pending_operations WHERE id = ?").bind(id).fetch_one(&self.pool).await?;
        #[allow(clippy::cast_sign_loss)]
        let next_retry_count = retry_count as u32 + 1;
        let poisoned = next_retry_count >= retry_cap;
        let next_retry_at = now + backoff_delay_millis(next_retry_count);

        sqlx::query("UPDATE pending_operations SET retry_count = ?, last_error = ?, next_retry_at = ?, is_poisoned = ? WHERE id = ?")
            .bind(i64::from(next_retry_count))
            .bind(error)
            .bind(next_retry_at)
            .bind(poisoned)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(poisoned)
    }

    /// Flags an op as conflicted after a `409`/`412` (spec §4.7 `UPDATE`
    /// conflict handling): left in place, backed off the same way
    /// `record_failure` backs off a transient error so the stale etag isn't
    /// replayed against the server every cycle. A later pull notices
    /// `is_conflicted` (`has_conflicted_op`) and refreshes the event's
    /// `etag`/`raw_ical` (`pull.rs::upsert`); once that lands, the next push
    /// retry uses the fresh etag and can actually resolve the conflict.
    pub async fn mark_conflicted(&self, id: i64, now: TimestampMillis) -> Result<(), sqlx::Error> {
        let retry_count: i64 = sqlx::query_scalar("SELECT retry_count FROM pending_operations WHERE id = ?").bind(id).fetch_one(&self.pool).await?;
        #[allow(clippy::cast_sign_loss)]
        let next_retry_count = retry_count as u32 + 1;
        let next_retry_at = now + backoff_delay_millis(next_retry_count);

        sqlx::query("UPDATE pending_operations SET is_conflicted = 1, retry_count = ?, next_retry_at = ? WHERE id = ?")
            .bind(i64::from(next_retry_count))
            .bind(next_retry_at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Whether any pending op for `event_id` is flagged `is_conflicted`.
    /// Checked by `pull.rs::upsert` so a conflicted event's local
    /// `etag`/`raw_ical` can be refreshed despite its `sync_status` not
    /// being `Synced`.
    pub async fn has_conflicted_op(&self, event_id: i64) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_operations WHERE event_id = ? AND is_conflicted = 1")
            .bind(event_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count > 0)
    }

    /// Advances a same-account `MOVE` from phase 0 (DELETE) to phase 1
    /// (CREATE), resetting retry state (spec §4.7 "On success, advance
    /// `movePhase := 1`, reset `retryCount`, clear `lastError`").
    pub async fn advance_move_phase(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE pending_operations SET move_phase = 1, retry_count = 0, last_error = NULL, next_retry_at = 0 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Returns every pending op for an event (used by `EventWriter` to
    /// decide move classification and by tests).
    pub async fn list_for_event(&self, event_id: i64) -> Result<Vec<PendingOperation>, sqlx::Error> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM pending_operations WHERE event_id = ? ORDER BY created_at");
        let rows: Vec<PendingOpRow> = sqlx::query_as(&sql).bind(event_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(PendingOpRow::into_op).collect())
    }
}

#[allow(clippy::too_many_arguments)]
async fn insert(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    event_id: i64,
    operation: OperationKind,
    target_url: Option<&str>,
    source_calendar_id: Option<i64>,
    target_calendar_id: Option<i64>,
    move_phase: Option<MovePhase>,
    now: TimestampMillis,
) -> Result<(), sqlx::Error> {
    const SQL: &str = "
INSERT INTO pending_operations (
    event_id, operation, target_url, source_calendar_id, target_calendar_id, move_phase,
    next_retry_at, created_at
) VALUES (?, ?, ?, ?, ?, ?, 0, ?)";
    sqlx::query(SQL)
        .bind(event_id)
        .bind(operation.as_str())
        .bind(target_url)
        .bind(source_calendar_id)
        .bind(target_calendar_id)
        .bind(move_phase.map(|p| p as i64))
        .bind(now)
        .execute(&mut **tx)
        .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localdb::LocalDb;
    use crate::model::Provider;

    async fn event(db: &LocalDb) -> i64 {
        let account_id = db.accounts.insert(Provider::Caldav, "a@example.com", "A").await.unwrap();
        let calendar_id = db.calendars.insert(account_id, "https://example.com/dav/p/", "P", 0, false).await.unwrap();
        let event = crate::localdb::events::new_event("e1".into(), calendar_id, "Standup".into(), 0, 0, "20260101T000000Z".into());
        db.events.upsert(&event).await.unwrap()
    }

    #[tokio::test]
    async fn create_then_update_conflates_to_create() {
        let db = LocalDb::open(None).await.unwrap();
        let event_id = event(&db).await;
        db.pending_ops.enqueue(event_id, OperationKind::Create, None, None, None, None, 0).await.unwrap();
        db.pending_ops.enqueue(event_id, OperationKind::Update, None, None, None, None, 1).await.unwrap();

        let ops = db.pending_ops.list_for_event(event_id).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation, OperationKind::Create);
    }

    #[tokio::test]
    async fn create_then_delete_conflates_to_empty() {
        let db = LocalDb::open(None).await.unwrap();
        let event_id = event(&db).await;
        db.pending_ops.enqueue(event_id, OperationKind::Create, None, None, None, None, 0).await.unwrap();
        db.pending_ops.enqueue(event_id, OperationKind::Delete, Some("https://example.com/e1.ics"), None, None, None, 1).await.unwrap();

        assert!(db.pending_ops.list_for_event(event_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn update_then_delete_conflates_to_delete() {
        let db = LocalDb::open(None).await.unwrap();
        let event_id = event(&db).await;
        db.pending_ops.enqueue(event_id, OperationKind::Update, None, None, None, None, 0).await.unwrap();
        db.pending_ops.enqueue(event_id, OperationKind::Delete, Some("https://example.com/e1.ics"), None, None, None, 1).await.unwrap();

        let ops = db.pending_ops.list_for_event(event_id).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation, OperationKind::Delete);
    }

    #[tokio::test]
    async fn move_never_conflates() {
        let db = LocalDb::open(None).await.unwrap();
        let event_id = event(&db).await;
        db.pending_ops.enqueue(event_id, OperationKind::Update, None, None, None, None, 0).await.unwrap();
        db.pending_ops.enqueue(event_id, OperationKind::Move, Some("https://example.com/e1.ics"), Some(1), Some(2), Some(MovePhase::Delete), 1).await.unwrap();

        assert_eq!(db.pending_ops.list_for_event(event_id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn record_failure_poisons_at_retry_cap() {
        let db = LocalDb::open(None).await.unwrap();
        let event_id = event(&db).await;
        db.pending_ops.enqueue(event_id, OperationKind::Create, None, None, None, None, 0).await.unwrap();
        let ops = db.pending_ops.list_for_event(event_id).await.unwrap();
        let id = ops[0].id;

        for _ in 0..9 {
            let poisoned = db.pending_ops.record_failure(id, 0, "network", 10).await.unwrap();
            assert!(!poisoned);
        }
        let poisoned = db.pending_ops.record_failure(id, 0, "network", 10).await.unwrap();
        assert!(poisoned);
    }

    #[test]
    fn backoff_never_exceeds_one_hour() {
        assert!(backoff_delay_millis(20) <= MAX_BACKOFF_MILLIS);
        assert_eq!(backoff_delay_millis(0).min(BASE_BACKOFF_MILLIS), backoff_delay_millis(0));
    }
}
