// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! `Event` DAO (spec §3 `Event`, §4.6/§4.9 upsert paths).

use std::collections::BTreeMap;

use calsync_ical::{Classification, EventStatusValue};
use sqlx::SqlitePool;

use crate::model::{Event, SyncStatus, TimestampMillis};

#[derive(Debug, sqlx::FromRow)]
struct EventRow {
    id: i64,
    uid: String,
    calendar_id: i64,
    title: String,
    start_ts: i64,
    end_ts: i64,
    is_all_day: bool,
    timezone: Option<String>,
    rrule: Option<String>,
    exdate: Option<String>,
    caldav_url: Option<String>,
    etag: Option<String>,
    dtstamp: String,
    sequence: i64,
    status: Option<String>,
    classification: String,
    reminders: Option<String>,
    extra_properties: Option<String>,
    raw_ical: Option<String>,
    sync_status: String,
    original_event_id: Option<i64>,
    original_instance_time: Option<i64>,
}

impl EventRow {
    fn into_event(self) -> Event {
        Event {
            id: self.id,
            uid: self.uid,
            calendar_id: self.calendar_id,
            title: self.title,
            start_ts: self.start_ts,
            end_ts: self.end_ts,
            is_all_day: self.is_all_day,
            timezone: self.timezone,
            rrule: self.rrule,
            exdate: self.exdate.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default(),
            caldav_url: self.caldav_url,
            etag: self.etag,
            dtstamp: self.dtstamp,
            sequence: self.sequence,
            status: self.status.and_then(|s| EventStatusValue::parse(&s)),
            classification: Classification::parse(&self.classification),
            reminders: self.reminders.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default(),
            extra_properties: self.extra_properties.and_then(|s| serde_json::from_str(&s).ok()).unwrap_or_default(),
            raw_ical: self.raw_ical,
            sync_status: SyncStatus::parse(&self.sync_status).unwrap_or(SyncStatus::Synced),
            original_event_id: self.original_event_id,
            original_instance_time: self.original_instance_time,
        }
    }
}

const SELECT_COLUMNS: &str = "
id, uid, calendar_id, title, start_ts, end_ts, is_all_day, timezone, rrule, exdate,
caldav_url, etag, dtstamp, sequence, status, classification, reminders, extra_properties,
raw_ical, sync_status, original_event_id, original_instance_time";

/// DAO over the `events` table.
#[derive(Debug, Clone)]
pub struct Events {
    pool: SqlitePool,
}

impl Events {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts or fully replaces an event row, keyed on `id` (`0` inserts,
    /// any other value expects the row to exist).
    ///
    /// # Errors
    ///
    /// Propagates `sqlx::Error::Database` for a foreign-key violation so
    /// callers can apply the §4.6 "FK-violation isolation" policy.
    pub async fn upsert(&self, event: &Event) -> Result<i64, sqlx::Error> {
        let exdate = serde_json::to_string(&event.exdate).unwrap_or_default();
        let reminders = serde_json::to_string(&event.reminders).unwrap_or_default();
        let extra_properties = serde_json::to_string(&event.extra_properties).unwrap_or_default();

        if event.id == 0 {
            const SQL: &str = "
INSERT INTO events (
    uid, calendar_id, title, start_ts, end_ts, is_all_day, timezone, rrule, exdate,
    caldav_url, etag, dtstamp, sequence, status, classification, reminders, extra_properties,
    raw_ical, sync_status, original_event_id, original_instance_time
) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)";
            let result = bind_event_fields(sqlx::query(SQL), event, &exdate, &reminders, &extra_properties)
                .execute(&self.pool)
                .await?;
            Ok(result.last_insert_rowid())
        } else {
            const SQL: &str = "
UPDATE events SET
    uid = ?, calendar_id = ?, title = ?, start_ts = ?, end_ts = ?, is_all_day = ?, timezone = ?,
    rrule = ?, exdate = ?, caldav_url = ?, etag = ?, dtstamp = ?, sequence = ?, status = ?,
    classification = ?, reminders = ?, extra_properties = ?, raw_ical = ?, sync_status = ?,
    original_event_id = ?, original_instance_time = ?
WHERE id = ?";
            bind_event_fields(sqlx::query(SQL), event, &exdate, &reminders, &extra_properties)
                .bind(event.id)
                .execute(&self.pool)
                .await?;
            Ok(event.id)
        }
    }

    /// Fetches an event by row id.
    pub async fn get(&self, id: i64) -> Result<Option<Event>, sqlx::Error> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM events WHERE id = ?");
        let row: Option<EventRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(EventRow::into_event))
    }

    /// Looks up the master (or the exception itself) by `(uid, calendarId)`
    /// (spec §4.6 processEvent step 1, primary lookup).
    pub async fn find_by_uid(&self, uid: &str, calendar_id: i64) -> Result<Option<Event>, sqlx::Error> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM events WHERE uid = ? AND calendar_id = ? AND original_event_id IS NULL");
        let row: Option<EventRow> = sqlx::query_as(&sql).bind(uid).bind(calendar_id).fetch_optional(&self.pool).await?;
        Ok(row.map(EventRow::into_event))
    }

    /// Looks up an event by its server href (spec §4.6 processEvent step 1,
    /// fallback lookup for a server-side UID rewrite).
    pub async fn find_by_caldav_url(&self, calendar_id: i64, caldav_url: &str) -> Result<Option<Event>, sqlx::Error> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM events WHERE calendar_id = ? AND caldav_url = ?");
        let row: Option<EventRow> = sqlx::query_as(&sql).bind(calendar_id).bind(caldav_url).fetch_optional(&self.pool).await?;
        Ok(row.map(EventRow::into_event))
    }

    /// Lists every event in `calendar_id` with `startTs` in `[from, to]`
    /// (spec §4.6 pullFull "enumerate local events in the same range").
    pub async fn list_in_range(&self, calendar_id: i64, from: TimestampMillis, to: TimestampMillis) -> Result<Vec<Event>, sqlx::Error> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM events WHERE calendar_id = ? AND start_ts BETWEEN ? AND ?");
        let rows: Vec<EventRow> = sqlx::query_as(&sql).bind(calendar_id).bind(from).bind(to).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(EventRow::into_event).collect())
    }

    /// Lists exceptions linked to `master_id`.
    pub async fn list_exceptions(&self, master_id: i64) -> Result<Vec<Event>, sqlx::Error> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM events WHERE original_event_id = ?");
        let rows: Vec<EventRow> = sqlx::query_as(&sql).bind(master_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(EventRow::into_event).collect())
    }

    /// Hard-deletes an event row (spec §4.7 `DELETE` "hard-delete the
    /// local row").
    pub async fn delete(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM events WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// Sets `sync_status` alone (spec §3 `SyncStatus` transitions).
    pub async fn set_sync_status(&self, id: i64, status: SyncStatus) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE events SET sync_status = ? WHERE id = ?").bind(status.as_str()).bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// Sets `caldav_url`/`etag` together, e.g. after a successful create,
    /// update, or phase-1 move (spec §4.7).
    pub async fn set_remote_identity(&self, id: i64, caldav_url: &str, etag: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE events SET caldav_url = ?, etag = ? WHERE id = ?").bind(caldav_url).bind(etag).bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// Clears `raw_ical` back to `NULL` (spec §9 Open Question, resolved as
    /// a `clear_raw_ical_on_push` feature switch: when enabled, a
    /// successfully-pushed event drops its cached original body rather
    /// than keep patching against server text the push just superseded;
    /// the following pull repopulates it from the server's own response).
    pub async fn clear_raw_ical(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE events SET raw_ical = NULL WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// Refreshes `caldav_url`/`etag`/`raw_ical` from the server without
    /// touching any locally-edited structured field (spec §4.7 `UPDATE`
    /// conflict handling). Used when a pull notices a conflicted pending op
    /// (`PendingOps::has_conflicted_op`) so the next push retry has a
    /// current etag to patch against instead of the stale one that just
    /// lost a `409`/`412`.
    pub async fn refresh_remote_copy(&self, id: i64, caldav_url: &str, etag: &str, raw_ical: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE events SET caldav_url = ?, etag = ?, raw_ical = ? WHERE id = ?")
            .bind(caldav_url)
            .bind(etag)
            .bind(raw_ical)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Clears `caldav_url`/`etag` back to `NULL`, e.g. when a MOVE
    /// pending-op has captured the old href and the event now awaits a
    /// fresh remote identity from the target collection (spec §8 S3 "the
    /// event row has ... caldavUrl == null, etag == null").
    pub async fn clear_remote_identity(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE events SET caldav_url = NULL, etag = NULL WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// Moves an event (and, transactionally, its exceptions) to
    /// `target_calendar_id` (spec §4.9 "moving a master also moves its
    /// linked exceptions in the same DB transaction").
    pub async fn reparent(&self, id: i64, target_calendar_id: i64) -> Result<(), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("UPDATE events SET calendar_id = ? WHERE id = ?").bind(target_calendar_id).bind(id).execute(&mut *tx).await?;
        sqlx::query("UPDATE events SET calendar_id = ? WHERE original_event_id = ?").bind(target_calendar_id).bind(id).execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}

#[allow(clippy::type_complexity)]
fn bind_event_fields<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    event: &'q Event,
    exdate: &'q str,
    reminders: &'q str,
    extra_properties: &'q str,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(&event.uid)
        .bind(event.calendar_id)
        .bind(&event.title)
        .bind(event.start_ts)
        .bind(event.end_ts)
        .bind(event.is_all_day)
        .bind(&event.timezone)
        .bind(&event.rrule)
        .bind(exdate)
        .bind(&event.caldav_url)
        .bind(&event.etag)
        .bind(&event.dtstamp)
        .bind(event.sequence)
        .bind(event.status.map(EventStatusValue::as_str))
        .bind(event.classification.as_str())
        .bind(reminders)
        .bind(extra_properties)
        .bind(&event.raw_ical)
        .bind(event.sync_status.as_str())
        .bind(event.original_event_id)
        .bind(event.original_instance_time)
}

/// Builds a fresh [`Event`] with row id `0` (not yet inserted) and
/// [`SyncStatus::Synced`], the shape [`Events::upsert`] expects for a new
/// master pulled from the server.
#[must_use]
pub fn new_event(uid: String, calendar_id: i64, title: String, start_ts: TimestampMillis, end_ts: TimestampMillis, dtstamp: String) -> Event {
    Event {
        id: 0,
        uid,
        calendar_id,
        title,
        start_ts,
        end_ts,
        is_all_day: false,
        timezone: None,
        rrule: None,
        exdate: Vec::new(),
        caldav_url: None,
        etag: None,
        dtstamp,
        sequence: 0,
        status: None,
        classification: Classification::Public,
        reminders: Vec::new(),
        extra_properties: BTreeMap::new(),
        raw_ical: None,
        sync_status: SyncStatus::Synced,
        original_event_id: None,
        original_instance_time: None,
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
    async fn insert_then_find_by_uid_round_trips() {
        let db = LocalDb::open(None).await.unwrap();
        let calendar_id = calendar(&db).await;
        let event = new_event("e1".into(), calendar_id, "Standup".into(), 1000, 2000, "20260101T000000Z".into());
        let id = db.events.upsert(&event).await.unwrap();

        let found = db.events.find_by_uid("e1", calendar_id).await.unwrap().unwrap();
        assert_eq!(found.id, id);
        assert_eq!(found.title, "Standup");
        assert_eq!(found.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn reparent_moves_master_and_exceptions_together() {
        let db = LocalDb::open(None).await.unwrap();
        let source = calendar(&db).await;
        let account_id = db.accounts.insert(Provider::Caldav, "b@example.com", "B").await.unwrap();
        let target = db.calendars.insert(account_id, "https://example.com/dav/q/", "Q", 0, false).await.unwrap();

        let master = new_event("m1".into(), source, "Weekly".into(), 1000, 2000, "20260101T000000Z".into());
        let master_id = db.events.upsert(&master).await.unwrap();

        let mut exception = new_event("m1".into(), source, "Weekly (moved)".into(), 1500, 2500, "20260102T000000Z".into());
        exception.original_event_id = Some(master_id);
        exception.original_instance_time = Some(1000);
        db.events.upsert(&exception).await.unwrap();

        db.events.reparent(master_id, target).await.unwrap();

        let moved_master = db.events.get(master_id).await.unwrap().unwrap();
        assert_eq!(moved_master.calendar_id, target);
        let exceptions = db.events.list_exceptions(master_id).await.unwrap();
        assert_eq!(exceptions.len(), 1);
        assert_eq!(exceptions[0].calendar_id, target);
    }

    #[tokio::test]
    async fn upsert_rejects_unknown_calendar_with_fk_violation() {
        let db = LocalDb::open(None).await.unwrap();
        let event = new_event("e1".into(), 999, "X".into(), 0, 0, "20260101T000000Z".into());
        let err = db.events.upsert(&event).await.unwrap_err();
        assert!(matches!(err, sqlx::Error::Database(_)));
    }
}
