// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Local event mutation, the only path that creates/updates/deletes/moves
//! an [`Event`] row and enqueues the [`crate::model::PendingOperation`]
//! that follows from it (spec §4.9 `EventWriter`).

use crate::error::CoreError;
use crate::localdb::LocalDb;
use crate::model::{Account, Event, MovePhase, OperationKind, Provider, SyncStatus, TimestampMillis};

/// Local event mutation, backed by one [`LocalDb`].
///
/// Every method here is the one place [`crate::model::PendingOperation`]
/// rows get created — [`crate::pull::PullStrategy`] never enqueues one (the
/// server is authoritative there) and [`crate::push::PushStrategy`] only
/// consumes the queue this produces.
#[derive(Debug)]
pub struct EventWriter<'a> {
    db: &'a LocalDb,
}

impl<'a> EventWriter<'a> {
    /// Builds a writer over `db`.
    #[must_use]
    pub const fn new(db: &'a LocalDb) -> Self {
        Self { db }
    }

    /// Inserts a brand-new event (spec §4.9 "create"), enqueuing `CREATE`
    /// unless the owning calendar is purely local.
    pub async fn create(&self, mut event: Event, now: TimestampMillis) -> Result<Event, CoreError> {
        self.reject_read_only(event.calendar_id).await?;

        event.id = 0;
        let is_local = self.is_local_calendar(event.calendar_id).await?;
        event.sync_status = if is_local { SyncStatus::Synced } else { SyncStatus::PendingCreate };
        let id = self.db.events.upsert(&event).await?;
        event.id = id;

        if !is_local {
            self.db.pending_ops.enqueue(id, OperationKind::Create, None, None, None, None, now).await?;
        }
        Ok(event)
    }

    /// Applies an in-place field edit to an existing event (spec §4.9
    /// "update"), enqueuing `UPDATE` unless the owning calendar is purely
    /// local. A pending create or delete for the same event conflates per
    /// [`crate::localdb::PendingOps::enqueue`] rather than stacking a second
    /// op.
    pub async fn update(&self, mut event: Event, now: TimestampMillis) -> Result<Event, CoreError> {
        self.reject_read_only(event.calendar_id).await?;

        let is_local = self.is_local_calendar(event.calendar_id).await?;
        if !is_local && event.sync_status == SyncStatus::Synced {
            event.sync_status = SyncStatus::PendingUpdate;
        }
        self.db.events.upsert(&event).await?;

        if !is_local {
            self.db.pending_ops.enqueue(event.id, OperationKind::Update, None, None, None, None, now).await?;
        }
        Ok(event)
    }

    /// Removes an event (spec §4.9 "delete"). A never-synced local-only
    /// create (no `caldav_url` yet) is hard-deleted immediately rather than
    /// round-tripping a `CREATE` it would only have to cancel.
    pub async fn delete(&self, event_id: i64, now: TimestampMillis) -> Result<(), CoreError> {
        let event = self.get_event(event_id).await?;
        self.reject_read_only(event.calendar_id).await?;

        let is_local = self.is_local_calendar(event.calendar_id).await?;
        if is_local || event.caldav_url.is_none() {
            self.db.events.delete(event_id).await?;
            return Ok(());
        }

        self.db.pending_ops.enqueue(event_id, OperationKind::Delete, event.caldav_url.as_deref(), None, None, None, now).await?;
        self.db.events.set_sync_status(event_id, SyncStatus::PendingDelete).await?;
        Ok(())
    }

    /// Moves an event between calendars (spec §4.9 "move"), classifying the
    /// transition by whether the source/target calendars are purely local
    /// and, when neither is, whether they share an account:
    ///
    /// - same calendar: no-op.
    /// - local → local: reparent only, no pending op.
    /// - local → synced: reparent, mark `PENDING_CREATE`, enqueue `CREATE`.
    /// - synced → local: enqueue `DELETE` against the captured source href
    ///   (spec §3 "captured before local state mutates"), reparent, mark
    ///   `SYNCED` (the event no longer needs further sync once local).
    /// - same non-local account: enqueue a single `MOVE` op (phase `DELETE`
    ///   first, spec §4.7 two-phase), reparent eagerly but mark
    ///   `PENDING_UPDATE` so an in-flight pull of either calendar skips it
    ///   (spec §4.6 `processEvent` "skip if syncStatus != SYNCED") until
    ///   [`crate::push::PushStrategy`] lands phase 1 and marks it `SYNCED`.
    ///   `caldav_url`/`etag` are cleared on the row once the old href is
    ///   captured in the op (spec §8 S3 "the event row has ... caldavUrl
    ///   == null, etag == null").
    /// - different non-local accounts: materialized as independent `CREATE`
    ///   + `DELETE` ops at enqueue time (spec §4.9 "always materialized as
    ///   separate CREATE+DELETE"); `caldav_url`/`etag` are cleared the same
    ///   way since the source href is now owned solely by the `DELETE` op.
    ///
    /// Exceptions never move individually: moving a master moves its linked
    /// exceptions transactionally via [`crate::localdb::Events::reparent`],
    /// with no separate pending ops created for them (spec §4.9).
    pub async fn move_event(&self, event_id: i64, target_calendar_id: i64, now: TimestampMillis) -> Result<Event, CoreError> {
        let event = self.get_event(event_id).await?;
        if event.calendar_id == target_calendar_id {
            return Ok(event);
        }
        self.reject_read_only(target_calendar_id).await?;

        let source_calendar_id = event.calendar_id;
        let captured_url = event.caldav_url.clone();
        let source_local = self.is_local_calendar(source_calendar_id).await?;
        let target_local = self.is_local_calendar(target_calendar_id).await?;

        if source_local && target_local {
            self.db.events.reparent(event_id, target_calendar_id).await?;
        } else if source_local {
            self.db.events.reparent(event_id, target_calendar_id).await?;
            self.db.events.set_sync_status(event_id, SyncStatus::PendingCreate).await?;
            self.db.pending_ops.enqueue(event_id, OperationKind::Create, None, None, None, None, now).await?;
        } else if target_local {
            self.db
                .pending_ops
                .enqueue(event_id, OperationKind::Delete, captured_url.as_deref(), Some(source_calendar_id), None, None, now)
                .await?;
            self.db.events.reparent(event_id, target_calendar_id).await?;
            self.db.events.set_sync_status(event_id, SyncStatus::Synced).await?;
        } else {
            let source_account = self.account_for_calendar(source_calendar_id).await?;
            let target_account = self.account_for_calendar(target_calendar_id).await?;

            if source_account.id == target_account.id {
                self.db
                    .pending_ops
                    .enqueue(
                        event_id,
                        OperationKind::Move,
                        captured_url.as_deref(),
                        Some(source_calendar_id),
                        Some(target_calendar_id),
                        Some(MovePhase::Delete),
                        now,
                    )
                    .await?;
                self.db.events.reparent(event_id, target_calendar_id).await?;
                self.db.events.clear_remote_identity(event_id).await?;
                self.db.events.set_sync_status(event_id, SyncStatus::PendingUpdate).await?;
            } else {
                self.db.pending_ops.enqueue(event_id, OperationKind::Create, None, None, None, None, now).await?;
                self.db
                    .pending_ops
                    .enqueue(event_id, OperationKind::Delete, captured_url.as_deref(), Some(source_calendar_id), None, None, now)
                    .await?;
                self.db.events.reparent(event_id, target_calendar_id).await?;
                self.db.events.clear_remote_identity(event_id).await?;
                self.db.events.set_sync_status(event_id, SyncStatus::PendingCreate).await?;
            }
        }

        self.get_event(event_id).await
    }

    async fn get_event(&self, event_id: i64) -> Result<Event, CoreError> {
        self.db.events.get(event_id).await?.ok_or_else(|| CoreError::Other(format!("event {event_id} not found")))
    }

    async fn reject_read_only(&self, calendar_id: i64) -> Result<(), CoreError> {
        let calendar =
            self.db.calendars.get(calendar_id).await?.ok_or_else(|| CoreError::Other(format!("calendar {calendar_id} not found")))?;
        if calendar.is_read_only {
            return Err(CoreError::Other(format!("calendar {calendar_id} is read-only")));
        }
        Ok(())
    }

    async fn is_local_calendar(&self, calendar_id: i64) -> Result<bool, CoreError> {
        Ok(matches!(self.account_for_calendar(calendar_id).await?.provider, Provider::Local))
    }

    async fn account_for_calendar(&self, calendar_id: i64) -> Result<Account, CoreError> {
        let calendar =
            self.db.calendars.get(calendar_id).await?.ok_or_else(|| CoreError::Other(format!("calendar {calendar_id} not found")))?;
        self.db.accounts.get(calendar.account_id).await?.ok_or_else(|| CoreError::Other(format!("account {} not found", calendar.account_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localdb::{new_event, LocalDb};
    use crate::model::OperationKind;

    async fn setup() -> (LocalDb, i64, i64) {
        let db = LocalDb::open(None).await.unwrap();
        let account_id = db.accounts.insert(Provider::Caldav, "a@example.com", "A").await.unwrap();
        let calendar_id = db.calendars.insert(account_id, "https://example.com/dav/p/", "P", 0, false).await.unwrap();
        (db, account_id, calendar_id)
    }

    #[tokio::test]
    async fn create_in_remote_calendar_marks_pending_create_and_enqueues() {
        let (db, _account_id, calendar_id) = setup().await;
        let writer = EventWriter::new(&db);
        let draft = new_event("e1".into(), calendar_id, "Standup".into(), 0, 0, "20260101T000000Z".into());

        let created = writer.create(draft, 0).await.unwrap();
        assert_eq!(created.sync_status, SyncStatus::PendingCreate);

        let ops = db.pending_ops.list_for_event(created.id).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation, OperationKind::Create);
    }

    #[tokio::test]
    async fn create_in_local_calendar_stays_synced_with_no_pending_op() {
        let db = LocalDb::open(None).await.unwrap();
        let account_id = db.accounts.insert(Provider::Local, "local@device", "Local").await.unwrap();
        let calendar_id = db.calendars.insert(account_id, "local://", "Local", 0, false).await.unwrap();
        let writer = EventWriter::new(&db);
        let draft = new_event("e1".into(), calendar_id, "Standup".into(), 0, 0, "20260101T000000Z".into());

        let created = writer.create(draft, 0).await.unwrap();
        assert_eq!(created.sync_status, SyncStatus::Synced);
        assert!(db.pending_ops.list_for_event(created.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_never_synced_event_hard_deletes_without_pending_op() {
        let (db, _account_id, calendar_id) = setup().await;
        let writer = EventWriter::new(&db);
        let draft = new_event("e1".into(), calendar_id, "Standup".into(), 0, 0, "20260101T000000Z".into());
        let created = writer.create(draft, 0).await.unwrap();

        writer.delete(created.id, 0).await.unwrap();
        assert!(db.events.get(created.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn write_to_read_only_calendar_is_rejected() {
        let db = LocalDb::open(None).await.unwrap();
        let account_id = db.accounts.insert(Provider::Caldav, "a@example.com", "A").await.unwrap();
        let calendar_id = db.calendars.insert(account_id, "https://example.com/dav/p/", "P", 0, true).await.unwrap();
        let writer = EventWriter::new(&db);
        let draft = new_event("e1".into(), calendar_id, "Standup".into(), 0, 0, "20260101T000000Z".into());

        assert!(writer.create(draft, 0).await.is_err());
    }

    #[tokio::test]
    async fn move_between_remote_calendars_in_same_account_enqueues_single_move() {
        let (db, account_id, source) = setup().await;
        let target = db.calendars.insert(account_id, "https://example.com/dav/q/", "Q", 0, false).await.unwrap();
        let writer = EventWriter::new(&db);
        let mut draft = new_event("e1".into(), source, "Standup".into(), 0, 0, "20260101T000000Z".into());
        draft.caldav_url = Some("https://example.com/dav/p/e1.ics".into());
        draft.etag = Some("\"1\"".into());
        let created = db.events.upsert(&draft).await.unwrap();
        db.events.set_remote_identity(created, "https://example.com/dav/p/e1.ics", "\"1\"").await.unwrap();

        let moved = writer.move_event(created, target, 0).await.unwrap();
        assert_eq!(moved.calendar_id, target);
        assert_eq!(moved.sync_status, SyncStatus::PendingUpdate);
        assert_eq!(moved.caldav_url, None);
        assert_eq!(moved.etag, None);

        let ops = db.pending_ops.list_for_event(created).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].operation, OperationKind::Move);
        assert_eq!(ops[0].move_phase, Some(MovePhase::Delete));
        assert_eq!(ops[0].target_url.as_deref(), Some("https://example.com/dav/p/e1.ics"));
        assert_eq!(ops[0].source_calendar_id, Some(source));
        assert_eq!(ops[0].target_calendar_id, Some(target));
    }

    #[tokio::test]
    async fn move_to_different_account_enqueues_create_and_delete() {
        let (db, _account_id, source) = setup().await;
        let other_account = db.accounts.insert(Provider::Caldav, "b@example.com", "B").await.unwrap();
        let target = db.calendars.insert(other_account, "https://example.com/dav/q/", "Q", 0, false).await.unwrap();
        let writer = EventWriter::new(&db);
        let mut draft = new_event("e1".into(), source, "Standup".into(), 0, 0, "20260101T000000Z".into());
        draft.caldav_url = Some("https://example.com/dav/p/e1.ics".into());
        let created = db.events.upsert(&draft).await.unwrap();

        writer.move_event(created, target, 0).await.unwrap();

        let ops = db.pending_ops.list_for_event(created).await.unwrap();
        assert_eq!(ops.len(), 2);
        assert!(ops.iter().any(|o| o.operation == OperationKind::Create));
        assert!(ops.iter().any(|o| o.operation == OperationKind::Delete && o.source_calendar_id == Some(source)));
    }
}
