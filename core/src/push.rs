// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Drains the pending-operation queue for one calendar against the server
//! (spec §4.7).

use std::collections::HashSet;

use calsync_caldav::{CalDavClient, CalDavError, ETag, Href, Quirks};

use crate::config::SyncConfig;
use crate::error::CoreError;
use crate::ics::{self, PushFields};
use crate::localdb::LocalDb;
use crate::model::{Calendar, Event, MovePhase, OperationKind, PendingOperation, SyncStatus, TimestampMillis};

/// Outcome of one push cycle: the event ids successfully mutated remotely,
/// fed to the following pull as `recentlyPushedEventIds` (spec §4.7, §4.8).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushOutcome {
    /// Ids of events a CREATE/UPDATE/MOVE landed for this cycle.
    pub touched_event_ids: HashSet<i64>,
    /// Ids of pending operations that exhausted `retryCap` this cycle
    /// (spec §7 "Poisoned op"); a non-empty set fails the owning session
    /// (spec §4.8 "a retryable transport error after the retry cap is
    /// FAILED").
    pub poisoned_op_ids: HashSet<i64>,
}

/// What one dequeued op did, short of propagating an error.
enum ExecuteResult {
    /// The op landed; its event counts toward `recentlyPushedEventIds`.
    Touched,
    /// The op is still pending (retry scheduled, conflicted, or advanced to
    /// its next `MOVE` phase).
    Skipped,
    /// The op exhausted its retry cap this attempt.
    Poisoned,
}

/// Pushes one calendar's pending operations to the server (spec §4.7).
pub struct PushStrategy<'a> {
    db: &'a LocalDb,
    client: &'a dyn CalDavClient,
    quirks: &'a dyn Quirks,
    config: &'a SyncConfig,
}

impl<'a> PushStrategy<'a> {
    /// Builds a strategy over one calendar's collaborators.
    #[must_use]
    pub const fn new(db: &'a LocalDb, client: &'a dyn CalDavClient, quirks: &'a dyn Quirks, config: &'a SyncConfig) -> Self {
        Self { db, client, quirks, config }
    }

    /// Drains every ready pending operation for `calendar` (spec §4.7
    /// "Dequeue loop"): ops with `nextRetryAt <= now` and `retryCount < CAP`,
    /// selected by `effectiveCalendarId` (spec §4.5). Pending operations for
    /// the same event are serialized one at a time; operations on different
    /// events run in the order the queue returns them (spec §5 "pending
    /// operations for the same event are serialized").
    ///
    /// A transient error bumps the op's retry counter and continues with
    /// the next op. An auth error (`401`/`403`) stops the whole cycle
    /// immediately and propagates (spec §4.7 "on auth error, stop the whole
    /// push cycle for this calendar and surface").
    #[tracing::instrument(skip(self, calendar), fields(calendar_id = calendar.id))]
    pub async fn push(&self, calendar: &Calendar, now: TimestampMillis) -> Result<PushOutcome, CoreError> {
        let ops = self.db.pending_ops.list_ready_for_calendar(calendar.id, now).await?;
        let mut outcome = PushOutcome::default();

        for op in ops {
            match self.execute(calendar, &op, now).await {
                Ok(ExecuteResult::Touched) => {
                    outcome.touched_event_ids.insert(op.event_id);
                }
                Ok(ExecuteResult::Skipped) => {}
                Ok(ExecuteResult::Poisoned) => {
                    outcome.poisoned_op_ids.insert(op.id);
                }
                Err(CoreError::CalDav(e)) if e.is_auth() => {
                    tracing::error!(op_id = op.id, error = %e, "auth error, stopping push cycle");
                    return Err(CoreError::CalDav(e));
                }
                Err(e) => return Err(e),
            }
        }
        Ok(outcome)
    }

    /// Runs one op, absorbing non-auth `CalDavError`s into the queue's
    /// retry/conflict state rather than propagating them (spec §4.7
    /// "Retry" / "On `Conflict` ... leave op in place with a conflict
    /// flag").
    async fn execute(&self, calendar: &Calendar, op: &PendingOperation, now: TimestampMillis) -> Result<ExecuteResult, CoreError> {
        let Some(event) = self.db.events.get(op.event_id).await? else {
            // The local row is gone (e.g. a since-cancelled create); the op
            // has nothing left to act on.
            self.db.pending_ops.delete(op.id).await?;
            return Ok(ExecuteResult::Skipped);
        };

        let result = match op.operation {
            OperationKind::Create => self.push_create(calendar, op, &event).await,
            OperationKind::Update => self.push_update(op, &event).await,
            OperationKind::Delete => self.push_delete(op).await,
            OperationKind::Move => self.push_move(calendar, op, &event).await,
        };

        match result {
            Ok(true) => Ok(ExecuteResult::Touched),
            Ok(false) => Ok(ExecuteResult::Skipped),
            Err(CoreError::CalDav(e)) if op.operation == OperationKind::Update && matches!(e, CalDavError::Conflict(_)) => {
                // The next pull refreshes this event's etag/raw_ical once it
                // notices `is_conflicted` (pull.rs::upsert), letting a later
                // push retry resolve it instead of replaying the same stale
                // etag every cycle.
                tracing::info!(op_id = op.id, event_id = op.event_id, "update conflicted, backing off for next pull to refresh etag");
                self.db.pending_ops.mark_conflicted(op.id, now).await?;
                Ok(ExecuteResult::Skipped)
            }
            Err(CoreError::CalDav(e)) if e.is_auth() => Err(CoreError::CalDav(e)),
            Err(CoreError::CalDav(e)) => {
                let poisoned = self.db.pending_ops.record_failure(op.id, now, &e.to_string(), self.config.retry_cap).await?;
                if poisoned {
                    tracing::warn!(op_id = op.id, event_id = op.event_id, error = %e, "pending operation poisoned at retry cap");
                    Ok(ExecuteResult::Poisoned)
                } else {
                    tracing::warn!(op_id = op.id, event_id = op.event_id, error = %e, "push failed, will retry");
                    Ok(ExecuteResult::Skipped)
                }
            }
            Err(e) => Err(e),
        }
    }

    async fn push_create(&self, calendar: &Calendar, op: &PendingOperation, event: &Event) -> Result<bool, CoreError> {
        let ics = self.serialize(event, None)?;
        let (href, etag) = self.client.create_event(&calendar.caldav_url, &event.uid, &ics).await?;
        let url = self.quirks.build_event_url(&calendar.caldav_url, href.as_str());
        self.db.events.set_remote_identity(event.id, &url, etag.as_str()).await?;
        self.db.events.set_sync_status(event.id, SyncStatus::Synced).await?;
        self.maybe_clear_raw_ical(event.id).await?;
        self.db.pending_ops.delete(op.id).await?;
        Ok(true)
    }

    async fn push_update(&self, op: &PendingOperation, event: &Event) -> Result<bool, CoreError> {
        let Some(url) = event.caldav_url.clone() else {
            return Err(CoreError::Other(format!("event {} has no caldav_url to update", event.id)));
        };
        let href = Href::new(url);
        let ics = self.serialize(event, None)?;
        let etag = current_etag(event);
        let new_etag = self.client.update_event(&href, &ics, &etag).await?;
        self.db.events.set_remote_identity(event.id, href.as_str(), new_etag.as_str()).await?;
        self.db.events.set_sync_status(event.id, SyncStatus::Synced).await?;
        self.maybe_clear_raw_ical(event.id).await?;
        self.db.pending_ops.delete(op.id).await?;
        Ok(true)
    }

    /// Applies `SyncConfig::clear_raw_ical_on_push` after a successful
    /// create/update (spec §9 Open Question on `rawIcal` clearing).
    async fn maybe_clear_raw_ical(&self, event_id: i64) -> Result<(), CoreError> {
        if self.config.clear_raw_ical_on_push {
            self.db.events.clear_raw_ical(event_id).await?;
        }
        Ok(())
    }

    /// `DELETE` (spec §4.7 "`NotFound` is treated as success"). The event
    /// row is hard-deleted; a pending delete never leaves a tombstone
    /// behind once it lands.
    async fn push_delete(&self, op: &PendingOperation) -> Result<bool, CoreError> {
        let Some(url) = op.target_url.as_deref() else {
            // Never had a remote identity; nothing to delete remotely.
            self.db.events.delete(op.event_id).await?;
            self.db.pending_ops.delete(op.id).await?;
            return Ok(false);
        };
        let href = Href::new(url.to_string());
        let etag = self.db.events.get(op.event_id).await?.map(|e| current_etag(&e)).unwrap_or_else(|| ETag::new(String::new()));

        match self.client.delete_event(&href, &etag).await {
            Ok(()) | Err(CalDavError::NotFound(_)) => {
                self.db.events.delete(op.event_id).await?;
                self.db.pending_ops.delete(op.id).await?;
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// `MOVE` (spec §4.7 "same account"): a native `MOVE` in one shot when
    /// [`Quirks::supports_native_move`] says the server honors it, else the
    /// two-phase DELETE-then-CREATE fallback. A server that falsely
    /// advertises `MOVE` support and rejects it mid-flight
    /// ([`CalDavError::UnsupportedCapability`]) falls through to phase 0 of
    /// the two-phase path rather than failing the whole op.
    async fn push_move(&self, calendar: &Calendar, op: &PendingOperation, event: &Event) -> Result<bool, CoreError> {
        if self.quirks.supports_native_move() && op.move_phase == Some(MovePhase::Delete) {
            match self.push_move_native(calendar, op, event).await {
                Ok(touched) => return Ok(touched),
                Err(CoreError::CalDav(CalDavError::UnsupportedCapability(reason))) => {
                    tracing::info!(op_id = op.id, reason, "server rejected native MOVE, falling back to two-phase");
                }
                Err(e) => return Err(e),
            }
        }

        match op.move_phase {
            Some(MovePhase::Delete) => self.push_move_phase_delete(op, event).await,
            Some(MovePhase::Create) => self.push_move_phase_create(calendar, op, event).await,
            None => Err(CoreError::Other(format!("move op {} has no phase", op.id))),
        }
    }

    async fn push_move_native(&self, _calendar: &Calendar, op: &PendingOperation, event: &Event) -> Result<bool, CoreError> {
        let Some(source_url) = op.target_url.as_deref() else {
            return Err(CoreError::Other(format!("move op {} missing source url", op.id)));
        };
        let target_calendar_id = op.target_calendar_id.ok_or_else(|| CoreError::Other(format!("move op {} missing target calendar", op.id)))?;
        let target_calendar = self
            .db
            .calendars
            .get(target_calendar_id)
            .await?
            .ok_or_else(|| CoreError::Other(format!("calendar {target_calendar_id} not found")))?;

        let href = Href::new(source_url.to_string());
        let etag = current_etag(event);
        let (new_href, new_etag) = self.client.move_event(&href, &target_calendar.caldav_url, &etag).await?;
        let new_url = self.quirks.build_event_url(&target_calendar.caldav_url, new_href.as_str());
        self.db.events.set_remote_identity(event.id, &new_url, new_etag.as_str()).await?;
        self.db.events.set_sync_status(event.id, SyncStatus::Synced).await?;
        self.db.pending_ops.delete(op.id).await?;
        Ok(true)
    }

    async fn push_move_phase_delete(&self, op: &PendingOperation, event: &Event) -> Result<bool, CoreError> {
        let Some(source_url) = op.target_url.as_deref() else {
            return Err(CoreError::Other(format!("move op {} missing source url", op.id)));
        };
        let href = Href::new(source_url.to_string());
        let etag = current_etag(event);
        match self.client.delete_event(&href, &etag).await {
            Ok(()) | Err(CalDavError::NotFound(_)) => {
                self.db.pending_ops.advance_move_phase(op.id).await?;
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn push_move_phase_create(&self, calendar: &Calendar, op: &PendingOperation, event: &Event) -> Result<bool, CoreError> {
        let ics = self.serialize(event, None)?;
        let (href, etag) = self.client.create_event(&calendar.caldav_url, &event.uid, &ics).await?;
        let url = self.quirks.build_event_url(&calendar.caldav_url, href.as_str());
        self.db.events.set_remote_identity(event.id, &url, etag.as_str()).await?;
        self.db.events.set_sync_status(event.id, SyncStatus::Synced).await?;
        self.db.pending_ops.delete(op.id).await?;
        Ok(true)
    }

    /// Patches `event.raw_ical` when present, falling back to a fresh
    /// generation (spec §4.1, §4.7 "serialize event via patch/generate").
    fn serialize(&self, event: &Event, recurrence_id: Option<String>) -> Result<String, CoreError> {
        let now = jiff::Zoned::now();
        if let Some(raw) = &event.raw_ical {
            let fields = PushFields::for_event(event);
            match calsync_ical::patch(raw, &event.uid, recurrence_id.as_deref(), &fields.as_patch_fields(event), &now) {
                Ok(text) => return Ok(text),
                Err(e) => {
                    tracing::warn!(event_id = event.id, error = %e, "failed to patch original ICS, regenerating fresh");
                }
            }
        }
        Ok(calsync_ical::generate(&ics::to_fresh_ical_event(event, recurrence_id), &now))
    }
}

fn current_etag(event: &Event) -> ETag {
    ETag::new(event.etag.clone().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localdb::{new_event, LocalDb};
    use crate::model::Provider;
    use async_trait::async_trait;
    use calsync_caldav::{CalendarCollection, DiscoverResult, SyncCollectionResult, SyncToken};
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct FakeClient {
        created: Mutex<Vec<(String, String, String)>>,
        updated: Mutex<Vec<(String, String)>>,
        deleted: Mutex<Vec<String>>,
        next_etag: Mutex<u32>,
        fail_auth: bool,
        fail_conflict: bool,
        fail_transport: bool,
        not_found_on_delete: bool,
    }

    impl FakeClient {
        fn etag(&self) -> ETag {
            let mut n = self.next_etag.lock().unwrap();
            *n += 1;
            ETag::new(format!("\"{n}\""))
        }
    }

    #[async_trait]
    impl CalDavClient for FakeClient {
        async fn discover_well_known(&self, _base_url: &str) -> Result<DiscoverResult, CalDavError> {
            unimplemented!()
        }
        async fn discover_principal(&self, _url: &str) -> Result<Href, CalDavError> {
            unimplemented!()
        }
        async fn discover_calendar_home(&self, _principal_url: &str) -> Result<Href, CalDavError> {
            unimplemented!()
        }
        async fn list_calendars(&self, _calendar_home_url: &str) -> Result<Vec<CalendarCollection>, CalDavError> {
            unimplemented!()
        }
        async fn get_ctag(&self, _collection_url: &str) -> Result<Option<String>, CalDavError> {
            unimplemented!()
        }
        async fn get_sync_token(&self, _collection_url: &str) -> Result<Option<SyncToken>, CalDavError> {
            unimplemented!()
        }
        async fn sync_collection(&self, _collection_url: &str, _token: Option<&SyncToken>) -> Result<SyncCollectionResult, CalDavError> {
            unimplemented!()
        }
        async fn fetch_etags_in_range(&self, _collection_url: &str, _from: &str, _to: &str) -> Result<Vec<(Href, calsync_caldav::ETag)>, CalDavError> {
            unimplemented!()
        }
        async fn fetch_events_by_href(&self, _collection_url: &str, _hrefs: &[Href]) -> Result<Vec<calsync_caldav::CalendarResource>, CalDavError> {
            unimplemented!()
        }
        async fn fetch_event(&self, _href: &Href) -> Result<calsync_caldav::CalendarResource, CalDavError> {
            unimplemented!()
        }
        async fn create_event(&self, collection_url: &str, uid: &str, ics: &str) -> Result<(Href, ETag), CalDavError> {
            if self.fail_auth {
                return Err(CalDavError::Auth("nope".into()));
            }
            if self.fail_transport {
                return Err(CalDavError::Transport { message: "timeout".into(), retryable: true });
            }
            self.created.lock().unwrap().push((collection_url.to_string(), uid.to_string(), ics.to_string()));
            Ok((Href::new(format!("{collection_url}/{uid}.ics")), self.etag()))
        }
        async fn update_event(&self, href: &Href, ics: &str, _if_match_etag: &ETag) -> Result<ETag, CalDavError> {
            if self.fail_conflict {
                return Err(CalDavError::Conflict("412".into()));
            }
            self.updated.lock().unwrap().push((href.as_str().to_string(), ics.to_string()));
            Ok(self.etag())
        }
        async fn delete_event(&self, href: &Href, _if_match_etag: &ETag) -> Result<(), CalDavError> {
            if self.not_found_on_delete {
                return Err(CalDavError::NotFound(href.clone()));
            }
            self.deleted.lock().unwrap().push(href.as_str().to_string());
            Ok(())
        }
        async fn move_event(&self, _from_href: &Href, _to_collection_url: &str, _if_match_etag: &ETag) -> Result<(Href, ETag), CalDavError> {
            unimplemented!()
        }
    }

    async fn setup() -> (LocalDb, Calendar) {
        let db = LocalDb::open(None).await.unwrap();
        let account_id = db.accounts.insert(Provider::Caldav, "a@example.com", "A").await.unwrap();
        let calendar_id = db.calendars.insert(account_id, "https://example.com/dav/p/", "P", 0, false).await.unwrap();
        let calendar = db.calendars.get(calendar_id).await.unwrap().unwrap();
        (db, calendar)
    }

    #[tokio::test]
    async fn create_op_lands_and_marks_synced() {
        let (db, calendar) = setup().await;
        let writer = crate::writer::EventWriter::new(&db);
        let draft = new_event("e1".into(), calendar.id, "Standup".into(), 0, 0, "20260101T000000Z".into());
        let created = writer.create(draft, 0).await.unwrap();

        let client = FakeClient::default();
        let quirks = calsync_caldav::GenericQuirks;
        let config = SyncConfig::default();
        let strategy = PushStrategy::new(&db, &client, &quirks, &config);

        let outcome = strategy.push(&calendar, 0).await.unwrap();
        assert!(outcome.touched_event_ids.contains(&created.id));

        let reloaded = db.events.get(created.id).await.unwrap().unwrap();
        assert_eq!(reloaded.sync_status, SyncStatus::Synced);
        assert!(reloaded.caldav_url.is_some());
        assert!(db.pending_ops.list_for_event(created.id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn clear_raw_ical_on_push_drops_cached_body_after_create() {
        let (db, calendar) = setup().await;
        let writer = crate::writer::EventWriter::new(&db);
        let mut draft = new_event("e1".into(), calendar.id, "Standup".into(), 0, 0, "20260101T000000Z".into());
        draft.raw_ical = Some("BEGIN:VCALENDAR\r\nEND:VCALENDAR\r\n".into());
        let created = writer.create(draft, 0).await.unwrap();
        assert!(db.events.get(created.id).await.unwrap().unwrap().raw_ical.is_some());

        let client = FakeClient::default();
        let quirks = calsync_caldav::GenericQuirks;
        let config = SyncConfig { clear_raw_ical_on_push: true, ..Default::default() };
        let strategy = PushStrategy::new(&db, &client, &quirks, &config);

        strategy.push(&calendar, 0).await.unwrap();

        let reloaded = db.events.get(created.id).await.unwrap().unwrap();
        assert_eq!(reloaded.raw_ical, None);
    }

    #[tokio::test]
    async fn update_conflict_marks_op_conflicted_and_keeps_pending() {
        let (db, calendar) = setup().await;
        let mut draft = new_event("e1".into(), calendar.id, "Standup".into(), 0, 0, "20260101T000000Z".into());
        draft.caldav_url = Some("https://example.com/dav/p/e1.ics".into());
        draft.etag = Some("\"1\"".into());
        let id = db.events.upsert(&draft).await.unwrap();
        db.pending_ops.enqueue(id, OperationKind::Update, None, None, None, None, 0).await.unwrap();

        let client = FakeClient { fail_conflict: true, ..Default::default() };
        let quirks = calsync_caldav::GenericQuirks;
        let config = SyncConfig::default();
        let strategy = PushStrategy::new(&db, &client, &quirks, &config);

        let outcome = strategy.push(&calendar, 0).await.unwrap();
        assert!(outcome.touched_event_ids.is_empty());

        let ops = db.pending_ops.list_for_event(id).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert!(ops[0].is_conflicted);
        assert_eq!(ops[0].retry_count, 1);
        assert!(ops[0].next_retry_at > 0, "conflicted op must back off, not be immediately ready again");
    }

    #[tokio::test]
    async fn transient_failure_bumps_retry_and_keeps_op() {
        let (db, calendar) = setup().await;
        let writer = crate::writer::EventWriter::new(&db);
        let draft = new_event("e1".into(), calendar.id, "Standup".into(), 0, 0, "20260101T000000Z".into());
        let created = writer.create(draft, 0).await.unwrap();

        let client = FakeClient { fail_transport: true, ..Default::default() };
        let quirks = calsync_caldav::GenericQuirks;
        let config = SyncConfig::default();
        let strategy = PushStrategy::new(&db, &client, &quirks, &config);

        strategy.push(&calendar, 0).await.unwrap();

        let ops = db.pending_ops.list_for_event(created.id).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].retry_count, 1);
        assert!(!ops[0].is_poisoned);
    }

    #[tokio::test]
    async fn transient_failure_poisons_op_at_retry_cap() {
        let (db, calendar) = setup().await;
        let writer = crate::writer::EventWriter::new(&db);
        let draft = new_event("e1".into(), calendar.id, "Standup".into(), 0, 0, "20260101T000000Z".into());
        let created = writer.create(draft, 0).await.unwrap();

        let client = FakeClient { fail_transport: true, ..Default::default() };
        let quirks = calsync_caldav::GenericQuirks;
        let config = SyncConfig { retry_cap: 1, ..Default::default() };
        let strategy = PushStrategy::new(&db, &client, &quirks, &config);

        let outcome = strategy.push(&calendar, 0).await.unwrap();

        let ops = db.pending_ops.list_for_event(created.id).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert!(ops[0].is_poisoned);
        assert_eq!(outcome.poisoned_op_ids.len(), 1);
        assert!(outcome.poisoned_op_ids.contains(&ops[0].id));
    }

    #[tokio::test]
    async fn auth_failure_stops_the_whole_cycle() {
        let (db, calendar) = setup().await;
        let writer = crate::writer::EventWriter::new(&db);
        let draft = new_event("e1".into(), calendar.id, "Standup".into(), 0, 0, "20260101T000000Z".into());
        writer.create(draft, 0).await.unwrap();

        let client = FakeClient { fail_auth: true, ..Default::default() };
        let quirks = calsync_caldav::GenericQuirks;
        let config = SyncConfig::default();
        let strategy = PushStrategy::new(&db, &client, &quirks, &config);

        let err = strategy.push(&calendar, 0).await.unwrap_err();
        assert!(matches!(err, CoreError::CalDav(e) if e.is_auth()));
    }

    #[tokio::test]
    async fn delete_op_not_found_is_treated_as_success() {
        let (db, calendar) = setup().await;
        let mut draft = new_event("e1".into(), calendar.id, "Standup".into(), 0, 0, "20260101T000000Z".into());
        draft.caldav_url = Some("https://example.com/dav/p/e1.ics".into());
        let id = db.events.upsert(&draft).await.unwrap();
        db.pending_ops.enqueue(id, OperationKind::Delete, Some("https://example.com/dav/p/e1.ics"), None, None, None, 0).await.unwrap();

        let client = FakeClient { not_found_on_delete: true, ..Default::default() };
        let quirks = calsync_caldav::GenericQuirks;
        let config = SyncConfig::default();
        let strategy = PushStrategy::new(&db, &client, &quirks, &config);

        strategy.push(&calendar, 0).await.unwrap();
        assert!(db.events.get(id).await.unwrap().is_none());
        assert!(db.pending_ops.list_for_event(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn same_account_move_runs_two_phase_delete_then_create() {
        let (db, account_id, source, target) = {
            let db = LocalDb::open(None).await.unwrap();
            let account_id = db.accounts.insert(Provider::Caldav, "a@example.com", "A").await.unwrap();
            let source = db.calendars.insert(account_id, "https://example.com/dav/p/", "P", 0, false).await.unwrap();
            let target = db.calendars.insert(account_id, "https://example.com/dav/q/", "Q", 0, false).await.unwrap();
            (db, account_id, source, target)
        };
        let _ = account_id;
        let writer = crate::writer::EventWriter::new(&db);
        let mut draft = new_event("e1".into(), source, "Standup".into(), 0, 0, "20260101T000000Z".into());
        draft.caldav_url = Some("https://example.com/dav/p/e1.ics".into());
        draft.etag = Some("\"1\"".into());
        let created = db.events.upsert(&draft).await.unwrap();
        db.events.set_remote_identity(created, "https://example.com/dav/p/e1.ics", "\"1\"").await.unwrap();
        writer.move_event(created, target, 0).await.unwrap();

        let client = FakeClient::default();
        let quirks = calsync_caldav::GenericQuirks;
        let config = SyncConfig::default();
        let strategy = PushStrategy::new(&db, &client, &quirks, &config);

        let source_calendar = db.calendars.get(source).await.unwrap().unwrap();
        strategy.push(&source_calendar, 0).await.unwrap();

        let ops = db.pending_ops.list_for_event(created).await.unwrap();
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].move_phase, Some(MovePhase::Create));
        assert_eq!(client.deleted.lock().unwrap().len(), 1);

        let target_calendar = db.calendars.get(target).await.unwrap().unwrap();
        let outcome = strategy.push(&target_calendar, 0).await.unwrap();
        assert!(outcome.touched_event_ids.contains(&created));
        assert!(db.pending_ops.list_for_event(created).await.unwrap().is_empty());

        let reloaded = db.events.get(created).await.unwrap().unwrap();
        assert_eq!(reloaded.sync_status, SyncStatus::Synced);
        assert!(reloaded.caldav_url.as_deref().unwrap().contains("/dav/q/"));
    }
}
