// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Coordinates per-calendar sync sessions for one account (spec §4.8).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use calsync_caldav::{CalDavClient, Quirks};
use futures::stream::{self, StreamExt};

use crate::config::SyncConfig;
use crate::error::CoreError;
use crate::localdb::LocalDb;
use crate::model::{Calendar, SessionStatus, SyncSession, TimestampMillis};
use crate::pull::{PullOutcome, PullStrategy};
use crate::push::PushStrategy;
use crate::traits::OccurrenceSink;

/// A cooperative cancellation flag, checked at the start of each session
/// and between its push/pull stages (spec §5 "A session is cancellable at
/// every suspension point").
///
/// Cancelling mid-push leaves the queue intact — ops retry next cycle.
/// Cancelling before the pull stage skips it entirely, so `ctag`/
/// `syncToken` are left untouched (spec §5 "`syncToken` is written only at
/// the end of a fully successful pull").
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// A fresh, not-yet-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Whether [`Self::cancel`] has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Runs sync sessions across one account's calendars (spec §4.8).
///
/// Bound to a single [`CalDavClient`]/[`Quirks`] pair, matching the spec's
/// "each strategy uses `CalDavClient` with a `Quirks` profile chosen by
/// account provider" — one orchestrator instance serves one account.
pub struct SyncOrchestrator<'a> {
    db: &'a LocalDb,
    client: &'a dyn CalDavClient,
    quirks: &'a dyn Quirks,
    occurrences: &'a dyn OccurrenceSink,
    config: &'a SyncConfig,
}

impl<'a> SyncOrchestrator<'a> {
    /// Builds an orchestrator over one account's collaborators.
    #[must_use]
    pub const fn new(
        db: &'a LocalDb,
        client: &'a dyn CalDavClient,
        quirks: &'a dyn Quirks,
        occurrences: &'a dyn OccurrenceSink,
        config: &'a SyncConfig,
    ) -> Self {
        Self { db, client, quirks, occurrences, config }
    }

    /// Runs one session per visible calendar under `account_id`, up to
    /// `config.max_parallel_calendars` concurrently (spec §4.8 "across
    /// calendars, sessions run in parallel up to a configurable cap").
    ///
    /// An auth failure in any one session cancels the rest of this call's
    /// in-flight and not-yet-started sessions (spec §7 "auth errors
    /// terminate the account") — already-running sessions still finish
    /// their current suspension point and record whatever they completed.
    #[tracing::instrument(skip(self, cancel), fields(account_id))]
    pub async fn sync_account(&self, account_id: i64, now: TimestampMillis, cancel: &CancellationToken) -> Result<Vec<SyncSession>, CoreError> {
        let calendars: Vec<Calendar> = self.db.calendars.list_for_account(account_id).await?.into_iter().filter(|c| c.is_visible).collect();
        let cap = self.config.max_parallel_calendars.max(1);

        let results: Vec<Result<SyncSession, CoreError>> =
            stream::iter(calendars.into_iter().map(|calendar| self.sync_calendar(calendar, now, cancel))).buffer_unordered(cap).collect().await;

        if results.iter().any(|r| matches!(r, Err(e) if e.is_auth())) {
            cancel.cancel();
        }
        results.into_iter().collect()
    }

    /// Runs one session for `calendar`: `push(c)` then
    /// `pull(c, recentlyPushedEventIds = push.touched)` (spec §4.8, §5
    /// "push *happens-before* pull in the same orchestrated session").
    ///
    /// A per-calendar transport or DB error that isn't an auth failure is
    /// absorbed into a `FAILED` session row; the returned `Ok` still
    /// carries that row, since the session itself was recorded
    /// successfully. An auth failure is both recorded as `FAILED` *and*
    /// propagated, so [`Self::sync_account`] can stop the account (spec §7
    /// "auth errors terminate the account").
    #[tracing::instrument(skip(self, calendar, cancel), fields(calendar_id = calendar.id))]
    pub async fn sync_calendar(&self, calendar: Calendar, now: TimestampMillis, cancel: &CancellationToken) -> Result<SyncSession, CoreError> {
        let session_id = self.db.sync_sessions.start(calendar.id, now).await?;

        if cancel.is_cancelled() {
            tracing::info!(calendar_id = calendar.id, "session cancelled before it started");
            self.finish(session_id, now, SessionStatus::Cancelled, &PullOutcome::default()).await?;
            return self.load_session(session_id).await;
        }

        let push = PushStrategy::new(self.db, self.client, self.quirks, self.config);
        let push_outcome = match push.push(&calendar, now).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(calendar_id = calendar.id, error = %e, "push stage failed, session terminated");
                self.finish(session_id, now, SessionStatus::Failed, &PullOutcome::default()).await?;
                let session = self.load_session(session_id).await?;
                return if e.is_auth() { Err(e) } else { Ok(session) };
            }
        };

        if cancel.is_cancelled() {
            tracing::info!(calendar_id = calendar.id, "session cancelled before the pull stage");
            self.finish(session_id, now, SessionStatus::Cancelled, &PullOutcome::default()).await?;
            return self.load_session(session_id).await;
        }

        let pull = PullStrategy::new(self.db, self.client, self.quirks, self.occurrences, self.config);
        match pull.pull(&calendar, now, false, &push_outcome.touched_event_ids).await {
            Ok(outcome) => {
                let status = status_for(&outcome, push_outcome.poisoned_op_ids.len());
                self.finish(session_id, now, status, &outcome).await?;
                self.load_session(session_id).await
            }
            Err(e) => {
                tracing::error!(calendar_id = calendar.id, error = %e, "pull stage failed, session terminated");
                self.finish(session_id, now, SessionStatus::Failed, &PullOutcome::default()).await?;
                let session = self.load_session(session_id).await?;
                if e.is_auth() { Err(e) } else { Ok(session) }
            }
        }
    }

    async fn finish(&self, session_id: i64, now: TimestampMillis, status: SessionStatus, outcome: &PullOutcome) -> Result<(), CoreError> {
        self.db
            .sync_sessions
            .finish(
                session_id,
                now,
                status,
                outcome.added,
                outcome.updated,
                outcome.deleted,
                outcome.skipped_parse_error,
                outcome.skipped_constraint_error,
            )
            .await?;
        Ok(())
    }

    async fn load_session(&self, session_id: i64) -> Result<SyncSession, CoreError> {
        self.db.sync_sessions.get(session_id).await?.ok_or_else(|| CoreError::Other(format!("sync session {session_id} vanished after finish")))
    }
}

/// Terminal status for a completed pull, absent any session-ending error
/// (spec §4.8 "a session with `skippedParseError > 0` is `PARTIAL`; with
/// `skippedConstraintError > 0` alone, still `PARTIAL`").
fn status_for(outcome: &PullOutcome, poisoned_ops: usize) -> SessionStatus {
    if poisoned_ops > 0 {
        SessionStatus::Failed
    } else if outcome.skipped_parse_error > 0 || outcome.skipped_constraint_error > 0 {
        SessionStatus::Partial
    } else {
        SessionStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localdb::{new_event, LocalDb};
    use crate::model::Provider;
    use crate::traits::NullOccurrenceSink;
    use async_trait::async_trait;
    use calsync_caldav::{
        CalDavError, CalendarCollection, CalendarResource, DiscoverResult, ETag, Href, SyncCollectionResult, SyncToken,
    };
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct FakeClient {
        etags_in_range: Mutex<Vec<(Href, ETag)>>,
        resources: Mutex<Vec<CalendarResource>>,
        fail_auth_on_create: bool,
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
            Ok(None)
        }
        async fn get_sync_token(&self, _collection_url: &str) -> Result<Option<SyncToken>, CalDavError> {
            Ok(None)
        }
        async fn sync_collection(&self, _collection_url: &str, _token: Option<&SyncToken>) -> Result<SyncCollectionResult, CalDavError> {
            Ok(SyncCollectionResult::default())
        }
        async fn fetch_etags_in_range(&self, _collection_url: &str, _from: &str, _to: &str) -> Result<Vec<(Href, ETag)>, CalDavError> {
            Ok(self.etags_in_range.lock().unwrap().clone())
        }
        async fn fetch_events_by_href(&self, _collection_url: &str, hrefs: &[Href]) -> Result<Vec<CalendarResource>, CalDavError> {
            let all = self.resources.lock().unwrap();
            Ok(all.iter().filter(|r| hrefs.iter().any(|h| h == &r.href)).cloned().collect())
        }
        async fn fetch_event(&self, _href: &Href) -> Result<CalendarResource, CalDavError> {
            unimplemented!()
        }
        async fn create_event(&self, collection_url: &str, uid: &str, _ics: &str) -> Result<(Href, ETag), CalDavError> {
            if self.fail_auth_on_create {
                return Err(CalDavError::Auth("nope".into()));
            }
            Ok((Href::new(format!("{collection_url}/{uid}.ics")), ETag::new("\"1\"".into())))
        }
        async fn update_event(&self, _href: &Href, _ics: &str, _if_match_etag: &ETag) -> Result<ETag, CalDavError> {
            unimplemented!()
        }
        async fn delete_event(&self, _href: &Href, _if_match_etag: &ETag) -> Result<(), CalDavError> {
            unimplemented!()
        }
        async fn move_event(&self, _from_href: &Href, _to_collection_url: &str, _if_match_etag: &ETag) -> Result<(Href, ETag), CalDavError> {
            unimplemented!()
        }
    }

    async fn setup() -> (LocalDb, i64, Calendar) {
        let db = LocalDb::open(None).await.unwrap();
        let account_id = db.accounts.insert(Provider::Caldav, "a@example.com", "A").await.unwrap();
        let calendar_id = db.calendars.insert(account_id, "https://example.com/dav/p/", "P", 0, false).await.unwrap();
        let calendar = db.calendars.get(calendar_id).await.unwrap().unwrap();
        (db, account_id, calendar)
    }

    #[tokio::test]
    async fn pending_create_is_pushed_then_session_succeeds() {
        let (db, _account_id, calendar) = setup().await;
        let writer = crate::writer::EventWriter::new(&db);
        let draft = new_event("e1".into(), calendar.id, "Standup".into(), 0, 0, "20260101T000000Z".into());
        writer.create(draft, 0).await.unwrap();

        let client = FakeClient::default();
        let quirks = calsync_caldav::GenericQuirks;
        let sink = NullOccurrenceSink;
        let config = SyncConfig::default();
        let orchestrator = SyncOrchestrator::new(&db, &client, &quirks, &sink, &config);
        let cancel = CancellationToken::new();

        let session = orchestrator.sync_calendar(calendar, 1_700_000_000_000, &cancel).await.unwrap();
        assert_eq!(session.status, Some(SessionStatus::Success));
    }

    #[tokio::test]
    async fn auth_failure_marks_session_failed_and_propagates() {
        let (db, _account_id, calendar) = setup().await;
        let writer = crate::writer::EventWriter::new(&db);
        let draft = new_event("e1".into(), calendar.id, "Standup".into(), 0, 0, "20260101T000000Z".into());
        writer.create(draft, 0).await.unwrap();

        let client = FakeClient { fail_auth_on_create: true, ..Default::default() };
        let quirks = calsync_caldav::GenericQuirks;
        let sink = NullOccurrenceSink;
        let config = SyncConfig::default();
        let orchestrator = SyncOrchestrator::new(&db, &client, &quirks, &sink, &config);
        let cancel = CancellationToken::new();

        let err = orchestrator.sync_calendar(calendar.clone(), 1_700_000_000_000, &cancel).await.unwrap_err();
        assert!(matches!(err, CoreError::CalDav(e) if e.is_auth()));

        let sessions = db.sync_sessions.list_for_calendar(calendar.id, 1).await.unwrap();
        assert_eq!(sessions[0].status, Some(SessionStatus::Failed));
    }

    #[tokio::test]
    async fn sync_account_runs_every_visible_calendar() {
        let db = LocalDb::open(None).await.unwrap();
        let account_id = db.accounts.insert(Provider::Caldav, "a@example.com", "A").await.unwrap();
        db.calendars.insert(account_id, "https://example.com/dav/p/", "P", 0, false).await.unwrap();
        db.calendars.insert(account_id, "https://example.com/dav/q/", "Q", 0, false).await.unwrap();

        let client = FakeClient::default();
        let quirks = calsync_caldav::GenericQuirks;
        let sink = NullOccurrenceSink;
        let config = SyncConfig::default();
        let orchestrator = SyncOrchestrator::new(&db, &client, &quirks, &sink, &config);
        let cancel = CancellationToken::new();

        let sessions = orchestrator.sync_account(account_id, 1_700_000_000_000, &cancel).await.unwrap();
        assert_eq!(sessions.len(), 2);
        assert!(sessions.iter().all(|s| s.status == Some(SessionStatus::Success)));
    }

    #[tokio::test]
    async fn cancelled_before_start_records_cancelled_session() {
        let (db, _account_id, calendar) = setup().await;

        let client = FakeClient::default();
        let quirks = calsync_caldav::GenericQuirks;
        let sink = NullOccurrenceSink;
        let config = SyncConfig::default();
        let orchestrator = SyncOrchestrator::new(&db, &client, &quirks, &sink, &config);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let session = orchestrator.sync_calendar(calendar, 1_700_000_000_000, &cancel).await.unwrap();
        assert_eq!(session.status, Some(SessionStatus::Cancelled));
    }
}
