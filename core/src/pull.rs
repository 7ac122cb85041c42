// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Pulls remote changes into the local store for one calendar (spec §4.6).

use std::collections::HashSet;

use calsync_caldav::{CalDavClient, CalDavError, CalendarResource, Href, Quirks};

use crate::config::SyncConfig;
use crate::error::CoreError;
use crate::ics;
use crate::localdb::{new_event, LocalDb};
use crate::model::{Calendar, SyncStatus, TimestampMillis};
use crate::traits::OccurrenceSink;

/// Counters from one pull cycle, folded into the session's [`crate::model::SyncSession`]
/// row by [`crate::orchestrator::SyncOrchestrator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PullOutcome {
    /// New masters/exceptions inserted.
    pub added: u32,
    /// Existing masters/exceptions updated.
    pub updated: u32,
    /// Local rows removed because the server no longer has them.
    pub deleted: u32,
    /// Resources skipped because their ICS body failed to parse.
    pub skipped_parse_error: u32,
    /// Upserts skipped for a foreign-key violation (spec §4.6 "FK-violation
    /// isolation").
    pub skipped_constraint_error: u32,
}

/// Pulls one calendar's remote state into the local store (spec §4.6).
pub struct PullStrategy<'a> {
    db: &'a LocalDb,
    client: &'a dyn CalDavClient,
    quirks: &'a dyn Quirks,
    occurrences: &'a dyn OccurrenceSink,
    config: &'a SyncConfig,
}

impl<'a> PullStrategy<'a> {
    /// Builds a strategy over one calendar's collaborators.
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

    /// Runs one pull cycle for `calendar` (spec §4.6 steps 1-3):
    ///
    /// 1. `getCtag` short-circuit — an unchanged `ctag` skips the rest,
    ///    unless `force_full` is set.
    /// 2. Incremental `sync-collection`, when a `syncToken` is on hand,
    ///    [`Quirks::supports_sync_token`] and `force_full` is false; falls
    ///    back to a full pull on an invalid-token response (RFC 6578 §3.2,
    ///    `403`/`409`).
    /// 3. Otherwise a full `calendar-query` over the configured time window,
    ///    reconciled against the local rows in the same range.
    ///
    /// `recently_pushed_event_ids` is the set of events this cycle's
    /// preceding push just landed (spec §4.8 "push *happens-before* pull");
    /// it protects those rows from being read back as stale deletes or
    /// clobbered by an eventually-consistent CDN response (spec §4.6
    /// processEvent steps 3-4).
    ///
    /// `ctag`/`syncToken` are written back atomically with the last upsert
    /// only once every resource in this cycle parsed cleanly, or the
    /// parse-failure retry gate ([`crate::localdb::Calendars::parse_retry_count`])
    /// has been exhausted (spec §4.6 "parse-failure retry gate").
    pub async fn pull(
        &self,
        calendar: &Calendar,
        now: TimestampMillis,
        force_full: bool,
        recently_pushed_event_ids: &HashSet<i64>,
    ) -> Result<PullOutcome, CoreError> {
        let remote_ctag = if self.quirks.supports_ctag() { self.client.get_ctag(&calendar.caldav_url).await? } else { None };
        if !force_full {
            if let Some(remote_ctag) = &remote_ctag {
                if calendar.ctag.as_deref() == Some(remote_ctag.as_str()) {
                    return Ok(PullOutcome::default());
                }
            }
        }

        let mut outcome = PullOutcome::default();
        let new_sync_token = if !force_full && calendar.sync_token.is_some() && self.quirks.supports_sync_token() {
            match self.pull_incremental(calendar, recently_pushed_event_ids, &mut outcome).await {
                Ok(token) => token,
                Err(CoreError::CalDav(e)) if is_invalid_sync_token(&e) => {
                    tracing::info!(calendar_id = calendar.id, "sync token rejected, falling back to full pull");
                    outcome = PullOutcome::default();
                    self.pull_full(calendar, now, recently_pushed_event_ids, &mut outcome).await?;
                    self.fresh_sync_token(calendar).await?
                }
                Err(e) => return Err(e),
            }
        } else {
            self.pull_full(calendar, now, recently_pushed_event_ids, &mut outcome).await?;
            self.fresh_sync_token(calendar).await?
        };

        self.finish(calendar, &outcome, remote_ctag.as_deref(), new_sync_token.as_deref()).await?;
        Ok(outcome)
    }

    async fn finish(&self, calendar: &Calendar, outcome: &PullOutcome, ctag: Option<&str>, sync_token: Option<&str>) -> Result<(), CoreError> {
        let retry_count = self.db.calendars.parse_retry_count(calendar.id).await?;
        if outcome.skipped_parse_error > 0 && retry_count < self.config.max_parse_retries {
            self.db.calendars.set_parse_retry_count(calendar.id, retry_count + 1).await?;
            return Ok(());
        }
        if retry_count > 0 {
            self.db.calendars.set_parse_retry_count(calendar.id, 0).await?;
        }
        self.db.calendars.set_sync_metadata(calendar.id, ctag, sync_token).await?;
        Ok(())
    }

    /// Fetches a fresh `syncToken` after a full pull, when the server
    /// advertises one (spec §4.6 "a full pull re-seeds the sync token so
    /// the next cycle can go incremental again").
    async fn fresh_sync_token(&self, calendar: &Calendar) -> Result<Option<String>, CoreError> {
        if !self.quirks.supports_sync_token() {
            return Ok(None);
        }
        Ok(self.client.get_sync_token(&calendar.caldav_url).await?.map(|t| t.as_str().to_string()))
    }

    /// RFC 6578 incremental sync. Returns the new `syncToken` to persist.
    async fn pull_incremental(
        &self,
        calendar: &Calendar,
        recently_pushed_event_ids: &HashSet<i64>,
        outcome: &mut PullOutcome,
    ) -> Result<Option<String>, CoreError> {
        let token = calendar.sync_token.clone().map(calsync_caldav::SyncToken::new);
        let result = self.client.sync_collection(&calendar.caldav_url, token.as_ref()).await?;

        let mut changed_hrefs: Vec<Href> = Vec::new();
        let mut seen = HashSet::new();
        for change in &result.changed {
            if change.removed {
                continue;
            }
            if seen.insert(change.href.as_str().to_string()) {
                changed_hrefs.push(change.href.clone());
            }
        }
        if !changed_hrefs.is_empty() {
            let resources = self.fetch_with_empty_multiget_fallback(calendar, &changed_hrefs).await?;
            for resource in &resources {
                self.process_resource(calendar, resource, recently_pushed_event_ids, outcome).await?;
            }
        }

        let mut removed: Vec<Href> = result.deleted.clone();
        removed.extend(result.changed.iter().filter(|c| c.removed).map(|c| c.href.clone()));
        for href in &removed {
            self.process_removed_href(calendar, href, recently_pushed_event_ids, outcome).await?;
        }

        Ok(result.sync_token.map(|t| t.as_str().to_string()))
    }

    /// A `calendar-query` over `[from, to)`, reconciled against the local
    /// rows already in that range (spec §4.6 step A "full pull").
    async fn pull_full(
        &self,
        calendar: &Calendar,
        now: TimestampMillis,
        recently_pushed_event_ids: &HashSet<i64>,
        outcome: &mut PullOutcome,
    ) -> Result<(), CoreError> {
        let (from_ms, to_ms) = window_millis(now, self.config);
        let (from, to) = (format_utc(from_ms), format_utc(to_ms));
        let remote = self.client.fetch_etags_in_range(&calendar.caldav_url, &from, &to).await?;
        let local = self.db.events.list_in_range(calendar.id, from_ms, to_ms).await?;

        let mut changed_hrefs = Vec::new();
        for (href, etag) in &remote {
            let url = self.quirks.build_event_url(&calendar.caldav_url, href.as_str());
            let unchanged = local.iter().any(|e| e.caldav_url.as_deref() == Some(url.as_str()) && e.etag.as_deref() == Some(etag.as_str()));
            if !unchanged {
                changed_hrefs.push(href.clone());
            }
        }
        if !changed_hrefs.is_empty() {
            let resources = self.fetch_with_empty_multiget_fallback(calendar, &changed_hrefs).await?;
            for resource in &resources {
                self.process_resource(calendar, resource, recently_pushed_event_ids, outcome).await?;
            }
        }

        for event in local.iter().filter(|e| e.sync_status == SyncStatus::Synced && !e.is_exception()) {
            if recently_pushed_event_ids.contains(&event.id) {
                continue;
            }
            let Some(url) = event.caldav_url.as_deref() else { continue };
            let still_remote = remote.iter().any(|(h, _)| self.quirks.build_event_url(&calendar.caldav_url, h.as_str()) == url);
            if !still_remote {
                self.db.events.delete(event.id).await?;
                outcome.deleted += 1;
            }
        }
        Ok(())
    }

    /// Batch-fetches `hrefs` via [`CalDavClient::fetch_events_by_href`],
    /// re-issuing each href singly when a multi-href batch comes back empty
    /// (spec §4.6 "Empty-multiget fallback" — some servers, e.g. Zoho,
    /// return `200` with an empty body for `calendar-multiget` with more
    /// than one href). Individual failures in the fallback are swallowed;
    /// a partial result is preferred over none.
    async fn fetch_with_empty_multiget_fallback(&self, calendar: &Calendar, hrefs: &[Href]) -> Result<Vec<CalendarResource>, CoreError> {
        let resources = self.client.fetch_events_by_href(&calendar.caldav_url, hrefs).await?;
        if resources.is_empty() && hrefs.len() > 1 {
            tracing::info!(calendar_id = calendar.id, count = hrefs.len(), "empty multiget response, refetching hrefs individually");
            let mut fallback = Vec::new();
            for href in hrefs {
                match self.client.fetch_events_by_href(&calendar.caldav_url, std::slice::from_ref(href)).await {
                    Ok(mut single) => fallback.append(&mut single),
                    Err(e) => tracing::warn!(calendar_id = calendar.id, href = href.as_str(), error = %e, "single-href refetch failed"),
                }
            }
            return Ok(fallback);
        }
        Ok(resources)
    }

    async fn process_removed_href(
        &self,
        calendar: &Calendar,
        href: &Href,
        recently_pushed_event_ids: &HashSet<i64>,
        outcome: &mut PullOutcome,
    ) -> Result<(), CoreError> {
        let url = self.quirks.build_event_url(&calendar.caldav_url, href.as_str());
        if let Some(event) = self.db.events.find_by_caldav_url(calendar.id, &url).await? {
            if event.sync_status == SyncStatus::Synced && !recently_pushed_event_ids.contains(&event.id) {
                self.db.events.delete(event.id).await?;
                outcome.deleted += 1;
            }
        }
        Ok(())
    }

    async fn process_resource(
        &self,
        calendar: &Calendar,
        resource: &CalendarResource,
        recently_pushed_event_ids: &HashSet<i64>,
        outcome: &mut PullOutcome,
    ) -> Result<(), CoreError> {
        let parsed = match calsync_ical::parse(&resource.raw_ical) {
            Ok(p) => p,
            Err(e) => {
                outcome.skipped_parse_error += 1;
                tracing::warn!(calendar_id = calendar.id, href = resource.href.as_str(), error = %e, "failed to parse calendar resource");
                return Ok(());
            }
        };

        let Some(master_ical) = parsed.master() else {
            return Ok(());
        };
        let url = self.quirks.build_event_url(&calendar.caldav_url, resource.href.as_str());

        let existing = match self.db.events.find_by_uid(&master_ical.uid, calendar.id).await? {
            Some(event) => Some(event),
            None => self.db.events.find_by_caldav_url(calendar.id, &url).await?,
        };
        let Some(master_id) =
            self.upsert(calendar.id, existing, &url, resource.etag.as_str(), &resource.raw_ical, master_ical, None, None, recently_pushed_event_ids, outcome).await?
        else {
            return Ok(());
        };
        if master_ical.rrule.is_some() {
            self.occurrences.generate_occurrences(master_id).await;
        } else {
            self.occurrences.regenerate_occurrences(master_id).await;
        }

        for exception_ical in parsed.exceptions() {
            let Some(instance_time) =
                exception_ical.recurrence_id.as_deref().and_then(|raw| ics::recurrence_instance_millis(raw, master_ical.dtstart.tzid()))
            else {
                continue;
            };
            let existing_exception = self
                .db
                .events
                .list_exceptions(master_id)
                .await?
                .into_iter()
                .find(|e| e.original_instance_time == Some(instance_time));
            if let Some(exception_id) = self
                .upsert(
                    calendar.id,
                    existing_exception,
                    &url,
                    resource.etag.as_str(),
                    &resource.raw_ical,
                    exception_ical,
                    Some(master_id),
                    Some(instance_time),
                    recently_pushed_event_ids,
                    outcome,
                )
                .await?
            {
                self.occurrences.link_exception(master_id, exception_id, instance_time).await;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn upsert(
        &self,
        calendar_id: i64,
        existing: Option<crate::model::Event>,
        url: &str,
        etag: &str,
        raw_ical: &str,
        ical: &calsync_ical::ICalEvent,
        original_event_id: Option<i64>,
        original_instance_time: Option<TimestampMillis>,
        recently_pushed_event_ids: &HashSet<i64>,
        outcome: &mut PullOutcome,
    ) -> Result<Option<i64>, CoreError> {
        if let Some(event) = &existing {
            if event.sync_status != SyncStatus::Synced {
                if self.db.pending_ops.has_conflicted_op(event.id).await? {
                    // A previous push attempt lost a 409/412 against this
                    // event's stale etag (`pending_ops::mark_conflicted`).
                    // Refresh the local caldav_url/etag/raw_ical from the
                    // server so the next push retry patches against current
                    // text with a current etag instead of replaying the one
                    // that just failed; the queued local edit's structured
                    // fields are left untouched.
                    self.db.events.refresh_remote_copy(event.id, url, etag, raw_ical).await?;
                }
                // A local edit is queued for this row; the next push resolves
                // it, so the pull must not clobber it (spec §4.6 processEvent
                // "skip if syncStatus != SYNCED").
                return Ok(Some(event.id));
            }
        }

        let mut event = match existing {
            Some(event) if event.etag.as_deref() == Some(etag) => {
                // Unchanged since our last look (spec §4.6 processEvent
                // "etag == resource.etag -> skip", protects against a stale
                // CDN response after a push).
                return Ok(Some(event.id));
            }
            Some(event) if recently_pushed_event_ids.contains(&event.id) => {
                // This cycle's push just landed this event; an
                // eventually-consistent read could still show the old body
                // (spec §4.6 processEvent "id in recentlyPushedEventIds ->
                // skip").
                return Ok(Some(event.id));
            }
            Some(event) => event,
            None => new_event(ical.uid.clone(), calendar_id, String::new(), 0, 0, ical.dtstamp.clone()),
        };
        let is_new = event.id == 0;

        event.calendar_id = calendar_id;
        event.caldav_url = Some(url.to_string());
        event.etag = Some(etag.to_string());
        event.raw_ical = Some(raw_ical.to_string());
        event.original_event_id = original_event_id;
        event.original_instance_time = original_instance_time;
        ics::apply_parsed_fields(&mut event, ical);

        match self.db.events.upsert(&event).await {
            Ok(id) => {
                if is_new {
                    outcome.added += 1;
                } else {
                    outcome.updated += 1;
                }
                Ok(Some(id))
            }
            Err(sqlx::Error::Database(_)) => {
                outcome.skipped_constraint_error += 1;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }
}

fn window_millis(now: TimestampMillis, config: &SyncConfig) -> (TimestampMillis, TimestampMillis) {
    let now_ts = jiff::Timestamp::from_millisecond(now).unwrap_or_default();
    let from = now_ts.checked_sub(config.pull_window_before).unwrap_or(now_ts);
    let to = now_ts.checked_add(config.pull_window_after).unwrap_or(now_ts);
    (from.as_millisecond(), to.as_millisecond())
}

fn format_utc(millis: TimestampMillis) -> String {
    jiff::Timestamp::from_millisecond(millis)
        .unwrap_or_default()
        .to_zoned(jiff::tz::TimeZone::UTC)
        .strftime("%Y%m%dT%H%M%SZ")
        .to_string()
}

/// Whether `error` is RFC 6578 §3.2's "invalid sync-token" signal (spec
/// §4.6 step 2 "`pullIncremental` falls back to `pullFull` when the server
/// returns `410 Gone`").
fn is_invalid_sync_token(error: &CalDavError) -> bool {
    matches!(error, CalDavError::Gone(_))
}
