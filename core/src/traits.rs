// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! External collaborators, seen only through the interface the core uses
//! (spec §1, §6).

use async_trait::async_trait;

use crate::model::TimestampMillis;

/// OS-level credential storage (spec §6 "Credential store").
///
/// The core never persists a password or app-specific token in its own
/// tables; it holds credentials only for the lifetime of a sync session
/// and otherwise goes through this trait.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Stores `credentials` for `account_id`. Returns `false` on failure;
    /// per spec §4.4 step 6, a `false` here MUST roll back the
    /// newly-created account.
    async fn save(&self, account_id: i64, credentials: &str) -> bool;

    /// Loads the credentials previously saved for `account_id`, if any.
    async fn load(&self, account_id: i64) -> Option<String>;

    /// Removes any stored credentials for `account_id`.
    async fn delete(&self, account_id: i64);
}

/// Background scheduling (spec §6 "an opaque `Scheduler` that eventually
/// calls `pull`/`push`").
///
/// No concrete implementation ships here — the host application decides
/// the cadence (timers, push notifications, OS background tasks) and
/// calls into [`crate::orchestrator::SyncOrchestrator`] when this fires.
pub trait Scheduler: Send + Sync {
    /// Requests that `calendar_id` be synced at or after `not_before`.
    fn schedule_sync(&self, calendar_id: i64, not_before: TimestampMillis);
}

/// The occurrence-materialization engine (spec §1 "treated as a
/// collaborator with `generateOccurrences`/`regenerateOccurrences`/
/// `cancelOccurrence`/`linkException`").
///
/// [`crate::writer::EventWriter`] and [`crate::pull::PullStrategy`] call
/// this after committing a master or exception row; a real implementation
/// expands `RRULE`/`EXDATE` into concrete occurrence rows for the UI. Out
/// of scope here — [`NullOccurrenceSink`] is the no-op used in tests and
/// by hosts that materialize occurrences some other way.
#[async_trait]
pub trait OccurrenceSink: Send + Sync {
    /// A new recurring (or single) master event was committed.
    async fn generate_occurrences(&self, event_id: i64);

    /// An existing master's `RRULE`/`EXDATE`/times changed; prior
    /// occurrences must be recomputed.
    async fn regenerate_occurrences(&self, event_id: i64);

    /// One occurrence of `event_id` at `instance_time` was cancelled
    /// without a replacement exception row.
    async fn cancel_occurrence(&self, event_id: i64, instance_time: TimestampMillis);

    /// `exception_id` is a `RECURRENCE-ID` exception that replaces the
    /// occurrence of `master_id` at `instance_time`.
    async fn link_exception(&self, master_id: i64, exception_id: i64, instance_time: TimestampMillis);
}

/// A no-op [`OccurrenceSink`] for tests and hosts that don't materialize
/// occurrences through this interface.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullOccurrenceSink;

#[async_trait]
impl OccurrenceSink for NullOccurrenceSink {
    async fn generate_occurrences(&self, _event_id: i64) {}

    async fn regenerate_occurrences(&self, _event_id: i64) {}

    async fn cancel_occurrence(&self, _event_id: i64, _instance_time: TimestampMillis) {}

    async fn link_exception(&self, _master_id: i64, _exception_id: i64, _instance_time: TimestampMillis) {}
}
