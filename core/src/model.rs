// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Persisted entities (spec §3 Data Model).

use std::collections::BTreeMap;

/// UTC milliseconds since the Unix epoch (spec §3 "Timestamps are UTC
/// milliseconds unless noted").
pub type TimestampMillis = i64;

/// Remote provider family an [`Account`] talks to (spec §3 `Account`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Provider {
    /// Apple iCloud.
    Icloud,
    /// A generic RFC 4791 `CalDAV` server.
    Caldav,
    /// No remote counterpart; events never leave the local store.
    Local,
}

impl Provider {
    /// The column value stored for this provider.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Icloud => "ICLOUD",
            Self::Caldav => "CALDAV",
            Self::Local => "LOCAL",
        }
    }

    /// Parses a stored provider value.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "ICLOUD" => Some(Self::Icloud),
            "CALDAV" => Some(Self::Caldav),
            "LOCAL" => Some(Self::Local),
            _ => None,
        }
    }
}

/// A remote `CalDAV` account (spec §3 `Account`).
///
/// *Invariant*: `(provider, email, home_set_url)` is unique — the same
/// username on two distinct servers yields two accounts.
#[derive(Debug, Clone)]
pub struct Account {
    /// Row id.
    pub id: i64,
    /// Remote provider family.
    pub provider: Provider,
    /// The account's email/username.
    pub email: String,
    /// Human-readable display name.
    pub display_name: String,
    /// Resolved principal URL, once discovery has run.
    pub principal_url: Option<String>,
    /// Normalized calendar-home URL (spec §4.4 "URL normalization for
    /// account identity"), once discovery has run.
    pub home_set_url: Option<String>,
    /// Whether sync is enabled for this account.
    pub is_enabled: bool,
}

/// A calendar collection under an [`Account`] (spec §3 `Calendar`).
#[derive(Debug, Clone)]
pub struct Calendar {
    /// Row id.
    pub id: i64,
    /// Owning account.
    pub account_id: i64,
    /// Absolute collection URL on the server.
    pub caldav_url: String,
    /// Display name.
    pub display_name: String,
    /// `0xAARRGGBB` color.
    pub color: u32,
    /// Server collection tag, opaque, server-controlled.
    pub ctag: Option<String>,
    /// Server sync token, opaque, server-controlled.
    pub sync_token: Option<String>,
    /// Whether local writes are rejected at the domain boundary.
    pub is_read_only: bool,
    /// Whether this calendar is shown in the UI.
    pub is_visible: bool,
    /// Whether this is the account's default calendar for new events.
    pub is_default: bool,
}

/// Per-event sync state (spec §3 `SyncStatus`).
///
/// Transitions driven by [`crate::writer::EventWriter`] (forward) and
/// [`crate::push::PushStrategy`] (back to `Synced` on success).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SyncStatus {
    /// The local row matches the last-known server state.
    Synced,
    /// A local create is queued, not yet confirmed by the server.
    PendingCreate,
    /// A local update is queued, not yet confirmed by the server.
    PendingUpdate,
    /// A local delete is queued, not yet confirmed by the server.
    PendingDelete,
}

impl SyncStatus {
    /// The column value stored for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Synced => "SYNCED",
            Self::PendingCreate => "PENDING_CREATE",
            Self::PendingUpdate => "PENDING_UPDATE",
            Self::PendingDelete => "PENDING_DELETE",
        }
    }

    /// Parses a stored status value.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "SYNCED" => Some(Self::Synced),
            "PENDING_CREATE" => Some(Self::PendingCreate),
            "PENDING_UPDATE" => Some(Self::PendingUpdate),
            "PENDING_DELETE" => Some(Self::PendingDelete),
            _ => None,
        }
    }
}

/// A calendar event, master or exception (spec §3 `Event`).
///
/// *Invariants*: (a) at most one master per `(uid, calendar_id)`; (b) an
/// exception's `uid` equals its master's `uid`; (c) `caldav_url`, when
/// set, sits under the owning calendar's `caldav_url` prefix or the
/// collection has moved; (d) `raw_ical`, when set, is a parseable ICS blob
/// whose master component's UID equals `uid`.
#[derive(Debug, Clone)]
pub struct Event {
    /// Row id.
    pub id: i64,
    /// `UID`, shared between a master and its exceptions.
    pub uid: String,
    /// Owning calendar.
    pub calendar_id: i64,
    /// `SUMMARY`.
    pub title: String,
    /// Start, UTC milliseconds.
    pub start_ts: TimestampMillis,
    /// End, UTC milliseconds.
    pub end_ts: TimestampMillis,
    /// Whether this is an all-day event.
    pub is_all_day: bool,
    /// IANA timezone id, for zoned (non-UTC, non-floating) events.
    pub timezone: Option<String>,
    /// `RRULE`, raw rule string.
    pub rrule: Option<String>,
    /// `EXDATE` raw values (best-effort, spec §9).
    pub exdate: Vec<String>,
    /// Absolute href on the server, once created/fetched.
    pub caldav_url: Option<String>,
    /// Last-known `ETag`.
    pub etag: Option<String>,
    /// `DTSTAMP`, raw UTC value.
    pub dtstamp: String,
    /// `SEQUENCE`.
    pub sequence: i64,
    /// `STATUS`.
    pub status: Option<calsync_ical::EventStatusValue>,
    /// `CLASS`.
    pub classification: calsync_ical::Classification,
    /// The first three `VALARM` triggers, in document order.
    pub reminders: Vec<String>,
    /// Properties the local model doesn't represent directly, preserved
    /// for the patch serializer (spec §4.1).
    pub extra_properties: BTreeMap<String, String>,
    /// The original server ICS body, kept so the patch serializer can
    /// preserve unmodeled properties on the next push (spec §4.1, §9
    /// `clear_raw_ical_on_push`).
    pub raw_ical: Option<String>,
    /// Local/remote reconciliation state.
    pub sync_status: SyncStatus,
    /// Non-null iff this is a modified occurrence of a recurring master.
    pub original_event_id: Option<i64>,
    /// The instance time this exception replaces, UTC milliseconds.
    pub original_instance_time: Option<TimestampMillis>,
}

impl Event {
    /// Whether this row is a `RECURRENCE-ID` exception rather than a
    /// master (spec §3 "non-null iff this is a modified occurrence").
    #[must_use]
    pub const fn is_exception(&self) -> bool {
        self.original_event_id.is_some()
    }
}

/// The kind of remote mutation a [`PendingOperation`] represents (spec §3
/// `PendingOperation.operation`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OperationKind {
    /// `PUT` with `If-None-Match: *`.
    Create,
    /// `PUT` with `If-Match: <etag>`.
    Update,
    /// `DELETE` with `If-Match: <etag>`.
    Delete,
    /// A two-phase DELETE-then-CREATE, or a native `MOVE`.
    Move,
}

impl OperationKind {
    /// The column value stored for this operation kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Move => "MOVE",
        }
    }

    /// Parses a stored operation kind.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "CREATE" => Some(Self::Create),
            "UPDATE" => Some(Self::Update),
            "DELETE" => Some(Self::Delete),
            "MOVE" => Some(Self::Move),
            _ => None,
        }
    }
}

/// Which half of a two-phase `MOVE` a [`PendingOperation`] is in (spec §3
/// `PendingOperation.movePhase`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(i64)]
pub enum MovePhase {
    /// Phase 0: DELETE at the source collection.
    Delete = 0,
    /// Phase 1: CREATE in the target collection.
    Create = 1,
}

impl MovePhase {
    /// Parses a stored phase value.
    #[must_use]
    pub const fn from_i64(raw: i64) -> Option<Self> {
        match raw {
            0 => Some(Self::Delete),
            1 => Some(Self::Create),
            _ => None,
        }
    }
}

/// A durable, append-only intent to mutate a remote resource (spec §3
/// `PendingOperation`).
///
/// *Invariant*: between any two consecutive sync cycles, the set of
/// pending operations plus [`Event::sync_status`] uniquely determines the
/// remote mutation to attempt.
#[derive(Debug, Clone)]
pub struct PendingOperation {
    /// Row id.
    pub id: i64,
    /// The event this operation acts on.
    pub event_id: i64,
    /// The kind of mutation.
    pub operation: OperationKind,
    /// The server href this operation acts on, captured before local state
    /// mutates (spec §3 "captured before local state mutates").
    pub target_url: Option<String>,
    /// Set when this operation's effective calendar differs from
    /// `event.calendar_id` (spec §3 "cross-account MOVE, synced→local
    /// MOVE, regular DELETE where event has already been moved").
    pub source_calendar_id: Option<i64>,
    /// The destination calendar for a same-account `MOVE`.
    pub target_calendar_id: Option<i64>,
    /// Which phase of a two-phase `MOVE` this row represents. Always
    /// `None` for non-`MOVE` operations.
    pub move_phase: Option<MovePhase>,
    /// Exponential-backoff retry counter (spec §4.5).
    pub retry_count: u32,
    /// The last transient error observed, for surfacing to the user.
    pub last_error: Option<String>,
    /// Earliest time this operation may be retried.
    pub next_retry_at: TimestampMillis,
    /// When this operation was enqueued (spec §4.5 fetch-order tiebreak).
    pub created_at: TimestampMillis,
    /// Whether this operation exhausted its retry cap (spec §7 "Poisoned
    /// op"): kept in the queue, skipped, surfaced for manual action.
    pub is_poisoned: bool,
    /// Set when a push attempt hit a `409`/`412` conflict; the next pull
    /// resolves it (spec §4.7 `UPDATE` conflict handling).
    pub is_conflicted: bool,
}

/// Terminal outcome of a [`crate::orchestrator::SyncSession`] (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SessionStatus {
    /// Completed with no absorbed errors.
    Success,
    /// Completed but absorbed at least one per-resource error.
    Partial,
    /// Terminated early by a session-ending error.
    Failed,
    /// Cancelled mid-session.
    Cancelled,
}

impl SessionStatus {
    /// The column value stored for this status.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "SUCCESS",
            Self::Partial => "PARTIAL",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// A recorded sync session (SPEC_FULL §2 "`SyncSession` persistence").
#[derive(Debug, Clone)]
pub struct SyncSession {
    /// Row id.
    pub id: i64,
    /// The calendar this session synced.
    pub calendar_id: i64,
    /// When the session started.
    pub started_at: TimestampMillis,
    /// When the session ended, once finished.
    pub finished_at: Option<TimestampMillis>,
    /// Terminal status, once finished.
    pub status: Option<SessionStatus>,
    /// Events created by the pull phase.
    pub added: u32,
    /// Events updated by the pull phase.
    pub updated: u32,
    /// Events deleted by the pull phase.
    pub deleted: u32,
    /// Resources whose ICS failed to parse and were skipped (spec §4.6
    /// parse-failure retry gate).
    pub skipped_parse_error: u32,
    /// Upserts skipped for foreign-key violations (spec §4.6 FK isolation).
    pub skipped_constraint_error: u32,
}
