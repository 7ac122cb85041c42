// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::ops::Deref;

/// Calendar resource href (path).
///
/// A `Href` represents the path to a calendar resource on a `CalDAV` server,
/// such as `/calendars/user/event1.ics`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Href(String);

impl Href {
    /// Creates a new `Href` from a string.
    #[must_use]
    pub const fn new(href: String) -> Self {
        Self(href)
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for Href {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for Href {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Href {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for Href {
    fn from(href: String) -> Self {
        Self(href)
    }
}

impl From<&str> for Href {
    fn from(href: &str) -> Self {
        Self(href.to_string())
    }
}

/// Entity tag for change detection.
///
/// An `ETag` represents an entity tag returned by the `CalDAV` server,
/// used for optimistic concurrency control and change detection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ETag(String);

impl ETag {
    /// Creates a new `ETag` from a string.
    #[must_use]
    pub const fn new(etag: String) -> Self {
        Self(etag)
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for ETag {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for ETag {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ETag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ETag {
    fn from(etag: String) -> Self {
        Self(etag)
    }
}

impl From<&str> for ETag {
    fn from(etag: &str) -> Self {
        Self(etag.to_string())
    }
}

/// Opaque sync-collection token (RFC 6578).
///
/// Servers hand these out and expect them back verbatim on the next
/// `sync-collection` REPORT; clients must not parse or compare their
/// contents beyond equality.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncToken(String);

impl SyncToken {
    /// Creates a new `SyncToken` from a string.
    #[must_use]
    pub const fn new(token: String) -> Self {
        Self(token)
    }

    /// Returns the inner string value.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Deref for SyncToken {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl AsRef<str> for SyncToken {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SyncToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for SyncToken {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl From<&str> for SyncToken {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

/// A calendar object resource as returned by GET, multiget or calendar-query.
///
/// The raw iCalendar text is kept verbatim alongside a best-effort parse,
/// since the patching serializer in `calsync-ical` needs the original bytes
/// and a failed parse must not discard the resource.
#[derive(Debug, Clone)]
pub struct CalendarResource {
    /// The href of the resource.
    pub href: Href,
    /// The entity tag of the resource.
    pub etag: ETag,
    /// The raw iCalendar body as returned by the server.
    pub raw_ical: String,
    /// The parsed event, if `raw_ical` parsed successfully.
    pub event: Option<calsync_ical::ICalEvent>,
}

impl CalendarResource {
    /// Creates a new `CalendarResource`, parsing `raw_ical` eagerly.
    #[must_use]
    pub fn new(href: Href, etag: ETag, raw_ical: String) -> Self {
        let event = calsync_ical::parse(&raw_ical)
            .ok()
            .and_then(|cal| cal.master().cloned());
        Self {
            href,
            etag,
            raw_ical,
            event,
        }
    }
}

/// A sync-collection change entry (spec §4.2 `syncCollection`).
///
/// `removed` is `true` when the server reported a `404` status for this
/// href inside the multi-status response, meaning the resource was deleted
/// (or is no longer visible) since the last sync token.
#[derive(Debug, Clone)]
pub struct SyncChange {
    /// The href of the changed resource.
    pub href: Href,
    /// The new entity tag, absent when `removed` is `true`.
    pub etag: Option<ETag>,
    /// Whether the resource was deleted.
    pub removed: bool,
}

/// Calendar collection metadata, as discovered under a calendar-home
/// (spec §4.4 step 5 "List calendars").
#[derive(Debug, Clone)]
pub struct CalendarCollection {
    /// The href of the calendar collection.
    pub href: Href,
    /// The display name of the calendar.
    pub display_name: Option<String>,
    /// The description of the calendar.
    pub description: Option<String>,
    /// `CALDAV:calendar-color`, if advertised (e.g. `#2a9df4ff`).
    pub color: Option<String>,
    /// Supported component types (VEVENT, VTODO, etc.).
    pub supported_components: Vec<String>,
    /// Whether `DAV:resourcetype` included `CALDAV:calendar`.
    pub is_calendar: bool,
    /// The collection tag (`CTag`) for change detection.
    pub ctag: Option<String>,
    /// The initial sync token for `sync-collection`, when advertised.
    pub sync_token: Option<SyncToken>,
    /// Whether `DAV:current-user-privilege-set`-equivalent signals mark this
    /// collection as not writable. The wire layer never computes this from
    /// privileges directly (out of scope, spec §1 "no ACL management");
    /// it is left `false` unless a higher layer sets it from other signals
    /// (e.g. a scheduling-inbox/outbox collection a [`crate::quirks::Quirks`]
    /// profile filters out entirely rather than marking read-only).
    pub is_read_only: bool,
}

impl CalendarCollection {
    /// Creates a new, otherwise-empty `CalendarCollection`.
    #[must_use]
    pub fn new(href: Href) -> Self {
        Self {
            href,
            display_name: None,
            description: None,
            color: None,
            supported_components: Vec::new(),
            is_calendar: false,
            ctag: None,
            sync_token: None,
            is_read_only: false,
        }
    }

    /// Whether this collection advertises `VEVENT` support. Collections
    /// that only support `VTODO`/`VJOURNAL` are filtered out by
    /// [`crate::quirks::Quirks::filter_discovered_calendars`].
    #[must_use]
    pub fn supports_vevent(&self) -> bool {
        self.supported_components.is_empty()
            || self
                .supported_components
                .iter()
                .any(|c| c.eq_ignore_ascii_case("VEVENT"))
    }
}

/// The result of a `sync-collection` REPORT (spec §4.2 `syncCollection`).
#[derive(Debug, Clone, Default)]
pub struct SyncCollectionResult {
    /// The new sync token to persist for the next incremental sync.
    pub sync_token: Option<SyncToken>,
    /// Hrefs whose etag changed (created or updated).
    pub changed: Vec<SyncChange>,
    /// Hrefs the server reported as removed.
    pub deleted: Vec<Href>,
}
