// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! The structured view of a single VEVENT this crate models directly.
//!
//! Anything not named on [`ICalEvent`] lives only in the original text and
//! is preserved by [`crate::patch`], never reconstructed from this struct.

use std::collections::BTreeMap;

/// `DTSTART` (and by extension `DTEND`) value forms recognized by this
/// crate (spec §4.1 "DTSTART variants").
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DtStart {
    /// `VALUE=DATE` — a floating date with no time component. The event is
    /// all-day; `value` is the raw `YYYYMMDD` string.
    Date {
        /// Raw `YYYYMMDD` value.
        value: String,
    },
    /// A bare value ending in `Z` — UTC. `value` is the raw
    /// `YYYYMMDDTHHMMSSZ` string.
    Utc {
        /// Raw UTC value.
        value: String,
    },
    /// `TZID=<id>` — wall-clock time in a named zone.
    Zoned {
        /// The `TZID` parameter value.
        tzid: String,
        /// Raw `YYYYMMDDTHHMMSS` value (no trailing `Z`).
        value: String,
    },
    /// Neither `VALUE=DATE`, `TZID=`, nor a trailing `Z` — floating local
    /// time.
    Floating {
        /// Raw `YYYYMMDDTHHMMSS` value.
        value: String,
    },
}

impl DtStart {
    /// Whether this value marks the event as all-day.
    #[must_use]
    pub const fn is_all_day(&self) -> bool {
        matches!(self, Self::Date { .. })
    }

    /// The raw date/date-time value string, without parameters.
    #[must_use]
    pub fn raw_value(&self) -> &str {
        match self {
            Self::Date { value } | Self::Utc { value } | Self::Floating { value } => value,
            Self::Zoned { value, .. } => value,
        }
    }

    /// `TZID` parameter, if this is a zoned value.
    #[must_use]
    pub fn tzid(&self) -> Option<&str> {
        match self {
            Self::Zoned { tzid, .. } => Some(tzid),
            _ => None,
        }
    }

    /// Milliseconds since the Unix epoch, computed in UTC. Floating/zoned
    /// values are interpreted against the IANA zone given (or UTC if
    /// floating, matching "serialize as local midnight ... only where a
    /// timestamp is required" for all-day events in the absence of a
    /// device timezone).
    #[must_use]
    pub fn timestamp_millis_utc(&self) -> Option<i64> {
        use jiff::civil::DateTime;
        use jiff::tz::TimeZone;

        let (dt, tz) = match self {
            Self::Date { value } => {
                let date = jiff::civil::Date::strptime(value, "%Y%m%d").ok()?;
                (date.at(0, 0, 0, 0), TimeZone::UTC)
            }
            Self::Utc { value } => (
                DateTime::strptime(value, "%Y%m%dT%H%M%SZ").ok()?,
                TimeZone::UTC,
            ),
            Self::Floating { value } => (
                DateTime::strptime(value, "%Y%m%dT%H%M%S").ok()?,
                TimeZone::UTC,
            ),
            Self::Zoned { tzid, value } => (
                DateTime::strptime(value, "%Y%m%dT%H%M%S").ok()?,
                TimeZone::get(tzid).ok()?,
            ),
        };
        Some(dt.to_zoned(tz).ok()?.timestamp().as_millisecond())
    }
}

/// `DTEND` or `DURATION`, mutually exclusive per RFC 5545.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DtEnd {
    /// An explicit end value, same shape as [`DtStart`].
    At(DtStart),
    /// A `DURATION` value string (e.g. `PT1H`), relative to `DTSTART`.
    Duration(String),
}

/// `CLASS` property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// `PUBLIC`.
    Public,
    /// `PRIVATE`.
    Private,
    /// `CONFIDENTIAL`.
    Confidential,
}

impl Classification {
    /// Parses the raw `CLASS` value, defaulting unknown tokens to `Public`
    /// per RFC 5545 §3.8.1.3.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.to_ascii_uppercase().as_str() {
            "PRIVATE" => Self::Private,
            "CONFIDENTIAL" => Self::Confidential,
            _ => Self::Public,
        }
    }

    /// The raw `CLASS` value string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Public => "PUBLIC",
            Self::Private => "PRIVATE",
            Self::Confidential => "CONFIDENTIAL",
        }
    }
}

/// `STATUS` property value for a VEVENT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventStatusValue {
    /// `TENTATIVE`.
    Tentative,
    /// `CONFIRMED`.
    Confirmed,
    /// `CANCELLED`.
    Cancelled,
}

impl EventStatusValue {
    /// Parses a raw `STATUS` value. Returns `None` for values that are not
    /// valid for VEVENT (a VTODO/VJOURNAL status text, say).
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.to_ascii_uppercase().as_str() {
            "TENTATIVE" => Some(Self::Tentative),
            "CONFIRMED" => Some(Self::Confirmed),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// The raw `STATUS` value string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tentative => "TENTATIVE",
            Self::Confirmed => "CONFIRMED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// One alarm trigger, as much of a `VALARM` as the local model stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmTrigger {
    /// Raw `TRIGGER` value (e.g. `-PT15M`).
    pub trigger: String,
}

/// A single VEVENT, mapped from iCalendar into the fields the local event
/// store understands. Anything else in the source text is not represented
/// here — see [`crate::patch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ICalEvent {
    /// `UID`.
    pub uid: String,
    /// `SUMMARY`, if present.
    pub summary: Option<String>,
    /// `DESCRIPTION`, if present.
    pub description: Option<String>,
    /// `LOCATION`, if present.
    pub location: Option<String>,
    /// `DTSTART`.
    pub dtstart: DtStart,
    /// `DTEND` or `DURATION`, if present.
    pub dtend: Option<DtEnd>,
    /// `RRULE`, if present, kept as the raw rule string (occurrence
    /// expansion is an external collaborator's job).
    pub rrule: Option<String>,
    /// `EXDATE` values, one raw date(-time) value per entry (best-effort:
    /// not every server echoes these back faithfully, see spec §9).
    pub exdates: Vec<String>,
    /// `STATUS`, if present and a recognized VEVENT status.
    pub status: Option<EventStatusValue>,
    /// `CLASS`, defaulting to `Public` when absent (RFC 5545 default).
    pub class: Classification,
    /// `SEQUENCE`, defaulting to `0` when absent.
    pub sequence: i64,
    /// `DTSTAMP`, the raw UTC value string.
    pub dtstamp: String,
    /// `RECURRENCE-ID` raw value. `Some` marks this component as a
    /// modified occurrence ("exception") of a recurring master.
    pub recurrence_id: Option<String>,
    /// The first three `VALARM` `TRIGGER` values found, in document order.
    pub reminders: Vec<AlarmTrigger>,
    /// Number of `ATTENDEE` properties found (full attendee data is kept
    /// only in the original text).
    pub attendee_count: usize,
    /// Whether an `ORGANIZER` property was present.
    pub has_organizer: bool,
    /// `CATEGORIES` values, flattened across all `CATEGORIES` lines.
    pub categories: Vec<String>,
    /// Every other property this crate does not model directly, keyed by
    /// upper-cased property name, first occurrence wins. Always includes
    /// `X-*` extension properties.
    pub extra_properties: BTreeMap<String, String>,
}

impl ICalEvent {
    /// Whether `DTSTART` marks this event all-day.
    #[must_use]
    pub const fn is_all_day(&self) -> bool {
        self.dtstart.is_all_day()
    }

    /// Whether this component is a `RECURRENCE-ID` exception of a master.
    #[must_use]
    pub const fn is_exception(&self) -> bool {
        self.recurrence_id.is_some()
    }
}
