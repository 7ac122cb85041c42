// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Bridges `calsync_ical`'s [`ICalEvent`]/[`PatchFields`] with
//! [`crate::model::Event`] (spec §4.1 "mapping back to ICS").
//!
//! `Event` does not model `DESCRIPTION`/`LOCATION` as first-class fields
//! (spec §3 lists neither on `Event`), yet §4.1 names them among the fields
//! "the user can edit via the local model". They round-trip through
//! [`crate::model::Event::extra_properties`] like every other property this
//! crate doesn't represent directly — the same bucket that already carries
//! alarms-beyond-three, attendees and X-* keys.

use calsync_ical::{Classification, DtEnd, DtStart, EventStatusValue, ICalEvent};

use crate::model::{Event, TimestampMillis};

const DESCRIPTION_KEY: &str = "DESCRIPTION";
const LOCATION_KEY: &str = "LOCATION";

/// Copies every field [`Event`] models directly from a parsed [`ICalEvent`]
/// onto `event`, leaving `id`, `calendar_id`, `caldav_url`, `etag`,
/// `sync_status`, `original_event_id` and `original_instance_time` to the
/// caller (spec §4.6 `processEvent` — those come from the lookup, not the
/// wire body).
pub fn apply_parsed_fields(event: &mut Event, ical: &ICalEvent) {
    event.uid = ical.uid.clone();
    event.title = ical.summary.clone().unwrap_or_default();
    event.is_all_day = ical.dtstart.is_all_day();
    event.timezone = ical.dtstart.tzid().map(str::to_string);
    event.start_ts = ical.dtstart.timestamp_millis_utc().unwrap_or(event.start_ts);
    event.end_ts = end_timestamp(ical).unwrap_or(event.start_ts);
    event.rrule = ical.rrule.clone();
    event.exdate = ical.exdates.clone();
    event.dtstamp = ical.dtstamp.clone();
    event.sequence = ical.sequence;
    event.status = ical.status;
    event.classification = ical.class;
    event.reminders = ical.reminders.iter().map(|a| a.trigger.clone()).collect();

    event.extra_properties = ical.extra_properties.clone();
    match &ical.description {
        Some(d) => {
            event.extra_properties.insert(DESCRIPTION_KEY.to_string(), d.clone());
        }
        None => {
            event.extra_properties.remove(DESCRIPTION_KEY);
        }
    }
    match &ical.location {
        Some(l) => {
            event.extra_properties.insert(LOCATION_KEY.to_string(), l.clone());
        }
        None => {
            event.extra_properties.remove(LOCATION_KEY);
        }
    }
}

fn end_timestamp(ical: &ICalEvent) -> Option<TimestampMillis> {
    match &ical.dtend {
        Some(DtEnd::At(dt)) => dt.timestamp_millis_utc(),
        Some(DtEnd::Duration(span)) => {
            let start = ical.dtstart.timestamp_millis_utc()?;
            let span: jiff::Span = span.parse().ok()?;
            let ts = jiff::Timestamp::from_millisecond(start).ok()?;
            Some(ts.checked_add(span).ok()?.as_millisecond())
        }
        None => ical.dtstart.timestamp_millis_utc(),
    }
}

/// Renders a [`DtStart`] for `ts`, matching the shape implied by
/// `is_all_day`/`timezone` (spec §4.1 "DTSTART variants" — the inverse of
/// parsing). All-day events are rendered as a local date in `tzid` (the
/// device timezone, when known), falling back to UTC (spec §4.1 "serialize
/// as local midnight in device TZ only where a timestamp is required").
#[must_use]
pub fn dtstart_for(ts: TimestampMillis, is_all_day: bool, timezone: Option<&str>) -> DtStart {
    let instant = jiff::Timestamp::from_millisecond(ts).unwrap_or_default();

    if is_all_day {
        let tz = timezone.and_then(|t| jiff::tz::TimeZone::get(t).ok()).unwrap_or(jiff::tz::TimeZone::UTC);
        let date = instant.to_zoned(tz).date();
        return DtStart::Date { value: date.strftime("%Y%m%d").to_string() };
    }

    if let Some(tzid) = timezone {
        if let Ok(tz) = jiff::tz::TimeZone::get(tzid) {
            let zoned = instant.to_zoned(tz);
            return DtStart::Zoned { tzid: tzid.to_string(), value: zoned.strftime("%Y%m%dT%H%M%S").to_string() };
        }
    }

    let utc = instant.to_zoned(jiff::tz::TimeZone::UTC);
    DtStart::Utc { value: utc.strftime("%Y%m%dT%H%M%SZ").to_string() }
}

/// Renders the `DTEND` counterpart for `event`'s `end_ts`, or `None` when
/// `end_ts == start_ts` (a zero-length/point-in-time event has no `DTEND`).
#[must_use]
pub fn dtend_for(event: &Event) -> Option<DtEnd> {
    if event.end_ts == event.start_ts {
        return None;
    }
    Some(DtEnd::At(dtstart_for(event.end_ts, event.is_all_day, event.timezone.as_deref())))
}

/// Builds the [`calsync_ical::PatchFields`]/fresh-[`ICalEvent`] inputs a push
/// needs to serialize `event`, pulling `DESCRIPTION`/`LOCATION` back out of
/// `extra_properties`.
pub struct PushFields {
    /// Rendered `DTSTART`.
    pub dtstart: DtStart,
    /// Rendered `DTEND`, if any.
    pub dtend: Option<DtEnd>,
    /// `DESCRIPTION`, recovered from `extra_properties`.
    pub description: Option<String>,
    /// `LOCATION`, recovered from `extra_properties`.
    pub location: Option<String>,
}

impl PushFields {
    /// Computes the owned rendering inputs for `event`.
    #[must_use]
    pub fn for_event(event: &Event) -> Self {
        Self {
            dtstart: dtstart_for(event.start_ts, event.is_all_day, event.timezone.as_deref()),
            dtend: dtend_for(event),
            description: event.extra_properties.get(DESCRIPTION_KEY).cloned(),
            location: event.extra_properties.get(LOCATION_KEY).cloned(),
        }
    }

    /// Builds the borrow-based [`calsync_ical::PatchFields`] view of `event`
    /// over this struct's owned renderings.
    #[must_use]
    pub fn as_patch_fields<'a>(&'a self, event: &'a Event) -> calsync_ical::PatchFields<'a> {
        calsync_ical::PatchFields {
            summary: non_empty(&event.title),
            description: self.description.as_deref(),
            location: self.location.as_deref(),
            dtstart: &self.dtstart,
            dtend: self.dtend.as_ref(),
            rrule: event.rrule.as_deref(),
            exdates: &event.exdate,
            status: event.status,
            class: event.classification,
        }
    }
}

fn non_empty(s: &str) -> Option<&str> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}

/// Builds the fresh [`ICalEvent`] [`calsync_ical::generate`] needs when
/// `event` has no usable `raw_ical` (spec §4.1 "generate a fresh ICS from
/// the `Event` alone").
#[must_use]
pub fn to_fresh_ical_event(event: &Event, recurrence_id: Option<String>) -> ICalEvent {
    let fields = PushFields::for_event(event);
    ICalEvent {
        uid: event.uid.clone(),
        summary: non_empty(&event.title).map(str::to_string),
        description: fields.description.clone(),
        location: fields.location.clone(),
        dtstart: fields.dtstart,
        dtend: fields.dtend,
        rrule: event.rrule.clone(),
        exdates: event.exdate.clone(),
        status: event.status,
        class: event.classification,
        sequence: event.sequence + 1,
        dtstamp: event.dtstamp.clone(),
        recurrence_id,
        reminders: event
            .reminders
            .iter()
            .map(|trigger| calsync_ical::AlarmTrigger { trigger: trigger.clone() })
            .collect(),
        attendee_count: 0,
        has_organizer: false,
        categories: Vec::new(),
        extra_properties: event.extra_properties.clone(),
    }
}

/// Default event status/classification mapping helper: whether `status`
/// round-trips to a VEVENT-valid `STATUS` (spec §4.1 "recognized VEVENT
/// status").
#[must_use]
pub fn status_as_str(status: Option<EventStatusValue>) -> Option<&'static str> {
    status.map(EventStatusValue::as_str)
}

/// Resolves a raw `RECURRENCE-ID` value to the UTC millisecond instant it
/// replaces (spec §4.6 processEvent "exception/master linking"). The parser
/// keeps `RECURRENCE-ID` as a bare string with no parameter info, so this
/// infers the same value shape `DTSTART` would have used: UTC if it ends in
/// `Z`, the master's zone if one is known, otherwise floating.
#[must_use]
pub fn recurrence_instance_millis(raw: &str, master_tzid: Option<&str>) -> Option<TimestampMillis> {
    let dtstart = if raw.ends_with('Z') {
        DtStart::Utc { value: raw.to_string() }
    } else if let Some(tzid) = master_tzid {
        DtStart::Zoned { tzid: tzid.to_string(), value: raw.to_string() }
    } else {
        DtStart::Floating { value: raw.to_string() }
    };
    dtstart.timestamp_millis_utc()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Provider, SyncStatus};
    use std::collections::BTreeMap;

    fn blank_event() -> Event {
        Event {
            id: 0,
            uid: "u1".into(),
            calendar_id: 1,
            title: "T".into(),
            start_ts: 1_700_000_000_000,
            end_ts: 1_700_003_600_000,
            is_all_day: false,
            timezone: None,
            rrule: None,
            exdate: Vec::new(),
            caldav_url: None,
            etag: None,
            dtstamp: "20260101T000000Z".into(),
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

    #[test]
    fn dtstart_for_non_all_day_without_timezone_renders_utc() {
        let dt = dtstart_for(1_700_000_000_000, false, None);
        assert!(matches!(dt, DtStart::Utc { .. }));
    }

    #[test]
    fn dtstart_for_all_day_renders_date_value() {
        let dt = dtstart_for(1_700_000_000_000, true, None);
        assert!(matches!(dt, DtStart::Date { .. }));
    }

    #[test]
    fn dtend_for_point_in_time_event_is_none() {
        let mut event = blank_event();
        event.end_ts = event.start_ts;
        assert!(dtend_for(&event).is_none());
    }

    #[test]
    fn push_fields_recover_description_and_location_from_extra_properties() {
        let mut event = blank_event();
        event.extra_properties.insert("DESCRIPTION".into(), "Bring coffee".into());
        event.extra_properties.insert("LOCATION".into(), "Room 4".into());

        let fields = PushFields::for_event(&event);
        assert_eq!(fields.description.as_deref(), Some("Bring coffee"));
        assert_eq!(fields.location.as_deref(), Some("Room 4"));
    }

    #[test]
    fn recurrence_instance_millis_parses_utc_value() {
        let ts = recurrence_instance_millis("20260101T090000Z", None);
        assert_eq!(ts, DtStart::Utc { value: "20260101T090000Z".into() }.timestamp_millis_utc());
    }

    #[test]
    fn apply_parsed_fields_round_trips_description_into_extra_properties() {
        let mut event = blank_event();
        let ical = ICalEvent {
            uid: "u1".into(),
            summary: Some("Standup".into()),
            description: Some("Daily".into()),
            location: None,
            dtstart: DtStart::Utc { value: "20260101T090000Z".into() },
            dtend: None,
            rrule: None,
            exdates: Vec::new(),
            status: None,
            class: Classification::Public,
            sequence: 0,
            dtstamp: "20260101T000000Z".into(),
            recurrence_id: None,
            reminders: Vec::new(),
            attendee_count: 0,
            has_organizer: false,
            categories: Vec::new(),
            extra_properties: BTreeMap::new(),
        };
        apply_parsed_fields(&mut event, &ical);
        assert_eq!(event.title, "Standup");
        assert_eq!(event.extra_properties.get("DESCRIPTION").map(String::as_str), Some("Daily"));
        let _ = Provider::Caldav;
    }
}
