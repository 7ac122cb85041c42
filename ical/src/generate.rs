// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Fresh ICS generation for events with no `rawIcal` to patch against.

use crate::content_line::escape;
use crate::fold::fold_all;
use crate::model::{Classification, DtEnd, DtStart, EventStatusValue, ICalEvent};

/// Generates a standalone `VCALENDAR` body containing exactly one `VEVENT`
/// for `event`, using `now` for `DTSTAMP`. Used when `rawIcal` is null or
/// failed to parse — there is nothing to patch, so the event is the sole
/// source of truth.
///
/// Properties this crate does not model (alarms beyond the first three,
/// attendees, organizer, categories, extension properties) are emitted from
/// whatever [`ICalEvent`] happens to carry, since a freshly generated
/// resource has no original text to fall back on for the rest.
#[must_use]
pub fn generate(event: &ICalEvent, now: &jiff::Zoned) -> String {
    let dtstamp = now
        .with_time_zone(jiff::tz::TimeZone::UTC)
        .strftime("%Y%m%dT%H%M%SZ")
        .to_string();

    let mut lines: Vec<String> = Vec::new();
    lines.push("BEGIN:VCALENDAR".to_string());
    lines.push("VERSION:2.0".to_string());
    lines.push("PRODID:-//calsync//calsync-ical//EN".to_string());
    lines.push("BEGIN:VEVENT".to_string());
    lines.push(format!("UID:{}", event.uid));
    if let Some(rid) = &event.recurrence_id {
        lines.push(format!("RECURRENCE-ID:{rid}"));
    }
    lines.push(format!("DTSTAMP:{dtstamp}"));
    lines.push(render_dtstart_like("DTSTART", &event.dtstart));
    match &event.dtend {
        Some(DtEnd::At(dt)) => lines.push(render_dtstart_like("DTEND", dt)),
        Some(DtEnd::Duration(d)) => lines.push(format!("DURATION:{d}")),
        None => {}
    }
    if let Some(summary) = &event.summary {
        lines.push(format!("SUMMARY:{}", escape(summary)));
    }
    if let Some(description) = &event.description {
        lines.push(format!("DESCRIPTION:{}", escape(description)));
    }
    if let Some(location) = &event.location {
        lines.push(format!("LOCATION:{}", escape(location)));
    }
    if let Some(rrule) = &event.rrule {
        lines.push(format!("RRULE:{rrule}"));
    }
    if !event.exdates.is_empty() {
        lines.push(format!("EXDATE:{}", event.exdates.join(",")));
    }
    if let Some(status) = event.status {
        lines.push(format!("STATUS:{}", status.as_str()));
    }
    if event.class != Classification::Public {
        lines.push(format!("CLASS:{}", event.class.as_str()));
    }
    lines.push(format!("SEQUENCE:{}", event.sequence));
    if !event.categories.is_empty() {
        lines.push(format!("CATEGORIES:{}", event.categories.join(",")));
    }
    for (name, value) in &event.extra_properties {
        lines.push(format!("{name}:{}", escape(value)));
    }
    for reminder in &event.reminders {
        lines.push("BEGIN:VALARM".to_string());
        lines.push(format!("TRIGGER:{}", reminder.trigger));
        lines.push("ACTION:DISPLAY".to_string());
        lines.push("END:VALARM".to_string());
    }
    lines.push("END:VEVENT".to_string());
    lines.push("END:VCALENDAR".to_string());

    fold_all(lines.iter().map(String::as_str))
}

fn render_dtstart_like(name: &str, dt: &DtStart) -> String {
    match dt {
        DtStart::Date { value } => format!("{name};VALUE=DATE:{value}"),
        DtStart::Utc { value } => format!("{name}:{value}"),
        DtStart::Zoned { tzid, value } => format!("{name};TZID={tzid}:{value}"),
        DtStart::Floating { value } => format!("{name}:{value}"),
    }
}
