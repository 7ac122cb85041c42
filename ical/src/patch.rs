// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Patching serializer (spec'd as "patch policy" in the component design):
//! given the original resource text and the locally edited fields, produce
//! a new resource body identical to the original except for the properties
//! the local model lets the user change.

use crate::content_line::{ContentLine, escape};
use crate::error::IcalError;
use crate::fold::{fold_all, unfold};
use crate::model::{Classification, DtEnd, DtStart, EventStatusValue};

/// The properties a local edit can change. Everything else in the original
/// text — `VALARM`, `ATTENDEE`, `ORGANIZER`, `CATEGORIES`, `X-*`,
/// `VTIMEZONE` — is left untouched by [`patch`].
#[derive(Debug, Clone)]
pub struct PatchFields<'a> {
    /// New `SUMMARY`, or `None` to drop the property entirely.
    pub summary: Option<&'a str>,
    /// New `DESCRIPTION`, or `None` to drop it.
    pub description: Option<&'a str>,
    /// New `LOCATION`, or `None` to drop it.
    pub location: Option<&'a str>,
    /// New `DTSTART`.
    pub dtstart: &'a DtStart,
    /// New `DTEND`/`DURATION`, or `None` to drop both.
    pub dtend: Option<&'a DtEnd>,
    /// New `RRULE`, or `None` to drop it.
    pub rrule: Option<&'a str>,
    /// New `EXDATE` values. Emitted as a single comma-joined line when
    /// non-empty, dropped entirely when empty.
    pub exdates: &'a [String],
    /// New `STATUS`, or `None` to drop it.
    pub status: Option<EventStatusValue>,
    /// New `CLASS`.
    pub class: Classification,
}

/// Names of properties this module rewrites at `VEVENT` top level. `DTSTAMP`
/// and `SEQUENCE` are derived rather than taken from `fields`, but they are
/// members of the same "rewritten, not preserved" set.
const EDITABLE: &[&str] = &[
    "SUMMARY",
    "DESCRIPTION",
    "LOCATION",
    "DTSTART",
    "DTEND",
    "DURATION",
    "RRULE",
    "EXDATE",
    "STATUS",
    "CLASS",
    "SEQUENCE",
    "DTSTAMP",
];

/// Patches `original` so that the `VEVENT` identified by `uid` and
/// `recurrence_id` reflects `fields`, leaving everything else in the
/// resource — including other components — byte-for-byte equivalent in
/// content (folding of untouched lines may differ; values do not).
///
/// `SEQUENCE` is read from the matched block and incremented by one;
/// `DTSTAMP` is set to `now`.
///
/// # Errors
///
/// Returns [`IcalError::ComponentNotFound`] if no `VEVENT` in `original`
/// matches `uid`/`recurrence_id`, and [`IcalError::Malformed`] if `original`
/// has unbalanced `BEGIN`/`END` pairs.
pub fn patch(
    original: &str,
    uid: &str,
    recurrence_id: Option<&str>,
    fields: &PatchFields<'_>,
    now: &jiff::Zoned,
) -> Result<String, IcalError> {
    let lines = unfold(original);
    let (start, end) = find_event_block(&lines, uid, recurrence_id)?;

    let sequence = block_sequence(&lines[start..=end]);
    let dtstamp = now.with_time_zone(jiff::tz::TimeZone::UTC).strftime("%Y%m%dT%H%M%SZ").to_string();

    let mut rendered: Vec<String> = Vec::new();
    let mut spliced = false;
    let mut depth = 0usize;

    rendered.push(lines[start].clone()); // BEGIN:VEVENT

    for raw in &lines[start + 1..end] {
        let line = ContentLine::parse(raw);
        if line.name.eq_ignore_ascii_case("BEGIN") {
            depth += 1;
            rendered.push(raw.clone());
            continue;
        }
        if line.name.eq_ignore_ascii_case("END") {
            depth = depth.saturating_sub(1);
            rendered.push(raw.clone());
            continue;
        }
        if depth == 0 && EDITABLE.iter().any(|n| line.name.eq_ignore_ascii_case(n)) {
            if !spliced {
                rendered.extend(render_fields(fields, sequence + 1, &dtstamp));
                spliced = true;
            }
            continue;
        }
        rendered.push(raw.clone());
    }

    if !spliced {
        rendered.extend(render_fields(fields, sequence + 1, &dtstamp));
    }

    rendered.push(lines[end].clone()); // END:VEVENT

    let mut out_lines: Vec<&str> = Vec::with_capacity(lines.len());
    out_lines.extend(lines[..start].iter().map(String::as_str));
    out_lines.extend(rendered.iter().map(String::as_str));
    out_lines.extend(lines[end + 1..].iter().map(String::as_str));

    Ok(fold_all(out_lines))
}

/// Locates the `[start, end]` (inclusive) line indices of the `BEGIN:VEVENT`
/// / `END:VEVENT` pair whose `UID`/`RECURRENCE-ID` match.
fn find_event_block(
    lines: &[String],
    uid: &str,
    recurrence_id: Option<&str>,
) -> Result<(usize, usize), IcalError> {
    let mut stack: Vec<usize> = Vec::new(); // indices of open BEGIN:VEVENT lines at current nesting
    let mut depth = 0usize;
    let mut candidate_start: Option<usize> = None;
    let mut candidate_depth = 0usize;

    for (idx, raw) in lines.iter().enumerate() {
        let line = ContentLine::parse(raw);
        if line.name.eq_ignore_ascii_case("BEGIN") {
            if line.value.eq_ignore_ascii_case("VEVENT") && candidate_start.is_none() {
                candidate_start = Some(idx);
                candidate_depth = depth;
                stack.clear();
            }
            depth += 1;
            continue;
        }
        if line.name.eq_ignore_ascii_case("END") {
            if depth == 0 {
                return Err(IcalError::Malformed("unbalanced END".to_string()));
            }
            depth -= 1;
            if line.value.eq_ignore_ascii_case("VEVENT") && depth == candidate_depth {
                if let Some(cs) = candidate_start {
                    if block_matches(&lines[cs..=idx], uid, recurrence_id) {
                        return Ok((cs, idx));
                    }
                }
                candidate_start = None;
            }
            continue;
        }
    }

    Err(IcalError::ComponentNotFound {
        uid: uid.to_string(),
        recurrence_id: recurrence_id.map(str::to_string),
    })
}

fn block_matches(block: &[String], uid: &str, recurrence_id: Option<&str>) -> bool {
    let mut found_uid: Option<String> = None;
    let mut found_rid: Option<String> = None;
    let mut depth = 0usize;
    for raw in block {
        let line = ContentLine::parse(raw);
        if line.name.eq_ignore_ascii_case("BEGIN") {
            depth += 1;
            continue;
        }
        if line.name.eq_ignore_ascii_case("END") {
            depth = depth.saturating_sub(1);
            continue;
        }
        if depth == 1 {
            if line.name.eq_ignore_ascii_case("UID") {
                found_uid = Some(line.value.clone());
            } else if line.name.eq_ignore_ascii_case("RECURRENCE-ID") {
                found_rid = Some(line.value.clone());
            }
        }
    }
    found_uid.as_deref() == Some(uid) && found_rid.as_deref() == recurrence_id
}

fn block_sequence(block: &[String]) -> i64 {
    let mut depth = 0usize;
    for raw in block {
        let line = ContentLine::parse(raw);
        if line.name.eq_ignore_ascii_case("BEGIN") {
            depth += 1;
            continue;
        }
        if line.name.eq_ignore_ascii_case("END") {
            depth = depth.saturating_sub(1);
            continue;
        }
        if depth == 1 && line.name.eq_ignore_ascii_case("SEQUENCE") {
            return line.value.parse().unwrap_or(0);
        }
    }
    0
}

fn render_dtstart_like(name: &str, dt: &DtStart) -> String {
    match dt {
        DtStart::Date { value } => format!("{name};VALUE=DATE:{value}"),
        DtStart::Utc { value } => format!("{name}:{value}"),
        DtStart::Zoned { tzid, value } => format!("{name};TZID={tzid}:{value}"),
        DtStart::Floating { value } => format!("{name}:{value}"),
    }
}

fn render_fields(fields: &PatchFields<'_>, sequence: i64, dtstamp: &str) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(summary) = fields.summary {
        out.push(format!("SUMMARY:{}", escape(summary)));
    }
    if let Some(description) = fields.description {
        out.push(format!("DESCRIPTION:{}", escape(description)));
    }
    if let Some(location) = fields.location {
        out.push(format!("LOCATION:{}", escape(location)));
    }
    out.push(render_dtstart_like("DTSTART", fields.dtstart));
    match fields.dtend {
        Some(DtEnd::At(dt)) => out.push(render_dtstart_like("DTEND", dt)),
        Some(DtEnd::Duration(d)) => out.push(format!("DURATION:{d}")),
        None => {}
    }
    if let Some(rrule) = fields.rrule {
        out.push(format!("RRULE:{rrule}"));
    }
    if !fields.exdates.is_empty() {
        out.push(format!("EXDATE:{}", fields.exdates.join(",")));
    }
    if let Some(status) = fields.status {
        out.push(format!("STATUS:{}", status.as_str()));
    }
    out.push(format!("CLASS:{}", fields.class.as_str()));
    out.push(format!("SEQUENCE:{sequence}"));
    out.push(format!("DTSTAMP:{dtstamp}"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> String {
        "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
BEGIN:VEVENT\r\n\
UID:u1\r\n\
DTSTAMP:20251215T120000Z\r\n\
DTSTART:20251215T140000Z\r\n\
DTEND:20251215T150000Z\r\n\
SUMMARY:Old Summary\r\n\
SEQUENCE:2\r\n\
ORGANIZER:mailto:a@example.com\r\n\
ATTENDEE:mailto:b@example.com\r\n\
CATEGORIES:Work\r\n\
X-CUSTOM:keep-me\r\n\
BEGIN:VALARM\r\n\
TRIGGER:-PT15M\r\n\
ACTION:DISPLAY\r\n\
END:VALARM\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n"
            .to_string()
    }

    fn now() -> jiff::Zoned {
        "2025-12-16T00:00:00Z".parse().unwrap()
    }

    #[test]
    fn patches_editable_fields_and_bumps_sequence() {
        let original = sample();
        let dtstart = DtStart::Utc {
            value: "20251216T140000Z".to_string(),
        };
        let fields = PatchFields {
            summary: Some("New Summary"),
            description: None,
            location: None,
            dtstart: &dtstart,
            dtend: None,
            rrule: None,
            exdates: &[],
            status: None,
            class: Classification::Public,
        };
        let patched = patch(&original, "u1", None, &fields, &now()).unwrap();
        assert!(patched.contains("SUMMARY:New Summary"));
        assert!(patched.contains("SEQUENCE:3"));
        assert!(patched.contains("DTSTAMP:20251216T000000Z"));
        assert!(patched.contains("DTSTART:20251216T140000Z"));
    }

    #[test]
    fn preserves_untouched_properties() {
        let original = sample();
        let dtstart = DtStart::Utc {
            value: "20251216T140000Z".to_string(),
        };
        let fields = PatchFields {
            summary: Some("New Summary"),
            description: None,
            location: None,
            dtstart: &dtstart,
            dtend: None,
            rrule: None,
            exdates: &[],
            status: None,
            class: Classification::Public,
        };
        let patched = patch(&original, "u1", None, &fields, &now()).unwrap();
        assert!(patched.contains("ORGANIZER:mailto:a@example.com"));
        assert!(patched.contains("ATTENDEE:mailto:b@example.com"));
        assert!(patched.contains("CATEGORIES:Work"));
        assert!(patched.contains("X-CUSTOM:keep-me"));
        assert!(patched.contains("BEGIN:VALARM"));
        assert!(patched.contains("TRIGGER:-PT15M"));
    }

    #[test]
    fn unknown_uid_is_component_not_found() {
        let original = sample();
        let dtstart = DtStart::Utc {
            value: "20251216T140000Z".to_string(),
        };
        let fields = PatchFields {
            summary: None,
            description: None,
            location: None,
            dtstart: &dtstart,
            dtend: None,
            rrule: None,
            exdates: &[],
            status: None,
            class: Classification::Public,
        };
        let err = patch(&original, "does-not-exist", None, &fields, &now()).unwrap_err();
        assert!(matches!(err, IcalError::ComponentNotFound { .. }));
    }
}
