// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Decodes a `CalDAV` resource body into zero or more VEVENTs.

use std::collections::BTreeMap;

use crate::content_line::ContentLine;
use crate::error::IcalError;
use crate::fold::unfold;
use crate::model::{
    AlarmTrigger, Classification, DtEnd, DtStart, EventStatusValue, ICalEvent,
};

/// One parsed top-level component from a resource body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedComponent {
    /// A VEVENT, fully mapped.
    Event(ICalEvent),
    /// A recognized-but-out-of-scope component (spec §1 Non-goals, §7
    /// "Non-event resource"). Never counted as a parse failure.
    NonEvent(NonEventKind),
}

/// The kinds of non-VEVENT top-level components this crate recognizes
/// without attempting to model them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NonEventKind {
    /// `VTODO`.
    Todo,
    /// `VJOURNAL`.
    Journal,
    /// `VFREEBUSY`.
    FreeBusy,
}

/// The result of parsing one `CalDAV` resource body.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ParsedCalendar {
    /// Top-level components, in document order.
    pub components: Vec<ParsedComponent>,
}

impl ParsedCalendar {
    /// The VEVENT with no `RECURRENCE-ID` (the recurring master, or the
    /// only event for a non-recurring resource).
    #[must_use]
    pub fn master(&self) -> Option<&ICalEvent> {
        self.components.iter().find_map(|c| match c {
            ParsedComponent::Event(e) if !e.is_exception() => Some(e),
            _ => None,
        })
    }

    /// All `RECURRENCE-ID` exception components.
    pub fn exceptions(&self) -> impl Iterator<Item = &ICalEvent> {
        self.components.iter().filter_map(|c| match c {
            ParsedComponent::Event(e) if e.is_exception() => Some(e),
            _ => None,
        })
    }
}

/// Parses an iCalendar body into its top-level components.
///
/// # Errors
///
/// Returns [`IcalError::MissingProperty`] if a `VEVENT` is missing `UID`,
/// `DTSTAMP`, or `DTSTART`. `VTODO`/`VJOURNAL`/`VFREEBUSY` components are
/// recognized and returned as [`ParsedComponent::NonEvent`] without being
/// validated — they are not parse failures (spec §7).
pub fn parse(ics: &str) -> Result<ParsedCalendar, IcalError> {
    let lines = unfold(ics);
    let mut components = Vec::new();
    let mut stack: Vec<&str> = Vec::new();
    let mut builder: Option<EventBuilder> = None;
    let mut alarm_depth: Option<usize> = None; // nesting depth at which the current VALARM started

    for raw in &lines {
        let line = ContentLine::parse(raw);

        if line.name.eq_ignore_ascii_case("BEGIN") {
            let kind = line.value.to_ascii_uppercase();
            stack.push(component_kind_to_str(&kind));
            match kind.as_str() {
                "VEVENT" => builder = Some(EventBuilder::default()),
                "VALARM" if builder.is_some() => alarm_depth = Some(stack.len()),
                "VTODO" | "VJOURNAL" | "VFREEBUSY" if stack.len() == 1 + top_offset(&stack) => {}
                _ => {}
            }
            continue;
        }

        if line.name.eq_ignore_ascii_case("END") {
            let kind = line.value.to_ascii_uppercase();
            if kind == "VALARM" {
                alarm_depth = None;
            }
            if kind == "VEVENT" {
                if let Some(b) = builder.take() {
                    components.push(ParsedComponent::Event(b.build()?));
                }
            } else if matches!(kind.as_str(), "VTODO" | "VJOURNAL" | "VFREEBUSY")
                && stack.len() <= 2
            {
                components.push(ParsedComponent::NonEvent(match kind.as_str() {
                    "VTODO" => NonEventKind::Todo,
                    "VJOURNAL" => NonEventKind::Journal,
                    _ => NonEventKind::FreeBusy,
                }));
            }
            stack.pop();
            continue;
        }

        // Only VEVENT-top-level properties are modeled; VALARM interior is
        // skimmed only for TRIGGER, everything else inside VALARM/other
        // nested components is ignored here (kept verbatim by the patcher).
        if let Some(b) = builder.as_mut() {
            if let Some(depth) = alarm_depth {
                if stack.len() == depth && line.name.eq_ignore_ascii_case("TRIGGER") {
                    b.push_trigger(line.value.clone());
                }
                continue;
            }
            b.apply(&line);
        }
    }

    Ok(ParsedCalendar { components })
}

fn top_offset(stack: &[&str]) -> usize {
    usize::from(stack.first() == Some(&"VCALENDAR"))
}

fn component_kind_to_str(kind: &str) -> &'static str {
    match kind {
        "VCALENDAR" => "VCALENDAR",
        "VEVENT" => "VEVENT",
        "VTODO" => "VTODO",
        "VJOURNAL" => "VJOURNAL",
        "VALARM" => "VALARM",
        "VTIMEZONE" => "VTIMEZONE",
        "VFREEBUSY" => "VFREEBUSY",
        _ => "OTHER",
    }
}

fn parse_dtstart_like(line: &ContentLine) -> DtStart {
    if line.param("VALUE") == Some("DATE") {
        return DtStart::Date {
            value: line.value.clone(),
        };
    }
    if let Some(tzid) = line.param("TZID") {
        return DtStart::Zoned {
            tzid: tzid.to_string(),
            value: line.value.clone(),
        };
    }
    if line.value.ends_with('Z') {
        return DtStart::Utc {
            value: line.value.clone(),
        };
    }
    DtStart::Floating {
        value: line.value.clone(),
    }
}

#[derive(Default)]
struct EventBuilder {
    uid: Option<String>,
    summary: Option<String>,
    description: Option<String>,
    location: Option<String>,
    dtstart: Option<DtStart>,
    dtend: Option<DtEnd>,
    rrule: Option<String>,
    exdates: Vec<String>,
    status: Option<EventStatusValue>,
    class: Option<Classification>,
    sequence: Option<i64>,
    dtstamp: Option<String>,
    recurrence_id: Option<String>,
    reminders: Vec<AlarmTrigger>,
    attendee_count: usize,
    has_organizer: bool,
    categories: Vec<String>,
    extra_properties: BTreeMap<String, String>,
}

impl EventBuilder {
    fn push_trigger(&mut self, value: String) {
        if self.reminders.len() < 3 {
            self.reminders.push(AlarmTrigger { trigger: value });
        }
    }

    fn apply(&mut self, line: &ContentLine) {
        match line.name.as_str() {
            "UID" => self.uid = Some(line.value.clone()),
            "SUMMARY" => self.summary = Some(line.value.clone()),
            "DESCRIPTION" => self.description = Some(line.value.clone()),
            "LOCATION" => self.location = Some(line.value.clone()),
            "DTSTART" => self.dtstart = Some(parse_dtstart_like(line)),
            "DTEND" => self.dtend = Some(DtEnd::At(parse_dtstart_like(line))),
            "DURATION" => self.dtend = Some(DtEnd::Duration(line.value.clone())),
            "RRULE" => self.rrule = Some(line.value.clone()),
            "EXDATE" => self
                .exdates
                .extend(line.value.split(',').map(str::to_string)),
            "STATUS" => self.status = EventStatusValue::parse(&line.value),
            "CLASS" => self.class = Some(Classification::parse(&line.value)),
            "SEQUENCE" => self.sequence = line.value.parse().ok(),
            "DTSTAMP" => self.dtstamp = Some(line.value.clone()),
            "RECURRENCE-ID" => self.recurrence_id = Some(line.value.clone()),
            "ATTENDEE" => self.attendee_count += 1,
            "ORGANIZER" => self.has_organizer = true,
            "CATEGORIES" => self
                .categories
                .extend(line.value.split(',').map(str::to_string)),
            "BEGIN" | "END" => {}
            other => {
                self.extra_properties
                    .entry(other.to_string())
                    .or_insert_with(|| line.value.clone());
            }
        }
    }

    fn build(self) -> Result<ICalEvent, IcalError> {
        let uid = self.uid.ok_or(IcalError::MissingProperty("UID"))?;
        let dtstamp = self.dtstamp.ok_or(IcalError::MissingProperty("DTSTAMP"))?;
        let dtstart = self.dtstart.ok_or(IcalError::MissingProperty("DTSTART"))?;

        Ok(ICalEvent {
            uid,
            summary: self.summary,
            description: self.description,
            location: self.location,
            dtstart,
            dtend: self.dtend,
            rrule: self.rrule,
            exdates: self.exdates,
            status: self.status,
            class: self.class.unwrap_or(Classification::Public),
            sequence: self.sequence.unwrap_or(0),
            dtstamp,
            recurrence_id: self.recurrence_id,
            reminders: self.reminders,
            attendee_count: self.attendee_count,
            has_organizer: self.has_organizer,
            categories: self.categories,
            extra_properties: self.extra_properties,
        })
    }
}
