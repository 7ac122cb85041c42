// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Request builders for `CalDAV`/`WebDAV` operations (spec §4.2, §6).

use std::io::Cursor;

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};

use crate::error::CalDavError;
use crate::xml::ns;

/// PROPFIND request builder.
#[derive(Debug, Default)]
pub struct PropFindRequest {
    props: Vec<Prop>,
}

/// Properties requestable via PROPFIND (spec §6 "External interfaces").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Prop {
    /// `DAV:displayname`.
    DisplayName,
    /// `DAV:resourcetype`.
    ResourceType,
    /// `DAV:getetag`.
    GetETag,
    /// `CALDAV:calendar-data`.
    CalendarData,
    /// `DAV:current-user-principal`.
    CurrentUserPrincipal,
    /// `CALDAV:calendar-home-set`.
    CalendarHomeSet,
    /// `CALDAV:supported-calendar-component-set`.
    SupportedCalendarComponents,
    /// `CALDAV:calendar-description`.
    CalendarDescription,
    /// `CALDAV:calendar-color` (Apple extension, widely implemented).
    CalendarColor,
    /// `CS:getctag`.
    GetCtag,
    /// `DAV:sync-token`.
    SyncToken,
}

impl Prop {
    const fn name(self) -> &'static str {
        match self {
            Self::DisplayName => "displayname",
            Self::ResourceType => "resourcetype",
            Self::GetETag => "getetag",
            Self::CalendarData => "calendar-data",
            Self::CurrentUserPrincipal => "current-user-principal",
            Self::CalendarHomeSet => "calendar-home-set",
            Self::SupportedCalendarComponents => "supported-calendar-component-set",
            Self::CalendarDescription => "calendar-description",
            Self::CalendarColor => "calendar-color",
            Self::GetCtag => "getctag",
            Self::SyncToken => "sync-token",
        }
    }

    const fn prefix(self) -> &'static str {
        match self {
            Self::DisplayName
            | Self::ResourceType
            | Self::GetETag
            | Self::SyncToken
            | Self::CurrentUserPrincipal => "D",
            Self::CalendarData
            | Self::CalendarHomeSet
            | Self::SupportedCalendarComponents
            | Self::CalendarDescription
            | Self::CalendarColor => "C",
            Self::GetCtag => "CS",
        }
    }

    const fn namespace(self) -> Option<&'static str> {
        match self.prefix() {
            "C" => Some(ns::CALDAV),
            "CS" => Some(ns::CS),
            _ => None,
        }
    }
}

impl PropFindRequest {
    /// Creates an empty PROPFIND request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a property to request.
    pub fn add_property(&mut self, prop: Prop) -> &mut Self {
        self.props.push(prop);
        self
    }

    /// Builds the XML body.
    ///
    /// # Errors
    ///
    /// Returns an error if XML writing fails.
    pub fn build(&self) -> Result<String, CalDavError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        let mut propfind = BytesStart::new("D:propfind");
        propfind.push_attribute(("xmlns:D", ns::DAV));
        if self.props.iter().any(|p| p.namespace() == Some(ns::CALDAV)) {
            propfind.push_attribute(("xmlns:C", ns::CALDAV));
        }
        if self.props.iter().any(|p| p.namespace() == Some(ns::CS)) {
            propfind.push_attribute(("xmlns:CS", ns::CS));
        }
        writer.write_event(Event::Start(propfind))?;
        writer.write_event(Event::Start(BytesStart::new("D:prop")))?;

        for prop in &self.props {
            let tag = format!("{}:{}", prop.prefix(), prop.name());
            writer.write_event(Event::Start(BytesStart::new(tag.clone())))?;
            writer.write_event(Event::End(BytesEnd::new(tag)))?;
        }

        writer.write_event(Event::End(BytesEnd::new("D:prop")))?;
        writer.write_event(Event::End(BytesEnd::new("D:propfind")))?;

        into_string(writer)
    }
}

/// A `CALDAV:time-range` filter.
#[derive(Debug, Clone)]
pub struct TimeRange {
    /// Start, as a `YYYYMMDDTHHMMSSZ` value.
    pub start: String,
    /// End, as a `YYYYMMDDTHHMMSSZ` value.
    pub end: String,
}

/// A `CALDAV:text-match` sub-filter. Not currently emitted by any operation
/// this crate exposes, but kept so a caller can extend [`CalendarQueryRequest`]
/// without changing its public shape.
#[derive(Debug, Clone)]
pub struct TextMatch {
    /// Text to search for.
    pub text: String,
    /// Whether to negate the match.
    pub negate: bool,
}

/// `CALDAV:calendar-query` REPORT builder, always filtering to `VEVENT`
/// (spec §4.2 "comp-filter VEVENT") since VTODO/VJOURNAL are out of scope.
#[derive(Debug, Clone, Default)]
pub struct CalendarQueryRequest {
    time_range: Option<TimeRange>,
}

impl CalendarQueryRequest {
    /// Creates a query with no time-range restriction.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Restricts the query to a time range (spec §4.6 `fetchEtagsInRange`).
    #[must_use]
    pub fn time_range(mut self, start: String, end: String) -> Self {
        self.time_range = Some(TimeRange { start, end });
        self
    }

    /// Builds the XML body. Requests only `getetag` (spec §4.6 step A
    /// fetches `(href, etag)` pairs, not bodies).
    ///
    /// # Errors
    ///
    /// Returns an error if XML writing fails.
    pub fn build(&self) -> Result<String, CalDavError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        let mut root = BytesStart::new("C:calendar-query");
        root.push_attribute(("xmlns:D", ns::DAV));
        root.push_attribute(("xmlns:C", ns::CALDAV));
        writer.write_event(Event::Start(root))?;

        writer.write_event(Event::Start(BytesStart::new("D:prop")))?;
        write_empty(&mut writer, "D:getetag")?;
        writer.write_event(Event::End(BytesEnd::new("D:prop")))?;

        writer.write_event(Event::Start(BytesStart::new("C:filter")))?;
        let mut vcal = BytesStart::new("C:comp-filter");
        vcal.push_attribute(("name", "VCALENDAR"));
        writer.write_event(Event::Start(vcal))?;

        let mut vevent = BytesStart::new("C:comp-filter");
        vevent.push_attribute(("name", "VEVENT"));
        writer.write_event(Event::Start(vevent))?;
        if let Some(tr) = &self.time_range {
            let mut tr_elem = BytesStart::new("C:time-range");
            tr_elem.push_attribute(("start", tr.start.as_str()));
            tr_elem.push_attribute(("end", tr.end.as_str()));
            writer.write_event(Event::Empty(tr_elem))?;
        }
        writer.write_event(Event::End(BytesEnd::new("C:comp-filter")))?;

        writer.write_event(Event::End(BytesEnd::new("C:comp-filter")))?;
        writer.write_event(Event::End(BytesEnd::new("C:filter")))?;
        writer.write_event(Event::End(BytesEnd::new("C:calendar-query")))?;

        into_string(writer)
    }
}

/// `CALDAV:calendar-multiget` REPORT builder (spec §4.2 `fetchEventsByHref`).
#[derive(Debug, Clone, Default)]
pub struct CalendarMultiGetRequest {
    hrefs: Vec<String>,
}

impl CalendarMultiGetRequest {
    /// Creates an empty multiget request.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an href to fetch.
    pub fn add_href(&mut self, href: String) -> &mut Self {
        self.hrefs.push(href);
        self
    }

    /// Builds the XML body, requesting `getetag` and `calendar-data`.
    ///
    /// # Errors
    ///
    /// Returns an error if XML writing fails.
    pub fn build(&self) -> Result<String, CalDavError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        let mut root = BytesStart::new("C:calendar-multiget");
        root.push_attribute(("xmlns:D", ns::DAV));
        root.push_attribute(("xmlns:C", ns::CALDAV));
        writer.write_event(Event::Start(root))?;

        writer.write_event(Event::Start(BytesStart::new("D:prop")))?;
        write_empty(&mut writer, "D:getetag")?;
        write_empty(&mut writer, "C:calendar-data")?;
        writer.write_event(Event::End(BytesEnd::new("D:prop")))?;

        for href in &self.hrefs {
            writer.write_event(Event::Start(BytesStart::new("D:href")))?;
            writer.write_event(Event::Text(BytesText::new(href.as_str())))?;
            writer.write_event(Event::End(BytesEnd::new("D:href")))?;
        }

        writer.write_event(Event::End(BytesEnd::new("C:calendar-multiget")))?;

        into_string(writer)
    }
}

/// `DAV:sync-collection` REPORT builder (RFC 6578, spec §4.2 `syncCollection`).
#[derive(Debug, Clone)]
pub struct SyncCollectionRequest {
    sync_token: Option<String>,
}

impl SyncCollectionRequest {
    /// Creates a request. `sync_token` is `None` for the initial sync.
    #[must_use]
    pub const fn new(sync_token: Option<String>) -> Self {
        Self { sync_token }
    }

    /// Builds the XML body.
    ///
    /// # Errors
    ///
    /// Returns an error if XML writing fails.
    pub fn build(&self) -> Result<String, CalDavError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        let mut root = BytesStart::new("D:sync-collection");
        root.push_attribute(("xmlns:D", ns::DAV));
        root.push_attribute(("xmlns:C", ns::CALDAV));
        writer.write_event(Event::Start(root))?;

        writer.write_event(Event::Start(BytesStart::new("D:sync-token")))?;
        if let Some(token) = &self.sync_token {
            writer.write_event(Event::Text(BytesText::new(token)))?;
        }
        writer.write_event(Event::End(BytesEnd::new("D:sync-token")))?;

        writer.write_event(Event::Start(BytesStart::new("D:sync-level")))?;
        writer.write_event(Event::Text(BytesText::new("1")))?;
        writer.write_event(Event::End(BytesEnd::new("D:sync-level")))?;

        writer.write_event(Event::Start(BytesStart::new("D:prop")))?;
        write_empty(&mut writer, "D:getetag")?;
        writer.write_event(Event::End(BytesEnd::new("D:prop")))?;

        writer.write_event(Event::End(BytesEnd::new("D:sync-collection")))?;

        into_string(writer)
    }
}

/// `CALDAV:free-busy-query` REPORT builder. Free/busy is orthogonal to event
/// sync and not non-goal'd; kept as a capability of the wire layer the way
/// the teacher crate exposed it.
#[derive(Debug, Clone)]
pub struct FreeBusyQueryRequest {
    start: String,
    end: String,
}

impl FreeBusyQueryRequest {
    /// Creates a free/busy query for `[start, end)`.
    #[must_use]
    pub const fn new(start: String, end: String) -> Self {
        Self { start, end }
    }

    /// Builds the XML body.
    ///
    /// # Errors
    ///
    /// Returns an error if XML writing fails.
    pub fn build(&self) -> Result<String, CalDavError> {
        let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

        let mut root = BytesStart::new("C:free-busy-query");
        root.push_attribute(("xmlns:D", ns::DAV));
        root.push_attribute(("xmlns:C", ns::CALDAV));
        writer.write_event(Event::Start(root))?;

        let mut tr = BytesStart::new("C:time-range");
        tr.push_attribute(("start", self.start.as_str()));
        tr.push_attribute(("end", self.end.as_str()));
        writer.write_event(Event::Empty(tr))?;

        writer.write_event(Event::End(BytesEnd::new("C:free-busy-query")))?;

        into_string(writer)
    }
}

fn write_empty(writer: &mut Writer<Cursor<Vec<u8>>>, tag: &str) -> Result<(), quick_xml::Error> {
    writer.write_event(Event::Start(BytesStart::new(tag)))?;
    writer.write_event(Event::End(BytesEnd::new(tag)))
}

fn into_string(writer: Writer<Cursor<Vec<u8>>>) -> Result<String, CalDavError> {
    String::from_utf8(writer.into_inner().into_inner())
        .map_err(|e| CalDavError::Xml(format!("UTF-8 error: {e}")))
}
