// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Multi-status (RFC 4918 §13) response parsing.
//!
//! A single `<D:response>` may carry more than one `<D:propstat>` — one
//! `200 OK` block for the properties the server has, and one `404 Not
//! Found` block for properties it doesn't (spec §4.2: "a single href may
//! have `200 OK` for some properties and `404 Not Found` for missing
//! optional properties — such propstat entries must be merged, not treated
//! as a failure for the href"). [`MultiStatusResponse::from_xml`] merges
//! every `2xx` propstat's properties into one [`Properties`] per href and
//! ignores `404` propstats entirely; it never fails a whole href because
//! one optional property was missing.

use quick_xml::events::Event;

use crate::error::CalDavError;
use crate::types::{CalendarCollection, CalendarResource, ETag, Href, SyncChange, SyncToken};

/// A parsed `WebDAV`/`CalDAV` multi-status response.
#[derive(Debug, Clone, Default)]
pub struct MultiStatusResponse {
    /// One entry per `<D:response>` href.
    pub responses: Vec<ResponseItem>,
    /// `<D:sync-token>` carried at the top level of a `sync-collection`
    /// response, if present.
    pub sync_token: Option<SyncToken>,
}

/// One `<D:response>` element, with its per-href top-level status (used by
/// `sync-collection` to signal deletion) and its merged properties.
#[derive(Debug, Clone)]
pub struct ResponseItem {
    /// The resource href.
    pub href: Href,
    /// The `<D:status>` directly under `<D:response>`, when the server uses
    /// that form instead of a `propstat` (sync-collection deletions).
    pub status: Option<String>,
    /// Properties merged across every `2xx` `<D:propstat>` block.
    pub props: Properties,
    /// Whether any `2xx` propstat was seen at all (distinguishes "no
    /// properties returned" from "this href itself 404'd").
    pub has_success_propstat: bool,
}

impl ResponseItem {
    /// Whether this response signals the resource no longer exists: either
    /// a bare `404` response-level status, or no successful propstat and no
    /// bare success status either.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        if let Some(status) = &self.status {
            return status_code(status) == Some(404);
        }
        !self.has_success_propstat
    }
}

/// Properties merged from every successful `propstat` block for one href.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    /// `DAV:displayname`.
    pub display_name: Option<String>,
    /// `DAV:resourcetype` child element local names.
    pub resource_types: Vec<String>,
    /// `DAV:getetag`.
    pub get_etag: Option<ETag>,
    /// `CALDAV:calendar-data`.
    pub calendar_data: Option<String>,
    /// `DAV:current-user-principal` href.
    pub current_user_principal: Option<Href>,
    /// `CALDAV:calendar-home-set` href.
    pub calendar_home_set: Option<Href>,
    /// `CALDAV:supported-calendar-component-set` names.
    pub supported_calendar_components: Option<Vec<String>>,
    /// `CALDAV:calendar-description`.
    pub calendar_description: Option<String>,
    /// `CALDAV:calendar-color`.
    pub calendar_color: Option<String>,
    /// `CS:getctag`.
    pub getctag: Option<String>,
    /// `DAV:sync-token` (when requested as a plain property rather than via
    /// a `sync-collection` REPORT).
    pub sync_token: Option<SyncToken>,
}

impl Properties {
    fn is_calendar(&self) -> bool {
        self.resource_types.iter().any(|t| t.eq_ignore_ascii_case("calendar"))
    }

    /// Merges `other`'s set fields into `self`, first-propstat-wins for any
    /// field already populated.
    fn merge(&mut self, other: Properties) {
        self.display_name = self.display_name.take().or(other.display_name);
        if self.resource_types.is_empty() {
            self.resource_types = other.resource_types;
        }
        self.get_etag = self.get_etag.take().or(other.get_etag);
        self.calendar_data = self.calendar_data.take().or(other.calendar_data);
        self.current_user_principal = self.current_user_principal.take().or(other.current_user_principal);
        self.calendar_home_set = self.calendar_home_set.take().or(other.calendar_home_set);
        self.supported_calendar_components = self
            .supported_calendar_components
            .take()
            .or(other.supported_calendar_components);
        self.calendar_description = self.calendar_description.take().or(other.calendar_description);
        self.calendar_color = self.calendar_color.take().or(other.calendar_color);
        self.getctag = self.getctag.take().or(other.getctag);
        self.sync_token = self.sync_token.take().or(other.sync_token);
    }
}

fn status_code(status: &str) -> Option<u16> {
    status.split_whitespace().nth(1)?.parse().ok()
}

fn is_success_status(status: &str) -> bool {
    status_code(status).is_some_and(|c| (200..300).contains(&c))
}

impl MultiStatusResponse {
    /// Parses a `<D:multistatus>` body.
    ///
    /// # Errors
    ///
    /// Returns [`CalDavError::Xml`] if the body is not well-formed XML.
    pub fn from_xml(xml: &str) -> Result<Self, CalDavError> {
        let mut reader = quick_xml::Reader::from_str(xml);
        reader.config_mut().trim_text(true);

        let mut responses = Vec::new();
        let mut top_sync_token: Option<SyncToken> = None;

        let mut cur_href: Option<Href> = None;
        let mut cur_status: Option<String> = None;
        let mut cur_props = Properties::default();
        let mut has_success_propstat = false;
        let mut in_response = false;

        let mut buf = Vec::new();
        loop {
            let ev = reader.read_event_into(&mut buf)?;
            match ev {
                Event::Eof => break,
                Event::Start(ref e) if local_name(e.name().as_ref()) == "response" => {
                    in_response = true;
                    cur_href = None;
                    cur_status = None;
                    cur_props = Properties::default();
                    has_success_propstat = false;
                }
                Event::End(ref e) if local_name(e.name().as_ref()) == "response" => {
                    in_response = false;
                    if let Some(href) = cur_href.take() {
                        responses.push(ResponseItem {
                            href,
                            status: cur_status.take(),
                            props: std::mem::take(&mut cur_props),
                            has_success_propstat,
                        });
                    }
                }
                Event::Start(ref e) if in_response && local_name(e.name().as_ref()) == "href" => {
                    if let Some(text) = read_text(&mut reader, &mut buf)? {
                        cur_href = Some(Href::new(text));
                    }
                }
                Event::Start(ref e) if in_response && local_name(e.name().as_ref()) == "status" => {
                    if let Some(text) = read_text(&mut reader, &mut buf)? {
                        cur_status = Some(text);
                    }
                }
                Event::Start(ref e) if in_response && local_name(e.name().as_ref()) == "propstat" => {
                    let (props, status) = parse_propstat(&mut reader, &mut buf)?;
                    if is_success_status(&status) {
                        has_success_propstat = true;
                        cur_props.merge(props);
                    }
                }
                Event::Start(ref e) if !in_response && local_name(e.name().as_ref()) == "sync-token" => {
                    if let Some(text) = read_text(&mut reader, &mut buf)? {
                        top_sync_token = Some(SyncToken::new(text));
                    }
                }
                _ => {}
            }
            buf.clear();
        }

        Ok(Self {
            responses,
            sync_token: top_sync_token,
        })
    }

    /// Converts every response with a successful propstat and `calendar-data`
    /// into a [`CalendarResource`].
    #[must_use]
    pub fn into_resources(self) -> Vec<CalendarResource> {
        self.responses
            .into_iter()
            .filter(|r| r.has_success_propstat)
            .filter_map(|r| {
                let data = r.props.calendar_data?;
                let etag = r.props.get_etag.unwrap_or_else(|| ETag::new(String::new()));
                Some(CalendarResource::new(r.href, etag, data))
            })
            .collect()
    }

    /// Converts every response advertising `DAV:resourcetype` `calendar`
    /// into a [`CalendarCollection`].
    #[must_use]
    pub fn into_collections(self) -> Vec<CalendarCollection> {
        self.responses
            .into_iter()
            .filter(|r| r.has_success_propstat && r.props.is_calendar())
            .map(|r| CalendarCollection {
                href: r.href,
                display_name: r.props.display_name,
                description: r.props.calendar_description,
                color: r.props.calendar_color,
                supported_components: r.props.supported_calendar_components.unwrap_or_default(),
                is_calendar: true,
                ctag: r.props.getctag,
                sync_token: r.props.sync_token,
                is_read_only: false,
            })
            .collect()
    }

    /// Extracts `(href, etag)` pairs for every response with a successful
    /// propstat and an etag (spec §4.6 `fetchEtagsInRange`).
    #[must_use]
    pub fn into_etags(self) -> Vec<(Href, ETag)> {
        self.responses
            .into_iter()
            .filter(|r| r.has_success_propstat)
            .filter_map(|r| Some((r.href, r.props.get_etag?)))
            .collect()
    }

    /// Splits responses from a `sync-collection` REPORT into changed and
    /// deleted hrefs (spec §4.2 `syncCollection` return shape).
    #[must_use]
    pub fn into_sync_result(self) -> (Vec<SyncChange>, Vec<Href>) {
        let mut changed = Vec::new();
        let mut deleted = Vec::new();
        for r in self.responses {
            if r.is_removed() {
                deleted.push(r.href);
            } else {
                changed.push(SyncChange {
                    href: r.href,
                    etag: r.props.get_etag,
                    removed: false,
                });
            }
        }
        (changed, deleted)
    }
}

fn parse_propstat(
    reader: &mut quick_xml::Reader<&[u8]>,
    buf: &mut Vec<u8>,
) -> Result<(Properties, String), CalDavError> {
    let mut props = Properties::default();
    let mut status = String::new();
    let mut in_prop = false;

    loop {
        match reader.read_event_into(buf)? {
            Event::End(ref e) if local_name(e.name().as_ref()) == "propstat" => break,
            Event::Eof => return Err(CalDavError::Xml("unexpected EOF in propstat".to_string())),
            Event::Start(ref e) if local_name(e.name().as_ref()) == "prop" => in_prop = true,
            Event::End(ref e) if local_name(e.name().as_ref()) == "prop" => in_prop = false,
            Event::Start(ref e) if local_name(e.name().as_ref()) == "status" => {
                if let Some(text) = read_text(reader, buf)? {
                    status = text;
                }
            }
            Event::Start(ref e) if in_prop => {
                let name = local_name(e.name().as_ref()).to_string();
                match name.as_str() {
                    "resourcetype" => {
                        props.resource_types = read_child_names(reader, buf, "resourcetype")?;
                    }
                    "supported-calendar-component-set" => {
                        props.supported_calendar_components =
                            Some(read_comp_names(reader, buf)?);
                    }
                    "current-user-principal" | "calendar-home-set" => {
                        let href = read_inner_href(reader, buf, &name)?;
                        if name == "current-user-principal" {
                            props.current_user_principal = href.map(Href::new);
                        } else {
                            props.calendar_home_set = href.map(Href::new);
                        }
                    }
                    other => {
                        if let Some(text) = read_text(reader, buf)? {
                            match other {
                                "displayname" => props.display_name = Some(text),
                                "getetag" => props.get_etag = Some(ETag::new(text)),
                                "calendar-data" => props.calendar_data = Some(text),
                                "calendar-description" => props.calendar_description = Some(text),
                                "calendar-color" => props.calendar_color = Some(text),
                                "getctag" => props.getctag = Some(text),
                                "sync-token" => props.sync_token = Some(SyncToken::new(text)),
                                _ => {}
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    Ok((props, status))
}

/// Reads the text content immediately following a start tag, consuming up
/// to (and including) its matching end tag. Returns `None` for an empty
/// element (`<foo/>`) or an element with no text content.
fn read_text(
    reader: &mut quick_xml::Reader<&[u8]>,
    buf: &mut Vec<u8>,
) -> Result<Option<String>, CalDavError> {
    let mut text = None;
    loop {
        match reader.read_event_into(buf)? {
            Event::Text(t) => text = Some(t.unescape()?.into_owned()),
            Event::End(_) => break,
            Event::Eof => return Err(CalDavError::Xml("unexpected EOF reading text".to_string())),
            _ => {}
        }
    }
    Ok(text)
}

/// Reads the local names of every direct child element until `end_name`
/// closes (used for `resourcetype`'s `<D:collection/><CALDAV:calendar/>`).
fn read_child_names(
    reader: &mut quick_xml::Reader<&[u8]>,
    buf: &mut Vec<u8>,
    end_name: &str,
) -> Result<Vec<String>, CalDavError> {
    let mut names = Vec::new();
    loop {
        match reader.read_event_into(buf)? {
            Event::End(ref e) if local_name(e.name().as_ref()) == end_name => break,
            Event::Start(ref e) | Event::Empty(ref e) => {
                names.push(local_name(e.name().as_ref()).to_string());
            }
            Event::Eof => return Err(CalDavError::Xml("unexpected EOF in resourcetype".to_string())),
            _ => {}
        }
    }
    Ok(names)
}

fn read_comp_names(
    reader: &mut quick_xml::Reader<&[u8]>,
    buf: &mut Vec<u8>,
) -> Result<Vec<String>, CalDavError> {
    let mut names = Vec::new();
    loop {
        match reader.read_event_into(buf)? {
            Event::End(ref e)
                if local_name(e.name().as_ref()) == "supported-calendar-component-set" =>
            {
                break;
            }
            Event::Start(ref e) | Event::Empty(ref e)
                if local_name(e.name().as_ref()) == "comp" =>
            {
                if let Ok(Some(attr)) = e.try_get_attribute("name") {
                    names.push(
                        std::str::from_utf8(&attr.value)
                            .map_err(|e| CalDavError::Xml(format!("UTF-8 error: {e}")))?
                            .to_string(),
                    );
                }
            }
            Event::Eof => {
                return Err(CalDavError::Xml(
                    "unexpected EOF in supported-calendar-component-set".to_string(),
                ));
            }
            _ => {}
        }
    }
    Ok(names)
}

fn read_inner_href(
    reader: &mut quick_xml::Reader<&[u8]>,
    buf: &mut Vec<u8>,
    end_name: &str,
) -> Result<Option<String>, CalDavError> {
    let mut href = None;
    loop {
        match reader.read_event_into(buf)? {
            Event::End(ref e) if local_name(e.name().as_ref()) == end_name => break,
            Event::Start(ref e) if local_name(e.name().as_ref()) == "href" => {
                href = read_text(reader, buf)?;
            }
            Event::Eof => return Err(CalDavError::Xml(format!("unexpected EOF in {end_name}"))),
            _ => {}
        }
    }
    Ok(href)
}

fn local_name(qname: &[u8]) -> &str {
    let s = std::str::from_utf8(qname).unwrap_or("");
    s.rsplit(':').next().unwrap_or(s)
}
