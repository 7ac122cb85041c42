// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Response parsing tests.

use calsync_caldav::MultiStatusResponse;

#[test]
fn parses_calendar_multiget_response_into_resources() {
    let xml = r#"<?xml version="1.0"?>
<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:response>
    <D:href>/cal/personal/e1.ics</D:href>
    <D:propstat>
      <D:prop>
        <D:getetag>"etag-1"</D:getetag>
        <C:calendar-data>BEGIN:VCALENDAR
VERSION:2.0
BEGIN:VEVENT
UID:e1
DTSTART:20260601T090000Z
DTEND:20260601T100000Z
SUMMARY:Standup
END:VEVENT
END:VCALENDAR
</C:calendar-data>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

    let parsed = MultiStatusResponse::from_xml(xml).unwrap();
    let resources = parsed.into_resources();
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].etag.as_str(), "\"etag-1\"");
    assert!(resources[0].event.is_some());
}

#[test]
fn missing_calendar_data_is_skipped_not_errored() {
    let xml = r#"<?xml version="1.0"?>
<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:response>
    <D:href>/cal/personal/e2.ics</D:href>
    <D:propstat>
      <D:prop><D:getetag>"etag-2"</D:getetag></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

    let parsed = MultiStatusResponse::from_xml(xml).unwrap();
    assert!(parsed.into_resources().is_empty());
}

#[test]
fn sync_collection_response_splits_changed_and_deleted() {
    let xml = r#"<?xml version="1.0"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/cal/personal/e3.ics</D:href>
    <D:propstat>
      <D:prop><D:getetag>"etag-3"</D:getetag></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:response>
    <D:href>/cal/personal/e4.ics</D:href>
    <D:status>HTTP/1.1 404 Not Found</D:status>
  </D:response>
  <D:sync-token>http://example.com/sync/9</D:sync-token>
</D:multistatus>"#;

    let parsed = MultiStatusResponse::from_xml(xml).unwrap();
    let sync_token = parsed.sync_token.clone();
    let (changed, deleted) = parsed.into_sync_result();

    assert_eq!(changed.len(), 1);
    assert_eq!(changed[0].href.as_str(), "/cal/personal/e3.ics");
    assert_eq!(deleted.len(), 1);
    assert_eq!(deleted[0].as_str(), "/cal/personal/e4.ics");
    assert_eq!(sync_token.unwrap().as_str(), "http://example.com/sync/9");
}

#[test]
fn collections_report_supported_components_and_ctag() {
    let xml = r#"<?xml version="1.0"?>
<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav" xmlns:CS="http://calendarserver.org/ns/">
  <D:response>
    <D:href>/cal/personal/</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype><D:collection/><C:calendar/></D:resourcetype>
        <D:displayname>Personal</D:displayname>
        <C:supported-calendar-component-set>
          <C:comp name="VEVENT"/>
        </C:supported-calendar-component-set>
        <CS:getctag>ctag-abc</CS:getctag>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

    let parsed = MultiStatusResponse::from_xml(xml).unwrap();
    let collections = parsed.into_collections();
    assert_eq!(collections.len(), 1);
    assert!(collections[0].supports_vevent());
    assert_eq!(collections[0].ctag.as_deref(), Some("ctag-abc"));
}

#[test]
fn etags_extracted_without_requiring_calendar_data() {
    let xml = r#"<?xml version="1.0"?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/cal/personal/e5.ics</D:href>
    <D:propstat>
      <D:prop><D:getetag>"etag-5"</D:getetag></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#;

    let parsed = MultiStatusResponse::from_xml(xml).unwrap();
    let etags = parsed.into_etags();
    assert_eq!(etags.len(), 1);
    assert_eq!(etags[0].1.as_str(), "\"etag-5\"");
}
