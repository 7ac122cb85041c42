// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Client integration tests with wiremock.

use calsync_caldav::{AuthMethod, CalDavClient, CalDavConfig, CalDavError, ETag, Href, ReqwestCalDavClient};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config_for(mock_server: &MockServer) -> CalDavConfig {
    CalDavConfig {
        base_url: mock_server.uri(),
        auth: AuthMethod::None,
        ..Default::default()
    }
}

#[tokio::test]
async fn list_calendars_parses_multistatus_into_collections() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PROPFIND"))
        .and(path("/dav/calendars/user/"))
        .and(header("Depth", "1"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:response>
    <D:href>/dav/calendars/user/personal/</D:href>
    <D:propstat>
      <D:prop>
        <D:resourcetype><D:collection/><C:calendar/></D:resourcetype>
        <D:displayname>Personal</D:displayname>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
            "application/xml",
        ))
        .mount(&mock_server)
        .await;

    let client = ReqwestCalDavClient::new(config_for(&mock_server)).unwrap();
    let url = format!("{}/dav/calendars/user/", mock_server.uri());
    let calendars = client.list_calendars(&url).await.unwrap();

    assert_eq!(calendars.len(), 1);
    assert_eq!(calendars[0].display_name.as_deref(), Some("Personal"));
}

#[tokio::test]
async fn sync_collection_returns_token_and_changes() {
    let mock_server = MockServer::start().await;

    Mock::given(method("REPORT"))
        .and(path("/dav/calendars/user/personal/"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:">
  <D:response>
    <D:href>/dav/calendars/user/personal/e1.ics</D:href>
    <D:propstat>
      <D:prop><D:getetag>"abc"</D:getetag></D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
  <D:sync-token>http://example.com/sync/42</D:sync-token>
</D:multistatus>"#,
            "application/xml",
        ))
        .mount(&mock_server)
        .await;

    let client = ReqwestCalDavClient::new(config_for(&mock_server)).unwrap();
    let url = format!("{}/dav/calendars/user/personal/", mock_server.uri());
    let result = client.sync_collection(&url, None).await.unwrap();

    assert_eq!(result.changed.len(), 1);
    assert!(result.deleted.is_empty());
    assert_eq!(result.sync_token.unwrap().as_str(), "http://example.com/sync/42");
}

#[tokio::test]
async fn create_event_returns_href_and_etag() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/dav/calendars/user/personal/event-1.ics"))
        .and(header("If-None-Match", "*"))
        .respond_with(ResponseTemplate::new(201).insert_header("ETag", "\"new-etag\""))
        .mount(&mock_server)
        .await;

    let client = ReqwestCalDavClient::new(config_for(&mock_server)).unwrap();
    let collection_url = format!("{}/dav/calendars/user/personal", mock_server.uri());
    let (href, etag) = client
        .create_event(&collection_url, "event-1", "BEGIN:VCALENDAR\nEND:VCALENDAR\n")
        .await
        .unwrap();

    assert!(href.as_str().ends_with("event-1.ics"));
    assert_eq!(etag.as_str(), "\"new-etag\"");
}

#[tokio::test]
async fn update_event_conflict_maps_412_and_409() {
    let mock_server = MockServer::start().await;

    Mock::given(method("PUT"))
        .and(path("/dav/calendars/user/personal/event-2.ics"))
        .respond_with(ResponseTemplate::new(412))
        .mount(&mock_server)
        .await;

    let client = ReqwestCalDavClient::new(config_for(&mock_server)).unwrap();
    let href = Href::new(format!("{}/dav/calendars/user/personal/event-2.ics", mock_server.uri()));
    let err = client
        .update_event(&href, "BEGIN:VCALENDAR\nEND:VCALENDAR\n", &ETag::new("\"stale\"".to_string()))
        .await
        .unwrap_err();

    assert!(matches!(err, CalDavError::Conflict(_)));
}

#[tokio::test]
async fn delete_event_not_found_is_surfaced_as_error_for_caller_to_treat_as_success() {
    let mock_server = MockServer::start().await;

    Mock::given(method("DELETE"))
        .and(path("/dav/calendars/user/personal/gone.ics"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock_server)
        .await;

    let client = ReqwestCalDavClient::new(config_for(&mock_server)).unwrap();
    let href = Href::new(format!("{}/dav/calendars/user/personal/gone.ics", mock_server.uri()));
    let err = client
        .delete_event(&href, &ETag::new("\"whatever\"".to_string()))
        .await
        .unwrap_err();

    assert!(matches!(err, CalDavError::NotFound(_)));
}

#[tokio::test]
async fn fetch_events_by_href_batches_large_requests() {
    let mock_server = MockServer::start().await;

    Mock::given(method("REPORT"))
        .and(path("/dav/calendars/user/personal/"))
        .respond_with(ResponseTemplate::new(207).set_body_raw(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<D:multistatus xmlns:D="DAV:" xmlns:C="urn:ietf:params:xml:ns:caldav">
  <D:response>
    <D:href>/dav/calendars/user/personal/e1.ics</D:href>
    <D:propstat>
      <D:prop>
        <D:getetag>"abc"</D:getetag>
        <C:calendar-data>BEGIN:VCALENDAR
VERSION:2.0
BEGIN:VEVENT
UID:e1
DTSTART:20260601T090000Z
SUMMARY:Hi
END:VEVENT
END:VCALENDAR
</C:calendar-data>
      </D:prop>
      <D:status>HTTP/1.1 200 OK</D:status>
    </D:propstat>
  </D:response>
</D:multistatus>"#,
            "application/xml",
        ))
        .mount(&mock_server)
        .await;

    let client = ReqwestCalDavClient::new(config_for(&mock_server)).unwrap();
    let url = format!("{}/dav/calendars/user/personal/", mock_server.uri());
    let hrefs: Vec<Href> = (0..120).map(|i| Href::new(format!("/dav/calendars/user/personal/e{i}.ics"))).collect();

    let resources = client.fetch_events_by_href(&url, &hrefs).await.unwrap();
    assert!(!resources.is_empty());
}
