// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! End-to-end push/pull cycle tests driven through `SyncOrchestrator`.

use calsync_caldav::GenericQuirks;
use calsync_core::{new_event, CancellationToken, NullOccurrenceSink, SessionStatus, SyncConfig, SyncOrchestrator};

use crate::common::{setup, FakeClient};

#[tokio::test]
async fn locally_created_event_is_pushed_and_session_succeeds() {
    let (db, _account_id, calendar) = setup().await;
    let writer = calsync_core::EventWriter::new(&db);
    let draft = new_event("event-1".into(), calendar.id, "Standup".into(), 1_700_000_000_000, 1_700_003_600_000, "20231114T120000Z".into());
    let created = writer.create(draft, 1_700_000_000_000).await.expect("create event");
    assert!(created.caldav_url.is_none(), "not yet pushed");

    let client = FakeClient::default();
    let quirks = GenericQuirks;
    let sink = NullOccurrenceSink;
    let config = SyncConfig::default();
    let orchestrator = SyncOrchestrator::new(&db, &client, &quirks, &sink, &config);
    let cancel = CancellationToken::new();

    let session = orchestrator.sync_calendar(calendar.clone(), 1_700_000_001_000, &cancel).await.expect("sync_calendar");
    assert_eq!(session.status, Some(SessionStatus::Success));

    let synced = db.events.get(created.id).await.expect("fetch event").expect("event still exists");
    assert!(synced.caldav_url.is_some(), "push should have set the remote identity");
    assert!(synced.etag.is_some());

    db.close().await;
}

#[tokio::test]
async fn auth_failure_during_push_fails_the_session_and_stops_the_account() {
    let (db, account_id, calendar) = setup().await;
    let writer = calsync_core::EventWriter::new(&db);
    let draft = new_event("event-1".into(), calendar.id, "Standup".into(), 1_700_000_000_000, 1_700_003_600_000, "20231114T120000Z".into());
    writer.create(draft, 1_700_000_000_000).await.expect("create event");

    let client = FakeClient { fail_auth: true, ..Default::default() };
    let quirks = GenericQuirks;
    let sink = NullOccurrenceSink;
    let config = SyncConfig::default();
    let orchestrator = SyncOrchestrator::new(&db, &client, &quirks, &sink, &config);
    let cancel = CancellationToken::new();

    let result = orchestrator.sync_account(account_id, 1_700_000_001_000, &cancel).await;
    assert!(result.is_err(), "an auth failure must propagate and stop the account");
    assert!(cancel.is_cancelled(), "sync_account cancels the rest of the account on an auth failure");

    let sessions = db.sync_sessions.list_for_calendar(calendar.id, 1).await.expect("list sessions");
    assert_eq!(sessions[0].status, Some(SessionStatus::Failed));

    db.close().await;
}

#[tokio::test]
async fn transport_failure_poisons_the_op_and_fails_the_session_once_retries_are_exhausted() {
    let (db, _account_id, calendar) = setup().await;
    let writer = calsync_core::EventWriter::new(&db);
    let draft = new_event("event-1".into(), calendar.id, "Standup".into(), 1_700_000_000_000, 1_700_003_600_000, "20231114T120000Z".into());
    writer.create(draft, 1_700_000_000_000).await.expect("create event");

    let client = FakeClient { fail_transport: true, ..Default::default() };
    let quirks = GenericQuirks;
    let sink = NullOccurrenceSink;
    let config = SyncConfig { retry_cap: 1, ..Default::default() };
    let orchestrator = SyncOrchestrator::new(&db, &client, &quirks, &sink, &config);
    let cancel = CancellationToken::new();

    let session = orchestrator.sync_calendar(calendar, 1_700_000_001_000, &cancel).await.expect("sync_calendar absorbs transport errors");
    assert_eq!(session.status, Some(SessionStatus::Failed));

    db.close().await;
}
