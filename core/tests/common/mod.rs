// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Shared test infrastructure for end-to-end workflow tests.

mod fake_client;

pub use fake_client::FakeClient;

use calsync_core::{Calendar, LocalDb, Provider};

/// A fresh in-memory store with one account and one calendar, ready to
/// exercise `EventWriter`/`SyncOrchestrator` against.
pub async fn setup() -> (LocalDb, i64, Calendar) {
    let db = LocalDb::open(None).await.expect("open in-memory store");
    let account_id = db.accounts.insert(Provider::Caldav, "a@example.com", "Example").await.expect("insert account");
    let calendar_id =
        db.calendars.insert(account_id, "https://caldav.example.com/dav/p/", "Personal", 0, false).await.expect("insert calendar");
    let calendar = db.calendars.get(calendar_id).await.expect("fetch calendar").expect("calendar exists");
    (db, account_id, calendar)
}
