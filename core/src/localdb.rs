// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! The local SQLite store (spec §3 Persisted state, §6 "Persisted state").

mod accounts;
mod calendars;
mod db;
mod events;
mod migrations;
mod pending_ops;
mod sync_sessions;

pub use accounts::Accounts;
pub use calendars::Calendars;
pub use db::LocalDb;
pub use events::{new_event, Events};
pub use pending_ops::{backoff_delay_millis, PendingOps};
pub use sync_sessions::SyncSessions;
