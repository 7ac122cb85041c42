// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Versioned schema migrations for the five tables spec §3/§6 requires
//! (`Account`, `Calendar`, `Event`, `PendingOperation`, `SyncSession`).
//!
//! Applied as embedded SQL strings in order, recorded in a `schema_version`
//! table, rather than via `sqlx::migrate!` against a migrations directory —
//! this crate has no build-time migration directory to point the macro at.

use sqlx::SqlitePool;

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "init_accounts_calendars",
        sql: "
CREATE TABLE IF NOT EXISTS accounts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    provider TEXT NOT NULL,
    email TEXT NOT NULL,
    display_name TEXT NOT NULL,
    principal_url TEXT,
    home_set_url TEXT,
    is_enabled INTEGER NOT NULL DEFAULT 1,
    UNIQUE(provider, email, home_set_url)
);

CREATE TABLE IF NOT EXISTS calendars (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    account_id INTEGER NOT NULL REFERENCES accounts(id) ON DELETE CASCADE,
    caldav_url TEXT NOT NULL,
    display_name TEXT NOT NULL,
    color INTEGER NOT NULL DEFAULT 0xFF3B82F6,
    ctag TEXT,
    sync_token TEXT,
    is_read_only INTEGER NOT NULL DEFAULT 0,
    is_visible INTEGER NOT NULL DEFAULT 1,
    is_default INTEGER NOT NULL DEFAULT 0,
    parse_retry_count INTEGER NOT NULL DEFAULT 0
);
",
    },
    Migration {
        version: 2,
        name: "init_events",
        sql: "
CREATE TABLE IF NOT EXISTS events (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    uid TEXT NOT NULL,
    calendar_id INTEGER NOT NULL REFERENCES calendars(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    start_ts INTEGER NOT NULL,
    end_ts INTEGER NOT NULL,
    is_all_day INTEGER NOT NULL DEFAULT 0,
    timezone TEXT,
    rrule TEXT,
    exdate TEXT,
    caldav_url TEXT,
    etag TEXT,
    dtstamp TEXT NOT NULL,
    sequence INTEGER NOT NULL DEFAULT 0,
    status TEXT,
    classification TEXT NOT NULL DEFAULT 'PUBLIC',
    reminders TEXT,
    extra_properties TEXT,
    raw_ical TEXT,
    sync_status TEXT NOT NULL DEFAULT 'SYNCED',
    original_event_id INTEGER REFERENCES events(id) ON DELETE CASCADE,
    original_instance_time INTEGER
);

CREATE INDEX IF NOT EXISTS events_uid_calendar_idx ON events(uid, calendar_id);
CREATE INDEX IF NOT EXISTS events_caldav_url_idx ON events(caldav_url);
",
    },
    Migration {
        version: 3,
        name: "init_pending_operations_sync_sessions",
        sql: "
CREATE TABLE IF NOT EXISTS pending_operations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    event_id INTEGER NOT NULL REFERENCES events(id) ON DELETE CASCADE,
    operation TEXT NOT NULL,
    target_url TEXT,
    source_calendar_id INTEGER REFERENCES calendars(id),
    target_calendar_id INTEGER REFERENCES calendars(id),
    move_phase INTEGER,
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_error TEXT,
    next_retry_at INTEGER NOT NULL DEFAULT 0,
    created_at INTEGER NOT NULL,
    is_poisoned INTEGER NOT NULL DEFAULT 0,
    is_conflicted INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS pending_operations_event_idx ON pending_operations(event_id);
CREATE INDEX IF NOT EXISTS pending_operations_order_idx ON pending_operations(next_retry_at, created_at);

CREATE TABLE IF NOT EXISTS sync_sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    calendar_id INTEGER NOT NULL REFERENCES calendars(id) ON DELETE CASCADE,
    started_at INTEGER NOT NULL,
    finished_at INTEGER,
    status TEXT,
    added INTEGER NOT NULL DEFAULT 0,
    updated INTEGER NOT NULL DEFAULT 0,
    deleted INTEGER NOT NULL DEFAULT 0,
    skipped_parse_error INTEGER NOT NULL DEFAULT 0,
    skipped_constraint_error INTEGER NOT NULL DEFAULT 0
);
",
    },
];

/// Applies every migration in [`MIGRATIONS`] not yet recorded in
/// `schema_version`, in ascending version order.
pub(crate) async fn run(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY, name TEXT NOT NULL)")
        .execute(pool)
        .await?;

    for migration in MIGRATIONS {
        let already_applied: Option<i64> = sqlx::query_scalar("SELECT version FROM schema_version WHERE version = ?")
            .bind(migration.version)
            .fetch_optional(pool)
            .await?;
        if already_applied.is_some() {
            continue;
        }

        let mut tx = pool.begin().await?;
        for statement in migration.sql.split(';') {
            let statement = statement.trim();
            if statement.is_empty() {
                continue;
            }
            sqlx::query(statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO schema_version (version, name) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.name)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::debug!(version = migration.version, name = migration.name, "applied migration");
    }

    Ok(())
}
