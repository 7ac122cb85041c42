// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use super::accounts::Accounts;
use super::calendars::Calendars;
use super::events::Events;
use super::migrations;
use super::pending_ops::PendingOps;
use super::sync_sessions::SyncSessions;

/// The local SQLite store backing every other module in this crate.
///
/// Seen only through DAO-style methods (spec §1), never through raw SQL
/// from outside `localdb`.
#[derive(Debug, Clone)]
pub struct LocalDb {
    pool: SqlitePool,

    /// `Account` rows.
    pub accounts: Accounts,
    /// `Calendar` rows.
    pub calendars: Calendars,
    /// `Event` rows.
    pub events: Events,
    /// `PendingOperation` rows.
    pub pending_ops: PendingOps,
    /// `SyncSession` rows.
    pub sync_sessions: SyncSessions,
}

impl LocalDb {
    /// Opens (creating if needed) the SQLite database under `state_dir`,
    /// or an in-memory database when `state_dir` is `None`.
    pub async fn open(state_dir: Option<&Path>) -> Result<Self, sqlx::Error> {
        let (options, max_connections) = match state_dir {
            Some(dir) => {
                const NAME: &str = "calsync.db";
                tracing::info!(path = %dir.display(), "connecting to SQLite database");
                (SqliteConnectOptions::new().filename(PathBuf::from(dir).join(NAME)).create_if_missing(true), 5)
            }
            None => {
                tracing::info!("connecting to in-memory SQLite database");
                // A single connection, or every pooled connection would see
                // its own private `:memory:` database.
                (SqliteConnectOptions::new().in_memory(true), 1)
            }
        };
        let options = options.foreign_keys(true);

        let pool = SqlitePoolOptions::new().max_connections(max_connections).connect_with(options).await?;
        migrations::run(&pool).await?;

        Ok(Self {
            accounts: Accounts::new(pool.clone()),
            calendars: Calendars::new(pool.clone()),
            events: Events::new(pool.clone()),
            pending_ops: PendingOps::new(pool.clone()),
            sync_sessions: SyncSessions::new(pool.clone()),
            pool,
        })
    }

    /// Closes the underlying connection pool.
    pub async fn close(self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_in_memory_runs_migrations() {
        let db = LocalDb::open(None).await.unwrap();
        assert!(db.accounts.get(1).await.unwrap().is_none());
    }
}
