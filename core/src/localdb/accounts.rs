// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! `Account` DAO (spec §3 `Account`).

use sqlx::SqlitePool;

use crate::model::{Account, Provider};

#[derive(Debug, sqlx::FromRow)]
struct AccountRow {
    id: i64,
    provider: String,
    email: String,
    display_name: String,
    principal_url: Option<String>,
    home_set_url: Option<String>,
    is_enabled: bool,
}

impl AccountRow {
    fn into_account(self) -> Account {
        Account {
            id: self.id,
            provider: Provider::parse(&self.provider).unwrap_or(Provider::Caldav),
            email: self.email,
            display_name: self.display_name,
            principal_url: self.principal_url,
            home_set_url: self.home_set_url,
            is_enabled: self.is_enabled,
        }
    }
}

/// DAO over the `accounts` table.
#[derive(Debug, Clone)]
pub struct Accounts {
    pool: SqlitePool,
}

impl Accounts {
    pub(crate) fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Inserts a new account, returning its row id.
    pub async fn insert(&self, provider: Provider, email: &str, display_name: &str) -> Result<i64, sqlx::Error> {
        const SQL: &str = "INSERT INTO accounts (provider, email, display_name) VALUES (?, ?, ?)";
        let result = sqlx::query(SQL).bind(provider.as_str()).bind(email).bind(display_name).execute(&self.pool).await?;
        Ok(result.last_insert_rowid())
    }

    /// Deletes an account by id (cascades to its calendars/events).
    pub async fn delete(&self, id: i64) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM accounts WHERE id = ?").bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// Fetches an account by id.
    pub async fn get(&self, id: i64) -> Result<Option<Account>, sqlx::Error> {
        const SQL: &str = "
SELECT id, provider, email, display_name, principal_url, home_set_url, is_enabled
FROM accounts WHERE id = ?";
        let row: Option<AccountRow> = sqlx::query_as(SQL).bind(id).fetch_optional(&self.pool).await?;
        Ok(row.map(AccountRow::into_account))
    }

    /// Looks up an account by the spec §3/§4.4 identity tuple
    /// `(provider, email, normalizedHomeSetUrl)`.
    pub async fn find_by_identity(
        &self,
        provider: Provider,
        email: &str,
        home_set_url: Option<&str>,
    ) -> Result<Option<Account>, sqlx::Error> {
        const SQL: &str = "
SELECT id, provider, email, display_name, principal_url, home_set_url, is_enabled
FROM accounts WHERE provider = ? AND email = ? AND home_set_url IS ?";
        let row: Option<AccountRow> =
            sqlx::query_as(SQL).bind(provider.as_str()).bind(email).bind(home_set_url).fetch_optional(&self.pool).await?;
        Ok(row.map(AccountRow::into_account))
    }

    /// Records the resolved principal/calendar-home URLs after discovery
    /// (spec §4.4 step 6 "create or update").
    pub async fn set_discovered_urls(&self, id: i64, principal_url: &str, home_set_url: &str) -> Result<(), sqlx::Error> {
        const SQL: &str = "UPDATE accounts SET principal_url = ?, home_set_url = ? WHERE id = ?";
        sqlx::query(SQL).bind(principal_url).bind(home_set_url).bind(id).execute(&self.pool).await?;
        Ok(())
    }

    /// Lists every enabled account (spec §4.8 "for each enabled calendar").
    pub async fn list_enabled(&self) -> Result<Vec<Account>, sqlx::Error> {
        const SQL: &str = "
SELECT id, provider, email, display_name, principal_url, home_set_url, is_enabled
FROM accounts WHERE is_enabled = 1 ORDER BY id";
        let rows: Vec<AccountRow> = sqlx::query_as(SQL).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(AccountRow::into_account).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localdb::LocalDb;

    #[tokio::test]
    async fn insert_then_find_by_identity_round_trips() {
        let db = LocalDb::open(None).await.unwrap();
        let id = db.accounts.insert(Provider::Caldav, "a@example.com", "A").await.unwrap();

        let found = db.accounts.find_by_identity(Provider::Caldav, "a@example.com", None).await.unwrap();
        assert_eq!(found.unwrap().id, id);
    }

    #[tokio::test]
    async fn set_discovered_urls_updates_identity_fields() {
        let db = LocalDb::open(None).await.unwrap();
        let id = db.accounts.insert(Provider::Caldav, "a@example.com", "A").await.unwrap();
        db.accounts.set_discovered_urls(id, "https://example.com/p/", "https://example.com/dav/").await.unwrap();

        let found = db.accounts.find_by_identity(Provider::Caldav, "a@example.com", Some("https://example.com/dav/")).await.unwrap();
        assert_eq!(found.unwrap().id, id);
    }

    #[tokio::test]
    async fn get_returns_none_for_unknown_id() {
        let db = LocalDb::open(None).await.unwrap();
        assert!(db.accounts.get(999).await.unwrap().is_none());
    }
}
