// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Core error taxonomy (spec §7).

/// Errors surfaced by `calsync-core`'s strategies and local store.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Wire-layer failure from `calsync-caldav`.
    #[error(transparent)]
    CalDav(#[from] calsync_caldav::CalDavError),

    /// iCalendar parse/serialize failure that is a genuine parse error (not
    /// a recognized non-event resource, spec §7 "Non-event resource").
    #[error("iCalendar error: {0}")]
    Ical(String),

    /// Local SQLite store error.
    #[error("local store error: {0}")]
    Db(#[from] sqlx::Error),

    /// A pending operation reached its retry cap (spec §7 "Poisoned op").
    #[error("pending operation {0} is poisoned after exhausting retries")]
    Poisoned(i64),

    /// The external `CredentialStore` reported failure (spec §4.4 step 6,
    /// §6 "A `false` from `save` MUST roll back the newly created account").
    #[error("credential storage failed")]
    CredentialStorage,

    /// Discovery or configuration failure not otherwise classified.
    #[error("{0}")]
    Other(String),
}

impl CoreError {
    /// Whether this error should stop the whole sync session rather than
    /// be absorbed per-resource (spec §7 "per-calendar transport errors
    /// terminate the session with FAILED; auth errors terminate the
    /// account").
    #[must_use]
    pub fn is_session_terminating(&self) -> bool {
        match self {
            Self::CalDav(e) => e.is_auth() || matches!(e, calsync_caldav::CalDavError::Transport { retryable: false, .. }),
            Self::Db(_) | Self::CredentialStorage => true,
            _ => false,
        }
    }

    /// Whether this error is an auth failure (spec §7 "Auth: 401, 403.
    /// Stops all sync for the account").
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::CalDav(e) if e.is_auth())
    }
}
