// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

use crate::types::Href;

/// `CalDAV` wire-layer errors.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum CalDavError {
    /// Transport-level failure (connection reset, timeout, DNS, 5xx, 429).
    /// `retryable` is `true` for everything except a definitively permanent
    /// failure (4xx other than 401/403/404/409/412).
    #[error("transport error: {message}")]
    Transport {
        /// Human-readable detail.
        message: String,
        /// Whether the caller should retry with backoff.
        retryable: bool,
    },

    /// XML request/response parsing or writing error.
    #[error("XML error: {0}")]
    Xml(String),

    /// iCalendar body failed to parse.
    #[error("iCalendar error: {0}")]
    Ical(String),

    /// `401 Unauthorized` / `403 Forbidden`.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// `404 Not Found`.
    #[error("resource not found: {0}")]
    NotFound(Href),

    /// `410 Gone` — RFC 6578's signal that a `sync-collection` token has
    /// expired and the caller must fall back to a full resync.
    #[error("sync token expired: {0}")]
    Gone(String),

    /// `409 Conflict` or `412 Precondition Failed` (Zoho returns 409 where
    /// RFC 4791 mandates 412 — both map here).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Server does not speak `CalDAV` at the probed URL.
    #[error("server does not support CalDAV")]
    NotACalDavServer,

    /// Well-formed HTTP response that this client otherwise can't use.
    #[error("invalid server response: {0}")]
    InvalidResponse(String),

    /// Client misconfiguration (bad base URL, missing credentials, ...).
    #[error("configuration error: {0}")]
    Config(String),

    /// TLS handshake failure. `trust_insecure_offered` tells the caller
    /// whether retrying with `trustInsecure` could plausibly succeed (it is
    /// `false` for errors unrelated to certificate validation).
    #[error("TLS error: {message}")]
    Tls {
        /// Human-readable detail.
        message: String,
        /// Whether a `trustInsecure` retry is meaningful for this failure.
        trust_insecure_offered: bool,
    },

    /// Server does not support a capability this operation requires.
    #[error("server does not support required capability: {0}")]
    UnsupportedCapability(String),
}

impl CalDavError {
    /// Whether this error is worth retrying with backoff (spec §4.7
    /// "on transient error ... bump retryCount").
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport { retryable: true, .. })
    }

    /// Whether this error should stop the whole push/pull cycle rather than
    /// retry (spec §4.7 "on auth error, stop the whole push cycle").
    #[must_use]
    pub const fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }
}

impl From<reqwest::Error> for CalDavError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            return Self::Transport {
                message: e.to_string(),
                retryable: true,
            };
        }
        if let Some(status) = e.status() {
            return status_to_error(status, e.to_string());
        }
        Self::Transport {
            message: e.to_string(),
            retryable: true,
        }
    }
}

/// Maps an HTTP status code to a [`CalDavError`], folding both `412` and
/// `409` into [`CalDavError::Conflict`] (spec §4.2).
#[must_use]
pub fn status_to_error(status: reqwest::StatusCode, detail: String) -> CalDavError {
    match status {
        reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => {
            CalDavError::Auth(detail)
        }
        reqwest::StatusCode::NOT_FOUND => CalDavError::NotFound(Href::new(detail)),
        reqwest::StatusCode::GONE => CalDavError::Gone(detail),
        reqwest::StatusCode::CONFLICT | reqwest::StatusCode::PRECONDITION_FAILED => {
            CalDavError::Conflict(detail)
        }
        reqwest::StatusCode::TOO_MANY_REQUESTS => CalDavError::Transport {
            message: detail,
            retryable: true,
        },
        status if status.is_server_error() => CalDavError::Transport {
            message: detail,
            retryable: true,
        },
        status => CalDavError::Transport {
            message: format!("{status}: {detail}"),
            retryable: false,
        },
    }
}

impl From<quick_xml::Error> for CalDavError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Xml(e.to_string())
    }
}

impl From<std::io::Error> for CalDavError {
    fn from(e: std::io::Error) -> Self {
        Self::Xml(format!("IO error: {e}"))
    }
}
