// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Error type for this crate.

/// Errors raised while parsing or patching an iCalendar resource.
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum IcalError {
    /// The resource body could not be decoded as content lines at all
    /// (unbalanced `BEGIN`/`END`, invalid UTF-8 after unfolding, ...).
    #[error("malformed iCalendar body: {0}")]
    Malformed(String),

    /// A VEVENT was missing one of `UID`, `DTSTAMP`, `DTSTART`.
    #[error("VEVENT missing required property: {0}")]
    MissingProperty(&'static str),

    /// `DTSTART` (or another date-time valued property) had an
    /// unrecognized value form.
    #[error("invalid date-time value: {0}")]
    InvalidDateTime(String),

    /// The resource named by `uid`/`recurrence_id` was not found in the
    /// original text supplied to [`crate::patch`].
    #[error("no matching component for uid {uid:?} recurrence-id {recurrence_id:?}")]
    ComponentNotFound {
        /// UID searched for.
        uid: String,
        /// `RECURRENCE-ID` searched for, if any.
        recurrence_id: Option<String>,
    },
}
