// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! RFC 5545 iCalendar parsing and patching round-trip serialization.
//!
//! This crate does not build a full typed AST of every iCalendar property.
//! Its job is narrower: decode a `CalDAV` resource body into a small
//! structured `ICalEvent`, and when writing a changed event back out,
//! *patch* the original resource text in place rather than regenerating it
//! from scratch — so properties the local model never learned about
//! (alarms beyond the first three, attendees, organizer, categories,
//! `X-*` extensions, `VTIMEZONE` blocks, `RECURRENCE-ID` exception
//! sub-components) survive untouched.

#![warn(
    missing_docs,
    missing_debug_implementations,
    unsafe_code,
    unused_qualifications,
    clippy::dbg_macro
)]

mod content_line;
mod error;
mod fold;
mod generate;
mod model;
mod parser;
mod patch;

pub use crate::error::IcalError;
pub use crate::fold::{fold_line, unfold};
pub use crate::generate::generate;
pub use crate::model::{AlarmTrigger, Classification, DtEnd, DtStart, EventStatusValue, ICalEvent};
pub use crate::parser::{NonEventKind, ParsedCalendar, ParsedComponent, parse};
pub use crate::patch::{PatchFields, patch};
