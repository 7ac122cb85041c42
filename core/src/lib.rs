// SPDX-FileCopyrightText: 2025 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Data model, local `SQLite` store, pending-operation queue, and the
//! pull/push/orchestrator strategies that keep it consistent with one or
//! more remote `CalDAV` collections (spec §1).

#![warn(
    missing_docs,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unstable_features,
    unused_import_braces,
    unused_qualifications,
    missing_debug_implementations,
    clippy::indexing_slicing,
    clippy::dbg_macro,
    clippy::doc_markdown,
    clippy::redundant_closure_for_method_calls
)]

mod config;
mod error;
mod ics;
mod localdb;
mod model;
mod orchestrator;
mod pull;
mod push;
mod traits;
mod writer;

pub use crate::{
    config::{AccountConfig, SyncConfig, APP_NAME},
    error::CoreError,
    localdb::{new_event, Accounts, Calendars, Events, LocalDb, PendingOps, SyncSessions},
    model::{
        Account, Calendar, Event, MovePhase, OperationKind, PendingOperation, Provider, SessionStatus, SyncSession,
        SyncStatus, TimestampMillis,
    },
    orchestrator::{CancellationToken, SyncOrchestrator},
    pull::{PullOutcome, PullStrategy},
    push::{PushOutcome, PushStrategy},
    traits::{CredentialStore, NullOccurrenceSink, OccurrenceSink, Scheduler},
    writer::EventWriter,
};
