// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Per-server behavioral adjustments (spec §4.3 `Quirks`).
//!
//! The source models this with inheritance-like `Quirks` subclasses; here
//! each profile is a value of a small trait, chosen by provider id and host
//! from [`for_account`]. No runtime inheritance is needed (spec §9
//! "Polymorphism over providers").

use crate::types::CalendarCollection;

/// Ordered list of sub-paths [`Quirks::path_probes`] iterates when root
/// discovery fails (spec §4.3 "Known path-probe set in order").
pub const DEFAULT_PATH_PROBES: &[&str] = &[
    "",
    "/dav/",
    "/remote.php/dav/",
    "/dav.php/",
    "/caldav",
    "/caldav/",
];

/// A per-server behavioral profile.
pub trait Quirks: std::fmt::Debug + Send + Sync {
    /// Builds the absolute event URL for a resource `href` returned for a
    /// collection at `collection_url` (spec §4.3 `buildEventUrl`).
    fn build_event_url(&self, collection_url: &str, href: &str) -> String {
        if href.starts_with("http://") || href.starts_with("https://") {
            return href.to_string();
        }
        let base = collection_url.trim_end_matches('/');
        if href.starts_with('/') {
            let origin = base
                .split_once("://")
                .and_then(|(_, rest)| rest.split_once('/'))
                .map_or(base, |(_, _)| base);
            // Reconstruct scheme://host from collection_url, then append href.
            if let Some(scheme_end) = origin.find("://") {
                let after_scheme = &origin[scheme_end + 3..];
                let host_end = after_scheme.find('/').unwrap_or(after_scheme.len());
                return format!("{}{}", &origin[..scheme_end + 3 + host_end], href);
            }
            return format!("{base}{href}");
        }
        format!("{base}/{href}")
    }

    /// Drops inboxes, outboxes, and collections that cannot hold `VEVENT`s
    /// from a discovered calendar list (spec §4.3 `filterDiscoveredCalendars`).
    fn filter_discovered_calendars(&self, list: Vec<CalendarCollection>) -> Vec<CalendarCollection> {
        list.into_iter()
            .filter(|c| c.is_calendar && c.supports_vevent())
            .filter(|c| !is_scheduling_collection(&c.href))
            .collect()
    }

    /// Whether `CS:getctag` is worth probing for this server.
    fn supports_ctag(&self) -> bool {
        true
    }

    /// Whether `DAV:sync-token`/`sync-collection` REPORT is worth probing.
    fn supports_sync_token(&self) -> bool {
        true
    }

    /// Whether listing calendars needs an explicit `Depth: 1` header (all
    /// known servers do; the hook exists for a future non-conforming one).
    fn requires_depth_header(&self) -> bool {
        true
    }

    /// Whether discovery should start with a `/.well-known/caldav` probe
    /// (spec §4.4 step 2).
    fn uses_well_known_discovery(&self) -> bool {
        true
    }

    /// Ordered sub-paths to probe when root discovery fails (spec §4.3
    /// "Known path-probe set in order").
    fn path_probes(&self) -> &'static [&'static str] {
        DEFAULT_PATH_PROBES
    }

    /// Normalizes a raw response body before it reaches [`calsync_ical::parse`]
    /// (spec §4.3 `normalizeIcsResponse`). Identity by default.
    fn normalize_ics_response(&self, bytes: &[u8]) -> Vec<u8> {
        bytes.to_vec()
    }

    /// Whether the server honors the `MOVE` method for calendar resources
    /// (spec §4.7 "if the server supports MOVE (Quirks), use it in one
    /// shot. Otherwise, two phases"). `false` is always a safe default —
    /// the two-phase DELETE+CREATE fallback works everywhere.
    fn supports_native_move(&self) -> bool {
        false
    }
}

fn is_scheduling_collection(href: &str) -> bool {
    let lower = href.to_ascii_lowercase();
    lower.ends_with("/inbox/") || lower.ends_with("/outbox/") || lower.contains("/notification/")
}

/// Generic RFC 4791/6578-conformant profile. Used for Stalwart, Baikal and
/// Radicale, none of which are known to deviate from the spec in ways this
/// crate needs to special-case (spec SPEC_FULL §2 "Baikal/Radicale/Stalwart
/// defaulting to the generic RFC-conformant profile unless evidence says
/// otherwise").
#[derive(Debug, Clone, Copy, Default)]
pub struct GenericQuirks;

impl Quirks for GenericQuirks {}

/// iCloud (`caldav.icloud.com`). Well-known discovery works; ctag and
/// sync-token are both supported but `syncCollection` has been observed to
/// return duplicate `changed` entries for the same href in one response —
/// handled by [`PullStrategy`]'s dedup step, not here, since it is a
/// response-shape quirk of the *sync pipeline*, not the wire layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct ICloudQuirks;

impl Quirks for ICloudQuirks {
    fn path_probes(&self) -> &'static [&'static str] {
        &[""]
    }
}

/// Nextcloud / ownCloud family, rooted under `/remote.php/dav/`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NextcloudQuirks;

impl Quirks for NextcloudQuirks {}

/// Stalwart Mail Server's CalDAV component.
#[derive(Debug, Clone, Copy, Default)]
pub struct StalwartQuirks;

impl Quirks for StalwartQuirks {}

/// Baïkal.
#[derive(Debug, Clone, Copy, Default)]
pub struct BaikalQuirks;

impl Quirks for BaikalQuirks {}

/// Radicale.
#[derive(Debug, Clone, Copy, Default)]
pub struct RadicaleQuirks;

impl Quirks for RadicaleQuirks {}

/// Zoho Calendar. Does not support ctag (`supports_ctag` is `false`, spec
/// §4.6 step 1 "servers such as Zoho do not support ctag"); returns `409`
/// where RFC 4791 mandates `412` (folded into [`crate::error::CalDavError::Conflict`]
/// at the wire layer regardless of quirks profile); and its root CalDAV
/// path has no trailing slash (spec §4.3 path-probe list, "`/caldav`
/// (no slash, Zoho)").
#[derive(Debug, Clone, Copy, Default)]
pub struct ZohoQuirks;

impl Quirks for ZohoQuirks {
    fn supports_ctag(&self) -> bool {
        false
    }

    fn path_probes(&self) -> &'static [&'static str] {
        &["/caldav", "/caldav/"]
    }
}

/// Selects a [`Quirks`] profile from an account's provider id (as stored on
/// `Account`, spec §3) and the server host (spec §4.3 "selected from
/// provider id and host").
#[must_use]
pub fn for_account(provider: &str, host: &str) -> Box<dyn Quirks> {
    let host = host.to_ascii_lowercase();
    match provider.to_ascii_uppercase().as_str() {
        "ICLOUD" => Box::new(ICloudQuirks),
        _ if host.contains("icloud.com") => Box::new(ICloudQuirks),
        _ if host.contains("zoho.com") => Box::new(ZohoQuirks),
        _ if host.contains("nextcloud") || host.contains("owncloud") => Box::new(NextcloudQuirks),
        _ if host.contains("baikal") => Box::new(BaikalQuirks),
        _ if host.contains("radicale") => Box::new(RadicaleQuirks),
        _ if host.contains("stalwart") => Box::new(StalwartQuirks),
        _ => Box::new(GenericQuirks),
    }
}
