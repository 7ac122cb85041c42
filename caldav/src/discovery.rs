// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! Server URL → principal → calendar-home → calendar list (spec §4.4
//! `DiscoveryService`).
//!
//! Credential persistence (spec §4.4 step 6, "look up existing account by
//! `(provider, email, normalizedHomeSetUrl)` ... save credentials") is not
//! performed here: it needs `calsync_core::CredentialStore` and the account
//! table, both owned by the core crate. [`discover`] only performs steps
//! 1–5 and returns what the core crate needs to do step 6 itself.

use crate::client::CalDavClient;
use crate::error::CalDavError;
use crate::quirks::Quirks;
use crate::types::{CalendarCollection, Href};

/// Recognized `CalDAV` path fragments that mean "the URL already points at
/// a collection root, skip principal probing" (spec §4.4 step 3).
const RECOGNIZED_CALDAV_PATHS: &[&str] = &["/dav/", "/remote.php/dav/", "/dav.php/", "/caldav"];

/// The result of a successful discovery run (spec §4.4 `Success(Account,
/// [Calendar])`, minus the parts only the core crate can fill in —
/// provider id, email, account row id).
#[derive(Debug, Clone)]
pub struct DiscoveryOutcome {
    /// The principal URL resolved in step 3.
    pub principal_url: String,
    /// The calendar-home URL resolved in step 4, already run through
    /// [`normalize_account_identity_url`] (the 3-tuple lookup key in step 6
    /// uses this value).
    pub calendar_home_url: String,
    /// Calendars discovered in step 5, already filtered by
    /// [`Quirks::filter_discovered_calendars`].
    pub calendars: Vec<CalendarCollection>,
}

/// Normalizes a bare server URL as entered by a user (spec §4.4 step 1):
/// prepend `https://` if no scheme is present, preserve an explicit
/// `http://`, and drop a trailing `/` only when the path is otherwise
/// empty.
#[must_use]
pub fn normalize_input_url(raw: &str) -> String {
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };

    if let Some(scheme_end) = with_scheme.find("://") {
        let after = &with_scheme[scheme_end + 3..];
        if let Some(slash) = after.find('/') {
            let path = &after[slash..];
            if path == "/" {
                return with_scheme[..scheme_end + 3 + slash].to_string();
            }
            return with_scheme;
        }
    }
    with_scheme
}

/// Normalizes a resolved calendar-home URL into the stable identity used
/// for the `(provider, email, normalizedHomeSetUrl)` account lookup (spec
/// §4.4 "URL normalization for account identity"): lowercase scheme and
/// host, strip the default port for the scheme, preserve all other ports
/// and the full path (including case), and ensure exactly one trailing
/// slash.
#[must_use]
pub fn normalize_account_identity_url(url: &str) -> String {
    let Some(scheme_end) = url.find("://") else {
        return url.to_string();
    };
    let scheme = url[..scheme_end].to_ascii_lowercase();
    let rest = &url[scheme_end + 3..];
    let (authority, path) = rest.find('/').map_or((rest, ""), |i| (&rest[..i], &rest[i..]));

    let (host, port) = authority.rsplit_once(':').map_or((authority, None), |(h, p)| (h, Some(p)));
    let host = host.to_ascii_lowercase();

    let default_port = match scheme.as_str() {
        "https" => Some("443"),
        "http" => Some("80"),
        _ => None,
    };
    let keep_port = port.filter(|p| Some(*p) != default_port);

    let mut normalized = format!("{scheme}://{host}");
    if let Some(p) = keep_port {
        normalized.push(':');
        normalized.push_str(p);
    }
    normalized.push_str(path);
    if !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

/// Runs spec §4.4 steps 1–5 against `base_url`.
///
/// # Errors
///
/// Returns [`CalDavError::Auth`] or a TLS error immediately when either is
/// encountered at any step (spec §4.3 "stop immediately, that is a
/// terminal answer, not a wrong path"). Returns other [`CalDavError`]
/// variants if every path probe and the well-known probe both fail.
pub async fn discover(
    client: &dyn CalDavClient,
    quirks: &dyn Quirks,
    base_url: &str,
) -> Result<DiscoveryOutcome, CalDavError> {
    let mut url = normalize_input_url(base_url);

    if quirks.uses_well_known_discovery() {
        if let Ok(result) = client.discover_well_known(&url).await {
            if result.supports_calendars {
                url = result.resolved_url;
            }
        }
    }

    let principal_url = if RECOGNIZED_CALDAV_PATHS.iter().any(|p| url.contains(p)) {
        client.discover_principal(&url).await?
    } else {
        probe_principal(client, quirks, &url).await?
    };

    let calendar_home = client.discover_calendar_home(principal_url.as_str()).await?;
    let calendar_home_url = normalize_account_identity_url(calendar_home.as_str());

    let calendars = client.list_calendars(&calendar_home_url).await?;
    let calendars = quirks.filter_discovered_calendars(calendars);

    Ok(DiscoveryOutcome {
        principal_url: principal_url.to_string(),
        calendar_home_url,
        calendars,
    })
}

/// Iterates [`Quirks::path_probes`], stopping on the first success, the
/// first `AuthError`, or the first TLS error (spec §4.3 "the first match
/// stops probing; if any probe returns AuthError or a TLS error, stop
/// immediately").
async fn probe_principal(client: &dyn CalDavClient, quirks: &dyn Quirks, base_url: &str) -> Result<Href, CalDavError> {
    let base = base_url.trim_end_matches('/');
    let mut last_err = CalDavError::NotACalDavServer;

    for probe in quirks.path_probes() {
        let candidate = format!("{base}{probe}");
        match client.discover_principal(&candidate).await {
            Ok(href) => return Ok(href),
            Err(e @ CalDavError::Auth(_)) => return Err(e),
            Err(e @ CalDavError::Tls { .. }) => return Err(e),
            Err(e) => last_err = e,
        }
    }

    Err(last_err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_url_gets_https_scheme_when_missing() {
        assert_eq!(normalize_input_url("caldav.example.com"), "https://caldav.example.com");
    }

    #[test]
    fn input_url_preserves_explicit_http() {
        assert_eq!(normalize_input_url("http://caldav.example.com"), "http://caldav.example.com");
    }

    #[test]
    fn input_url_drops_trailing_slash_with_empty_path() {
        assert_eq!(normalize_input_url("https://caldav.example.com/"), "https://caldav.example.com");
    }

    #[test]
    fn input_url_keeps_trailing_slash_with_nonempty_path() {
        assert_eq!(
            normalize_input_url("https://caldav.example.com/dav/"),
            "https://caldav.example.com/dav/"
        );
    }

    #[test]
    fn identity_url_lowercases_scheme_and_host_and_strips_default_port() {
        assert_eq!(
            normalize_account_identity_url("HTTPS://CalDAV.Example.com:443/Dav/Calendars/User"),
            "https://caldav.example.com/Dav/Calendars/User/"
        );
    }

    #[test]
    fn identity_url_preserves_nondefault_port() {
        assert_eq!(
            normalize_account_identity_url("https://caldav.example.com:8443/dav/"),
            "https://caldav.example.com:8443/dav/"
        );
    }
}
