// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! The `CalDAV` wire operations the sync core drives (spec §4.2).
//!
//! [`CalDavClient`] is a trait rather than a concrete struct so the core
//! crate's pull/push strategies can be exercised against a fake in tests
//! without a live server. [`ReqwestCalDavClient`] is the production
//! implementation, backed by [`HttpClient`].

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::Method;

use crate::config::CalDavConfig;
use crate::error::CalDavError;
use crate::http::HttpClient;
use crate::request::{CalendarMultiGetRequest, CalendarQueryRequest, Prop, PropFindRequest, SyncCollectionRequest};
use crate::response::MultiStatusResponse;
use crate::types::{CalendarCollection, CalendarResource, ETag, Href, SyncCollectionResult, SyncToken};

/// Maximum hrefs per `calendar-multiget` REPORT (spec §4.2/§5 "hrefs
/// fetched in batches of 50").
const MULTIGET_BATCH_SIZE: usize = 50;

/// Maximum concurrent multiget requests in flight (spec §4.2/§5 "at most
/// 16 concurrent requests").
const MULTIGET_CONCURRENCY: usize = 16;

/// Result of probing `/.well-known/caldav` (spec §4.4 step 2).
#[derive(Debug, Clone)]
pub struct DiscoverResult {
    /// Whether the probed URL answers as a `CalDAV` server at all (`DAV`
    /// response header contains `calendar-access`).
    pub supports_calendars: bool,
    /// The resolved URL to continue discovery from (a redirect target, or
    /// the original URL if the server answered `200` directly).
    pub resolved_url: String,
}

/// Free/busy data (spec §1 "retained as a secondary wire capability").
#[derive(Debug, Clone, Default)]
pub struct FreeBusyData {
    /// Raw `VFREEBUSY` multi-status body, unparsed.
    pub raw_data: Option<String>,
}

/// The `CalDAV` wire operations the sync core depends on (spec §4.2).
///
/// Every method takes absolute or collection-relative URLs as produced by
/// [`crate::discovery::DiscoveryService`]; this trait does not itself know
/// about accounts or persistence.
#[async_trait]
pub trait CalDavClient: std::fmt::Debug + Send + Sync {
    /// Probes `{base_url}/.well-known/caldav` (spec §4.4 step 2).
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails outright; a non-2xx/3xx
    /// response without a `Location` header is reported as
    /// [`CalDavError::NotACalDavServer`].
    async fn discover_well_known(&self, base_url: &str) -> Result<DiscoverResult, CalDavError>;

    /// Resolves `DAV:current-user-principal` at `url` (spec §4.4 step 3).
    ///
    /// # Errors
    ///
    /// Returns an error if the PROPFIND fails or the property is absent.
    async fn discover_principal(&self, url: &str) -> Result<Href, CalDavError>;

    /// Resolves `CALDAV:calendar-home-set` for the principal at `url`
    /// (spec §4.4 step 4).
    ///
    /// # Errors
    ///
    /// Returns an error if the PROPFIND fails or the property is absent.
    async fn discover_calendar_home(&self, principal_url: &str) -> Result<Href, CalDavError>;

    /// Lists calendar collections under `calendar_home_url` (spec §4.4
    /// step 5, unfiltered — callers apply [`crate::quirks::Quirks::filter_discovered_calendars`]).
    ///
    /// # Errors
    ///
    /// Returns an error if the PROPFIND fails.
    async fn list_calendars(&self, calendar_home_url: &str) -> Result<Vec<CalendarCollection>, CalDavError>;

    /// Fetches `CS:getctag` for a single collection (spec §4.6 step 1).
    ///
    /// # Errors
    ///
    /// Returns an error if the PROPFIND fails. Returns `Ok(None)` if the
    /// server omits the property rather than erroring, since some servers
    /// (Zoho) never advertise it.
    async fn get_ctag(&self, collection_url: &str) -> Result<Option<String>, CalDavError>;

    /// Fetches `DAV:sync-token` for a single collection, as a plain
    /// property (not via `sync-collection`) (spec §4.6 step 1).
    ///
    /// # Errors
    ///
    /// Returns an error if the PROPFIND fails.
    async fn get_sync_token(&self, collection_url: &str) -> Result<Option<SyncToken>, CalDavError>;

    /// Runs a `sync-collection` REPORT (RFC 6578, spec §4.2 `syncCollection`).
    ///
    /// `token` is `None` for an initial sync. A server that rejects the
    /// token (expired or unrecognized) answers `403 Forbidden` or
    /// `409 Conflict` per RFC 6578 §3.2; the caller falls back to a full
    /// resync in that case (spec §4.6 step 2 "Invalid sync-token").
    ///
    /// # Errors
    ///
    /// Returns an error if the REPORT fails.
    async fn sync_collection(
        &self,
        collection_url: &str,
        token: Option<&SyncToken>,
    ) -> Result<SyncCollectionResult, CalDavError>;

    /// Runs a `calendar-query` REPORT restricted to `[from, to)`, returning
    /// `(href, etag)` pairs without bodies (spec §4.6 step A, full pull).
    ///
    /// # Errors
    ///
    /// Returns an error if the REPORT fails.
    async fn fetch_etags_in_range(
        &self,
        collection_url: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<(Href, ETag)>, CalDavError>;

    /// Fetches the full bodies for `hrefs` via `calendar-multiget`,
    /// internally chunked into batches of [`MULTIGET_BATCH_SIZE`] issued
    /// with up to [`MULTIGET_CONCURRENCY`] requests in flight (spec §4.2/§5
    /// "fetchEventsByHref: batches of 50, cap 16 concurrent").
    ///
    /// # Errors
    ///
    /// Returns an error if any batch's REPORT fails; already-completed
    /// batches are discarded along with it (the caller retries the whole
    /// pull on failure, spec §4.7 has no partial-multiget recovery).
    async fn fetch_events_by_href(
        &self,
        collection_url: &str,
        hrefs: &[Href],
    ) -> Result<Vec<CalendarResource>, CalDavError>;

    /// Fetches a single calendar object resource by its absolute href
    /// (spec §4.2 `fetchEvent`).
    ///
    /// # Errors
    ///
    /// Returns [`CalDavError::NotFound`] if the resource is gone, or
    /// another error if the GET fails.
    async fn fetch_event(&self, href: &Href) -> Result<CalendarResource, CalDavError>;

    /// Creates a calendar object resource at a server-chosen href under
    /// `collection_url`, named `{uid}.ics` (spec §4.2 `createEvent`).
    /// Sends `If-None-Match: *` so a UID collision surfaces as
    /// [`CalDavError::Conflict`] rather than silently overwriting.
    ///
    /// # Errors
    ///
    /// Returns an error if the PUT fails.
    async fn create_event(&self, collection_url: &str, uid: &str, ics: &str) -> Result<(Href, ETag), CalDavError>;

    /// Updates an existing resource at `href`, conditioned on `if_match_etag`
    /// (spec §4.2 `updateEvent`).
    ///
    /// # Errors
    ///
    /// Returns [`CalDavError::Conflict`] on an `ETag` mismatch (`412`, or
    /// `409` on providers that misreport it), or another error if the PUT
    /// fails.
    async fn update_event(&self, href: &Href, ics: &str, if_match_etag: &ETag) -> Result<ETag, CalDavError>;

    /// Deletes the resource at `href`, conditioned on `if_match_etag`
    /// (spec §4.2 `deleteEvent`).
    ///
    /// # Errors
    ///
    /// Returns [`CalDavError::Conflict`] on an `ETag` mismatch, or another
    /// error if the DELETE fails.
    async fn delete_event(&self, href: &Href, if_match_etag: &ETag) -> Result<(), CalDavError>;

    /// Moves a resource between collections, conditioned on `if_match_etag`
    /// (spec §4.2 `moveEvent`, used when [`crate::quirks::Quirks::supports_native_move`]
    /// is `true`).
    ///
    /// # Errors
    ///
    /// Returns [`CalDavError::UnsupportedCapability`] if the server rejects
    /// `MOVE` outright (`501`/`405`), signalling the caller to fall back to
    /// the two-phase delete-then-create sequence (spec §4.7).
    async fn move_event(
        &self,
        from_href: &Href,
        to_collection_url: &str,
        if_match_etag: &ETag,
    ) -> Result<(Href, ETag), CalDavError>;
}

/// Production [`CalDavClient`] backed by [`reqwest`].
#[derive(Debug, Clone)]
pub struct ReqwestCalDavClient {
    http: Arc<HttpClient>,
}

impl ReqwestCalDavClient {
    /// Creates a new client from a server configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client initialization fails, including TLS
    /// backend setup.
    pub fn new(config: CalDavConfig) -> Result<Self, CalDavError> {
        Ok(Self {
            http: Arc::new(HttpClient::new(config)?),
        })
    }

    fn report_method() -> Method {
        // Infallible: "REPORT" is a valid HTTP token.
        Method::from_bytes(b"REPORT").unwrap_or(Method::GET)
    }

    fn propfind_method() -> Method {
        Method::from_bytes(b"PROPFIND").unwrap_or(Method::GET)
    }

    async fn propfind(&self, url: &str, props: &[Prop], depth: Option<&str>) -> Result<MultiStatusResponse, CalDavError> {
        let mut req = PropFindRequest::new();
        for p in props {
            req.add_property(*p);
        }
        let body = req.build()?;

        let mut builder = self
            .http
            .build_request(Self::propfind_method(), url)
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(body);
        if let Some(depth) = depth {
            builder = builder.header("Depth", depth);
        }

        let resp = self.http.execute(builder).await?;
        let xml = resp.text().await?;
        MultiStatusResponse::from_xml(&xml)
    }

    async fn report(&self, url: &str, body: String, depth: Option<&str>) -> Result<MultiStatusResponse, CalDavError> {
        let mut builder = self
            .http
            .build_request(Self::report_method(), url)
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(body);
        if let Some(depth) = depth {
            builder = builder.header("Depth", depth);
        }

        let resp = self.http.execute(builder).await?;
        let xml = resp.text().await?;
        MultiStatusResponse::from_xml(&xml)
    }

    fn merge_properties_for_collection(ms: MultiStatusResponse, url: &str) -> Option<crate::response::Properties> {
        ms.responses
            .into_iter()
            .find(|r| r.has_success_propstat && (r.href.as_str() == url || is_same_resource(&r.href, url)))
            .map(|r| r.props)
    }
}

fn is_same_resource(href: &Href, url: &str) -> bool {
    url.ends_with(href.as_str())
}

#[async_trait]
impl CalDavClient for ReqwestCalDavClient {
    async fn discover_well_known(&self, base_url: &str) -> Result<DiscoverResult, CalDavError> {
        let url = format!("{}/.well-known/caldav", base_url.trim_end_matches('/'));
        let resp = self
            .http
            .execute(self.http.build_request(Method::GET, &url))
            .await;

        match resp {
            Ok(resp) => Ok(DiscoverResult {
                supports_calendars: true,
                resolved_url: resp.url().to_string(),
            }),
            Err(CalDavError::NotFound(_)) => Ok(DiscoverResult {
                supports_calendars: false,
                resolved_url: base_url.to_string(),
            }),
            Err(e) => Err(e),
        }
    }

    async fn discover_principal(&self, url: &str) -> Result<Href, CalDavError> {
        let ms = self.propfind(url, &[Prop::CurrentUserPrincipal], Some("0")).await?;
        ms.responses
            .into_iter()
            .find_map(|r| r.props.current_user_principal)
            .ok_or_else(|| CalDavError::InvalidResponse("no current-user-principal in response".to_string()))
    }

    async fn discover_calendar_home(&self, principal_url: &str) -> Result<Href, CalDavError> {
        let ms = self
            .propfind(principal_url, &[Prop::CalendarHomeSet], Some("0"))
            .await?;
        ms.responses
            .into_iter()
            .find_map(|r| r.props.calendar_home_set)
            .ok_or_else(|| CalDavError::InvalidResponse("no calendar-home-set in response".to_string()))
    }

    async fn list_calendars(&self, calendar_home_url: &str) -> Result<Vec<CalendarCollection>, CalDavError> {
        let ms = self
            .propfind(
                calendar_home_url,
                &[
                    Prop::DisplayName,
                    Prop::ResourceType,
                    Prop::CalendarDescription,
                    Prop::CalendarColor,
                    Prop::SupportedCalendarComponents,
                    Prop::GetCtag,
                ],
                Some("1"),
            )
            .await?;
        Ok(ms.into_collections())
    }

    async fn get_ctag(&self, collection_url: &str) -> Result<Option<String>, CalDavError> {
        let ms = self.propfind(collection_url, &[Prop::GetCtag], Some("0")).await?;
        Ok(Self::merge_properties_for_collection(ms, collection_url).and_then(|p| p.getctag))
    }

    async fn get_sync_token(&self, collection_url: &str) -> Result<Option<SyncToken>, CalDavError> {
        let ms = self.propfind(collection_url, &[Prop::SyncToken], Some("0")).await?;
        Ok(Self::merge_properties_for_collection(ms, collection_url).and_then(|p| p.sync_token))
    }

    async fn sync_collection(
        &self,
        collection_url: &str,
        token: Option<&SyncToken>,
    ) -> Result<SyncCollectionResult, CalDavError> {
        let body = SyncCollectionRequest::new(token.map(|t| t.as_str().to_string())).build()?;
        let ms = self.report(collection_url, body, None).await?;
        let sync_token = ms.sync_token.clone();
        let (changed, deleted) = ms.into_sync_result();
        Ok(SyncCollectionResult {
            sync_token,
            changed,
            deleted,
        })
    }

    async fn fetch_etags_in_range(
        &self,
        collection_url: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<(Href, ETag)>, CalDavError> {
        let body = CalendarQueryRequest::new().time_range(from.to_string(), to.to_string()).build()?;
        let ms = self.report(collection_url, body, Some("1")).await?;
        Ok(ms.into_etags())
    }

    async fn fetch_events_by_href(
        &self,
        collection_url: &str,
        hrefs: &[Href],
    ) -> Result<Vec<CalendarResource>, CalDavError> {
        if hrefs.is_empty() {
            return Ok(Vec::new());
        }

        let batches: Vec<Vec<Href>> = hrefs
            .chunks(MULTIGET_BATCH_SIZE)
            .map(<[Href]>::to_vec)
            .collect();

        let results: Vec<Vec<CalendarResource>> = stream::iter(batches)
            .map(|batch| async move {
                let mut req = CalendarMultiGetRequest::new();
                for href in &batch {
                    req.add_href(href.as_str().to_string());
                }
                let body = req.build()?;
                let ms = self.report(collection_url, body, None).await?;
                Ok::<_, CalDavError>(ms.into_resources())
            })
            .buffer_unordered(MULTIGET_CONCURRENCY)
            .try_collect()
            .await?;

        Ok(results.into_iter().flatten().collect())
    }

    async fn fetch_event(&self, href: &Href) -> Result<CalendarResource, CalDavError> {
        let resp = self
            .http
            .execute(self.http.build_request(Method::GET, href.as_str()))
            .await?;
        let etag = HttpClient::extract_etag(&resp)?;
        let ical = resp.text().await?;
        Ok(CalendarResource::new(href.clone(), etag, ical))
    }

    async fn create_event(&self, collection_url: &str, uid: &str, ics: &str) -> Result<(Href, ETag), CalDavError> {
        let url = format!("{}/{uid}.ics", collection_url.trim_end_matches('/'));
        let resp = self
            .http
            .execute(
                self.http
                    .build_request(Method::PUT, &url)
                    .header("Content-Type", "text/calendar; charset=utf-8")
                    .header("If-None-Match", "*")
                    .body(ics.to_string()),
            )
            .await?;
        let etag = HttpClient::extract_etag(&resp)?;
        Ok((Href::new(url), etag))
    }

    async fn update_event(&self, href: &Href, ics: &str, if_match_etag: &ETag) -> Result<ETag, CalDavError> {
        let resp = self
            .http
            .execute(HttpClient::if_match(
                self.http
                    .build_request(Method::PUT, href.as_str())
                    .header("Content-Type", "text/calendar; charset=utf-8")
                    .body(ics.to_string()),
                if_match_etag,
            ))
            .await?;
        HttpClient::extract_etag(&resp)
    }

    async fn delete_event(&self, href: &Href, if_match_etag: &ETag) -> Result<(), CalDavError> {
        self.http
            .execute(HttpClient::if_match(
                self.http.build_request(Method::DELETE, href.as_str()),
                if_match_etag,
            ))
            .await?;
        Ok(())
    }

    async fn move_event(
        &self,
        from_href: &Href,
        to_collection_url: &str,
        if_match_etag: &ETag,
    ) -> Result<(Href, ETag), CalDavError> {
        let file_name = from_href.as_str().rsplit('/').next().unwrap_or(from_href.as_str());
        let destination = format!("{}/{file_name}", to_collection_url.trim_end_matches('/'));

        let method = Method::from_bytes(b"MOVE").unwrap_or(Method::GET);
        let resp = self
            .http
            .execute(HttpClient::if_match(
                self.http
                    .build_request(method, from_href.as_str())
                    .header("Destination", destination.as_str())
                    .header("Overwrite", "F"),
                if_match_etag,
            ))
            .await;

        match resp {
            Ok(resp) => {
                let etag = HttpClient::extract_etag(&resp).unwrap_or_else(|_| if_match_etag.clone());
                Ok((Href::new(destination), etag))
            }
            Err(CalDavError::Transport { retryable: false, message }) => {
                Err(CalDavError::UnsupportedCapability(format!("MOVE rejected: {message}")))
            }
            Err(e) => Err(e),
        }
    }
}

/// Free/busy query (spec §1, retained as a secondary wire capability).
///
/// # Errors
///
/// Returns an error if the REPORT fails.
pub async fn free_busy(
    client: &ReqwestCalDavClient,
    calendar_url: &str,
    start: &str,
    end: &str,
) -> Result<FreeBusyData, CalDavError> {
    let body = crate::request::FreeBusyQueryRequest::new(start.to_string(), end.to_string()).build()?;
    let resp = client
        .http
        .execute(
            client
                .http
                .build_request(ReqwestCalDavClient::report_method(), calendar_url)
                .header("Content-Type", "application/xml; charset=utf-8")
                .body(body),
        )
        .await?;
    let xml = resp.text().await?;
    Ok(FreeBusyData { raw_data: Some(xml) })
}
