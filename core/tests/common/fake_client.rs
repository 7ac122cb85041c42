// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! An in-memory `CalDAV` server double for end-to-end workflow tests.
//!
//! Unlike the narrower fakes embedded in `calsync-core`'s own unit tests,
//! this one actually stores what `push.rs` sends it, so `fetch_etags_in_range`/
//! `fetch_events_by_href` can echo real resources back to `pull.rs`.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use calsync_caldav::{
    CalDavClient, CalDavError, CalendarCollection, CalendarResource, DiscoverResult, ETag, Href, SyncCollectionResult, SyncToken,
};

#[derive(Debug, Default)]
pub struct FakeClient {
    resources: Mutex<HashMap<String, CalendarResource>>,
    pub fail_auth: bool,
    pub fail_transport: bool,
}

#[async_trait]
impl CalDavClient for FakeClient {
    async fn discover_well_known(&self, _base_url: &str) -> Result<DiscoverResult, CalDavError> {
        unimplemented!("not exercised by workflow tests")
    }

    async fn discover_principal(&self, _url: &str) -> Result<Href, CalDavError> {
        unimplemented!("not exercised by workflow tests")
    }

    async fn discover_calendar_home(&self, _principal_url: &str) -> Result<Href, CalDavError> {
        unimplemented!("not exercised by workflow tests")
    }

    async fn list_calendars(&self, _calendar_home_url: &str) -> Result<Vec<CalendarCollection>, CalDavError> {
        unimplemented!("not exercised by workflow tests")
    }

    async fn get_ctag(&self, _collection_url: &str) -> Result<Option<String>, CalDavError> {
        Ok(None)
    }

    async fn get_sync_token(&self, _collection_url: &str) -> Result<Option<SyncToken>, CalDavError> {
        Ok(None)
    }

    async fn sync_collection(&self, _collection_url: &str, _token: Option<&SyncToken>) -> Result<SyncCollectionResult, CalDavError> {
        Ok(SyncCollectionResult::default())
    }

    async fn fetch_etags_in_range(&self, _collection_url: &str, _from: &str, _to: &str) -> Result<Vec<(Href, ETag)>, CalDavError> {
        let resources = self.resources.lock().expect("fake client lock poisoned");
        Ok(resources.values().map(|r| (r.href.clone(), r.etag.clone())).collect())
    }

    async fn fetch_events_by_href(&self, _collection_url: &str, hrefs: &[Href]) -> Result<Vec<CalendarResource>, CalDavError> {
        let resources = self.resources.lock().expect("fake client lock poisoned");
        Ok(hrefs.iter().filter_map(|h| resources.get(h.as_str()).cloned()).collect())
    }

    async fn fetch_event(&self, href: &Href) -> Result<CalendarResource, CalDavError> {
        self.resources
            .lock()
            .expect("fake client lock poisoned")
            .get(href.as_str())
            .cloned()
            .ok_or_else(|| CalDavError::NotFound(href.clone()))
    }

    async fn create_event(&self, collection_url: &str, uid: &str, ics: &str) -> Result<(Href, ETag), CalDavError> {
        if self.fail_auth {
            return Err(CalDavError::Auth("invalid credentials".into()));
        }
        if self.fail_transport {
            return Err(CalDavError::Transport { message: "connection reset".into(), retryable: true });
        }
        let href = Href::new(format!("{collection_url}{uid}.ics"));
        let etag = ETag::new("\"1\"".into());
        let resource = CalendarResource::new(href.clone(), etag.clone(), ics.to_string());
        self.resources.lock().expect("fake client lock poisoned").insert(href.as_str().to_string(), resource);
        Ok((href, etag))
    }

    async fn update_event(&self, href: &Href, ics: &str, if_match_etag: &ETag) -> Result<ETag, CalDavError> {
        let mut resources = self.resources.lock().expect("fake client lock poisoned");
        let Some(existing) = resources.get(href.as_str()) else {
            return Err(CalDavError::NotFound(href.clone()));
        };
        if existing.etag.as_str() != if_match_etag.as_str() {
            return Err(CalDavError::Conflict(href.to_string()));
        }
        let new_etag = ETag::new(format!("\"{}\"", existing.etag.as_str().len() + 1));
        resources.insert(href.as_str().to_string(), CalendarResource::new(href.clone(), new_etag.clone(), ics.to_string()));
        Ok(new_etag)
    }

    async fn delete_event(&self, href: &Href, if_match_etag: &ETag) -> Result<(), CalDavError> {
        let mut resources = self.resources.lock().expect("fake client lock poisoned");
        let Some(existing) = resources.get(href.as_str()) else {
            return Err(CalDavError::NotFound(href.clone()));
        };
        if existing.etag.as_str() != if_match_etag.as_str() {
            return Err(CalDavError::Conflict(href.to_string()));
        }
        resources.remove(href.as_str());
        Ok(())
    }

    async fn move_event(&self, from_href: &Href, to_collection_url: &str, if_match_etag: &ETag) -> Result<(Href, ETag), CalDavError> {
        let mut resources = self.resources.lock().expect("fake client lock poisoned");
        let Some(existing) = resources.remove(from_href.as_str()) else {
            return Err(CalDavError::NotFound(from_href.clone()));
        };
        if existing.etag.as_str() != if_match_etag.as_str() {
            return Err(CalDavError::Conflict(from_href.to_string()));
        }
        let file_name = from_href.as_str().rsplit('/').next().unwrap_or(from_href.as_str());
        let new_href = Href::new(format!("{to_collection_url}{file_name}"));
        let moved = CalendarResource::new(new_href.clone(), existing.etag.clone(), existing.raw_ical);
        let etag = moved.etag.clone();
        resources.insert(new_href.as_str().to_string(), moved);
        Ok((new_href, etag))
    }
}
