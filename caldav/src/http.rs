// SPDX-FileCopyrightText: 2025-2026 Zexin Yuan <aim@yzx9.xyz>
//
// SPDX-License-Identifier: Apache-2.0

//! HTTP client wrapper with authentication and `ETag` handling.

use reqwest::{Client, RequestBuilder, Response};

use crate::config::{AuthMethod, CalDavConfig};
use crate::error::{status_to_error, CalDavError};
use crate::types::ETag;

/// HTTP client for `CalDAV` operations.
#[derive(Debug)]
pub struct HttpClient {
    client: Client,
    config: CalDavConfig,
}

impl HttpClient {
    /// Creates a new HTTP client.
    ///
    /// # Errors
    ///
    /// Returns an error if HTTP client creation fails, including when a TLS
    /// backend fails to initialize.
    pub fn new(config: CalDavConfig) -> Result<Self, CalDavError> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(config.trust_insecure)
            .build()
            .map_err(|e| CalDavError::Tls {
                message: e.to_string(),
                trust_insecure_offered: !config.trust_insecure,
            })?;
        Ok(Self { client, config })
    }

    /// Returns the configuration this client was built from.
    #[must_use]
    pub const fn config(&self) -> &CalDavConfig {
        &self.config
    }

    /// Builds a request with authentication headers.
    pub fn build_request(&self, method: reqwest::Method, url: &str) -> RequestBuilder {
        let mut req = self.client.request(method, url);

        match &self.config.auth {
            AuthMethod::Basic { username, password } => {
                req = req.basic_auth(username, Some(password));
            }
            AuthMethod::Bearer { token } => {
                req = req.bearer_auth(token);
            }
            AuthMethod::None => {}
        }

        req
    }

    /// Executes a request and checks for HTTP errors.
    ///
    /// Both `412 Precondition Failed` and `409 Conflict` map to
    /// [`CalDavError::Conflict`] since some providers (Zoho) return `409`
    /// where RFC 4791 mandates `412`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails to send, or returns a status
    /// code outside the success set.
    pub async fn execute(&self, req: RequestBuilder) -> Result<Response, CalDavError> {
        let resp = req.send().await.map_err(classify_send_error)?;

        match resp.status() {
            reqwest::StatusCode::OK
            | reqwest::StatusCode::CREATED
            | reqwest::StatusCode::NO_CONTENT
            | reqwest::StatusCode::MULTI_STATUS => Ok(resp),
            status => {
                let text = resp
                    .text()
                    .await
                    .unwrap_or_else(|_| "unable to read response body".to_string());
                Err(status_to_error(status, text))
            }
        }
    }

    /// Adds If-Match header for conditional updates.
    pub fn if_match(req: RequestBuilder, etag: &ETag) -> RequestBuilder {
        req.header("If-Match", etag.as_str())
    }

    /// Adds If-None-Match header for conditional creation.
    pub fn if_none_match(req: RequestBuilder, etag: &ETag) -> RequestBuilder {
        req.header("If-None-Match", etag.as_str())
    }

    /// Extracts `ETag` from response headers.
    ///
    /// # Errors
    ///
    /// Returns an error if the `ETag` header is missing.
    pub fn extract_etag(resp: &Response) -> Result<ETag, CalDavError> {
        resp.headers()
            .get("ETag")
            .and_then(|v| v.to_str().ok())
            .map(|s| ETag::new(s.to_string()))
            .ok_or_else(|| CalDavError::InvalidResponse("missing ETag header".to_string()))
    }
}

fn classify_send_error(e: reqwest::Error) -> CalDavError {
    let looks_like_tls = std::error::Error::source(&e)
        .is_some_and(|s| s.to_string().to_lowercase().contains("certificate"));
    if e.is_connect() && looks_like_tls {
        return CalDavError::Tls {
            message: e.to_string(),
            trust_insecure_offered: true,
        };
    }
    CalDavError::from(e)
}
