//! CalDAV HTTP client for WebDAV operations.
//!
//! Sends PROPFIND and REPORT requests through the shared [`HttpClient`] and
//! parses the multistatus replies.

use std::sync::Arc;

use huddle_core::TimeWindow;
use tracing::debug;
use url::Url;

use crate::error::{ProviderError, ProviderResult};
use crate::http::{self, HttpClient, HttpMethod, HttpRequest, RetryPolicy};

use super::auth::basic_auth;
use super::config::AppleConfig;
use super::xml::{DavResponse, calendar_query_body, parse_multistatus, propfind_body};

const XML_CONTENT_TYPE: &str = "application/xml; charset=utf-8";

/// CalDAV client for one set of iCloud credentials.
#[derive(Debug, Clone)]
pub(crate) struct CalDavClient {
    http: Arc<dyn HttpClient>,
    config: AppleConfig,
    policy: RetryPolicy,
}

impl CalDavClient {
    pub(crate) fn new(http: Arc<dyn HttpClient>, config: AppleConfig, policy: RetryPolicy) -> Self {
        Self {
            http,
            config,
            policy,
        }
    }

    pub(crate) fn config(&self) -> &AppleConfig {
        &self.config
    }

    /// Performs a PROPFIND at `url` for `props`.
    pub(crate) async fn propfind(
        &self,
        authorization: &Authorization,
        url: &Url,
        depth: u8,
        props: &[&str],
    ) -> ProviderResult<Vec<DavResponse>> {
        let body = propfind_body(props)?;
        debug!(url = %url, depth, "PROPFIND");
        self.multistatus(authorization, HttpMethod::Propfind, url, depth, body)
            .await
    }

    /// Performs a calendar-query REPORT for `window`.
    pub(crate) async fn report(
        &self,
        authorization: &Authorization,
        calendar_url: &Url,
        window: &TimeWindow,
    ) -> ProviderResult<Vec<DavResponse>> {
        let body = calendar_query_body(window)?;
        debug!(url = %calendar_url, "REPORT calendar-query");
        self.multistatus(authorization, HttpMethod::Report, calendar_url, 1, body)
            .await
    }

    async fn multistatus(
        &self,
        authorization: &Authorization,
        method: HttpMethod,
        url: &Url,
        depth: u8,
        body: String,
    ) -> ProviderResult<Vec<DavResponse>> {
        let request = HttpRequest::new(method, url.as_str())
            .header("Authorization", authorization.0.as_str())
            .header("Depth", depth.to_string())
            .body(XML_CONTENT_TYPE, body);

        let response = http::send(self.http.as_ref(), request, self.policy)
            .await?
            .check_status()?;

        parse_multistatus(&response.body)
            .map_err(|reason| ProviderError::malformed(format!("{} {}: {}", method, url, reason)))
    }
}

/// A prepared `Authorization` header value.
#[derive(Clone)]
pub(crate) struct Authorization(String);

impl Authorization {
    pub(crate) fn basic(username: &str, password: &str) -> Self {
        Self(basic_auth(username, password))
    }
}

impl std::fmt::Debug for Authorization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Authorization(<redacted>)")
    }
}
