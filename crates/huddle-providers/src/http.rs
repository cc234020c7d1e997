//! HTTP transport seam shared by every adapter.
//!
//! Adapters describe requests as plain [`HttpRequest`] values and hand them
//! to an [`HttpClient`]. Production code uses [`ReqwestClient`]; tests swap
//! in a scripted fake. [`send`] applies the single-retry policy and
//! [`HttpResponse::check_status`] maps statuses onto provider error codes.

use std::fmt;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;

/// HTTP verbs used by the adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Propfind,
    Report,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Propfind => "PROPFIND",
            Self::Report => "REPORT",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request an adapter wants sent.
#[derive(Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl fmt::Debug for HttpRequest {
    // Authorization headers stay out of logs.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field("query", &self.query)
            .field("body_len", &self.body.as_ref().map(String::len))
            .finish_non_exhaustive()
    }
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn post(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Post, url)
    }

    /// Appends a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Appends a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Sets an OAuth bearer token.
    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {token}"))
    }

    /// Sets a body with its content type.
    pub fn body(mut self, content_type: &str, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self.header("Content-Type", content_type)
    }

    /// Sets an `application/x-www-form-urlencoded` body.
    pub fn form(self, fields: &[(&str, &str)]) -> Self {
        let encoded = fields
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        self.body("application/x-www-form-urlencoded", encoded)
    }

    /// Returns the first header with this name, case-insensitively.
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Returns the first query parameter with this key.
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// A fully read response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn ok(body: impl Into<String>) -> Self {
        Self::new(200, body)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Maps non-success statuses onto provider errors.
    ///
    /// 401 means the credential was rejected. Everything else that is not
    /// 2xx, 403 included, makes the provider unavailable for this call: a
    /// 403 is a per-calendar permission or quota refusal, not an expired
    /// grant. Status errors are never transient.
    pub fn check_status(self) -> ProviderResult<Self> {
        match self.status {
            _ if self.is_success() => Ok(self),
            401 => Err(ProviderError::auth_expired(format!(
                "credential rejected with HTTP {}",
                self.status
            ))),
            status => {
                warn!(status, body = %truncate(&self.body, 200), "unexpected response status");
                Err(ProviderError::unavailable(format!(
                    "HTTP {}: {}",
                    status,
                    truncate(&self.body, 200)
                )))
            }
        }
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Sends requests on behalf of adapters.
pub trait HttpClient: Send + Sync + fmt::Debug {
    /// Sends one request and reads the whole body.
    ///
    /// Transport failures (connect, reset, timeout) are returned as
    /// transient [`ProviderError`]s; any status code is a successful call.
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, ProviderResult<HttpResponse>>;
}

/// Retry policy applied around [`HttpClient::execute`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retry_transient: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retry_transient: true,
        }
    }
}

/// Sends `request`, retrying once on a transient transport error.
pub async fn send(
    client: &dyn HttpClient,
    request: HttpRequest,
    policy: RetryPolicy,
) -> ProviderResult<HttpResponse> {
    trace!(method = %request.method, url = %request.url, "sending request");
    match client.execute(request.clone()).await {
        Err(e) if e.is_transient() && policy.retry_transient => {
            debug!(url = %request.url, error = %e, "transient transport error, retrying once");
            client.execute(request).await
        }
        other => other,
    }
}

/// [`HttpClient`] backed by `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestClient {
    client: reqwest::Client,
}

impl ReqwestClient {
    /// Builds a client with a per-request timeout and user agent.
    pub fn new(timeout: Duration, user_agent: &str) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()
            .map_err(|e| {
                ProviderError::configuration(format!("failed to create HTTP client: {}", e))
                    .with_source(e)
            })?;
        Ok(Self { client })
    }

    async fn execute_inner(&self, request: HttpRequest) -> ProviderResult<HttpResponse> {
        let method = reqwest::Method::from_bytes(request.method.as_str().as_bytes())
            .map_err(|e| ProviderError::invalid_request(format!("invalid HTTP method: {}", e)))?;

        let mut builder = self.client.request(method, &request.url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(map_transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(map_transport_error)?;
        Ok(HttpResponse { status, body })
    }
}

impl HttpClient for ReqwestClient {
    fn execute(&self, request: HttpRequest) -> BoxFuture<'_, ProviderResult<HttpResponse>> {
        Box::pin(self.execute_inner(request))
    }
}

fn map_transport_error(e: reqwest::Error) -> ProviderError {
    let message = if e.is_timeout() {
        "request timeout".to_string()
    } else if e.is_connect() {
        format!("connection failed: {}", e)
    } else {
        format!("request failed: {}", e)
    };

    if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
        ProviderError::transport(message).with_source(e)
    } else {
        ProviderError::unavailable(message).with_source(e)
    }
}


#[cfg(test)]
mod tests {
    use super::fake::FakeHttp;
    use super::*;
    use crate::error::ProviderErrorCode;

    #[tokio::test]
    async fn retries_transient_error_once() {
        let http = FakeHttp::scripted([
            Err(ProviderError::transport("connection reset")),
            Ok(HttpResponse::ok("{}")),
        ]);
        let response = send(&http, HttpRequest::get("https://x.test"), RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(http.request_count(), 2);
    }

    #[tokio::test]
    async fn gives_up_after_second_transient_error() {
        let http = FakeHttp::scripted([
            Err(ProviderError::transport("timeout")),
            Err(ProviderError::transport("timeout")),
            Ok(HttpResponse::ok("never reached")),
        ]);
        let err = send(&http, HttpRequest::get("https://x.test"), RetryPolicy::default())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::ProviderUnavailable);
        assert_eq!(http.request_count(), 2);
    }

    #[tokio::test]
    async fn no_retry_on_status_or_when_disabled() {
        let http = FakeHttp::scripted([Ok(HttpResponse::new(503, "busy"))]);
        let response = send(&http, HttpRequest::get("https://x.test"), RetryPolicy::default())
            .await
            .unwrap();
        assert_eq!(response.status, 503);
        assert_eq!(http.request_count(), 1);

        let http = FakeHttp::scripted([Err(ProviderError::transport("reset"))]);
        let policy = RetryPolicy {
            retry_transient: false,
        };
        assert!(send(&http, HttpRequest::get("https://x.test"), policy).await.is_err());
        assert_eq!(http.request_count(), 1);
    }

    #[test]
    fn status_mapping() {
        assert!(HttpResponse::new(207, "").check_status().is_ok());
        assert_eq!(
            HttpResponse::new(401, "").check_status().unwrap_err().code(),
            ProviderErrorCode::AuthExpired
        );
        let forbidden = HttpResponse::new(403, r#"{"error":{"errors":[{"reason":"rateLimitExceeded"}]}}"#)
            .check_status()
            .unwrap_err();
        assert_eq!(forbidden.code(), ProviderErrorCode::ProviderUnavailable);
        assert!(forbidden.message().contains("rateLimitExceeded"));
        let err = HttpResponse::new(500, "oops").check_status().unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::ProviderUnavailable);
        assert!(!err.is_transient());
    }

    #[test]
    fn form_encoding_and_lookup() {
        let request = HttpRequest::post("https://oauth.test/token")
            .form(&[("grant_type", "refresh_token"), ("refresh_token", "a/b c")]);
        assert_eq!(
            request.body.as_deref(),
            Some("grant_type=refresh_token&refresh_token=a%2Fb%20c")
        );
        assert_eq!(
            request.header_value("content-type"),
            Some("application/x-www-form-urlencoded")
        );
    }

    #[test]
    fn debug_hides_headers() {
        let request = HttpRequest::get("https://x.test").bearer("secret-token");
        assert!(!format!("{:?}", request).contains("secret-token"));
    }
}
