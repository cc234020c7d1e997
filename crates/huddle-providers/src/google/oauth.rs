//! OAuth 2.0 token refresh against Google's token endpoint.
//!
//! Accounts arrive already linked; only the refresh-token grant is needed
//! here.

use std::sync::Arc;

use serde::Deserialize;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::http::{self, HttpClient, HttpRequest, RetryPolicy};
use crate::provider::BoxFuture;
use crate::refresher::{RefreshedToken, TokenEndpoint};

use super::config::{GoogleConfig, OAuthCredentials};

/// Google's OAuth token endpoint.
#[derive(Debug, Clone)]
pub struct GoogleTokenEndpoint {
    credentials: OAuthCredentials,
    token_url: String,
    http: Arc<dyn HttpClient>,
    policy: RetryPolicy,
}

impl GoogleTokenEndpoint {
    pub fn new(config: &GoogleConfig, http: Arc<dyn HttpClient>) -> Self {
        Self {
            credentials: config.credentials.clone(),
            token_url: config.token_url.clone(),
            http,
            policy: RetryPolicy::default(),
        }
    }

    /// Builder method to set the retry policy.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    async fn refresh_token(&self, refresh_token: &str) -> ProviderResult<RefreshedToken> {
        let request = HttpRequest::post(&self.token_url).form(&[
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ]);

        let response = http::send(self.http.as_ref(), request, self.policy).await?;
        if !response.is_success() {
            return Err(ProviderError::auth_expired(format!(
                "token refresh failed ({}): {}",
                response.status, response.body
            ))
            .with_provider("google"));
        }

        let token: TokenResponse = serde_json::from_str(&response.body).map_err(|e| {
            ProviderError::malformed(format!("invalid token response: {}", e)).with_provider("google")
        })?;

        debug!(expires_in = ?token.expires_in, "token endpoint issued access token");
        Ok(RefreshedToken {
            access_token: token.access_token,
            expires_in: token.expires_in,
            refresh_token: token.refresh_token,
        })
    }
}

impl TokenEndpoint for GoogleTokenEndpoint {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, ProviderResult<RefreshedToken>> {
        Box::pin(self.refresh_token(refresh_token))
    }
}

/// Response from Google's token endpoint.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use crate::http::HttpResponse;
    use crate::http::fake::FakeHttp;

    fn endpoint(http: Arc<FakeHttp>) -> GoogleTokenEndpoint {
        let config = GoogleConfig::new(OAuthCredentials::new("client", "secret"))
            .with_token_url("https://oauth.test/token");
        GoogleTokenEndpoint::new(&config, http)
    }

    #[tokio::test]
    async fn refresh_posts_form_and_parses_token() {
        let http = Arc::new(FakeHttp::scripted([Ok(HttpResponse::ok(
            r#"{"access_token":"new","expires_in":3599,"token_type":"Bearer"}"#,
        ))]));
        let token = endpoint(http.clone()).refresh("r-1").await.unwrap();
        assert_eq!(token.access_token, "new");
        assert_eq!(token.expires_in, Some(3599));
        assert!(token.refresh_token.is_none());

        let request = http.request(0);
        assert_eq!(request.url, "https://oauth.test/token");
        let body = request.body.unwrap();
        assert!(body.contains("grant_type=refresh_token"));
        assert!(body.contains("refresh_token=r-1"));
    }

    #[tokio::test]
    async fn rejected_grant_is_auth_expired() {
        let http = Arc::new(FakeHttp::scripted([Ok(HttpResponse::new(
            400,
            r#"{"error":"invalid_grant"}"#,
        ))]));
        let err = endpoint(http).refresh("revoked").await.unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthExpired);
    }

    #[tokio::test]
    async fn transport_error_retried_once() {
        let http = Arc::new(FakeHttp::scripted([
            Err(ProviderError::transport("connection reset")),
            Ok(HttpResponse::ok(r#"{"access_token":"new"}"#)),
        ]));
        let token = endpoint(http.clone()).refresh("r-1").await.unwrap();
        assert_eq!(token.access_token, "new");
        assert_eq!(http.request_count(), 2);
    }
}
