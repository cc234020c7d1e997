//! Google Calendar provider configuration.

use std::path::Path;

use serde::Deserialize;

/// OAuth 2.0 client credentials used when refreshing access tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct OAuthCredentials {
    /// The OAuth 2.0 client ID from Google Cloud Console.
    pub client_id: String,
    /// The OAuth 2.0 client secret from Google Cloud Console.
    pub client_secret: String,
}

impl std::fmt::Debug for OAuthCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuthCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Structure of Google's OAuth client JSON file.
///
/// Supports the Cloud Console format with an "installed" or "web" section
/// and the flat format with `client_id`/`client_secret` at the root.
#[derive(Debug, Deserialize)]
struct ClientSecretFile {
    installed: Option<NestedCredentials>,
    web: Option<NestedCredentials>,
    client_id: Option<String>,
    client_secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct NestedCredentials {
    client_id: String,
    client_secret: String,
}

impl OAuthCredentials {
    /// Creates new OAuth credentials.
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Loads OAuth credentials from a Google Cloud Console JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, String> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| format!("failed to read client secret file: {}", e))?;
        Self::from_json(&content)
    }

    /// Parses OAuth credentials from a Google client secret JSON string.
    pub fn from_json(json: &str) -> Result<Self, String> {
        let file: ClientSecretFile = serde_json::from_str(json)
            .map_err(|e| format!("failed to parse client secret JSON: {}", e))?;

        if let Some(creds) = file.installed.or(file.web) {
            return Ok(Self::new(creds.client_id, creds.client_secret));
        }

        if let (Some(client_id), Some(client_secret)) = (file.client_id, file.client_secret) {
            return Ok(Self::new(client_id, client_secret));
        }

        Err("client secret file must contain 'installed'/'web' section or 'client_id'/'client_secret' at root level".to_string())
    }

    /// Checks that both values are present.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.client_id.is_empty() {
            return Err("client_id is required");
        }
        if self.client_secret.is_empty() {
            return Err("client_secret is required");
        }
        Ok(())
    }
}

/// Configuration for the Google Calendar provider.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    /// OAuth client used for token refresh.
    pub credentials: OAuthCredentials,

    /// Base URL of the Calendar API v3.
    pub api_base: String,

    /// OAuth token endpoint.
    pub token_url: String,

    /// Page size requested from `events.list`.
    pub page_size: u32,
}

impl GoogleConfig {
    /// Production Calendar API base.
    pub const DEFAULT_API_BASE: &'static str = "https://www.googleapis.com/calendar/v3";

    /// Production OAuth token endpoint.
    pub const DEFAULT_TOKEN_URL: &'static str = "https://oauth2.googleapis.com/token";

    /// Maximum page size accepted by `events.list`.
    pub const DEFAULT_PAGE_SIZE: u32 = 250;

    /// Creates a new Google configuration with the given credentials.
    pub fn new(credentials: OAuthCredentials) -> Self {
        Self {
            credentials,
            api_base: Self::DEFAULT_API_BASE.to_string(),
            token_url: Self::DEFAULT_TOKEN_URL.to_string(),
            page_size: Self::DEFAULT_PAGE_SIZE,
        }
    }

    /// Sets the API base URL, without a trailing slash.
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the OAuth token endpoint.
    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    /// Sets the events page size.
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }

    /// URL of the calendar list endpoint.
    pub fn calendar_list_url(&self) -> String {
        format!("{}/users/me/calendarList", self.api_base)
    }

    /// URL of the events endpoint of one calendar.
    pub fn events_url(&self, calendar_id: &str) -> String {
        format!(
            "{}/calendars/{}/events",
            self.api_base,
            urlencoding::encode(calendar_id)
        )
    }
}
