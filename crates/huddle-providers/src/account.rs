//! Linked calendar accounts and their credential bundles.
//!
//! [`CalendarAccountRecord`] is the shape stored upstream. It is validated
//! into a [`CalendarAccount`] plus the [`CredentialBundle`] that matches its
//! provider type before any adapter is built.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use huddle_core::ProviderKind;
use serde::{Deserialize, Serialize};

use crate::error::{ProviderError, ProviderResult};

/// An account as stored by the host application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CalendarAccountRecord {
    pub id: String,
    pub email: String,
    pub calendar_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google_calendar_auth: Option<GoogleCredentials>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apple_calendar_auth: Option<AppleCredentials>,
}

impl CalendarAccountRecord {
    /// A Google account record.
    pub fn google(
        id: impl Into<String>,
        email: impl Into<String>,
        credentials: GoogleCredentials,
    ) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            calendar_type: ProviderKind::Google.to_string(),
            google_calendar_auth: Some(credentials),
            apple_calendar_auth: None,
        }
    }

    /// An Apple account record.
    pub fn apple(
        id: impl Into<String>,
        email: impl Into<String>,
        credentials: AppleCredentials,
    ) -> Self {
        Self {
            id: id.into(),
            email: email.into(),
            calendar_type: ProviderKind::Apple.to_string(),
            google_calendar_auth: None,
            apple_calendar_auth: Some(credentials),
        }
    }

    /// Checks the record and splits it into account and credential.
    ///
    /// # Errors
    ///
    /// - `UnknownProviderType` if `calendar_type` is not a supported kind
    /// - `Configuration` unless exactly the matching bundle is present
    pub fn validate(&self) -> ProviderResult<(CalendarAccount, CredentialBundle)> {
        let kind: ProviderKind = self.calendar_type.parse().map_err(|_| {
            ProviderError::unknown_provider_type(&self.calendar_type).with_provider(&self.id)
        })?;

        let bundle = match (kind, &self.google_calendar_auth, &self.apple_calendar_auth) {
            (ProviderKind::Google, Some(google), None) => CredentialBundle::Google(google.clone()),
            (ProviderKind::Apple, None, Some(apple)) => CredentialBundle::Apple(apple.clone()),
            (kind, google, apple) => {
                return Err(ProviderError::configuration(format!(
                    "account {} of type {} has google auth: {}, apple auth: {}",
                    self.id,
                    kind,
                    google.is_some(),
                    apple.is_some()
                ))
                .with_provider(kind.as_str()));
            }
        };

        let account = CalendarAccount {
            id: self.id.clone(),
            email: self.email.clone(),
            kind,
        };
        Ok((account, bundle))
    }
}

/// A validated linked account.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CalendarAccount {
    pub id: String,
    pub email: String,
    pub kind: ProviderKind,
}

/// OAuth credentials for a Google account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleCredentials {
    /// The access token for API requests.
    pub access_token: String,

    /// The refresh token for obtaining new access tokens.
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// When the access token expires.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,

    /// The OAuth scopes that were granted.
    #[serde(default)]
    pub scopes: Vec<String>,

    /// Set once a refresh has failed; the account must be re-linked.
    #[serde(default)]
    pub invalidated: bool,
}

impl fmt::Debug for GoogleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GoogleCredentials")
            .field("access_token", &"<redacted>")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("expires_at", &self.expires_at)
            .field("scopes", &self.scopes)
            .field("invalidated", &self.invalidated)
            .finish()
    }
}

impl GoogleCredentials {
    pub fn new(access_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: None,
            expires_at: None,
            scopes: Vec::new(),
            invalidated: false,
        }
    }

    /// Builder method to set the refresh token.
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        self.refresh_token = Some(token.into());
        self
    }

    /// Builder method to set the expiry instant.
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Returns true if the access token expires within `skew` of `now`.
    ///
    /// Tokens without an expiry never expire.
    pub fn is_expired(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        self.expires_at
            .is_some_and(|expires_at| expires_at - skew <= now)
    }

    /// Returns true if the token has the required scopes.
    pub fn has_scopes(&self, required: &[String]) -> bool {
        required.iter().all(|scope| self.scopes.contains(scope))
    }

    /// Applies a successful refresh.
    pub fn refreshed(
        &self,
        access_token: impl Into<String>,
        expires_in_secs: Option<i64>,
        rotated_refresh_token: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: rotated_refresh_token.or_else(|| self.refresh_token.clone()),
            expires_at: expires_in_secs.map(|secs| now + Duration::seconds(secs)),
            scopes: self.scopes.clone(),
            invalidated: false,
        }
    }
}

/// App-specific password credentials for an iCloud account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppleCredentials {
    pub email: String,
    pub app_password: String,
}

impl fmt::Debug for AppleCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppleCredentials")
            .field("email", &self.email)
            .field("app_password", &"<redacted>")
            .finish()
    }
}

impl AppleCredentials {
    pub fn new(email: impl Into<String>, app_password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            app_password: app_password.into(),
        }
    }
}

/// Credentials of any supported provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialBundle {
    Google(GoogleCredentials),
    Apple(AppleCredentials),
}

impl CredentialBundle {
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Google(_) => ProviderKind::Google,
            Self::Apple(_) => ProviderKind::Apple,
        }
    }

    /// Apple bundles never expire.
    pub fn is_expired(&self, now: DateTime<Utc>, skew: Duration) -> bool {
        match self {
            Self::Google(google) => google.is_expired(now, skew),
            Self::Apple(_) => false,
        }
    }

    pub fn is_invalidated(&self) -> bool {
        match self {
            Self::Google(google) => google.invalidated,
            Self::Apple(_) => false,
        }
    }

    pub fn as_google(&self) -> Option<&GoogleCredentials> {
        match self {
            Self::Google(google) => Some(google),
            Self::Apple(_) => None,
        }
    }

    pub fn as_apple(&self) -> Option<&AppleCredentials> {
        match self {
            Self::Apple(apple) => Some(apple),
            Self::Google(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderErrorCode;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 5, 12, 0, 0).unwrap()
    }

    #[test]
    fn validate_google_record() {
        let record = CalendarAccountRecord::google(
            "acc-1",
            "ada@example.com",
            GoogleCredentials::new("token"),
        );
        let (account, bundle) = record.validate().unwrap();
        assert_eq!(account.kind, ProviderKind::Google);
        assert_eq!(account.email, "ada@example.com");
        assert_eq!(bundle.kind(), ProviderKind::Google);
    }

    #[test]
    fn validate_rejects_unknown_type() {
        let mut record =
            CalendarAccountRecord::apple("acc-2", "x@icloud.com", AppleCredentials::new("x", "y"));
        record.calendar_type = "outlook".into();
        let err = record.validate().unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::UnknownProviderType);
    }

    #[test]
    fn validate_rejects_mismatched_bundle() {
        let mut record = CalendarAccountRecord::google(
            "acc-3",
            "ada@example.com",
            GoogleCredentials::new("token"),
        );
        record.apple_calendar_auth = Some(AppleCredentials::new("a", "b"));
        assert_eq!(
            record.validate().unwrap_err().code(),
            ProviderErrorCode::Configuration
        );

        record.google_calendar_auth = None;
        record.apple_calendar_auth = None;
        assert_eq!(
            record.validate().unwrap_err().code(),
            ProviderErrorCode::Configuration
        );
    }

    #[test]
    fn expiry_honours_skew() {
        let creds = GoogleCredentials::new("t").with_expires_at(now() + Duration::seconds(30));
        assert!(!creds.is_expired(now(), Duration::zero()));
        assert!(creds.is_expired(now(), Duration::seconds(60)));
        assert!(!GoogleCredentials::new("t").is_expired(now(), Duration::seconds(60)));

        let apple = CredentialBundle::Apple(AppleCredentials::new("a", "b"));
        assert!(!apple.is_expired(now(), Duration::days(365)));
    }

    #[test]
    fn refresh_keeps_refresh_token_unless_rotated() {
        let creds = GoogleCredentials::new("old").with_refresh_token("r1");
        let refreshed = creds.refreshed("new", Some(3600), None, now());
        assert_eq!(refreshed.access_token, "new");
        assert_eq!(refreshed.refresh_token.as_deref(), Some("r1"));
        assert_eq!(refreshed.expires_at, Some(now() + Duration::hours(1)));

        let rotated = creds.refreshed("new", None, Some("r2".into()), now());
        assert_eq!(rotated.refresh_token.as_deref(), Some("r2"));
    }

    #[test]
    fn record_wire_shape() {
        let json = r#"{
            "id": "acc-9",
            "email": "grace@icloud.com",
            "calendarType": "apple",
            "appleCalendarAuth": {"email": "grace@icloud.com", "appPassword": "abcd-efgh"}
        }"#;
        let record: CalendarAccountRecord = serde_json::from_str(json).unwrap();
        let (account, bundle) = record.validate().unwrap();
        assert_eq!(account.kind, ProviderKind::Apple);
        assert_eq!(bundle.as_apple().unwrap().app_password, "abcd-efgh");
        assert!(!format!("{:?}", bundle).contains("abcd-efgh"));
    }
}
