//! Error types for calendar provider operations.
//!
//! Every adapter call, credential refresh and store access reports failures
//! as a [`ProviderError`]. The [`ProviderErrorCode`] decides how the
//! aggregation layer treats it: per-calendar degradation, per-respondent
//! failure, or aborting the whole request.

use std::fmt;
use thiserror::Error;

/// The category of a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderErrorCode {
    /// Credentials are expired and could not be refreshed, or were rejected.
    AuthExpired,
    /// Network failure, timeout, or non-auth error status from the provider.
    ProviderUnavailable,
    /// The provider answered with a body that could not be decoded.
    MalformedResponse,
    /// The account's provider type is not supported or not enabled.
    UnknownProviderType,
    /// The caller cancelled the operation.
    Cancelled,
    /// The request itself was invalid (bad window, unknown calendar id).
    InvalidRequest,
    /// Missing or inconsistent configuration.
    Configuration,
    /// The credential store failed to read or persist.
    CredentialStore,
}

impl ProviderErrorCode {
    /// Returns a stable machine-readable name for this error code.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthExpired => "auth_expired",
            Self::ProviderUnavailable => "provider_unavailable",
            Self::MalformedResponse => "malformed_response",
            Self::UnknownProviderType => "unknown_provider_type",
            Self::Cancelled => "cancelled",
            Self::InvalidRequest => "invalid_request",
            Self::Configuration => "configuration",
            Self::CredentialStore => "credential_store",
        }
    }

    /// Returns true if a failure with this code only affects one calendar.
    pub fn is_calendar_scoped(&self) -> bool {
        matches!(self, Self::ProviderUnavailable | Self::MalformedResponse)
    }
}

impl fmt::Display for ProviderErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An error that occurred while interacting with a calendar provider.
#[derive(Debug, Error)]
pub struct ProviderError {
    /// The error code categorizing this error.
    code: ProviderErrorCode,
    /// A human-readable message describing the error.
    message: String,
    /// The provider that generated this error (e.g., "google", "apple").
    provider: Option<String>,
    /// Whether the transport may succeed on a second attempt.
    transient: bool,
    /// The underlying cause of this error, if any.
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl ProviderError {
    /// Creates a new provider error with the given code and message.
    pub fn new(code: ProviderErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            provider: None,
            transient: false,
            source: None,
        }
    }

    /// Creates an expired-credentials error.
    pub fn auth_expired(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::AuthExpired, message)
    }

    /// Creates a provider-unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::ProviderUnavailable, message)
    }

    /// Creates a provider-unavailable error for a connect, reset or timeout
    /// failure. Only these are retried.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            transient: true,
            ..Self::unavailable(message)
        }
    }

    /// Creates a malformed-response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::MalformedResponse, message)
    }

    /// Creates an unknown-provider-type error.
    pub fn unknown_provider_type(provider_type: impl fmt::Display) -> Self {
        Self::new(
            ProviderErrorCode::UnknownProviderType,
            format!("unknown provider type `{provider_type}`"),
        )
    }

    /// Creates a cancellation error.
    pub fn cancelled() -> Self {
        Self::new(ProviderErrorCode::Cancelled, "operation cancelled")
    }

    /// Creates an invalid-request error.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::InvalidRequest, message)
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::Configuration, message)
    }

    /// Creates a credential store error.
    pub fn credential_store(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorCode::CredentialStore, message)
    }

    /// Sets the provider name for this error.
    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the source error for this error.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.source = Some(Box::new(source));
        self
    }

    /// Returns the error code.
    pub fn code(&self) -> ProviderErrorCode {
        self.code
    }

    /// Returns the error message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the provider name, if set.
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Returns true if a single retry is allowed.
    pub fn is_transient(&self) -> bool {
        self.transient
    }

    /// Copies code, message and provider without the source chain.
    pub fn duplicate(&self) -> Self {
        Self {
            code: self.code,
            message: self.message.clone(),
            provider: self.provider.clone(),
            transient: self.transient,
            source: None,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref provider) = self.provider {
            write!(f, "[{}] ", provider)?;
        }
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A specialized Result type for provider operations.
pub type ProviderResult<T> = Result<T, ProviderError>;
