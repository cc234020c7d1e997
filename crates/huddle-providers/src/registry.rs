//! Maps linked accounts to concrete provider adapters.

use std::fmt;
use std::sync::Arc;

use huddle_core::ProviderKind;
use tracing::debug;

use crate::account::{CalendarAccount, CalendarAccountRecord, CredentialBundle};
use crate::error::{ProviderError, ProviderResult};
use crate::http::{HttpClient, RetryPolicy};
use crate::provider::CalendarProvider;
use crate::refresher::CredentialRefresher;

#[cfg(feature = "apple")]
use crate::apple::{AppleConfig, AppleProvider};
#[cfg(feature = "google")]
use crate::google::{GoogleConfig, GoogleProvider};

/// Resolves an account record to a provider bound to that account.
pub trait ProviderResolver: Send + Sync {
    /// # Errors
    ///
    /// `UnknownProviderType` when the account's type has no adapter.
    fn resolve(&self, record: &CalendarAccountRecord) -> ProviderResult<Arc<dyn CalendarProvider>>;
}

/// The production [`ProviderResolver`], holding per-provider configuration.
///
/// A kind without registered configuration resolves to
/// `UnknownProviderType`, exactly like an unknown type string.
pub struct ProviderRegistry {
    http: Arc<dyn HttpClient>,
    refresher: Arc<CredentialRefresher>,
    policy: RetryPolicy,
    #[cfg(feature = "google")]
    google: Option<GoogleConfig>,
    #[cfg(feature = "apple")]
    apple: Option<AppleConfig>,
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("kinds", &self.registered_kinds())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl ProviderRegistry {
    pub fn new(http: Arc<dyn HttpClient>, refresher: Arc<CredentialRefresher>) -> Self {
        Self {
            http,
            refresher,
            policy: RetryPolicy::default(),
            #[cfg(feature = "google")]
            google: None,
            #[cfg(feature = "apple")]
            apple: None,
        }
    }

    /// Registers the Google adapter.
    #[cfg(feature = "google")]
    pub fn with_google(mut self, config: GoogleConfig) -> Self {
        self.google = Some(config);
        self
    }

    /// Registers the Apple adapter.
    #[cfg(feature = "apple")]
    pub fn with_apple(mut self, config: AppleConfig) -> Self {
        self.apple = Some(config);
        self
    }

    /// Sets the retry policy handed to every adapter.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Kinds that currently resolve to an adapter.
    pub fn registered_kinds(&self) -> Vec<ProviderKind> {
        let mut kinds = Vec::new();
        #[cfg(feature = "google")]
        kinds.extend(self.google.as_ref().map(|_| ProviderKind::Google));
        #[cfg(feature = "apple")]
        kinds.extend(self.apple.as_ref().map(|_| ProviderKind::Apple));
        kinds
    }

    fn build(
        &self,
        account: CalendarAccount,
        bundle: CredentialBundle,
    ) -> ProviderResult<Arc<dyn CalendarProvider>> {
        let kind = account.kind;
        match kind {
            #[cfg(feature = "google")]
            ProviderKind::Google => {
                if let Some(config) = &self.google {
                    return Ok(Arc::new(GoogleProvider::new(
                        account,
                        bundle,
                        config.clone(),
                        Arc::clone(&self.http),
                        Arc::clone(&self.refresher),
                        self.policy,
                    )));
                }
            }
            #[cfg(feature = "apple")]
            ProviderKind::Apple => {
                if let Some(config) = &self.apple {
                    return Ok(Arc::new(AppleProvider::new(
                        account,
                        bundle,
                        config.clone(),
                        Arc::clone(&self.http),
                        Arc::clone(&self.refresher),
                        self.policy,
                    )));
                }
            }
            #[allow(unreachable_patterns)]
            _ => {}
        }

        let _ = bundle;
        Err(ProviderError::unknown_provider_type(kind).with_provider(account.id))
    }
}

impl ProviderResolver for ProviderRegistry {
    fn resolve(&self, record: &CalendarAccountRecord) -> ProviderResult<Arc<dyn CalendarProvider>> {
        let (account, bundle) = record.validate()?;
        debug!(account = %account.id, kind = %account.kind, "resolving provider");
        self.build(account, bundle)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use huddle_core::FixedClock;

    use super::*;
    use crate::account::{AppleCredentials, GoogleCredentials};
    use crate::credentials::MemoryCredentialStore;
    use crate::error::ProviderErrorCode;
    use crate::http::fake::FakeHttp;

    fn refresher() -> Arc<CredentialRefresher> {
        Arc::new(CredentialRefresher::new(
            Arc::new(MemoryCredentialStore::new()),
            Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())),
        ))
    }

    fn registry() -> ProviderRegistry {
        ProviderRegistry::new(Arc::new(FakeHttp::scripted([])), refresher())
    }

    #[cfg(all(feature = "google", feature = "apple"))]
    fn full_registry() -> ProviderRegistry {
        use crate::google::OAuthCredentials;
        registry()
            .with_google(GoogleConfig::new(OAuthCredentials::new("id", "secret")))
            .with_apple(AppleConfig::icloud().unwrap())
    }

    #[cfg(all(feature = "google", feature = "apple"))]
    #[test]
    fn resolves_each_registered_kind() {
        let registry = full_registry();

        let google = registry
            .resolve(&CalendarAccountRecord::google(
                "g-1",
                "ada@example.com",
                GoogleCredentials::new("token"),
            ))
            .unwrap();
        assert_eq!(google.kind(), ProviderKind::Google);
        assert_eq!(google.account_id(), "g-1");

        let apple = registry
            .resolve(&CalendarAccountRecord::apple(
                "a-1",
                "ada@icloud.com",
                AppleCredentials::new("ada@icloud.com", "pw"),
            ))
            .unwrap();
        assert_eq!(apple.kind(), ProviderKind::Apple);
        assert_eq!(registry.registered_kinds().len(), 2);
    }

    #[test]
    fn unknown_type_string_is_rejected() {
        let mut record = CalendarAccountRecord::google("x-1", "ada@example.com", GoogleCredentials::new("t"));
        record.calendar_type = "outlook".into();

        let err = registry().resolve(&record).err().unwrap();
        assert_eq!(err.code(), ProviderErrorCode::UnknownProviderType);
        assert!(err.message().contains("outlook"));
    }

    #[test]
    fn unregistered_kind_is_unknown() {
        let record = CalendarAccountRecord::apple(
            "a-1",
            "ada@icloud.com",
            AppleCredentials::new("ada@icloud.com", "pw"),
        );
        let err = registry().resolve(&record).err().unwrap();
        assert_eq!(err.code(), ProviderErrorCode::UnknownProviderType);
        assert!(registry().registered_kinds().is_empty());
    }
}
