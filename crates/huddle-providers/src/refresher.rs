//! Keeps access credentials usable across provider calls.
//!
//! Before every provider call an adapter asks the [`CredentialRefresher`]
//! for a usable bundle. Expired OAuth tokens are refreshed at most once per
//! account at a time: callers queue on a per-account lock and re-read the
//! store once they hold it, so anyone who waited sees the refreshed token
//! (or the invalidation) without issuing a second refresh.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex as StdMutex};

use chrono::Duration;
use huddle_core::Clock;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::account::{CalendarAccount, CredentialBundle, GoogleCredentials};
use crate::credentials::CredentialStore;
use crate::error::{ProviderError, ProviderResult};
use crate::provider::BoxFuture;

/// The result of a successful token refresh.
#[derive(Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    /// Lifetime of the new token in seconds, if reported.
    pub expires_in: Option<i64>,
    /// A rotated refresh token, if the endpoint issued one.
    pub refresh_token: Option<String>,
}

impl fmt::Debug for RefreshedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefreshedToken")
            .field("expires_in", &self.expires_in)
            .field("rotated", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

/// Exchanges a refresh token for a new access token.
pub trait TokenEndpoint: Send + Sync + fmt::Debug {
    fn refresh<'a>(&'a self, refresh_token: &'a str) -> BoxFuture<'a, ProviderResult<RefreshedToken>>;
}

enum Freshness {
    Usable,
    Expired,
    Invalidated,
}

/// Ensures each provider call carries a non-expired credential.
pub struct CredentialRefresher {
    store: Arc<dyn CredentialStore>,
    endpoint: Option<Arc<dyn TokenEndpoint>>,
    clock: Arc<dyn Clock>,
    skew: Duration,
    guards: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl fmt::Debug for CredentialRefresher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialRefresher")
            .field("store", &self.store)
            .field("endpoint", &self.endpoint)
            .field("skew", &self.skew)
            .finish_non_exhaustive()
    }
}

impl CredentialRefresher {
    /// Default clock-skew margin.
    pub const DEFAULT_SKEW_SECS: i64 = 60;

    pub fn new(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            endpoint: None,
            clock,
            skew: Duration::seconds(Self::DEFAULT_SKEW_SECS),
            guards: StdMutex::new(HashMap::new()),
        }
    }

    /// Builder method to set the OAuth token endpoint.
    pub fn with_token_endpoint(mut self, endpoint: Arc<dyn TokenEndpoint>) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Builder method to set the clock-skew margin.
    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = skew;
        self
    }

    /// Returns a bundle that is usable right now.
    ///
    /// `snapshot` is the bundle embedded in the account record; it is used
    /// only while the store has nothing newer for this account.
    ///
    /// # Errors
    ///
    /// `AuthExpired` if the bundle is invalidated or the refresh fails,
    /// `Configuration` if it expired and no token endpoint is set. Store
    /// failures surface as `CredentialStore`.
    pub async fn fresh_credential(
        &self,
        account: &CalendarAccount,
        snapshot: &CredentialBundle,
    ) -> ProviderResult<CredentialBundle> {
        let current = self.current(account, snapshot).await?;
        match self.freshness(&current) {
            Freshness::Usable => return Ok(current),
            Freshness::Invalidated => return Err(invalidated(account)),
            Freshness::Expired => {}
        }

        let guard = self.guard(&account.id);
        let _held = guard.lock().await;

        // Another caller may have refreshed or invalidated while we waited.
        let current = self.current(account, snapshot).await?;
        match self.freshness(&current) {
            Freshness::Usable => {
                debug!(account = %account.id, "credential refreshed by another caller");
                Ok(current)
            }
            Freshness::Invalidated => Err(invalidated(account)),
            Freshness::Expired => self.refresh(account, current).await,
        }
    }

    async fn current(
        &self,
        account: &CalendarAccount,
        snapshot: &CredentialBundle,
    ) -> ProviderResult<CredentialBundle> {
        let stored = self.store.get_credential(&account.id).await?;
        Ok(stored.unwrap_or_else(|| snapshot.clone()))
    }

    fn freshness(&self, bundle: &CredentialBundle) -> Freshness {
        if bundle.is_invalidated() {
            Freshness::Invalidated
        } else if bundle.is_expired(self.clock.now(), self.skew) {
            Freshness::Expired
        } else {
            Freshness::Usable
        }
    }

    fn guard(&self, account_id: &str) -> Arc<Mutex<()>> {
        let mut guards = self.guards.lock().unwrap_or_else(|e| e.into_inner());
        guards
            .entry(account_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn refresh(
        &self,
        account: &CalendarAccount,
        bundle: CredentialBundle,
    ) -> ProviderResult<CredentialBundle> {
        let google = match bundle {
            CredentialBundle::Google(google) => google,
            // Only OAuth bundles carry an expiry.
            other => return Ok(other),
        };

        // A missing endpoint is a setup error; the stored credential stays intact.
        let Some(endpoint) = &self.endpoint else {
            warn!(account = %account.id, "token expired but no token endpoint is configured");
            return Err(ProviderError::configuration("no token endpoint configured")
                .with_provider(account.kind.as_str()));
        };

        let outcome = match google.refresh_token.as_deref() {
            Some(refresh_token) => endpoint.refresh(refresh_token).await,
            None => Err(ProviderError::auth_expired("no refresh token stored")),
        };

        match outcome {
            Ok(token) => {
                let refreshed = CredentialBundle::Google(google.refreshed(
                    token.access_token,
                    token.expires_in,
                    token.refresh_token,
                    self.clock.now(),
                ));
                self.store
                    .update_credential(&account.id, refreshed.clone())
                    .await?;
                info!(account = %account.id, "refreshed access token");
                Ok(refreshed)
            }
            Err(e) => {
                warn!(account = %account.id, error = %e, "token refresh failed, invalidating credential");
                let invalidated_bundle = CredentialBundle::Google(GoogleCredentials {
                    invalidated: true,
                    ..google
                });
                if let Err(store_err) = self
                    .store
                    .update_credential(&account.id, invalidated_bundle)
                    .await
                {
                    warn!(account = %account.id, error = %store_err, "failed to persist invalidation");
                }
                Err(ProviderError::auth_expired(format!(
                    "refresh failed for account {}",
                    account.id
                ))
                .with_provider(account.kind.as_str())
                .with_source(e))
            }
        }
    }
}

fn invalidated(account: &CalendarAccount) -> ProviderError {
    ProviderError::auth_expired(format!(
        "credential for account {} is invalidated",
        account.id
    ))
    .with_provider(account.kind.as_str())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::{DateTime, TimeZone, Utc};
    use huddle_core::{FixedClock, ProviderKind};

    use super::*;
    use crate::account::AppleCredentials;
    use crate::credentials::MemoryCredentialStore;
    use crate::error::ProviderErrorCode;

    #[derive(Debug)]
    struct CountingEndpoint {
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingEndpoint {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                fail,
            })
        }
    }

    impl TokenEndpoint for CountingEndpoint {
        fn refresh<'a>(
            &'a self,
            _refresh_token: &'a str,
        ) -> BoxFuture<'a, ProviderResult<RefreshedToken>> {
            Box::pin(async move {
                let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
                // Give concurrent callers a chance to pile up on the lock.
                tokio::task::yield_now().await;
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                if self.fail {
                    Err(ProviderError::unavailable("invalid_grant"))
                } else {
                    Ok(RefreshedToken {
                        access_token: format!("access-{n}"),
                        expires_in: Some(3600),
                        refresh_token: None,
                    })
                }
            })
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 5, 12, 0, 0).unwrap()
    }

    fn account() -> CalendarAccount {
        CalendarAccount {
            id: "acc-1".into(),
            email: "ada@example.com".into(),
            kind: ProviderKind::Google,
        }
    }

    fn expired() -> CredentialBundle {
        CredentialBundle::Google(
            GoogleCredentials::new("stale")
                .with_refresh_token("refresh")
                .with_expires_at(now() - Duration::minutes(5)),
        )
    }

    fn refresher(
        store: Arc<MemoryCredentialStore>,
        endpoint: Arc<CountingEndpoint>,
    ) -> CredentialRefresher {
        CredentialRefresher::new(store, Arc::new(FixedClock::new(now())))
            .with_token_endpoint(endpoint)
    }

    #[tokio::test]
    async fn usable_credential_is_returned_untouched() {
        let store = Arc::new(MemoryCredentialStore::new());
        let endpoint = CountingEndpoint::new(false);
        let fresh = CredentialBundle::Google(
            GoogleCredentials::new("ok").with_expires_at(now() + Duration::hours(1)),
        );
        let got = refresher(store, endpoint.clone())
            .fresh_credential(&account(), &fresh)
            .await
            .unwrap();
        assert_eq!(got, fresh);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn token_inside_skew_is_refreshed() {
        let store = Arc::new(MemoryCredentialStore::new());
        let endpoint = CountingEndpoint::new(false);
        let nearly = CredentialBundle::Google(
            GoogleCredentials::new("nearly")
                .with_refresh_token("refresh")
                .with_expires_at(now() + Duration::seconds(30)),
        );
        let got = refresher(store.clone(), endpoint.clone())
            .fresh_credential(&account(), &nearly)
            .await
            .unwrap();
        assert_eq!(got.as_google().unwrap().access_token, "access-1");
        assert_eq!(store.get_credential("acc-1").await.unwrap(), Some(got));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_callers_share_one_refresh() {
        let store = Arc::new(MemoryCredentialStore::new());
        let endpoint = CountingEndpoint::new(false);
        let refresher = Arc::new(refresher(store.clone(), endpoint.clone()));

        let calls = (0..8).map(|_| {
            let refresher = refresher.clone();
            tokio::spawn(async move { refresher.fresh_credential(&account(), &expired()).await })
        });
        let results = futures_util::future::join_all(calls).await;

        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
        for result in results {
            let bundle = result.unwrap().unwrap();
            assert_eq!(bundle.as_google().unwrap().access_token, "access-1");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failed_refresh_invalidates_for_everyone() {
        let store = Arc::new(MemoryCredentialStore::new());
        let endpoint = CountingEndpoint::new(true);
        let refresher = Arc::new(refresher(store.clone(), endpoint.clone()));

        let calls = (0..6).map(|_| {
            let refresher = refresher.clone();
            tokio::spawn(async move { refresher.fresh_credential(&account(), &expired()).await })
        });
        let results = futures_util::future::join_all(calls).await;

        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap().unwrap_err().code(), ProviderErrorCode::AuthExpired);
        }
        let stored = store.get_credential("acc-1").await.unwrap().unwrap();
        assert!(stored.is_invalidated());

        // No retry loop on later calls either.
        let err = refresher
            .fresh_credential(&account(), &expired())
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthExpired);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn missing_refresh_token_is_auth_expired() {
        let store = Arc::new(MemoryCredentialStore::new());
        let endpoint = CountingEndpoint::new(false);
        let bundle = CredentialBundle::Google(
            GoogleCredentials::new("stale").with_expires_at(now() - Duration::minutes(1)),
        );
        let err = refresher(store, endpoint.clone())
            .fresh_credential(&account(), &bundle)
            .await
            .unwrap_err();
        assert_eq!(err.code(), ProviderErrorCode::AuthExpired);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn missing_endpoint_keeps_stored_credential() {
        let store = Arc::new(MemoryCredentialStore::new());
        store.update_credential("acc-1", expired()).await.unwrap();
        let refresher = CredentialRefresher::new(store.clone(), Arc::new(FixedClock::new(now())));

        let err = refresher
            .fresh_credential(&account(), &expired())
            .await
            .unwrap_err();

        assert_eq!(err.code(), ProviderErrorCode::Configuration);
        let stored = store.get_credential("acc-1").await.unwrap().unwrap();
        assert!(!stored.is_invalidated());
        assert_eq!(stored, expired());
    }

    #[tokio::test]
    async fn apple_bundles_never_refresh() {
        let store = Arc::new(MemoryCredentialStore::new());
        let endpoint = CountingEndpoint::new(false);
        let apple = CredentialBundle::Apple(AppleCredentials::new("x@icloud.com", "pw"));
        let account = CalendarAccount {
            kind: ProviderKind::Apple,
            ..account()
        };
        let got = refresher(store, endpoint.clone())
            .fresh_credential(&account, &apple)
            .await
            .unwrap();
        assert_eq!(got, apple);
        assert_eq!(endpoint.calls.load(Ordering::SeqCst), 0);
    }
}
