//! Google Calendar provider implementation.
//!
//! This module implements the [`CalendarProvider`] trait for Google Calendar.

use std::collections::BTreeMap;
use std::sync::Arc;

use huddle_core::{ProviderKind, SubCalendar, TimeWindow};
use tracing::debug;

use crate::account::{CalendarAccount, CredentialBundle};
use crate::error::{ProviderError, ProviderResult};
use crate::http::{HttpClient, RetryPolicy};
use crate::provider::{BoxFuture, CalendarProvider, EventListing};
use crate::refresher::CredentialRefresher;

use super::client::GoogleCalendarClient;
use super::config::GoogleConfig;

/// Google Calendar provider bound to one linked account.
///
/// Every call first obtains a usable access token from the shared
/// [`CredentialRefresher`], then talks to the Calendar API v3.
pub struct GoogleProvider {
    account: CalendarAccount,
    snapshot: CredentialBundle,
    client: GoogleCalendarClient,
    refresher: Arc<CredentialRefresher>,
}

impl GoogleProvider {
    /// Creates a provider for `account`.
    ///
    /// `snapshot` is the credential embedded in the account record.
    pub fn new(
        account: CalendarAccount,
        snapshot: CredentialBundle,
        config: GoogleConfig,
        http: Arc<dyn HttpClient>,
        refresher: Arc<CredentialRefresher>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            account,
            snapshot,
            client: GoogleCalendarClient::new(http, config, policy),
            refresher,
        }
    }

    async fn access_token(&self) -> ProviderResult<String> {
        let bundle = self
            .refresher
            .fresh_credential(&self.account, &self.snapshot)
            .await?;
        bundle
            .as_google()
            .map(|google| google.access_token.clone())
            .ok_or_else(|| {
                ProviderError::configuration(format!(
                    "account {} holds a non-Google credential",
                    self.account.id
                ))
            })
    }

    async fn list_calendars_impl(&self) -> ProviderResult<BTreeMap<String, SubCalendar>> {
        let token = self.access_token().await?;
        let entries = self.client.list_calendars(&token).await?;

        let calendars: BTreeMap<_, _> = entries
            .into_iter()
            .map(|entry| {
                let name = entry.summary_override.unwrap_or(entry.summary);
                let calendar = SubCalendar::new(&entry.id, name, ProviderKind::Google)
                    .with_primary(entry.primary);
                (entry.id, calendar)
            })
            .collect();

        debug!(account = %self.account.id, count = calendars.len(), "listed google calendars");
        Ok(calendars)
    }

    async fn list_events_impl(
        &self,
        calendar_id: &str,
        window: TimeWindow,
    ) -> ProviderResult<EventListing> {
        let token = self.access_token().await?;
        self.client.list_events(&token, calendar_id, &window).await
    }
}

impl CalendarProvider for GoogleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn account_id(&self) -> &str {
        &self.account.id
    }

    fn list_calendars(&self) -> BoxFuture<'_, ProviderResult<BTreeMap<String, SubCalendar>>> {
        Box::pin(async move {
            self.list_calendars_impl()
                .await
                .map_err(|e| e.with_provider("google"))
        })
    }

    fn list_events<'a>(
        &'a self,
        calendar_id: &'a str,
        window: TimeWindow,
    ) -> BoxFuture<'a, ProviderResult<EventListing>> {
        Box::pin(async move {
            self.list_events_impl(calendar_id, window)
                .await
                .map_err(|e| e.with_provider("google"))
        })
    }
}
