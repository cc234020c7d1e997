//! iCloud CalDAV provider implementation.

use std::collections::BTreeMap;
use std::sync::Arc;

use huddle_core::{ProviderKind, SubCalendar, TimeWindow};
use tracing::{debug, info};
use url::Url;

use crate::account::{CalendarAccount, CredentialBundle};
use crate::error::{ProviderError, ProviderResult};
use crate::http::{HttpClient, RetryPolicy};
use crate::normalize::normalize_items;
use crate::provider::{BoxFuture, CalendarProvider, EventListing};
use crate::refresher::CredentialRefresher;

use super::client::{Authorization, CalDavClient};
use super::config::AppleConfig;
use super::ics::parse_calendar_data;

/// Apple Calendar provider bound to one linked iCloud account.
///
/// Calendars are discovered from the account principal on every listing;
/// the calendar id is the absolute URL of the calendar collection.
pub struct AppleProvider {
    account: CalendarAccount,
    snapshot: CredentialBundle,
    client: CalDavClient,
    refresher: Arc<CredentialRefresher>,
}

impl AppleProvider {
    pub fn new(
        account: CalendarAccount,
        snapshot: CredentialBundle,
        config: AppleConfig,
        http: Arc<dyn HttpClient>,
        refresher: Arc<CredentialRefresher>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            account,
            snapshot,
            client: CalDavClient::new(http, config, policy),
            refresher,
        }
    }

    async fn authorization(&self) -> ProviderResult<Authorization> {
        let bundle = self
            .refresher
            .fresh_credential(&self.account, &self.snapshot)
            .await?;
        bundle
            .as_apple()
            .map(|apple| Authorization::basic(&apple.email, &apple.app_password))
            .ok_or_else(|| {
                ProviderError::configuration(format!(
                    "account {} holds a non-Apple credential",
                    self.account.id
                ))
            })
    }

    /// Walks principal, then calendar home, from the configured entry point.
    async fn calendar_home(&self, auth: &Authorization) -> ProviderResult<Url> {
        let config = self.client.config();

        let root = self
            .client
            .propfind(auth, &config.caldav_base, 0, &["d:current-user-principal"])
            .await?;
        let principal = root
            .iter()
            .find_map(|r| r.principal_href.as_deref())
            .ok_or_else(|| ProviderError::malformed("no current-user-principal in response"))?;
        let principal = config.resolve(principal)?;

        let home = self
            .client
            .propfind(auth, &principal, 0, &["c:calendar-home-set"])
            .await?;
        let home = home
            .iter()
            .find_map(|r| r.home_set_href.as_deref())
            .ok_or_else(|| ProviderError::malformed("no calendar-home-set in response"))?;

        // The home set can live on a partition host, so resolve against the principal.
        principal.join(home).map_err(|e| {
            ProviderError::malformed(format!("invalid calendar-home-set `{}`: {}", home, e))
        })
    }

    async fn list_calendars_impl(&self) -> ProviderResult<BTreeMap<String, SubCalendar>> {
        let auth = self.authorization().await?;
        let home = self.calendar_home(&auth).await?;

        let responses = self
            .client
            .propfind(
                &auth,
                &home,
                1,
                &[
                    "d:displayname",
                    "d:resourcetype",
                    "c:supported-calendar-component-set",
                ],
            )
            .await?;

        let mut calendars = BTreeMap::new();
        for response in responses.into_iter().filter(|r| r.is_event_calendar()) {
            let url = home.join(&response.href).map_err(|e| {
                ProviderError::malformed(format!("invalid calendar href `{}`: {}", response.href, e))
            })?;
            let id = url.to_string();
            let name = response
                .display_name
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| fallback_name(&url));
            calendars.insert(id.clone(), SubCalendar::new(&id, name, ProviderKind::Apple));
        }

        info!(account = %self.account.id, count = calendars.len(), "discovered apple calendars");
        Ok(calendars)
    }

    async fn list_events_impl(
        &self,
        calendar_id: &str,
        window: TimeWindow,
    ) -> ProviderResult<EventListing> {
        let url = self.client.config().resolve(calendar_id)?;
        let auth = self.authorization().await?;
        let responses = self.client.report(&auth, &url, &window).await?;

        // One failed resource becomes one malformed item; the others still count.
        let mut items = Vec::new();
        for response in responses {
            let Some(data) = response.calendar_data else {
                continue;
            };
            match parse_calendar_data(&data) {
                Ok(events) => items.extend(events.into_iter().map(Ok)),
                Err(reason) => items.push(Err(format!("{}: {}", response.href, reason))),
            }
        }

        let listing = normalize_items(items, &window);
        debug!(calendar = %calendar_id, kept = listing.events.len(), "fetched apple events");
        Ok(listing)
    }
}

fn fallback_name(url: &Url) -> String {
    url.path_segments()
        .and_then(|mut segments| segments.rfind(|s| !s.is_empty()))
        .unwrap_or("Calendar")
        .to_string()
}

impl CalendarProvider for AppleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Apple
    }

    fn account_id(&self) -> &str {
        &self.account.id
    }

    fn list_calendars(&self) -> BoxFuture<'_, ProviderResult<BTreeMap<String, SubCalendar>>> {
        Box::pin(async move {
            self.list_calendars_impl()
                .await
                .map_err(|e| e.with_provider("apple"))
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
                .map_err(|e| e.with_provider("apple"))
        })
    }
}
