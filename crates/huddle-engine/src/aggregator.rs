//! Availability aggregation across manual entries and linked calendars.
//!
//! For each respondent the aggregator reads every enabled sub-calendar
//! concurrently, unions the busy time, and subtracts it from each day's span
//! (or working hours). Hand-entered availability forms the primary tier for
//! days the respondent edited; if-needed slots form a second tier that never
//! overlaps the first.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use huddle_core::interval::{self, Interval};
use huddle_core::time::day_length;
use huddle_core::{CalendarOptions, Clock, Poll, Response, SubCalendar, TimeWindow};
use huddle_providers::apple::AppleConfig;
use huddle_providers::google::{GoogleConfig, GoogleTokenEndpoint};
use huddle_providers::{
    CalendarAccountRecord, CalendarProvider, CredentialRefresher, CredentialStore, EventListing,
    HttpClient, ProviderError, ProviderRegistry, ProviderResolver, ProviderResult, ReqwestClient,
    RetryPolicy,
};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::config::EngineConfig;
use crate::error::{AggregateError, AggregateResult};
use crate::result::{
    AvailabilityResult, BatchResult, CalendarFailure, CalendarRef, DayAvailability, Diagnostic,
    RespondentOutcome,
};

/// A poll response together with the calendar accounts it may reference.
#[derive(Debug, Clone, Default)]
pub struct Respondent {
    pub response: Response,
    pub accounts: Vec<CalendarAccountRecord>,
}

impl Respondent {
    pub fn new(response: Response) -> Self {
        Self {
            response,
            accounts: Vec::new(),
        }
    }

    /// Builder method to link a calendar account.
    pub fn with_account(mut self, record: CalendarAccountRecord) -> Self {
        self.accounts.push(record);
        self
    }

    /// Finds the account an `enabledCalendars` identity refers to, by email
    /// (case-insensitive) or account id.
    pub fn account_for(&self, identity: &str) -> Option<&CalendarAccountRecord> {
        self.accounts
            .iter()
            .find(|record| record.email.eq_ignore_ascii_case(identity) || record.id == identity)
    }

    pub fn name(&self) -> &str {
        &self.response.name
    }
}

/// Per-request options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateOptions {
    /// Explicit day starts. Empty partitions the window into 24h days.
    pub day_starts: Vec<DateTime<Utc>>,
}

impl AggregateOptions {
    /// Builder method to set explicit day starts.
    pub fn with_day_starts(mut self, days: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        self.day_starts = days.into_iter().collect();
        self
    }

    /// Options using the poll's dates as day starts.
    pub fn for_poll(poll: &Poll) -> Self {
        Self::default().with_day_starts(poll.day_starts())
    }
}

/// Everything needed to build the production provider stack.
pub struct ProviderSetup {
    pub store: Arc<dyn CredentialStore>,
    pub clock: Arc<dyn Clock>,
    pub google: Option<GoogleConfig>,
    pub apple: Option<AppleConfig>,
    pub user_agent: String,
}

impl ProviderSetup {
    pub fn new(store: Arc<dyn CredentialStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            google: None,
            apple: None,
            user_agent: format!("huddle/{}", env!("CARGO_PKG_VERSION")),
        }
    }

    /// Builder method to enable Google accounts.
    pub fn with_google(mut self, config: GoogleConfig) -> Self {
        self.google = Some(config);
        self
    }

    /// Builder method to enable Apple accounts.
    pub fn with_apple(mut self, config: AppleConfig) -> Self {
        self.apple = Some(config);
        self
    }
}

/// A day to report: its nominal 24h extent and the part inside the window.
struct DaySpan {
    start: DateTime<Utc>,
    full: Interval,
    clipped: Interval,
}

/// Busy time gathered from every enabled sub-calendar of one respondent.
#[derive(Default)]
struct BusyTime {
    busy: Vec<Interval>,
    degraded: BTreeSet<CalendarRef>,
    diagnostics: Vec<Diagnostic>,
}

/// The availability aggregation engine.
pub struct Aggregator {
    resolver: Arc<dyn ProviderResolver>,
    config: EngineConfig,
}

impl std::fmt::Debug for Aggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Aggregator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Aggregator {
    /// Creates an aggregator over any resolver.
    ///
    /// # Errors
    ///
    /// `Configuration` if `config` does not validate.
    pub fn new(resolver: Arc<dyn ProviderResolver>, config: EngineConfig) -> AggregateResult<Self> {
        config.validate()?;
        Ok(Self { resolver, config })
    }

    /// Builds the production stack: reqwest transport with the configured
    /// timeout, the credential refresher, and the provider registry.
    pub fn connect(config: EngineConfig, setup: ProviderSetup) -> AggregateResult<Self> {
        config.validate()?;
        let policy = RetryPolicy {
            retry_transient: config.retry_transient,
        };

        let http: Arc<dyn HttpClient> = Arc::new(
            ReqwestClient::new(config.request_timeout(), &setup.user_agent)
                .map_err(|e| AggregateError::Configuration(e.to_string()))?,
        );

        let mut refresher =
            CredentialRefresher::new(setup.store, setup.clock).with_skew(config.refresh_skew());
        if let Some(google) = &setup.google {
            let endpoint = GoogleTokenEndpoint::new(google, http.clone()).with_retry_policy(policy);
            refresher = refresher.with_token_endpoint(Arc::new(endpoint));
        }

        let mut registry =
            ProviderRegistry::new(http, Arc::new(refresher)).with_retry_policy(policy);
        if let Some(google) = setup.google {
            registry = registry.with_google(google);
        }
        if let Some(apple) = setup.apple {
            registry = registry.with_apple(apple);
        }

        info!(kinds = ?registry.registered_kinds(), "provider registry ready");
        Self::new(Arc::new(registry), config)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Aggregates one respondent's availability over `window`.
    ///
    /// # Errors
    ///
    /// - `AuthExpired` or `UnknownProviderType` for a linked account
    /// - `ProviderUnavailable` when every enabled sub-calendar failed
    /// - `InvalidRequest` for day starts outside the window or an enabled
    ///   identity without a linked account
    /// - `Cancelled` when `cancel` fires first
    pub async fn aggregate_availability(
        &self,
        respondent: &Respondent,
        window: TimeWindow,
        options: &AggregateOptions,
        cancel: &CancelSignal,
    ) -> AggregateResult<AvailabilityResult> {
        let limiter = self.limiter();
        race(cancel, self.aggregate_one(respondent, &window, options, &limiter)).await
    }

    /// Aggregates many respondents concurrently.
    ///
    /// Each outcome is independent; the batch itself only fails when
    /// cancelled.
    pub async fn aggregate_batch(
        &self,
        respondents: &[Respondent],
        window: TimeWindow,
        options: &AggregateOptions,
        cancel: &CancelSignal,
    ) -> AggregateResult<BatchResult> {
        let limiter = self.limiter();
        let work = async {
            let results = join_all(
                respondents
                    .iter()
                    .map(|respondent| self.aggregate_one(respondent, &window, options, &limiter)),
            )
            .await;

            let outcomes: Vec<_> = respondents
                .iter()
                .zip(results)
                .map(|(respondent, result)| RespondentOutcome {
                    respondent: respondent.name().to_string(),
                    result,
                })
                .collect();
            Ok::<_, AggregateError>(BatchResult { outcomes })
        };

        let batch = race(cancel, work).await?;
        info!(
            respondents = respondents.len(),
            failed = batch.failed().count(),
            "aggregated batch"
        );
        Ok(batch)
    }

    /// Lists the sub-calendars of a linked account.
    pub async fn list_sub_calendars(
        &self,
        account: &CalendarAccountRecord,
        cancel: &CancelSignal,
    ) -> AggregateResult<BTreeMap<String, SubCalendar>> {
        let provider = self.resolve(account)?;
        let work = async {
            provider
                .list_calendars()
                .await
                .map_err(|e| account_error(account, &e))
        };
        race(cancel, work).await
    }

    /// Lists the events of one sub-calendar of a linked account.
    pub async fn calendar_events(
        &self,
        account: &CalendarAccountRecord,
        calendar_id: &str,
        window: TimeWindow,
        cancel: &CancelSignal,
    ) -> AggregateResult<EventListing> {
        let provider = self.resolve(account)?;
        let work = async {
            provider
                .list_events(calendar_id, window)
                .await
                .map_err(|e| account_error(account, &e))
        };
        race(cancel, work).await
    }

    fn limiter(&self) -> Semaphore {
        Semaphore::new(self.config.max_concurrency)
    }

    fn resolve(&self, account: &CalendarAccountRecord) -> AggregateResult<Arc<dyn CalendarProvider>> {
        self.resolver
            .resolve(account)
            .map_err(|e| account_error(account, &e))
    }

    async fn aggregate_one(
        &self,
        respondent: &Respondent,
        window: &TimeWindow,
        options: &AggregateOptions,
        limiter: &Semaphore,
    ) -> AggregateResult<AvailabilityResult> {
        let response = &respondent.response;
        let days = day_spans(window, options)?;
        let slot = self.config.slot_length();
        let slots = response.availability_intervals(slot);
        let backup = response.if_needed_intervals(slot);

        let calendar = if response.use_calendar_availability {
            Some(self.collect_busy(respondent, window, limiter).await?)
        } else {
            None
        };
        let calendar_options = response.effective_calendar_options();

        let mut result = AvailabilityResult {
            respondent: respondent.name().to_string(),
            days: BTreeMap::new(),
            partial: false,
            degraded_calendars: BTreeSet::new(),
            diagnostics: Vec::new(),
        };

        for day in &days {
            let manual_entries = response.manual_day(&day.start);
            let day_slots = interval::clip(&slots, &day.clipped);
            let edited = manual_entries.is_some() || !day_slots.is_empty();

            let available = match &calendar {
                Some(busy) if !(edited && self.config.manual_overrides_calendar) => {
                    free_time(day, &calendar_options, &busy.busy)
                }
                _ => {
                    let manual = manual_entries.unwrap_or_default();
                    interval::clip(&[manual, day_slots.as_slice()].concat(), &day.clipped)
                }
            };
            let if_needed = interval::subtract(&interval::clip(&backup, &day.clipped), &available);

            result
                .days
                .insert(day.start, DayAvailability { available, if_needed });
        }

        if let Some(busy) = calendar {
            result.partial = !busy.degraded.is_empty();
            result.degraded_calendars = busy.degraded;
            result.diagnostics = busy.diagnostics;
        }

        info!(
            respondent = %result.respondent,
            days = result.days.len(),
            partial = result.partial,
            "aggregated availability"
        );
        Ok(result)
    }

    async fn collect_busy(
        &self,
        respondent: &Respondent,
        window: &TimeWindow,
        limiter: &Semaphore,
    ) -> AggregateResult<BusyTime> {
        let padding = respondent.response.effective_calendar_options().buffer_time.padding();

        let mut fetches = Vec::new();
        for (identity, calendar_ids) in respondent.response.enabled_calendars() {
            let record = respondent.account_for(identity).ok_or_else(|| {
                AggregateError::InvalidRequest(format!(
                    "{} enabled calendars of {} but has no such linked account",
                    respondent.name(),
                    identity
                ))
            })?;
            let provider = self.resolve(record)?;

            for calendar_id in calendar_ids {
                let provider = Arc::clone(&provider);
                let calendar = CalendarRef::new(&record.id, calendar_id);
                fetches.push(async move {
                    let outcome = fetch_events(provider.as_ref(), calendar_id, *window, limiter).await;
                    (record, calendar, outcome)
                });
            }
        }

        let total = fetches.len();
        let outcomes = join_all(fetches).await;

        let mut collected = BusyTime::default();
        let mut failures = Vec::new();
        for (record, calendar, outcome) in outcomes {
            match outcome {
                Ok(listing) => {
                    debug!(
                        account = %calendar.account,
                        calendar = %calendar.calendar,
                        count = listing.events.len(),
                        "calendar read"
                    );
                    collected
                        .busy
                        .extend(listing.events.iter().map(|e| e.as_interval().pad(padding)));
                    if !listing.malformed.is_empty() {
                        warn!(
                            account = %calendar.account,
                            calendar = %calendar.calendar,
                            malformed = listing.malformed.len(),
                            "calendar has undecodable events"
                        );
                        collected.diagnostics.extend(
                            listing
                                .malformed
                                .iter()
                                .map(|item| Diagnostic::malformed_item(&calendar, item)),
                        );
                        collected.degraded.insert(calendar);
                    }
                }
                Err(e) if e.code().is_calendar_scoped() => {
                    warn!(
                        account = %calendar.account,
                        calendar = %calendar.calendar,
                        error = %e,
                        "calendar degraded"
                    );
                    let failure = CalendarFailure::new(&calendar.account, &calendar.calendar, &e);
                    collected.diagnostics.push(failure.clone().into());
                    collected.degraded.insert(calendar);
                    failures.push(failure);
                }
                Err(e) => return Err(account_error(record, &e)),
            }
        }

        if total > 0 && failures.len() == total {
            return Err(AggregateError::ProviderUnavailable {
                respondent: respondent.name().to_string(),
                failures,
            });
        }

        collected.busy = interval::normalize(std::mem::take(&mut collected.busy));
        Ok(collected)
    }
}

async fn fetch_events(
    provider: &dyn CalendarProvider,
    calendar_id: &str,
    window: TimeWindow,
    limiter: &Semaphore,
) -> ProviderResult<EventListing> {
    let _permit = limiter
        .acquire()
        .await
        .map_err(|_| ProviderError::cancelled())?;
    provider.list_events(calendar_id, window).await
}

/// Free time of one day: its span, or working hours, minus busy time.
fn free_time(day: &DaySpan, options: &CalendarOptions, busy: &[Interval]) -> Vec<Interval> {
    let spans = interval::clip(&options.working_hours.spans_for(&day.full), &day.clipped);
    interval::subtract(&spans, busy)
}

fn day_spans(window: &TimeWindow, options: &AggregateOptions) -> AggregateResult<Vec<DaySpan>> {
    let starts: BTreeSet<DateTime<Utc>> = if options.day_starts.is_empty() {
        window.days().iter().map(Interval::start).collect()
    } else {
        options.day_starts.iter().copied().collect()
    };

    starts
        .into_iter()
        .map(|start| -> AggregateResult<DaySpan> {
            let clipped = window.day_span(start).ok_or_else(|| {
                AggregateError::InvalidRequest(format!("day {} lies outside {}", start, window))
            })?;
            Ok(DaySpan {
                start,
                full: Interval::from_duration(start, day_length())?,
                clipped,
            })
        })
        .collect()
}

fn account_error(account: &CalendarAccountRecord, error: &ProviderError) -> AggregateError {
    AggregateError::from_provider(&account.id, &account.calendar_type, error)
}

async fn race<T>(
    cancel: &CancelSignal,
    work: impl Future<Output = AggregateResult<T>>,
) -> AggregateResult<T> {
    if cancel.is_cancelled() {
        return Err(AggregateError::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            info!("aggregation cancelled, dropping in-flight calls");
            Err(AggregateError::Cancelled)
        }
        result = work => result,
    }
}
