//! Aggregation output types.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use huddle_core::Interval;
use huddle_providers::{MalformedItem, ProviderError};
use serde::{Deserialize, Serialize};

use crate::error::{AggregateError, AggregateResult};

/// One sub-calendar of one linked account.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CalendarRef {
    pub account: String,
    pub calendar: String,
}

impl CalendarRef {
    pub fn new(account: impl Into<String>, calendar: impl Into<String>) -> Self {
        Self {
            account: account.into(),
            calendar: calendar.into(),
        }
    }
}

/// Why a sub-calendar contributed nothing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarFailure {
    pub account: String,
    pub calendar: String,
    pub code: String,
    pub message: String,
}

impl CalendarFailure {
    pub fn new(account: &str, calendar: &str, error: &ProviderError) -> Self {
        Self {
            account: account.to_string(),
            calendar: calendar.to_string(),
            code: error.code().as_str().to_string(),
            message: error.message().to_string(),
        }
    }
}

/// A recoverable problem attached to a result.
///
/// `index` is set for a single undecodable item and absent when the whole
/// calendar failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub account: String,
    pub calendar: String,
    pub code: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    pub(crate) fn malformed_item(calendar: &CalendarRef, item: &MalformedItem) -> Self {
        Self {
            account: calendar.account.clone(),
            calendar: calendar.calendar.clone(),
            code: "malformed_item".to_string(),
            index: Some(item.index),
            message: item.reason.clone(),
        }
    }
}

impl From<CalendarFailure> for Diagnostic {
    fn from(failure: CalendarFailure) -> Self {
        Self {
            account: failure.account,
            calendar: failure.calendar,
            code: failure.code,
            index: None,
            message: failure.message,
        }
    }
}

/// Availability of one day, in two exclusive tiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayAvailability {
    pub available: Vec<Interval>,
    pub if_needed: Vec<Interval>,
}

impl DayAvailability {
    pub fn is_empty(&self) -> bool {
        self.available.is_empty() && self.if_needed.is_empty()
    }
}

/// Availability of one respondent over a window.
///
/// Every day of the window has an entry, possibly empty. `partial` is set
/// whenever `degraded_calendars` is not empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityResult {
    pub respondent: String,
    pub days: BTreeMap<DateTime<Utc>, DayAvailability>,
    pub partial: bool,
    pub degraded_calendars: BTreeSet<CalendarRef>,
    pub diagnostics: Vec<Diagnostic>,
}

impl AvailabilityResult {
    /// Returns the availability of the day starting at `day`.
    pub fn day(&self, day: &DateTime<Utc>) -> Option<&DayAvailability> {
        self.days.get(day)
    }

    /// True when no day has any availability.
    pub fn is_empty(&self) -> bool {
        self.days.values().all(DayAvailability::is_empty)
    }
}

/// The outcome for one respondent of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RespondentOutcome {
    pub respondent: String,
    pub result: AggregateResult<AvailabilityResult>,
}

/// Independent outcomes of a batch, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub outcomes: Vec<RespondentOutcome>,
}

impl BatchResult {
    /// Results of respondents that aggregated successfully.
    pub fn succeeded(&self) -> impl Iterator<Item = &AvailabilityResult> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }

    /// Respondents whose aggregation failed, with the reason.
    pub fn failed(&self) -> impl Iterator<Item = (&str, &AggregateError)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().err().map(|e| (o.respondent.as_str(), e)))
    }
}
