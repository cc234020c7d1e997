//! Canonical calendar types shared by every provider.
//!
//! - [`ProviderKind`]: the closed set of supported calendar backends
//! - [`SubCalendar`]: one calendar inside a linked account
//! - [`CanonicalEvent`]: the provider-agnostic `{summary, start, end}` event

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::interval::Interval;
use crate::time::TimeError;

/// The calendar backends an account can be linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Google Calendar API v3.
    Google,
    /// iCloud calendars over CalDAV.
    Apple,
}

impl ProviderKind {
    /// Every supported kind.
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Google, ProviderKind::Apple];

    /// Returns the stored type string for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google",
            Self::Apple => "apple",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A provider type string outside the supported set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown provider type `{0}`")]
pub struct UnknownProviderKind(pub String);

impl FromStr for ProviderKind {
    type Err = UnknownProviderKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "google" => Ok(Self::Google),
            "apple" => Ok(Self::Apple),
            _ => Err(UnknownProviderKind(s.to_string())),
        }
    }
}

/// A calendar within a linked account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubCalendar {
    /// Provider-native identifier.
    pub id: String,
    /// Human-readable name.
    pub display_name: String,
    /// Backend the calendar lives in.
    pub provider_type: ProviderKind,
    /// Whether this is the account's primary calendar.
    #[serde(default)]
    pub primary: bool,
}

impl SubCalendar {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, kind: ProviderKind) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            provider_type: kind,
            primary: false,
        }
    }

    /// Builder method to mark as primary.
    pub fn with_primary(mut self, primary: bool) -> Self {
        self.primary = primary;
        self
    }
}

/// A provider-agnostic calendar event.
///
/// Instants are UTC and `start < end` is guaranteed by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "EventParts", into = "EventParts")]
pub struct CanonicalEvent {
    summary: String,
    span: Interval,
}

#[derive(Clone, Serialize, Deserialize)]
struct EventParts {
    #[serde(default)]
    summary: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<EventParts> for CanonicalEvent {
    type Error = TimeError;

    fn try_from(parts: EventParts) -> Result<Self, Self::Error> {
        Self::try_new(parts.summary, parts.start, parts.end)
    }
}

impl From<CanonicalEvent> for EventParts {
    fn from(event: CanonicalEvent) -> Self {
        Self {
            summary: event.summary,
            start: event.span.start(),
            end: event.span.end(),
        }
    }
}

impl CanonicalEvent {
    /// Creates an event.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::InvalidInterval`] unless `start < end`.
    pub fn try_new(
        summary: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self, TimeError> {
        Ok(Self {
            summary: summary.into(),
            span: Interval::new(start, end)?,
        })
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.span.start()
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.span.end()
    }

    /// The time this event occupies.
    pub fn as_interval(&self) -> Interval {
        self.span
    }
}
