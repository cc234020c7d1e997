//! CalendarProvider trait definition.
//!
//! This module defines the [`CalendarProvider`] trait, the contract every
//! calendar backend adapter fulfils. A provider instance is bound to one
//! linked account; the registry builds it from the account record.
//!
//! Providers are responsible for:
//! - Listing the sub-calendars of the account
//! - Fetching events of one sub-calendar over a time window
//! - Handling pagination and credential refresh internally

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;

use huddle_core::{CanonicalEvent, ProviderKind, SubCalendar, TimeWindow};
use serde::Serialize;

use crate::error::ProviderResult;

/// A boxed future for async trait methods.
///
/// Using boxed futures keeps the traits object-safe so providers, stores and
/// transports can be swapped behind `Arc<dyn ...>`.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// One item in a provider response that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MalformedItem {
    /// Position of the item in the provider response.
    pub index: usize,
    /// Why decoding failed.
    pub reason: String,
}

/// Events of one sub-calendar, plus diagnostics for items that failed to decode.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventListing {
    /// Decoded events that passed the window filter.
    pub events: Vec<CanonicalEvent>,
    /// Items that could not be decoded.
    pub malformed: Vec<MalformedItem>,
}

impl EventListing {
    /// Creates a listing with only events.
    pub fn with_events(events: Vec<CanonicalEvent>) -> Self {
        Self {
            events,
            malformed: Vec::new(),
        }
    }

    /// Returns true if every item decoded.
    pub fn is_clean(&self) -> bool {
        self.malformed.is_empty()
    }

    /// Appends another page, renumbering its malformed items after ours.
    pub fn extend(&mut self, other: EventListing, index_offset: usize) {
        self.events.extend(other.events);
        self.malformed
            .extend(other.malformed.into_iter().map(|item| MalformedItem {
                index: item.index + index_offset,
                reason: item.reason,
            }));
    }
}

/// The core abstraction for calendar providers.
///
/// # Implementation Notes
///
/// - Both operations are idempotent reads.
/// - Implementations ask the credential refresher for a usable credential
///   before every call, so callers never deal with expiry.
/// - Pagination is handled inside the provider.
///
/// # Errors
///
/// - `AuthExpired` when the credential is invalid and cannot be refreshed
/// - `ProviderUnavailable` on network failure, timeout, or a non-auth error status
/// - `MalformedResponse` when the response body cannot be decoded at all
pub trait CalendarProvider: Send + Sync {
    /// The backend this provider talks to.
    fn kind(&self) -> ProviderKind;

    /// The linked account this provider is bound to.
    fn account_id(&self) -> &str;

    /// Lists the account's sub-calendars, keyed by provider-native id.
    fn list_calendars(&self) -> BoxFuture<'_, ProviderResult<BTreeMap<String, SubCalendar>>>;

    /// Lists events of one sub-calendar that lie strictly inside `window`.
    fn list_events<'a>(
        &'a self,
        calendar_id: &'a str,
        window: TimeWindow,
    ) -> BoxFuture<'a, ProviderResult<EventListing>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn event(h: u32) -> CanonicalEvent {
        let start = Utc.with_ymd_and_hms(2025, 2, 5, h, 0, 0).unwrap();
        CanonicalEvent::try_new("e", start, start + chrono::Duration::hours(1)).unwrap()
    }

    #[test]
    fn listing_extend_renumbers_malformed() {
        let mut first = EventListing {
            events: vec![event(9)],
            malformed: vec![MalformedItem {
                index: 1,
                reason: "bad".into(),
            }],
        };
        let second = EventListing {
            events: vec![event(11)],
            malformed: vec![MalformedItem {
                index: 0,
                reason: "worse".into(),
            }],
        };

        first.extend(second, 2);
        assert_eq!(first.events.len(), 2);
        assert_eq!(first.malformed[1].index, 2);
        assert!(!first.is_clean());
        assert!(EventListing::with_events(vec![event(9)]).is_clean());
    }
}
