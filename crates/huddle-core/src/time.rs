//! Time types for availability queries.
//!
//! This module provides [`TimeWindow`], the validated `[time_min, time_max)`
//! range every provider call and aggregation runs over, and the [`Clock`]
//! seam used wherever "now" matters (token expiry).

use std::fmt;
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::interval::Interval;

/// Errors raised when constructing time ranges.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeError {
    /// The window start does not strictly precede its end.
    #[error("time window start {start} must precede end {end}")]
    InvalidWindow {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// The interval start does not strictly precede its end.
    #[error("interval start {start} must precede end {end}")]
    InvalidInterval {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },

    /// A poll without candidate dates has no window.
    #[error("poll has no candidate dates")]
    EmptyPoll,
}

/// A time window for querying calendar events.
///
/// `start < end` always holds. Aggregation treats the window as the
/// half-open range `[start, end)`; provider event filtering is stricter and
/// uses [`TimeWindow::strictly_contains`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "WindowParts")]
pub struct TimeWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct WindowParts {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<WindowParts> for TimeWindow {
    type Error = TimeError;

    fn try_from(parts: WindowParts) -> Result<Self, Self::Error> {
        Self::try_new(parts.start, parts.end)
    }
}

impl TimeWindow {
    /// Creates a new time window.
    ///
    /// # Errors
    ///
    /// Returns [`TimeError::InvalidWindow`] unless `start < end`.
    pub fn try_new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TimeError> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(TimeError::InvalidWindow { start, end })
        }
    }

    /// Lower bound (`timeMin`).
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Upper bound (`timeMax`).
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Checks whether an event lies strictly inside the window.
    ///
    /// Both bounds are exclusive: an event that starts exactly at `start` or
    /// ends exactly at `end` is rejected, as is anything crossing an edge.
    /// Nothing is clipped.
    pub fn strictly_contains(&self, event_start: DateTime<Utc>, event_end: DateTime<Utc>) -> bool {
        self.start < event_start && event_end < self.end
    }

    /// Returns the window as an [`Interval`].
    pub fn as_interval(&self) -> Interval {
        Interval::from_window(self)
    }

    /// Partitions the window into consecutive 24 hour spans starting at
    /// `start`. The last span is clipped to `end`.
    pub fn days(&self) -> Vec<Interval> {
        let mut days = Vec::new();
        let mut cursor = self.start;
        while cursor < self.end {
            let next = (cursor + day_length()).min(self.end);
            if let Ok(day) = Interval::new(cursor, next) {
                days.push(day);
            }
            cursor = next;
        }
        days
    }

    /// Returns the span of the day starting at `day_start`, clipped to this
    /// window. `None` if the day does not overlap the window.
    pub fn day_span(&self, day_start: DateTime<Utc>) -> Option<Interval> {
        let start = day_start.max(self.start);
        let end = (day_start + day_length()).min(self.end);
        Interval::new(start, end).ok()
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", self.start.to_rfc3339(), self.end.to_rfc3339())
    }
}

/// Length of one aggregation day.
pub fn day_length() -> Duration {
    Duration::hours(24)
}

/// Source of the current time.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Returns the current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// The wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A manually driven clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    now: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    /// Creates a clock frozen at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(now),
        }
    }

    /// Moves the clock to `now`.
    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut guard) = self.now.write() {
            *guard = now;
        }
    }

    /// Advances the clock by `by`.
    pub fn advance(&self, by: Duration) {
        if let Ok(mut guard) = self.now.write() {
            *guard += by;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.read().map(|guard| *guard).unwrap_or_else(|e| *e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
    }

    #[test]
    fn creation() {
        let window = TimeWindow::try_new(utc(2025, 2, 5, 9, 0), utc(2025, 2, 5, 17, 0)).unwrap();
        assert_eq!(window.start(), utc(2025, 2, 5, 9, 0));
        assert_eq!(window.end(), utc(2025, 2, 5, 17, 0));
    }

    #[test]
    fn rejects_empty_and_inverted_windows() {
        let t = utc(2025, 2, 5, 9, 0);
        assert!(matches!(
            TimeWindow::try_new(t, t),
            Err(TimeError::InvalidWindow { .. })
        ));
        assert!(TimeWindow::try_new(t, t - Duration::minutes(1)).is_err());
    }

    #[test]
    fn strict_containment_excludes_boundaries() {
        let window = TimeWindow::try_new(utc(2024, 1, 1, 0, 0), utc(2024, 1, 2, 0, 0)).unwrap();

        // Crosses the lower bound.
        assert!(!window.strictly_contains(utc(2023, 12, 31, 23, 0), utc(2024, 1, 1, 1, 0)));
        // Touches the lower bound.
        assert!(!window.strictly_contains(utc(2024, 1, 1, 0, 0), utc(2024, 1, 1, 1, 0)));
        // Touches the upper bound.
        assert!(!window.strictly_contains(utc(2024, 1, 1, 23, 0), utc(2024, 1, 2, 0, 0)));
        // Strictly inside.
        assert!(window.strictly_contains(utc(2024, 1, 1, 9, 0), utc(2024, 1, 1, 10, 0)));
    }

    #[test]
    fn days_partition_and_clip() {
        let window = TimeWindow::try_new(utc(2025, 2, 5, 0, 0), utc(2025, 2, 7, 12, 0)).unwrap();
        let days = window.days();
        assert_eq!(days.len(), 3);
        assert_eq!(days[0].start(), utc(2025, 2, 5, 0, 0));
        assert_eq!(days[1].start(), utc(2025, 2, 6, 0, 0));
        assert_eq!(days[2].end(), utc(2025, 2, 7, 12, 0));
    }

    #[test]
    fn day_span_outside_window() {
        let window = TimeWindow::try_new(utc(2025, 2, 5, 0, 0), utc(2025, 2, 6, 0, 0)).unwrap();
        assert!(window.day_span(utc(2025, 2, 6, 0, 0)).is_none());
        let span = window.day_span(utc(2025, 2, 4, 12, 0)).unwrap();
        assert_eq!(span.start(), utc(2025, 2, 5, 0, 0));
        assert_eq!(span.end(), utc(2025, 2, 5, 12, 0));
    }

    #[test]
    fn deserialize_validates() {
        let ok: TimeWindow = serde_json::from_str(
            r#"{"start":"2025-02-05T09:00:00Z","end":"2025-02-05T17:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(ok.end() - ok.start(), Duration::hours(8));

        let bad = serde_json::from_str::<TimeWindow>(
            r#"{"start":"2025-02-05T17:00:00Z","end":"2025-02-05T09:00:00Z"}"#,
        );
        assert!(bad.is_err());
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(utc(2025, 2, 5, 9, 0));
        clock.advance(Duration::minutes(30));
        assert_eq!(clock.now(), utc(2025, 2, 5, 9, 30));
        clock.set(utc(2025, 1, 1, 0, 0));
        assert_eq!(clock.now(), utc(2025, 1, 1, 0, 0));
    }
}
