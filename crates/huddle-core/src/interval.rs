//! Interval algebra over UTC instants.
//!
//! Availability is represented as ordered, non-overlapping lists of
//! [`Interval`]s. The free functions here keep lists in that normal form:
//! [`normalize`] sorts and merges, [`subtract`] removes busy time, [`clip`]
//! restricts to a span.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::time::{TimeError, TimeWindow};

/// A non-empty half-open range `[start, end)` in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "IntervalParts")]
pub struct Interval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

#[derive(Deserialize)]
struct IntervalParts {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TryFrom<IntervalParts> for Interval {
    type Error = TimeError;

    fn try_from(parts: IntervalParts) -> Result<Self, Self::Error> {
        Self::new(parts.start, parts.end)
    }
}

impl Interval {
    /// Creates an interval, rejecting empty or inverted ranges.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, TimeError> {
        if start < end {
            Ok(Self { start, end })
        } else {
            Err(TimeError::InvalidInterval { start, end })
        }
    }

    /// Creates an interval of `length` starting at `start`.
    pub fn from_duration(start: DateTime<Utc>, length: Duration) -> Result<Self, TimeError> {
        Self::new(start, start + length)
    }

    pub(crate) fn from_window(window: &TimeWindow) -> Self {
        Self {
            start: window.start(),
            end: window.end(),
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn duration(&self) -> Duration {
        self.end - self.start
    }

    /// True when the two intervals share at least one instant.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }

    /// Returns the common part of two intervals.
    pub fn intersection(&self, other: &Interval) -> Option<Interval> {
        Interval::new(self.start.max(other.start), self.end.min(other.end)).ok()
    }

    /// Widens the interval by `padding` on both sides.
    pub fn pad(&self, padding: Duration) -> Interval {
        if padding <= Duration::zero() {
            return *self;
        }
        Interval {
            start: self.start - padding,
            end: self.end + padding,
        }
    }
}

/// Sorts intervals and merges any that overlap or touch.
pub fn normalize(intervals: impl IntoIterator<Item = Interval>) -> Vec<Interval> {
    let mut sorted: Vec<Interval> = intervals.into_iter().collect();
    sorted.sort();

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for interval in sorted {
        match merged.last_mut() {
            Some(last) if interval.start <= last.end => {
                last.end = last.end.max(interval.end);
            }
            _ => merged.push(interval),
        }
    }
    merged
}

/// Removes every instant covered by `cut` from `base`.
///
/// Both inputs may be unsorted; the result is normalized.
pub fn subtract(base: &[Interval], cut: &[Interval]) -> Vec<Interval> {
    let base = normalize(base.iter().copied());
    let cut = normalize(cut.iter().copied());

    let mut out = Vec::new();
    for b in base {
        let mut cursor = b.start;
        for c in cut.iter().filter(|c| c.overlaps(&b)) {
            if c.start > cursor {
                out.push(Interval {
                    start: cursor,
                    end: c.start,
                });
            }
            cursor = cursor.max(c.end);
            if cursor >= b.end {
                break;
            }
        }
        if cursor < b.end {
            out.push(Interval {
                start: cursor,
                end: b.end,
            });
        }
    }
    out
}

/// Restricts intervals to `span`, dropping anything outside it.
pub fn clip(intervals: &[Interval], span: &Interval) -> Vec<Interval> {
    normalize(intervals.iter().filter_map(|i| i.intersection(span)))
}

/// Converts slot start instants into intervals of `slot` length.
///
/// Adjacent slots merge into one interval. A non-positive slot length
/// yields nothing.
pub fn from_slots(slots: impl IntoIterator<Item = DateTime<Utc>>, slot: Duration) -> Vec<Interval> {
    normalize(
        slots
            .into_iter()
            .filter_map(|start| Interval::from_duration(start, slot).ok()),
    )
}
