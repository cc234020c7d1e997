//! Poll responses and the options that shape calendar-derived availability.
//!
//! A [`Response`] is what one respondent submitted to a poll. It can carry
//! explicit slot sets, per-day manual intervals, and (when
//! `use_calendar_availability` is set) the sub-calendars to read busy time
//! from. [`Poll`] is the caller-side owner that bounds the time window.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::interval::{self, Interval};
use crate::time::{TimeError, TimeWindow, day_length};

/// One respondent's submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Response {
    /// Display name of the respondent.
    pub name: String,

    /// Contact email, if collected.
    pub email: Option<String>,

    /// Slot starts the respondent marked as available.
    pub availability: BTreeSet<DateTime<Utc>>,

    /// Slot starts the respondent marked as available if needed.
    pub if_needed: BTreeSet<DateTime<Utc>>,

    /// Day start mapped to the intervals the respondent entered by hand.
    pub manual_availability: Option<BTreeMap<DateTime<Utc>, Vec<Interval>>>,

    /// Whether linked calendars should drive availability.
    pub use_calendar_availability: bool,

    /// Account identity (email) mapped to enabled sub-calendar ids.
    pub enabled_calendars: BTreeMap<String, Vec<String>>,

    /// Working hours and buffer settings for calendar-derived availability.
    pub calendar_options: Option<CalendarOptions>,
}

impl Response {
    /// Creates an empty response for `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Builder method to add manual intervals for the day starting at `day`.
    pub fn with_manual_day(mut self, day: DateTime<Utc>, intervals: Vec<Interval>) -> Self {
        self.manual_availability
            .get_or_insert_with(BTreeMap::new)
            .insert(day, intervals);
        self
    }

    /// Builder method to add available slot starts.
    pub fn with_availability(mut self, slots: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        self.availability.extend(slots);
        self
    }

    /// Builder method to add if-needed slot starts.
    pub fn with_if_needed(mut self, slots: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        self.if_needed.extend(slots);
        self
    }

    /// Builder method to enable calendars of one linked identity.
    ///
    /// Also switches the response to calendar availability.
    pub fn with_calendars(
        mut self,
        identity: impl Into<String>,
        calendar_ids: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        self.use_calendar_availability = true;
        self.enabled_calendars.insert(
            identity.into(),
            calendar_ids.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Builder method to set calendar options.
    pub fn with_calendar_options(mut self, options: CalendarOptions) -> Self {
        self.calendar_options = Some(options);
        self
    }

    /// Enabled calendars per identity.
    ///
    /// Empty unless the response uses calendar availability.
    pub fn enabled_calendars(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.enabled_calendars
            .iter()
            .filter(|_| self.use_calendar_availability)
            .map(|(identity, ids)| (identity.as_str(), ids.as_slice()))
    }

    /// Calendar options in effect, defaulted when not calendar-driven.
    pub fn effective_calendar_options(&self) -> CalendarOptions {
        match (&self.calendar_options, self.use_calendar_availability) {
            (Some(options), true) => options.clone(),
            _ => CalendarOptions::default(),
        }
    }

    /// Manually entered intervals for the day starting at `day`, if any.
    pub fn manual_day(&self, day: &DateTime<Utc>) -> Option<&[Interval]> {
        self.manual_availability
            .as_ref()
            .and_then(|days| days.get(day))
            .map(Vec::as_slice)
    }

    /// Explicit available slots as intervals of `slot` length.
    pub fn availability_intervals(&self, slot: Duration) -> Vec<Interval> {
        interval::from_slots(self.availability.iter().copied(), slot)
    }

    /// Explicit if-needed slots as intervals of `slot` length.
    pub fn if_needed_intervals(&self, slot: Duration) -> Vec<Interval> {
        interval::from_slots(self.if_needed.iter().copied(), slot)
    }
}

/// Options applied when deriving availability from calendars.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalendarOptions {
    pub working_hours: WorkingHours,
    pub buffer_time: BufferTime,
}

/// Working-hour bounds, as minute offsets from each day start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkingHours {
    pub enabled: bool,
    pub start_minutes: u32,
    pub end_minutes: u32,
}

impl Default for WorkingHours {
    fn default() -> Self {
        Self {
            enabled: false,
            start_minutes: 9 * 60,
            end_minutes: 17 * 60,
        }
    }
}

impl WorkingHours {
    /// Enabled working hours between two minute offsets.
    pub fn between(start_minutes: u32, end_minutes: u32) -> Self {
        Self {
            enabled: true,
            start_minutes,
            end_minutes,
        }
    }

    /// The parts of `day` that count as working time.
    ///
    /// Disabled hours return the whole day. When `end_minutes` is not after
    /// `start_minutes` the hours wrap past midnight, so the day contributes
    /// its early part up to `end` and its late part from `start`.
    pub fn spans_for(&self, day: &Interval) -> Vec<Interval> {
        if !self.enabled {
            return vec![*day];
        }

        let start = day.start() + Duration::minutes(i64::from(self.start_minutes));
        let end = day.start() + Duration::minutes(i64::from(self.end_minutes));

        let spans = if self.start_minutes < self.end_minutes {
            vec![Interval::new(start, end)]
        } else {
            vec![
                Interval::new(day.start(), end),
                Interval::new(start, day.start() + day_length()),
            ]
        };

        interval::clip(&spans.into_iter().flatten().collect::<Vec<_>>(), day)
    }
}

/// Padding reserved around every busy event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BufferTime {
    pub enabled: bool,
    pub minutes: u32,
}

impl BufferTime {
    pub fn minutes(minutes: u32) -> Self {
        Self {
            enabled: true,
            minutes,
        }
    }

    /// Padding to apply, zero when disabled.
    pub fn padding(&self) -> Duration {
        if self.enabled {
            Duration::minutes(i64::from(self.minutes))
        } else {
            Duration::zero()
        }
    }
}

/// The kind of poll a response belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PollKind {
    /// Specific calendar dates.
    #[serde(rename = "specific_dates")]
    SpecificDates,
    /// Days of the week, anchored to a reference week.
    #[serde(rename = "dow")]
    DayOfWeek,
    /// An availability group that reads members' calendars.
    #[serde(rename = "group")]
    Group,
}

/// The owner of a set of responses; bounds the aggregation window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Poll {
    #[serde(rename = "type")]
    pub kind: PollKind,
    /// Candidate day starts.
    pub dates: Vec<DateTime<Utc>>,
}

impl Poll {
    pub fn new(kind: PollKind, dates: impl IntoIterator<Item = DateTime<Utc>>) -> Self {
        Self {
            kind,
            dates: dates.into_iter().collect(),
        }
    }

    /// Candidate day starts, sorted and deduplicated.
    pub fn day_starts(&self) -> Vec<DateTime<Utc>> {
        let set: BTreeSet<_> = self.dates.iter().copied().collect();
        set.into_iter().collect()
    }

    /// The window from the first candidate day to the end of the last one.
    pub fn window(&self) -> Result<TimeWindow, TimeError> {
        let days = self.day_starts();
        match (days.first(), days.last()) {
            (Some(first), Some(last)) => TimeWindow::try_new(*first, *last + day_length()),
            _ => Err(TimeError::EmptyPoll),
        }
    }
}
