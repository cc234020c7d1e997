//! Core types: time windows, interval algebra, canonical events, poll responses

pub mod event;
pub mod interval;
pub mod response;
pub mod time;
pub mod tracing;

pub use event::{CanonicalEvent, ProviderKind, SubCalendar, UnknownProviderKind};
pub use interval::Interval;
pub use response::{BufferTime, CalendarOptions, Poll, PollKind, Response, WorkingHours};
pub use time::{Clock, FixedClock, SystemClock, TimeError, TimeWindow};
pub use tracing::{init_tracing, TracingConfig, TracingError, TracingOutputFormat};
