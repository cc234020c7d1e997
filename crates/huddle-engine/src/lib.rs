//! Availability aggregation engine.
//!
//! This crate turns poll responses into per-day availability:
//! - Manual slots and per-day intervals entered by the respondent
//! - Busy time read concurrently from every enabled sub-calendar
//! - Working hours and buffer time applied to calendar-derived availability
//! - Partial results when some calendars fail, with diagnostics
//! - Caller-driven cancellation and a per-request concurrency bound
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use huddle_core::{Response, SystemClock, TimeWindow};
//! use huddle_engine::{
//!     AggregateOptions, Aggregator, CancelSource, EngineConfig, ProviderSetup, Respondent,
//! };
//! use huddle_providers::MemoryCredentialStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let setup = ProviderSetup::new(
//!         Arc::new(MemoryCredentialStore::new()),
//!         Arc::new(SystemClock),
//!     );
//!     let aggregator = Aggregator::connect(EngineConfig::default(), setup)?;
//!
//!     let window = TimeWindow::try_new(
//!         "2025-03-03T00:00:00Z".parse()?,
//!         "2025-03-05T00:00:00Z".parse()?,
//!     )?;
//!     let respondent = Respondent::new(Response::new("Ada"));
//!     let cancel = CancelSource::new();
//!
//!     let result = aggregator
//!         .aggregate_availability(&respondent, window, &AggregateOptions::default(), &cancel.signal())
//!         .await?;
//!     println!("{}", serde_json::to_string_pretty(&result)?);
//!     Ok(())
//! }
//! ```

mod aggregator;
mod cancel;
mod config;
mod error;
mod result;

pub use aggregator::{AggregateOptions, Aggregator, ProviderSetup, Respondent};
pub use cancel::{CancelSignal, CancelSource};
pub use config::{ConfigError, EngineConfig};
pub use error::{AggregateError, AggregateResult};
pub use result::{
    AvailabilityResult, BatchResult, CalendarFailure, CalendarRef, DayAvailability, Diagnostic,
    RespondentOutcome,
};
