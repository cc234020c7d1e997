//! Apple Calendar (iCloud CalDAV) provider implementation.
//!
//! This module provides an [`AppleProvider`] that reads iCloud calendars
//! over CalDAV with an app-specific password.
//!
//! # Features
//!
//! - HTTP Basic authentication
//! - Principal and calendar-home-set discovery via PROPFIND
//! - REPORT calendar-query with server-side recurrence expansion
//! - ICS/iCalendar parsing with IANA time zone resolution
//!
//! # Example
//!
//! ```ignore
//! use huddle_providers::apple::AppleConfig;
//!
//! let registry = ProviderRegistry::new(http, refresher).with_apple(AppleConfig::icloud()?);
//! let provider = registry.resolve(&record)?;
//! let calendars = provider.list_calendars().await?;
//! ```

mod auth;
mod client;
mod config;
mod ics;
mod provider;
mod xml;

pub use auth::basic_auth;
pub use config::AppleConfig;
pub use provider::AppleProvider;
pub use xml::format_icalendar_datetime;
