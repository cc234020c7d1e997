//! Google Calendar provider implementation.
//!
//! This module provides a [`GoogleProvider`] that reads calendars and
//! events through the Google Calendar API v3.
//!
//! # Features
//!
//! - Calendar list and event list pagination
//! - Server-side expansion of recurring events
//! - All-day events mapped to UTC midnight boundaries
//! - Cancelled and free (transparent) events skipped
//! - Access token refresh through [`GoogleTokenEndpoint`]
//!
//! # Example
//!
//! ```ignore
//! use huddle_providers::google::{GoogleConfig, GoogleTokenEndpoint, OAuthCredentials};
//!
//! let config = GoogleConfig::new(OAuthCredentials::new(client_id, client_secret));
//! let endpoint = GoogleTokenEndpoint::new(&config, http.clone());
//! let refresher = CredentialRefresher::new(store, clock).with_token_endpoint(Arc::new(endpoint));
//! let registry = ProviderRegistry::new(http, Arc::new(refresher)).with_google(config);
//! ```

mod client;
mod config;
mod oauth;
mod provider;

pub use client::{ApiEvent, ApiEventTime, CalendarListEntry};
pub use config::{GoogleConfig, OAuthCredentials};
pub use oauth::GoogleTokenEndpoint;
pub use provider::GoogleProvider;
