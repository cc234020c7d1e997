//! Calendar provider contract, credentials and adapters.
//!
//! This crate provides the layer between the availability engine and the
//! calendar backends:
//!
//! - [`CalendarProvider`] - The contract every calendar backend implements
//! - [`ProviderRegistry`] - Builds an adapter from a linked account record
//! - [`CredentialRefresher`] - Keeps OAuth tokens usable, one refresh per account at a time
//! - [`normalize_items`] - Decodes provider items and applies the window filter
//! - [`ProviderError`] - Error types for provider operations
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐    ┌─────────────────┐
//! │  Google API v3  │    │  iCloud CalDAV  │
//! └────────┬────────┘    └────────┬────────┘
//!          │       HttpClient     │
//!          ▼                      ▼
//! ┌─────────────────┐    ┌─────────────────┐
//! │ GoogleProvider  │    │  AppleProvider  │◄── CredentialRefresher
//! └────────┬────────┘    └────────┬────────┘
//!          │   CalendarProvider   │
//!          └──────────┬───────────┘
//!                     ▼ normalize_items()
//!              ┌──────────────┐
//!              │ EventListing │
//!              └──────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use huddle_providers::{ProviderRegistry, ProviderResolver};
//!
//! let registry = ProviderRegistry::new(http, refresher).with_google(google_config);
//! let provider = registry.resolve(&record)?;
//! let listing = provider.list_events("primary", window).await?;
//! ```

pub mod account;
#[cfg(feature = "apple")]
pub mod apple;
pub mod credentials;
pub mod error;
#[cfg(feature = "google")]
pub mod google;
pub mod http;
pub mod normalize;
pub mod provider;
pub mod refresher;
pub mod registry;

// Re-export main types at crate root
pub use account::{
    AppleCredentials, CalendarAccount, CalendarAccountRecord, CredentialBundle, GoogleCredentials,
};
pub use credentials::{CredentialStore, FileCredentialStore, MemoryCredentialStore};
pub use error::{ProviderError, ProviderErrorCode, ProviderResult};
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse, ReqwestClient, RetryPolicy};
pub use normalize::{DecodeEvent, normalize_items, within_window};
pub use provider::{BoxFuture, CalendarProvider, EventListing, MalformedItem};
pub use refresher::{CredentialRefresher, RefreshedToken, TokenEndpoint};
pub use registry::{ProviderRegistry, ProviderResolver};
