//! Engine configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// Timeouts below this are accepted but logged.
const MIN_RECOMMENDED_TIMEOUT_SECS: u64 = 5;

/// Largest accepted refresh skew: one day.
const MAX_REFRESH_SKEW_SECS: u64 = 24 * 60 * 60;

/// Errors loading or validating an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Tunables of the availability engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Per-request network timeout in seconds.
    pub request_timeout_secs: u64,

    /// Maximum provider calls in flight for one request.
    pub max_concurrency: usize,

    /// Tokens expiring within this many seconds are refreshed first.
    pub refresh_skew_secs: u64,

    /// Length of one availability slot in minutes.
    pub slot_minutes: u32,

    /// Days with manual entries keep them over calendar-derived availability.
    pub manual_overrides_calendar: bool,

    /// Retry once on transient transport errors.
    pub retry_transient: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            max_concurrency: 8,
            refresh_skew_secs: 60,
            slot_minutes: 15,
            manual_overrides_calendar: true,
            retry_transient: true,
        }
    }
}

impl EngineConfig {
    /// Parses a TOML document and validates it.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads a TOML file and validates it.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Rejects values the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.request_timeout_secs == 0 {
            return Err(ConfigError::Invalid("request_timeout_secs must be > 0".into()));
        }
        if self.max_concurrency == 0 {
            return Err(ConfigError::Invalid("max_concurrency must be > 0".into()));
        }
        if self.refresh_skew_secs > MAX_REFRESH_SKEW_SECS {
            return Err(ConfigError::Invalid(format!(
                "refresh_skew_secs must be at most {MAX_REFRESH_SKEW_SECS}"
            )));
        }
        if self.slot_minutes == 0 {
            return Err(ConfigError::Invalid("slot_minutes must be > 0".into()));
        }
        if self.request_timeout_secs < MIN_RECOMMENDED_TIMEOUT_SECS {
            warn!(
                request_timeout_secs = self.request_timeout_secs,
                "request timeout below {}s, slow providers may be reported unavailable",
                MIN_RECOMMENDED_TIMEOUT_SECS
            );
        }
        Ok(())
    }

    /// Builder: set the request timeout in seconds.
    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Builder: set max concurrency.
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    /// Builder: set the refresh skew in seconds.
    pub fn with_refresh_skew_secs(mut self, secs: u64) -> Self {
        self.refresh_skew_secs = secs;
        self
    }

    /// Builder: set the slot length in minutes.
    pub fn with_slot_minutes(mut self, minutes: u32) -> Self {
        self.slot_minutes = minutes;
        self
    }

    /// Builder: set manual-over-calendar authority.
    pub fn with_manual_overrides_calendar(mut self, enabled: bool) -> Self {
        self.manual_overrides_calendar = enabled;
        self
    }

    /// Builder: set transient retry.
    pub fn with_retry_transient(mut self, enabled: bool) -> Self {
        self.retry_transient = enabled;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Refresh skew, capped at one day for unvalidated configs.
    pub fn refresh_skew(&self) -> chrono::Duration {
        let secs = self.refresh_skew_secs.min(MAX_REFRESH_SKEW_SECS);
        i64::try_from(secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(|| chrono::Duration::days(1))
    }

    pub fn slot_length(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.slot_minutes))
    }
}
