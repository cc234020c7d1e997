//! Logging setup shared by the provider adapters and the aggregation engine.
//!
//! The host process calls [`init_tracing`] once. Library code only emits
//! `tracing` events with structured fields (`account`, `calendar`, `count`).
//!
//! ```ignore
//! use huddle_core::tracing::{init_tracing, TracingConfig};
//!
//! init_tracing(TracingConfig::service()).expect("failed to initialize tracing");
//! ```
//!
//! For local debugging:
//! ```ignore
//! init_tracing(TracingConfig::cli_debug()).expect("failed to initialize tracing");
//! ```

use thiserror::Error;
use tracing::Level;
use tracing_subscriber::fmt::{self, format::FmtSpan};
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer, Registry, prelude::*};

/// Crate targets covered by the default filter.
const TARGETS: [&str; 3] = ["huddle_core", "huddle_providers", "huddle_engine"];

#[derive(Debug, Error)]
pub enum TracingError {
    #[error("tracing already initialized: {0}")]
    AlreadyInitialized(#[from] TryInitError),

    #[error("invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TracingOutputFormat {
    /// Multi-line, human-readable.
    #[default]
    Pretty,
    Compact,
    /// JSON lines for log collectors.
    Json,
}

/// Logging options.
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Level for the huddle crates when no filter is given.
    pub level: Level,
    pub format: TracingOutputFormat,
    /// Emit file and line of each event.
    pub location: bool,
    pub timestamps: bool,
    /// Log span open/close, which gives per-call timings.
    pub span_timings: bool,
    /// Explicit filter directive. Takes precedence over `RUST_LOG`.
    pub filter: Option<String>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingOutputFormat::Pretty,
            location: false,
            timestamps: true,
            span_timings: false,
            filter: None,
        }
    }
}

impl TracingConfig {
    /// Verbose single-line output without timestamps.
    #[must_use]
    pub fn cli_debug() -> Self {
        Self {
            level: Level::DEBUG,
            format: TracingOutputFormat::Compact,
            location: true,
            timestamps: false,
            ..Self::default()
        }
    }

    /// JSON output with span timings, for a long-running host service.
    #[must_use]
    pub fn service() -> Self {
        Self {
            format: TracingOutputFormat::Json,
            location: true,
            span_timings: true,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    #[must_use]
    pub fn with_format(mut self, format: TracingOutputFormat) -> Self {
        self.format = format;
        self
    }

    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Directive used when neither `filter` nor `RUST_LOG` is set.
    pub fn default_directive(&self) -> String {
        TARGETS
            .iter()
            .map(|target| format!("{target}={}", self.level))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        match &self.filter {
            Some(directive) => Ok(EnvFilter::try_new(directive)?),
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(self.default_directive()))),
        }
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let spans = if self.span_timings {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let layer = fmt::layer()
            .with_file(self.location)
            .with_line_number(self.location)
            .with_span_events(spans);

        match (self.format, self.timestamps) {
            (TracingOutputFormat::Pretty, true) => layer.pretty().boxed(),
            (TracingOutputFormat::Pretty, false) => layer.pretty().without_time().boxed(),
            (TracingOutputFormat::Compact, true) => layer.compact().boxed(),
            (TracingOutputFormat::Compact, false) => layer.compact().without_time().boxed(),
            (TracingOutputFormat::Json, _) => layer.json().boxed(),
        }
    }
}

/// Installs the global subscriber.
///
/// # Errors
///
/// Fails if a global subscriber is already set or the filter does not parse.
pub fn init_tracing(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.env_filter()?;
    tracing_subscriber::registry()
        .with(config.fmt_layer().with_filter(filter))
        .try_init()?;
    Ok(())
}
