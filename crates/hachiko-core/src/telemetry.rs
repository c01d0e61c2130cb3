//! Tracing setup

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Subscriber options
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingOptions {
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Include the event target
    pub with_target: bool,
}

impl Default for TracingOptions {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            json: false,
            with_target: true,
        }
    }
}

impl TracingOptions {
    /// JSON output
    #[inline]
    #[must_use]
    pub fn json(mut self) -> Self {
        self.json = true;
        self
    }

    /// With default filter directive
    #[inline]
    #[must_use]
    pub fn with_default_filter(mut self, filter: impl Into<String>) -> Self {
        self.default_filter = filter.into();
        self
    }
}

/// Tracing setup failures
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// Default filter directive does not parse
    #[error("invalid log filter {filter:?}: {reason}")]
    InvalidFilter {
        /// Directive
        filter: String,
        /// Parser message
        reason: String,
    },

    /// A global subscriber is already installed
    #[error("tracing already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Install the global subscriber
///
/// `RUST_LOG` overrides `default_filter`.
///
/// # Errors
/// `InvalidFilter` for a bad default directive, `AlreadyInitialized` when a
/// subscriber is already set.
pub fn init_tracing(options: &TracingOptions) -> Result<(), TelemetryError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&options.default_filter).map_err(|e| {
            TelemetryError::InvalidFilter {
                filter: options.default_filter.clone(),
                reason: e.to_string(),
            }
        })?,
    };

    let json_layer = options
        .json
        .then(|| fmt::layer().json().with_target(options.with_target));
    let text_layer = (!options.json).then(|| fmt::layer().with_target(options.with_target));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| TelemetryError::AlreadyInitialized(e.to_string()))?;

    tracing::debug!("Tracing initialized");
    Ok(())
}
