//! Observability subsystem: trait-based event and metric recording.
//!
//! | Backend | Description |
//! |---------|-------------|
//! | `noop`  | Discards everything (default) |
//! | `log`   | Emits structured events via `tracing` |
//!
//! Process-wide log output is configured separately by [`init_tracing`];
//! the `log` observer writes through whatever subscriber that installs.

mod log;
mod noop;
pub mod traits;

#[cfg(test)]
pub mod recording;

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

pub use self::log::LogObserver;
pub use self::noop::NoopObserver;
pub use self::traits::{Observer, ObserverEvent, ObserverMetric};

use crate::config::helpers::optional_env;
use crate::error::ConfigError;

/// Configuration for the observability backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservabilityConfig {
    /// Backend name: "none", "noop", or "log".
    pub backend: String,
}

impl ObservabilityConfig {
    pub(crate) fn resolve() -> Result<Self, ConfigError> {
        Ok(Self {
            backend: optional_env("OBSERVABILITY_BACKEND")?.unwrap_or_else(|| "none".into()),
        })
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            backend: "none".into(),
        }
    }
}

/// Create an observer from configuration.
///
/// Unknown backend names fall back to [`NoopObserver`].
pub fn create_observer(config: &ObservabilityConfig) -> Box<dyn Observer> {
    match config.backend.as_str() {
        "log" => Box::new(LogObserver),
        "none" | "noop" | "" => Box::new(NoopObserver),
        other => {
            tracing::warn!(backend = other, "unknown observability backend, using noop");
            Box::new(NoopObserver)
        }
    }
}

/// Log line format for [`init_tracing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the allocator logs at info.
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("agent_allocator=info,warn"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
