// packages/engine/src/observability/mod.rs
//! Tracing and metrics bootstrap
//!
//! Log output is controlled by `RUST_LOG` (default `info`). Set
//! `SENTRA_LOG_FORMAT=json` for one JSON object per line.

pub mod monitor;

pub use monitor::{
    ExecutionMonitor, ExecutionRecord, HealthState, HealthSummary, MonitorSnapshot,
    PerformanceStats, RequestStats,
};

use crate::utils::errors::{EngineError, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable selecting the log format
pub const LOG_FORMAT_ENV: &str = "SENTRA_LOG_FORMAT";

/// Install the global tracing subscriber
pub fn init_tracing() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let json_layer = json.then(|| tracing_subscriber::fmt::layer().json().with_target(true));
    let text_layer = (!json).then(|| tracing_subscriber::fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| EngineError::ConfigError(format!("Failed to install tracing subscriber: {}", e)))
}

/// Install the Prometheus recorder behind the `metrics` facade
///
/// The returned handle renders the scrape payload; serving it is left to
/// the embedding application.
pub fn init_metrics() -> Result<PrometheusHandle> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| EngineError::ConfigError(format!("Failed to install metrics recorder: {}", e)))
}
