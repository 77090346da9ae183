// packages/engine/src/utils/config.rs
//! Engine configuration
//!
//! Configuration is layered with the `config` crate:
//!
//! 1. Built-in defaults (`EngineConfig::default()`)
//! 2. Optional file `config/engine.{toml,yaml,json}` (or an explicit path)
//! 3. Environment variables prefixed with `SENTRA_ENGINE_`
//!    (e.g. `SENTRA_ENGINE_MAX_CONCURRENT_AGENTS=20`)
//!
//! The resulting value is validated before use and is immutable once an
//! engine has been built from it.

use crate::utils::errors::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

const ENV_PREFIX: &str = "SENTRA_ENGINE";
const DEFAULT_CONFIG_FILE: &str = "config/engine";

/// Upper bound for second-valued settings (one week)
pub const MAX_TIMEOUT_SECS: u64 = 7 * 24 * 60 * 60;

/// Execution engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Global cap on agents running at once (default: 10)
    pub max_concurrent_agents: usize,

    /// Per-call timeout in seconds (default: 30)
    pub agent_execution_timeout: f64,

    /// Run history and latency window size (default: 100)
    pub max_history_size: usize,

    pub enable_user_features: bool,
    pub enable_websocket_events: bool,
    pub enable_metrics: bool,

    /// Turn agent and extension failures into failed results instead of
    /// returning the error to the caller
    pub enable_fallback: bool,

    /// Reject calls whose context carries no user id
    pub require_user_context: bool,
    pub enable_request_scoping: bool,

    /// Default retry budget for agent calls (default: 3)
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub retry_max_delay_ms: u64,

    /// Retry agent errors that are neither marked retryable nor a known
    /// transient kind
    pub retry_unclassified_errors: bool,

    /// Consecutive failures before an agent's breaker opens (default: 5)
    pub circuit_failure_threshold: u32,

    /// Seconds an open breaker waits before admitting a trial call
    pub circuit_recovery_timeout: f64,

    /// Concurrent runs allowed per user (default: 2)
    pub max_concurrent_per_user: usize,

    /// Upper bound on a single event delivery
    pub event_emit_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent_agents: 10,
            agent_execution_timeout: 30.0,
            max_history_size: 100,
            enable_user_features: true,
            enable_websocket_events: true,
            enable_metrics: true,
            enable_fallback: true,
            require_user_context: false,
            enable_request_scoping: true,
            max_retries: 3,
            retry_base_delay_ms: 1_000,
            retry_max_delay_ms: 30_000,
            retry_unclassified_errors: true,
            circuit_failure_threshold: 5,
            circuit_recovery_timeout: 60.0,
            max_concurrent_per_user: 2,
            event_emit_timeout_ms: 5_000,
        }
    }
}

impl EngineConfig {
    /// Load configuration from `config/engine.*` (if present) and the
    /// environment
    pub fn load() -> Result<Self> {
        Self::build(config::File::with_name(DEFAULT_CONFIG_FILE).required(false))
    }

    /// Load configuration from an explicit file, still honoring environment
    /// overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        Self::build(config::File::from(path.as_ref()).required(true))
    }

    fn build(file: config::File<config::FileSourceFile, config::FileFormat>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(file)
            .add_source(config::Environment::with_prefix(ENV_PREFIX).try_parsing(true))
            .build()
            .map_err(|e| EngineError::ConfigError(format!("Failed to read configuration: {}", e)))?;

        let config: EngineConfig = settings
            .try_deserialize()
            .map_err(|e| EngineError::ConfigError(format!("Invalid configuration: {}", e)))?;

        config.validate()?;
        debug!("Loaded engine configuration: {:?}", config);

        Ok(config)
    }

    /// Validate invariants
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_agents < 1 {
            return Err(EngineError::ConfigError(
                "max_concurrent_agents must be at least 1".to_string(),
            ));
        }

        if !self.agent_execution_timeout.is_finite() || self.agent_execution_timeout <= 0.0 {
            return Err(EngineError::ConfigError(
                "agent_execution_timeout must be a positive number of seconds".to_string(),
            ));
        }
        if self.agent_execution_timeout > MAX_TIMEOUT_SECS as f64 {
            return Err(EngineError::ConfigError(format!(
                "agent_execution_timeout ({}) exceeds {} seconds",
                self.agent_execution_timeout, MAX_TIMEOUT_SECS
            )));
        }

        if self.max_history_size < 1 {
            return Err(EngineError::ConfigError(
                "max_history_size must be at least 1".to_string(),
            ));
        }

        if self.max_concurrent_per_user < 1 {
            return Err(EngineError::ConfigError(
                "max_concurrent_per_user must be at least 1".to_string(),
            ));
        }

        if self.circuit_failure_threshold < 1 {
            return Err(EngineError::ConfigError(
                "circuit_failure_threshold must be at least 1".to_string(),
            ));
        }

        if !self.circuit_recovery_timeout.is_finite() || self.circuit_recovery_timeout < 0.0 {
            return Err(EngineError::ConfigError(
                "circuit_recovery_timeout cannot be negative".to_string(),
            ));
        }
        if self.circuit_recovery_timeout > MAX_TIMEOUT_SECS as f64 {
            return Err(EngineError::ConfigError(format!(
                "circuit_recovery_timeout ({}) exceeds {} seconds",
                self.circuit_recovery_timeout, MAX_TIMEOUT_SECS
            )));
        }

        if self.retry_base_delay_ms > self.retry_max_delay_ms {
            return Err(EngineError::ConfigError(format!(
                "retry_base_delay_ms ({}) exceeds retry_max_delay_ms ({})",
                self.retry_base_delay_ms, self.retry_max_delay_ms
            )));
        }

        Ok(())
    }

    pub fn agent_timeout(&self) -> Duration {
        seconds(self.agent_execution_timeout)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn circuit_recovery_timeout(&self) -> Duration {
        seconds(self.circuit_recovery_timeout)
    }

    pub fn event_emit_timeout(&self) -> Duration {
        Duration::from_millis(self.event_emit_timeout_ms)
    }
}

/// Clamped to `[0, MAX_TIMEOUT_SECS]`
fn seconds(value: f64) -> Duration {
    Duration::try_from_secs_f64(value.min(MAX_TIMEOUT_SECS as f64)).unwrap_or(Duration::ZERO)
}
