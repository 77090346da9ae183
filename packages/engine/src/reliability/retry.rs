// packages/engine/src/reliability/retry.rs
//! Retry with exponential backoff
//!
//! Delay before retry `n` (n ≥ 1) is `min(base_delay * 2^(n-1), max_delay)`.
//! Whether an error is worth retrying is decided by [`RetryPolicy::is_retryable`].

use crate::runtime::context::ExecutionContext;
use crate::utils::errors::{EngineError, NonRetryableError, RetryableError};
use rand::Rng;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Serialize)]
pub struct RetryConfig {
    /// Retries after the first attempt (default: 3)
    pub max_retries: u32,

    #[serde(serialize_with = "serialize_duration_ms")]
    pub base_delay: Duration,

    #[serde(serialize_with = "serialize_duration_ms")]
    pub max_delay: Duration,

    /// Add up to 10% random jitter (still capped at `max_delay`)
    pub jitter: bool,

    /// Retry errors that are neither marked nor a known transient kind
    pub retry_unclassified: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: false,
            retry_unclassified: false,
        }
    }
}

fn serialize_duration_ms<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(d.as_millis() as u64)
}

/// Exponential-backoff retry wrapper
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Same policy with a different retry budget
    pub fn with_max_retries(&self, max_retries: u32) -> Self {
        Self {
            config: RetryConfig {
                max_retries,
                ..self.config.clone()
            },
        }
    }

    /// Delay before retry `attempt` (1-based)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let exponent = (attempt - 1).min(31);
        let delay = self
            .config
            .base_delay
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.config.max_delay);

        let delay = if self.config.jitter {
            let factor = rand::thread_rng().gen_range(0.0..0.1);
            delay + delay.mul_f64(factor)
        } else {
            delay
        };

        delay.min(self.config.max_delay)
    }

    /// Classify an error
    ///
    /// Explicit markers win; then known permanent engine errors; then known
    /// transient kinds; anything else follows `retry_unclassified`.
    pub fn is_retryable(&self, error: &anyhow::Error) -> bool {
        for cause in error.chain() {
            if cause.is::<NonRetryableError>() {
                return false;
            }
            if cause.is::<RetryableError>() {
                return true;
            }
            if let Some(engine_error) = cause.downcast_ref::<EngineError>() {
                match engine_error {
                    EngineError::AgentNotFound(_)
                    | EngineError::NoRegistryConfigured
                    | EngineError::PreconditionFailed(_)
                    | EngineError::EngineClosed
                    | EngineError::ConfigError(_) => return false,
                    EngineError::CircuitOpen(_)
                    | EngineError::ExecutionTimeout { .. }
                    | EngineError::TransportFailure(_) => return true,
                    _ => {}
                }
            }
            if let Some(io_error) = cause.downcast_ref::<std::io::Error>() {
                if is_transient_io(io_error.kind()) {
                    return true;
                }
            }
            if cause.is::<tokio::time::error::Elapsed>() {
                return true;
            }
        }

        self.config.retry_unclassified
    }

    /// Run `operation` until it succeeds, fails permanently or the retry
    /// budget is spent. The final error is returned unchanged.
    pub async fn execute_with_retry<F, Fut, T>(
        &self,
        context: &mut ExecutionContext,
        mut operation: F,
    ) -> anyhow::Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        let max_retries = self.config.max_retries;
        let mut attempt = 0u32;

        loop {
            match operation().await {
                Ok(value) => {
                    if attempt > 0 {
                        debug!(
                            run_id = %context.run_id,
                            "Operation succeeded after {} retries", attempt
                        );
                    }
                    return Ok(value);
                }
                Err(e) => {
                    if attempt >= max_retries {
                        if max_retries > 0 {
                            warn!(
                                run_id = %context.run_id,
                                "Giving up after {} retries: {}", attempt, e
                            );
                        }
                        return Err(e);
                    }
                    if !self.is_retryable(&e) {
                        debug!(run_id = %context.run_id, "Error is not retryable: {}", e);
                        return Err(e);
                    }

                    attempt += 1;
                    let delay = self.delay_for_attempt(attempt);
                    debug!(
                        run_id = %context.run_id,
                        "Attempt {} failed ({}), retrying in {:?}", attempt, e, delay
                    );

                    context.retry_count = attempt;
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn is_transient_io(kind: std::io::ErrorKind) -> bool {
    use std::io::ErrorKind::*;
    matches!(
        kind,
        ConnectionRefused
            | ConnectionReset
            | ConnectionAborted
            | NotConnected
            | BrokenPipe
            | TimedOut
            | Interrupted
            | UnexpectedEof
    )
}
