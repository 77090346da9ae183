// packages/engine/src/reliability/manager.rs
//! Circuit breaker + retry composed into a single call

use crate::reliability::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerStatus};
use crate::reliability::retry::{RetryConfig, RetryPolicy};
use crate::runtime::context::{ExecutionContext, ExecutionResult};
use crate::utils::errors::{EngineError, ErrorKind};
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

/// Failure after the breaker and retry policy have both had their say
#[derive(Debug)]
pub struct ReliabilityFailure {
    /// `CircuitBreaker`, `RetryExhausted`, or `AgentError` when the error was
    /// not retryable or no retries were allowed
    pub kind: ErrorKind,

    /// The final error, unchanged
    pub error: anyhow::Error,
}

#[derive(Debug, Default)]
struct ReliabilityCounters {
    total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    circuit_rejections: AtomicU64,
    retry_exhaustions: AtomicU64,
}

/// Runs operations as `retry(breaker.call(operation))`
#[derive(Clone)]
pub struct ReliabilityManager {
    breaker: Arc<CircuitBreaker>,
    retry: RetryPolicy,
    counters: Arc<ReliabilityCounters>,
}

impl ReliabilityManager {
    pub fn new(name: impl Into<String>, breaker: CircuitBreakerConfig, retry: RetryConfig) -> Self {
        Self {
            breaker: Arc::new(CircuitBreaker::new(name, breaker)),
            retry: RetryPolicy::new(retry),
            counters: Arc::new(ReliabilityCounters::default()),
        }
    }

    pub fn name(&self) -> &str {
        self.breaker.name()
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Manager sharing this one's breaker and counters, with a per-call
    /// retry budget
    pub fn with_max_retries(&self, max_retries: u32) -> Self {
        Self {
            breaker: Arc::clone(&self.breaker),
            retry: self.retry.with_max_retries(max_retries),
            counters: Arc::clone(&self.counters),
        }
    }

    /// Run `operation`, keeping the original error on failure
    pub async fn try_execute<F, Fut, T>(
        &self,
        context: &mut ExecutionContext,
        mut operation: F,
    ) -> Result<T, ReliabilityFailure>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.counters.total.fetch_add(1, Ordering::Relaxed);

        let breaker = &self.breaker;
        let outcome = self
            .retry
            .execute_with_retry(context, || {
                let attempt = operation();
                breaker.call(move || attempt)
            })
            .await;

        match outcome {
            Ok(value) => {
                self.counters.successes.fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            Err(error) => {
                self.counters.failures.fetch_add(1, Ordering::Relaxed);
                let kind = self.classify(&error);
                match kind {
                    ErrorKind::CircuitBreaker => {
                        self.counters.circuit_rejections.fetch_add(1, Ordering::Relaxed);
                    }
                    ErrorKind::RetryExhausted => {
                        self.counters.retry_exhaustions.fetch_add(1, Ordering::Relaxed);
                    }
                    _ => {}
                }
                debug!(
                    operation = %self.name(),
                    run_id = %context.run_id,
                    "Reliable call failed ({}): {}", kind, error
                );
                Err(ReliabilityFailure { kind, error })
            }
        }
    }

    /// Run `operation` and report the outcome as an `ExecutionResult`
    /// instead of an error
    pub async fn execute_with_reliability<F, Fut>(
        &self,
        context: &mut ExecutionContext,
        operation: F,
    ) -> ExecutionResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<Value>>,
    {
        let started = std::time::Instant::now();
        let outcome = self.try_execute(context, operation).await;
        let elapsed_ms = started.elapsed().as_secs_f64() * 1000.0;

        match outcome {
            Ok(value) => ExecutionResult::success(value, elapsed_ms),
            Err(failure) => ExecutionResult::failure(failure.error.to_string(), failure.kind, elapsed_ms),
        }
        .with_retry_count(context.retry_count)
    }

    fn classify(&self, error: &anyhow::Error) -> ErrorKind {
        let circuit_open = error
            .chain()
            .any(|cause| matches!(cause.downcast_ref::<EngineError>(), Some(EngineError::CircuitOpen(_))));

        if circuit_open {
            ErrorKind::CircuitBreaker
        } else if self.retry.config().max_retries > 0 && self.retry.is_retryable(error) {
            ErrorKind::RetryExhausted
        } else {
            ErrorKind::AgentError
        }
    }

    pub fn health_status(&self) -> ReliabilityHealth {
        let total = self.counters.total.load(Ordering::Relaxed);
        let successes = self.counters.successes.load(Ordering::Relaxed);

        ReliabilityHealth {
            name: self.name().to_string(),
            total_calls: total,
            successful_calls: successes,
            failed_calls: self.counters.failures.load(Ordering::Relaxed),
            circuit_rejections: self.counters.circuit_rejections.load(Ordering::Relaxed),
            retry_exhaustions: self.counters.retry_exhaustions.load(Ordering::Relaxed),
            success_rate: if total == 0 {
                1.0
            } else {
                successes as f64 / total as f64
            },
            circuit_breaker: self.breaker.status(),
            retry_config: self.retry.config().clone(),
        }
    }
}

/// Liveness/readiness view of a reliability manager
#[derive(Debug, Clone, Serialize)]
pub struct ReliabilityHealth {
    pub name: String,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub circuit_rejections: u64,
    pub retry_exhaustions: u64,
    pub success_rate: f64,
    pub circuit_breaker: CircuitBreakerStatus,
    pub retry_config: RetryConfig,
}
