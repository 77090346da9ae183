// packages/engine/src/reliability/circuit_breaker.rs
//! Per-operation circuit breaker
//!
//! # State machine
//!
//! ```text
//!            failures ≥ threshold
//!   Closed ───────────────────────▶ Open
//!     ▲                              │ recovery_timeout elapsed
//!     │ trial succeeds               ▼
//!     └──────────────────────── HalfOpen ──trial fails──▶ Open
//! ```
//!
//! While Open, calls are rejected with [`EngineError::CircuitOpen`] without
//! invoking the operation. HalfOpen admits exactly one trial call at a time.

use crate::utils::errors::EngineError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitBreakerState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the breaker (default: 5)
    pub failure_threshold: u32,

    /// How long the breaker stays open before a trial call (default: 60s)
    pub recovery_timeout: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitBreakerState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    last_failure: Option<DateTime<Utc>>,
    trial_in_flight: bool,
    state_changes: u64,
}

impl BreakerState {
    fn transition(&mut self, name: &str, to: CircuitBreakerState) {
        if self.state == to {
            return;
        }
        info!("Circuit breaker '{}' {:?} -> {:?}", name, self.state, to);
        self.state = to;
        self.state_changes += 1;
    }
}

/// Circuit breaker keyed by a stable operation name
pub struct CircuitBreaker {
    name: String,
    config: CircuitBreakerConfig,
    inner: Mutex<BreakerState>,
    total_calls: AtomicU64,
    successful_calls: AtomicU64,
    failed_calls: AtomicU64,
    rejected_calls: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            name: name.into(),
            config,
            inner: Mutex::new(BreakerState {
                state: CircuitBreakerState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                last_failure: None,
                trial_in_flight: false,
                state_changes: 0,
            }),
            total_calls: AtomicU64::new(0),
            successful_calls: AtomicU64::new(0),
            failed_calls: AtomicU64::new(0),
            rejected_calls: AtomicU64::new(0),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    pub fn state(&self) -> CircuitBreakerState {
        self.inner.lock().state
    }

    /// Run `operation` through the breaker
    pub async fn call<F, Fut, T>(&self, operation: F) -> anyhow::Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = anyhow::Result<T>>,
    {
        self.try_admit()?;

        let mut guard = CallGuard {
            breaker: self,
            settled: false,
        };

        let outcome = operation().await;
        match &outcome {
            Ok(_) => self.on_success(),
            Err(e) => self.on_failure(&e.to_string()),
        }
        guard.settled = true;

        outcome
    }

    fn try_admit(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock();

        let admitted = match inner.state {
            CircuitBreakerState::Closed => true,
            CircuitBreakerState::Open => {
                let recovered = inner
                    .opened_at
                    .map_or(true, |opened| opened.elapsed() >= self.config.recovery_timeout);
                if recovered {
                    inner.transition(&self.name, CircuitBreakerState::HalfOpen);
                    inner.trial_in_flight = true;
                    true
                } else {
                    false
                }
            }
            CircuitBreakerState::HalfOpen => {
                if inner.trial_in_flight {
                    false
                } else {
                    inner.trial_in_flight = true;
                    true
                }
            }
        };

        drop(inner);

        if admitted {
            self.total_calls.fetch_add(1, Ordering::Relaxed);
            Ok(())
        } else {
            self.rejected_calls.fetch_add(1, Ordering::Relaxed);
            debug!("Circuit breaker '{}' rejected call", self.name);
            Err(EngineError::CircuitOpen(self.name.clone()))
        }
    }

    fn on_success(&self) {
        self.successful_calls.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.trial_in_flight = false;
        if inner.state != CircuitBreakerState::Closed {
            inner.opened_at = None;
            inner.transition(&self.name, CircuitBreakerState::Closed);
        }
    }

    fn on_failure(&self, reason: &str) {
        self.failed_calls.fetch_add(1, Ordering::Relaxed);

        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        inner.last_failure = Some(Utc::now());

        match inner.state {
            CircuitBreakerState::HalfOpen => {
                inner.trial_in_flight = false;
                inner.opened_at = Some(Instant::now());
                inner.transition(&self.name, CircuitBreakerState::Open);
                warn!("Circuit breaker '{}' trial call failed: {}", self.name, reason);
            }
            CircuitBreakerState::Closed
                if inner.consecutive_failures >= self.config.failure_threshold =>
            {
                inner.opened_at = Some(Instant::now());
                inner.transition(&self.name, CircuitBreakerState::Open);
                warn!(
                    "Circuit breaker '{}' opened after {} consecutive failures",
                    self.name, inner.consecutive_failures
                );
            }
            _ => {}
        }
    }

    pub fn status(&self) -> CircuitBreakerStatus {
        let inner = self.inner.lock();
        CircuitBreakerStatus {
            name: self.name.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            failure_threshold: self.config.failure_threshold,
            recovery_timeout_ms: self.config.recovery_timeout.as_millis() as u64,
            last_failure: inner.last_failure,
            state_changes: inner.state_changes,
            total_calls: self.total_calls.load(Ordering::Relaxed),
            successful_calls: self.successful_calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            rejected_calls: self.rejected_calls.load(Ordering::Relaxed),
        }
    }
}

/// Counts a call abandoned mid-flight (e.g. cancelled by a timeout) as a
/// failure so a half-open trial cannot stay in flight forever.
struct CallGuard<'a> {
    breaker: &'a CircuitBreaker,
    settled: bool,
}

impl Drop for CallGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.breaker.on_failure("call cancelled");
        }
    }
}

/// Snapshot of breaker state and counters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    pub name: String,
    pub state: CircuitBreakerState,
    pub consecutive_failures: u32,
    pub failure_threshold: u32,
    pub recovery_timeout_ms: u64,
    pub last_failure: Option<DateTime<Utc>>,
    pub state_changes: u64,
    pub total_calls: u64,
    pub successful_calls: u64,
    pub failed_calls: u64,
    pub rejected_calls: u64,
}
