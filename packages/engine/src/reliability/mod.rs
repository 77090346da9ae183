// packages/engine/src/reliability/mod.rs
//! Reliability layer
//!
//! A [`ReliabilityManager`] composes a [`CircuitBreaker`] with a
//! [`RetryPolicy`]. The engine keeps one manager per agent so one failing
//! agent cannot trip the breaker of another.

pub mod circuit_breaker;
pub mod manager;
pub mod retry;

pub use circuit_breaker::{
    CircuitBreaker, CircuitBreakerConfig, CircuitBreakerState, CircuitBreakerStatus,
};
pub use manager::{ReliabilityFailure, ReliabilityHealth, ReliabilityManager};
pub use retry::{RetryConfig, RetryPolicy};
