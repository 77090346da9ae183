// packages/engine/src/utils/errors.rs
//! Error types for the execution engine
//!
//! `EngineError` covers everything the engine itself can fail with. Business
//! agents and event transports report failures as `anyhow::Error`; the engine
//! wraps those in [`EngineError::Agent`] only when it has to hand the original
//! error back to the caller (hard-fail mode).

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    #[error("No agent registry configured")]
    NoRegistryConfigured,

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Agent '{agent}' execution timed out after {timeout_ms}ms")]
    ExecutionTimeout { agent: String, timeout_ms: u64 },

    #[error("Circuit breaker '{0}' is open")]
    CircuitOpen(String),

    #[error("Extension '{extension}' failed during {hook}: {message}")]
    ExtensionFailure {
        extension: String,
        hook: &'static str,
        message: String,
    },

    #[error("Event transport failure: {0}")]
    TransportFailure(String),

    #[error("Execution engine closed")]
    EngineClosed,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Agent(anyhow::Error),
}

impl EngineError {
    /// Recover an `EngineError` that travelled through an `anyhow::Error`,
    /// otherwise keep the business error as-is.
    pub fn from_agent(err: anyhow::Error) -> Self {
        match err.downcast::<EngineError>() {
            Ok(engine_err) => engine_err,
            Err(other) => EngineError::Agent(other),
        }
    }

    /// Machine-readable category for this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::AgentNotFound(_) => ErrorKind::AgentNotFound,
            EngineError::NoRegistryConfigured => ErrorKind::NoRegistry,
            EngineError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            EngineError::ExecutionTimeout { .. } => ErrorKind::Timeout,
            EngineError::CircuitOpen(_) => ErrorKind::CircuitBreaker,
            EngineError::ExtensionFailure { .. } => ErrorKind::ExtensionFailure,
            EngineError::TransportFailure(_) => ErrorKind::AgentError,
            EngineError::EngineClosed => ErrorKind::EngineClosed,
            EngineError::ConfigError(_) => ErrorKind::PreconditionFailed,
            EngineError::Agent(_) => ErrorKind::AgentError,
        }
    }
}

/// Typed failure category carried by `ExecutionResult` and `agent_error`
/// events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AgentNotFound,
    NoRegistry,
    PreconditionFailed,
    Timeout,
    CircuitBreaker,
    RetryExhausted,
    ExtensionFailure,
    AgentError,
    EngineClosed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AgentNotFound => "agent_not_found",
            ErrorKind::NoRegistry => "no_registry",
            ErrorKind::PreconditionFailed => "precondition_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::CircuitBreaker => "circuit_breaker",
            ErrorKind::RetryExhausted => "retry_exhausted",
            ErrorKind::ExtensionFailure => "extension_failure",
            ErrorKind::AgentError => "agent_error",
            ErrorKind::EngineClosed => "engine_closed",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marks an error as safe to retry regardless of its underlying type
#[derive(Error, Debug)]
#[error("{0}")]
pub struct RetryableError(pub String);

/// Marks an error as permanent; retry policies give up immediately
#[derive(Error, Debug)]
#[error("{0}")]
pub struct NonRetryableError(pub String);

/// Result type alias
pub type Result<T> = std::result::Result<T, EngineError>;
