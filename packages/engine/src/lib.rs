// packages/engine/src/lib.rs
//! Sentra Lab Agent Orchestrator Library
//!
//! Execution core for an AI-agent backend: runs named agents under per-user
//! and global concurrency limits, protects them with circuit breakers and
//! retries, bounds them with timeouts, and streams ordered progress events
//! to the connected client.
//!
//! # Architecture
//!
//! The crate is structured into several key modules:
//!
//! - **runtime**: Engine, extension pipeline, agent registry, request scopes
//! - **reliability**: Circuit breaker and retry with backoff
//! - **extensions**: Built-in hooks (user limits, events, caching, tools)
//! - **events**: Event model, transports and the per-run adapter
//! - **observability**: Execution monitor, tracing and metrics bootstrap
//! - **utils**: Configuration and errors
//!
//! # Example
//!
//! ```no_run
//! use sentra_lab_orchestrator::{EngineFactory, EnginePreset, InMemoryAgentRegistry};
//! use std::sync::Arc;
//!
//! # async fn run() -> sentra_lab_orchestrator::Result<()> {
//! let factory = EngineFactory::new(Arc::new(InMemoryAgentRegistry::new()), None);
//! let engine = factory.create(EnginePreset::UserInteractive).await?;
//!
//! let mut ctx = engine.new_context("echo").with_user("alice");
//! let result = engine.execute("echo", serde_json::json!("hi"), &mut ctx).await?;
//! println!("{:?}", result);
//! # Ok(())
//! # }
//! ```

// Public module exports
pub mod events;
pub mod extensions;
pub mod observability;
pub mod reliability;
pub mod runtime;
pub mod utils;

// Re-export commonly used types
pub use events::{AgentEvent, EventAdapter, EventKind, EventTransport};
pub use runtime::{
    Agent, AgentRegistry, AgentState, EngineFactory, EnginePreset, ExecutionContext,
    ExecutionEngine, ExecutionExtension, ExecutionResult, InMemoryAgentRegistry,
    RequestScopedExecutionEngine,
};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, ErrorKind, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
