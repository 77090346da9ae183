// packages/engine/src/runtime/mod.rs
//! Agent execution runtime
//!
//! This module provides the execution core:
//!
//! - **Context**: per-call state and results
//! - **Registry**: the agent contract and name lookup
//! - **Extension**: hook pipeline wrapped around every call
//! - **Engine**: concurrency-capped, reliability-wrapped execution
//! - **Scoped**: request-pinned views of a shared engine
//! - **Factory**: preset engine construction
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   ExecutionEngine                        │
//! │                                                          │
//! │   global semaphore (max_concurrent_agents)               │
//! │            │                                             │
//! │   ┌────────▼────────┐   ┌──────────────────────────┐     │
//! │   │ pre_execute ... │   │ ReliabilityManager/agent │     │
//! │   └────────┬────────┘   │  retry ∘ circuit breaker │     │
//! │            └──────────► │  bounded by timeout      │     │
//! │                         └────────────┬─────────────┘     │
//! │   ┌─────────────────────────────┐    │                   │
//! │   │ post_execute | on_error ... │ ◄──┘                   │
//! │   └─────────────────────────────┘                        │
//! └──────────────────────────────────────────────────────────┘
//!        ▲                 ▲
//!  RequestScoped     RequestScoped      (one per request)
//! ```

pub mod context;
pub mod engine;
pub mod extension;
pub mod factory;
pub mod registry;
pub mod scoped;

// Re-export commonly used types
pub use context::{ExecutionContext, ExecutionFailure, ExecutionResult};
pub use engine::{EngineHealth, EngineMetrics, ExecutionEngine, ExecutionEngineBuilder};
pub use extension::{ExecutionExtension, ExtensionPipeline};
pub use factory::{EngineFactory, EnginePreset};
pub use registry::{Agent, AgentRegistry, AgentState, InMemoryAgentRegistry};
pub use scoped::RequestScopedExecutionEngine;
