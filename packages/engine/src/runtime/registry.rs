// packages/engine/src/runtime/registry.rs
//! Agent contract and registry
//!
//! Business agents are opaque to the engine: they implement [`Agent`] and
//! are looked up by name through an [`AgentRegistry`]. The registry is
//! read-only once the engine is running.

use crate::events::EventAdapter;
use crate::runtime::context::ExecutionContext;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Read-only view of the call handed to an agent
#[derive(Debug, Clone)]
pub struct AgentState {
    pub run_id: String,
    pub request_id: String,
    pub user_id: Option<String>,
    pub thread_id: Option<String>,
    pub agent_name: String,

    /// Snapshot of the context metadata after `pre_execute`
    pub metadata: HashMap<String, Value>,

    /// Emitter for inner events (`agent_thinking`, `tool_executing`, ...)
    pub events: EventAdapter,
}

impl AgentState {
    pub fn from_context(ctx: &ExecutionContext) -> Self {
        Self {
            run_id: ctx.run_id.clone(),
            request_id: ctx.request_id.clone(),
            user_id: ctx.user_id.clone(),
            thread_id: ctx.thread_id.clone(),
            agent_name: ctx.agent_name.clone(),
            metadata: ctx.metadata.clone(),
            events: ctx.events().clone(),
        }
    }

    pub fn metadata_flag(&self, key: &str) -> bool {
        self.metadata.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// A unit of business logic the engine can run
#[async_trait]
pub trait Agent: Send + Sync {
    /// Execute a task, returning the agent's output
    async fn execute(&self, task: Value, state: &AgentState) -> anyhow::Result<Value>;

    fn description(&self) -> &str {
        "Generic agent"
    }
}

/// Source of agents by name
pub trait AgentRegistry: Send + Sync {
    fn get_agent(&self, name: &str) -> Option<Arc<dyn Agent>>;

    fn agent_names(&self) -> Vec<String>;
}

/// Registry populated at startup
#[derive(Default)]
pub struct InMemoryAgentRegistry {
    agents: HashMap<String, Arc<dyn Agent>>,
}

impl InMemoryAgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an agent, replacing any agent already using the name
    pub fn register(&mut self, name: impl Into<String>, agent: Arc<dyn Agent>) -> &mut Self {
        let name = name.into();
        info!("Registering agent: {}", name);
        if self.agents.insert(name.clone(), agent).is_some() {
            debug!("Replaced existing agent registration for {}", name);
        }
        self
    }

    pub fn with_agent(mut self, name: impl Into<String>, agent: Arc<dyn Agent>) -> Self {
        self.register(name, agent);
        self
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }
}

impl AgentRegistry for InMemoryAgentRegistry {
    fn get_agent(&self, name: &str) -> Option<Arc<dyn Agent>> {
        let agent = self.agents.get(name).cloned();
        if agent.is_none() {
            debug!("No agent registered for {}", name);
        }
        agent
    }

    fn agent_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.agents.keys().cloned().collect();
        names.sort();
        names
    }
}
