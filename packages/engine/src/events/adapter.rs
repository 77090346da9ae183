// packages/engine/src/events/adapter.rs
//! Per-run event adapter
//!
//! An [`EventAdapter`] binds a transport to one `(run_id, agent_name)` pair
//! and exposes one method per event kind. Delivery is fire-and-forget:
//! transport errors and slow transports are logged and swallowed, so event
//! emission can never change the outcome of the run it reports on.
//!
//! Binding to a new run simply replaces the previous binding.

use crate::events::event::EventKind;
use crate::events::transport::EventTransport;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

const DEFAULT_EMIT_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Eq)]
struct Binding {
    run_id: String,
    agent_name: String,
}

/// Event emitter bound to a single run
#[derive(Clone)]
pub struct EventAdapter {
    transport: Option<Arc<dyn EventTransport>>,
    binding: Option<Binding>,
    emit_timeout: Duration,
}

impl EventAdapter {
    pub fn new(transport: Option<Arc<dyn EventTransport>>) -> Self {
        Self {
            transport,
            binding: None,
            emit_timeout: DEFAULT_EMIT_TIMEOUT,
        }
    }

    /// Adapter with no transport; every emission is a no-op
    pub fn detached() -> Self {
        Self::new(None)
    }

    pub fn with_emit_timeout(mut self, emit_timeout: Duration) -> Self {
        self.emit_timeout = emit_timeout;
        self
    }

    /// Bind to a run, replacing any previous binding
    pub fn bind(&mut self, run_id: impl Into<String>, agent_name: impl Into<String>) {
        self.binding = Some(Binding {
            run_id: run_id.into(),
            agent_name: agent_name.into(),
        });
    }

    pub fn run_id(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.run_id.as_str())
    }

    pub fn agent_name(&self) -> Option<&str> {
        self.binding.as_ref().map(|b| b.agent_name.as_str())
    }

    pub fn has_transport(&self) -> bool {
        self.transport.is_some()
    }

    pub async fn agent_started(&self, message: &str) {
        let Some((transport, binding)) = self.target(EventKind::AgentStarted) else {
            return;
        };
        let outcome = tokio::time::timeout(
            self.emit_timeout,
            transport.notify_agent_started(&binding.run_id, &binding.agent_name, message),
        )
        .await;
        self.settle(EventKind::AgentStarted, binding, outcome);
    }

    pub async fn agent_thinking(&self, thought: &str, step_number: Option<u32>) {
        let Some((transport, binding)) = self.target(EventKind::AgentThinking) else {
            return;
        };
        let outcome = tokio::time::timeout(
            self.emit_timeout,
            transport.notify_agent_thinking(&binding.run_id, &binding.agent_name, thought, step_number),
        )
        .await;
        self.settle(EventKind::AgentThinking, binding, outcome);
    }

    pub async fn tool_executing(&self, tool_name: &str, parameters: Value) {
        let Some((transport, binding)) = self.target(EventKind::ToolExecuting) else {
            return;
        };
        let outcome = tokio::time::timeout(
            self.emit_timeout,
            transport.notify_tool_executing(&binding.run_id, &binding.agent_name, tool_name, parameters),
        )
        .await;
        self.settle(EventKind::ToolExecuting, binding, outcome);
    }

    pub async fn tool_completed(&self, tool_name: &str, result: Value) {
        let Some((transport, binding)) = self.target(EventKind::ToolCompleted) else {
            return;
        };
        let outcome = tokio::time::timeout(
            self.emit_timeout,
            transport.notify_tool_completed(&binding.run_id, &binding.agent_name, tool_name, result),
        )
        .await;
        self.settle(EventKind::ToolCompleted, binding, outcome);
    }

    pub async fn agent_completed(&self, result: Value, execution_time_ms: Option<f64>) {
        let Some((transport, binding)) = self.target(EventKind::AgentCompleted) else {
            return;
        };
        let outcome = tokio::time::timeout(
            self.emit_timeout,
            transport.notify_agent_completed(
                &binding.run_id,
                &binding.agent_name,
                result,
                execution_time_ms,
            ),
        )
        .await;
        self.settle(EventKind::AgentCompleted, binding, outcome);
    }

    pub async fn agent_error(&self, message: &str, error_type: &str, context: Option<Value>) {
        let Some((transport, binding)) = self.target(EventKind::AgentError) else {
            return;
        };
        let outcome = tokio::time::timeout(
            self.emit_timeout,
            transport.notify_agent_error(
                &binding.run_id,
                &binding.agent_name,
                message,
                error_type,
                context,
            ),
        )
        .await;
        self.settle(EventKind::AgentError, binding, outcome);
    }

    /// Resolve where an event should go, logging when it cannot be sent
    fn target(&self, kind: EventKind) -> Option<(&Arc<dyn EventTransport>, &Binding)> {
        let Some(transport) = self.transport.as_ref() else {
            if kind.is_critical() {
                warn!(
                    run_id = self.run_id().unwrap_or("unbound"),
                    "No event transport configured, {} event not delivered", kind
                );
            }
            return None;
        };

        let Some(binding) = self.binding.as_ref() else {
            debug!("Event adapter not bound to a run, dropping {} event", kind);
            return None;
        };

        Some((transport, binding))
    }

    fn settle(
        &self,
        kind: EventKind,
        binding: &Binding,
        outcome: Result<anyhow::Result<()>, tokio::time::error::Elapsed>,
    ) {
        match outcome {
            Ok(Ok(())) => {
                trace!(run_id = %binding.run_id, "Delivered {} event", kind);
            }
            Ok(Err(e)) => {
                debug!(
                    run_id = %binding.run_id,
                    agent = %binding.agent_name,
                    "Failed to deliver {} event: {}", kind, e
                );
            }
            Err(_) => {
                debug!(
                    run_id = %binding.run_id,
                    agent = %binding.agent_name,
                    "Delivery of {} event timed out after {:?}", kind, self.emit_timeout
                );
            }
        }
    }
}

impl std::fmt::Debug for EventAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventAdapter")
            .field("has_transport", &self.transport.is_some())
            .field("binding", &self.binding)
            .field("emit_timeout", &self.emit_timeout)
            .finish()
    }
}
