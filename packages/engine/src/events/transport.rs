// packages/engine/src/events/transport.rs
//! Event transports
//!
//! The engine never owns a client connection. It talks to an
//! [`EventTransport`], which exposes one method per event kind. Every method
//! defaults to building an [`AgentEvent`] and handing it to
//! [`EventTransport::send_event`], so a transport only has to implement that
//! one call unless it wants per-kind handling.

use crate::events::event::{AgentEvent, EventPayload};
use crate::events::event_queue::EventQueue;
use crate::utils::errors::EngineError;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

/// Push channel to a connected client
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Deliver a fully built event
    async fn send_event(&self, event: AgentEvent) -> anyhow::Result<()>;

    async fn notify_agent_started(
        &self,
        run_id: &str,
        agent_name: &str,
        message: &str,
    ) -> anyhow::Result<()> {
        self.send_event(AgentEvent::new(
            run_id,
            agent_name,
            EventPayload::AgentStarted {
                message: message.to_string(),
            },
        ))
        .await
    }

    async fn notify_agent_thinking(
        &self,
        run_id: &str,
        agent_name: &str,
        thought: &str,
        step_number: Option<u32>,
    ) -> anyhow::Result<()> {
        self.send_event(AgentEvent::new(
            run_id,
            agent_name,
            EventPayload::AgentThinking {
                thought: thought.to_string(),
                step_number,
            },
        ))
        .await
    }

    async fn notify_tool_executing(
        &self,
        run_id: &str,
        agent_name: &str,
        tool_name: &str,
        parameters: Value,
    ) -> anyhow::Result<()> {
        self.send_event(AgentEvent::new(
            run_id,
            agent_name,
            EventPayload::ToolExecuting {
                tool_name: tool_name.to_string(),
                parameters,
            },
        ))
        .await
    }

    async fn notify_tool_completed(
        &self,
        run_id: &str,
        agent_name: &str,
        tool_name: &str,
        result: Value,
    ) -> anyhow::Result<()> {
        self.send_event(AgentEvent::new(
            run_id,
            agent_name,
            EventPayload::ToolCompleted {
                tool_name: tool_name.to_string(),
                result,
            },
        ))
        .await
    }

    async fn notify_agent_completed(
        &self,
        run_id: &str,
        agent_name: &str,
        result: Value,
        execution_time_ms: Option<f64>,
    ) -> anyhow::Result<()> {
        self.send_event(AgentEvent::new(
            run_id,
            agent_name,
            EventPayload::AgentCompleted {
                result,
                execution_time_ms,
            },
        ))
        .await
    }

    async fn notify_agent_error(
        &self,
        run_id: &str,
        agent_name: &str,
        message: &str,
        error_type: &str,
        context: Option<Value>,
    ) -> anyhow::Result<()> {
        self.send_event(AgentEvent::new(
            run_id,
            agent_name,
            EventPayload::AgentError {
                message: message.to_string(),
                error_type: error_type.to_string(),
                context,
            },
        ))
        .await
    }
}

/// Transport backed by a bounded lock-free queue
///
/// A connection writer drains the queue and pushes frames to the client.
/// When the writer falls behind and the queue fills up, new events are
/// rejected (and counted) instead of blocking the agent.
#[derive(Clone)]
pub struct QueueTransport {
    queue: Arc<EventQueue>,
}

impl QueueTransport {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(EventQueue::new(capacity)),
        }
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    /// Take every queued event, oldest first
    pub fn drain(&self) -> Vec<AgentEvent> {
        self.queue.take_batch(usize::MAX)
    }
}

#[async_trait]
impl EventTransport for QueueTransport {
    async fn send_event(&self, event: AgentEvent) -> anyhow::Result<()> {
        trace!("Queueing {} event for run {}", event.kind(), event.run_id);
        self.queue
            .offer(event)
            .map_err(|_| EngineError::TransportFailure("Event queue full".to_string()).into())
    }
}

/// Transport that forwards events to a per-connection writer task
#[derive(Clone)]
pub struct ChannelTransport {
    sender: mpsc::Sender<AgentEvent>,
}

impl ChannelTransport {
    /// Create a transport and the receiving half for the writer task
    pub fn channel(buffer: usize) -> (Self, mpsc::Receiver<AgentEvent>) {
        let (sender, receiver) = mpsc::channel(buffer);
        (Self { sender }, receiver)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[async_trait]
impl EventTransport for ChannelTransport {
    async fn send_event(&self, event: AgentEvent) -> anyhow::Result<()> {
        self.sender
            .send(event)
            .await
            .map_err(|_| EngineError::TransportFailure("Client connection closed".to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::event::EventKind;
    use serde_json::json;

    #[tokio::test]
    async fn test_queue_transport_default_methods() {
        let transport = QueueTransport::new(16);

        transport.notify_agent_started("run_1", "echo", "starting").await.unwrap();
        transport
            .notify_tool_executing("run_1", "echo", "search", json!({"q": 1}))
            .await
            .unwrap();
        transport
            .notify_tool_completed("run_1", "echo", "search", json!({"hits": 0}))
            .await
            .unwrap();
        transport
            .notify_agent_completed("run_1", "echo", json!({"ok": true}), Some(1.0))
            .await
            .unwrap();

        let kinds: Vec<EventKind> = transport.drain().iter().map(|e| e.kind()).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::AgentStarted,
                EventKind::ToolExecuting,
                EventKind::ToolCompleted,
                EventKind::AgentCompleted,
            ]
        );
    }

    #[tokio::test]
    async fn test_queue_transport_full() {
        let transport = QueueTransport::new(1);
        transport.notify_agent_started("run_1", "echo", "a").await.unwrap();

        let result = transport.notify_agent_thinking("run_1", "echo", "b", None).await;
        assert!(result.is_err());
        assert_eq!(transport.queue().stats().rejected, 1);
    }

    #[tokio::test]
    async fn test_channel_transport() {
        let (transport, mut receiver) = ChannelTransport::channel(4);

        transport
            .notify_agent_error("run_9", "boom", "x", "agent_error", None)
            .await
            .unwrap();

        let event = receiver.recv().await.unwrap();
        assert_eq!(event.kind(), EventKind::AgentError);
        assert_eq!(event.run_id, "run_9");

        drop(receiver);
        assert!(transport.is_closed());
        assert!(transport.notify_agent_started("run_9", "boom", "again").await.is_err());
    }
}
