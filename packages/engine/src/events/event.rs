// packages/engine/src/events/event.rs
//! Real-time agent events pushed to connected clients

use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Event kinds, in the order a successful run emits them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentStarted,
    AgentThinking,
    ToolExecuting,
    ToolCompleted,
    AgentCompleted,
    AgentError,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::AgentStarted => "agent_started",
            EventKind::AgentThinking => "agent_thinking",
            EventKind::ToolExecuting => "tool_executing",
            EventKind::ToolCompleted => "tool_completed",
            EventKind::AgentCompleted => "agent_completed",
            EventKind::AgentError => "agent_error",
        }
    }

    /// Events whose silent absence indicates a wiring bug
    pub fn is_critical(&self) -> bool {
        matches!(self, EventKind::AgentStarted | EventKind::AgentCompleted)
    }

    /// Events that close a run
    pub fn is_terminal(&self) -> bool {
        matches!(self, EventKind::AgentCompleted | EventKind::AgentError)
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed payload for each event kind
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    AgentStarted {
        message: String,
    },
    AgentThinking {
        thought: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        step_number: Option<u32>,
    },
    ToolExecuting {
        tool_name: String,
        parameters: Value,
    },
    ToolCompleted {
        tool_name: String,
        result: Value,
    },
    AgentCompleted {
        result: Value,
        #[serde(skip_serializing_if = "Option::is_none")]
        execution_time_ms: Option<f64>,
    },
    AgentError {
        message: String,
        error_type: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        context: Option<Value>,
    },
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::AgentStarted { .. } => EventKind::AgentStarted,
            EventPayload::AgentThinking { .. } => EventKind::AgentThinking,
            EventPayload::ToolExecuting { .. } => EventKind::ToolExecuting,
            EventPayload::ToolCompleted { .. } => EventKind::ToolCompleted,
            EventPayload::AgentCompleted { .. } => EventKind::AgentCompleted,
            EventPayload::AgentError { .. } => EventKind::AgentError,
        }
    }
}

/// Event delivered to a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentEvent {
    /// Unique event ID
    pub id: String,

    /// Execution run the event belongs to
    pub run_id: String,

    pub agent_name: String,

    #[serde(flatten)]
    pub payload: EventPayload,

    pub timestamp: DateTime<Utc>,
}

impl AgentEvent {
    pub fn new(run_id: impl Into<String>, agent_name: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: ulid::Ulid::new().to_string(),
            run_id: run_id.into(),
            agent_name: agent_name.into(),
            payload,
            timestamp: Utc::now(),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }

    /// Serialize to a JSON text frame for the push channel
    pub fn to_frame(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| EngineError::TransportFailure(format!("Event serialization error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_kind_flags() {
        assert!(EventKind::AgentStarted.is_critical());
        assert!(EventKind::AgentCompleted.is_critical());
        assert!(!EventKind::AgentThinking.is_critical());
        assert!(EventKind::AgentError.is_terminal());
        assert!(!EventKind::ToolCompleted.is_terminal());
    }

    #[test]
    fn test_frame_layout() {
        let event = AgentEvent::new(
            "run_1",
            "echo",
            EventPayload::ToolExecuting {
                tool_name: "search".into(),
                parameters: json!({"q": "rust"}),
            },
        );

        let frame: Value = serde_json::from_str(&event.to_frame().unwrap()).unwrap();
        assert_eq!(frame["type"], "tool_executing");
        assert_eq!(frame["run_id"], "run_1");
        assert_eq!(frame["agent_name"], "echo");
        assert_eq!(frame["tool_name"], "search");
        assert_eq!(frame["parameters"]["q"], "rust");
        assert!(frame["timestamp"].is_string());
    }

    #[test]
    fn test_error_frame_carries_type_tag() {
        let event = AgentEvent::new(
            "run_2",
            "boom",
            EventPayload::AgentError {
                message: "x".into(),
                error_type: "retry_exhausted".into(),
                context: None,
            },
        );

        let parsed: AgentEvent = serde_json::from_str(&event.to_frame().unwrap()).unwrap();
        assert_eq!(parsed.kind(), EventKind::AgentError);
        assert_eq!(parsed, event);
    }
}
