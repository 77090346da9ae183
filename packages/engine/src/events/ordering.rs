// packages/engine/src/events/ordering.rs
//! Event ordering contract
//!
//! A run emits `agent_started`, then any number of `agent_thinking` and
//! `tool_executing`/`tool_completed` pairs, then exactly one terminal event:
//! `agent_completed` on success or `agent_error` on failure.

use crate::events::event::{AgentEvent, EventKind, EventPayload};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrderingViolation {
    #[error("run emitted no events")]
    Empty,

    #[error("first event is {0}, expected agent_started")]
    MissingStart(EventKind),

    #[error("agent_started emitted again at position {0}")]
    DuplicateStart(usize),

    #[error("event at position {position} belongs to run {found}, expected {expected}")]
    MixedRuns {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("{kind} at position {position} follows the terminal event")]
    AfterTerminal { kind: EventKind, position: usize },

    #[error("run has no terminal event")]
    MissingTerminal,

    #[error("tool_completed for '{tool}' at position {position} has no matching tool_executing")]
    UnmatchedToolCompleted { tool: String, position: usize },

    #[error("agent_completed while tool '{0}' is still executing")]
    ToolStillExecuting(String),

    #[error("timestamp at position {0} is earlier than the previous event")]
    TimestampRegression(usize),
}

/// Check a single run's events against the ordering contract
pub fn validate_sequence(events: &[AgentEvent]) -> Result<(), OrderingViolation> {
    let first = events.first().ok_or(OrderingViolation::Empty)?;
    if first.kind() != EventKind::AgentStarted {
        return Err(OrderingViolation::MissingStart(first.kind()));
    }

    let mut open_tools: HashMap<&str, usize> = HashMap::new();
    let mut terminal_seen = false;

    for (position, event) in events.iter().enumerate() {
        if event.run_id != first.run_id {
            return Err(OrderingViolation::MixedRuns {
                position,
                expected: first.run_id.clone(),
                found: event.run_id.clone(),
            });
        }

        if position > 0 && event.timestamp < events[position - 1].timestamp {
            return Err(OrderingViolation::TimestampRegression(position));
        }

        if terminal_seen {
            return Err(OrderingViolation::AfterTerminal {
                kind: event.kind(),
                position,
            });
        }

        match &event.payload {
            EventPayload::AgentStarted { .. } if position > 0 => {
                return Err(OrderingViolation::DuplicateStart(position));
            }
            EventPayload::ToolExecuting { tool_name, .. } => {
                *open_tools.entry(tool_name.as_str()).or_insert(0) += 1;
            }
            EventPayload::ToolCompleted { tool_name, .. } => {
                match open_tools.get_mut(tool_name.as_str()) {
                    Some(count) if *count > 0 => *count -= 1,
                    _ => {
                        return Err(OrderingViolation::UnmatchedToolCompleted {
                            tool: tool_name.clone(),
                            position,
                        })
                    }
                }
            }
            EventPayload::AgentCompleted { .. } => {
                if let Some((tool, _)) = open_tools.iter().find(|(_, count)| **count > 0) {
                    return Err(OrderingViolation::ToolStillExecuting(tool.to_string()));
                }
                terminal_seen = true;
            }
            EventPayload::AgentError { .. } => terminal_seen = true,
            _ => {}
        }
    }

    if terminal_seen {
        Ok(())
    } else {
        Err(OrderingViolation::MissingTerminal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(payload: EventPayload) -> AgentEvent {
        AgentEvent::new("run_1", "agent", payload)
    }

    fn started() -> AgentEvent {
        event(EventPayload::AgentStarted { message: String::new() })
    }

    fn completed() -> AgentEvent {
        event(EventPayload::AgentCompleted {
            result: json!(null),
            execution_time_ms: None,
        })
    }

    fn tool(executing: bool, name: &str) -> AgentEvent {
        if executing {
            event(EventPayload::ToolExecuting {
                tool_name: name.into(),
                parameters: json!({}),
            })
        } else {
            event(EventPayload::ToolCompleted {
                tool_name: name.into(),
                result: json!({}),
            })
        }
    }

    #[test]
    fn test_full_successful_sequence() {
        let events = vec![
            started(),
            event(EventPayload::AgentThinking {
                thought: "plan".into(),
                step_number: Some(1),
            }),
            tool(true, "search"),
            tool(true, "fetch"),
            tool(false, "fetch"),
            tool(false, "search"),
            completed(),
        ];
        assert_eq!(validate_sequence(&events), Ok(()));
    }

    #[test]
    fn test_error_terminal_allows_open_tools() {
        let events = vec![
            started(),
            tool(true, "search"),
            event(EventPayload::AgentError {
                message: "x".into(),
                error_type: "agent_error".into(),
                context: None,
            }),
        ];
        assert_eq!(validate_sequence(&events), Ok(()));
    }

    #[test]
    fn test_violations() {
        assert_eq!(validate_sequence(&[]), Err(OrderingViolation::Empty));

        assert_eq!(
            validate_sequence(&[completed()]),
            Err(OrderingViolation::MissingStart(EventKind::AgentCompleted))
        );

        assert_eq!(
            validate_sequence(&[started()]),
            Err(OrderingViolation::MissingTerminal)
        );

        assert!(matches!(
            validate_sequence(&[started(), completed(), completed()]),
            Err(OrderingViolation::AfterTerminal { position: 2, .. })
        ));

        assert!(matches!(
            validate_sequence(&[started(), tool(false, "search"), completed()]),
            Err(OrderingViolation::UnmatchedToolCompleted { .. })
        ));

        assert_eq!(
            validate_sequence(&[started(), tool(true, "search"), completed()]),
            Err(OrderingViolation::ToolStillExecuting("search".into()))
        );
    }
}
