// packages/engine/src/events/mod.rs
//! Real-time event emission
//!
//! Progress of every execution is pushed to the connected client:
//!
//! - **Event**: typed event model and JSON frame layout
//! - **Event queue**: bounded outbox between agents and a connection writer
//! - **Transport**: the push-channel interface plus queue and channel backed
//!   implementations
//! - **Adapter**: per-run, failure-isolated emitter handed to agents
//! - **Ordering**: validation of the per-run ordering contract
//!
//! # Ordering
//!
//! ```text
//! agent_started → agent_thinking* → (tool_executing → tool_completed)* → agent_completed
//!                                                                     └→ agent_error
//! ```
//!
//! The engine emits the outer envelope (`agent_started`, `agent_completed`,
//! `agent_error`). Inner events are emitted by agents through the adapter in
//! their `AgentState`.

pub mod adapter;
pub mod event;
pub mod event_queue;
pub mod ordering;
pub mod transport;

pub use adapter::EventAdapter;
pub use event::{AgentEvent, EventKind, EventPayload};
pub use event_queue::{EventQueue, QueueStats};
pub use ordering::{validate_sequence, OrderingViolation};
pub use transport::{ChannelTransport, EventTransport, QueueTransport};
