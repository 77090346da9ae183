// packages/engine/src/runtime/context.rs
//! Per-call execution context and result types

use crate::events::{EventAdapter, EventTransport};
use crate::utils::errors::{EngineError, ErrorKind};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

/// Default retry budget for a fresh context
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// State carried through one execution
///
/// Created by the caller for a single invocation, mutated only by the engine
/// and its extensions while that invocation runs.
pub struct ExecutionContext {
    pub agent_name: String,

    /// Opaque task payload handed to the agent
    pub task: Value,

    pub user_id: Option<String>,
    pub request_id: String,
    pub thread_id: Option<String>,
    pub run_id: String,

    /// Retries performed so far for this call
    pub retry_count: u32,
    pub max_retries: u32,

    /// Set once, when the engine dispatches the call
    pub start_time: Option<Instant>,

    /// Values extensions pass forward (hints, cache keys, flags)
    pub metadata: HashMap<String, Value>,

    /// Handles that live for the duration of the call (e.g. semaphore
    /// permits). Dropped by the engine when the call finishes.
    resources: HashMap<String, Box<dyn Any + Send + Sync>>,

    /// Connection-specific transport, overriding the engine default
    transport: Option<Arc<dyn EventTransport>>,

    events: EventAdapter,
}

impl ExecutionContext {
    pub fn new(agent_name: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            task: Value::Null,
            user_id: None,
            request_id: ulid::Ulid::new().to_string(),
            thread_id: None,
            run_id: ulid::Ulid::new().to_string(),
            retry_count: 0,
            max_retries: DEFAULT_MAX_RETRIES,
            start_time: None,
            metadata: HashMap::new(),
            resources: HashMap::new(),
            transport: None,
            events: EventAdapter::detached(),
        }
    }

    pub fn with_task(mut self, task: Value) -> Self {
        self.task = task;
        self
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Route this call's events to a specific connection
    pub fn with_transport(mut self, transport: Arc<dyn EventTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn transport(&self) -> Option<&Arc<dyn EventTransport>> {
        self.transport.as_ref()
    }

    /// Event adapter bound to this run
    pub fn events(&self) -> &EventAdapter {
        &self.events
    }

    pub(crate) fn set_events(&mut self, events: EventAdapter) {
        self.events = events;
    }

    /// Mark dispatch time; later calls keep the first value
    pub(crate) fn mark_started(&mut self) -> Instant {
        *self.start_time.get_or_insert_with(Instant::now)
    }

    pub fn elapsed_ms(&self) -> f64 {
        self.start_time
            .map(|start| start.elapsed().as_secs_f64() * 1000.0)
            .unwrap_or(0.0)
    }

    /// Attach a call-scoped resource under `key`, replacing any previous one
    pub fn insert_resource<T: Any + Send + Sync>(&mut self, key: impl Into<String>, resource: T) {
        self.resources.insert(key.into(), Box::new(resource));
    }

    /// Detach a resource; dropping it releases whatever it guards
    pub fn take_resource<T: Any + Send + Sync>(&mut self, key: &str) -> Option<T> {
        let boxed = self.resources.remove(key)?;
        match boxed.downcast::<T>() {
            Ok(resource) => Some(*resource),
            Err(other) => {
                // Wrong type requested, keep the original in place
                self.resources.insert(key.to_string(), other);
                None
            }
        }
    }

    pub fn has_resource(&self, key: &str) -> bool {
        self.resources.contains_key(key)
    }

    /// Drop every call-scoped resource
    pub(crate) fn release_resources(&mut self) -> usize {
        let released = self.resources.len();
        self.resources.clear();
        released
    }

    pub fn validate(&self, require_user: bool, require_request: bool) -> Result<(), EngineError> {
        if self.agent_name.trim().is_empty() {
            return Err(EngineError::PreconditionFailed(
                "agent_name is required".to_string(),
            ));
        }

        if require_user && self.user_id.as_deref().map_or(true, |u| u.trim().is_empty()) {
            return Err(EngineError::PreconditionFailed(
                "user_id is required for this engine".to_string(),
            ));
        }

        if require_request && self.request_id.trim().is_empty() {
            return Err(EngineError::PreconditionFailed(
                "request_id is required when request scoping is enabled".to_string(),
            ));
        }

        if self.run_id.trim().is_empty() {
            return Err(EngineError::PreconditionFailed("run_id is required".to_string()));
        }

        Ok(())
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("agent_name", &self.agent_name)
            .field("user_id", &self.user_id)
            .field("request_id", &self.request_id)
            .field("thread_id", &self.thread_id)
            .field("run_id", &self.run_id)
            .field("retry_count", &self.retry_count)
            .field("max_retries", &self.max_retries)
            .field("metadata", &self.metadata)
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Outcome of one execution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub success: bool,

    /// Agent output, present only on success
    pub result: Option<Value>,

    /// Failure message, present only on failure
    pub error: Option<String>,

    pub error_kind: Option<ErrorKind>,

    pub execution_time_ms: f64,
    pub retry_count: u32,
    pub metrics: Map<String, Value>,
    pub fallback_used: bool,
}

impl ExecutionResult {
    pub fn success(result: Value, execution_time_ms: f64) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
            error_kind: None,
            execution_time_ms,
            retry_count: 0,
            metrics: Map::new(),
            fallback_used: false,
        }
    }

    pub fn failure(error: impl Into<String>, kind: ErrorKind, execution_time_ms: f64) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
            error_kind: Some(kind),
            execution_time_ms,
            retry_count: 0,
            metrics: Map::new(),
            fallback_used: false,
        }
    }

    pub fn from_error(error: &EngineError, execution_time_ms: f64) -> Self {
        Self::failure(error.to_string(), error.kind(), execution_time_ms)
    }

    pub fn with_retry_count(mut self, retry_count: u32) -> Self {
        self.retry_count = retry_count;
        self
    }

    pub fn with_fallback(mut self) -> Self {
        self.fallback_used = true;
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }

    pub fn is_timeout(&self) -> bool {
        self.error_kind == Some(ErrorKind::Timeout)
    }
}

/// Failure details handed to `on_error` hooks
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionFailure {
    pub kind: ErrorKind,
    pub message: String,
}

impl ExecutionFailure {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}
