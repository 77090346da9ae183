// packages/engine/src/runtime/engine.rs
//! Execution engine
//!
//! Runs one named agent per call under a global concurrency cap, wrapped by
//! the extension pipeline and the per-agent reliability layer.
//!
//! # Flow
//!
//! ```text
//! execute(agent, task, ctx)
//! ├─ validate context            → failed result
//! ├─ resolve agent               → failed result
//! ├─ global slot (semaphore)     → queue_wait_ms
//! ├─ pre_execute chain
//! ├─ timeout(retry(breaker(agent.execute)))
//! ├─ post_execute chain | on_error chain
//! └─ release resources, record metrics + history
//! ```
//!
//! Expected failures come back as an `ExecutionResult` with an `ErrorKind`.
//! With `enable_fallback = false`, agent and extension failures are returned
//! as `Err` instead; lookup, precondition and timeout failures are always
//! reported as results.

use crate::events::{EventAdapter, EventTransport};
use crate::observability::monitor::{
    ExecutionMonitor, ExecutionRecord, HealthState, HealthSummary, MonitorSnapshot, RequestStats,
};
use crate::reliability::{
    CircuitBreakerConfig, CircuitBreakerState, CircuitBreakerStatus, ReliabilityHealth,
    ReliabilityManager, RetryConfig,
};
use crate::runtime::context::{ExecutionContext, ExecutionFailure, ExecutionResult};
use crate::runtime::extension::{ExecutionExtension, ExtensionPipeline};
use crate::runtime::registry::{Agent, AgentRegistry, AgentState};
use crate::utils::config::EngineConfig;
use crate::utils::errors::{EngineError, ErrorKind, Result};
use chrono::Utc;
use dashmap::DashMap;
use futures::FutureExt;
use serde::Serialize;
use serde_json::{Map, Value};
use std::any::Any;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

/// Failure inside a dispatched run, with the category reported to clients
struct RunFailure {
    kind: ErrorKind,
    error: EngineError,
}

impl RunFailure {
    fn new(kind: ErrorKind, error: EngineError) -> Self {
        Self { kind, error }
    }

    /// Failures reported as results even when fallback is off
    fn always_reported(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout)
    }
}

impl From<EngineError> for RunFailure {
    fn from(error: EngineError) -> Self {
        Self::new(error.kind(), error)
    }
}

/// Builder for [`ExecutionEngine`]
pub struct ExecutionEngineBuilder {
    config: EngineConfig,
    registry: Option<Arc<dyn AgentRegistry>>,
    extensions: Vec<Arc<dyn ExecutionExtension>>,
    transport: Option<Arc<dyn EventTransport>>,
}

impl ExecutionEngineBuilder {
    pub fn registry(mut self, registry: Arc<dyn AgentRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Extensions run in the order they are added
    pub fn extension(mut self, extension: Arc<dyn ExecutionExtension>) -> Self {
        self.extensions.push(extension);
        self
    }

    pub fn extensions(mut self, extensions: impl IntoIterator<Item = Arc<dyn ExecutionExtension>>) -> Self {
        self.extensions.extend(extensions);
        self
    }

    /// Default transport for runs whose context carries none
    pub fn transport(mut self, transport: Arc<dyn EventTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Validate the configuration and initialize every extension
    pub async fn build(self) -> Result<ExecutionEngine> {
        self.config.validate()?;

        let extensions = ExtensionPipeline::new(self.extensions);
        extensions.initialize(&self.config).await?;

        if self.registry.is_none() {
            warn!("Execution engine built without an agent registry");
        }

        info!(
            "Execution engine ready: {} concurrent agents, {:.1}s timeout, extensions [{}]",
            self.config.max_concurrent_agents,
            self.config.agent_execution_timeout,
            extensions.names().join(", ")
        );

        Ok(ExecutionEngine {
            semaphore: Arc::new(Semaphore::new(self.config.max_concurrent_agents)),
            monitor: ExecutionMonitor::new(self.config.max_history_size, self.config.enable_metrics),
            config: Arc::new(self.config),
            registry: self.registry,
            extensions,
            transport: self.transport,
            reliability: DashMap::new(),
            closed: AtomicBool::new(false),
        })
    }
}

/// Aggregate metrics across all agents
#[derive(Debug, Clone, Serialize)]
pub struct EngineMetrics {
    #[serde(flatten)]
    pub executions: MonitorSnapshot,
    pub available_slots: usize,
    pub max_concurrent_agents: usize,
    pub circuit_breakers: BTreeMap<String, CircuitBreakerStatus>,
    pub extensions: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize)]
pub struct EngineHealth {
    pub status: HealthState,
    pub closed: bool,
    pub executions: HealthSummary,
    pub open_circuits: Vec<String>,
    pub reliability: BTreeMap<String, ReliabilityHealth>,
    pub extensions: Map<String, Value>,
}

pub struct ExecutionEngine {
    config: Arc<EngineConfig>,
    registry: Option<Arc<dyn AgentRegistry>>,
    extensions: ExtensionPipeline,
    transport: Option<Arc<dyn EventTransport>>,
    semaphore: Arc<Semaphore>,
    monitor: ExecutionMonitor,

    /// One manager per agent name
    reliability: DashMap<String, ReliabilityManager>,
    closed: AtomicBool,
}

impl ExecutionEngine {
    pub fn builder(config: EngineConfig) -> ExecutionEngineBuilder {
        ExecutionEngineBuilder {
            config,
            registry: None,
            extensions: Vec::new(),
            transport: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn monitor(&self) -> &ExecutionMonitor {
        &self.monitor
    }

    pub fn extension_names(&self) -> Vec<String> {
        self.extensions.names()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn available_slots(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Fresh context using this engine's retry budget
    pub fn new_context(&self, agent_name: impl Into<String>) -> ExecutionContext {
        ExecutionContext::new(agent_name).with_max_retries(self.config.max_retries)
    }

    /// Run `agent_name` on `task`
    ///
    /// The context's agent name and task are overwritten with the
    /// arguments. Metadata written by extensions stays on the context.
    pub async fn execute(
        &self,
        agent_name: &str,
        task: Value,
        ctx: &mut ExecutionContext,
    ) -> Result<ExecutionResult> {
        if self.is_closed() {
            return Err(EngineError::EngineClosed);
        }

        ctx.agent_name = agent_name.to_string();
        ctx.task = task;

        if let Err(e) = ctx.validate(
            self.config.require_user_context,
            self.config.enable_request_scoping,
        ) {
            warn!(run_id = %ctx.run_id, agent = %agent_name, "Rejected execution: {}", e);
            return Ok(self.reject(ctx, e));
        }

        let agent = match self.resolve(agent_name) {
            Ok(agent) => agent,
            Err(e) => {
                warn!(run_id = %ctx.run_id, "Rejected execution: {}", e);
                return Ok(self.reject(ctx, e));
            }
        };

        self.monitor.record_queued();
        let queued_at = Instant::now();
        let permit = Arc::clone(&self.semaphore).acquire_owned().await;
        let queue_wait = queued_at.elapsed();
        self.monitor.record_dequeued(queue_wait);
        let _permit = permit.map_err(|_| EngineError::EngineClosed)?;
        let queue_wait_ms = millis(queue_wait);

        ctx.mark_started();
        let transport = ctx.transport().cloned().or_else(|| self.transport.clone());
        let mut events = EventAdapter::new(transport).with_emit_timeout(self.config.event_emit_timeout());
        events.bind(ctx.run_id.clone(), agent_name);
        ctx.set_events(events);

        self.monitor
            .start_execution(&ctx.run_id, agent_name, &ctx.request_id);
        debug!(
            run_id = %ctx.run_id,
            agent = %agent_name,
            user = ctx.user_id.as_deref().unwrap_or("-"),
            "Dispatching agent after {:.2}ms in queue", queue_wait_ms
        );

        let outcome = self.run(agent, ctx).await;

        let released = ctx.release_resources();
        if released > 0 {
            debug!(run_id = %ctx.run_id, "Released {} leftover resources", released);
        }
        let duration_ms = ctx.elapsed_ms();

        match outcome {
            Ok(mut result) => {
                result.execution_time_ms = duration_ms;
                result.retry_count = ctx.retry_count;
                let result = result.with_metric("queue_wait_ms", queue_wait_ms);
                self.record(ctx, result.success, result.error_kind, duration_ms, queue_wait_ms);
                info!(
                    run_id = %ctx.run_id,
                    agent = %agent_name,
                    "Execution finished in {:.2}ms", duration_ms
                );
                Ok(result)
            }
            Err(failure) => {
                self.record(ctx, false, Some(failure.kind), duration_ms, queue_wait_ms);
                error!(
                    run_id = %ctx.run_id,
                    agent = %agent_name,
                    kind = %failure.kind,
                    "Execution failed after {} retries: {}", ctx.retry_count, failure.error
                );

                if !self.config.enable_fallback && !failure.always_reported() {
                    return Err(failure.error);
                }

                let result = ExecutionResult::failure(failure.error.to_string(), failure.kind, duration_ms)
                    .with_retry_count(ctx.retry_count)
                    .with_metric("queue_wait_ms", queue_wait_ms);
                Ok(if failure.always_reported() {
                    result
                } else {
                    result.with_fallback()
                })
            }
        }
    }

    /// Extension chains around the agent call
    async fn run(
        &self,
        agent: Arc<dyn Agent>,
        ctx: &mut ExecutionContext,
    ) -> std::result::Result<ExecutionResult, RunFailure> {
        if let Err(e) = self.extensions.pre_execute(ctx).await {
            return Err(self.fail(e.into(), ctx).await);
        }

        let value = match self.invoke(agent, ctx).await {
            Ok(value) => value,
            Err(failure) => return Err(self.fail(failure, ctx).await),
        };

        let result = ExecutionResult::success(value, ctx.elapsed_ms()).with_retry_count(ctx.retry_count);
        match self.extensions.post_execute(result, ctx).await {
            Ok(result) => Ok(result),
            Err(e) => Err(self.fail(e.into(), ctx).await),
        }
    }

    async fn fail(&self, failure: RunFailure, ctx: &mut ExecutionContext) -> RunFailure {
        let reported = ExecutionFailure::new(failure.kind, failure.error.to_string());
        self.extensions.on_error(&reported, ctx).await;
        failure
    }

    /// Agent call through the reliability layer, bounded by the timeout
    async fn invoke(
        &self,
        agent: Arc<dyn Agent>,
        ctx: &mut ExecutionContext,
    ) -> std::result::Result<Value, RunFailure> {
        let manager = self
            .reliability_for(&ctx.agent_name)
            .with_max_retries(ctx.max_retries);
        let state = AgentState::from_context(ctx);
        let task = ctx.task.clone();
        let timeout = self.config.agent_timeout();

        let call = manager.try_execute(ctx, || {
            let agent = Arc::clone(&agent);
            let task = task.clone();
            let state = state.clone();
            async move {
                match AssertUnwindSafe(agent.execute(task, &state)).catch_unwind().await {
                    Ok(outcome) => outcome,
                    Err(panic) => Err(anyhow::anyhow!("Agent panicked: {}", panic_message(&*panic))),
                }
            }
        });

        let outcome = tokio::time::timeout(timeout, call).await;
        match outcome {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(failure)) => Err(RunFailure::new(
                failure.kind,
                EngineError::from_agent(failure.error),
            )),
            Err(_) => {
                warn!(
                    run_id = %ctx.run_id,
                    agent = %ctx.agent_name,
                    "Agent execution timed out after {:?}", timeout
                );
                Err(EngineError::ExecutionTimeout {
                    agent: ctx.agent_name.clone(),
                    timeout_ms: timeout.as_millis() as u64,
                }
                .into())
            }
        }
    }

    fn resolve(&self, agent_name: &str) -> Result<Arc<dyn Agent>> {
        let registry = self
            .registry
            .as_ref()
            .ok_or(EngineError::NoRegistryConfigured)?;
        registry
            .get_agent(agent_name)
            .ok_or_else(|| EngineError::AgentNotFound(agent_name.to_string()))
    }

    fn reliability_for(&self, agent_name: &str) -> ReliabilityManager {
        self.reliability
            .entry(agent_name.to_string())
            .or_insert_with(|| {
                ReliabilityManager::new(
                    agent_name,
                    CircuitBreakerConfig {
                        failure_threshold: self.config.circuit_failure_threshold,
                        recovery_timeout: self.config.circuit_recovery_timeout(),
                    },
                    RetryConfig {
                        max_retries: self.config.max_retries,
                        base_delay: self.config.retry_base_delay(),
                        max_delay: self.config.retry_max_delay(),
                        jitter: false,
                        retry_unclassified: self.config.retry_unclassified_errors,
                    },
                )
            })
            .clone()
    }

    /// Failed result for a call that never reached dispatch
    fn reject(&self, ctx: &ExecutionContext, error: EngineError) -> ExecutionResult {
        self.record(ctx, false, Some(error.kind()), 0.0, 0.0);
        ExecutionResult::from_error(&error, 0.0)
    }

    fn record(
        &self,
        ctx: &ExecutionContext,
        success: bool,
        error_kind: Option<ErrorKind>,
        duration_ms: f64,
        queue_wait_ms: f64,
    ) {
        self.monitor.finish_execution(ExecutionRecord {
            run_id: ctx.run_id.clone(),
            request_id: ctx.request_id.clone(),
            user_id: ctx.user_id.clone(),
            agent_name: ctx.agent_name.clone(),
            success,
            error_kind,
            duration_ms,
            queue_wait_ms,
            retry_count: ctx.retry_count,
            finished_at: Utc::now(),
        });
    }

    pub fn get_metrics(&self) -> EngineMetrics {
        EngineMetrics {
            executions: self.monitor.snapshot(),
            available_slots: self.available_slots(),
            max_concurrent_agents: self.config.max_concurrent_agents,
            circuit_breakers: self
                .reliability
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().breaker().status()))
                .collect(),
            extensions: self.extensions.health(),
        }
    }

    pub fn health_status(&self) -> EngineHealth {
        let executions = self.monitor.health_summary();
        let reliability: BTreeMap<String, ReliabilityHealth> = self
            .reliability
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().health_status()))
            .collect();
        let open_circuits: Vec<String> = reliability
            .iter()
            .filter(|(_, health)| health.circuit_breaker.state != CircuitBreakerState::Closed)
            .map(|(name, _)| name.clone())
            .collect();

        let closed = self.is_closed();
        let status = if closed {
            HealthState::Unhealthy
        } else if executions.status == HealthState::Healthy && !open_circuits.is_empty() {
            HealthState::Degraded
        } else {
            executions.status
        };

        EngineHealth {
            status,
            closed,
            executions,
            open_circuits,
            reliability,
            extensions: self.extensions.health(),
        }
    }

    /// Finished runs, oldest first
    pub fn history(&self) -> Vec<ExecutionRecord> {
        self.monitor.history()
    }

    pub fn reliability_health(&self, agent_name: &str) -> Option<ReliabilityHealth> {
        self.reliability
            .get(agent_name)
            .map(|manager| manager.health_status())
    }

    pub fn request_stats(&self, request_id: &str) -> Option<RequestStats> {
        self.monitor.request_stats(request_id)
    }

    /// Keep `request_id`'s counters across runs until it is released
    pub fn retain_request(&self, request_id: &str) {
        self.monitor.retain_request(request_id);
    }

    /// Drop state keyed by `request_id`
    pub fn release_request(&self, request_id: &str) -> Option<RequestStats> {
        let stats = self.monitor.release_request(request_id);
        debug!(request_id = %request_id, "Released request state");
        stats
    }

    /// Stop accepting work and run every extension's cleanup
    ///
    /// Calls still waiting for a global slot fail with `EngineClosed`.
    pub async fn cleanup(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.semaphore.close();

        let failures = self.extensions.cleanup().await;
        if failures > 0 {
            warn!("{} extensions failed to clean up", failures);
        }
        info!("Execution engine shut down");
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::QueueTransport;
    use crate::runtime::registry::InMemoryAgentRegistry;
    use crate::utils::errors::NonRetryableError;
    use async_trait::async_trait;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl Agent for Echo {
        async fn execute(&self, task: Value, _state: &AgentState) -> anyhow::Result<Value> {
            Ok(json!({ "echo": task }))
        }
    }

    struct Rejecting;

    #[async_trait]
    impl Agent for Rejecting {
        async fn execute(&self, _task: Value, _state: &AgentState) -> anyhow::Result<Value> {
            Err(NonRetryableError("invalid task".into()).into())
        }
    }

    struct Panicking;

    #[async_trait]
    impl Agent for Panicking {
        async fn execute(&self, _task: Value, _state: &AgentState) -> anyhow::Result<Value> {
            panic!("agent exploded")
        }
    }

    fn config() -> EngineConfig {
        EngineConfig {
            retry_base_delay_ms: 1,
            retry_max_delay_ms: 2,
            ..Default::default()
        }
    }

    fn registry() -> Arc<dyn AgentRegistry> {
        Arc::new(
            InMemoryAgentRegistry::new()
                .with_agent("echo", Arc::new(Echo))
                .with_agent("rejecting", Arc::new(Rejecting))
                .with_agent("panicking", Arc::new(Panicking)),
        )
    }

    async fn engine(config: EngineConfig) -> ExecutionEngine {
        ExecutionEngine::builder(config)
            .registry(registry())
            .build()
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_success_populates_result() {
        let engine = engine(config()).await;
        let mut ctx = engine.new_context("echo");

        let result = engine.execute("echo", json!("hi"), &mut ctx).await.unwrap();

        assert!(result.success);
        assert_eq!(result.result, Some(json!({"echo": "hi"})));
        assert!(result.error.is_none());
        assert!(result.execution_time_ms >= 0.0);
        assert!(result.metrics.contains_key("queue_wait_ms"));
        assert!(ctx.start_time.is_some());
        assert_eq!(engine.history().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_agent_is_a_failed_result() {
        let engine = engine(EngineConfig {
            enable_fallback: false,
            ..config()
        })
        .await;
        let mut ctx = engine.new_context("ghost");

        let result = engine.execute("ghost", Value::Null, &mut ctx).await.unwrap();

        assert!(!result.success);
        assert_eq!(result.error_kind, Some(ErrorKind::AgentNotFound));
        assert!(ctx.start_time.is_none());
    }

    #[tokio::test]
    async fn test_missing_registry() {
        let engine = ExecutionEngine::builder(config()).build().await.unwrap();
        let mut ctx = engine.new_context("echo");

        let result = engine.execute("echo", Value::Null, &mut ctx).await.unwrap();
        assert_eq!(result.error_kind, Some(ErrorKind::NoRegistry));
    }

    #[tokio::test]
    async fn test_user_context_required() {
        let engine = engine(EngineConfig {
            require_user_context: true,
            ..config()
        })
        .await;

        let mut anonymous = engine.new_context("echo");
        let result = engine.execute("echo", Value::Null, &mut anonymous).await.unwrap();
        assert_eq!(result.error_kind, Some(ErrorKind::PreconditionFailed));

        let mut ctx = engine.new_context("echo").with_user("alice");
        assert!(engine.execute("echo", Value::Null, &mut ctx).await.unwrap().success);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_not_retried() {
        let engine = engine(config()).await;
        let mut ctx = engine.new_context("rejecting");

        let result = engine.execute("rejecting", Value::Null, &mut ctx).await.unwrap();

        assert!(!result.success);
        assert!(result.fallback_used);
        assert_eq!(result.retry_count, 0);
        assert_eq!(result.error_kind, Some(ErrorKind::AgentError));
        assert_eq!(result.error.as_deref(), Some("invalid task"));
    }

    #[tokio::test]
    async fn test_panic_becomes_agent_error() {
        let engine = engine(EngineConfig {
            max_retries: 0,
            ..config()
        })
        .await;
        let mut ctx = engine.new_context("panicking");

        let result = engine.execute("panicking", Value::Null, &mut ctx).await.unwrap();

        assert!(!result.success);
        assert!(result.error.unwrap().contains("agent exploded"));
    }

    #[tokio::test]
    async fn test_hard_fail_returns_original_error() {
        let engine = engine(EngineConfig {
            enable_fallback: false,
            ..config()
        })
        .await;
        let mut ctx = engine.new_context("rejecting");

        let err = engine
            .execute("rejecting", Value::Null, &mut ctx)
            .await
            .unwrap_err();

        assert!(matches!(err, EngineError::Agent(_)));
        assert_eq!(err.to_string(), "invalid task");
        assert_eq!(engine.history().len(), 1);
    }

    #[tokio::test]
    async fn test_engine_transport_used_by_default() {
        let transport = QueueTransport::new(16);
        let engine = ExecutionEngine::builder(config())
            .registry(registry())
            .transport(Arc::new(transport.clone()))
            .extension(Arc::new(crate::extensions::EventEmissionExtension::new()))
            .build()
            .await
            .unwrap();
        let mut ctx = engine.new_context("echo");

        engine.execute("echo", json!(1), &mut ctx).await.unwrap();

        let events = transport.drain();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|e| e.run_id == ctx.run_id));
    }

    #[tokio::test]
    async fn test_closed_engine_rejects() {
        let engine = engine(config()).await;
        engine.cleanup().await;
        engine.cleanup().await;

        let mut ctx = engine.new_context("echo");
        let err = engine.execute("echo", Value::Null, &mut ctx).await.unwrap_err();
        assert!(matches!(err, EngineError::EngineClosed));
        assert_eq!(engine.health_status().status, HealthState::Unhealthy);
    }

    #[tokio::test]
    async fn test_metrics_and_health() {
        let engine = engine(config()).await;
        engine.retain_request("req-1");
        let mut ctx = engine.new_context("echo").with_request("req-1");
        engine.execute("echo", Value::Null, &mut ctx).await.unwrap();

        let metrics = engine.get_metrics();
        assert_eq!(metrics.executions.total_executions, 1);
        assert_eq!(metrics.available_slots, 10);
        assert!(metrics.circuit_breakers.contains_key("echo"));

        let health = engine.health_status();
        assert_eq!(health.status, HealthState::Healthy);
        assert!(health.open_circuits.is_empty());

        assert_eq!(engine.release_request("req-1").unwrap().executions, 1);
        assert!(engine.request_stats("req-1").is_none());
    }

    #[tokio::test]
    async fn test_unscoped_calls_leave_no_request_state() {
        let engine = engine(EngineConfig {
            max_history_size: 10,
            ..config()
        })
        .await;

        for _ in 0..200 {
            let mut ctx = engine.new_context("echo");
            engine.execute("echo", Value::Null, &mut ctx).await.unwrap();
            let mut ctx = engine.new_context("ghost");
            engine.execute("ghost", Value::Null, &mut ctx).await.unwrap();
        }

        assert_eq!(engine.monitor().tracked_requests(), 0);
        assert_eq!(engine.history().len(), 10);
        assert_eq!(engine.get_metrics().executions.total_executions, 400);
    }

    #[tokio::test]
    async fn test_build_rejects_oversized_timeout() {
        let result = ExecutionEngine::builder(EngineConfig {
            agent_execution_timeout: 1e20,
            ..config()
        })
        .registry(registry())
        .build()
        .await;

        assert!(matches!(result, Err(EngineError::ConfigError(_))));
    }
}
