// packages/engine/src/extensions/event_emission.rs
//! Lifecycle events for connected clients
//!
//! Sends `agent_started`, `agent_completed` and `agent_error` through the
//! adapter the engine bound to the context. Never fails a run.

use crate::runtime::context::{ExecutionContext, ExecutionFailure, ExecutionResult};
use crate::runtime::extension::ExecutionExtension;
use crate::utils::config::EngineConfig;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

pub struct EventEmissionExtension {
    enabled: AtomicBool,
    emitted: AtomicU64,
}

impl Default for EventEmissionExtension {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmissionExtension {
    pub fn new() -> Self {
        Self {
            enabled: AtomicBool::new(true),
            emitted: AtomicU64::new(0),
        }
    }

    fn enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    fn count(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }
}

#[async_trait]
impl ExecutionExtension for EventEmissionExtension {
    fn name(&self) -> &str {
        "event_emission"
    }

    async fn initialize(&self, config: &EngineConfig) -> anyhow::Result<()> {
        self.enabled
            .store(config.enable_websocket_events, Ordering::Relaxed);
        if !config.enable_websocket_events {
            debug!("Event emission registered but disabled by configuration");
        }
        Ok(())
    }

    async fn pre_execute(&self, ctx: &mut ExecutionContext) -> anyhow::Result<()> {
        if self.enabled() {
            let message = format!("Starting {}", ctx.agent_name);
            ctx.events().agent_started(&message).await;
            self.count();
        }
        Ok(())
    }

    async fn post_execute(
        &self,
        result: ExecutionResult,
        ctx: &mut ExecutionContext,
    ) -> anyhow::Result<ExecutionResult> {
        if !self.enabled() {
            return Ok(result);
        }

        if result.success {
            let output = result.result.clone().unwrap_or(Value::Null);
            ctx.events()
                .agent_completed(output, Some(result.execution_time_ms))
                .await;
        } else {
            // A post hook earlier in the chain turned the run into a failure
            let kind = result.error_kind.map_or("agent_error", |k| k.as_str());
            ctx.events()
                .agent_error(result.error.as_deref().unwrap_or("unknown error"), kind, None)
                .await;
        }
        self.count();
        Ok(result)
    }

    async fn on_error(
        &self,
        failure: &ExecutionFailure,
        ctx: &mut ExecutionContext,
    ) -> anyhow::Result<()> {
        if self.enabled() {
            let context = json!({ "retry_count": ctx.retry_count });
            ctx.events()
                .agent_error(&failure.message, failure.kind.as_str(), Some(context))
                .await;
            self.count();
        }
        Ok(())
    }

    fn health(&self) -> Value {
        json!({
            "status": "healthy",
            "enabled": self.enabled(),
            "events_emitted": self.emitted.load(Ordering::Relaxed),
        })
    }
}
