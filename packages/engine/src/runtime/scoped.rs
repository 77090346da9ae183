// packages/engine/src/runtime/scoped.rs
//! Request-scoped view of a shared engine
//!
//! A [`RequestScopedExecutionEngine`] pins every call to one request id
//! (and optionally one user). Engine-owned state is keyed by user and
//! request, so scopes sharing an engine never see each other's permits or
//! counters. Closing a scope releases its request state; the engine itself
//! keeps running.

use crate::observability::monitor::RequestStats;
use crate::runtime::context::{ExecutionContext, ExecutionResult};
use crate::runtime::engine::ExecutionEngine;
use crate::utils::errors::{EngineError, Result};
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

pub struct RequestScopedExecutionEngine {
    engine: Arc<ExecutionEngine>,
    request_id: String,
    user_id: Option<String>,
    closed: AtomicBool,
}

impl RequestScopedExecutionEngine {
    pub fn new(
        engine: Arc<ExecutionEngine>,
        request_id: impl Into<String>,
        user_id: Option<String>,
    ) -> Self {
        let request_id = request_id.into();
        engine.retain_request(&request_id);
        debug!(request_id = %request_id, "Opened request scope");
        Self {
            engine,
            request_id,
            user_id,
            closed: AtomicBool::new(false),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Context already carrying this scope's request and user
    pub fn new_context(&self, agent_name: impl Into<String>) -> ExecutionContext {
        let mut ctx = self.engine.new_context(agent_name);
        self.scope(&mut ctx);
        ctx
    }

    pub async fn execute(
        &self,
        agent_name: &str,
        task: Value,
        ctx: &mut ExecutionContext,
    ) -> Result<ExecutionResult> {
        if self.is_closed() {
            return Err(EngineError::EngineClosed);
        }
        self.scope(ctx);
        self.engine.execute(agent_name, task, ctx).await
    }

    fn scope(&self, ctx: &mut ExecutionContext) {
        ctx.request_id = self.request_id.clone();
        if ctx.user_id.is_none() {
            ctx.user_id = self.user_id.clone();
        }
    }

    /// Counters for this request so far
    pub fn stats(&self) -> RequestStats {
        self.engine
            .request_stats(&self.request_id)
            .unwrap_or_default()
    }

    /// Close the scope; later calls fail with `EngineClosed`
    ///
    /// Returns the request's final counters the first time it is called.
    pub fn close(&self) -> Option<RequestStats> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return None;
        }
        let stats = self.engine.release_request(&self.request_id);
        debug!(request_id = %self.request_id, "Closed request scope");
        Some(stats.unwrap_or_default())
    }
}

impl Drop for RequestScopedExecutionEngine {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for RequestScopedExecutionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScopedExecutionEngine")
            .field("request_id", &self.request_id)
            .field("user_id", &self.user_id)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::registry::{Agent, AgentState, InMemoryAgentRegistry};
    use crate::utils::config::EngineConfig;
    use async_trait::async_trait;
    use serde_json::json;

    struct WhoAmI;

    #[async_trait]
    impl Agent for WhoAmI {
        async fn execute(&self, _task: Value, state: &AgentState) -> anyhow::Result<Value> {
            Ok(json!({ "user": state.user_id, "request": state.request_id }))
        }
    }

    async fn shared_engine() -> Arc<ExecutionEngine> {
        let registry = InMemoryAgentRegistry::new().with_agent("whoami", Arc::new(WhoAmI));
        Arc::new(
            ExecutionEngine::builder(EngineConfig::default())
                .registry(Arc::new(registry))
                .build()
                .await
                .unwrap(),
        )
    }

    #[tokio::test]
    async fn test_injects_request_and_user() {
        let engine = shared_engine().await;
        let scope = RequestScopedExecutionEngine::new(engine, "req-7", Some("alice".into()));

        let mut ctx = ExecutionContext::new("whoami");
        let result = scope.execute("whoami", Value::Null, &mut ctx).await.unwrap();

        assert_eq!(result.result, Some(json!({"user": "alice", "request": "req-7"})));
        assert_eq!(scope.stats().executions, 1);

        // An explicit user on the context wins
        let mut ctx = scope.new_context("whoami").with_user("bob");
        let result = scope.execute("whoami", Value::Null, &mut ctx).await.unwrap();
        assert_eq!(result.result.unwrap()["user"], json!("bob"));
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let engine = shared_engine().await;
        let scope = RequestScopedExecutionEngine::new(Arc::clone(&engine), "req-1", None);

        let mut ctx = scope.new_context("whoami");
        scope.execute("whoami", Value::Null, &mut ctx).await.unwrap();

        assert_eq!(scope.close().unwrap().executions, 1);
        assert!(scope.close().is_none());
        assert!(engine.request_stats("req-1").is_none());

        let err = scope
            .execute("whoami", Value::Null, &mut scope.new_context("whoami"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::EngineClosed));
        assert!(!engine.is_closed());
    }

    #[tokio::test]
    async fn test_drop_releases_request_state() {
        let engine = shared_engine().await;
        {
            let scope = RequestScopedExecutionEngine::new(Arc::clone(&engine), "req-2", None);
            let mut ctx = scope.new_context("whoami");
            scope.execute("whoami", Value::Null, &mut ctx).await.unwrap();
            assert!(engine.request_stats("req-2").is_some());
        }
        assert!(engine.request_stats("req-2").is_none());
    }
}
