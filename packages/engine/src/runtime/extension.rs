// packages/engine/src/runtime/extension.rs
//! Execution extensions
//!
//! Extensions wrap every agent call with five hooks. All hooks default to
//! no-ops, so an extension only implements what it needs.
//!
//! # Ordering
//!
//! Every phase runs extensions in registration order. Later extensions may
//! rely on earlier ones having run.
//!
//! # Failure policy
//!
//! - `initialize`: fails engine construction
//! - `pre_execute` / `post_execute`: abort the call with an extension failure
//! - `on_error` / `cleanup`: logged and swallowed

use crate::runtime::context::{ExecutionContext, ExecutionFailure, ExecutionResult};
use crate::utils::config::EngineConfig;
use crate::utils::errors::{EngineError, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Hook set composed around every agent call
#[async_trait]
pub trait ExecutionExtension: Send + Sync {
    fn name(&self) -> &str;

    async fn initialize(&self, _config: &EngineConfig) -> anyhow::Result<()> {
        Ok(())
    }

    async fn pre_execute(&self, _ctx: &mut ExecutionContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// May replace the result
    async fn post_execute(
        &self,
        result: ExecutionResult,
        _ctx: &mut ExecutionContext,
    ) -> anyhow::Result<ExecutionResult> {
        Ok(result)
    }

    async fn on_error(
        &self,
        _failure: &ExecutionFailure,
        _ctx: &mut ExecutionContext,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    async fn cleanup(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn health(&self) -> Value {
        json!({ "status": "healthy" })
    }
}

/// Ordered set of extensions
#[derive(Clone, Default)]
pub struct ExtensionPipeline {
    extensions: Vec<Arc<dyn ExecutionExtension>>,
}

impl ExtensionPipeline {
    pub fn new(extensions: Vec<Arc<dyn ExecutionExtension>>) -> Self {
        Self { extensions }
    }

    pub fn push(&mut self, extension: Arc<dyn ExecutionExtension>) {
        self.extensions.push(extension);
    }

    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.extensions.iter().map(|e| e.name().to_string()).collect()
    }

    pub async fn initialize(&self, config: &EngineConfig) -> Result<()> {
        for extension in &self.extensions {
            debug!("Initializing extension {}", extension.name());
            extension.initialize(config).await.map_err(|e| {
                EngineError::ConfigError(format!(
                    "Extension '{}' failed to initialize: {}",
                    extension.name(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Run `pre_execute` hooks, stopping at the first failure
    pub async fn pre_execute(&self, ctx: &mut ExecutionContext) -> Result<()> {
        for extension in &self.extensions {
            if let Err(e) = extension.pre_execute(ctx).await {
                error!(
                    run_id = %ctx.run_id,
                    "Extension {} pre_execute failed: {}", extension.name(), e
                );
                return Err(EngineError::ExtensionFailure {
                    extension: extension.name().to_string(),
                    hook: "pre_execute",
                    message: e.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Thread the result through every `post_execute` hook
    pub async fn post_execute(
        &self,
        mut result: ExecutionResult,
        ctx: &mut ExecutionContext,
    ) -> Result<ExecutionResult> {
        for extension in &self.extensions {
            result = match extension.post_execute(result, ctx).await {
                Ok(result) => result,
                Err(e) => {
                    error!(
                        run_id = %ctx.run_id,
                        "Extension {} post_execute failed: {}", extension.name(), e
                    );
                    return Err(EngineError::ExtensionFailure {
                        extension: extension.name().to_string(),
                        hook: "post_execute",
                        message: e.to_string(),
                    });
                }
            };
        }
        Ok(result)
    }

    /// Run every `on_error` hook; failures are logged and skipped
    pub async fn on_error(&self, failure: &ExecutionFailure, ctx: &mut ExecutionContext) {
        for extension in &self.extensions {
            if let Err(e) = extension.on_error(failure, ctx).await {
                warn!(
                    run_id = %ctx.run_id,
                    "Extension {} on_error failed: {}", extension.name(), e
                );
            }
        }
    }

    /// Run every `cleanup` hook; failures are logged and skipped
    pub async fn cleanup(&self) -> usize {
        let mut failures = 0;
        for extension in &self.extensions {
            if let Err(e) = extension.cleanup().await {
                failures += 1;
                warn!("Extension {} cleanup failed: {}", extension.name(), e);
            }
        }
        failures
    }

    pub fn health(&self) -> Map<String, Value> {
        self.extensions
            .iter()
            .map(|e| (e.name().to_string(), e.health()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::errors::ErrorKind;
    use parking_lot::Mutex;

    /// Records every hook call into a shared journal
    struct Journal {
        name: String,
        log: Arc<Mutex<Vec<String>>>,
        fail_pre: bool,
        fail_cleanup: bool,
    }

    impl Journal {
        fn new(name: &str, log: &Arc<Mutex<Vec<String>>>) -> Self {
            Self {
                name: name.to_string(),
                log: Arc::clone(log),
                fail_pre: false,
                fail_cleanup: false,
            }
        }

        fn record(&self, hook: &str) {
            self.log.lock().push(format!("{}:{}", self.name, hook));
        }
    }

    #[async_trait]
    impl ExecutionExtension for Journal {
        fn name(&self) -> &str {
            &self.name
        }

        async fn pre_execute(&self, ctx: &mut ExecutionContext) -> anyhow::Result<()> {
            self.record("pre");
            if self.fail_pre {
                anyhow::bail!("pre hook broke");
            }
            ctx.metadata.insert(self.name.clone(), Value::Bool(true));
            Ok(())
        }

        async fn post_execute(
            &self,
            result: ExecutionResult,
            _ctx: &mut ExecutionContext,
        ) -> anyhow::Result<ExecutionResult> {
            self.record("post");
            Ok(result.with_metric(self.name.clone(), true))
        }

        async fn on_error(
            &self,
            _failure: &ExecutionFailure,
            _ctx: &mut ExecutionContext,
        ) -> anyhow::Result<()> {
            self.record("error");
            anyhow::bail!("on_error is allowed to fail")
        }

        async fn cleanup(&self) -> anyhow::Result<()> {
            self.record("cleanup");
            if self.fail_cleanup {
                anyhow::bail!("cleanup broke");
            }
            Ok(())
        }
    }

    fn pipeline_of(extensions: Vec<Journal>) -> ExtensionPipeline {
        ExtensionPipeline::new(
            extensions
                .into_iter()
                .map(|e| Arc::new(e) as Arc<dyn ExecutionExtension>)
                .collect(),
        )
    }

    #[tokio::test]
    async fn test_hooks_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = pipeline_of(vec![Journal::new("a", &log), Journal::new("b", &log)]);
        let mut ctx = ExecutionContext::new("echo");

        pipeline.pre_execute(&mut ctx).await.unwrap();
        let result = pipeline
            .post_execute(ExecutionResult::success(Value::Null, 1.0), &mut ctx)
            .await
            .unwrap();

        assert_eq!(*log.lock(), vec!["a:pre", "b:pre", "a:post", "b:post"]);
        assert!(ctx.metadata.contains_key("a") && ctx.metadata.contains_key("b"));
        assert_eq!(result.metrics.len(), 2);
    }

    #[tokio::test]
    async fn test_pre_execute_failure_stops_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut broken = Journal::new("a", &log);
        broken.fail_pre = true;
        let pipeline = pipeline_of(vec![broken, Journal::new("b", &log)]);
        let mut ctx = ExecutionContext::new("echo");

        let err = pipeline.pre_execute(&mut ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExtensionFailure);
        assert!(err.to_string().contains("pre hook broke"));
        assert_eq!(*log.lock(), vec!["a:pre"]);
    }

    #[tokio::test]
    async fn test_on_error_and_cleanup_failures_are_swallowed() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut broken = Journal::new("a", &log);
        broken.fail_cleanup = true;
        let pipeline = pipeline_of(vec![broken, Journal::new("b", &log)]);
        let mut ctx = ExecutionContext::new("echo");

        let failure = ExecutionFailure::new(ErrorKind::AgentError, "x");
        pipeline.on_error(&failure, &mut ctx).await;
        let failures = pipeline.cleanup().await;

        assert_eq!(failures, 1);
        assert_eq!(
            *log.lock(),
            vec!["a:error", "b:error", "a:cleanup", "b:cleanup"]
        );
    }

    #[test]
    fn test_health_keyed_by_name() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = pipeline_of(vec![Journal::new("a", &log)]);
        let health = pipeline.health();
        assert_eq!(health["a"]["status"], "healthy");
        assert_eq!(pipeline.names(), vec!["a".to_string()]);
    }
}
