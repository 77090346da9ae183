// packages/engine/src/extensions/domain_optimization.rs
//! Domain-specific hints and result caching
//!
//! For configured agents, `pre_execute` attaches `optimization_hints` and a
//! `cache_key` derived from the agent name and task. Successful results are
//! cached by that key; a later run with the same key gets the cached output
//! back while it is still fresh.

use crate::runtime::context::{ExecutionContext, ExecutionResult};
use crate::runtime::extension::ExecutionExtension;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashSet;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

pub const CACHE_KEY: &str = "cache_key";
pub const OPTIMIZATION_HINTS: &str = "optimization_hints";

#[derive(Debug, Clone)]
pub struct DomainOptimizationConfig {
    /// Agents the extension applies to
    pub agents: Vec<String>,
    pub cache_ttl: Duration,
    pub cache_capacity: usize,

    /// Merged into every hint object
    pub hints: Value,
}

impl Default for DomainOptimizationConfig {
    fn default() -> Self {
        Self {
            agents: Vec::new(),
            cache_ttl: Duration::from_secs(300),
            cache_capacity: 1024,
            hints: json!({ "batch_mode": true }),
        }
    }
}

struct CachedResult {
    value: Value,
    stored_at: Instant,
}

pub struct DomainOptimizationExtension {
    agents: HashSet<String>,
    config: DomainOptimizationConfig,
    cache: DashMap<String, CachedResult>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl DomainOptimizationExtension {
    pub fn new(config: DomainOptimizationConfig) -> Self {
        Self {
            agents: config.agents.iter().cloned().collect(),
            config,
            cache: DashMap::new(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn applies_to(&self, agent_name: &str) -> bool {
        self.agents.contains(agent_name)
    }

    /// Stable key for `(agent, task)`
    pub fn cache_key(agent_name: &str, task: &Value) -> String {
        let mut hasher = DefaultHasher::new();
        agent_name.hash(&mut hasher);
        task.to_string().hash(&mut hasher);
        format!("{}:{:016x}", agent_name, hasher.finish())
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        let fresh = self
            .cache
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.config.cache_ttl)
            .map(|entry| entry.value.clone());

        if fresh.is_none() {
            self.cache
                .remove_if(key, |_, entry| entry.stored_at.elapsed() >= self.config.cache_ttl);
        }
        fresh
    }

    fn store(&self, key: String, value: Value) {
        if self.cache.len() >= self.config.cache_capacity && !self.cache.contains_key(&key) {
            let oldest = self
                .cache
                .iter()
                .min_by_key(|entry| entry.value().stored_at)
                .map(|entry| entry.key().clone());
            if let Some(oldest) = oldest {
                self.cache.remove(&oldest);
            }
        }
        self.cache.insert(
            key,
            CachedResult {
                value,
                stored_at: Instant::now(),
            },
        );
    }
}

#[async_trait]
impl ExecutionExtension for DomainOptimizationExtension {
    fn name(&self) -> &str {
        "domain_optimization"
    }

    async fn pre_execute(&self, ctx: &mut ExecutionContext) -> anyhow::Result<()> {
        if !self.applies_to(&ctx.agent_name) {
            return Ok(());
        }

        let mut hints = json!({ "domain": ctx.agent_name });
        if let (Some(hints), Some(extra)) = (hints.as_object_mut(), self.config.hints.as_object()) {
            hints.extend(extra.iter().map(|(k, v)| (k.clone(), v.clone())));
        }

        let key = Self::cache_key(&ctx.agent_name, &ctx.task);
        debug!(run_id = %ctx.run_id, cache_key = %key, "Applied domain optimization hints");

        ctx.metadata.insert(OPTIMIZATION_HINTS.to_string(), hints);
        ctx.metadata.insert(CACHE_KEY.to_string(), Value::String(key));
        Ok(())
    }

    async fn post_execute(
        &self,
        result: ExecutionResult,
        ctx: &mut ExecutionContext,
    ) -> anyhow::Result<ExecutionResult> {
        let Some(key) = ctx.metadata.get(CACHE_KEY).and_then(Value::as_str) else {
            return Ok(result);
        };
        if !result.success {
            return Ok(result);
        }

        if let Some(cached) = self.lookup(key) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            let mut hit = result;
            hit.result = Some(cached);
            return Ok(hit.with_metric("cache_hit", true));
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        if let Some(value) = result.result.clone() {
            self.store(key.to_string(), value);
        }
        Ok(result.with_metric("cache_hit", false))
    }

    /// Drop expired cache entries
    async fn cleanup(&self) -> anyhow::Result<()> {
        let ttl = self.config.cache_ttl;
        self.cache.retain(|_, entry| entry.stored_at.elapsed() < ttl);
        Ok(())
    }

    fn health(&self) -> Value {
        json!({
            "status": "healthy",
            "agents": self.config.agents,
            "cache_entries": self.cache.len(),
            "cache_hits": self.hits.load(Ordering::Relaxed),
            "cache_misses": self.misses.load(Ordering::Relaxed),
        })
    }
}
