// packages/engine/benches/execution_bench.rs
//! Per-call engine overhead with a no-op agent

use async_trait::async_trait;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use sentra_lab_orchestrator::events::QueueTransport;
use sentra_lab_orchestrator::extensions::{EventEmissionExtension, UserConcurrencyExtension};
use sentra_lab_orchestrator::reliability::{RetryConfig, RetryPolicy};
use sentra_lab_orchestrator::{
    Agent, AgentState, EngineConfig, ExecutionEngine, InMemoryAgentRegistry,
};
use serde_json::{json, Value};
use std::sync::Arc;

struct Noop;

#[async_trait]
impl Agent for Noop {
    async fn execute(&self, task: Value, _state: &AgentState) -> anyhow::Result<Value> {
        Ok(task)
    }
}

fn build_engine(runtime: &tokio::runtime::Runtime, with_extensions: bool) -> Arc<ExecutionEngine> {
    runtime.block_on(async {
        let transport = QueueTransport::new(1 << 16);
        let mut builder = ExecutionEngine::builder(EngineConfig {
            max_concurrent_agents: 64,
            enable_metrics: false,
            ..Default::default()
        })
        .registry(Arc::new(InMemoryAgentRegistry::new().with_agent("noop", Arc::new(Noop))))
        .transport(Arc::new(transport));

        if with_extensions {
            builder = builder
                .extension(Arc::new(UserConcurrencyExtension::new(64)))
                .extension(Arc::new(EventEmissionExtension::new()));
        }

        Arc::new(builder.build().await.expect("engine"))
    })
}

fn bench_execute(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("runtime");
    let mut group = c.benchmark_group("execute");

    for with_extensions in [false, true] {
        let engine = build_engine(&runtime, with_extensions);
        let label = if with_extensions { "extensions" } else { "bare" };

        group.bench_with_input(BenchmarkId::from_parameter(label), &engine, |b, engine| {
            b.to_async(&runtime).iter(|| async {
                let mut ctx = engine.new_context("noop").with_user("bench");
                engine
                    .execute("noop", json!({"n": 1}), &mut ctx)
                    .await
                    .expect("execute")
            });
        });
    }

    group.finish();
}

fn bench_backoff(c: &mut Criterion) {
    let policy = RetryPolicy::new(RetryConfig {
        jitter: true,
        ..Default::default()
    });

    c.bench_function("retry_delay_with_jitter", |b| {
        b.iter(|| {
            (1..=10)
                .map(|attempt| policy.delay_for_attempt(attempt))
                .max()
        })
    });
}

criterion_group!(benches, bench_execute, bench_backoff);
criterion_main!(benches);
