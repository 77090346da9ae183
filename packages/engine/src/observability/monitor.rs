// packages/engine/src/observability/monitor.rs
//! Execution monitoring
//!
//! Tracks per-agent performance, in-flight runs, per-request counters and a
//! bounded run history. When metrics publishing is on, every observation is
//! also forwarded to the `metrics` facade.
//!
//! A request's counters are dropped once its last run finishes, unless the
//! request was retained with [`ExecutionMonitor::retain_request`].

use crate::utils::errors::ErrorKind;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Error rate above which the engine reports itself degraded
const DEGRADED_ERROR_RATE: f64 = 0.1;

/// Error rate above which the engine reports itself unhealthy
const UNHEALTHY_ERROR_RATE: f64 = 0.5;

/// Rolling performance figures for one agent
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceStats {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub timeouts: u64,

    pub avg_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,

    /// Percentiles over the most recent samples
    pub p50_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,

    pub error_rate: f64,
    pub last_execution: Option<DateTime<Utc>>,

    #[serde(skip)]
    samples: VecDeque<f64>,
    #[serde(skip)]
    window: usize,
    #[serde(skip)]
    total_duration_ms: f64,
}

impl PerformanceStats {
    fn new(window: usize) -> Self {
        Self {
            total_executions: 0,
            successful_executions: 0,
            failed_executions: 0,
            timeouts: 0,
            avg_duration_ms: 0.0,
            min_duration_ms: 0.0,
            max_duration_ms: 0.0,
            p50_ms: 0.0,
            p95_ms: 0.0,
            p99_ms: 0.0,
            error_rate: 0.0,
            last_execution: None,
            samples: VecDeque::with_capacity(window),
            window: window.max(1),
            total_duration_ms: 0.0,
        }
    }

    fn record(&mut self, duration_ms: f64, success: bool, timed_out: bool) {
        self.total_executions += 1;
        if success {
            self.successful_executions += 1;
        } else {
            self.failed_executions += 1;
        }
        if timed_out {
            self.timeouts += 1;
        }

        if self.total_executions == 1 {
            self.min_duration_ms = duration_ms;
            self.max_duration_ms = duration_ms;
        } else {
            self.min_duration_ms = self.min_duration_ms.min(duration_ms);
            self.max_duration_ms = self.max_duration_ms.max(duration_ms);
        }
        self.total_duration_ms += duration_ms;
        self.avg_duration_ms = self.total_duration_ms / self.total_executions as f64;
        self.error_rate = self.failed_executions as f64 / self.total_executions as f64;
        self.last_execution = Some(Utc::now());

        if self.samples.len() == self.window {
            self.samples.pop_front();
        }
        self.samples.push_back(duration_ms);

        let mut sorted: Vec<f64> = self.samples.iter().copied().collect();
        sorted.sort_by(|a, b| a.total_cmp(b));
        self.p50_ms = percentile(&sorted, 50.0);
        self.p95_ms = percentile(&sorted, 95.0);
        self.p99_ms = percentile(&sorted, 99.0);
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

/// Nearest-rank percentile of an ascending slice
fn percentile(sorted: &[f64], pct: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = ((pct / 100.0) * sorted.len() as f64).ceil() as usize;
    sorted[rank.clamp(1, sorted.len()) - 1]
}

/// Counters for one request scope
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestStats {
    pub executions: u64,
    pub successful: u64,
    pub failed: u64,
    pub active: u64,
    pub total_duration_ms: f64,
}

/// One finished run
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub run_id: String,
    pub request_id: String,
    pub user_id: Option<String>,
    pub agent_name: String,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub duration_ms: f64,
    pub queue_wait_ms: f64,
    pub retry_count: u32,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
struct ActiveExecution {
    agent_name: String,
    request_id: String,
    started: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSummary {
    pub status: HealthState,
    pub error_rate: f64,
    pub total_executions: u64,
    pub active_executions: usize,

    /// Agents whose own error rate is above the degraded threshold
    pub degraded_agents: Vec<String>,
}

/// Point-in-time aggregate view
#[derive(Debug, Clone, Serialize)]
pub struct MonitorSnapshot {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub success_rate: f64,
    pub avg_duration_ms: f64,
    pub min_duration_ms: f64,
    pub max_duration_ms: f64,
    pub avg_queue_wait_ms: f64,
    pub active_executions: usize,
    pub queued_executions: usize,
    pub agents: BTreeMap<String, PerformanceStats>,
}

pub struct ExecutionMonitor {
    window: usize,
    history_limit: usize,
    publish_metrics: bool,

    agents: DashMap<String, PerformanceStats>,
    active: DashMap<String, ActiveExecution>,
    requests: DashMap<String, RequestStats>,
    retained: DashSet<String>,
    history: Mutex<VecDeque<ExecutionRecord>>,

    queued: AtomicUsize,
    queue_waits: AtomicU64,
    queue_wait_us: AtomicU64,
}

impl ExecutionMonitor {
    /// `max_history_size` bounds both the sample window and the run history
    pub fn new(max_history_size: usize, publish_metrics: bool) -> Self {
        let limit = max_history_size.max(1);
        Self {
            window: limit,
            history_limit: limit,
            publish_metrics,
            agents: DashMap::new(),
            active: DashMap::new(),
            requests: DashMap::new(),
            retained: DashSet::new(),
            history: Mutex::new(VecDeque::with_capacity(limit)),
            queued: AtomicUsize::new(0),
            queue_waits: AtomicU64::new(0),
            queue_wait_us: AtomicU64::new(0),
        }
    }

    /// A call started waiting for a global slot
    pub fn record_queued(&self) {
        let queued = self.queued.fetch_add(1, Ordering::Relaxed) + 1;
        if self.publish_metrics {
            metrics::gauge!("agent_executions_queued").set(queued as f64);
        }
    }

    /// A waiting call obtained (or gave up on) its slot after `wait`
    pub fn record_dequeued(&self, wait: Duration) {
        let queued = self
            .queued
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |q| Some(q.saturating_sub(1)))
            .map(|previous| previous.saturating_sub(1))
            .unwrap_or(0);
        self.queue_waits.fetch_add(1, Ordering::Relaxed);
        self.queue_wait_us
            .fetch_add(wait.as_micros() as u64, Ordering::Relaxed);

        if self.publish_metrics {
            metrics::gauge!("agent_executions_queued").set(queued as f64);
            metrics::histogram!("agent_queue_wait_ms").record(wait.as_secs_f64() * 1000.0);
        }
    }

    pub fn start_execution(&self, run_id: &str, agent_name: &str, request_id: &str) {
        self.active.insert(
            run_id.to_string(),
            ActiveExecution {
                agent_name: agent_name.to_string(),
                request_id: request_id.to_string(),
                started: Instant::now(),
            },
        );
        self.requests
            .entry(request_id.to_string())
            .or_default()
            .active += 1;

        if self.publish_metrics {
            metrics::gauge!("agent_executions_active").set(self.active.len() as f64);
        }
    }

    /// Record a finished run; also clears its in-flight entry
    pub fn finish_execution(&self, record: ExecutionRecord) {
        if let Some((_, active)) = self.active.remove(&record.run_id) {
            debug!(
                run_id = %record.run_id,
                agent = %active.agent_name,
                "Run finished after {:?} in flight", active.started.elapsed()
            );
            if let Some(mut stats) = self.requests.get_mut(&active.request_id) {
                stats.active = stats.active.saturating_sub(1);
            }
        }

        let timed_out = record.error_kind == Some(ErrorKind::Timeout);
        self.agents
            .entry(record.agent_name.clone())
            .or_insert_with(|| PerformanceStats::new(self.window))
            .record(record.duration_ms, record.success, timed_out);

        {
            let mut request = self.requests.entry(record.request_id.clone()).or_default();
            request.executions += 1;
            if record.success {
                request.successful += 1;
            } else {
                request.failed += 1;
            }
            request.total_duration_ms += record.duration_ms;
        }
        if !self.retained.contains(&record.request_id) {
            self.requests
                .remove_if(&record.request_id, |_, stats| stats.active == 0);
        }

        if self.publish_metrics {
            let status = if record.success { "success" } else { "failure" };
            metrics::counter!(
                "agent_executions_total",
                "agent" => record.agent_name.clone(),
                "status" => status
            )
            .increment(1);
            metrics::histogram!("agent_execution_duration_ms", "agent" => record.agent_name.clone())
                .record(record.duration_ms);
            if let Some(kind) = record.error_kind {
                metrics::counter!("agent_execution_errors_total", "kind" => kind.as_str())
                    .increment(1);
            }
            metrics::gauge!("agent_executions_active").set(self.active.len() as f64);
        }

        let mut history = self.history.lock();
        if history.len() == self.history_limit {
            history.pop_front();
        }
        history.push_back(record);
    }

    pub fn agent_stats(&self, agent_name: &str) -> Option<PerformanceStats> {
        self.agents.get(agent_name).map(|stats| stats.clone())
    }

    pub fn request_stats(&self, request_id: &str) -> Option<RequestStats> {
        self.requests.get(request_id).map(|stats| stats.clone())
    }

    /// Keep a request's counters after its runs finish, until released
    pub fn retain_request(&self, request_id: &str) {
        self.retained.insert(request_id.to_string());
    }

    /// Forget a request's counters, returning them
    pub fn release_request(&self, request_id: &str) -> Option<RequestStats> {
        self.retained.remove(request_id);
        self.requests.remove(request_id).map(|(_, stats)| stats)
    }

    /// Oldest first
    pub fn history(&self) -> Vec<ExecutionRecord> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn queued_count(&self) -> usize {
        self.queued.load(Ordering::Relaxed)
    }

    pub fn tracked_requests(&self) -> usize {
        self.requests.len()
    }

    pub fn snapshot(&self) -> MonitorSnapshot {
        let agents: BTreeMap<String, PerformanceStats> = self
            .agents
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let total: u64 = agents.values().map(|s| s.total_executions).sum();
        let successful: u64 = agents.values().map(|s| s.successful_executions).sum();
        let total_time: f64 = agents.values().map(|s| s.total_duration_ms).sum();
        let seen = agents.values().filter(|s| s.total_executions > 0);
        let min = seen.clone().map(|s| s.min_duration_ms).fold(f64::INFINITY, f64::min);
        let max = seen.map(|s| s.max_duration_ms).fold(0.0, f64::max);

        let waits = self.queue_waits.load(Ordering::Relaxed);
        let wait_us = self.queue_wait_us.load(Ordering::Relaxed);

        MonitorSnapshot {
            total_executions: total,
            successful_executions: successful,
            failed_executions: total - successful,
            success_rate: if total == 0 {
                1.0
            } else {
                successful as f64 / total as f64
            },
            avg_duration_ms: if total == 0 { 0.0 } else { total_time / total as f64 },
            min_duration_ms: if min.is_finite() { min } else { 0.0 },
            max_duration_ms: max,
            avg_queue_wait_ms: if waits == 0 {
                0.0
            } else {
                wait_us as f64 / waits as f64 / 1000.0
            },
            active_executions: self.active_count(),
            queued_executions: self.queued_count(),
            agents,
        }
    }

    pub fn health_summary(&self) -> HealthSummary {
        let snapshot = self.snapshot();
        let error_rate = 1.0 - snapshot.success_rate;

        let status = if error_rate > UNHEALTHY_ERROR_RATE {
            HealthState::Unhealthy
        } else if error_rate > DEGRADED_ERROR_RATE {
            HealthState::Degraded
        } else {
            HealthState::Healthy
        };

        let degraded_agents = snapshot
            .agents
            .iter()
            .filter(|(_, stats)| stats.error_rate > DEGRADED_ERROR_RATE)
            .map(|(name, _)| name.clone())
            .collect();

        HealthSummary {
            status,
            error_rate,
            total_executions: snapshot.total_executions,
            active_executions: snapshot.active_executions,
            degraded_agents,
        }
    }
}
