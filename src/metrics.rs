// Pipeline metrics module
//
// Lightweight counters for monitoring ingestion throughput and worker churn

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Pipeline performance metrics
///
/// Uses atomic operations so the pool, the coordinator and any reader can share one
/// instance behind an `Arc` without locks. Logged on shutdown for performance analysis.
#[derive(Debug)]
pub struct PipelineMetrics {
    /// Tasks accepted by the worker pool
    pub tasks_submitted: AtomicUsize,

    /// Current-generation outcomes merged into the record set
    pub outcomes_merged: AtomicUsize,

    /// Outcomes that carried a failure reason
    pub parse_failures: AtomicUsize,

    /// Outcomes discarded because they belonged to a retired worker or an old generation
    pub stale_outcomes: AtomicUsize,

    /// Worker threads started
    pub workers_spawned: AtomicUsize,

    /// Workers retired after a task (recycle policy or parser panic)
    pub workers_recycled: AtomicUsize,

    /// Workers that died before signalling readiness
    pub worker_init_failures: AtomicUsize,

    /// Cumulative time spent parsing, in milliseconds
    pub total_parse_time_ms: AtomicU64,

    /// Number of state updates performed
    pub state_updates: AtomicU64,

    /// Number of state broadcasts sent
    pub state_broadcasts: AtomicU64,

    /// Pipeline creation time
    start_time: Instant,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            tasks_submitted: AtomicUsize::new(0),
            outcomes_merged: AtomicUsize::new(0),
            parse_failures: AtomicUsize::new(0),
            stale_outcomes: AtomicUsize::new(0),
            workers_spawned: AtomicUsize::new(0),
            workers_recycled: AtomicUsize::new(0),
            worker_init_failures: AtomicUsize::new(0),
            total_parse_time_ms: AtomicU64::new(0),
            state_updates: AtomicU64::new(0),
            state_broadcasts: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn record_task_submitted(&self) {
        self.tasks_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_outcome_merged(&self, failed: bool) {
        self.outcomes_merged.fetch_add(1, Ordering::Relaxed);
        if failed {
            self.parse_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_stale_outcome(&self) {
        self.stale_outcomes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_spawned(&self) {
        self.workers_spawned.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_recycled(&self) {
        self.workers_recycled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_worker_init_failure(&self) {
        self.worker_init_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_parse_time(&self, duration: Duration) {
        self.total_parse_time_ms
            .fetch_add(duration.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_state_update(&self) {
        self.state_updates.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_state_broadcast(&self) {
        self.state_broadcasts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Average parse time per merged outcome in milliseconds
    pub fn avg_parse_time_ms(&self) -> f64 {
        let total = self.total_parse_time_ms.load(Ordering::Relaxed);
        let count = self.outcomes_merged.load(Ordering::Relaxed);
        if count > 0 {
            total as f64 / count as f64
        } else {
            0.0
        }
    }

    pub fn log_summary(&self) {
        tracing::info!("=== Pipeline Metrics Summary ===");
        tracing::info!("Uptime: {:.2}s", self.uptime().as_secs_f64());
        tracing::info!(
            "Tasks: {} submitted, {} merged, {} failed, {} stale",
            self.tasks_submitted.load(Ordering::Relaxed),
            self.outcomes_merged.load(Ordering::Relaxed),
            self.parse_failures.load(Ordering::Relaxed),
            self.stale_outcomes.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Workers: {} spawned, {} recycled, {} failed to start",
            self.workers_spawned.load(Ordering::Relaxed),
            self.workers_recycled.load(Ordering::Relaxed),
            self.worker_init_failures.load(Ordering::Relaxed)
        );
        tracing::info!(
            "Total parse time: {:.2}s (avg: {:.2}ms per plugin)",
            self.total_parse_time_ms.load(Ordering::Relaxed) as f64 / 1000.0,
            self.avg_parse_time_ms()
        );
        tracing::info!(
            "State updates: {}, broadcasts: {}",
            self.state_updates.load(Ordering::Relaxed),
            self.state_broadcasts.load(Ordering::Relaxed)
        );
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}
