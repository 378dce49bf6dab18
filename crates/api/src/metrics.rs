use dispatch::RunReport;
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

pub struct Metrics {
    // Runs
    runs_started: AtomicUsize,
    runs_resolved: AtomicUsize,
    runs_failed: AtomicUsize,
    runs_cancelled: AtomicUsize,
    local_cache_hits: AtomicUsize,
    backend_cache_hits: AtomicUsize,

    // Batches
    combinations_planned: AtomicUsize,
    submission_failures: AtomicUsize,
    poll_attempts: AtomicUsize,

    // Timing (in microseconds)
    total_run_time_us: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            runs_started: AtomicUsize::new(0),
            runs_resolved: AtomicUsize::new(0),
            runs_failed: AtomicUsize::new(0),
            runs_cancelled: AtomicUsize::new(0),
            local_cache_hits: AtomicUsize::new(0),
            backend_cache_hits: AtomicUsize::new(0),
            combinations_planned: AtomicUsize::new(0),
            submission_failures: AtomicUsize::new(0),
            poll_attempts: AtomicUsize::new(0),
            total_run_time_us: AtomicU64::new(0),
        })
    }

    pub fn record_run_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_local_cache_hit(&self) {
        self.local_cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_resolved(&self, report: &RunReport, duration: Duration) {
        self.runs_resolved.fetch_add(1, Ordering::Relaxed);
        if report.from_cache {
            self.backend_cache_hits.fetch_add(1, Ordering::Relaxed);
        }
        self.combinations_planned
            .fetch_add(report.combinations, Ordering::Relaxed);
        self.submission_failures
            .fetch_add(report.submission_failures, Ordering::Relaxed);
        self.poll_attempts
            .fetch_add(report.poll_attempts, Ordering::Relaxed);
        self.total_run_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_failed(&self, cancelled: bool) {
        if cancelled {
            self.runs_cancelled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.runs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let resolved = self.runs_resolved.load(Ordering::Relaxed);
        let total_us = self.total_run_time_us.load(Ordering::Relaxed) as f64;
        MetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_resolved: resolved,
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_cancelled: self.runs_cancelled.load(Ordering::Relaxed),
            local_cache_hits: self.local_cache_hits.load(Ordering::Relaxed),
            backend_cache_hits: self.backend_cache_hits.load(Ordering::Relaxed),
            combinations_planned: self.combinations_planned.load(Ordering::Relaxed),
            submission_failures: self.submission_failures.load(Ordering::Relaxed),
            poll_attempts: self.poll_attempts.load(Ordering::Relaxed),
            avg_run_time_ms: if resolved > 0 {
                total_us / resolved as f64 / 1000.0 // Convert to ms
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub runs_started: usize,
    pub runs_resolved: usize,
    pub runs_failed: usize,
    pub runs_cancelled: usize,
    pub local_cache_hits: usize,
    pub backend_cache_hits: usize,
    pub combinations_planned: usize,
    pub submission_failures: usize,
    pub poll_attempts: usize,
    pub avg_run_time_ms: f64,
}
