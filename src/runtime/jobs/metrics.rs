use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use super::status::{WorkerStatus, WorkerStatusTable};

/// Live counters for one batch.
#[derive(Debug)]
pub(crate) struct BatchCounters {
    total: usize,
    started: AtomicUsize,
    completed: AtomicUsize,
    failed: AtomicUsize,
    started_at: Instant,
}

impl BatchCounters {
    pub(crate) fn new(total: usize) -> Self {
        Self {
            total,
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            started_at: Instant::now(),
        }
    }

    pub(crate) fn record_start(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_finish(&self, success: bool) {
        self.completed.fetch_add(1, Ordering::Relaxed);
        if !success {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn snapshot(&self, table: &WorkerStatusTable) -> ProgressSnapshot {
        ProgressSnapshot {
            total: self.total,
            started: self.started.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            elapsed: self.started_at.elapsed(),
            workers: table.snapshot(),
        }
    }
}

/// What the progress observer sees on each poll.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub total: usize,
    pub started: usize,
    /// Finished jobs, successful or not.
    pub completed: usize,
    pub failed: usize,
    pub elapsed: Duration,
    pub workers: Vec<WorkerStatus>,
}

impl ProgressSnapshot {
    pub fn in_flight(&self) -> usize {
        self.started.saturating_sub(self.completed)
    }

    /// Completed jobs per elapsed second.
    pub fn throughput(&self) -> f64 {
        let seconds = self.elapsed.as_secs_f64();
        if seconds <= f64::EPSILON {
            return 0.0;
        }
        self.completed as f64 / seconds
    }

    /// Elapsed time divided by completed jobs, zero before the first one.
    pub fn average_job_time(&self) -> Duration {
        u32::try_from(self.completed)
            .ok()
            .filter(|completed| *completed > 0)
            .map(|completed| self.elapsed / completed)
            .unwrap_or(Duration::ZERO)
    }
}
