use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::JobError;
use crate::runtime::ShutdownStatus;

/// An immutable unit of work. The payload is opaque to the runner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub id: String,
    #[serde(default)]
    pub payload: Value,
}

impl JobDescriptor {
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
        }
    }

    pub fn with_id(id: impl Into<String>) -> Self {
        Self::new(id, Value::Null)
    }
}

/// Result of running one job; produced exactly once per job that ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobOutcome {
    pub id: String,
    pub success: bool,
    pub duration_ms: u64,
    pub error: Option<String>,
    /// Slot of the worker that ran the job.
    pub worker_index: usize,
}

/// Anything that can run a single job.
///
/// Returning an error or panicking marks only that job as failed.
pub trait JobBody: Send + Sync {
    fn run_one(&self, job: &JobDescriptor) -> Result<(), JobError>;
}

impl<F> JobBody for F
where
    F: Fn(&JobDescriptor) -> Result<(), JobError> + Send + Sync,
{
    fn run_one(&self, job: &JobDescriptor) -> Result<(), JobError> {
        self(job)
    }
}

/// Everything a batch produced.
///
/// `outcomes` is in completion order. When the batch was cancelled,
/// `outcomes.len() < total_jobs` and the difference is the number of jobs
/// that never ran or were abandoned.
#[derive(Debug, Clone)]
pub struct BatchResult {
    pub outcomes: Vec<JobOutcome>,
    pub total_duration_ms: u64,
    pub worker_count: usize,
    pub total_jobs: usize,
    pub teardown: ShutdownStatus,
}

impl BatchResult {
    pub fn successful_count(&self) -> usize {
        self.outcomes.iter().filter(|outcome| outcome.success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.len() - self.successful_count()
    }

    pub fn not_run_count(&self) -> usize {
        self.total_jobs.saturating_sub(self.outcomes.len())
    }

    pub fn is_complete(&self) -> bool {
        self.not_run_count() == 0
    }

    /// Completed jobs per second of batch wall time.
    pub fn throughput(&self) -> f64 {
        if self.total_duration_ms == 0 {
            return 0.0;
        }
        self.outcomes.len() as f64 * 1_000.0 / self.total_duration_ms as f64
    }

    /// Batch wall time divided by completed jobs.
    pub fn average_job_ms(&self) -> f64 {
        match self.outcomes.len() {
            0 => 0.0,
            completed => self.total_duration_ms as f64 / completed as f64,
        }
    }
}
