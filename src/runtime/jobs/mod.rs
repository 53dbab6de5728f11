//! Batch job runner.
//!
//! A batch of independent [`JobDescriptor`]s is spread over a fixed pool of
//! worker threads that steal work from one another. Outcomes come back in
//! completion order while a progress observer samples the per-worker status
//! table.

mod metrics;
mod pool;
mod progress;
mod status;
mod types;

pub use metrics::ProgressSnapshot;
pub use pool::JobRunner;
pub use progress::ProgressListener;
pub use status::{WorkerState, WorkerStatus, WorkerStatusTable};
pub use types::{BatchResult, JobBody, JobDescriptor, JobOutcome};
