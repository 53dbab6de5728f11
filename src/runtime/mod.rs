//! Thread plumbing shared by the coordinator, the job runner and the audit
//! writer: a cooperative stop signal, threads whose exit can be awaited with
//! a deadline, and a cancellable periodic task.

pub mod jobs;
mod periodic;
mod stop;
mod thread;

pub use periodic::PeriodicTask;
pub use stop::StopSignal;
pub use thread::{spawn_tracked, ShutdownStatus, TrackedThread};
