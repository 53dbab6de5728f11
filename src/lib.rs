//! Concurrent core behind the gradekeeper student records console.
//!
//! The crate provides a bounded LRU cache with hit/miss telemetry, a
//! coordinator that warms and periodically refreshes cached records from an
//! external source, a work-stealing batch job runner with live per-worker
//! status, and an asynchronous, size-rotated audit trail.

pub mod audit;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod runtime;
pub mod source;
pub mod version;

pub use audit::{AuditEntry, AuditFilter, AuditTrail};
pub use cache::{BoundedConcurrentCache, CacheCoordinator, CacheEntry, CacheMetricsSnapshot};
pub use config::CoreConfig;
pub use error::{ConfigError, JobError, SourceError};
pub use runtime::jobs::{BatchResult, JobDescriptor, JobOutcome, JobRunner};
pub use runtime::ShutdownStatus;
