//! Asynchronous, append-only audit trail.
//!
//! Callers enqueue [`AuditEntry`] values without blocking; a single
//! background writer appends them, one pipe-delimited line each, to
//! `audit_<yyyy-MM-dd>.log` and rotates that file to
//! `audit_<yyyy-MM-dd>_<HHmmss>.log` once it would grow past the configured
//! threshold. [`AuditTrail::query`] reads persisted entries back from disk.

mod entry;
mod query;
mod trail;
mod writer;

pub use entry::{current_worker_id, AuditEntry};
pub use query::{log_files, query_dir, AuditFilter};
pub use trail::{AuditStatsSnapshot, AuditTrail};
