use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{unbounded, Sender};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use super::entry::AuditEntry;
use super::query::{query_dir, AuditFilter};
use super::writer::{run_writer, AuditSink, AuditStats};
use crate::config::AuditConfig;
use crate::error::ConfigError;
use crate::runtime::{spawn_tracked, ShutdownStatus, TrackedThread};

/// Handle to the audit trail. Clones share one queue and one writer.
#[derive(Debug, Clone)]
pub struct AuditTrail {
    inner: Arc<TrailInner>,
}

#[derive(Debug)]
struct TrailInner {
    dir: PathBuf,
    sender: RwLock<Option<Sender<AuditEntry>>>,
    writer: Mutex<Option<TrackedThread>>,
    abort: Arc<AtomicBool>,
    stats: Arc<AuditStats>,
    shutdown_timeout: Duration,
}

impl AuditTrail {
    /// Starts the background writer.
    ///
    /// Only an invalid rotation threshold is an error. If the log directory
    /// cannot be created or the writer cannot be spawned, a warning is
    /// logged and the trail runs with persistence disabled.
    pub fn new(config: &AuditConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let stats = Arc::new(AuditStats::default());
        let abort = Arc::new(AtomicBool::new(false));
        let dir = config.dir.clone();

        if !config.enabled {
            debug!("audit trail disabled by configuration");
            return Ok(Self::detached(dir, stats, abort, config.shutdown_timeout()));
        }
        if let Err(err) = std::fs::create_dir_all(&dir) {
            warn!(
                dir = %dir.display(),
                error = %err,
                "cannot create audit directory; audit persistence disabled"
            );
            return Ok(Self::detached(dir, stats, abort, config.shutdown_timeout()));
        }

        let (sender, receiver) = unbounded();
        let sink = AuditSink::new(dir.clone(), config.rotation_bytes, Arc::clone(&stats));
        let writer_abort = Arc::clone(&abort);
        let writer = match spawn_tracked("gk-audit-writer", move || {
            run_writer(&receiver, sink, &writer_abort);
        }) {
            Ok(writer) => writer,
            Err(err) => {
                warn!(error = %err, "cannot spawn audit writer; audit persistence disabled");
                return Ok(Self::detached(dir, stats, abort, config.shutdown_timeout()));
            }
        };

        info!(dir = %dir.display(), "audit trail started");
        Ok(Self {
            inner: Arc::new(TrailInner {
                dir,
                sender: RwLock::new(Some(sender)),
                writer: Mutex::new(Some(writer)),
                abort,
                stats,
                shutdown_timeout: config.shutdown_timeout(),
            }),
        })
    }

    /// A trail that accepts and drops every entry.
    pub fn disabled() -> Self {
        Self::detached(
            PathBuf::new(),
            Arc::new(AuditStats::default()),
            Arc::new(AtomicBool::new(false)),
            Duration::ZERO,
        )
    }

    fn detached(
        dir: PathBuf,
        stats: Arc<AuditStats>,
        abort: Arc<AtomicBool>,
        shutdown_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(TrailInner {
                dir,
                sender: RwLock::new(None),
                writer: Mutex::new(None),
                abort,
                stats,
                shutdown_timeout,
            }),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.inner.dir
    }

    /// Whether entries are still being accepted for persistence.
    pub fn is_persistent(&self) -> bool {
        self.inner.sender.read().is_some()
    }

    /// Enqueues an entry stamped with the calling thread; never blocks on
    /// I/O.
    pub fn log(
        &self,
        operation_type: &str,
        action: &str,
        duration_ms: u64,
        success: bool,
        details: &str,
    ) {
        self.record(AuditEntry::new(
            operation_type,
            action,
            duration_ms,
            success,
            details,
        ));
    }

    pub fn record(&self, entry: AuditEntry) {
        let sender = self.inner.sender.read();
        let delivered = sender
            .as_ref()
            .is_some_and(|sender| sender.send(entry).is_ok());
        if !delivered {
            self.inner.stats.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Reads persisted entries back from disk. Entries still queued in
    /// memory are not visible.
    pub fn query(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        if self.inner.dir.as_os_str().is_empty() {
            return Vec::new();
        }
        query_dir(&self.inner.dir, filter)
    }

    pub fn stats(&self) -> AuditStatsSnapshot {
        let stats = &self.inner.stats;
        AuditStatsSnapshot {
            written: stats.written.load(Ordering::Relaxed),
            failed_writes: stats.failed_writes.load(Ordering::Relaxed),
            dropped: stats.dropped.load(Ordering::Relaxed),
            rotations: stats.rotations.load(Ordering::Relaxed),
        }
    }

    /// Drains the queue and stops the writer, waiting up to the configured
    /// shutdown timeout.
    pub fn shutdown(&self) -> ShutdownStatus {
        self.shutdown_within(self.inner.shutdown_timeout)
    }

    /// Closes the queue, then waits up to `timeout` for the writer to drain
    /// it. On timeout the writer is told to abort and is abandoned.
    pub fn shutdown_within(&self, timeout: Duration) -> ShutdownStatus {
        self.inner.sender.write().take();
        let Some(writer) = self.inner.writer.lock().take() else {
            return ShutdownStatus::Graceful;
        };
        let status = writer.join_within(timeout);
        if !status.is_graceful() {
            self.inner.abort.store(true, Ordering::SeqCst);
            warn!("audit writer did not drain in time; remaining entries abandoned");
        }
        status
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AuditStatsSnapshot {
    pub written: u64,
    pub failed_writes: u64,
    pub dropped: u64,
    pub rotations: u64,
}
