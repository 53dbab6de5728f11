use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use crossbeam_channel::Receiver;
use tracing::{debug, warn};

use super::entry::AuditEntry;

// Upper bound on entries appended between two flushes.
const DRAIN_BATCH: usize = 64;

#[derive(Debug, Default)]
pub(crate) struct AuditStats {
    pub(crate) written: AtomicU64,
    pub(crate) failed_writes: AtomicU64,
    pub(crate) dropped: AtomicU64,
    pub(crate) rotations: AtomicU64,
}

pub(crate) fn active_file_name(date: NaiveDate) -> String {
    format!("audit_{}.log", date.format("%Y-%m-%d"))
}

/// Owns the active log file; only ever touched by the writer thread.
#[derive(Debug)]
pub(crate) struct AuditSink {
    dir: PathBuf,
    rotation_bytes: u64,
    active: Option<ActiveFile>,
    // Latest stamp used to name a rotated file; never moves backwards.
    last_rotation: Option<NaiveDateTime>,
    stats: Arc<AuditStats>,
}

#[derive(Debug)]
struct ActiveFile {
    date: NaiveDate,
    path: PathBuf,
    writer: BufWriter<File>,
    size: u64,
}

impl ActiveFile {
    fn open(dir: &Path, date: NaiveDate) -> io::Result<Self> {
        let path = dir.join(active_file_name(date));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            date,
            path,
            writer: BufWriter::new(file),
            size,
        })
    }
}

impl AuditSink {
    pub(crate) fn new(dir: PathBuf, rotation_bytes: u64, stats: Arc<AuditStats>) -> Self {
        Self {
            dir,
            rotation_bytes,
            active: None,
            last_rotation: None,
            stats,
        }
    }

    /// Appends one entry. Failures are reported on the tracing channel and
    /// the file handle is reopened on the next append.
    pub(crate) fn append(&mut self, entry: &AuditEntry) {
        let line = entry.to_line();
        match self.try_append(&line, entry.timestamp.naive_local()) {
            Ok(()) => {
                self.stats.written.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                self.stats.failed_writes.fetch_add(1, Ordering::Relaxed);
                self.active = None;
                warn!(
                    dir = %self.dir.display(),
                    error = %err,
                    entry = %line,
                    "failed to append audit entry"
                );
            }
        }
    }

    pub(crate) fn flush(&mut self) {
        if let Some(active) = self.active.as_mut() {
            if let Err(err) = active.writer.flush() {
                warn!(path = %active.path.display(), error = %err, "failed to flush audit log");
                self.active = None;
            }
        }
    }

    fn try_append(&mut self, line: &str, stamp: NaiveDateTime) -> io::Result<()> {
        let bytes = line.len() as u64 + 1;
        let date = stamp.date();
        self.ensure_open(date)?;
        if self.would_overflow(bytes) {
            self.rotate(stamp)?;
            self.ensure_open(date)?;
        }
        let active = self
            .active
            .as_mut()
            .ok_or_else(|| io::Error::other("audit log not open"))?;
        writeln!(active.writer, "{line}")?;
        active.size += bytes;
        Ok(())
    }

    fn ensure_open(&mut self, date: NaiveDate) -> io::Result<()> {
        if self.active.as_ref().is_some_and(|active| active.date != date) {
            self.flush();
            self.active = None;
        }
        if self.active.is_none() {
            self.active = Some(ActiveFile::open(&self.dir, date)?);
        }
        Ok(())
    }

    fn would_overflow(&self, bytes: u64) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.size > 0 && active.size + bytes > self.rotation_bytes)
    }

    // Rotated names take their time from the entry that triggered the
    // rotation, so they always fall inside the day of the file.
    fn rotate(&mut self, stamp: NaiveDateTime) -> io::Result<()> {
        let Some(mut active) = self.active.take() else {
            return Ok(());
        };
        active.writer.flush()?;
        drop(active.writer);
        let stamp = self
            .last_rotation
            .filter(|last| last.date() == stamp.date())
            .map_or(stamp, |last| last.max(stamp));
        self.last_rotation = Some(stamp);
        let target = rotated_path(&self.dir, stamp)?;
        fs::rename(&active.path, &target)?;
        self.stats.rotations.fetch_add(1, Ordering::Relaxed);
        debug!(from = %active.path.display(), to = %target.display(), "rotated audit log");
        Ok(())
    }
}

// `audit_<date>_<HHmmss>.log`, with `-<n>` appended when several rotations
// land in the same second.
fn rotated_path(dir: &Path, stamp: NaiveDateTime) -> io::Result<PathBuf> {
    let stem = format!("audit_{}", stamp.format("%Y-%m-%d_%H%M%S"));
    let candidate = dir.join(format!("{stem}.log"));
    if !candidate.exists() {
        return Ok(candidate);
    }
    (1..10_000u32)
        .map(|seq| dir.join(format!("{stem}-{seq}.log")))
        .find(|path| !path.exists())
        .ok_or_else(|| io::Error::other("no free name for rotated audit log"))
}

/// Body of the dedicated writer thread.
///
/// Returns once every sender is gone and the queue is drained, or as soon
/// as `abort` is raised.
pub(crate) fn run_writer(receiver: &Receiver<AuditEntry>, mut sink: AuditSink, abort: &AtomicBool) {
    let mut abandoned = 0;
    'drain: while let Ok(entry) = receiver.recv() {
        if abort.load(Ordering::SeqCst) {
            abandoned += 1;
            break;
        }
        sink.append(&entry);
        for entry in receiver.try_iter().take(DRAIN_BATCH) {
            if abort.load(Ordering::SeqCst) {
                abandoned += 1;
                sink.flush();
                break 'drain;
            }
            sink.append(&entry);
        }
        sink.flush();
    }
    sink.flush();
    abandoned += receiver.len();
    if abandoned > 0 {
        sink.stats
            .dropped
            .fetch_add(abandoned as u64, Ordering::Relaxed);
        warn!(abandoned, "audit writer stopped before draining its queue");
    }
    debug!("audit writer stopped");
}

#[cfg(test)]
mod tests {
    use chrono::{Local, TimeZone};

    use super::*;
    use crate::audit::query::{log_files, query_dir, AuditFilter};

    fn entry_at(hour: u32, min: u32, sec: u32, details: &str) -> AuditEntry {
        let mut entry = AuditEntry::new("GRADE", "UPDATE", 1, true, details);
        entry.timestamp = Local
            .with_ymd_and_hms(2026, 1, 5, hour, min, sec)
            .single()
            .unwrap();
        entry
    }

    #[test]
    fn rotated_names_follow_entry_time_and_never_go_backwards() {
        let dir = tempfile::tempdir().unwrap();
        let stats = Arc::new(AuditStats::default());
        let mut sink = AuditSink::new(dir.path().to_path_buf(), 200, Arc::clone(&stats));

        for i in 0..6 {
            sink.append(&entry_at(23, 59, 59, &format!("late-{i}")));
        }
        // Logged from another thread a moment earlier but dequeued last.
        for i in 0..4 {
            sink.append(&entry_at(23, 59, 58, &format!("skewed-{i}")));
        }
        sink.flush();

        assert!(stats.rotations.load(Ordering::Relaxed) >= 2);
        for path in log_files(dir.path()) {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            assert!(
                name == "audit_2026-01-05.log" || name.starts_with("audit_2026-01-05_235959"),
                "{name}"
            );
        }
        let details: Vec<String> = query_dir(dir.path(), &AuditFilter::new())
            .into_iter()
            .map(|entry| entry.details)
            .collect();
        let expected: Vec<String> = (0..6)
            .map(|i| format!("late-{i}"))
            .chain((0..4).map(|i| format!("skewed-{i}")))
            .collect();
        assert_eq!(details, expected);
    }

    #[test]
    fn failed_append_reopens_on_next_entry() {
        let dir = tempfile::tempdir().unwrap();
        let stats = Arc::new(AuditStats::default());
        let mut sink = AuditSink::new(dir.path().to_path_buf(), 4_096, Arc::clone(&stats));
        let blocked = dir.path().join("audit_2026-01-05.log");
        fs::create_dir(&blocked).unwrap();

        sink.append(&entry_at(9, 0, 0, "lost"));
        fs::remove_dir(&blocked).unwrap();
        sink.append(&entry_at(9, 0, 1, "kept"));
        sink.flush();

        assert_eq!(stats.failed_writes.load(Ordering::Relaxed), 1);
        assert_eq!(stats.written.load(Ordering::Relaxed), 1);
        let entries = query_dir(dir.path(), &AuditFilter::new());
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].details, "kept");
    }
}
