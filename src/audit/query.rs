use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::debug;

use super::entry::AuditEntry;

/// Criteria for reading entries back from disk. Unset criteria match
/// everything.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    since: Option<DateTime<Local>>,
    until: Option<DateTime<Local>>,
    operation_type: Option<String>,
    worker: Option<String>,
    success: Option<bool>,
}

impl AuditFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Entries at or after `since`.
    pub fn since(mut self, since: DateTime<Local>) -> Self {
        self.since = Some(since);
        self
    }

    /// Entries at or before `until`.
    pub fn until(mut self, until: DateTime<Local>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn operation_type(mut self, operation_type: impl Into<String>) -> Self {
        self.operation_type = Some(operation_type.into());
        self
    }

    /// Entries whose worker identity contains `worker`, so either the
    /// `Thread-<id>` part or the thread name can be used.
    pub fn worker(mut self, worker: impl Into<String>) -> Self {
        self.worker = Some(worker.into());
        self
    }

    pub fn success(mut self, success: bool) -> Self {
        self.success = Some(success);
        self
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        self.since.is_none_or(|since| entry.timestamp >= since)
            && self.until.is_none_or(|until| entry.timestamp <= until)
            && self
                .operation_type
                .as_deref()
                .is_none_or(|op| entry.operation_type.eq_ignore_ascii_case(op))
            && self
                .worker
                .as_deref()
                .is_none_or(|worker| entry.worker_id.contains(worker))
            && self.success.is_none_or(|success| entry.success == success)
    }
}

/// Reads every audit file under `dir`, oldest first, and returns the
/// entries accepted by `filter`.
///
/// A missing directory yields no entries; unreadable files and malformed
/// lines are skipped.
pub fn query_dir(dir: &Path, filter: &AuditFilter) -> Vec<AuditEntry> {
    let mut entries = Vec::new();
    for path in log_files(dir) {
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "skipping unreadable audit file");
                continue;
            }
        };
        let text = String::from_utf8_lossy(&bytes);
        entries.extend(
            text.lines()
                .filter_map(AuditEntry::parse_line)
                .filter(|entry| filter.matches(entry)),
        );
    }
    entries
}

/// Audit files under `dir` in write order: per day, rotated parts in
/// rotation order followed by the active file.
pub fn log_files(dir: &Path) -> Vec<PathBuf> {
    let pattern = format!(
        "{}/audit_*.log",
        glob::Pattern::escape(&dir.to_string_lossy())
    );
    let Ok(paths) = glob::glob(&pattern) else {
        return Vec::new();
    };
    let mut files: Vec<(FileOrder, PathBuf)> = paths
        .filter_map(Result::ok)
        .filter_map(|path| FileOrder::parse(&path).map(|order| (order, path)))
        .collect();
    files.sort();
    files.into_iter().map(|(_, path)| path).collect()
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct FileOrder {
    date: String,
    // Rotated parts sort before the active file of the same day.
    active: bool,
    time: String,
    seq: u32,
}

impl FileOrder {
    fn parse(path: &Path) -> Option<Self> {
        let stem = path.file_stem()?.to_str()?.strip_prefix("audit_")?;
        let (date, rest) = match stem.split_once('_') {
            Some((date, rest)) => (date, Some(rest)),
            None => (stem, None),
        };
        if date.len() != 10 {
            return None;
        }
        let Some(rest) = rest else {
            return Some(Self {
                date: date.to_string(),
                active: true,
                time: String::new(),
                seq: 0,
            });
        };
        let (time, seq) = match rest.split_once('-') {
            Some((time, seq)) => (time, seq.parse().ok()?),
            None => (rest, 0),
        };
        Some(Self {
            date: date.to_string(),
            active: false,
            time: time.to_string(),
            seq,
        })
    }
}
