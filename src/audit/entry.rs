use chrono::{DateTime, Local, SecondsFormat};

const FIELD_SEPARATOR: &str = " | ";
const FIELD_COUNT: usize = 7;

/// One completed operation, as written to the audit log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub timestamp: DateTime<Local>,
    /// `Thread-<id> (<name>)` of the thread that logged the entry.
    pub worker_id: String,
    pub operation_type: String,
    pub action: String,
    pub duration_ms: u64,
    pub success: bool,
    pub details: String,
}

impl AuditEntry {
    /// Builds an entry stamped with the current time and calling thread.
    pub fn new(
        operation_type: &str,
        action: &str,
        duration_ms: u64,
        success: bool,
        details: &str,
    ) -> Self {
        Self {
            timestamp: Local::now(),
            worker_id: current_worker_id(),
            operation_type: sanitize_field(operation_type),
            action: sanitize_field(action),
            duration_ms,
            success,
            details: sanitize_details(details),
        }
    }

    /// Encodes the entry as a single log line, without the trailing newline.
    ///
    /// `<timestamp> | <worker> | <operation> | <action> | <n>ms | SUCCESS|FAILURE | <details>`
    pub fn to_line(&self) -> String {
        format!(
            "{} | {} | {} | {} | {}ms | {} | {}",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, false),
            self.worker_id,
            self.operation_type,
            self.action,
            self.duration_ms,
            if self.success { "SUCCESS" } else { "FAILURE" },
            self.details,
        )
    }

    /// Decodes a line produced by [`AuditEntry::to_line`]. Returns `None`
    /// for anything malformed.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let fields: Vec<&str> = line.splitn(FIELD_COUNT, FIELD_SEPARATOR).collect();
        let [timestamp, worker_id, operation_type, action, duration, status, details] =
            fields.as_slice()
        else {
            return None;
        };

        let timestamp = DateTime::parse_from_rfc3339(timestamp)
            .ok()?
            .with_timezone(&Local);
        let duration_ms = duration.strip_suffix("ms")?.parse().ok()?;
        let success = match *status {
            "SUCCESS" => true,
            "FAILURE" => false,
            _ => return None,
        };

        Some(Self {
            timestamp,
            worker_id: (*worker_id).to_string(),
            operation_type: (*operation_type).to_string(),
            action: (*action).to_string(),
            duration_ms,
            success,
            details: (*details).to_string(),
        })
    }
}

/// Identity of the calling thread in `Thread-<id> (<name>)` form.
pub fn current_worker_id() -> String {
    let thread = std::thread::current();
    let raw = format!("{:?}", thread.id());
    let id = raw
        .strip_prefix("ThreadId(")
        .and_then(|rest| rest.strip_suffix(')'))
        .unwrap_or(&raw);
    let name = sanitize_field(thread.name().unwrap_or("unnamed"));
    format!("Thread-{id} ({name})")
}

// Every field but the last must stay free of the separator.
fn sanitize_field(value: &str) -> String {
    value
        .chars()
        .map(|c| match c {
            '|' => '/',
            '\r' | '\n' => ' ',
            other => other,
        })
        .collect()
}

fn sanitize_details(value: &str) -> String {
    value.replace(['\r', '\n'], " ")
}
