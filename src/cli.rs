use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use colored::Colorize;
use gradekeeper_utils::{format_duration, format_percent, format_rate, init_logging};
use tracing::debug;

use crate::audit::{AuditFilter, AuditTrail};
use crate::cache::CacheCoordinator;
use crate::config::CoreConfig;
use crate::error::JobError;
use crate::runtime::jobs::{JobDescriptor, JobRunner};
use crate::source::{DataSource, MemorySource};
use crate::version::VERSION;

#[derive(Parser, Debug)]
#[command(name = "gradekeeper", version = VERSION, about = "Gradekeeper cache and batch core")]
pub struct GradekeeperCli {
    #[arg(long, global = true)]
    /// Path to a TOML configuration file.
    config: Option<PathBuf>,

    #[arg(long, global = true)]
    /// Override the audit log directory.
    audit_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

impl GradekeeperCli {
    pub fn command(&self) -> &Command {
        &self.command
    }
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Warms the record cache from a synthetic roster and replays lookups.
    CacheDemo {
        #[arg(long, default_value_t = 200)]
        students: usize,
        #[arg(long, default_value_t = 1_000)]
        lookups: usize,
    },
    /// Generates one synthetic report per student on the worker pool.
    Batch {
        #[arg(long, default_value_t = 20)]
        jobs: usize,
        #[arg(short, long, default_value_t = 4)]
        workers: usize,
        /// Make every n-th job fail.
        #[arg(long)]
        fail_every: Option<usize>,
        /// Draw a live progress bar.
        #[arg(long)]
        progress: bool,
    },
    /// Reads audit entries back from disk.
    Audit {
        #[arg(long)]
        operation: Option<String>,
        #[arg(long)]
        worker: Option<String>,
        /// Only show failed operations.
        #[arg(long)]
        failures: bool,
        /// Only show entries from the last N minutes.
        #[arg(long)]
        since_minutes: Option<i64>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
}

#[derive(Debug, Clone)]
struct StudentRecord {
    id: String,
    name: String,
    average: f64,
}

fn roster(size: usize) -> Vec<StudentRecord> {
    (0..size)
        .map(|i| StudentRecord {
            id: format!("s-{i:04}"),
            name: format!("Student {i}"),
            average: 55.0 + (i * 37 % 45) as f64,
        })
        .collect()
}

fn student_key(record: &StudentRecord) -> String {
    record.id.clone()
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = GradekeeperCli::parse();
    let mut config = CoreConfig::load(cli.config.as_deref()).context("invalid configuration")?;
    if let Some(dir) = &cli.audit_dir {
        config.audit.dir = dir.clone();
    }
    let audit = AuditTrail::new(&config.audit)?;

    let result = match &cli.command {
        Command::CacheDemo { students, lookups } => {
            handle_cache_demo(&config, audit.clone(), *students, *lookups)
        }
        Command::Batch {
            jobs,
            workers,
            fail_every,
            progress,
        } => handle_batch(&config, audit.clone(), *jobs, *workers, *fail_every, *progress),
        Command::Audit {
            operation,
            worker,
            failures,
            since_minutes,
            limit,
        } => {
            let mut filter = AuditFilter::new();
            if let Some(operation) = operation {
                filter = filter.operation_type(operation.clone());
            }
            if let Some(worker) = worker {
                filter = filter.worker(worker.clone());
            }
            if *failures {
                filter = filter.success(false);
            }
            if let Some(minutes) = since_minutes {
                filter = filter.since(Local::now() - chrono::Duration::minutes(*minutes));
            }
            handle_audit(&audit, &filter, *limit);
            Ok(())
        }
    };

    let status = audit.shutdown();
    debug!(graceful = status.is_graceful(), "audit trail closed");
    result
}

fn handle_cache_demo(
    config: &CoreConfig,
    audit: AuditTrail,
    students: usize,
    lookups: usize,
) -> Result<()> {
    let source = Arc::new(MemorySource::new(roster(students), student_key));
    let coordinator: CacheCoordinator<StudentRecord> = CacheCoordinator::new(config, audit)?;
    let warm = coordinator.warm(source.as_ref());
    coordinator
        .start_auto_refresh(Arc::clone(&source), config.refresh.interval())
        .context("failed to start cache refresh")?;

    // Skewed key pattern so some keys stay hot while the tail churns.
    let universe = students.max(1) * 2;
    for i in 0..lookups {
        let id = format!("s-{:04}", i * i % universe);
        if let Some(record) = coordinator.get(&id) {
            if coordinator.get_report(&id).is_none() {
                coordinator.put_report(
                    id.clone(),
                    format!("{}: {:.1}", record.name, record.average),
                );
            }
        } else if let Ok(Some(record)) = source.find_by_id(&id) {
            coordinator.put(id, record);
        }
    }

    let metrics = coordinator.records().metrics();
    println!(
        "{} loaded={} skipped={}",
        "warm".green().bold(),
        warm.loaded,
        warm.skipped
    );
    println!(
        "{} size={}/{} hits={} misses={} evictions={} hit_rate={}",
        "records".bold(),
        metrics.size,
        metrics.capacity,
        metrics.hits,
        metrics.misses,
        metrics.evictions,
        format_percent(metrics.hit_rate())
    );
    println!(
        "{} avg_hit={} avg_miss={}",
        "latency".bold(),
        format_duration(metrics.average_hit_latency()),
        format_duration(metrics.average_miss_latency())
    );
    let reports = coordinator.reports().metrics();
    println!(
        "{} size={}/{} hit_rate={}",
        "reports".bold(),
        reports.size,
        reports.capacity,
        format_percent(reports.hit_rate())
    );

    coordinator.shutdown();
    Ok(())
}

fn handle_batch(
    config: &CoreConfig,
    audit: AuditTrail,
    jobs: usize,
    workers: usize,
    fail_every: Option<usize>,
    progress: bool,
) -> Result<()> {
    let mut pool = config.pool.clone();
    pool.show_progress |= progress;
    let runner = JobRunner::new(pool, audit)?;
    let students = Arc::new(roster(jobs));

    let descriptors = students
        .iter()
        .enumerate()
        .map(|(index, student)| {
            JobDescriptor::new(
                format!("report-{}", student.id),
                serde_json::json!({ "student": student.id, "index": index }),
            )
        })
        .collect();

    let body = move |job: &JobDescriptor| -> Result<(), JobError> {
        let index = job.payload["index"]
            .as_u64()
            .ok_or_else(|| JobError::new("payload is missing the student index"))?
            as usize;
        if fail_every.is_some_and(|n| n > 0 && (index + 1) % n == 0) {
            return Err(JobError::new(format!("report generation failed for {}", job.id)));
        }
        let student = students
            .get(index)
            .ok_or_else(|| JobError::new(format!("unknown student index {index}")))?;
        thread::sleep(Duration::from_millis(10 + (index as u64 % 5) * 5));
        debug!(student = %student.name, average = student.average, "report generated");
        Ok(())
    };

    let result = runner.run_batch(descriptors, workers, body);
    for outcome in &result.outcomes {
        let status = if outcome.success {
            "ok".green()
        } else {
            "failed".red()
        };
        println!(
            "{:>6} {} ({}ms, worker {}){}",
            status,
            outcome.id,
            outcome.duration_ms,
            outcome.worker_index,
            outcome
                .error
                .as_deref()
                .map(|err| format!(": {err}"))
                .unwrap_or_default()
        );
    }
    println!(
        "{} {}/{} succeeded, {} failed, {} not run on {} workers in {}ms ({})",
        "batch".bold(),
        result.successful_count(),
        result.total_jobs,
        result.failed_count(),
        result.not_run_count(),
        result.worker_count,
        result.total_duration_ms,
        format_rate(result.throughput())
    );
    Ok(())
}

fn handle_audit(audit: &AuditTrail, filter: &AuditFilter, limit: usize) {
    let entries = audit.query(filter);
    let skip = entries.len().saturating_sub(limit);
    for entry in entries.iter().skip(skip) {
        let line = entry.to_line();
        if entry.success {
            println!("{line}");
        } else {
            println!("{}", line.red());
        }
    }
    println!(
        "{} {} of {} entries from {}",
        "audit".bold(),
        entries.len() - skip,
        entries.len(),
        audit.dir().display()
    );
}
