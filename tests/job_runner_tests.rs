use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use gradekeeper::audit::{AuditFilter, AuditTrail};
use gradekeeper::config::{AuditConfig, PoolConfig};
use gradekeeper::error::JobError;
use gradekeeper::runtime::ShutdownStatus;
use gradekeeper::runtime::jobs::{JobDescriptor, JobRunner, ProgressSnapshot, WorkerState};
use parking_lot::Mutex;

fn pool(min_workers: usize, max_workers: usize) -> PoolConfig {
    PoolConfig {
        min_workers,
        max_workers,
        grace_ms: 2_000,
        progress_interval_ms: 10,
        show_progress: false,
    }
}

fn runner(min_workers: usize, max_workers: usize) -> JobRunner {
    JobRunner::new(pool(min_workers, max_workers), AuditTrail::disabled()).expect("valid pool")
}

fn jobs(n: usize) -> Vec<JobDescriptor> {
    (1..=n)
        .map(|i| JobDescriptor::new(format!("job-{i}"), serde_json::json!({ "n": i })))
        .collect()
}

fn job_number(job: &JobDescriptor) -> u64 {
    job.payload["n"].as_u64().unwrap_or_default()
}

#[test]
fn failing_job_does_not_affect_the_others() {
    let runner = runner(2, 2);
    let body = |job: &JobDescriptor| -> Result<(), JobError> {
        if job_number(job) == 3 {
            return Err(JobError::new("grade sheet missing"));
        }
        Ok(())
    };

    let result = runner.run_batch(jobs(5), 2, body);

    assert_eq!(result.outcomes.len(), 5);
    assert_eq!(result.successful_count(), 4);
    assert_eq!(result.failed_count(), 1);
    let failed: Vec<_> = result.outcomes.iter().filter(|o| !o.success).collect();
    assert_eq!(failed[0].id, "job-3");
    assert_eq!(failed[0].error.as_deref(), Some("grade sheet missing"));
    assert!(result.outcomes.iter().filter(|o| o.success).all(|o| o.error.is_none()));
    assert!(result.is_complete());
    assert_eq!(result.teardown, ShutdownStatus::Graceful);
}

#[test]
fn panics_and_empty_errors_are_reported_as_failures() {
    let runner = runner(2, 4);
    let body = |job: &JobDescriptor| -> Result<(), JobError> {
        match job_number(job) {
            2 => panic!("division by zero in weighting"),
            4 => Err(JobError::new("  ")),
            _ => Ok(()),
        }
    };

    let result = runner.run_batch(jobs(6), 3, body);

    assert_eq!(result.outcomes.len(), 6);
    for outcome in result.outcomes.iter().filter(|o| !o.success) {
        let error = outcome.error.as_deref().unwrap_or_default();
        assert!(!error.trim().is_empty(), "{} has an empty error", outcome.id);
    }
    let panicked = result.outcomes.iter().find(|o| o.id == "job-2").unwrap();
    assert!(panicked.error.as_deref().unwrap().contains("division by zero"));
    assert_eq!(result.failed_count(), 2);
}

#[test]
fn every_job_runs_exactly_once() {
    let runner = runner(2, 8);
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&runs);
    let body = move |_: &JobDescriptor| -> Result<(), JobError> {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    };

    let result = runner.run_batch(jobs(200), 8, body);

    assert_eq!(runs.load(Ordering::SeqCst), 200);
    let ids: HashSet<_> = result.outcomes.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids.len(), 200);
    assert!(result.outcomes.iter().all(|o| o.worker_index < result.worker_count));
}

#[test]
fn outcomes_arrive_in_completion_order() {
    let runner = runner(2, 2);
    let body = |job: &JobDescriptor| -> Result<(), JobError> {
        let delay = if job_number(job) == 1 { 300 } else { 10 };
        thread::sleep(Duration::from_millis(delay));
        Ok(())
    };

    let result = runner.run_batch(jobs(3), 2, body);

    assert_eq!(result.outcomes.len(), 3);
    assert_eq!(result.outcomes.last().map(|o| o.id.as_str()), Some("job-1"));

    assert!(result.total_duration_ms >= 300);
    let expected_average = result.total_duration_ms as f64 / 3.0;
    assert!((result.average_job_ms() - expected_average).abs() < 1e-9);
    assert!((result.throughput() - 3_000.0 / result.total_duration_ms as f64).abs() < 1e-9);
}

#[test]
fn worker_count_is_clamped() {
    let config = pool(2, 8);
    assert_eq!(config.clamp_workers(0), 2);
    assert_eq!(config.clamp_workers(1), 2);
    let upper = config.clamp_workers(1_000);
    assert!((2..=8).contains(&upper));

    let runner = JobRunner::new(config, AuditTrail::disabled()).unwrap();
    let result = runner.run_batch(jobs(4), 1, |_: &JobDescriptor| -> Result<(), JobError> {
        Ok(())
    });
    assert_eq!(result.worker_count, 2);
}

#[test]
fn invalid_pool_bounds_are_rejected() {
    assert!(JobRunner::new(pool(0, 4), AuditTrail::disabled()).is_err());
    assert!(JobRunner::new(pool(5, 4), AuditTrail::disabled()).is_err());
}

#[test]
fn empty_batch_completes_immediately() {
    let runner = runner(2, 2);
    let result = runner.run_batch(Vec::new(), 4, |_: &JobDescriptor| -> Result<(), JobError> {
        Ok(())
    });
    assert!(result.outcomes.is_empty());
    assert!(result.is_complete());
    assert_eq!(result.throughput(), 0.0);
    assert_eq!(result.average_job_ms(), 0.0);
}

#[test]
fn shutdown_stops_dispatching_new_jobs() {
    let runner = runner(2, 2);
    let body = |_: &JobDescriptor| -> Result<(), JobError> {
        thread::sleep(Duration::from_millis(40));
        Ok(())
    };

    let result = thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(100));
            runner.shutdown();
        });
        runner.run_batch(jobs(50), 2, body)
    });

    assert!(runner.is_stopped());
    assert!(result.not_run_count() > 0);
    assert!(!result.outcomes.is_empty());
    assert!(result.outcomes.iter().all(|o| o.success));
    assert_eq!(result.outcomes.len() + result.not_run_count(), 50);

    // A stopped runner refuses further batches.
    let again = runner.run_batch(jobs(3), 2, |_: &JobDescriptor| -> Result<(), JobError> {
        Ok(())
    });
    assert_eq!(again.not_run_count(), 3);
}

#[test]
fn in_flight_jobs_past_the_grace_period_are_abandoned() {
    let mut config = pool(1, 1);
    config.grace_ms = 50;
    let runner = JobRunner::new(config, AuditTrail::disabled()).unwrap();
    let body = |_: &JobDescriptor| -> Result<(), JobError> {
        thread::sleep(Duration::from_millis(600));
        Ok(())
    };

    let result = thread::scope(|scope| {
        scope.spawn(|| {
            thread::sleep(Duration::from_millis(50));
            runner.shutdown();
        });
        runner.run_batch(jobs(3), 1, body)
    });

    assert!(result.outcomes.is_empty());
    assert_eq!(result.not_run_count(), 3);
    assert_eq!(result.teardown, ShutdownStatus::Forced);
}

#[test]
fn shutdown_now_waits_for_running_batches() {
    let runner = runner(2, 2);
    let body = |_: &JobDescriptor| -> Result<(), JobError> {
        thread::sleep(Duration::from_millis(20));
        Ok(())
    };

    let status = thread::scope(|scope| {
        let batch = scope.spawn(|| runner.run_batch(jobs(40), 2, body));
        thread::sleep(Duration::from_millis(60));
        let status = runner.shutdown_now(Duration::from_secs(5));
        let result = batch.join().unwrap();
        assert!(result.not_run_count() > 0);
        status
    });

    assert_eq!(status, ShutdownStatus::Graceful);
}

#[test]
fn listeners_observe_progress_and_final_snapshot() {
    let snapshots: Arc<Mutex<Vec<ProgressSnapshot>>> = Arc::default();
    let sink = Arc::clone(&snapshots);
    let runner = runner(2, 2).with_listener(move |snapshot: &ProgressSnapshot| {
        sink.lock().push(snapshot.clone());
    });
    let body = |_: &JobDescriptor| -> Result<(), JobError> {
        thread::sleep(Duration::from_millis(15));
        Ok(())
    };

    runner.run_batch(jobs(10), 2, body);

    let snapshots = snapshots.lock();
    assert!(snapshots.len() >= 2);
    let last = snapshots.last().unwrap();
    assert_eq!(last.total, 10);
    assert_eq!(last.completed, 10);
    assert_eq!(last.in_flight(), 0);
    assert_eq!(last.workers.len(), 2);
    assert!(last.workers.iter().all(|w| w.state == WorkerState::Idle));
    assert!(
        snapshots
            .windows(2)
            .all(|pair| pair[0].completed <= pair[1].completed)
    );
}

#[test]
fn jobs_and_batches_are_audited() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let trail = AuditTrail::new(&AuditConfig::with_dir(dir.path()))?;
    let runner = JobRunner::new(pool(2, 2), trail.clone())?;
    let body = |job: &JobDescriptor| -> Result<(), JobError> {
        if job_number(job) == 2 {
            Err(JobError::new("late submission"))
        } else {
            Ok(())
        }
    };

    runner.run_batch(jobs(3), 2, body);
    assert!(trail.shutdown().is_graceful());

    let job_entries = trail.query(&AuditFilter::new().operation_type("BATCH_JOB"));
    assert_eq!(job_entries.len(), 3);
    let failed: Vec<_> = job_entries.iter().filter(|e| !e.success).collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].action, "job-2");
    assert_eq!(failed[0].details, "late submission");
    assert!(job_entries.iter().all(|e| e.worker_id.contains("gk-job-worker-")));

    let batches = trail.query(&AuditFilter::new().operation_type("BATCH"));
    assert_eq!(batches.len(), 1);
    assert!(!batches[0].success);
    Ok(())
}
