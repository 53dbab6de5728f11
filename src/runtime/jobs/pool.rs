use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{select, unbounded, Receiver, RecvTimeoutError, Sender};
use crossbeam_deque::{Injector, Steal, Stealer, Worker};
use crossbeam_utils::Backoff;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use super::metrics::BatchCounters;
use super::progress::{ProgressListener, ProgressObserver};
use super::status::{WorkerState, WorkerStatusTable};
use super::types::{BatchResult, JobBody, JobDescriptor, JobOutcome};
use crate::audit::AuditTrail;
use crate::config::PoolConfig;
use crate::error::ConfigError;
use crate::runtime::{spawn_tracked, ShutdownStatus, StopSignal, TrackedThread};

const JOB_OPERATION: &str = "BATCH_JOB";
const BATCH_OPERATION: &str = "BATCH";

/// Runs batches of independent jobs on a work-stealing thread pool.
///
/// Each batch gets its own pool, sized by [`PoolConfig::clamp_workers`],
/// which is torn down before [`JobRunner::run_batch`] returns. A stop
/// requested through [`JobRunner::shutdown`] is checked by every worker
/// between jobs; jobs that have not started by then are not run.
pub struct JobRunner {
    config: PoolConfig,
    audit: AuditTrail,
    stop: StopSignal,
    listeners: Vec<Arc<dyn ProgressListener>>,
    active: Arc<ActiveBatches>,
}

#[derive(Debug, Default)]
struct ActiveBatches {
    count: Mutex<usize>,
    idle: Condvar,
}

struct ActiveGuard(Arc<ActiveBatches>);

impl ActiveBatches {
    fn enter(self: &Arc<Self>) -> ActiveGuard {
        *self.count.lock() += 1;
        ActiveGuard(Arc::clone(self))
    }

    fn wait_idle(&self, wait: Duration) -> bool {
        let deadline = Instant::now() + wait;
        let mut count = self.count.lock();
        while *count > 0 {
            if self.idle.wait_until(&mut count, deadline).timed_out() {
                return *count == 0;
            }
        }
        true
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let mut count = self.0.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.0.idle.notify_all();
        }
    }
}

enum Event {
    Outcome(JobOutcome),
    Drained,
    Stopped,
}

struct WorkerContext {
    index: usize,
    injector: Arc<Injector<JobDescriptor>>,
    stealers: Arc<Vec<Stealer<JobDescriptor>>>,
    table: Arc<WorkerStatusTable>,
    counters: Arc<BatchCounters>,
    body: Arc<dyn JobBody>,
    stop: StopSignal,
    audit: AuditTrail,
    events: Sender<JobOutcome>,
}

impl JobRunner {
    pub fn new(config: PoolConfig, audit: AuditTrail) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            audit,
            stop: StopSignal::new(),
            listeners: Vec::new(),
            active: Arc::new(ActiveBatches::default()),
        })
    }

    /// Adds a listener that receives every progress poll.
    pub fn with_listener(mut self, listener: impl ProgressListener + 'static) -> Self {
        self.listeners.push(Arc::new(listener));
        self
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_stopped()
    }

    /// Requests a cooperative stop of running and future batches.
    pub fn shutdown(&self) {
        if self.stop.stop() {
            info!("job runner stop requested");
        }
    }

    /// Requests a stop and waits up to `wait` for running batches to tear
    /// down. Returns [`ShutdownStatus::Forced`] if any batch is still
    /// running afterwards.
    pub fn shutdown_now(&self, wait: Duration) -> ShutdownStatus {
        self.shutdown();
        if self.active.wait_idle(wait) {
            ShutdownStatus::Graceful
        } else {
            error!(
                wait_ms = wait.as_millis() as u64,
                "job runner failed to stop within the emergency wait"
            );
            ShutdownStatus::Forced
        }
    }

    /// Runs every job and returns their outcomes in completion order.
    ///
    /// Blocks until all jobs finished, or until a stop was requested and the
    /// grace period for in-flight jobs elapsed.
    pub fn run_batch<B>(
        &self,
        jobs: Vec<JobDescriptor>,
        worker_count: usize,
        body: B,
    ) -> BatchResult
    where
        B: JobBody + 'static,
    {
        let _active = self.active.enter();
        let started = Instant::now();
        let total_jobs = jobs.len();
        let worker_count = self.config.clamp_workers(worker_count);

        if self.stop.is_stopped() {
            warn!(total_jobs, "job runner is stopped; batch not run");
            return self.finish_batch(
                Vec::new(),
                total_jobs,
                worker_count,
                started,
                ShutdownStatus::Graceful,
            );
        }

        let injector = Arc::new(Injector::new());
        for job in jobs {
            injector.push(job);
        }
        let locals: Vec<Worker<JobDescriptor>> =
            (0..worker_count).map(|_| Worker::new_fifo()).collect();
        let stealers = Arc::new(locals.iter().map(Worker::stealer).collect::<Vec<_>>());
        let table = Arc::new(WorkerStatusTable::new(worker_count));
        let counters = Arc::new(BatchCounters::new(total_jobs));
        let body: Arc<dyn JobBody> = Arc::new(body);
        let (events, outcomes_rx) = unbounded();

        let observer = ProgressObserver::start(
            Arc::clone(&table),
            Arc::clone(&counters),
            self.config.progress_interval(),
            self.listeners.clone(),
            self.config.show_progress,
        );

        let mut workers: Vec<TrackedThread> = Vec::with_capacity(worker_count);
        for (index, local) in locals.into_iter().enumerate() {
            let context = WorkerContext {
                index,
                injector: Arc::clone(&injector),
                stealers: Arc::clone(&stealers),
                table: Arc::clone(&table),
                counters: Arc::clone(&counters),
                body: Arc::clone(&body),
                stop: self.stop.clone(),
                audit: self.audit.clone(),
                events: events.clone(),
            };
            match spawn_tracked(format!("gk-job-worker-{index}"), move || {
                worker_loop(&context, &local);
            }) {
                Ok(worker) => workers.push(worker),
                Err(err) => error!(worker = index, error = %err, "failed to spawn job worker"),
            }
        }
        drop(events);
        debug!(total_jobs, workers = workers.len(), "batch dispatched");

        let (outcomes, timed_out) = self.collect(&outcomes_rx, total_jobs);

        let grace = if timed_out {
            Duration::ZERO
        } else {
            self.config.grace()
        };
        let deadline = Instant::now() + grace;
        let mut teardown = if timed_out {
            ShutdownStatus::Forced
        } else {
            ShutdownStatus::Graceful
        };
        for worker in workers {
            let remaining = deadline.saturating_duration_since(Instant::now());
            teardown = teardown.and(worker.join_within(remaining));
        }
        teardown = teardown.and(observer.finish(self.config.grace()));

        self.finish_batch(outcomes, total_jobs, worker_count, started, teardown)
    }

    // Gathers outcomes until every worker has exited. Once a stop is
    // requested, in-flight jobs get one grace period to report.
    fn collect(
        &self,
        outcomes_rx: &Receiver<JobOutcome>,
        expected: usize,
    ) -> (Vec<JobOutcome>, bool) {
        let mut outcomes = Vec::with_capacity(expected);
        let stop_rx = self.stop.receiver();
        loop {
            let event = select! {
                recv(outcomes_rx) -> outcome => outcome.map_or(Event::Drained, Event::Outcome),
                recv(stop_rx) -> _ => Event::Stopped,
            };
            match event {
                Event::Outcome(outcome) => outcomes.push(outcome),
                Event::Drained => return (outcomes, false),
                Event::Stopped => break,
            }
        }

        debug!(grace_ms = self.config.grace_ms, "stop requested; waiting for in-flight jobs");
        let deadline = Instant::now() + self.config.grace();
        loop {
            match outcomes_rx.recv_deadline(deadline) {
                Ok(outcome) => outcomes.push(outcome),
                Err(RecvTimeoutError::Disconnected) => return (outcomes, false),
                Err(RecvTimeoutError::Timeout) => {
                    warn!("in-flight jobs exceeded the grace period; abandoning them");
                    return (outcomes, true);
                }
            }
        }
    }

    fn finish_batch(
        &self,
        outcomes: Vec<JobOutcome>,
        total_jobs: usize,
        worker_count: usize,
        started: Instant,
        teardown: ShutdownStatus,
    ) -> BatchResult {
        let result = BatchResult {
            outcomes,
            total_duration_ms: elapsed_ms(started),
            worker_count,
            total_jobs,
            teardown,
        };
        let (succeeded, failed, not_run) = (
            result.successful_count(),
            result.failed_count(),
            result.not_run_count(),
        );
        info!(
            total_jobs,
            succeeded,
            failed,
            not_run,
            workers = worker_count,
            duration_ms = result.total_duration_ms,
            "batch finished"
        );
        self.audit.log(
            BATCH_OPERATION,
            "RUN_BATCH",
            result.total_duration_ms,
            failed == 0 && not_run == 0,
            &format!(
                "jobs={total_jobs} workers={worker_count} succeeded={succeeded} failed={failed} not_run={not_run}"
            ),
        );
        result
    }
}

fn worker_loop(context: &WorkerContext, local: &Worker<JobDescriptor>) {
    let backoff = Backoff::new();
    loop {
        if context.stop.is_stopped() {
            break;
        }
        let job = match next_job(context, local) {
            Steal::Success(job) => job,
            Steal::Retry => {
                backoff.spin();
                continue;
            }
            Steal::Empty => break,
        };
        backoff.reset();
        let outcome = execute(context, job);
        if context.events.send(outcome).is_err() {
            break;
        }
    }
    context.table.update(context.index, WorkerState::Idle, None);
}

// Every job is queued before the workers start, so an empty answer from the
// local queue, the injector and every peer means the batch is drained.
fn next_job(context: &WorkerContext, local: &Worker<JobDescriptor>) -> Steal<JobDescriptor> {
    if let Some(job) = local.pop() {
        return Steal::Success(job);
    }
    let mut retry = false;
    match context.injector.steal_batch_and_pop(local) {
        Steal::Success(job) => return Steal::Success(job),
        Steal::Retry => retry = true,
        Steal::Empty => {}
    }
    for (index, stealer) in context.stealers.iter().enumerate() {
        if index == context.index {
            continue;
        }
        match stealer.steal() {
            Steal::Success(job) => return Steal::Success(job),
            Steal::Retry => retry = true,
            Steal::Empty => {}
        }
    }
    if retry { Steal::Retry } else { Steal::Empty }
}

fn execute(context: &WorkerContext, job: JobDescriptor) -> JobOutcome {
    context
        .table
        .update(context.index, WorkerState::Running, Some(job.id.clone()));
    context.counters.record_start();

    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| context.body.run_one(&job)));
    let duration_ms = elapsed_ms(started);
    let error = match result {
        Ok(Ok(())) => None,
        Ok(Err(err)) => Some(non_empty(err.to_string(), "job failed")),
        Err(payload) => Some(format!("job panicked: {}", panic_message(payload.as_ref()))),
    };
    let success = error.is_none();

    let state = if success {
        WorkerState::Completed
    } else {
        WorkerState::Failed
    };
    context
        .table
        .update(context.index, state, Some(job.id.clone()));
    context.counters.record_finish(success);

    if let Some(error) = &error {
        debug!(job = %job.id, worker = context.index, error = %error, "job failed");
    }
    context.audit.log(
        JOB_OPERATION,
        &job.id,
        duration_ms,
        success,
        error.as_deref().unwrap_or("ok"),
    );

    JobOutcome {
        id: job.id,
        success,
        duration_ms,
        error,
        worker_index: context.index,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn non_empty(message: String, fallback: &str) -> String {
    if message.trim().is_empty() {
        fallback.to_string()
    } else {
        message
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
