use std::sync::Arc;
use std::time::Duration;

use gradekeeper_utils::{format_duration, format_rate};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};

use super::metrics::{BatchCounters, ProgressSnapshot};
use super::status::{WorkerState, WorkerStatusTable};
use crate::runtime::{spawn_tracked, ShutdownStatus, StopSignal, TrackedThread};

/// Receives a [`ProgressSnapshot`] on every observer poll, plus one final
/// snapshot when the batch ends.
pub trait ProgressListener: Send + Sync {
    fn on_progress(&self, snapshot: &ProgressSnapshot);
}

impl<F> ProgressListener for F
where
    F: Fn(&ProgressSnapshot) + Send + Sync,
{
    fn on_progress(&self, snapshot: &ProgressSnapshot) {
        self(snapshot);
    }
}

/// Polls the status table at a fixed cadence until told to stop.
pub(crate) struct ProgressObserver {
    stop: StopSignal,
    thread: Option<TrackedThread>,
}

impl ProgressObserver {
    pub(crate) fn start(
        table: Arc<WorkerStatusTable>,
        counters: Arc<BatchCounters>,
        interval: Duration,
        listeners: Vec<Arc<dyn ProgressListener>>,
        show_bar: bool,
    ) -> Self {
        let stop = StopSignal::new();
        let observer_stop = stop.clone();
        let total = counters.snapshot(&table).total as u64;
        let bar = if show_bar {
            new_bar(total)
        } else {
            ProgressBar::hidden()
        };

        let thread = spawn_tracked("gk-job-progress", move || {
            loop {
                let stopped = observer_stop.wait_timeout(interval);
                let snapshot = counters.snapshot(&table);
                publish(&bar, &listeners, &snapshot);
                if stopped {
                    break;
                }
            }
            bar.finish_and_clear();
        });

        let thread = match thread {
            Ok(thread) => Some(thread),
            Err(err) => {
                warn!(error = %err, "cannot spawn progress observer; running batch without it");
                None
            }
        };
        Self { stop, thread }
    }

    pub(crate) fn finish(mut self, grace: Duration) -> ShutdownStatus {
        self.stop.stop();
        match self.thread.take() {
            Some(thread) => thread.join_within(grace),
            None => ShutdownStatus::Graceful,
        }
    }
}

fn new_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("batch [{elapsed_precise}] {wide_bar} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    bar
}

fn publish(
    bar: &ProgressBar,
    listeners: &[Arc<dyn ProgressListener>],
    snapshot: &ProgressSnapshot,
) {
    bar.set_position(snapshot.completed as u64);
    bar.set_message(format!(
        "{} | {}",
        format_rate(snapshot.throughput()),
        worker_summary(snapshot)
    ));
    debug!(
        completed = snapshot.completed,
        failed = snapshot.failed,
        in_flight = snapshot.in_flight(),
        total = snapshot.total,
        throughput = snapshot.throughput(),
        average = %format_duration(snapshot.average_job_time()),
        "batch progress"
    );
    for listener in listeners {
        listener.on_progress(snapshot);
    }
}

fn worker_summary(snapshot: &ProgressSnapshot) -> String {
    snapshot
        .workers
        .iter()
        .map(|worker| match (worker.state, worker.current_job_id.as_deref()) {
            (WorkerState::Running, Some(job)) => format!("w{}:{job}", worker.worker_index),
            (WorkerState::Failed, Some(job)) => format!("w{}:!{job}", worker.worker_index),
            _ => format!("w{}:idle", worker.worker_index),
        })
        .collect::<Vec<_>>()
        .join(" ")
}
