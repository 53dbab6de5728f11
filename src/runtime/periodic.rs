use std::io;
use std::time::Duration;

use tracing::debug;

use super::stop::StopSignal;
use super::thread::{spawn_tracked, ShutdownStatus, TrackedThread};

/// Runs a closure at a fixed interval on a dedicated thread until stopped.
///
/// The first tick fires one interval after spawning. The stop signal is
/// checked at every iteration boundary and also handed to the tick so long
/// cycles can bail out early.
#[derive(Debug)]
pub struct PeriodicTask {
    stop: StopSignal,
    thread: Option<TrackedThread>,
}

impl PeriodicTask {
    pub fn spawn<F>(name: impl Into<String>, interval: Duration, mut tick: F) -> io::Result<Self>
    where
        F: FnMut(&StopSignal) + Send + 'static,
    {
        let stop = StopSignal::new();
        let worker_stop = stop.clone();
        let name = name.into();
        let task_name = name.clone();
        let thread = spawn_tracked(name, move || {
            loop {
                if worker_stop.wait_timeout(interval) {
                    break;
                }
                tick(&worker_stop);
            }
            debug!(task = %task_name, "periodic task stopped");
        })?;
        Ok(Self {
            stop,
            thread: Some(thread),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .is_some_and(|thread| !thread.is_finished())
    }

    /// Signals the task and waits up to `grace` for the current cycle.
    pub fn stop(&mut self, grace: Duration) -> ShutdownStatus {
        self.stop.stop();
        match self.thread.take() {
            Some(thread) => thread.join_within(grace),
            None => ShutdownStatus::Graceful,
        }
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.stop.stop();
    }
}
