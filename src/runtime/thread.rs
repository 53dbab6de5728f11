use std::io;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use tracing::warn;

/// How a two-phase shutdown ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownStatus {
    /// Everything stopped within the grace period.
    Graceful,
    /// The grace period elapsed; remaining threads were abandoned.
    Forced,
}

impl ShutdownStatus {
    pub fn is_graceful(self) -> bool {
        matches!(self, Self::Graceful)
    }

    /// Combines two statuses; any forced part makes the whole forced.
    pub fn and(self, other: Self) -> Self {
        if self.is_graceful() && other.is_graceful() {
            Self::Graceful
        } else {
            Self::Forced
        }
    }
}

/// A named OS thread whose exit can be awaited with a deadline.
///
/// The thread owns the sending half of a rendezvous channel and drops it on
/// exit, including when unwinding from a panic.
#[derive(Debug)]
pub struct TrackedThread {
    name: String,
    handle: JoinHandle<()>,
    exited: Receiver<()>,
}

pub fn spawn_tracked<F>(name: impl Into<String>, body: F) -> io::Result<TrackedThread>
where
    F: FnOnce() + Send + 'static,
{
    let name = name.into();
    let (guard, exited) = bounded::<()>(0);
    let handle = thread::Builder::new().name(name.clone()).spawn(move || {
        let _guard = guard;
        body();
    })?;
    Ok(TrackedThread {
        name,
        handle,
        exited,
    })
}

impl TrackedThread {
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Waits up to `grace` for the thread to exit and joins it. A thread
    /// that is still running afterwards is detached.
    pub fn join_within(self, grace: Duration) -> ShutdownStatus {
        match self.exited.recv_timeout(grace) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if self.handle.join().is_err() {
                    warn!(thread = %self.name, "thread panicked before shutdown");
                }
                ShutdownStatus::Graceful
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    thread = %self.name,
                    grace_ms = grace.as_millis() as u64,
                    "thread did not stop within grace period; abandoning it"
                );
                ShutdownStatus::Forced
            }
        }
    }
}
