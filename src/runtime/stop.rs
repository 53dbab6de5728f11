use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use parking_lot::Mutex;

/// Cooperative, one-shot stop token.
///
/// Stopping drops the only sender of an internal channel, so every clone of
/// the receiver wakes up at once; threads can either poll
/// [`StopSignal::is_stopped`] between units of work or sleep on
/// [`StopSignal::wait_timeout`] / `select!` on [`StopSignal::receiver`].
#[derive(Debug, Clone)]
pub struct StopSignal {
    inner: Arc<StopInner>,
}

#[derive(Debug)]
struct StopInner {
    stopped: AtomicBool,
    trigger: Mutex<Option<Sender<()>>>,
    receiver: Receiver<()>,
}

impl StopSignal {
    pub fn new() -> Self {
        let (trigger, receiver) = bounded(0);
        Self {
            inner: Arc::new(StopInner {
                stopped: AtomicBool::new(false),
                trigger: Mutex::new(Some(trigger)),
                receiver,
            }),
        }
    }

    /// Requests a stop. Returns `false` if a stop was already requested.
    pub fn stop(&self) -> bool {
        if self
            .inner
            .stopped
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }
        self.inner.trigger.lock().take();
        true
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.stopped.load(Ordering::SeqCst)
    }

    /// Sleeps for up to `timeout`, returning early with `true` once a stop
    /// is requested.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        match self.inner.receiver.recv_timeout(timeout) {
            Err(RecvTimeoutError::Timeout) => self.is_stopped(),
            Ok(()) | Err(RecvTimeoutError::Disconnected) => true,
        }
    }

    /// Receiver that becomes ready (disconnected) when the stop fires.
    pub fn receiver(&self) -> Receiver<()> {
        self.inner.receiver.clone()
    }
}

impl Default for StopSignal {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn wait_returns_early_once_stopped() {
        let signal = StopSignal::new();
        let remote = signal.clone();
        let waiter = std::thread::spawn(move || {
            let started = Instant::now();
            let stopped = remote.wait_timeout(Duration::from_secs(10));
            (stopped, started.elapsed())
        });
        std::thread::sleep(Duration::from_millis(20));
        assert!(signal.stop());
        let (stopped, waited) = waiter.join().unwrap();
        assert!(stopped);
        assert!(waited < Duration::from_secs(5));
    }

    #[test]
    fn second_stop_is_a_no_op() {
        let signal = StopSignal::new();
        assert!(!signal.wait_timeout(Duration::from_millis(1)));
        assert!(signal.stop());
        assert!(!signal.stop());
        assert!(signal.is_stopped());
    }
}
