use std::sync::atomic::Ordering;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::trace;

use super::{JobState, Lifecycle, Poller, Signal, Work};
use crate::error::{NotificationError, Result};

/// Fixed-rate execution on a single worker thread, first run immediately.
pub struct ScheduledJob<W: Work> {
    lifecycle: Lifecycle,
    work: Mutex<Option<W>>,
}

impl<W: Work> ScheduledJob<W> {
    pub fn new(name: impl Into<String>, work: W) -> Self {
        Self {
            lifecycle: Lifecycle::new(name.into()),
            work: Mutex::new(Some(work)),
        }
    }
}

/// Block until `deadline`. Returns false when the job must stop.
fn wait_until(signals: &Receiver<Signal>, deadline: Instant) -> bool {
    loop {
        let now = Instant::now();
        if now >= deadline {
            return match signals.try_recv() {
                Ok(Signal::Stop) | Err(TryRecvError::Disconnected) => false,
                Ok(Signal::Wake) | Err(TryRecvError::Empty) => true,
            };
        }
        match signals.recv_timeout(deadline - now) {
            Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => return false,
            Err(RecvTimeoutError::Timeout) => return true,
            // Fixed-rate runs ignore wake-ups and keep their schedule.
            Ok(Signal::Wake) => continue,
        }
    }
}

impl<W: Work> Poller for ScheduledJob<W> {
    fn start(&self) -> Result<()> {
        let mut work = self
            .work
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
            .ok_or_else(|| {
                NotificationError::AlreadyStarted(format!(
                    "job {} is {:?}",
                    self.lifecycle.name(),
                    self.lifecycle.state()
                ))
            })?;

        let name = self.lifecycle.name().to_string();
        self.lifecycle.spawn(move |running, interval_ms, signals| {
            let mut next_run = Instant::now();
            while running.load(Ordering::SeqCst) {
                work.do_work();
                next_run += Duration::from_millis(interval_ms.load(Ordering::SeqCst));
                if Instant::now() > next_run {
                    trace!(job = %name, "run overran its interval");
                }
                if !wait_until(&signals, next_run) {
                    break;
                }
            }
        })
    }

    fn stop(&self) {
        self.lifecycle.stop();
        // A job stopped before it ever started must not keep its work alive.
        self.work
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
    }

    fn set_interval(&self, interval: Duration) {
        self.lifecycle.set_interval(interval);
    }

    fn interval(&self) -> Duration {
        self.lifecycle.interval()
    }

    fn state(&self) -> JobState {
        self.lifecycle.state()
    }
}

impl<W: Work> Drop for ScheduledJob<W> {
    fn drop(&mut self) {
        self.lifecycle.signal_stop();
    }
}
