use std::sync::atomic::Ordering;
use std::sync::mpsc::RecvTimeoutError;
use std::sync::Mutex;
use std::time::Duration;

use tracing::debug;

use super::{JobState, Lifecycle, Poller, Signal, Work};
use crate::error::{NotificationError, Result};

/// A dedicated thread looping over `work; sleep(interval)`.
pub struct ThreadedJob<W: Work> {
    lifecycle: Lifecycle,
    work: Mutex<Option<W>>,
}

impl<W: Work> ThreadedJob<W> {
    pub fn new(name: impl Into<String>, work: W) -> Self {
        Self {
            lifecycle: Lifecycle::new(name.into()),
            work: Mutex::new(Some(work)),
        }
    }

    /// Cut the current sleep short. The loop carries on with its next run.
    pub fn wake(&self) {
        self.lifecycle.wake();
    }
}

impl<W: Work> Poller for ThreadedJob<W> {
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
            while running.load(Ordering::SeqCst) {
                work.do_work();
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                let interval = Duration::from_millis(interval_ms.load(Ordering::SeqCst));
                match signals.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {}
                    Ok(Signal::Wake) => debug!(job = %name, "sleep interrupted"),
                    Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
        })
    }

    fn stop(&self) {
        self.lifecycle.stop();
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

impl<W: Work> Drop for ThreadedJob<W> {
    fn drop(&mut self) {
        self.lifecycle.signal_stop();
    }
}
