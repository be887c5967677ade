//! Repeat-on-interval execution strategies for pull consumers.
//!
//! Both strategies drive a [`Work`] implementation on one dedicated thread and
//! share the lifecycle `Idle -> Running -> Stopped`, where `Stopped` is terminal.
//!
//! - [`ScheduledJob`] runs work at a fixed rate, starting immediately. A run
//!   that overruns the interval makes the following runs fire back-to-back
//!   until the schedule has caught up, so it suits work that finishes well
//!   within the interval.
//! - [`ThreadedJob`] runs work, sleeps for the interval, and repeats. Runs are
//!   strictly serialized with the sleep, which suits long blocking receives.
//!
//! ```ignore
//! let job = ThreadedJob::new("orders-consumer0", move || consumer.poll_once());
//! job.set_interval(Duration::from_millis(100));
//! job.start()?;
//! // ...
//! job.stop();
//! ```

mod scheduled;
mod threaded;

pub use scheduled::ScheduledJob;
pub use threaded::ThreadedJob;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::debug;

use crate::error::{NotificationError, Result};

/// Interval used until [`Poller::set_interval`] is called.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(1000);

/// A unit of repeatable work.
pub trait Work: Send + 'static {
    fn do_work(&mut self);
}

impl<F> Work for F
where
    F: FnMut() + Send + 'static,
{
    fn do_work(&mut self) {
        self()
    }
}

/// Lifecycle of a polling job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    Running,
    Stopped,
}

/// The capability every polling strategy offers.
pub trait Poller: Send + Sync {
    /// Begin repeating the work. Fails unless the job is idle.
    fn start(&self) -> Result<()>;

    /// Stop repeating. An in-flight run completes; no run starts afterwards.
    ///
    /// Waits for the worker thread unless called from it.
    fn stop(&self);

    fn set_interval(&self, interval: Duration);

    fn interval(&self) -> Duration;

    fn state(&self) -> JobState;
}

/// Which polling strategy a consumer is driven by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Strategy {
    #[default]
    Scheduled,
    Threaded,
}

impl Strategy {
    /// Wrap `work` in a job of this strategy.
    pub fn job<W: Work>(self, name: impl Into<String>, work: W) -> Box<dyn Poller> {
        match self {
            Strategy::Scheduled => Box::new(ScheduledJob::new(name, work)),
            Strategy::Threaded => Box::new(ThreadedJob::new(name, work)),
        }
    }
}

pub(crate) enum Signal {
    Stop,
    Wake,
}

/// State, interval and worker bookkeeping shared by both strategies.
pub(crate) struct Lifecycle {
    name: String,
    state: Mutex<JobState>,
    running: Arc<AtomicBool>,
    interval_ms: Arc<AtomicU64>,
    signal: Mutex<Option<Sender<Signal>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl Lifecycle {
    pub(crate) fn new(name: String) -> Self {
        Self {
            name,
            state: Mutex::new(JobState::Idle),
            running: Arc::new(AtomicBool::new(false)),
            interval_ms: Arc::new(AtomicU64::new(DEFAULT_INTERVAL.as_millis() as u64)),
            signal: Mutex::new(None),
            worker: Mutex::new(None),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Spawn the worker. `body` receives the running flag, the interval cell
    /// and the signal receiver.
    pub(crate) fn spawn<F>(&self, body: F) -> Result<()>
    where
        F: FnOnce(Arc<AtomicBool>, Arc<AtomicU64>, Receiver<Signal>) + Send + 'static,
    {
        let mut state = lock(&self.state);
        if *state != JobState::Idle {
            return Err(NotificationError::AlreadyStarted(format!(
                "job {} is {:?}",
                self.name, *state
            )));
        }

        let (tx, rx) = channel();
        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let interval = Arc::clone(&self.interval_ms);
        let handle = thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || body(running, interval, rx))
            .map_err(|e| {
                self.running.store(false, Ordering::SeqCst);
                NotificationError::Transport(format!("cannot spawn worker {}: {}", self.name, e))
            })?;

        *lock(&self.signal) = Some(tx);
        *lock(&self.worker) = Some(handle);
        *state = JobState::Running;
        debug!(job = %self.name, "polling job started");
        Ok(())
    }

    pub(crate) fn stop(&self) {
        {
            let mut state = lock(&self.state);
            if *state == JobState::Stopped {
                return;
            }
            *state = JobState::Stopped;
        }
        self.running.store(false, Ordering::SeqCst);
        if let Some(tx) = lock(&self.signal).take() {
            let _ = tx.send(Signal::Stop);
        }

        let handle = lock(&self.worker).take();
        if let Some(handle) = handle {
            if handle.thread().id() == thread::current().id() {
                // Stopped from inside the work; the loop exits on its own.
                return;
            }
            let _ = handle.join();
        }
        debug!(job = %self.name, "polling job stopped");
    }

    /// Signal a stop without waiting for the worker.
    pub(crate) fn signal_stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(tx) = lock(&self.signal).take() {
            let _ = tx.send(Signal::Stop);
        }
        *lock(&self.state) = JobState::Stopped;
    }

    pub(crate) fn wake(&self) {
        if let Some(tx) = lock(&self.signal).as_ref() {
            let _ = tx.send(Signal::Wake);
        }
    }

    pub(crate) fn set_interval(&self, interval: Duration) {
        self.interval_ms
            .store(interval.as_millis() as u64, Ordering::SeqCst);
    }

    pub(crate) fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms.load(Ordering::SeqCst))
    }

    pub(crate) fn state(&self) -> JobState {
        *lock(&self.state)
    }
}
