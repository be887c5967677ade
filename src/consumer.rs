//! The consumer contract shared by every backend.
//!
//! ```text
//!   on_read_start(callback) ──► ReadHandle
//!          │
//!          ├─ push backends: the broker invokes the callback on arrival
//!          └─ pull backends: a Poller repeats fetch() and invokes the
//!             callback once per message, in receipt order
//! ```
//!
//! A consumer is "subscribed" from the moment it is constructed: messages
//! published after construction are delivered once reading starts, messages
//! published before are not.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::warn;

use crate::codec::Delivery;
use crate::error::{NotificationError, Result};
use crate::polling::{Poller, Strategy};

/// Per-message callback handed to [`Consumer::on_read_start`].
pub type Callback = Box<dyn FnMut(Delivery) + Send + 'static>;

/// Receives every notification of one logical event through a private
/// receiving resource (queue, subscriber or consumer group).
pub trait Consumer: Send + Sync {
    /// Register the callback and begin delivery. One-shot: a second call
    /// fails with [`NotificationError::AlreadyStarted`].
    fn on_read_start(&self, callback: Callback) -> Result<ReadHandle>;

    /// Halt delivery. A callback already running completes; none starts
    /// afterwards. Never closes a connection borrowed from a producer.
    fn stop(&self);

    /// The logical event name.
    fn event_name(&self) -> &str;

    /// The private receiving resource (queue URL/name, client id, group id).
    fn source(&self) -> &str;
}

/// Typed convenience over [`Consumer`].
pub trait ConsumerExt: Consumer {
    /// Like [`Consumer::on_read_start`], decoding each message first.
    /// Messages that fail to decode are logged and skipped.
    fn on_read_start_decoded<T, F>(&self, mut callback: F) -> Result<ReadHandle>
    where
        T: DeserializeOwned + 'static,
        F: FnMut(T) + Send + 'static,
    {
        self.on_read_start(Box::new(move |delivery: Delivery| {
            match delivery.decode::<T>() {
                Ok(value) => callback(value),
                Err(e) => warn!(source = %delivery.source, error = %e, "skipping undecodable message"),
            }
        }))
    }
}

impl<C: Consumer + ?Sized> ConsumerExt for C {}

/// Cancellation handle returned by [`Consumer::on_read_start`].
///
/// Dropping the handle does not stop delivery; call [`ReadHandle::cancel`]
/// or [`Consumer::stop`].
#[derive(Clone)]
pub struct ReadHandle {
    source: String,
    cancel: Arc<dyn Fn() + Send + Sync>,
}

impl ReadHandle {
    pub fn new(source: impl Into<String>, cancel: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            source: source.into(),
            cancel: Arc::new(cancel),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Stop delivery. Idempotent.
    pub fn cancel(&self) {
        (self.cancel)()
    }
}

impl fmt::Debug for ReadHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadHandle")
            .field("source", &self.source)
            .finish()
    }
}

/// Drives a pull consumer: one polling job that fetches a batch and hands
/// each message to the callback.
pub(crate) struct PullDriver {
    name: String,
    strategy: Strategy,
    interval: Duration,
    job: Mutex<Option<Arc<dyn Poller>>>,
    stopped: AtomicBool,
}

impl PullDriver {
    pub(crate) fn new(name: impl Into<String>, strategy: Strategy, interval: Duration) -> Self {
        Self {
            name: name.into(),
            strategy,
            interval,
            job: Mutex::new(None),
            stopped: AtomicBool::new(false),
        }
    }

    pub(crate) fn start<F>(&self, mut fetch: F, mut callback: Callback) -> Result<ReadHandle>
    where
        F: FnMut() -> Result<Vec<Delivery>> + Send + 'static,
    {
        let mut slot = self
            .job
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if slot.is_some() || self.stopped.load(Ordering::SeqCst) {
            return Err(NotificationError::AlreadyStarted(format!(
                "consumer {}",
                self.name
            )));
        }

        let name = self.name.clone();
        let job: Arc<dyn Poller> = Arc::from(self.strategy.job(self.name.clone(), move || {
            match fetch() {
                Ok(batch) => {
                    for delivery in batch {
                        callback(delivery);
                    }
                }
                Err(e) => warn!(consumer = %name, error = %e, "poll failed"),
            }
        }));
        job.set_interval(self.interval);
        job.start()?;
        *slot = Some(Arc::clone(&job));

        Ok(ReadHandle::new(self.name.clone(), move || job.stop()))
    }

    pub(crate) fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        let job = self
            .job
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        if let Some(job) = job {
            job.stop();
        }
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

impl Drop for PullDriver {
    fn drop(&mut self) {
        self.stop();
    }
}
