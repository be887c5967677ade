//! Resource naming and the sequence counters behind unique default names.
//!
//! Every backend derives its resource names from the logical event name:
//!
//! | resource | name |
//! |---|---|
//! | JMS / log topic | `<event>-topic` |
//! | fanout exchange | `<event>-exchange` |
//! | pub/sub topic | `<event>-sns` |
//! | pull queue | `<event>-sqs<N>` |
//! | broker queue | `<event>-queue<N>` |
//! | consumer group / client id | `<event>-consumer<N>` |
//!
//! `<N>` comes from a [`NameRegistry`] counter. Counters live in memory only:
//! they start at zero with the process and are never persisted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// A monotonically increasing, race-free counter.
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU64);

impl SequenceCounter {
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    /// Take the current value and advance.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst)
    }

    /// The value the next call to [`SequenceCounter::next`] will return.
    pub fn peek(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(0, Ordering::SeqCst);
    }
}

/// Which counter a name draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CounterKind {
    /// Producer connection client ids.
    ClientId,
    /// Private receiving queues.
    Queue,
    /// Consumer groups and consumer connection client ids.
    Consumer,
}

/// The set of counters used to generate unique names.
///
/// Backends hold an `Arc<NameRegistry>`. Unless one is injected they share
/// [`NameRegistry::global`], so names stay unique across the whole process.
#[derive(Debug, Default)]
pub struct NameRegistry {
    client_ids: SequenceCounter,
    queues: SequenceCounter,
    consumers: SequenceCounter,
}

static GLOBAL: OnceLock<Arc<NameRegistry>> = OnceLock::new();

impl NameRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The process-wide registry, created on first use.
    pub fn global() -> Arc<Self> {
        GLOBAL.get_or_init(NameRegistry::new).clone()
    }

    pub fn counter(&self, kind: CounterKind) -> &SequenceCounter {
        match kind {
            CounterKind::ClientId => &self.client_ids,
            CounterKind::Queue => &self.queues,
            CounterKind::Consumer => &self.consumers,
        }
    }

    pub fn next(&self, kind: CounterKind) -> u64 {
        self.counter(kind).next()
    }

    /// Reset every counter to zero.
    pub fn reset(&self) {
        self.client_ids.reset();
        self.queues.reset();
        self.consumers.reset();
    }

    pub fn next_sqs_queue(&self, event: &str) -> String {
        sqs_queue_name(event, self.next(CounterKind::Queue))
    }

    pub fn next_broker_queue(&self, event: &str) -> String {
        broker_queue_name(event, self.next(CounterKind::Queue))
    }

    pub fn next_consumer(&self, event: &str) -> String {
        consumer_name(event, self.next(CounterKind::Consumer))
    }

    pub fn next_producer_client_id(&self, event: &str) -> String {
        producer_client_id(event, self.next(CounterKind::ClientId))
    }
}

pub fn topic_name(event: &str) -> String {
    format!("{}-topic", event)
}

pub fn exchange_name(event: &str) -> String {
    format!("{}-exchange", event)
}

pub fn sns_topic_name(event: &str) -> String {
    format!("{}-sns", event)
}

pub fn sqs_queue_name(event: &str, n: u64) -> String {
    format!("{}-sqs{}", event, n)
}

pub fn broker_queue_name(event: &str, n: u64) -> String {
    format!("{}-queue{}", event, n)
}

pub fn consumer_name(event: &str, n: u64) -> String {
    format!("{}-consumer{}", event, n)
}

pub fn producer_client_id(event: &str, n: u64) -> String {
    format!("{}-producer{}", event, n)
}
