//! Partitioned log backend (Kafka-style).
//!
//! ```text
//!   PartitionedProducer ── send(key = uuid v4) ──► topic "<event>-topic"
//!                                                    ├── partition 0
//!                                                    └── partition N
//!   PartitionedConsumer (group "<event>-consumer<N>", one group per instance)
//!        └── ThreadedJob by default: poll(timeout) → dispatch each record
//! ```
//!
//! Every consumer instance gets its own group, so each one reads the whole
//! stream. A new group starts at the latest offset: records written before
//! the consumer subscribed are not delivered.

mod consumer;
mod in_memory;
mod producer;

pub use consumer::PartitionedConsumer;
pub use in_memory::InMemoryLogCluster;
pub use producer::PartitionedProducer;

use std::sync::Arc;
use std::time::Duration;

use crate::codec::Codec;
use crate::config::KafkaSettings;
use crate::error::{Result, TransportError};
use crate::naming::NameRegistry;
use crate::polling::Strategy;

/// A record read from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub key: Option<String>,
    pub value: Vec<u8>,
}

/// Where a sent record landed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordMetadata {
    pub partition: u32,
    pub offset: u64,
}

/// Admin operations and client factories of a log cluster.
pub trait LogCluster: Send + Sync {
    fn list_topics(&self) -> std::result::Result<Vec<String>, TransportError>;

    /// Create a topic. Answers [`TransportError::AlreadyExists`] if it exists.
    fn create_topic(
        &self,
        name: &str,
        partitions: u32,
        replication: u16,
    ) -> std::result::Result<(), TransportError>;

    fn producer(
        &self,
        settings: &KafkaSettings,
    ) -> std::result::Result<Arc<dyn LogProducer>, TransportError>;

    fn consumer(
        &self,
        group: &str,
        settings: &KafkaSettings,
    ) -> std::result::Result<Arc<dyn LogConsumer>, TransportError>;
}

pub trait LogProducer: Send + Sync {
    fn send(
        &self,
        topic: &str,
        key: &str,
        value: &[u8],
    ) -> std::result::Result<RecordMetadata, TransportError>;

    fn close(&self);
}

/// A group member reading one topic.
pub trait LogConsumer: Send + Sync {
    /// Subscribe to a topic, starting at the group's committed offsets or,
    /// for a new group, at the end of each partition.
    fn subscribe(&self, topic: &str) -> std::result::Result<(), TransportError>;

    /// Wait up to `timeout` for records.
    fn poll(&self, timeout: Duration) -> std::result::Result<Vec<Record>, TransportError>;

    /// Commit the current positions for the group.
    fn commit(&self) -> std::result::Result<(), TransportError>;

    /// Make a blocked or the next `poll` return early with no records.
    fn wakeup(&self);

    fn close(&self);
}

/// Factory for partitioned-log producers and consumers.
#[derive(Clone)]
pub struct PartitionedBackend {
    cluster: Arc<dyn LogCluster>,
    settings: KafkaSettings,
    names: Arc<NameRegistry>,
    codec: Codec,
}

impl PartitionedBackend {
    pub fn new(cluster: Arc<dyn LogCluster>, settings: KafkaSettings) -> Self {
        Self {
            cluster,
            settings,
            names: NameRegistry::global(),
            codec: Codec::default(),
        }
    }

    /// A backend over a fresh [`InMemoryLogCluster`].
    pub fn in_memory(settings: KafkaSettings) -> Self {
        Self::new(Arc::new(InMemoryLogCluster::new()), settings)
    }

    pub fn with_names(mut self, names: Arc<NameRegistry>) -> Self {
        self.names = names;
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn settings(&self) -> &KafkaSettings {
        &self.settings
    }

    /// Producer on topic `<event>-topic`.
    pub fn producer(&self, event: &str) -> Result<PartitionedProducer> {
        self.producer_on(event, &crate::naming::topic_name(event))
    }

    /// Producer on an explicitly named topic.
    pub fn producer_on(&self, event: &str, topic: &str) -> Result<PartitionedProducer> {
        PartitionedProducer::create(self.clone(), event, topic)
    }

    /// Consumer with a fresh group, driven by a [`ThreadedJob`](crate::polling::ThreadedJob).
    pub fn consumer(&self, event: &str, topic: &str) -> Result<PartitionedConsumer> {
        self.consumer_with(event, topic, Strategy::Threaded)
    }

    /// Consumer with a fresh group, driven by the given strategy.
    pub fn consumer_with(
        &self,
        event: &str,
        topic: &str,
        strategy: Strategy,
    ) -> Result<PartitionedConsumer> {
        PartitionedConsumer::subscribe(self, event, topic, strategy)
    }
}
