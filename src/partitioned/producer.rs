use std::sync::Arc;

use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use super::{LogProducer, PartitionedBackend, PartitionedConsumer};
use crate::error::Result;
use crate::polling::Strategy;
use crate::producer::Producer;
use crate::provision::{provision, FnControlPlane, ResourceKind};

/// Appends notifications to a partitioned log topic, each under a random
/// UUID key.
pub struct PartitionedProducer {
    backend: PartitionedBackend,
    event: String,
    topic: String,
    producer: Arc<dyn LogProducer>,
}

impl PartitionedProducer {
    pub(super) fn create(backend: PartitionedBackend, event: &str, topic: &str) -> Result<Self> {
        let cluster = &backend.cluster;
        let settings = &backend.settings;
        let plane = FnControlPlane::new(
            |name: &str| {
                cluster
                    .list_topics()
                    .map(|topics| topics.into_iter().find(|t| t == name))
            },
            |name: &str| {
                cluster
                    .create_topic(name, settings.num_partitions, settings.num_replications)
                    .map(|()| name.to_string())
            },
        );
        let topic = provision(
            &plane,
            ResourceKind::LogTopic,
            topic,
            settings.enable_topic_create,
        )?;
        let producer = cluster.producer(settings)?;
        debug!(event, topic = %topic, servers = %settings.bootstrap_servers(), "log producer ready");

        Ok(Self {
            backend,
            event: event.to_string(),
            topic,
            producer,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// A consumer with a fresh group on this producer's topic.
    pub fn consumer(&self) -> Result<PartitionedConsumer> {
        self.consumer_with(Strategy::Threaded)
    }

    pub fn consumer_with(&self, strategy: Strategy) -> Result<PartitionedConsumer> {
        PartitionedConsumer::subscribe(&self.backend, &self.event, &self.topic, strategy)
    }

    /// Closes the log producer; further `issue` calls fail with
    /// `NotProvisioned`. Consumers have clients of their own and keep polling.
    pub fn close(&self) {
        self.producer.close();
    }
}

impl<T: Serialize> Producer<T> for PartitionedProducer {
    fn issue(&self, payload: &T) -> Result<()> {
        let body = self.backend.codec.encode(payload)?;
        let key = Uuid::new_v4().to_string();
        let meta = self.producer.send(&self.topic, &key, &body)?;
        debug!(
            event = %self.event,
            topic = %self.topic,
            key = %key,
            partition = meta.partition,
            offset = meta.offset,
            "published notification"
        );
        Ok(())
    }

    fn event_name(&self) -> &str {
        &self.event
    }
}
