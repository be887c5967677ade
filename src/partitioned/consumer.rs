use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use super::{LogConsumer, PartitionedBackend};
use crate::codec::{Codec, Delivery};
use crate::consumer::{Callback, Consumer, PullDriver, ReadHandle};
use crate::error::Result;
use crate::polling::Strategy;
use crate::provision::{require, ResourceKind};

/// Reads a log topic through a consumer group of its own.
pub struct PartitionedConsumer {
    event: String,
    group: String,
    topic: String,
    consumer: Arc<dyn LogConsumer>,
    codec: Codec,
    poll_timeout: Duration,
    driver: PullDriver,
}

impl PartitionedConsumer {
    pub(super) fn subscribe(
        backend: &PartitionedBackend,
        event: &str,
        topic: &str,
        strategy: Strategy,
    ) -> Result<Self> {
        let exists = backend.cluster.list_topics()?.iter().any(|t| t == topic);
        require(
            ResourceKind::LogTopic,
            topic,
            exists,
            backend.settings.enable_topic_create,
        )?;
        let group = backend.names.next_consumer(event);
        let consumer = backend.cluster.consumer(&group, &backend.settings)?;
        if let Err(e) = consumer.subscribe(topic) {
            consumer.close();
            return Err(e.into());
        }
        info!(event, topic, group = %group, ?strategy, "consumer group subscribed");

        let poll = &backend.settings.poll;
        Ok(Self {
            event: event.to_string(),
            driver: PullDriver::new(group.clone(), strategy, poll.interval),
            group,
            topic: topic.to_string(),
            consumer,
            codec: backend.codec,
            poll_timeout: poll.receive_timeout,
        })
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

impl Consumer for PartitionedConsumer {
    fn on_read_start(&self, callback: Callback) -> Result<ReadHandle> {
        let consumer = Arc::clone(&self.consumer);
        let group = self.group.clone();
        let (timeout, codec) = (self.poll_timeout, self.codec);
        let handle = self.driver.start(
            move || {
                let records = consumer.poll(timeout)?;
                Ok(records
                    .into_iter()
                    .map(|record| {
                        let delivery = Delivery::new(record.value, group.as_str(), codec)
                            .with_offset(record.offset);
                        match record.key {
                            Some(key) => delivery.with_key(key),
                            None => delivery,
                        }
                    })
                    .collect())
            },
            callback,
        )?;

        let consumer = Arc::clone(&self.consumer);
        let source = handle.source().to_string();
        Ok(ReadHandle::new(source, move || {
            consumer.wakeup();
            handle.cancel();
        }))
    }

    fn stop(&self) {
        self.consumer.wakeup();
        self.driver.stop();
        self.consumer.close();
    }

    fn event_name(&self) -> &str {
        &self.event
    }

    fn source(&self) -> &str {
        &self.group
    }
}

impl Drop for PartitionedConsumer {
    fn drop(&mut self) {
        self.stop();
    }
}
