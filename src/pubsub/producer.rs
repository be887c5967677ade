use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;
use tracing::debug;

use super::{PubSubBackend, PullQueueConsumer};
use crate::error::{NotificationError, Result};
use crate::naming::sns_topic_name;
use crate::producer::Producer;
use crate::provision::{provision, FnControlPlane, ResourceKind};

/// Publishes notifications to a pub/sub topic.
pub struct PubSubProducer {
    backend: PubSubBackend,
    event: String,
    topic_arn: String,
    closed: AtomicBool,
}

impl PubSubProducer {
    pub(super) fn create(backend: PubSubBackend, event: &str) -> Result<Self> {
        let name = sns_topic_name(event);
        let topics = &backend.topics;
        let plane = FnControlPlane::new(
            |name: &str| topics.find_topic(name),
            |name: &str| topics.create_topic(name),
        );
        let topic_arn = provision(
            &plane,
            ResourceKind::PubSubTopic,
            &name,
            backend.settings.enable_sns_create,
        )?;
        Ok(Self::for_topic(backend, event, &topic_arn))
    }

    pub(super) fn for_topic(backend: PubSubBackend, event: &str, topic_arn: &str) -> Self {
        Self {
            backend,
            event: event.to_string(),
            topic_arn: topic_arn.to_string(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn topic_arn(&self) -> &str {
        &self.topic_arn
    }

    /// A consumer with its own queue, subscribed to this producer's topic.
    pub fn consumer(&self) -> Result<PullQueueConsumer> {
        self.ensure_open()?;
        PullQueueConsumer::subscribe(self.backend.clone(), &self.event, &self.topic_arn)
    }

    /// Further `issue` calls fail with `NotProvisioned`. Consumers keep
    /// polling their own queues.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(NotificationError::NotProvisioned(format!(
                "topic {} is closed",
                self.topic_arn
            )));
        }
        Ok(())
    }
}

impl<T: Serialize> Producer<T> for PubSubProducer {
    fn issue(&self, payload: &T) -> Result<()> {
        let body = self.backend.codec.encode(payload)?;
        self.ensure_open()?;
        let message = self.backend.codec.to_text(&body);
        self.backend.topics.publish(&self.topic_arn, &message)?;
        debug!(event = %self.event, topic = %self.topic_arn, "published notification");
        Ok(())
    }

    fn event_name(&self) -> &str {
        &self.event
    }
}
