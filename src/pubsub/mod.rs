//! Pub/sub topic backend (SNS-style topics fanned out to SQS-style pull queues).
//!
//! ## Architecture
//!
//! ```text
//!   PubSubProducer ── publish ──► topic "<event>-sns"
//!                                    │ one subscription per consumer
//!                     ┌──────────────┼──────────────┐
//!                     ▼              ▼              ▼
//!               "<event>-sqs0"  "<event>-sqs1"  "<event>-sqsN"
//!                     │              │              │
//!              PullQueueConsumer (ScheduledJob: receive, delete, dispatch)
//! ```
//!
//! The backend talks to its substrate through [`TopicService`] and
//! [`QueueService`]. [`InMemoryPubSub`] implements both for tests and
//! single-process use; a cloud client implements them for production.
//! Topics deliver raw message bodies to queues, without an envelope.

mod consumer;
mod in_memory;
mod producer;

pub use consumer::PullQueueConsumer;
pub use in_memory::InMemoryPubSub;
pub use producer::PubSubProducer;

use std::sync::Arc;

use crate::codec::Codec;
use crate::config::AwsSettings;
use crate::error::{Result, TransportError};
use crate::naming::NameRegistry;

/// One message taken from a pull queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub message_id: String,
    /// Handle that acknowledges (deletes) this receipt.
    pub receipt_handle: String,
    pub body: String,
}

/// Control and data plane of a topic service.
pub trait TopicService: Send + Sync {
    /// ARN of the topic named `name`, if it exists.
    fn find_topic(&self, name: &str) -> std::result::Result<Option<String>, TransportError>;

    /// Create a topic and return its ARN.
    fn create_topic(&self, name: &str) -> std::result::Result<String, TransportError>;

    /// Publish a text message to every queue subscribed to the topic.
    fn publish(&self, topic_arn: &str, message: &str) -> std::result::Result<(), TransportError>;

    /// Subscribe a queue (by ARN) to a topic. Returns the subscription ARN.
    fn subscribe_queue(
        &self,
        topic_arn: &str,
        queue_arn: &str,
    ) -> std::result::Result<String, TransportError>;
}

/// Control and data plane of a pull-queue service.
pub trait QueueService: Send + Sync {
    /// URL of the queue named `name`, if it exists.
    fn find_queue(&self, name: &str) -> std::result::Result<Option<String>, TransportError>;

    /// Create a queue and return its URL.
    fn create_queue(&self, name: &str) -> std::result::Result<String, TransportError>;

    /// ARN of the queue at `queue_url`.
    fn queue_arn(&self, queue_url: &str) -> std::result::Result<String, TransportError>;

    /// Take up to `max` messages, oldest first.
    fn receive(
        &self,
        queue_url: &str,
        max: usize,
    ) -> std::result::Result<Vec<QueueMessage>, TransportError>;

    /// Acknowledge a received message.
    fn delete(&self, queue_url: &str, receipt_handle: &str)
        -> std::result::Result<(), TransportError>;
}

/// Factory for pub/sub producers and pull-queue consumers sharing one set of
/// clients, settings and name counters.
#[derive(Clone)]
pub struct PubSubBackend {
    topics: Arc<dyn TopicService>,
    queues: Arc<dyn QueueService>,
    settings: AwsSettings,
    names: Arc<NameRegistry>,
    codec: Codec,
}

impl PubSubBackend {
    pub fn new(
        topics: Arc<dyn TopicService>,
        queues: Arc<dyn QueueService>,
        settings: AwsSettings,
    ) -> Self {
        Self {
            topics,
            queues,
            settings,
            names: NameRegistry::global(),
            codec: Codec::default(),
        }
    }

    /// A backend over a fresh [`InMemoryPubSub`].
    pub fn in_memory(settings: AwsSettings) -> Self {
        let service = Arc::new(InMemoryPubSub::new());
        Self::new(service.clone(), service, settings)
    }

    pub fn with_names(mut self, names: Arc<NameRegistry>) -> Self {
        self.names = names;
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn settings(&self) -> &AwsSettings {
        &self.settings
    }

    /// Producer on topic `<event>-sns`, created if allowed.
    pub fn producer(&self, event: &str) -> Result<PubSubProducer> {
        PubSubProducer::create(self.clone(), event)
    }

    /// Producer attached to a known topic ARN. No lookup is made; a missing
    /// topic surfaces on the first `issue`.
    pub fn producer_for_topic(&self, event: &str, topic_arn: &str) -> PubSubProducer {
        PubSubProducer::for_topic(self.clone(), event, topic_arn)
    }

    /// Consumer with a fresh queue `<event>-sqs<N>` subscribed to `topic_arn`.
    pub fn consumer(&self, event: &str, topic_arn: &str) -> Result<PullQueueConsumer> {
        PullQueueConsumer::subscribe(self.clone(), event, topic_arn)
    }

    /// Consumer reading an existing queue. No subscription is made.
    pub fn consumer_for_queue(&self, event: &str, queue_url: &str) -> PullQueueConsumer {
        PullQueueConsumer::for_queue(self.clone(), event, queue_url)
    }
}
