use std::sync::Arc;

use tracing::{debug, info, warn};

use super::{PubSubBackend, QueueService};
use crate::codec::{Codec, Delivery};
use crate::consumer::{Callback, Consumer, PullDriver, ReadHandle};
use crate::error::Result;
use crate::polling::Strategy;
use crate::provision::{provision, FnControlPlane, ResourceKind};

/// Pulls notifications from a private queue subscribed to a pub/sub topic.
///
/// Each poll receives up to `max_messages`, deletes every message right after
/// receipt and then dispatches the batch in receipt order. A failed delete is
/// logged and does not abort the batch.
pub struct PullQueueConsumer {
    event: String,
    queue_url: String,
    queues: Arc<dyn QueueService>,
    codec: Codec,
    max_messages: usize,
    driver: PullDriver,
}

impl PullQueueConsumer {
    pub(super) fn subscribe(backend: PubSubBackend, event: &str, topic_arn: &str) -> Result<Self> {
        let name = backend.names.next_sqs_queue(event);
        let queues = &backend.queues;
        let plane = FnControlPlane::new(
            |name: &str| queues.find_queue(name),
            |name: &str| queues.create_queue(name),
        );
        let queue_url = provision(
            &plane,
            ResourceKind::PullQueue,
            &name,
            backend.settings.enable_sqs_create,
        )?;

        let queue_arn = backend.queues.queue_arn(&queue_url)?;
        backend.topics.subscribe_queue(topic_arn, &queue_arn)?;
        info!(event, topic = topic_arn, queue = %queue_url, "queue subscribed to topic");

        Ok(Self::for_queue(backend, event, &queue_url))
    }

    pub(super) fn for_queue(backend: PubSubBackend, event: &str, queue_url: &str) -> Self {
        let poll = &backend.settings.poll;
        Self {
            event: event.to_string(),
            queue_url: queue_url.to_string(),
            driver: PullDriver::new(queue_url, Strategy::Scheduled, poll.interval),
            max_messages: poll.max_messages,
            queues: backend.queues,
            codec: backend.codec,
        }
    }

    pub fn queue_url(&self) -> &str {
        &self.queue_url
    }
}

fn receive_batch(
    queues: &dyn QueueService,
    queue_url: &str,
    max: usize,
    codec: Codec,
) -> Result<Vec<Delivery>> {
    let messages = queues.receive(queue_url, max)?;
    let mut batch = Vec::with_capacity(messages.len());
    for message in messages {
        if let Err(e) = queues.delete(queue_url, &message.receipt_handle) {
            warn!(queue = queue_url, message_id = %message.message_id, error = %e, "failed to delete message");
        }
        match codec.from_text(&message.body) {
            Ok(body) => batch.push(Delivery::new(body, queue_url, codec)),
            Err(e) => {
                warn!(queue = queue_url, message_id = %message.message_id, error = %e, "dropping malformed message")
            }
        }
    }
    if !batch.is_empty() {
        debug!(queue = queue_url, count = batch.len(), "received messages");
    }
    Ok(batch)
}

impl Consumer for PullQueueConsumer {
    fn on_read_start(&self, callback: Callback) -> Result<ReadHandle> {
        let queues = Arc::clone(&self.queues);
        let queue_url = self.queue_url.clone();
        let max = self.max_messages;
        let codec = self.codec;
        self.driver.start(
            move || receive_batch(queues.as_ref(), &queue_url, max, codec),
            callback,
        )
    }

    fn stop(&self) {
        self.driver.stop();
    }

    fn event_name(&self) -> &str {
        &self.event
    }

    fn source(&self) -> &str {
        &self.queue_url
    }
}
