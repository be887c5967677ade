use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::{JmsBackend, JmsSession, TopicSubscriber};
use crate::codec::{Codec, Delivery};
use crate::consumer::{Callback, Consumer, PullDriver, ReadHandle};
use crate::error::Result;
use crate::polling::Strategy;
use crate::provision::{require, ResourceKind};

/// Polls a non-durable topic subscriber on a fixed schedule.
///
/// Each run receives up to `max_messages` messages, waiting at most
/// `receive_timeout` for each.
pub struct JmsConsumer {
    event: String,
    name: String,
    topic: String,
    session: Arc<dyn JmsSession>,
    owns_session: bool,
    subscriber: Arc<dyn TopicSubscriber>,
    codec: Codec,
    receive_timeout: Duration,
    max_messages: usize,
    driver: PullDriver,
}

impl JmsConsumer {
    pub(super) fn connect(backend: &JmsBackend, event: &str, topic: &str) -> Result<Self> {
        let client_id = backend.names.next_consumer(event);
        let session = backend.connector.connect(&backend.settings, &client_id)?;
        Self::subscribe(backend, event, topic, client_id, session, true)
    }

    pub(super) fn attach(
        backend: &JmsBackend,
        event: &str,
        topic: &str,
        session: Arc<dyn JmsSession>,
        owns_session: bool,
    ) -> Result<Self> {
        let name = backend.names.next_consumer(event);
        Self::subscribe(backend, event, topic, name, session, owns_session)
    }

    fn subscribe(
        backend: &JmsBackend,
        event: &str,
        topic: &str,
        name: String,
        session: Arc<dyn JmsSession>,
        owns_session: bool,
    ) -> Result<Self> {
        let subscribed = session
            .topic_exists(topic)
            .map_err(Into::into)
            .and_then(|exists| {
                require(
                    ResourceKind::JmsTopic,
                    topic,
                    exists,
                    backend.settings.enable_topic_create,
                )
            })
            .and_then(|()| Ok(session.create_subscriber(topic)?));
        let subscriber: Arc<dyn TopicSubscriber> = match subscribed {
            Ok(subscriber) => Arc::from(subscriber),
            Err(e) => {
                if owns_session {
                    let _ = session.close();
                }
                return Err(e);
            }
        };
        info!(event, topic, consumer = %name, "subscribed to topic");

        let poll = &backend.settings.poll;
        Ok(Self {
            event: event.to_string(),
            driver: PullDriver::new(name.clone(), Strategy::Scheduled, poll.interval),
            name,
            topic: topic.to_string(),
            session,
            owns_session,
            subscriber,
            codec: backend.codec,
            receive_timeout: poll.receive_timeout,
            max_messages: poll.max_messages.max(1),
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }
}

fn receive_batch(
    subscriber: &dyn TopicSubscriber,
    name: &str,
    timeout: Duration,
    max: usize,
    codec: Codec,
) -> Result<Vec<Delivery>> {
    let mut batch = Vec::new();
    while batch.len() < max {
        let Some(text) = subscriber.receive(timeout)? else {
            break;
        };
        match codec.from_text(&text) {
            Ok(body) => batch.push(Delivery::new(body, name, codec)),
            Err(e) => warn!(consumer = name, error = %e, "dropping malformed message"),
        }
    }
    Ok(batch)
}

impl Consumer for JmsConsumer {
    fn on_read_start(&self, callback: Callback) -> Result<ReadHandle> {
        let subscriber = Arc::clone(&self.subscriber);
        let name = self.name.clone();
        let (timeout, max, codec) = (self.receive_timeout, self.max_messages, self.codec);
        self.driver.start(
            move || receive_batch(subscriber.as_ref(), &name, timeout, max, codec),
            callback,
        )
    }

    fn stop(&self) {
        self.driver.stop();
        self.subscriber.close();
        if self.owns_session {
            if let Err(e) = self.session.close() {
                warn!(consumer = %self.name, error = %e, "closing session failed");
            }
        }
    }

    fn event_name(&self) -> &str {
        &self.event
    }

    fn source(&self) -> &str {
        &self.name
    }
}

impl Drop for JmsConsumer {
    fn drop(&mut self) {
        self.stop();
    }
}
