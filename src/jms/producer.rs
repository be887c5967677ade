use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::{JmsBackend, JmsConsumer, JmsSession};
use crate::error::Result;
use crate::producer::Producer;
use crate::provision::{provision, FnControlPlane, ResourceKind};

/// Publishes notifications as text messages on a JMS topic.
pub struct JmsProducer {
    backend: JmsBackend,
    event: String,
    topic: String,
    session: Arc<dyn JmsSession>,
}

impl JmsProducer {
    pub(super) fn create(backend: JmsBackend, event: &str, topic: &str) -> Result<Self> {
        let client_id = backend.names.next_producer_client_id(event);
        let session = backend.connector.connect(&backend.settings, &client_id)?;

        let plane = FnControlPlane::new(
            |name: &str| {
                session
                    .topic_exists(name)
                    .map(|exists| exists.then(|| name.to_string()))
            },
            |name: &str| session.create_topic(name).map(|()| name.to_string()),
        );
        let topic = match provision(
            &plane,
            ResourceKind::JmsTopic,
            topic,
            backend.settings.enable_topic_create,
        ) {
            Ok(topic) => topic,
            Err(e) => {
                // The session is useless without its topic.
                let _ = session.close();
                return Err(e);
            }
        };
        debug!(event, client_id = %client_id, topic = %topic, "jms producer connected");

        Ok(Self {
            backend,
            event: event.to_string(),
            topic,
            session,
        })
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn client_id(&self) -> &str {
        self.session.client_id()
    }

    /// The producer's session, shared with consumers built from it.
    pub fn session(&self) -> &Arc<dyn JmsSession> {
        &self.session
    }

    /// A consumer subscribed through this producer's session.
    pub fn consumer(&self) -> Result<JmsConsumer> {
        JmsConsumer::attach(
            &self.backend,
            &self.event,
            &self.topic,
            Arc::clone(&self.session),
            false,
        )
    }

    /// Close the session. Consumers built from this producer stop receiving.
    pub fn close(&self) -> Result<()> {
        self.session.close()?;
        Ok(())
    }
}

impl<T: Serialize> Producer<T> for JmsProducer {
    fn issue(&self, payload: &T) -> Result<()> {
        let body = self.backend.codec.encode(payload)?;
        let text = self.backend.codec.to_text(&body);
        self.session.send_text(&self.topic, &text)?;
        debug!(event = %self.event, topic = %self.topic, "published notification");
        Ok(())
    }

    fn event_name(&self) -> &str {
        &self.event
    }
}
