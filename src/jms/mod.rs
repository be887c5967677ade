//! JMS topic backend (ActiveMQ-style).
//!
//! ```text
//!   JmsProducer (client id "<event>-producer<N>")
//!        │ send_text
//!        ▼
//!   topic "<event>-topic" ──► one non-durable subscriber per consumer
//!                                   │
//!                            JmsConsumer (ScheduledJob: receive with a short
//!                            timeout, dispatch each message)
//! ```
//!
//! Messages travel as text. Topics are non-durable: a subscriber only sees
//! messages sent after it was created.

mod consumer;
mod in_memory;
mod producer;

pub use consumer::JmsConsumer;
pub use in_memory::InMemoryJmsBroker;
pub use producer::JmsProducer;

use std::sync::Arc;
use std::time::Duration;

use crate::codec::Codec;
use crate::config::ActiveMqSettings;
use crate::error::{Result, TransportError};
use crate::naming::NameRegistry;

/// Opens sessions on a JMS broker. Each session carries a client id that
/// must be unique among live sessions.
pub trait JmsConnector: Send + Sync {
    fn connect(
        &self,
        settings: &ActiveMqSettings,
        client_id: &str,
    ) -> std::result::Result<Arc<dyn JmsSession>, TransportError>;
}

/// A started connection with one auto-acknowledging session.
pub trait JmsSession: Send + Sync {
    fn client_id(&self) -> &str;

    fn topic_exists(&self, name: &str) -> std::result::Result<bool, TransportError>;

    fn create_topic(&self, name: &str) -> std::result::Result<(), TransportError>;

    fn send_text(&self, topic: &str, text: &str) -> std::result::Result<(), TransportError>;

    fn create_subscriber(
        &self,
        topic: &str,
    ) -> std::result::Result<Box<dyn TopicSubscriber>, TransportError>;

    /// Close the session and its subscribers. Idempotent.
    fn close(&self) -> std::result::Result<(), TransportError>;

    fn is_open(&self) -> bool;
}

/// A non-durable topic subscriber.
pub trait TopicSubscriber: Send + Sync {
    /// Wait up to `timeout` for the next message.
    fn receive(&self, timeout: Duration) -> std::result::Result<Option<String>, TransportError>;

    fn close(&self);
}

/// Factory for JMS producers and consumers.
#[derive(Clone)]
pub struct JmsBackend {
    connector: Arc<dyn JmsConnector>,
    settings: ActiveMqSettings,
    names: Arc<NameRegistry>,
    codec: Codec,
}

impl JmsBackend {
    pub fn new(connector: Arc<dyn JmsConnector>, settings: ActiveMqSettings) -> Self {
        Self {
            connector,
            settings,
            names: NameRegistry::global(),
            codec: Codec::default(),
        }
    }

    /// A backend over a fresh [`InMemoryJmsBroker`].
    pub fn in_memory(settings: ActiveMqSettings) -> Self {
        Self::new(Arc::new(InMemoryJmsBroker::new()), settings)
    }

    pub fn with_names(mut self, names: Arc<NameRegistry>) -> Self {
        self.names = names;
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn settings(&self) -> &ActiveMqSettings {
        &self.settings
    }

    /// Producer on topic `<event>-topic`.
    pub fn producer(&self, event: &str) -> Result<JmsProducer> {
        self.producer_on(event, &crate::naming::topic_name(event))
    }

    /// Producer on an explicitly named topic.
    pub fn producer_on(&self, event: &str, topic: &str) -> Result<JmsProducer> {
        JmsProducer::create(self.clone(), event, topic)
    }

    /// Consumer on its own session (client id `<event>-consumer<N>`).
    pub fn consumer(&self, event: &str, topic: &str) -> Result<JmsConsumer> {
        JmsConsumer::connect(self, event, topic)
    }
}
