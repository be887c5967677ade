//! Fanout broker backend (RabbitMQ-style exchanges and queues).
//!
//! ## Architecture
//!
//! ```text
//!   FanoutProducer ── publish(routing key "") ──► exchange "<event>-exchange" (fanout, durable)
//!                                                   │ bind(routing key "")
//!                                  ┌────────────────┼────────────────┐
//!                                  ▼                ▼                ▼
//!                           "<event>-queue0"  "<event>-queue1"  "<event>-queueN"
//!                                  │                │                │
//!                           FanoutConsumer (broker pushes each message to the callback)
//! ```
//!
//! A consumer built from a producer shares the producer's channel and never
//! closes it. A standalone consumer opens and owns its own channel.

mod consumer;
mod in_memory;
mod producer;

pub use consumer::FanoutConsumer;
pub use in_memory::{InMemoryBroker, InMemoryChannel};
pub use producer::FanoutProducer;

use std::sync::Arc;

use crate::codec::Codec;
use crate::config::RabbitMqSettings;
use crate::error::{Result, TransportError};
use crate::naming::NameRegistry;

/// Routing behaviour of an exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeKind {
    /// Every bound queue receives every message; routing keys are ignored.
    Fanout,
    /// Queues receive messages whose routing key equals their binding key.
    Direct,
}

/// Queue declaration flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueOptions {
    pub durable: bool,
    pub exclusive: bool,
    pub auto_delete: bool,
}

/// A message pushed to a consumer.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub exchange: String,
    pub routing_key: String,
    pub delivery_tag: u64,
    pub body: Vec<u8>,
}

/// Push callback registered with [`BrokerChannel::consume`].
pub type MessageHandler = Box<dyn FnMut(BrokerMessage) + Send + 'static>;

/// Opens channels to a broker.
pub trait BrokerConnector: Send + Sync {
    fn connect(
        &self,
        settings: &RabbitMqSettings,
    ) -> std::result::Result<Arc<dyn BrokerChannel>, TransportError>;
}

/// The channel operations the fanout backend depends on.
///
/// Every operation on a closed channel fails with [`TransportError::Closed`].
pub trait BrokerChannel: Send + Sync {
    /// Passive declare: does the exchange exist?
    fn exchange_exists(&self, name: &str) -> std::result::Result<bool, TransportError>;

    /// Declare an exchange. Redeclaring with the same kind is a no-op.
    fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        durable: bool,
    ) -> std::result::Result<(), TransportError>;

    /// Declare a queue. Redeclaring is a no-op.
    fn declare_queue(&self, name: &str, options: QueueOptions)
        -> std::result::Result<(), TransportError>;

    /// Delete a queue and its bindings. Deleting an unknown queue is a no-op.
    fn delete_queue(&self, name: &str) -> std::result::Result<(), TransportError>;

    fn bind_queue(
        &self,
        queue: &str,
        exchange: &str,
        routing_key: &str,
    ) -> std::result::Result<(), TransportError>;

    fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> std::result::Result<(), TransportError>;

    /// Start pushing messages of `queue` to `handler` with automatic
    /// acknowledgement. Returns the consumer tag.
    fn consume(
        &self,
        queue: &str,
        handler: MessageHandler,
    ) -> std::result::Result<String, TransportError>;

    /// Stop a consumer. No message is pushed to it once this returns, except
    /// one already being handled.
    fn cancel(&self, consumer_tag: &str) -> std::result::Result<(), TransportError>;

    /// Close the channel and cancel its consumers. Idempotent.
    fn close(&self) -> std::result::Result<(), TransportError>;

    fn is_open(&self) -> bool;
}

/// Routing key for both binding and publishing.
pub(crate) const ROUTING_KEY: &str = "";

/// Factory for fanout producers and consumers sharing one connector,
/// settings and name counters.
#[derive(Clone)]
pub struct FanoutBackend {
    connector: Arc<dyn BrokerConnector>,
    settings: RabbitMqSettings,
    names: Arc<NameRegistry>,
    codec: Codec,
}

impl FanoutBackend {
    pub fn new(connector: Arc<dyn BrokerConnector>, settings: RabbitMqSettings) -> Self {
        Self {
            connector,
            settings,
            names: NameRegistry::global(),
            codec: Codec::default(),
        }
    }

    /// A backend over a fresh [`InMemoryBroker`].
    pub fn in_memory(settings: RabbitMqSettings) -> Self {
        Self::new(Arc::new(InMemoryBroker::new()), settings)
    }

    pub fn with_names(mut self, names: Arc<NameRegistry>) -> Self {
        self.names = names;
        self
    }

    pub fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    pub fn settings(&self) -> &RabbitMqSettings {
        &self.settings
    }

    /// Producer on exchange `<event>-exchange`.
    pub fn producer(&self, event: &str) -> Result<FanoutProducer> {
        self.producer_on(event, &crate::naming::exchange_name(event))
    }

    /// Producer on an explicitly named exchange.
    pub fn producer_on(&self, event: &str, exchange: &str) -> Result<FanoutProducer> {
        let channel = self.connector.connect(&self.settings)?;
        FanoutProducer::create(self.clone(), event, exchange, channel)
    }

    /// Consumer on its own channel, with a fresh queue bound to `exchange`.
    pub fn consumer(&self, event: &str, exchange: &str) -> Result<FanoutConsumer> {
        let channel = self.connector.connect(&self.settings)?;
        FanoutConsumer::bind(self, event, exchange, channel, true)
    }
}
