use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use super::{BrokerChannel, ExchangeKind, FanoutBackend, FanoutConsumer, ROUTING_KEY};
use crate::error::Result;
use crate::producer::Producer;
use crate::provision::{provision, FnControlPlane, ResourceKind};

/// Publishes notifications to a durable fanout exchange.
pub struct FanoutProducer {
    backend: FanoutBackend,
    event: String,
    exchange: String,
    channel: Arc<dyn BrokerChannel>,
}

impl FanoutProducer {
    pub(super) fn create(
        backend: FanoutBackend,
        event: &str,
        exchange: &str,
        channel: Arc<dyn BrokerChannel>,
    ) -> Result<Self> {
        let plane = FnControlPlane::new(
            |name: &str| {
                channel
                    .exchange_exists(name)
                    .map(|exists| exists.then(|| name.to_string()))
            },
            |name: &str| {
                channel
                    .declare_exchange(name, ExchangeKind::Fanout, true)
                    .map(|()| name.to_string())
            },
        );
        let exchange = provision(
            &plane,
            ResourceKind::Exchange,
            exchange,
            backend.settings.enable_exchange_create,
        )?;

        Ok(Self {
            backend,
            event: event.to_string(),
            exchange,
            channel,
        })
    }

    pub fn exchange(&self) -> &str {
        &self.exchange
    }

    /// The producer's channel, shared with consumers built from it.
    pub fn channel(&self) -> &Arc<dyn BrokerChannel> {
        &self.channel
    }

    /// A consumer with its own queue on this producer's channel.
    pub fn consumer(&self) -> Result<FanoutConsumer> {
        FanoutConsumer::bind(
            &self.backend,
            &self.event,
            &self.exchange,
            Arc::clone(&self.channel),
            false,
        )
    }

    /// Close the channel. Consumers built from this producer stop receiving.
    pub fn close(&self) -> Result<()> {
        self.channel.close()?;
        Ok(())
    }
}

impl<T: Serialize> Producer<T> for FanoutProducer {
    fn issue(&self, payload: &T) -> Result<()> {
        let body = self.backend.codec.encode(payload)?;
        self.channel.publish(&self.exchange, ROUTING_KEY, &body)?;
        debug!(event = %self.event, exchange = %self.exchange, "published notification");
        Ok(())
    }

    fn event_name(&self) -> &str {
        &self.event
    }
}
