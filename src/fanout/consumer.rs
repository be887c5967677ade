use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use super::{BrokerChannel, BrokerMessage, FanoutBackend, QueueOptions, ROUTING_KEY};
use crate::codec::{Codec, Delivery};
use crate::consumer::{Callback, Consumer, ReadHandle};
use crate::error::{NotificationError, Result, TransportError};
use crate::provision::{require, ResourceKind};

enum ReadState {
    Idle,
    Reading(String),
    Stopped,
}

/// Receives notifications pushed by the broker to a private queue bound to
/// the producer's exchange.
pub struct FanoutConsumer {
    event: String,
    queue: String,
    channel: Arc<dyn BrokerChannel>,
    owns_channel: bool,
    codec: Codec,
    state: Mutex<ReadState>,
}

impl FanoutConsumer {
    pub(super) fn bind(
        backend: &FanoutBackend,
        event: &str,
        exchange: &str,
        channel: Arc<dyn BrokerChannel>,
        owns_channel: bool,
    ) -> Result<Self> {
        let queue = backend.names.next_broker_queue(event);
        if let Err(e) = declare_and_bind(backend, channel.as_ref(), exchange, &queue) {
            if owns_channel {
                let _ = channel.close();
            }
            return Err(e);
        }
        info!(event, exchange, queue = %queue, "queue bound to exchange");

        Ok(Self {
            event: event.to_string(),
            queue,
            channel,
            owns_channel,
            codec: backend.codec,
            state: Mutex::new(ReadState::Idle),
        })
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

/// Declare `queue` and bind it to `exchange`, which must already exist.
/// A queue whose binding fails is deleted again.
fn declare_and_bind(
    backend: &FanoutBackend,
    channel: &dyn BrokerChannel,
    exchange: &str,
    queue: &str,
) -> Result<()> {
    let exists = channel.exchange_exists(exchange)?;
    require(
        ResourceKind::Exchange,
        exchange,
        exists,
        backend.settings.enable_exchange_create,
    )?;
    channel.declare_queue(queue, QueueOptions::default())?;
    if let Err(e) = channel.bind_queue(queue, exchange, ROUTING_KEY) {
        if let Err(cleanup) = channel.delete_queue(queue) {
            warn!(queue, error = %cleanup, "deleting unbound queue failed");
        }
        return Err(e.into());
    }
    Ok(())
}

impl Consumer for FanoutConsumer {
    fn on_read_start(&self, mut callback: Callback) -> Result<ReadHandle> {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if !matches!(*state, ReadState::Idle) {
            return Err(NotificationError::AlreadyStarted(format!(
                "consumer on {}",
                self.queue
            )));
        }

        let queue = self.queue.clone();
        let codec = self.codec;
        let tag = self.channel.consume(
            &self.queue,
            Box::new(move |message: BrokerMessage| {
                callback(Delivery::new(message.body, queue.as_str(), codec));
            }),
        )?;
        *state = ReadState::Reading(tag.clone());

        let channel = Arc::clone(&self.channel);
        Ok(ReadHandle::new(self.queue.clone(), move || {
            // Unknown once the consumer itself stopped first.
            let _ = channel.cancel(&tag);
        }))
    }

    fn stop(&self) {
        let previous = {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            std::mem::replace(&mut *state, ReadState::Stopped)
        };
        if let ReadState::Reading(tag) = previous {
            match self.channel.cancel(&tag) {
                Ok(()) | Err(TransportError::NotFound(_)) => {}
                Err(e) => warn!(queue = %self.queue, error = %e, "cancel failed"),
            }
        }
        if self.owns_channel {
            if let Err(e) = self.channel.close() {
                warn!(queue = %self.queue, error = %e, "closing channel failed");
            }
        }
    }

    fn event_name(&self) -> &str {
        &self.event
    }

    fn source(&self) -> &str {
        &self.queue
    }
}

impl Drop for FanoutConsumer {
    fn drop(&mut self) {
        self.stop();
    }
}
