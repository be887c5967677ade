use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{channel, Sender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::debug;

use super::{
    BrokerChannel, BrokerConnector, BrokerMessage, ExchangeKind, MessageHandler, QueueOptions,
};
use crate::config::RabbitMqSettings;
use crate::error::TransportError;

struct Exchange {
    kind: ExchangeKind,
    /// (queue, binding key)
    bindings: Vec<(String, String)>,
}

#[derive(Default)]
struct Queue {
    buffer: VecDeque<BrokerMessage>,
    consumers: Vec<String>,
    next_consumer: usize,
}

struct ConsumerSlot {
    queue: String,
    sender: Sender<BrokerMessage>,
    active: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

#[derive(Default)]
struct State {
    exchanges: HashMap<String, Exchange>,
    queues: HashMap<String, Queue>,
    consumers: HashMap<String, ConsumerSlot>,
}

impl State {
    fn route(&mut self, queue: &str, message: BrokerMessage) {
        let Some(q) = self.queues.get_mut(queue) else {
            return;
        };
        if q.consumers.is_empty() {
            q.buffer.push_back(message);
            return;
        }
        let tag = &q.consumers[q.next_consumer % q.consumers.len()];
        q.next_consumer = q.next_consumer.wrapping_add(1);
        match self.consumers.get(tag) {
            Some(slot) => {
                if let Err(returned) = slot.sender.send(message) {
                    q.buffer.push_back(returned.0);
                }
            }
            None => q.buffer.push_back(message),
        }
    }
}

/// In-memory message broker with fanout and direct exchanges.
///
/// Every consumer gets a dispatcher thread that pushes messages to its
/// handler in arrival order. Queues without consumers buffer messages until
/// one attaches; several consumers on one queue receive messages round-robin.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<Mutex<State>>,
    tags: Arc<AtomicU64>,
    delivery_tags: Arc<AtomicU64>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a channel without going through [`BrokerConnector`].
    pub fn channel(&self) -> InMemoryChannel {
        InMemoryChannel {
            broker: self.clone(),
            open: AtomicBool::new(true),
            consumer_tags: Mutex::new(Vec::new()),
        }
    }

    pub fn has_exchange(&self, name: &str) -> bool {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.exchanges.contains_key(name)
    }

    /// Queues bound to an exchange, in binding order.
    pub fn bound_queues(&self, exchange: &str) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state
            .exchanges
            .get(exchange)
            .map(|e| e.bindings.iter().map(|(q, _)| q.clone()).collect())
            .unwrap_or_default()
    }

    pub fn has_queue(&self, name: &str) -> bool {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.queues.contains_key(name)
    }

    /// Messages buffered in a queue that has no consumer.
    pub fn buffered(&self, queue: &str) -> usize {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.queues.get(queue).map_or(0, |q| q.buffer.len())
    }

    pub fn consumer_count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.consumers.len()
    }

    fn cancel_consumer(&self, tag: &str) -> Result<(), TransportError> {
        let slot = {
            let mut state = self.state.lock()?;
            let slot = state
                .consumers
                .remove(tag)
                .ok_or_else(|| TransportError::NotFound(format!("consumer {}", tag)))?;
            if let Some(queue) = state.queues.get_mut(&slot.queue) {
                queue.consumers.retain(|t| t != tag);
            }
            slot
        };

        slot.active.store(false, Ordering::SeqCst);
        drop(slot.sender);
        if let Some(worker) = slot.worker {
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
        debug!(consumer_tag = tag, "consumer cancelled");
        Ok(())
    }
}

impl BrokerConnector for InMemoryBroker {
    fn connect(
        &self,
        _settings: &RabbitMqSettings,
    ) -> Result<Arc<dyn BrokerChannel>, TransportError> {
        Ok(Arc::new(self.channel()))
    }
}

/// A channel on an [`InMemoryBroker`].
pub struct InMemoryChannel {
    broker: InMemoryBroker,
    open: AtomicBool,
    consumer_tags: Mutex<Vec<String>>,
}

impl InMemoryChannel {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Closed("channel".to_string()))
        }
    }
}

impl BrokerChannel for InMemoryChannel {
    fn exchange_exists(&self, name: &str) -> Result<bool, TransportError> {
        self.ensure_open()?;
        let state = self.broker.state.lock()?;
        Ok(state.exchanges.contains_key(name))
    }

    fn declare_exchange(
        &self,
        name: &str,
        kind: ExchangeKind,
        _durable: bool,
    ) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut state = self.broker.state.lock()?;
        match state.exchanges.get(name) {
            Some(existing) if existing.kind != kind => Err(TransportError::Rejected(format!(
                "exchange {} exists with kind {:?}",
                name, existing.kind
            ))),
            Some(_) => Ok(()),
            None => {
                state.exchanges.insert(
                    name.to_string(),
                    Exchange {
                        kind,
                        bindings: Vec::new(),
                    },
                );
                Ok(())
            }
        }
    }

    fn declare_queue(&self, name: &str, _options: QueueOptions) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut state = self.broker.state.lock()?;
        state.queues.entry(name.to_string()).or_default();
        Ok(())
    }

    fn delete_queue(&self, name: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        let tags = {
            let mut state = self.broker.state.lock()?;
            for exchange in state.exchanges.values_mut() {
                exchange.bindings.retain(|(queue, _)| queue != name);
            }
            state.queues.remove(name).map(|q| q.consumers).unwrap_or_default()
        };
        for tag in tags {
            let _ = self.broker.cancel_consumer(&tag);
        }
        Ok(())
    }

    fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut state = self.broker.state.lock()?;
        if !state.queues.contains_key(queue) {
            return Err(TransportError::NotFound(format!("queue {}", queue)));
        }
        let exchange = state
            .exchanges
            .get_mut(exchange)
            .ok_or_else(|| TransportError::NotFound(format!("exchange {}", exchange)))?;
        let binding = (queue.to_string(), routing_key.to_string());
        if !exchange.bindings.contains(&binding) {
            exchange.bindings.push(binding);
        }
        Ok(())
    }

    fn publish(&self, exchange: &str, routing_key: &str, body: &[u8]) -> Result<(), TransportError> {
        self.ensure_open()?;
        let mut state = self.broker.state.lock()?;
        let ex = state
            .exchanges
            .get(exchange)
            .ok_or_else(|| TransportError::NotFound(format!("exchange {}", exchange)))?;
        let targets: Vec<String> = ex
            .bindings
            .iter()
            .filter(|(_, key)| ex.kind == ExchangeKind::Fanout || key == routing_key)
            .map(|(queue, _)| queue.clone())
            .collect();

        for queue in targets {
            let message = BrokerMessage {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                delivery_tag: self.broker.delivery_tags.fetch_add(1, Ordering::SeqCst),
                body: body.to_vec(),
            };
            state.route(&queue, message);
        }
        Ok(())
    }

    fn consume(&self, queue: &str, handler: MessageHandler) -> Result<String, TransportError> {
        self.ensure_open()?;
        let tag = format!("amq.ctag-{}", self.broker.tags.fetch_add(1, Ordering::SeqCst));
        let mut state = self.broker.state.lock()?;
        let buffered: Vec<BrokerMessage> = state
            .queues
            .get_mut(queue)
            .ok_or_else(|| TransportError::NotFound(format!("queue {}", queue)))?
            .buffer
            .drain(..)
            .collect();

        let (sender, receiver) = channel::<BrokerMessage>();
        let active = Arc::new(AtomicBool::new(true));
        let running = Arc::clone(&active);
        let mut handler = handler;
        let worker = thread::Builder::new()
            .name(tag.clone())
            .spawn(move || {
                while let Ok(message) = receiver.recv() {
                    if !running.load(Ordering::SeqCst) {
                        break;
                    }
                    handler(message);
                }
            })
            .map_err(|e| TransportError::Io(e.to_string()))?;

        for message in buffered {
            let _ = sender.send(message);
        }
        if let Some(q) = state.queues.get_mut(queue) {
            q.consumers.push(tag.clone());
        }
        state.consumers.insert(
            tag.clone(),
            ConsumerSlot {
                queue: queue.to_string(),
                sender,
                active,
                worker: Some(worker),
            },
        );
        self.consumer_tags.lock()?.push(tag.clone());
        Ok(tag)
    }

    fn cancel(&self, consumer_tag: &str) -> Result<(), TransportError> {
        self.consumer_tags.lock()?.retain(|t| t != consumer_tag);
        self.broker.cancel_consumer(consumer_tag)
    }

    fn close(&self) -> Result<(), TransportError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let tags: Vec<String> = self.consumer_tags.lock()?.drain(..).collect();
        for tag in tags {
            // Already cancelled by their owner.
            let _ = self.broker.cancel_consumer(&tag);
        }
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}
