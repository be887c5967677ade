//! Fanout exchange producer and push consumer.

use std::sync::{Arc, Mutex};

use notification_bus::config::RabbitMqSettings;
use notification_bus::fanout::{BrokerChannel, BrokerConnector, ExchangeKind, InMemoryChannel};
use notification_bus::{
    Consumer, FanoutBackend, InMemoryBroker, NameRegistry, NotificationError, Producer,
    TransportError,
};

use crate::support::{init_tracing, Inbox, Order};

fn settings(create: bool) -> RabbitMqSettings {
    RabbitMqSettings {
        enable_exchange_create: create,
        ..RabbitMqSettings::default()
    }
}

/// Hands out in-memory channels and keeps them for inspection.
#[derive(Default)]
struct RecordingConnector {
    broker: InMemoryBroker,
    channels: Mutex<Vec<Arc<InMemoryChannel>>>,
}

impl RecordingConnector {
    fn channel(&self, index: usize) -> Arc<InMemoryChannel> {
        Arc::clone(&self.channels.lock().unwrap()[index])
    }
}

impl BrokerConnector for RecordingConnector {
    fn connect(
        &self,
        _settings: &RabbitMqSettings,
    ) -> Result<Arc<dyn BrokerChannel>, TransportError> {
        let channel = Arc::new(self.broker.channel());
        self.channels.lock().unwrap().push(Arc::clone(&channel));
        Ok(channel as Arc<dyn BrokerChannel>)
    }
}

fn recording_backend(create: bool) -> (FanoutBackend, Arc<RecordingConnector>) {
    let connector = Arc::new(RecordingConnector::default());
    let backend = FanoutBackend::new(connector.clone(), settings(create))
        .with_names(NameRegistry::new());
    (backend, connector)
}

#[test]
fn producer_declares_the_exchange() {
    let (backend, connector) = recording_backend(true);
    let producer = backend.producer("orders").unwrap();
    assert_eq!(producer.exchange(), "orders-exchange");
    assert!(connector.broker.has_exchange("orders-exchange"));
}

#[test]
fn attach_only_requires_the_exchange() {
    let (backend, connector) = recording_backend(false);
    let err = backend.producer("orders").err().unwrap();
    assert!(matches!(
        err,
        NotificationError::CreationNotPermitted { resource: "RabbitMQ exchange", .. }
    ));
    assert!(!connector.broker.has_exchange("orders-exchange"));

    connector
        .broker
        .channel()
        .declare_exchange("orders-exchange", ExchangeKind::Fanout, true)
        .unwrap();
    assert!(backend.producer("orders").is_ok());
}

#[test]
fn consumer_queues_are_numbered_and_bound() {
    let (backend, connector) = recording_backend(true);
    let producer = backend.producer("orders").unwrap();
    let c0 = producer.consumer().unwrap();
    let c1 = backend.consumer("orders", producer.exchange()).unwrap();

    assert_eq!(c0.queue(), "orders-queue0");
    assert_eq!(c1.queue(), "orders-queue1");
    assert_eq!(
        connector.broker.bound_queues("orders-exchange"),
        vec!["orders-queue0".to_string(), "orders-queue1".to_string()]
    );
}

#[test]
fn attach_only_consumer_requires_the_exchange() {
    let (backend, connector) = recording_backend(false);
    let err = backend.consumer("orders", "orders-exchange").err().unwrap();
    assert!(matches!(
        err,
        NotificationError::CreationNotPermitted { resource: "RabbitMQ exchange", .. }
    ));
    // Nothing is left behind on the broker and the consumer's channel is closed.
    assert!(!connector.broker.has_queue("orders-queue0"));
    assert!(!connector.channel(0).is_open());
}

#[test]
fn consumer_on_a_missing_exchange_declares_no_queue() {
    let (backend, connector) = recording_backend(true);
    let err = backend.consumer("orders", "nowhere").err().unwrap();
    assert!(matches!(err, NotificationError::Transport(_)));
    assert!(!connector.broker.has_queue("orders-queue0"));
    assert!(!connector.broker.has_exchange("nowhere"));
    assert!(!connector.channel(0).is_open());
}

#[test]
fn messages_issued_before_reading_are_buffered() {
    init_tracing();
    let (backend, connector) = recording_backend(true);
    let producer = backend.producer("orders").unwrap();
    let consumer = producer.consumer().unwrap();

    producer.issue(&Order { id: 1 }).unwrap();
    producer.issue(&Order { id: 2 }).unwrap();
    assert_eq!(connector.broker.buffered(consumer.queue()), 2);

    let inbox = Inbox::new();
    consumer.on_read_start(inbox.callback()).unwrap();
    producer.issue(&Order { id: 3 }).unwrap();
    assert!(inbox.wait_for(3));
    consumer.stop();

    assert_eq!(
        inbox.orders(),
        vec![Order { id: 1 }, Order { id: 2 }, Order { id: 3 }]
    );
    assert!(inbox.deliveries().iter().all(|d| d.source == "orders-queue0"));
}

#[test]
fn standalone_consumer_owns_its_channel() {
    let (backend, connector) = recording_backend(true);
    let producer = backend.producer("orders").unwrap();
    let consumer = backend.consumer("orders", producer.exchange()).unwrap();
    let own_channel = connector.channel(1);

    let inbox = Inbox::new();
    consumer.on_read_start(inbox.callback()).unwrap();
    assert_eq!(connector.broker.consumer_count(), 1);

    consumer.stop();
    assert!(!own_channel.is_open());
    assert!(producer.channel().is_open());
    assert_eq!(connector.broker.consumer_count(), 0);
    producer.issue(&Order { id: 1 }).unwrap();
}

#[test]
fn stopping_a_shared_channel_consumer_keeps_the_producer_open() {
    let (backend, _) = recording_backend(true);
    let producer = backend.producer("orders").unwrap();
    let consumer = producer.consumer().unwrap();
    consumer.on_read_start(Inbox::new().callback()).unwrap();
    consumer.stop();

    assert!(producer.channel().is_open());
    producer.issue(&Order { id: 1 }).unwrap();
}

#[test]
fn closing_the_producer_stops_its_consumers() {
    let (backend, connector) = recording_backend(true);
    let producer = backend.producer("orders").unwrap();
    let consumer = producer.consumer().unwrap();
    let inbox = Inbox::new();
    consumer.on_read_start(inbox.callback()).unwrap();

    producer.close().unwrap();
    assert_eq!(connector.broker.consumer_count(), 0);
    assert!(matches!(
        producer.issue(&Order { id: 1 }),
        Err(NotificationError::NotProvisioned(_))
    ));
    consumer.stop();
}

#[test]
fn dropping_a_consumer_cancels_it() {
    let broker = InMemoryBroker::new();
    let backend = FanoutBackend::new(Arc::new(broker.clone()), settings(true))
        .with_names(NameRegistry::new());
    let producer = backend.producer("orders").unwrap();
    {
        let consumer = producer.consumer().unwrap();
        consumer.on_read_start(Inbox::new().callback()).unwrap();
        assert_eq!(broker.consumer_count(), 1);
    }
    assert_eq!(broker.consumer_count(), 0);
}
