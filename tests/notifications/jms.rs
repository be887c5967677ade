//! JMS topic producer and polling consumer.

use std::sync::Arc;
use std::time::Duration;

use notification_bus::config::{ActiveMqSettings, PollSettings};
use notification_bus::jms::JmsSession;
use notification_bus::{
    Codec, Consumer, InMemoryJmsBroker, JmsBackend, NameRegistry, NotificationError, Producer,
};

use crate::support::{init_tracing, Inbox, Order};

fn settings(create: bool) -> ActiveMqSettings {
    ActiveMqSettings {
        enable_topic_create: create,
        poll: PollSettings {
            interval: Duration::from_millis(5),
            receive_timeout: Duration::from_millis(5),
            max_messages: 1,
        },
        ..ActiveMqSettings::default()
    }
}

fn backend(broker: &InMemoryJmsBroker, create: bool) -> JmsBackend {
    JmsBackend::new(Arc::new(broker.clone()), settings(create)).with_names(NameRegistry::new())
}

#[test]
fn sessions_carry_numbered_client_ids() {
    let broker = InMemoryJmsBroker::new();
    let backend = backend(&broker, true);
    let producer = backend.producer("orders").unwrap();
    let attached = producer.consumer().unwrap();
    let standalone = backend.consumer("orders", producer.topic()).unwrap();

    assert_eq!(producer.client_id(), "orders-producer0");
    assert_eq!(producer.topic(), "orders-topic");
    assert_eq!(attached.source(), "orders-consumer0");
    assert_eq!(standalone.source(), "orders-consumer1");
    assert_eq!(
        broker.client_ids(),
        vec!["orders-consumer1".to_string(), "orders-producer0".to_string()]
    );
    assert_eq!(broker.subscriber_count("orders-topic"), 2);
}

#[test]
fn a_live_client_id_cannot_connect_twice() {
    let broker = InMemoryJmsBroker::new();
    let _taken = broker.session("orders-producer0").unwrap();

    let err = backend(&broker, true).producer("orders").err().unwrap();
    assert!(matches!(err, NotificationError::Transport(_)));
}

#[test]
fn attach_only_requires_the_topic() {
    let broker = InMemoryJmsBroker::new();
    let err = backend(&broker, false).producer("orders").err().unwrap();
    assert!(matches!(
        err,
        NotificationError::CreationNotPermitted { resource: "ActiveMQ topic", .. }
    ));
    assert!(!broker.has_topic("orders-topic"));
    // The failed producer released its client id.
    assert!(broker.client_ids().is_empty());

    broker.session("admin").unwrap().create_topic("orders-topic").unwrap();
    assert!(backend(&broker, false).producer("orders").is_ok());
}

#[test]
fn standalone_consumer_on_a_missing_topic_fails() {
    let broker = InMemoryJmsBroker::new();
    let err = backend(&broker, true).consumer("orders", "nowhere").err().unwrap();
    assert!(matches!(err, NotificationError::Transport(_)));
    assert!(broker.client_ids().is_empty());
}

#[test]
fn attach_only_consumer_requires_the_topic() {
    let broker = InMemoryJmsBroker::new();
    let err = backend(&broker, false).consumer("orders", "nowhere").err().unwrap();
    assert!(matches!(
        err,
        NotificationError::CreationNotPermitted { resource: "ActiveMQ topic", .. }
    ));
    assert!(!broker.has_topic("nowhere"));
    assert!(broker.client_ids().is_empty());

    broker.session("admin").unwrap().create_topic("nowhere").unwrap();
    assert!(backend(&broker, false).consumer("orders", "nowhere").is_ok());
}

#[test]
fn messages_are_polled_one_at_a_time_in_order() {
    init_tracing();
    let broker = InMemoryJmsBroker::new();
    let producer = backend(&broker, true).producer("orders").unwrap();
    let consumer = producer.consumer().unwrap();

    for id in 0..5 {
        producer.issue(&Order { id }).unwrap();
    }
    let inbox = Inbox::new();
    consumer.on_read_start(inbox.callback()).unwrap();
    assert!(inbox.wait_for(5));
    consumer.stop();

    let ids: Vec<u32> = inbox.orders().iter().map(|o| o.id).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
}

#[test]
fn stopping_a_standalone_consumer_closes_its_session() {
    let broker = InMemoryJmsBroker::new();
    let backend = backend(&broker, true);
    let producer = backend.producer("orders").unwrap();
    let consumer = backend.consumer("orders", producer.topic()).unwrap();
    consumer.on_read_start(Inbox::new().callback()).unwrap();

    consumer.stop();
    assert_eq!(broker.client_ids(), vec!["orders-producer0".to_string()]);
    assert_eq!(broker.subscriber_count("orders-topic"), 0);
    producer.issue(&Order { id: 1 }).unwrap();
}

#[test]
fn stopping_an_attached_consumer_keeps_the_producer_session() {
    let broker = InMemoryJmsBroker::new();
    let producer = backend(&broker, true).producer("orders").unwrap();
    let consumer = producer.consumer().unwrap();
    consumer.stop();

    assert!(producer.session().is_open());
    producer.issue(&Order { id: 1 }).unwrap();
}

#[test]
fn bitcode_messages_travel_as_text() {
    let broker = InMemoryJmsBroker::new();
    let producer = backend(&broker, true)
        .with_codec(Codec::Bitcode)
        .producer("orders")
        .unwrap();
    let consumer = producer.consumer().unwrap();
    let inbox = Inbox::new();
    consumer.on_read_start(inbox.callback()).unwrap();

    producer.issue(&Order { id: 9 }).unwrap();
    assert!(inbox.wait_for(1));
    consumer.stop();
    assert_eq!(inbox.orders(), vec![Order { id: 9 }]);
}
