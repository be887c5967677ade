//! Pub/sub topic producer and pull-queue consumer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notification_bus::config::{AwsSettings, PollSettings};
use notification_bus::pubsub::{QueueMessage, QueueService, TopicService};
use notification_bus::{
    Codec, Consumer, InMemoryPubSub, NameRegistry, NotificationError, Producer, PubSubBackend,
    TransportError,
};

use crate::support::{init_tracing, Inbox, Order};

fn settings(create: bool) -> AwsSettings {
    AwsSettings {
        enable_sns_create: create,
        enable_sqs_create: create,
        poll: PollSettings {
            interval: Duration::from_millis(5),
            ..PollSettings::default()
        },
        ..AwsSettings::default()
    }
}

fn backend(service: &Arc<InMemoryPubSub>, create: bool) -> PubSubBackend {
    PubSubBackend::new(service.clone(), service.clone(), settings(create))
        .with_names(NameRegistry::new())
}

#[test]
fn producer_creates_sns_topic_once() {
    let service = Arc::new(InMemoryPubSub::new());
    let backend = backend(&service, true);
    let a = backend.producer("orders").unwrap();
    let b = backend.producer("orders").unwrap();

    assert_eq!(a.topic_arn(), "arn:aws:sns:us-east-1:000000000000:orders-sns");
    assert_eq!(a.topic_arn(), b.topic_arn());
    assert_eq!(service.topic_names(), vec!["orders-sns".to_string()]);
}

#[test]
fn attach_only_requires_the_topic() {
    let service = Arc::new(InMemoryPubSub::new());
    let err = backend(&service, false).producer("orders").err().unwrap();
    assert!(matches!(
        err,
        NotificationError::CreationNotPermitted { resource: "AWS SNS topic", .. }
    ));
    assert!(err
        .to_string()
        .starts_with("the application is not allowed to create a new AWS SNS topic"));

    service.create_topic("orders-sns").unwrap();
    assert!(backend(&service, false).producer("orders").is_ok());
}

#[test]
fn consumer_queues_are_numbered_per_instance() {
    let service = Arc::new(InMemoryPubSub::new());
    let backend = backend(&service, true);
    let producer = backend.producer("orders").unwrap();

    let c0 = producer.consumer().unwrap();
    let c1 = backend.consumer("orders", producer.topic_arn()).unwrap();
    assert_eq!(c0.queue_url(), "http://localhost:4566/000000000000/orders-sqs0");
    assert_eq!(c1.queue_url(), "http://localhost:4566/000000000000/orders-sqs1");
    assert_eq!(service.subscriptions(producer.topic_arn()).len(), 2);
}

#[test]
fn queue_creation_can_be_forbidden() {
    let service = Arc::new(InMemoryPubSub::new());
    let arn = service.create_topic("orders-sns").unwrap();
    let err = backend(&service, false).consumer("orders", &arn).err().unwrap();
    assert!(matches!(
        err,
        NotificationError::CreationNotPermitted { resource: "AWS SQS queue", .. }
    ));
}

#[test]
fn messages_are_deleted_before_dispatch() {
    init_tracing();
    let service = Arc::new(InMemoryPubSub::new());
    let producer = backend(&service, true).producer("orders").unwrap();
    let consumer = producer.consumer().unwrap();

    let observed = Arc::clone(&service);
    let url = consumer.queue_url().to_string();
    let in_flight_at_dispatch = Arc::new(AtomicUsize::new(usize::MAX));
    let seen = Arc::clone(&in_flight_at_dispatch);
    consumer
        .on_read_start(Box::new(move |_| {
            seen.store(observed.in_flight(&url), Ordering::SeqCst);
        }))
        .unwrap();

    producer.issue(&Order { id: 1 }).unwrap();
    assert!(crate::support::wait_until(Duration::from_secs(2), || {
        in_flight_at_dispatch.load(Ordering::SeqCst) != usize::MAX
    }));
    assert_eq!(in_flight_at_dispatch.load(Ordering::SeqCst), 0);
    consumer.stop();
}

#[test]
fn batches_are_dispatched_in_receipt_order() {
    let service = Arc::new(InMemoryPubSub::new());
    let producer = backend(&service, true).producer("orders").unwrap();
    let consumer = producer.consumer().unwrap();
    for id in 0..12 {
        producer.issue(&Order { id }).unwrap();
    }

    let inbox = Inbox::new();
    consumer.on_read_start(inbox.callback()).unwrap();
    assert!(inbox.wait_for(12));
    consumer.stop();

    let ids: Vec<u32> = inbox.orders().iter().map(|o| o.id).collect();
    assert_eq!(ids, (0..12).collect::<Vec<_>>());
    assert_eq!(service.pending(consumer.queue_url()), 0);
}

#[test]
fn existing_queue_consumer_does_not_subscribe() {
    let service = Arc::new(InMemoryPubSub::new());
    let backend = backend(&service, true);
    let producer = backend.producer("orders").unwrap();
    let subscribed = producer.consumer().unwrap();

    let reader = backend.consumer_for_queue("orders", subscribed.queue_url());
    assert_eq!(service.subscriptions(producer.topic_arn()).len(), 1);

    let inbox = Inbox::new();
    reader.on_read_start(inbox.callback()).unwrap();
    producer.issue(&Order { id: 5 }).unwrap();
    assert!(inbox.wait_for(1));
    assert_eq!(inbox.deliveries()[0].source, subscribed.queue_url());
    reader.stop();
}

#[test]
fn explicit_topic_arn_fails_on_issue_when_missing() {
    let service = Arc::new(InMemoryPubSub::new());
    let producer = backend(&service, false)
        .producer_for_topic("orders", &InMemoryPubSub::topic_arn("missing"));
    assert!(matches!(
        producer.issue(&Order { id: 1 }),
        Err(NotificationError::Transport(_))
    ));
}

#[test]
fn bitcode_bodies_travel_as_base64_text() {
    let service = Arc::new(InMemoryPubSub::new());
    let backend = backend(&service, true).with_codec(Codec::Bitcode);
    let producer = backend.producer("orders").unwrap();
    let consumer = producer.consumer().unwrap();

    let inbox = Inbox::new();
    consumer.on_read_start(inbox.callback()).unwrap();
    producer.issue(&Order { id: 42 }).unwrap();
    assert!(inbox.wait_for(1));
    consumer.stop();

    let delivery = &inbox.deliveries()[0];
    assert_eq!(delivery.codec(), Codec::Bitcode);
    assert_eq!(delivery.decode::<Order>().unwrap(), Order { id: 42 });
}

/// Fails every other receive and every delete.
struct Flaky {
    inner: InMemoryPubSub,
    receives: AtomicUsize,
}

impl QueueService for Flaky {
    fn find_queue(&self, name: &str) -> Result<Option<String>, TransportError> {
        self.inner.find_queue(name)
    }

    fn create_queue(&self, name: &str) -> Result<String, TransportError> {
        self.inner.create_queue(name)
    }

    fn queue_arn(&self, queue_url: &str) -> Result<String, TransportError> {
        self.inner.queue_arn(queue_url)
    }

    fn receive(&self, queue_url: &str, max: usize) -> Result<Vec<QueueMessage>, TransportError> {
        if self.receives.fetch_add(1, Ordering::SeqCst) % 2 == 0 {
            return Err(TransportError::Io("connection reset".into()));
        }
        self.inner.receive(queue_url, max)
    }

    fn delete(&self, _queue_url: &str, _receipt: &str) -> Result<(), TransportError> {
        Err(TransportError::Rejected("access denied".into()))
    }
}

#[test]
fn poll_and_delete_failures_do_not_stop_the_consumer() {
    init_tracing();
    let inner = InMemoryPubSub::new();
    let flaky = Arc::new(Flaky {
        inner: inner.clone(),
        receives: AtomicUsize::new(0),
    });
    let backend = PubSubBackend::new(Arc::new(inner), flaky, settings(true))
        .with_names(NameRegistry::new());
    let producer = backend.producer("orders").unwrap();
    let consumer = producer.consumer().unwrap();

    let inbox = Inbox::new();
    consumer.on_read_start(inbox.callback()).unwrap();
    producer.issue(&Order { id: 1 }).unwrap();
    producer.issue(&Order { id: 2 }).unwrap();
    assert!(inbox.wait_for(2));
    consumer.stop();
    assert_eq!(inbox.orders(), vec![Order { id: 1 }, Order { id: 2 }]);
}
