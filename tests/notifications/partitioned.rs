//! Partitioned log producer and polling consumer.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use notification_bus::config::{KafkaSettings, PollSettings};
use notification_bus::partitioned::{LogCluster, LogConsumer, LogProducer};
use notification_bus::{
    Consumer, InMemoryLogCluster, NameRegistry, NotificationError, PartitionedBackend, Producer,
    Strategy, TransportError,
};
use uuid::Uuid;

use crate::support::{init_tracing, Inbox, Order};

fn settings(create: bool) -> KafkaSettings {
    KafkaSettings {
        enable_topic_create: create,
        num_partitions: 3,
        poll: PollSettings {
            interval: Duration::from_millis(5),
            receive_timeout: Duration::from_millis(20),
            max_messages: 500,
        },
        ..KafkaSettings::default()
    }
}

/// Counts topic creations on top of an in-memory cluster.
#[derive(Default)]
struct CountingCluster {
    inner: InMemoryLogCluster,
    creates: AtomicUsize,
}

impl LogCluster for CountingCluster {
    fn list_topics(&self) -> Result<Vec<String>, TransportError> {
        self.inner.list_topics()
    }

    fn create_topic(&self, name: &str, partitions: u32, replication: u16) -> Result<(), TransportError> {
        self.creates.fetch_add(1, Ordering::SeqCst);
        self.inner.create_topic(name, partitions, replication)
    }

    fn producer(&self, settings: &KafkaSettings) -> Result<Arc<dyn LogProducer>, TransportError> {
        self.inner.producer(settings)
    }

    fn consumer(
        &self,
        group: &str,
        settings: &KafkaSettings,
    ) -> Result<Arc<dyn LogConsumer>, TransportError> {
        self.inner.consumer(group, settings)
    }
}

fn backend(cluster: Arc<CountingCluster>, create: bool) -> PartitionedBackend {
    PartitionedBackend::new(cluster, settings(create)).with_names(NameRegistry::new())
}

#[test]
fn topic_is_created_once_with_configured_partitions() {
    let cluster = Arc::new(CountingCluster::default());
    let backend = backend(Arc::clone(&cluster), true);
    let first = backend.producer("orders").unwrap();
    let second = backend.producer("orders").unwrap();

    assert_eq!(first.topic(), "orders-topic");
    assert_eq!(second.topic(), "orders-topic");
    assert_eq!(cluster.creates.load(Ordering::SeqCst), 1);
    assert_eq!(cluster.inner.partition_sizes("orders-topic"), vec![0, 0, 0]);
}

#[test]
fn attach_only_requires_the_topic() {
    let cluster = Arc::new(CountingCluster::default());
    let err = backend(Arc::clone(&cluster), false)
        .producer("orders")
        .err()
        .unwrap();
    assert!(matches!(
        err,
        NotificationError::CreationNotPermitted { resource: "Kafka topic", .. }
    ));
    assert_eq!(cluster.creates.load(Ordering::SeqCst), 0);
}

#[test]
fn attach_only_consumer_requires_the_topic() {
    let cluster = Arc::new(CountingCluster::default());
    let err = backend(Arc::clone(&cluster), false)
        .consumer("orders", "orders-topic")
        .err()
        .unwrap();
    assert!(matches!(
        err,
        NotificationError::CreationNotPermitted { resource: "Kafka topic", .. }
    ));
    assert_eq!(cluster.creates.load(Ordering::SeqCst), 0);

    cluster.inner.create_topic("orders-topic", 1, 1).unwrap();
    let consumer = backend(Arc::clone(&cluster), false)
        .consumer("orders", "orders-topic")
        .unwrap();
    assert_eq!(consumer.topic(), "orders-topic");
}

#[test]
fn records_are_keyed_by_uuid() {
    let cluster = Arc::new(CountingCluster::default());
    let producer = backend(Arc::clone(&cluster), true).producer("orders").unwrap();
    for id in 0..20 {
        producer.issue(&Order { id }).unwrap();
    }

    let records = cluster.inner.records("orders-topic");
    assert_eq!(records.len(), 20);
    let keys: HashSet<String> = records
        .iter()
        .map(|r| r.key.clone().expect("keyed record"))
        .collect();
    assert_eq!(keys.len(), 20);
    assert!(keys.iter().all(|k| Uuid::parse_str(k).is_ok()));
}

#[test]
fn deliveries_carry_key_offset_and_group() {
    init_tracing();
    let cluster = Arc::new(CountingCluster::default());
    let producer = backend(Arc::clone(&cluster), true).producer("orders").unwrap();
    let consumer = producer.consumer().unwrap();
    assert_eq!(consumer.group(), "orders-consumer0");

    let inbox = Inbox::new();
    consumer.on_read_start(inbox.callback()).unwrap();
    producer.issue(&Order { id: 7 }).unwrap();
    assert!(inbox.wait_for(1));
    consumer.stop();

    let delivery = &inbox.deliveries()[0];
    let record = &cluster.inner.records("orders-topic")[0];
    assert_eq!(delivery.source, "orders-consumer0");
    assert_eq!(delivery.key, record.key);
    assert_eq!(delivery.offset, Some(0));
    assert_eq!(delivery.decode::<Order>().unwrap(), Order { id: 7 });
}

#[test]
fn every_consumer_gets_its_own_group() {
    let cluster = Arc::new(CountingCluster::default());
    let backend = backend(Arc::clone(&cluster), true);
    let producer = backend.producer("orders").unwrap();
    let groups: Vec<String> = (0..3)
        .map(|_| producer.consumer().unwrap().group().to_string())
        .collect();
    assert_eq!(
        groups,
        vec!["orders-consumer0", "orders-consumer1", "orders-consumer2"]
    );
}

#[test]
fn scheduled_strategy_reads_the_stream() {
    let cluster = Arc::new(CountingCluster::default());
    let producer = backend(Arc::clone(&cluster), true).producer("orders").unwrap();
    let consumer = producer.consumer_with(Strategy::Scheduled).unwrap();

    let inbox = Inbox::new();
    consumer.on_read_start(inbox.callback()).unwrap();
    for id in 0..10 {
        producer.issue(&Order { id }).unwrap();
    }
    assert!(inbox.wait_for(10));
    consumer.stop();

    let mut ids: Vec<u32> = inbox.orders().iter().map(|o| o.id).collect();
    ids.sort_unstable();
    assert_eq!(ids, (0..10).collect::<Vec<_>>());
}

#[test]
fn autocommit_records_group_positions() {
    let cluster = Arc::new(CountingCluster::default());
    let producer = backend(Arc::clone(&cluster), true).producer("orders").unwrap();
    let consumer = producer.consumer().unwrap();
    let inbox = Inbox::new();
    consumer.on_read_start(inbox.callback()).unwrap();
    for id in 0..6 {
        producer.issue(&Order { id }).unwrap();
    }
    assert!(inbox.wait_for(6));
    consumer.stop();

    let committed: u64 = (0..3)
        .map(|p| {
            cluster
                .inner
                .committed("orders-consumer0", "orders-topic", p)
                .unwrap_or(0)
        })
        .sum();
    assert_eq!(committed, 6);
}

#[test]
fn stop_returns_promptly_during_a_long_poll() {
    let cluster = Arc::new(CountingCluster::default());
    let mut slow = settings(true);
    slow.poll.receive_timeout = Duration::from_secs(5);
    let backend =
        PartitionedBackend::new(cluster.clone(), slow).with_names(NameRegistry::new());
    let consumer = backend.producer("orders").unwrap().consumer().unwrap();
    consumer.on_read_start(Inbox::new().callback()).unwrap();
    std::thread::sleep(Duration::from_millis(20));

    let started = std::time::Instant::now();
    consumer.stop();
    assert!(started.elapsed() < Duration::from_secs(2));
}
