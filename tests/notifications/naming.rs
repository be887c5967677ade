//! Default names drawn from a shared registry.

use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;

use notification_bus::naming::CounterKind;
use notification_bus::{BackendKind, Consumer, NameRegistry, Notification};

use crate::support::{backends, Order};

#[test]
fn consumers_of_one_producer_are_numbered_from_zero() {
    let (backends, _) = backends();
    let orders: Notification<Order> = backends.open(BackendKind::PartitionedLog, "orders").unwrap();
    let sources: Vec<String> = (0..3)
        .map(|_| orders.subscribe().unwrap().source().to_string())
        .collect();
    assert_eq!(
        sources,
        vec!["orders-consumer0", "orders-consumer1", "orders-consumer2"]
    );
}

#[test]
fn queue_counter_is_shared_across_backends() {
    let (backends, names) = backends();
    let sns: Notification<Order> = backends.open(BackendKind::PubSubTopic, "orders").unwrap();
    let fanout: Notification<Order> = backends.open(BackendKind::FanoutBroker, "orders").unwrap();

    let a = sns.subscribe().unwrap();
    let b = fanout.subscribe().unwrap();
    assert!(a.source().ends_with("/orders-sqs0"));
    assert_eq!(b.source(), "orders-queue1");
    assert_eq!(names.counter(CounterKind::Queue).peek(), 2);
}

#[test]
fn names_stay_unique_under_concurrent_construction() {
    let names = NameRegistry::new();
    let barrier = Arc::new(Barrier::new(8));
    let workers: Vec<_> = (0..8)
        .map(|_| {
            let names = Arc::clone(&names);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                (0..50).map(|_| names.next_consumer("orders")).collect::<Vec<_>>()
            })
        })
        .collect();

    let mut all = HashSet::new();
    for worker in workers {
        let taken = worker.join().unwrap();
        // Each thread sees its own draws in increasing order.
        let numbers: Vec<u64> = taken
            .iter()
            .map(|n| n.trim_start_matches("orders-consumer").parse().unwrap())
            .collect();
        assert!(numbers.windows(2).all(|w| w[0] < w[1]));
        all.extend(taken);
    }
    assert_eq!(all.len(), 400);
    assert_eq!(names.counter(CounterKind::Consumer).peek(), 400);
}

#[test]
fn reset_starts_over() {
    let names = NameRegistry::new();
    names.next_producer_client_id("orders");
    names.reset();
    assert_eq!(names.next_producer_client_id("orders"), "orders-producer0");
}
