//! HTTP callback producer against the axum receiver.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use notification_bus::http::{router, Sink};
use notification_bus::{
    BackendKind, Backends, Codec, Delivery, Endpoint, HttpCallbackProducer, NotificationError,
    Notification, Producer, Properties,
};
use tokio::runtime::Runtime;

use crate::support::{wait_until, Order};

/// Start the receiver on an ephemeral port. The runtime must outlive the test.
fn start_receiver(runtime: &Runtime) -> (SocketAddr, Arc<Mutex<Vec<Delivery>>>) {
    let received = Arc::new(Mutex::new(Vec::new()));
    let store = Arc::clone(&received);
    let sink: Sink = Arc::new(move |delivery: Delivery| store.lock().unwrap().push(delivery));

    let listener = runtime
        .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
        .unwrap();
    let addr = listener.local_addr().unwrap();
    runtime.spawn(async move {
        axum::serve(listener, router(sink)).await.unwrap();
    });
    (addr, received)
}

#[test]
fn callback_bodies_reach_the_receiver() {
    let runtime = Runtime::new().unwrap();
    let (addr, received) = start_receiver(&runtime);

    let endpoint = Endpoint::new(format!("http://{}/callback", addr)).unwrap();
    let producer = HttpCallbackProducer::new("orders", endpoint).unwrap();
    producer.issue(&Order { id: 1 }).unwrap();
    producer.issue(&Order { id: 2 }).unwrap();

    // The blocking client returns after the handler answered.
    let received = received.lock().unwrap();
    let orders: Vec<Order> = received.iter().map(|d| d.decode().unwrap()).collect();
    assert_eq!(orders, vec![Order { id: 1 }, Order { id: 2 }]);
    assert_eq!(received[0].source, "/callback");
}

#[test]
fn producer_can_live_inside_an_async_task() {
    let server = Runtime::new().unwrap();
    let (addr, received) = start_receiver(&server);
    let url = format!("http://{}/callback", addr);

    // Built, used and dropped on a runtime worker thread.
    let client = Runtime::new().unwrap();
    let outcome = client
        .block_on(client.spawn(async move {
            let producer = HttpCallbackProducer::new("orders", Endpoint::new(url)?)?;
            producer.issue(&Order { id: 5 })
        }))
        .unwrap();
    assert!(outcome.is_ok());

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].decode::<Order>().unwrap(), Order { id: 5 });
}

#[test]
fn bitcode_bodies_are_recognised_by_content_type() {
    let runtime = Runtime::new().unwrap();
    let (addr, received) = start_receiver(&runtime);

    let endpoint = Endpoint::new(format!("http://{}/callback", addr)).unwrap();
    let producer = HttpCallbackProducer::new("orders", endpoint)
        .unwrap()
        .with_codec(Codec::Bitcode);
    producer.issue(&Order { id: 3 }).unwrap();

    assert!(wait_until(Duration::from_secs(1), || !received
        .lock()
        .unwrap()
        .is_empty()));
    let delivery = received.lock().unwrap()[0].clone();
    assert_eq!(delivery.codec(), Codec::Bitcode);
    assert_eq!(delivery.decode::<Order>().unwrap(), Order { id: 3 });
}

#[test]
fn non_success_status_is_a_transport_error() {
    let runtime = Runtime::new().unwrap();
    let (addr, received) = start_receiver(&runtime);

    let endpoint = Endpoint::new(format!("http://{}/elsewhere", addr)).unwrap();
    let producer = HttpCallbackProducer::new("orders", endpoint).unwrap();
    assert!(matches!(
        producer.issue(&Order { id: 1 }),
        Err(NotificationError::Transport(_))
    ));
    assert!(received.lock().unwrap().is_empty());
}

#[test]
fn unreachable_endpoint_is_a_transport_error() {
    let runtime = Runtime::new().unwrap();
    // Bind and drop to find a port nobody listens on.
    let addr = runtime
        .block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))
        .unwrap()
        .local_addr()
        .unwrap();

    let endpoint = Endpoint::new(format!("http://{}/callback", addr)).unwrap();
    let producer =
        HttpCallbackProducer::with_timeout("orders", endpoint, Duration::from_secs(2)).unwrap();
    assert!(matches!(
        producer.issue(&Order { id: 1 }),
        Err(NotificationError::Transport(_))
    ));
}

#[test]
fn http_notifications_have_no_consumer_side() {
    let props = Properties::new().with("endpoint.url", "http://127.0.0.1:9/callback");
    let backends = Backends::in_memory(&props).unwrap();
    let hooks: Notification<Order> = backends.open(BackendKind::HttpCallback, "orders").unwrap();

    assert_eq!(hooks.kind(), BackendKind::HttpCallback);
    assert!(matches!(
        hooks.subscribe(),
        Err(NotificationError::Unsupported(_))
    ));
}
