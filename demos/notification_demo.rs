use std::sync::Arc;
use std::thread;
use std::time::Duration;

use notification_bus::http::{router, Sink};
use notification_bus::{
    BackendKind, Backends, ConsumerExt, Delivery, Endpoint, HttpCallbackProducer, Notification,
    Producer, Properties,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Deserialize)]
struct OrderPlaced {
    id: u32,
    item: String,
}

const SUBSCRIBABLE: [BackendKind; 4] = [
    BackendKind::PubSubTopic,
    BackendKind::FanoutBroker,
    BackendKind::JmsTopic,
    BackendKind::PartitionedLog,
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "notification_bus=info".into()),
        )
        .init();

    let props = Properties::new()
        .with("aws.enable.sns.create", "true")
        .with("aws.enable.sqs.create", "true")
        .with("aws.sqs.poll.interval", "50")
        .with("rabbitmq.enable.exchange.create", "true")
        .with("activemq.enable.topic.create", "true")
        .with("activemq.poll.interval", "50")
        .with("kafka.enable.topic.create", "true")
        .with("kafka.poll.interval", "50")
        .with("kafka.poll.timeout", "100");
    let backends = Backends::in_memory(&props)?;

    for kind in SUBSCRIBABLE {
        let orders: Notification<OrderPlaced> = backends.open(kind, "orders")?;
        let consumer = orders.subscribe()?;
        consumer.on_read_start_decoded(move |order: OrderPlaced| {
            println!("[{}] received {:?}", kind, order);
        })?;

        orders.issue(&OrderPlaced {
            id: 1,
            item: "coffee".to_string(),
        })?;
        thread::sleep(Duration::from_millis(300));
        consumer.stop();
        orders.close()?;
    }

    // HTTP callbacks: serve the receiver on an ephemeral port and post to it.
    let runtime = tokio::runtime::Runtime::new()?;
    let listener = runtime.block_on(tokio::net::TcpListener::bind("127.0.0.1:0"))?;
    let addr = listener.local_addr()?;
    let sink: Sink = Arc::new(|delivery: Delivery| {
        println!("[endpoint] received {}", delivery.text());
    });
    runtime.spawn(async move {
        if let Err(e) = axum::serve(listener, router(sink)).await {
            eprintln!("receiver stopped: {}", e);
        }
    });

    let endpoint = Endpoint::new(format!("http://{}/callback", addr))?;
    let hooks = HttpCallbackProducer::new("orders", endpoint)?;
    hooks.issue(&OrderPlaced {
        id: 2,
        item: "tea".to_string(),
    })?;

    Ok(())
}
