mod codec;
mod consumer;
mod error;
mod notification;
mod producer;

pub mod config;
pub mod fanout;
#[cfg(feature = "http")]
pub mod http;
pub mod jms;
pub mod naming;
pub mod partitioned;
pub mod polling;
pub mod provision;
pub mod pubsub;

pub use codec::{Codec, Delivery};
pub use config::{BackendKind, Properties};
pub use consumer::{Callback, Consumer, ConsumerExt, ReadHandle};
pub use error::{NotificationError, Result, TransportError};
pub use naming::NameRegistry;
pub use notification::{Backends, Notification, NotificationBackend};
pub use polling::{JobState, Poller, ScheduledJob, Strategy, ThreadedJob, Work};
pub use producer::Producer;

pub use fanout::{FanoutBackend, FanoutConsumer, FanoutProducer, InMemoryBroker};
#[cfg(feature = "http")]
pub use http::{Endpoint, HttpCallbackProducer};
pub use jms::{InMemoryJmsBroker, JmsBackend, JmsConsumer, JmsProducer};
pub use partitioned::{
    InMemoryLogCluster, PartitionedBackend, PartitionedConsumer, PartitionedProducer,
};
pub use pubsub::{InMemoryPubSub, PubSubBackend, PubSubProducer, PullQueueConsumer};
