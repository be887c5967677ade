//! One producer type over every backend, selected by configuration.
//!
//! ```ignore
//! let props = Properties::load("notification.properties")?;
//! let backends = Backends::in_memory(&props)?;
//! let orders: Notification<Order> = backends.open(BackendKind::from_properties(&props)?, "orders")?;
//! let consumer = orders.subscribe()?;
//! consumer.on_read_start_decoded(|order: Order| println!("{order:?}"))?;
//! orders.issue(&Order { id: 1 })?;
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;

use crate::config::{
    ActiveMqSettings, AwsSettings, BackendKind, KafkaSettings, Properties, RabbitMqSettings,
};
use crate::consumer::Consumer;
use crate::error::{NotificationError, Result};
use crate::fanout::{FanoutBackend, FanoutProducer};
#[cfg(feature = "http")]
use crate::http::{Endpoint, HttpCallbackProducer};
use crate::jms::{JmsBackend, JmsProducer};
use crate::naming::NameRegistry;
use crate::partitioned::{PartitionedBackend, PartitionedProducer};
use crate::producer::Producer;
use crate::pubsub::{PubSubBackend, PubSubProducer};

/// A producer of any backend.
pub enum NotificationBackend {
    PubSub(PubSubProducer),
    Fanout(FanoutProducer),
    Jms(JmsProducer),
    Partitioned(PartitionedProducer),
    #[cfg(feature = "http")]
    Http(HttpCallbackProducer),
}

impl NotificationBackend {
    pub fn kind(&self) -> BackendKind {
        match self {
            NotificationBackend::PubSub(_) => BackendKind::PubSubTopic,
            NotificationBackend::Fanout(_) => BackendKind::FanoutBroker,
            NotificationBackend::Jms(_) => BackendKind::JmsTopic,
            NotificationBackend::Partitioned(_) => BackendKind::PartitionedLog,
            #[cfg(feature = "http")]
            NotificationBackend::Http(_) => BackendKind::HttpCallback,
        }
    }
}

/// A typed notification stream on one backend.
pub struct Notification<T> {
    backend: NotificationBackend,
    _payload: PhantomData<fn(&T)>,
}

impl<T: Serialize> Notification<T> {
    pub fn new(backend: NotificationBackend) -> Self {
        Self {
            backend,
            _payload: PhantomData,
        }
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn backend(&self) -> &NotificationBackend {
        &self.backend
    }

    /// A consumer built from this producer. HTTP callbacks have no consumer
    /// side and answer [`NotificationError::Unsupported`].
    pub fn subscribe(&self) -> Result<Box<dyn Consumer>> {
        let consumer: Box<dyn Consumer> = match &self.backend {
            NotificationBackend::PubSub(p) => Box::new(p.consumer()?),
            NotificationBackend::Fanout(p) => Box::new(p.consumer()?),
            NotificationBackend::Jms(p) => Box::new(p.consumer()?),
            NotificationBackend::Partitioned(p) => Box::new(p.consumer()?),
            #[cfg(feature = "http")]
            NotificationBackend::Http(_) => {
                return Err(NotificationError::Unsupported(
                    "http callbacks cannot be subscribed to".to_string(),
                ))
            }
        };
        Ok(consumer)
    }

    /// Close the producer. Further `issue` calls fail with `NotProvisioned`.
    ///
    /// What happens to consumers built from it depends on the backend. Fanout
    /// and JMS consumers share the producer's channel or session and stop
    /// receiving. Pub/sub and partitioned-log consumers read through
    /// resources of their own and keep receiving what other producers issue.
    pub fn close(&self) -> Result<()> {
        match &self.backend {
            NotificationBackend::PubSub(p) => p.close(),
            NotificationBackend::Fanout(p) => p.close()?,
            NotificationBackend::Jms(p) => p.close()?,
            NotificationBackend::Partitioned(p) => p.close(),
            #[cfg(feature = "http")]
            NotificationBackend::Http(_) => {}
        }
        Ok(())
    }
}

impl<T: Serialize> Producer<T> for Notification<T> {
    fn issue(&self, payload: &T) -> Result<()> {
        match &self.backend {
            NotificationBackend::PubSub(p) => p.issue(payload),
            NotificationBackend::Fanout(p) => p.issue(payload),
            NotificationBackend::Jms(p) => p.issue(payload),
            NotificationBackend::Partitioned(p) => p.issue(payload),
            #[cfg(feature = "http")]
            NotificationBackend::Http(p) => p.issue(payload),
        }
    }

    fn event_name(&self) -> &str {
        match &self.backend {
            NotificationBackend::PubSub(p) => Producer::<T>::event_name(p),
            NotificationBackend::Fanout(p) => Producer::<T>::event_name(p),
            NotificationBackend::Jms(p) => Producer::<T>::event_name(p),
            NotificationBackend::Partitioned(p) => Producer::<T>::event_name(p),
            #[cfg(feature = "http")]
            NotificationBackend::Http(p) => Producer::<T>::event_name(p),
        }
    }
}

/// The configured backends an application can open notifications on.
#[derive(Clone, Default)]
pub struct Backends {
    pub pubsub: Option<PubSubBackend>,
    pub fanout: Option<FanoutBackend>,
    pub jms: Option<JmsBackend>,
    pub partitioned: Option<PartitionedBackend>,
    #[cfg(feature = "http")]
    pub http: Option<Endpoint>,
}

impl Backends {
    /// Every backend over its in-memory substrate, configured from `props`
    /// and sharing one name registry.
    pub fn in_memory(props: &Properties) -> Result<Self> {
        Self::in_memory_with_names(props, NameRegistry::global())
    }

    pub fn in_memory_with_names(props: &Properties, names: Arc<NameRegistry>) -> Result<Self> {
        Ok(Self {
            pubsub: Some(
                PubSubBackend::in_memory(AwsSettings::from_properties(props)?)
                    .with_names(Arc::clone(&names)),
            ),
            fanout: Some(
                FanoutBackend::in_memory(RabbitMqSettings::from_properties(props)?)
                    .with_names(Arc::clone(&names)),
            ),
            jms: Some(
                JmsBackend::in_memory(ActiveMqSettings::from_properties(props)?)
                    .with_names(Arc::clone(&names)),
            ),
            partitioned: Some(
                PartitionedBackend::in_memory(KafkaSettings::from_properties(props)?)
                    .with_names(names),
            ),
            #[cfg(feature = "http")]
            http: Some(Endpoint::from_properties(props)?),
        })
    }

    /// Open a notification for `event` on the backend of the given kind.
    pub fn open<T: Serialize>(&self, kind: BackendKind, event: &str) -> Result<Notification<T>> {
        let missing = || NotificationError::Config(format!("backend {} is not configured", kind));
        let backend = match kind {
            BackendKind::PubSubTopic => {
                NotificationBackend::PubSub(self.pubsub.as_ref().ok_or_else(missing)?.producer(event)?)
            }
            BackendKind::FanoutBroker => {
                NotificationBackend::Fanout(self.fanout.as_ref().ok_or_else(missing)?.producer(event)?)
            }
            BackendKind::JmsTopic => {
                NotificationBackend::Jms(self.jms.as_ref().ok_or_else(missing)?.producer(event)?)
            }
            BackendKind::PartitionedLog => NotificationBackend::Partitioned(
                self.partitioned.as_ref().ok_or_else(missing)?.producer(event)?,
            ),
            #[cfg(feature = "http")]
            BackendKind::HttpCallback => {
                let endpoint = self.http.clone().ok_or_else(missing)?;
                NotificationBackend::Http(HttpCallbackProducer::new(event, endpoint)?)
            }
            #[cfg(not(feature = "http"))]
            BackendKind::HttpCallback => {
                return Err(NotificationError::Unsupported(
                    "http callbacks need the `http` feature".to_string(),
                ))
            }
        };
        Ok(Notification::new(backend))
    }
}
