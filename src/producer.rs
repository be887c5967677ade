//! The producer contract shared by every backend.

use serde::Serialize;

use crate::error::Result;

/// Publishes typed payloads as notifications of one logical event.
///
/// Implementations:
/// - `PubSubProducer` - topic service (SNS-style)
/// - `FanoutProducer` - fanout exchange on a message broker (RabbitMQ-style)
/// - `JmsProducer` - JMS topic (ActiveMQ-style)
/// - `PartitionedProducer` - partitioned log (Kafka-style)
/// - `HttpCallbackProducer` - one POST per payload
///
/// `issue` is safe to call concurrently from any thread.
pub trait Producer<T: Serialize>: Send + Sync {
    /// Serialize `payload` and publish it.
    ///
    /// A payload that serializes to `null` is rejected with
    /// [`NullPayload`](crate::NotificationError::NullPayload) before any
    /// transport call is made.
    fn issue(&self, payload: &T) -> Result<()>;

    /// The logical event name this producer publishes.
    fn event_name(&self) -> &str;

    /// Issue each payload in order, stopping at the first failure.
    fn issue_batch(&self, payloads: &[T]) -> Result<()> {
        for payload in payloads {
            self.issue(payload)?;
        }
        Ok(())
    }
}
