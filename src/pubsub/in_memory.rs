use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use super::{QueueMessage, QueueService, TopicService};
use crate::error::TransportError;

const REGION: &str = "us-east-1";
const ACCOUNT: &str = "000000000000";
const QUEUE_HOST: &str = "http://localhost:4566";

#[derive(Default)]
struct Topic {
    arn: String,
    /// Subscribed queue URLs.
    subscribers: Vec<String>,
}

#[derive(Default)]
struct Queue {
    arn: String,
    ready: VecDeque<(String, String)>,
    in_flight: HashMap<String, (String, String)>,
}

#[derive(Default)]
struct State {
    topics: HashMap<String, Topic>,
    queues: HashMap<String, Queue>,
    queue_urls_by_arn: HashMap<String, String>,
}

/// In-memory topic and queue service with localstack-style identifiers.
///
/// - topic ARN: `arn:aws:sns:us-east-1:000000000000:<name>`
/// - queue URL: `http://localhost:4566/000000000000/<name>`
///
/// Received messages stay in flight until deleted; there is no visibility
/// timeout, so an undeleted message is never redelivered.
#[derive(Clone, Default)]
pub struct InMemoryPubSub {
    state: Arc<Mutex<State>>,
}

impl InMemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn topic_arn(name: &str) -> String {
        format!("arn:aws:sns:{}:{}:{}", REGION, ACCOUNT, name)
    }

    pub fn queue_url(name: &str) -> String {
        format!("{}/{}/{}", QUEUE_HOST, ACCOUNT, name)
    }

    fn queue_arn_for(name: &str) -> String {
        format!("arn:aws:sqs:{}:{}:{}", REGION, ACCOUNT, name)
    }

    /// Names of every topic.
    pub fn topic_names(&self) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let mut names: Vec<_> = state.topics.keys().cloned().collect();
        names.sort();
        names
    }

    /// Messages waiting in a queue (not yet received).
    pub fn pending(&self, queue_url: &str) -> usize {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.queues.get(queue_url).map_or(0, |q| q.ready.len())
    }

    /// Messages received but not yet deleted.
    pub fn in_flight(&self, queue_url: &str) -> usize {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.queues.get(queue_url).map_or(0, |q| q.in_flight.len())
    }

    /// Queue URLs subscribed to a topic.
    pub fn subscriptions(&self, topic_arn: &str) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state
            .topics
            .values()
            .find(|t| t.arn == topic_arn)
            .map(|t| t.subscribers.clone())
            .unwrap_or_default()
    }
}

impl TopicService for InMemoryPubSub {
    fn find_topic(&self, name: &str) -> Result<Option<String>, TransportError> {
        let state = self.state.lock()?;
        Ok(state.topics.get(name).map(|t| t.arn.clone()))
    }

    fn create_topic(&self, name: &str) -> Result<String, TransportError> {
        let mut state = self.state.lock()?;
        // Topic creation is idempotent upstream: the existing ARN comes back.
        let topic = state.topics.entry(name.to_string()).or_insert_with(|| Topic {
            arn: Self::topic_arn(name),
            subscribers: Vec::new(),
        });
        Ok(topic.arn.clone())
    }

    fn publish(&self, topic_arn: &str, message: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock()?;
        let subscribers = state
            .topics
            .values()
            .find(|t| t.arn == topic_arn)
            .map(|t| t.subscribers.clone())
            .ok_or_else(|| TransportError::NotFound(format!("topic {}", topic_arn)))?;

        let message_id = Uuid::new_v4().to_string();
        for url in subscribers {
            if let Some(queue) = state.queues.get_mut(&url) {
                queue
                    .ready
                    .push_back((message_id.clone(), message.to_string()));
            }
        }
        Ok(())
    }

    fn subscribe_queue(&self, topic_arn: &str, queue_arn: &str) -> Result<String, TransportError> {
        let mut state = self.state.lock()?;
        let url = state
            .queue_urls_by_arn
            .get(queue_arn)
            .cloned()
            .ok_or_else(|| TransportError::NotFound(format!("queue {}", queue_arn)))?;
        let topic = state
            .topics
            .values_mut()
            .find(|t| t.arn == topic_arn)
            .ok_or_else(|| TransportError::NotFound(format!("topic {}", topic_arn)))?;
        if !topic.subscribers.contains(&url) {
            topic.subscribers.push(url);
        }
        Ok(format!("{}:{}", topic_arn, Uuid::new_v4()))
    }
}

impl QueueService for InMemoryPubSub {
    fn find_queue(&self, name: &str) -> Result<Option<String>, TransportError> {
        let state = self.state.lock()?;
        let url = Self::queue_url(name);
        Ok(state.queues.contains_key(&url).then_some(url))
    }

    fn create_queue(&self, name: &str) -> Result<String, TransportError> {
        let mut state = self.state.lock()?;
        let url = Self::queue_url(name);
        if !state.queues.contains_key(&url) {
            let arn = Self::queue_arn_for(name);
            state.queue_urls_by_arn.insert(arn.clone(), url.clone());
            state.queues.insert(
                url.clone(),
                Queue {
                    arn,
                    ..Queue::default()
                },
            );
        }
        Ok(url)
    }

    fn queue_arn(&self, queue_url: &str) -> Result<String, TransportError> {
        let state = self.state.lock()?;
        state
            .queues
            .get(queue_url)
            .map(|q| q.arn.clone())
            .ok_or_else(|| TransportError::NotFound(format!("queue {}", queue_url)))
    }

    fn receive(&self, queue_url: &str, max: usize) -> Result<Vec<QueueMessage>, TransportError> {
        let mut state = self.state.lock()?;
        let queue = state
            .queues
            .get_mut(queue_url)
            .ok_or_else(|| TransportError::NotFound(format!("queue {}", queue_url)))?;

        let take = max.min(queue.ready.len());
        let mut received = Vec::with_capacity(take);
        for (message_id, body) in queue.ready.drain(..take) {
            let receipt_handle = Uuid::new_v4().to_string();
            queue
                .in_flight
                .insert(receipt_handle.clone(), (message_id.clone(), body.clone()));
            received.push(QueueMessage {
                message_id,
                receipt_handle,
                body,
            });
        }
        Ok(received)
    }

    fn delete(&self, queue_url: &str, receipt_handle: &str) -> Result<(), TransportError> {
        let mut state = self.state.lock()?;
        let queue = state
            .queues
            .get_mut(queue_url)
            .ok_or_else(|| TransportError::NotFound(format!("queue {}", queue_url)))?;
        queue
            .in_flight
            .remove(receipt_handle)
            .map(|_| ())
            .ok_or_else(|| TransportError::NotFound(format!("receipt {}", receipt_handle)))
    }
}
