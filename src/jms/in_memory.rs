use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use super::{JmsConnector, JmsSession, TopicSubscriber};
use crate::config::ActiveMqSettings;
use crate::error::TransportError;

#[derive(Default)]
struct Mailbox {
    messages: Mutex<VecDeque<String>>,
    open: AtomicBool,
}

#[derive(Default)]
struct State {
    client_ids: HashSet<String>,
    /// topic -> (subscriber id, mailbox)
    topics: HashMap<String, Vec<(u64, Arc<Mailbox>)>>,
}

/// In-memory JMS broker with non-durable topics.
///
/// Client ids are unique among live sessions; connecting twice with the
/// same id is rejected until the first session closes.
#[derive(Clone, Default)]
pub struct InMemoryJmsBroker {
    state: Arc<Mutex<State>>,
    subscriber_ids: Arc<AtomicU64>,
}

impl InMemoryJmsBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session without going through [`JmsConnector`].
    pub fn session(&self, client_id: &str) -> Result<InMemoryJmsSession, TransportError> {
        let mut state = self.state.lock()?;
        if !state.client_ids.insert(client_id.to_string()) {
            return Err(TransportError::Rejected(format!(
                "client id {} is already in use",
                client_id
            )));
        }
        Ok(InMemoryJmsSession {
            broker: self.clone(),
            client_id: client_id.to_string(),
            open: AtomicBool::new(true),
            subscribers: Mutex::new(Vec::new()),
        })
    }

    pub fn has_topic(&self, name: &str) -> bool {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.topics.contains_key(name)
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state.topics.get(topic).map_or(0, Vec::len)
    }

    pub fn client_ids(&self) -> Vec<String> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        let mut ids: Vec<_> = state.client_ids.iter().cloned().collect();
        ids.sort();
        ids
    }

    fn unsubscribe(&self, topic: &str, id: u64) {
        let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(subscribers) = state.topics.get_mut(topic) {
            subscribers.retain(|(sub, mailbox)| {
                if *sub == id {
                    mailbox.open.store(false, Ordering::SeqCst);
                }
                *sub != id
            });
        }
    }
}

impl JmsConnector for InMemoryJmsBroker {
    fn connect(
        &self,
        _settings: &ActiveMqSettings,
        client_id: &str,
    ) -> Result<Arc<dyn JmsSession>, TransportError> {
        Ok(Arc::new(self.session(client_id)?))
    }
}

/// A session on an [`InMemoryJmsBroker`].
pub struct InMemoryJmsSession {
    broker: InMemoryJmsBroker,
    client_id: String,
    open: AtomicBool,
    subscribers: Mutex<Vec<(String, u64)>>,
}

impl InMemoryJmsSession {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Closed(format!("session {}", self.client_id)))
        }
    }
}

impl JmsSession for InMemoryJmsSession {
    fn client_id(&self) -> &str {
        &self.client_id
    }

    fn topic_exists(&self, name: &str) -> Result<bool, TransportError> {
        self.ensure_open()?;
        Ok(self.broker.state.lock()?.topics.contains_key(name))
    }

    fn create_topic(&self, name: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        self.broker
            .state
            .lock()?
            .topics
            .entry(name.to_string())
            .or_default();
        Ok(())
    }

    fn send_text(&self, topic: &str, text: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        let state = self.broker.state.lock()?;
        let subscribers = state
            .topics
            .get(topic)
            .ok_or_else(|| TransportError::NotFound(format!("topic {}", topic)))?;
        for (_, mailbox) in subscribers {
            mailbox.messages.lock()?.push_back(text.to_string());
        }
        Ok(())
    }

    fn create_subscriber(&self, topic: &str) -> Result<Box<dyn TopicSubscriber>, TransportError> {
        self.ensure_open()?;
        let id = self.broker.subscriber_ids.fetch_add(1, Ordering::SeqCst);
        let mailbox = Arc::new(Mailbox {
            messages: Mutex::new(VecDeque::new()),
            open: AtomicBool::new(true),
        });
        {
            let mut state = self.broker.state.lock()?;
            state
                .topics
                .get_mut(topic)
                .ok_or_else(|| TransportError::NotFound(format!("topic {}", topic)))?
                .push((id, Arc::clone(&mailbox)));
        }
        self.subscribers.lock()?.push((topic.to_string(), id));

        Ok(Box::new(InMemorySubscriber {
            broker: self.broker.clone(),
            topic: topic.to_string(),
            id,
            mailbox,
        }))
    }

    fn close(&self) -> Result<(), TransportError> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        let subscribers: Vec<_> = self.subscribers.lock()?.drain(..).collect();
        for (topic, id) in subscribers {
            self.broker.unsubscribe(&topic, id);
        }
        self.broker.state.lock()?.client_ids.remove(&self.client_id);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }
}

impl Drop for InMemoryJmsSession {
    fn drop(&mut self) {
        let _ = JmsSession::close(self);
    }
}

struct InMemorySubscriber {
    broker: InMemoryJmsBroker,
    topic: String,
    id: u64,
    mailbox: Arc<Mailbox>,
}

impl TopicSubscriber for InMemorySubscriber {
    fn receive(&self, timeout: Duration) -> Result<Option<String>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            if !self.mailbox.open.load(Ordering::SeqCst) {
                return Err(TransportError::Closed(format!("subscriber on {}", self.topic)));
            }
            if let Some(message) = self.mailbox.messages.lock()?.pop_front() {
                return Ok(Some(message));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn close(&self) {
        self.broker.unsubscribe(&self.topic, self.id);
    }
}
