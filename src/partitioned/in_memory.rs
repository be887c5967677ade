use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::warn;

use super::{LogCluster, LogConsumer, LogProducer, Record, RecordMetadata};
use crate::config::KafkaSettings;
use crate::error::TransportError;

#[derive(Default)]
struct State {
    /// topic -> partitions -> records
    topics: HashMap<String, Vec<Vec<Record>>>,
    /// (group, topic, partition) -> next offset
    committed: HashMap<(String, String, u32), u64>,
}

/// In-memory partitioned log.
///
/// Records are assigned to partitions by key hash. Every consumer reads all
/// partitions of its topic; group membership only scopes committed offsets.
#[derive(Clone, Default)]
pub struct InMemoryLogCluster {
    state: Arc<Mutex<State>>,
}

impl InMemoryLogCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records per partition.
    pub fn partition_sizes(&self, topic: &str) -> Vec<usize> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state
            .topics
            .get(topic)
            .map(|parts| parts.iter().map(Vec::len).collect())
            .unwrap_or_default()
    }

    /// Every record of a topic, partition by partition.
    pub fn records(&self, topic: &str) -> Vec<Record> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state
            .topics
            .get(topic)
            .map(|parts| parts.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    pub fn committed(&self, group: &str, topic: &str, partition: u32) -> Option<u64> {
        let state = self.state.lock().unwrap_or_else(|p| p.into_inner());
        state
            .committed
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
    }
}

fn partition_for(key: &str, partitions: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % partitions as u64) as usize
}

impl LogCluster for InMemoryLogCluster {
    fn list_topics(&self) -> Result<Vec<String>, TransportError> {
        let state = self.state.lock()?;
        let mut topics: Vec<_> = state.topics.keys().cloned().collect();
        topics.sort();
        Ok(topics)
    }

    fn create_topic(&self, name: &str, partitions: u32, _replication: u16) -> Result<(), TransportError> {
        if partitions == 0 {
            return Err(TransportError::Rejected(format!(
                "topic {} needs at least one partition",
                name
            )));
        }
        let mut state = self.state.lock()?;
        if state.topics.contains_key(name) {
            return Err(TransportError::AlreadyExists(format!("topic {}", name)));
        }
        state
            .topics
            .insert(name.to_string(), vec![Vec::new(); partitions as usize]);
        Ok(())
    }

    fn producer(&self, _settings: &KafkaSettings) -> Result<Arc<dyn LogProducer>, TransportError> {
        Ok(Arc::new(InMemoryLogProducer {
            cluster: self.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    fn consumer(
        &self,
        group: &str,
        settings: &KafkaSettings,
    ) -> Result<Arc<dyn LogConsumer>, TransportError> {
        Ok(Arc::new(InMemoryLogConsumer {
            cluster: self.clone(),
            group: group.to_string(),
            autocommit: settings.enable_autocommit.then_some(settings.autocommit_interval),
            last_commit: Mutex::new(Instant::now()),
            max_records: settings.poll.max_messages.max(1),
            assignment: Mutex::new(None),
            woken: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }))
    }
}

struct InMemoryLogProducer {
    cluster: InMemoryLogCluster,
    closed: AtomicBool,
}

impl LogProducer for InMemoryLogProducer {
    fn send(&self, topic: &str, key: &str, value: &[u8]) -> Result<RecordMetadata, TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(TransportError::Closed("producer".to_string()));
        }
        let mut state = self.cluster.state.lock()?;
        let partitions = state
            .topics
            .get_mut(topic)
            .ok_or_else(|| TransportError::NotFound(format!("topic {}", topic)))?;
        let partition = partition_for(key, partitions.len());
        let log = &mut partitions[partition];
        let offset = log.len() as u64;
        log.push(Record {
            topic: topic.to_string(),
            partition: partition as u32,
            offset,
            key: Some(key.to_string()),
            value: value.to_vec(),
        });
        Ok(RecordMetadata {
            partition: partition as u32,
            offset,
        })
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

struct Assignment {
    topic: String,
    /// Next offset per partition.
    positions: Vec<u64>,
}

struct InMemoryLogConsumer {
    cluster: InMemoryLogCluster,
    group: String,
    /// Autocommit interval, when enabled.
    autocommit: Option<Duration>,
    last_commit: Mutex<Instant>,
    max_records: usize,
    assignment: Mutex<Option<Assignment>>,
    woken: AtomicBool,
    closed: AtomicBool,
}

impl InMemoryLogConsumer {
    fn ensure_open(&self) -> Result<(), TransportError> {
        if self.closed.load(Ordering::SeqCst) {
            Err(TransportError::Closed(format!("consumer {}", self.group)))
        } else {
            Ok(())
        }
    }

    fn autocommit_due(&self) -> Result<(), TransportError> {
        let Some(interval) = self.autocommit else {
            return Ok(());
        };
        let due = self.last_commit.lock()?.elapsed() >= interval;
        if due {
            self.commit()?;
        }
        Ok(())
    }

    fn fetch(&self) -> Result<Vec<Record>, TransportError> {
        let state = self.cluster.state.lock()?;
        let mut assignment = self.assignment.lock()?;
        let Some(assignment) = assignment.as_mut() else {
            return Err(TransportError::Rejected(format!(
                "consumer {} is not subscribed",
                self.group
            )));
        };
        let partitions = state
            .topics
            .get(&assignment.topic)
            .ok_or_else(|| TransportError::NotFound(format!("topic {}", assignment.topic)))?;

        let mut records = Vec::new();
        for (partition, log) in partitions.iter().enumerate() {
            let position = &mut assignment.positions[partition];
            while records.len() < self.max_records && (*position as usize) < log.len() {
                records.push(log[*position as usize].clone());
                *position += 1;
            }
        }
        Ok(records)
    }
}

impl LogConsumer for InMemoryLogConsumer {
    fn subscribe(&self, topic: &str) -> Result<(), TransportError> {
        self.ensure_open()?;
        let state = self.cluster.state.lock()?;
        let partitions = state
            .topics
            .get(topic)
            .ok_or_else(|| TransportError::NotFound(format!("topic {}", topic)))?;
        let positions = partitions
            .iter()
            .enumerate()
            .map(|(partition, log)| {
                state
                    .committed
                    .get(&(self.group.clone(), topic.to_string(), partition as u32))
                    .copied()
                    .unwrap_or(log.len() as u64)
            })
            .collect();
        *self.assignment.lock()? = Some(Assignment {
            topic: topic.to_string(),
            positions,
        });
        Ok(())
    }

    fn poll(&self, timeout: Duration) -> Result<Vec<Record>, TransportError> {
        let deadline = Instant::now() + timeout;
        loop {
            self.ensure_open()?;
            if self.woken.swap(false, Ordering::SeqCst) {
                return Ok(Vec::new());
            }
            let records = self.fetch()?;
            if !records.is_empty() {
                self.autocommit_due()?;
                return Ok(records);
            }
            if Instant::now() >= deadline {
                return Ok(Vec::new());
            }
            thread::sleep(Duration::from_millis(1));
        }
    }

    fn commit(&self) -> Result<(), TransportError> {
        let mut state = self.cluster.state.lock()?;
        let assignment = self.assignment.lock()?;
        if let Some(assignment) = assignment.as_ref() {
            for (partition, offset) in assignment.positions.iter().enumerate() {
                state.committed.insert(
                    (self.group.clone(), assignment.topic.clone(), partition as u32),
                    *offset,
                );
            }
        }
        *self.last_commit.lock()? = Instant::now();
        Ok(())
    }

    fn wakeup(&self) {
        self.woken.store(true, Ordering::SeqCst);
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        if self.autocommit.is_some() {
            if let Err(e) = self.commit() {
                warn!(group = %self.group, error = %e, "final offset commit failed");
            }
        }
    }
}
