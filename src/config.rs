//! Properties loading and per-backend settings.
//!
//! Settings are read from a `key=value` properties source. A value written as
//! `${NAME}` or `${NAME:default}` is resolved against the environment variable
//! `NAME`, falling back to `default` when the variable is unset or empty, and
//! to "absent" when there is no default.
//!
//! ```text
//! aws.endpoint=${AWS_ENDPOINT:http://localhost:4566}
//! aws.enable.sns.create=true
//! rabbitmq.host=${RABBITMQ_HOST}
//! ```

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{NotificationError, Result};

/// A flat set of configuration properties.
#[derive(Debug, Clone, Default)]
pub struct Properties {
    values: HashMap<String, String>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse properties text. Lines starting with `#` or `!` are comments.
    pub fn parse(source: &str) -> Self {
        let mut values = HashMap::new();
        for line in source.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                continue;
            }
            let split = line.find(|c| c == '=' || c == ':');
            let (key, value) = match split {
                Some(at) => (&line[..at], &line[at + 1..]),
                None => (line, ""),
            };
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
        Self { values }
    }

    /// Read and parse a properties file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| NotificationError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(Self::parse(&source))
    }

    /// Set a raw (unresolved) value.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Resolved value of a property.
    pub fn get(&self, key: &str) -> Option<String> {
        let raw = self.values.get(key)?;
        resolve(raw)
    }

    /// Only a case-insensitive `true` counts as true; absent is false.
    pub fn get_bool(&self, key: &str) -> bool {
        self.get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }

    /// Parse an optional property. Absent is `Ok(None)`, malformed is an error.
    pub fn get_parsed<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            None => Ok(None),
            Some(v) => v
                .parse()
                .map(Some)
                .map_err(|e| NotificationError::Config(format!("{} = {:?}: {}", key, v, e))),
        }
    }

    fn get_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        Ok(self.get_parsed(key)?.unwrap_or(default))
    }

    fn millis_or(&self, key: &str, default: Duration) -> Result<Duration> {
        Ok(self
            .get_parsed::<u64>(key)?
            .map(Duration::from_millis)
            .unwrap_or(default))
    }
}

/// Resolve `${NAME}` / `${NAME:default}`; anything else is returned as-is.
fn resolve(raw: &str) -> Option<String> {
    let inner = match raw.strip_prefix("${").and_then(|r| r.strip_suffix('}')) {
        Some(inner) if !inner.contains('}') => inner,
        _ => return Some(raw.to_string()),
    };
    let (name, default) = match inner.split_once(':') {
        Some((name, default)) => (name, Some(default)),
        None => (inner, None),
    };
    match std::env::var(name) {
        Ok(value) if !value.is_empty() => Some(value),
        _ => default.map(str::to_string),
    }
}

/// Which substrate a [`crate::Notification`] is built on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    PubSubTopic,
    FanoutBroker,
    JmsTopic,
    PartitionedLog,
    HttpCallback,
}

impl BackendKind {
    /// Read `notification.backend`.
    pub fn from_properties(props: &Properties) -> Result<Self> {
        props
            .get("notification.backend")
            .ok_or_else(|| NotificationError::Config("notification.backend is not set".into()))?
            .parse()
    }
}

impl FromStr for BackendKind {
    type Err = NotificationError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sns" | "pubsub" => Ok(BackendKind::PubSubTopic),
            "rabbitmq" | "fanout" => Ok(BackendKind::FanoutBroker),
            "activemq" | "jms" => Ok(BackendKind::JmsTopic),
            "kafka" | "log" => Ok(BackendKind::PartitionedLog),
            "endpoint" | "http" => Ok(BackendKind::HttpCallback),
            other => Err(NotificationError::Config(format!(
                "unknown notification backend {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BackendKind::PubSubTopic => "sns",
            BackendKind::FanoutBroker => "rabbitmq",
            BackendKind::JmsTopic => "activemq",
            BackendKind::PartitionedLog => "kafka",
            BackendKind::HttpCallback => "endpoint",
        };
        f.write_str(name)
    }
}

/// Interval and batch tuning shared by pull consumers.
#[derive(Debug, Clone)]
pub struct PollSettings {
    /// Time between two polls.
    pub interval: Duration,
    /// How long a single receive call may block.
    pub receive_timeout: Duration,
    /// Upper bound on messages fetched by one receive call.
    pub max_messages: usize,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(1000),
            receive_timeout: Duration::from_millis(5),
            max_messages: 5,
        }
    }
}

/// Pub/sub topic service (SNS) and pull queue (SQS).
#[derive(Debug, Clone, Default)]
pub struct AwsSettings {
    pub endpoint: Option<String>,
    pub enable_sns_create: bool,
    pub enable_sqs_create: bool,
    pub poll: PollSettings,
}

impl AwsSettings {
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let defaults = PollSettings::default();
        Ok(Self {
            endpoint: props.get("aws.endpoint"),
            enable_sns_create: props.get_bool("aws.enable.sns.create"),
            enable_sqs_create: props.get_bool("aws.enable.sqs.create"),
            poll: PollSettings {
                interval: props.millis_or("aws.sqs.poll.interval", defaults.interval)?,
                receive_timeout: defaults.receive_timeout,
                max_messages: props.get_or("aws.sqs.max_messages", defaults.max_messages)?,
            },
        })
    }
}

/// Fanout broker (RabbitMQ).
#[derive(Debug, Clone)]
pub struct RabbitMqSettings {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub enable_exchange_create: bool,
}

impl Default for RabbitMqSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 5672,
            username: None,
            password: None,
            enable_exchange_create: false,
        }
    }
}

impl RabbitMqSettings {
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: props.get("rabbitmq.host").unwrap_or(defaults.host),
            port: props.get_or("rabbitmq.port", defaults.port)?,
            username: props.get("rabbitmq.username"),
            password: props.get("rabbitmq.password"),
            enable_exchange_create: props.get_bool("rabbitmq.enable.exchange.create"),
        })
    }
}

/// JMS-style topic broker (ActiveMQ).
#[derive(Debug, Clone)]
pub struct ActiveMqSettings {
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub enable_topic_create: bool,
    pub poll: PollSettings,
}

impl Default for ActiveMqSettings {
    fn default() -> Self {
        Self {
            host: "tcp://localhost:61616".into(),
            username: None,
            password: None,
            enable_topic_create: false,
            poll: PollSettings::default(),
        }
    }
}

impl ActiveMqSettings {
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            host: props.get("activemq.host").unwrap_or(defaults.host),
            username: props.get("activemq.username"),
            password: props.get("activemq.password"),
            enable_topic_create: props.get_bool("activemq.enable.topic.create"),
            poll: PollSettings {
                interval: props.millis_or("activemq.poll.interval", defaults.poll.interval)?,
                receive_timeout: props
                    .millis_or("activemq.receive.timeout", defaults.poll.receive_timeout)?,
                max_messages: 1,
            },
        })
    }
}

/// Partitioned log (Kafka).
#[derive(Debug, Clone)]
pub struct KafkaSettings {
    pub host: String,
    pub port: u16,
    pub enable_topic_create: bool,
    pub num_partitions: u32,
    pub num_replications: u16,
    pub enable_autocommit: bool,
    /// Minimum spacing between automatic offset commits. Closing a consumer
    /// always commits.
    pub autocommit_interval: Duration,
    pub poll: PollSettings,
}

impl Default for KafkaSettings {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 9092,
            enable_topic_create: false,
            num_partitions: 1,
            num_replications: 1,
            enable_autocommit: true,
            autocommit_interval: Duration::from_millis(1000),
            poll: PollSettings {
                interval: Duration::from_millis(1000),
                receive_timeout: Duration::from_millis(5000),
                max_messages: 500,
            },
        }
    }
}

impl KafkaSettings {
    pub fn from_properties(props: &Properties) -> Result<Self> {
        let d = Self::default();
        Ok(Self {
            host: props.get("kafka.host").unwrap_or(d.host),
            port: props.get_or("kafka.port", d.port)?,
            enable_topic_create: props.get_bool("kafka.enable.topic.create"),
            num_partitions: props.get_or("kafka.topic.num_partitions", d.num_partitions)?,
            num_replications: props.get_or("kafka.topic.num_replications", d.num_replications)?,
            enable_autocommit: props
                .get("kafka.enable.autocommit")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(d.enable_autocommit),
            autocommit_interval: props
                .millis_or("kafka.autocommit.interval", d.autocommit_interval)?,
            poll: PollSettings {
                interval: props.millis_or("kafka.poll.interval", d.poll.interval)?,
                receive_timeout: props.millis_or("kafka.poll.timeout", d.poll.receive_timeout)?,
                max_messages: props.get_or("kafka.max.poll.records", d.poll.max_messages)?,
            },
        })
    }

    /// `host:port` bootstrap address.
    pub fn bootstrap_servers(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
