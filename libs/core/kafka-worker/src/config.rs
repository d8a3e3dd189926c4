//! Broker and consumer configuration
//!
//! `BrokerConfig` describes how to reach the cluster, `ConsumerConfig` what a
//! single consumer loop reads and how it treats its handler.

use crate::registry::TopicDef;
use crate::retry::RetryPolicy;
use core_config::kafka::KafkaConfig;
use std::time::Duration;

/// Connection settings shared by admin, producer and consumer clients
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Comma-separated bootstrap servers
    pub brokers: String,

    /// Client identity reported to the broker
    pub client_id: String,

    /// Retry policy for admin/producer/consumer connects
    pub connect_retry: RetryPolicy,

    /// Upper bound on waiting for a produce acknowledgement
    pub send_timeout: Duration,

    /// Timeout for metadata and admin requests
    pub metadata_timeout: Duration,
}

impl BrokerConfig {
    /// Create a config with a single connect attempt and 5s timeouts
    pub fn new(brokers: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            client_id: "mail-service".to_string(),
            connect_retry: RetryPolicy::single_attempt(),
            send_timeout: Duration::from_secs(5),
            metadata_timeout: Duration::from_secs(5),
        }
    }

    /// Build from the environment-driven `KafkaConfig`
    pub fn from_kafka_config(config: &KafkaConfig) -> Self {
        Self {
            brokers: config.brokers.clone(),
            client_id: config.client_id.clone(),
            connect_retry: RetryPolicy::exponential(
                config.connect_max_attempts,
                Duration::from_millis(config.connect_backoff_ms),
            ),
            send_timeout: Duration::from_millis(config.send_timeout_ms),
            metadata_timeout: Duration::from_millis(config.metadata_timeout_ms),
        }
    }

    /// Set the client id
    pub fn with_client_id(mut self, client_id: impl Into<String>) -> Self {
        self.client_id = client_id.into();
        self
    }

    /// Set the connect retry policy
    pub fn with_connect_retry(mut self, policy: RetryPolicy) -> Self {
        self.connect_retry = policy;
        self
    }

    /// Set the produce acknowledgement timeout
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set the metadata/admin request timeout
    pub fn with_metadata_timeout(mut self, timeout: Duration) -> Self {
        self.metadata_timeout = timeout;
        self
    }
}

/// Configuration for one consumer loop
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Topic to subscribe to
    pub topic: String,

    /// Consumer group id
    pub group_id: String,

    /// Start from the earliest retained record when the group has no
    /// committed offset. `false` only sees records produced after the
    /// group first subscribes.
    pub from_beginning: bool,

    /// Per-record handler bound (None = unbounded)
    pub handler_timeout: Option<Duration>,

    /// Pause after a receive error before polling again
    pub error_backoff: Duration,

    /// Upper bound on waiting for the group to assign partitions
    pub assignment_timeout: Duration,
}

impl ConsumerConfig {
    /// Create a consumer config with explicit topic and group
    pub fn new(topic: impl Into<String>, group_id: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            group_id: group_id.into(),
            from_beginning: false,
            handler_timeout: None,
            error_backoff: Duration::from_secs(1),
            assignment_timeout: Duration::from_secs(30),
        }
    }

    /// Create a consumer config from a `TopicDef`
    pub fn from_topic_def<T: TopicDef>() -> Self {
        Self::new(T::TOPIC_NAME, T::CONSUMER_GROUP)
    }

    /// Replay retained records on first subscription
    pub fn with_from_beginning(mut self, from_beginning: bool) -> Self {
        self.from_beginning = from_beginning;
        self
    }

    /// Bound each handler invocation
    pub fn with_handler_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.handler_timeout = timeout;
        self
    }

    /// Set the pause after a receive error
    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// Set the bound on waiting for a partition assignment
    pub fn with_assignment_timeout(mut self, timeout: Duration) -> Self {
        self.assignment_timeout = timeout;
        self
    }
}
