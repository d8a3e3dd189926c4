//! Broker client seams.
//!
//! The connection manager, publisher and consumer loop only talk to these
//! traits. `KafkaConnector` implements them over rdkafka, `InMemoryBroker`
//! in process.

use crate::config::ConsumerConfig;
use crate::error::BrokerError;
use crate::event::{Record, RecordMetadata};
use crate::registry::TopicSpec;
use async_trait::async_trait;
use std::time::Duration;

/// Factory for the three kinds of broker clients.
#[async_trait]
pub trait BrokerConnector: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Short-lived administrative client.
    async fn connect_admin(&self) -> Result<Box<dyn TopicAdmin>, BrokerError>;

    /// Long-lived producer.
    async fn connect_producer(&self) -> Result<Box<dyn ProducerClient>, BrokerError>;

    /// Consumer bound to `config.group_id`, not yet subscribed.
    async fn connect_consumer(
        &self,
        config: &ConsumerConfig,
    ) -> Result<Box<dyn ConsumerClient>, BrokerError>;
}

/// Administrative client. Must be disconnected after use.
#[async_trait]
pub trait TopicAdmin: Send + Sync {
    async fn list_topics(&self) -> Result<Vec<String>, BrokerError>;

    /// Create one topic. Returns `BrokerError::TopicExists` when the broker
    /// already has it.
    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), BrokerError>;

    async fn disconnect(self: Box<Self>);
}

/// Producer safe for concurrent sends through `&self`.
#[async_trait]
pub trait ProducerClient: Send + Sync {
    /// Send one record and wait for the broker acknowledgement.
    async fn send(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: &[u8],
    ) -> Result<RecordMetadata, BrokerError>;

    /// Wait for in-flight records.
    async fn flush(&self, timeout: Duration) -> Result<(), BrokerError>;
}

/// Group consumer.
#[async_trait]
pub trait ConsumerClient: Send {
    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError>;

    /// Next record. Cancel safe: dropping the future never loses a record.
    async fn recv(&mut self) -> Result<Record, BrokerError>;

    /// Mark `record` as processed so its offset is committed. Records that
    /// are never acked are redelivered to the group.
    async fn ack(&mut self, record: &Record) -> Result<(), BrokerError>;

    /// Leave the group and release the client.
    async fn close(self: Box<Self>);
}
