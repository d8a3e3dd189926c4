//! Kafka Worker Framework
//!
//! Best-effort notification plumbing on top of Kafka.
//!
//! ## Features
//!
//! - **Topic provisioning**: `BrokerManager::ensure_topic` checks before it creates
//! - **Publisher**: owned producer handle whose `publish` never fails the caller
//! - **Consumer loop**: one record at a time, each inside its own failure boundary
//! - **Backends**: `KafkaConnector` (rdkafka) and `InMemoryBroker` (tests, local dev)
//! - **Prometheus metrics**: publish and handling counters
//!
//! ## Example
//!
//! ```ignore
//! use kafka_worker::{BrokerConfig, BrokerManager, ConsumerConfig, KafkaConnector, TopicDef};
//!
//! struct MailTopic;
//! impl TopicDef for MailTopic {
//!     const TOPIC_NAME: &'static str = "send-mail";
//!     const CONSUMER_GROUP: &'static str = "mail-service-group";
//! }
//!
//! let config = BrokerConfig::new("localhost:9092");
//! let manager = BrokerManager::new(Arc::new(KafkaConnector::new(config.clone())), config);
//!
//! // Producer side
//! manager.ensure_topic_def::<MailTopic>().await?;
//! let publisher = manager.connect_producer().await;
//! publisher.publish(MailTopic::TOPIC_NAME, &message).await;
//!
//! // Consumer side
//! let consumer = manager.consumer_loop(ConsumerConfig::from_topic_def::<MailTopic>());
//! consumer.run(&handler, shutdown_rx).await?;
//! ```

mod client;
mod config;
mod consumer;
mod error;
mod event;
mod kafka;
mod manager;
mod memory;
pub mod metrics;
mod producer;
mod registry;
mod retry;

pub use client::{BrokerConnector, ConsumerClient, ProducerClient, TopicAdmin};
pub use config::{BrokerConfig, ConsumerConfig};
pub use consumer::{
    handler_fn, ConsumerLoop, ConsumerState, FnHandler, HandlerError, MessageHandler,
    RecordOutcome,
};
pub use error::BrokerError;
pub use event::{Record, RecordMetadata};
pub use kafka::KafkaConnector;
pub use manager::{BrokerManager, TopicProvision};
pub use memory::InMemoryBroker;
pub use metrics::init_metrics;
pub use producer::{PublishOutcome, Publisher};
pub use registry::{TopicDef, TopicSpec};
pub use retry::RetryPolicy;
