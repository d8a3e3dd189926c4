//! Broker connection manager.
//!
//! Owns the connector and the connect retry policy. Admin clients are opened
//! per call and always disconnected; producers and consumers are handed out
//! and owned by the caller.

use crate::client::{BrokerConnector, ConsumerClient, TopicAdmin};
use crate::config::{BrokerConfig, ConsumerConfig};
use crate::consumer::ConsumerLoop;
use crate::error::BrokerError;
use crate::producer::Publisher;
use crate::registry::{TopicDef, TopicSpec};
use std::sync::Arc;
use tracing::{debug, error, info, instrument};

/// What `ensure_topic` found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicProvision {
    AlreadyExists,
    Created,
}

/// Entry point for topic provisioning and client lifecycles.
#[derive(Clone)]
pub struct BrokerManager {
    connector: Arc<dyn BrokerConnector>,
    config: BrokerConfig,
}

impl BrokerManager {
    pub fn new(connector: Arc<dyn BrokerConnector>, config: BrokerConfig) -> Self {
        Self { connector, config }
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Make sure `spec.name` exists, creating it only when absent.
    ///
    /// A create that loses a race against another process is reported as
    /// `AlreadyExists`.
    #[instrument(skip(self, spec), fields(topic = %spec.name, backend = self.connector.name()))]
    pub async fn ensure_topic(&self, spec: &TopicSpec) -> Result<TopicProvision, BrokerError> {
        spec.validate()?;

        let admin = self
            .config
            .connect_retry
            .retry("admin connect", || self.connector.connect_admin())
            .await
            .inspect_err(|e| error!(error = %e, "Failed to connect admin client"))?;

        let result = provision(admin.as_ref(), spec).await;
        admin.disconnect().await;

        match &result {
            Ok(TopicProvision::Created) => info!(
                partitions = spec.partitions,
                replication_factor = spec.replication_factor,
                "Topic created"
            ),
            Ok(TopicProvision::AlreadyExists) => debug!("Topic already exists"),
            Err(e) => error!(error = %e, "Failed to ensure topic"),
        }
        result
    }

    /// `ensure_topic` for a compile-time topic definition.
    pub async fn ensure_topic_def<T: TopicDef>(&self) -> Result<TopicProvision, BrokerError> {
        self.ensure_topic(&T::spec()).await
    }

    /// Connect the long-lived producer.
    ///
    /// Never fails: when the broker cannot be reached the error is logged and
    /// a disconnected publisher is returned, so publishing becomes a no-op.
    pub async fn connect_producer(&self) -> Publisher {
        match self
            .config
            .connect_retry
            .retry("producer connect", || self.connector.connect_producer())
            .await
        {
            Ok(producer) => {
                info!(
                    brokers = %self.config.brokers,
                    client_id = %self.config.client_id,
                    backend = self.connector.name(),
                    "Producer connected"
                );
                Publisher::connected(producer, self.config.send_timeout)
            }
            Err(e) => {
                error!(
                    brokers = %self.config.brokers,
                    error = %e,
                    "Failed to connect producer, publishing is disabled"
                );
                Publisher::disconnected()
            }
        }
    }

    /// Connect an unsubscribed group consumer.
    pub async fn connect_consumer(
        &self,
        config: &ConsumerConfig,
    ) -> Result<Box<dyn ConsumerClient>, BrokerError> {
        self.config
            .connect_retry
            .retry("consumer connect", || self.connector.connect_consumer(config))
            .await
    }

    /// Build a consumer loop sharing this manager's connector and retry policy.
    pub fn consumer_loop(&self, config: ConsumerConfig) -> ConsumerLoop {
        ConsumerLoop::new(self.clone(), config)
    }
}

async fn provision(admin: &dyn TopicAdmin, spec: &TopicSpec) -> Result<TopicProvision, BrokerError> {
    let topics = admin.list_topics().await?;
    if topics.iter().any(|t| t == &spec.name) {
        return Ok(TopicProvision::AlreadyExists);
    }

    match admin.create_topic(spec).await {
        Ok(()) => Ok(TopicProvision::Created),
        Err(BrokerError::TopicExists(_)) => Ok(TopicProvision::AlreadyExists),
        Err(e) => Err(e),
    }
}
