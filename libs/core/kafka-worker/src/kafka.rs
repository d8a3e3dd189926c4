//! rdkafka backend.
//!
//! librdkafka connects lazily, so every connect ends with a metadata request
//! to surface an unreachable cluster at connect time. Blocking librdkafka
//! calls (metadata, flush, final commit) run on the blocking pool.
//!
//! Consumers run with `enable.auto.offset.store=false`: auto-commit only
//! ever commits offsets stored through `ack`, i.e. records whose handler has
//! finished.

use crate::client::{BrokerConnector, ConsumerClient, ProducerClient, TopicAdmin};
use crate::config::{BrokerConfig, ConsumerConfig};
use crate::error::BrokerError;
use crate::event::{Record, RecordMetadata};
use crate::registry::TopicSpec;
use async_trait::async_trait;
use chrono::DateTime;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::{ClientContext, DefaultClientContext};
use rdkafka::consumer::{CommitMode, Consumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::error::{KafkaError, KafkaResult};
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::metadata::Metadata;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::ClientConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Connector for a real Kafka cluster.
#[derive(Debug, Clone)]
pub struct KafkaConnector {
    config: BrokerConfig,
}

impl KafkaConnector {
    pub fn new(config: BrokerConfig) -> Self {
        Self { config }
    }

    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config
            .set("bootstrap.servers", &self.config.brokers)
            .set("client.id", &self.config.client_id);
        config
    }
}

/// Run a metadata request on the blocking pool and collect topic names.
async fn topic_names<F>(fetch: F) -> Result<Vec<String>, BrokerError>
where
    F: FnOnce() -> KafkaResult<Metadata> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        fetch()
            .map(|metadata| {
                metadata
                    .topics()
                    .iter()
                    .map(|topic| topic.name().to_string())
                    .collect()
            })
            .map_err(|e| BrokerError::Connection(e.to_string()))
    })
    .await
    .map_err(|e| BrokerError::Connection(format!("metadata task failed: {e}")))?
}

#[async_trait]
impl BrokerConnector for KafkaConnector {
    fn name(&self) -> &'static str {
        "kafka"
    }

    async fn connect_admin(&self) -> Result<Box<dyn TopicAdmin>, BrokerError> {
        let admin: AdminClient<DefaultClientContext> = self
            .client_config()
            .create()
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let admin = Arc::new(admin);

        let handle = admin.clone();
        let timeout = self.config.metadata_timeout;
        topic_names(move || handle.inner().fetch_metadata(None, timeout)).await?;
        debug!(brokers = %self.config.brokers, "Admin client connected");

        Ok(Box::new(KafkaAdmin {
            admin,
            timeout: self.config.metadata_timeout,
        }))
    }

    async fn connect_producer(&self) -> Result<Box<dyn ProducerClient>, BrokerError> {
        let producer: FutureProducer = self
            .client_config()
            .set("message.timeout.ms", self.config.send_timeout.as_millis().to_string())
            .create()
            .map_err(|e| BrokerError::Connection(e.to_string()))?;

        let handle = producer.clone();
        let timeout = self.config.metadata_timeout;
        topic_names(move || handle.client().fetch_metadata(None, timeout)).await?;

        Ok(Box::new(KafkaProducer {
            producer,
            send_timeout: self.config.send_timeout,
        }))
    }

    async fn connect_consumer(
        &self,
        config: &ConsumerConfig,
    ) -> Result<Box<dyn ConsumerClient>, BrokerError> {
        let offset_reset = if config.from_beginning {
            "earliest"
        } else {
            "latest"
        };

        let (assigned_tx, assigned) = watch::channel(false);
        let consumer: StreamConsumer<AssignmentContext> = self
            .client_config()
            .set("group.id", &config.group_id)
            .set("enable.auto.commit", "true")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", offset_reset)
            .set("session.timeout.ms", "6000")
            .create_with_context(AssignmentContext {
                assigned: assigned_tx,
            })
            .map_err(|e| BrokerError::Connection(e.to_string()))?;
        let consumer = Arc::new(consumer);

        let handle = consumer.clone();
        let timeout = self.config.metadata_timeout;
        topic_names(move || handle.client().fetch_metadata(None, timeout)).await?;

        info!(
            brokers = %self.config.brokers,
            group_id = %config.group_id,
            auto_offset_reset = offset_reset,
            "Consumer connected"
        );

        Ok(Box::new(KafkaConsumer {
            consumer,
            assigned,
            assignment_timeout: config.assignment_timeout,
            pending: None,
        }))
    }
}

struct KafkaAdmin {
    admin: Arc<AdminClient<DefaultClientContext>>,
    timeout: Duration,
}

#[async_trait]
impl TopicAdmin for KafkaAdmin {
    async fn list_topics(&self) -> Result<Vec<String>, BrokerError> {
        let admin = self.admin.clone();
        let timeout = self.timeout;
        topic_names(move || admin.inner().fetch_metadata(None, timeout))
            .await
            .map_err(|e| BrokerError::Admin(e.to_string()))
    }

    async fn create_topic(&self, spec: &TopicSpec) -> Result<(), BrokerError> {
        let topic = NewTopic::new(
            &spec.name,
            spec.partitions,
            TopicReplication::Fixed(spec.replication_factor),
        );
        let options = AdminOptions::new().operation_timeout(Some(self.timeout));

        let results = self
            .admin
            .create_topics(&[topic], &options)
            .await
            .map_err(|e| BrokerError::Admin(e.to_string()))?;

        for result in results {
            match result {
                Ok(_) => {}
                Err((name, RDKafkaErrorCode::TopicAlreadyExists)) => {
                    return Err(BrokerError::TopicExists(name));
                }
                Err((name, code)) => {
                    return Err(BrokerError::Admin(format!("create '{name}' failed: {code}")));
                }
            }
        }
        Ok(())
    }

    async fn disconnect(self: Box<Self>) {
        debug!("Admin client disconnected");
    }
}

struct KafkaProducer {
    producer: FutureProducer,
    send_timeout: Duration,
}

#[async_trait]
impl ProducerClient for KafkaProducer {
    async fn send(
        &self,
        topic: &str,
        key: Option<&[u8]>,
        payload: &[u8],
    ) -> Result<RecordMetadata, BrokerError> {
        let mut record = FutureRecord::<[u8], [u8]>::to(topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        match self.producer.send(record, self.send_timeout).await {
            Ok((partition, offset)) => Ok(RecordMetadata { partition, offset }),
            Err((e, _message)) => Err(BrokerError::Send(e.to_string())),
        }
    }

    async fn flush(&self, timeout: Duration) -> Result<(), BrokerError> {
        let producer = self.producer.clone();
        tokio::task::spawn_blocking(move || producer.flush(timeout))
            .await
            .map_err(|e| BrokerError::Send(format!("flush task failed: {e}")))?
            .map_err(BrokerError::from)
    }
}

/// Flags whether the group currently assigns any partition to this member.
struct AssignmentContext {
    assigned: watch::Sender<bool>,
}

impl ClientContext for AssignmentContext {}

impl ConsumerContext for AssignmentContext {
    fn post_rebalance(&self, rebalance: &Rebalance<'_>) {
        match rebalance {
            Rebalance::Assign(partitions) => {
                debug!(partitions = partitions.count(), "Partitions assigned");
                self.assigned.send_replace(partitions.count() > 0);
            }
            Rebalance::Revoke(partitions) => {
                debug!(partitions = partitions.count(), "Partitions revoked");
                self.assigned.send_replace(false);
            }
            Rebalance::Error(e) => warn!(error = %e, "Rebalance failed"),
        }
    }
}

/// Resolves once the group has assigned partitions.
async fn wait_for_assignment(assigned: &mut watch::Receiver<bool>) {
    loop {
        if *assigned.borrow_and_update() {
            return;
        }
        if assigned.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn to_record(message: &BorrowedMessage<'_>) -> Record {
    Record {
        topic: message.topic().to_string(),
        partition: message.partition(),
        offset: message.offset(),
        key: message.key().map(<[u8]>::to_vec),
        payload: message.payload().map(<[u8]>::to_vec),
        timestamp: message
            .timestamp()
            .to_millis()
            .and_then(DateTime::from_timestamp_millis),
    }
}

struct KafkaConsumer {
    consumer: Arc<StreamConsumer<AssignmentContext>>,
    assigned: watch::Receiver<bool>,
    assignment_timeout: Duration,
    /// Record fetched while waiting for the assignment.
    pending: Option<Record>,
}

#[async_trait]
impl ConsumerClient for KafkaConsumer {
    /// Returns once partitions are assigned, so records produced afterwards
    /// are seen even with `auto.offset.reset=latest`.
    async fn subscribe(&mut self, topic: &str) -> Result<(), BrokerError> {
        self.consumer
            .subscribe(&[topic])
            .map_err(|e| BrokerError::Subscribe(e.to_string()))?;

        // the join is only served while polling
        let consumer = self.consumer.clone();
        let mut assigned = self.assigned.clone();
        let joined = async {
            let assignment = wait_for_assignment(&mut assigned);
            tokio::pin!(assignment);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut assignment => return None,
                    message = consumer.recv() => match message {
                        Ok(message) => return Some(to_record(&message)),
                        Err(e) => warn!(topic, error = %e, "Poll failed while joining group"),
                    },
                }
            }
        };

        let pending = tokio::time::timeout(self.assignment_timeout, joined)
            .await
            .map_err(|_| {
                BrokerError::Subscribe(format!(
                    "no partitions of '{topic}' assigned within {:?}",
                    self.assignment_timeout
                ))
            })?;
        info!(topic, "Partitions assigned");

        self.pending = pending;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Record, BrokerError> {
        if let Some(record) = self.pending.take() {
            return Ok(record);
        }

        let message = self
            .consumer
            .recv()
            .await
            .map_err(|e| BrokerError::Receive(e.to_string()))?;
        Ok(to_record(&message))
    }

    async fn ack(&mut self, record: &Record) -> Result<(), BrokerError> {
        // librdkafka commits stored offset + 1
        self.consumer
            .store_offset(&record.topic, record.partition, record.offset)
            .map_err(BrokerError::from)
    }

    async fn close(self: Box<Self>) {
        let consumer = self.consumer;
        // commit and leaving the group block until the coordinator answers
        let closed = tokio::task::spawn_blocking(move || {
            match consumer.commit_consumer_state(CommitMode::Sync) {
                Ok(()) | Err(KafkaError::ConsumerCommit(RDKafkaErrorCode::NoOffset)) => {}
                Err(e) => warn!(error = %e, "Failed to commit stored offsets"),
            }
            consumer.unsubscribe();
            match Arc::try_unwrap(consumer) {
                Ok(consumer) => drop(consumer),
                Err(_) => warn!("Consumer still shared at close"),
            }
        })
        .await;
        if let Err(e) = closed {
            warn!(error = %e, "Consumer close task failed");
        }
    }
}
