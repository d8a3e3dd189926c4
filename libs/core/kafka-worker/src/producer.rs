//! Best-effort publisher.
//!
//! A `Publisher` is created once per process by
//! `BrokerManager::connect_producer` and shared by reference. It may hold no
//! producer at all (the broker was down at startup); publishing is then a
//! logged no-op. `publish` never returns `Err` and never panics.

use crate::client::ProducerClient;
use crate::error::BrokerError;
use crate::event::RecordMetadata;
use crate::metrics::TopicMetrics;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Result of a single publish call. Callers are free to ignore it.
#[derive(Debug)]
pub enum PublishOutcome {
    /// The broker acknowledged the record.
    Delivered(RecordMetadata),
    /// No producer is connected; nothing was sent.
    Skipped,
    /// Encoding or sending failed. Already logged.
    Failed(BrokerError),
}

impl PublishOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, PublishOutcome::Delivered(_))
    }

    pub fn metadata(&self) -> Option<RecordMetadata> {
        match self {
            PublishOutcome::Delivered(metadata) => Some(*metadata),
            _ => None,
        }
    }

    /// Label used for the `status` metric dimension.
    pub fn status(&self) -> &'static str {
        match self {
            PublishOutcome::Delivered(_) => "delivered",
            PublishOutcome::Skipped => "skipped",
            PublishOutcome::Failed(_) => "failed",
        }
    }
}

/// Owned producer handle.
pub struct Publisher {
    producer: Option<Box<dyn ProducerClient>>,
    send_timeout: Duration,
}

impl Publisher {
    /// A publisher that skips every message.
    pub fn disconnected() -> Self {
        Self {
            producer: None,
            send_timeout: Duration::from_secs(5),
        }
    }

    /// Wrap a connected producer. Each send is bounded by `send_timeout`.
    pub fn connected(producer: Box<dyn ProducerClient>, send_timeout: Duration) -> Self {
        Self {
            producer: Some(producer),
            send_timeout,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.producer.is_some()
    }

    /// Serialize `message` as JSON and publish it to `topic`.
    pub async fn publish<M>(&self, topic: &str, message: &M) -> PublishOutcome
    where
        M: Serialize + ?Sized,
    {
        self.publish_keyed(topic, None, message).await
    }

    /// Like `publish`, with a record key for partitioning.
    pub async fn publish_keyed<M>(&self, topic: &str, key: Option<&str>, message: &M) -> PublishOutcome
    where
        M: Serialize + ?Sized,
    {
        let outcome = self.try_publish(topic, key, message).await;
        TopicMetrics::new(topic).published(outcome.status());
        outcome
    }

    async fn try_publish<M>(&self, topic: &str, key: Option<&str>, message: &M) -> PublishOutcome
    where
        M: Serialize + ?Sized,
    {
        let Some(producer) = &self.producer else {
            warn!(topic = %topic, "Producer not connected, message not published");
            return PublishOutcome::Skipped;
        };

        let payload = match serde_json::to_vec(message) {
            Ok(payload) => payload,
            Err(e) => {
                error!(topic = %topic, error = %e, "Failed to serialize message");
                return PublishOutcome::Failed(e.into());
            }
        };

        let send = producer.send(topic, key.map(str::as_bytes), &payload);
        let result = match tokio::time::timeout(self.send_timeout, send).await {
            Ok(result) => result,
            Err(_) => Err(BrokerError::Timeout(self.send_timeout)),
        };

        match result {
            Ok(metadata) => {
                debug!(
                    topic = %topic,
                    partition = metadata.partition,
                    offset = metadata.offset,
                    "Message published"
                );
                PublishOutcome::Delivered(metadata)
            }
            Err(e) => {
                error!(topic = %topic, error = %e, "Failed to publish message");
                PublishOutcome::Failed(e)
            }
        }
    }

    /// Flush in-flight records and release the producer.
    pub async fn shutdown(self) {
        let Some(producer) = self.producer else {
            debug!("Publisher was never connected, nothing to shut down");
            return;
        };

        match producer.flush(self.send_timeout).await {
            Ok(()) => info!("Producer flushed and disconnected"),
            Err(e) => warn!(error = %e, "Producer flush failed during shutdown"),
        }
    }
}

impl std::fmt::Debug for Publisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Publisher")
            .field("connected", &self.is_connected())
            .field("send_timeout", &self.send_timeout)
            .finish()
    }
}
