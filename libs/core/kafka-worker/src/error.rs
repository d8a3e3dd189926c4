//! Broker error types
//!
//! Errors are split by the point in the pipeline where they occur so callers
//! can tell a broker outage (transient, worth another connect attempt) from a
//! bad request (permanent).

use std::time::Duration;
use thiserror::Error;

/// Errors raised by broker clients, the publisher and the consumer loop.
#[derive(Error, Debug)]
pub enum BrokerError {
    /// Error from the underlying rdkafka library.
    #[error("Kafka error: {0}")]
    Kafka(#[from] rdkafka::error::KafkaError),

    /// Broker unreachable or the client could not be created.
    #[error("Connection error: {0}")]
    Connection(String),

    /// Administrative request (list/create topic) failed.
    #[error("Admin error: {0}")]
    Admin(String),

    /// The broker reported the topic as already existing.
    #[error("Topic '{0}' already exists")]
    TopicExists(String),

    /// Produce request rejected or not acknowledged.
    #[error("Send error: {0}")]
    Send(String),

    /// An operation did not complete within its bound.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Subscribing to a topic failed.
    #[error("Subscribe error: {0}")]
    Subscribe(String),

    /// Polling for the next record failed.
    #[error("Receive error: {0}")]
    Receive(String),

    /// Message could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid topic or client configuration.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl BrokerError {
    /// Whether another attempt could succeed without changing the request.
    pub fn is_transient(&self) -> bool {
        match self {
            BrokerError::Kafka(_)
            | BrokerError::Connection(_)
            | BrokerError::Timeout(_)
            | BrokerError::Receive(_)
            | BrokerError::Send(_) => true,
            BrokerError::Admin(_)
            | BrokerError::TopicExists(_)
            | BrokerError::Subscribe(_)
            | BrokerError::Serialization(_)
            | BrokerError::Config(_) => false,
        }
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            BrokerError::Kafka(_) => "kafka",
            BrokerError::Connection(_) => "connection",
            BrokerError::Admin(_) => "admin",
            BrokerError::TopicExists(_) => "topic_exists",
            BrokerError::Send(_) => "send",
            BrokerError::Timeout(_) => "timeout",
            BrokerError::Subscribe(_) => "subscribe",
            BrokerError::Receive(_) => "receive",
            BrokerError::Serialization(_) => "serialization",
            BrokerError::Config(_) => "config",
        }
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(err: serde_json::Error) -> Self {
        BrokerError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_errors() {
        assert!(BrokerError::Connection("refused".into()).is_transient());
        assert!(BrokerError::Timeout(Duration::from_secs(5)).is_transient());
        assert!(!BrokerError::Config("bad topic".into()).is_transient());
        assert!(!BrokerError::Serialization("eof".into()).is_transient());
    }

    #[test]
    fn test_serde_error_conversion() {
        let err: BrokerError = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, BrokerError::Serialization(_)));
        assert_eq!(err.kind(), "serialization");
    }
}
