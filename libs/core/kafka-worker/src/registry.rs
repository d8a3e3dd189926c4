//! Topic definitions.
//!
//! This module provides:
//! - `TopicDef` trait for compile-time topic definitions owned by a domain
//! - `TopicSpec` runtime description handed to the broker when provisioning

use crate::error::BrokerError;

/// Topic definition trait.
///
/// Each domain implements this trait to pin its topic name, consumer group
/// and provisioning parameters in one place.
///
/// # Example
///
/// ```rust,ignore
/// use kafka_worker::TopicDef;
///
/// pub struct SendMailTopic;
///
/// impl TopicDef for SendMailTopic {
///     const TOPIC_NAME: &'static str = "send-mail";
///     const CONSUMER_GROUP: &'static str = "mail-service-group";
/// }
/// ```
pub trait TopicDef: Send + Sync {
    /// The Kafka topic name.
    const TOPIC_NAME: &'static str;

    /// The consumer group that drains this topic.
    const CONSUMER_GROUP: &'static str;

    /// Partition count used when the topic is created.
    const PARTITIONS: i32 = 1;

    /// Replication factor used when the topic is created.
    const REPLICATION_FACTOR: i32 = 1;

    /// Provisioning description for this topic.
    fn spec() -> TopicSpec {
        TopicSpec {
            name: Self::TOPIC_NAME.to_string(),
            partitions: Self::PARTITIONS,
            replication_factor: Self::REPLICATION_FACTOR,
        }
    }
}

/// Runtime topic description used by `BrokerManager::ensure_topic`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicSpec {
    pub name: String,
    pub partitions: i32,
    pub replication_factor: i32,
}

impl TopicSpec {
    /// Single partition, replication factor 1.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            partitions: 1,
            replication_factor: 1,
        }
    }

    pub fn with_partitions(mut self, partitions: i32) -> Self {
        self.partitions = partitions;
        self
    }

    pub fn with_replication_factor(mut self, replication_factor: i32) -> Self {
        self.replication_factor = replication_factor;
        self
    }

    /// Reject specs the broker would refuse anyway.
    pub fn validate(&self) -> Result<(), BrokerError> {
        if self.name.trim().is_empty() {
            return Err(BrokerError::Config("topic name must not be empty".into()));
        }
        if self.name.len() > 249 {
            return Err(BrokerError::Config(format!(
                "topic name '{}' is longer than 249 characters",
                self.name
            )));
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        {
            return Err(BrokerError::Config(format!(
                "topic name '{}' may only contain [a-zA-Z0-9._-]",
                self.name
            )));
        }
        if self.partitions < 1 {
            return Err(BrokerError::Config(format!(
                "topic '{}' needs at least one partition",
                self.name
            )));
        }
        if self.replication_factor < 1 {
            return Err(BrokerError::Config(format!(
                "topic '{}' needs a replication factor of at least one",
                self.name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MailTopic;

    impl TopicDef for MailTopic {
        const TOPIC_NAME: &'static str = "send-mail";
        const CONSUMER_GROUP: &'static str = "mail-service-group";
    }

    #[test]
    fn test_topic_def_defaults() {
        let spec = MailTopic::spec();
        assert_eq!(spec, TopicSpec::new("send-mail"));
        assert_eq!(spec.partitions, 1);
        assert_eq!(spec.replication_factor, 1);
    }

    #[test]
    fn test_validate() {
        assert!(TopicSpec::new("send-mail").validate().is_ok());
        assert!(TopicSpec::new("").validate().is_err());
        assert!(TopicSpec::new("send mail").validate().is_err());
        assert!(TopicSpec::new("a".repeat(250)).validate().is_err());
        assert!(TopicSpec::new("x").with_partitions(0).validate().is_err());
        assert!(
            TopicSpec::new("x")
                .with_replication_factor(0)
                .validate()
                .is_err()
        );
    }
}
