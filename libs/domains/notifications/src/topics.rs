//! Topic definitions for the notifications domain.

use kafka_worker::TopicDef;

/// Outbound mail topic, drained by the mail worker.
pub struct SendMailTopic;

impl TopicDef for SendMailTopic {
    const TOPIC_NAME: &'static str = "send-mail";
    const CONSUMER_GROUP: &'static str = "mail-service-group";
    const PARTITIONS: i32 = 1;
    const REPLICATION_FACTOR: i32 = 1;
}
