use crate::{env_or_default, env_parse, env_required, ConfigError, FromEnv};

/// Kafka client configuration
#[derive(Clone, Debug)]
pub struct KafkaConfig {
    /// Comma-separated bootstrap servers, e.g. "localhost:9092"
    pub brokers: String,
    /// Client identity reported to the broker
    pub client_id: String,
    /// Connect attempts before giving up (1 = single attempt)
    pub connect_max_attempts: u32,
    /// Initial backoff between connect attempts
    pub connect_backoff_ms: u64,
    /// Upper bound on waiting for a produce acknowledgement
    pub send_timeout_ms: u64,
    /// Timeout for metadata / admin requests
    pub metadata_timeout_ms: u64,
}

impl KafkaConfig {
    pub fn new(brokers: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            brokers: brokers.into(),
            client_id: client_id.into(),
            connect_max_attempts: 1,
            connect_backoff_ms: 500,
            send_timeout_ms: 5000,
            metadata_timeout_ms: 5000,
        }
    }
}

impl FromEnv for KafkaConfig {
    /// Requires KAFKA_BROKERS; everything else has a default.
    fn from_env() -> Result<Self, ConfigError> {
        let brokers = env_required("KAFKA_BROKERS")?;
        let client_id = env_or_default("KAFKA_CLIENT_ID", "mail-service");

        Ok(Self {
            brokers,
            client_id,
            connect_max_attempts: env_parse("KAFKA_CONNECT_MAX_ATTEMPTS", 1u32)?.max(1),
            connect_backoff_ms: env_parse("KAFKA_CONNECT_BACKOFF_MS", 500)?,
            send_timeout_ms: env_parse("KAFKA_SEND_TIMEOUT_MS", 5000)?,
            metadata_timeout_ms: env_parse("KAFKA_METADATA_TIMEOUT_MS", 5000)?,
        })
    }
}
