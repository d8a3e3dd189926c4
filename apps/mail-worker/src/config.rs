//! Mail worker configuration loaded from the environment.

use core_config::kafka::KafkaConfig;
use core_config::{env_parse_optional, ConfigError, FromEnv};
use domain_notifications::SmtpConfig;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct MailWorkerConfig {
    pub kafka: KafkaConfig,
    pub smtp: SmtpConfig,
    /// Upper bound on one delivery; unset means no bound.
    pub handler_timeout: Option<Duration>,
    /// Enables the idempotency-key cache with this TTL.
    pub dedup_ttl: Option<Duration>,
    /// Serve Prometheus metrics on this port.
    pub metrics_port: Option<u16>,
}

impl FromEnv for MailWorkerConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            kafka: KafkaConfig::from_env()?,
            smtp: SmtpConfig::from_env()?,
            handler_timeout: env_parse_optional::<u64>("MAIL_HANDLER_TIMEOUT_MS")?
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis),
            dedup_ttl: env_parse_optional::<u64>("MAIL_DEDUP_TTL_SECS")?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            metrics_port: env_parse_optional("METRICS_PORT")?,
        })
    }
}
