//! Notification service used by upstream services to publish mail.
//!
//! Wraps the process-wide `Publisher`. Every call is best effort: it returns
//! a `PublishOutcome` the caller may ignore, and never fails the request that
//! triggered it.

use crate::error::NotificationResult;
use crate::models::{Envelope, OtpEmailData, PasswordResetEmailData, WelcomeEmailData};
use crate::templates::{RenderedEmail, TemplateEngine};
use crate::topics::SendMailTopic;
use core_config::{env_or_default, env_parse, ConfigError, FromEnv};
use kafka_worker::{BrokerError, PublishOutcome, Publisher, TopicDef};
use tracing::{error, info};
use uuid::Uuid;

/// Configuration for the notification service.
#[derive(Debug, Clone)]
pub struct NotificationServiceConfig {
    /// Product name shown in mail bodies.
    pub app_name: String,
    /// OTP validity shown in the OTP mail.
    pub otp_expiry_minutes: u32,
}

impl Default for NotificationServiceConfig {
    fn default() -> Self {
        Self {
            app_name: "Job Board".to_string(),
            otp_expiry_minutes: 10,
        }
    }
}

impl FromEnv for NotificationServiceConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            app_name: env_or_default("APP_NAME", "Job Board"),
            otp_expiry_minutes: env_parse("OTP_EXPIRY_MINUTES", 10)?,
        })
    }
}

/// Service for publishing mail notifications.
pub struct NotificationService {
    publisher: Publisher,
    templates: TemplateEngine,
    config: NotificationServiceConfig,
}

impl NotificationService {
    /// Create a new notification service.
    pub fn new(
        publisher: Publisher,
        templates: TemplateEngine,
        config: NotificationServiceConfig,
    ) -> Self {
        Self {
            publisher,
            templates,
            config,
        }
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    /// Publish a ready-made envelope to `send-mail`.
    pub async fn notify(&self, envelope: &Envelope) -> PublishOutcome {
        let outcome = self
            .publisher
            .publish(SendMailTopic::TOPIC_NAME, envelope)
            .await;

        if outcome.is_delivered() {
            info!(to = %envelope.to, subject = %envelope.subject, "Mail notification queued");
        }
        outcome
    }

    /// Send a one-time password.
    pub async fn send_otp(&self, to: &str, otp: &str) -> PublishOutcome {
        let rendered = self.templates.render_otp(&OtpEmailData {
            app_name: self.config.app_name.clone(),
            otp: otp.to_string(),
            expiry_minutes: self.config.otp_expiry_minutes,
        });
        self.publish_rendered(to, "otp", rendered).await
    }

    /// Send a password reset link.
    pub async fn send_password_reset(&self, to: &str, reset_link: &str) -> PublishOutcome {
        let rendered = self.templates.render_password_reset(&PasswordResetEmailData {
            app_name: self.config.app_name.clone(),
            reset_link: reset_link.to_string(),
        });
        self.publish_rendered(to, "password_reset", rendered).await
    }

    /// Send the registration confirmation.
    pub async fn send_welcome(&self, to: &str, name: &str) -> PublishOutcome {
        let rendered = self.templates.render_welcome(&WelcomeEmailData {
            app_name: self.config.app_name.clone(),
            user_name: name.to_string(),
        });
        self.publish_rendered(to, "welcome", rendered).await
    }

    async fn publish_rendered(
        &self,
        to: &str,
        kind: &str,
        rendered: NotificationResult<RenderedEmail>,
    ) -> PublishOutcome {
        let rendered = match rendered {
            Ok(rendered) => rendered,
            Err(e) => {
                error!(to = %to, kind = %kind, error = %e, "Failed to render mail");
                return PublishOutcome::Failed(BrokerError::Serialization(e.to_string()));
            }
        };

        let envelope = Envelope::new(to, rendered.subject, rendered.html)
            .with_idempotency_key(format!("{}-{}", kind, Uuid::now_v7()));

        self.notify(&envelope).await
    }

    /// Flush and release the publisher.
    pub async fn shutdown(self) {
        self.publisher.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kafka_worker::{BrokerConfig, BrokerManager, InMemoryBroker};
    use std::sync::Arc;

    async fn service(broker: &InMemoryBroker) -> NotificationService {
        let manager = BrokerManager::new(Arc::new(broker.clone()), BrokerConfig::new("memory"));
        manager.ensure_topic_def::<SendMailTopic>().await.unwrap();
        NotificationService::new(
            manager.connect_producer().await,
            TemplateEngine::new().unwrap(),
            NotificationServiceConfig::default(),
        )
    }

    fn published(broker: &InMemoryBroker) -> Vec<Envelope> {
        broker
            .records("send-mail")
            .iter()
            .map(|r| serde_json::from_slice(r.payload.as_deref().unwrap()).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_send_otp_publishes_envelope() {
        let broker = InMemoryBroker::new();
        let service = service(&broker).await;

        let outcome = service.send_otp("user@example.com", "493021").await;
        assert!(outcome.is_delivered());

        let envelopes = published(&broker);
        assert_eq!(envelopes.len(), 1);
        assert_eq!(envelopes[0].to, "user@example.com");
        assert_eq!(envelopes[0].subject, "Your verification code");
        assert!(envelopes[0].html.contains("493021"));
        assert!(envelopes[0].idempotency_key.as_deref().unwrap().starts_with("otp-"));
    }

    #[tokio::test]
    async fn test_each_helper_uses_a_fresh_key() {
        let broker = InMemoryBroker::new();
        let service = service(&broker).await;

        service.send_welcome("a@example.com", "Ada").await;
        service.send_password_reset("a@example.com", "https://example.com/r/1").await;

        let envelopes = published(&broker);
        assert_eq!(envelopes.len(), 2);
        assert_ne!(envelopes[0].idempotency_key, envelopes[1].idempotency_key);
        assert_eq!(envelopes[1].subject, "Reset your password");
    }

    #[tokio::test]
    async fn test_disconnected_publisher_skips() {
        let service = NotificationService::new(
            Publisher::disconnected(),
            TemplateEngine::new().unwrap(),
            NotificationServiceConfig::default(),
        );

        let outcome = service.notify(&Envelope::new("a@b.com", "s", "h")).await;

        assert!(matches!(outcome, PublishOutcome::Skipped));
    }

    #[tokio::test]
    async fn test_shutdown_flushes_producer() {
        let broker = InMemoryBroker::new();
        service(&broker).await.shutdown().await;
        assert_eq!(broker.flushes(), 1);
    }

    #[test]
    fn test_config_from_env() {
        temp_env::with_vars(
            [("APP_NAME", Some("Hire Me")), ("OTP_EXPIRY_MINUTES", Some("5"))],
            || {
                let config = NotificationServiceConfig::from_env().unwrap();
                assert_eq!(config.app_name, "Hire Me");
                assert_eq!(config.otp_expiry_minutes, 5);
            },
        );
    }
}
