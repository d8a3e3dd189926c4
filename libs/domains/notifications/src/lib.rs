//! Notifications Domain
//!
//! Asynchronous mail delivery over Kafka.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │ Auth/User svc   │  ← send_otp / send_password_reset / send_welcome
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │ NotificationSvc │  ← renders the body, publishes an Envelope
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │  Kafka topic    │  ← send-mail (1 partition)
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │  Mail Worker    │  ← ConsumerLoop, group mail-service-group
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │ DeliveryHandler │  ← decode, dedup, send once
//! └────────┬────────┘
//!          │
//! ┌────────▼────────┐
//! │  MailTransport  │  ← SMTP (lettre), mock
//! └─────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use domain_notifications::{NotificationService, SendMailTopic, TemplateEngine};
//!
//! manager.ensure_topic_def::<SendMailTopic>().await?;
//! let service = NotificationService::new(
//!     manager.connect_producer().await,
//!     TemplateEngine::new()?,
//!     NotificationServiceConfig::default(),
//! );
//!
//! // Never fails the caller
//! service.send_otp(&email, &otp).await;
//! ```

pub mod dedup;
pub mod error;
pub mod models;
pub mod processor;
pub mod providers;
pub mod service;
pub mod templates;
pub mod topics;

// Re-export commonly used types
pub use dedup::DedupCache;
pub use error::{DeliveryError, NotificationError, NotificationResult};
pub use models::{DeliveryReceipt, Envelope};
pub use processor::DeliveryHandler;
pub use providers::{MailTransport, MockSmtpTransport, OutboundMail, SentMail, SmtpConfig, SmtpProvider};
pub use service::{NotificationService, NotificationServiceConfig};
pub use templates::TemplateEngine;
pub use topics::SendMailTopic;
