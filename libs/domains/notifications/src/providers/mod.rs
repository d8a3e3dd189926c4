//! Mail transport implementations.
//!
//! This module contains the `MailTransport` trait the delivery handler sends
//! through, and its implementations.

mod mock;
mod smtp;

pub use mock::MockSmtpTransport;
pub use smtp::{SmtpConfig, SmtpProvider};

use crate::error::NotificationResult;
use async_trait::async_trait;

/// A sent mail with the transport's message id.
#[derive(Debug, Clone)]
pub struct SentMail {
    /// Transport-specific message ID for tracking.
    pub message_id: Option<String>,
}

/// Mail ready for the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMail {
    /// Sender address.
    pub from: String,
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
}

/// Trait for mail transports.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Send one mail.
    async fn send_mail(&self, mail: &OutboundMail) -> NotificationResult<SentMail>;

    /// Get the transport name for logging.
    fn name(&self) -> &'static str;

    /// Check if the transport can reach its server.
    async fn health_check(&self) -> NotificationResult<bool>;
}
