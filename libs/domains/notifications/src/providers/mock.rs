//! Mock mail transport for testing

use super::{MailTransport, OutboundMail, SentMail};
use crate::error::{NotificationError, NotificationResult};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Mock transport that captures sent mail.
///
/// Clones share the captured mail, so a clone can be handed to the delivery
/// handler and this handle inspected afterwards.
#[derive(Clone, Default)]
pub struct MockSmtpTransport {
    sent: Arc<Mutex<Vec<OutboundMail>>>,
    attempts: Arc<AtomicUsize>,
    failures_left: Arc<AtomicU32>,
    always_fail: bool,
}

impl MockSmtpTransport {
    /// Create a new mock transport
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock transport that always fails
    pub fn failing() -> Self {
        Self {
            always_fail: true,
            ..Self::default()
        }
    }

    /// Create a mock transport whose first `n` sends fail
    pub fn failing_first(n: u32) -> Self {
        let transport = Self::default();
        transport.failures_left.store(n, Ordering::SeqCst);
        transport
    }

    /// Get all successfully sent mail
    pub async fn sent_mail(&self) -> Vec<OutboundMail> {
        self.sent.lock().await.clone()
    }

    /// Get the count of successfully sent mail
    pub async fn sent_count(&self) -> usize {
        self.sent.lock().await.len()
    }

    /// Number of `send_mail` calls, failed ones included
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Check if mail was sent to a specific address
    pub async fn was_sent_to(&self, to: &str) -> bool {
        self.sent.lock().await.iter().any(|m| m.to == to)
    }

    fn should_fail(&self) -> bool {
        self.always_fail
            || self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
    }
}

#[async_trait]
impl MailTransport for MockSmtpTransport {
    async fn send_mail(&self, mail: &OutboundMail) -> NotificationResult<SentMail> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;

        if self.should_fail() {
            return Err(NotificationError::ProviderError(
                "mock transport failure".to_string(),
            ));
        }

        self.sent.lock().await.push(mail.clone());

        Ok(SentMail {
            message_id: Some(format!("mock-{}", attempt)),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        Ok(!self.always_fail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mail(to: &str) -> OutboundMail {
        OutboundMail {
            from: "noreply@example.com".into(),
            to: to.into(),
            subject: "Test Subject".into(),
            html: "<p>Test body</p>".into(),
        }
    }

    #[tokio::test]
    async fn test_mock_transport_sends_mail() {
        let transport = MockSmtpTransport::new();

        let result = transport.send_mail(&mail("test@example.com")).await;
        assert!(result.is_ok());

        let sent = transport.sent_mail().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "test@example.com");
        assert!(transport.was_sent_to("test@example.com").await);
        assert!(!transport.was_sent_to("other@example.com").await);
    }

    #[tokio::test]
    async fn test_mock_transport_fails() {
        let transport = MockSmtpTransport::failing();

        let result = transport.send_mail(&mail("test@example.com")).await;
        assert!(result.is_err());
        assert_eq!(transport.attempts(), 1);
        assert_eq!(transport.sent_count().await, 0);
    }

    #[tokio::test]
    async fn test_mock_transport_fails_first_n() {
        let transport = MockSmtpTransport::failing_first(1);
        let clone = transport.clone();

        assert!(clone.send_mail(&mail("a@example.com")).await.is_err());
        assert!(clone.send_mail(&mail("b@example.com")).await.is_ok());

        assert_eq!(transport.attempts(), 2);
        assert!(transport.was_sent_to("b@example.com").await);
    }
}
