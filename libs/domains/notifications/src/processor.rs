//! Delivery handler for the mail worker.
//!
//! This module provides the `DeliveryHandler` that implements
//! `MessageHandler`: it decodes each `send-mail` record into an `Envelope`
//! and sends it once through the configured `MailTransport`. Nothing is
//! retried; failures are logged and the record is dropped.

use crate::dedup::DedupCache;
use crate::error::DeliveryError;
use crate::models::{DeliveryReceipt, Envelope};
use crate::providers::{MailTransport, OutboundMail};
use async_trait::async_trait;
use kafka_worker::{HandlerError, MessageHandler, Record};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Turns envelopes into outbound mail.
#[derive(Clone)]
pub struct DeliveryHandler {
    transport: Arc<dyn MailTransport>,
    from: String,
    dedup: Option<Arc<DedupCache>>,
}

impl DeliveryHandler {
    /// Create a handler sending as `from`.
    pub fn new(transport: Arc<dyn MailTransport>, from: impl Into<String>) -> Self {
        Self {
            transport,
            from: from.into(),
            dedup: None,
        }
    }

    /// Skip envelopes whose idempotency key was delivered recently.
    pub fn with_dedup(mut self, cache: Arc<DedupCache>) -> Self {
        self.dedup = Some(cache);
        self
    }

    /// Decode a `send-mail` record and deliver it.
    pub async fn deliver_record(&self, record: &Record) -> Result<DeliveryReceipt, DeliveryError> {
        let Some(payload) = record.payload.as_deref() else {
            return Err(DeliveryError::Decode("record has no payload".into()));
        };

        let envelope = Envelope::from_slice(payload).map_err(|reason| {
            warn!(
                partition = record.partition,
                offset = record.offset,
                error = %reason,
                payload = %record.payload_preview(256),
                "Dropping undecodable envelope"
            );
            DeliveryError::Decode(reason)
        })?;

        self.deliver(&envelope).await
    }

    /// Send one envelope through the transport.
    pub async fn deliver(&self, envelope: &Envelope) -> Result<DeliveryReceipt, DeliveryError> {
        let dedup_key = match (&self.dedup, &envelope.idempotency_key) {
            (Some(cache), Some(key)) => {
                if !cache.insert(key) {
                    info!(
                        to = %envelope.to,
                        idempotency_key = %key,
                        "Duplicate envelope, skipping delivery"
                    );
                    return Ok(DeliveryReceipt::Duplicate);
                }
                Some((cache, key))
            }
            _ => None,
        };

        let mail = OutboundMail {
            from: self.from.clone(),
            to: envelope.to.clone(),
            subject: envelope.subject.clone(),
            html: envelope.html.clone(),
        };

        match self.transport.send_mail(&mail).await {
            Ok(sent) => {
                info!(
                    to = %mail.to,
                    subject = %mail.subject,
                    transport = self.transport.name(),
                    message_id = ?sent.message_id,
                    "Mail sent"
                );
                Ok(DeliveryReceipt::Sent {
                    message_id: sent.message_id,
                })
            }
            Err(e) => {
                error!(
                    to = %mail.to,
                    subject = %mail.subject,
                    transport = self.transport.name(),
                    error = %e,
                    "Mail delivery failed"
                );
                if let Some((cache, key)) = dedup_key {
                    cache.remove(key);
                }
                Err(DeliveryError::Transport(e))
            }
        }
    }
}

#[async_trait]
impl MessageHandler for DeliveryHandler {
    fn name(&self) -> &'static str {
        "DeliveryHandler"
    }

    async fn handle(&self, record: &Record) -> Result<(), HandlerError> {
        self.deliver_record(record).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NotificationError;
    use crate::providers::{MockMailTransport, SentMail};
    use std::time::Duration;

    fn handler(transport: MockMailTransport) -> DeliveryHandler {
        DeliveryHandler::new(Arc::new(transport), "noreply@example.com")
    }

    #[tokio::test]
    async fn test_deliver_sends_once_with_envelope_fields() {
        let mut transport = MockMailTransport::new();
        transport
            .expect_send_mail()
            .withf(|mail| {
                mail.from == "noreply@example.com"
                    && mail.to == "user@example.com"
                    && mail.subject == "Welcome"
                    && mail.html == "<p>Hi</p>"
            })
            .times(1)
            .returning(|_| {
                Ok(SentMail {
                    message_id: Some("250 OK".into()),
                })
            });
        transport.expect_name().return_const("mock");

        let receipt = handler(transport)
            .deliver(&Envelope::new("user@example.com", "Welcome", "<p>Hi</p>"))
            .await
            .unwrap();

        assert_eq!(
            receipt,
            DeliveryReceipt::Sent {
                message_id: Some("250 OK".into())
            }
        );
    }

    fn record(payload: Option<&[u8]>) -> Record {
        Record {
            topic: "send-mail".into(),
            partition: 0,
            offset: 3,
            key: None,
            payload: payload.map(<[u8]>::to_vec),
            timestamp: None,
        }
    }

    #[tokio::test]
    async fn test_deliver_record_rejects_malformed_payload() {
        let mut transport = MockMailTransport::new();
        transport.expect_send_mail().never();

        let handler = handler(transport);

        for payload in [
            &b"not json"[..],
            br#"{"subject":"s","html":"h"}"#,
            br#"{"to":"","subject":"s","html":"h"}"#,
        ] {
            let err = handler.deliver_record(&record(Some(payload))).await.unwrap_err();
            assert!(matches!(err, DeliveryError::Decode(_)));
        }
    }

    #[tokio::test]
    async fn test_oversized_malformed_payload_is_rejected() {
        let mut transport = MockMailTransport::new();
        transport.expect_send_mail().never();

        let payload = "x".repeat(10_000);
        let err = handler(transport)
            .deliver_record(&record(Some(payload.as_bytes())))
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Decode(_)));
    }

    #[tokio::test]
    async fn test_transport_failure_is_returned_not_retried() {
        let mut transport = MockMailTransport::new();
        transport
            .expect_send_mail()
            .times(1)
            .returning(|_| Err(NotificationError::ProviderError("421 try later".into())));
        transport.expect_name().return_const("mock");

        let err = handler(transport)
            .deliver(&Envelope::new("a@b.com", "s", "h"))
            .await
            .unwrap_err();

        assert!(matches!(err, DeliveryError::Transport(_)));
    }

    #[tokio::test]
    async fn test_dedup_skips_repeated_key() {
        let mut transport = MockMailTransport::new();
        transport
            .expect_send_mail()
            .times(1)
            .returning(|_| Ok(SentMail { message_id: None }));
        transport.expect_name().return_const("mock");

        let handler = handler(transport).with_dedup(Arc::new(DedupCache::new(Duration::from_secs(60))));
        let envelope = Envelope::new("a@b.com", "OTP", "<p>1234</p>").with_idempotency_key("otp-a@b.com-1");

        let first = handler.deliver(&envelope).await.unwrap();
        let second = handler.deliver(&envelope).await.unwrap();

        assert!(matches!(first, DeliveryReceipt::Sent { .. }));
        assert_eq!(second, DeliveryReceipt::Duplicate);
    }

    #[tokio::test]
    async fn test_dedup_forgets_failed_delivery() {
        let mut transport = MockMailTransport::new();
        let mut seq = mockall::Sequence::new();
        transport
            .expect_send_mail()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Err(NotificationError::ProviderError("timeout".into())));
        transport
            .expect_send_mail()
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(SentMail { message_id: None }));
        transport.expect_name().return_const("mock");

        let handler = handler(transport).with_dedup(Arc::new(DedupCache::new(Duration::from_secs(60))));
        let envelope = Envelope::new("a@b.com", "s", "h").with_idempotency_key("k");

        assert!(handler.deliver(&envelope).await.is_err());
        assert!(matches!(
            handler.deliver(&envelope).await.unwrap(),
            DeliveryReceipt::Sent { .. }
        ));
    }

    #[tokio::test]
    async fn test_handle_record_without_payload() {
        let mut transport = MockMailTransport::new();
        transport.expect_send_mail().never();

        let err = handler(transport).handle(&record(None)).await.unwrap_err();
        assert!(matches!(err, HandlerError::InvalidPayload(_)));
    }
}
