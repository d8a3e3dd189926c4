//! Domain models for notifications.

use serde::{Deserialize, Serialize};

/// Mail notification published to the `send-mail` topic.
///
/// Wire format: `{"to": "...", "subject": "...", "html": "..."}` with an
/// optional `idempotency_key` that is omitted when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Recipient address.
    pub to: String,
    /// Subject line.
    pub subject: String,
    /// HTML body.
    pub html: String,
    /// Producer-chosen key; envelopes sharing a key are delivered once
    /// while the worker's dedup cache remembers it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl Envelope {
    pub fn new(to: impl Into<String>, subject: impl Into<String>, html: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            subject: subject.into(),
            html: html.into(),
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Decode and check an envelope from record bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, String> {
        let envelope: Envelope = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// A recipient is required; subject and body may be empty.
    pub fn validate(&self) -> Result<(), String> {
        if self.to.trim().is_empty() {
            return Err("recipient address is empty".to_string());
        }
        Ok(())
    }
}

/// What the delivery handler did with an envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryReceipt {
    /// Handed to the mail transport.
    Sent {
        /// Transport message id, when the transport reports one.
        message_id: Option<String>,
    },
    /// Skipped: the idempotency key was delivered recently.
    Duplicate,
}

/// Data for the one-time password email.
#[derive(Debug, Clone, Serialize)]
pub struct OtpEmailData {
    pub app_name: String,
    pub otp: String,
    pub expiry_minutes: u32,
}

/// Data for the password reset email.
#[derive(Debug, Clone, Serialize)]
pub struct PasswordResetEmailData {
    pub app_name: String,
    pub reset_link: String,
}

/// Data for the registration confirmation email.
#[derive(Debug, Clone, Serialize)]
pub struct WelcomeEmailData {
    pub app_name: String,
    pub user_name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_wire_format() {
        let envelope = Envelope::new("user@example.com", "Welcome", "<p>Hi</p>");
        let json = serde_json::to_value(&envelope).unwrap();

        assert_eq!(
            json,
            serde_json::json!({"to": "user@example.com", "subject": "Welcome", "html": "<p>Hi</p>"})
        );
    }

    #[test]
    fn test_envelope_with_key_serializes_key() {
        let envelope = Envelope::new("a@b.com", "s", "h").with_idempotency_key("otp-1");
        let json = serde_json::to_string(&envelope).unwrap();
        assert!(json.contains(r#""idempotency_key":"otp-1""#));
    }

    #[test]
    fn test_envelope_decoding() {
        let envelope = Envelope::from_slice(br#"{"to":"a@b.com","subject":"s","html":"h"}"#).unwrap();
        assert_eq!(envelope.to, "a@b.com");
        assert_eq!(envelope.idempotency_key, None);

        assert!(Envelope::from_slice(b"not json").is_err());
        assert!(Envelope::from_slice(br#"{"to":"a@b.com","html":"h"}"#).is_err());
        assert!(Envelope::from_slice(br#"{"to":"  ","subject":"s","html":"h"}"#).is_err());
    }
}
