//! Error types for the notifications domain.

use core_config::ConfigError;
use kafka_worker::HandlerError;
use thiserror::Error;

/// Result type for notification operations.
pub type NotificationResult<T> = Result<T, NotificationError>;

/// Errors that can occur in the notifications domain.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Mail transport error.
    #[error("Mail transport error: {0}")]
    ProviderError(String),

    /// Template rendering error.
    #[error("Template rendering error: {0}")]
    TemplateError(String),

    /// Invalid email address.
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

impl From<handlebars::RenderError> for NotificationError {
    fn from(err: handlebars::RenderError) -> Self {
        NotificationError::TemplateError(err.to_string())
    }
}

impl From<ConfigError> for NotificationError {
    fn from(err: ConfigError) -> Self {
        NotificationError::ConfigError(err.to_string())
    }
}

/// Why a single envelope was not delivered.
///
/// Logged by the delivery handler and dropped; there is no retry and no
/// dead-letter topic.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The record payload is not a valid envelope.
    #[error("Failed to decode envelope: {0}")]
    Decode(String),

    /// The mail transport rejected or failed the send.
    #[error("Mail delivery failed: {0}")]
    Transport(#[from] NotificationError),
}

impl From<DeliveryError> for HandlerError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::Decode(reason) => HandlerError::InvalidPayload(reason),
            DeliveryError::Transport(e) => HandlerError::Failed(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delivery_error_maps_to_handler_error() {
        let decode: HandlerError = DeliveryError::Decode("missing field `to`".into()).into();
        assert!(matches!(decode, HandlerError::InvalidPayload(_)));

        let transport: HandlerError =
            DeliveryError::Transport(NotificationError::ProviderError("451".into())).into();
        assert!(matches!(transport, HandlerError::Failed(ref m) if m.contains("451")));
    }
}
