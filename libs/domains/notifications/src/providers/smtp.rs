//! SMTP mail transport using lettre.
//!
//! `secure = true` speaks implicit TLS (port 465 by default). Without it the
//! transport upgrades with STARTTLS when credentials are configured and falls
//! back to plain SMTP otherwise, which suits local catchers like Mailpit.

use super::{MailTransport, OutboundMail, SentMail};
use crate::error::{NotificationError, NotificationResult};
use async_trait::async_trait;
use core_config::{env_flag, env_optional, env_parse, env_required, ConfigError, FromEnv};
use lettre::{
    message::{header::ContentType, Mailbox},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::{debug, error, info};

/// SMTP configuration.
#[derive(Clone)]
pub struct SmtpConfig {
    /// SMTP server host.
    pub host: String,
    /// SMTP server port.
    pub port: u16,
    /// Implicit TLS.
    pub secure: bool,
    /// SMTP username.
    pub username: Option<String>,
    /// SMTP password.
    pub password: Option<String>,
    /// Default sender address.
    pub from: String,
}

impl SmtpConfig {
    /// Create a new SMTP configuration with implicit TLS on port 465.
    pub fn new(host: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 465,
            secure: true,
            username: None,
            password: None,
            from: from.into(),
        }
    }

    /// Builder method to set the port.
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder method to toggle implicit TLS.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Builder method to set credentials.
    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    fn credentials(&self) -> Option<Credentials> {
        match (&self.username, &self.password) {
            (Some(username), Some(password)) => {
                Some(Credentials::new(username.clone(), password.clone()))
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for SmtpConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("from", &self.from)
            .finish()
    }
}

impl FromEnv for SmtpConfig {
    /// Requires SMTP_HOST, and SMTP_FROM or SMTP_USER for the sender.
    fn from_env() -> Result<Self, ConfigError> {
        let host = env_required("SMTP_HOST")?;
        let secure = env_flag("SMTP_SECURE", true)?;
        let port = env_parse("SMTP_PORT", if secure { 465 } else { 587 })?;
        let username = env_optional("SMTP_USER");
        let password = env_optional("SMTP_PASSWORD");

        let from = env_optional("SMTP_FROM")
            .or_else(|| username.clone())
            .ok_or_else(|| ConfigError::MissingEnvVar("SMTP_FROM".to_string()))?;

        Ok(Self {
            host,
            port,
            secure,
            username,
            password,
            from,
        })
    }
}

/// SMTP mail transport.
pub struct SmtpProvider {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    config: SmtpConfig,
}

impl SmtpProvider {
    /// Create a new SMTP transport. Does not connect.
    pub fn new(config: SmtpConfig) -> NotificationResult<Self> {
        let transport = Self::build_transport(&config)?;
        info!(
            host = %config.host,
            port = config.port,
            secure = config.secure,
            "SMTP transport configured"
        );
        Ok(Self { transport, config })
    }

    /// Default sender address.
    pub fn from_address(&self) -> &str {
        &self.config.from
    }

    /// Build the SMTP transport based on configuration.
    fn build_transport(config: &SmtpConfig) -> NotificationResult<AsyncSmtpTransport<Tokio1Executor>> {
        let mut builder = if config.secure {
            AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host).map_err(|e| {
                NotificationError::ConfigError(format!("Failed to create SMTP relay: {}", e))
            })?
        } else if config.credentials().is_some() {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host).map_err(|e| {
                NotificationError::ConfigError(format!("Failed to create STARTTLS relay: {}", e))
            })?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host)
        };

        builder = builder.port(config.port);
        if let Some(credentials) = config.credentials() {
            builder = builder.credentials(credentials);
        }

        Ok(builder.build())
    }

    /// Build a lettre Message from an OutboundMail.
    fn build_message(mail: &OutboundMail) -> NotificationResult<Message> {
        let from: Mailbox = mail
            .from
            .parse()
            .map_err(|e| NotificationError::InvalidEmail(format!("from '{}': {}", mail.from, e)))?;
        let to: Mailbox = mail
            .to
            .parse()
            .map_err(|e| NotificationError::InvalidEmail(format!("to '{}': {}", mail.to, e)))?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(&mail.subject)
            .header(ContentType::TEXT_HTML)
            .body(mail.html.clone())
            .map_err(|e| NotificationError::ProviderError(format!("Failed to build message: {}", e)))
    }
}

#[async_trait]
impl MailTransport for SmtpProvider {
    async fn send_mail(&self, mail: &OutboundMail) -> NotificationResult<SentMail> {
        debug!(
            to = %mail.to,
            subject = %mail.subject,
            host = %self.config.host,
            port = self.config.port,
            "Sending mail via SMTP"
        );

        let message = Self::build_message(mail)?;

        let response = self.transport.send(message).await.map_err(|e| {
            error!(to = %mail.to, error = %e, "SMTP send failed");
            NotificationError::ProviderError(format!("SMTP send failed: {}", e))
        })?;

        let message_id = response.message().next().map(|s| s.to_string());

        Ok(SentMail { message_id })
    }

    fn name(&self) -> &'static str {
        "smtp"
    }

    async fn health_check(&self) -> NotificationResult<bool> {
        self.transport
            .test_connection()
            .await
            .map_err(|e| NotificationError::ProviderError(format!("SMTP health check failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 6] = [
        "SMTP_HOST",
        "SMTP_PORT",
        "SMTP_SECURE",
        "SMTP_USER",
        "SMTP_PASSWORD",
        "SMTP_FROM",
    ];

    #[test]
    fn test_smtp_config_from_env_defaults() {
        temp_env::with_vars_unset(VARS, || {
            temp_env::with_vars(
                [
                    ("SMTP_HOST", Some("smtp.example.com")),
                    ("SMTP_USER", Some("mailer@example.com")),
                    ("SMTP_PASSWORD", Some("secret")),
                ],
                || {
                    let config = SmtpConfig::from_env().unwrap();
                    assert_eq!(config.host, "smtp.example.com");
                    assert!(config.secure);
                    assert_eq!(config.port, 465);
                    assert_eq!(config.from, "mailer@example.com");
                },
            );
        });
    }

    #[test]
    fn test_smtp_config_insecure_defaults_to_587() {
        temp_env::with_vars_unset(VARS, || {
            temp_env::with_vars(
                [
                    ("SMTP_HOST", Some("localhost")),
                    ("SMTP_SECURE", Some("false")),
                    ("SMTP_FROM", Some("noreply@localhost")),
                ],
                || {
                    let config = SmtpConfig::from_env().unwrap();
                    assert!(!config.secure);
                    assert_eq!(config.port, 587);
                    assert_eq!(config.username, None);
                },
            );
        });
    }

    #[test]
    fn test_smtp_config_requires_host_and_sender() {
        temp_env::with_vars_unset(VARS, || {
            assert!(SmtpConfig::from_env().is_err());

            temp_env::with_var("SMTP_HOST", Some("localhost"), || {
                let err = SmtpConfig::from_env().unwrap_err();
                assert!(err.to_string().contains("SMTP_FROM"));
            });
        });
    }

    #[test]
    fn test_debug_hides_password() {
        let config = SmtpConfig::new("smtp.example.com", "a@example.com").with_credentials("u", "hunter2");
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[test]
    fn test_build_message_rejects_bad_address() {
        let mail = OutboundMail {
            from: "noreply@example.com".into(),
            to: "not an address".into(),
            subject: "s".into(),
            html: "<p>h</p>".into(),
        };
        assert!(matches!(
            SmtpProvider::build_message(&mail),
            Err(NotificationError::InvalidEmail(_))
        ));
    }

    #[tokio::test]
    async fn test_new_does_not_connect() {
        let config = SmtpConfig::new("localhost", "noreply@localhost")
            .with_secure(false)
            .with_port(2525);
        let provider = SmtpProvider::new(config).unwrap();
        assert_eq!(provider.from_address(), "noreply@localhost");
        assert_eq!(provider.name(), "smtp");
    }
}
