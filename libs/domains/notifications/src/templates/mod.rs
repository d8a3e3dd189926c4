//! Email template rendering engine.
//!
//! This module provides Handlebars-based rendering for the mail bodies the
//! upstream services publish.

use crate::error::{NotificationError, NotificationResult};
use crate::models::{OtpEmailData, PasswordResetEmailData, WelcomeEmailData};
use handlebars::Handlebars;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Rendered email content.
#[derive(Debug, Clone)]
pub struct RenderedEmail {
    /// Email subject line.
    pub subject: String,
    /// HTML body content.
    pub html: String,
}

/// Template engine for rendering email templates.
#[derive(Clone)]
pub struct TemplateEngine {
    handlebars: Arc<Handlebars<'static>>,
}

impl TemplateEngine {
    /// Create a new template engine with all templates registered.
    pub fn new() -> NotificationResult<Self> {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);

        for (name, template) in [
            ("otp_html", OTP_HTML_TEMPLATE),
            ("password_reset_html", PASSWORD_RESET_HTML_TEMPLATE),
            ("welcome_html", WELCOME_HTML_TEMPLATE),
        ] {
            handlebars
                .register_template_string(name, template)
                .map_err(|e| {
                    NotificationError::TemplateError(format!("Failed to register {}: {}", name, e))
                })?;
        }

        Ok(Self {
            handlebars: Arc::new(handlebars),
        })
    }

    /// Render a template with the given data.
    fn render<T: Serialize>(&self, template_name: &str, data: &T) -> NotificationResult<String> {
        Ok(self.handlebars.render(template_name, data)?)
    }

    /// Render the one-time password email.
    pub fn render_otp(&self, data: &OtpEmailData) -> NotificationResult<RenderedEmail> {
        debug!("Rendering OTP email");

        Ok(RenderedEmail {
            subject: "Your verification code".to_string(),
            html: self.render("otp_html", data)?,
        })
    }

    /// Render the password reset email.
    pub fn render_password_reset(&self, data: &PasswordResetEmailData) -> NotificationResult<RenderedEmail> {
        debug!("Rendering password reset email");

        Ok(RenderedEmail {
            subject: "Reset your password".to_string(),
            html: self.render("password_reset_html", data)?,
        })
    }

    /// Render the registration confirmation email.
    pub fn render_welcome(&self, data: &WelcomeEmailData) -> NotificationResult<RenderedEmail> {
        debug!(user = %data.user_name, "Rendering welcome email");

        Ok(RenderedEmail {
            subject: format!("Welcome to {}, {}!", data.app_name, data.user_name),
            html: self.render("welcome_html", data)?,
        })
    }
}

// ============================================================================
// Email Templates
// ============================================================================

const OTP_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>Your verification code</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background-color: #f4f4f5;">
  <table role="presentation" width="100%" cellspacing="0" cellpadding="0" style="max-width: 600px; margin: 0 auto; padding: 40px 20px;">
    <tr>
      <td style="background-color: #ffffff; border-radius: 8px; padding: 40px;">
        <h1 style="color: #18181b; font-size: 22px; margin: 0 0 16px 0; text-align: center;">{{app_name}} verification</h1>
        <p style="color: #52525b; font-size: 16px; margin: 0 0 24px 0; text-align: center;">Use this code to continue:</p>
        <p style="color: #18181b; font-size: 32px; font-weight: 700; letter-spacing: 8px; text-align: center; margin: 0 0 24px 0;">{{otp}}</p>
        <p style="color: #71717a; font-size: 12px; text-align: center; margin: 0;">The code expires in {{expiry_minutes}} minutes. If you did not request it, ignore this email.</p>
      </td>
    </tr>
  </table>
</body>
</html>"#;

const PASSWORD_RESET_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>Reset your password</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background-color: #f4f4f5;">
  <table role="presentation" width="100%" cellspacing="0" cellpadding="0" style="max-width: 600px; margin: 0 auto; padding: 40px 20px;">
    <tr>
      <td style="background-color: #ffffff; border-radius: 8px; padding: 40px;">
        <h1 style="color: #18181b; font-size: 22px; margin: 0 0 16px 0; text-align: center;">Reset your {{app_name}} password</h1>
        <p style="color: #52525b; font-size: 16px; margin: 0 0 24px 0; text-align: center;">Someone asked to reset the password for this account.</p>
        <p style="text-align: center; margin: 0 0 24px 0;">
          <a href="{{reset_link}}" style="display: inline-block; background-color: #2563eb; color: #ffffff; font-size: 16px; padding: 12px 32px; text-decoration: none; border-radius: 6px;">Reset Password</a>
        </p>
        <p style="color: #71717a; font-size: 12px; text-align: center; margin: 0;">If you did not ask for this, you can ignore this email.</p>
      </td>
    </tr>
  </table>
</body>
</html>"#;

const WELCOME_HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>Welcome to {{app_name}}</title>
</head>
<body style="margin: 0; padding: 0; font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background-color: #f4f4f5;">
  <table role="presentation" width="100%" cellspacing="0" cellpadding="0" style="max-width: 600px; margin: 0 auto; padding: 40px 20px;">
    <tr>
      <td style="background-color: #ffffff; border-radius: 8px; padding: 40px;">
        <h1 style="color: #18181b; font-size: 24px; margin: 0 0 16px 0; text-align: center;">Welcome to {{app_name}}, {{user_name}}!</h1>
        <p style="color: #52525b; font-size: 16px; margin: 0; text-align: center;">Your registration is confirmed. You can now sign in and start browsing jobs.</p>
      </td>
    </tr>
  </table>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_engine_creation() {
        assert!(TemplateEngine::new().is_ok());
    }

    #[test]
    fn test_render_otp_email() {
        let engine = TemplateEngine::new().unwrap();
        let rendered = engine
            .render_otp(&OtpEmailData {
                app_name: "Job Board".into(),
                otp: "493021".into(),
                expiry_minutes: 10,
            })
            .unwrap();

        assert_eq!(rendered.subject, "Your verification code");
        assert!(rendered.html.contains("493021"));
        assert!(rendered.html.contains("10 minutes"));
    }

    #[test]
    fn test_render_password_reset_escapes_link() {
        let engine = TemplateEngine::new().unwrap();
        let rendered = engine
            .render_password_reset(&PasswordResetEmailData {
                app_name: "Job Board".into(),
                reset_link: "https://example.com/reset?token=a&b=\"c\"".into(),
            })
            .unwrap();

        assert!(rendered.html.contains("token=a&amp;b="));
        assert!(!rendered.html.contains("\"c\""));
    }

    #[test]
    fn test_render_welcome_email() {
        let engine = TemplateEngine::new().unwrap();
        let rendered = engine
            .render_welcome(&WelcomeEmailData {
                app_name: "Job Board".into(),
                user_name: "Test User".into(),
            })
            .unwrap();

        assert!(rendered.html.contains("Test User"));
        assert_eq!(rendered.subject, "Welcome to Job Board, Test User!");
    }
    #[test]
    fn test_missing_field_is_a_template_error() {
        let engine = TemplateEngine::new().unwrap();
        let err = engine
            .render("otp_html", &serde_json::json!({ "app_name": "Job Board" }))
            .unwrap_err();

        assert!(matches!(err, NotificationError::TemplateError(_)));
    }
}
