//! Outgoing account email.
//!
//! Password reset links go out over SMTP when `[email]` is configured. Without
//! SMTP, or for accounts with no email address, the link is written to the log
//! so an operator can pass it on.

use anyhow::Result;
use lettre::{
    message::{header::ContentType, Mailbox, MultiPart, SinglePart},
    transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};

use tokio::task::JoinHandle;

use crate::config::EmailConfig;
use crate::db::User;

/// How a reset link reached the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Sent,
    Logged,
}

#[derive(Clone)]
pub struct Mailer {
    config: EmailConfig,
}

impl Mailer {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    /// Check if email sending is configured
    pub fn is_enabled(&self) -> bool {
        self.config.is_configured()
    }

    pub async fn send_password_reset(
        &self,
        user: &User,
        reset_url: &str,
        expires_in_minutes: i64,
    ) -> Result<Delivery> {
        let to_email = match (&user.email, self.is_enabled()) {
            (Some(email), true) => email,
            _ => {
                tracing::warn!(
                    user_id = user.id,
                    username = %user.username,
                    reset_url = %reset_url,
                    "Email delivery unavailable, password reset link logged instead"
                );
                return Ok(Delivery::Logged);
            }
        };

        let display_name = user.full_name.as_deref().unwrap_or(&user.username);
        let subject = format!("Reset your {} password", self.config.from_name);
        let html_body = render_reset_html(display_name, reset_url, expires_in_minutes);
        let text_body = render_reset_text(display_name, reset_url, expires_in_minutes);

        self.send_email(to_email, &subject, &html_body, &text_body)
            .await?;
        Ok(Delivery::Sent)
    }

    /// Deliver a reset link in the background; the caller never waits on SMTP
    pub fn spawn_password_reset(
        &self,
        user: User,
        reset_url: String,
        expires_in_minutes: i64,
    ) -> JoinHandle<()> {
        let mailer = self.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer
                .send_password_reset(&user, &reset_url, expires_in_minutes)
                .await
            {
                tracing::error!(user_id = user.id, error = %e, "Failed to send password reset email");
            }
        })
    }

    /// Send an email with HTML and plain text versions
    async fn send_email(
        &self,
        to_email: &str,
        subject: &str,
        html_body: &str,
        text_body: &str,
    ) -> Result<()> {
        let smtp_host = self
            .config
            .smtp_host
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("SMTP host not configured"))?;
        let from_address = self
            .config
            .from_address
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("From address not configured"))?;

        let from: Mailbox = format!("{} <{}>", self.config.from_name, from_address).parse()?;
        let to: Mailbox = to_email.parse()?;

        let email = Message::builder()
            .from(from)
            .to(to)
            .subject(subject)
            .multipart(
                MultiPart::alternative()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_PLAIN)
                            .body(text_body.to_string()),
                    )
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(html_body.to_string()),
                    ),
            )?;

        let mailer = if self.config.smtp_tls {
            AsyncSmtpTransport::<Tokio1Executor>::relay(smtp_host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(smtp_host)
        }
        .port(self.config.smtp_port);

        let mailer = if let (Some(username), Some(password)) =
            (&self.config.smtp_username, &self.config.smtp_password)
        {
            mailer.credentials(Credentials::new(username.clone(), password.clone()))
        } else {
            mailer
        };

        mailer.build().send(email).await?;

        tracing::info!(to = %to_email, subject = %subject, "Email sent");
        Ok(())
    }
}

/// Link the user follows to choose a new password
pub fn reset_link(public_url: &str, token: &str) -> String {
    format!(
        "{}/reset-password?token={}",
        public_url.trim_end_matches('/'),
        token
    )
}

fn render_reset_html(name: &str, reset_url: &str, expires_in_minutes: i64) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <title>Password reset</title>
</head>
<body style="font-family: Arial, sans-serif; color: #374151; line-height: 1.6;">
    <p>Hello {name},</p>
    <p>Someone asked to reset the password for your prayer wall account.</p>
    <p><a href="{url}" style="background-color: #2563eb; color: #ffffff; padding: 10px 18px; border-radius: 6px; text-decoration: none;">Choose a new password</a></p>
    <p>This link can be used once and expires in {minutes} minutes.</p>
    <p>If you did not ask for this, you can ignore this email. Your password stays the same.</p>
</body>
</html>"#,
        name = html_escape(name),
        url = html_escape(reset_url),
        minutes = expires_in_minutes,
    )
}

fn render_reset_text(name: &str, reset_url: &str, expires_in_minutes: i64) -> String {
    format!(
        r#"Hello {name},

Someone asked to reset the password for your prayer wall account.

Choose a new password here:
{url}

This link can be used once and expires in {minutes} minutes.

If you did not ask for this, you can ignore this email. Your password stays the same."#,
        name = name,
        url = reset_url,
        minutes = expires_in_minutes,
    )
}

/// Escape HTML special characters
pub(crate) fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}
