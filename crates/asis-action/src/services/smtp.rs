//! SMTP delivery over STARTTLS.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use tracing::{debug, info};

use asis_core::config::EmailConfig;

use super::{validate_email, EmailSender, OutgoingEmail};
use crate::error::ServiceError;

const SMTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Sends mail through the configured SMTP relay.
///
/// Without credentials the sender still constructs, and every send fails
/// with [`ServiceError::NotConfigured`].
pub struct SmtpEmailSender {
    from: Option<Mailbox>,
    transport: Option<AsyncSmtpTransport<Tokio1Executor>>,
}

impl SmtpEmailSender {
    pub fn new(config: &EmailConfig) -> Result<Self, ServiceError> {
        if !config.is_configured() {
            info!("SMTP credentials missing; outgoing email disabled");
            return Ok(Self {
                from: None,
                transport: None,
            });
        }

        let from: Mailbox = config
            .smtp_user
            .parse()
            .map_err(|e| ServiceError::InvalidInput(format!("sender address: {}", e)))?;

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.smtp_host)
            .map_err(|e| ServiceError::Rejected(format!("SMTP relay {}: {}", config.smtp_host, e)))?
            .port(config.smtp_port)
            .credentials(Credentials::new(
                config.smtp_user.clone(),
                config.smtp_password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build();

        Ok(Self {
            from: Some(from),
            transport: Some(transport),
        })
    }

    pub fn is_configured(&self) -> bool {
        self.transport.is_some()
    }
}

#[async_trait]
impl EmailSender for SmtpEmailSender {
    async fn send_email(&self, email: &OutgoingEmail) -> Result<(), ServiceError> {
        if !validate_email(&email.to) {
            return Err(ServiceError::InvalidInput(format!(
                "invalid recipient: {}",
                email.to
            )));
        }
        let (Some(from), Some(transport)) = (self.from.as_ref(), self.transport.as_ref()) else {
            return Err(ServiceError::NotConfigured("email"));
        };

        let to: Mailbox = email
            .to
            .trim()
            .parse()
            .map_err(|e| ServiceError::InvalidInput(format!("recipient: {}", e)))?;
        let content_type = if email.is_html {
            ContentType::TEXT_HTML
        } else {
            ContentType::TEXT_PLAIN
        };

        let message = Message::builder()
            .from(from.clone())
            .to(to)
            .subject(email.subject.clone())
            .header(content_type)
            .body(email.body.clone())
            .map_err(|e| ServiceError::InvalidInput(e.to_string()))?;

        debug!(to = %email.to, subject = %email.subject, "Sending email");
        transport
            .send(message)
            .await
            .map_err(|e| ServiceError::Network(e.to_string()))?;
        info!(to = %email.to, "Email sent");
        Ok(())
    }
}
