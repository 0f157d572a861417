//! Message sender seam and the SMTP implementation.

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment as MailAttachment, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};

use super::message::OutgoingMessage;
use crate::error::{LoanrError, Result};

/// Delivers composed messages
#[async_trait]
pub trait MessageSender: Send + Sync {
    async fn send(&self, message: OutgoingMessage) -> Result<()>;
}

/// SMTP connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub from: String,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            host: "smtp.gmail.com".to_string(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from: "noreply@example.com".to_string(),
        }
    }
}

impl SmtpSettings {
    /// Notifications are only sent when credentials are present
    pub fn is_configured(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

/// Sends messages through an SMTP relay with STARTTLS
pub struct SmtpSender {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: String,
}

impl SmtpSender {
    pub fn new(settings: &SmtpSettings) -> Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|e| LoanrError::DeliveryFailure(format!("invalid SMTP relay {}: {}", settings.host, e)))?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .build();

        Ok(Self {
            transport,
            from: settings.from.clone(),
        })
    }

    fn build(&self, message: OutgoingMessage) -> Result<Message> {
        let from = self
            .from
            .parse::<Mailbox>()
            .map_err(|e| LoanrError::DeliveryFailure(format!("invalid sender {}: {}", self.from, e)))?;
        let to = message
            .to
            .parse::<Mailbox>()
            .map_err(|e| LoanrError::DeliveryFailure(format!("invalid recipient {}: {}", message.to, e)))?;

        let mut body = MultiPart::mixed().singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_HTML)
                .body(message.html_body),
        );
        for attachment in message.attachments {
            let content_type = ContentType::parse(&attachment.content_type).map_err(|e| {
                LoanrError::DeliveryFailure(format!("invalid content type {}: {}", attachment.content_type, e))
            })?;
            body = body.singlepart(MailAttachment::new(attachment.file_name).body(attachment.content, content_type));
        }

        Message::builder()
            .from(from)
            .to(to)
            .subject(message.subject)
            .multipart(body)
            .map_err(|e| LoanrError::DeliveryFailure(format!("failed to build message: {}", e)))
    }
}

#[async_trait]
impl MessageSender for SmtpSender {
    async fn send(&self, message: OutgoingMessage) -> Result<()> {
        let recipient = message.to.clone();
        let email = self.build(message)?;
        self.transport
            .send(email)
            .await
            .map_err(|e| LoanrError::DeliveryFailure(format!("failed to send email to {}: {}", recipient, e)))?;
        Ok(())
    }
}
