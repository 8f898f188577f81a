// Argus Host Monitoring Service - Email Channel
// SMTP delivery to the per-alert recipient via lettre

use super::{ChannelType, NotificationChannel, NotificationTarget, NotifyError};
use crate::alerts::AlertEvent;
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// SMTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SmtpConfig {
    /// SMTP relay host
    pub host: String,

    /// SMTP relay port
    pub port: u16,

    /// Optional authentication user
    #[serde(default)]
    pub username: Option<String>,

    /// Optional authentication password
    #[serde(default)]
    pub password: Option<String>,

    /// Sender address
    pub from: String,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 25,
            username: None,
            password: None,
            from: "argus@localhost".to_string(),
        }
    }
}

/// One message handed to the mail transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Seam between the email channel and actual SMTP delivery, so tests can
/// capture outgoing mail.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn deliver(&self, mail: OutgoingMail) -> Result<(), NotifyError>;
}

/// lettre-backed SMTP transport.
pub struct SmtpMailer {
    from: Mailbox,
    transport: AsyncSmtpTransport<Tokio1Executor>,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> Result<Self, NotifyError> {
        let from: Mailbox = config.from.parse().map_err(|e| {
            NotifyError::Validation(format!("invalid sender address {:?}: {e}", config.from))
        })?;

        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(
            config.host.as_str(),
        )
        .port(config.port);
        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(username.clone(), password.clone()));
        }

        Ok(Self {
            from,
            transport: builder.build(),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn deliver(&self, mail: OutgoingMail) -> Result<(), NotifyError> {
        let OutgoingMail { to, subject, body } = mail;
        let to: Mailbox = to.parse().map_err(|e| NotifyError::Delivery {
            channel: "email".to_string(),
            reason: format!("invalid recipient: {e}"),
        })?;

        let message = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject(subject)
            .body(body)
            .map_err(|e| NotifyError::Delivery {
                channel: "email".to_string(),
                reason: format!("building message: {e}"),
            })?;

        self.transport
            .send(message)
            .await
            .map_err(|e| NotifyError::Delivery {
                channel: "email".to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

/// Email delivery channel.
///
/// The recipient comes from the alert's own email notification settings;
/// delivery is bounded by the channel-level timeout.
pub struct EmailChannel {
    transport: Arc<dyn MailTransport>,
    timeout: Duration,
}

impl EmailChannel {
    pub fn new(transport: Arc<dyn MailTransport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }
}

#[async_trait]
impl NotificationChannel for EmailChannel {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Email
    }

    fn name(&self) -> &str {
        "email"
    }

    async fn send(
        &self,
        event: &AlertEvent,
        subject: &str,
        body: &str,
    ) -> Result<(), NotifyError> {
        let recipient = event
            .config
            .notifications
            .iter()
            .filter(|n| n.enabled)
            .find_map(|n| match &n.target {
                NotificationTarget::Email { recipient } => Some(recipient.clone()),
                _ => None,
            })
            .ok_or_else(|| NotifyError::Delivery {
                channel: "email".to_string(),
                reason: format!("alert {} has no email recipient", event.alert_id),
            })?;

        let mail = OutgoingMail {
            to: recipient,
            subject: subject.to_string(),
            body: body.to_string(),
        };

        match tokio::time::timeout(self.timeout, self.transport.deliver(mail)).await {
            Ok(result) => {
                if result.is_ok() {
                    debug!(alert_id = %event.alert_id, "Email notification delivered");
                }
                result
            }
            Err(_) => Err(NotifyError::Timeout {
                channel: "email".to_string(),
            }),
        }
    }
}
