// Argus Host Monitoring Service - Notification Module
// Channel abstraction, delivery targets and notifier configuration

pub mod email;
pub mod inapp;
pub mod notifier;
pub mod rate_limit;
pub mod templates;

use crate::alerts::{AlertEvent, AlertState, Severity};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use email::{EmailChannel, MailTransport, OutgoingMail, SmtpConfig, SmtpMailer};
pub use inapp::{InAppChannel, InAppNotification};
pub use notifier::Notifier;
pub use rate_limit::RateLimiter;
pub use templates::TemplateRegistry;

/// Notifier configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Maximum deliveries per (channel, alert) within one window
    pub rate_limit: u32,

    /// Rolling rate-limit window in seconds
    pub rate_limit_window_secs: u64,

    /// In-app ring capacity
    pub inapp_max_size: usize,

    /// Per-send delivery timeout in seconds
    pub send_timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            rate_limit: 5,
            rate_limit_window_secs: 3600,
            inapp_max_size: 100,
            send_timeout_secs: 10,
        }
    }
}

/// Kinds of delivery channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    #[serde(rename = "in-app")]
    InApp,
    #[serde(rename = "email")]
    Email,
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelType::InApp => write!(f, "in-app"),
            ChannelType::Email => write!(f, "email"),
        }
    }
}

/// Per-channel delivery settings, tagged by channel type so each variant
/// carries exactly the fields it needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum NotificationTarget {
    InApp,
    Email { recipient: String },
}

impl NotificationTarget {
    pub fn channel_type(&self) -> ChannelType {
        match self {
            NotificationTarget::InApp => ChannelType::InApp,
            NotificationTarget::Email { .. } => ChannelType::Email,
        }
    }
}

/// One delivery target on an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Disabled targets are skipped at dispatch
    pub enabled: bool,

    #[serde(flatten)]
    pub target: NotificationTarget,
}

impl NotificationConfig {
    pub fn validate(&self) -> Result<(), NotifyError> {
        match &self.target {
            NotificationTarget::InApp => Ok(()),
            NotificationTarget::Email { recipient } => {
                if recipient.trim().is_empty() {
                    Err(NotifyError::Validation(
                        "email notification requires a recipient".to_string(),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }
}

/// A delivery channel.
///
/// `send` may block (SMTP); the notifier bounds it with the configured
/// timeout. Implementations must be safe to call concurrently.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// The type this channel serves in the registry.
    fn channel_type(&self) -> ChannelType;

    /// Human-readable channel name for logs.
    fn name(&self) -> &str;

    /// Deliver one rendered notification.
    async fn send(&self, event: &AlertEvent, subject: &str, body: &str)
        -> Result<(), NotifyError>;
}

/// Notification subsystem errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyError {
    /// Malformed notification configuration
    Validation(String),

    /// No template registered for the (severity, state) pair
    TemplateMissing {
        severity: Severity,
        state: AlertState,
    },

    /// Channel-specific delivery failure
    Delivery { channel: String, reason: String },

    /// Delivery exceeded the channel timeout
    Timeout { channel: String },
}

impl fmt::Display for NotifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyError::Validation(msg) => write!(f, "invalid notification config: {msg}"),
            NotifyError::TemplateMissing { severity, state } => {
                write!(f, "no template for severity {severity} state {state}")
            }
            NotifyError::Delivery { channel, reason } => {
                write!(f, "delivery via {channel} failed: {reason}")
            }
            NotifyError::Timeout { channel } => write!(f, "delivery via {channel} timed out"),
        }
    }
}

impl std::error::Error for NotifyError {}
