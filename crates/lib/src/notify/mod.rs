//! Outbound notifier: the single `send(to, subject, body)` capability behind which mail
//! transports are interchangeable.
//!
//! Sends are dispatched as detached tasks. The HTTP caller is acknowledged before delivery;
//! the outcome is only written to the log. Delivery is at-most-once with no retry.

mod log_only;
mod resend;

use async_trait::async_trait;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::{self, Config, MailProvider};

pub use log_only::LogNotifier;
pub use resend::ResendNotifier;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Written to the log only (no transport configured).
    Logged,
    /// Accepted by the provider; `provider_id` when the provider returns one.
    Accepted { provider_id: Option<String> },
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("mail request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("mail api error: {0}")]
    Api(String),
    #[error("mail not configured: {0}")]
    Config(String),
}

/// Handle to a mail transport.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Transport name (e.g. "resend").
    fn name(&self) -> &str;

    async fn send(&self, to: &str, subject: &str, body: &str)
        -> Result<DeliveryStatus, NotifyError>;
}

/// One outbound email, already validated against the relay policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// Send in a detached task. The result is observed only by the log; the returned handle
/// exists so callers (and tests) may await completion, never to learn the outcome.
pub fn dispatch(notifier: Arc<dyn Notifier>, email: OutboundEmail) -> JoinHandle<()> {
    tokio::spawn(async move {
        match notifier.send(&email.to, &email.subject, &email.body).await {
            Ok(DeliveryStatus::Logged) => {
                log::info!("outbound mail to {} logged ({})", email.to, notifier.name());
            }
            Ok(DeliveryStatus::Accepted { provider_id }) => {
                log::info!(
                    "outbound mail to {} accepted by {} (id {})",
                    email.to,
                    notifier.name(),
                    provider_id.as_deref().unwrap_or("-")
                );
            }
            Err(e) => {
                log::warn!("outbound mail to {} via {} failed: {}", email.to, notifier.name(), e);
            }
        }
    })
}

/// Build the configured mail transport.
pub fn build_notifier(config: &Config) -> Result<Arc<dyn Notifier>, NotifyError> {
    match config.mail.provider {
        MailProvider::Log => Ok(Arc::new(LogNotifier::new())),
        MailProvider::Resend => {
            let api_key = config::resolve_mail_api_key(config).ok_or_else(|| {
                NotifyError::Config("resend requires mail.apiKey or RESEND_API_KEY".to_string())
            })?;
            let from = config
                .mail
                .from
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .ok_or_else(|| NotifyError::Config("resend requires mail.from".to_string()))?;
            Ok(Arc::new(ResendNotifier::new(
                config.mail.base_url.clone(),
                api_key,
                from,
            )))
        }
    }
}
