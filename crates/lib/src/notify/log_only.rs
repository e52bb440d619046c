//! Notifier that only logs outbound mail (dry-run deployments and local development).

use async_trait::async_trait;

use super::{DeliveryStatus, Notifier, NotifyError};

#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<DeliveryStatus, NotifyError> {
        log::info!(
            "mail (not sent): to={} subject={:?} body_chars={}",
            to,
            subject,
            body.chars().count()
        );
        log::debug!("mail body: {}", body);
        Ok(DeliveryStatus::Logged)
    }
}
