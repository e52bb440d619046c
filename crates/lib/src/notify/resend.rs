//! Resend transactional email API: POST {base}/emails with a bearer key.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{DeliveryStatus, Notifier, NotifyError};

const RESEND_API_BASE: &str = "https://api.resend.com";

pub struct ResendNotifier {
    base_url: String,
    api_key: String,
    from: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct SendEmailRequest<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct SendEmailResponse {
    #[serde(default)]
    id: Option<String>,
}

impl ResendNotifier {
    pub fn new(base_url: Option<String>, api_key: String, from: String) -> Self {
        let base_url = base_url
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .unwrap_or_else(|| RESEND_API_BASE.to_string());
        Self {
            base_url,
            api_key,
            from,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for ResendNotifier {
    fn name(&self) -> &str {
        "resend"
    }

    async fn send(
        &self,
        to: &str,
        subject: &str,
        body: &str,
    ) -> Result<DeliveryStatus, NotifyError> {
        let url = format!("{}/emails", self.base_url);
        let payload = SendEmailRequest {
            from: &self.from,
            to: [to],
            subject,
            text: body,
        };
        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(NotifyError::Api(format!("send failed: {} {}", status, body)));
        }
        let data: SendEmailResponse = res.json().await.unwrap_or(SendEmailResponse { id: None });
        Ok(DeliveryStatus::Accepted {
            provider_id: data.id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_shape() {
        let p = SendEmailRequest {
            from: "Parley <relay@example.com>",
            to: ["jane@x.com"],
            subject: "Re: Pickup",
            text: "Noted.",
        };
        let v = serde_json::to_value(&p).unwrap();
        assert_eq!(v["to"], serde_json::json!(["jane@x.com"]));
        assert_eq!(v["text"], "Noted.");
    }

    #[test]
    fn base_url_default_and_trim() {
        let n = ResendNotifier::new(None, "k".into(), "f@x.com".into());
        assert_eq!(n.base_url, RESEND_API_BASE);
        let n = ResendNotifier::new(Some("http://127.0.0.1:9/".into()), "k".into(), "f@x.com".into());
        assert_eq!(n.base_url, "http://127.0.0.1:9");
    }
}
