//! Ollama classifier (http://127.0.0.1:11434 by default).
//! Uses non-streaming /api/chat with `format: "json"`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{prompt, resolve_base_url, resolve_model, Classifier, ClassifyError};

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:11434";
const DEFAULT_MODEL: &str = "llama3.2:latest";

/// Classifier backed by a local Ollama instance.
#[derive(Clone)]
pub struct OllamaClassifier {
    base_url: String,
    model: String,
    extended_fields: bool,
    client: reqwest::Client,
}

impl OllamaClassifier {
    pub fn new(base_url: Option<String>, model: Option<String>, extended_fields: bool) -> Self {
        Self {
            base_url: resolve_base_url(base_url, DEFAULT_BASE_URL),
            model: resolve_model(model, DEFAULT_MODEL),
            extended_fields,
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Classifier for OllamaClassifier {
    fn name(&self) -> &str {
        "ollama"
    }

    /// POST /api/chat with one system + one user message, JSON output mode.
    async fn classify(
        &self,
        from: &str,
        subject: &str,
        text: &str,
    ) -> Result<String, ClassifyError> {
        let url = format!("{}/api/chat", self.base_url);
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: prompt::system_prompt(self.extended_fields),
                },
                ChatMessage {
                    role: "user",
                    content: prompt::user_prompt(from, subject, text),
                },
            ],
            stream: false,
            format: "json",
            options: ChatOptions { temperature: 0.0 },
        };
        let res = self.client.post(&url).json(&body).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ClassifyError::Api(format!("{} {}", status, body)));
        }
        let data: ChatResponse = res.json().await?;
        Ok(data.message.map(|m| m.content).unwrap_or_default())
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatOptions {
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    stream: bool,
    format: &'static str,
    options: ChatOptions,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_applied() {
        let c = OllamaClassifier::new(None, None, true);
        assert_eq!(c.base_url, DEFAULT_BASE_URL);
        assert_eq!(c.model(), DEFAULT_MODEL);
    }

    #[test]
    fn response_content_is_read() {
        let data: ChatResponse = serde_json::from_str(
            r#"{"model":"m","message":{"role":"assistant","content":"{\"summary\":\"ok\"}"},"done":true}"#,
        )
        .unwrap();
        assert_eq!(data.message.unwrap().content, r#"{"summary":"ok"}"#);
    }
}
