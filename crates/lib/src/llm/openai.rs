//! OpenAI-compatible classifier: POST {base}/chat/completions.
//!
//! Works against OpenAI itself and local servers speaking the same API (LM Studio, vLLM).
//! Requests JSON-object output at temperature 0; the bearer key is optional for local servers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{prompt, resolve_base_url, resolve_model, Classifier, ClassifyError};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Clone)]
pub struct OpenAiClassifier {
    base_url: String,
    model: String,
    api_key: Option<String>,
    extended_fields: bool,
    client: reqwest::Client,
}

impl OpenAiClassifier {
    pub fn new(
        base_url: Option<String>,
        model: Option<String>,
        api_key: Option<String>,
        extended_fields: bool,
    ) -> Self {
        Self {
            base_url: resolve_base_url(base_url, DEFAULT_BASE_URL),
            model: resolve_model(model, DEFAULT_MODEL),
            api_key,
            extended_fields,
            client: reqwest::Client::new(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Classifier for OpenAiClassifier {
    fn name(&self) -> &str {
        "openai"
    }

    async fn classify(
        &self,
        from: &str,
        subject: &str,
        text: &str,
    ) -> Result<String, ClassifyError> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = OpenAiChatRequest {
            model: &self.model,
            messages: vec![
                OpenAiMessage {
                    role: "system",
                    content: prompt::system_prompt(self.extended_fields),
                },
                OpenAiMessage {
                    role: "user",
                    content: prompt::user_prompt(from, subject, text),
                },
            ],
            temperature: 0.0,
            response_format: ResponseFormat {
                typ: "json_object",
            },
        };
        let mut req = self.client.post(&url).json(&body);
        if let Some(ref key) = self.api_key {
            req = req.bearer_auth(key);
        }
        let res = req.send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(ClassifyError::Api(format!("{} {}", status, body)));
        }
        let data: OpenAiChatResponse = res.json().await?;
        first_choice_content(data)
    }
}

/// Content of the first choice. A response with no choices at all is an API error; an empty
/// content string is returned as-is and handled by the normalizer.
fn first_choice_content(data: OpenAiChatResponse) -> Result<String, ClassifyError> {
    let choice = data
        .choices
        .and_then(|c| c.into_iter().next())
        .ok_or_else(|| ClassifyError::Api("response contained no choices".to_string()))?;
    Ok(choice.message.and_then(|m| m.content).unwrap_or_default())
}

#[derive(Debug, Serialize)]
struct OpenAiMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    typ: &'static str,
}

#[derive(Debug, Serialize)]
struct OpenAiChatRequest<'a> {
    model: &'a str,
    messages: Vec<OpenAiMessage>,
    temperature: f32,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct OpenAiChatResponse {
    choices: Option<Vec<OpenAiChoice>>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: Option<OpenAiResponseMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponseMessage {
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_shape() {
        let body = OpenAiChatRequest {
            model: "gpt-4o-mini",
            messages: vec![OpenAiMessage {
                role: "user",
                content: "hi".to_string(),
            }],
            temperature: 0.0,
            response_format: ResponseFormat {
                typ: "json_object",
            },
        };
        let v = serde_json::to_value(&body).unwrap();
        assert_eq!(v["response_format"]["type"], "json_object");
        assert_eq!(v["messages"][0]["role"], "user");
    }

    #[test]
    fn first_choice_is_used() {
        let data: OpenAiChatResponse = serde_json::from_str(
            r#"{"choices":[{"message":{"role":"assistant","content":"{\"summary\":\"a\"}"}},{"message":{"content":"b"}}]}"#,
        )
        .unwrap();
        assert_eq!(first_choice_content(data).unwrap(), r#"{"summary":"a"}"#);
    }

    #[test]
    fn missing_choices_is_an_error() {
        let data: OpenAiChatResponse = serde_json::from_str(r#"{"choices":[]}"#).unwrap();
        assert!(matches!(first_choice_content(data), Err(ClassifyError::Api(_))));
    }
}
