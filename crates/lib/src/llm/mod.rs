//! Classification client: the contract with the external text-generation service.
//!
//! A `Classifier` turns (sender, subject, body) into raw model text. Callers own timeouts and
//! treat every error as recoverable; parsing of the returned text lives in `crate::classify`.

mod ollama;
mod openai;
mod prompt;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{self, ClassifierBackend, Config};

pub use ollama::OllamaClassifier;
pub use openai::OpenAiClassifier;
pub use prompt::{system_prompt, user_prompt};

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("classifier request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("classifier api error: {0}")]
    Api(String),
    #[error("classifier timed out after {0:?}")]
    Timeout(Duration),
}

/// Sends one message to the classifier and returns its raw text output.
/// `text` must be non-empty; the pipeline checks before calling.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short backend name for logs and health output (e.g. "openai").
    fn name(&self) -> &str;

    async fn classify(&self, from: &str, subject: &str, text: &str)
        -> Result<String, ClassifyError>;
}

/// Build the configured classifier backend.
pub fn build_classifier(config: &Config) -> Arc<dyn Classifier> {
    let c = &config.classifier;
    match c.backend {
        ClassifierBackend::Openai => Arc::new(OpenAiClassifier::new(
            c.base_url.clone(),
            c.model.clone(),
            config::resolve_classifier_api_key(config),
            c.extended_fields,
        )),
        ClassifierBackend::Ollama => Arc::new(OllamaClassifier::new(
            c.base_url.clone(),
            c.model.clone(),
            c.extended_fields,
        )),
    }
}

/// Model id from config, trimmed; `fallback` when unset or blank.
fn resolve_model(model: Option<String>, fallback: &str) -> String {
    model
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn resolve_base_url(base_url: Option<String>, fallback: &str) -> String {
    base_url
        .map(|u| u.trim().trim_end_matches('/').to_string())
        .filter(|u| !u.is_empty())
        .unwrap_or_else(|| fallback.to_string())
}
