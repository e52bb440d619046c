//! Ingestion pipeline: validate → classify → normalize or fall back → persist → acknowledge.
//!
//! The classifier is probabilistic and remote, so every failure on that side degrades to a
//! fallback record instead of an error. Only an empty body or a failed store write is a hard
//! failure; in both cases nothing is persisted.

use regex::Regex;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use crate::classify::{self, ParseOutcome, REASON_AI_ERROR};
use crate::config::Config;
use crate::llm::{Classifier, ClassifyError};
use crate::message::{ClassifiedFields, Envelope, Message, MessageId};
use crate::store::{MessageStore, StoreError};

/// One webhook call's worth of inbound email.
#[derive(Debug, Clone, Default)]
pub struct InboundRequest {
    pub from: String,
    pub subject: String,
    pub text: String,
}

/// How classification went for an ingested message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestStatus {
    /// Classifier answered; its output was normalized (possibly repaired).
    Classified,
    /// Classifier call failed or timed out; a fallback record was stored.
    Degraded { reason: String },
}

#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub id: MessageId,
    pub status: IngestStatus,
}

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("missing body text")]
    EmptyText,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Classifier timeout and schema options. The store bounds its own waits (`store.timeoutMs`).
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub classifier_timeout: Duration,
    /// When false, extended logistics fields are always stored empty.
    pub extended_fields: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            classifier_timeout: Duration::from_secs(20),
            extended_fields: true,
        }
    }
}

impl PipelineOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            classifier_timeout: config.classifier.timeout(),
            extended_fields: config.classifier.extended_fields,
        }
    }
}

pub struct IngestionPipeline {
    classifier: Arc<dyn Classifier>,
    store: Arc<dyn MessageStore>,
    options: PipelineOptions,
}

impl IngestionPipeline {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        store: Arc<dyn MessageStore>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            classifier,
            store,
            options,
        }
    }

    pub fn classifier(&self) -> &Arc<dyn Classifier> {
        &self.classifier
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Process one inbound email and persist exactly one record for it.
    pub async fn ingest(&self, req: InboundRequest) -> Result<IngestOutcome, IngestError> {
        if req.text.trim().is_empty() {
            return Err(IngestError::EmptyText);
        }
        let from_email = extract_email(&req.from);
        let (classified, status) = self.classify(&req.from, &req.subject, &req.text).await;
        let message = Message::new(
            Envelope {
                from_raw: req.from,
                from_email,
                subject: req.subject,
                raw_text: req.text,
            },
            classified,
        );

        // The store bounds its own wait; a write in flight is never abandoned.
        self.store.insert(&message).await?;

        match status {
            IngestStatus::Classified => {
                log::info!("ingested message {} from {}", message.id, message.from_email);
            }
            IngestStatus::Degraded { ref reason } => {
                log::warn!(
                    "ingested message {} from {} without classification ({})",
                    message.id,
                    message.from_email,
                    reason
                );
            }
        }
        Ok(IngestOutcome {
            id: message.id,
            status,
        })
    }

    /// Run the classifier and turn its answer into fields. See [`classify_message`].
    pub async fn classify(
        &self,
        from: &str,
        subject: &str,
        text: &str,
    ) -> (ClassifiedFields, IngestStatus) {
        classify_message(self.classifier.as_ref(), &self.options, from, subject, text).await
    }
}

/// Classify one message without storing it: classifier call under the configured timeout,
/// then normalization. Never fails; errors and timeouts produce the fallback record.
pub async fn classify_message(
    classifier: &dyn Classifier,
    options: &PipelineOptions,
    from: &str,
    subject: &str,
    text: &str,
) -> (ClassifiedFields, IngestStatus) {
    let t = options.classifier_timeout;
    let result = match tokio::time::timeout(t, classifier.classify(from, subject, text)).await {
        Ok(r) => r,
        Err(_) => Err(ClassifyError::Timeout(t)),
    };
    let (fields, status) = match result {
        Ok(raw) => {
            let outcome = classify::parse_output(&raw);
            if let ParseOutcome::Unparseable(_) = outcome {
                log::warn!(
                    "{} classifier returned no usable JSON; keeping raw text as summary",
                    classifier.name()
                );
            }
            (classify::normalize(outcome), IngestStatus::Classified)
        }
        Err(e) => {
            log::warn!("{} classifier failed: {}", classifier.name(), e);
            (
                classify::build_fallback(from, subject, text, REASON_AI_ERROR),
                IngestStatus::Degraded {
                    reason: REASON_AI_ERROR.to_string(),
                },
            )
        }
    };
    if options.extended_fields {
        (fields, status)
    } else {
        (fields.without_extended(), status)
    }
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(?:\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}")
            .expect("email pattern is valid")
    })
}

/// Best-effort sender address: text inside angle brackets, else the first email-like token,
/// else the trimmed input.
pub fn extract_email(from_raw: &str) -> String {
    if let Some(start) = from_raw.find('<') {
        if let Some(len) = from_raw[start + 1..].find('>') {
            let inner = from_raw[start + 1..start + 1 + len].trim();
            if !inner.is_empty() {
                return inner.to_string();
            }
        }
    }
    if let Some(m) = email_pattern().find(from_raw) {
        return m.as_str().to_string();
    }
    from_raw.trim().to_string()
}
