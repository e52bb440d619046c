//! Stored message record and the classified fields that every record carries.
//!
//! A `Message` is written once by the ingestion pipeline and never updated. All classified
//! fields are always present and well-typed; the normalizer and fallback builder are the only
//! producers of `ClassifiedFields`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default channel tag for messages arriving through the email webhook.
pub const DEFAULT_CHANNEL: &str = "email";

pub const DEFAULT_BOUNDARY_REPLY: &str = "Noted.";
pub const DEFAULT_COOPERATIVE_REPLY: &str = "Thanks for the update.";

/// Unique message identifier (UUID v4 string).
pub type MessageId = String;

/// Two suggested replies: a short boundary-setting one and a cooperative one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyOptions {
    pub boundary: String,
    pub cooperative: String,
}

impl Default for ReplyOptions {
    fn default() -> Self {
        Self {
            boundary: DEFAULT_BOUNDARY_REPLY.to_string(),
            cooperative: DEFAULT_COOPERATIVE_REPLY.to_string(),
        }
    }
}

/// Tagged severity annotation (tone issue, missing data, or processing anomaly).
/// `kind` is an open set (e.g. "insult", "threat", "ai_error"); severity is 1..=5.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flag {
    #[serde(rename = "type")]
    pub kind: String,
    pub severity: u8,
}

impl Flag {
    pub const MIN_SEVERITY: u8 = 1;
    pub const MAX_SEVERITY: u8 = 5;

    pub fn new(kind: impl Into<String>, severity: u8) -> Self {
        Self {
            kind: kind.into(),
            severity: severity.clamp(Self::MIN_SEVERITY, Self::MAX_SEVERITY),
        }
    }
}

/// Classified part of a message. Produced by `classify::normalize` or `classify::build_fallback`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassifiedFields {
    pub summary: String,
    pub response_needed: bool,
    pub needed_to_know: Vec<String>,
    pub reply_options: ReplyOptions,
    pub flags: Vec<Flag>,
    /// Extended logistics; opaque pass-through sequences, empty when unsupported.
    #[serde(default)]
    pub requested_changes: Vec<serde_json::Value>,
    #[serde(default)]
    pub dates: Vec<serde_json::Value>,
    #[serde(default)]
    pub times: Vec<serde_json::Value>,
    #[serde(default)]
    pub locations: Vec<serde_json::Value>,
    #[serde(default)]
    pub deadlines: Vec<serde_json::Value>,
}

impl ClassifiedFields {
    /// Clear the extended sequences (schema versions without extended fields).
    pub fn without_extended(mut self) -> Self {
        self.requested_changes.clear();
        self.dates.clear();
        self.times.clear();
        self.locations.clear();
        self.deadlines.clear();
        self
    }
}

/// Verbatim inbound fields plus the derived sender address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from_raw: String,
    pub from_email: String,
    pub subject: String,
    pub raw_text: String,
}

/// Persisted message record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: MessageId,
    pub channel: String,
    pub received_at: DateTime<Utc>,
    pub from_raw: String,
    pub from_email: String,
    pub subject: String,
    pub raw_text: String,
    #[serde(flatten)]
    pub classified: ClassifiedFields,
}

impl Message {
    /// Assemble a new record with a fresh id and the current time.
    pub fn new(envelope: Envelope, classified: ClassifiedFields) -> Self {
        Self::with_time(envelope, classified, Utc::now())
    }

    pub fn with_time(
        envelope: Envelope,
        classified: ClassifiedFields,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel: DEFAULT_CHANNEL.to_string(),
            received_at,
            from_raw: envelope.from_raw,
            from_email: envelope.from_email,
            subject: envelope.subject,
            raw_text: envelope.raw_text,
            classified,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> ClassifiedFields {
        ClassifiedFields {
            summary: "Pickup moved".to_string(),
            response_needed: true,
            needed_to_know: vec!["Pickup at 5pm".to_string()],
            reply_options: ReplyOptions::default(),
            flags: vec![Flag::new("guilt", 2)],
            requested_changes: vec![serde_json::json!({"what": "pickup"})],
            dates: Vec::new(),
            times: vec![serde_json::json!("17:00")],
            locations: Vec::new(),
            deadlines: Vec::new(),
        }
    }

    #[test]
    fn flag_severity_is_clamped() {
        assert_eq!(Flag::new("threat", 9).severity, 5);
        assert_eq!(Flag::new("threat", 0).severity, 1);
    }

    #[test]
    fn message_serializes_flat_camel_case() {
        let envelope = Envelope {
            from_raw: "Jane <jane@x.com>".to_string(),
            from_email: "jane@x.com".to_string(),
            subject: "Pickup".to_string(),
            raw_text: "Can you get him at 5?".to_string(),
        };
        let msg = Message::new(envelope, fields());
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["channel"], "email");
        assert_eq!(v["fromEmail"], "jane@x.com");
        assert_eq!(v["responseNeeded"], true);
        assert_eq!(v["flags"][0]["type"], "guilt");
        assert_eq!(v["replyOptions"]["boundary"], "Noted.");
        assert!(v["requestedChanges"].is_array());
        let back: Message = serde_json::from_value(v).unwrap();
        assert_eq!(back, msg);
    }

    #[test]
    fn without_extended_clears_sequences() {
        let f = fields().without_extended();
        assert!(f.requested_changes.is_empty());
        assert!(f.times.is_empty());
        assert_eq!(f.summary, "Pickup moved");
    }
}
