//! Placeholder fields for messages whose classifier call failed outright.

use super::FALLBACK_SEVERITY;
use crate::message::{ClassifiedFields, Flag, ReplyOptions};

pub const FALLBACK_SUMMARY: &str = "(AI unavailable) Message received.";

/// Body characters included in the synthetic preview.
pub const PREVIEW_CHARS: usize = 180;

/// Build conformant fields without the classifier. Always marks the message as needing a
/// response and carries exactly one flag: `reason` at severity 3.
pub fn build_fallback(from: &str, subject: &str, text: &str, reason: &str) -> ClassifiedFields {
    let mut needed_to_know = Vec::with_capacity(3);
    let subject = subject.trim();
    if !subject.is_empty() {
        needed_to_know.push(format!("Subject: {}", subject));
    }
    let from = from.trim();
    if !from.is_empty() {
        needed_to_know.push(format!("From: {}", from));
    }
    needed_to_know.push(format!("Preview: {}", preview(text)));

    ClassifiedFields {
        summary: FALLBACK_SUMMARY.to_string(),
        response_needed: true,
        needed_to_know,
        reply_options: ReplyOptions::default(),
        flags: vec![Flag::new(reason, FALLBACK_SEVERITY)],
        requested_changes: Vec::new(),
        dates: Vec::new(),
        times: Vec::new(),
        locations: Vec::new(),
        deadlines: Vec::new(),
    }
}

/// First `PREVIEW_CHARS` characters of the body with whitespace collapsed; `…` when cut.
fn preview(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut chars = collapsed.chars();
    let head: String = chars.by_ref().take(PREVIEW_CHARS).collect();
    if chars.next().is_some() {
        format!("{}…", head)
    } else {
        head
    }
}
