//! Pull a JSON value out of raw classifier text.
//!
//! Models asked for strict JSON still wrap it in markdown fences or chat around it. Order:
//! parse the text as-is, then the body of a wrapping code fence, then the balanced `{...}`
//! span at each opening brace in turn.

use serde_json::Value;

/// What the classifier text turned out to contain.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// The text, or the body of a code fence wrapping it, parsed as JSON in full.
    ValidJson(Value),
    /// JSON was found embedded in surrounding prose.
    ExtractedJson(Value),
    /// Nothing parsed; carries the trimmed raw text.
    Unparseable(String),
}

impl ParseOutcome {
    pub fn is_parsed(&self) -> bool {
        !matches!(self, ParseOutcome::Unparseable(_))
    }
}

/// Extract structured output from raw model text. Never fails.
pub fn parse_output(raw: &str) -> ParseOutcome {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return ParseOutcome::Unparseable(String::new());
    }
    if let Ok(v) = serde_json::from_str::<Value>(trimmed) {
        return ParseOutcome::ValidJson(v);
    }
    if let Some(inner) = strip_wrapping_fence(trimmed) {
        if let Ok(v) = serde_json::from_str::<Value>(inner) {
            return ParseOutcome::ValidJson(v);
        }
    }
    let mut rest = trimmed;
    while let Some(start) = rest.find('{') {
        let candidate = &rest[start..];
        if let Some(span) = balanced_object(candidate) {
            if let Ok(v @ Value::Object(_)) = serde_json::from_str::<Value>(span) {
                return ParseOutcome::ExtractedJson(v);
            }
        }
        rest = &candidate[1..];
    }
    ParseOutcome::Unparseable(trimmed.to_string())
}

/// Body of a markdown code block that wraps the whole text: an opening ```` ``` ```` with an
/// optional language tag such as `json`, and an optional closing fence. Fences inside the body
/// are left alone.
fn strip_wrapping_fence(text: &str) -> Option<&str> {
    let rest = text.strip_prefix("```")?;
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_alphanumeric());
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    Some(rest.trim())
}

/// The balanced `{...}` prefix of `text` (which starts at a `{`), skipping braces inside
/// JSON strings.
fn balanced_object(text: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (offset, ch) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[..offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}
