//! Classifier output handling: extraction of JSON from raw model text, normalization into
//! schema-conformant fields, and the fallback record used when classification fails outright.
//!
//! Everything here is pure; the network call lives in `crate::llm`.

mod extract;
mod fallback;
mod normalize;

pub use extract::{parse_output, ParseOutcome};
pub use fallback::{build_fallback, FALLBACK_SUMMARY, PREVIEW_CHARS};
pub use normalize::{normalize, normalize_value};

/// Flag recorded when the classifier answered with text that contained no usable JSON.
pub const FLAG_NON_JSON_OUTPUT: &str = "non_json_output";
pub const NON_JSON_OUTPUT_SEVERITY: u8 = 2;

/// Reason tag for a failed or timed-out classifier call.
pub const REASON_AI_ERROR: &str = "ai_error";
pub const FALLBACK_SEVERITY: u8 = 3;

/// Classify raw model output end to end: extract, then normalize.
pub fn classify_output(raw: &str) -> crate::message::ClassifiedFields {
    normalize(parse_output(raw))
}
