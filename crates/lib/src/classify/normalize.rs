//! Coerce untrusted classifier output into `ClassifiedFields`.
//!
//! Total: any input produces a complete record. Wrong-typed fields fall back to safe
//! defaults field by field; nothing from the model reaches storage without passing here.

use serde_json::{Map, Value};

use super::extract::ParseOutcome;
use super::{FLAG_NON_JSON_OUTPUT, NON_JSON_OUTPUT_SEVERITY};
use crate::message::{
    ClassifiedFields, Flag, ReplyOptions, DEFAULT_BOUNDARY_REPLY, DEFAULT_COOPERATIVE_REPLY,
};

/// Normalize a parse outcome. Unparseable text becomes the summary with a `non_json_output` flag.
pub fn normalize(outcome: ParseOutcome) -> ClassifiedFields {
    match outcome {
        ParseOutcome::ValidJson(v) | ParseOutcome::ExtractedJson(v) => normalize_value(&v),
        ParseOutcome::Unparseable(raw) => ClassifiedFields {
            summary: raw,
            response_needed: false,
            needed_to_know: Vec::new(),
            reply_options: ReplyOptions::default(),
            flags: vec![Flag::new(FLAG_NON_JSON_OUTPUT, NON_JSON_OUTPUT_SEVERITY)],
            requested_changes: Vec::new(),
            dates: Vec::new(),
            times: Vec::new(),
            locations: Vec::new(),
            deadlines: Vec::new(),
        },
    }
}

/// Normalize any JSON value. Non-objects are treated as an empty object.
pub fn normalize_value(value: &Value) -> ClassifiedFields {
    let empty = Map::new();
    let obj = value.as_object().unwrap_or(&empty);
    ClassifiedFields {
        summary: obj
            .get("summary")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string(),
        response_needed: truthy(obj.get("responseNeeded")),
        needed_to_know: string_list(obj.get("neededToKnow")),
        reply_options: reply_options(obj.get("replyOptions")),
        flags: flags(obj.get("flags")),
        requested_changes: opaque_list(obj.get("requestedChanges")),
        dates: opaque_list(obj.get("dates")),
        times: opaque_list(obj.get("times")),
        locations: opaque_list(obj.get("locations")),
        deadlines: opaque_list(obj.get("deadlines")),
    }
}

/// Loose truthiness: null, false, 0, NaN and "" are false; everything else is true.
fn truthy(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().map_or(false, |f| f != 0.0 && !f.is_nan()),
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Array(_)) | Some(Value::Object(_)) => true,
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

fn opaque_list(value: Option<&Value>) -> Vec<Value> {
    match value {
        Some(Value::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

fn reply_options(value: Option<&Value>) -> ReplyOptions {
    let field = |name: &str, default: &str| {
        value
            .and_then(|v| v.get(name))
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(default)
            .to_string()
    };
    ReplyOptions {
        boundary: field("boundary", DEFAULT_BOUNDARY_REPLY),
        cooperative: field("cooperative", DEFAULT_COOPERATIVE_REPLY),
    }
}

/// Keep entries with a non-empty string `type`; severity is clamped to 1..=5 (default 1).
fn flags(value: Option<&Value>) -> Vec<Flag> {
    let Some(Value::Array(items)) = value else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let kind = item.get("type")?.as_str()?.trim();
            if kind.is_empty() {
                return None;
            }
            let severity = item
                .get("severity")
                .and_then(Value::as_f64)
                .filter(|f| f.is_finite())
                .map(|f| f.round().clamp(1.0, 5.0) as u8)
                .unwrap_or(Flag::MIN_SEVERITY);
            Some(Flag::new(kind, severity))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assert_conformant(f: &ClassifiedFields) {
        assert!(!f.reply_options.boundary.is_empty());
        assert!(!f.reply_options.cooperative.is_empty());
        for flag in &f.flags {
            assert!(!flag.kind.is_empty());
            assert!((1..=5).contains(&flag.severity));
        }
    }

    #[test]
    fn arbitrary_inputs_produce_conformant_fields() {
        let inputs = [
            Value::Null,
            json!({}),
            json!([]),
            json!("just a string"),
            json!(42),
            json!({"summary": 7, "responseNeeded": "yes", "neededToKnow": "nope"}),
            json!({"replyOptions": {"boundary": 1}, "flags": {"type": "x"}}),
            json!({"flags": [1, "insult", {"severity": 4}, {"type": ""}]}),
            json!({"dates": "tomorrow", "times": null, "locations": {}, "deadlines": 3}),
        ];
        for input in inputs.iter() {
            let f = normalize_value(input);
            assert_conformant(&f);
            assert!(f.flags.is_empty(), "wrong shape must not invent flags: {}", input);
        }
    }

    #[test]
    fn empty_object_gets_defaults() {
        let f = normalize_value(&json!({}));
        assert_eq!(f.summary, "");
        assert!(!f.response_needed);
        assert!(f.needed_to_know.is_empty());
        assert_eq!(f.reply_options, ReplyOptions::default());
        assert!(f.flags.is_empty());
        assert!(f.dates.is_empty());
    }

    #[test]
    fn response_needed_uses_truthiness() {
        let cases = [
            (json!(true), true),
            (json!(false), false),
            (json!(1), true),
            (json!(0), false),
            (json!("no"), true),
            (json!(""), false),
            (json!(null), false),
            (json!([]), true),
        ];
        for (v, expected) in cases {
            let f = normalize_value(&json!({ "responseNeeded": v }));
            assert_eq!(f.response_needed, expected, "value {}", v);
        }
    }

    #[test]
    fn flags_are_filtered_and_clamped() {
        let f = normalize_value(&json!({
            "flags": [
                {"type": "insult", "severity": 4},
                {"type": "threat", "severity": 11},
                {"type": "guilt"},
                {"type": "sarcasm", "severity": "high"},
                {"severity": 2},
                "blame"
            ]
        }));
        assert_eq!(
            f.flags,
            vec![
                Flag::new("insult", 4),
                Flag::new("threat", 5),
                Flag::new("guilt", 1),
                Flag::new("sarcasm", 1),
            ]
        );
    }

    #[test]
    fn partial_reply_options_are_completed() {
        let f = normalize_value(&json!({"replyOptions": {"cooperative": "Yes, 5pm works."}}));
        assert_eq!(f.reply_options.boundary, "Noted.");
        assert_eq!(f.reply_options.cooperative, "Yes, 5pm works.");
        let f = normalize_value(&json!({"replyOptions": {"boundary": "  ", "cooperative": ""}}));
        assert_eq!(f.reply_options, ReplyOptions::default());
    }

    #[test]
    fn conformant_input_is_unchanged() {
        let input = json!({
            "summary": "Pickup time change requested",
            "responseNeeded": true,
            "neededToKnow": ["Pickup at 5pm"],
            "replyOptions": {"boundary": "Noted.", "cooperative": "Yes, 5pm works."},
            "flags": [{"type": "insult", "severity": 2}],
            "requestedChanges": [{"what": "pickup", "to": "17:00"}],
            "dates": ["2024-05-03"],
            "times": ["17:00"],
            "locations": ["school"],
            "deadlines": []
        });
        let once = normalize_value(&input);
        assert_eq!(serde_json::to_value(&once).unwrap(), input);
        let twice = normalize_value(&serde_json::to_value(&once).unwrap());
        assert_eq!(once, twice);
    }

    #[test]
    fn unparseable_becomes_summary_with_flag() {
        let f = normalize(ParseOutcome::Unparseable("Plain prose answer".to_string()));
        assert_eq!(f.summary, "Plain prose answer");
        assert!(!f.response_needed);
        assert!(f.needed_to_know.is_empty());
        assert!(f.requested_changes.is_empty());
        assert_eq!(f.flags, vec![Flag::new("non_json_output", 2)]);
        assert_conformant(&f);
    }
}
