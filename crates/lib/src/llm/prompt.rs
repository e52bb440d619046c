//! Prompts sent to the classifier. Both backends use the same text.

const BASE_RULES: &str = "You mediate email between two people who find direct contact stressful \
(for example co-parents). Read the message and strip hostility, sarcasm, blame and guilt-tripping. \
Keep only the facts the reader needs to act on: logistics, requests, dates, times, places, deadlines.\n\
\n\
Respond with a single JSON object and nothing else: no prose, no markdown fences.\n\
\n\
Schema:\n\
{\n\
  \"summary\": string,            // one or two neutral sentences\n\
  \"responseNeeded\": boolean,    // true if the sender expects an answer or a decision\n\
  \"neededToKnow\": [string],     // short neutral bullet points\n\
  \"replyOptions\": {\n\
    \"boundary\": string,         // brief, polite, non-committal reply\n\
    \"cooperative\": string       // brief, friendly reply that accommodates the request\n\
  },\n\
  \"flags\": [ { \"type\": string, \"severity\": integer } ]";

const EXTENDED_FIELDS: &str = ",\n\
  \"requestedChanges\": [ { \"what\": string, \"from\": string, \"to\": string } ],\n\
  \"dates\": [string],            // ISO 8601 dates mentioned\n\
  \"times\": [string],            // 24h times mentioned\n\
  \"locations\": [string],\n\
  \"deadlines\": [ { \"what\": string, \"by\": string } ]";

const FLAG_RULES: &str = "\n}\n\
\n\
Flag types: insult, threat, guilt, blame, sarcasm, pressure, legal, other. \
Severity runs from 1 (mild) to 5 (severe). Use an empty list when the tone is neutral.";

/// System prompt describing the output schema. `extended` adds the logistics fields.
pub fn system_prompt(extended: bool) -> String {
    let mut out = String::from(BASE_RULES);
    if extended {
        out.push_str(EXTENDED_FIELDS);
    }
    out.push_str(FLAG_RULES);
    out
}

/// User prompt carrying the message itself.
pub fn user_prompt(from: &str, subject: &str, text: &str) -> String {
    let subject = if subject.trim().is_empty() {
        "(no subject)"
    } else {
        subject.trim()
    };
    format!("From: {}\nSubject: {}\n\n{}", from.trim(), subject, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extended_fields_are_optional() {
        let short = system_prompt(false);
        let long = system_prompt(true);
        assert!(!short.contains("requestedChanges"));
        assert!(long.contains("requestedChanges"));
        assert!(long.contains("deadlines"));
        assert!(short.contains("replyOptions"));
    }

    #[test]
    fn user_prompt_marks_missing_subject() {
        let p = user_prompt("Jane <jane@x.com>", " ", "Can you get him at 5?");
        assert_eq!(p, "From: Jane <jane@x.com>\nSubject: (no subject)\n\nCan you get him at 5?");
    }
}
