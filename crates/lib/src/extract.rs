//! Structured deal extraction from the AI answer.
//!
//! The chat app is prompted to answer a relevant deal inquiry with a flat
//! JSON object. This module decides whether an answer is such an object and
//! whether it carries every required field; anything else is a skip, never
//! an error that escapes the pipeline.

use serde_json::{Map, Value};
use std::fmt;

/// Phrase the chat app uses to flag an out-of-domain message. Business-defined
/// wording; matched by containment before any JSON parsing is attempted.
pub const OUT_OF_DOMAIN_SENTINEL: &str = "該当する案件ではありません";

/// Base deal record fields (field-set version 1).
pub const DEAL_FIELDS_V1: &[&str] = &[
    "overview",
    "location",
    "startDate",
    "vehicle",
    "headCount",
    "operation",
    "hours",
    "amount",
    "cases",
    "training",
];

/// Extended deal record fields (field-set version 2).
pub const DEAL_FIELDS_V2: &[&str] = &[
    "overview",
    "location",
    "startDate",
    "vehicle",
    "headCount",
    "operation",
    "hours",
    "amount",
    "cases",
    "training",
    "prefecture",
    "code",
    "createdat",
    "rawtext",
];

/// Map a configured field-set version to its required keys. Unknown versions
/// fall back to v1.
pub fn field_set_for_version(version: Option<u32>) -> &'static [&'static str] {
    match version {
        Some(2) => DEAL_FIELDS_V2,
        _ => DEAL_FIELDS_V1,
    }
}

/// Why an answer was not forwarded. Ordered: the first reason that applies wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Answer absent, empty, or whitespace-only.
    EmptyAnswer,
    /// Answer contains the out-of-domain sentinel phrase.
    OutOfDomain,
    /// Answer did not parse as JSON; carries the decode error and a bounded
    /// prefix of the offending text.
    NotJson { error: String, prefix: String },
    /// Answer parsed but is not a JSON object.
    NotObject,
    /// Answer is an object but lacks these required keys (sorted).
    MissingFields(Vec<String>),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::EmptyAnswer => write!(f, "empty answer"),
            SkipReason::OutOfDomain => write!(f, "out-of-domain answer"),
            SkipReason::NotJson { error, prefix } => {
                write!(f, "answer is not JSON ({}): {:?}", error, prefix)
            }
            SkipReason::NotObject => write!(f, "answer is JSON but not an object"),
            SkipReason::MissingFields(missing) => {
                write!(f, "answer is missing fields: {}", missing.join(", "))
            }
        }
    }
}

/// Strip a leading ```` ```json ```` (or bare ```` ``` ````) fence and a
/// trailing ```` ``` ```` fence. Idempotent; unfenced input is only trimmed.
pub fn strip_code_fences(s: &str) -> &str {
    let t = s.trim();
    let Some(rest) = t.strip_prefix("```") else {
        return t;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    let rest = rest.trim_start();
    let rest = rest.strip_suffix("```").unwrap_or(rest);
    rest.trim()
}

/// Bounded prefix of the answer for skip diagnostics (char-safe).
fn answer_prefix(s: &str) -> String {
    s.chars().take(80).collect()
}

/// Decide whether the answer is a forwardable deal object.
///
/// Returns the parsed object untouched (field order preserved) when every
/// key in `required` is present; value content is not validated.
pub fn extract_payload(
    answer: &str,
    required: &[&str],
) -> Result<Map<String, Value>, SkipReason> {
    if answer.trim().is_empty() {
        return Err(SkipReason::EmptyAnswer);
    }
    if answer.contains(OUT_OF_DOMAIN_SENTINEL) {
        return Err(SkipReason::OutOfDomain);
    }

    let stripped = strip_code_fences(answer);
    let value: Value = match serde_json::from_str(stripped) {
        Ok(v) => v,
        Err(e) => {
            return Err(SkipReason::NotJson {
                error: e.to_string(),
                prefix: answer_prefix(stripped),
            });
        }
    };
    let Value::Object(object) = value else {
        return Err(SkipReason::NotObject);
    };

    let mut missing: Vec<String> = required
        .iter()
        .filter(|k| !object.contains_key(**k))
        .map(|k| k.to_string())
        .collect();
    if !missing.is_empty() {
        missing.sort_unstable();
        return Err(SkipReason::MissingFields(missing));
    }

    Ok(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL_DEAL: &str = r#"{"overview":"X","location":"Y","startDate":"Z","vehicle":"A","headCount":"B","operation":"C","hours":"D","amount":"E","cases":"F","training":"G"}"#;

    #[test]
    fn empty_and_whitespace_answers_skip() {
        assert_eq!(
            extract_payload("", DEAL_FIELDS_V1),
            Err(SkipReason::EmptyAnswer)
        );
        assert_eq!(
            extract_payload("   \n\t ", DEAL_FIELDS_V1),
            Err(SkipReason::EmptyAnswer)
        );
    }

    #[test]
    fn sentinel_skips_before_any_parsing() {
        // The surrounding text is valid JSON-ish garbage; the sentinel must win.
        let answer = format!("申し訳ありません、{}。", OUT_OF_DOMAIN_SENTINEL);
        assert_eq!(
            extract_payload(&answer, DEAL_FIELDS_V1),
            Err(SkipReason::OutOfDomain)
        );
    }

    #[test]
    fn prose_answer_is_not_json() {
        let res = extract_payload("こんにちは！何かお手伝いできることはありますか？", DEAL_FIELDS_V1);
        assert!(matches!(res, Err(SkipReason::NotJson { .. })));
    }

    #[test]
    fn not_json_prefix_is_bounded() {
        let long = "x".repeat(500);
        match extract_payload(&long, DEAL_FIELDS_V1) {
            Err(SkipReason::NotJson { prefix, .. }) => assert_eq!(prefix.chars().count(), 80),
            other => panic!("expected NotJson, got {:?}", other),
        }
    }

    #[test]
    fn array_and_scalar_answers_are_not_objects() {
        assert_eq!(
            extract_payload("[1,2,3]", DEAL_FIELDS_V1),
            Err(SkipReason::NotObject)
        );
        assert_eq!(
            extract_payload("42", DEAL_FIELDS_V1),
            Err(SkipReason::NotObject)
        );
        assert_eq!(
            extract_payload("\"a string\"", DEAL_FIELDS_V1),
            Err(SkipReason::NotObject)
        );
    }

    #[test]
    fn missing_fields_are_listed_sorted() {
        let partial = r#"{"overview":"X","location":"Y","amount":"E"}"#;
        match extract_payload(partial, DEAL_FIELDS_V1) {
            Err(SkipReason::MissingFields(missing)) => {
                assert_eq!(
                    missing,
                    vec![
                        "cases",
                        "headCount",
                        "hours",
                        "operation",
                        "startDate",
                        "training",
                        "vehicle"
                    ]
                );
            }
            other => panic!("expected MissingFields, got {:?}", other),
        }
    }

    #[test]
    fn full_deal_passes_and_keeps_field_order() {
        let object = extract_payload(FULL_DEAL, DEAL_FIELDS_V1).expect("extract");
        assert_eq!(object.len(), 10);
        let keys: Vec<&str> = object.keys().map(String::as_str).collect();
        assert_eq!(keys[0], "overview");
        assert_eq!(keys[9], "training");
        assert_eq!(object["amount"], "E");
    }

    #[test]
    fn extra_fields_do_not_block_forwarding() {
        let with_extra = r#"{"overview":"X","location":"Y","startDate":"Z","vehicle":"A","headCount":"B","operation":"C","hours":"D","amount":"E","cases":"F","training":"G","note":"extra"}"#;
        let object = extract_payload(with_extra, DEAL_FIELDS_V1).expect("extract");
        assert_eq!(object.len(), 11);
    }

    #[test]
    fn fenced_answer_parses_like_bare_answer() {
        let fenced = format!("```json\n{}\n```", FULL_DEAL);
        let bare = extract_payload(FULL_DEAL, DEAL_FIELDS_V1).expect("bare");
        let stripped = extract_payload(&fenced, DEAL_FIELDS_V1).expect("fenced");
        assert_eq!(bare, stripped);
    }

    #[test]
    fn bare_fence_without_language_tag_is_stripped() {
        let fenced = format!("```\n{}\n```", FULL_DEAL);
        assert!(extract_payload(&fenced, DEAL_FIELDS_V1).is_ok());
    }

    #[test]
    fn fence_stripping_is_idempotent() {
        let fenced = format!("```json\n{}\n```", FULL_DEAL);
        let once = strip_code_fences(&fenced);
        let twice = strip_code_fences(once);
        assert_eq!(once, twice);
        assert_eq!(once, FULL_DEAL);
    }

    #[test]
    fn extraction_is_idempotent_over_reserialization() {
        let object = extract_payload(FULL_DEAL, DEAL_FIELDS_V1).expect("first pass");
        let reserialized = serde_json::to_string(&Value::Object(object.clone())).expect("ser");
        let again = extract_payload(&reserialized, DEAL_FIELDS_V1).expect("second pass");
        assert_eq!(object, again);
    }

    #[test]
    fn v2_field_set_requires_the_extended_keys() {
        match extract_payload(FULL_DEAL, DEAL_FIELDS_V2) {
            Err(SkipReason::MissingFields(missing)) => {
                assert_eq!(missing, vec!["code", "createdat", "prefecture", "rawtext"]);
            }
            other => panic!("expected MissingFields, got {:?}", other),
        }
    }

    #[test]
    fn field_set_version_resolution() {
        assert_eq!(field_set_for_version(None), DEAL_FIELDS_V1);
        assert_eq!(field_set_for_version(Some(1)), DEAL_FIELDS_V1);
        assert_eq!(field_set_for_version(Some(2)), DEAL_FIELDS_V2);
        assert_eq!(field_set_for_version(Some(99)), DEAL_FIELDS_V1);
    }
}
