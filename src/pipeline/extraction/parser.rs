//! Raw service response → [`ExtractionRecord`].
//!
//! Two tiers and nothing in between: either a JSON object is found and decoded
//! (missing required fields defaulted to the sentinel), or the whole response
//! collapses to the all-sentinel fallback record. Parsing never fails.

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use super::types::{Confidence, ExtractionRecord, NOT_FOUND};

/// Notes carried by the record produced when a response cannot be decoded.
pub const FALLBACK_PARSING_NOTE: &str = "Used fallback parsing method";

/// Greedy: from the first `{` to the last `}`, across lines.
static JSON_OBJECT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)\{.*\}").unwrap());

/// Parse the service's free-text answer into a record.
pub fn parse_extraction_response(response: &str) -> ExtractionRecord {
    match decode_record(response) {
        Some(record) => record,
        None => fallback_record(),
    }
}

/// Record returned whenever the structured parse is not possible.
pub fn fallback_record() -> ExtractionRecord {
    ExtractionRecord::not_found(FALLBACK_PARSING_NOTE)
}

fn decode_record(response: &str) -> Option<ExtractionRecord> {
    let Some(found) = JSON_OBJECT.find(response) else {
        tracing::debug!(response_len = response.len(), "No JSON object in service response");
        return None;
    };

    let value: Value = match serde_json::from_str(found.as_str()) {
        Ok(value) => value,
        Err(e) => {
            tracing::debug!(error = %e, "Service response JSON did not decode");
            return None;
        }
    };

    let Value::Object(mut map) = value else {
        return None;
    };

    let patient_first_name = take_field(&mut map, "patient_first_name");
    let patient_last_name = take_field(&mut map, "patient_last_name");
    let patient_dob = take_field(&mut map, "patient_dob");

    let confidence = match map.remove("confidence") {
        Some(Value::String(label)) => Confidence::from_label(&label),
        _ => Confidence::Low,
    };

    let notes = match map.remove("notes") {
        Some(Value::String(notes)) => notes,
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    };

    Some(ExtractionRecord {
        patient_first_name,
        patient_last_name,
        patient_dob,
        confidence,
        notes,
        extra: map,
    })
}

/// Remove a required field, normalising absent/null/blank values to the sentinel.
fn take_field(map: &mut Map<String, Value>, key: &str) -> String {
    match map.remove(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => s,
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(v @ (Value::Array(_) | Value::Object(_))) => v.to_string(),
        _ => NOT_FOUND.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_fallback(record: &ExtractionRecord) {
        assert_eq!(record.required_values(), [NOT_FOUND; 3]);
        assert_eq!(record.confidence, Confidence::Low);
        assert_eq!(record.notes, FALLBACK_PARSING_NOTE);
    }

    #[test]
    fn parses_clean_json() {
        let record = parse_extraction_response(
            r#"{"patient_first_name":"Jane","patient_last_name":"Doe","patient_dob":"1990-01-01","confidence":"high","notes":"clear scan"}"#,
        );
        assert_eq!(record.patient_first_name, "Jane");
        assert_eq!(record.patient_last_name, "Doe");
        assert_eq!(record.patient_dob, "1990-01-01");
        assert_eq!(record.confidence, Confidence::High);
        assert_eq!(record.notes, "clear scan");
        assert!(record.extra.is_empty());
    }

    #[test]
    fn parses_json_wrapped_in_prose_and_code_fence() {
        let response = "Here is what I found:\n```json\n{\n  \"patient_first_name\": \"John\",\n  \"patient_last_name\": \"Smith\",\n  \"patient_dob\": \"03/04/1975\",\n  \"confidence\": \"medium\"\n}\n```\nLet me know if you need more.";
        let record = parse_extraction_response(response);
        assert_eq!(record.patient_first_name, "John");
        assert_eq!(record.patient_dob, "03/04/1975");
        assert_eq!(record.confidence, Confidence::Medium);
        assert_eq!(record.notes, "");
    }

    #[test]
    fn missing_field_is_filled_with_sentinel_only() {
        let record = parse_extraction_response(
            r#"{"patient_first_name":"Jane","patient_dob":"1990-01-01","confidence":"high","notes":"n"}"#,
        );
        assert_eq!(record.patient_first_name, "Jane");
        assert_eq!(record.patient_last_name, NOT_FOUND);
        assert_eq!(record.patient_dob, "1990-01-01");
        assert_eq!(record.confidence, Confidence::High);
    }

    #[test]
    fn null_and_blank_fields_become_sentinel() {
        let record = parse_extraction_response(
            r#"{"patient_first_name":null,"patient_last_name":"   ","patient_dob":"1990"}"#,
        );
        assert_eq!(record.patient_first_name, NOT_FOUND);
        assert_eq!(record.patient_last_name, NOT_FOUND);
        assert_eq!(record.patient_dob, "1990");
    }

    #[test]
    fn no_json_uses_fallback() {
        assert_fallback(&parse_extraction_response(
            "I could not read this document, sorry.",
        ));
        assert_fallback(&parse_extraction_response(""));
    }

    #[test]
    fn broken_json_uses_fallback() {
        assert_fallback(&parse_extraction_response(
            r#"{"patient_first_name": "Jane", "patient_last_name": }"#,
        ));
    }

    #[test]
    fn greedy_match_spanning_two_objects_falls_back() {
        // First `{` to last `}` covers both objects, which is not valid JSON.
        assert_fallback(&parse_extraction_response(
            r#"{"patient_first_name":"A"} and {"patient_first_name":"B"}"#,
        ));
    }

    #[test]
    fn unknown_confidence_is_low() {
        let record = parse_extraction_response(
            r#"{"patient_first_name":"A","patient_last_name":"B","patient_dob":"C","confidence":"certain"}"#,
        );
        assert_eq!(record.confidence, Confidence::Low);
    }

    #[test]
    fn extra_keys_are_preserved() {
        let record = parse_extraction_response(
            r#"{"patient_first_name":"A","patient_last_name":"B","patient_dob":"C","mrn":"778","page_hint":2}"#,
        );
        assert_eq!(record.extra.get("mrn"), Some(&Value::String("778".into())));
        assert_eq!(record.extra.get("page_hint"), Some(&Value::from(2)));
        assert!(!record.extra.contains_key("patient_first_name"));
    }

    #[test]
    fn numeric_dob_is_stringified() {
        let record = parse_extraction_response(r#"{"patient_dob":19900101}"#);
        assert_eq!(record.patient_dob, "19900101");
        assert_eq!(record.patient_first_name, NOT_FOUND);
    }
}
