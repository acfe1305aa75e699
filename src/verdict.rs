use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

// ============================================================================
// Verdict
// ============================================================================

pub(crate) const NO_JSON_FOUND: &str = "no JSON found in response";
pub(crate) const INVALID_JSON: &str = "response was not valid JSON";
pub(crate) const MISSING_FIELDS: &str = "response missing required fields";

static ANSI_ESCAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\x1b\[[0-9;?]*[ -/]*[@-~]").expect("valid ANSI regex"));

/// Outcome of a review.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Verdict {
    pub(crate) safe: bool,
    pub(crate) reason: String,
    pub(crate) details: Vec<String>,
}

impl Verdict {
    /// Unsafe verdict with no details, used for every failure mode.
    pub(crate) fn unsafe_because(reason: impl Into<String>) -> Self {
        Self {
            safe: false,
            reason: reason.into(),
            details: Vec::new(),
        }
    }
}

/// Strip ANSI escapes and control characters (except newline and tab) from
/// judge-provided text before it is logged or echoed.
pub(crate) fn sanitize_judge_text(text: &str) -> String {
    let mut clean = ANSI_ESCAPE.replace_all(text, "").into_owned();
    clean.retain(|c| c == '\n' || c == '\t' || !c.is_control());
    clean
}

/// Widest `{...}` span: first `{` through last `}`.
///
/// Deliberately lenient so judges that wrap the object in prose still parse.
/// Nested or multiple objects are not balanced; a span that is not valid JSON
/// as a whole is rejected by the caller.
pub(crate) fn extract_json_span(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (start < end).then(|| &raw[start..=end])
}

/// Parse a judge's raw output into a verdict. Never fails: anything
/// irregular becomes an unsafe verdict whose reason names the parse problem.
pub(crate) fn parse_verdict(raw: &str) -> Verdict {
    let Some(span) = extract_json_span(raw) else {
        return Verdict::unsafe_because(NO_JSON_FOUND);
    };

    let parsed: Value = match serde_json::from_str(span) {
        Ok(value) => value,
        Err(_) => return Verdict::unsafe_because(INVALID_JSON),
    };

    let safe = parsed.get("safe").and_then(Value::as_bool);
    let reason = parsed.get("reason").and_then(Value::as_str);
    let (Some(safe), Some(reason)) = (safe, reason) else {
        return Verdict::unsafe_because(MISSING_FIELDS);
    };

    Verdict {
        safe,
        reason: sanitize_judge_text(reason),
        details: parse_details(parsed.get("details")),
    }
}

/// `details` must be an array of strings; anything else degrades to empty.
fn parse_details(value: Option<&Value>) -> Vec<String> {
    let Some(items) = value.and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .map(|item| item.as_str().map(sanitize_judge_text))
        .collect::<Option<Vec<_>>>()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_safe_verdict() {
        let verdict = parse_verdict(r#"{"safe":true,"reason":"harmless","details":[]}"#);
        assert_eq!(
            verdict,
            Verdict {
                safe: true,
                reason: "harmless".to_string(),
                details: vec![],
            }
        );
    }

    #[test]
    fn test_parse_unsafe_verdict_with_details() {
        let verdict = parse_verdict(
            r#"{"safe":false,"reason":"destructive","details":["deletes root filesystem","adds cron job"]}"#,
        );
        assert!(!verdict.safe);
        assert_eq!(verdict.reason, "destructive");
        assert_eq!(
            verdict.details,
            details(&["deletes root filesystem", "adds cron job"])
        );
    }

    #[test]
    fn test_json_embedded_in_prose() {
        let verdict =
            parse_verdict(r#"Analysis: {"safe":true,"reason":"ok","details":[]} done"#);
        assert!(verdict.safe);
        assert_eq!(verdict.reason, "ok");
        assert!(verdict.details.is_empty());
    }

    #[test]
    fn test_json_in_markdown_fence() {
        let raw = "Here is my verdict:\n```json\n{\n  \"safe\": false,\n  \"reason\": \"edits ~/.bashrc\",\n  \"details\": [\"appends to PATH\"]\n}\n```\n";
        let verdict = parse_verdict(raw);
        assert!(!verdict.safe);
        assert_eq!(verdict.reason, "edits ~/.bashrc");
        assert_eq!(verdict.details, details(&["appends to PATH"]));
    }

    #[test]
    fn test_no_json_found() {
        for raw in ["", "The script looks fine to me.", "} backwards {", "only an opening {"] {
            let verdict = parse_verdict(raw);
            assert!(!verdict.safe, "input: {:?}", raw);
            assert_eq!(verdict.reason, NO_JSON_FOUND);
            assert!(verdict.details.is_empty());
        }
    }

    #[test]
    fn test_invalid_json() {
        for raw in [
            r#"{"safe": true, "reason": }"#,
            "{not json at all}",
            r#"{"safe":true,"reason":"a"} and also {"safe":false,"reason":"b"}"#,
        ] {
            let verdict = parse_verdict(raw);
            assert!(!verdict.safe, "input: {:?}", raw);
            assert_eq!(verdict.reason, INVALID_JSON);
        }
    }

    #[test]
    fn test_missing_or_mistyped_required_fields() {
        for raw in [
            "{}",
            r#"{"reason":"x"}"#,
            r#"{"safe":true}"#,
            r#"{"safe":"true","reason":"x"}"#,
            r#"{"safe":1,"reason":"x"}"#,
            r#"{"safe":true,"reason":null}"#,
            r#"{"safe":true,"reason":["x"]}"#,
        ] {
            let verdict = parse_verdict(raw);
            assert!(!verdict.safe, "input: {:?}", raw);
            assert_eq!(verdict.reason, MISSING_FIELDS);
            assert!(verdict.details.is_empty());
        }
    }

    #[test]
    fn test_malformed_details_become_empty() {
        for raw in [
            r#"{"safe":false,"reason":"bad","details":"not an array"}"#,
            r#"{"safe":false,"reason":"bad","details":["ok", 3]}"#,
            r#"{"safe":false,"reason":"bad","details":null}"#,
            r#"{"safe":false,"reason":"bad"}"#,
        ] {
            let verdict = parse_verdict(raw);
            assert!(!verdict.safe);
            assert_eq!(verdict.reason, "bad");
            assert!(verdict.details.is_empty(), "input: {:?}", raw);
        }
    }

    #[test]
    fn test_malformed_details_do_not_flip_safe() {
        let verdict = parse_verdict(r#"{"safe":true,"reason":"fine","details":{"a":1}}"#);
        assert!(verdict.safe);
        assert_eq!(verdict.reason, "fine");
        assert!(verdict.details.is_empty());
    }

    #[test]
    fn test_parse_is_deterministic() {
        let raw = r#"prefix {"safe":false,"reason":"r","details":["d"]} suffix"#;
        assert_eq!(parse_verdict(raw), parse_verdict(raw));
        assert_eq!(parse_verdict("garbage"), parse_verdict("garbage"));
    }

    #[test]
    fn test_judge_text_is_sanitized() {
        let verdict = parse_verdict(
            r#"{"safe":false,"reason":"\u001b[31mred\u001b[0m alert\u0007","details":["tab\there\u0000"]}"#,
        );
        assert_eq!(verdict.reason, "red alert");
        assert_eq!(verdict.details, details(&["tab\there"]));
    }

    #[test]
    fn test_extract_json_span_is_widest() {
        assert_eq!(extract_json_span("a {b} c {d} e"), Some("{b} c {d}"));
        assert_eq!(extract_json_span("{}"), Some("{}"));
        assert_eq!(extract_json_span("no braces"), None);
        assert_eq!(extract_json_span("}{"), None);
    }

    #[test]
    fn test_unsafe_because() {
        let verdict = Verdict::unsafe_because("judge unavailable");
        assert!(!verdict.safe);
        assert_eq!(verdict.reason, "judge unavailable");
        assert!(verdict.details.is_empty());
    }
}
