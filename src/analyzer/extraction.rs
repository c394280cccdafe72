//! Tolerant JSON extraction from free-text model output.
//!
//! The vision model is asked for bare JSON but frequently wraps it in a
//! markdown fence or surrounds it with prose. Strategies are tried in a
//! fixed order and the first candidate wins.

use serde_json::Value;
use tracing::{debug, error};

use crate::error::AnalysisError;

/// A strategy either finds a candidate JSON substring or reports no match.
type Strategy = fn(&str) -> Option<String>;

/// Extraction strategies in priority order.
const STRATEGIES: [(&str, Strategy); 2] = [
    ("fenced_block", fenced_block),
    ("balanced_braces", balanced_braces),
];

/// Maximum characters of raw model text included in error messages.
const ERROR_EXCERPT_CHARS: usize = 500;

/// Find the substring of `text` most likely to be the JSON payload.
///
/// Returns `None` when no strategy matches; callers then fall back to
/// parsing the raw text.
pub fn extract_json_candidate(text: &str) -> Option<String> {
    STRATEGIES.iter().find_map(|(name, strategy)| {
        let candidate = strategy(text)?;
        debug!("JSON candidate found by {} strategy", name);
        Some(candidate)
    })
}

/// Extract and parse the JSON payload from a model response.
pub fn parse_model_json(text: &str) -> Result<Value, AnalysisError> {
    let candidate = extract_json_candidate(text).unwrap_or_else(|| text.trim().to_string());

    serde_json::from_str(&candidate).map_err(|e| {
        let msg = format!(
            "{}. Raw response (first {} chars): {}",
            e,
            ERROR_EXCERPT_CHARS,
            excerpt(text, ERROR_EXCERPT_CHARS)
        );
        error!("Failed to parse model response as JSON: {}", msg);
        AnalysisError::MalformedJson(msg)
    })
}

/// Body of the first markdown code fence tagged `json`, or left untagged
/// with a body that opens like JSON.
fn fenced_block(text: &str) -> Option<String> {
    let mut rest = text;
    while let Some(open) = rest.find("```") {
        let after_ticks = &rest[open + 3..];
        let line_end = after_ticks.find('\n').unwrap_or(after_ticks.len());
        let info = after_ticks[..line_end].trim();

        if info.starts_with('{') {
            // Payload on the same line as the opening fence: ```{"a":1}```
            let close = after_ticks.find("```")?;
            return Some(after_ticks[..close].trim().to_string());
        }

        let body = after_ticks.get(line_end + 1..).unwrap_or("");
        let close = body.find("```")?;
        let inner = body[..close].trim();
        if info.eq_ignore_ascii_case("json") || (info.is_empty() && looks_like_json(inner)) {
            return Some(inner.to_string());
        }

        // Prose or another language; skip past its closing marker.
        rest = &body[close + 3..];
    }
    None
}

fn looks_like_json(body: &str) -> bool {
    body.starts_with('{') || body.starts_with('[')
}

/// The first `{...}` span whose braces balance, ignoring braces inside JSON strings.
fn balanced_braces(text: &str) -> Option<String> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(text[start..end].to_string());
                }
            }
            _ => {}
        }
    }
    None
}

/// Truncate on a char boundary so multi-byte text never panics.
fn excerpt(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fenced_json_block_is_extracted() {
        let text = "Here is the result:\n```json\n{\"position\":\"front\",\"findings\":[]}\n```";
        let value = parse_model_json(text).unwrap();
        assert_eq!(value, json!({"position": "front", "findings": []}));
    }

    #[test]
    fn test_untagged_fence_is_extracted() {
        let text = "```\n{\"summary\": \"ok\"}\n```\nLet me know if you need more.";
        assert_eq!(
            extract_json_candidate(text).as_deref(),
            Some("{\"summary\": \"ok\"}")
        );
    }

    #[test]
    fn test_untagged_prose_fence_falls_back_to_braces() {
        let text = "```\nPosture notes follow\n```\n{\"position\":\"front\",\"findings\":[]}";
        let value = parse_model_json(text).unwrap();
        assert_eq!(value, json!({"position": "front", "findings": []}));
    }

    #[test]
    fn test_uppercase_json_tag_is_accepted() {
        let text = "```JSON\n{\"a\": 1}\n```";
        assert_eq!(extract_json_candidate(text).as_deref(), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_fence_in_other_language_is_skipped() {
        let text = "```python\nprint('{')\n```\nand then\n```json\n{\"a\": 2}\n```";
        assert_eq!(extract_json_candidate(text).as_deref(), Some("{\"a\": 2}"));
    }

    #[test]
    fn test_single_line_fence() {
        let text = "```{\"a\": 3}```";
        assert_eq!(extract_json_candidate(text).as_deref(), Some("{\"a\": 3}"));
    }

    #[test]
    fn test_object_embedded_in_prose_is_extracted() {
        let text = "Sure! The analysis is {\"position\": \"back\", \"findings\": [{\"type\": \"Spine\"}]} as requested.";
        let value = parse_model_json(text).unwrap();
        assert_eq!(value["position"], "back");
        assert_eq!(value["findings"][0]["type"], "Spine");
    }

    #[test]
    fn test_braces_inside_strings_do_not_end_span() {
        let text = r#"Result: {"finding": "curly } brace \" and {", "n": 1} trailing }"#;
        let candidate = extract_json_candidate(text).unwrap();
        let value: Value = serde_json::from_str(&candidate).unwrap();
        assert_eq!(value["n"], 1);
    }

    #[test]
    fn test_unbalanced_braces_have_no_candidate() {
        assert_eq!(extract_json_candidate("prefix { \"a\": 1 "), None);
    }

    #[test]
    fn test_no_candidate_for_plain_prose() {
        assert_eq!(extract_json_candidate("I cannot analyze this image."), None);
    }

    #[test]
    fn test_raw_json_without_fence_parses() {
        let value = parse_model_json("  [1, 2, 3]  ").unwrap();
        assert_eq!(value, json!([1, 2, 3]));
    }

    #[test]
    fn test_unparseable_text_is_malformed_json_error() {
        let err = parse_model_json("I cannot analyze this image.").unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedJson(_)));
        assert!(err.to_string().contains("I cannot analyze"));
    }

    #[test]
    fn test_invalid_json_inside_fence_fails() {
        let err = parse_model_json("```json\n{position: front}\n```").unwrap_err();
        assert!(matches!(err, AnalysisError::MalformedJson(_)));
    }

    #[test]
    fn test_excerpt_respects_char_boundaries() {
        let text = "°".repeat(600);
        let short = excerpt(&text, 500);
        assert!(short.ends_with("..."));
        assert_eq!(short.chars().count(), 503);
    }

    #[test]
    fn test_fence_takes_priority_over_earlier_brace() {
        let text = "Note {draft}\n```json\n{\"final\": true}\n```";
        assert_eq!(
            extract_json_candidate(text).as_deref(),
            Some("{\"final\": true}")
        );
    }
}
