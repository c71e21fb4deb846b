//! Tolerant JSON reader for LLM output (spec §9 "Dynamic JSON from LLM").
//!
//! LLMs routinely wrap JSON in code fences, leave trailing commas, or
//! truncate mid-object on a token-limit cutoff. This parser tries a cascade
//! of increasingly lossy recovery strategies and never panics; the caller
//! gets `None` if nothing recovers, and treats that as an empty result
//! rather than aborting the pipeline stage.

use serde_json::Value;

/// Parse `text` as JSON, recovering from common LLM malformations.
/// Returns `None` if every strategy fails.
pub fn parse_tolerant(text: &str) -> Option<Value> {
    let stripped = strip_code_fences(text);

    if let Ok(v) = serde_json::from_str(stripped) {
        return Some(v);
    }

    let no_trailing_commas = strip_trailing_commas(stripped);
    if let Ok(v) = serde_json::from_str(&no_trailing_commas) {
        return Some(v);
    }

    if let Some(array_slice) = extract_balanced(&no_trailing_commas, '[', ']') {
        if let Ok(v) = serde_json::from_str(&array_slice) {
            return Some(v);
        }
    }

    if let Some(object_slice) = extract_balanced(&no_trailing_commas, '{', '}') {
        if let Ok(v) = serde_json::from_str(&object_slice) {
            if let Some(arr) = first_array_field(&v) {
                return Some(arr);
            }
            return Some(v);
        }
    }

    // Last resort: slice up to the last complete top-level bracket and retry.
    if let Some(partial) = partial_prefix(&no_trailing_commas) {
        if let Ok(v) = serde_json::from_str(&partial) {
            return Some(v);
        }
    }

    None
}

/// Parse into a `facts`-shaped array: accepts either a bare JSON array, or
/// an object carrying `facts`/`items`/any array-valued field.
pub fn parse_tolerant_array(text: &str) -> Vec<Value> {
    match parse_tolerant(text) {
        Some(Value::Array(items)) => items,
        Some(Value::Object(map)) => {
            for key in ["facts", "items"] {
                if let Some(Value::Array(items)) = map.get(key) {
                    return items.clone();
                }
            }
            map.values()
                .find_map(|v| v.as_array().cloned())
                .unwrap_or_default()
        }
        _ => Vec::new(),
    }
}

fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let without_leading = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed)
        .trim_start();
    without_leading.strip_suffix("```").unwrap_or(without_leading).trim()
}

fn strip_trailing_commas(text: &str) -> String {
    // `,(\s*[}\]])` -> `$1`, without pulling in `regex` for a single pattern.
    let mut out = String::with_capacity(text.len());
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == ',' {
            let mut j = i + 1;
            while j < chars.len() && chars[j].is_whitespace() {
                j += 1;
            }
            if j < chars.len() && (chars[j] == '}' || chars[j] == ']') {
                i += 1;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Find the first `open`...`close` balanced (nesting-aware, string-aware)
/// substring, non-greedy on the outermost match.
fn extract_balanced(text: &str, open: char, close: char) -> Option<String> {
    let chars: Vec<char> = text.chars().collect();
    let start = chars.iter().position(|&c| c == open)?;
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escape = false;
    for (offset, &c) in chars[start..].iter().enumerate() {
        if in_string {
            if escape {
                escape = false;
            } else if c == '\\' {
                escape = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    let end = start + offset + 1;
                    return Some(chars[start..end].iter().collect());
                }
            }
            _ => {}
        }
    }
    None
}

fn first_array_field(v: &Value) -> Option<Value> {
    let map = v.as_object()?;
    map.values().find(|v| v.is_array()).cloned()
}

/// Slice the text up to the last complete `}`/`]` and try once more — a
/// last-ditch recovery for output truncated mid-structure.
fn partial_prefix(text: &str) -> Option<String> {
    let last_brace = text.rfind('}');
    let last_bracket = text.rfind(']');
    let cut = last_brace.into_iter().chain(last_bracket).max()?;
    Some(text[..=cut].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_plain_json() {
        assert_eq!(parse_tolerant(r#"{"a": 1}"#), Some(json!({"a": 1})));
    }

    #[test]
    fn strips_code_fences() {
        let text = "```json\n{\"a\": 1}\n```";
        assert_eq!(parse_tolerant(text), Some(json!({"a": 1})));
    }

    #[test]
    fn strips_trailing_commas() {
        let text = r#"{"a": 1, "b": [1, 2,],}"#;
        assert_eq!(parse_tolerant(text), Some(json!({"a": 1, "b": [1, 2]})));
    }

    #[test]
    fn extracts_array_from_surrounding_prose() {
        let text = "Here is the result:\n[\"fact one\", \"fact two\"]\nHope that helps!";
        let v = parse_tolerant(text).unwrap();
        assert_eq!(v, json!(["fact one", "fact two"]));
    }

    #[test]
    fn object_with_facts_field_unwraps_to_array_caller_side() {
        let text = r#"{"facts": ["a", "b"], "other": 1}"#;
        let arr = parse_tolerant_array(text);
        assert_eq!(arr, vec![json!("a"), json!("b")]);
    }

    #[test]
    fn unparseable_returns_none() {
        assert_eq!(parse_tolerant("not json at all {{{"), None);
    }

    #[test]
    fn empty_array_on_total_failure() {
        assert!(parse_tolerant_array("garbage").is_empty());
    }

    #[test]
    fn recovers_from_truncated_object() {
        // missing closing brace entirely after a nested array closes
        let text = r#"{"facts": ["a", "b"]"#;
        // our partial_prefix recovery operates on the *trailing-comma-stripped*
        // text and looks for the last complete bracket — here that's the `]`.
        let arr = parse_tolerant_array(text);
        assert_eq!(arr, vec![json!("a"), json!("b")]);
    }
}
