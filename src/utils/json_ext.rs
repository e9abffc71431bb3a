//! JSON helpers used at the collaborator boundary.

use serde_json::Value;

/// Extract the first parseable JSON value embedded in free-form text.
///
/// Execution collaborators frequently wrap their structured answer in prose
/// or markdown fences. Scanning from each `{`/`[` and trying the longest
/// candidate first recovers the object without requiring the collaborator to
/// emit bare JSON.
///
/// Quadratic in the worst case, which is acceptable for collaborator-sized
/// responses.
///
/// # Examples
///
/// ```rust
/// use duraloom::utils::json_ext::extract_first_json;
/// use serde_json::json;
///
/// let text = "Here is the result:\n```json\n{\"score\": 3}\n```\nDone.";
/// assert_eq!(extract_first_json(text), Some(json!({"score": 3})));
/// assert_eq!(extract_first_json("no json here"), None);
/// ```
pub fn extract_first_json(text: &str) -> Option<Value> {
    for (start, ch) in text.char_indices() {
        if ch != '{' && ch != '[' {
            continue;
        }
        let candidate = &text[start..];
        let mut end = candidate.len();
        loop {
            if let Ok(value) = serde_json::from_str::<Value>(&candidate[..end]) {
                return Some(value);
            }
            match candidate[..end].char_indices().next_back() {
                Some((idx, _)) if idx > 0 => end = idx,
                _ => break,
            }
        }
    }
    None
}

/// Human-readable name of a JSON value's type, for contract violation
/// messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_object_from_prose() {
        let text = "The verdict follows. {\"approved\": true, \"notes\": []} trailing";
        assert_eq!(
            extract_first_json(text),
            Some(json!({"approved": true, "notes": []}))
        );
    }

    #[test]
    fn extracts_array() {
        assert_eq!(extract_first_json("items: [1, 2, 3]!"), Some(json!([1, 2, 3])));
    }

    #[test]
    fn prefers_first_candidate() {
        let text = "{\"a\": 1} and later {\"b\": 2}";
        assert_eq!(extract_first_json(text), Some(json!({"a": 1})));
    }

    #[test]
    fn none_when_absent() {
        assert_eq!(extract_first_json("plain prose"), None);
        assert_eq!(extract_first_json("{broken"), None);
    }

    #[test]
    fn type_names() {
        assert_eq!(json_type_name(&json!(null)), "null");
        assert_eq!(json_type_name(&json!(1.5)), "number");
        assert_eq!(json_type_name(&json!({"k": 1})), "object");
    }
}
