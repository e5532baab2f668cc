//! Helpers over `serde_json::Value`: dotted paths, deep merge, and
//! picking the text a bare prompt should be built from.

use serde_json::{Map, Value};

/// Keys tried, in order, when guessing which argument holds the prompt text.
const CONTENT_KEYS: &[&str] = &["content", "text", "input", "query", "question", "message", "prompt"];

/// Look up a dotted path (`"a.b.0.c"`). An empty path returns the value itself.
pub fn get_path<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(value);
    }
    path.split('.').try_fold(value, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Write `new_value` at a dotted path, creating intermediate objects.
///
/// Returns `false` if an intermediate segment exists but is neither an
/// object nor an indexable array.
pub fn set_path(value: &mut Value, path: &str, new_value: Value) -> bool {
    if path.is_empty() {
        *value = new_value;
        return true;
    }
    let mut current = value;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let last = segments.peek().is_none();
        if current.is_null() {
            *current = Value::Object(Map::new());
        }
        current = match current {
            Value::Object(map) => {
                if last {
                    map.insert(segment.to_string(), new_value);
                    return true;
                }
                map.entry(segment.to_string()).or_insert(Value::Null)
            }
            Value::Array(items) => {
                let Some(slot) = segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)) else {
                    return false;
                };
                if last {
                    *slot = new_value;
                    return true;
                }
                slot
            }
            _ => return false,
        };
    }
    false
}

/// Deep, right-biased merge: objects merge key by key, anything else in
/// `right` replaces what is in `left`.
pub fn deep_merge(left: &mut Value, right: Value) {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => {
            for (key, value) in r {
                match l.get_mut(&key) {
                    Some(existing) => deep_merge(existing, value),
                    None => {
                        l.insert(key, value);
                    }
                }
            }
        }
        (slot, value) => *slot = value,
    }
}

/// Shallow merge of `right`'s top-level keys into `left`.
///
/// If either side is not an object, `right` replaces `left`.
pub fn shallow_merge(left: &mut Value, right: Value) {
    match (left, right) {
        (Value::Object(l), Value::Object(r)) => l.extend(r),
        (slot, value) => *slot = value,
    }
}

/// Render a value as prompt text: strings verbatim, everything else as JSON.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Best guess at the text a single user message should carry when no
/// prompt template is configured.
pub fn best_guess_content(args: &Value) -> String {
    match args {
        Value::String(s) => s.clone(),
        Value::Object(map) => {
            if let Some(text) = CONTENT_KEYS
                .iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
            {
                return text.to_string();
            }
            let strings: Vec<&str> = map.values().filter_map(Value::as_str).collect();
            if strings.len() == 1 {
                return strings[0].to_string();
            }
            args.to_string()
        }
        other => to_text(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_path_nested_and_indexed() {
        let v = json!({"a": {"b": [10, {"c": "x"}]}});
        assert_eq!(get_path(&v, "a.b.0"), Some(&json!(10)));
        assert_eq!(get_path(&v, "a.b.1.c"), Some(&json!("x")));
        assert_eq!(get_path(&v, "a.missing"), None);
        assert_eq!(get_path(&v, ""), Some(&v));
    }

    #[test]
    fn test_set_path_creates_objects() {
        let mut v = json!({});
        assert!(set_path(&mut v, "context.docs", json!("text")));
        assert_eq!(v, json!({"context": {"docs": "text"}}));
    }

    #[test]
    fn test_set_path_rejects_scalar_intermediate() {
        let mut v = json!({"a": 1});
        assert!(!set_path(&mut v, "a.b", json!(2)));
        assert_eq!(v, json!({"a": 1}));
    }

    #[test]
    fn test_deep_merge_right_wins() {
        let mut left = json!({"x": 1, "nested": {"a": 1, "b": 1}});
        deep_merge(&mut left, json!({"x": 2, "nested": {"b": 2, "c": 3}}));
        assert_eq!(left, json!({"x": 2, "nested": {"a": 1, "b": 2, "c": 3}}));
    }

    #[test]
    fn test_deep_merge_non_object_replaces() {
        let mut left = json!({"x": 1});
        deep_merge(&mut left, json!([1, 2]));
        assert_eq!(left, json!([1, 2]));
    }

    #[test]
    fn test_shallow_merge_replaces_nested() {
        let mut left = json!({"nested": {"a": 1}, "k": 1});
        shallow_merge(&mut left, json!({"nested": {"b": 2}}));
        assert_eq!(left, json!({"nested": {"b": 2}, "k": 1}));
    }

    #[test]
    fn test_best_guess_content() {
        assert_eq!(best_guess_content(&json!("plain")), "plain");
        assert_eq!(best_guess_content(&json!({"text": "hi", "n": 1})), "hi");
        assert_eq!(best_guess_content(&json!({"only": "this"})), "this");
        assert_eq!(best_guess_content(&json!({"a": 1})), r#"{"a":1}"#);
    }
}
