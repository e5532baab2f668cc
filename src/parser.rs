//! Built-in output parsers.
//!
//! [`BuiltinParser`] is a [`ParserService`] for hosts that do not run a
//! dedicated parsing service. Keys:
//!
//! | key           | behavior                                                      |
//! |---------------|---------------------------------------------------------------|
//! | `json`        | strip reasoning blocks and fences, extract and re-emit JSON   |
//! | `text`        | strip reasoning blocks, trim                                  |
//! | `strip_think` | strip reasoning blocks only                                   |
//!
//! Anything else is rejected.

use crate::error::Result;
use crate::services::{ParserService, ScanOutcome};
use async_trait::async_trait;
use serde_json::Value;

/// Parser backed by the extraction helpers in this module.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinParser;

#[async_trait]
impl ParserService for BuiltinParser {
    async fn parse(&self, parser_key: &str, text: &str) -> Result<ScanOutcome> {
        Ok(match parser_key {
            "json" => match extract_json(text) {
                Some(value) => ScanOutcome::pass(value.to_string()),
                None => ScanOutcome::reject("no JSON value found in response"),
            },
            "text" => ScanOutcome::pass(strip_think_tags(text).trim()),
            "strip_think" => ScanOutcome::pass(strip_think_tags(text)),
            other => ScanOutcome::reject(format!("unknown parser '{other}'")),
        })
    }
}

/// Remove `<think>` and `<thinking>` blocks. An unclosed block swallows the
/// rest of the text.
///
/// ```
/// use semantic_pipeline::parser::strip_think_tags;
///
/// assert_eq!(strip_think_tags("<think>hmm</think>answer"), "answer");
/// assert_eq!(strip_think_tags("<thinking>no end"), "");
/// ```
pub fn strip_think_tags(text: &str) -> String {
    let once = strip_block(text, "<think>", "</think>");
    strip_block(&once, "<thinking>", "</thinking>")
}

fn strip_block(text: &str, open: &str, close: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find(open) {
        out.push_str(&rest[..start]);
        match rest[start..].find(close) {
            Some(end) => rest = &rest[start + end + close.len()..],
            None => return out,
        }
    }
    out.push_str(rest);
    out
}

/// Body of the first fenced code block, if any.
fn fenced_block(text: &str) -> Option<&str> {
    let open = text.find("```")?;
    let after_fence = &text[open + 3..];
    let body_start = after_fence.find('\n')? + 1;
    let body = &after_fence[body_start..];
    let close = body.find("```")?;
    Some(body[..close].trim())
}

/// Last balanced `open`..`close` region, skipping delimiters inside strings.
fn last_balanced(text: &str, open: char, close: char) -> Option<&str> {
    let mut best = None;
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;
    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        if ch == '"' && depth > 0 {
            in_string = true;
        } else if ch == open {
            if depth == 0 {
                start = Some(i);
            }
            depth += 1;
        } else if ch == close && depth > 0 {
            depth -= 1;
            if depth == 0 {
                best = start.map(|s| &text[s..=i]);
            }
        }
    }
    best
}

/// Find the JSON value an LLM response most likely carries.
///
/// Tries, in order: the whole cleaned text, the first fenced block, the
/// last balanced object, the last balanced array.
pub fn extract_json(response: &str) -> Option<Value> {
    let cleaned = strip_think_tags(response);
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return None;
    }
    let candidates = [
        Some(cleaned),
        fenced_block(cleaned),
        last_balanced(cleaned, '{', '}'),
        last_balanced(cleaned, '[', ']'),
    ];
    let parsed = candidates
        .into_iter()
        .flatten()
        .find_map(|c| serde_json::from_str::<Value>(c).ok());
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_multiple_blocks() {
        assert_eq!(
            strip_think_tags("<think>a</think>mid<thinking>b</thinking>end"),
            "midend"
        );
    }

    #[test]
    fn test_extract_json_from_fence() {
        let text = "Sure!\n```json\n{\"ok\": true}\n```\nAnything else?";
        assert_eq!(extract_json(text), Some(json!({"ok": true})));
    }

    #[test]
    fn test_extract_json_prefers_last_object() {
        let text = r#"Example: {"a": 1}. Final: {"a": 2, "s": "}"}"#;
        assert_eq!(extract_json(text), Some(json!({"a": 2, "s": "}"})));
    }

    #[test]
    fn test_extract_json_array_after_think() {
        let text = "<think>list them</think>[1, 2, 3]";
        assert_eq!(extract_json(text), Some(json!([1, 2, 3])));
    }

    #[tokio::test]
    async fn test_builtin_parser_keys() {
        let parser = BuiltinParser;
        let json_out = parser.parse("json", "```\n{\"x\":1}\n```").await.unwrap();
        assert_eq!(json_out.text, r#"{"x":1}"#);

        let text_out = parser.parse("text", "<think>x</think>  hi  ").await.unwrap();
        assert_eq!(text_out.text, "hi");

        let rejected = parser.parse("json", "no json here").await.unwrap();
        assert!(rejected.error.is_some());

        let unknown = parser.parse("xml", "<a/>").await.unwrap();
        assert_eq!(unknown.error.as_deref(), Some("unknown parser 'xml'"));
    }
}
