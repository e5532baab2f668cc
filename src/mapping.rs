//! Declarative data mappings.
//!
//! Argument mappings, return mappings and composition mapper nodes are
//! expressed as a small [`Mapping`] tree interpreted by a pure function,
//! never as executable code. Mappings are plain serde data, so they can be
//! stored alongside the rest of a function or composition definition.
//!
//! ```
//! use semantic_pipeline::mapping::{DeclarativeMapper, DataMapper, Mapping};
//! use serde_json::json;
//!
//! let mapping: Mapping = serde_json::from_value(json!({
//!     "object": {
//!         "question": { "get": "user.text" },
//!         "audience": { "literal": "engineers" }
//!     }
//! })).unwrap();
//!
//! let out = DeclarativeMapper.map(&mapping, &json!({"user": {"text": "why?"}})).unwrap();
//! assert_eq!(out, json!({"question": "why?", "audience": "engineers"}));
//! ```

use crate::error::{EngineError, Result};
use crate::value::{deep_merge, get_path, to_text};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A declarative transformation from one JSON value to another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mapping {
    /// The input unchanged.
    Identity,
    /// A constant.
    Literal(Value),
    /// The value at a dotted path of the input; `null` when absent.
    Get(String),
    /// An object whose fields are each mapped from the input.
    Object(BTreeMap<String, Mapping>),
    /// An array whose items are each mapped from the input.
    Array(Vec<Mapping>),
    /// Deep, right-biased merge of every part.
    Merge(Vec<Mapping>),
    /// String interpolation: `{path}` placeholders are replaced by the
    /// text of the value at that path. `{{` and `}}` are literal braces.
    Template(String),
    /// Apply `op` to the result of `input`.
    Transform {
        op: TransformOp,
        input: Box<Mapping>,
    },
    /// Map every element of an array input with the inner mapping.
    Each(Box<Mapping>),
}

/// Operations usable in [`Mapping::Transform`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformOp {
    ToString,
    Uppercase,
    Lowercase,
    Trim,
    Join { separator: String },
    First,
    Last,
    Length,
    /// Replace `null` with the given value.
    Default { value: Value },
}

impl Mapping {
    /// Shorthand for [`Mapping::Get`].
    pub fn get(path: impl Into<String>) -> Self {
        Mapping::Get(path.into())
    }

    /// Shorthand for [`Mapping::Object`] from `(field, mapping)` pairs.
    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, Mapping)>,
        K: Into<String>,
    {
        Mapping::Object(fields.into_iter().map(|(k, m)| (k.into(), m)).collect())
    }

    pub fn transform(op: TransformOp, input: Mapping) -> Self {
        Mapping::Transform {
            op,
            input: Box::new(input),
        }
    }
}

/// Evaluates mappings. Injected into compositions so hosts can substitute
/// their own evaluator.
pub trait DataMapper: Send + Sync {
    fn map(&self, mapping: &Mapping, instance: &Value) -> Result<Value>;
}

/// The built-in interpreter for [`Mapping`] trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeclarativeMapper;

impl DataMapper for DeclarativeMapper {
    fn map(&self, mapping: &Mapping, instance: &Value) -> Result<Value> {
        evaluate(mapping, instance)
    }
}

/// Apply a mapping, element-wise when `is_batch` is set.
pub fn apply_mapping(
    mapper: &dyn DataMapper,
    mapping: &Mapping,
    instance: &Value,
    is_batch: bool,
) -> Result<Value> {
    if !is_batch {
        return mapper.map(mapping, instance);
    }
    let items = instance.as_array().ok_or_else(|| {
        EngineError::Mapping("batch mapping expects an array input".to_string())
    })?;
    items
        .iter()
        .map(|item| mapper.map(mapping, item))
        .collect::<Result<Vec<_>>>()
        .map(Value::Array)
}

fn evaluate(mapping: &Mapping, input: &Value) -> Result<Value> {
    match mapping {
        Mapping::Identity => Ok(input.clone()),
        Mapping::Literal(v) => Ok(v.clone()),
        Mapping::Get(path) => Ok(get_path(input, path).cloned().unwrap_or(Value::Null)),
        Mapping::Object(fields) => {
            let mut out = Map::new();
            for (key, field) in fields {
                out.insert(key.clone(), evaluate(field, input)?);
            }
            Ok(Value::Object(out))
        }
        Mapping::Array(items) => items
            .iter()
            .map(|m| evaluate(m, input))
            .collect::<Result<Vec<_>>>()
            .map(Value::Array),
        Mapping::Merge(parts) => {
            let mut acc = Value::Object(Map::new());
            for part in parts {
                deep_merge(&mut acc, evaluate(part, input)?);
            }
            Ok(acc)
        }
        Mapping::Template(template) => interpolate(template, input).map(Value::String),
        Mapping::Transform { op, input: inner } => apply_op(op, evaluate(inner, input)?),
        Mapping::Each(inner) => match input {
            Value::Array(items) => items
                .iter()
                .map(|item| evaluate(inner, item))
                .collect::<Result<Vec<_>>>()
                .map(Value::Array),
            other => Err(EngineError::Mapping(format!(
                "each expects an array, got {}",
                type_name(other)
            ))),
        },
    }
}

fn apply_op(op: &TransformOp, value: Value) -> Result<Value> {
    let out = match op {
        TransformOp::ToString => Value::String(to_text(&value)),
        TransformOp::Uppercase => Value::String(expect_str(&value, "uppercase")?.to_uppercase()),
        TransformOp::Lowercase => Value::String(expect_str(&value, "lowercase")?.to_lowercase()),
        TransformOp::Trim => Value::String(expect_str(&value, "trim")?.trim().to_string()),
        TransformOp::Join { separator } => {
            let items = expect_array(&value, "join")?;
            Value::String(items.iter().map(to_text).collect::<Vec<_>>().join(separator))
        }
        TransformOp::First => expect_array(&value, "first")?
            .first()
            .cloned()
            .unwrap_or(Value::Null),
        TransformOp::Last => expect_array(&value, "last")?
            .last()
            .cloned()
            .unwrap_or(Value::Null),
        TransformOp::Length => match &value {
            Value::Array(items) => Value::from(items.len()),
            Value::String(s) => Value::from(s.chars().count()),
            Value::Object(map) => Value::from(map.len()),
            other => {
                return Err(EngineError::Mapping(format!(
                    "length is undefined for {}",
                    type_name(other)
                )))
            }
        },
        TransformOp::Default { value: fallback } => {
            if value.is_null() {
                fallback.clone()
            } else {
                value
            }
        }
    };
    Ok(out)
}

fn expect_str<'a>(value: &'a Value, op: &str) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        EngineError::Mapping(format!("{op} expects a string, got {}", type_name(value)))
    })
}

fn expect_array<'a>(value: &'a Value, op: &str) -> Result<&'a Vec<Value>> {
    value.as_array().ok_or_else(|| {
        EngineError::Mapping(format!("{op} expects an array, got {}", type_name(value)))
    })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Replace `{path}` placeholders with values from `input`.
fn interpolate(template: &str, input: &Value) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut path = String::new();
                let mut closed = false;
                for next in chars.by_ref() {
                    if next == '}' {
                        closed = true;
                        break;
                    }
                    path.push(next);
                }
                if !closed {
                    return Err(EngineError::Mapping(format!(
                        "unclosed placeholder in template: {template}"
                    )));
                }
                let path = path.trim();
                if let Some(value) = get_path(input, path) {
                    out.push_str(&to_text(value));
                }
            }
            other => out.push(other),
        }
    }
    Ok(out)
}
