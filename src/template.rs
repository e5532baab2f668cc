//! Prompt templates: argument validation plus message rendering.

use crate::callback::{Callback, Callbacks, Stage};
use crate::context::CallContext;
use crate::error::Result;
use crate::message::Message;
use crate::schema::ArgsSchema;
use crate::value::{get_path, to_text};
use serde_json::Value;
use std::sync::Arc;

/// Sentinel that should never appear in real templates.
const ESCAPE_SENTINEL: &str = "\x00LBRACE\x00";
/// Sentinel for escaped closing brace.
const ESCAPE_SENTINEL_CLOSE: &str = "\x00RBRACE\x00";

/// Fill `{path}` placeholders in a message template from `args`.
///
/// Paths are dotted (`{user.name}`). `{input}` falls back to the whole
/// argument value when `args` has no `input` key. Placeholders that do not
/// resolve are left in place. Use `{{` and `}}` for literal braces.
///
/// # Example
///
/// ```
/// use semantic_pipeline::template::fill;
/// use serde_json::json;
///
/// let out = fill("Hello {name}, JSON: {{\"k\": 1}}", &json!({"name": "Ada"}));
/// assert_eq!(out, r#"Hello Ada, JSON: {"k": 1}"#);
/// ```
pub fn fill(template: &str, args: &Value) -> String {
    // Pass 1: protect escaped braces
    let protected = template
        .replace("{{", ESCAPE_SENTINEL)
        .replace("}}", ESCAPE_SENTINEL_CLOSE);

    // Pass 2: substitute placeholders
    let mut rendered = String::with_capacity(protected.len());
    let mut rest = protected.as_str();
    while let Some(start) = rest.find('{') {
        rendered.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let Some(end) = after.find('}') else {
            rendered.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let key = &after[..end];
        match lookup(args, key.trim()) {
            Some(value) => rendered.push_str(&to_text(value)),
            None => {
                rendered.push('{');
                rendered.push_str(key);
                rendered.push('}');
            }
        }
        rest = &after[end + 1..];
    }
    rendered.push_str(rest);

    // Pass 3: restore escaped braces
    rendered
        .replace(ESCAPE_SENTINEL, "{")
        .replace(ESCAPE_SENTINEL_CLOSE, "}")
}

fn lookup<'a>(args: &'a Value, key: &str) -> Option<&'a Value> {
    if key.is_empty() {
        return None;
    }
    match get_path(args, key) {
        Some(v) => Some(v),
        None if key == "input" => Some(args),
        None => None,
    }
}

/// A list of role/content message templates with an optional argument schema.
///
/// Rendering never mutates the stored templates.
#[derive(Clone)]
pub struct PromptTemplate {
    name: String,
    messages: Vec<Message>,
    schema: Option<ArgsSchema>,
    callbacks: Callbacks,
}

impl PromptTemplate {
    pub fn new(name: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            name: name.into(),
            messages,
            schema: None,
            callbacks: Vec::new(),
        }
    }

    pub fn with_schema(mut self, schema: ArgsSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn schema(&self) -> Option<&ArgsSchema> {
        self.schema.as_ref()
    }

    /// Validate `args` and render every message template.
    pub fn render(&self, args: &Value) -> Result<Vec<Message>> {
        if let Some(schema) = &self.schema {
            schema.validate(&self.name, args)?;
        }
        Ok(self
            .messages
            .iter()
            .map(|m| Message::new(m.role, fill(&m.content, args)))
            .collect())
    }

    /// [`render`](Self::render), reported as a `promptTemplate` stage.
    pub async fn call(&self, ctx: &CallContext, args: &Value) -> Result<Vec<Message>> {
        let ctx = ctx.with_callbacks(&self.callbacks);
        ctx.run_stage(
            Stage::PromptTemplate,
            &self.name,
            args.clone(),
            |_| async move { self.render(args) },
            |messages| serde_json::to_value(messages).unwrap_or(Value::Null),
        )
        .await
    }
}

impl std::fmt::Debug for PromptTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptTemplate")
            .field("name", &self.name)
            .field("messages", &self.messages.len())
            .field("has_schema", &self.schema.is_some())
            .finish()
    }
}
