//! Model variants behind one call contract.
//!
//! ## Architecture
//!
//! ```text
//! SemanticFunctionImplementation ──► ModelRequest ──► Model::call() ──► Value
//!                                                         │
//!            ┌──────────────────┬─────────────────────────┼──────────────────┐
//!        ChatModel       CompletionModel             CustomModel        HostedModel
//!      ChatTransport   CompletionTransport        HTTP POST (json)   InferenceProvider
//! ```
//!
//! Chat models return the transport's response as received. Completion
//! models reshape legacy `{text}` choices into a [`ChatCompletion`]-shaped
//! value. Custom and hosted models return whatever their endpoint produced.

pub mod chat;
pub mod completion;
pub mod custom;
pub mod hosted;
pub mod mock;
pub mod openai;
pub mod transport;

pub use chat::ChatModel;
pub use completion::CompletionModel;
pub use custom::CustomModel;
pub use hosted::{HostedModel, InferenceProvider};
pub use mock::MockTransport;
pub use openai::OpenAiTransport;
pub use transport::{
    response_content, ChatCompletion, ChatRequest, ChatTransport, CompletionRequest,
    CompletionTransport, TextCompletion,
};

use crate::context::CallContext;
use crate::error::Result;
use crate::message::Message;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Which request shape a model understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelType {
    /// Message-based LLMs (chat and completion).
    Gpt,
    /// Generic HTTP endpoint taking the raw function arguments.
    Api,
    /// Hosted inference provider.
    Huggingface,
}

impl ModelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelType::Gpt => "gpt",
            ModelType::Api => "api",
            ModelType::Huggingface => "huggingface",
        }
    }
}

/// Open set of model request parameters (`temperature`, `max_tokens`, ...).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModelParams(pub Map<String, Value>);

impl ModelParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults for message-based models: `max_tokens=140, n=1, temperature=0.5`.
    pub fn gpt_defaults() -> Self {
        Self::new()
            .with("max_tokens", json!(140))
            .with("n", json!(1))
            .with("temperature", json!(0.5))
    }

    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.0.insert(key.into(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// `self` overridden key by key by `overrides`.
    pub fn merged_with(&self, overrides: &ModelParams) -> ModelParams {
        let mut merged = self.0.clone();
        merged.extend(overrides.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        ModelParams(merged)
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

/// Everything a model may need for one call. Message-based models read
/// `messages`; HTTP and hosted models read `args`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ModelRequest {
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_key: Option<String>,
    pub params: ModelParams,
    #[serde(skip_serializing_if = "Value::is_null")]
    pub args: Value,
    pub is_batch: bool,
}

impl ModelRequest {
    pub fn messages(messages: Vec<Message>) -> Self {
        Self {
            messages,
            ..Default::default()
        }
    }

    pub fn args(args: Value, is_batch: bool) -> Self {
        Self {
            args,
            is_batch,
            ..Default::default()
        }
    }

    pub fn with_params(mut self, params: ModelParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_model_key(mut self, key: Option<String>) -> Self {
        self.model_key = key;
        self
    }

    /// Snapshot used as the `Start` payload of model stages.
    pub(crate) fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// An invocable model backend.
///
/// Each variant reports its own stage (`model`, `completionModel`,
/// `customModel`, `hostedModel`) and merges its configured callbacks after
/// the caller's.
#[async_trait]
pub trait Model: Send + Sync {
    /// Key functions use to select an implementation bound to this model.
    fn key(&self) -> &str;

    fn model_type(&self) -> ModelType;

    async fn call(&self, ctx: &CallContext, request: ModelRequest) -> Result<Value>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpt_defaults() {
        let d = ModelParams::gpt_defaults();
        assert_eq!(d.get("max_tokens"), Some(&json!(140)));
        assert_eq!(d.get("n"), Some(&json!(1)));
        assert_eq!(d.get("temperature"), Some(&json!(0.5)));
    }

    #[test]
    fn test_merged_with_overrides_key_by_key() {
        let merged = ModelParams::gpt_defaults()
            .merged_with(&ModelParams::new().with("temperature", json!(0.1)));
        assert_eq!(merged.get("temperature"), Some(&json!(0.1)));
        assert_eq!(merged.get("max_tokens"), Some(&json!(140)));
    }

    #[test]
    fn test_model_type_serde() {
        assert_eq!(serde_json::to_value(ModelType::Api).unwrap(), json!("api"));
        let t: ModelType = serde_json::from_value(json!("gpt")).unwrap();
        assert_eq!(t, ModelType::Gpt);
    }
}
