//! OpenAI-shaped request/response types and the transport traits chat and
//! completion models delegate to.

use super::ModelParams;
use crate::error::Result;
use crate::message::{Message, Role};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Request handed to a [`ChatTransport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub model: String,
    pub messages: Vec<Message>,
    pub params: ModelParams,
}

/// Request handed to a [`CompletionTransport`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    pub model: String,
    pub prompt: String,
    pub params: ModelParams,
}

/// Token accounting reported by the provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub index: u32,
    pub message: Message,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    /// Provider fields not modelled here (`logprobs`...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// The normalized response shape of chat and completion models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub choices: Vec<ChatChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    /// Provider fields not modelled here (`object`, `created`...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ChatCompletion {
    /// A single-choice assistant response.
    pub fn from_text(content: impl Into<String>) -> Self {
        Self {
            id: None,
            model: None,
            choices: vec![ChatChoice {
                index: 0,
                message: Message::assistant(content),
                finish_reason: Some("stop".into()),
                extra: Map::new(),
            }],
            usage: None,
            extra: Map::new(),
        }
    }

    /// Content of the first choice.
    pub fn content(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChoice {
    #[serde(default)]
    pub index: u32,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Legacy text-completion response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextCompletion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub choices: Vec<TextChoice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl From<TextCompletion> for ChatCompletion {
    /// Reshape `{text}` choices into assistant `{message}` choices.
    fn from(completion: TextCompletion) -> Self {
        Self {
            id: completion.id,
            model: completion.model,
            choices: completion
                .choices
                .into_iter()
                .map(|c| ChatChoice {
                    index: c.index,
                    message: Message::new(Role::Assistant, c.text),
                    finish_reason: c.finish_reason,
                    extra: c.extra,
                })
                .collect(),
            usage: completion.usage,
            extra: completion.extra,
        }
    }
}

/// Content of the first choice of a chat-shaped response value.
///
/// A `null` content (tool calls, refusals) counts as absent.
pub fn response_content(response: &Value) -> Option<&str> {
    response
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
}

/// Chat-completion transport.
///
/// The response is the provider's JSON as received. Chat models hand it back
/// to their caller untouched, so fields like `tool_calls`, `logprobs` or a
/// `null` content survive.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<Value>;

    /// Human-readable name for logging and diagnostics.
    fn name(&self) -> &'static str;
}

/// Text-completion transport.
#[async_trait]
pub trait CompletionTransport: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<TextCompletion>;

    fn name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_text_completion_reshaped() {
        let text: TextCompletion = serde_json::from_value(json!({
            "choices": [{"index": 0, "text": "hello", "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        }))
        .unwrap();
        let chat: ChatCompletion = text.into();
        assert_eq!(chat.choices[0].message, Message::assistant("hello"));
        assert_eq!(chat.usage.unwrap().total_tokens, 4);
    }

    #[test]
    fn test_text_completion_keeps_provider_fields() {
        let text: TextCompletion = serde_json::from_value(json!({
            "id": "cmpl-1",
            "object": "text_completion",
            "created": 1700000000,
            "choices": [{"index": 0, "text": "hi", "logprobs": null, "finish_reason": "stop"}]
        }))
        .unwrap();
        let value = serde_json::to_value(ChatCompletion::from(text)).unwrap();
        assert_eq!(value["object"], "text_completion");
        assert_eq!(value["created"], 1700000000);
        assert_eq!(value["choices"][0]["logprobs"], Value::Null);
        assert!(value["choices"][0].as_object().unwrap().contains_key("logprobs"));
        assert_eq!(response_content(&value), Some("hi"));
    }

    #[test]
    fn test_response_content() {
        let value = serde_json::to_value(ChatCompletion::from_text("Hi")).unwrap();
        assert_eq!(response_content(&value), Some("Hi"));
        assert_eq!(response_content(&json!({"choices": []})), None);
        let tool_call = json!({"choices": [{"message": {"role": "assistant", "content": null}}]});
        assert_eq!(response_content(&tool_call), None);
    }
}
