//! Chat-completion model.

use super::transport::{ChatRequest, ChatTransport};
use super::{Model, ModelParams, ModelRequest, ModelType};
use crate::callback::{Callback, Callbacks, Stage};
use crate::context::CallContext;
use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// A message-based LLM reached through a [`ChatTransport`].
///
/// Request parameters override [`ModelParams::gpt_defaults`] key by key.
/// The transport's response is returned unmodified.
///
/// # Example
///
/// ```
/// use semantic_pipeline::model::{ChatModel, MockTransport};
/// use std::sync::Arc;
///
/// let model = ChatModel::new("gpt-4o", Arc::new(MockTransport::fixed("Hi")))
///     .with_provider("openai");
/// ```
#[derive(Clone)]
pub struct ChatModel {
    key: String,
    model: String,
    provider: Option<String>,
    transport: Arc<dyn ChatTransport>,
    defaults: ModelParams,
    callbacks: Callbacks,
}

impl ChatModel {
    /// `model` is both the selection key and the provider-side model name
    /// until [`with_key`](Self::with_key) says otherwise.
    pub fn new(model: impl Into<String>, transport: Arc<dyn ChatTransport>) -> Self {
        let model = model.into();
        Self {
            key: model.clone(),
            model,
            provider: None,
            transport,
            defaults: ModelParams::gpt_defaults(),
            callbacks: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Replace the default parameters.
    pub fn with_defaults(mut self, defaults: ModelParams) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Model for ChatModel {
    fn key(&self) -> &str {
        &self.key
    }

    fn model_type(&self) -> ModelType {
        ModelType::Gpt
    }

    async fn call(&self, ctx: &CallContext, request: ModelRequest) -> Result<Value> {
        let ctx = ctx.with_callbacks(&self.callbacks);
        let input = request.snapshot();
        ctx.run_stage(
            Stage::Model,
            &self.key,
            input,
            |ctx| async move {
                let chat = ChatRequest {
                    provider: self.provider.clone(),
                    model: self.model.clone(),
                    messages: request.messages,
                    params: self.defaults.merged_with(&request.params),
                };
                tracing::debug!(
                    model = %self.model,
                    transport = self.transport.name(),
                    messages = chat.messages.len(),
                    "chat model call"
                );
                ctx.external(self.transport.chat(&chat)).await
            },
            |response| response.clone(),
        )
        .await
    }
}

impl std::fmt::Debug for ChatModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatModel")
            .field("key", &self.key)
            .field("model", &self.model)
            .field("provider", &self.provider)
            .field("transport", &self.transport.name())
            .field("defaults", &self.defaults)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{Phase, RecordingCallback};
    use crate::message::Message;
    use crate::model::{response_content, MockTransport};
    use async_trait::async_trait;
    use serde_json::json;

    /// Replays one provider payload verbatim.
    struct Replay(Value);

    #[async_trait]
    impl ChatTransport for Replay {
        async fn chat(&self, _request: &ChatRequest) -> Result<Value> {
            Ok(self.0.clone())
        }

        fn name(&self) -> &'static str {
            "replay"
        }
    }

    #[tokio::test]
    async fn test_chat_model_merges_defaults() {
        let mock = Arc::new(MockTransport::fixed("Hello"));
        let model = ChatModel::new("gpt-4o", mock.clone());
        let request = ModelRequest::messages(vec![Message::user("hi")])
            .with_params(ModelParams::new().with("temperature", json!(0.9)));

        let response = model.call(&CallContext::new(), request).await.unwrap();
        assert_eq!(response_content(&response), Some("Hello"));

        let sent = &mock.chat_requests()[0];
        assert_eq!(sent.params.get("temperature"), Some(&json!(0.9)));
        assert_eq!(sent.params.get("max_tokens"), Some(&json!(140)));
        assert_eq!(sent.params.get("n"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_chat_model_reports_model_stage() {
        let rec = Arc::new(RecordingCallback::new());
        let model = ChatModel::new("gpt-4o", Arc::new(MockTransport::fixed("ok")))
            .with_callback(rec.clone());

        model
            .call(&CallContext::new(), ModelRequest::messages(vec![]))
            .await
            .unwrap();
        assert_eq!(
            rec.timeline(),
            vec![(Stage::Model, Phase::Start), (Stage::Model, Phase::End)]
        );
        assert_eq!(rec.events()[0].name, "gpt-4o");
    }

    #[tokio::test]
    async fn test_chat_model_returns_provider_payload_verbatim() {
        let raw = json!({
            "id": "chatcmpl-9",
            "object": "chat.completion",
            "created": 1718000000,
            "model": "gpt-4o-2024-05-13",
            "system_fingerprint": "fp_abc123",
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "refusal": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "lookup", "arguments": "{\"q\":\"rust\"}"}
                    }]
                },
                "logprobs": null,
                "finish_reason": "tool_calls"
            }],
            "usage": {
                "prompt_tokens": 12,
                "completion_tokens": 7,
                "total_tokens": 19,
                "prompt_tokens_details": {"cached_tokens": 0}
            }
        });
        let model = ChatModel::new("gpt-4o", Arc::new(Replay(raw.clone())));

        let response = model
            .call(&CallContext::new(), ModelRequest::messages(vec![Message::user("q")]))
            .await
            .unwrap();
        assert_eq!(response, raw);
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            serde_json::to_string(&raw).unwrap()
        );
        assert_eq!(response_content(&response), None);
    }
}
