//! Text-completion model.

use super::transport::{ChatCompletion, CompletionRequest, CompletionTransport};
use super::{Model, ModelParams, ModelRequest, ModelType};
use crate::callback::{Callback, Callbacks, Stage};
use crate::context::CallContext;
use crate::error::Result;
use crate::message::to_prompt;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// A legacy completion LLM.
///
/// Messages are flattened into one prompt string, and the `{text}` choices
/// of the response are reshaped into chat-style assistant messages so that
/// callers see the same shape as [`ChatModel`](super::ChatModel).
#[derive(Clone)]
pub struct CompletionModel {
    key: String,
    model: String,
    provider: Option<String>,
    transport: Arc<dyn CompletionTransport>,
    defaults: ModelParams,
    callbacks: Callbacks,
}

impl CompletionModel {
    pub fn new(model: impl Into<String>, transport: Arc<dyn CompletionTransport>) -> Self {
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

    pub fn with_defaults(mut self, defaults: ModelParams) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }
}

#[async_trait]
impl Model for CompletionModel {
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
            Stage::CompletionModel,
            &self.key,
            input,
            |ctx| async move {
                let completion_request = CompletionRequest {
                    provider: self.provider.clone(),
                    model: self.model.clone(),
                    prompt: to_prompt(&request.messages),
                    params: self.defaults.merged_with(&request.params),
                };
                tracing::debug!(
                    model = %self.model,
                    transport = self.transport.name(),
                    prompt_len = completion_request.prompt.len(),
                    "completion model call"
                );
                let completion = ctx
                    .external(self.transport.complete(&completion_request))
                    .await?;
                Ok(serde_json::to_value(ChatCompletion::from(completion))?)
            },
            |response| response.clone(),
        )
        .await
    }
}

impl std::fmt::Debug for CompletionModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionModel")
            .field("key", &self.key)
            .field("model", &self.model)
            .field("transport", &self.transport.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{Phase, RecordingCallback};
    use crate::message::Message;
    use crate::model::{response_content, MockTransport};
    use serde_json::json;

    #[tokio::test]
    async fn test_completion_reshapes_choices() {
        let mock = Arc::new(MockTransport::fixed("Paris"));
        let model = CompletionModel::new("davinci", mock.clone());
        let request = ModelRequest::messages(vec![
            Message::system("Answer briefly."),
            Message::user("Capital of France?"),
        ]);

        let response = model.call(&CallContext::new(), request).await.unwrap();
        assert_eq!(response_content(&response), Some("Paris"));
        assert_eq!(response["choices"][0]["message"]["role"], json!("assistant"));

        let sent = &mock.completion_requests()[0];
        assert!(sent.prompt.starts_with("system: Answer briefly."));
        assert!(sent.prompt.ends_with("assistant:"));
        assert_eq!(sent.params.get("max_tokens"), Some(&json!(140)));
    }

    #[tokio::test]
    async fn test_completion_reports_own_stage() {
        let rec = Arc::new(RecordingCallback::new());
        let ctx = CallContext::builder().callback(rec.clone()).build();
        let model = CompletionModel::new("davinci", Arc::new(MockTransport::fixed("x")));
        model
            .call(&ctx, ModelRequest::messages(vec![Message::user("q")]))
            .await
            .unwrap();
        assert_eq!(
            rec.timeline(),
            vec![
                (Stage::CompletionModel, Phase::Start),
                (Stage::CompletionModel, Phase::End)
            ]
        );
    }
}
