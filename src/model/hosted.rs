//! Hosted-inference model (Hugging Face style providers).

use super::{Model, ModelRequest, ModelType};
use crate::callback::{Callback, Callbacks, Stage};
use crate::context::CallContext;
use crate::error::Result;
use crate::message::to_prompt;
use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

/// Query function of a hosted inference provider.
#[async_trait]
pub trait InferenceProvider: Send + Sync {
    async fn query(&self, provider: &str, model: &str, args: &Value) -> Result<Value>;
}

/// A model served by a hosted inference provider, keyed by model name.
#[derive(Clone)]
pub struct HostedModel {
    key: String,
    provider: String,
    model: String,
    client: Arc<dyn InferenceProvider>,
    callbacks: Callbacks,
}

impl HostedModel {
    pub fn new(
        provider: impl Into<String>,
        model: impl Into<String>,
        client: Arc<dyn InferenceProvider>,
    ) -> Self {
        let model = model.into();
        Self {
            key: model.clone(),
            provider: provider.into(),
            model,
            client,
            callbacks: Vec::new(),
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Provider payload: the raw args when given, otherwise the messages
    /// flattened into `{"inputs", "parameters"}`.
    fn payload(request: &ModelRequest) -> Value {
        if !request.args.is_null() {
            return request.args.clone();
        }
        json!({
            "inputs": to_prompt(&request.messages),
            "parameters": request.params,
        })
    }
}

#[async_trait]
impl Model for HostedModel {
    fn key(&self) -> &str {
        &self.key
    }

    fn model_type(&self) -> ModelType {
        ModelType::Huggingface
    }

    async fn call(&self, ctx: &CallContext, request: ModelRequest) -> Result<Value> {
        let ctx = ctx.with_callbacks(&self.callbacks);
        let input = request.snapshot();
        ctx.run_stage(
            Stage::HostedModel,
            &self.key,
            input,
            |ctx| async move {
                let payload = Self::payload(&request);
                ctx.external(self.client.query(&self.provider, &self.model, &payload))
                    .await
            },
            |response| response.clone(),
        )
        .await
    }
}

impl std::fmt::Debug for HostedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostedModel")
            .field("key", &self.key)
            .field("provider", &self.provider)
            .field("model", &self.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{Phase, RecordingCallback};
    use crate::message::Message;
    use std::sync::Mutex;

    #[derive(Default)]
    struct EchoProvider {
        seen: Mutex<Vec<(String, String, Value)>>,
    }

    #[async_trait]
    impl InferenceProvider for EchoProvider {
        async fn query(&self, provider: &str, model: &str, args: &Value) -> Result<Value> {
            self.seen
                .lock()
                .unwrap()
                .push((provider.into(), model.into(), args.clone()));
            Ok(json!([{"generated_text": "ok"}]))
        }
    }

    #[tokio::test]
    async fn test_hosted_model_passes_args() {
        let provider = Arc::new(EchoProvider::default());
        let rec = Arc::new(RecordingCallback::new());
        let model = HostedModel::new("huggingface", "gpt2", provider.clone()).with_callback(rec.clone());

        let response = model
            .call(&CallContext::new(), ModelRequest::args(json!({"inputs": "hello"}), false))
            .await
            .unwrap();
        assert_eq!(response[0]["generated_text"], "ok");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen[0].0, "huggingface");
        assert_eq!(seen[0].1, "gpt2");
        assert_eq!(seen[0].2, json!({"inputs": "hello"}));
        assert_eq!(
            rec.timeline(),
            vec![(Stage::HostedModel, Phase::Start), (Stage::HostedModel, Phase::End)]
        );
    }

    #[test]
    fn test_payload_from_messages() {
        let request = ModelRequest::messages(vec![Message::user("hi")]);
        let payload = HostedModel::payload(&request);
        assert_eq!(payload["inputs"], "user: hi\n\nassistant:");
    }
}
