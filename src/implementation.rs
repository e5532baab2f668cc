//! One concrete binding of a semantic function to a model.
//!
//! ```text
//! args ─► [map arguments] ─┬─ gpt: [enrichment ─► template] ─► history ─► [guardrails] ─► model
//!                          └─ api: model(args)
//!      ─► [output processing] ─► [map return type] ─► response
//! ```
//!
//! Bracketed steps are optional.

use crate::callback::{Callback, Callbacks, Stage};
use crate::context::CallContext;
use crate::enrichment::PromptEnrichmentPipeline;
use crate::error::{EngineError, Result};
use crate::function::FunctionCall;
use crate::guardrails::InputGuardrails;
use crate::mapping::{apply_mapping, DataMapper, DeclarativeMapper, Mapping};
use crate::message::{splice_history, Message};
use crate::model::{Model, ModelRequest, ModelType};
use crate::output::OutputProcessingPipeline;
use crate::value::best_guess_content;
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct SemanticFunctionImplementation {
    model: Arc<dyn Model>,
    enrichment: Option<PromptEnrichmentPipeline>,
    input_guardrails: Option<InputGuardrails>,
    output: Option<OutputProcessingPipeline>,
    args_mapping: Option<Mapping>,
    return_mapping: Option<Mapping>,
    mapper: Arc<dyn DataMapper>,
    is_default: bool,
    callbacks: Callbacks,
}

impl SemanticFunctionImplementation {
    pub fn new(model: Arc<dyn Model>) -> Self {
        Self {
            model,
            enrichment: None,
            input_guardrails: None,
            output: None,
            args_mapping: None,
            return_mapping: None,
            mapper: Arc::new(DeclarativeMapper),
            is_default: false,
            callbacks: Vec::new(),
        }
    }

    pub fn with_enrichment(mut self, pipeline: PromptEnrichmentPipeline) -> Self {
        self.enrichment = Some(pipeline);
        self
    }

    pub fn with_input_guardrails(mut self, guardrails: InputGuardrails) -> Self {
        self.input_guardrails = Some(guardrails);
        self
    }

    pub fn with_output(mut self, pipeline: OutputProcessingPipeline) -> Self {
        self.output = Some(pipeline);
        self
    }

    /// Mapping applied to the arguments before anything else.
    pub fn with_args_mapping(mut self, mapping: Mapping) -> Self {
        self.args_mapping = Some(mapping);
        self
    }

    /// Mapping applied to the (processed) model response.
    pub fn with_return_mapping(mut self, mapping: Mapping) -> Self {
        self.return_mapping = Some(mapping);
        self
    }

    /// Replace the mapping evaluator.
    pub fn with_mapper(mut self, mapper: Arc<dyn DataMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    pub fn default_implementation(mut self, is_default: bool) -> Self {
        self.is_default = is_default;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn model(&self) -> &Arc<dyn Model> {
        &self.model
    }

    pub fn is_default(&self) -> bool {
        self.is_default
    }

    /// Execute against the bound model and return its processed response.
    pub async fn call(&self, ctx: &CallContext, call: FunctionCall) -> Result<Value> {
        let ctx = ctx.with_callbacks(&self.callbacks);
        let input = call.snapshot();
        ctx.run_stage(
            Stage::SemanticFunctionImplementation,
            self.model.key(),
            input,
            |ctx| async move { self.execute(&ctx, call).await },
            |response| response.clone(),
        )
        .await
    }

    async fn execute(&self, ctx: &CallContext, call: FunctionCall) -> Result<Value> {
        let FunctionCall {
            args,
            history,
            model_key,
            model_params,
            is_batch,
        } = call;

        let args = match &self.args_mapping {
            Some(mapping) => {
                self.map(ctx, Stage::MapArguments, mapping, args, is_batch)
                    .await?
            }
            None => args,
        };

        let request = match self.model.model_type() {
            ModelType::Gpt => {
                let rendered = match &self.enrichment {
                    Some(pipeline) => pipeline.call(ctx, &args).await?,
                    None => vec![Message::user(best_guess_content(&args))],
                };
                let mut messages = if history.is_empty() {
                    rendered
                } else {
                    splice_history(rendered, &history)
                };
                if let Some(guardrails) = &self.input_guardrails {
                    messages = guardrails.call(ctx, messages).await?;
                }
                ModelRequest::messages(messages)
            }
            ModelType::Api => ModelRequest::args(args, is_batch),
            other => {
                return Err(EngineError::SemanticFunction(format!(
                    "model '{}' has unsupported type '{}'",
                    self.model.key(),
                    other.as_str()
                )))
            }
        };
        let request = request
            .with_model_key(model_key)
            .with_params(model_params);

        let mut response = self.model.call(ctx, request).await?;

        if let Some(output) = &self.output {
            response = output.call(ctx, response).await?;
        }

        match &self.return_mapping {
            Some(mapping) => {
                self.map(ctx, Stage::MapReturnType, mapping, response, is_batch)
                    .await
            }
            None => Ok(response),
        }
    }

    async fn map(
        &self,
        ctx: &CallContext,
        stage: Stage,
        mapping: &Mapping,
        value: Value,
        is_batch: bool,
    ) -> Result<Value> {
        let input = value.clone();
        ctx.run_stage(
            stage,
            self.model.key(),
            input,
            |_| async move { apply_mapping(self.mapper.as_ref(), mapping, &value, is_batch) },
            |mapped| mapped.clone(),
        )
        .await
    }
}

impl std::fmt::Debug for SemanticFunctionImplementation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticFunctionImplementation")
            .field("model", &self.model.key())
            .field("model_type", &self.model.model_type())
            .field("enrichment", &self.enrichment.is_some())
            .field("input_guardrails", &self.input_guardrails.is_some())
            .field("output", &self.output.is_some())
            .field("is_default", &self.is_default)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{Phase, RecordingCallback};
    use crate::model::{response_content, ChatModel, HostedModel, InferenceProvider, MockTransport};
    use crate::template::PromptTemplate;
    use async_trait::async_trait;
    use serde_json::json;

    /// An `api` model echoing its args.
    struct EchoApi;

    #[async_trait]
    impl Model for EchoApi {
        fn key(&self) -> &str {
            "echo"
        }

        fn model_type(&self) -> ModelType {
            ModelType::Api
        }

        async fn call(&self, _ctx: &CallContext, request: ModelRequest) -> Result<Value> {
            Ok(json!({"echo": request.args, "batch": request.is_batch}))
        }
    }

    struct NullProvider;

    #[async_trait]
    impl InferenceProvider for NullProvider {
        async fn query(&self, _p: &str, _m: &str, _args: &Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn test_gpt_without_pipeline_uses_best_guess_content() {
        let mock = Arc::new(MockTransport::fixed("ok"));
        let implementation =
            SemanticFunctionImplementation::new(Arc::new(ChatModel::new("gpt", mock.clone())));
        implementation
            .call(&CallContext::new(), FunctionCall::new(json!({"question": "Why?", "n": 1})))
            .await
            .unwrap();
        assert_eq!(mock.chat_requests()[0].messages, vec![Message::user("Why?")]);
    }

    #[tokio::test]
    async fn test_history_spliced_after_system_messages() {
        let mock = Arc::new(MockTransport::fixed("ok"));
        let template = PromptTemplate::new(
            "chat",
            vec![Message::system("S"), Message::user("{text}")],
        );
        let implementation =
            SemanticFunctionImplementation::new(Arc::new(ChatModel::new("gpt", mock.clone())))
                .with_enrichment(PromptEnrichmentPipeline::new(template));
        let call = FunctionCall::new(json!({"text": "U"}))
            .with_history(vec![Message::system("H0"), Message::user("H1")]);
        implementation.call(&CallContext::new(), call).await.unwrap();

        let requests = mock.chat_requests();
        let sent: Vec<&str> = requests[0]
            .messages
            .iter()
            .map(|m| m.content.as_str())
            .collect();
        assert_eq!(sent, vec!["S", "H1", "U"]);
    }

    #[tokio::test]
    async fn test_api_model_receives_args_and_mappings_apply() {
        let rec = Arc::new(RecordingCallback::new());
        let implementation = SemanticFunctionImplementation::new(Arc::new(EchoApi))
            .with_args_mapping(Mapping::object([("text", Mapping::get("review"))]))
            .with_return_mapping(Mapping::get("echo.text"))
            .with_callback(rec.clone());

        let response = implementation
            .call(&CallContext::new(), FunctionCall::new(json!({"review": "great"})))
            .await
            .unwrap();
        assert_eq!(response, json!("great"));
        assert_eq!(
            rec.timeline(),
            vec![
                (Stage::SemanticFunctionImplementation, Phase::Start),
                (Stage::MapArguments, Phase::Start),
                (Stage::MapArguments, Phase::End),
                (Stage::MapReturnType, Phase::Start),
                (Stage::MapReturnType, Phase::End),
                (Stage::SemanticFunctionImplementation, Phase::End),
            ]
        );
    }

    #[tokio::test]
    async fn test_batch_mapping_per_element() {
        let implementation = SemanticFunctionImplementation::new(Arc::new(EchoApi))
            .with_args_mapping(Mapping::get("review"));
        let response = implementation
            .call(
                &CallContext::new(),
                FunctionCall::new(json!([{"review": "a"}, {"review": "b"}])).batch(true),
            )
            .await
            .unwrap();
        assert_eq!(response, json!({"echo": ["a", "b"], "batch": true}));
    }

    #[tokio::test]
    async fn test_unsupported_model_type_is_reported() {
        let rec = Arc::new(RecordingCallback::new());
        let ctx = CallContext::builder().callback(rec.clone()).build();
        let model = HostedModel::new("huggingface", "gpt2", Arc::new(NullProvider));
        let implementation = SemanticFunctionImplementation::new(Arc::new(model));

        let err = implementation
            .call(&ctx, FunctionCall::new(json!({"text": "x"})))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SemanticFunction(_)));
        let events = rec.events();
        let end = events.last().unwrap();
        assert_eq!(end.stage, Stage::SemanticFunctionImplementation);
        assert_eq!(end.phase, Phase::End);
        assert_eq!(end.errors[0].kind, "semantic_function");
    }

    #[tokio::test]
    async fn test_model_params_reach_transport() {
        let mock = Arc::new(MockTransport::fixed("ok"));
        let implementation =
            SemanticFunctionImplementation::new(Arc::new(ChatModel::new("gpt", mock.clone())));
        let call = FunctionCall::new(json!("hello"))
            .with_model_params(crate::model::ModelParams::new().with("max_tokens", json!(5)));
        let response = implementation.call(&CallContext::new(), call).await.unwrap();
        assert_eq!(response_content(&response), Some("ok"));
        assert_eq!(mock.chat_requests()[0].params.get("max_tokens"), Some(&json!(5)));
    }
}
