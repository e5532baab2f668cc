//! Function enrichment: runs another semantic function and stores its answer as context.

use super::{write_context, EnrichmentStep, DEFAULT_CONTEXT_PATH};
use crate::callback::Stage;
use crate::context::{BoxFut, CallContext};
use crate::error::{EngineError, Result};
use crate::function::{FunctionCall, SemanticFunction};
use crate::model::response_content;
use crate::value::{get_path, to_text};
use serde_json::Value;
use std::sync::Arc;

/// Runs another semantic function (typically a summarizer) over part of the
/// arguments and writes its answer into the context path.
///
/// The nested call receives the step's context, so its events nest under
/// the `functionEnrichment` stage.
#[derive(Clone)]
pub struct FunctionEnrichment {
    name: String,
    function: Arc<SemanticFunction>,
    input_path: Option<String>,
    context_path: String,
    model_key: Option<String>,
}

impl FunctionEnrichment {
    pub fn new(function: Arc<SemanticFunction>) -> Self {
        Self {
            name: function.name().to_string(),
            function,
            input_path: None,
            context_path: DEFAULT_CONTEXT_PATH.to_string(),
            model_key: None,
        }
    }

    /// Call the function with the value at `path` instead of all arguments.
    pub fn with_input_path(mut self, path: impl Into<String>) -> Self {
        self.input_path = Some(path.into());
        self
    }

    pub fn with_context_path(mut self, path: impl Into<String>) -> Self {
        self.context_path = path.into();
        self
    }

    pub fn with_model_key(mut self, key: impl Into<String>) -> Self {
        self.model_key = Some(key.into());
        self
    }

    async fn run(&self, ctx: &CallContext, mut args: Value) -> Result<Value> {
        let input = match &self.input_path {
            None => args.clone(),
            Some(path) => get_path(&args, path)
                .cloned()
                .ok_or_else(|| EngineError::Enrichment {
                    step: self.name.clone(),
                    message: format!("missing function input at '{path}'"),
                })?,
        };

        let call = FunctionCall::new(input).with_model_key(self.model_key.clone());
        let result = self.function.call(ctx, call).await?;
        let content = response_content(&result.response)
            .map(str::to_string)
            .unwrap_or_else(|| to_text(&result.response));

        write_context(&mut args, &self.context_path, Value::String(content), &self.name)?;
        Ok(args)
    }
}

impl EnrichmentStep for FunctionEnrichment {
    fn stage(&self) -> Stage {
        Stage::FunctionEnrichment
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn enrich<'a>(&'a self, ctx: &'a CallContext, args: Value) -> BoxFut<'a, Result<Value>> {
        Box::pin(self.run(ctx, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{Phase, RecordingCallback};
    use crate::implementation::SemanticFunctionImplementation;
    use crate::model::{ChatModel, MockTransport};
    use serde_json::json;

    fn summarizer() -> Arc<SemanticFunction> {
        let model = ChatModel::new("gpt-4o-mini", Arc::new(MockTransport::fixed("short summary")));
        Arc::new(
            SemanticFunction::new("summarize")
                .implementation(SemanticFunctionImplementation::new(Arc::new(model))),
        )
    }

    #[tokio::test]
    async fn test_writes_summary_into_context() {
        let step = FunctionEnrichment::new(summarizer()).with_input_path("document");
        let out = step
            .enrich(
                &CallContext::new(),
                json!({"document": "a very long text", "question": "gist?"}),
            )
            .await
            .unwrap();
        assert_eq!(out["context"], "short summary");
        assert_eq!(out["question"], "gist?");
    }

    #[tokio::test]
    async fn test_nested_function_events_reach_caller() {
        let rec = Arc::new(RecordingCallback::new());
        let ctx = CallContext::builder().callback(rec.clone()).build();
        let step = FunctionEnrichment::new(summarizer());
        step.enrich(&ctx, json!({"text": "abc"})).await.unwrap();

        let timeline = rec.timeline();
        assert_eq!(timeline.first(), Some(&(Stage::SemanticFunction, Phase::Start)));
        assert!(timeline.contains(&(Stage::Model, Phase::End)));
        assert_eq!(timeline.last(), Some(&(Stage::SemanticFunction, Phase::End)));
    }

    #[tokio::test]
    async fn test_missing_input_path() {
        let step = FunctionEnrichment::new(summarizer()).with_input_path("document");
        let err = step
            .enrich(&CallContext::new(), json!({"question": "gist?"}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Enrichment { .. }));
    }
}
