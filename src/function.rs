//! Semantic functions: named, schema-validated operations with one or more
//! implementations.

use crate::callback::{Callback, Callbacks, Stage};
use crate::context::CallContext;
use crate::error::{EngineError, Result};
use crate::implementation::SemanticFunctionImplementation;
use crate::message::Message;
use crate::model::ModelParams;
use crate::schema::ArgsSchema;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

/// Arguments of one function (or implementation) call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionCall {
    pub args: Value,
    /// Prior conversation, spliced after the rendered system messages.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Message>,
    /// Preferred implementation, by model key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_key: Option<String>,
    #[serde(default, skip_serializing_if = "ModelParams::is_empty")]
    pub model_params: ModelParams,
    /// `args` is an array of independent argument objects.
    #[serde(default)]
    pub is_batch: bool,
}

impl FunctionCall {
    pub fn new(args: Value) -> Self {
        Self {
            args,
            ..Default::default()
        }
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_model_key(mut self, key: Option<String>) -> Self {
        self.model_key = key;
        self
    }

    pub fn with_model_params(mut self, params: ModelParams) -> Self {
        self.model_params = params;
        self
    }

    pub fn batch(mut self, is_batch: bool) -> Self {
        self.is_batch = is_batch;
        self
    }

    pub(crate) fn snapshot(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Result of [`SemanticFunction::call`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionResponse {
    pub response: Value,
    /// Which function, model key and model type produced the response.
    pub response_metadata: Value,
}

/// A named LLM-backed operation.
///
/// # Example
///
/// ```
/// use semantic_pipeline::{ArgsSchema, SemanticFunction, SemanticFunctionImplementation};
/// use semantic_pipeline::model::{ChatModel, MockTransport};
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let model = ChatModel::new("gpt-4o", Arc::new(MockTransport::fixed("Hi Ada")));
/// let greet = SemanticFunction::new("greet")
///     .with_schema(ArgsSchema::new(json!({"type": "object", "required": ["name"]})).unwrap())
///     .implementation(SemanticFunctionImplementation::new(Arc::new(model)).default_implementation(true));
/// assert_eq!(greet.implementations().len(), 1);
/// ```
#[derive(Clone)]
pub struct SemanticFunction {
    name: String,
    description: Option<String>,
    schema: Option<ArgsSchema>,
    implementations: Vec<SemanticFunctionImplementation>,
    callbacks: Callbacks,
}

impl SemanticFunction {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            schema: None,
            implementations: Vec::new(),
            callbacks: Vec::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_schema(mut self, schema: ArgsSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Append an implementation (builder style).
    pub fn implementation(mut self, implementation: SemanticFunctionImplementation) -> Self {
        self.implementations.push(implementation);
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn schema(&self) -> Option<&ArgsSchema> {
        self.schema.as_ref()
    }

    pub fn implementations(&self) -> &[SemanticFunctionImplementation] {
        &self.implementations
    }

    /// Pick the implementation for a call: the one bound to `model_key`,
    /// else the one flagged default, else the first.
    pub fn resolve(&self, model_key: Option<&str>) -> Result<&SemanticFunctionImplementation> {
        let by_key = model_key.and_then(|key| {
            self.implementations
                .iter()
                .find(|imp| imp.model().key() == key)
        });
        by_key
            .or_else(|| self.implementations.iter().find(|imp| imp.is_default()))
            .or_else(|| self.implementations.first())
            .ok_or_else(|| {
                EngineError::SemanticFunction(format!(
                    "function '{}' has no implementations",
                    self.name
                ))
            })
    }

    /// Validate call arguments.
    ///
    /// Batch calls must pass an array, and only its first element is
    /// checked against the schema.
    pub fn validate(&self, args: &Value, is_batch: bool) -> Result<()> {
        let instance = if is_batch {
            let items = args.as_array().ok_or_else(|| {
                EngineError::SemanticFunction(format!(
                    "function '{}' expects an array of arguments for a batch call",
                    self.name
                ))
            })?;
            match items.first() {
                Some(first) => first,
                None => return Ok(()),
            }
        } else {
            args
        };
        match &self.schema {
            Some(schema) => schema.validate(&self.name, instance),
            None => Ok(()),
        }
    }

    pub async fn call(&self, ctx: &CallContext, call: FunctionCall) -> Result<FunctionResponse> {
        let ctx = ctx.with_callbacks(&self.callbacks);
        let input = call.snapshot();
        ctx.run_stage(
            Stage::SemanticFunction,
            &self.name,
            input,
            |ctx| async move {
                self.validate(&call.args, call.is_batch)?;
                let implementation = self.resolve(call.model_key.as_deref())?;
                let model = implementation.model();
                tracing::debug!(function = %self.name, model = model.key(), "resolved implementation");

                let response_metadata = json!({
                    "function": self.name,
                    "modelKey": model.key(),
                    "modelType": model.model_type(),
                });
                let response = implementation.call(&ctx, call).await?;
                Ok(FunctionResponse {
                    response,
                    response_metadata,
                })
            },
            |result| serde_json::to_value(result).unwrap_or(Value::Null),
        )
        .await
    }
}

impl std::fmt::Debug for SemanticFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SemanticFunction")
            .field("name", &self.name)
            .field("has_schema", &self.schema.is_some())
            .field("implementations", &self.implementations)
            .finish()
    }
}
