//! Prompt enrichment: ordered steps that inject context into function
//! arguments before the prompt template renders them.
//!
//! ```text
//! args ──► step 1 ──► step 2 ──► ... ──► PromptTemplate ──► messages
//! ```
//!
//! Steps run strictly in declared order; each sees the previous step's
//! output. Every step reports its own stage (`featureStoreEnrichment`,
//! `semanticSearchEnrichment`, `functionEnrichment`, `sqlEnrichment`)
//! nested under the pipeline's `promptEnrichmentPipeline` stage.

pub mod feature_store;
pub mod function;
pub mod semantic_search;
pub mod sql;

pub use feature_store::FeatureStoreEnrichment;
pub use function::FunctionEnrichment;
pub use semantic_search::{SearchQuery, SemanticSearchEnrichment};
pub use sql::{SqlContext, SqlEnrichment};

use crate::callback::{Callback, Callbacks, Stage};
use crate::context::{BoxFut, CallContext};
use crate::error::{EngineError, Result};
use crate::message::Message;
use crate::template::PromptTemplate;
use crate::value::{get_path, set_path};
use serde_json::Value;
use std::sync::Arc;

/// Default argument path enrichment steps write their context into.
pub const DEFAULT_CONTEXT_PATH: &str = "context";

/// Separator placed between existing and appended context.
const CONTEXT_JOINER: &str = "\n\n";

/// One enrichment step.
///
/// Object-safe so pipelines can hold heterogeneous steps as
/// `Arc<dyn EnrichmentStep>`.
pub trait EnrichmentStep: Send + Sync {
    /// Stage this step reports its events under.
    fn stage(&self) -> Stage;

    /// Instance name used in events and errors.
    fn name(&self) -> &str;

    /// Return the enriched arguments.
    fn enrich<'a>(&'a self, ctx: &'a CallContext, args: Value) -> BoxFut<'a, Result<Value>>;
}

/// Ordered enrichment steps followed by a terminal [`PromptTemplate`].
#[derive(Clone)]
pub struct PromptEnrichmentPipeline {
    name: String,
    steps: Vec<Arc<dyn EnrichmentStep>>,
    template: PromptTemplate,
    callbacks: Callbacks,
}

impl PromptEnrichmentPipeline {
    /// A pipeline with no steps: rendering only.
    pub fn new(template: PromptTemplate) -> Self {
        Self {
            name: template.name().to_string(),
            steps: Vec::new(),
            template,
            callbacks: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Append a step (builder style).
    pub fn step(mut self, step: Arc<dyn EnrichmentStep>) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn steps(&self) -> &[Arc<dyn EnrichmentStep>] {
        &self.steps
    }

    pub fn template(&self) -> &PromptTemplate {
        &self.template
    }

    /// Run every step in order, then render the enriched arguments.
    pub async fn call(&self, ctx: &CallContext, args: &Value) -> Result<Vec<Message>> {
        let ctx = ctx.with_callbacks(&self.callbacks);
        ctx.run_stage(
            Stage::PromptEnrichmentPipeline,
            &self.name,
            args.clone(),
            |ctx| async move {
                let mut current = args.clone();
                for step in &self.steps {
                    current = run_step(&ctx, step.as_ref(), current).await?;
                }
                self.template.call(&ctx, &current).await
            },
            |messages| serde_json::to_value(messages).unwrap_or(Value::Null),
        )
        .await
    }
}

impl std::fmt::Debug for PromptEnrichmentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptEnrichmentPipeline")
            .field("name", &self.name)
            .field(
                "steps",
                &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .field("template", &self.template)
            .finish()
    }
}

async fn run_step(ctx: &CallContext, step: &dyn EnrichmentStep, args: Value) -> Result<Value> {
    let input = args.clone();
    ctx.run_stage(
        step.stage(),
        step.name(),
        input,
        |ctx| async move { step.enrich(&ctx, args).await },
        |enriched| enriched.clone(),
    )
    .await
}

/// Write `text` at `path`, appending to an existing string with a blank
/// line in between. An existing non-string value is an error.
pub(crate) fn append_context(args: &mut Value, path: &str, text: &str, step: &str) -> Result<()> {
    let combined = match get_path(args, path) {
        None | Some(Value::Null) => text.to_string(),
        Some(Value::String(existing)) if existing.is_empty() => text.to_string(),
        Some(Value::String(existing)) => format!("{existing}{CONTEXT_JOINER}{text}"),
        Some(_) => {
            return Err(EngineError::Enrichment {
                step: step.to_string(),
                message: format!("existing context at '{path}' is not a string"),
            })
        }
    };
    write_context(args, path, Value::String(combined), step)
}

/// Overwrite the value at `path`.
pub(crate) fn write_context(args: &mut Value, path: &str, value: Value, step: &str) -> Result<()> {
    if set_path(args, path, value) {
        Ok(())
    } else {
        Err(EngineError::Enrichment {
            step: step.to_string(),
            message: format!("cannot write context at '{path}'"),
        })
    }
}
