//! # Semantic Pipeline
//!
//! Semantic functions over LLMs: schema-validated calls, prompt enrichment,
//! polymorphic model dispatch, composition graphs and nested tracing.
//!
//! ## Core Concepts
//!
//! - **[`SemanticFunction`]**: a named operation with a JSON Schema argument
//!   contract and one or more implementations.
//! - **[`SemanticFunctionImplementation`]**: binds one [`Model`] to optional
//!   enrichment, guardrails, output processing and argument/return mappings.
//! - **[`PromptEnrichmentPipeline`]**: feature-store, semantic-search,
//!   function and SQL steps that inject context before a
//!   [`PromptTemplate`] renders the messages.
//! - **[`Composition`]**: a graph of request, function, mapper, joiner and
//!   output nodes evaluated back to front from its output node.
//! - **[`CallContext`]**: per-call observers, parent span, cancellation flag
//!   and deadline, passed explicitly through every `call`.
//! - **[`Callback`]**: observers receive matched `Start`/`End` events (plus
//!   `Error` on failure) for every stage. [`Tracer`] turns them into a
//!   nested trace document; [`LoggingCallback`] into `tracing` records.
//!
//! ## Quick Start
//!
//! ```no_run
//! use semantic_pipeline::model::{ChatModel, OpenAiTransport};
//! use semantic_pipeline::{
//!     ArgsSchema, CallContext, FunctionCall, Message, PromptEnrichmentPipeline,
//!     PromptTemplate, SemanticFunction, SemanticFunctionImplementation, Tracer,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = OpenAiTransport::new("https://api.openai.com").with_api_key("sk-...");
//!     let model = ChatModel::new("gpt-4o-mini", Arc::new(transport));
//!
//!     let template = PromptTemplate::new(
//!         "greet",
//!         vec![Message::system("You are friendly."), Message::user("Say hi to {name}.")],
//!     );
//!     let greet = SemanticFunction::new("greet")
//!         .with_schema(ArgsSchema::new(json!({
//!             "type": "object",
//!             "required": ["name"],
//!             "properties": {"name": {"type": "string"}}
//!         }))?)
//!         .implementation(
//!             SemanticFunctionImplementation::new(Arc::new(model))
//!                 .with_enrichment(PromptEnrichmentPipeline::new(template))
//!                 .default_implementation(true),
//!         );
//!
//!     let tracer = Arc::new(Tracer::new());
//!     let ctx = CallContext::builder().callback(tracer.clone()).build();
//!     let result = greet.call(&ctx, FunctionCall::new(json!({"name": "Ada"}))).await?;
//!
//!     println!("{}", result.response);
//!     println!("{}", tracer.trace().to_json()?);
//!     Ok(())
//! }
//! ```

pub mod callback;
pub mod composition;
pub mod context;
pub mod definition;
pub mod enrichment;
pub mod error;
pub mod function;
pub mod guardrails;
pub mod implementation;
pub mod mapping;
pub mod message;
pub mod model;
pub mod output;
pub mod parser;
pub mod schema;
pub mod services;
pub mod template;
pub mod tracer;
pub mod value;

pub use callback::{
    Callback, Callbacks, Event, FnCallback, LoggingCallback, Phase, RecordingCallback, SpanId, Stage,
};
pub use composition::{Composition, Edge, Node, NodeKind};
pub use context::{BoxFut, CallContext, CallContextBuilder, StageScope};
pub use definition::{CompositionDef, EdgeDef, FunctionRegistry, NodeDef};
pub use enrichment::{
    EnrichmentStep, FeatureStoreEnrichment, FunctionEnrichment, PromptEnrichmentPipeline,
    SearchQuery, SemanticSearchEnrichment, SqlContext, SqlEnrichment,
};
pub use error::{EngineError, ErrorRecord, Result, SchemaReport, SchemaViolation};
pub use function::{FunctionCall, FunctionResponse, SemanticFunction};
pub use guardrails::InputGuardrails;
pub use implementation::SemanticFunctionImplementation;
pub use mapping::{DataMapper, DeclarativeMapper, Mapping, TransformOp};
pub use message::{Message, Role};
pub use model::{Model, ModelParams, ModelRequest, ModelType};
pub use output::{OutputProcessingPipeline, OutputStep};
pub use parser::BuiltinParser;
pub use schema::ArgsSchema;
pub use template::PromptTemplate;
pub use tracer::{Trace, TraceRecord, Tracer};
