//! Lifecycle events and observers.
//!
//! Every stateful component reports its work as a matched pair of
//! [`Phase::Start`] and [`Phase::End`] events, with an extra [`Phase::Error`]
//! before the `End` when the stage fails. Observers implement [`Callback`]
//! and receive every event through a single [`Callback::handle`] method, so
//! an observer only has to look at the stages it cares about.

use crate::error::ErrorRecord;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Identifier of one started stage. Unique within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpanId(pub u64);

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The pipeline stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Stage {
    Composition,
    MapperNode,
    SemanticFunction,
    SemanticFunctionImplementation,
    MapArguments,
    MapReturnType,
    PromptEnrichmentPipeline,
    FeatureStoreEnrichment,
    SemanticSearchEnrichment,
    FunctionEnrichment,
    SqlEnrichment,
    PromptTemplate,
    InputGuardrails,
    OutputProcessingPipeline,
    GuardrailStep,
    ParserStep,
    /// Chat-style model call.
    Model,
    CompletionModel,
    CustomModel,
    HostedModel,
}

impl Stage {
    /// camelCase name used in trace records and log lines.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Composition => "composition",
            Stage::MapperNode => "mapperNode",
            Stage::SemanticFunction => "semanticFunction",
            Stage::SemanticFunctionImplementation => "semanticFunctionImplementation",
            Stage::MapArguments => "mapArguments",
            Stage::MapReturnType => "mapReturnType",
            Stage::PromptEnrichmentPipeline => "promptEnrichmentPipeline",
            Stage::FeatureStoreEnrichment => "featureStoreEnrichment",
            Stage::SemanticSearchEnrichment => "semanticSearchEnrichment",
            Stage::FunctionEnrichment => "functionEnrichment",
            Stage::SqlEnrichment => "sqlEnrichment",
            Stage::PromptTemplate => "promptTemplate",
            Stage::InputGuardrails => "inputGuardrails",
            Stage::OutputProcessingPipeline => "outputProcessingPipeline",
            Stage::GuardrailStep => "guardrailStep",
            Stage::ParserStep => "parserStep",
            Stage::Model => "model",
            Stage::CompletionModel => "completionModel",
            Stage::CustomModel => "customModel",
            Stage::HostedModel => "hostedModel",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where in its lifecycle a stage is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Start,
    End,
    Error,
}

/// A lifecycle event.
#[derive(Debug, Clone)]
pub struct Event {
    pub stage: Stage,
    pub phase: Phase,
    /// Span of the stage this event belongs to.
    pub span: SpanId,
    /// Span of the enclosing stage, if any.
    pub parent: Option<SpanId>,
    /// Instance name of the component (function name, model key, step name...).
    pub name: String,
    /// Start: the stage input. End: the stage output (`Null` on failure).
    /// Error: `Null`.
    pub payload: Value,
    /// Empty unless the stage failed.
    pub errors: Vec<ErrorRecord>,
}

impl Event {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Observer of lifecycle events.
///
/// # Example
///
/// ```
/// use semantic_pipeline::callback::{Callback, Event, Phase, Stage};
///
/// struct ModelCounter(std::sync::atomic::AtomicUsize);
///
/// impl Callback for ModelCounter {
///     fn handle(&self, event: &Event) {
///         if event.stage == Stage::Model && event.phase == Phase::End {
///             self.0.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
///         }
///     }
/// }
/// ```
pub trait Callback: Send + Sync {
    fn handle(&self, event: &Event);
}

/// Shared list of observers, in delivery order.
pub type Callbacks = Vec<Arc<dyn Callback>>;

/// A [`Callback`] backed by a closure.
pub struct FnCallback<F: Fn(&Event) + Send + Sync>(pub F);

impl<F: Fn(&Event) + Send + Sync> Callback for FnCallback<F> {
    fn handle(&self, event: &Event) {
        (self.0)(event);
    }
}

/// Renders every event as a `tracing` record.
///
/// Starts are logged at `debug`, successful ends at `info` and errors at `warn`.
/// Payloads are only included when [`LoggingCallback::with_payloads`] is set.
#[derive(Debug, Clone, Default)]
pub struct LoggingCallback {
    payloads: bool,
}

impl LoggingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_payloads(mut self, enabled: bool) -> Self {
        self.payloads = enabled;
        self
    }
}

impl Callback for LoggingCallback {
    fn handle(&self, event: &Event) {
        let stage = event.stage.as_str();
        let span = event.span.0;
        let parent = event.parent.map(|p| p.0);
        match event.phase {
            Phase::Start if self.payloads => tracing::debug!(
                stage, span, ?parent, name = %event.name, input = %event.payload, "stage started"
            ),
            Phase::Start => {
                tracing::debug!(stage, span, ?parent, name = %event.name, "stage started")
            }
            Phase::End if event.is_ok() && self.payloads => tracing::info!(
                stage, span, name = %event.name, output = %event.payload, "stage finished"
            ),
            Phase::End if event.is_ok() => {
                tracing::info!(stage, span, name = %event.name, "stage finished")
            }
            Phase::End => tracing::info!(
                stage, span, name = %event.name, errors = event.errors.len(), "stage finished with errors"
            ),
            Phase::Error => {
                for err in &event.errors {
                    tracing::warn!(
                        stage, span, name = %event.name, kind = %err.kind, "{}", err.message
                    );
                }
            }
        }
    }
}

/// Records every event it sees. Useful for asserting event order in tests.
#[derive(Debug, Default)]
pub struct RecordingCallback {
    events: std::sync::Mutex<Vec<Event>>,
}

impl RecordingCallback {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events received so far.
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }

    /// `(stage, phase)` pairs received so far, in order.
    pub fn timeline(&self) -> Vec<(Stage, Phase)> {
        self.events().iter().map(|e| (e.stage, e.phase)).collect()
    }
}

impl Callback for RecordingCallback {
    fn handle(&self, event: &Event) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
