//! Hierarchical trace of an invocation.
//!
//! [`TraceBuilder`] is an explicit tree builder: [`TraceBuilder::enter`]
//! returns a [`TraceHandle`] for the new record and [`TraceBuilder::exit`]
//! closes it. [`Tracer`] drives a builder from lifecycle events, using each
//! event's span and parent span as the handles, so nesting follows the call
//! structure even when several calls share one tracer concurrently.

use crate::callback::{Callback, Event, Phase, SpanId, Stage};
use crate::error::ErrorRecord;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;

/// One step of an invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceRecord {
    pub id: u64,
    #[serde(rename = "type")]
    pub step_type: Stage,
    pub name: String,
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<i64>,
    pub input: Value,
    #[serde(default)]
    pub output: Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ErrorRecord>,
    #[serde(default)]
    pub children: Vec<TraceRecord>,
}

impl TraceRecord {
    /// Whether this record has been closed.
    pub fn is_complete(&self) -> bool {
        self.end_time.is_some()
    }

    /// Depth-first search for the first record of the given stage.
    pub fn find(&self, stage: Stage) -> Option<&TraceRecord> {
        if self.step_type == stage {
            return Some(self);
        }
        self.children.iter().find_map(|c| c.find(stage))
    }
}

/// The persisted trace document: `{name, trace: [...]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trace {
    pub name: String,
    pub trace: Vec<TraceRecord>,
}

impl Trace {
    pub fn to_json(&self) -> crate::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Handle to an open record in a [`TraceBuilder`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TraceHandle(usize);

#[derive(Debug)]
struct Slot {
    record: TraceRecord,
    children: Vec<usize>,
}

/// Explicit tree builder for trace records.
#[derive(Debug, Default)]
pub struct TraceBuilder {
    slots: Vec<Slot>,
    roots: Vec<usize>,
}

impl TraceBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a record under `parent` (or as a new root) and return its handle.
    pub fn enter(
        &mut self,
        parent: Option<TraceHandle>,
        id: u64,
        step_type: Stage,
        name: impl Into<String>,
        input: Value,
    ) -> TraceHandle {
        let index = self.slots.len();
        self.slots.push(Slot {
            record: TraceRecord {
                id,
                step_type,
                name: name.into(),
                start_time: Utc::now(),
                end_time: None,
                duration_ms: None,
                input,
                output: Value::Null,
                errors: Vec::new(),
                children: Vec::new(),
            },
            children: Vec::new(),
        });
        match parent.and_then(|p| self.slots.get_mut(p.0)) {
            Some(slot) => slot.children.push(index),
            None => self.roots.push(index),
        }
        TraceHandle(index)
    }

    /// Close a record. Closing twice keeps the first outcome.
    pub fn exit(&mut self, handle: TraceHandle, output: Value, errors: Vec<ErrorRecord>) {
        let Some(slot) = self.slots.get_mut(handle.0) else {
            return;
        };
        if slot.record.is_complete() {
            return;
        }
        let end = Utc::now();
        slot.record.duration_ms = Some((end - slot.record.start_time).num_milliseconds());
        slot.record.end_time = Some(end);
        slot.record.output = output;
        slot.record.errors = errors;
    }

    /// Snapshot the forest built so far.
    pub fn build(&self) -> Vec<TraceRecord> {
        self.roots.iter().map(|&i| self.materialize(i)).collect()
    }

    fn materialize(&self, index: usize) -> TraceRecord {
        let slot = &self.slots[index];
        let mut record = slot.record.clone();
        record.children = slot.children.iter().map(|&c| self.materialize(c)).collect();
        record
    }
}

#[derive(Debug, Default)]
struct TracerState {
    builder: TraceBuilder,
    open: HashMap<SpanId, TraceHandle>,
}

/// A [`Callback`] that assembles lifecycle events into a [`Trace`].
///
/// One tracer is expected to observe one root invocation; its records are
/// returned by [`Tracer::trace`].
///
/// # Example
///
/// ```
/// use semantic_pipeline::{CallContext, Tracer};
/// use semantic_pipeline::callback::Stage;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// let tracer = Arc::new(Tracer::new());
/// let ctx = CallContext::builder().callback(tracer.clone()).build();
/// let scope = ctx.enter(Stage::SemanticFunction, "greet", json!({"name": "Ada"}));
/// scope.end(json!("Hi Ada"));
///
/// let trace = tracer.trace();
/// assert_eq!(trace.trace.len(), 1);
/// assert_eq!(trace.trace[0].name, "greet");
/// ```
#[derive(Debug)]
pub struct Tracer {
    name: String,
    state: Mutex<TracerState>,
}

impl Tracer {
    /// A tracer with a generated name.
    pub fn new() -> Self {
        Self::named(uuid::Uuid::new_v4().to_string())
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(TracerState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The trace document built so far.
    pub fn trace(&self) -> Trace {
        let trace = self
            .state
            .lock()
            .map(|state| state.builder.build())
            .unwrap_or_default();
        Trace {
            name: self.name.clone(),
            trace,
        }
    }
}

impl Default for Tracer {
    fn default() -> Self {
        Self::new()
    }
}

impl Callback for Tracer {
    fn handle(&self, event: &Event) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        match event.phase {
            Phase::Start => {
                let parent = event.parent.and_then(|p| state.open.get(&p).copied());
                let handle = state.builder.enter(
                    parent,
                    event.span.0,
                    event.stage,
                    event.name.clone(),
                    event.payload.clone(),
                );
                state.open.insert(event.span, handle);
            }
            Phase::End => {
                if let Some(handle) = state.open.remove(&event.span) {
                    state
                        .builder
                        .exit(handle, event.payload.clone(), event.errors.clone());
                }
            }
            // `End` carries the same errors.
            Phase::Error => {}
        }
    }
}
