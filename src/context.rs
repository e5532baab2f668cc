//! Call-scoped execution context.
//!
//! [`CallContext`] carries everything that belongs to one invocation rather
//! than to a component: the observer list, the span of the enclosing stage,
//! a cancellation flag and an optional deadline. It is passed explicitly
//! through every `call`, so one component instance can serve many
//! concurrent invocations.

use crate::callback::{Callback, Callbacks, Event, Phase, SpanId, Stage};
use crate::error::{EngineError, ErrorRecord, Result};
use serde_json::Value;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// A boxed, pinned, Send future, returned by object-safe async seams.
pub type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

static NEXT_SPAN: AtomicU64 = AtomicU64::new(1);

fn next_span() -> SpanId {
    SpanId(NEXT_SPAN.fetch_add(1, Ordering::Relaxed))
}

/// Per-invocation context threaded through every stage.
///
/// # Example
///
/// ```
/// use semantic_pipeline::{CallContext, LoggingCallback};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let ctx = CallContext::builder()
///     .callback(Arc::new(LoggingCallback::new()))
///     .timeout(Duration::from_secs(30))
///     .build();
/// assert!(!ctx.is_cancelled());
/// ```
#[derive(Clone, Default)]
pub struct CallContext {
    callbacks: Callbacks,
    parent: Option<SpanId>,
    cancellation: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl CallContext {
    /// A context with no observers, no cancellation and no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> CallContextBuilder {
        CallContextBuilder::default()
    }

    pub fn callbacks(&self) -> &[Arc<dyn Callback>] {
        &self.callbacks
    }

    /// Span of the stage currently executing, if any.
    pub fn parent(&self) -> Option<SpanId> {
        self.parent
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Child context whose observers are the caller's followed by `own`.
    pub fn with_callbacks(&self, own: &[Arc<dyn Callback>]) -> CallContext {
        if own.is_empty() {
            return self.clone();
        }
        let mut ctx = self.clone();
        ctx.callbacks.extend(own.iter().cloned());
        ctx
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation
            .as_ref()
            .is_some_and(|c| c.load(Ordering::Relaxed))
    }

    /// Return an error if cancellation has been requested.
    pub fn check_cancelled(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(())
    }

    /// Run one external call (model transport, search, feature store...)
    /// under this context's cancellation flag and deadline.
    pub async fn external<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        self.check_cancelled()?;
        let result = match self.deadline {
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .map_err(|_| EngineError::DeadlineExceeded)?,
            None => fut.await,
        };
        self.check_cancelled()?;
        result
    }

    /// Start a stage: emit its `Start` event and return a scope that must be
    /// finished with [`StageScope::end`] or [`StageScope::fail`].
    pub fn enter(&self, stage: Stage, name: impl Into<String>, input: Value) -> StageScope {
        let span = next_span();
        let name = name.into();
        self.emit(Event {
            stage,
            phase: Phase::Start,
            span,
            parent: self.parent,
            name: name.clone(),
            payload: input,
            errors: Vec::new(),
        });
        let mut ctx = self.clone();
        ctx.parent = Some(span);
        StageScope {
            stage,
            name,
            span,
            parent: self.parent,
            ctx,
            finished: false,
        }
    }

    /// Run `body` as one stage, reporting its outcome through the observers.
    ///
    /// `output` renders a successful result into the `End` payload.
    pub async fn run_stage<T, F, Fut, O>(
        &self,
        stage: Stage,
        name: &str,
        input: Value,
        body: F,
        output: O,
    ) -> Result<T>
    where
        F: FnOnce(CallContext) -> Fut,
        Fut: Future<Output = Result<T>>,
        O: FnOnce(&T) -> Value,
    {
        let scope = self.enter(stage, name, input);
        if let Err(e) = scope.ctx().check_cancelled() {
            scope.fail(&e);
            return Err(e);
        }
        let result = body(scope.ctx().clone()).await;
        scope.finish(result, output)
    }

    fn emit(&self, event: Event) {
        for cb in &self.callbacks {
            cb.handle(&event);
        }
    }
}

impl std::fmt::Debug for CallContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallContext")
            .field("callbacks", &self.callbacks.len())
            .field("parent", &self.parent)
            .field("has_cancellation", &self.cancellation.is_some())
            .field("deadline", &self.deadline)
            .finish()
    }
}

/// Builder for [`CallContext`].
#[derive(Default)]
pub struct CallContextBuilder {
    callbacks: Callbacks,
    parent: Option<SpanId>,
    cancellation: Option<Arc<AtomicBool>>,
    deadline: Option<Instant>,
}

impl CallContextBuilder {
    /// Replace the observer list.
    pub fn callbacks(mut self, callbacks: Callbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    /// Append one observer.
    pub fn callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Nest every stage of this call under an existing span.
    pub fn parent(mut self, span: SpanId) -> Self {
        self.parent = Some(span);
        self
    }

    pub fn cancellation(mut self, cancel: Option<Arc<AtomicBool>>) -> Self {
        self.cancellation = cancel;
        self
    }

    pub fn deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline relative to now.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn build(self) -> CallContext {
        CallContext {
            callbacks: self.callbacks,
            parent: self.parent,
            cancellation: self.cancellation,
            deadline: self.deadline,
        }
    }
}

/// An open stage. Every `Start` gets exactly one `End`: finishing the scope
/// emits it, and dropping an unfinished scope emits an `End` carrying an
/// `abandoned` error.
pub struct StageScope {
    stage: Stage,
    name: String,
    span: SpanId,
    parent: Option<SpanId>,
    ctx: CallContext,
    finished: bool,
}

impl StageScope {
    /// Context for work nested inside this stage.
    pub fn ctx(&self) -> &CallContext {
        &self.ctx
    }

    pub fn span(&self) -> SpanId {
        self.span
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Finish successfully.
    pub fn end(mut self, output: Value) {
        self.finished = true;
        self.emit(Phase::End, output, Vec::new());
    }

    /// Finish with a failure: `Error` then `End { errors }`.
    pub fn fail(mut self, err: &EngineError) {
        self.finished = true;
        let errors = err.to_records();
        self.emit(Phase::Error, Value::Null, errors.clone());
        self.emit(Phase::End, Value::Null, errors);
    }

    /// Finish from a result, passing it through unchanged.
    pub fn finish<T>(self, result: Result<T>, output: impl FnOnce(&T) -> Value) -> Result<T> {
        match result {
            Ok(value) => {
                self.end(output(&value));
                Ok(value)
            }
            Err(e) => {
                self.fail(&e);
                Err(e)
            }
        }
    }

    fn emit(&self, phase: Phase, payload: Value, errors: Vec<ErrorRecord>) {
        self.ctx.emit(Event {
            stage: self.stage,
            phase,
            span: self.span,
            parent: self.parent,
            name: self.name.clone(),
            payload,
            errors,
        });
    }
}

impl Drop for StageScope {
    fn drop(&mut self) {
        if !self.finished {
            self.finished = true;
            self.emit(
                Phase::End,
                Value::Null,
                vec![ErrorRecord::new(
                    "abandoned",
                    format!("stage '{}' dropped before completion", self.stage),
                )],
            );
        }
    }
}
