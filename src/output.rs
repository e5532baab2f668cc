//! Output processing: guardrail and parser steps applied to the model's
//! response content, in declared order.

use crate::callback::{Callback, Callbacks, Stage};
use crate::context::CallContext;
use crate::error::{EngineError, Result};
use crate::model::response_content;
use crate::services::{GuardrailService, ParserService};
use crate::value::{set_path, to_text};
use serde_json::{json, Value};
use std::sync::Arc;

/// Path of the content inside a chat-shaped response.
const CONTENT_PATH: &str = "choices.0.message.content";

/// One output step.
#[derive(Clone)]
pub enum OutputStep {
    /// Reject or rewrite content through a guardrail service.
    Guardrail {
        key: String,
        service: Arc<dyn GuardrailService>,
    },
    /// Transform content through a parser service.
    Parser {
        key: String,
        service: Arc<dyn ParserService>,
    },
}

impl OutputStep {
    pub fn guardrail(key: impl Into<String>, service: Arc<dyn GuardrailService>) -> Self {
        OutputStep::Guardrail {
            key: key.into(),
            service,
        }
    }

    pub fn parser(key: impl Into<String>, service: Arc<dyn ParserService>) -> Self {
        OutputStep::Parser {
            key: key.into(),
            service,
        }
    }

    fn key(&self) -> &str {
        match self {
            OutputStep::Guardrail { key, .. } | OutputStep::Parser { key, .. } => key,
        }
    }

    fn stage(&self) -> Stage {
        match self {
            OutputStep::Guardrail { .. } => Stage::GuardrailStep,
            OutputStep::Parser { .. } => Stage::ParserStep,
        }
    }

    async fn apply(&self, ctx: &CallContext, text: &str) -> Result<String> {
        match self {
            OutputStep::Guardrail { key, service } => {
                let outcome = ctx.external(service.scan(key, text)).await?;
                match outcome.error {
                    Some(message) => Err(EngineError::Guardrail {
                        key: key.clone(),
                        message,
                    }),
                    None => Ok(outcome.text),
                }
            }
            OutputStep::Parser { key, service } => {
                let outcome = ctx.external(service.parse(key, text)).await?;
                match outcome.error {
                    Some(message) => Err(EngineError::Parser {
                        key: key.clone(),
                        message,
                    }),
                    None => Ok(outcome.text),
                }
            }
        }
    }
}

impl std::fmt::Debug for OutputStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.stage(), self.key())
    }
}

/// Ordered output steps. With no steps the response passes through unchanged.
#[derive(Clone, Default)]
pub struct OutputProcessingPipeline {
    name: String,
    steps: Vec<OutputStep>,
    callbacks: Callbacks,
}

impl OutputProcessingPipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn step(mut self, step: OutputStep) -> Self {
        self.steps.push(step);
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn steps(&self) -> &[OutputStep] {
        &self.steps
    }

    /// Run every step over the response content and write the result back.
    ///
    /// Chat-shaped responses have their first choice's content replaced;
    /// any other response is replaced by the processed text.
    pub async fn call(&self, ctx: &CallContext, response: Value) -> Result<Value> {
        let ctx = ctx.with_callbacks(&self.callbacks);
        let input = response.clone();
        ctx.run_stage(
            Stage::OutputProcessingPipeline,
            &self.name,
            input,
            |ctx| async move {
                if self.steps.is_empty() {
                    return Ok(response);
                }
                let mut text = response_content(&response)
                    .map(str::to_string)
                    .unwrap_or_else(|| to_text(&response));
                for step in &self.steps {
                    let current = text;
                    text = ctx
                        .run_stage(
                            step.stage(),
                            step.key(),
                            json!(current),
                            |ctx| async move { step.apply(&ctx, &current).await },
                            |out| json!(out),
                        )
                        .await?;
                }
                let mut response = response;
                if response_content(&response).is_some() {
                    set_path(&mut response, CONTENT_PATH, Value::String(text));
                    Ok(response)
                } else {
                    Ok(Value::String(text))
                }
            },
            |out| out.clone(),
        )
        .await
    }
}

impl std::fmt::Debug for OutputProcessingPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutputProcessingPipeline")
            .field("name", &self.name)
            .field("steps", &self.steps)
            .finish()
    }
}
