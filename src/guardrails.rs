//! Input guardrails: policy scans over rendered messages before the model
//! is called.

use crate::callback::{Callback, Callbacks, Stage};
use crate::context::CallContext;
use crate::error::{EngineError, Result};
use crate::message::Message;
use crate::services::GuardrailService;
use serde_json::Value;
use std::sync::Arc;

/// Runs every configured guardrail over every message.
///
/// A rejection aborts the call with [`EngineError::Guardrail`]. A passing
/// scan may rewrite the message (redaction); an empty rewrite keeps the
/// original content.
#[derive(Clone)]
pub struct InputGuardrails {
    name: String,
    keys: Vec<String>,
    service: Arc<dyn GuardrailService>,
    callbacks: Callbacks,
}

impl InputGuardrails {
    pub fn new(service: Arc<dyn GuardrailService>) -> Self {
        Self {
            name: "input-guardrails".to_string(),
            keys: Vec::new(),
            service,
            callbacks: Vec::new(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add a guardrail key (builder style).
    pub fn guardrail(mut self, key: impl Into<String>) -> Self {
        self.keys.push(key.into());
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub async fn call(&self, ctx: &CallContext, messages: Vec<Message>) -> Result<Vec<Message>> {
        let ctx = ctx.with_callbacks(&self.callbacks);
        let input = serde_json::to_value(&messages).unwrap_or(Value::Null);
        ctx.run_stage(
            Stage::InputGuardrails,
            &self.name,
            input,
            |ctx| async move {
                let mut messages = messages;
                for key in &self.keys {
                    for message in messages.iter_mut() {
                        let outcome = ctx.external(self.service.scan(key, &message.content)).await?;
                        if let Some(reason) = outcome.error {
                            tracing::warn!(guardrail = %key, role = message.role.as_str(), "input rejected");
                            return Err(EngineError::Guardrail {
                                key: key.clone(),
                                message: reason,
                            });
                        }
                        if !outcome.text.is_empty() {
                            message.content = outcome.text;
                        }
                    }
                }
                Ok(messages)
            },
            |messages| serde_json::to_value(messages).unwrap_or(Value::Null),
        )
        .await
    }
}

impl std::fmt::Debug for InputGuardrails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InputGuardrails")
            .field("name", &self.name)
            .field("keys", &self.keys)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{Phase, RecordingCallback};
    use crate::services::ScanOutcome;
    use async_trait::async_trait;

    /// Rejects "password", redacts emails crudely.
    struct Policy;

    #[async_trait]
    impl GuardrailService for Policy {
        async fn scan(&self, key: &str, text: &str) -> Result<ScanOutcome> {
            match key {
                "secrets" if text.contains("password") => Ok(ScanOutcome::reject("secret detected")),
                "pii" => Ok(ScanOutcome::pass(text.replace("ada@example.com", "[email]"))),
                _ => Ok(ScanOutcome::pass(text)),
            }
        }
    }

    #[tokio::test]
    async fn test_redacts_passing_messages() {
        let guardrails = InputGuardrails::new(Arc::new(Policy)).guardrail("pii");
        let out = guardrails
            .call(&CallContext::new(), vec![Message::user("mail ada@example.com")])
            .await
            .unwrap();
        assert_eq!(out[0].content, "mail [email]");
    }

    #[tokio::test]
    async fn test_rejection_is_guardrail_error() {
        let rec = Arc::new(RecordingCallback::new());
        let guardrails = InputGuardrails::new(Arc::new(Policy))
            .guardrail("pii")
            .guardrail("secrets")
            .with_callback(rec.clone());
        let err = guardrails
            .call(
                &CallContext::new(),
                vec![Message::system("Be nice."), Message::user("my password is hunter2")],
            )
            .await
            .unwrap_err();
        match err {
            EngineError::Guardrail { key, .. } => assert_eq!(key, "secrets"),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(
            rec.timeline(),
            vec![
                (Stage::InputGuardrails, Phase::Start),
                (Stage::InputGuardrails, Phase::Error),
                (Stage::InputGuardrails, Phase::End)
            ]
        );
    }
}
