//! Generic HTTP model.

use super::{Model, ModelRequest, ModelType};
use crate::callback::{Callback, Callbacks, Stage};
use crate::context::CallContext;
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;

/// A model served by an arbitrary HTTP endpoint.
///
/// The raw function arguments are POSTed as JSON, to `url` for single calls
/// and to `batch_endpoint` for batch calls. The endpoint's JSON response is
/// returned as is.
#[derive(Clone)]
pub struct CustomModel {
    key: String,
    url: String,
    batch_endpoint: Option<String>,
    client: Client,
    callbacks: Callbacks,
}

impl CustomModel {
    pub fn new(key: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            url: url.into(),
            batch_endpoint: None,
            client: Client::new(),
            callbacks: Vec::new(),
        }
    }

    pub fn with_batch_endpoint(mut self, url: impl Into<String>) -> Self {
        self.batch_endpoint = Some(url.into());
        self
    }

    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    /// Endpoint for one call. A batch call without a batch endpoint is an error.
    pub fn endpoint_for(&self, is_batch: bool) -> Result<&str> {
        if !is_batch {
            return Ok(&self.url);
        }
        self.batch_endpoint.as_deref().ok_or_else(|| {
            EngineError::SemanticFunction(format!(
                "model '{}' has no batch endpoint",
                self.key
            ))
        })
    }

    async fn post(&self, url: &str, args: &Value) -> Result<Value> {
        let resp = self.client.post(url).json(args).send().await?;
        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(EngineError::HttpError { status, body });
        }
        Ok(resp.json::<Value>().await?)
    }
}

#[async_trait]
impl Model for CustomModel {
    fn key(&self) -> &str {
        &self.key
    }

    fn model_type(&self) -> ModelType {
        ModelType::Api
    }

    async fn call(&self, ctx: &CallContext, request: ModelRequest) -> Result<Value> {
        let ctx = ctx.with_callbacks(&self.callbacks);
        let input = request.snapshot();
        ctx.run_stage(
            Stage::CustomModel,
            &self.key,
            input,
            |ctx| async move {
                let url = self.endpoint_for(request.is_batch)?;
                tracing::debug!(model = %self.key, url = %url, batch = request.is_batch, "custom model call");
                ctx.external(self.post(url, &request.args)).await
            },
            |response| response.clone(),
        )
        .await
    }
}

impl std::fmt::Debug for CustomModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomModel")
            .field("key", &self.key)
            .field("url", &self.url)
            .field("batch_endpoint", &self.batch_endpoint)
            .finish()
    }
}
