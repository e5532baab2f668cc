//! Transport for OpenAI-compatible APIs.
//!
//! [`OpenAiTransport`] covers OpenAI, vLLM, llama.cpp server, LM Studio,
//! Together AI, Groq, Mistral, Fireworks and Ollama's `/v1/` endpoint.
//!
//! Endpoints: `/v1/chat/completions` (chat) and `/v1/completions` (text).

use super::transport::{
    ChatRequest, ChatTransport, CompletionRequest, CompletionTransport, TextCompletion,
};
use crate::error::{EngineError, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

/// Chat and completion transport for any OpenAI-compatible API.
///
/// # Example
///
/// ```
/// use semantic_pipeline::model::OpenAiTransport;
///
/// let transport = OpenAiTransport::new("https://api.openai.com").with_api_key("sk-...");
/// ```
#[derive(Clone)]
pub struct OpenAiTransport {
    client: Client,
    base_url: String,
    /// Optional API key. If set, sent as `Authorization: Bearer {key}`.
    api_key: Option<String>,
    /// Optional organization ID. If set, sent as `OpenAI-Organization: {org}`.
    organization: Option<String>,
}

impl std::fmt::Debug for OpenAiTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiTransport")
            .field("base_url", &self.base_url)
            .field(
                "api_key",
                &self.api_key.as_ref().map(|k| {
                    if k.chars().count() > 6 {
                        format!("{}***", k.chars().take(6).collect::<String>())
                    } else {
                        "***".to_string()
                    }
                }),
            )
            .field("organization", &self.organization)
            .finish()
    }
}

impl OpenAiTransport {
    /// Create a transport without authentication.
    ///
    /// Known path suffixes (`/v1`, `/v1/chat/completions`) are stripped from
    /// `base_url` so endpoints are not doubled.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: normalize_base_url(&base_url.into()),
            api_key: None,
            organization: None,
        }
    }

    /// Use a preconfigured HTTP client (timeouts, proxies...).
    pub fn with_client(mut self, client: Client) -> Self {
        self.client = client;
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_organization(mut self, org: impl Into<String>) -> Self {
        self.organization = Some(org.into());
        self
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Body for `/v1/chat/completions`: parameters are flattened next to
    /// `model` and `messages`.
    fn chat_body(request: &ChatRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "messages": request.messages,
        });
        if let Some(obj) = body.as_object_mut() {
            for (k, v) in &request.params.0 {
                obj.insert(k.clone(), v.clone());
            }
        }
        body
    }

    /// Body for `/v1/completions`.
    fn completion_body(request: &CompletionRequest) -> Value {
        let mut body = json!({
            "model": request.model,
            "prompt": request.prompt,
        });
        if let Some(obj) = body.as_object_mut() {
            for (k, v) in &request.params.0 {
                obj.insert(k.clone(), v.clone());
            }
        }
        body
    }

    /// Build the reqwest request with appropriate headers.
    fn build_http_request(&self, url: &str, body: &Value) -> reqwest::RequestBuilder {
        let mut req = self.client.post(url).json(body);

        if let Some(ref key) = self.api_key {
            req = req.header("Authorization", format!("Bearer {}", key));
        }
        if let Some(ref org) = self.organization {
            req = req.header("OpenAI-Organization", org.as_str());
        }

        req
    }

    async fn post<T: DeserializeOwned>(&self, path: &str, body: &Value) -> Result<T> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(url = %url, "posting to OpenAI-compatible endpoint");

        let resp = self
            .build_http_request(&url, body)
            .send()
            .await
            .map_err(|e| EngineError::Other(format!("Failed to connect to LLM at {}: {}", url, e)))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(EngineError::HttpError { status, body: text });
        }

        Ok(resp.json::<T>().await?)
    }
}

#[async_trait]
impl ChatTransport for OpenAiTransport {
    async fn chat(&self, request: &ChatRequest) -> Result<Value> {
        self.post("/v1/chat/completions", &Self::chat_body(request))
            .await
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

#[async_trait]
impl CompletionTransport for OpenAiTransport {
    async fn complete(&self, request: &CompletionRequest) -> Result<TextCompletion> {
        self.post("/v1/completions", &Self::completion_body(request))
            .await
    }

    fn name(&self) -> &'static str {
        "openai"
    }
}

/// Strip known provider path suffixes from a base URL.
/// e.g., "https://api.openai.com/v1" -> "https://api.openai.com"
fn normalize_base_url(url: &str) -> String {
    let trimmed = url.trim_end_matches('/');
    // Longest first
    for suffix in &["/v1/chat/completions", "/v1/completions", "/v1"] {
        if let Some(stripped) = trimmed.strip_suffix(suffix) {
            return stripped.to_string();
        }
    }
    trimmed.to_string()
}
