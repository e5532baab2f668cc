//! Contracts for the external collaborators the engine calls into.
//!
//! Implementations live outside this crate (HTTP clients, database
//! drivers...). Every call made through these traits is wrapped by
//! [`CallContext::external`](crate::CallContext::external), so it honors
//! cancellation and deadlines.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Online feature lookup.
#[async_trait]
pub trait FeatureStore: Send + Sync {
    /// Fetch the online features of one entity. The returned record is
    /// shallow-merged into the function arguments.
    async fn get_online_features(
        &self,
        store_name: &str,
        params: &Value,
        entity_id: &Value,
    ) -> Result<Value>;
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    pub content_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub metadata: Value,
}

impl SearchHit {
    pub fn new(content_text: impl Into<String>) -> Self {
        Self {
            content_text: content_text.into(),
            score: None,
            metadata: Value::Null,
        }
    }
}

/// Semantic (vector) search.
#[async_trait]
pub trait SearchService: Send + Sync {
    /// `query` is the text to search for, or `"*"` for every document.
    async fn search(&self, index_name: &str, query: &str) -> Result<Vec<SearchHit>>;
}

/// Connection details of a SQL data source, opaque to the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlSourceInfo {
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
}

/// Describes SQL sources for prompt context.
#[async_trait]
pub trait SqlSource: Send + Sync {
    async fn get_schema(&self, source: &SqlSourceInfo) -> Result<String>;
    async fn get_sample(&self, source: &SqlSourceInfo) -> Result<String>;
}

/// Outcome of a guardrail scan or parser run.
///
/// `error` set means the content was rejected; otherwise `text` is the
/// (possibly rewritten) content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub text: String,
}

impl ScanOutcome {
    pub fn pass(text: impl Into<String>) -> Self {
        Self {
            error: None,
            text: text.into(),
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            error: Some(reason.into()),
            text: String::new(),
        }
    }
}

/// Policy checks on input and output content.
#[async_trait]
pub trait GuardrailService: Send + Sync {
    async fn scan(&self, guardrail_key: &str, text: &str) -> Result<ScanOutcome>;
}

/// Output transforms applied to model responses.
#[async_trait]
pub trait ParserService: Send + Sync {
    async fn parse(&self, parser_key: &str, text: &str) -> Result<ScanOutcome>;
}
