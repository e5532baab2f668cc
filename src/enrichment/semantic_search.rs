//! Semantic-search enrichment: appends retrieved passages to the prompt context.

use super::{append_context, EnrichmentStep, DEFAULT_CONTEXT_PATH};
use crate::callback::Stage;
use crate::context::{BoxFut, CallContext};
use crate::error::{EngineError, Result};
use crate::services::SearchService;
use crate::value::{get_path, to_text};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Sentinel query meaning "every document in the index".
pub const ALL_DOCUMENTS: &str = "*";

/// What a search step queries with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchQuery {
    /// The whole argument object, rendered as text.
    Args,
    /// The value at a dotted argument path.
    Path(String),
    /// Every document ([`ALL_DOCUMENTS`]).
    All,
}

/// Retrieves documents from a vector index and appends their text to the
/// context at `context_path`.
#[derive(Clone)]
pub struct SemanticSearchEnrichment {
    name: String,
    index_name: String,
    query: SearchQuery,
    context_path: String,
    max_hits: Option<usize>,
    search: Arc<dyn SearchService>,
}

impl SemanticSearchEnrichment {
    pub fn new(index_name: impl Into<String>, search: Arc<dyn SearchService>) -> Self {
        let index_name = index_name.into();
        Self {
            name: index_name.clone(),
            index_name,
            query: SearchQuery::Args,
            context_path: DEFAULT_CONTEXT_PATH.to_string(),
            max_hits: None,
            search,
        }
    }

    pub fn with_query(mut self, query: SearchQuery) -> Self {
        self.query = query;
        self
    }

    pub fn with_context_path(mut self, path: impl Into<String>) -> Self {
        self.context_path = path.into();
        self
    }

    /// Keep only the first `n` hits.
    pub fn with_max_hits(mut self, n: usize) -> Self {
        self.max_hits = Some(n);
        self
    }

    fn query_text(&self, args: &Value) -> Result<String> {
        match &self.query {
            SearchQuery::Args => Ok(to_text(args)),
            SearchQuery::All => Ok(ALL_DOCUMENTS.to_string()),
            SearchQuery::Path(path) => get_path(args, path)
                .filter(|v| !v.is_null())
                .map(to_text)
                .ok_or_else(|| EngineError::Enrichment {
                    step: self.name.clone(),
                    message: format!("missing search query at '{path}'"),
                }),
        }
    }

    async fn run(&self, ctx: &CallContext, mut args: Value) -> Result<Value> {
        let query = self.query_text(&args)?;
        let hits = ctx
            .external(self.search.search(&self.index_name, &query))
            .await?;
        let limit = self.max_hits.unwrap_or(hits.len());
        tracing::debug!(index = %self.index_name, hits = hits.len(), limit, "semantic search");

        let text = hits
            .iter()
            .take(limit)
            .map(|h| h.content_text.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        if text.is_empty() {
            return Ok(args);
        }
        append_context(&mut args, &self.context_path, &text, &self.name)?;
        Ok(args)
    }
}

impl EnrichmentStep for SemanticSearchEnrichment {
    fn stage(&self) -> Stage {
        Stage::SemanticSearchEnrichment
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn enrich<'a>(&'a self, ctx: &'a CallContext, args: Value) -> BoxFut<'a, Result<Value>> {
        Box::pin(self.run(ctx, args))
    }
}
