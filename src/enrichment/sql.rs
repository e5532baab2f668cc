//! SQL enrichment: adds a data source's schema or sample rows to the context.

use super::{append_context, EnrichmentStep, DEFAULT_CONTEXT_PATH};
use crate::callback::Stage;
use crate::context::{BoxFut, CallContext};
use crate::error::Result;
use crate::services::{SqlSource, SqlSourceInfo};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// What a SQL step describes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SqlContext {
    /// The source's schema (DDL or a table listing).
    #[default]
    Schema,
    /// A sample of rows.
    Sample,
}

/// Describes a SQL source in `args.context`, appending to existing context.
#[derive(Clone)]
pub struct SqlEnrichment {
    name: String,
    source: SqlSourceInfo,
    mode: SqlContext,
    service: Arc<dyn SqlSource>,
}

impl SqlEnrichment {
    pub fn new(source: SqlSourceInfo, service: Arc<dyn SqlSource>) -> Self {
        Self {
            name: source.name.clone(),
            source,
            mode: SqlContext::Schema,
            service,
        }
    }

    pub fn with_mode(mut self, mode: SqlContext) -> Self {
        self.mode = mode;
        self
    }

    async fn run(&self, ctx: &CallContext, mut args: Value) -> Result<Value> {
        let text = match self.mode {
            SqlContext::Schema => ctx.external(self.service.get_schema(&self.source)).await?,
            SqlContext::Sample => ctx.external(self.service.get_sample(&self.source)).await?,
        };
        append_context(&mut args, DEFAULT_CONTEXT_PATH, &text, &self.name)?;
        Ok(args)
    }
}

impl EnrichmentStep for SqlEnrichment {
    fn stage(&self) -> Stage {
        Stage::SqlEnrichment
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn enrich<'a>(&'a self, ctx: &'a CallContext, args: Value) -> BoxFut<'a, Result<Value>> {
        Box::pin(self.run(ctx, args))
    }
}
