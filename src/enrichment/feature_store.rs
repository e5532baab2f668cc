//! Feature-store enrichment: merges an entity's online features into the arguments.

use super::EnrichmentStep;
use crate::callback::Stage;
use crate::context::{BoxFut, CallContext};
use crate::error::{EngineError, Result};
use crate::services::FeatureStore;
use crate::value::{get_path, shallow_merge};
use serde_json::Value;
use std::sync::Arc;

/// Looks up online features for `args.entityId` and shallow-merges them
/// into the arguments.
#[derive(Clone)]
pub struct FeatureStoreEnrichment {
    name: String,
    store_name: String,
    params: Value,
    entity_path: String,
    store: Arc<dyn FeatureStore>,
}

impl FeatureStoreEnrichment {
    pub fn new(store_name: impl Into<String>, store: Arc<dyn FeatureStore>) -> Self {
        let store_name = store_name.into();
        Self {
            name: store_name.clone(),
            store_name,
            params: Value::Null,
            entity_path: "entityId".to_string(),
            store,
        }
    }

    /// Store-specific lookup parameters (feature list, namespace...).
    pub fn with_params(mut self, params: Value) -> Self {
        self.params = params;
        self
    }

    /// Read the entity id from another argument path.
    pub fn with_entity_path(mut self, path: impl Into<String>) -> Self {
        self.entity_path = path.into();
        self
    }

    async fn run(&self, ctx: &CallContext, mut args: Value) -> Result<Value> {
        let entity_id = get_path(&args, &self.entity_path)
            .filter(|v| !v.is_null())
            .cloned()
            .ok_or_else(|| EngineError::Enrichment {
                step: self.name.clone(),
                message: format!("missing entity id at '{}'", self.entity_path),
            })?;

        let features = ctx
            .external(
                self.store
                    .get_online_features(&self.store_name, &self.params, &entity_id),
            )
            .await?;
        if !features.is_object() {
            return Err(EngineError::Enrichment {
                step: self.name.clone(),
                message: "feature store returned a non-object record".to_string(),
            });
        }
        tracing::debug!(store = %self.store_name, entity = %entity_id, "merged online features");
        shallow_merge(&mut args, features);
        Ok(args)
    }
}

impl EnrichmentStep for FeatureStoreEnrichment {
    fn stage(&self) -> Stage {
        Stage::FeatureStoreEnrichment
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn enrich<'a>(&'a self, ctx: &'a CallContext, args: Value) -> BoxFut<'a, Result<Value>> {
        Box::pin(self.run(ctx, args))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;

    struct StaticStore;

    #[async_trait]
    impl FeatureStore for StaticStore {
        async fn get_online_features(
            &self,
            store_name: &str,
            _params: &Value,
            entity_id: &Value,
        ) -> Result<Value> {
            Ok(json!({"store": store_name, "tier": "gold", "id": entity_id}))
        }
    }

    #[tokio::test]
    async fn test_features_shallow_merged() {
        let step = FeatureStoreEnrichment::new("customers", Arc::new(StaticStore));
        let out = step
            .enrich(&CallContext::new(), json!({"entityId": 42, "tier": "silver"}))
            .await
            .unwrap();
        assert_eq!(out["tier"], "gold");
        assert_eq!(out["store"], "customers");
        assert_eq!(out["id"], 42);
        assert_eq!(out["entityId"], 42);
    }

    #[tokio::test]
    async fn test_missing_entity_id() {
        let step = FeatureStoreEnrichment::new("customers", Arc::new(StaticStore));
        let err = step
            .enrich(&CallContext::new(), json!({"name": "Ada"}))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Enrichment { .. }));
    }
}
