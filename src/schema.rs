//! JSON Schema validation for function and template arguments.

use crate::error::{EngineError, Result, SchemaReport, SchemaViolation};
use jsonschema::Validator;
use serde_json::Value;
use std::sync::Arc;

/// A compiled JSON Schema.
///
/// Compiled once at construction; cloning shares the compiled validator.
#[derive(Clone)]
pub struct ArgsSchema {
    schema: Value,
    validator: Arc<Validator>,
}

impl ArgsSchema {
    /// Compile a schema. Fails with [`EngineError::InvalidConfig`] if the
    /// schema itself is malformed.
    pub fn new(schema: Value) -> Result<Self> {
        let validator = Validator::new(&schema)
            .map_err(|e| EngineError::InvalidConfig(format!("invalid JSON schema: {e}")))?;
        Ok(Self {
            schema,
            validator: Arc::new(validator),
        })
    }

    /// The raw schema document.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    /// Validate an instance and return the full report.
    pub fn report(&self, instance: &Value) -> SchemaReport {
        let errors: Vec<SchemaViolation> = self
            .validator
            .iter_errors(instance)
            .map(|e| SchemaViolation {
                instance_path: e.instance_path.to_string(),
                schema_path: e.schema_path.to_string(),
                message: e.to_string(),
            })
            .collect();
        SchemaReport {
            valid: errors.is_empty(),
            errors,
        }
    }

    /// Validate an instance, failing with [`EngineError::Schema`] on violation.
    ///
    /// `context` names the component doing the validation.
    pub fn validate(&self, context: &str, instance: &Value) -> Result<()> {
        let report = self.report(instance);
        if report.valid {
            return Ok(());
        }
        Err(EngineError::Schema {
            context: context.to_string(),
            report,
        })
    }
}

impl std::fmt::Debug for ArgsSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArgsSchema")
            .field("schema", &self.schema)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn name_schema() -> ArgsSchema {
        ArgsSchema::new(json!({
            "type": "object",
            "required": ["name"],
            "properties": { "name": { "type": "string" } }
        }))
        .unwrap()
    }

    #[test]
    fn test_valid_instance_passes() {
        let schema = name_schema();
        assert!(schema.validate("greet", &json!({"name": "Ada"})).is_ok());
        assert!(schema.report(&json!({"name": "Ada"})).valid);
    }

    #[test]
    fn test_invalid_instance_reports_every_violation() {
        let schema = ArgsSchema::new(json!({
            "type": "object",
            "required": ["name", "age"],
            "properties": { "name": { "type": "string" } }
        }))
        .unwrap();
        let err = schema.validate("greet", &json!({"name": 3})).unwrap_err();
        match err {
            EngineError::Schema { context, report } => {
                assert_eq!(context, "greet");
                assert!(!report.valid);
                assert_eq!(report.errors.len(), 2);
                assert!(report.errors.iter().any(|e| e.instance_path == "/name"));
            }
            other => panic!("expected schema error, got {other:?}"),
        }
    }

    #[test]
    fn test_malformed_schema_is_config_error() {
        let err = ArgsSchema::new(json!({"type": 12})).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConfig(_)));
    }
}
