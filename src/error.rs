use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One failed keyword inside a [`SchemaReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaViolation {
    /// JSON pointer into the validated instance (e.g. `/name`).
    pub instance_path: String,
    /// JSON pointer into the schema keyword that rejected the instance.
    pub schema_path: String,
    /// Human-readable validator message.
    pub message: String,
}

/// Full validator result carried by [`EngineError::Schema`].
///
/// Kept structured so callers can render field-level diagnostics instead of
/// a single flattened message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaReport {
    pub valid: bool,
    pub errors: Vec<SchemaViolation>,
}

impl SchemaReport {
    /// A report with no violations.
    pub fn ok() -> Self {
        Self {
            valid: true,
            errors: Vec::new(),
        }
    }

    fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|e| {
                if e.instance_path.is_empty() {
                    e.message.clone()
                } else {
                    format!("{}: {}", e.instance_path, e.message)
                }
            })
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Errors produced by the engine and its components.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Arguments (function-level or template-level) failed JSON Schema validation.
    #[error("{context} arguments failed schema validation: {}", .report.summary())]
    Schema {
        /// Which component validated the arguments (function or template name).
        context: String,
        report: SchemaReport,
    },

    /// Business-rule failure inside the function chain: no implementation,
    /// unsupported model type, missing batch endpoint and similar.
    #[error("semantic function error: {0}")]
    SemanticFunction(String),

    /// An input or output guardrail rejected content.
    #[error("guardrail '{key}' rejected content: {message}")]
    Guardrail { key: String, message: String },

    /// An output parser rejected content.
    #[error("parser '{key}' rejected content: {message}")]
    Parser { key: String, message: String },

    /// Graph-structure failure in a composition.
    #[error("composition error: {0}")]
    Composition(String),

    /// A declarative mapping could not be applied to its input.
    #[error("mapping error: {0}")]
    Mapping(String),

    /// An enrichment step could not inject its context.
    #[error("enrichment step '{step}' failed: {message}")]
    Enrichment { step: String, message: String },

    /// Low-level HTTP transport failure.
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON (de)serialization failed.
    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP error with status code and response body.
    #[error("HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The call was cancelled via the cancellation flag.
    #[error("call was cancelled")]
    Cancelled,

    /// An external call did not finish before the context deadline.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Invalid configuration detected at build time.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Catch-all for other errors.
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Other(err.to_string())
    }
}

impl EngineError {
    /// Stable, lowercase tag naming the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Schema { .. } => "schema",
            EngineError::SemanticFunction(_) => "semantic_function",
            EngineError::Guardrail { .. } => "guardrail",
            EngineError::Parser { .. } => "parser",
            EngineError::Composition(_) => "composition",
            EngineError::Mapping(_) => "mapping",
            EngineError::Enrichment { .. } => "enrichment",
            EngineError::Request(_) => "request",
            EngineError::Json(_) => "json",
            EngineError::HttpError { .. } => "http",
            EngineError::Cancelled => "cancelled",
            EngineError::DeadlineExceeded => "deadline_exceeded",
            EngineError::InvalidConfig(_) => "invalid_config",
            EngineError::Other(_) => "other",
        }
    }

    /// Normalize into the `errors: [{message}]` shape reported to callbacks.
    ///
    /// Schema failures keep their structured report in `details`.
    pub fn to_records(&self) -> Vec<ErrorRecord> {
        let details = match self {
            EngineError::Schema { report, .. } => serde_json::to_value(report).ok(),
            EngineError::HttpError { status, .. } => Some(serde_json::json!({ "status": status })),
            _ => None,
        };
        vec![ErrorRecord {
            message: self.to_string(),
            kind: self.kind().to_string(),
            details,
        }]
    }
}

/// A normalized error entry attached to `End`/`Error` events and trace records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ErrorRecord {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: kind.into(),
            details: None,
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
