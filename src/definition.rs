//! Stored composition definitions.
//!
//! Compositions are usually kept as data (JSON, or YAML with the `yaml`
//! feature) and turned into a [`Composition`] at load time, with function
//! nodes resolved by name against a [`FunctionRegistry`].
//!
//! ```json
//! {
//!   "name": "support-reply",
//!   "nodes": [
//!     { "id": "in",   "type": "requestNode", "argsSchema": { "type": "object" } },
//!     { "id": "tone", "type": "functionNode", "function": "classify_tone" },
//!     { "id": "out",  "type": "outputNode" }
//!   ],
//!   "edges": [
//!     { "source": "in", "target": "tone" },
//!     { "source": "tone", "target": "out" }
//!   ]
//! }
//! ```

use crate::composition::{Composition, Edge, Node};
use crate::error::{EngineError, Result};
use crate::function::SemanticFunction;
use crate::mapping::Mapping;
use crate::schema::ArgsSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// Serialized form of a [`Composition`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionDef {
    pub name: String,
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub edges: Vec<EdgeDef>,
}

/// Serialized form of a [`Node`], tagged by `type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum NodeDef {
    RequestNode {
        id: String,
        #[serde(
            default,
            rename = "argsSchema",
            skip_serializing_if = "Option::is_none"
        )]
        args_schema: Option<Value>,
    },
    FunctionNode {
        id: String,
        /// Registry name of the bound function.
        function: String,
    },
    MapperNode {
        id: String,
        mapping: Mapping,
    },
    JoinerNode {
        id: String,
    },
    OutputNode {
        id: String,
    },
}

impl NodeDef {
    pub fn id(&self) -> &str {
        match self {
            NodeDef::RequestNode { id, .. }
            | NodeDef::FunctionNode { id, .. }
            | NodeDef::MapperNode { id, .. }
            | NodeDef::JoinerNode { id }
            | NodeDef::OutputNode { id } => id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeDef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub source: String,
    pub target: String,
}

impl CompositionDef {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    #[cfg(feature = "yaml")]
    pub fn from_yaml(text: &str) -> Result<Self> {
        serde_yaml::from_str(text)
            .map_err(|e| EngineError::InvalidConfig(format!("invalid composition YAML: {e}")))
    }
}

/// Semantic functions addressable by name.
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, Arc<SemanticFunction>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function under its own name, replacing any previous one.
    pub fn register(&mut self, function: Arc<SemanticFunction>) -> &mut Self {
        self.functions.insert(function.name().to_string(), function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<SemanticFunction>> {
        self.functions.get(name)
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

impl Composition {
    /// Build (and validate) a composition from its stored definition.
    pub fn from_def(def: &CompositionDef, registry: &FunctionRegistry) -> Result<Self> {
        let nodes = def
            .nodes
            .iter()
            .map(|node| build_node(node, registry))
            .collect::<Result<Vec<_>>>()?;
        let edges = def
            .edges
            .iter()
            .map(|e| {
                let edge = Edge::new(&e.source, &e.target);
                match &e.id {
                    Some(id) => edge.with_id(id),
                    None => edge,
                }
            })
            .collect();
        Composition::new(&def.name, nodes, edges)
    }
}

fn build_node(def: &NodeDef, registry: &FunctionRegistry) -> Result<Node> {
    Ok(match def {
        NodeDef::RequestNode { id, args_schema } => {
            let node = Node::request(id);
            match args_schema {
                Some(schema) => node.with_schema(ArgsSchema::new(schema.clone())?),
                None => node,
            }
        }
        NodeDef::FunctionNode { id, function } => {
            let bound = registry.get(function).ok_or_else(|| {
                EngineError::InvalidConfig(format!(
                    "node '{id}' references unknown function '{function}'"
                ))
            })?;
            Node::function(id, bound.clone())
        }
        NodeDef::MapperNode { id, mapping } => Node::mapper(id, mapping.clone()),
        NodeDef::JoinerNode { id } => Node::joiner(id),
        NodeDef::OutputNode { id } => Node::output(id),
    })
}
