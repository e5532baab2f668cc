//! Composition graphs.
//!
//! A [`Composition`] wires semantic functions and declarative mappers into
//! a directed graph with a single output node. Evaluation walks the graph
//! back to front: starting from the output node, every node first resolves
//! all of its sources (edges whose `target` is the node), deep-merges their
//! outputs in edge order (later sources win), then combines the merge
//! according to its kind.
//!
//! | node     | result                                                     |
//! |----------|------------------------------------------------------------|
//! | request  | the caller's arguments                                     |
//! | function | merged sources, deep-merged with the function's response   |
//! | mapper   | merged sources, deep-merged with the mapped value          |
//! | joiner   | merged sources                                             |
//! | output   | merged sources                                             |
//!
//! The graph is validated when it is built: exactly one output node, every
//! edge endpoint exists, no cycles.

use crate::callback::{Callback, Callbacks, Stage};
use crate::context::{BoxFut, CallContext};
use crate::error::{EngineError, Result};
use crate::function::{FunctionCall, SemanticFunction};
use crate::mapping::{apply_mapping, DataMapper, DeclarativeMapper, Mapping};
use crate::schema::ArgsSchema;
use crate::value::deep_merge;
use futures::future::try_join_all;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// What a node does with its merged sources.
#[derive(Clone)]
pub enum NodeKind {
    /// Entry point: yields the caller's arguments, validated against the
    /// schema when one is set.
    Request { schema: Option<ArgsSchema> },
    Function { function: Arc<SemanticFunction> },
    Mapper { mapping: Mapping },
    Joiner,
    Output,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Request { .. } => "requestNode",
            NodeKind::Function { .. } => "functionNode",
            NodeKind::Mapper { .. } => "mapperNode",
            NodeKind::Joiner => "joinerNode",
            NodeKind::Output => "outputNode",
        }
    }
}

/// A vertex of a composition graph.
#[derive(Clone)]
pub struct Node {
    pub id: String,
    pub kind: NodeKind,
}

impl Node {
    pub fn request(id: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Request { schema: None })
    }

    pub fn function(id: impl Into<String>, function: Arc<SemanticFunction>) -> Self {
        Self::new(id, NodeKind::Function { function })
    }

    pub fn mapper(id: impl Into<String>, mapping: Mapping) -> Self {
        Self::new(id, NodeKind::Mapper { mapping })
    }

    pub fn joiner(id: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Joiner)
    }

    pub fn output(id: impl Into<String>) -> Self {
        Self::new(id, NodeKind::Output)
    }

    fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
        }
    }

    /// Attach an argument schema. Only meaningful on request nodes.
    pub fn with_schema(mut self, schema: ArgsSchema) -> Self {
        if let NodeKind::Request { schema: slot } = &mut self.kind {
            *slot = Some(schema);
        }
        self
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.kind.as_str(), self.id)
    }
}

/// A directed dependency: `target` consumes `source`'s output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub id: String,
    pub source: String,
    pub target: String,
}

impl Edge {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{source}->{target}"),
            source,
            target,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// An executable graph of semantic functions and data transforms.
///
/// Every [`call`](Self::call) re-evaluates the whole graph; nothing is
/// cached between calls.
///
/// # Example
///
/// ```
/// use semantic_pipeline::composition::{Composition, Edge, Node};
/// use semantic_pipeline::mapping::Mapping;
///
/// let graph = Composition::new(
///     "rename",
///     vec![
///         Node::request("in"),
///         Node::mapper("map", Mapping::object([("title", Mapping::get("name"))])),
///         Node::output("out"),
///     ],
///     vec![Edge::new("in", "map"), Edge::new("map", "out")],
/// )
/// .unwrap();
/// assert_eq!(graph.output_id(), "out");
/// ```
#[derive(Clone)]
pub struct Composition {
    name: String,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
    output: String,
    mapper: Arc<dyn DataMapper>,
    concurrent_sources: bool,
    callbacks: Callbacks,
}

impl Composition {
    /// Build and validate a graph.
    pub fn new(name: impl Into<String>, nodes: Vec<Node>, edges: Vec<Edge>) -> Result<Self> {
        let name = name.into();
        let output = validate_graph(&name, &nodes, &edges)?;
        Ok(Self {
            name,
            nodes,
            edges,
            output,
            mapper: Arc::new(DeclarativeMapper),
            concurrent_sources: false,
            callbacks: Vec::new(),
        })
    }

    /// Replace the evaluator used by mapper nodes.
    pub fn with_mapper(mut self, mapper: Arc<dyn DataMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    /// Resolve a node's sources concurrently. Merge order stays the edge
    /// order either way.
    pub fn with_concurrent_sources(mut self, enabled: bool) -> Self {
        self.concurrent_sources = enabled;
        self
    }

    pub fn with_callback(mut self, callback: Arc<dyn Callback>) -> Self {
        self.callbacks.push(callback);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn output_id(&self) -> &str {
        &self.output
    }

    /// Evaluate the graph from its output node.
    ///
    /// `call.args` feeds every request node; the model key, model params,
    /// history and batch flag are forwarded to every function node.
    pub async fn call(&self, ctx: &CallContext, call: FunctionCall) -> Result<Value> {
        let ctx = ctx.with_callbacks(&self.callbacks);
        let input = call.snapshot();
        ctx.run_stage(
            Stage::Composition,
            &self.name,
            input,
            |ctx| async move { self.evaluate(&ctx, &self.output, &call).await },
            |result| result.clone(),
        )
        .await
    }

    fn node(&self, id: &str) -> Result<&Node> {
        self.nodes.iter().find(|n| n.id == id).ok_or_else(|| {
            EngineError::Composition(format!("node '{id}' not found in '{}'", self.name))
        })
    }

    fn sources<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.edges
            .iter()
            .filter(move |e| e.target == id)
            .map(|e| e.source.as_str())
    }

    fn evaluate<'a>(
        &'a self,
        ctx: &'a CallContext,
        id: &'a str,
        call: &'a FunctionCall,
    ) -> BoxFut<'a, Result<Value>> {
        Box::pin(async move {
            ctx.check_cancelled()?;
            let node = self.node(id)?;

            if let NodeKind::Request { schema } = &node.kind {
                if let Some(schema) = schema {
                    let instance = if call.is_batch {
                        call.args.get(0).unwrap_or(&Value::Null)
                    } else {
                        &call.args
                    };
                    schema.validate(id, instance)?;
                }
                return Ok(call.args.clone());
            }

            let sources: Vec<&str> = self.sources(id).collect();
            let outputs = if self.concurrent_sources {
                try_join_all(sources.iter().map(|&s| self.evaluate(ctx, s, call))).await?
            } else {
                let mut outputs = Vec::with_capacity(sources.len());
                for &source in &sources {
                    outputs.push(self.evaluate(ctx, source, call).await?);
                }
                outputs
            };

            let mut merged = Value::Object(Map::new());
            for output in outputs {
                deep_merge(&mut merged, output);
            }

            match &node.kind {
                NodeKind::Function { function } => {
                    let function_call = FunctionCall {
                        args: merged.clone(),
                        ..call.clone()
                    };
                    let result = function.call(ctx, function_call).await?;
                    deep_merge(&mut merged, result.response);
                    Ok(merged)
                }
                NodeKind::Mapper { mapping } => {
                    let input = merged.clone();
                    let mapped = ctx
                        .run_stage(
                            Stage::MapperNode,
                            id,
                            input,
                            |_| async {
                                apply_mapping(self.mapper.as_ref(), mapping, &merged, call.is_batch)
                            },
                            |mapped| mapped.clone(),
                        )
                        .await?;
                    deep_merge(&mut merged, mapped);
                    Ok(merged)
                }
                NodeKind::Joiner | NodeKind::Output | NodeKind::Request { .. } => Ok(merged),
            }
        })
    }
}

impl std::fmt::Debug for Composition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Composition")
            .field("name", &self.name)
            .field("nodes", &self.nodes)
            .field("edges", &self.edges)
            .field("concurrent_sources", &self.concurrent_sources)
            .finish()
    }
}

/// Check graph structure and return the output node id.
fn validate_graph(name: &str, nodes: &[Node], edges: &[Edge]) -> Result<String> {
    let mut ids = HashSet::new();
    for node in nodes {
        if !ids.insert(node.id.as_str()) {
            return Err(EngineError::Composition(format!(
                "duplicate node id '{}' in '{name}'",
                node.id
            )));
        }
    }

    let outputs: Vec<&Node> = nodes
        .iter()
        .filter(|n| matches!(n.kind, NodeKind::Output))
        .collect();
    let output = match outputs.as_slice() {
        [only] => only.id.clone(),
        [] => {
            return Err(EngineError::Composition(format!(
                "'{name}' has no output node"
            )))
        }
        many => {
            return Err(EngineError::Composition(format!(
                "'{name}' has {} output nodes, expected exactly one",
                many.len()
            )))
        }
    };

    for edge in edges {
        for endpoint in [&edge.source, &edge.target] {
            if !ids.contains(endpoint.as_str()) {
                return Err(EngineError::Composition(format!(
                    "edge '{}' references unknown node '{endpoint}'",
                    edge.id
                )));
            }
        }
    }

    if let Some(node) = find_cycle(nodes, edges) {
        return Err(EngineError::Composition(format!(
            "'{name}' contains a cycle through node '{node}'"
        )));
    }
    Ok(output)
}

#[derive(Clone, Copy, PartialEq)]
enum Mark {
    Visiting,
    Done,
}

/// Depth-first search along source edges; returns a node on a cycle.
fn find_cycle<'a>(nodes: &'a [Node], edges: &'a [Edge]) -> Option<&'a str> {
    let mut sources: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        sources
            .entry(edge.target.as_str())
            .or_default()
            .push(edge.source.as_str());
    }

    fn visit<'a>(
        id: &'a str,
        sources: &HashMap<&'a str, Vec<&'a str>>,
        marks: &mut HashMap<&'a str, Mark>,
    ) -> Option<&'a str> {
        match marks.get(id) {
            Some(Mark::Visiting) => return Some(id),
            Some(Mark::Done) => return None,
            None => {}
        }
        marks.insert(id, Mark::Visiting);
        for &source in sources.get(id).into_iter().flatten() {
            if let Some(found) = visit(source, sources, marks) {
                return Some(found);
            }
        }
        marks.insert(id, Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    nodes
        .iter()
        .find_map(|n| visit(n.id.as_str(), &sources, &mut marks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::callback::{Phase, RecordingCallback};
    use crate::implementation::SemanticFunctionImplementation;
    use crate::model::{Model, ModelRequest, ModelType};
    use async_trait::async_trait;
    use serde_json::json;
    use std::time::Duration;

    /// `api` model returning a fixed object after an optional delay.
    struct Fixed {
        key: String,
        reply: Value,
        delay_ms: u64,
    }

    #[async_trait]
    impl Model for Fixed {
        fn key(&self) -> &str {
            &self.key
        }

        fn model_type(&self) -> ModelType {
            ModelType::Api
        }

        async fn call(&self, _ctx: &CallContext, _request: ModelRequest) -> Result<Value> {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
            Ok(self.reply.clone())
        }
    }

    fn function(name: &str, reply: Value, delay_ms: u64) -> Arc<SemanticFunction> {
        Arc::new(
            SemanticFunction::new(name).implementation(SemanticFunctionImplementation::new(
                Arc::new(Fixed {
                    key: name.to_string(),
                    reply,
                    delay_ms,
                }),
            )),
        )
    }

    fn two_source_graph(delay_a: u64) -> Composition {
        Composition::new(
            "pair",
            vec![
                Node::request("in"),
                Node::function("a", function("a", json!({"shared": "A", "a": 1}), delay_a)),
                Node::function("b", function("b", json!({"shared": "B", "b": 2}), 0)),
                Node::joiner("join"),
                Node::output("out"),
            ],
            vec![
                Edge::new("in", "a"),
                Edge::new("in", "b"),
                Edge::new("a", "join"),
                Edge::new("b", "join"),
                Edge::new("join", "out"),
            ],
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_later_source_wins() {
        let graph = two_source_graph(0);
        let out = graph
            .call(&CallContext::new(), FunctionCall::new(json!({"q": "x"})))
            .await
            .unwrap();
        assert_eq!(out["shared"], "B");
        assert_eq!(out["a"], 1);
        assert_eq!(out["b"], 2);
        assert_eq!(out["q"], "x");
    }

    #[tokio::test]
    async fn test_concurrent_sources_keep_merge_order() {
        let graph = two_source_graph(30).with_concurrent_sources(true);
        let out = graph
            .call(&CallContext::new(), FunctionCall::new(json!({})))
            .await
            .unwrap();
        assert_eq!(out["shared"], "B");
    }

    #[tokio::test]
    async fn test_mapper_node_reports_and_merges() {
        let rec = Arc::new(RecordingCallback::new());
        let graph = Composition::new(
            "rename",
            vec![
                Node::request("in"),
                Node::mapper("map", Mapping::object([("title", Mapping::get("name"))])),
                Node::output("out"),
            ],
            vec![Edge::new("in", "map"), Edge::new("map", "out")],
        )
        .unwrap()
        .with_callback(rec.clone());

        let out = graph
            .call(&CallContext::new(), FunctionCall::new(json!({"name": "Ada"})))
            .await
            .unwrap();
        assert_eq!(out, json!({"name": "Ada", "title": "Ada"}));
        assert_eq!(
            rec.timeline(),
            vec![
                (Stage::Composition, Phase::Start),
                (Stage::MapperNode, Phase::Start),
                (Stage::MapperNode, Phase::End),
                (Stage::Composition, Phase::End),
            ]
        );
    }

    #[test]
    fn test_requires_exactly_one_output() {
        let none = Composition::new("g", vec![Node::request("in")], vec![]);
        assert!(matches!(none, Err(EngineError::Composition(_))));

        let two = Composition::new("g", vec![Node::output("a"), Node::output("b")], vec![]);
        assert!(matches!(two, Err(EngineError::Composition(_))));
    }

    #[test]
    fn test_rejects_unknown_endpoint() {
        let err = Composition::new(
            "g",
            vec![Node::output("out")],
            vec![Edge::new("ghost", "out")],
        )
        .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_rejects_cycle() {
        let err = Composition::new(
            "g",
            vec![Node::joiner("a"), Node::joiner("b"), Node::output("out")],
            vec![Edge::new("a", "b"), Edge::new("b", "a"), Edge::new("b", "out")],
        )
        .unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[tokio::test]
    async fn test_request_schema_failure_reported_by_composition() {
        let rec = Arc::new(RecordingCallback::new());
        let ctx = CallContext::builder().callback(rec.clone()).build();
        let schema = ArgsSchema::new(json!({"type": "object", "required": ["q"]})).unwrap();
        let graph = Composition::new(
            "g",
            vec![Node::request("in").with_schema(schema), Node::output("out")],
            vec![Edge::new("in", "out")],
        )
        .unwrap();

        let err = graph
            .call(&ctx, FunctionCall::new(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Schema { .. }));
        assert_eq!(
            rec.timeline(),
            vec![
                (Stage::Composition, Phase::Start),
                (Stage::Composition, Phase::Error),
                (Stage::Composition, Phase::End),
            ]
        );
    }

    #[tokio::test]
    async fn test_function_nodes_nest_under_composition() {
        let rec = Arc::new(RecordingCallback::new());
        let ctx = CallContext::builder().callback(rec.clone()).build();
        two_source_graph(0)
            .call(&ctx, FunctionCall::new(json!({})))
            .await
            .unwrap();

        let events = rec.events();
        let root = events[0].span;
        let nested: Vec<_> = events
            .iter()
            .filter(|e| e.stage == Stage::SemanticFunction && e.phase == Phase::Start)
            .collect();
        assert_eq!(nested.len(), 2);
        assert!(nested.iter().all(|e| e.parent == Some(root)));
    }
}
