use semantic_pipeline::model::{response_content, ChatModel, MockTransport};
use semantic_pipeline::{
    CallContext, Composition, CompositionDef, FunctionCall, FunctionRegistry, Message,
    PromptEnrichmentPipeline, PromptTemplate, SemanticFunction, SemanticFunctionImplementation,
    Tracer,
};
use serde_json::json;
use std::sync::Arc;

const GRAPH: &str = r#"{
    "name": "welcome",
    "nodes": [
        {"id": "in", "type": "requestNode", "argsSchema": {"type": "object", "required": ["user"]}},
        {"id": "name", "type": "mapperNode", "mapping": {"object": {
            "name": {"transform": {"op": "uppercase", "input": {"get": "user.first"}}}
        }}},
        {"id": "greet", "type": "functionNode", "function": "greet"},
        {"id": "out", "type": "outputNode"}
    ],
    "edges": [
        {"source": "in", "target": "name"},
        {"source": "name", "target": "greet"},
        {"source": "greet", "target": "out"}
    ]
}"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let transport = Arc::new(MockTransport::fixed("Welcome aboard, ADA!"));
    let template = PromptTemplate::new("greet", vec![Message::user("Welcome {name}.")]);
    let greet = SemanticFunction::new("greet").implementation(
        SemanticFunctionImplementation::new(Arc::new(ChatModel::new("gpt-4o-mini", transport)))
            .with_enrichment(PromptEnrichmentPipeline::new(template)),
    );

    let mut registry = FunctionRegistry::new();
    registry.register(Arc::new(greet));

    let def = CompositionDef::from_json(GRAPH)?;
    let graph = Composition::from_def(&def, &registry)?.with_concurrent_sources(true);
    println!(
        "Loaded '{}' with {} nodes, output node '{}'",
        graph.name(),
        graph.nodes().len(),
        graph.output_id()
    );

    let tracer = Arc::new(Tracer::new());
    let ctx = CallContext::builder().callback(tracer.clone()).build();
    let out = graph
        .call(&ctx, FunctionCall::new(json!({"user": {"first": "Ada"}})))
        .await?;

    println!("Mapped name: {}", out["name"]);
    println!("Reply: {}", response_content(&out).unwrap_or("<none>"));

    let trace = tracer.trace();
    println!("\nTrace '{}':", trace.name);
    for record in &trace.trace {
        print_record(record, 1);
    }
    Ok(())
}

fn print_record(record: &semantic_pipeline::TraceRecord, depth: usize) {
    println!(
        "{}{} {} ({:?} ms)",
        "  ".repeat(depth),
        record.step_type,
        record.name,
        record.duration_ms
    );
    for child in &record.children {
        print_record(child, depth + 1);
    }
}
