use semantic_pipeline::model::{response_content, ChatModel, MockTransport};
use semantic_pipeline::{
    ArgsSchema, CallContext, FunctionCall, LoggingCallback, Message, PromptEnrichmentPipeline,
    PromptTemplate, SemanticFunction, SemanticFunctionImplementation, Tracer,
};
use serde_json::json;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Canned replies stand in for a live provider
    let transport = Arc::new(MockTransport::fixed("Hello Ada, nice to meet you!"));
    let model = ChatModel::new("gpt-4o-mini", transport.clone());

    let template = PromptTemplate::new(
        "greet",
        vec![
            Message::system("You are a friendly assistant."),
            Message::user("Say hi to {name}."),
        ],
    );
    let greet = SemanticFunction::new("greet")
        .with_description("Greets a person by name")
        .with_schema(ArgsSchema::new(json!({
            "type": "object",
            "required": ["name"],
            "properties": {"name": {"type": "string"}}
        }))?)
        .implementation(
            SemanticFunctionImplementation::new(Arc::new(model))
                .with_enrichment(PromptEnrichmentPipeline::new(template))
                .default_implementation(true),
        );

    let tracer = Arc::new(Tracer::named("greet-demo"));
    let ctx = CallContext::builder()
        .callback(tracer.clone())
        .callback(Arc::new(LoggingCallback::new()))
        .build();

    let result = greet
        .call(&ctx, FunctionCall::new(json!({"name": "Ada"})))
        .await?;

    println!("Reply: {}", response_content(&result.response).unwrap_or("<none>"));
    println!("Metadata: {}", result.response_metadata);
    println!("Prompt sent:");
    for message in &transport.chat_requests()[0].messages {
        println!("  {}: {}", message.role.as_str(), message.content);
    }

    println!("\nTrace:\n{}", tracer.trace().to_json()?);

    // Invalid arguments never reach the model
    let err = greet
        .call(&CallContext::new(), FunctionCall::new(json!({"name": 42})))
        .await
        .unwrap_err();
    println!("\nRejected call: {err}");

    Ok(())
}
