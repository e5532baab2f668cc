//! End-to-end flows through functions, enrichment, models and compositions.

use async_trait::async_trait;
use semantic_pipeline::model::{response_content, ChatModel, MockTransport};
use semantic_pipeline::services::{SearchHit, SearchService};
use semantic_pipeline::{
    ArgsSchema, CallContext, Composition, Edge, EngineError, FunctionCall, Mapping, Message, Node,
    Phase, PromptEnrichmentPipeline, PromptTemplate, RecordingCallback, SearchQuery,
    SemanticFunction, SemanticFunctionImplementation, SemanticSearchEnrichment, Stage, Tracer,
};
use serde_json::{json, Value};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio_test::{assert_err, assert_ok};

fn greet(mock: Arc<MockTransport>) -> SemanticFunction {
    SemanticFunction::new("greet")
        .with_schema(
            ArgsSchema::new(json!({
                "type": "object",
                "required": ["name"],
                "properties": {"name": {"type": "string"}}
            }))
            .unwrap(),
        )
        .implementation(
            SemanticFunctionImplementation::new(Arc::new(ChatModel::new("gpt-4o", mock)))
                .default_implementation(true),
        )
}

struct Docs(&'static str);

#[async_trait]
impl SearchService for Docs {
    async fn search(&self, _index: &str, _query: &str) -> semantic_pipeline::Result<Vec<SearchHit>> {
        Ok(vec![SearchHit::new(self.0)])
    }
}

#[tokio::test]
async fn greet_reports_function_and_model_events_in_order() {
    let rec = Arc::new(RecordingCallback::new());
    let ctx = CallContext::builder().callback(rec.clone()).build();
    let function = greet(Arc::new(MockTransport::fixed("Hi {name}")));

    let result = assert_ok!(
        function
            .call(&ctx, FunctionCall::new(json!({"name": "Ada"})))
            .await
    );
    assert_eq!(response_content(&result.response), Some("Hi {name}"));

    let events = rec.events();
    assert!(events.iter().all(|e| e.is_ok()));
    let outer: Vec<(Stage, Phase)> = events
        .iter()
        .filter(|e| matches!(e.stage, Stage::SemanticFunction | Stage::Model))
        .map(|e| (e.stage, e.phase))
        .collect();
    assert_eq!(
        outer,
        vec![
            (Stage::SemanticFunction, Phase::Start),
            (Stage::Model, Phase::Start),
            (Stage::Model, Phase::End),
            (Stage::SemanticFunction, Phase::End),
        ]
    );
}

#[tokio::test]
async fn tracer_nests_function_implementation_and_model() {
    let tracer = Arc::new(Tracer::named("greet-run"));
    let ctx = CallContext::builder().callback(tracer.clone()).build();
    greet(Arc::new(MockTransport::fixed("Hi")))
        .call(&ctx, FunctionCall::new(json!({"name": "Ada"})))
        .await
        .unwrap();

    let trace = tracer.trace();
    assert_eq!(trace.name, "greet-run");
    assert_eq!(trace.trace.len(), 1);
    let root = &trace.trace[0];
    assert_eq!(root.step_type, Stage::SemanticFunction);
    assert!(root.is_complete());
    let implementation = &root.children[0];
    assert_eq!(implementation.step_type, Stage::SemanticFunctionImplementation);
    assert_eq!(implementation.children[0].step_type, Stage::Model);

    let doc: Value = serde_json::from_str(&trace.to_json().unwrap()).unwrap();
    assert_eq!(doc["trace"][0]["type"], "semanticFunction");
    assert_eq!(doc["trace"][0]["children"][0]["children"][0]["type"], "model");
}

#[tokio::test]
async fn shared_function_serves_concurrent_calls_with_separate_traces() {
    let function = Arc::new(greet(Arc::new(MockTransport::fixed("Hi"))));
    let tracers: Vec<Arc<Tracer>> = (0..4).map(|_| Arc::new(Tracer::new())).collect();

    let calls = tracers.iter().enumerate().map(|(i, tracer)| {
        let function = function.clone();
        let ctx = CallContext::builder().callback(tracer.clone()).build();
        async move {
            function
                .call(&ctx, FunctionCall::new(json!({"name": format!("user-{i}")})))
                .await
        }
    });
    for result in futures::future::join_all(calls).await {
        result.unwrap();
    }

    for (i, tracer) in tracers.iter().enumerate() {
        let trace = tracer.trace();
        assert_eq!(trace.trace.len(), 1);
        assert_eq!(trace.trace[0].input["args"]["name"], format!("user-{i}"));
        assert!(trace.trace[0].find(Stage::Model).is_some());
    }
}

#[tokio::test]
async fn search_context_is_appended_before_rendering() {
    let mock = Arc::new(MockTransport::fixed("answer"));
    let template = PromptTemplate::new(
        "qa",
        vec![
            Message::system("Use this context:\n{context}"),
            Message::user("{question}"),
        ],
    );
    let pipeline = PromptEnrichmentPipeline::new(template).step(Arc::new(
        SemanticSearchEnrichment::new("handbook", Arc::new(Docs("Y")))
            .with_query(SearchQuery::Path("question".into())),
    ));
    let function = SemanticFunction::new("qa").implementation(
        SemanticFunctionImplementation::new(Arc::new(ChatModel::new("gpt-4o", mock.clone())))
            .with_enrichment(pipeline),
    );

    function
        .call(
            &CallContext::new(),
            FunctionCall::new(json!({"question": "Q?", "context": "X"})),
        )
        .await
        .unwrap();

    let sent = &mock.chat_requests()[0].messages;
    assert_eq!(sent[0].content, "Use this context:\nX\n\nY");
    assert_eq!(sent[1].content, "Q?");
}

#[tokio::test]
async fn composition_feeds_mapped_args_into_function() {
    let mock = Arc::new(MockTransport::fixed("Hi Ada"));
    let graph = Composition::new(
        "welcome",
        vec![
            Node::request("in"),
            Node::mapper("rename", Mapping::object([("name", Mapping::get("user.first"))])),
            Node::function("greet", Arc::new(greet(mock.clone()))),
            Node::output("out"),
        ],
        vec![
            Edge::new("in", "rename"),
            Edge::new("rename", "greet"),
            Edge::new("greet", "out"),
        ],
    )
    .unwrap();

    let rec = Arc::new(RecordingCallback::new());
    let ctx = CallContext::builder().callback(rec.clone()).build();
    let out = graph
        .call(&ctx, FunctionCall::new(json!({"user": {"first": "Ada"}})))
        .await
        .unwrap();

    assert_eq!(out["name"], "Ada");
    assert_eq!(response_content(&out), Some("Hi Ada"));
    assert_eq!(mock.chat_requests()[0].messages, vec![Message::user("Ada")]);

    let timeline = rec.timeline();
    assert_eq!(timeline.first(), Some(&(Stage::Composition, Phase::Start)));
    assert_eq!(timeline.last(), Some(&(Stage::Composition, Phase::End)));
}

#[tokio::test]
async fn cancelled_call_makes_no_model_request() {
    let mock = Arc::new(MockTransport::fixed("unused"));
    let ctx = CallContext::builder()
        .cancellation(Some(Arc::new(AtomicBool::new(true))))
        .build();
    let err = assert_err!(
        greet(mock.clone())
            .call(&ctx, FunctionCall::new(json!({"name": "Ada"})))
            .await
    );
    assert!(matches!(err, EngineError::Cancelled));
    assert!(mock.chat_requests().is_empty());
}
