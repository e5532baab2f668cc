//! Mock transport for testing without a live LLM.
//!
//! [`MockTransport`] returns pre-configured responses in order and records
//! every request it receives, allowing deterministic tests of the whole
//! function chain.
//!
//! # Example
//!
//! ```
//! use semantic_pipeline::model::MockTransport;
//!
//! let mock = MockTransport::new(vec!["Hello, world!".to_string()]);
//! ```

use super::transport::{
    ChatCompletion, ChatRequest, ChatTransport, CompletionRequest, CompletionTransport,
    TextChoice, TextCompletion,
};
use crate::error::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A test transport that returns canned responses in order.
///
/// Cycles back to the beginning when all responses have been consumed.
#[derive(Debug)]
pub struct MockTransport {
    responses: Vec<String>,
    index: AtomicUsize,
    chat_requests: Mutex<Vec<ChatRequest>>,
    completion_requests: Mutex<Vec<CompletionRequest>>,
}

impl MockTransport {
    /// Create a mock transport with the given canned responses.
    ///
    /// Responses are returned in order. When exhausted, cycles from the beginning.
    pub fn new(responses: Vec<String>) -> Self {
        assert!(!responses.is_empty(), "MockTransport requires at least one response");
        Self {
            responses,
            index: AtomicUsize::new(0),
            chat_requests: Mutex::new(Vec::new()),
            completion_requests: Mutex::new(Vec::new()),
        }
    }

    /// Create a mock that always returns the same response.
    pub fn fixed(response: impl Into<String>) -> Self {
        Self::new(vec![response.into()])
    }

    /// Chat requests received so far.
    pub fn chat_requests(&self) -> Vec<ChatRequest> {
        self.chat_requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Completion requests received so far.
    pub fn completion_requests(&self) -> Vec<CompletionRequest> {
        self.completion_requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    fn next_response(&self) -> String {
        let idx = self.index.fetch_add(1, Ordering::Relaxed) % self.responses.len();
        self.responses[idx].clone()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn chat(&self, request: &ChatRequest) -> Result<Value> {
        if let Ok(mut seen) = self.chat_requests.lock() {
            seen.push(request.clone());
        }
        let mut completion = ChatCompletion::from_text(self.next_response());
        completion.model = Some(request.model.clone());
        Ok(serde_json::to_value(completion)?)
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[async_trait]
impl CompletionTransport for MockTransport {
    async fn complete(&self, request: &CompletionRequest) -> Result<TextCompletion> {
        if let Ok(mut seen) = self.completion_requests.lock() {
            seen.push(request.clone());
        }
        Ok(TextCompletion {
            id: None,
            model: Some(request.model.clone()),
            choices: vec![TextChoice {
                index: 0,
                text: self.next_response(),
                finish_reason: Some("stop".into()),
                extra: Map::new(),
            }],
            usage: None,
            extra: Map::new(),
        })
    }

    fn name(&self) -> &'static str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::model::{response_content, ModelParams};

    fn chat_request() -> ChatRequest {
        ChatRequest {
            provider: None,
            model: "test".into(),
            messages: vec![Message::user("hi")],
            params: ModelParams::new(),
        }
    }

    #[tokio::test]
    async fn test_mock_cycles_responses() {
        let mock = MockTransport::new(vec!["first".into(), "second".into()]);
        let r1 = mock.chat(&chat_request()).await.unwrap();
        let r2 = mock.chat(&chat_request()).await.unwrap();
        let r3 = mock.chat(&chat_request()).await.unwrap();
        assert_eq!(response_content(&r1), Some("first"));
        assert_eq!(response_content(&r2), Some("second"));
        assert_eq!(response_content(&r3), Some("first")); // cycles
        assert_eq!(mock.chat_requests().len(), 3);
    }

    #[tokio::test]
    async fn test_mock_completion() {
        let mock = MockTransport::fixed("done");
        let request = CompletionRequest {
            provider: None,
            model: "davinci".into(),
            prompt: "user: hi\n\nassistant:".into(),
            params: ModelParams::new(),
        };
        let resp = mock.complete(&request).await.unwrap();
        assert_eq!(resp.choices[0].text, "done");
        assert_eq!(mock.completion_requests()[0].model, "davinci");
    }
}
