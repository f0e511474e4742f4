//! Scripted chat client for tests.
//!
//! Responses are popped from a queue; when the queue is empty the default
//! response repeats. Every request is recorded so tests can assert on call
//! counts, memory keys, and tool attachment.

use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::chat::{ChatClient, ChatRequest};
use crate::error::LlmError;

/// A recorded prompt, reduced to the fields tests assert on.
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub memory_key: String,
    pub user_text: String,
    pub context_count: usize,
    pub had_tool: bool,
    pub streaming: bool,
}

#[derive(Default)]
pub struct MockChatClient {
    responses: Mutex<VecDeque<String>>,
    default_response: Mutex<String>,
    calls: Mutex<Vec<RecordedCall>>,
    tool_args: Mutex<Option<serde_json::Value>>,
}

impl MockChatClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one response; queued responses are consumed in order.
    pub fn push_response(&self, response: impl Into<String>) {
        self.responses
            .lock()
            .expect("mock poisoned")
            .push_back(response.into());
    }

    /// Response returned once the queue is exhausted.
    pub fn set_default_response(&self, response: impl Into<String>) {
        *self.default_response.lock().expect("mock poisoned") = response.into();
    }

    /// When set, any attached tool is invoked with these arguments before
    /// responding, the way a real model would call it.
    pub fn invoke_tool_with(&self, args: serde_json::Value) {
        *self.tool_args.lock().expect("mock poisoned") = Some(args);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().expect("mock poisoned").clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().expect("mock poisoned").len()
    }

    fn next_response(&self) -> String {
        let mut responses = self.responses.lock().expect("mock poisoned");
        responses
            .pop_front()
            .unwrap_or_else(|| self.default_response.lock().expect("mock poisoned").clone())
    }

    fn record(&self, request: &ChatRequest, streaming: bool) {
        self.calls.lock().expect("mock poisoned").push(RecordedCall {
            memory_key: request.memory_key.clone(),
            user_text: request.user_text.clone(),
            context_count: request.context_documents.len(),
            had_tool: request.tool.is_some(),
            streaming,
        });
    }

    async fn maybe_invoke_tool(&self, request: &ChatRequest) {
        let args = self.tool_args.lock().expect("mock poisoned").clone();
        if let (Some(args), Some(tool)) = (args, &request.tool) {
            // Tool failures are the model layer's concern; the mock ignores
            // them like a model would fold them into its answer.
            let _ = tool.invoke(args).await;
        }
    }
}

#[async_trait::async_trait]
impl ChatClient for MockChatClient {
    async fn prompt(&self, request: ChatRequest) -> Result<String, LlmError> {
        self.record(&request, false);
        self.maybe_invoke_tool(&request).await;
        Ok(self.next_response())
    }

    async fn prompt_streaming(
        &self,
        request: ChatRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<String, LlmError> {
        self.record(&request, true);
        self.maybe_invoke_tool(&request).await;
        let response = self.next_response();
        // Stream in small chunks so callers exercise their chunk handling.
        let chars: Vec<char> = response.chars().collect();
        for chunk in chars.chunks(8) {
            let _ = tx.send(chunk.iter().collect()).await;
        }
        Ok(response)
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_then_default() {
        let mock = MockChatClient::new();
        mock.push_response("first");
        mock.set_default_response("fallback");

        let r1 = mock.prompt(ChatRequest::new("q", "k")).await.unwrap();
        let r2 = mock.prompt(ChatRequest::new("q", "k")).await.unwrap();
        let r3 = mock.prompt(ChatRequest::new("q", "k")).await.unwrap();
        assert_eq!(r1, "first");
        assert_eq!(r2, "fallback");
        assert_eq!(r3, "fallback");
        assert_eq!(mock.call_count(), 3);
    }

    #[tokio::test]
    async fn test_streaming_chunks_concatenate() {
        let mock = MockChatClient::new();
        mock.push_response("a response that spans chunks");

        let (tx, mut rx) = mpsc::channel(32);
        let full = mock
            .prompt_streaming(ChatRequest::new("q", "k"), tx)
            .await
            .unwrap();

        let mut collected = String::new();
        while let Some(chunk) = rx.recv().await {
            collected.push_str(&chunk);
        }
        assert_eq!(full, "a response that spans chunks");
        assert_eq!(collected, full);
        assert!(mock.calls()[0].streaming);
    }
}
