//! OpenAI-compatible chat client.
//!
//! Works against any `/v1/chat/completions` endpoint (Groq, Ollama, vLLM,
//! OpenAI itself). Supports SSE streaming and a single bounded tool
//! round-trip: when the model requests the attached tool, the tool runs, its
//! output (or error) is fed back, and the follow-up response is the answer.

use futures::StreamExt;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::chat::memory::{ChatMessage, ConversationMemory, MessageRole};
use crate::chat::{ChatClient, ChatRequest};
use crate::error::LlmError;
use crate::tool::Tool;
use crate::types::Document;

pub struct OpenAiCompatibleChat {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    temperature: f32,
    max_tokens: Option<usize>,
    memory: Arc<ConversationMemory>,
}

impl OpenAiCompatibleChat {
    pub fn new(
        base_url: String,
        model: String,
        api_key: Option<String>,
        temperature: f32,
        max_tokens: Option<usize>,
        memory: Arc<ConversationMemory>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            api_key,
            temperature,
            max_tokens,
            memory,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url)
    }

    /// Render the grounding documents into one system message.
    fn context_block(documents: &[Document]) -> String {
        let mut block = String::from(
            "Use the following context documents to ground your answer:\n",
        );
        for (i, doc) in documents.iter().enumerate() {
            block.push_str(&format!("\n{}. {}\n{}\n", i + 1, doc.display_title(), doc.text));
        }
        block
    }

    fn build_messages(&self, request: &ChatRequest) -> Vec<Value> {
        let mut messages = Vec::new();
        if let Some(system) = &request.system_prompt {
            messages.push(json!({"role": "system", "content": system}));
        }
        if !request.context_documents.is_empty() {
            messages.push(json!({
                "role": "system",
                "content": Self::context_block(&request.context_documents),
            }));
        }
        for msg in self.memory.history(&request.memory_key) {
            messages.push(json!({"role": msg.role.as_str(), "content": msg.content}));
        }
        messages.push(json!({"role": "user", "content": request.user_text}));
        messages
    }

    fn tool_payload(tool: &dyn Tool) -> Value {
        json!([{
            "type": "function",
            "function": {
                "name": tool.name(),
                "description": tool.description(),
                "parameters": tool.parameters_schema(),
            },
        }])
    }

    fn request_body(&self, messages: &[Value], tool: Option<&Arc<dyn Tool>>, stream: bool) -> Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
            "stream": stream,
        });
        if let Some(max_tokens) = self.max_tokens {
            body["max_tokens"] = json!(max_tokens);
        }
        if let Some(tool) = tool {
            body["tools"] = Self::tool_payload(tool.as_ref());
        }
        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response, LlmError> {
        let mut req = self.client.post(self.completions_url()).json(body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.map_err(|e| LlmError::Connection {
            message: e.to_string(),
        })?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(LlmError::ApiRequest {
                message: format!("{status}: {}", crate::rag::text::truncate(&text, 300)),
            });
        }
        Ok(resp)
    }

    async fn post_json(&self, body: &Value) -> Result<Value, LlmError> {
        let resp = self.post(body).await?;
        resp.json().await.map_err(|e| LlmError::ResponseParse {
            message: e.to_string(),
        })
    }

    /// Run the model's requested tool call and append the assistant turn plus
    /// the tool result to `messages`. Invocation failures are reported back
    /// to the model as the tool output; the model decides how to react.
    async fn run_tool_round(
        tool: &Arc<dyn Tool>,
        message: &Value,
        messages: &mut Vec<Value>,
    ) -> bool {
        let Some(calls) = message.get("tool_calls").and_then(|c| c.as_array()) else {
            return false;
        };
        let Some(call) = calls.first() else {
            return false;
        };

        let call_id = call
            .get("id")
            .and_then(|i| i.as_str())
            .unwrap_or("call-0")
            .to_string();
        let args_raw = call
            .pointer("/function/arguments")
            .and_then(|a| a.as_str())
            .unwrap_or("{}");
        let args: Value = serde_json::from_str(args_raw).unwrap_or_else(|_| json!({}));

        let output = match tokio::time::timeout(tool.timeout(), tool.invoke(args)).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => {
                warn!(tool = tool.name(), error = %e, "Tool invocation failed");
                format!("Tool error: {e}")
            }
            Err(_) => {
                warn!(tool = tool.name(), "Tool invocation timed out");
                format!(
                    "Tool error: '{}' timed out after {}s",
                    tool.name(),
                    tool.timeout().as_secs()
                )
            }
        };

        messages.push(json!({
            "role": "assistant",
            "content": message.get("content").and_then(|c| c.as_str()).unwrap_or(""),
            "tool_calls": calls,
        }));
        messages.push(json!({
            "role": "tool",
            "tool_call_id": call_id,
            "content": output,
        }));
        true
    }

    fn message_content(body: &Value) -> String {
        body.pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string()
    }

    fn remember(&self, request: &ChatRequest, answer: &str) {
        self.memory
            .append(&request.memory_key, ChatMessage::user(&request.user_text));
        self.memory.append(
            &request.memory_key,
            ChatMessage {
                role: MessageRole::Assistant,
                content: answer.to_string(),
            },
        );
    }

    /// Parse a single SSE data line. Returns the parsed JSON if valid.
    fn parse_sse_line(line: &str) -> Option<Value> {
        let data = line.strip_prefix("data: ")?;
        if data == "[DONE]" {
            return None;
        }
        serde_json::from_str(data).ok()
    }

    /// Stream a prepared request body, forwarding content deltas through `tx`.
    async fn stream_body(
        &self,
        body: &Value,
        tx: &mpsc::Sender<String>,
    ) -> Result<String, LlmError> {
        let resp = self.post(body).await?;
        let mut stream = resp.bytes_stream();
        // Byte buffer: a UTF-8 character split across network chunks must not
        // be decoded until its line is complete.
        let mut buffer: Vec<u8> = Vec::new();
        let mut full = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| LlmError::Streaming {
                message: e.to_string(),
            })?;
            buffer.extend_from_slice(&chunk);

            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let raw: Vec<u8> = buffer.drain(..=newline).collect();
                let line = String::from_utf8_lossy(&raw[..raw.len() - 1])
                    .trim_end_matches('\r')
                    .to_string();
                if line.is_empty() {
                    continue;
                }
                if line == "data: [DONE]" {
                    return Ok(full);
                }
                if let Some(json) = Self::parse_sse_line(&line) {
                    if let Some(delta) = json
                        .pointer("/choices/0/delta/content")
                        .and_then(|c| c.as_str())
                    {
                        if !delta.is_empty() {
                            full.push_str(delta);
                            // A dropped receiver just means nobody is watching;
                            // keep accumulating the full text.
                            let _ = tx.send(delta.to_string()).await;
                        }
                    }
                }
            }
        }
        Ok(full)
    }
}

#[async_trait::async_trait]
impl ChatClient for OpenAiCompatibleChat {
    async fn prompt(&self, request: ChatRequest) -> Result<String, LlmError> {
        let mut messages = self.build_messages(&request);
        let body = self.request_body(&messages, request.tool.as_ref(), false);
        let response = self.post_json(&body).await?;

        let message = response
            .pointer("/choices/0/message")
            .cloned()
            .unwrap_or(Value::Null);

        let answer = if let Some(tool) = &request.tool {
            if Self::run_tool_round(tool, &message, &mut messages).await {
                debug!(tool = tool.name(), "Tool round completed, requesting final answer");
                let follow_up = self.request_body(&messages, None, false);
                let final_response = self.post_json(&follow_up).await?;
                Self::message_content(&final_response)
            } else {
                Self::message_content(&response)
            }
        } else {
            Self::message_content(&response)
        };

        self.remember(&request, &answer);
        Ok(answer)
    }

    async fn prompt_streaming(
        &self,
        request: ChatRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<String, LlmError> {
        let mut messages = self.build_messages(&request);

        // Tool calls do not stream; resolve the tool round first, then stream
        // the (possibly follow-up) answer.
        if let Some(tool) = &request.tool {
            let probe = self.request_body(&messages, Some(tool), false);
            let response = self.post_json(&probe).await?;
            let message = response
                .pointer("/choices/0/message")
                .cloned()
                .unwrap_or(Value::Null);

            if !Self::run_tool_round(tool, &message, &mut messages).await {
                let answer = Self::message_content(&response);
                if !answer.is_empty() {
                    let _ = tx.send(answer.clone()).await;
                }
                self.remember(&request, &answer);
                return Ok(answer);
            }
        }

        let body = self.request_body(&messages, None, true);
        let answer = self.stream_body(&body, &tx).await?;
        self.remember(&request, &answer);
        Ok(answer)
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
