//! The solver role: selects a tool, calls the solver model with retrieved
//! context, and produces the draft answer.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use crate::agent::context::AgentRequestContext;
use crate::agent::events::{AgentEvent, AgentStage, AgentVisibility};
use crate::agent::EventPublisher;
use crate::chat::{ChatClientRegistry, ChatRequest, ChatRole};
use crate::classifier::ToolClassifier;
use crate::error::{DocentError, ToolError};
use crate::rag::text::truncate;
use crate::scratchpad::AgentScratchpad;
use crate::tool::Tool;
use crate::types::Document;

const SOLVER_SYSTEM_PROMPT: &str = "You are a careful assistant answering questions \
about a private document corpus. Ground every claim in the provided context \
documents; when the context does not cover the question, say so instead of \
guessing. Use the attached tool when it clearly applies.";

pub struct SolverAgent {
    registry: Arc<ChatClientRegistry>,
    classifier: Arc<ToolClassifier>,
    tool_preview_limit: usize,
}

impl SolverAgent {
    pub fn new(
        registry: Arc<ChatClientRegistry>,
        classifier: Arc<ToolClassifier>,
        tool_preview_limit: usize,
    ) -> Self {
        Self {
            registry,
            classifier,
            tool_preview_limit,
        }
    }

    /// Run one solver step: classify, prompt, stream tokens, persist draft.
    ///
    /// `current_message` is the (possibly rewritten) message of this
    /// iteration; tool classification always uses the original user message.
    pub(crate) async fn solve(
        &self,
        context: &AgentRequestContext,
        scratchpad: &AgentScratchpad,
        documents: Vec<Document>,
        current_message: &str,
        publisher: &EventPublisher,
    ) -> Result<String, DocentError> {
        let selected = self.select_tool(&context.user_message).await;
        scratchpad.set_selected_tool(selected.clone()).await?;

        match &selected {
            Some(tool) => {
                let mut data = HashMap::new();
                data.insert("tool".to_string(), serde_json::json!(tool.name()));
                if !tool.description().is_empty() {
                    data.insert(
                        "description".to_string(),
                        serde_json::json!(tool.description()),
                    );
                }
                publisher
                    .publish(
                        AgentEvent::of(
                            AgentStage::ToolSelection,
                            AgentVisibility::Trace,
                            "Tool classifier",
                            format!("Selected tool {}", tool.name()),
                        )
                        .with_data(data),
                    )
                    .await;
            }
            None => {
                publisher
                    .publish(AgentEvent::of(
                        AgentStage::ToolSelectionSkipped,
                        AgentVisibility::Trace,
                        "Tool classifier",
                        "No tool matched",
                    ))
                    .await;
            }
        }

        let client = self
            .registry
            .get(&context.solver_provider, ChatRole::Solver)?;

        let mut request = ChatRequest::new(current_message, context.solver_conversation_id());
        request.system_prompt = Some(SOLVER_SYSTEM_PROMPT.to_string());
        request.context_documents = documents;
        request.tool = selected.map(|tool| {
            Arc::new(InstrumentedTool {
                inner: tool,
                publisher: publisher.clone(),
                preview_limit: self.tool_preview_limit,
            }) as Arc<dyn Tool>
        });

        let draft = if context.mode.is_streaming() {
            let (tx, mut rx) = mpsc::channel::<String>(32);
            let token_publisher = publisher.clone();
            let forward = tokio::spawn(async move {
                while let Some(chunk) = rx.recv().await {
                    token_publisher
                        .publish(AgentEvent::of(
                            AgentStage::SolverToken,
                            AgentVisibility::Trace,
                            "Solver",
                            chunk,
                        ))
                        .await;
                }
            });
            let result = client.prompt_streaming(request, tx).await;
            // Channel sender is consumed by the call; the forwarder drains
            // whatever was produced before returning.
            let _ = forward.await;
            result?
        } else {
            client.prompt(request).await?
        };

        scratchpad.set_draft(&draft).await?;
        publisher
            .publish(
                AgentEvent::of(
                    AgentStage::DraftReady,
                    AgentVisibility::Trace,
                    "Draft",
                    "Draft response prepared",
                )
                .with_entry("length", serde_json::json!(draft.chars().count())),
            )
            .await;

        Ok(draft)
    }

    /// Classify off the async path and take the first ranked tool.
    async fn select_tool(&self, user_message: &str) -> Option<Arc<dyn Tool>> {
        let classifier = Arc::clone(&self.classifier);
        let message = user_message.to_string();
        let ranked = tokio::task::spawn_blocking(move || classifier.classify(&message))
            .await
            .unwrap_or_default();
        debug!(candidates = ranked.len(), "Tool classification finished");
        ranked.into_iter().next()
    }
}

/// Wraps the selected tool so every invocation emits start/success/error
/// events with truncated input/output previews. Stateless per call.
struct InstrumentedTool {
    inner: Arc<dyn Tool>,
    publisher: EventPublisher,
    preview_limit: usize,
}

impl InstrumentedTool {
    fn event_data(
        &self,
        status: &str,
        input: Option<&str>,
        output: Option<&str>,
    ) -> HashMap<String, serde_json::Value> {
        let mut data = HashMap::new();
        data.insert("tool".to_string(), serde_json::json!(self.inner.name()));
        data.insert("status".to_string(), serde_json::json!(status));
        if let Some(input) = input {
            data.insert(
                "input_preview".to_string(),
                serde_json::json!(truncate(input, self.preview_limit)),
            );
        }
        if let Some(output) = output {
            data.insert(
                "output_preview".to_string(),
                serde_json::json!(truncate(output, self.preview_limit)),
            );
        }
        data
    }
}

#[async_trait]
impl Tool for InstrumentedTool {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn description(&self) -> &str {
        self.inner.description()
    }

    fn examples(&self) -> Vec<String> {
        self.inner.examples()
    }

    fn parameters_schema(&self) -> serde_json::Value {
        self.inner.parameters_schema()
    }

    fn timeout(&self) -> Duration {
        self.inner.timeout()
    }

    async fn invoke(&self, args: serde_json::Value) -> Result<String, ToolError> {
        let input = args.to_string();
        let name = self.inner.name().to_string();
        self.publisher
            .publish(
                AgentEvent::of(
                    AgentStage::ToolExecution,
                    AgentVisibility::Trace,
                    "Tool execution",
                    format!("Invoking {name}"),
                )
                .with_data(self.event_data("started", Some(&input), None)),
            )
            .await;

        match self.inner.invoke(args).await {
            Ok(output) => {
                self.publisher
                    .publish(
                        AgentEvent::of(
                            AgentStage::ToolExecution,
                            AgentVisibility::Trace,
                            "Tool execution",
                            format!("{name} completed"),
                        )
                        .with_data(self.event_data("success", Some(&input), Some(&output))),
                    )
                    .await;
                Ok(output)
            }
            Err(e) => {
                let message = e.to_string();
                self.publisher
                    .publish(
                        AgentEvent::of(
                            AgentStage::ToolExecution,
                            AgentVisibility::Trace,
                            "Tool execution",
                            format!("{name} failed"),
                        )
                        .with_data(self.event_data("error", Some(&input), Some(&message))),
                    )
                    .await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;

    struct FailingTool;

    #[async_trait]
    impl Tool for FailingTool {
        fn name(&self) -> &str {
            "failing"
        }
        fn description(&self) -> &str {
            "always fails"
        }
        async fn invoke(&self, _args: serde_json::Value) -> Result<String, ToolError> {
            Err(ToolError::ExecutionFailed {
                name: "failing".into(),
                message: "backend down".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_instrumented_tool_emits_error_event_and_reraises() {
        let (tx, mut rx) = mpsc::channel(16);
        let publisher = EventPublisher::new(tx, CancellationToken::new());
        let tool = InstrumentedTool {
            inner: Arc::new(FailingTool),
            publisher,
            preview_limit: 512,
        };

        let result = tool.invoke(serde_json::json!({"q": "x"})).await;
        assert!(result.is_err());

        let started = rx.recv().await.unwrap();
        assert_eq!(started.stage, AgentStage::ToolExecution);
        assert_eq!(started.data["status"], serde_json::json!("started"));

        let failed = rx.recv().await.unwrap();
        assert_eq!(failed.data["status"], serde_json::json!("error"));
        assert!(failed.data["output_preview"]
            .as_str()
            .unwrap()
            .contains("backend down"));
    }

    #[tokio::test]
    async fn test_instrumented_tool_truncates_previews() {
        struct BigTool;
        #[async_trait]
        impl Tool for BigTool {
            fn name(&self) -> &str {
                "big"
            }
            fn description(&self) -> &str {
                "returns a lot"
            }
            async fn invoke(&self, _args: serde_json::Value) -> Result<String, ToolError> {
                Ok("y".repeat(2000))
            }
        }

        let (tx, mut rx) = mpsc::channel(16);
        let publisher = EventPublisher::new(tx, CancellationToken::new());
        let tool = InstrumentedTool {
            inner: Arc::new(BigTool),
            publisher,
            preview_limit: 512,
        };
        tool.invoke(serde_json::json!({})).await.unwrap();

        let _started = rx.recv().await.unwrap();
        let success = rx.recv().await.unwrap();
        let preview = success.data["output_preview"].as_str().unwrap();
        assert!(preview.chars().count() <= 513); // limit plus ellipsis
    }
}
