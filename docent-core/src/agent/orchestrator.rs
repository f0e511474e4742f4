//! The orchestration loop.
//!
//! One [`Orchestrator::run`] call spawns one independent run: retrieve,
//! select a tool, solve, verify, and either finish or rewrite the prompt
//! from verifier feedback, up to the iteration cap. The caller consumes the
//! event stream and may cancel at any time; cancellation is silent, drops
//! any in-flight model call, and clears the conversation's scratchpad.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::agent::context::AgentRequestContext;
use crate::agent::events::{AgentEvent, AgentStage, AgentVisibility};
use crate::agent::solver::SolverAgent;
use crate::agent::verifier::{VerificationResult, VerifierAgent};
use crate::agent::EventPublisher;
use crate::chat::{ChatClientRegistry, ChatRole};
use crate::error::DocentError;
use crate::rag::{DocumentRetriever, Query};
use crate::scratchpad::{AgentScratchpad, ScratchpadStore};
use crate::types::Document;

/// Handle to one running agent loop.
pub struct AgentRun {
    /// Ordered event stream; ends when the run terminates.
    pub events: ReceiverStream<AgentEvent>,
    cancel: CancellationToken,
}

impl AgentRun {
    /// Cancel the run. Idempotent; safe after natural completion.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

pub struct Orchestrator {
    solver: SolverAgent,
    verifier: VerifierAgent,
    retriever: Arc<dyn DocumentRetriever>,
    scratchpad_store: Arc<dyn ScratchpadStore>,
    registry: Arc<ChatClientRegistry>,
    max_iters: usize,
}

impl Orchestrator {
    pub fn new(
        solver: SolverAgent,
        verifier: VerifierAgent,
        retriever: Arc<dyn DocumentRetriever>,
        scratchpad_store: Arc<dyn ScratchpadStore>,
        registry: Arc<ChatClientRegistry>,
        max_iters: usize,
    ) -> Self {
        Self {
            solver,
            verifier,
            retriever,
            scratchpad_store,
            registry,
            max_iters: max_iters.max(1),
        }
    }

    /// Start one run. Provider ids are validated here, before any event is
    /// produced; an unknown id never starts a run.
    pub fn run(self: Arc<Self>, context: AgentRequestContext) -> Result<AgentRun, DocentError> {
        self.registry
            .get(&context.solver_provider, ChatRole::Solver)?;
        self.registry
            .get(&context.verifier_provider, ChatRole::Verifier)?;

        let (tx, rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let publisher = EventPublisher::new(tx, cancel.clone());
        let run_cancel = cancel.clone();

        tokio::spawn(async move {
            let scratchpad = AgentScratchpad::new(
                context.conversation_id.clone(),
                Arc::clone(&self.scratchpad_store),
            );

            let outcome = tokio::select! {
                _ = run_cancel.cancelled() => {
                    // Silent termination: discard in-flight work, clear state.
                    info!(conversation = %context.conversation_id, "Run cancelled");
                    let _ = scratchpad.clear().await;
                    return;
                }
                outcome = self.execute(&context, &scratchpad, &publisher) => outcome,
            };

            match outcome {
                Ok(answer) => {
                    let data = Self::final_data(&context, &scratchpad, &answer).await;
                    publisher
                        .publish(
                            AgentEvent::of(
                                AgentStage::FinalAnswer,
                                AgentVisibility::Hint,
                                "Answer",
                                "Result delivered",
                            )
                            .with_data(data),
                        )
                        .await;
                }
                Err(e) => {
                    error!(conversation = %context.conversation_id, error = %e, "Run failed");
                    publisher
                        .publish(AgentEvent::of(
                            AgentStage::Error,
                            AgentVisibility::Hint,
                            "Error",
                            e.to_string(),
                        ))
                        .await;
                }
            }
            let _ = scratchpad.clear().await;
        });

        Ok(AgentRun {
            events: ReceiverStream::new(rx),
            cancel,
        })
    }

    /// The bounded solve/verify loop; returns the final answer text.
    async fn execute(
        &self,
        context: &AgentRequestContext,
        scratchpad: &AgentScratchpad,
        publisher: &EventPublisher,
    ) -> Result<String, DocentError> {
        let mut current_message = context.user_message.clone();

        for iteration in 1..=self.max_iters {
            publisher
                .publish(AgentEvent::of(
                    AgentStage::SolverStarted,
                    AgentVisibility::Trace,
                    "Solver",
                    format!("Iteration {iteration} started"),
                ))
                .await;

            let documents = self.retrieve(&current_message).await;
            scratchpad.set_rag_documents(&documents).await?;
            publisher.publish(Self::rag_event(&documents)).await;

            let draft = self
                .solver
                .solve(context, scratchpad, documents.clone(), &current_message, publisher)
                .await?;

            let result = self
                .verifier
                .verify(context, scratchpad, &draft, &documents, publisher)
                .await?;

            if result.ok {
                info!(iteration, "Verification succeeded");
                return Ok(draft);
            }
            info!(iteration, "Verification failed, rewriting prompt");
            current_message = build_next_iteration_prompt(&context.user_message, &result);
        }

        // Iteration budget exhausted: the last draft wins, unverified.
        info!(max_iters = self.max_iters, "Iteration cap reached, returning last draft");
        Ok(scratchpad.draft().await?.unwrap_or_default())
    }

    /// Retrieval failures are recovered locally: the run continues with an
    /// empty context rather than stalling.
    async fn retrieve(&self, message: &str) -> Vec<Document> {
        match self.retriever.retrieve(&Query::new(message)).await {
            Ok(documents) => documents,
            Err(e) => {
                warn!(error = %e, "Retrieval failed, continuing without context");
                Vec::new()
            }
        }
    }

    fn rag_event(documents: &[Document]) -> AgentEvent {
        let mut data = HashMap::new();
        data.insert("count".to_string(), serde_json::json!(documents.len()));
        if !documents.is_empty() {
            let titles: Vec<String> = documents.iter().map(|d| d.display_title()).collect();
            data.insert("titles".to_string(), serde_json::json!(titles));
        }
        let message = if documents.is_empty() {
            "No RAG documents found".to_string()
        } else {
            format!("Prepared {} document(s)", documents.len())
        };
        AgentEvent::of(AgentStage::RagContext, AgentVisibility::Trace, "RAG", message)
            .with_data(data)
    }

    async fn final_data(
        context: &AgentRequestContext,
        scratchpad: &AgentScratchpad,
        answer: &str,
    ) -> HashMap<String, serde_json::Value> {
        let mut data = HashMap::new();
        data.insert(
            "solver_provider".to_string(),
            serde_json::json!(context.solver_provider),
        );
        data.insert(
            "verifier_provider".to_string(),
            serde_json::json!(context.verifier_provider),
        );
        data.insert("mode".to_string(), serde_json::json!(context.mode.as_str()));
        data.insert("answer".to_string(), serde_json::json!(answer));

        let titles: Vec<String> = scratchpad
            .rag_documents()
            .await
            .unwrap_or_default()
            .iter()
            .map(|d| d.display_title())
            .collect();
        data.insert("documents".to_string(), serde_json::json!(titles));

        let tool = scratchpad
            .selected_tool()
            .map(|t| t.name().to_string())
            .unwrap_or_else(|| "none".to_string());
        data.insert("tool".to_string(), serde_json::json!(tool));
        data
    }
}

fn build_next_iteration_prompt(original_message: &str, result: &VerificationResult) -> String {
    let mut prompt = format!(
        "{original_message}\n\nPlease fix the answer according to verifier feedback:\n"
    );
    if let Some(changes) = result
        .required_changes
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        prompt.push_str(changes);
    } else if !result.reasons.is_empty() {
        prompt.push_str(&result.reasons.join("; "));
    } else {
        prompt.push_str("Review facts and format, using the provided RAG documents.");
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_prompt_prefers_required_changes() {
        let result = VerificationResult {
            ok: false,
            reasons: vec!["reason".into()],
            required_changes: Some("add the deadline".into()),
        };
        let prompt = build_next_iteration_prompt("original question", &result);
        assert!(prompt.starts_with("original question"));
        assert!(prompt.ends_with("add the deadline"));
    }

    #[test]
    fn test_next_prompt_joins_reasons() {
        let result = VerificationResult {
            ok: false,
            reasons: vec!["too vague".into(), "wrong date".into()],
            required_changes: None,
        };
        let prompt = build_next_iteration_prompt("q", &result);
        assert!(prompt.contains("too vague; wrong date"));
    }

    #[test]
    fn test_next_prompt_generic_fallback() {
        let result = VerificationResult {
            ok: false,
            reasons: vec![],
            required_changes: Some("  ".into()),
        };
        let prompt = build_next_iteration_prompt("q", &result);
        assert!(prompt.contains("Review facts and format"));
    }

    #[test]
    fn test_rag_event_empty() {
        let event = Orchestrator::rag_event(&[]);
        assert_eq!(event.message, "No RAG documents found");
        assert_eq!(event.data["count"], serde_json::json!(0));
        assert!(!event.data.contains_key("titles"));
    }
}
