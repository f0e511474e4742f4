//! The verifier role: reviews a draft against the request and retrieved
//! context, answering with a structured verdict.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use tracing::warn;

use crate::agent::context::AgentRequestContext;
use crate::agent::events::{AgentEvent, AgentStage, AgentVisibility};
use crate::agent::EventPublisher;
use crate::chat::{ChatClientRegistry, ChatRequest, ChatRole};
use crate::error::{AgentError, DocentError};
use crate::scratchpad::AgentScratchpad;
use crate::types::Document;

const VERIFIER_SYSTEM_PROMPT: &str = "You are a strict reviewer. Check the draft \
answer for factual grounding in the provided documents, completeness, and \
format. Respond with JSON only.";

const GENERIC_REQUIRED_CHANGES: &str = "Specify which facts or format must be corrected.";

/// The verifier's structured verdict.
///
/// Fields are defaulted after parsing so downstream code never branches on
/// missing values: `reasons` is always a list, and a failing verdict always
/// carries `required_changes`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub reasons: Vec<String>,
    #[serde(default)]
    pub required_changes: Option<String>,
}

pub struct VerifierAgent {
    registry: Arc<ChatClientRegistry>,
}

impl VerifierAgent {
    pub fn new(registry: Arc<ChatClientRegistry>) -> Self {
        Self { registry }
    }

    pub(crate) async fn verify(
        &self,
        context: &AgentRequestContext,
        scratchpad: &AgentScratchpad,
        draft: &str,
        documents: &[Document],
        publisher: &EventPublisher,
    ) -> Result<VerificationResult, DocentError> {
        publisher
            .publish(AgentEvent::of(
                AgentStage::VerificationStarted,
                AgentVisibility::Trace,
                "Verification",
                "Verifier is reviewing the draft",
            ))
            .await;
        publisher
            .publish(AgentEvent::of(
                AgentStage::VerificationProgress,
                AgentVisibility::Trace,
                "Verification",
                "Checking facts and relevance",
            ))
            .await;

        let prompt = build_prompt(context, scratchpad, draft, documents);
        let client = self
            .registry
            .get(&context.verifier_provider, ChatRole::Verifier)?;

        let mut request = ChatRequest::new(prompt, context.verifier_conversation_id());
        request.system_prompt = Some(VERIFIER_SYSTEM_PROMPT.to_string());
        request.context_documents = documents.to_vec();
        let content = client.prompt(request).await?;

        let result = match parse_result(&content) {
            Ok(result) => result,
            Err(first_err) => {
                warn!(error = %first_err, "Verifier parse failed, extracting JSON block");
                let extracted = try_extract_json(&content);
                parse_result(&extracted).map_err(|e| AgentError::VerifierParse {
                    message: e.to_string(),
                })?
            }
        };

        let mut data = HashMap::new();
        data.insert("ok".to_string(), serde_json::json!(result.ok));
        data.insert("reasons".to_string(), serde_json::json!(result.reasons));
        data.insert(
            "required_changes".to_string(),
            serde_json::json!(result.required_changes.clone().unwrap_or_default()),
        );
        publisher
            .publish(
                AgentEvent::of(
                    AgentStage::VerificationFeedback,
                    AgentVisibility::Trace,
                    "Verification",
                    build_explanation(&result),
                )
                .with_data(data),
            )
            .await;

        Ok(result)
    }
}

fn build_prompt(
    context: &AgentRequestContext,
    scratchpad: &AgentScratchpad,
    draft: &str,
    documents: &[Document],
) -> String {
    let doc_list = if documents.is_empty() {
        "- none".to_string()
    } else {
        documents
            .iter()
            .enumerate()
            .map(|(i, d)| format!("{}. {}", i + 1, d.display_title()))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let tool_info = scratchpad
        .selected_tool()
        .map(|t| t.name().to_string())
        .unwrap_or_else(|| "not used".to_string());

    format!(
        "User request:\n{}\n\n\
         Draft answer:\n{}\n\n\
         Solver provider: {}\n\
         Verifier provider: {}\n\
         Selected tool: {}\n\
         RAG documents:\n{}\n\n\
         Return ONLY JSON matching {{\"ok\": boolean, \"reasons\": string[], \"requiredChanges\": string}}.",
        context.user_message,
        draft,
        context.solver_provider,
        context.verifier_provider,
        tool_info,
        doc_list
    )
}

fn parse_result(content: &str) -> Result<VerificationResult, serde_json::Error> {
    let mut result: VerificationResult = serde_json::from_str(content)?;
    if !result.ok
        && result
            .required_changes
            .as_deref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true)
    {
        result.required_changes = Some(GENERIC_REQUIRED_CHANGES.to_string());
    }
    Ok(result)
}

fn build_explanation(result: &VerificationResult) -> String {
    if result.ok {
        return "Verification finished, no issues.".to_string();
    }
    if let Some(changes) = result
        .required_changes
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        return format!("Needs fixes: {changes}");
    }
    if !result.reasons.is_empty() {
        return format!("Issues found: {}", result.reasons.join("; "));
    }
    "Verification failed, please clarify issues.".to_string()
}

/// Pull a JSON object out of prose: prefer a trailing `{...}` block, fall
/// back to the outermost brace span, else an empty object.
fn try_extract_json(s: &str) -> String {
    static JSON_BLOCK: OnceLock<Regex> = OnceLock::new();
    let re = JSON_BLOCK.get_or_init(|| Regex::new(r"(?s)(\{.*\})\s*$").expect("valid regex"));

    let trimmed = s.trim();
    if let Some(captures) = re.captures(trimmed) {
        if let Some(m) = captures.get(1) {
            return m.as_str().to_string();
        }
    }
    if let (Some(start), Some(end)) = (trimmed.find('{'), trimmed.rfind('}')) {
        if end > start {
            return trimmed[start..=end].to_string();
        }
    }
    "{}".to_string()
}
