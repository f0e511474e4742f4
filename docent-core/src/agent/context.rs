//! Per-request context for one orchestration run.

use crate::agent::events::AgentVisibility;

/// Response delivery mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentMode {
    Stream,
    Blocking,
}

impl AgentMode {
    /// Parse case-insensitively, falling back to `default` on unknown input.
    pub fn from(value: &str, default: AgentMode) -> AgentMode {
        match value.trim().to_ascii_lowercase().as_str() {
            "stream" => AgentMode::Stream,
            "blocking" => AgentMode::Blocking,
            _ => default,
        }
    }

    pub fn is_streaming(&self) -> bool {
        *self == AgentMode::Stream
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AgentMode::Stream => "stream",
            AgentMode::Blocking => "blocking",
        }
    }
}

/// Immutable context describing one inbound request.
#[derive(Debug, Clone)]
pub struct AgentRequestContext {
    pub conversation_id: String,
    pub user_message: String,
    pub solver_provider: String,
    pub verifier_provider: String,
    pub mode: AgentMode,
    pub visibility: AgentVisibility,
}

impl AgentRequestContext {
    pub fn new(
        conversation_id: impl Into<String>,
        user_message: impl Into<String>,
        solver_provider: impl Into<String>,
        verifier_provider: impl Into<String>,
        mode: AgentMode,
        visibility: AgentVisibility,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_message: user_message.into(),
            solver_provider: solver_provider.into(),
            verifier_provider: verifier_provider.into(),
            mode,
            visibility,
        }
    }

    /// Memory key for the solver role, isolated from the verifier's.
    pub fn solver_conversation_id(&self) -> String {
        format!("{}::solver", self.conversation_id)
    }

    /// Memory key for the verifier role.
    pub fn verifier_conversation_id(&self) -> String {
        format!("{}::verifier", self.conversation_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_conversation_ids() {
        let context = AgentRequestContext::new(
            "conv-1",
            "question",
            "groq",
            "ollama",
            AgentMode::Blocking,
            AgentVisibility::Trace,
        );
        assert_eq!(context.solver_conversation_id(), "conv-1::solver");
        assert_eq!(context.verifier_conversation_id(), "conv-1::verifier");
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(
            AgentMode::from("STREAM", AgentMode::Blocking),
            AgentMode::Stream
        );
        assert_eq!(
            AgentMode::from("", AgentMode::Blocking),
            AgentMode::Blocking
        );
        assert!(AgentMode::Stream.is_streaming());
        assert!(!AgentMode::Blocking.is_streaming());
    }
}
