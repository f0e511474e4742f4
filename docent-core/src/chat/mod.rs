//! Chat model roles.
//!
//! [`ChatClient`] abstracts one model endpoint; the registry resolves a
//! `(provider id, role)` pair to a client so the solver and verifier can run
//! on different providers. Unknown provider ids are rejected here, before a
//! run ever starts.

pub mod memory;
pub mod mock;
pub mod openai_compat;

pub use memory::{ChatMessage, ConversationMemory, MessageRole};
pub use mock::MockChatClient;
pub use openai_compat::OpenAiCompatibleChat;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::config::LlmConfig;
use crate::error::LlmError;
use crate::tool::Tool;
use crate::types::Document;

/// The two agent roles a chat client can serve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChatRole {
    Solver,
    Verifier,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::Solver => "solver",
            ChatRole::Verifier => "verifier",
        }
    }
}

/// One prompt to a chat model role.
#[derive(Clone)]
pub struct ChatRequest {
    /// Optional system prompt prepended to the conversation.
    pub system_prompt: Option<String>,
    /// The user-visible text of this turn.
    pub user_text: String,
    /// Conversation-memory key; histories are isolated per key.
    pub memory_key: String,
    /// Retrieved documents grounding this turn.
    pub context_documents: Vec<Document>,
    /// Tool the model may invoke, already instrumented by the caller.
    pub tool: Option<Arc<dyn Tool>>,
}

impl ChatRequest {
    pub fn new(user_text: impl Into<String>, memory_key: impl Into<String>) -> Self {
        Self {
            system_prompt: None,
            user_text: user_text.into(),
            memory_key: memory_key.into(),
            context_documents: Vec::new(),
            tool: None,
        }
    }
}

/// Trait for chat model endpoints serving the agent roles.
#[async_trait]
pub trait ChatClient: Send + Sync {
    /// One blocking completion; returns the assistant text.
    async fn prompt(&self, request: ChatRequest) -> Result<String, LlmError>;

    /// Streaming completion: each text chunk is sent through `tx` as it
    /// arrives; the concatenated text is returned.
    async fn prompt_streaming(
        &self,
        request: ChatRequest,
        tx: mpsc::Sender<String>,
    ) -> Result<String, LlmError>;

    /// The model backing this client.
    fn model_name(&self) -> &str;
}

/// Resolves `(provider id, role)` to a chat client.
///
/// Built explicitly at startup; an id that was never registered is an error
/// value, not an exception from some deeper layer.
#[derive(Default)]
pub struct ChatClientRegistry {
    clients: HashMap<(String, ChatRole), Arc<dyn ChatClient>>,
}

impl ChatClientRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        provider_id: impl Into<String>,
        role: ChatRole,
        client: Arc<dyn ChatClient>,
    ) {
        self.clients.insert((provider_id.into(), role), client);
    }

    pub fn get(&self, provider_id: &str, role: ChatRole) -> Result<Arc<dyn ChatClient>, LlmError> {
        self.clients
            .get(&(provider_id.to_string(), role))
            .cloned()
            .ok_or_else(|| LlmError::UnknownProvider {
                provider: provider_id.to_string(),
            })
    }

    /// Registered provider ids (each id serves both roles).
    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .clients
            .keys()
            .map(|(id, _)| id.clone())
            .collect::<std::collections::HashSet<_>>()
            .into_iter()
            .collect();
        ids.sort();
        ids
    }

    /// Build a registry from configuration: one OpenAI-compatible client per
    /// endpoint, shared by both roles, on a shared conversation memory.
    pub fn from_config(config: &LlmConfig, memory: Arc<ConversationMemory>) -> Self {
        let mut registry = Self::new();
        for endpoint in &config.providers {
            let api_key = endpoint
                .api_key_env
                .as_deref()
                .and_then(|var| std::env::var(var).ok());
            let client: Arc<dyn ChatClient> = Arc::new(OpenAiCompatibleChat::new(
                endpoint.base_url.clone(),
                endpoint.model.clone(),
                api_key,
                config.temperature,
                config.max_tokens,
                Arc::clone(&memory),
            ));
            registry.register(endpoint.id.clone(), ChatRole::Solver, Arc::clone(&client));
            registry.register(endpoint.id.clone(), ChatRole::Verifier, client);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_unknown_provider_is_error() {
        let registry = ChatClientRegistry::new();
        let err = registry.get("nope", ChatRole::Solver).err().unwrap();
        assert!(matches!(err, LlmError::UnknownProvider { provider } if provider == "nope"));
    }

    #[test]
    fn test_registry_from_config_has_default_providers() {
        let memory = Arc::new(ConversationMemory::new(10));
        let registry = ChatClientRegistry::from_config(&LlmConfig::default(), memory);
        assert_eq!(registry.provider_ids(), vec!["groq", "ollama"]);
        assert!(registry.get("groq", ChatRole::Solver).is_ok());
        assert!(registry.get("ollama", ChatRole::Verifier).is_ok());
    }

    #[test]
    fn test_chat_role_str() {
        assert_eq!(ChatRole::Solver.as_str(), "solver");
        assert_eq!(ChatRole::Verifier.as_str(), "verifier");
    }
}
