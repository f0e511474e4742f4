//! Windowed conversation memory keyed by role conversation id.
//!
//! Each agent role keeps its own history (`<conversation>::solver`,
//! `<conversation>::verifier`) so solver and verifier never see each other's
//! turns. Oldest messages fall off once the window is exceeded.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::System => "system",
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// One chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: content.into(),
        }
    }
}

/// Per-key windowed message history, safe for concurrent runs.
pub struct ConversationMemory {
    window: usize,
    histories: Mutex<HashMap<String, Vec<ChatMessage>>>,
}

impl ConversationMemory {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(2),
            histories: Mutex::new(HashMap::new()),
        }
    }

    /// Messages currently retained for a key, oldest first.
    pub fn history(&self, key: &str) -> Vec<ChatMessage> {
        let histories = self.histories.lock().expect("memory poisoned");
        histories.get(key).cloned().unwrap_or_default()
    }

    /// Append a message, trimming the oldest past the window.
    pub fn append(&self, key: &str, message: ChatMessage) {
        let mut histories = self.histories.lock().expect("memory poisoned");
        let history = histories.entry(key.to_string()).or_default();
        history.push(message);
        if history.len() > self.window {
            let overflow = history.len() - self.window;
            history.drain(..overflow);
        }
    }

    /// Drop a key's history entirely.
    pub fn clear(&self, key: &str) {
        let mut histories = self.histories.lock().expect("memory poisoned");
        histories.remove(key);
    }
}
