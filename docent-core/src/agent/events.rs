//! Agent run events.
//!
//! A run's caller-visible output is the ordered sequence of these events;
//! transports forward them as-is (e.g. as server-sent events tagged by
//! stage).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Stage of the orchestration loop an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStage {
    SolverStarted,
    ToolSelection,
    ToolSelectionSkipped,
    RagContext,
    SolverToken,
    ToolExecution,
    DraftReady,
    VerificationStarted,
    VerificationProgress,
    VerificationFeedback,
    FinalAnswer,
    Error,
}

/// How much of the run a caller wants to see.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentVisibility {
    /// Full trace: every intermediate stage.
    Trace,
    /// Hints only: terminal and summary events.
    Hint,
}

impl AgentVisibility {
    /// Parse case-insensitively, falling back to `default` on unknown input.
    pub fn from(value: &str, default: AgentVisibility) -> AgentVisibility {
        match value.trim().to_ascii_lowercase().as_str() {
            "trace" => AgentVisibility::Trace,
            "hint" => AgentVisibility::Hint,
            _ => default,
        }
    }
}

/// One immutable event in a run's output stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentEvent {
    pub stage: AgentStage,
    pub visibility: AgentVisibility,
    pub title: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl AgentEvent {
    pub fn of(
        stage: AgentStage,
        visibility: AgentVisibility,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            stage,
            visibility,
            title: title.into(),
            message: message.into(),
            timestamp: Utc::now(),
            data: HashMap::new(),
        }
    }

    pub fn with_data(mut self, data: HashMap<String, serde_json::Value>) -> Self {
        self.data = data;
        self
    }

    pub fn with_entry(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}
