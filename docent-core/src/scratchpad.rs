//! Per-conversation scratchpad.
//!
//! Transient run state (retrieved documents, current draft, selected tool)
//! keyed by conversation id, TTL-bounded and refreshed on every write. The
//! orchestrator owns exactly one conversation's entry during a run and
//! clears it on completion, error, or cancellation.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::error::ScratchpadError;
use crate::tool::Tool;
use crate::types::Document;

/// Contract for the scratchpad backing store.
#[async_trait]
pub trait ScratchpadStore: Send + Sync {
    async fn save_documents(
        &self,
        conversation_id: &str,
        documents: &[Document],
    ) -> Result<(), ScratchpadError>;

    async fn load_documents(&self, conversation_id: &str) -> Result<Vec<Document>, ScratchpadError>;

    async fn save_draft(&self, conversation_id: &str, draft: &str) -> Result<(), ScratchpadError>;

    async fn load_draft(&self, conversation_id: &str) -> Result<Option<String>, ScratchpadError>;

    async fn save_selected_tool(
        &self,
        conversation_id: &str,
        tool_name: Option<&str>,
    ) -> Result<(), ScratchpadError>;

    async fn load_selected_tool(
        &self,
        conversation_id: &str,
    ) -> Result<Option<String>, ScratchpadError>;

    /// Remove the whole entry for a conversation.
    async fn clear(&self, conversation_id: &str) -> Result<(), ScratchpadError>;
}

#[derive(Default)]
struct Entry {
    documents: Vec<Document>,
    draft: Option<String>,
    tool: Option<String>,
    expires_at: Option<Instant>,
}

/// In-memory TTL-bounded scratchpad store.
pub struct InMemoryScratchpadStore {
    ttl: Duration,
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryScratchpadStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Whether a live entry exists for the conversation.
    pub fn contains(&self, conversation_id: &str) -> bool {
        let mut entries = self.entries.lock().expect("scratchpad poisoned");
        Self::prune(&mut entries, conversation_id);
        entries.contains_key(conversation_id)
    }

    fn prune(entries: &mut HashMap<String, Entry>, conversation_id: &str) {
        let expired = entries
            .get(conversation_id)
            .map(|e| matches!(e.expires_at, Some(at) if at <= Instant::now()))
            .unwrap_or(false);
        if expired {
            entries.remove(conversation_id);
        }
    }

    /// Read without materializing an entry for an unknown conversation.
    fn read_entry<T>(&self, conversation_id: &str, f: impl FnOnce(Option<&Entry>) -> T) -> T {
        let mut entries = self.entries.lock().expect("scratchpad poisoned");
        Self::prune(&mut entries, conversation_id);
        f(entries.get(conversation_id))
    }

    fn write_entry(&self, conversation_id: &str, f: impl FnOnce(&mut Entry)) {
        let mut entries = self.entries.lock().expect("scratchpad poisoned");
        Self::prune(&mut entries, conversation_id);
        let entry = entries.entry(conversation_id.to_string()).or_default();
        f(entry);
        // Every write refreshes the TTL.
        entry.expires_at = if self.ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + self.ttl)
        };
    }
}

#[async_trait]
impl ScratchpadStore for InMemoryScratchpadStore {
    async fn save_documents(
        &self,
        conversation_id: &str,
        documents: &[Document],
    ) -> Result<(), ScratchpadError> {
        self.write_entry(conversation_id, |entry| {
            entry.documents = documents.to_vec();
        });
        Ok(())
    }

    async fn load_documents(&self, conversation_id: &str) -> Result<Vec<Document>, ScratchpadError> {
        Ok(self.read_entry(conversation_id, |entry| {
            entry.map(|e| e.documents.clone()).unwrap_or_default()
        }))
    }

    async fn save_draft(&self, conversation_id: &str, draft: &str) -> Result<(), ScratchpadError> {
        self.write_entry(conversation_id, |entry| {
            entry.draft = Some(draft.to_string());
        });
        Ok(())
    }

    async fn load_draft(&self, conversation_id: &str) -> Result<Option<String>, ScratchpadError> {
        Ok(self.read_entry(conversation_id, |entry| entry.and_then(|e| e.draft.clone())))
    }

    async fn save_selected_tool(
        &self,
        conversation_id: &str,
        tool_name: Option<&str>,
    ) -> Result<(), ScratchpadError> {
        self.write_entry(conversation_id, |entry| {
            entry.tool = tool_name.map(str::to_string);
        });
        Ok(())
    }

    async fn load_selected_tool(
        &self,
        conversation_id: &str,
    ) -> Result<Option<String>, ScratchpadError> {
        Ok(self.read_entry(conversation_id, |entry| entry.and_then(|e| e.tool.clone())))
    }

    async fn clear(&self, conversation_id: &str) -> Result<(), ScratchpadError> {
        let mut entries = self.entries.lock().expect("scratchpad poisoned");
        entries.remove(conversation_id);
        Ok(())
    }
}

/// One run's view of its conversation scratchpad.
///
/// Holds the in-process tool handle (the store persists only the name) and
/// delegates everything else to the store.
pub struct AgentScratchpad {
    conversation_id: String,
    store: Arc<dyn ScratchpadStore>,
    selected_tool: Mutex<Option<Arc<dyn Tool>>>,
}

impl AgentScratchpad {
    pub fn new(conversation_id: impl Into<String>, store: Arc<dyn ScratchpadStore>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            store,
            selected_tool: Mutex::new(None),
        }
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    pub async fn set_rag_documents(&self, documents: &[Document]) -> Result<(), ScratchpadError> {
        self.store
            .save_documents(&self.conversation_id, documents)
            .await
    }

    pub async fn rag_documents(&self) -> Result<Vec<Document>, ScratchpadError> {
        self.store.load_documents(&self.conversation_id).await
    }

    pub async fn set_draft(&self, draft: &str) -> Result<(), ScratchpadError> {
        self.store.save_draft(&self.conversation_id, draft).await
    }

    pub async fn draft(&self) -> Result<Option<String>, ScratchpadError> {
        self.store.load_draft(&self.conversation_id).await
    }

    pub async fn set_selected_tool(
        &self,
        tool: Option<Arc<dyn Tool>>,
    ) -> Result<(), ScratchpadError> {
        let name = tool.as_ref().map(|t| t.name().to_string());
        *self.selected_tool.lock().expect("scratchpad poisoned") = tool;
        self.store
            .save_selected_tool(&self.conversation_id, name.as_deref())
            .await
    }

    pub fn selected_tool(&self) -> Option<Arc<dyn Tool>> {
        self.selected_tool.lock().expect("scratchpad poisoned").clone()
    }

    pub async fn clear(&self) -> Result<(), ScratchpadError> {
        *self.selected_tool.lock().expect("scratchpad poisoned") = None;
        self.store.clear(&self.conversation_id).await
    }
}
