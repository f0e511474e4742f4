//! # Docent Core
//!
//! Core library for Docent: retrieval-augmented question answering over a
//! private document corpus. Provides the hierarchical retrieval engine, the
//! embedding-based tool classifier, and the solver/verifier orchestration
//! loop, plus the collaborator contracts (vector store, chat models,
//! scratchpad store) they compose over.

pub mod agent;
pub mod cache;
pub mod chat;
pub mod classifier;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod rag;
pub mod scratchpad;
pub mod store;
pub mod tool;
pub mod types;

// Re-export commonly used types at the crate root.
pub use agent::{
    AgentEvent, AgentMode, AgentRequestContext, AgentRun, AgentStage, AgentVisibility,
    Orchestrator, SolverAgent, VerificationResult, VerifierAgent,
};
pub use cache::EmbeddingCache;
pub use chat::{ChatClient, ChatClientRegistry, ChatRequest, ChatRole, ConversationMemory};
pub use classifier::ToolClassifier;
pub use config::{load_config, DocentConfig};
pub use embeddings::{cosine_similarity, create_embedder, Embedder, LocalEmbedder};
pub use error::{DocentError, Result};
pub use rag::{DocumentRetriever, HierarchicalRetriever, Query, RagEngine};
pub use scratchpad::{AgentScratchpad, InMemoryScratchpadStore, ScratchpadStore};
pub use store::{DocFilter, InMemoryVectorStore, VectorStore};
pub use tool::Tool;
pub use types::{base_node_id, md, DocType, Document};
