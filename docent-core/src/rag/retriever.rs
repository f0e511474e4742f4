//! Document retriever façade over the engine.
//!
//! Callers (the orchestrator, transports) retrieve through this trait so the
//! engine stays swappable in tests; queries may override the configured
//! retrieval limits per call.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::RetrievalError;
use crate::rag::engine::RagEngine;
use crate::types::Document;

/// A retrieval query: text plus optional per-query limit overrides.
#[derive(Debug, Clone)]
pub struct Query {
    pub text: String,
    pub top_k_leaf: Option<usize>,
    pub max_families: Option<usize>,
    pub max_children_per_family: Option<usize>,
}

impl Query {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            top_k_leaf: None,
            max_families: None,
            max_children_per_family: None,
        }
    }
}

/// Contract for retrieving context documents for a query.
#[async_trait]
pub trait DocumentRetriever: Send + Sync {
    async fn retrieve(&self, query: &Query) -> Result<Vec<Document>, RetrievalError>;
}

/// Hierarchical retriever: resolves limits from the query or the engine's
/// configured defaults and delegates to the engine.
pub struct HierarchicalRetriever {
    engine: Arc<RagEngine>,
}

impl HierarchicalRetriever {
    pub fn new(engine: Arc<RagEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl DocumentRetriever for HierarchicalRetriever {
    async fn retrieve(&self, query: &Query) -> Result<Vec<Document>, RetrievalError> {
        let config = self.engine.config();
        let top_k_leaf = query.top_k_leaf.unwrap_or(config.top_k_leaf);
        let max_families = query.max_families.unwrap_or(config.max_families);
        let max_children = query
            .max_children_per_family
            .unwrap_or(config.max_children_per_family);

        tracing::debug!(
            query = %query.text,
            top_k_leaf,
            max_families,
            max_children,
            "retrieve"
        );
        self.engine
            .search_hierarchical(&query.text, top_k_leaf, max_families, max_children)
            .await
    }
}
