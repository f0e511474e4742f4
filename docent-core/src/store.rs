//! Document store adapter.
//!
//! [`VectorStore`] is the contract the retrieval engine talks to; production
//! deployments back it with a real vector database. [`InMemoryVectorStore`]
//! is the reference implementation: an embedder plus a cosine scan, good for
//! tests and small corpora.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use crate::embeddings::{cosine_similarity, Embedder};
use crate::error::RetrievalError;
use crate::types::{md, DocType, Document};

/// Filter applied to a similarity search.
///
/// Modeled as an explicit value rather than an expression string; the engine
/// only ever filters on the document type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocFilter {
    Any,
    Type(DocType),
}

impl DocFilter {
    fn matches(&self, doc: &Document) -> bool {
        match self {
            DocFilter::Any => true,
            DocFilter::Type(t) => doc.doc_type() == Some(*t),
        }
    }
}

/// Contract for the backing document store.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Upsert a batch of documents.
    async fn add(&self, documents: Vec<Document>) -> Result<(), RetrievalError>;

    /// Return the `top_k` documents most similar to the query text, filtered
    /// by `filter`. Results carry a `distance` metadata entry in `[0, 2]`
    /// (0 = identical direction).
    async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
        filter: DocFilter,
    ) -> Result<Vec<Document>, RetrievalError>;
}

/// In-memory vector store: embeds on insert, scans with cosine similarity.
pub struct InMemoryVectorStore {
    embedder: Arc<dyn Embedder>,
    entries: Mutex<Vec<(Document, Vec<f32>)>>,
}

impl InMemoryVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: Mutex::new(Vec::new()),
        }
    }

    /// Number of stored documents.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("store poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text actually embedded for a document: the body, or the title when the
    /// body is blank (container sections may have no local content).
    fn embeddable_text(doc: &Document) -> String {
        if !doc.text.trim().is_empty() {
            return doc.text.clone();
        }
        doc.meta_str(md::TITLE).unwrap_or_default().to_string()
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn add(&self, documents: Vec<Document>) -> Result<(), RetrievalError> {
        if documents.is_empty() {
            return Ok(());
        }
        let embedder = Arc::clone(&self.embedder);
        let embedded = tokio::task::spawn_blocking(move || {
            documents
                .into_iter()
                .map(|doc| {
                    let vector = embedder.embed(&Self::embeddable_text(&doc));
                    (doc, vector)
                })
                .collect::<Vec<_>>()
        })
        .await
        .map_err(|e| RetrievalError::Embedding {
            message: e.to_string(),
        })?;

        let mut entries = self.entries.lock().expect("store poisoned");
        for (doc, vector) in embedded {
            let key = doc.fuse_key();
            // Upsert: re-indexing the same node replaces the previous copy.
            entries.retain(|(existing, _)| existing.fuse_key() != key);
            entries.push((doc, vector));
        }
        Ok(())
    }

    async fn similarity_search(
        &self,
        query: &str,
        top_k: usize,
        filter: DocFilter,
    ) -> Result<Vec<Document>, RetrievalError> {
        let embedder = Arc::clone(&self.embedder);
        let query = query.to_string();
        let query_vec = tokio::task::spawn_blocking(move || embedder.embed(&query))
            .await
            .map_err(|e| RetrievalError::Embedding {
                message: e.to_string(),
            })?;

        let entries = self.entries.lock().expect("store poisoned");
        let mut scored: Vec<(f32, Document)> = entries
            .iter()
            .filter(|(doc, _)| filter.matches(doc))
            .map(|(doc, vector)| (cosine_similarity(&query_vec, vector), doc.clone()))
            .collect();
        drop(entries);

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);

        Ok(scored
            .into_iter()
            .map(|(similarity, mut doc)| {
                let distance = (1.0 - similarity).max(0.0) as f64;
                doc.metadata
                    .insert(md::DISTANCE.to_string(), serde_json::json!(distance));
                doc
            })
            .collect())
    }
}
