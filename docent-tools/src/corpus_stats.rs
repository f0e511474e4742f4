//! Corpus statistics tool: reports what is currently indexed.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use docent_core::error::ToolError;
use docent_core::store::{DocFilter, VectorStore};
use docent_core::tool::Tool;
use docent_core::types::DocType;

/// Reports how many parent sections and leaf fragments are indexed.
pub struct CorpusStatsTool {
    store: Arc<dyn VectorStore>,
    scan_cap: usize,
}

impl CorpusStatsTool {
    pub fn new(store: Arc<dyn VectorStore>) -> Self {
        Self {
            store,
            scan_cap: 4096,
        }
    }
}

#[async_trait]
impl Tool for CorpusStatsTool {
    fn name(&self) -> &str {
        "corpus_stats"
    }

    fn description(&self) -> &str {
        "Reports how many document sections and fragments are indexed in the knowledge base"
    }

    fn examples(&self) -> Vec<String> {
        vec![
            "how many documents are indexed".into(),
            "what is in the knowledge base".into(),
        ]
    }

    async fn invoke(&self, _args: Value) -> Result<String, ToolError> {
        let count = |filter| {
            let store = Arc::clone(&self.store);
            let cap = self.scan_cap;
            async move {
                store
                    .similarity_search("corpus", cap, filter)
                    .await
                    .map(|docs| docs.len())
                    .map_err(|e| ToolError::ExecutionFailed {
                        name: "corpus_stats".into(),
                        message: e.to_string(),
                    })
            }
        };

        let parents = count(DocFilter::Type(DocType::Parent)).await?;
        let leaves = count(DocFilter::Type(DocType::Leaf)).await?;
        Ok(format!(
            "Indexed corpus: {parents} section(s), {leaves} leaf fragment(s)."
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docent_core::embeddings::LocalEmbedder;
    use docent_core::store::InMemoryVectorStore;
    use docent_core::types::{md, Document};
    use std::collections::HashMap;

    fn doc(id: &str, doc_type: &str) -> Document {
        let mut meta = HashMap::new();
        meta.insert(md::TYPE.to_string(), serde_json::json!(doc_type));
        meta.insert(md::NODE_ID.to_string(), serde_json::json!(id));
        Document::new("some section text", meta).with_id(id)
    }

    #[tokio::test]
    async fn test_reports_counts() {
        let store = Arc::new(InMemoryVectorStore::new(Arc::new(LocalEmbedder::new(64))));
        store
            .add(vec![doc("p1", "parent"), doc("p1#1", "leaf"), doc("p1#2", "leaf")])
            .await
            .unwrap();

        let tool = CorpusStatsTool::new(store);
        let out = tool.invoke(serde_json::json!({})).await.unwrap();
        assert_eq!(out, "Indexed corpus: 1 section(s), 2 leaf fragment(s).");
    }
}
