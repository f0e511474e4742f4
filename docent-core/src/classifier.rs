//! Embedding-based tool classifier.
//!
//! Routes a user message to callable tools by cosine similarity between the
//! message embedding and per-tool embeddings built from each tool's
//! description and example utterances. Tool embeddings are cached with a long
//! TTL and never recomputed while fresh. An unavailable embedding backend
//! degrades to "no tool selected", never an error.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::cache::EmbeddingCache;
use crate::config::ClassifierConfig;
use crate::embeddings::{cosine_similarity, Embedder};
use crate::tool::{embedding_text, Tool};

pub struct ToolClassifier {
    embedder: Arc<dyn Embedder>,
    cache: Arc<EmbeddingCache>,
    tools: Vec<Arc<dyn Tool>>,
    config: ClassifierConfig,
}

impl ToolClassifier {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        cache: Arc<EmbeddingCache>,
        tools: Vec<Arc<dyn Tool>>,
        config: ClassifierConfig,
    ) -> Self {
        Self {
            embedder,
            cache,
            tools,
            config,
        }
    }

    fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.config.cache_ttl_secs)
    }

    fn is_zero(vector: &[f32]) -> bool {
        vector.iter().all(|v| *v == 0.0)
    }

    /// Compute and cache embeddings for every registered tool. Cached, fresh
    /// entries are left untouched, so repeated warm-ups are cache hits.
    pub fn warm_up(&self) {
        let model = self.embedder.model_name().to_string();
        let mut prepared = 0usize;
        for tool in &self.tools {
            if self.cache.get(&model, tool.name()).is_some() {
                continue;
            }
            if self.compute_and_cache(tool.as_ref()).is_some() {
                prepared += 1;
            }
        }
        info!(
            tools = self.tools.len(),
            computed = prepared,
            "Tool embeddings prepared"
        );
    }

    fn compute_and_cache(&self, tool: &dyn Tool) -> Option<Vec<f32>> {
        let vector = self.embedder.embed(&embedding_text(tool));
        if Self::is_zero(&vector) {
            warn!(tool = tool.name(), "Embedding backend returned a zero vector");
            return None;
        }
        self.cache.put(
            self.embedder.model_name(),
            tool.name(),
            vector.clone(),
            self.cache_ttl(),
        );
        Some(vector)
    }

    fn tool_embedding(&self, tool: &dyn Tool) -> Option<Vec<f32>> {
        if let Some(vector) = self.cache.get(self.embedder.model_name(), tool.name()) {
            return Some(vector);
        }
        self.compute_and_cache(tool)
    }

    /// Rank registered tools against a user message.
    ///
    /// Returns at most `top_n_tools` tools at or above the similarity
    /// threshold, best first; ties keep registry order. Returns an empty set
    /// when nothing matches or embedding is unavailable.
    pub fn classify(&self, user_message: &str) -> Vec<Arc<dyn Tool>> {
        if self.tools.is_empty() {
            debug!("No tools registered");
            return Vec::new();
        }

        let message_embedding = self.embedder.embed(user_message);
        if Self::is_zero(&message_embedding) {
            debug!("Message embedding is zero; no tool selected");
            return Vec::new();
        }

        let mut scored: Vec<(Arc<dyn Tool>, f32)> = Vec::new();
        for tool in &self.tools {
            let Some(tool_embedding) = self.tool_embedding(tool.as_ref()) else {
                continue;
            };
            if tool_embedding.len() != message_embedding.len() {
                warn!(
                    tool = tool.name(),
                    "Cached embedding length mismatch; skipping tool"
                );
                continue;
            }
            let similarity = cosine_similarity(&message_embedding, &tool_embedding);
            debug!(tool = tool.name(), similarity, "Tool similarity");
            if similarity >= self.config.similarity_threshold {
                scored.push((Arc::clone(tool), similarity));
            }
        }

        if scored.is_empty() {
            debug!(
                threshold = self.config.similarity_threshold,
                "No tools above threshold"
            );
            return Vec::new();
        }

        // Stable sort keeps registry order among equal scores.
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(self.config.top_n_tools)
            .map(|(tool, _)| tool)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::LocalEmbedder;
    use crate::error::ToolError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeTool {
        name: &'static str,
        description: &'static str,
        examples: Vec<String>,
    }

    #[async_trait::async_trait]
    impl Tool for FakeTool {
        fn name(&self) -> &str {
            self.name
        }
        fn description(&self) -> &str {
            self.description
        }
        fn examples(&self) -> Vec<String> {
            self.examples.clone()
        }
        async fn invoke(&self, _args: serde_json::Value) -> Result<String, ToolError> {
            Ok("ok".into())
        }
    }

    /// Embedder wrapper counting embed calls.
    struct CountingEmbedder {
        inner: LocalEmbedder,
        calls: AtomicUsize,
    }

    impl Embedder for CountingEmbedder {
        fn embed(&self, text: &str) -> Vec<f32> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.embed(text)
        }
        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }
        fn model_name(&self) -> &str {
            self.inner.model_name()
        }
    }

    fn schedule_tool() -> Arc<dyn Tool> {
        Arc::new(FakeTool {
            name: "schedule",
            description: "Look up the class schedule and lesson timetable",
            examples: vec![
                "what classes do I have tomorrow".into(),
                "show my lesson timetable".into(),
            ],
        })
    }

    fn grades_tool() -> Arc<dyn Tool> {
        Arc::new(FakeTool {
            name: "grades",
            description: "Fetch current student grades and exam scores",
            examples: vec!["what are my exam scores".into()],
        })
    }

    fn classifier_with(
        embedder: Arc<dyn Embedder>,
        cache: Arc<EmbeddingCache>,
        threshold: f32,
    ) -> ToolClassifier {
        ToolClassifier::new(
            embedder,
            cache,
            vec![schedule_tool(), grades_tool()],
            ClassifierConfig {
                similarity_threshold: threshold,
                top_n_tools: 2,
                cache_ttl_secs: 3600,
            },
        )
    }

    #[test]
    fn test_classify_prefers_matching_tool() {
        let classifier = classifier_with(
            Arc::new(LocalEmbedder::new(1024)),
            Arc::new(EmbeddingCache::new()),
            0.05,
        );
        let tools = classifier.classify("show my lesson timetable for tomorrow classes");
        assert!(!tools.is_empty());
        assert_eq!(tools[0].name(), "schedule");
    }

    #[test]
    fn test_classify_below_threshold_empty() {
        let classifier = classifier_with(
            Arc::new(LocalEmbedder::new(1024)),
            Arc::new(EmbeddingCache::new()),
            0.99,
        );
        assert!(classifier.classify("completely unrelated gardening question").is_empty());
    }

    #[test]
    fn test_empty_message_fails_open() {
        let classifier = classifier_with(
            Arc::new(LocalEmbedder::new(1024)),
            Arc::new(EmbeddingCache::new()),
            0.05,
        );
        assert!(classifier.classify("").is_empty());
    }

    #[test]
    fn test_warm_up_is_idempotent() {
        let embedder = Arc::new(CountingEmbedder {
            inner: LocalEmbedder::new(256),
            calls: AtomicUsize::new(0),
        });
        let cache = Arc::new(EmbeddingCache::new());
        let classifier = ToolClassifier::new(
            Arc::clone(&embedder) as Arc<dyn Embedder>,
            Arc::clone(&cache),
            vec![schedule_tool()],
            ClassifierConfig::default(),
        );

        classifier.warm_up();
        let after_first = embedder.calls.load(Ordering::SeqCst);
        assert_eq!(after_first, 1);

        classifier.warm_up();
        // Second warm-up is a cache hit: no new embed call, no new write.
        assert_eq!(embedder.calls.load(Ordering::SeqCst), after_first);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_classify_reuses_cached_tool_embeddings() {
        let embedder = Arc::new(CountingEmbedder {
            inner: LocalEmbedder::new(256),
            calls: AtomicUsize::new(0),
        });
        let classifier = ToolClassifier::new(
            Arc::clone(&embedder) as Arc<dyn Embedder>,
            Arc::new(EmbeddingCache::new()),
            vec![schedule_tool(), grades_tool()],
            ClassifierConfig {
                similarity_threshold: 0.0,
                top_n_tools: 2,
                cache_ttl_secs: 3600,
            },
        );

        classifier.warm_up(); // 2 calls
        classifier.classify("my schedule"); // +1 for the message only
        classifier.classify("my grades"); // +1 for the message only
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_top_n_caps_selection() {
        let classifier = classifier_with(
            Arc::new(LocalEmbedder::new(1024)),
            Arc::new(EmbeddingCache::new()),
            0.0,
        );
        // Threshold 0 admits everything similar at all; cap is 2 tools.
        let tools = classifier.classify("schedule grades timetable exam scores lesson");
        assert!(tools.len() <= 2);
    }
}
