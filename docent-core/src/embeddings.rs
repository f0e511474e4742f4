//! Pluggable embedding providers for semantic matching.
//!
//! Provides a trait-based abstraction over embedding models with a local
//! hash-based TF embedder (always available, deterministic) plus OpenAI and
//! Ollama API implementations. Embeddings drive both the tool classifier and
//! the in-memory vector store.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Trait for embedding providers.
pub trait Embedder: Send + Sync {
    /// Generate an embedding for a single text.
    fn embed(&self, text: &str) -> Vec<f32>;

    /// Generate embeddings for a batch of texts.
    fn embed_batch(&self, texts: &[&str]) -> Vec<Vec<f32>> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Return the dimensionality of embeddings.
    fn dimensions(&self) -> usize;

    /// Return the model identifier, used as a cache namespace.
    fn model_name(&self) -> &str;
}

/// Configuration for embedding providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Provider name: "local" (default), "openai", "ollama"
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Provider-specific model name.
    #[serde(default)]
    pub model: Option<String>,
    /// Embedding dimensions (auto-detected from provider if 0).
    #[serde(default)]
    pub dimensions: usize,
}

fn default_provider() -> String {
    "local".into()
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".into(),
            model: None,
            dimensions: 0,
        }
    }
}

/// Local hash-based TF embedder (always available, no external dependencies).
#[derive(Debug, Clone)]
pub struct LocalEmbedder {
    dimensions: usize,
    name: String,
}

impl LocalEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions,
            name: format!("local-tf-{dimensions}"),
        }
    }
}

fn simple_hash(s: &str) -> usize {
    let mut hash: usize = 5381;
    for b in s.bytes() {
        hash = hash.wrapping_mul(33).wrapping_add(b as usize);
    }
    hash
}

impl Embedder for LocalEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimensions];

        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();

        if words.is_empty() {
            return vector;
        }

        // Count term frequency
        let mut tf: HashMap<&str, usize> = HashMap::new();
        for word in &words {
            *tf.entry(word).or_insert(0) += 1;
        }

        // Hash each unique term into a dimension
        for (term, count) in &tf {
            let idx = simple_hash(term) % self.dimensions;
            vector[idx] += *count as f32;
        }

        // L2 normalize
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vector {
                *v /= norm;
            }
        }

        vector
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.name
    }
}

/// OpenAI API embedder (uses text-embedding-3-small by default).
pub struct OpenAiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dims: usize,
    base_url: String,
}

impl OpenAiEmbedder {
    pub fn new(api_key: String, model: Option<String>, base_url: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| "text-embedding-3-small".into());
        let dims = match model.as_str() {
            "text-embedding-3-small" => 1536,
            "text-embedding-3-large" => 3072,
            "text-embedding-ada-002" => 1536,
            _ => 1536,
        };
        Self {
            client: reqwest::Client::new(),
            api_key,
            model,
            dims,
            base_url: base_url.unwrap_or_else(|| "https://api.openai.com".into()),
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        // The Embedder trait is sync; bridge onto the runtime from a scoped thread.
        let rt = tokio::runtime::Handle::try_current();
        match rt {
            Ok(handle) => {
                let api_key = self.api_key.clone();
                let model = self.model.clone();
                let base_url = self.base_url.clone();
                let text = text.to_string();
                let client = self.client.clone();
                let dims = self.dims;

                std::thread::scope(|s| {
                    s.spawn(|| {
                        handle.block_on(async {
                            Self::embed_api_call(&client, &api_key, &model, &base_url, &text, dims)
                                .await
                        })
                    })
                    .join()
                    .unwrap_or_else(|_| vec![0.0; dims])
                })
            }
            Err(_) => {
                tracing::warn!("No tokio runtime available for OpenAI embedding");
                vec![0.0; self.dims]
            }
        }
    }

    async fn embed_api_call(
        client: &reqwest::Client,
        api_key: &str,
        model: &str,
        base_url: &str,
        text: &str,
        dims: usize,
    ) -> Vec<f32> {
        let url = format!("{}/v1/embeddings", base_url);
        let body = serde_json::json!({
            "model": model,
            "input": text,
        });

        match client
            .post(&url)
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
        {
            Ok(resp) => {
                if let Ok(json) = resp.json::<serde_json::Value>().await {
                    if let Some(embedding) = json["data"][0]["embedding"].as_array() {
                        return embedding
                            .iter()
                            .filter_map(|v| v.as_f64().map(|f| f as f32))
                            .collect();
                    }
                }
                vec![0.0; dims]
            }
            Err(e) => {
                tracing::warn!("OpenAI embedding error: {}", e);
                vec![0.0; dims]
            }
        }
    }
}

impl Embedder for OpenAiEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        self.embed_sync(text)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Ollama embedder (uses local Ollama API).
pub struct OllamaEmbedder {
    client: reqwest::Client,
    model: String,
    dims: usize,
    base_url: String,
}

impl OllamaEmbedder {
    pub fn new(model: Option<String>, base_url: Option<String>) -> Self {
        let model = model.unwrap_or_else(|| "nomic-embed-text".into());
        let dims = match model.as_str() {
            "nomic-embed-text" => 768,
            "mxbai-embed-large" => 1024,
            "all-minilm" => 384,
            _ => 768,
        };
        Self {
            client: reqwest::Client::new(),
            model,
            dims,
            base_url: base_url.unwrap_or_else(|| "http://localhost:11434".into()),
        }
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let rt = tokio::runtime::Handle::try_current();
        match rt {
            Ok(handle) => {
                let client = self.client.clone();
                let model = self.model.clone();
                let base_url = self.base_url.clone();
                let text = text.to_string();
                let dims = self.dims;

                std::thread::scope(|s| {
                    s.spawn(|| {
                        handle.block_on(async {
                            Self::embed_api_call(&client, &model, &base_url, &text, dims).await
                        })
                    })
                    .join()
                    .unwrap_or_else(|_| vec![0.0; dims])
                })
            }
            Err(_) => {
                tracing::warn!("No tokio runtime available for Ollama embedding");
                vec![0.0; self.dims]
            }
        }
    }

    async fn embed_api_call(
        client: &reqwest::Client,
        model: &str,
        base_url: &str,
        text: &str,
        dims: usize,
    ) -> Vec<f32> {
        let url = format!("{}/api/embed", base_url);
        let body = serde_json::json!({
            "model": model,
            "input": text,
        });

        match client.post(&url).json(&body).send().await {
            Ok(resp) => {
                if let Ok(json) = resp.json::<serde_json::Value>().await {
                    if let Some(embedding) = json["embeddings"][0].as_array() {
                        return embedding
                            .iter()
                            .filter_map(|v| v.as_f64().map(|f| f as f32))
                            .collect();
                    }
                }
                vec![0.0; dims]
            }
            Err(e) => {
                tracing::warn!("Ollama embedding error: {}", e);
                vec![0.0; dims]
            }
        }
    }
}

impl Embedder for OllamaEmbedder {
    fn embed(&self, text: &str) -> Vec<f32> {
        self.embed_sync(text)
    }

    fn dimensions(&self) -> usize {
        self.dims
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Factory function to create an embedder based on configuration.
pub fn create_embedder(config: &EmbeddingConfig) -> Box<dyn Embedder> {
    let fallback_dims = if config.dimensions > 0 {
        config.dimensions
    } else {
        128
    };
    match config.provider.as_str() {
        "openai" => {
            let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
            if api_key.is_empty() {
                tracing::warn!("OPENAI_API_KEY not set, falling back to local embedder");
                Box::new(LocalEmbedder::new(fallback_dims))
            } else {
                Box::new(OpenAiEmbedder::new(api_key, config.model.clone(), None))
            }
        }
        "ollama" => Box::new(OllamaEmbedder::new(config.model.clone(), None)),
        _ => Box::new(LocalEmbedder::new(fallback_dims)),
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 when either vector has zero norm or the lengths differ, so
/// callers never divide by zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_embedder_dimensions() {
        let embedder = LocalEmbedder::new(128);
        assert_eq!(embedder.dimensions(), 128);
        let v = embedder.embed("hello world");
        assert_eq!(v.len(), 128);
    }

    #[test]
    fn test_local_embedder_normalized() {
        let embedder = LocalEmbedder::new(128);
        let v = embedder.embed("test input text for normalization");
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!(
            (norm - 1.0).abs() < 0.01,
            "Expected normalized vector, got norm={}",
            norm
        );
    }

    #[test]
    fn test_local_embedder_empty_text() {
        let embedder = LocalEmbedder::new(128);
        let v = embedder.embed("");
        assert_eq!(v.len(), 128);
        assert!(v.iter().all(|&x| x == 0.0));
    }

    #[test]
    fn test_local_embedder_deterministic() {
        let embedder = LocalEmbedder::new(128);
        assert_eq!(embedder.embed("same text"), embedder.embed("same text"));
    }

    #[test]
    fn test_embed_batch_default() {
        let embedder = LocalEmbedder::new(64);
        let embeddings = embedder.embed_batch(&["hello", "world", "test"]);
        assert_eq!(embeddings.len(), 3);
        for emb in &embeddings {
            assert_eq!(emb.len(), 64);
        }
    }

    #[test]
    fn test_cosine_similarity_identity() {
        let embedder = LocalEmbedder::new(128);
        let v = embedder.embed("vector identity check");
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_cosine_similarity_zero_norm() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_cosine_similarity_length_mismatch() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_create_embedder_default_local() {
        let embedder = create_embedder(&EmbeddingConfig::default());
        assert_eq!(embedder.dimensions(), 128);
        assert!(embedder.model_name().starts_with("local-tf"));
    }

    #[test]
    fn test_create_embedder_explicit_dimensions() {
        let config = EmbeddingConfig {
            dimensions: 256,
            ..Default::default()
        };
        let embedder = create_embedder(&config);
        assert_eq!(embedder.dimensions(), 256);
    }

    #[test]
    fn test_embedding_config_deserialize_empty() {
        let config: EmbeddingConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.provider, "local");
        assert_eq!(config.dimensions, 0);
    }
}
