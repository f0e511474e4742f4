//! Configuration system for Docent.
//!
//! Uses `figment` for layered configuration: defaults -> `docent.toml` ->
//! `DOCENT_`-prefixed environment variables. All policy constants (retrieval
//! limits, classifier threshold, iteration cap) live here so deployments can
//! tune them without touching code; the defaults are the shipped behavior.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::embeddings::EmbeddingConfig;
use crate::error::ConfigError;

/// Top-level configuration for the Docent service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocentConfig {
    pub llm: LlmConfig,
    pub embedding: EmbeddingConfig,
    pub rag: RagConfig,
    pub classifier: ClassifierConfig,
    pub agent: AgentConfig,
}

/// Chat model configuration: which providers back the solver and verifier
/// roles, and the endpoints those provider ids resolve to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Provider id used for the solver role by default.
    #[serde(default = "default_solver_provider")]
    pub solver_provider: String,
    /// Provider id used for the verifier role by default.
    #[serde(default = "default_verifier_provider")]
    pub verifier_provider: String,
    /// Known provider endpoints. Requests naming a provider id not listed
    /// here are rejected before a run starts.
    #[serde(default = "default_endpoints")]
    pub providers: Vec<ProviderEndpoint>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default)]
    pub max_tokens: Option<usize>,
}

/// One OpenAI-compatible endpoint a provider id resolves to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEndpoint {
    pub id: String,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key, if the endpoint needs one.
    #[serde(default)]
    pub api_key_env: Option<String>,
}

fn default_solver_provider() -> String {
    "groq".into()
}

fn default_verifier_provider() -> String {
    "ollama".into()
}

fn default_temperature() -> f32 {
    0.2
}

fn default_endpoints() -> Vec<ProviderEndpoint> {
    vec![
        ProviderEndpoint {
            id: "groq".into(),
            base_url: "https://api.groq.com/openai".into(),
            model: "llama-3.3-70b-versatile".into(),
            api_key_env: Some("GROQ_API_KEY".into()),
        },
        ProviderEndpoint {
            id: "ollama".into(),
            base_url: "http://localhost:11434".into(),
            model: "llama3.1".into(),
            api_key_env: None,
        },
    ]
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            solver_provider: default_solver_provider(),
            verifier_provider: default_verifier_provider(),
            providers: default_endpoints(),
            temperature: default_temperature(),
            max_tokens: None,
        }
    }
}

/// Hierarchical retrieval engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Leaf candidates surviving dedup/diversification.
    #[serde(default = "default_top_k_leaf")]
    pub top_k_leaf: usize,
    /// Families (parent + children) in the final context.
    #[serde(default = "default_max_families")]
    pub max_families: usize,
    /// Leaves kept per family, ordered by source position.
    #[serde(default = "default_max_children")]
    pub max_children_per_family: usize,
    /// Minimum trimmed body length for a leaf section to be split into parts.
    #[serde(default = "default_min_body_chars")]
    pub min_body_chars: usize,
    /// Maximum characters per leaf part.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Overlap between adjacent leaf parts.
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,
    /// Pass-1 documents mined for pseudo-relevance feedback.
    #[serde(default = "default_prf_docs")]
    pub prf_docs: usize,
    /// Expansion terms appended to the query.
    #[serde(default = "default_prf_terms")]
    pub prf_terms: usize,
    /// Reciprocal rank fusion constant.
    #[serde(default = "default_rrf_k")]
    pub rrf_k: usize,
    /// Jaccard similarity at or above which a candidate is discarded.
    #[serde(default = "default_diversify_threshold")]
    pub diversify_threshold: f64,
    /// Cap on the parent-typed scan used to resolve parents by node_id.
    #[serde(default = "default_parent_scan_top_k")]
    pub parent_scan_top_k: usize,
    /// Prefix prepended to query text before embedding.
    #[serde(default = "default_query_prefix")]
    pub query_prefix: String,
}

fn default_top_k_leaf() -> usize {
    12
}
fn default_max_families() -> usize {
    2
}
fn default_max_children() -> usize {
    3
}
fn default_min_body_chars() -> usize {
    20
}
fn default_chunk_size() -> usize {
    512
}
fn default_chunk_overlap() -> usize {
    64
}
fn default_prf_docs() -> usize {
    10
}
fn default_prf_terms() -> usize {
    8
}
fn default_rrf_k() -> usize {
    60
}
fn default_diversify_threshold() -> f64 {
    0.6
}
fn default_parent_scan_top_k() -> usize {
    256
}
fn default_query_prefix() -> String {
    "query: ".into()
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k_leaf: default_top_k_leaf(),
            max_families: default_max_families(),
            max_children_per_family: default_max_children(),
            min_body_chars: default_min_body_chars(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            prf_docs: default_prf_docs(),
            prf_terms: default_prf_terms(),
            rrf_k: default_rrf_k(),
            diversify_threshold: default_diversify_threshold(),
            parent_scan_top_k: default_parent_scan_top_k(),
            query_prefix: default_query_prefix(),
        }
    }
}

/// Embedding-based tool classifier configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Cosine similarity below which a tool is not considered.
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Maximum number of tools returned per classification.
    #[serde(default = "default_top_n_tools")]
    pub top_n_tools: usize,
    /// TTL for cached tool embeddings, in seconds.
    #[serde(default = "default_classifier_ttl")]
    pub cache_ttl_secs: u64,
}

fn default_similarity_threshold() -> f32 {
    0.4
}
fn default_top_n_tools() -> usize {
    2
}
fn default_classifier_ttl() -> u64 {
    12 * 3600
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: default_similarity_threshold(),
            top_n_tools: default_top_n_tools(),
            cache_ttl_secs: default_classifier_ttl(),
        }
    }
}

/// Orchestration loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Hard cap on solver/verifier iterations per run.
    #[serde(default = "default_max_iters")]
    pub max_iters: usize,
    /// Scratchpad entry TTL in seconds, refreshed on every write.
    #[serde(default = "default_scratchpad_ttl")]
    pub scratchpad_ttl_secs: u64,
    /// Truncation limit for tool input/output previews in events.
    #[serde(default = "default_tool_preview_limit")]
    pub tool_preview_limit: usize,
    /// Messages retained per role conversation.
    #[serde(default = "default_memory_window")]
    pub memory_window: usize,
}

fn default_max_iters() -> usize {
    3
}
fn default_scratchpad_ttl() -> u64 {
    3600
}
fn default_tool_preview_limit() -> usize {
    512
}
fn default_memory_window() -> usize {
    20
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iters: default_max_iters(),
            scratchpad_ttl_secs: default_scratchpad_ttl(),
            tool_preview_limit: default_tool_preview_limit(),
            memory_window: default_memory_window(),
        }
    }
}

/// Load configuration from defaults, an optional TOML file, and the
/// environment (`DOCENT_` prefix, `__` section separator).
pub fn load_config(config_file: Option<&Path>) -> Result<DocentConfig, ConfigError> {
    let mut figment = Figment::from(Serialized::defaults(DocentConfig::default()));
    if let Some(path) = config_file {
        figment = figment.merge(Toml::file(path));
    }
    figment = figment.merge(Env::prefixed("DOCENT_").split("__"));
    figment.extract().map_err(|e| ConfigError::ParseError {
        message: e.to_string(),
    })
}
