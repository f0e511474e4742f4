//! Error types for the Docent core.
//!
//! Uses `thiserror` for public API error types with structured variants
//! covering retrieval, LLM, tool, classifier, scratchpad, and configuration
//! domains.

/// Top-level error type for the Docent core library.
#[derive(Debug, thiserror::Error)]
pub enum DocentError {
    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("LLM error: {0}")]
    Llm(#[from] LlmError),

    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    #[error("Scratchpad error: {0}")]
    Scratchpad(#[from] ScratchpadError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Agent error: {0}")]
    Agent(#[from] AgentError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors from the vector store and retrieval engine.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Vector store unreachable: {message}")]
    StoreUnavailable { message: String },

    #[error("Vector store rejected the request: {message}")]
    StoreRequest { message: String },

    #[error("Corpus has not been indexed yet")]
    NotIndexed,

    #[error("Embedding failed: {message}")]
    Embedding { message: String },
}

/// Errors from LLM provider interactions.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("Unknown provider: {provider}")]
    UnknownProvider { provider: String },

    #[error("API request failed: {message}")]
    ApiRequest { message: String },

    #[error("API response parse error: {message}")]
    ResponseParse { message: String },

    #[error("Streaming error: {message}")]
    Streaming { message: String },

    #[error("Provider connection failed: {message}")]
    Connection { message: String },
}

/// Errors from tool registration and execution.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("Tool not found: {name}")]
    NotFound { name: String },

    #[error("Tool already registered: {name}")]
    AlreadyRegistered { name: String },

    #[error("Invalid arguments for tool '{name}': {reason}")]
    InvalidArguments { name: String, reason: String },

    #[error("Tool '{name}' execution failed: {message}")]
    ExecutionFailed { name: String, message: String },

    #[error("Tool '{name}' timed out after {timeout_secs}s")]
    Timeout { name: String, timeout_secs: u64 },
}

/// Errors from the per-conversation scratchpad store.
#[derive(Debug, thiserror::Error)]
pub enum ScratchpadError {
    #[error("Scratchpad backend error: {message}")]
    Backend { message: String },

    #[error("Scratchpad entry could not be decoded: {message}")]
    Decode { message: String },
}

/// Errors from the configuration system.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Configuration parse error: {message}")]
    ParseError { message: String },
}

/// Errors from the agent orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    #[error("Verifier output could not be parsed: {message}")]
    VerifierParse { message: String },

    #[error("Run was cancelled")]
    Cancelled,
}

/// A type alias for results using the top-level `DocentError`.
pub type Result<T> = std::result::Result<T, DocentError>;
