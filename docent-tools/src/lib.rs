//! # Docent Tools
//!
//! The tool registry and the built-in tools shipped with Docent. The
//! registry is assembled explicitly at startup; its tool list feeds the
//! embedding classifier in `docent-core`.

pub mod corpus_stats;
pub mod datetime;
pub mod registry;

pub use corpus_stats::CorpusStatsTool;
pub use datetime::DateTimeTool;
pub use registry::ToolRegistry;
