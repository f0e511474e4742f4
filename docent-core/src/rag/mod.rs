//! Hierarchical retrieval: section assembly, leaf chunking, two-pass fusion
//! search, and the retriever façade.

pub mod chunk;
pub mod engine;
pub mod retriever;
pub mod section;
pub mod text;

pub use engine::{IndexSummary, RagEngine};
pub use retriever::{DocumentRetriever, HierarchicalRetriever, Query};
pub use section::Section;
