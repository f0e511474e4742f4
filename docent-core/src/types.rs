//! Fundamental types shared across the Docent core.
//!
//! The central type is [`Document`]: a unit of retrievable text with a flat
//! string-keyed metadata map. Indexed documents carry the hierarchical
//! metadata keys defined by the `md` constants below.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Metadata keys used by indexed documents.
pub mod md {
    pub const NODE_ID: &str = "node_id";
    pub const PARENT_ID: &str = "parent_id";
    pub const LEVEL: &str = "level";
    pub const TITLE: &str = "title";
    pub const HEADING_PATH: &str = "heading_path";
    pub const PAGE_START: &str = "page_start";
    pub const PAGE_END: &str = "page_end";
    pub const POSITION: &str = "position";
    pub const TYPE: &str = "type";
    /// Similarity distance attached by the vector store on search results.
    pub const DISTANCE: &str = "distance";
}

/// Document kind within the section hierarchy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocType {
    /// A section container holding the full assembled body.
    Parent,
    /// A bounded-size fragment of a leaf section's body.
    Leaf,
}

impl DocType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocType::Parent => "parent",
            DocType::Leaf => "leaf",
        }
    }

    pub fn parse(value: &str) -> Option<DocType> {
        match value.trim().to_ascii_lowercase().as_str() {
            "parent" => Some(DocType::Parent),
            "leaf" => Some(DocType::Leaf),
            _ => None,
        }
    }
}

/// A unit of retrievable text plus a flat key/value metadata map.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Document {
    pub fn new(text: impl Into<String>, metadata: HashMap<String, serde_json::Value>) -> Self {
        Self {
            id: String::new(),
            text: text.into(),
            metadata,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// String metadata value, if present and non-blank.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }

    /// Integer metadata value; accepts numbers and numeric strings.
    pub fn meta_i64(&self, key: &str) -> Option<i64> {
        match self.metadata.get(key)? {
            serde_json::Value::Number(n) => n.as_i64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Float metadata value; accepts numbers and numeric strings.
    pub fn meta_f64(&self, key: &str) -> Option<f64> {
        match self.metadata.get(key)? {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// The document's hierarchy type, if tagged.
    pub fn doc_type(&self) -> Option<DocType> {
        self.meta_str(md::TYPE).and_then(DocType::parse)
    }

    pub fn is_leaf(&self) -> bool {
        self.doc_type() == Some(DocType::Leaf)
    }

    pub fn is_parent(&self) -> bool {
        self.doc_type() == Some(DocType::Parent)
    }

    /// Title for display purposes, falling back to the id.
    pub fn display_title(&self) -> String {
        self.meta_str(md::TITLE)
            .map(str::to_string)
            .unwrap_or_else(|| self.id.clone())
    }

    /// Stable key for rank fusion: id, else node_id, else a pointer-derived
    /// fallback that is unique per in-memory document.
    pub fn fuse_key(&self) -> String {
        if !self.id.trim().is_empty() {
            return self.id.clone();
        }
        if let Some(nid) = self.meta_str(md::NODE_ID) {
            return nid.to_string();
        }
        format!("@{:p}", self.text.as_ptr())
    }
}

/// Strip the `#partIndex` suffix from a leaf node id, yielding the owning
/// section id. Parent node ids pass through unchanged.
pub fn base_node_id(node_id: &str) -> &str {
    match node_id.find('#') {
        Some(i) => &node_id[..i],
        None => node_id,
    }
}
