//! Hierarchical retrieval engine.
//!
//! Indexing turns paragraph documents into a section tree and upserts parent
//! and leaf documents in one batch. Search runs two vector passes (the second
//! with pseudo-relevance-feedback expansion), fuses them with reciprocal rank
//! fusion, deduplicates and diversifies the leaves, groups them into families
//! under their parent sections, and returns the ordered context window.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::config::RagConfig;
use crate::error::RetrievalError;
use crate::rag::chunk::split_body;
use crate::rag::section::{assemble_sections, Section};
use crate::rag::text::{jaccard, preview, token_set, tokenize};
use crate::store::{DocFilter, VectorStore};
use crate::types::{base_node_id, md, DocType, Document};

/// Counts reported by a hierarchical indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexSummary {
    pub sections: usize,
    pub parents: usize,
    pub leaves: usize,
}

/// The retrieval engine. One instance per corpus; safe to share across runs.
pub struct RagEngine {
    store: Arc<dyn VectorStore>,
    config: RagConfig,
    // node_id -> parent document, primed at index time, lazily filled on search.
    parent_cache: Mutex<HashMap<String, Document>>,
    indexed: AtomicBool,
}

impl RagEngine {
    pub fn new(store: Arc<dyn VectorStore>, config: RagConfig) -> Self {
        Self {
            store,
            config,
            parent_cache: Mutex::new(HashMap::new()),
            indexed: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Whether a corpus has been indexed through this engine.
    pub fn is_indexed(&self) -> bool {
        self.indexed.load(Ordering::Acquire)
    }

    // ------------------------------------------------------------------
    // Indexing
    // ------------------------------------------------------------------

    /// Index an ordered list of paragraph documents as a section hierarchy.
    ///
    /// Every section becomes one `parent` document; sections with no child
    /// sections additionally have their body split into bounded `leaf` parts.
    /// The whole batch is upserted in one call, replacing prior copies of the
    /// same nodes.
    pub async fn index_hierarchical(
        &self,
        paragraphs: Vec<Document>,
    ) -> Result<IndexSummary, RetrievalError> {
        info!(paragraphs = paragraphs.len(), "Hierarchical indexing started");
        let sections = assemble_sections(&paragraphs);

        let mut child_count: HashMap<&str, usize> = HashMap::new();
        for s in &sections {
            if let Some(pid) = &s.parent_id {
                *child_count.entry(pid.as_str()).or_insert(0) += 1;
            }
        }

        let mut to_index: Vec<Document> = Vec::new();
        {
            let mut cache = self.parent_cache.lock().expect("parent cache poisoned");
            cache.clear();
            for s in &sections {
                let is_leaf_section = child_count.get(s.node_id.as_str()).copied().unwrap_or(0) == 0;

                let parent_doc = self.section_to_parent_doc(s);
                cache.insert(s.node_id.clone(), parent_doc.clone());
                to_index.push(parent_doc);

                if is_leaf_section
                    && s.assembled_body_text.trim().chars().count() > self.config.min_body_chars
                {
                    to_index.extend(self.split_leaf(s));
                }
            }
        }

        let parents = to_index.iter().filter(|d| d.is_parent()).count();
        let leaves = to_index.iter().filter(|d| d.is_leaf()).count();
        info!(parents, leaves, "Indexing section documents");

        let orphan_leaves = to_index
            .iter()
            .filter(|d| d.is_leaf() && d.meta_str(md::PARENT_ID).is_none())
            .count();
        if orphan_leaves > 0 {
            warn!(orphan_leaves, "Leaf documents missing parent_id");
        }

        self.store.add(to_index).await?;
        self.log_tree(&sections);
        self.indexed.store(true, Ordering::Release);
        info!(sections = sections.len(), "Hierarchical indexing finished");

        Ok(IndexSummary {
            sections: sections.len(),
            parents,
            leaves,
        })
    }

    /// Flat fallback indexing: chunk pre-extracted documents without any
    /// hierarchy and upsert the parts.
    pub async fn index_flat(&self, documents: Vec<Document>) -> Result<usize, RetrievalError> {
        let mut chunks = Vec::new();
        for doc in &documents {
            for (i, part) in split_body(&doc.text, self.config.chunk_size, self.config.chunk_overlap)
                .into_iter()
                .enumerate()
            {
                let mut metadata = doc.metadata.clone();
                metadata.insert(md::TYPE.to_string(), serde_json::json!(DocType::Leaf.as_str()));
                let id = if doc.id.is_empty() {
                    format!("flat#{i}")
                } else {
                    format!("{}#{}", doc.id, i + 1)
                };
                chunks.push(Document::new(part, metadata).with_id(id));
            }
        }
        let count = chunks.len();
        self.store.add(chunks).await?;
        self.indexed.store(true, Ordering::Release);
        info!(chunks = count, "Flat indexing finished");
        Ok(count)
    }

    fn section_to_parent_doc(&self, s: &Section) -> Document {
        let mut meta = s.base_metadata();
        meta.insert(
            md::TYPE.to_string(),
            serde_json::json!(DocType::Parent.as_str()),
        );
        Document::new(s.assembled_body_text.clone(), meta).with_id(s.node_id.clone())
    }

    fn split_leaf(&self, s: &Section) -> Vec<Document> {
        let parts = split_body(
            &s.assembled_body_text,
            self.config.chunk_size,
            self.config.chunk_overlap,
        );
        parts
            .into_iter()
            .enumerate()
            .map(|(i, part)| {
                let mut meta = s.base_metadata();
                // Leaves reference their own section, not the section's parent.
                meta.insert(md::PARENT_ID.to_string(), serde_json::json!(s.node_id));
                meta.insert(
                    md::TYPE.to_string(),
                    serde_json::json!(DocType::Leaf.as_str()),
                );
                let node_id = format!("{}#{}", s.node_id, i + 1);
                meta.insert(md::NODE_ID.to_string(), serde_json::json!(node_id));
                Document::new(part, meta).with_id(node_id)
            })
            .collect()
    }

    fn log_tree(&self, sections: &[Section]) {
        for s in sections {
            let indent = "  ".repeat(s.level.max(0) as usize);
            debug!(
                "{}• {} [{:?},{:?}] pos={}",
                indent, s.title, s.page_start, s.page_end, s.position
            );
            if !s.assembled_body_text.trim().is_empty() {
                debug!("{}  └ {}", indent, preview(&s.assembled_body_text, 120));
            }
        }
    }

    // ------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------

    /// Hierarchical search: two passes with PRF expansion, RRF fusion,
    /// base-section dedup, Jaccard diversification, and family scoring.
    ///
    /// Returns the ordered context: per family, the resolved parent document
    /// followed by its kept leaves.
    pub async fn search_hierarchical(
        &self,
        query: &str,
        top_k_leaf: usize,
        max_families: usize,
        max_children_per_family: usize,
    ) -> Result<Vec<Document>, RetrievalError> {
        info!(
            query,
            top_k_leaf, max_families, max_children_per_family, "Hierarchical search"
        );

        let q0 = query.trim();
        let q_embed = format!("{}{}", self.config.query_prefix, q0);
        let pass_k = std::cmp::max(top_k_leaf * 3, 30);

        let pass1 = self
            .store
            .similarity_search(&q_embed, pass_k, DocFilter::Type(DocType::Leaf))
            .await?;
        debug!(hits = pass1.len(), "pass one");

        let prf_terms =
            expand_query_prf(&pass1, self.config.prf_docs, self.config.prf_terms);
        let q2 = if prf_terms.is_empty() {
            q_embed.clone()
        } else {
            format!("{}{} {}", self.config.query_prefix, q0, prf_terms)
        };

        let pass2 = self
            .store
            .similarity_search(&q2, pass_k, DocFilter::Type(DocType::Leaf))
            .await?;
        debug!(hits = pass2.len(), prf = %prf_terms, "pass two");

        let fused = rrf_fuse(&pass1, &pass2, self.config.rrf_k);

        // Dedup by base section: one part per section, best fused rank wins.
        let mut seen_nodes: HashSet<String> = HashSet::new();
        let mut deduped: Vec<Document> = Vec::new();
        for d in fused {
            if !d.is_leaf() {
                continue;
            }
            let Some(nid) = d.meta_str(md::NODE_ID) else {
                continue;
            };
            let base = base_node_id(nid).to_string();
            if seen_nodes.insert(base) {
                deduped.push(d);
            }
        }

        // Diversify: drop candidates too similar to anything already kept.
        let mut diversified: Vec<Document> = Vec::new();
        let mut kept_signatures: Vec<HashSet<String>> = Vec::new();
        for d in deduped {
            let sig = token_set(&format!(
                "{} {}",
                d.meta_str(md::TITLE).unwrap_or_default(),
                preview(&d.text, 400)
            ));
            let too_similar = kept_signatures
                .iter()
                .any(|prev| jaccard(&sig, prev) >= self.config.diversify_threshold);
            if !too_similar {
                kept_signatures.push(sig);
                diversified.push(d);
            }
        }
        diversified.truncate(top_k_leaf);

        // Group into families by parent id, preserving rank order.
        let mut family_order: Vec<String> = Vec::new();
        let mut by_parent: HashMap<String, Vec<Document>> = HashMap::new();
        for d in diversified {
            let Some(pid) = d.meta_str(md::PARENT_ID).map(str::to_string) else {
                continue;
            };
            if !by_parent.contains_key(&pid) {
                family_order.push(pid.clone());
            }
            by_parent.entry(pid).or_default().push(d);
        }

        let query_tokens = token_set(q0);
        let mut families: Vec<(f64, Option<Document>, Vec<Document>)> = Vec::new();
        for pid in family_order {
            let mut kids = by_parent.remove(&pid).unwrap_or_default();
            kids.sort_by_key(|d| d.meta_i64(md::POSITION).unwrap_or(0));
            kids.truncate(max_children_per_family);

            let best_sem = kids
                .iter()
                .map(|d| 1.0 - d.meta_f64(md::DISTANCE).unwrap_or(1.0).min(1.0))
                .fold(0.0f64, f64::max);

            let parent = self.resolve_parent(&pid).await;
            let lex_overlap = parent
                .as_ref()
                .map(|p| {
                    let p_tokens = token_set(&format!(
                        "{} {}",
                        p.meta_str(md::TITLE).unwrap_or_default(),
                        p.meta_str(md::HEADING_PATH).unwrap_or_default()
                    ));
                    jaccard(&query_tokens, &p_tokens)
                })
                .unwrap_or(0.0);

            let penalty = duplicate_penalty(&kids);
            let score = 0.7 * best_sem + 0.3 * lex_overlap - penalty;
            families.push((score, parent, kids));
        }

        families.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        families.truncate(max_families);

        let mut context: Vec<Document> = Vec::new();
        for (score, parent, kids) in families {
            debug!(
                score,
                parent = parent.as_ref().map(|p| p.display_title()),
                children = kids.len(),
                "family kept"
            );
            if let Some(p) = parent {
                context.push(p);
            }
            context.extend(kids);
        }

        info!(documents = context.len(), "Hierarchical search finished");
        Ok(context)
    }

    /// Flat similarity search, no filter, no fusion. Kept for comparison and
    /// corpora indexed without hierarchy.
    pub async fn search_flat(&self, query: &str, k: usize) -> Result<Vec<Document>, RetrievalError> {
        debug!(query, k, "Flat search");
        self.store.similarity_search(query, k, DocFilter::Any).await
    }

    /// Resolve a parent document by node id.
    ///
    /// The store cannot filter on arbitrary metadata equality, so resolution
    /// falls back to a capped parent-typed scan matched by `node_id` in
    /// process; hits are cached for the engine's lifetime.
    async fn resolve_parent(&self, parent_id: &str) -> Option<Document> {
        {
            let cache = self.parent_cache.lock().expect("parent cache poisoned");
            if let Some(doc) = cache.get(parent_id) {
                return Some(doc.clone());
            }
        }

        let parents = match self
            .store
            .similarity_search(
                "parent",
                self.config.parent_scan_top_k,
                DocFilter::Type(DocType::Parent),
            )
            .await
        {
            Ok(parents) => parents,
            Err(e) => {
                warn!(parent_id, error = %e, "Parent scan failed");
                return None;
            }
        };

        for d in parents {
            if d.meta_str(md::NODE_ID) == Some(parent_id) {
                let mut cache = self.parent_cache.lock().expect("parent cache poisoned");
                cache.insert(parent_id.to_string(), d.clone());
                return Some(d);
            }
        }

        warn!(parent_id, "Parent not found in vector store");
        None
    }
}

/// Mine expansion terms from the top pass-one hits: TF x a smoothed IDF over
/// the small pool, returning the top terms joined by spaces.
fn expand_query_prf(docs: &[Document], m: usize, top_terms: usize) -> String {
    let use_n = std::cmp::min(m, docs.len());
    if use_n == 0 {
        return String::new();
    }

    let mut tf: HashMap<String, usize> = HashMap::new();
    let mut df: HashMap<String, usize> = HashMap::new();
    for d in &docs[..use_n] {
        let mut seen: HashSet<&str> = HashSet::new();
        let text = format!("{} {}", d.meta_str(md::TITLE).unwrap_or_default(), d.text);
        let tokens = tokenize(&text);
        for t in &tokens {
            *tf.entry(t.clone()).or_insert(0) += 1;
        }
        for t in &tokens {
            if seen.insert(t.as_str()) {
                *df.entry(t.clone()).or_insert(0) += 1;
            }
        }
    }

    let n = use_n.max(1) as f64;
    let mut scored: Vec<(String, f64)> = tf
        .into_iter()
        .map(|(term, count)| {
            let d = df.get(&term).copied().unwrap_or(1).max(1) as f64;
            (term.clone(), count as f64 * (1.0 + n / d).ln())
        })
        .collect();
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(top_terms);

    let extra = scored
        .into_iter()
        .map(|(t, _)| t)
        .collect::<Vec<_>>()
        .join(" ");
    debug!(terms = %extra, "PRF expansion");
    extra
}

/// Reciprocal rank fusion of two ranked lists with constant `k`.
///
/// Each appearance at 0-based rank `i` contributes `1 / (k + i + 1)`;
/// duplicates are merged by stable key; the stable sort keeps first-seen
/// order among ties.
fn rrf_fuse(a: &[Document], b: &[Document], k: usize) -> Vec<Document> {
    let mut score: HashMap<String, f64> = HashMap::new();
    for (i, d) in a.iter().enumerate() {
        *score.entry(d.fuse_key()).or_insert(0.0) += 1.0 / (k as f64 + i as f64 + 1.0);
    }
    for (i, d) in b.iter().enumerate() {
        *score.entry(d.fuse_key()).or_insert(0.0) += 1.0 / (k as f64 + i as f64 + 1.0);
    }

    // Keys are taken from the originals; clones of identity-keyed documents
    // would not reproduce them.
    let mut merged: Vec<(String, Document)> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    for d in a.iter().chain(b.iter()) {
        let key = d.fuse_key();
        if seen.insert(key.clone()) {
            merged.push((key, d.clone()));
        }
    }

    merged.sort_by(|(k1, _), (k2, _)| {
        let s1 = score.get(k1).copied().unwrap_or(0.0);
        let s2 = score.get(k2).copied().unwrap_or(0.0);
        s2.partial_cmp(&s1).unwrap_or(std::cmp::Ordering::Equal)
    });
    merged.into_iter().map(|(_, d)| d).collect()
}

/// Extra leaves sharing one base section cost 0.2 each.
fn duplicate_penalty(kids: &[Document]) -> f64 {
    let mut by_base: HashMap<String, usize> = HashMap::new();
    for d in kids {
        if let Some(nid) = d.meta_str(md::NODE_ID) {
            *by_base.entry(base_node_id(nid).to_string()).or_insert(0) += 1;
        }
    }
    let extra: usize = by_base.values().map(|c| c.saturating_sub(1)).sum();
    extra as f64 * 0.2
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embeddings::LocalEmbedder;
    use crate::store::InMemoryVectorStore;
    use std::collections::HashMap as Map;

    fn leaf(node_id: &str, parent_id: &str, text: &str, position: i64, distance: f64) -> Document {
        let mut meta = Map::new();
        meta.insert(md::NODE_ID.to_string(), serde_json::json!(node_id));
        meta.insert(md::PARENT_ID.to_string(), serde_json::json!(parent_id));
        meta.insert(md::TYPE.to_string(), serde_json::json!("leaf"));
        meta.insert(md::POSITION.to_string(), serde_json::json!(position));
        meta.insert(md::DISTANCE.to_string(), serde_json::json!(distance));
        Document::new(text, meta).with_id(node_id)
    }

    fn para(level: i64, title: Option<&str>, text: &str, page: i64) -> Document {
        let mut meta = Map::new();
        meta.insert(md::LEVEL.to_string(), serde_json::json!(level));
        if let Some(t) = title {
            meta.insert(md::TITLE.to_string(), serde_json::json!(t));
        }
        meta.insert("page_number".to_string(), serde_json::json!(page));
        Document::new(text, meta)
    }

    fn engine() -> RagEngine {
        // Wide local embedder keeps hash collisions out of ranking assertions.
        let store = Arc::new(InMemoryVectorStore::new(Arc::new(LocalEmbedder::new(1024))));
        RagEngine::new(store, RagConfig::default())
    }

    #[test]
    fn test_rrf_identical_lists_keep_order() {
        let docs = vec![
            leaf("s1#1", "s1", "first", 1, 0.1),
            leaf("s2#1", "s2", "second", 2, 0.2),
            leaf("s3#1", "s3", "third", 3, 0.3),
        ];
        let fused = rrf_fuse(&docs, &docs, 60);
        let ids: Vec<&str> = fused.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["s1#1", "s2#1", "s3#1"]);
    }

    #[test]
    fn test_rrf_promotes_doc_present_in_both_lists() {
        let a = vec![leaf("x#1", "x", "only in a", 1, 0.1), leaf("y#1", "y", "both", 2, 0.1)];
        let b = vec![leaf("y#1", "y", "both", 2, 0.1)];
        let fused = rrf_fuse(&a, &b, 60);
        assert_eq!(fused[0].id, "y#1");
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn test_duplicate_penalty() {
        let kids = vec![
            leaf("s1#1", "s1", "a", 1, 0.1),
            leaf("s1#2", "s1", "b", 2, 0.1),
            leaf("s2#1", "s2", "c", 3, 0.1),
        ];
        assert!((duplicate_penalty(&kids) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_prf_extracts_frequent_terms() {
        let docs = vec![
            leaf("s1#1", "s1", "scholarship rules scholarship amounts", 1, 0.1),
            leaf("s2#1", "s2", "scholarship eligibility criteria", 2, 0.2),
        ];
        let terms = expand_query_prf(&docs, 10, 3);
        assert!(terms.contains("scholarship"));
    }

    #[test]
    fn test_prf_empty_pool() {
        assert_eq!(expand_query_prf(&[], 10, 8), "");
    }

    #[tokio::test]
    async fn test_index_counts_and_flag() {
        let engine = engine();
        assert!(!engine.is_indexed());
        let paras = vec![
            para(1, Some("Chapter 1"), "Chapter 1", 1),
            para(
                0,
                None,
                "Alpha beta gamma delta epsilon zeta eta theta iota kappa.",
                1,
            ),
            para(1, Some("Chapter 2"), "Chapter 2", 2),
            para(0, None, "Completely different topic about scholarships.", 2),
        ];
        let summary = engine.index_hierarchical(paras).await.unwrap();
        assert_eq!(summary.sections, 2);
        assert_eq!(summary.parents, 2);
        assert!(summary.leaves >= 2);
        assert!(engine.is_indexed());
    }

    #[tokio::test]
    async fn test_section_tree_invariant_after_indexing() {
        let engine = engine();
        let paras = vec![
            para(1, Some("Top"), "Top", 1),
            para(0, None, "Top body text that is long enough to split.", 1),
            para(2, Some("Nested"), "Nested", 2),
            para(0, None, "Nested body text that is long enough as well.", 2),
        ];
        engine.index_hierarchical(paras).await.unwrap();

        let store = &engine.store;
        let leaves = store
            .similarity_search("body", 100, DocFilter::Type(DocType::Leaf))
            .await
            .unwrap();
        let parents = store
            .similarity_search("body", 100, DocFilter::Type(DocType::Parent))
            .await
            .unwrap();
        assert!(!leaves.is_empty());

        let parent_ids: HashSet<&str> =
            parents.iter().filter_map(|p| p.meta_str(md::NODE_ID)).collect();
        for l in &leaves {
            let pid = l.meta_str(md::PARENT_ID).expect("leaf has parent_id");
            assert!(parent_ids.contains(pid), "leaf parent {pid} must resolve");
            let nid = l.meta_str(md::NODE_ID).unwrap();
            assert!(nid.contains('#'), "leaf node_id carries a part suffix");
            assert_eq!(base_node_id(nid), pid);
        }
        for p in &parents {
            assert!(!p.meta_str(md::NODE_ID).unwrap().contains('#'));
        }
    }

    #[tokio::test]
    async fn test_search_dedups_parts_of_one_section() {
        let engine = engine();
        // One long leaf section: splitting produces multiple parts that all
        // match the query; the result must keep only one.
        let body = "University scholarship payment rules. ".repeat(40);
        let paras = vec![
            para(1, Some("Scholarships"), "Scholarships", 1),
            para(0, None, &body, 1),
        ];
        engine.index_hierarchical(paras).await.unwrap();

        let ctx = engine
            .search_hierarchical("scholarship payment", 12, 2, 5)
            .await
            .unwrap();
        let leaf_bases: Vec<&str> = ctx
            .iter()
            .filter(|d| d.is_leaf())
            .map(|d| base_node_id(d.meta_str(md::NODE_ID).unwrap()))
            .collect();
        let unique: HashSet<&&str> = leaf_bases.iter().collect();
        assert_eq!(leaf_bases.len(), unique.len());
    }

    #[tokio::test]
    async fn test_family_includes_parent_document() {
        let engine = engine();
        let paras = vec![
            para(1, Some("Chapter 1"), "Chapter 1", 1),
            para(
                0,
                None,
                "Alpha beta gamma rules about admission and enrollment procedures.",
                1,
            ),
            para(1, Some("Chapter 2"), "Chapter 2", 2),
            para(0, None, "Completely unrelated text about sports facilities.", 2),
        ];
        engine.index_hierarchical(paras).await.unwrap();

        let ctx = engine.search_hierarchical("gamma", 12, 2, 3).await.unwrap();
        assert!(!ctx.is_empty());
        assert!(ctx[0].is_parent(), "family starts with its parent");
        assert_eq!(ctx[0].meta_str(md::TITLE), Some("Chapter 1"));
        assert!(ctx.iter().any(|d| d.is_leaf()));
    }

    #[tokio::test]
    async fn test_unresolvable_parent_family_still_emitted() {
        let engine = engine();
        // Hand-insert leaves whose parent was never indexed.
        engine
            .store
            .add(vec![leaf("ghost#1", "ghost", "orphan leaf text about admission", 1, 0.0)])
            .await
            .unwrap();

        let ctx = engine
            .search_hierarchical("admission", 5, 2, 3)
            .await
            .unwrap();
        assert_eq!(ctx.len(), 1);
        assert!(ctx[0].is_leaf());
    }
}
