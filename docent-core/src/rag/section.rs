//! Section tree assembly.
//!
//! Turns a flat, ordered list of paragraph documents into sections: headings
//! (non-zero level) paired with the body text found between themselves and
//! the next heading of equal-or-lower level. Sections are build-time only;
//! the indexer turns them into parent and leaf documents.

use uuid::Uuid;

use crate::types::{md, Document};

/// One input paragraph, normalized from document metadata.
#[derive(Debug, Clone)]
struct Item {
    level: i64,
    title: Option<String>,
    text: String,
    page_start: Option<i64>,
    page_end: Option<i64>,
    position: i64,
}

/// An assembled section of the corpus hierarchy.
#[derive(Debug, Clone)]
pub struct Section {
    pub node_id: String,
    pub parent_id: Option<String>,
    pub level: i64,
    pub title: String,
    pub heading_path: String,
    pub page_start: Option<i64>,
    pub page_end: Option<i64>,
    pub position: i64,
    pub assembled_body_text: String,
}

fn meta_str_any<'a>(doc: &'a Document, keys: &[&str]) -> Option<&'a str> {
    keys.iter().find_map(|k| doc.meta_str(k))
}

fn meta_i64_any(doc: &Document, keys: &[&str]) -> Option<i64> {
    keys.iter().find_map(|k| doc.meta_i64(k))
}

fn normalize(paras: &[Document]) -> Vec<Item> {
    let mut items = Vec::with_capacity(paras.len());
    let mut pos_counter = 0i64;
    for doc in paras {
        pos_counter += 1;
        items.push(Item {
            level: meta_i64_any(doc, &[md::LEVEL, "paragraph_level", "toc_level"]).unwrap_or(0),
            title: meta_str_any(doc, &[md::TITLE, "heading", "paragraph_title"])
                .map(str::to_string),
            text: doc.text.clone(),
            page_start: meta_i64_any(doc, &["page_number", "start_page_number", "page"]),
            page_end: meta_i64_any(doc, &["end_page_number", md::PAGE_END]),
            position: pos_counter,
        });
    }
    items
}

/// Assemble sections from ordered paragraph documents.
///
/// Headings are sorted by `(page_start, level, position)` so a parent heading
/// precedes its children on the same page; a stack walk assigns parents and
/// breadcrumbs; body text is collected from `level == 0` paragraphs between a
/// heading and the next heading of equal-or-lower level.
pub fn assemble_sections(paras: &[Document]) -> Vec<Section> {
    let items = normalize(paras);

    let mut headings: Vec<&Item> = items
        .iter()
        .filter(|it| {
            it.level > 0
                && it
                    .title
                    .as_deref()
                    .map(|t| !t.trim().is_empty())
                    .unwrap_or(false)
        })
        .collect();
    headings.sort_by_key(|it| (it.page_start.unwrap_or(i64::MAX), it.level, it.position));

    let mut stack: Vec<(String, i64, String)> = Vec::new(); // (node_id, level, title)
    let mut sections: Vec<Section> = Vec::new();
    for h in headings {
        while stack
            .last()
            .map(|(_, level, _)| *level >= h.level)
            .unwrap_or(false)
        {
            stack.pop();
        }
        let title = h.title.clone().unwrap_or_default();
        let mut path: Vec<&str> = stack.iter().map(|(_, _, t)| t.as_str()).collect();
        path.push(&title);
        let heading_path = path.join(" > ");

        let section = Section {
            node_id: Uuid::new_v4().to_string(),
            parent_id: stack.last().map(|(id, _, _)| id.clone()),
            level: h.level,
            title: title.clone(),
            heading_path,
            page_start: h.page_start,
            page_end: h.page_end,
            position: h.position,
            assembled_body_text: String::new(),
        };
        stack.push((section.node_id.clone(), section.level, title));
        sections.push(section);
    }

    // Body: level==0 items strictly between this heading and the next
    // equal-or-lower-level heading (in assembled order).
    for i in 0..sections.len() {
        let cur_pos = sections[i].position;
        let cur_level = sections[i].level;
        let end_pos_exclusive = sections[i + 1..]
            .iter()
            .find(|nx| nx.level <= cur_level)
            .map(|nx| nx.position)
            .unwrap_or(i64::MAX);

        let mut body = String::new();
        for it in &items {
            if it.level == 0 && it.position > cur_pos && it.position < end_pos_exclusive {
                let t = it.text.trim();
                if !t.is_empty() {
                    if !body.is_empty() {
                        body.push('\n');
                    }
                    body.push_str(t);
                }
            }
        }
        if body.is_empty() {
            let tail = find_non_heading_tail(&items, cur_pos, end_pos_exclusive);
            let tail = tail.trim();
            if !tail.is_empty() {
                body.push_str(tail);
            }
        }
        sections[i].assembled_body_text = body;
    }

    sections
}

/// Heuristic tail extraction: when a heading item carries body text inline,
/// take its lines after the first blank/sentence-ending line, stopping at a
/// line that looks like another heading.
fn find_non_heading_tail(items: &[Item], cur_pos: i64, _end_pos_exclusive: i64) -> String {
    let Some(head) = items.iter().find(|it| it.position == cur_pos) else {
        return String::new();
    };
    let mut out = String::new();
    let mut in_tail = false;
    for line in head.text.lines() {
        let s = line.trim();
        if !in_tail {
            if s.ends_with('.') || s.ends_with(':') || s.is_empty() {
                in_tail = true;
            }
            continue;
        }
        if looks_like_heading(s) {
            break;
        }
        if !s.is_empty() {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(s);
        }
    }
    out
}

/// A line "looks like a heading" when it is short, and at least 60% of its
/// words of three or more characters are fully uppercase.
pub(crate) fn looks_like_heading(s: &str) -> bool {
    if s.chars().count() >= 200 {
        return false;
    }
    let cleaned: String = s
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let mut words = 0usize;
    let mut caps = 0usize;
    for w in cleaned.split_whitespace() {
        words += 1;
        if w.chars().count() >= 3 && w == w.to_uppercase() {
            caps += 1;
        }
    }
    words > 0 && caps >= std::cmp::max(1, (words as f64 * 0.6).round() as usize)
}

impl Section {
    /// Metadata map for the documents built from this section.
    pub fn base_metadata(&self) -> std::collections::HashMap<String, serde_json::Value> {
        let mut meta = std::collections::HashMap::new();
        meta.insert(md::NODE_ID.to_string(), serde_json::json!(self.node_id));
        if let Some(pid) = &self.parent_id {
            meta.insert(md::PARENT_ID.to_string(), serde_json::json!(pid));
        }
        meta.insert(md::LEVEL.to_string(), serde_json::json!(self.level));
        meta.insert(md::TITLE.to_string(), serde_json::json!(self.title));
        meta.insert(
            md::HEADING_PATH.to_string(),
            serde_json::json!(self.heading_path),
        );
        if let Some(p) = self.page_start {
            meta.insert(md::PAGE_START.to_string(), serde_json::json!(p));
        }
        if let Some(p) = self.page_end {
            meta.insert(md::PAGE_END.to_string(), serde_json::json!(p));
        }
        meta.insert(md::POSITION.to_string(), serde_json::json!(self.position));
        meta
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn para(level: i64, title: Option<&str>, text: &str, page: i64) -> Document {
        let mut meta = HashMap::new();
        meta.insert(md::LEVEL.to_string(), serde_json::json!(level));
        if let Some(t) = title {
            meta.insert(md::TITLE.to_string(), serde_json::json!(t));
        }
        meta.insert("page_number".to_string(), serde_json::json!(page));
        Document::new(text, meta)
    }

    #[test]
    fn test_two_level_tree() {
        let paras = vec![
            para(1, Some("Chapter 1"), "Chapter 1", 1),
            para(0, None, "Alpha beta gamma.", 1),
            para(2, Some("Chapter 1.1"), "Chapter 1.1", 2),
            para(0, None, "Delta epsilon.", 2),
            para(1, Some("Chapter 2"), "Chapter 2", 3),
            para(0, None, "Unrelated tail.", 3),
        ];
        let sections = assemble_sections(&paras);
        assert_eq!(sections.len(), 3);

        let ch1 = &sections[0];
        let ch11 = &sections[1];
        let ch2 = &sections[2];
        assert_eq!(ch1.title, "Chapter 1");
        assert_eq!(ch1.parent_id, None);
        assert_eq!(ch11.parent_id.as_deref(), Some(ch1.node_id.as_str()));
        assert_eq!(ch11.heading_path, "Chapter 1 > Chapter 1.1");
        assert_eq!(ch2.parent_id, None);

        // Chapter 1 owns only the body before Chapter 1.1's subtree boundary?
        // No: 1.1 is deeper, so Chapter 1's body extends until Chapter 2.
        assert!(ch1.assembled_body_text.contains("Alpha beta gamma."));
        assert!(ch1.assembled_body_text.contains("Delta epsilon."));
        assert_eq!(ch11.assembled_body_text, "Delta epsilon.");
        assert_eq!(ch2.assembled_body_text, "Unrelated tail.");
    }

    #[test]
    fn test_sibling_boundary_excludes_next_section_body() {
        let paras = vec![
            para(1, Some("A"), "A", 1),
            para(0, None, "Body of A.", 1),
            para(1, Some("B"), "B", 2),
            para(0, None, "Body of B.", 2),
        ];
        let sections = assemble_sections(&paras);
        assert_eq!(sections[0].assembled_body_text, "Body of A.");
        assert_eq!(sections[1].assembled_body_text, "Body of B.");
    }

    #[test]
    fn test_blank_titles_are_not_headings() {
        let paras = vec![
            para(1, Some("  "), "ignored", 1),
            para(1, Some("Real"), "Real", 1),
            para(0, None, "Body.", 1),
        ];
        let sections = assemble_sections(&paras);
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].title, "Real");
    }

    #[test]
    fn test_parent_before_child_on_same_page() {
        // Child appears first in input order but the page/level sort puts the
        // parent heading first.
        let paras = vec![
            para(2, Some("1.1 Details"), "1.1 Details", 5),
            para(1, Some("1 Overview"), "1 Overview", 5),
            para(0, None, "Shared body.", 5),
        ];
        let sections = assemble_sections(&paras);
        assert_eq!(sections[0].title, "1 Overview");
        assert_eq!(
            sections[1].parent_id.as_deref(),
            Some(sections[0].node_id.as_str())
        );
    }

    #[test]
    fn test_tail_extraction_when_no_body_paragraphs() {
        let heading_text = "Section heading:\nThis sentence rode along with the heading.\nAnd another one.";
        let paras = vec![para(1, Some("Section heading"), heading_text, 1)];
        let sections = assemble_sections(&paras);
        assert!(sections[0]
            .assembled_body_text
            .contains("This sentence rode along with the heading."));
    }

    #[test]
    fn test_looks_like_heading() {
        assert!(looks_like_heading("GENERAL PROVISIONS"));
        assert!(!looks_like_heading("A normal sentence about things."));
        assert!(!looks_like_heading(""));
    }
}
