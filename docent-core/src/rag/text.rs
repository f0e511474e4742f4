//! Token and string utilities shared by the retrieval engine.

use std::collections::HashSet;

/// Stop words excluded from tokenization (corpus is mixed Russian/English).
const STOP_WORDS: &[&str] = &[
    "и", "в", "во", "на", "о", "об", "от", "до", "за", "над", "под", "по", "из", "у", "к", "с",
    "для", "это", "как", "что", "the", "a", "an", "of", "to", "in", "on", "for", "and", "or",
    "is", "are", "be", "as", "at", "by", "with", "from",
];

fn is_stop_word(token: &str) -> bool {
    STOP_WORDS.contains(&token)
}

/// Lowercase, split on non-alphanumeric runs, keep tokens of length >= 3 that
/// are not stop words. Order-preserving, duplicates retained.
pub fn tokenize(s: &str) -> Vec<String> {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 3 && !is_stop_word(t))
        .map(str::to_string)
        .collect()
}

/// Unique tokens of `s`, insertion-ordered semantics are irrelevant here.
pub fn token_set(s: &str) -> HashSet<String> {
    tokenize(s).into_iter().collect()
}

/// Jaccard similarity of two token sets; 0.0 when either set is empty.
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let (smaller, larger) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    let inter = smaller.iter().filter(|t| larger.contains(*t)).count();
    let union = a.len() + b.len() - inter;
    if union == 0 {
        0.0
    } else {
        inter as f64 / union as f64
    }
}

/// First `n` characters of the trimmed string, with an ellipsis when cut.
pub fn preview(s: &str, n: usize) -> String {
    let trimmed = s.trim();
    let mut out: String = trimmed.chars().take(n).collect();
    if trimmed.chars().count() > n {
        out.push('…');
    }
    out
}

/// Truncate to at most `limit` characters, appending an ellipsis when cut.
pub fn truncate(s: &str, limit: usize) -> String {
    if s.chars().count() <= limit {
        return s.to_string();
    }
    let mut out: String = s.chars().take(limit).collect();
    out.push('…');
    out
}
