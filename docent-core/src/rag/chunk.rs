//! Bounded-size splitting of leaf section bodies.
//!
//! Splits on the first separator that yields multiple pieces (paragraph,
//! line, sentence, word), accumulating pieces up to the size limit with a
//! character overlap between adjacent parts; falls back to fixed-size
//! windows for unbroken text.

const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

/// Split `text` into parts of at most `max_chars` characters with roughly
/// `overlap` characters of trailing context carried into the next part.
pub fn split_body(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    for sep in SEPARATORS {
        let pieces: Vec<&str> = text.split(sep).collect();
        if pieces.len() > 1 {
            return accumulate(&pieces, sep, max_chars, overlap);
        }
    }
    split_fixed(text, max_chars, overlap)
}

fn accumulate(pieces: &[&str], sep: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();

    for piece in pieces {
        if !current.is_empty()
            && current.chars().count() + sep.chars().count() + piece.chars().count() > max_chars
        {
            let emitted = current.trim().to_string();
            if !emitted.is_empty() {
                parts.push(emitted);
            }
            current = tail_chars(&current, overlap);
        }
        if !current.is_empty() {
            current.push_str(sep);
        }
        current.push_str(piece);
    }
    let emitted = current.trim().to_string();
    if !emitted.is_empty() {
        parts.push(emitted);
    }

    if parts.is_empty() {
        split_fixed(pieces.join(sep).as_str(), max_chars, overlap)
    } else {
        parts
    }
}

fn split_fixed(text: &str, max_chars: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }
    let mut parts = Vec::new();
    let mut start = 0usize;
    loop {
        let end = (start + max_chars).min(chars.len());
        let part: String = chars[start..end].iter().collect();
        let part = part.trim().to_string();
        if !part.is_empty() {
            parts.push(part);
        }
        if end >= chars.len() {
            break;
        }
        start = end.saturating_sub(overlap.min(max_chars - 1));
        if start >= chars.len() {
            break;
        }
    }
    parts
}

fn tail_chars(s: &str, n: usize) -> String {
    if n == 0 {
        return String::new();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= n {
        return s.to_string();
    }
    chars[chars.len() - n..].iter().collect()
}
