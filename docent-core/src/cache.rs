//! TTL-bounded embedding cache.
//!
//! Maps `(model, item key)` to a vector, namespaced per model so a model swap
//! never serves stale vectors. Shared by the tool classifier and any store
//! wanting to reuse query embeddings; safe for concurrent runs.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

struct Entry {
    vector: Vec<f32>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self, now: Instant) -> bool {
        matches!(self.expires_at, Some(at) if at <= now)
    }
}

/// Concurrent `(model, key) -> vector` cache with per-entry TTL.
#[derive(Default)]
pub struct EmbeddingCache {
    entries: Mutex<HashMap<(String, String), Entry>>,
}

impl EmbeddingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a cached vector if present and fresh. Expired entries are
    /// removed and reported as absent.
    pub fn get(&self, model: &str, key: &str) -> Option<Vec<f32>> {
        let mut entries = self.entries.lock().expect("embedding cache poisoned");
        let map_key = (model.to_string(), key.to_string());
        let now = Instant::now();
        if let Some(entry) = entries.get(&map_key) {
            if entry.is_expired(now) {
                entries.remove(&map_key);
                return None;
            }
            return Some(entry.vector.clone());
        }
        None
    }

    /// Store a vector. A zero TTL means the entry never expires.
    pub fn put(&self, model: &str, key: &str, vector: Vec<f32>, ttl: Duration) {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Some(Instant::now() + ttl)
        };
        let mut entries = self.entries.lock().expect("embedding cache poisoned");
        entries.insert(
            (model.to_string(), key.to_string()),
            Entry { vector, expires_at },
        );
    }

    /// Drop every entry cached under the given model.
    pub fn evict_model(&self, model: &str) {
        let mut entries = self.entries.lock().expect("embedding cache poisoned");
        entries.retain(|(m, _), _| m != model);
    }

    /// Number of live (possibly expired, not yet pruned) entries.
    pub fn len(&self) -> usize {
        self.entries.lock().expect("embedding cache poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
