use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};

use super::types::{GeneratedBlock, GenerationContext};

pub const CACHE_KEY_PREFIX: &str = "genblocks_";

/// Longer TTLs are clamped to this.
pub const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

struct CacheEntry {
    value: GeneratedBlock,
    expires_at: Instant,
}

/// In-memory TTL cache of fully validated generation results.
///
/// Entries are never mutated, only replaced (last write wins) or expired.
/// Expired entries are evicted lazily on read and by [`purge_expired`](Self::purge_expired).
#[derive(Default)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl ResponseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<GeneratedBlock> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) if entry.expires_at > Instant::now() => Some(entry.value.clone()),
            Some(_) => {
                entries.remove(key);
                None
            }
            None => None,
        }
    }

    pub fn insert(&self, key: String, value: GeneratedBlock, ttl: Duration) {
        if ttl > MAX_TTL {
            tracing::warn!(
                requested_secs = ttl.as_secs(),
                max_secs = MAX_TTL.as_secs(),
                "Cache TTL clamped"
            );
        }
        let Some(expires_at) = Instant::now().checked_add(ttl.min(MAX_TTL)) else {
            tracing::warn!(key = %key, "Cache expiry out of range, entry not stored");
            return;
        };
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.insert(key, CacheEntry { value, expires_at });
    }

    /// Drop every entry. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let count = entries.len();
        entries.clear();
        count
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, entry| entry.expires_at > now);
        before - entries.len()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// `genblocks_` + hex SHA-256 of the prompt and the canonical JSON of the context.
pub fn cache_key(prompt: &str, context: &GenerationContext) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    hasher.update([0u8]);
    hasher.update(serde_json::to_vec(context).unwrap_or_default());
    format!("{}{}", CACHE_KEY_PREFIX, hex::encode(hasher.finalize()))
}
