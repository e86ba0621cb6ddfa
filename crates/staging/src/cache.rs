//! Extraction result cache.
//!
//! Content-hash keyed, version-stamped, TTL-bound. The cache is an
//! accelerator, never a source of truth: every read re-checks the stored
//! version stamp against the caller's current one and treats any mismatch as
//! a miss. Losing the whole cache (eviction, crash, flush) loses nothing but
//! time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Build the key under which a window's extraction result is cached. The
/// extractor and schema versions participate so that bumping either silently
/// invalidates every stale entry.
pub fn cache_key(window_text: &str, extractor_version: &str, schema_version: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(window_text.as_bytes());
    hasher.update(extractor_version.as_bytes());
    hasher.update(schema_version.as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    /// Serialized result, stored verbatim so a hit is byte-equal to the
    /// computation that produced it.
    pub payload: String,
    pub version: String,
    pub saved_at: DateTime<Utc>,
}

/// Counters for hit-rate observability.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub invalidations: u64,
    pub entries: usize,
}

/// In-memory keyed store with TTL and version invalidation.
pub struct ExtractionCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    invalidations: AtomicU64,
}

/// Cache entries older than this are dead regardless of version.
pub const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

impl ExtractionCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
        }
    }

    /// Look up `key`, treating TTL expiry and version drift as misses. An
    /// invalidated entry is removed eagerly.
    pub fn get(&self, key: &str, current_version: &str) -> Option<String> {
        let stale = match self.entries.get(key) {
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                return None;
            }
            Some(entry) => {
                let expired = Utc::now().signed_duration_since(entry.saved_at)
                    >= chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
                if !expired && entry.version == current_version {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Some(entry.payload.clone());
                }
                true
            }
        };
        if stale {
            self.entries.remove(key);
            self.invalidations.fetch_add(1, Ordering::Relaxed);
            self.misses.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    pub fn put(&self, key: impl Into<String>, payload: impl Into<String>, version: impl Into<String>) {
        self.entries.insert(
            key.into(),
            CacheEntry {
                payload: payload.into(),
                version: version.into(),
                saved_at: Utc::now(),
            },
        );
    }

    /// Drop everything. Safe at any time; the cache is not a source of truth.
    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }
}

impl Default for ExtractionCache {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_depends_on_all_inputs() {
        let base = cache_key("window", "1.0.0", "1.2.0");
        assert_eq!(base, cache_key("window", "1.0.0", "1.2.0"));
        assert_ne!(base, cache_key("window!", "1.0.0", "1.2.0"));
        assert_ne!(base, cache_key("window", "1.0.1", "1.2.0"));
        assert_ne!(base, cache_key("window", "1.0.0", "1.3.0"));
    }

    #[test]
    fn hit_returns_stored_payload_byte_equal() {
        let cache = ExtractionCache::default();
        let payload = r#"{"entities":[{"type":"Service","name":"nginx"}]}"#;
        cache.put("k1", payload, "v1");
        assert_eq!(cache.get("k1", "v1").as_deref(), Some(payload));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 0);
    }

    #[test]
    fn version_drift_invalidates() {
        let cache = ExtractionCache::default();
        cache.put("k1", "old result", "v1");
        assert!(cache.get("k1", "v2").is_none());
        // The entry is gone, not resurrected by asking with the old version.
        assert!(cache.get("k1", "v1").is_none());
        assert_eq!(cache.stats().invalidations, 1);
    }

    #[test]
    fn ttl_expiry_is_a_miss() {
        let cache = ExtractionCache::new(Duration::ZERO);
        cache.put("k1", "result", "v1");
        assert!(cache.get("k1", "v1").is_none());
    }

    #[test]
    fn clear_is_lossless_for_correctness() {
        let cache = ExtractionCache::default();
        cache.put("k1", "result", "v1");
        cache.clear();
        assert!(cache.get("k1", "v1").is_none());
        assert_eq!(cache.stats().entries, 0);
    }
}
