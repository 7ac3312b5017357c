//! Search Result Cache
//!
//! Caches cold-store search results keyed by a hash of the normalized query.
//! Entries expire a fixed TTL after creation regardless of use.
//!
//! Results are a denormalized snapshot: promoting, evicting or invalidating
//! atoms in the record tiers never touches a cached result set.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::atom::{digest_hex, Atom};
use super::{DEFAULT_SEARCH_CAPACITY, DEFAULT_SEARCH_TTL};

/// Cached result set
#[derive(Debug, Clone)]
struct SearchEntry {
    results: Vec<Atom>,
    created_at: Instant,
}

impl SearchEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        self.created_at.elapsed() >= ttl
    }
}

/// Search result cache with TTL expiry
pub struct SearchCache {
    entries: DashMap<String, SearchEntry>,
    /// Held by writers so the capacity check and insert happen together
    insert_lock: Mutex<()>,
    ttl: Duration,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl SearchCache {
    /// Create a cache with the default TTL and capacity
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_SEARCH_TTL, DEFAULT_SEARCH_CAPACITY)
    }

    /// Create a cache with a custom TTL and maximum number of queries
    pub fn with_ttl(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            insert_lock: Mutex::new(()),
            ttl,
            capacity: capacity.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Cache key for a query: trimmed, lowercased, whitespace collapsed, plus limit
    pub fn key_for(query: &str, limit: usize) -> String {
        let normalized = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect::<Vec<_>>()
            .join(" ");
        digest_hex(&format!("{}\u{0}{}", normalized, limit))
    }

    /// Cached results for `query`, or `None` if absent or expired
    pub fn get(&self, query: &str, limit: usize) -> Option<Vec<Atom>> {
        let key = Self::key_for(query, limit);

        if let Some(entry) = self.entries.get(&key) {
            if !entry.is_expired(self.ttl) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                debug!(query, "search cache hit");
                return Some(entry.results.clone());
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Store results for `query`, replacing any previous (possibly expired) entry
    pub fn put(&self, query: &str, limit: usize, results: Vec<Atom>) {
        let key = Self::key_for(query, limit);
        let _guard = self.insert_lock.lock();

        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.purge_expired();
            if self.entries.len() >= self.capacity {
                self.evict_oldest();
            }
        }

        self.entries.insert(
            key,
            SearchEntry {
                results,
                created_at: Instant::now(),
            },
        );
    }

    /// Drop expired entries. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let before = self.entries.len();
        let ttl = self.ttl;
        self.entries.retain(|_, entry| !entry.is_expired(ttl));
        before.saturating_sub(self.entries.len())
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.value().created_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            self.entries.remove(&key);
        }
    }

    /// Drop every cached result
    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Entries physically present, including expired ones not yet purged
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }

    /// Zero the hit/miss counters, keeping cached results
    pub fn reset_counters(&self) {
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
    }
}

impl Default for SearchCache {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn results(ids: &[&str]) -> Vec<Atom> {
        ids.iter().map(|id| Atom::new(*id, "note")).collect()
    }

    #[test]
    fn test_key_normalization() {
        assert_eq!(
            SearchCache::key_for("  Rust   Traits ", 10),
            SearchCache::key_for("rust traits", 10)
        );
        assert_ne!(
            SearchCache::key_for("rust traits", 10),
            SearchCache::key_for("rust traits", 5)
        );
        assert_ne!(
            SearchCache::key_for("rust", 10),
            SearchCache::key_for("tokio", 10)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_put_get() {
        let cache = SearchCache::new();
        assert!(cache.get("rust", 10).is_none());

        cache.put("rust", 10, results(&["a", "b"]));
        let hit = cache.get("RUST", 10).unwrap();
        assert_eq!(hit.len(), 2);
        assert_eq!(cache.hits(), 1);
        assert_eq!(cache.misses(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_result_is_cached() {
        let cache = SearchCache::new();
        cache.put("nothing", 10, Vec::new());
        assert_eq!(cache.get("nothing", 10), Some(Vec::new()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_absent() {
        let cache = SearchCache::with_ttl(Duration::from_secs(3600), 16);
        cache.put("rust", 10, results(&["a"]));

        tokio::time::advance(Duration::from_secs(3599)).await;
        assert!(cache.get("rust", 10).is_some());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cache.get("rust", 10).is_none());
        // Still physically present until purged or overwritten
        assert_eq!(cache.len(), 1);

        cache.put("rust", 10, results(&["b"]));
        assert_eq!(cache.get("rust", 10).unwrap()[0].id, "b");
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let cache = SearchCache::with_ttl(Duration::from_secs(10), 16);
        cache.put("old", 10, results(&["a"]));
        tokio::time::advance(Duration::from_secs(11)).await;
        cache.put("new", 10, results(&["b"]));

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get("new", 10).is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_capacity_evicts_oldest() {
        let cache = SearchCache::with_ttl(Duration::from_secs(3600), 2);
        cache.put("first", 10, results(&["a"]));
        tokio::time::advance(Duration::from_millis(1)).await;
        cache.put("second", 10, results(&["b"]));
        tokio::time::advance(Duration::from_millis(1)).await;
        cache.put("third", 10, results(&["c"]));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("first", 10).is_none());
        assert!(cache.get("second", 10).is_some());
        assert!(cache.get("third", 10).is_some());
    }

    #[test]
    fn test_concurrent_puts_respect_capacity() {
        let cache = Arc::new(SearchCache::with_ttl(Duration::from_secs(3600), 8));

        let writers: Vec<_> = (0..8)
            .map(|t| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        cache.put(&format!("query {} {}", t, i), 10, results(&["a"]));
                    }
                })
            })
            .collect();

        for writer in writers {
            writer.join().unwrap();
        }
        // Racing inserts past the bound would never be evicted back down
        assert_eq!(cache.len(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear() {
        let cache = SearchCache::new();
        cache.put("rust", 10, results(&["a"]));
        cache.clear();
        assert!(cache.is_empty());
    }
}
