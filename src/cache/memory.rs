//! Memory Tier - in-process hot cache
//!
//! Fixed-capacity strict LRU over atoms. The fastest and smallest tier.
//!
//! # Design
//!
//! - One `parking_lot::Mutex` guards the recency map; a hit reorders, so
//!   `get` mutates and takes the same lock as `put`
//! - Occupancy is mirrored into an atomic so `len()` never blocks
//! - Entries are counted, not sized: capacity is a number of atoms

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use parking_lot::Mutex;
use tracing::trace;

use super::atom::Atom;
use super::recency::RecencyMap;
use super::DEFAULT_MEMORY_CAPACITY;
use crate::error::{Error, Result};

/// Memory Tier - in-process LRU cache
pub struct MemoryTier {
    /// Recency-ordered entries
    entries: Mutex<RecencyMap<Atom>>,
    /// Mirror of `entries.len()` for lock-free reads
    len: AtomicUsize,
    /// Eviction count
    evictions: AtomicU64,
    capacity: usize,
}

impl MemoryTier {
    /// Create a memory tier with the default capacity
    pub fn new() -> Self {
        Self::build(DEFAULT_MEMORY_CAPACITY)
    }

    /// Create a memory tier holding at most `capacity` atoms
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("memory tier capacity must be at least 1".into()));
        }
        Ok(Self::build(capacity))
    }

    fn build(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(RecencyMap::new(capacity)),
            len: AtomicUsize::new(0),
            evictions: AtomicU64::new(0),
            capacity,
        }
    }

    /// Get an atom, marking it most recently used
    pub fn get(&self, id: &str) -> Option<Atom> {
        let mut entries = self.entries.lock();
        entries.get(id).cloned()
    }

    /// Insert an atom, evicting the least recently used entry when full
    pub fn put(&self, id: impl Into<String>, atom: Atom) {
        let mut entries = self.entries.lock();
        if let Some((evicted, _)) = entries.insert(id.into(), atom) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            trace!(atom = %evicted, "memory tier evicted");
        }
        self.len.store(entries.len(), Ordering::Relaxed);
    }

    /// Remove an atom
    pub fn remove(&self, id: &str) -> Option<Atom> {
        let mut entries = self.entries.lock();
        let removed = entries.remove(id);
        self.len.store(entries.len(), Ordering::Relaxed);
        removed
    }

    /// Check membership without touching recency
    pub fn contains(&self, id: &str) -> bool {
        self.entries.lock().contains(id)
    }

    /// Number of cached atoms
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    /// Cached ids, most recently used first
    pub fn ids(&self) -> Vec<String> {
        self.entries.lock().keys_by_recency()
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        entries.clear();
        self.len.store(0, Ordering::Relaxed);
    }

    pub fn reset_counters(&self) {
        self.evictions.store(0, Ordering::Relaxed);
    }
}

impl Default for MemoryTier {
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
    use proptest::prelude::*;
    use std::sync::Arc;

    fn make_atom(id: &str) -> Atom {
        Atom::new(id, "note").with_field("body", format!("body of {}", id))
    }

    #[test]
    fn test_memory_tier_creation() {
        let tier = MemoryTier::new();
        assert!(tier.is_empty());
        assert_eq!(tier.capacity(), DEFAULT_MEMORY_CAPACITY);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(MemoryTier::with_capacity(0), Err(Error::Config(_))));
    }

    #[test]
    fn test_put_get() {
        let tier = MemoryTier::new();
        tier.put("a", make_atom("a"));

        assert_eq!(tier.get("a"), Some(make_atom("a")));
        assert!(tier.get("missing").is_none());
        assert!(tier.contains("a"));
        assert_eq!(tier.len(), 1);
    }

    #[test]
    fn test_lru_eviction_order() {
        let tier = MemoryTier::with_capacity(3).unwrap();
        for id in ["a", "b", "c", "d"] {
            tier.put(id, make_atom(id));
        }

        assert!(!tier.contains("a"));
        assert_eq!(tier.ids(), vec!["d", "c", "b"]);
        assert_eq!(tier.evictions(), 1);
    }

    #[test]
    fn test_get_protects_from_eviction() {
        let tier = MemoryTier::with_capacity(2).unwrap();
        tier.put("a", make_atom("a"));
        tier.put("b", make_atom("b"));

        tier.get("a");
        tier.put("c", make_atom("c"));

        assert!(tier.contains("a"));
        assert!(!tier.contains("b"));
    }

    #[test]
    fn test_put_existing_refreshes_without_growing() {
        let tier = MemoryTier::with_capacity(2).unwrap();
        tier.put("a", make_atom("a"));
        tier.put("b", make_atom("b"));
        tier.put("a", make_atom("a"));

        assert_eq!(tier.len(), 2);
        assert_eq!(tier.evictions(), 0);

        tier.put("c", make_atom("c"));
        assert!(tier.contains("a"));
        assert!(!tier.contains("b"));
    }

    #[test]
    fn test_remove_and_clear() {
        let tier = MemoryTier::new();
        tier.put("a", make_atom("a"));
        tier.put("b", make_atom("b"));

        assert!(tier.remove("a").is_some());
        assert!(tier.remove("a").is_none());
        assert_eq!(tier.len(), 1);

        tier.clear();
        assert!(tier.is_empty());
    }

    #[test]
    fn test_concurrent_access_respects_capacity() {
        let tier = Arc::new(MemoryTier::with_capacity(64).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tier = Arc::clone(&tier);
                std::thread::spawn(move || {
                    for i in 0..500 {
                        let id = format!("atom-{}-{}", t, i % 100);
                        tier.put(id.clone(), make_atom(&id));
                        tier.get(&id);
                        assert!(tier.len() <= 64);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(tier.len(), 64);
        assert_eq!(tier.ids().len(), 64);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Property: size never exceeds capacity for any put/get sequence.
        #[test]
        fn prop_capacity_invariant(
            capacity in 1usize..16,
            ops in prop::collection::vec((any::<bool>(), 0u8..32), 1..200),
        ) {
            let tier = MemoryTier::with_capacity(capacity).unwrap();
            for (is_put, key) in ops {
                let id = format!("k{}", key);
                if is_put {
                    tier.put(id.clone(), make_atom(&id));
                } else {
                    tier.get(&id);
                }
                prop_assert!(tier.len() <= capacity);
            }
        }

        /// Property: after capacity+1 distinct puts, exactly the first is gone.
        #[test]
        fn prop_evicts_exactly_lru(capacity in 1usize..32) {
            let tier = MemoryTier::with_capacity(capacity).unwrap();
            for i in 0..=capacity {
                let id = format!("k{}", i);
                tier.put(id.clone(), make_atom(&id));
            }
            prop_assert!(!tier.contains("k0"));
            for i in 1..=capacity {
                let id = format!("k{}", i);
                prop_assert!(tier.contains(&id));
            }
        }
    }
}
