//! Recency-ordered map with strict LRU eviction
//!
//! Shared by the memory and warm tiers. Not synchronized: each tier wraps it
//! in its own lock.
//!
//! # Design
//!
//! - Every touch stamps the entry with a fresh tick from a monotonic counter
//! - `order` maps tick -> key, so the smallest tick is the LRU victim
//! - All operations are O(log n)

use std::collections::{BTreeMap, HashMap};

struct Slot<V> {
    value: V,
    tick: u64,
}

/// Fixed-capacity map evicting the least-recently-used key first
pub struct RecencyMap<V> {
    slots: HashMap<String, Slot<V>>,
    order: BTreeMap<u64, String>,
    next_tick: u64,
    capacity: usize,
}

impl<V> RecencyMap<V> {
    /// Create an empty map. `capacity` must be non-zero; callers validate it.
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            slots: HashMap::with_capacity(capacity.min(4096)),
            order: BTreeMap::new(),
            next_tick: 0,
            capacity,
        }
    }

    fn bump(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    /// Look up `key` and mark it most recently used
    pub fn get(&mut self, key: &str) -> Option<&V> {
        let tick = self.next_tick;
        let slot = self.slots.get_mut(key)?;
        self.order.remove(&slot.tick);
        slot.tick = tick;
        self.order.insert(tick, key.to_string());
        self.next_tick += 1;
        Some(&slot.value)
    }

    /// Look up `key` without touching its recency
    pub fn peek(&self, key: &str) -> Option<&V> {
        self.slots.get(key).map(|slot| &slot.value)
    }

    /// Insert or refresh `key` as most recently used.
    ///
    /// Returns the evicted entry when a new key pushes the map past capacity.
    /// Re-inserting an existing key never evicts.
    pub fn insert(&mut self, key: String, value: V) -> Option<(String, V)> {
        let tick = self.bump();

        if let Some(slot) = self.slots.get_mut(&key) {
            self.order.remove(&slot.tick);
            slot.tick = tick;
            slot.value = value;
            self.order.insert(tick, key);
            return None;
        }

        let evicted = if self.slots.len() >= self.capacity {
            self.pop_lru()
        } else {
            None
        };

        self.order.insert(tick, key.clone());
        self.slots.insert(key, Slot { value, tick });
        evicted
    }

    /// Remove and return the least recently used entry
    pub fn pop_lru(&mut self) -> Option<(String, V)> {
        let (_, key) = self.order.pop_first()?;
        let slot = self.slots.remove(&key)?;
        Some((key, slot.value))
    }

    /// Remove `key`
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let slot = self.slots.remove(key)?;
        self.order.remove(&slot.tick);
        Some(slot.value)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys ordered most recently used first
    pub fn keys_by_recency(&self) -> Vec<String> {
        self.order.values().rev().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.order.clear();
    }
}
