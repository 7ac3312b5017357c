//! Three-Tiered Atom Cache
//!
//! Read-through caching of atoms with Memory (RAM), Warm (disk) and Cold
//! (backing store) tiers, plus an independent search result cache.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────────┐
//! │                           AtomCache (coordinator)                        │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  Memory Tier          │ Warm Tier            │ Cold Tier                 │
//! │  ┌────────────────┐   │ ┌────────────────┐   │ ┌────────────────────┐    │
//! │  │ Strict LRU     │   │ │ File per atom  │   │ │ ColdStore backend  │    │
//! │  │ one Mutex      │   │ │ + LRU index    │   │ │ + timeout          │    │
//! │  │ 256 atoms      │   │ │ 1000 atoms     │   │ │ authoritative      │    │
//! │  └────────────────┘   │ └────────────────┘   │ └────────────────────┘    │
//! │         ▲             │         ▲            │           │               │
//! │         └─────────────┴─────────┴────────────┴───────────┘               │
//! │                         promotion on hit                                 │
//! ├──────────────────────────────────────────────────────────────────────────┤
//! │  Search Cache: query hash -> result snapshot, 1h TTL                     │
//! └──────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Lookups go Memory → Warm → Cold and stop at the first hit. A warm hit is
//! promoted into memory; a cold hit is promoted into warm and memory.

mod atom;
mod cold;
mod coordinator;
mod memory;
mod metrics;
mod recency;
mod search;
mod warm;

use std::time::Duration;

pub use atom::{Atom, AtomId};
pub use cold::{ColdStore, ColdStoreStats, ColdTier, InMemoryColdStore};
pub use coordinator::{AtomCache, Lookup};
pub use memory::MemoryTier;
pub use metrics::{CacheMetrics, Counters, LatencyTracker, Occupancy, StatsSnapshot};
pub use recency::RecencyMap;
pub use search::SearchCache;
pub use warm::WarmTier;

/// Default memory tier capacity (atoms)
pub const DEFAULT_MEMORY_CAPACITY: usize = 256;

/// Default warm tier capacity (atoms)
pub const DEFAULT_WARM_CAPACITY: usize = 1000;

/// Default search result TTL (1 hour)
pub const DEFAULT_SEARCH_TTL: Duration = Duration::from_secs(60 * 60);

/// Default maximum number of cached queries
pub const DEFAULT_SEARCH_CAPACITY: usize = 512;

/// Default cold store call timeout
pub const DEFAULT_COLD_TIMEOUT: Duration = Duration::from_secs(5);

/// Cache tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// In-process LRU (hot)
    Memory,
    /// On-disk files (warm)
    Warm,
    /// Backing store (cold)
    Cold,
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Tier::Memory => write!(f, "memory"),
            Tier::Warm => write!(f, "warm"),
            Tier::Cold => write!(f, "cold"),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
