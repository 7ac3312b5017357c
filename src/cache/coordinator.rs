//! Atom Cache - the coordinator
//!
//! Orchestrates Memory → Warm → Cold lookups with promotion on hit, batch
//! retrieval, cached search, and statistics. Construct one per process and
//! share it by `Arc`.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::atom::{Atom, AtomId};
use super::cold::{ColdStore, ColdTier};
use super::memory::MemoryTier;
use super::metrics::{CacheMetrics, Counters, LatencyTracker, Occupancy, StatsSnapshot};
use super::search::SearchCache;
use super::warm::WarmTier;
use super::Tier;
use crate::config::CacheConfig;
use crate::error::{Error, Result};

/// Result of a tier-aware lookup
#[derive(Debug, Clone)]
pub struct Lookup {
    /// The atom
    pub atom: Atom,
    /// Which tier served it
    pub tier: Tier,
    /// Lookup latency
    pub latency: Duration,
}

/// Multi-tier atom cache
pub struct AtomCache {
    /// Memory (RAM) tier
    memory: MemoryTier,
    /// Warm (disk) tier
    warm: WarmTier,
    /// Cold (backing store) tier
    cold: ColdTier,
    /// Search result cache
    search: SearchCache,
    /// Configuration
    config: CacheConfig,
    /// Statistics
    metrics: CacheMetrics,
}

impl AtomCache {
    /// Build a cache in front of `cold_store`.
    ///
    /// Fails only on invalid configuration. An unusable cache directory is
    /// logged and the warm tier degrades to always-miss.
    pub fn new(config: CacheConfig, cold_store: Arc<dyn ColdStore>) -> Result<Self> {
        config.validate()?;

        let memory = MemoryTier::with_capacity(config.memory_capacity)?;
        let warm = WarmTier::open(config.warm_dir(), config.warm_capacity)?;
        let cold = ColdTier::with_timeout(cold_store, config.cold_timeout());
        let search = SearchCache::with_ttl(config.search_ttl(), config.search_capacity);

        info!(
            root = %config.root_dir.display(),
            memory_capacity = config.memory_capacity,
            warm_capacity = config.warm_capacity,
            warm_entries = warm.len(),
            "atom cache ready"
        );

        Ok(Self {
            memory,
            warm,
            cold,
            search,
            config,
            metrics: CacheMetrics::new(),
        })
    }

    /// Get an atom, searching all tiers
    pub async fn get(&self, id: &str) -> Option<Atom> {
        self.lookup(id).await.map(|found| found.atom)
    }

    /// Get an atom and report which tier served it
    pub async fn lookup(&self, id: &str) -> Option<Lookup> {
        let start = Instant::now();

        // Try memory first
        let tracker = LatencyTracker::start();
        if let Some(atom) = self.memory.get(id) {
            self.metrics.record_read_latency(Tier::Memory, tracker.elapsed());
            self.metrics.apply(&Counters::lookup(Some(Tier::Memory)));
            debug!(atom = id, tier = %Tier::Memory, "cache hit");
            return Some(Lookup {
                atom,
                tier: Tier::Memory,
                latency: start.elapsed(),
            });
        }

        // Try warm
        let tracker = LatencyTracker::start();
        if let Some(atom) = self.warm.get(id) {
            self.metrics.record_read_latency(Tier::Warm, tracker.elapsed());
            self.memory.put(id, atom.clone());

            let mut delta = Counters::lookup(Some(Tier::Warm));
            delta.promotions_to_memory = 1;
            self.metrics.apply(&delta);
            debug!(atom = id, tier = %Tier::Warm, "cache hit");
            return Some(Lookup {
                atom,
                tier: Tier::Warm,
                latency: start.elapsed(),
            });
        }

        // Try cold
        let tracker = LatencyTracker::start();
        match self.cold.fetch_one(id).await {
            Ok(Some(atom)) => {
                self.metrics.record_read_latency(Tier::Cold, tracker.elapsed());

                let mut delta = Counters::lookup(Some(Tier::Cold));
                self.promote_from_cold(id, &atom, &mut delta);
                self.metrics.apply(&delta);
                debug!(atom = id, tier = %Tier::Cold, "cache hit");
                Some(Lookup {
                    atom,
                    tier: Tier::Cold,
                    latency: start.elapsed(),
                })
            }
            Ok(None) => {
                self.metrics.apply(&Counters::lookup(None));
                debug!(atom = id, "cache miss");
                None
            }
            Err(e) => {
                let mut delta = Counters::lookup(None);
                delta.cold_failure(&e);
                self.metrics.apply(&delta);
                log_cold_failure("fetch_one", &e);
                None
            }
        }
    }

    /// Copy a cold-sourced atom into warm and memory
    fn promote_from_cold(&self, id: &str, atom: &Atom, delta: &mut Counters) {
        if self.warm.put(id, atom) {
            delta.promotions_to_warm += 1;
        }
        self.memory.put(id, atom.clone());
        delta.promotions_to_memory += 1;
    }

    /// Get many atoms with at most one cold store round trip.
    ///
    /// Every found atom is returned exactly once; duplicate ids are collapsed
    /// and output order is unspecified.
    pub async fn batch_get<S: AsRef<str>>(&self, ids: &[S]) -> Vec<Atom> {
        let mut seen: HashSet<&str> = HashSet::with_capacity(ids.len());
        let mut found = Vec::with_capacity(ids.len());
        let mut remaining: Vec<AtomId> = Vec::new();
        let mut delta = Counters::default();

        for id in ids.iter().map(AsRef::as_ref) {
            if !seen.insert(id) {
                continue;
            }
            delta.total_requests += 1;

            if let Some(atom) = self.memory.get(id) {
                delta.memory_hits += 1;
                found.push(atom);
                continue;
            }

            if let Some(atom) = self.warm.get(id) {
                self.memory.put(id, atom.clone());
                delta.warm_hits += 1;
                delta.promotions_to_memory += 1;
                found.push(atom);
                continue;
            }

            remaining.push(id.to_string());
        }

        if !remaining.is_empty() {
            let tracker = LatencyTracker::start();
            match self.cold.fetch_many(&remaining).await {
                Ok(atoms) => {
                    self.metrics.record_read_latency(Tier::Cold, tracker.elapsed());

                    let wanted: HashSet<&str> = remaining.iter().map(String::as_str).collect();
                    let mut served: HashSet<String> = HashSet::with_capacity(atoms.len());
                    for atom in atoms {
                        if !wanted.contains(atom.id.as_str()) || served.contains(&atom.id) {
                            continue;
                        }
                        served.insert(atom.id.clone());
                        self.promote_from_cold(&atom.id, &atom, &mut delta);
                        delta.cold_hits += 1;
                        found.push(atom);
                    }
                    delta.misses += (remaining.len() - served.len()) as u64;
                }
                Err(e) => {
                    delta.cold_failure(&e);
                    delta.misses += remaining.len() as u64;
                    log_cold_failure("fetch_many", &e);
                }
            }
        }

        debug!(
            requested = delta.total_requests,
            memory = delta.memory_hits,
            warm = delta.warm_hits,
            cold = delta.cold_hits,
            missing = delta.misses,
            "batch lookup"
        );
        self.metrics.apply(&delta);
        found
    }

    /// Search the cold store, serving repeated queries from the search cache
    pub async fn search(&self, query: &str, limit: usize) -> Vec<Atom> {
        if let Some(results) = self.search.get(query, limit) {
            return results;
        }

        match self.cold.search(query, limit).await {
            Ok(results) => {
                debug!(query, results = results.len(), "search served by cold store");
                self.search.put(query, limit, results.clone());
                results
            }
            Err(e) => {
                let mut delta = Counters::default();
                delta.cold_failure(&e);
                self.metrics.apply(&delta);
                log_cold_failure("search", &e);
                Vec::new()
            }
        }
    }

    /// Drop an atom from memory and warm tiers. The cold store is untouched.
    pub fn invalidate(&self, id: &str) -> bool {
        let in_memory = self.memory.remove(id).is_some();
        let on_disk = self.warm.remove(id);
        in_memory || on_disk
    }

    /// Drop every cached search result
    pub fn invalidate_search(&self) {
        self.search.clear();
    }

    /// Empty memory and warm tiers and reset all counters
    pub fn clear(&self) {
        self.memory.clear();
        let removed = self.warm.clear();
        self.memory.reset_counters();
        self.warm.reset_counters();
        self.search.reset_counters();
        self.metrics.reset();
        info!(warm_files_removed = removed, "atom cache cleared");
    }

    /// Add counters carried over from an earlier run, e.g. a persisted snapshot
    pub fn restore_counters(&self, counters: &Counters) {
        self.metrics.apply(counters);
    }

    /// Current statistics
    pub fn stats(&self) -> StatsSnapshot {
        let occupancy = Occupancy {
            memory_entries: self.memory.len(),
            memory_capacity: self.memory.capacity(),
            memory_evictions: self.memory.evictions(),
            warm_entries: self.warm.len(),
            warm_capacity: self.warm.capacity(),
            warm_evictions: self.warm.evictions(),
            search_entries: self.search.len(),
            search_hits: self.search.hits(),
            search_misses: self.search.misses(),
        };
        StatsSnapshot::new(self.metrics.counters(), occupancy, &self.metrics)
    }

    /// Write the current statistics to the stats file, atomically
    pub fn persist_stats(&self) -> Result<PathBuf> {
        let path = self.config.stats_path();
        let data = serde_json::to_vec_pretty(&self.stats())?;

        std::fs::create_dir_all(&self.config.root_dir)?;
        let temp = path.with_extension(format!("{}.tmp", uuid::Uuid::new_v4()));
        std::fs::write(&temp, &data)?;
        if let Err(e) = std::fs::rename(&temp, &path) {
            let _ = std::fs::remove_file(&temp);
            return Err(e.into());
        }

        debug!(path = %path.display(), "statistics written");
        Ok(path)
    }

    /// Get reference to the memory tier
    pub fn memory(&self) -> &MemoryTier {
        &self.memory
    }

    /// Get reference to the warm tier
    pub fn warm(&self) -> &WarmTier {
        &self.warm
    }

    /// Get reference to the cold tier
    pub fn cold(&self) -> &ColdTier {
        &self.cold
    }

    /// Get reference to the search cache
    pub fn search_cache(&self) -> &SearchCache {
        &self.search
    }

    /// Get configuration
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

fn log_cold_failure(operation: &str, error: &Error) {
    if error.is_timeout() {
        warn!(operation, error = %error, "cold store timed out, treating as miss");
    } else {
        warn!(operation, error = %error, "cold store failed, treating as miss");
    }
}

// =============================================================================
// Tests
// =============================================================================
