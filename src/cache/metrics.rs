//! Cache Statistics
//!
//! Hit/miss counters per tier, read latency per tier, and snapshot export.
//!
//! Counters live behind one lock and are updated by applying a per-request
//! delta, so a concurrent snapshot sees either all of a request's increments
//! or none of them. Latency averages are advisory and stay lock-free.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use prometheus::{Encoder, Gauge, IntGauge, Opts, Registry, TextEncoder};
use serde::{Deserialize, Serialize};

use super::Tier;
use crate::error::{Error, Result};

/// Monotonic request counters
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Counters {
    pub memory_hits: u64,
    pub warm_hits: u64,
    pub cold_hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub promotions_to_memory: u64,
    pub promotions_to_warm: u64,
    pub cold_timeouts: u64,
    pub cold_errors: u64,
}

impl Counters {
    /// Delta for one lookup served by `tier`, or a miss when `None`
    pub fn lookup(served_by: Option<Tier>) -> Self {
        let mut delta = Self {
            total_requests: 1,
            ..Default::default()
        };
        match served_by {
            Some(Tier::Memory) => delta.memory_hits = 1,
            Some(Tier::Warm) => delta.warm_hits = 1,
            Some(Tier::Cold) => delta.cold_hits = 1,
            None => delta.misses = 1,
        }
        delta
    }

    /// Record a cold store failure on this delta
    pub fn cold_failure(&mut self, error: &Error) {
        if error.is_timeout() {
            self.cold_timeouts += 1;
        } else {
            self.cold_errors += 1;
        }
    }

    fn add(&mut self, other: &Counters) {
        self.memory_hits += other.memory_hits;
        self.warm_hits += other.warm_hits;
        self.cold_hits += other.cold_hits;
        self.misses += other.misses;
        self.total_requests += other.total_requests;
        self.promotions_to_memory += other.promotions_to_memory;
        self.promotions_to_warm += other.promotions_to_warm;
        self.cold_timeouts += other.cold_timeouts;
        self.cold_errors += other.cold_errors;
    }

    /// Requests served by any tier
    pub fn hits(&self) -> u64 {
        self.memory_hits + self.warm_hits + self.cold_hits
    }

    /// Fraction of requests served by any tier; 0 when nothing was requested
    pub fn hit_rate(&self) -> f64 {
        fraction(self.hits(), self.total_requests)
    }
}

fn fraction(part: u64, total: u64) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 / total as f64
    }
}

/// Cache metrics collector
#[derive(Debug, Default)]
pub struct CacheMetrics {
    counters: Mutex<Counters>,

    // Read latencies (microseconds, exponential moving average)
    memory_read_latency_us: AtomicU64,
    warm_read_latency_us: AtomicU64,
    cold_read_latency_us: AtomicU64,
}

impl CacheMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply one request's increments atomically
    pub fn apply(&self, delta: &Counters) {
        self.counters.lock().add(delta);
    }

    /// Current counters
    pub fn counters(&self) -> Counters {
        *self.counters.lock()
    }

    pub fn record_read_latency(&self, tier: Tier, duration: Duration) {
        let target = match tier {
            Tier::Memory => &self.memory_read_latency_us,
            Tier::Warm => &self.warm_read_latency_us,
            Tier::Cold => &self.cold_read_latency_us,
        };
        update_latency_ema(target, duration);
    }

    pub fn read_latency(&self, tier: Tier) -> Duration {
        let source = match tier {
            Tier::Memory => &self.memory_read_latency_us,
            Tier::Warm => &self.warm_read_latency_us,
            Tier::Cold => &self.cold_read_latency_us,
        };
        Duration::from_micros(source.load(Ordering::Relaxed))
    }

    /// Reset all metrics
    pub fn reset(&self) {
        *self.counters.lock() = Counters::default();
        self.memory_read_latency_us.store(0, Ordering::Relaxed);
        self.warm_read_latency_us.store(0, Ordering::Relaxed);
        self.cold_read_latency_us.store(0, Ordering::Relaxed);
    }
}

fn update_latency_ema(target: &AtomicU64, duration: Duration) {
    let new_us = duration.as_micros() as u64;
    let alpha = 0.1; // EMA smoothing factor

    loop {
        let current = target.load(Ordering::Relaxed);
        let updated = if current == 0 {
            new_us
        } else {
            ((1.0 - alpha) * current as f64 + alpha * new_us as f64) as u64
        };

        if target
            .compare_exchange_weak(current, updated, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
        {
            break;
        }
    }
}

/// Point-in-time view of the cache
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    // Counters
    pub memory_hits: u64,
    pub warm_hits: u64,
    pub cold_hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub promotions_to_memory: u64,
    pub promotions_to_warm: u64,
    pub cold_timeouts: u64,
    pub cold_errors: u64,

    // Derived
    pub hit_rate: f64,
    pub memory_hit_fraction: f64,
    pub warm_hit_fraction: f64,
    pub cold_hit_fraction: f64,

    // Occupancy
    pub memory_entries: usize,
    pub memory_capacity: usize,
    pub memory_evictions: u64,
    pub warm_entries: usize,
    pub warm_capacity: usize,
    pub warm_evictions: u64,
    pub search_entries: usize,
    pub search_hits: u64,
    pub search_misses: u64,

    // Latency (microseconds)
    pub memory_read_latency_us: u64,
    pub warm_read_latency_us: u64,
    pub cold_read_latency_us: u64,

    pub captured_at: DateTime<Utc>,
}

/// Tier occupancy figures gathered by the coordinator
#[derive(Debug, Clone, Copy, Default)]
pub struct Occupancy {
    pub memory_entries: usize,
    pub memory_capacity: usize,
    pub memory_evictions: u64,
    pub warm_entries: usize,
    pub warm_capacity: usize,
    pub warm_evictions: u64,
    pub search_entries: usize,
    pub search_hits: u64,
    pub search_misses: u64,
}

impl StatsSnapshot {
    pub fn new(counters: Counters, occupancy: Occupancy, metrics: &CacheMetrics) -> Self {
        let total = counters.total_requests;
        Self {
            memory_hits: counters.memory_hits,
            warm_hits: counters.warm_hits,
            cold_hits: counters.cold_hits,
            misses: counters.misses,
            total_requests: total,
            promotions_to_memory: counters.promotions_to_memory,
            promotions_to_warm: counters.promotions_to_warm,
            cold_timeouts: counters.cold_timeouts,
            cold_errors: counters.cold_errors,

            hit_rate: counters.hit_rate(),
            memory_hit_fraction: fraction(counters.memory_hits, total),
            warm_hit_fraction: fraction(counters.warm_hits, total),
            cold_hit_fraction: fraction(counters.cold_hits, total),

            memory_entries: occupancy.memory_entries,
            memory_capacity: occupancy.memory_capacity,
            memory_evictions: occupancy.memory_evictions,
            warm_entries: occupancy.warm_entries,
            warm_capacity: occupancy.warm_capacity,
            warm_evictions: occupancy.warm_evictions,
            search_entries: occupancy.search_entries,
            search_hits: occupancy.search_hits,
            search_misses: occupancy.search_misses,

            memory_read_latency_us: metrics.read_latency(Tier::Memory).as_micros() as u64,
            warm_read_latency_us: metrics.read_latency(Tier::Warm).as_micros() as u64,
            cold_read_latency_us: metrics.read_latency(Tier::Cold).as_micros() as u64,

            captured_at: Utc::now(),
        }
    }

    /// The request counters this snapshot was built from
    pub fn counters(&self) -> Counters {
        Counters {
            memory_hits: self.memory_hits,
            warm_hits: self.warm_hits,
            cold_hits: self.cold_hits,
            misses: self.misses,
            total_requests: self.total_requests,
            promotions_to_memory: self.promotions_to_memory,
            promotions_to_warm: self.promotions_to_warm,
            cold_timeouts: self.cold_timeouts,
            cold_errors: self.cold_errors,
        }
    }

    /// Render as Prometheus text exposition format
    pub fn to_prometheus_text(&self) -> Result<String> {
        let registry = Registry::new_custom(Some("atomcache".to_string()), None)?;

        let counts: [(&str, &str, u64); 14] = [
            ("memory_hits", "Lookups served by the memory tier", self.memory_hits),
            ("warm_hits", "Lookups served by the warm tier", self.warm_hits),
            ("cold_hits", "Lookups served by the cold store", self.cold_hits),
            ("misses", "Lookups absent from every tier", self.misses),
            ("requests", "Total lookups", self.total_requests),
            ("promotions_to_memory", "Atoms promoted into memory", self.promotions_to_memory),
            ("promotions_to_warm", "Atoms promoted into the warm tier", self.promotions_to_warm),
            ("cold_timeouts", "Cold store calls that timed out", self.cold_timeouts),
            ("cold_errors", "Cold store calls that failed", self.cold_errors),
            ("memory_entries", "Atoms in the memory tier", self.memory_entries as u64),
            ("memory_evictions", "Memory tier evictions", self.memory_evictions),
            ("warm_entries", "Atoms in the warm tier", self.warm_entries as u64),
            ("warm_evictions", "Warm tier evictions", self.warm_evictions),
            ("search_entries", "Cached search result sets", self.search_entries as u64),
        ];
        for (name, help, value) in counts {
            let gauge = IntGauge::with_opts(Opts::new(name, help))?;
            gauge.set(value as i64);
            registry.register(Box::new(gauge))?;
        }

        let hit_rate = Gauge::with_opts(Opts::new("hit_rate", "Fraction of lookups served by any tier"))?;
        hit_rate.set(self.hit_rate);
        registry.register(Box::new(hit_rate))?;

        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()).into())
    }
}

/// Latency tracker helper
pub struct LatencyTracker {
    start: Instant,
}

impl LatencyTracker {
    /// Start tracking latency
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Get elapsed duration
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_metrics_creation() {
        let metrics = CacheMetrics::new();
        assert_eq!(metrics.counters(), Counters::default());
        assert_eq!(metrics.counters().hit_rate(), 0.0);
    }

    #[test]
    fn test_lookup_deltas() {
        let metrics = CacheMetrics::new();
        metrics.apply(&Counters::lookup(Some(Tier::Memory)));
        metrics.apply(&Counters::lookup(Some(Tier::Memory)));
        metrics.apply(&Counters::lookup(Some(Tier::Warm)));
        metrics.apply(&Counters::lookup(Some(Tier::Cold)));
        metrics.apply(&Counters::lookup(None));

        let counters = metrics.counters();
        assert_eq!(counters.memory_hits, 2);
        assert_eq!(counters.warm_hits, 1);
        assert_eq!(counters.cold_hits, 1);
        assert_eq!(counters.misses, 1);
        assert_eq!(counters.total_requests, 5);
        assert!((counters.hit_rate() - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_cold_failure_kinds() {
        let mut delta = Counters::lookup(None);
        delta.cold_failure(&Error::ColdStoreTimeout {
            operation: "fetch_one",
            timeout: Duration::from_secs(5),
        });
        delta.cold_failure(&Error::ColdStore("refused".into()));
        assert_eq!(delta.cold_timeouts, 1);
        assert_eq!(delta.cold_errors, 1);
    }

    #[test]
    fn test_concurrent_snapshots_are_consistent() {
        let metrics = Arc::new(CacheMetrics::new());

        let writers: Vec<_> = (0..4)
            .map(|t| {
                let metrics = Arc::clone(&metrics);
                std::thread::spawn(move || {
                    for i in 0..1000 {
                        let tier = match (t + i) % 4 {
                            0 => Some(Tier::Memory),
                            1 => Some(Tier::Warm),
                            2 => Some(Tier::Cold),
                            _ => None,
                        };
                        metrics.apply(&Counters::lookup(tier));
                    }
                })
            })
            .collect();

        for _ in 0..1000 {
            let c = metrics.counters();
            assert_eq!(c.hits() + c.misses, c.total_requests);
        }

        for writer in writers {
            writer.join().unwrap();
        }
        assert_eq!(metrics.counters().total_requests, 4000);
    }

    #[test]
    fn test_latency_tracking() {
        let metrics = CacheMetrics::new();

        metrics.record_read_latency(Tier::Memory, Duration::from_micros(100));
        assert_eq!(metrics.read_latency(Tier::Memory), Duration::from_micros(100));

        // EMA should smooth values
        metrics.record_read_latency(Tier::Memory, Duration::from_micros(200));
        let latency = metrics.read_latency(Tier::Memory).as_micros();
        assert!(latency > 100 && latency < 200);
        assert_eq!(metrics.read_latency(Tier::Cold), Duration::ZERO);
    }

    #[test]
    fn test_reset() {
        let metrics = CacheMetrics::new();
        metrics.apply(&Counters::lookup(Some(Tier::Warm)));
        metrics.record_read_latency(Tier::Warm, Duration::from_micros(50));

        metrics.reset();

        assert_eq!(metrics.counters(), Counters::default());
        assert_eq!(metrics.read_latency(Tier::Warm), Duration::ZERO);
    }

    #[test]
    fn test_snapshot_fractions() {
        let metrics = CacheMetrics::new();
        metrics.apply(&Counters::lookup(Some(Tier::Memory)));
        metrics.apply(&Counters::lookup(Some(Tier::Cold)));
        metrics.apply(&Counters::lookup(None));
        metrics.apply(&Counters::lookup(None));

        let occupancy = Occupancy {
            memory_entries: 2,
            memory_capacity: 4,
            ..Default::default()
        };
        let snapshot = StatsSnapshot::new(metrics.counters(), occupancy, &metrics);

        assert_eq!(snapshot.total_requests, 4);
        assert_eq!(snapshot.hit_rate, 0.5);
        assert_eq!(snapshot.memory_hit_fraction, 0.25);
        assert_eq!(snapshot.cold_hit_fraction, 0.25);
        assert_eq!(snapshot.warm_hit_fraction, 0.0);
        assert_eq!(snapshot.memory_entries, 2);
    }

    #[test]
    fn test_snapshot_counters_roundtrip() {
        let metrics = CacheMetrics::new();
        let mut delta = Counters::lookup(Some(Tier::Cold));
        delta.promotions_to_warm = 1;
        delta.promotions_to_memory = 1;
        metrics.apply(&delta);
        metrics.apply(&Counters::lookup(None));

        let snapshot = StatsSnapshot::new(metrics.counters(), Occupancy::default(), &metrics);
        assert_eq!(snapshot.counters(), metrics.counters());
    }

    #[test]
    fn test_prometheus_text() {
        let metrics = CacheMetrics::new();
        metrics.apply(&Counters::lookup(Some(Tier::Cold)));
        let snapshot = StatsSnapshot::new(metrics.counters(), Occupancy::default(), &metrics);

        let text = snapshot.to_prometheus_text().unwrap();
        assert!(text.contains("atomcache_cold_hits 1"));
        assert!(text.contains("atomcache_requests 1"));
        assert!(text.contains("atomcache_hit_rate 1"));
    }

    #[test]
    fn test_latency_tracker() {
        let tracker = LatencyTracker::start();
        std::thread::sleep(Duration::from_millis(10));
        assert!(tracker.elapsed() >= Duration::from_millis(10));
    }
}
