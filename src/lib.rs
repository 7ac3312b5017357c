//! Atom Cache - Multi-Tier Read-Through Cache
//!
//! Caches small structured records ("atoms") pulled from a slow persistent
//! store, across three tiers of decreasing speed:
//!
//! ```text
//! Memory (LRU, RAM) → Warm (files on disk) → Cold (backing store)
//! ```
//!
//! Hits in a slower tier are promoted into the faster ones. Search results
//! are cached separately with a time-to-live. Tier failures degrade to
//! cache misses; only misconfiguration is fatal.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use atomcache::{AtomCache, CacheConfig};
//! use atomcache::cache::InMemoryColdStore;
//!
//! # async fn run() -> atomcache::Result<()> {
//! let cold = Arc::new(InMemoryColdStore::from_jsonl("atoms.jsonl")?);
//! let cache = AtomCache::new(CacheConfig::default(), cold)?;
//!
//! if let Some(atom) = cache.get("kb-001").await {
//!     println!("{}", atom.kind);
//! }
//! println!("hit rate {:.2}", cache.stats().hit_rate);
//! # Ok(())
//! # }
//! ```
//!
//! # Modules
//!
//! - [`cache`] - Tiers, search cache, statistics and the coordinator
//! - [`config`] - Cache configuration
//! - [`error`] - Error types

pub mod cache;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use cache::{Atom, AtomCache, AtomId, ColdStore, Lookup, StatsSnapshot, Tier};
pub use config::CacheConfig;
pub use error::{Error, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
