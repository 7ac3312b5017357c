//! Cold Store - durable backing store adapter
//!
//! The authoritative source of atoms. The cache only consumes its keyed
//! lookup and search contract; durability and indexing belong to the store.
//!
//! # Design
//!
//! - [`ColdStore`] is the pluggable async backend (database, service, file)
//! - [`ColdTier`] wraps a backend and bounds every call with a timeout
//! - `fetch_many` is one round trip per batch, never one per key

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use super::atom::{Atom, AtomId};
use super::DEFAULT_COLD_TIMEOUT;
use crate::error::{Error, Result};

/// Cold store backend trait
#[async_trait]
pub trait ColdStore: Send + Sync {
    /// Fetch one atom. `Ok(None)` means the store has no such record.
    async fn fetch_one(&self, id: &str) -> Result<Option<Atom>>;

    /// Fetch every atom whose id is in `ids` in a single round trip.
    /// `ids` contains no duplicates; absent ids are simply not returned.
    async fn fetch_many(&self, ids: &[AtomId]) -> Result<Vec<Atom>>;

    /// Substring search over content and tags, at most `limit` results.
    /// Ordering is store-defined but deterministic for identical state.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Atom>>;

    /// Get store statistics
    fn stats(&self) -> ColdStoreStats {
        ColdStoreStats::default()
    }
}

/// Cold store statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ColdStoreStats {
    /// Total atoms stored
    pub atom_count: u64,
    /// Single-key fetches
    pub single_fetches: u64,
    /// Batched fetches (round trips, not keys)
    pub batch_fetches: u64,
    /// Search queries
    pub searches: u64,
}

/// In-memory cold store
///
/// Backs tests and the CLI; can be seeded from a JSON-lines file.
#[derive(Default)]
pub struct InMemoryColdStore {
    atoms: DashMap<AtomId, Atom>,
    single_fetches: AtomicU64,
    batch_fetches: AtomicU64,
    searches: AtomicU64,
}

impl InMemoryColdStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding `atoms`
    pub fn with_atoms(atoms: impl IntoIterator<Item = Atom>) -> Self {
        let store = Self::new();
        for atom in atoms {
            store.insert(atom);
        }
        store
    }

    /// Load a JSON-lines file, one atom per line. Blank lines are skipped.
    pub fn from_jsonl(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let store = Self::new();
        for line in text.lines().map(str::trim).filter(|l| !l.is_empty()) {
            store.insert(serde_json::from_str(line)?);
        }
        debug!(path = %path.as_ref().display(), atoms = store.len(), "cold store loaded");
        Ok(store)
    }

    /// Insert or replace an atom
    pub fn insert(&self, atom: Atom) {
        self.atoms.insert(atom.id.clone(), atom);
    }

    /// Remove an atom
    pub fn remove(&self, id: &str) -> Option<Atom> {
        self.atoms.remove(id).map(|(_, atom)| atom)
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

#[async_trait]
impl ColdStore for InMemoryColdStore {
    async fn fetch_one(&self, id: &str) -> Result<Option<Atom>> {
        self.single_fetches.fetch_add(1, Ordering::Relaxed);
        Ok(self.atoms.get(id).map(|entry| entry.value().clone()))
    }

    async fn fetch_many(&self, ids: &[AtomId]) -> Result<Vec<Atom>> {
        self.batch_fetches.fetch_add(1, Ordering::Relaxed);
        Ok(ids
            .iter()
            .filter_map(|id| self.atoms.get(id).map(|entry| entry.value().clone()))
            .collect())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Atom>> {
        self.searches.fetch_add(1, Ordering::Relaxed);
        let needle = query.trim().to_lowercase();

        // DashMap iteration order is unstable; sort for determinism.
        let mut hits: Vec<Atom> = self
            .atoms
            .iter()
            .filter(|entry| entry.value().matches(&needle))
            .map(|entry| entry.value().clone())
            .collect();
        hits.sort_by(|a, b| a.id.cmp(&b.id));
        hits.truncate(limit);
        Ok(hits)
    }

    fn stats(&self) -> ColdStoreStats {
        ColdStoreStats {
            atom_count: self.atoms.len() as u64,
            single_fetches: self.single_fetches.load(Ordering::Relaxed),
            batch_fetches: self.batch_fetches.load(Ordering::Relaxed),
            searches: self.searches.load(Ordering::Relaxed),
        }
    }
}

/// Cold tier - timeout-bounded access to a [`ColdStore`]
pub struct ColdTier {
    backend: Arc<dyn ColdStore>,
    timeout: Duration,
}

impl ColdTier {
    /// Wrap `backend` with the default timeout
    pub fn new(backend: Arc<dyn ColdStore>) -> Self {
        Self::with_timeout(backend, DEFAULT_COLD_TIMEOUT)
    }

    /// Wrap `backend`, bounding each call by `timeout`
    pub fn with_timeout(backend: Arc<dyn ColdStore>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        call: impl std::future::Future<Output = Result<T>>,
    ) -> Result<T> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(Error::ColdStoreTimeout {
                operation,
                timeout: self.timeout,
            }),
        }
    }

    pub async fn fetch_one(&self, id: &str) -> Result<Option<Atom>> {
        self.bounded("fetch_one", self.backend.fetch_one(id)).await
    }

    pub async fn fetch_many(&self, ids: &[AtomId]) -> Result<Vec<Atom>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        self.bounded("fetch_many", self.backend.fetch_many(ids)).await
    }

    pub async fn search(&self, query: &str, limit: usize) -> Result<Vec<Atom>> {
        self.bounded("search", self.backend.search(query, limit)).await
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Get backend statistics
    pub fn backend_stats(&self) -> ColdStoreStats {
        self.backend.stats()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    fn make_atom(id: &str, title: &str) -> Atom {
        Atom::new(id, "note").with_field("title", title).with_tag("kb")
    }

    fn seeded() -> InMemoryColdStore {
        InMemoryColdStore::with_atoms([
            make_atom("c", "Tokio runtime"),
            make_atom("a", "Rust traits"),
            make_atom("b", "Rust lifetimes"),
        ])
    }

    /// Backend that never answers within any reasonable timeout
    struct StalledStore;

    #[async_trait]
    impl ColdStore for StalledStore {
        async fn fetch_one(&self, _id: &str) -> Result<Option<Atom>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(None)
        }

        async fn fetch_many(&self, _ids: &[AtomId]) -> Result<Vec<Atom>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }

        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<Atom>> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_fetch_one_absent_is_not_error() {
        let store = seeded();
        assert_eq!(store.fetch_one("a").await.unwrap().map(|a| a.id), Some("a".into()));
        assert!(store.fetch_one("zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_fetch_many_is_one_round_trip() {
        let store = seeded();
        let ids: Vec<AtomId> = vec!["a".into(), "b".into(), "missing".into()];

        let atoms = store.fetch_many(&ids).await.unwrap();
        assert_eq!(atoms.len(), 2);

        let stats = store.stats();
        assert_eq!(stats.batch_fetches, 1);
        assert_eq!(stats.single_fetches, 0);
    }

    #[tokio::test]
    async fn test_search_is_deterministic_and_bounded() {
        let store = seeded();

        let hits = store.search("RUST", 10).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);

        let hits = store.search("kb", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
    }

    #[tokio::test]
    async fn test_from_jsonl() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, r#"{{"id":"x","type":"note","tags":["t"]}}"#).unwrap();
        writeln!(file).unwrap();
        writeln!(file, r#"{{"id":"y","type":"doc","content":{{"k":"v"}}}}"#).unwrap();

        let store = InMemoryColdStore::from_jsonl(file.path()).unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.fetch_one("y").await.unwrap().unwrap().kind, "doc");
    }

    #[tokio::test]
    async fn test_from_jsonl_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "not json").unwrap();
        assert_matches!(
            InMemoryColdStore::from_jsonl(file.path()).err(),
            Some(Error::Serialization(_))
        );
    }

    #[tokio::test]
    async fn test_cold_tier_passes_through() {
        let tier = ColdTier::new(Arc::new(seeded()));
        assert_eq!(tier.timeout(), DEFAULT_COLD_TIMEOUT);
        assert!(tier.fetch_one("a").await.unwrap().is_some());
        assert!(tier.fetch_many(&[]).await.unwrap().is_empty());
        assert_eq!(tier.backend_stats().batch_fetches, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cold_tier_timeout() {
        let tier = ColdTier::with_timeout(Arc::new(StalledStore), Duration::from_millis(50));

        let err = tier.fetch_one("a").await.unwrap_err();
        assert_matches!(
            err,
            Error::ColdStoreTimeout {
                operation: "fetch_one",
                ..
            }
        );
        assert!(tier.search("q", 5).await.unwrap_err().is_timeout());
        assert!(tier
            .fetch_many(&["a".to_string()])
            .await
            .unwrap_err()
            .is_timeout());
    }
}
