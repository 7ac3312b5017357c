//! Warm Tier - on-disk cache
//!
//! One JSON file per atom in a dedicated directory. Slower than memory,
//! larger, and survives restarts.
//!
//! # Design
//!
//! - File name is the hex SHA-256 of the atom id, so any id maps to a safe,
//!   deterministic path
//! - Writes go to a uniquely named temp file and are renamed into place; a
//!   concurrent reader sees the old file, the new file, or nothing
//! - A recency index bounds the tier with the same strict LRU as memory;
//!   it is rebuilt from file modification times on open
//! - Every failure is logged and reported as a miss, never raised
//!
//! The directory is shared by every caller in the process. Writes rely on
//! rename atomicity, not on a lock, so two processes pointed at the same
//! directory keep separate indexes and may evict each other's files.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::atom::{digest_hex, Atom};
use super::recency::RecencyMap;
use crate::error::{Error, Result};

const ATOM_EXTENSION: &str = "json";
const TEMP_EXTENSION: &str = "tmp";

/// Warm Tier - file-per-atom disk cache
pub struct WarmTier {
    /// Cache directory
    dir: PathBuf,
    /// Recency index keyed by file stem
    index: Mutex<RecencyMap<()>>,
    capacity: usize,
    /// Files evicted to respect capacity
    evictions: AtomicU64,
    /// Writes that failed and were dropped
    write_failures: AtomicU64,
    /// Files that could not be decoded
    corrupt_reads: AtomicU64,
}

impl WarmTier {
    /// Open (or create) a warm tier in `dir` holding at most `capacity` atoms.
    ///
    /// Existing files are indexed oldest-first by modification time and the
    /// tier is trimmed to capacity. Leftover temp files are removed. An
    /// unusable directory is logged, not fatal: the tier then behaves as an
    /// always-miss cache.
    pub fn open(dir: impl Into<PathBuf>, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::Config("warm tier capacity must be at least 1".into()));
        }

        let tier = Self {
            dir: dir.into(),
            index: Mutex::new(RecencyMap::new(capacity)),
            capacity,
            evictions: AtomicU64::new(0),
            write_failures: AtomicU64::new(0),
            corrupt_reads: AtomicU64::new(0),
        };

        if let Err(e) = fs::create_dir_all(&tier.dir) {
            warn!(dir = %tier.dir.display(), error = %e, "warm tier directory unavailable");
            return Ok(tier);
        }

        if let Err(e) = tier.recover() {
            warn!(dir = %tier.dir.display(), error = %e, "warm tier recovery scan failed");
        }

        Ok(tier)
    }

    /// Index files left by a previous run
    fn recover(&self) -> Result<()> {
        let mut found: Vec<(SystemTime, String)> = Vec::new();

        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some(TEMP_EXTENSION) => {
                    let _ = fs::remove_file(&path);
                }
                Some(ATOM_EXTENSION) => {
                    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                        continue;
                    };
                    let modified = entry
                        .metadata()
                        .and_then(|m| m.modified())
                        .unwrap_or(SystemTime::UNIX_EPOCH);
                    found.push((modified, stem.to_string()));
                }
                _ => {}
            }
        }

        found.sort();
        let recovered = found.len();

        let mut index = self.index.lock();
        for (_, stem) in found {
            if let Some((victim, _)) = index.insert(stem, ()) {
                self.delete_file(&victim);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        debug!(
            dir = %self.dir.display(),
            recovered,
            indexed = index.len(),
            "warm tier recovered"
        );
        Ok(())
    }

    /// Read an atom. Missing, unreadable and corrupt files are all misses.
    pub fn get(&self, id: &str) -> Option<Atom> {
        let stem = digest_hex(id);
        let path = self.path_for_stem(&stem);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                self.index.lock().remove(&stem);
                return None;
            }
            Err(e) => {
                warn!(atom = id, error = %e, "warm tier read failed");
                return None;
            }
        };

        match serde_json::from_slice::<Atom>(&bytes) {
            Ok(atom) if atom.id == id => {
                self.touch(stem);
                Some(atom)
            }
            Ok(atom) => {
                self.corrupt_reads.fetch_add(1, Ordering::Relaxed);
                warn!(atom = id, found = %atom.id, "warm tier file holds a different atom");
                None
            }
            Err(e) => {
                self.corrupt_reads.fetch_add(1, Ordering::Relaxed);
                warn!(atom = id, error = %e, "warm tier file is corrupt, skipping");
                None
            }
        }
    }

    /// Write an atom. Failures are logged and swallowed; returns whether the
    /// atom landed on disk.
    pub fn put(&self, id: &str, atom: &Atom) -> bool {
        let stem = digest_hex(id);

        if let Err(e) = self.write_atomic(&stem, atom) {
            self.write_failures.fetch_add(1, Ordering::Relaxed);
            warn!(atom = id, error = %e, "warm tier write failed");
            return false;
        }

        self.touch(stem);
        true
    }

    /// Mark `stem` most recently used, indexing it if needed
    fn touch(&self, stem: String) {
        let mut index = self.index.lock();
        if index.get(&stem).is_some() {
            return;
        }
        if let Some((victim, _)) = index.insert(stem, ()) {
            // Deleted under the lock so a racing put of the victim re-indexes after us.
            self.delete_file(&victim);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(file = %victim, "warm tier evicted");
        }
    }

    fn write_atomic(&self, stem: &str, atom: &Atom) -> Result<()> {
        let data = serde_json::to_vec(atom)?;
        fs::create_dir_all(&self.dir)?;

        let temp = self
            .dir
            .join(format!("{}.{}.{}", stem, uuid::Uuid::new_v4(), TEMP_EXTENSION));
        if let Err(e) = fs::write(&temp, &data) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&temp, self.path_for_stem(stem)) {
            let _ = fs::remove_file(&temp);
            return Err(e.into());
        }
        Ok(())
    }

    /// Remove one atom. Returns true if a file was deleted.
    pub fn remove(&self, id: &str) -> bool {
        let stem = digest_hex(id);
        let mut index = self.index.lock();
        index.remove(&stem);
        match fs::remove_file(self.path_for_stem(&stem)) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(atom = id, error = %e, "warm tier remove failed");
                false
            }
        }
    }

    /// Delete every cached file. Returns the number of atom files removed.
    pub fn clear(&self) -> usize {
        let mut index = self.index.lock();
        index.clear();

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                if e.kind() != ErrorKind::NotFound {
                    warn!(dir = %self.dir.display(), error = %e, "warm tier clear failed");
                }
                return 0;
            }
        };

        let mut removed = 0;
        for entry in entries.flatten() {
            let path = entry.path();
            let ext = path.extension().and_then(|e| e.to_str());
            if !matches!(ext, Some(ATOM_EXTENSION) | Some(TEMP_EXTENSION)) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) if ext == Some(ATOM_EXTENSION) => removed += 1,
                Ok(()) => {}
                Err(e) => warn!(file = %path.display(), error = %e, "warm tier clear skipped file"),
            }
        }
        removed
    }

    fn delete_file(&self, stem: &str) {
        if let Err(e) = fs::remove_file(self.path_for_stem(stem)) {
            if e.kind() != ErrorKind::NotFound {
                warn!(file = %stem, error = %e, "warm tier eviction could not delete file");
            }
        }
    }

    fn path_for_stem(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}.{}", stem, ATOM_EXTENSION))
    }

    /// Path an atom is stored under
    pub fn path_for(&self, id: &str) -> PathBuf {
        self.path_for_stem(&digest_hex(id))
    }

    /// Number of indexed atoms
    pub fn len(&self) -> usize {
        self.index.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn write_failures(&self) -> u64 {
        self.write_failures.load(Ordering::Relaxed)
    }

    pub fn corrupt_reads(&self) -> u64 {
        self.corrupt_reads.load(Ordering::Relaxed)
    }

    /// Zero the eviction and failure counters
    pub fn reset_counters(&self) {
        self.evictions.store(0, Ordering::Relaxed);
        self.write_failures.store(0, Ordering::Relaxed);
        self.corrupt_reads.store(0, Ordering::Relaxed);
    }
}

// =============================================================================
// Tests
// =============================================================================
