//! Cache configuration
//!
//! Every field has a default, so a YAML file only needs to name the values
//! it overrides:
//!
//! ```yaml
//! root_dir: /var/cache/atoms
//! memory_capacity: 512
//! search_ttl_secs: 600
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cache::{
    DEFAULT_COLD_TIMEOUT, DEFAULT_MEMORY_CAPACITY, DEFAULT_SEARCH_CAPACITY, DEFAULT_SEARCH_TTL,
    DEFAULT_WARM_CAPACITY,
};
use crate::error::{Error, Result};

/// Name of the warm-tier subdirectory under the cache root
pub const WARM_DIR_NAME: &str = "warm";

/// Name of the statistics file under the cache root
pub const STATS_FILE_NAME: &str = "stats.json";

/// Atom cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root directory
    pub root_dir: PathBuf,
    /// Memory tier capacity (entries)
    pub memory_capacity: usize,
    /// Warm tier capacity (entries)
    pub warm_capacity: usize,
    /// Search result TTL in seconds
    pub search_ttl_secs: u64,
    /// Maximum number of cached queries
    pub search_capacity: usize,
    /// Per-call cold store timeout in milliseconds
    pub cold_timeout_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("./.atomcache"),
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            warm_capacity: DEFAULT_WARM_CAPACITY,
            search_ttl_secs: DEFAULT_SEARCH_TTL.as_secs(),
            search_capacity: DEFAULT_SEARCH_CAPACITY,
            cold_timeout_ms: DEFAULT_COLD_TIMEOUT.as_millis() as u64,
        }
    }
}

impl CacheConfig {
    /// Default configuration rooted at `root_dir`
    pub fn with_root(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            ..Default::default()
        }
    }

    /// Parse a configuration from YAML text
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|e| Error::Config(format!("invalid config: {}", e)))
    }

    /// Load a configuration from a YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
        Self::from_yaml_str(&text)
    }

    /// Reject values the tiers cannot operate with
    pub fn validate(&self) -> Result<()> {
        if self.memory_capacity == 0 {
            return Err(Error::Config("memory_capacity must be at least 1".into()));
        }
        if self.warm_capacity == 0 {
            return Err(Error::Config("warm_capacity must be at least 1".into()));
        }
        if self.search_capacity == 0 {
            return Err(Error::Config("search_capacity must be at least 1".into()));
        }
        if self.search_ttl_secs == 0 {
            return Err(Error::Config("search_ttl_secs must be non-zero".into()));
        }
        if self.cold_timeout_ms == 0 {
            return Err(Error::Config("cold_timeout_ms must be non-zero".into()));
        }
        Ok(())
    }

    /// Warm tier directory
    pub fn warm_dir(&self) -> PathBuf {
        self.root_dir.join(WARM_DIR_NAME)
    }

    /// Statistics file path
    pub fn stats_path(&self) -> PathBuf {
        self.root_dir.join(STATS_FILE_NAME)
    }

    pub fn search_ttl(&self) -> Duration {
        Duration::from_secs(self.search_ttl_secs)
    }

    pub fn cold_timeout(&self) -> Duration {
        Duration::from_millis(self.cold_timeout_ms)
    }
}
