//! Atom Cache CLI
//!
//! Runs one cache operation against a cold store loaded from a JSON-lines
//! file and prints the result as JSON.
//!
//! ```text
//! atomcache --cold-store atoms.jsonl get kb-001
//! atomcache --cold-store atoms.jsonl batch-get kb-001 kb-002
//! atomcache --cold-store atoms.jsonl search "lifetimes" --limit 5
//! atomcache stats --format prometheus
//! atomcache clear
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use atomcache::cache::{Counters, InMemoryColdStore};
use atomcache::{AtomCache, CacheConfig, StatsSnapshot};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Atom Cache - multi-tier read-through cache for knowledge atoms
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Cold store contents, one JSON atom per line
    #[arg(long, env = "ATOMCACHE_COLD_STORE")]
    cold_store: Option<PathBuf>,

    /// YAML configuration file
    #[arg(long, env = "ATOMCACHE_CONFIG")]
    config: Option<PathBuf>,

    /// Cache root directory (overrides config)
    #[arg(long, env = "ATOMCACHE_DIR")]
    cache_dir: Option<PathBuf>,

    /// Memory tier capacity (overrides config)
    #[arg(long, env = "ATOMCACHE_MEMORY_CAPACITY")]
    memory_capacity: Option<usize>,

    /// Warm tier capacity (overrides config)
    #[arg(long, env = "ATOMCACHE_WARM_CAPACITY")]
    warm_capacity: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "warn")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch one atom
    Get {
        /// Atom id
        id: String,
    },
    /// Fetch many atoms with one cold store round trip
    BatchGet {
        /// Atom ids
        #[arg(required = true)]
        ids: Vec<String>,
    },
    /// Search atoms
    Search {
        /// Query text
        query: String,
        /// Maximum number of results
        #[arg(long, default_value = "10")]
        limit: usize,
    },
    /// Print statistics accumulated across invocations
    Stats {
        #[arg(long, value_enum, default_value = "json")]
        format: StatsFormat,
    },
    /// Empty the memory and warm tiers and reset statistics
    Clear,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum StatsFormat {
    Json,
    Prometheus,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    init_logging(&args);

    let config = load_config(&args)?;
    let cold = match &args.cold_store {
        Some(path) => InMemoryColdStore::from_jsonl(path)
            .with_context(|| format!("loading cold store from {}", path.display()))?,
        None => {
            debug!("no cold store given, starting empty");
            InMemoryColdStore::new()
        }
    };

    let cache = AtomCache::new(config, Arc::new(cold))?;

    // Counters accumulate across invocations through the statistics file
    if let Some(counters) = persisted_counters(&cache.config().stats_path()) {
        cache.restore_counters(&counters);
    }

    match args.command {
        Command::Get { id } => {
            let found = cache.lookup(&id).await;
            if let Some(lookup) = &found {
                info!(atom = %id, tier = %lookup.tier, latency = ?lookup.latency, "served");
            }
            print_json(&found.map(|lookup| lookup.atom))?;
        }
        Command::BatchGet { ids } => {
            print_json(&cache.batch_get(&ids).await)?;
        }
        Command::Search { query, limit } => {
            print_json(&cache.search(&query, limit).await)?;
        }
        Command::Stats { format } => {
            let snapshot = cache.stats();
            match format {
                StatsFormat::Json => print_json(&snapshot)?,
                StatsFormat::Prometheus => print!("{}", snapshot.to_prometheus_text()?),
            }
            return Ok(());
        }
        Command::Clear => {
            cache.clear();
            print_json(&cleared_report())?;
        }
    }

    if let Err(e) = cache.persist_stats() {
        warn!(error = %e, "could not write statistics file");
    }

    Ok(())
}

// =============================================================================
// Helpers
// =============================================================================

fn load_config(args: &Args) -> anyhow::Result<CacheConfig> {
    let mut config = match &args.config {
        Some(path) => CacheConfig::from_yaml_file(path)?,
        None => CacheConfig::default(),
    };

    if let Some(dir) = &args.cache_dir {
        config.root_dir = dir.clone();
    }
    if let Some(capacity) = args.memory_capacity {
        config.memory_capacity = capacity;
    }
    if let Some(capacity) = args.warm_capacity {
        config.warm_capacity = capacity;
    }

    Ok(config)
}

/// Counters from the statistics file a previous invocation left behind
fn persisted_counters(path: &Path) -> Option<Counters> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no statistics file");
            return None;
        }
    };
    match serde_json::from_slice::<StatsSnapshot>(&data) {
        Ok(snapshot) => Some(snapshot.counters()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "ignoring unreadable statistics file");
            None
        }
    }
}

fn cleared_report() -> serde_json::Value {
    serde_json::json!({ "cleared": true })
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let filter = EnvFilter::from_default_env().add_directive(level.into());

    // Logs go to stderr; stdout carries command output
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use atomcache::Atom;

    #[test]
    fn test_cleared_report_is_json() {
        assert_eq!(cleared_report().to_string(), r#"{"cleared":true}"#);
    }

    #[tokio::test]
    async fn test_persisted_counters() {
        let dir = tempfile::tempdir().unwrap();
        let cold = Arc::new(InMemoryColdStore::with_atoms([Atom::new("a", "note")]));
        let cache = AtomCache::new(CacheConfig::with_root(dir.path()), cold).unwrap();
        let path = cache.config().stats_path();
        assert!(persisted_counters(&path).is_none());

        cache.get("a").await;
        cache.persist_stats().unwrap();
        let counters = persisted_counters(&path).unwrap();
        assert_eq!(counters.cold_hits, 1);
        assert_eq!(counters.total_requests, 1);

        std::fs::write(&path, b"garbage").unwrap();
        assert!(persisted_counters(&path).is_none());
    }
}
