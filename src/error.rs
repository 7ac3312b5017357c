//! Error types for the atom cache

use std::time::Duration;

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the atom cache
///
/// Only [`Error::Config`] escapes construction. Every other variant is
/// recovered inside the tiers during lookups and surfaces only through
/// explicit persistence calls such as `AtomCache::persist_stats`.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Cold store call exceeded its time bound
    #[error("Cold store {operation} timed out after {timeout:?}")]
    ColdStoreTimeout {
        operation: &'static str,
        timeout: Duration,
    },

    /// Cold store adapter failure
    #[error("Cold store error: {0}")]
    ColdStore(String),

    /// Prometheus export error
    #[error("Metrics export error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl Error {
    /// True if this error is a cold-store timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::ColdStoreTimeout { .. })
    }
}
