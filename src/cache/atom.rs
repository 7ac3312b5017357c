//! Atom - the cached unit
//!
//! An atom is a small identified, typed, taggable record. The cache never
//! mutates an atom; it only moves copies between tiers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Atom identifier
pub type AtomId = String;

/// A cached record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Atom {
    /// Opaque identifier
    pub id: AtomId,
    /// Type tag
    #[serde(rename = "type")]
    pub kind: String,
    /// Size of the record in bytes as reported by its producer
    #[serde(default)]
    pub size_bytes: u64,
    /// Arbitrary content fields
    #[serde(default)]
    pub content: BTreeMap<String, Value>,
    /// Tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Atom {
    /// Create an empty atom
    pub fn new(id: impl Into<AtomId>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            size_bytes: 0,
            content: BTreeMap::new(),
            tags: Vec::new(),
        }
    }

    /// Set a content field
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.content.insert(key.into(), value.into());
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Set the reported size
    pub fn with_size(mut self, size_bytes: u64) -> Self {
        self.size_bytes = size_bytes;
        self
    }

    /// Case-insensitive substring match over id, type, content values and tags.
    ///
    /// `needle` must already be lowercased.
    pub fn matches(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        if self.id.to_lowercase().contains(needle) || self.kind.to_lowercase().contains(needle) {
            return true;
        }
        if self
            .tags
            .iter()
            .any(|tag| tag.to_lowercase().contains(needle))
        {
            return true;
        }
        self.content.values().any(|value| value_matches(value, needle))
    }
}

fn value_matches(value: &Value, needle: &str) -> bool {
    match value {
        Value::String(s) => s.to_lowercase().contains(needle),
        Value::Array(items) => items.iter().any(|v| value_matches(v, needle)),
        Value::Object(map) => map.values().any(|v| value_matches(v, needle)),
        Value::Null => false,
        other => other.to_string().contains(needle),
    }
}

/// Hex SHA-256 of `input`; used for file names and search keys
pub(crate) fn digest_hex(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())
}
