//! Seen-product cache: dedup keys plus a bounded, persisted FIFO of keys
//! already handled.
//!
//! On disk the cache is a pretty-printed JSON array of key strings, oldest
//! first. A missing or unreadable file is a cold start, never an error.

use std::collections::{HashSet, VecDeque};
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::ingest::cleanup_summary;
use crate::ingest::types::Product;

pub const DEFAULT_CAPACITY: usize = 500;

#[derive(Serialize)]
struct CanonicalContent<'a> {
    title: &'a str,
    summary: &'a str,
    link: &'a str,
}

/// Lowercase hex SHA-256.
pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Deterministic key for a product.
///
/// A source-provided identifier wins; otherwise the key is the SHA-256 of the
/// product's content serialized in fixed field order. `None` when the product
/// has neither, in which case it must not be processed.
pub fn dedup_key(product: &Product) -> Option<String> {
    if let Some(id) = product.identifier.as_deref().map(str::trim) {
        if !id.is_empty() {
            return Some(format!("id:{}", sha256_hex(id.as_bytes())));
        }
    }
    // Markup-only bodies ("Read more" links, empty <pre>) count as empty.
    if cleanup_summary(&product.summary).is_empty() {
        return None;
    }
    let canonical = CanonicalContent {
        title: &product.title,
        summary: &product.summary,
        link: &product.link,
    };
    // Struct serialization cannot fail; fall back to the summary alone for safety.
    let bytes = serde_json::to_vec(&canonical).unwrap_or_else(|_| product.summary.clone().into_bytes());
    Some(sha256_hex(&bytes))
}

/// Bounded insertion-ordered set of keys. The oldest key is evicted once
/// `capacity` is exceeded.
#[derive(Debug, Clone)]
pub struct SeenCache {
    order: VecDeque<String>,
    members: HashSet<String>,
    capacity: usize,
}

impl Default for SeenCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }
}

impl SeenCache {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            order: VecDeque::with_capacity(capacity.min(10_000)),
            members: HashSet::with_capacity(capacity.min(10_000)),
            capacity,
        }
    }

    /// Build from keys ordered oldest first; duplicates are dropped and only
    /// the newest `capacity` keys are kept.
    pub fn from_keys<I: IntoIterator<Item = String>>(keys: I, capacity: usize) -> Self {
        let mut cache = Self::with_capacity(capacity);
        for k in keys {
            cache.append(k);
        }
        cache
    }

    pub fn contains(&self, key: &str) -> bool {
        self.members.contains(key)
    }

    /// Record `key`. Returns the evicted key, if any. Re-appending a present
    /// key is a no-op and keeps its original position.
    pub fn append(&mut self, key: String) -> Option<String> {
        if self.members.contains(&key) {
            return None;
        }
        self.members.insert(key.clone());
        self.order.push_back(key);
        if self.order.len() > self.capacity {
            let evicted = self.order.pop_front()?;
            self.members.remove(&evicted);
            return Some(evicted);
        }
        None
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Keys oldest first.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// Load from `path`. Missing or malformed files yield an empty cache.
    pub fn load(path: &Path, capacity: usize) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::info!(cache_file = %path.display(), "no seen products cache file, starting empty");
                return Self::with_capacity(capacity);
            }
            Err(e) => {
                tracing::warn!(cache_file = %path.display(), error = %e, "could not read seen products cache, starting empty");
                return Self::with_capacity(capacity);
            }
        };

        match serde_json::from_str::<Vec<String>>(&content) {
            Ok(keys) => {
                let cache = Self::from_keys(keys, capacity);
                tracing::info!(cache_file = %path.display(), count = cache.len(), "loaded seen products cache");
                cache
            }
            Err(e) => {
                tracing::warn!(cache_file = %path.display(), error = %e, "malformed seen products cache, starting empty");
                Self::with_capacity(capacity)
            }
        }
    }

    /// Overwrite `path` with the full membership via a temp file + rename.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }
        let keys: Vec<&str> = self.keys().collect();
        let json = serde_json::to_string_pretty(&keys).context("serializing seen cache")?;

        let tmp = path.with_extension("json.tmp");
        {
            let mut f = fs::File::create(&tmp).with_context(|| format!("creating {}", tmp.display()))?;
            f.write_all(json.as_bytes())?;
            f.sync_all()?;
        }
        fs::rename(&tmp, path).with_context(|| format!("replacing {}", path.display()))?;
        tracing::info!(cache_file = %path.display(), count = keys.len(), "stored seen products cache");
        Ok(())
    }
}
