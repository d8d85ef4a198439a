//! Cache of loaded schemas
//!
//! Compiling many programs against the same declarations should not parse
//! them once per program. Entries are keyed by a SHA-256 digest of the
//! source names, texts and limits.

use crate::error::CacheError;
use lru::LruCache;
use parking_lot::RwLock;
use pipetype_schema::{Schema, SchemaLoader, SchemaParseError};
use sha2::{Digest, Sha256};
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Thread-safe LRU cache of loaded schemas
pub struct SchemaCache {
    cache: RwLock<LruCache<String, Arc<Schema>>>,
}

impl SchemaCache {
    /// Creates a new schema cache
    ///
    /// # Errors
    ///
    /// Returns an error if capacity is 0
    pub fn new(capacity: usize) -> Result<Self, CacheError> {
        let capacity = NonZeroUsize::new(capacity).ok_or(CacheError::ZeroCapacity)?;

        Ok(Self {
            cache: RwLock::new(LruCache::new(capacity)),
        })
    }

    /// Return the cached schema for `loader`'s sources, loading it on a miss
    ///
    /// # Errors
    ///
    /// Returns the loader's error; failed loads are not cached.
    pub fn get_or_load(&self, loader: &SchemaLoader) -> Result<Arc<Schema>, SchemaParseError> {
        let key = cache_key(loader);

        if let Some(schema) = self.cache.write().get(&key) {
            tracing::trace!(key = %key, "Schema cache hit");
            return Ok(Arc::clone(schema));
        }

        let schema = Arc::new(loader.load()?);
        self.cache.write().put(key, Arc::clone(&schema));
        Ok(schema)
    }

    /// Clears all entries from the cache
    pub fn clear(&self) {
        self.cache.write().clear();
    }

    /// Returns the number of entries in the cache
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.read().len()
    }

    /// Returns true if the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.read().is_empty()
    }
}

fn cache_key(loader: &SchemaLoader) -> String {
    let mut hasher = Sha256::new();
    for (name, text) in loader.sources() {
        // Length prefixes keep ("ab", "c") and ("a", "bc") apart
        hasher.update(name.len().to_le_bytes());
        hasher.update(name.as_bytes());
        hasher.update(text.len().to_le_bytes());
        hasher.update(text.as_bytes());
    }
    let limits = loader.limits();
    hasher.update(limits.max_source_bytes.to_le_bytes());
    hasher.update(limits.max_depth.to_le_bytes());
    hex::encode(hasher.finalize())
}
