//! In-memory cache for storing key-value pairs.
//!
//! Uses moka's high-performance concurrent cache implementation.

use moka::sync::Cache;

/// Thread-safe in-memory cache with configurable capacity.
///
/// Backs the in-memory blob store (`MemCache<String, String>`).
///
/// The cache is backed by moka, which provides:
/// - Thread-safe concurrent access
/// - LRU eviction when capacity is exceeded
#[derive(Clone)]
pub struct MemCache<K, V> {
    entries: Cache<K, V>,
}

impl<K, V> MemCache<K, V>
where
    K: std::hash::Hash + Eq + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    /// Allocate a new [`MemCache`].
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Cache::new(capacity as u64),
        }
    }

    /// Insert or replace a value.
    pub fn set(
        &self,
        key: K,
        value: V,
    ) {
        self.entries.insert(key, value);
    }

    /// Get the value stored under `&K`.
    pub fn get(
        &self,
        key: &K,
    ) -> Option<V> {
        self.entries.get(key)
    }

    /// Remove the value stored under `&K`.
    pub fn remove(
        &self,
        key: &K,
    ) {
        self.entries.remove(key);
    }

    /// Whether a value is stored under `&K`.
    pub fn contains(
        &self,
        key: &K,
    ) -> bool {
        self.entries.contains_key(key)
    }
}
