//! Fixed-capacity LRU cache used for decoded tile images and marker icon textures.

use std::hash::Hash;
use std::num::NonZeroUsize;

use ::lru::LruCache;

/// Smallest usable capacity; anything less cannot hold both an in-flight placeholder and a
/// resolved texture at the same time.
const MIN_CAPACITY: usize = 2;

/// A fixed-capacity cache with least-recently-used eviction. Capacity is set at construction and
/// never changes; eviction is purely capacity-driven, there is no expiry.
#[derive(Debug)]
pub struct FixedCache<K: Hash + Eq, V> {
    inner: LruCache<K, V>,
}

impl<K: Hash + Eq, V> FixedCache<K, V> {
    /// Create a cache holding at most `capacity` entries. Capacities below 2 are raised to 2.
    pub fn new(capacity: usize) -> Self {
        #[allow(clippy::unwrap_used)] // MIN_CAPACITY is non-zero
        let capacity = NonZeroUsize::new(capacity.max(MIN_CAPACITY)).unwrap();
        Self {
            inner: LruCache::new(capacity),
        }
    }

    /// Get a value, marking it as the most recently used.
    pub fn get(&mut self, key: &K) -> Option<&V> {
        self.inner.get(key)
    }

    /// Look a value up without refreshing its recency.
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.inner.peek(key)
    }

    /// Insert a value, marking it as the most recently used. When the cache is full, the least
    /// recently used entry is evicted first. Returns the previous value for `key`, if any.
    pub fn insert(&mut self, key: K, value: V) -> Option<V> {
        self.inner.put(key, value)
    }

    /// Get a value or insert the one produced by `f`, either way marking it as the most
    /// recently used.
    pub fn try_get_or_insert<E>(
        &mut self,
        key: K,
        f: impl FnOnce() -> Result<V, E>,
    ) -> Result<&V, E> {
        self.inner.try_get_or_insert(key, f)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.inner.contains(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.inner.pop(key)
    }

    pub fn clear(&mut self) {
        self.inner.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.cap().get()
    }

    /// Iterate entries from most to least recently used.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&K, &V)> {
        self.inner.iter()
    }

    /// The most recently used entry.
    pub fn newest(&self) -> Option<(&K, &V)> {
        self.inner.iter().next()
    }

    /// The least recently used entry, i.e. the next one to be evicted.
    pub fn oldest(&self) -> Option<(&K, &V)> {
        self.inner.peek_lru()
    }
}
