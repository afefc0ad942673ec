use dashmap::DashMap;
use std::borrow::Borrow;
use std::hash::Hash;
use std::time::{Duration, Instant};

/// Fast in-process cache tier with TTL support.
///
/// Reads on different keys proceed concurrently; a write or sweep holds the
/// affected shard exclusively.
pub struct LocalCache<K, V> {
    data: DashMap<K, CacheEntry<V>>,
    default_ttl: Duration,
}

struct CacheEntry<V> {
    value: V,
    expires_at: Instant,
}

impl<K, V> LocalCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Create a new cache with the given default TTL.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            data: DashMap::new(),
            default_ttl,
        }
    }

    /// Get an unexpired value. Expired entries are evicted on the way out.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let now = Instant::now();
        let expired = match self.data.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        // Only an expired entry needs the shard write lock
        if expired {
            self.data.remove_if(key, |_, entry| entry.expires_at <= now);
        }
        None
    }

    /// Set a value with the default TTL.
    pub fn set(&self, key: K, value: V) {
        self.set_until(key, value, Instant::now() + self.default_ttl);
    }

    /// Set a value that expires at an explicit instant.
    pub fn set_until(&self, key: K, value: V, expires_at: Instant) {
        self.data.insert(key, CacheEntry { value, expires_at });
    }

    /// Clear all entries from the cache.
    pub fn clear(&self) {
        self.data.clear();
    }

    /// Remove all expired entries, returning how many were purged.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let before = self.data.len();
        self.data.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.data.len())
    }

    /// Number of entries (including expired ones not yet swept).
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
