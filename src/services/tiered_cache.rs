//! Two-tier cache: a local DashMap tier in front of an optional durable tier.
//!
//! Reads check the local tier first, then the durable tier, promoting durable
//! hits whose recorded age is under the TTL. Writes go to the local tier and
//! are then persisted; a durable failure is logged and otherwise ignored, so an
//! unreachable durable tier degrades the cache to local-only operation.

use crate::error::AppError;
use crate::services::cache::LocalCache;
use crate::services::redis_store::{DurableTier, StoredDocument};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Shortest sweep period accepted, so a zero interval cannot spin.
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

pub struct TieredCache<K, V> {
    namespace: &'static str,
    local: LocalCache<K, V>,
    durable: Option<Arc<dyn DurableTier>>,
    ttl: Duration,
}

impl<K, V> TieredCache<K, V>
where
    K: Eq + Hash + Clone + fmt::Display + Send + Sync + 'static,
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Create a cache for one logical namespace (e.g. `quotes`, `forecasts`).
    pub fn new(namespace: &'static str, ttl: Duration, durable: Option<Arc<dyn DurableTier>>) -> Self {
        Self {
            namespace,
            local: LocalCache::new(ttl),
            durable,
            ttl,
        }
    }

    /// Local-only cache.
    pub fn local_only(namespace: &'static str, ttl: Duration) -> Self {
        Self::new(namespace, ttl, None)
    }

    /// Look up a value. Never returns an entry older than the TTL.
    pub async fn get(&self, key: &K) -> Option<V> {
        if let Some(value) = self.local.get(key) {
            debug!("{} cache hit (local): {}", self.namespace, key);
            return Some(value);
        }

        let durable = self.durable.as_ref()?;
        let doc_key = key.to_string();
        let document = match durable.load(self.namespace, &doc_key).await {
            Ok(Some(document)) => document,
            Ok(None) => {
                debug!("{} cache miss: {}", self.namespace, key);
                return None;
            }
            Err(e) => {
                warn!("{}", AppError::CacheDegraded(format!("{} read {}: {}", self.namespace, key, e)));
                return None;
            }
        };

        let age = document.age(chrono::Utc::now().timestamp_millis());
        if age >= self.ttl {
            debug!("{} durable entry for {} is stale ({:?} old)", self.namespace, key, age);
            return None;
        }

        let value: V = match serde_json::from_value(document.value) {
            Ok(value) => value,
            Err(e) => {
                warn!("Discarding undecodable {} entry {}: {}", self.namespace, key, e);
                return None;
            }
        };

        // Promoted entries keep their remaining lifetime, not a fresh TTL.
        self.local
            .set_until(key.clone(), value.clone(), Instant::now() + (self.ttl - age));
        debug!("{} cache hit (durable, promoted): {}", self.namespace, key);
        Some(value)
    }

    /// Write-through: local tier first, then the durable tier on a best-effort basis.
    pub async fn set(&self, key: K, value: V) {
        self.local.set(key.clone(), value.clone());

        let Some(durable) = self.durable.as_ref() else {
            return;
        };

        let document = match serde_json::to_value(&value) {
            Ok(json) => StoredDocument::new(json),
            Err(e) => {
                warn!("Cannot encode {} entry {}: {}", self.namespace, key, e);
                return;
            }
        };

        if let Err(e) = durable
            .store(self.namespace, &key.to_string(), document, self.ttl)
            .await
        {
            warn!("{}", AppError::CacheDegraded(format!("{} write {}: {}", self.namespace, key, e)));
        }
    }

    /// Drop everything from both tiers.
    pub async fn clear(&self) {
        self.local.clear();
        if let Some(durable) = self.durable.as_ref() {
            if let Err(e) = durable.purge(self.namespace).await {
                warn!("{}", AppError::CacheDegraded(format!("{} purge: {}", self.namespace, e)));
            }
        }
    }

    /// Purge expired local entries, returning how many were removed.
    pub fn sweep(&self) -> usize {
        self.local.cleanup()
    }

    /// Entries currently held by the local tier.
    pub fn local_len(&self) -> usize {
        self.local.len()
    }

    /// Periodically sweep the local tier. The task stops once the cache is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, every: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let every = every.max(MIN_SWEEP_INTERVAL);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            // First tick completes immediately
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(cache) = weak.upgrade() else {
                    break;
                };
                let purged = cache.sweep();
                if purged > 0 {
                    debug!("Swept {} expired {} entries", purged, cache.namespace);
                }
            }
        })
    }
}
