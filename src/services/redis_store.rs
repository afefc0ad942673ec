use crate::error::Result;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use redis::aio::ConnectionManager;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

/// Redis key prefix shared by every cache namespace.
const KEY_PREFIX: &str = "pfc";

/// A cached value as persisted in the durable tier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    pub value: serde_json::Value,
    /// Unix milliseconds at write time, used to compute staleness on read.
    pub stored_at: i64,
}

impl StoredDocument {
    pub fn new(value: serde_json::Value) -> Self {
        Self {
            value,
            stored_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Age of the document relative to `now_ms`. Future timestamps count as zero.
    pub fn age(&self, now_ms: i64) -> Duration {
        Duration::from_millis(now_ms.saturating_sub(self.stored_at).max(0) as u64)
    }
}

/// Slower, shared cache tier that survives restarts and is visible to every instance.
pub trait DurableTier: Send + Sync {
    fn load<'a>(
        &'a self,
        namespace: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<StoredDocument>>>;

    fn store<'a>(
        &'a self,
        namespace: &'a str,
        key: &'a str,
        document: StoredDocument,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<()>>;

    /// Delete every document in a namespace, returning how many were removed.
    fn purge<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, Result<usize>>;

    fn ping(&self) -> BoxFuture<'_, Result<()>>;
}

fn document_key(namespace: &str, key: &str) -> String {
    format!("{}:{}:{}", KEY_PREFIX, namespace, key)
}

/// Redis-backed durable tier.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connect to Redis at the given URL.
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client).await?;
        info!("Connected to Redis at {}", redis_url);
        Ok(Self { conn })
    }
}

impl DurableTier for RedisStore {
    fn load<'a>(
        &'a self,
        namespace: &'a str,
        key: &'a str,
    ) -> BoxFuture<'a, Result<Option<StoredDocument>>> {
        async move {
            let mut conn = self.conn.clone();
            let raw: Option<String> = redis::cmd("GET")
                .arg(document_key(namespace, key))
                .query_async(&mut conn)
                .await?;

            match raw {
                Some(json) => Ok(Some(serde_json::from_str(&json)?)),
                None => Ok(None),
            }
        }
        .boxed()
    }

    fn store<'a>(
        &'a self,
        namespace: &'a str,
        key: &'a str,
        document: StoredDocument,
        ttl: Duration,
    ) -> BoxFuture<'a, Result<()>> {
        async move {
            let mut conn = self.conn.clone();
            let body = serde_json::to_string(&document)?;
            redis::cmd("SET")
                .arg(document_key(namespace, key))
                .arg(body)
                .arg("EX")
                .arg(ttl.as_secs().max(1))
                .query_async::<_, ()>(&mut conn)
                .await?;
            Ok(())
        }
        .boxed()
    }

    fn purge<'a>(&'a self, namespace: &'a str) -> BoxFuture<'a, Result<usize>> {
        async move {
            let mut conn = self.conn.clone();
            let keys: Vec<String> = redis::cmd("KEYS")
                .arg(document_key(namespace, "*"))
                .query_async(&mut conn)
                .await?;

            if keys.is_empty() {
                return Ok(0);
            }

            let removed: usize = redis::cmd("DEL").arg(&keys).query_async(&mut conn).await?;
            debug!("Purged {} durable entries from {}", removed, namespace);
            Ok(removed)
        }
        .boxed()
    }

    fn ping(&self) -> BoxFuture<'_, Result<()>> {
        async move {
            let mut conn = self.conn.clone();
            redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
            Ok(())
        }
        .boxed()
    }
}
