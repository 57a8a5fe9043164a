use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Cross-process shared counter/value store.
///
/// Circuit-breaker and rate-limiter state must be visible to every worker,
/// so all access goes through this trait; tests substitute [`MemoryCache`].
#[async_trait]
pub trait SharedCache: Send + Sync {
    async fn read_u64(&self, key: &str) -> Result<Option<u64>, CacheError>;

    async fn read_f64(&self, key: &str) -> Result<Option<f64>, CacheError>;

    /// Atomic increment by 1. The TTL is (re)applied on every call, so a
    /// steady stream of writes keeps the key alive indefinitely.
    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CacheError>;

    /// Atomic float increment, same TTL semantics as `increment`.
    async fn increment_f64(&self, key: &str, by: f64, ttl: Duration) -> Result<f64, CacheError>;

    async fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Remove every key under a prefix (content-cache invalidation).
    async fn clear_prefix(&self, prefix: &str) -> Result<(), CacheError>;
}

/// Redis-backed production implementation.
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    pub fn new(redis_url: &str) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }
}

#[async_trait]
impl SharedCache for RedisCache {
    async fn read_u64(&self, key: &str) -> Result<Option<u64>, CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn.get(key).await?)
    }

    async fn read_f64(&self, key: &str) -> Result<Option<f64>, CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn.get(key).await?)
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: u64 = conn.incr(key, 1u64).await?;
        conn.expire::<_, ()>(key, ttl.as_secs() as i64).await?;
        Ok(value)
    }

    async fn increment_f64(&self, key: &str, by: f64, ttl: Duration) -> Result<f64, CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let value: f64 = conn.incr(key, by).await?;
        conn.expire::<_, ()>(key, ttl.as_secs() as i64).await?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        conn.del::<_, ()>(key).await?;
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let pattern = format!("{prefix}*");
        let keys: Vec<String> = {
            let mut iter = conn.scan_match::<_, String>(&pattern).await?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };
        if !keys.is_empty() {
            conn.del::<_, ()>(keys).await?;
        }
        Ok(())
    }
}

/// In-memory implementation for unit tests and single-process tooling.
#[derive(Default)]
pub struct MemoryCache {
    entries: Mutex<HashMap<String, (f64, Option<Instant>)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn live(entry: Option<&(f64, Option<Instant>)>) -> Option<f64> {
        match entry {
            Some((value, Some(expiry))) if *expiry > Instant::now() => Some(*value),
            Some((value, None)) => Some(*value),
            _ => None,
        }
    }
}

#[async_trait]
impl SharedCache for MemoryCache {
    async fn read_u64(&self, key: &str) -> Result<Option<u64>, CacheError> {
        let entries = self.entries.lock().await;
        Ok(Self::live(entries.get(key)).map(|v| v as u64))
    }

    async fn read_f64(&self, key: &str) -> Result<Option<f64>, CacheError> {
        let entries = self.entries.lock().await;
        Ok(Self::live(entries.get(key)))
    }

    async fn increment(&self, key: &str, ttl: Duration) -> Result<u64, CacheError> {
        let mut entries = self.entries.lock().await;
        let current = Self::live(entries.get(key)).unwrap_or(0.0);
        let next = current + 1.0;
        entries.insert(key.to_string(), (next, Some(Instant::now() + ttl)));
        Ok(next as u64)
    }

    async fn increment_f64(&self, key: &str, by: f64, ttl: Duration) -> Result<f64, CacheError> {
        let mut entries = self.entries.lock().await;
        let current = Self::live(entries.get(key)).unwrap_or(0.0);
        let next = current + by;
        entries.insert(key.to_string(), (next, Some(Instant::now() + ttl)));
        Ok(next)
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.entries.lock().await.remove(key);
        Ok(())
    }

    async fn clear_prefix(&self, prefix: &str) -> Result<(), CacheError> {
        self.entries
            .lock()
            .await
            .retain(|key, _| !key.starts_with(prefix));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_cache_increments_and_deletes() {
        let cache = MemoryCache::new();
        assert_eq!(cache.read_u64("k").await.unwrap(), None);
        assert_eq!(cache.increment("k", Duration::from_secs(60)).await.unwrap(), 1);
        assert_eq!(cache.increment("k", Duration::from_secs(60)).await.unwrap(), 2);
        cache.delete("k").await.unwrap();
        assert_eq!(cache.read_u64("k").await.unwrap(), None);
    }

    #[tokio::test]
    async fn memory_cache_clear_prefix_only_touches_prefix() {
        let cache = MemoryCache::new();
        cache.increment("content:a", Duration::from_secs(60)).await.unwrap();
        cache.increment("content:b", Duration::from_secs(60)).await.unwrap();
        cache.increment("other", Duration::from_secs(60)).await.unwrap();

        cache.clear_prefix("content:").await.unwrap();
        assert_eq!(cache.read_u64("content:a").await.unwrap(), None);
        assert_eq!(cache.read_u64("other").await.unwrap(), Some(1));
    }
}
