//! Fast cache contract used for hot mastery reads and the per-learner ranking signals.
//!
//! Semantics follow Redis: keys carry an optional TTL, values are strings,
//! hashes or sorted sets, and rank ranges are inclusive. [`RedisCache`] is the
//! shared implementation; [`MemoryCache`] serves single-process runs and tests.

pub mod keys;
pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

pub use self::memory::MemoryCache;
pub use self::redis::RedisCache;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
    #[error("wrong value type for key {key}")]
    WrongType { key: String },
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub trait FastCache: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// `ttl: None` keeps the key until it is deleted.
    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError>;

    fn delete(&self, key: &str) -> Result<(), CacheError>;

    /// Returns false when the key does not exist.
    fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError>;

    fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError>;

    fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError>;

    fn hash_delete(&self, key: &str, field: &str) -> Result<(), CacheError>;

    fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>, CacheError>;

    fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> Result<(), CacheError>;

    /// Adds `delta` to the member's score (creating it at 0) and returns the new score.
    fn sorted_set_increment(&self, key: &str, member: &str, delta: f64)
        -> Result<f64, CacheError>;

    /// Members ranked `start..=end` by descending score.
    fn sorted_set_range_desc(
        &self,
        key: &str,
        start: usize,
        end: usize,
    ) -> Result<Vec<String>, CacheError>;

    /// Members with `min <= score <= max`, ascending.
    fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<String>, CacheError>;
}

pub fn get_json<T: DeserializeOwned>(
    cache: &dyn FastCache,
    key: &str,
) -> Result<Option<T>, CacheError> {
    match cache.get(key)? {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

pub fn set_json<T: Serialize>(
    cache: &dyn FastCache,
    key: &str,
    value: &T,
    ttl: Option<Duration>,
) -> Result<(), CacheError> {
    let payload = serde_json::to_string(value)?;
    cache.set(key, &payload, ttl)
}

/// The cache a process runs with: Redis when configured, otherwise in-process.
#[derive(Clone)]
pub enum CacheBackend {
    Memory(Arc<MemoryCache>),
    Redis(Arc<RedisCache>),
}

impl CacheBackend {
    pub async fn connect(
        redis_url: Option<&str>,
        command_timeout: Duration,
    ) -> Result<Self, CacheError> {
        match redis_url {
            Some(url) => {
                let cache = RedisCache::connect(url, command_timeout).await?;
                tracing::info!("Using Redis cache");
                Ok(Self::Redis(Arc::new(cache)))
            }
            None => {
                tracing::info!("REDIS_URL not set, using in-process cache");
                Ok(Self::Memory(Arc::new(MemoryCache::new())))
            }
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Memory(_) => "memory",
            Self::Redis(_) => "redis",
        }
    }

    pub fn shared(&self) -> Arc<dyn FastCache> {
        match self {
            Self::Memory(cache) => cache.clone(),
            Self::Redis(cache) => cache.clone(),
        }
    }

    /// In-process handle, for expiry sweeps. Redis expires keys itself.
    pub fn memory(&self) -> Option<Arc<MemoryCache>> {
        match self {
            Self::Memory(cache) => Some(cache.clone()),
            Self::Redis(_) => None,
        }
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        match self {
            Self::Memory(cache) => cache.len().map(|_| ()),
            Self::Redis(cache) => cache.ping().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn without_url_runs_in_process() {
        let backend = CacheBackend::connect(None, Duration::from_millis(100)).await.unwrap();
        assert_eq!(backend.name(), "memory");
        assert!(backend.memory().is_some());
        backend.ping().await.unwrap();

        backend.shared().set("k", "v", None).unwrap();
        assert_eq!(backend.memory().unwrap().get("k").unwrap().as_deref(), Some("v"));
    }

    #[tokio::test]
    async fn unreachable_redis_is_an_error() {
        let result = CacheBackend::connect(Some("redis://127.0.0.1:1/"), Duration::from_millis(200)).await;
        assert!(result.is_err());
    }
}
