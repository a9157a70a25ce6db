//! Redis-backed [`FastCache`], shared by every process pointed at the same server.
//!
//! The trait is synchronous because the engine calls it from the blocking pool,
//! so each command is driven on the runtime handle captured at connect time.
//! Never call these methods from an async worker thread.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, RedisError, RedisResult};
use tokio::runtime::Handle;

use super::{CacheError, FastCache};

#[derive(Clone)]
pub struct RedisCache {
    connection: MultiplexedConnection,
    runtime: Handle,
    command_timeout: Duration,
}

fn map_redis_error(key: &str, error: RedisError) -> CacheError {
    if error.code() == Some("WRONGTYPE") {
        CacheError::WrongType {
            key: key.to_string(),
        }
    } else {
        CacheError::Unavailable(error.to_string())
    }
}

/// Inclusive rank bound as Redis expects it.
fn rank(index: usize) -> isize {
    isize::try_from(index).unwrap_or(isize::MAX)
}

/// Whole seconds for `EXPIRE` / `SET EX`; Redis rejects 0.
fn ttl_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

impl RedisCache {
    pub async fn connect(redis_url: &str, command_timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(redis_url).map_err(|e| map_redis_error(redis_url, e))?;
        let connection = tokio::time::timeout(command_timeout, client.get_multiplexed_tokio_connection())
            .await
            .map_err(|_| CacheError::Unavailable(format!("redis connect timed out: {redis_url}")))?
            .map_err(|e| map_redis_error(redis_url, e))?;
        Ok(Self {
            connection,
            runtime: Handle::current(),
            command_timeout,
        })
    }

    pub async fn ping(&self) -> Result<(), CacheError> {
        let mut conn = self.connection.clone();
        let reply: RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
        reply.map(|_| ()).map_err(|e| map_redis_error("PING", e))
    }

    fn run<T, F, Fut>(&self, key: &str, command: F) -> Result<T, CacheError>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let future = command(self.connection.clone());
        let timeout = self.command_timeout;
        match self.runtime.block_on(tokio::time::timeout(timeout, future)) {
            Ok(result) => result.map_err(|e| map_redis_error(key, e)),
            Err(_) => Err(CacheError::Unavailable(format!(
                "redis command on {key} timed out after {} ms",
                timeout.as_millis()
            ))),
        }
    }
}

impl FastCache for RedisCache {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.run(key, |mut conn| async move { conn.get(key).await })
    }

    fn set(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<(), CacheError> {
        self.run(key, |mut conn| async move {
            match ttl {
                Some(ttl) => conn.set_ex(key, value, ttl_secs(ttl)).await,
                None => conn.set(key, value).await,
            }
        })
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.run(key, |mut conn| async move {
            let _removed: u64 = conn.del(key).await?;
            Ok(())
        })
    }

    fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CacheError> {
        self.run(key, |mut conn| async move {
            redis::cmd("EXPIRE")
                .arg(key)
                .arg(ttl_secs(ttl))
                .query_async(&mut conn)
                .await
        })
    }

    fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, CacheError> {
        self.run(key, |mut conn| async move { conn.hget(key, field).await })
    }

    fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), CacheError> {
        self.run(key, |mut conn| async move {
            let _added: u64 = conn.hset(key, field, value).await?;
            Ok(())
        })
    }

    fn hash_delete(&self, key: &str, field: &str) -> Result<(), CacheError> {
        self.run(key, |mut conn| async move {
            let _removed: u64 = conn.hdel(key, field).await?;
            Ok(())
        })
    }

    fn hash_get_all(&self, key: &str) -> Result<Vec<(String, String)>, CacheError> {
        let fields: HashMap<String, String> =
            self.run(key, |mut conn| async move { conn.hgetall(key).await })?;
        Ok(fields.into_iter().collect())
    }

    fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> Result<(), CacheError> {
        self.run(key, |mut conn| async move {
            let _added: u64 = conn.zadd(key, member, score).await?;
            Ok(())
        })
    }

    fn sorted_set_increment(&self, key: &str, member: &str, delta: f64) -> Result<f64, CacheError> {
        self.run(key, |mut conn| async move { conn.zincr(key, member, delta).await })
    }

    fn sorted_set_range_desc(
        &self,
        key: &str,
        start: usize,
        end: usize,
    ) -> Result<Vec<String>, CacheError> {
        self.run(key, |mut conn| async move {
            conn.zrevrange(key, rank(start), rank(end)).await
        })
    }

    fn sorted_set_range_by_score(
        &self,
        key: &str,
        min: f64,
        max: f64,
    ) -> Result<Vec<String>, CacheError> {
        self.run(key, |mut conn| async move { conn.zrangebyscore(key, min, max).await })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn ranks_and_ttls_are_clamped() {
        assert_eq!(rank(9), 9);
        assert_eq!(rank(usize::MAX), isize::MAX);
        assert_eq!(ttl_secs(Duration::from_millis(200)), 1);
        assert_eq!(ttl_secs(Duration::from_secs(604_800)), 604_800);
    }

    #[test]
    fn wrongtype_replies_map_to_wrong_type() {
        let error = redis::parse_redis_value(
            b"-WRONGTYPE Operation against a key holding the wrong kind of value\r\n",
        )
        .and_then(redis::Value::extract_error)
        .unwrap_err();
        assert!(matches!(map_redis_error("k", error), CacheError::WrongType { .. }));

        let error = RedisError::from((redis::ErrorKind::IoError, "connection reset"));
        assert!(matches!(map_redis_error("k", error), CacheError::Unavailable(_)));
    }

    #[tokio::test]
    async fn unreachable_server_fails_to_connect() {
        let result = RedisCache::connect("redis://127.0.0.1:1/", Duration::from_millis(200)).await;
        assert!(matches!(result, Err(CacheError::Unavailable(_))));
    }

    /// Runs only when `REDIS_URL` points at a disposable server.
    #[tokio::test(flavor = "multi_thread")]
    async fn commands_against_live_server() {
        let Ok(url) = std::env::var("REDIS_URL") else {
            return;
        };
        let cache = Arc::new(RedisCache::connect(&url, Duration::from_secs(2)).await.unwrap());
        cache.ping().await.unwrap();

        tokio::task::spawn_blocking(move || {
            let key = format!("adaptive-practice-test:{}", uuid::Uuid::new_v4());
            cache.sorted_set_increment(&key, "a", 1.0).unwrap();
            cache.sorted_set_increment(&key, "b", 3.0).unwrap();
            assert_eq!(cache.sorted_set_range_desc(&key, 0, 0).unwrap(), vec!["b"]);
            assert_eq!(cache.sorted_set_range_by_score(&key, 0.0, 2.0).unwrap(), vec!["a"]);
            assert!(matches!(cache.hash_get(&key, "f"), Err(CacheError::WrongType { .. })));
            assert!(cache.expire(&key, Duration::from_secs(30)).unwrap());
            cache.delete(&key).unwrap();
            assert!(!cache.expire(&key, Duration::from_secs(30)).unwrap());
        })
        .await
        .unwrap();
    }
}
