//! Redis-backed cache store (feature `redis`)

use ::redis::aio::MultiplexedConnection;
use ::redis::AsyncCommands;
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

use super::CacheStore;
use crate::error::{AuthzError, Result};

/// [`CacheStore`] over a shared Redis instance, using `GET` and `SET .. EX`.
///
/// Every transport or protocol failure surfaces as `DependencyUnavailable`.
#[derive(Clone)]
pub struct RedisCacheStore {
    connection: MultiplexedConnection,
}

impl RedisCacheStore {
    /// Connect to Redis at `redis_url` (e.g. `redis://localhost:6379`)
    pub async fn connect(redis_url: &str) -> Result<Self> {
        let client = ::redis::Client::open(redis_url)
            .map_err(|e| AuthzError::unavailable("redis", format!("invalid url: {}", e)))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| AuthzError::unavailable("redis", format!("failed to connect: {}", e)))?;

        info!("Connected Redis cache store");
        Ok(Self { connection })
    }
}

#[async_trait]
impl CacheStore for RedisCacheStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.connection.clone();
        conn.get::<_, Option<String>>(key)
            .await
            .map_err(|e| AuthzError::unavailable("redis", e.to_string()))
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.connection.clone();
        // EX requires a positive number of seconds
        let seconds = ttl.as_secs().max(1);
        conn.set_ex::<_, _, ()>(key, value, seconds)
            .await
            .map_err(|e| AuthzError::unavailable("redis", e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Requires a running Redis instance
    // Run with: docker run -d -p 6379:6379 redis:7

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn test_redis_roundtrip() {
        let url = std::env::var("TEST_REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let store = RedisCacheStore::connect(&url).await.unwrap();

        store.set("authz:test:users:read", "1", Duration::from_secs(5)).await.unwrap();
        assert_eq!(
            store.get("authz:test:users:read").await.unwrap().as_deref(),
            Some("1")
        );
    }

    #[tokio::test]
    async fn test_unreachable_redis_is_unavailable() {
        let result = RedisCacheStore::connect("redis://127.0.0.1:1").await;
        assert!(matches!(result, Err(ref e) if e.is_unavailable()));
    }
}
