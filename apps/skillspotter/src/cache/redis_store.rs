use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;

use crate::cache::FallbackCache;
use crate::errors::AppError;

const KEY_PREFIX: &str = "skillspotter:";

/// Redis-backed fallback cache, for deployments where several client processes
/// share one session store. Keys are namespaced so `clear` only touches our own.
#[derive(Clone)]
pub struct RedisCache {
    conn: MultiplexedConnection,
}

impl RedisCache {
    pub async fn connect(url: &str) -> Result<Self, AppError> {
        let client = redis::Client::open(url).map_err(cache_error)?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(cache_error)?;
        tracing::info!("Redis fallback cache connected");
        Ok(Self { conn })
    }
}

fn namespaced(key: &str) -> String {
    format!("{KEY_PREFIX}{key}")
}

fn cache_error(e: redis::RedisError) -> AppError {
    AppError::Cache(format!("redis: {e}"))
}

#[async_trait]
impl FallbackCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let mut conn = self.conn.clone();
        conn.get(namespaced(key)).await.map_err(cache_error)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        conn.set(namespaced(key), value).await.map_err(cache_error)
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        conn.del(namespaced(key)).await.map_err(cache_error)
    }

    async fn clear(&self) -> Result<(), AppError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn
            .keys(format!("{KEY_PREFIX}*"))
            .await
            .map_err(cache_error)?;
        if keys.is_empty() {
            return Ok(());
        }
        conn.del(keys).await.map_err(cache_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_namespaced() {
        assert_eq!(namespaced("token"), "skillspotter:token");
    }

    #[tokio::test]
    async fn test_invalid_url_is_a_cache_error() {
        let err = RedisCache::connect("not-a-redis-url").await.err().unwrap();
        assert!(matches!(err, AppError::Cache(_)));
    }
}
