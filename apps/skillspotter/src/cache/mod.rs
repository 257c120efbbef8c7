//! Fallback cache: local, non-authoritative key/value storage consulted when the
//! backend is unreachable. Injected into every service as `Arc<dyn FallbackCache>`.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::RwLock;
use tracing::warn;

use crate::errors::AppError;

pub mod file;
pub mod redis_store;

pub use file::FileCache;
pub use redis_store::RedisCache;

/// Well-known cache keys. Values are JSON-serialized strings.
pub mod keys {
    pub const TOKEN: &str = "token";
    pub const USER: &str = "user";
    pub const EXTRACTED_SKILLS: &str = "extractedSkills";
    pub const CACHED_SKILLS: &str = "cachedSkills";
    pub const RESUME_DATA: &str = "resumeData";
    pub const CACHED_RESUME_DATA: &str = "cachedResumeData";
    pub const MOCK_JOBS: &str = "mockJobs";
    pub const USERS: &str = "users";
}

#[async_trait]
pub trait FallbackCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), AppError>;
    async fn remove(&self, key: &str) -> Result<(), AppError>;
    async fn clear(&self) -> Result<(), AppError>;
}

/// Reads and deserializes a cached value. Corrupt entries read as absent.
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn FallbackCache,
    key: &str,
) -> Result<Option<T>, AppError> {
    let Some(raw) = cache.get(key).await? else {
        return Ok(None);
    };
    match serde_json::from_str(&raw) {
        Ok(value) => Ok(Some(value)),
        Err(e) => {
            warn!("Ignoring corrupt cache entry '{key}': {e}");
            Ok(None)
        }
    }
}

pub async fn set_json<T: Serialize + ?Sized>(
    cache: &dyn FallbackCache,
    key: &str,
    value: &T,
) -> Result<(), AppError> {
    let raw = serde_json::to_string(value)?;
    cache.set(key, &raw).await
}

/// Best-effort write used on read paths, where a cache failure must not mask the result.
pub async fn remember<T: Serialize + ?Sized>(cache: &dyn FallbackCache, key: &str, value: &T) {
    if let Err(e) = set_json(cache, key, value).await {
        warn!("Failed to cache '{key}': {e}");
    }
}

/// Process-local cache. Used by tests and by sessions that should not persist.
#[derive(Debug, Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FallbackCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn clear(&self) -> Result<(), AppError> {
        self.entries.write().await.clear();
        Ok(())
    }
}
