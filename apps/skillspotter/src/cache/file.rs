use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::Context;
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::cache::FallbackCache;
use crate::errors::AppError;

type Entries = BTreeMap<String, String>;

/// JSON-object-on-disk cache. Every write replaces the file atomically through a
/// sibling temp file, so a crash never leaves a half-written cache behind.
pub struct FileCache {
    path: PathBuf,
    // Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl FileCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<Entries, AppError> {
        let path = self.path.clone();
        run_blocking(move || read_entries(&path)).await
    }

    async fn store(&self, entries: Entries) -> Result<(), AppError> {
        let path = self.path.clone();
        run_blocking(move || write_entries(&path, &entries)).await
    }

    async fn modify<F>(&self, f: F) -> Result<(), AppError>
    where
        F: FnOnce(&mut Entries),
    {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        f(&mut entries);
        self.store(entries).await
    }
}

#[async_trait]
impl FallbackCache for FileCache {
    async fn get(&self, key: &str) -> Result<Option<String>, AppError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), AppError> {
        let (key, value) = (key.to_string(), value.to_string());
        self.modify(move |entries| {
            entries.insert(key, value);
        })
        .await
    }

    async fn remove(&self, key: &str) -> Result<(), AppError> {
        let key = key.to_string();
        self.modify(move |entries| {
            entries.remove(&key);
        })
        .await
    }

    async fn clear(&self) -> Result<(), AppError> {
        self.modify(|entries| entries.clear()).await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, AppError>
where
    T: Send + 'static,
    F: FnOnce() -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| AppError::Cache(format!("cache task failed: {e}")))?
        .map_err(|e| AppError::Cache(format!("{e:#}")))
}

fn read_entries(path: &Path) -> anyhow::Result<Entries> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Entries::new()),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to read cache {}", path.display()))
        }
    };
    if raw.trim().is_empty() {
        return Ok(Entries::new());
    }
    match serde_json::from_str(&raw) {
        Ok(entries) => Ok(entries),
        Err(e) => {
            tracing::warn!("Cache file {} is corrupt, starting empty: {e}", path.display());
            Ok(Entries::new())
        }
    }
}

fn write_entries(path: &Path, entries: &Entries) -> anyhow::Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create cache directory {}", dir.display()))?;

    let mut tmp = tempfile::NamedTempFile::new_in(&dir).context("Failed to create temp file")?;
    serde_json::to_writer_pretty(&mut tmp, entries).context("Failed to encode cache")?;
    tmp.flush().context("Failed to flush cache")?;
    tmp.persist(path)
        .with_context(|| format!("Failed to replace cache {}", path.display()))?;
    Ok(())
}
