use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

/// Tracks the in-flight poll for each upload so a newer poll for the same
/// upload, a logout, or a teardown can stop it.
#[derive(Clone, Default)]
pub struct PollRegistry {
    inner: Arc<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    polls: Mutex<HashMap<Uuid, (u64, CancellationToken)>>,
    next_generation: AtomicU64,
}

/// Registration for one poll. Dropping it unregisters the poll.
pub struct PollGuard {
    registry: PollRegistry,
    upload_id: Uuid,
    generation: u64,
    token: CancellationToken,
}

impl PollGuard {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn upload_id(&self) -> Uuid {
        self.upload_id
    }
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        let mut polls = self.registry.lock();
        // A newer poll for the same upload may have replaced this entry.
        if polls
            .get(&self.upload_id)
            .is_some_and(|(generation, _)| *generation == self.generation)
        {
            polls.remove(&self.upload_id);
        }
    }
}

impl PollRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a poll for `upload_id`, cancelling any poll already running for it.
    pub fn begin(&self, upload_id: Uuid) -> PollGuard {
        let token = CancellationToken::new();
        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let previous = self
            .lock()
            .insert(upload_id, (generation, token.clone()));
        if let Some((_, previous)) = previous {
            debug!("Superseding running poll for upload {upload_id}");
            previous.cancel();
        }
        PollGuard {
            registry: self.clone(),
            upload_id,
            generation,
            token,
        }
    }

    pub fn cancel(&self, upload_id: Uuid) -> bool {
        match self.lock().remove(&upload_id) {
            Some((_, token)) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&self) {
        let drained: Vec<_> = self.lock().drain().collect();
        if !drained.is_empty() {
            debug!("Cancelling {} running poll(s)", drained.len());
        }
        for (_, (_, token)) in drained {
            token.cancel();
        }
    }

    pub fn active(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, (u64, CancellationToken)>> {
        self.inner
            .polls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_supersedes_previous_poll() {
        let registry = PollRegistry::new();
        let id = Uuid::new_v4();
        let first = registry.begin(id);
        let second = registry.begin(id);

        assert!(first.token().is_cancelled());
        assert!(!second.token().is_cancelled());
        assert_eq!(registry.active(), 1);

        // Dropping the stale guard must not unregister the live one.
        drop(first);
        assert_eq!(registry.active(), 1);
        drop(second);
        assert_eq!(registry.active(), 0);
    }

    #[test]
    fn test_cancel_by_upload_id() {
        let registry = PollRegistry::new();
        let id = Uuid::new_v4();
        let guard = registry.begin(id);
        assert!(registry.cancel(id));
        assert!(guard.token().is_cancelled());
        assert!(!registry.cancel(id));
    }

    #[test]
    fn test_cancel_all() {
        let registry = PollRegistry::new();
        let a = registry.begin(Uuid::new_v4());
        let b = registry.begin(Uuid::new_v4());
        registry.cancel_all();
        assert!(a.token().is_cancelled());
        assert!(b.token().is_cancelled());
        assert_eq!(registry.active(), 0);
    }
}
