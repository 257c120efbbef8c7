use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::models::credential::Credential;

/// Shared view of the current credential. The auth store writes it; the API
/// client reads the bearer token from it and swaps in refreshed tokens.
///
/// Every sign-in or sign-out bumps the epoch, so work started under an earlier
/// session can tell it has been superseded before writing its result back.
#[derive(Clone, Default)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Default)]
struct SessionInner {
    credential: RwLock<Option<Credential>>,
    epoch: AtomicU64,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Option<Credential> {
        self.read().clone()
    }

    pub fn token(&self) -> Option<String> {
        self.read().as_ref().map(|c| c.token.clone())
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    pub fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    /// Installs a new credential and starts a new epoch.
    pub fn sign_in(&self, credential: Credential) -> u64 {
        let mut guard = self.write();
        *guard = Some(credential);
        self.inner.epoch.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Replaces the credential only if no sign-in or sign-out happened since `epoch`.
    pub fn replace_if_current(&self, epoch: u64, credential: Credential) -> bool {
        let mut guard = self.write();
        if self.epoch() != epoch || guard.is_none() {
            return false;
        }
        *guard = Some(credential);
        true
    }

    /// Swaps the token of the held credential, keeping the profile. Does nothing
    /// if the session changed since `epoch`.
    pub fn update_token(&self, epoch: u64, token: &str) -> Option<Credential> {
        let mut guard = self.write();
        if self.epoch() != epoch {
            return None;
        }
        let credential = guard.as_mut()?;
        credential.token = token.to_string();
        Some(credential.clone())
    }

    pub fn clear(&self) {
        let mut guard = self.write();
        *guard = None;
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
    }

    /// Clears the credential only if no sign-in or sign-out happened since `epoch`.
    pub fn clear_if_current(&self, epoch: u64) -> bool {
        let mut guard = self.write();
        if self.epoch() != epoch {
            return false;
        }
        *guard = None;
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
        true
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Option<Credential>> {
        self.inner
            .credential
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Option<Credential>> {
        self.inner
            .credential
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
