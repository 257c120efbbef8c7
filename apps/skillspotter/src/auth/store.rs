use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::auth::timer::RefreshTimer;
use crate::auth::AuthBackend;
use crate::cache::{self, keys, FallbackCache};
use crate::errors::AppError;
use crate::models::credential::{Credential, LoginRequest, RegisterRequest};
use crate::processing::PollRegistry;
use crate::session::Session;

/// Owns the credential lifecycle: sign-in, the one-shot refresh timer, and sign-out.
///
/// Cheap to clone; all clones share one session and one timer. The timer task
/// only holds a weak reference, so dropping the last clone cancels it.
#[derive(Clone)]
pub struct AuthStore {
    inner: Arc<AuthInner>,
}

struct AuthInner {
    backend: Arc<dyn AuthBackend>,
    session: Session,
    cache: Arc<dyn FallbackCache>,
    polls: PollRegistry,
    refresh_delay: Duration,
    timer: Mutex<Option<RefreshTimer>>,
}

impl AuthStore {
    pub fn new(
        backend: Arc<dyn AuthBackend>,
        session: Session,
        cache: Arc<dyn FallbackCache>,
        polls: PollRegistry,
        refresh_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(AuthInner {
                backend,
                session,
                cache,
                polls,
                refresh_delay,
                timer: Mutex::new(None),
            }),
        }
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn current_user(&self) -> Option<Credential> {
        self.inner.session.current()
    }

    pub fn is_authenticated(&self) -> bool {
        self.inner.session.is_authenticated()
    }

    pub fn is_admin(&self) -> bool {
        self.current_user().is_some_and(|c| c.is_admin())
    }

    pub async fn login(&self, request: LoginRequest) -> Result<Credential, AppError> {
        request.validate()?;
        let payload = self.inner.backend.login(&request).await?;
        let credential = Credential::from_payload(payload, None)?;
        self.establish(credential.clone()).await;
        info!("Logged in as user {}", credential.user_id);
        Ok(credential)
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<Credential, AppError> {
        request.validate()?;
        let payload = self.inner.backend.register(&request).await?;
        let credential = Credential::from_payload(payload, None)?;
        self.establish(credential.clone()).await;
        info!("Registered user {}", credential.user_id);
        Ok(credential)
    }

    /// Exchanges the held token for a fresh one and re-arms the timer.
    /// Any failure ends the session; there is no retry.
    pub async fn refresh(&self) -> Result<Credential, AppError> {
        let session = &self.inner.session;
        let epoch = session.epoch();
        let Some(current) = session.current() else {
            return Err(AppError::AuthExpired);
        };

        let fresh = match self.inner.backend.refresh().await {
            Ok(payload) => payload.token.filter(|t| !t.is_empty()),
            Err(e) => {
                warn!("Token refresh failed: {e}");
                None
            }
        };

        let Some(token) = fresh else {
            // Only tear down the session this refresh was started for.
            if session.epoch() == epoch {
                self.logout().await;
            }
            return Err(AppError::AuthExpired);
        };

        let credential = Credential { token, ..current };
        if !session.replace_if_current(epoch, credential.clone()) {
            debug!("Session changed while refreshing; discarding refreshed token");
            return Err(AppError::AuthExpired);
        }
        self.persist(&credential).await;
        self.arm_timer();
        debug!("Token refreshed");
        Ok(credential)
    }

    /// Clears the session, cancels the refresh timer and any running polls, then
    /// tells the backend. The backend notification cannot fail the logout.
    pub async fn logout(&self) {
        self.disarm_timer();
        self.inner.polls.cancel_all();

        let token = self.inner.session.token();
        self.inner.session.clear();
        for key in [keys::TOKEN, keys::USER] {
            if let Err(e) = self.inner.cache.remove(key).await {
                warn!("Failed to clear cached '{key}': {e}");
            }
        }

        if let Some(token) = token {
            if let Err(e) = self.inner.backend.logout(&token).await {
                debug!("Logout notification failed (ignored): {e}");
            }
        }
        info!("Logged out");
    }

    /// Reloads a session persisted by an earlier run. Entries that do not parse
    /// are dropped from the cache.
    pub async fn restore(&self) -> Result<Option<Credential>, AppError> {
        let cache = self.inner.cache.as_ref();
        let Some(token) = cache.get(keys::TOKEN).await? else {
            return Ok(None);
        };
        let Some(mut credential) = cache::get_json::<Credential>(cache, keys::USER).await? else {
            warn!("Cached session is incomplete or corrupt; discarding it");
            cache.remove(keys::TOKEN).await?;
            cache.remove(keys::USER).await?;
            return Ok(None);
        };

        credential.token = token;
        self.inner.session.sign_in(credential.clone());
        self.arm_timer();
        debug!("Restored session for user {}", credential.user_id);
        Ok(Some(credential))
    }

    /// Confirms the held session with the backend, merging the returned profile
    /// with the held token. Logs out if the backend rejects or cannot confirm it.
    pub async fn check_auth_status(&self) -> Option<Credential> {
        let session = &self.inner.session;
        let epoch = session.epoch();
        let held = session.token()?;

        let confirmed = match self.inner.backend.current_user().await {
            Ok(payload) => Credential::from_payload(payload, Some(&held)),
            Err(e) => Err(e),
        };

        match confirmed {
            Ok(credential) => {
                if session.replace_if_current(epoch, credential.clone()) {
                    self.persist(&credential).await;
                    Some(credential)
                } else {
                    session.current()
                }
            }
            Err(e) => {
                warn!("Auth check failed, logging out: {e}");
                if session.epoch() == epoch {
                    self.logout().await;
                }
                None
            }
        }
    }

    async fn establish(&self, credential: Credential) {
        self.inner.session.sign_in(credential.clone());
        self.persist(&credential).await;
        self.arm_timer();
    }

    async fn persist(&self, credential: &Credential) {
        let cache = self.inner.cache.as_ref();
        if let Err(e) = cache.set(keys::TOKEN, &credential.token).await {
            warn!("Failed to cache token: {e}");
        }
        cache::remember(cache, keys::USER, credential).await;
    }

    fn arm_timer(&self) {
        let weak: Weak<AuthInner> = Arc::downgrade(&self.inner);
        let timer = RefreshTimer::arm(self.inner.refresh_delay, move || async move {
            if let Some(inner) = weak.upgrade() {
                let store = AuthStore { inner };
                let _ = store.refresh().await;
            }
        });
        // Replacing drops (and so cancels) the previous timer.
        *self.lock_timer() = Some(timer);
    }

    fn disarm_timer(&self) {
        if let Some(timer) = self.lock_timer().take() {
            timer.cancel();
        }
    }

    fn lock_timer(&self) -> std::sync::MutexGuard<'_, Option<RefreshTimer>> {
        self.inner
            .timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::models::credential::{AuthPayload, RefreshPayload, Role};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use uuid::Uuid;

    const DELAY: Duration = Duration::from_secs(45 * 60);

    #[derive(Default)]
    struct FakeBackend {
        refresh_calls: AtomicUsize,
        refresh_fails: AtomicBool,
        me_fails: AtomicBool,
        logout_fails: AtomicBool,
        logged_out_tokens: Mutex<Vec<String>>,
    }

    fn payload(email: &str, token: Option<&str>) -> AuthPayload {
        AuthPayload {
            token: token.map(str::to_string),
            user_id: Some("u1".into()),
            email: Some(email.into()),
            name: Some("Jane".into()),
            role: None,
        }
    }

    #[async_trait]
    impl AuthBackend for FakeBackend {
        async fn login(&self, request: &LoginRequest) -> Result<AuthPayload, AppError> {
            if request.password == "wrong" {
                return Err(AppError::Api {
                    status: 401,
                    message: "Invalid credentials".into(),
                });
            }
            Ok(payload(&request.email, Some("t0")))
        }

        async fn register(&self, request: &RegisterRequest) -> Result<AuthPayload, AppError> {
            Ok(payload(&request.email, Some("t0")))
        }

        async fn refresh(&self) -> Result<RefreshPayload, AppError> {
            let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.refresh_fails.load(Ordering::SeqCst) {
                return Err(AppError::Api {
                    status: 401,
                    message: "expired".into(),
                });
            }
            Ok(RefreshPayload {
                token: Some(format!("t{n}")),
            })
        }

        async fn current_user(&self) -> Result<AuthPayload, AppError> {
            if self.me_fails.load(Ordering::SeqCst) {
                return Err(AppError::Api {
                    status: 401,
                    message: "expired".into(),
                });
            }
            let mut p = payload("jane@example.com", None);
            p.name = Some("Jane Doe".into());
            Ok(p)
        }

        async fn logout(&self, token: &str) -> Result<(), AppError> {
            self.logged_out_tokens.lock().unwrap().push(token.to_string());
            if self.logout_fails.load(Ordering::SeqCst) {
                return Err(AppError::Api {
                    status: 500,
                    message: "boom".into(),
                });
            }
            Ok(())
        }
    }

    fn store_with(backend: Arc<FakeBackend>, cache: Arc<MemoryCache>) -> AuthStore {
        AuthStore::new(backend, Session::new(), cache, PollRegistry::new(), DELAY)
    }

    fn login_request() -> LoginRequest {
        LoginRequest {
            email: "jane@example.com".into(),
            password: "hunter22".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_login_stores_credential_and_caches_it() {
        let backend = Arc::new(FakeBackend::default());
        let cache = Arc::new(MemoryCache::new());
        let store = store_with(backend, cache.clone());

        let cred = store.login(login_request()).await.unwrap();
        assert_eq!(cred.role, Role::User);
        assert_eq!(store.current_user(), Some(cred));
        assert!(!store.is_admin());
        assert_eq!(cache.get(keys::TOKEN).await.unwrap().as_deref(), Some("t0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_invalid_login_rejected_before_backend() {
        let store = store_with(Arc::new(FakeBackend::default()), Arc::new(MemoryCache::new()));
        let err = store
            .login(LoginRequest {
                email: "not-an-email".into(),
                password: "x".into(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
        assert!(store.current_user().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_fires_after_delay_and_rearms() {
        let backend = Arc::new(FakeBackend::default());
        let store = store_with(backend.clone(), Arc::new(MemoryCache::new()));
        store.login(login_request()).await.unwrap();

        tokio::time::sleep(DELAY - Duration::from_secs(1)).await;
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 0);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.session().token().as_deref(), Some("t1"));

        tokio::time::sleep(DELAY).await;
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 2);
        assert_eq!(store.session().token().as_deref(), Some("t2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_cancels_pending_refresh() {
        let backend = Arc::new(FakeBackend::default());
        let cache = Arc::new(MemoryCache::new());
        let store = store_with(backend.clone(), cache.clone());
        store.login(login_request()).await.unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;
        store.logout().await;
        assert!(store.current_user().is_none());
        assert!(cache.get(keys::TOKEN).await.unwrap().is_none());
        assert!(cache.get(keys::USER).await.unwrap().is_none());

        tokio::time::sleep(DELAY * 3).await;
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(*backend.logged_out_tokens.lock().unwrap(), vec!["t0".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_notification_failure_is_ignored() {
        let backend = Arc::new(FakeBackend::default());
        backend.logout_fails.store(true, Ordering::SeqCst);
        let store = store_with(backend, Arc::new(MemoryCache::new()));
        store.login(login_request()).await.unwrap();

        store.logout().await;
        assert!(store.current_user().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_logout_cancels_running_polls() {
        let polls = PollRegistry::new();
        let store = AuthStore::new(
            Arc::new(FakeBackend::default()),
            Session::new(),
            Arc::new(MemoryCache::new()),
            polls.clone(),
            DELAY,
        );
        store.login(login_request()).await.unwrap();
        let guard = polls.begin(Uuid::new_v4());

        store.logout().await;
        assert!(guard.token().is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_failure_clears_session() {
        let backend = Arc::new(FakeBackend::default());
        backend.refresh_fails.store(true, Ordering::SeqCst);
        let store = store_with(backend.clone(), Arc::new(MemoryCache::new()));
        store.login(login_request()).await.unwrap();

        tokio::time::sleep(DELAY + Duration::from_secs(1)).await;
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
        assert!(store.current_user().is_none());

        // No retry once the session is gone.
        tokio::time::sleep(DELAY * 2).await;
        assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_admin_role_from_email_heuristic() {
        let store = store_with(Arc::new(FakeBackend::default()), Arc::new(MemoryCache::new()));
        store
            .login(LoginRequest {
                email: "admin@example.com".into(),
                password: "pw".into(),
            })
            .await
            .unwrap();
        assert!(store.is_admin());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_from_cache() {
        let backend = Arc::new(FakeBackend::default());
        let cache = Arc::new(MemoryCache::new());
        let first = store_with(backend.clone(), cache.clone());
        first.login(login_request()).await.unwrap();

        let second = store_with(backend, cache);
        let restored = second.restore().await.unwrap().unwrap();
        assert_eq!(restored.token, "t0");
        assert_eq!(restored.email, "jane@example.com");
        assert!(second.is_authenticated());
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_discards_corrupt_user() {
        let cache = Arc::new(MemoryCache::new());
        cache.set(keys::TOKEN, "t0").await.unwrap();
        cache.set(keys::USER, "{broken").await.unwrap();
        let store = store_with(Arc::new(FakeBackend::default()), cache.clone());

        assert!(store.restore().await.unwrap().is_none());
        assert!(cache.get(keys::TOKEN).await.unwrap().is_none());
        assert!(cache.get(keys::USER).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_auth_status_merges_profile() {
        let store = store_with(Arc::new(FakeBackend::default()), Arc::new(MemoryCache::new()));
        store.login(login_request()).await.unwrap();

        let cred = store.check_auth_status().await.unwrap();
        assert_eq!(cred.token, "t0");
        assert_eq!(cred.name.as_deref(), Some("Jane Doe"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_auth_status_failure_logs_out() {
        let backend = Arc::new(FakeBackend::default());
        backend.me_fails.store(true, Ordering::SeqCst);
        let store = store_with(backend, Arc::new(MemoryCache::new()));
        store.login(login_request()).await.unwrap();

        assert!(store.check_auth_status().await.is_none());
        assert!(store.current_user().is_none());
    }
}
