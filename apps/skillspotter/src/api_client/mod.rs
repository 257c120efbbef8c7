/// API Client: the single point of entry for all SkillSpotter backend calls.
///
/// Attaches the bearer token from the shared `Session` and performs the one
/// silent refresh-and-retry on a 401 from any non-auth endpoint. Typed endpoint
/// wrappers live in `endpoints`.
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use reqwest::{Client, Method, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::cache::{self, keys, FallbackCache};
use crate::errors::AppError;
use crate::models::credential::RefreshPayload;
use crate::session::Session;

pub mod endpoints;

pub use endpoints::{AnalyticsKind, ApiHealth, PresignedUrl};

const REQUEST_TIMEOUT_SECS: u64 = 60;
const REFRESH_PATH: &str = "/auth/refresh";
/// A 401 from these paths is a genuine auth failure, never a refresh trigger.
const AUTH_PATHS: [&str; 3] = ["/auth/login", "/auth/register", REFRESH_PATH];

pub(crate) enum Body {
    Empty,
    Json(Value),
    Multipart {
        field: &'static str,
        file_name: String,
        content_type: String,
        bytes: Bytes,
    },
}

/// A request description that can be replayed after a token refresh.
pub(crate) struct ApiRequest {
    method: Method,
    path: String,
    /// Appended after `path`, each percent-encoded as a single segment.
    segments: Vec<String>,
    query: Vec<(String, String)>,
    body: Body,
}

impl ApiRequest {
    pub(crate) fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            segments: Vec::new(),
            query: Vec::new(),
            body: Body::Empty,
        }
    }

    pub(crate) fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub(crate) fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub(crate) fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub(crate) fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub(crate) fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    fn display_path(&self) -> String {
        let mut path = self.path.clone();
        for segment in &self.segments {
            path.push('/');
            path.push_str(segment);
        }
        path
    }

    pub(crate) fn query(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query.extend(pairs);
        self
    }

    pub(crate) fn json(mut self, value: Value) -> Self {
        self.body = Body::Json(value);
        self
    }

    pub(crate) fn multipart(
        mut self,
        field: &'static str,
        file_name: String,
        content_type: String,
        bytes: Bytes,
    ) -> Self {
        self.body = Body::Multipart {
            field,
            file_name,
            content_type,
            bytes,
        };
        self
    }
}

#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    session: Session,
    cache: Arc<dyn FallbackCache>,
}

impl ApiClient {
    pub fn new(
        base_url: impl Into<String>,
        session: Session,
        cache: Arc<dyn FallbackCache>,
    ) -> Result<Self, AppError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;
        Ok(Self::with_http(http, base_url, session, cache))
    }

    pub fn with_http(
        http: Client,
        base_url: impl Into<String>,
        session: Session,
        cache: Arc<dyn FallbackCache>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            session,
            cache,
        }
    }

    pub fn http(&self) -> &Client {
        &self.http
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Sends the request, refreshing the token once on a 401 from a non-auth path.
    pub(crate) async fn execute(&self, request: ApiRequest) -> Result<Response, AppError> {
        let epoch = self.session.epoch();
        let token = self.session.token();
        let response = self.dispatch(&request, token.as_deref()).await?;

        if response.status() != StatusCode::UNAUTHORIZED
            || is_auth_path(&request.path)
            || token.is_none()
        {
            return Ok(response);
        }

        debug!(
            "{} {} returned 401, attempting silent token refresh",
            request.method, request.path
        );
        match self.silent_refresh(epoch, token.as_deref()).await {
            Ok(fresh) => self.dispatch(&request, Some(&fresh)).await,
            Err(e) => {
                warn!("Token refresh failed: {e}");
                self.expire_session(epoch).await;
                Err(AppError::AuthExpired)
            }
        }
    }

    /// Executes the request and decodes a JSON body. An empty body decodes as `null`.
    pub(crate) async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, AppError> {
        let path = request.display_path();
        let response = self.execute(request).await?;
        let response = check_status(response, &path).await?;
        let text = response.text().await?;
        let text = if text.trim().is_empty() { "null" } else { text.as_str() };
        Ok(serde_json::from_str(text)?)
    }

    pub(crate) async fn call_empty(&self, request: ApiRequest) -> Result<(), AppError> {
        let path = request.display_path();
        let response = self.execute(request).await?;
        check_status(response, &path).await?;
        Ok(())
    }

    async fn dispatch(&self, request: &ApiRequest, token: Option<&str>) -> Result<Response, AppError> {
        let mut builder = self
            .http
            .request(request.method.clone(), self.request_url(request)?);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.json(value),
            Body::Multipart {
                field,
                file_name,
                content_type,
                bytes,
            } => {
                let part = reqwest::multipart::Part::bytes(bytes.to_vec())
                    .file_name(file_name.clone())
                    .mime_str(content_type)?;
                builder.multipart(reqwest::multipart::Form::new().part(*field, part))
            }
        };
        Ok(builder.send().await?)
    }

    fn request_url(&self, request: &ApiRequest) -> Result<Url, AppError> {
        let mut url = Url::parse(&self.url(&request.path))
            .map_err(|e| AppError::Validation(format!("invalid API URL '{}': {e}", self.base_url)))?;
        if !request.segments.is_empty() {
            url.path_segments_mut()
                .map_err(|_| AppError::Validation(format!("API URL '{}' cannot take a path", self.base_url)))?
                .pop_if_empty()
                .extend(&request.segments);
        }
        Ok(url)
    }

    /// Refreshes the token for the session that was current at `epoch`. The new
    /// token is dropped if the session changed while the refresh was in flight.
    async fn silent_refresh(&self, epoch: u64, token: Option<&str>) -> Result<String, AppError> {
        let mut builder = self
            .http
            .post(self.url(REFRESH_PATH))
            .json(&serde_json::json!({}));
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }
        let response = check_status(builder.send().await?, REFRESH_PATH).await?;
        let payload: RefreshPayload = response.json().await?;
        let fresh = payload
            .token
            .filter(|t| !t.is_empty())
            .ok_or(AppError::AuthExpired)?;

        let Some(credential) = self.session.update_token(epoch, &fresh) else {
            debug!("Session changed while refreshing; discarding refreshed token");
            return Err(AppError::AuthExpired);
        };
        cache::remember(self.cache.as_ref(), keys::USER, &credential).await;
        if let Err(e) = self.cache.set(keys::TOKEN, &fresh).await {
            warn!("Failed to cache refreshed token: {e}");
        }
        debug!("Silent token refresh succeeded");
        Ok(fresh)
    }

    async fn expire_session(&self, epoch: u64) {
        if !self.session.clear_if_current(epoch) {
            return;
        }
        warn!("Clearing expired session");
        for key in [keys::TOKEN, keys::USER] {
            if let Err(e) = self.cache.remove(key).await {
                warn!("Failed to clear cached '{key}': {e}");
            }
        }
    }
}

fn is_auth_path(path: &str) -> bool {
    AUTH_PATHS.iter().any(|p| path.starts_with(p))
}

/// Maps non-2xx responses onto `AppError`, pulling a message out of the body when possible.
async fn check_status(response: Response, path: &str) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    if status == StatusCode::NOT_FOUND {
        return Err(AppError::NotFound(path.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<Value>(&body)
        .ok()
        .and_then(|v| {
            ["message", "error"]
                .iter()
                .find_map(|k| v.get(*k).and_then(Value::as_str).map(str::to_string))
        })
        .unwrap_or(body);
    Err(AppError::Api {
        status: status.as_u16(),
        message,
    })
}


#[cfg(test)]
mod tests {
    use super::test_support::serve;
    use super::*;
    use crate::cache::MemoryCache;
    use crate::models::credential::{Credential, Role};
    use axum::{
        http::{HeaderMap, StatusCode as AxumStatus},
        routing::{get, post},
        Json, Router,
    };
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn bearer(headers: &HeaderMap) -> Option<String> {
        headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string)
    }

    fn signed_in(token: &str) -> Session {
        let session = Session::new();
        session.sign_in(Credential {
            token: token.into(),
            user_id: "u1".into(),
            email: "jane@example.com".into(),
            name: None,
            role: Role::User,
        });
        session
    }

    /// Backend where `/jobs` only accepts "fresh"; `/auth/refresh` hands it out
    /// when `refresh_ok` is set.
    fn backend(refresh_ok: bool, refresh_calls: Arc<AtomicUsize>) -> Router {
        Router::new()
            .route(
                "/jobs",
                get(|headers: HeaderMap| async move {
                    match bearer(&headers).as_deref() {
                        Some("fresh") => (AxumStatus::OK, Json(json!([{"id": "j1"}]))),
                        _ => (AxumStatus::UNAUTHORIZED, Json(json!({"error": "expired"}))),
                    }
                }),
            )
            .route(
                "/auth/refresh",
                post(move || {
                    let calls = refresh_calls.clone();
                    async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        if refresh_ok {
                            (AxumStatus::OK, Json(json!({"token": "fresh"})))
                        } else {
                            (AxumStatus::UNAUTHORIZED, Json(json!({"error": "nope"})))
                        }
                    }
                }),
            )
            .route(
                "/auth/login",
                post(|| async { (AxumStatus::UNAUTHORIZED, Json(json!({"error": "bad password"}))) }),
            )
    }

    #[tokio::test]
    async fn test_401_triggers_single_refresh_and_retry() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (url, server) = serve(backend(true, calls.clone())).await;
        let cache = Arc::new(MemoryCache::new());
        let session = signed_in("stale");
        let client = ApiClient::new(url, session.clone(), cache.clone()).unwrap();

        let jobs: Value = client.call(ApiRequest::get("/jobs")).await.unwrap();
        assert_eq!(jobs[0]["id"], "j1");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(session.token().as_deref(), Some("fresh"));
        assert_eq!(cache.get(keys::TOKEN).await.unwrap().as_deref(), Some("fresh"));

        server.abort();
    }

    #[tokio::test]
    async fn test_failed_refresh_expires_session() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (url, server) = serve(backend(false, calls.clone())).await;
        let cache = Arc::new(MemoryCache::new());
        cache.set(keys::TOKEN, "stale").await.unwrap();
        cache.set(keys::USER, "{}").await.unwrap();
        let session = signed_in("stale");
        let client = ApiClient::new(url, session.clone(), cache.clone()).unwrap();

        let err = client.call::<Value>(ApiRequest::get("/jobs")).await.unwrap_err();
        assert!(matches!(err, AppError::AuthExpired));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(session.current().is_none());
        assert!(cache.get(keys::TOKEN).await.unwrap().is_none());
        assert!(cache.get(keys::USER).await.unwrap().is_none());

        server.abort();
    }

    #[tokio::test]
    async fn test_refresh_racing_new_sign_in_keeps_new_session() {
        let session = signed_in("stale");
        let during_refresh = session.clone();
        let app = Router::new()
            .route(
                "/jobs",
                get(|| async { (AxumStatus::UNAUTHORIZED, Json(json!({"error": "expired"}))) }),
            )
            .route(
                "/auth/refresh",
                post(move || {
                    let session = during_refresh.clone();
                    async move {
                        session.sign_in(Credential {
                            token: "other".into(),
                            user_id: "u2".into(),
                            email: "sam@example.com".into(),
                            name: None,
                            role: Role::User,
                        });
                        (AxumStatus::OK, Json(json!({"token": "fresh"})))
                    }
                }),
            );
        let (url, server) = serve(app).await;
        let cache = Arc::new(MemoryCache::new());
        cache.set(keys::TOKEN, "other").await.unwrap();
        let client = ApiClient::new(url, session.clone(), cache.clone()).unwrap();

        let err = client.call::<Value>(ApiRequest::get("/jobs")).await.unwrap_err();
        assert!(matches!(err, AppError::AuthExpired));
        assert_eq!(session.token().as_deref(), Some("other"));
        assert_eq!(cache.get(keys::TOKEN).await.unwrap().as_deref(), Some("other"));

        server.abort();
    }

    #[tokio::test]
    async fn test_401_from_login_does_not_refresh() {
        let calls = Arc::new(AtomicUsize::new(0));
        let (url, server) = serve(backend(true, calls.clone())).await;
        let client =
            ApiClient::new(url, signed_in("stale"), Arc::new(MemoryCache::new())).unwrap();

        let err = client
            .call::<Value>(ApiRequest::post("/auth/login").json(json!({})))
            .await
            .unwrap_err();
        match err {
            AppError::Api { status, message } => {
                assert_eq!(status, 401);
                assert_eq!(message, "bad password");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        server.abort();
    }

    #[tokio::test]
    async fn test_unknown_path_maps_to_not_found() {
        let (url, server) = serve(Router::new()).await;
        let client = ApiClient::new(url, Session::new(), Arc::new(MemoryCache::new())).unwrap();

        let err = client
            .call::<Value>(ApiRequest::get("/user/resume"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        server.abort();
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_network_error() {
        let client = ApiClient::new(
            test_support::unreachable_url(),
            Session::new(),
            Arc::new(MemoryCache::new()),
        )
        .unwrap();
        let err = client.call::<Value>(ApiRequest::get("/jobs")).await.unwrap_err();
        assert!(matches!(err, AppError::Network(_)));
        assert!(err.is_fallback_eligible());
    }

    #[test]
    fn test_segments_are_percent_encoded() {
        let client = ApiClient::new(
            "http://localhost:5000/api/",
            Session::new(),
            Arc::new(MemoryCache::new()),
        )
        .unwrap();
        let request = ApiRequest::get("/user/jobs").segment("a/b c?x").segment("apply");
        assert_eq!(
            client.request_url(&request).unwrap().as_str(),
            "http://localhost:5000/api/user/jobs/a%2Fb%20c%3Fx/apply"
        );
        assert_eq!(request.display_path(), "/user/jobs/a/b c?x/apply");
    }

    #[test]
    fn test_auth_paths() {
        assert!(is_auth_path("/auth/login"));
        assert!(is_auth_path("/auth/refresh"));
        assert!(!is_auth_path("/auth/me"));
        assert!(!is_auth_path("/user/resume/skills"));
    }
}
