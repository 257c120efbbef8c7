//! Auth token store and the backend calls it depends on.

use async_trait::async_trait;

use crate::errors::AppError;
use crate::models::credential::{AuthPayload, LoginRequest, RefreshPayload, RegisterRequest};

pub mod role;
pub mod store;
pub mod timer;

pub use store::AuthStore;
pub use timer::RefreshTimer;

/// Backend auth endpoints. Implemented by `ApiClient`; tests substitute a fake.
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, request: &LoginRequest) -> Result<AuthPayload, AppError>;
    async fn register(&self, request: &RegisterRequest) -> Result<AuthPayload, AppError>;
    /// Exchanges the session's current token for a fresh one.
    async fn refresh(&self) -> Result<RefreshPayload, AppError>;
    async fn current_user(&self) -> Result<AuthPayload, AppError>;
    /// Tells the backend `token` is no longer in use.
    async fn logout(&self, token: &str) -> Result<(), AppError>;
}
