use std::fmt;

use serde::{Deserialize, Serialize};

use crate::auth::role::derive_role;
use crate::errors::AppError;
use crate::models::de_opt_id;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl Role {
    pub fn parse(raw: &str) -> Option<Role> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Admin => "admin",
        }
    }
}

/// The authenticated session: bearer token plus the profile it belongs to.
/// Owned by the auth store; everything else only reads it through `Session`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub token: String,
    pub user_id: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub role: Role,
}

// Tokens never reach logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"<redacted>")
            .field("user_id", &self.user_id)
            .field("email", &self.email)
            .field("name", &self.name)
            .field("role", &self.role)
            .finish()
    }
}

impl Credential {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Builds a credential from a login/register/me payload. `held_token` fills in
    /// for payloads (like `/auth/me`) that carry a profile but no token.
    pub fn from_payload(payload: AuthPayload, held_token: Option<&str>) -> Result<Self, AppError> {
        let token = payload
            .token
            .filter(|t| !t.is_empty())
            .or_else(|| held_token.map(str::to_string))
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("auth response carried no token")))?;

        let email = payload.email.unwrap_or_default();
        let supplied = payload.role.as_deref().and_then(Role::parse);
        let role = derive_role(&email, supplied);

        Ok(Credential {
            token,
            user_id: payload.user_id.unwrap_or_default(),
            email,
            name: payload.name,
            role,
        })
    }
}

/// Login / register / current-user response body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthPayload {
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default, alias = "id", alias = "user_id", deserialize_with = "de_opt_id")]
    pub user_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshPayload {
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        validate_email(&self.email)?;
        if self.password.is_empty() {
            return Err(AppError::Validation("Password is required".to_string()));
        }
        Ok(())
    }
}

impl RegisterRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.name.trim().is_empty() {
            return Err(AppError::Validation("Name is required".to_string()));
        }
        validate_email(&self.email)?;
        if self.password.chars().count() < 8 {
            return Err(AppError::Validation(
                "Password must be at least 8 characters".to_string(),
            ));
        }
        Ok(())
    }
}

fn validate_email(email: &str) -> Result<(), AppError> {
    let email = email.trim();
    let valid = match email.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !domain.starts_with('.'),
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(AppError::Validation("A valid email address is required".to_string()))
    }
}
