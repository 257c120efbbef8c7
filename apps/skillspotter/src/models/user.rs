use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::credential::Role;
use crate::models::{de_opt_id, parse_timestamp};

/// A user account as seen by the admin console.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawUser")]
pub struct UserRecord {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl UserRecord {
    pub fn is_active(&self) -> bool {
        self.status.eq_ignore_ascii_case("active")
    }

    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.name.to_lowercase().contains(&term) || self.email.to_lowercase().contains(&term)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawUser {
    #[serde(default, alias = "userId", alias = "user_id", deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "created_at")]
    pub created_at: Option<String>,
}

impl From<RawUser> for UserRecord {
    fn from(raw: RawUser) -> Self {
        let email = raw.email.unwrap_or_default();
        UserRecord {
            id: raw.id.unwrap_or_default(),
            name: raw
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| email.split('@').next().unwrap_or_default().to_string()),
            email,
            role: raw.role.as_deref().and_then(Role::parse).unwrap_or_default(),
            status: raw.status.unwrap_or_else(|| "active".to_string()),
            created_at: parse_timestamp(raw.created_at.as_deref()),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFilters {
    pub search: Option<String>,
    pub role: Option<Role>,
    pub status: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl UserFilters {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(search) = self.search.as_ref().filter(|s| !s.is_empty()) {
            query.push(("search".to_string(), search.clone()));
        }
        if let Some(role) = self.role {
            query.push(("role".to_string(), role.as_str().to_string()));
        }
        if let Some(status) = self.status.as_ref().filter(|s| s.as_str() != "all") {
            query.push(("status".to_string(), status.clone()));
        }
        if let Some(page) = self.page {
            query.push(("page".to_string(), page.to_string()));
        }
        if let Some(limit) = self.limit {
            query.push(("limit".to_string(), limit.to_string()));
        }
        query
    }
}

/// Fields an admin may change on a user account.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_user_defaults() {
        let user: UserRecord =
            serde_json::from_str(r#"{"userId":3,"email":"sam@example.com"}"#).unwrap();
        assert_eq!(user.id, "3");
        assert_eq!(user.name, "sam");
        assert_eq!(user.role, Role::User);
        assert!(user.is_active());
    }

    #[test]
    fn test_user_search() {
        let user: UserRecord = serde_json::from_str(
            r#"{"id":"u","name":"Ada Lovelace","email":"ada@math.org","role":"admin"}"#,
        )
        .unwrap();
        assert!(user.matches_search("lovelace"));
        assert!(user.matches_search("MATH.org"));
        assert_eq!(user.role, Role::Admin);
    }

    #[test]
    fn test_status_all_is_not_sent() {
        let filters = UserFilters {
            status: Some("all".into()),
            ..Default::default()
        };
        assert!(filters.to_query().is_empty());
    }
}
