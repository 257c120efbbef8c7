//! Admin console: user management, analytics and platform settings.
//!
//! Reads fall back to the cached job and user lists when the backend is
//! unreachable; writes always go to the backend.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::{info, warn};

use crate::api_client::{AnalyticsKind, ApiClient};
use crate::cache::{self, keys, FallbackCache};
use crate::errors::AppError;
use crate::models::analytics::{AnalyticsOverview, JobStats, SkillStats, TimeRange, UserStats};
use crate::models::credential::Role;
use crate::models::job::{Job, JobStatus};
use crate::models::user::{UserFilters, UserRecord, UserUpdate};
use crate::pagination::{paginate, Page};
use crate::skills::skill_counts;

const MOST_POPULAR_LIMIT: usize = 5;
const NEW_USER_DAYS: i64 = 7;

#[derive(Clone)]
pub struct AdminService {
    api: ApiClient,
    cache: Arc<dyn FallbackCache>,
}

impl AdminService {
    pub fn new(api: ApiClient, cache: Arc<dyn FallbackCache>) -> Self {
        Self { api, cache }
    }

    // ────────────────────────────────────────────────────────────────────────
    // Users
    // ────────────────────────────────────────────────────────────────────────

    pub async fn users(&self, filters: &UserFilters) -> Result<Page<UserRecord>, AppError> {
        match self.api.admin_users(filters).await {
            Ok(page) => {
                self.remember_users(&page.items).await;
                Ok(page)
            }
            Err(e) if e.is_fallback_eligible() => {
                warn!("User listing unavailable, serving cached users: {e}");
                Ok(filter_users(self.cached_users().await?, filters))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn user(&self, user_id: &str) -> Result<UserRecord, AppError> {
        self.api.admin_user(user_id).await
    }

    pub async fn update_user(&self, user_id: &str, update: &UserUpdate) -> Result<Value, AppError> {
        let response = self.api.update_user(user_id, update).await?;
        info!("Updated user {user_id}");

        let mut users = self.cached_users().await?;
        if let Some(user) = users.iter_mut().find(|u| u.id == user_id) {
            if let Some(name) = &update.name {
                user.name = name.clone();
            }
            if let Some(role) = update.role {
                user.role = role;
            }
            if let Some(status) = &update.status {
                user.status = status.clone();
            }
            cache::remember(self.cache.as_ref(), keys::USERS, &users).await;
        }
        Ok(response)
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<(), AppError> {
        self.api.delete_user(user_id).await?;
        info!("Deleted user {user_id}");

        let mut users = self.cached_users().await?;
        let before = users.len();
        users.retain(|u| u.id != user_id);
        if users.len() != before {
            cache::remember(self.cache.as_ref(), keys::USERS, &users).await;
        }
        Ok(())
    }

    // ────────────────────────────────────────────────────────────────────────
    // Analytics
    // ────────────────────────────────────────────────────────────────────────

    pub async fn overview(&self, range: TimeRange) -> Result<AnalyticsOverview, AppError> {
        match self.api.analytics_stats(range).await {
            Ok(overview) => Ok(overview),
            Err(e) if e.is_fallback_eligible() => {
                warn!("Analytics unavailable, computing from cache: {e}");
                let jobs = cache::get_json::<Vec<Job>>(self.cache.as_ref(), keys::MOCK_JOBS)
                    .await?
                    .unwrap_or_default();
                let users = self.cached_users().await?;
                Ok(local_overview(&jobs, &users, range, Utc::now()))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn analytics(&self, kind: AnalyticsKind, range: TimeRange) -> Result<Value, AppError> {
        self.api.analytics(kind, range).await
    }

    pub async fn activity_timeline(&self, range: TimeRange) -> Result<Value, AppError> {
        self.api.activity_timeline(range).await
    }

    // ────────────────────────────────────────────────────────────────────────
    // Settings
    // ────────────────────────────────────────────────────────────────────────

    pub async fn settings(&self) -> Result<Value, AppError> {
        self.api.settings().await
    }

    pub async fn update_settings(&self, settings: Value) -> Result<Value, AppError> {
        self.api.update_settings(settings).await
    }

    pub async fn generate_api_keys(&self) -> Result<Value, AppError> {
        self.api.generate_api_keys().await
    }

    async fn cached_users(&self) -> Result<Vec<UserRecord>, AppError> {
        Ok(cache::get_json::<Vec<UserRecord>>(self.cache.as_ref(), keys::USERS)
            .await?
            .unwrap_or_default())
    }

    async fn remember_users(&self, fresh: &[UserRecord]) {
        if fresh.is_empty() {
            return;
        }
        let mut users = match self.cached_users().await {
            Ok(users) => users,
            Err(e) => {
                warn!("Skipping user cache update: {e}");
                return;
            }
        };
        for user in fresh {
            match users.iter_mut().find(|u| !user.id.is_empty() && u.id == user.id) {
                Some(existing) => *existing = user.clone(),
                None => users.push(user.clone()),
            }
        }
        cache::remember(self.cache.as_ref(), keys::USERS, &users).await;
    }
}

fn filter_users(users: Vec<UserRecord>, filters: &UserFilters) -> Page<UserRecord> {
    let mut users: Vec<UserRecord> = users
        .into_iter()
        .filter(|u| {
            filters
                .search
                .as_deref()
                .filter(|s| !s.is_empty())
                .map_or(true, |term| u.matches_search(term))
        })
        .filter(|u| filters.role.map_or(true, |role| u.role == role))
        .filter(|u| {
            filters
                .status
                .as_deref()
                .filter(|s| *s != "all")
                .map_or(true, |status| u.status.eq_ignore_ascii_case(status))
        })
        .collect();

    users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    paginate(users, filters.page, filters.limit)
}

/// Headline numbers from cached data. Records without a timestamp only count
/// towards an unbounded range.
fn local_overview(
    jobs: &[Job],
    users: &[UserRecord],
    range: TimeRange,
    now: DateTime<Utc>,
) -> AnalyticsOverview {
    let start = range.start(now);
    let in_range = |at: Option<DateTime<Utc>>| match (start, at) {
        (None, _) => true,
        (Some(start), Some(at)) => at >= start,
        (Some(_), None) => false,
    };

    let jobs: Vec<Job> = jobs
        .iter()
        .filter(|j| in_range(j.posted_date))
        .cloned()
        .collect();
    let users: Vec<&UserRecord> = users.iter().filter(|u| in_range(u.created_at)).collect();

    let count_status = |status: JobStatus| jobs.iter().filter(|j| j.status == status).count();
    let new_since = now - Duration::days(NEW_USER_DAYS);

    let mut most_popular = skill_counts(&jobs);
    most_popular.truncate(MOST_POPULAR_LIMIT);

    AnalyticsOverview {
        jobs: JobStats {
            total: jobs.len(),
            active: count_status(JobStatus::Active),
            draft: count_status(JobStatus::Draft),
            expired: count_status(JobStatus::Expired),
        },
        users: UserStats {
            total: users.len(),
            active: users.iter().filter(|u| u.is_active()).count(),
            admins: users.iter().filter(|u| u.role == Role::Admin).count(),
            new_users: users
                .iter()
                .filter(|u| u.created_at.is_some_and(|at| at >= new_since))
                .count(),
        },
        skills: SkillStats { most_popular },
        from_cache: true,
    }
}
