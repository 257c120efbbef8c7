use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{ApiClient, ApiRequest};
use crate::auth::AuthBackend;
use crate::errors::AppError;
use crate::models::analytics::{
    AnalyticsOverview, SkillCount, SkillCountsPayload, SkillsAnalysis, TimeRange,
};
use crate::models::credential::{AuthPayload, LoginRequest, RefreshPayload, RegisterRequest};
use crate::models::job::{Job, JobFilters, JobMatch, ListPayload};
use crate::models::resume::{ResumeEnvelope, ResumeMeta, ResumeStatus, SkillsPayload};
use crate::models::user::{UserFilters, UserRecord, UserUpdate};
use crate::pagination::Page;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiHealth {
    pub is_healthy: bool,
    pub detail: String,
}

/// `GET /storage/presigned-url` body.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUrl {
    #[serde(alias = "url")]
    pub upload_url: String,
    #[serde(default)]
    pub key: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsKind {
    Users,
    Jobs,
    Skills,
    Matches,
}

impl AnalyticsKind {
    fn path(&self) -> &'static str {
        match self {
            AnalyticsKind::Users => "/admin/analytics/users",
            AnalyticsKind::Jobs => "/admin/analytics/jobs",
            AnalyticsKind::Skills => "/admin/analytics/skills",
            AnalyticsKind::Matches => "/admin/analytics/matches",
        }
    }
}

fn time_range_query(range: TimeRange) -> Vec<(String, String)> {
    vec![("timeRange".to_string(), range.as_str().to_string())]
}

// ────────────────────────────────────────────────────────────────────────────
// Auth
// ────────────────────────────────────────────────────────────────────────────

impl ApiClient {
    /// Never fails: an unreachable or unhealthy backend is reported in the result.
    pub async fn health(&self) -> ApiHealth {
        match self.call::<Value>(ApiRequest::get("/auth/health")).await {
            Ok(body) => {
                let status = body
                    .get("status")
                    .and_then(Value::as_str)
                    .unwrap_or("ok")
                    .to_string();
                ApiHealth {
                    is_healthy: status != "unhealthy",
                    detail: status,
                }
            }
            Err(e) => {
                debug!("Health check failed: {e}");
                ApiHealth {
                    is_healthy: false,
                    detail: e.to_string(),
                }
            }
        }
    }
}

#[async_trait]
impl AuthBackend for ApiClient {
    async fn login(&self, request: &LoginRequest) -> Result<AuthPayload, AppError> {
        self.call(ApiRequest::post("/auth/login").json(serde_json::to_value(request)?))
            .await
    }

    async fn register(&self, request: &RegisterRequest) -> Result<AuthPayload, AppError> {
        self.call(ApiRequest::post("/auth/register").json(serde_json::to_value(request)?))
            .await
    }

    async fn refresh(&self) -> Result<RefreshPayload, AppError> {
        self.call(ApiRequest::post("/auth/refresh").json(json!({})))
            .await
    }

    async fn current_user(&self) -> Result<AuthPayload, AppError> {
        self.call(ApiRequest::get("/auth/me")).await
    }

    async fn logout(&self, token: &str) -> Result<(), AppError> {
        // The session is already cleared by now, so the token is attached by hand.
        let response = self
            .http()
            .post(self.url("/auth/logout"))
            .bearer_auth(token)
            .json(&json!({}))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(AppError::Api {
                status: response.status().as_u16(),
                message: "logout rejected".to_string(),
            });
        }
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Resume
// ────────────────────────────────────────────────────────────────────────────

impl ApiClient {
    pub async fn resume_status(&self) -> Result<ResumeStatus, AppError> {
        self.call(ApiRequest::get("/user/resume/status")).await
    }

    /// Uploads through the backend instead of object storage (multipart field `resume`).
    pub async fn upload_resume_form(
        &self,
        file_name: &str,
        content_type: &str,
        bytes: Bytes,
    ) -> Result<Value, AppError> {
        self.call(ApiRequest::post("/user/resume/upload").multipart(
            "resume",
            file_name.to_string(),
            content_type.to_string(),
            bytes,
        ))
        .await
    }

    pub async fn resume_skills(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        let payload: Option<SkillsPayload> = self
            .call(
                ApiRequest::get("/user/resume/skills")
                    .query(vec![("userId".to_string(), user_id.to_string())]),
            )
            .await?;
        Ok(payload.map(SkillsPayload::into_skills).unwrap_or_default())
    }

    pub async fn resume(&self, user_id: &str) -> Result<Option<ResumeMeta>, AppError> {
        let envelope: Option<ResumeEnvelope> = self
            .call(
                ApiRequest::get("/user/resume")
                    .query(vec![("userId".to_string(), user_id.to_string())]),
            )
            .await?;
        Ok(envelope.and_then(|e| e.resume).map(ResumeMeta::from))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Jobs
// ────────────────────────────────────────────────────────────────────────────

impl ApiClient {
    pub async fn public_jobs(&self, filters: &JobFilters) -> Result<Page<Job>, AppError> {
        let payload: ListPayload<Job> = self
            .call(ApiRequest::get("/jobs").query(filters.to_query()))
            .await?;
        Ok(payload.into_page())
    }

    pub async fn job_matches(&self, filters: &JobFilters) -> Result<Page<JobMatch>, AppError> {
        let payload: ListPayload<JobMatch> = self
            .call(ApiRequest::get("/user/job-matches").query(filters.to_query()))
            .await?;
        Ok(payload.into_page())
    }

    pub async fn job_details(&self, job_id: &str) -> Result<Job, AppError> {
        self.call(ApiRequest::get("/user/jobs").segment(job_id)).await
    }

    pub async fn apply_for_job(&self, job_id: &str, application: &Value) -> Result<Value, AppError> {
        self.call(
            ApiRequest::post("/user/jobs")
                .segment(job_id)
                .segment("apply")
                .json(application.clone()),
        )
        .await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Skills & dashboard
// ────────────────────────────────────────────────────────────────────────────

impl ApiClient {
    pub async fn skills_analysis(&self) -> Result<SkillsAnalysis, AppError> {
        self.call(ApiRequest::get("/user/skills/analysis")).await
    }

    pub async fn skill_gaps(&self) -> Result<Value, AppError> {
        self.call(ApiRequest::get("/user/skills/gaps")).await
    }

    pub async fn industry_demand(&self) -> Result<Value, AppError> {
        self.call(ApiRequest::get("/user/skills/industry-demand")).await
    }

    pub async fn dashboard_overview(&self) -> Result<Value, AppError> {
        self.call(ApiRequest::get("/user/dashboard/overview")).await
    }

    pub async fn dashboard_activity(&self) -> Result<Value, AppError> {
        self.call(ApiRequest::get("/user/dashboard/activity")).await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Admin
// ────────────────────────────────────────────────────────────────────────────

impl ApiClient {
    pub async fn admin_users(&self, filters: &UserFilters) -> Result<Page<UserRecord>, AppError> {
        let payload: ListPayload<UserRecord> = self
            .call(ApiRequest::get("/admin/users").query(filters.to_query()))
            .await?;
        Ok(payload.into_page())
    }

    pub async fn admin_user(&self, user_id: &str) -> Result<UserRecord, AppError> {
        self.call(ApiRequest::get("/admin/users").segment(user_id)).await
    }

    pub async fn update_user(&self, user_id: &str, update: &UserUpdate) -> Result<Value, AppError> {
        self.call(
            ApiRequest::put("/admin/users").segment(user_id).json(serde_json::to_value(update)?),
        )
        .await
    }

    pub async fn delete_user(&self, user_id: &str) -> Result<(), AppError> {
        self.call_empty(ApiRequest::delete("/admin/users").segment(user_id))
            .await
    }

    pub async fn admin_jobs(&self, filters: &JobFilters) -> Result<Page<Job>, AppError> {
        let payload: ListPayload<Job> = self
            .call(ApiRequest::get("/admin/jobs").query(filters.to_query()))
            .await?;
        Ok(payload.into_page())
    }

    pub async fn create_job(&self, body: Value) -> Result<Value, AppError> {
        self.call(ApiRequest::post("/admin/jobs").json(body)).await
    }

    pub async fn update_job(&self, job_id: &str, body: Value) -> Result<Value, AppError> {
        self.call(ApiRequest::put("/admin/jobs").segment(job_id).json(body))
            .await
    }

    pub async fn delete_job(&self, job_id: &str) -> Result<(), AppError> {
        self.call_empty(ApiRequest::delete("/admin/jobs").segment(job_id))
            .await
    }

    pub async fn job_types(&self) -> Result<Vec<String>, AppError> {
        let payload: Option<SkillsPayload> =
            self.call(ApiRequest::get("/admin/job-types")).await?;
        Ok(payload.map(SkillsPayload::into_skills).unwrap_or_default())
    }

    pub async fn popular_skills(&self) -> Result<Vec<SkillCount>, AppError> {
        let payload: Option<SkillCountsPayload> =
            self.call(ApiRequest::get("/admin/popular-skills")).await?;
        Ok(payload.map(SkillCountsPayload::into_counts).unwrap_or_default())
    }

    pub async fn analytics_stats(&self, range: TimeRange) -> Result<AnalyticsOverview, AppError> {
        self.call(ApiRequest::get("/admin/analytics/stats").query(time_range_query(range)))
            .await
    }

    pub async fn analytics(&self, kind: AnalyticsKind, range: TimeRange) -> Result<Value, AppError> {
        self.call(ApiRequest::get(kind.path()).query(time_range_query(range)))
            .await
    }

    pub async fn activity_timeline(&self, range: TimeRange) -> Result<Value, AppError> {
        self.call(ApiRequest::get("/admin/analytics/activity").query(time_range_query(range)))
            .await
    }

    pub async fn settings(&self) -> Result<Value, AppError> {
        self.call(ApiRequest::get("/admin/settings")).await
    }

    pub async fn update_settings(&self, settings: Value) -> Result<Value, AppError> {
        self.call(ApiRequest::put("/admin/settings").json(settings))
            .await
    }

    pub async fn generate_api_keys(&self) -> Result<Value, AppError> {
        self.call(ApiRequest::post("/admin/settings/generate-keys").json(json!({})))
            .await
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Storage
// ────────────────────────────────────────────────────────────────────────────

impl ApiClient {
    pub async fn presigned_url(
        &self,
        file_type: &str,
        file_name: &str,
    ) -> Result<PresignedUrl, AppError> {
        self.call(ApiRequest::get("/storage/presigned-url").query(vec![
            ("fileType".to_string(), file_type.to_string()),
            ("fileName".to_string(), file_name.to_string()),
        ]))
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api_client::test_support::{serve, unreachable_url};
    use crate::cache::MemoryCache;
    use crate::session::Session;
    use axum::{extract::Query, routing::get, Json, Router};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn client(url: String) -> ApiClient {
        ApiClient::new(url, Session::new(), Arc::new(MemoryCache::new())).unwrap()
    }

    #[tokio::test]
    async fn test_public_jobs_sends_filters_and_normalises() {
        let app = Router::new().route(
            "/jobs",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                assert_eq!(q.get("search").map(String::as_str), Some("rust"));
                assert_eq!(q.get("minMatch").map(String::as_str), Some("50"));
                Json(json!({
                    "jobs": [{"id": "j1", "title": "Rust Dev", "requiredSkills": ["Rust"]}],
                    "page": 1,
                    "totalPages": 1,
                    "totalResults": 1
                }))
            }),
        );
        let (url, server) = serve(app).await;

        let filters = JobFilters {
            search: Some("rust".into()),
            min_match: Some(50),
            ..Default::default()
        };
        let page = client(url).public_jobs(&filters).await.unwrap();
        assert_eq!(page.total_results, 1);
        assert!(page.items[0].required_skills.contains("Rust"));

        server.abort();
    }

    #[tokio::test]
    async fn test_resume_skills_accepts_both_shapes() {
        let app = Router::new()
            .route("/user/resume/skills", get(|| async { Json(json!(["JavaScript", "SQL"])) }))
            .route("/user/resume", get(|| async { Json(json!({})) }));
        let (url, server) = serve(app).await;
        let client = client(url);

        assert_eq!(
            client.resume_skills("u1").await.unwrap(),
            vec!["JavaScript", "SQL"]
        );
        assert!(client.resume("u1").await.unwrap().is_none());

        server.abort();
    }

    #[tokio::test]
    async fn test_presigned_url_alias() {
        let app = Router::new().route(
            "/storage/presigned-url",
            get(|| async { Json(json!({"url": "https://bucket/put-here", "key": "uploads/x"})) }),
        );
        let (url, server) = serve(app).await;

        let presigned = client(url).presigned_url("application/pdf", "cv.pdf").await.unwrap();
        assert_eq!(presigned.upload_url, "https://bucket/put-here");
        assert_eq!(presigned.key.as_deref(), Some("uploads/x"));

        server.abort();
    }

    #[tokio::test]
    async fn test_health_reports_instead_of_failing() {
        let app = Router::new().route("/auth/health", get(|| async { Json(json!({"status": "healthy"})) }));
        let (url, server) = serve(app).await;
        assert!(client(url).health().await.is_healthy);
        server.abort();

        let down = client(unreachable_url()).health().await;
        assert!(!down.is_healthy);
    }
}
