//! Jobs: listings, matches and admin CRUD, with cache-backed reads when the
//! backend is unreachable.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::api_client::ApiClient;
use crate::cache::{self, keys, FallbackCache};
use crate::errors::AppError;
use crate::matching::{rank_jobs, MatchScorer};
use crate::models::job::{Job, JobFilters, JobMatch, SkillSet};
use crate::pagination::{paginate, Page};
use crate::resume::cached_skills;
use crate::upload::{UploadDispatcher, UploadResult};

pub const NO_SKILLS_MESSAGE: &str = "Upload your resume to get job matches";

/// Where a new job posting ended up.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "via", rename_all = "camelCase")]
pub enum JobCreated {
    Api { response: Value },
    /// The backend refused or was unreachable; the posting was stored as a job description file.
    Storage { upload: UploadResult },
}

#[derive(Clone)]
pub struct JobsService {
    api: ApiClient,
    cache: Arc<dyn FallbackCache>,
    dispatcher: UploadDispatcher,
    scorer: Arc<dyn MatchScorer>,
}

impl JobsService {
    pub fn new(
        api: ApiClient,
        cache: Arc<dyn FallbackCache>,
        dispatcher: UploadDispatcher,
        scorer: Arc<dyn MatchScorer>,
    ) -> Self {
        Self {
            api,
            cache,
            dispatcher,
            scorer,
        }
    }

    pub async fn jobs(&self, filters: &JobFilters) -> Result<Page<Job>, AppError> {
        match self.api.public_jobs(filters).await {
            Ok(page) => {
                self.remember_jobs(&page.items).await;
                Ok(page)
            }
            Err(e) if e.is_fallback_eligible() => {
                warn!("Job listing unavailable, serving cached jobs: {e}");
                self.local_jobs(filters).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn admin_jobs(&self, filters: &JobFilters) -> Result<Page<Job>, AppError> {
        match self.api.admin_jobs(filters).await {
            Ok(page) => {
                self.remember_jobs(&page.items).await;
                Ok(page)
            }
            Err(e) if e.is_fallback_eligible() => {
                warn!("Admin job listing unavailable, serving cached jobs: {e}");
                self.local_jobs(filters).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn job_matches(&self, filters: &JobFilters) -> Result<Page<JobMatch>, AppError> {
        match self.api.job_matches(filters).await {
            Ok(page) => Ok(page),
            Err(e) if e.is_fallback_eligible() => {
                warn!("Job matches unavailable, matching locally: {e}");
                self.local_matches(filters).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn job_details(&self, job_id: &str) -> Result<Job, AppError> {
        match self.api.job_details(job_id).await {
            Ok(job) => Ok(job),
            Err(e) if e.is_fallback_eligible() => {
                warn!("Job {job_id} unavailable, looking in cache: {e}");
                self.cached_jobs()
                    .await?
                    .into_iter()
                    .find(|j| j.id == job_id)
                    .ok_or_else(|| AppError::NotFound(format!("Job {job_id}")))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn apply(&self, job_id: &str, application: &Value) -> Result<Value, AppError> {
        self.api.apply_for_job(job_id, application).await
    }

    pub async fn job_types(&self) -> Result<Vec<String>, AppError> {
        self.api.job_types().await
    }

    /// Posts a new job. If the backend call fails the posting is uploaded as a
    /// job description instead and added to the cached job list; if that fails
    /// too, the backend error is returned.
    pub async fn create_job(&self, job: &Job) -> Result<JobCreated, AppError> {
        if job.title.trim().is_empty() || job.company.trim().is_empty() {
            return Err(AppError::Validation(
                "Title and company are required".to_string(),
            ));
        }

        let api_error = match self.api.create_job(job_body(job)?).await {
            Ok(response) => {
                info!("Created job '{}'", job.title);
                self.remember_jobs(std::slice::from_ref(job)).await;
                return Ok(JobCreated::Api { response });
            }
            Err(e) => e,
        };
        warn!("Job creation via API failed, uploading job description: {api_error}");

        match self.dispatcher.upload_job_description(job).await {
            Ok(upload) => {
                let now = Utc::now();
                let mut posted = job.clone();
                posted.id = format!("job_{}", now.timestamp_millis());
                posted.storage_key = Some(upload.storage_key.clone());
                posted.posted_date = Some(now);
                self.remember_jobs(&[posted]).await;
                Ok(JobCreated::Storage { upload })
            }
            Err(upload_error) => {
                warn!("Job description upload failed: {upload_error}");
                Err(api_error)
            }
        }
    }

    pub async fn update_job(&self, job_id: &str, job: &Job) -> Result<Value, AppError> {
        let response = self.api.update_job(job_id, job_body(job)?).await?;
        let mut updated = job.clone();
        updated.id = job_id.to_string();
        self.remember_jobs(&[updated]).await;
        Ok(response)
    }

    pub async fn delete_job(&self, job_id: &str) -> Result<(), AppError> {
        self.api.delete_job(job_id).await?;
        let mut jobs = self.cached_jobs().await?;
        let before = jobs.len();
        jobs.retain(|j| j.id != job_id);
        if jobs.len() != before {
            cache::remember(self.cache.as_ref(), keys::MOCK_JOBS, &jobs).await;
        }
        Ok(())
    }

    async fn cached_jobs(&self) -> Result<Vec<Job>, AppError> {
        Ok(cache::get_json::<Vec<Job>>(self.cache.as_ref(), keys::MOCK_JOBS)
            .await?
            .unwrap_or_default())
    }

    /// Merges `fresh` into the cached job list, replacing entries with the same id.
    async fn remember_jobs(&self, fresh: &[Job]) {
        if fresh.is_empty() {
            return;
        }
        let mut jobs = match self.cached_jobs().await {
            Ok(jobs) => jobs,
            Err(e) => {
                warn!("Skipping job cache update: {e}");
                return;
            }
        };
        for job in fresh {
            match jobs.iter_mut().find(|j| !job.id.is_empty() && j.id == job.id) {
                Some(existing) => *existing = job.clone(),
                None => jobs.push(job.clone()),
            }
        }
        cache::remember(self.cache.as_ref(), keys::MOCK_JOBS, &jobs).await;
    }

    async fn local_jobs(&self, filters: &JobFilters) -> Result<Page<Job>, AppError> {
        let mut jobs: Vec<Job> = self
            .cached_jobs()
            .await?
            .into_iter()
            .filter(|j| {
                filters
                    .search
                    .as_deref()
                    .filter(|s| !s.is_empty())
                    .map_or(true, |term| j.matches_search(term))
            })
            .filter(|j| filters.status.map_or(true, |status| j.status == status))
            .collect();

        jobs.sort_by(|a, b| b.posted_date.cmp(&a.posted_date));
        Ok(paginate(jobs, filters.page, filters.limit))
    }

    async fn local_matches(&self, filters: &JobFilters) -> Result<Page<JobMatch>, AppError> {
        let skills: SkillSet = cached_skills(self.cache.as_ref())
            .await?
            .into_iter()
            .collect();
        if skills.is_empty() {
            return Ok(Page::empty(NO_SKILLS_MESSAGE));
        }

        let jobs = self.cached_jobs().await?;
        let ranked = rank_jobs(
            self.scorer.as_ref(),
            &skills,
            jobs,
            filters.min_match.unwrap_or(0),
        );
        Ok(paginate(ranked, filters.page, filters.limit))
    }
}

/// The backend reads either `skills` or `requiredSkills`, so both are sent.
fn job_body(job: &Job) -> Result<Value, AppError> {
    let mut body = serde_json::to_value(job)?;
    if let Some(fields) = body.as_object_mut() {
        if let Some(skills) = fields.get("requiredSkills").cloned() {
            fields.insert("skills".to_string(), skills);
        }
        if fields.get("id").and_then(Value::as_str) == Some("") {
            fields.remove("id");
        }
    }
    Ok(body)
}
