//! Resume pipeline: validate, upload through the dispatcher, then poll the
//! backend until skill extraction finishes.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api_client::ApiClient;
use crate::cache::{self, keys, FallbackCache};
use crate::errors::AppError;
use crate::models::resume::{ResumeMeta, ResumeStatus};
use crate::processing::{poll_for_result, PollConfig, PollError, PollOutcome, PollRegistry};
use crate::session::Session;
use crate::upload::{DestinationCategory, UploadDispatcher, UploadRequest, UploadResult};

pub const MAX_RESUME_BYTES: usize = 10 * 1024 * 1024;
pub const STILL_PROCESSING_MESSAGE: &str =
    "Resume processing took too long. Skills will appear when processing completes.";

const ALLOWED_EXTENSIONS: [&str; 4] = ["pdf", "doc", "docx", "txt"];

/// Resume endpoints the pipeline reads. Implemented by `ApiClient`.
#[async_trait]
pub trait ResumeBackend: Send + Sync {
    /// Extracted skills; empty while processing is still running.
    async fn fetch_skills(&self, user_id: &str) -> Result<Vec<String>, AppError>;
    async fn fetch_resume(&self, user_id: &str) -> Result<Option<ResumeMeta>, AppError>;
    async fn fetch_status(&self) -> Result<ResumeStatus, AppError>;
}

#[async_trait]
impl ResumeBackend for ApiClient {
    async fn fetch_skills(&self, user_id: &str) -> Result<Vec<String>, AppError> {
        self.resume_skills(user_id).await
    }

    async fn fetch_resume(&self, user_id: &str) -> Result<Option<ResumeMeta>, AppError> {
        self.resume(user_id).await
    }

    async fn fetch_status(&self) -> Result<ResumeStatus, AppError> {
        self.resume_status().await
    }
}

#[derive(Debug, Clone)]
pub struct ResumeFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

impl ResumeFile {
    pub fn new(file_name: impl Into<String>, bytes: Bytes) -> Self {
        let file_name = file_name.into();
        Self {
            content_type: content_type_for(&file_name).map(str::to_string),
            file_name,
            bytes,
        }
    }

    pub async fn from_path(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| AppError::Validation(format!("Cannot read {}: {e}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "resume".to_string());
        Ok(Self::new(file_name, Bytes::from(bytes)))
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.bytes.is_empty() {
            return Err(AppError::Validation("Please select a file to upload".to_string()));
        }
        if content_type_for(&self.file_name).is_none() {
            return Err(AppError::Validation(
                "Please upload a PDF, DOC, DOCX or TXT file".to_string(),
            ));
        }
        if self.bytes.len() > MAX_RESUME_BYTES {
            return Err(AppError::Validation(
                "File size must be less than 10MB".to_string(),
            ));
        }
        Ok(())
    }
}

fn content_type_for(file_name: &str) -> Option<&'static str> {
    let extension = Path::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    if !ALLOWED_EXTENSIONS.contains(&extension.as_str()) {
        return None;
    }
    Some(match extension.as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => "text/plain",
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "camelCase")]
pub enum ProcessingStatus {
    Completed { skills: Vec<String> },
    /// Attempts ran out; skills will show up on a later read.
    StillProcessing { message: String },
    Cancelled,
    /// The status endpoint failed; the upload itself still succeeded.
    Unavailable { reason: String },
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeUpload {
    pub upload_id: Uuid,
    pub upload: UploadResult,
    pub resume: ResumeMeta,
    pub processing: ProcessingStatus,
    pub poll_attempts: u32,
}

#[derive(Clone)]
pub struct ResumeService {
    backend: Arc<dyn ResumeBackend>,
    dispatcher: UploadDispatcher,
    cache: Arc<dyn FallbackCache>,
    session: Session,
    polls: PollRegistry,
    poll_config: PollConfig,
}

impl ResumeService {
    pub fn new(
        backend: Arc<dyn ResumeBackend>,
        dispatcher: UploadDispatcher,
        cache: Arc<dyn FallbackCache>,
        session: Session,
        polls: PollRegistry,
    ) -> Self {
        Self {
            backend,
            dispatcher,
            cache,
            session,
            polls,
            poll_config: PollConfig::default(),
        }
    }

    pub fn with_poll_config(mut self, poll_config: PollConfig) -> Self {
        self.poll_config = poll_config;
        self
    }

    fn user_id(&self) -> Result<String, AppError> {
        self.session
            .current()
            .map(|c| c.user_id)
            .ok_or(AppError::AuthExpired)
    }

    /// Uploads the resume, records its metadata, and waits for extracted skills.
    /// Only validation and upload failures are errors; slow or failed
    /// processing is reported in `ResumeUpload::processing`.
    pub async fn upload_and_extract(&self, file: ResumeFile) -> Result<ResumeUpload, AppError> {
        file.validate()?;
        let user_id = self.user_id()?;

        let size_kb = (file.bytes.len() as f64 / 1024.0).round() as u64;
        let request = UploadRequest::new(
            file.bytes,
            DestinationCategory::Resume,
            file.file_name.clone(),
            file.content_type,
        )?;
        let upload = self.dispatcher.upload(&request).await?;

        let mut resume = ResumeMeta {
            file_name: file.file_name,
            file_size_kb: Some(size_kb),
            upload_timestamp: Utc::now(),
            download_url: Some(upload.location_uri.clone()),
            key: upload.storage_key.clone(),
            extracted_skills: Vec::new(),
        };
        cache::remember(self.cache.as_ref(), keys::RESUME_DATA, &resume).await;

        let guard = self.polls.begin(request.upload_id);
        let backend = self.backend.clone();
        let outcome = poll_for_result(
            || {
                let backend = backend.clone();
                let user_id = user_id.clone();
                async move {
                    let skills = backend.fetch_skills(&user_id).await?;
                    Ok::<_, AppError>((!skills.is_empty()).then_some(skills))
                }
            },
            &self.poll_config,
            guard.token(),
        )
        .await;
        drop(guard);

        let (processing, poll_attempts) = match outcome {
            Ok(PollOutcome::Succeeded { value, attempts }) => {
                info!("Extracted {} skill(s) from {}", value.len(), resume.file_name);
                cache::remember(self.cache.as_ref(), keys::EXTRACTED_SKILLS, &value).await;
                resume.extracted_skills = value.clone();
                cache::remember(self.cache.as_ref(), keys::RESUME_DATA, &resume).await;
                (ProcessingStatus::Completed { skills: value }, attempts)
            }
            Ok(PollOutcome::Exhausted { attempts }) => {
                warn!("Resume processing still running after {attempts} poll(s)");
                (
                    ProcessingStatus::StillProcessing {
                        message: STILL_PROCESSING_MESSAGE.to_string(),
                    },
                    attempts,
                )
            }
            Ok(PollOutcome::Cancelled { attempts }) => (ProcessingStatus::Cancelled, attempts),
            Err(PollError { error, attempts }) => {
                warn!("Polling for extracted skills failed after {attempts} poll(s): {error}");
                (
                    ProcessingStatus::Unavailable {
                        reason: error.user_message(),
                    },
                    attempts,
                )
            }
        };

        Ok(ResumeUpload {
            upload_id: request.upload_id,
            upload,
            resume,
            processing,
            poll_attempts,
        })
    }

    /// Stops the extraction poll for `upload_id`, if one is running.
    pub fn cancel_processing(&self, upload_id: Uuid) -> bool {
        self.polls.cancel(upload_id)
    }

    /// Resume metadata from the backend, falling back to the last cached copy.
    pub async fn resume_data(&self) -> Result<Option<ResumeMeta>, AppError> {
        let user_id = self.user_id()?;
        match self.backend.fetch_resume(&user_id).await {
            Ok(Some(meta)) => {
                cache::remember(self.cache.as_ref(), keys::CACHED_RESUME_DATA, &meta).await;
                Ok(Some(meta))
            }
            Ok(None) => Ok(None),
            Err(e) if e.is_fallback_eligible() => {
                warn!("Resume fetch failed, using cached copy: {e}");
                for key in [keys::RESUME_DATA, keys::CACHED_RESUME_DATA] {
                    if let Some(meta) = cache::get_json::<ResumeMeta>(self.cache.as_ref(), key).await? {
                        return Ok(Some(meta));
                    }
                }
                Err(AppError::NotFound("Resume".to_string()))
            }
            Err(e) => Err(e),
        }
    }

    /// Extracted skills from the backend, falling back to cached skills, then to none.
    pub async fn extracted_skills(&self) -> Result<Vec<String>, AppError> {
        let user_id = self.user_id()?;
        match self.backend.fetch_skills(&user_id).await {
            Ok(skills) => {
                if !skills.is_empty() {
                    cache::remember(self.cache.as_ref(), keys::EXTRACTED_SKILLS, &skills).await;
                }
                Ok(skills)
            }
            Err(e) if e.is_fallback_eligible() => {
                warn!("Skills fetch failed, using cached skills: {e}");
                cached_skills(self.cache.as_ref()).await
            }
            Err(e) => Err(e),
        }
    }

    pub async fn status(&self) -> Result<ResumeStatus, AppError> {
        self.backend.fetch_status().await
    }
}

/// Skills the user is known to have, from the cache only.
pub async fn cached_skills(cache: &dyn FallbackCache) -> Result<Vec<String>, AppError> {
    for key in [keys::EXTRACTED_SKILLS, keys::CACHED_SKILLS] {
        if let Some(skills) = cache::get_json::<Vec<String>>(cache, key).await? {
            if !skills.is_empty() {
                return Ok(skills);
            }
        }
    }
    Ok(Vec::new())
}
