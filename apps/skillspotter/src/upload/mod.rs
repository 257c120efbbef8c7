//! Upload dispatcher: tries each transport strategy in order until one succeeds.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::api_client::ApiClient;
use crate::config::Config;
use crate::errors::AppError;
use crate::models::job::Job;

pub mod strategies;

pub use strategies::{
    build_s3_client, BackendFormUpload, Buckets, ConfiguredEndpointUpload, DirectS3Upload,
    PresignedUrlUpload, RelativePathUpload, SimulatedUpload,
};

const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DestinationCategory {
    Resume,
    Job,
}

impl DestinationCategory {
    pub fn prefix(&self) -> &'static str {
        match self {
            DestinationCategory::Resume => "uploads/",
            DestinationCategory::Job => "jobs/",
        }
    }
}

/// Replaces every character outside `[A-Za-z0-9.]` with `_`.
pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' { c } else { '_' })
        .collect()
}

/// `{millis}_{sanitized name}`
pub fn generated_name(original_name: &str, unix_millis: i64) -> String {
    format!("{unix_millis}_{}", sanitize_file_name(original_name))
}

pub fn storage_key(category: DestinationCategory, generated_name: &str) -> String {
    format!("{}{}", category.prefix(), generated_name)
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Identity of this upload; processing polls are keyed on it.
    pub upload_id: Uuid,
    pub payload: Bytes,
    pub category: DestinationCategory,
    pub original_name: String,
    pub content_type: Option<String>,
    pub generated_name: String,
}

impl UploadRequest {
    pub fn new(
        payload: Bytes,
        category: DestinationCategory,
        original_name: impl Into<String>,
        content_type: Option<String>,
    ) -> Result<Self, AppError> {
        if payload.is_empty() {
            return Err(AppError::Validation("Cannot upload an empty file".to_string()));
        }
        let original_name = original_name.into();
        Ok(Self {
            upload_id: Uuid::new_v4(),
            generated_name: generated_name(&original_name, Utc::now().timestamp_millis()),
            payload,
            category,
            original_name,
            content_type: content_type.filter(|c| !c.is_empty()),
        })
    }

    pub fn storage_key(&self) -> String {
        storage_key(self.category, &self.generated_name)
    }

    /// Declared content type, or `application/octet-stream` when none was given.
    pub fn content_type(&self) -> &str {
        self.content_type.as_deref().unwrap_or(DEFAULT_CONTENT_TYPE)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub success: bool,
    pub storage_key: String,
    pub location_uri: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bucket: Option<String>,
    /// Name of the strategy that produced this result.
    pub strategy: &'static str,
}

/// One transport for getting bytes into object storage.
///
/// Returning `Ok` with `success == false` counts as a failure, same as `Err`.
#[async_trait]
pub trait UploadStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    async fn upload(&self, request: &UploadRequest) -> Result<UploadResult, AppError>;
}

/// Ordered strategy chain. The first success wins; failures are logged and skipped.
#[derive(Clone)]
pub struct UploadDispatcher {
    strategies: Vec<Arc<dyn UploadStrategy>>,
}

impl UploadDispatcher {
    pub fn new(strategies: Vec<Arc<dyn UploadStrategy>>) -> Self {
        Self { strategies }
    }

    /// Simulated (dev only), direct S3, configured endpoint, path-relative PUT,
    /// backend form and finally presigned URL.
    pub async fn from_config(config: &Config, api: &ApiClient) -> Self {
        let buckets = Buckets::from_config(config);
        let mut strategies: Vec<Arc<dyn UploadStrategy>> = Vec::new();

        if config.simulation_enabled() {
            warn!("Upload simulation is enabled; uploads will not reach storage");
            strategies.push(Arc::new(SimulatedUpload::new(buckets.clone())));
        }

        let s3 = build_s3_client(config).await;
        strategies.push(Arc::new(DirectS3Upload::new(s3, buckets)));

        if let Some(url) = &config.s3_upload_url {
            strategies.push(Arc::new(ConfiguredEndpointUpload::new(
                api.http().clone(),
                url.clone(),
            )));
        }
        if let Some(origin) = &config.app_origin {
            strategies.push(Arc::new(RelativePathUpload::new(
                api.http().clone(),
                origin.clone(),
            )));
        }
        strategies.push(Arc::new(BackendFormUpload::new(api.clone())));
        strategies.push(Arc::new(PresignedUrlUpload::new(api.clone())));

        Self::new(strategies)
    }

    pub fn strategy_names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name()).collect()
    }

    pub async fn upload(&self, request: &UploadRequest) -> Result<UploadResult, AppError> {
        for strategy in &self.strategies {
            match strategy.upload(request).await {
                Ok(result) if result.success => {
                    info!(
                        "Uploaded {} via {} to {}",
                        request.original_name,
                        strategy.name(),
                        result.storage_key
                    );
                    return Ok(result);
                }
                Ok(_) => warn!("Upload strategy {} reported failure", strategy.name()),
                Err(e) => warn!("Upload strategy {} failed: {e}", strategy.name()),
            }
        }

        Err(AppError::UploadFailed(format!(
            "all {} upload strategies failed for {}",
            self.strategies.len(),
            request.original_name
        )))
    }

    pub async fn upload_resume(
        &self,
        payload: Bytes,
        file_name: &str,
        content_type: Option<String>,
    ) -> Result<(UploadRequest, UploadResult), AppError> {
        let request =
            UploadRequest::new(payload, DestinationCategory::Resume, file_name, content_type)?;
        let result = self.upload(&request).await?;
        Ok((request, result))
    }

    /// Stores a job posting as `jobs/{millis}_job_{millis}.json`.
    pub async fn upload_job_description(&self, job: &Job) -> Result<UploadResult, AppError> {
        let body = serde_json::to_vec(job)?;
        let file_name = format!("job_{}.json", Utc::now().timestamp_millis());
        let request = UploadRequest::new(
            Bytes::from(body),
            DestinationCategory::Job,
            file_name,
            Some("application/json".to_string()),
        )?;
        self.upload(&request).await
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::{Behaviour, ScriptedStrategy};
    use super::*;

    fn resume_request() -> UploadRequest {
        UploadRequest::new(
            Bytes::from_static(b"%PDF-1.4"),
            DestinationCategory::Resume,
            "My CV (final).pdf",
            Some("application/pdf".into()),
        )
        .unwrap()
    }

    #[test]
    fn test_storage_key_format() {
        assert_eq!(sanitize_file_name("My CV (final).pdf"), "My_CV__final_.pdf");
        assert_eq!(generated_name("a b.txt", 1700000000000), "1700000000000_a_b.txt");
        assert_eq!(
            storage_key(DestinationCategory::Job, "1_job.json"),
            "jobs/1_job.json"
        );

        let request = resume_request();
        assert!(request.storage_key().starts_with("uploads/"));
        assert!(request.storage_key().ends_with("_My_CV__final_.pdf"));
    }

    #[test]
    fn test_empty_payload_rejected() {
        let err = UploadRequest::new(Bytes::new(), DestinationCategory::Resume, "cv.pdf", None)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_default_content_type() {
        let request = UploadRequest::new(
            Bytes::from_static(b"x"),
            DestinationCategory::Job,
            "x",
            Some(String::new()),
        )
        .unwrap();
        assert_eq!(request.content_type(), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_first_success_short_circuits() {
        let first = ScriptedStrategy::new("first", Behaviour::Error);
        let second = ScriptedStrategy::new("second", Behaviour::Succeed);
        let third = ScriptedStrategy::new("third", Behaviour::Succeed);
        let strategies: Vec<Arc<dyn UploadStrategy>> =
            vec![first.clone(), second.clone(), third.clone()];
        let dispatcher = UploadDispatcher::new(strategies);

        let request = resume_request();
        let result = dispatcher.upload(&request).await.unwrap();

        let expected = second.upload(&request).await.unwrap();
        assert_eq!(result, expected);
        assert_eq!(result.strategy, "second");
        assert_eq!(first.calls(), 1);
        assert_eq!(third.calls(), 0);
    }

    #[tokio::test]
    async fn test_unsuccessful_result_falls_through() {
        let first = ScriptedStrategy::new("first", Behaviour::ReportFailure);
        let second = ScriptedStrategy::new("second", Behaviour::Succeed);
        let strategies: Vec<Arc<dyn UploadStrategy>> = vec![first.clone(), second.clone()];
        let dispatcher = UploadDispatcher::new(strategies);

        let result = dispatcher.upload(&resume_request()).await.unwrap();
        assert_eq!(result.strategy, "second");
        assert_eq!(first.calls(), 1);
    }

    #[tokio::test]
    async fn test_all_failing_is_upload_failed() {
        let strategies: Vec<Arc<dyn UploadStrategy>> = vec![
            ScriptedStrategy::new("a", Behaviour::Error),
            ScriptedStrategy::new("b", Behaviour::ReportFailure),
        ];
        let dispatcher = UploadDispatcher::new(strategies);
        let err = dispatcher.upload(&resume_request()).await.unwrap_err();
        assert!(matches!(err, AppError::UploadFailed(_)));

        let empty = UploadDispatcher::new(Vec::new());
        assert!(matches!(
            empty.upload(&resume_request()).await,
            Err(AppError::UploadFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_job_description_upload() {
        let strategy: Arc<dyn UploadStrategy> = ScriptedStrategy::new("mem", Behaviour::Succeed);
        let dispatcher = UploadDispatcher::new(vec![strategy]);
        let job = Job::new("Backend Engineer", "Acme").with_skills(["Rust"]);

        let result = dispatcher.upload_job_description(&job).await.unwrap();
        assert!(result.storage_key.starts_with("jobs/"));
        assert!(result.storage_key.ends_with(".json"));
    }
}
