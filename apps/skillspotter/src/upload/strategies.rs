use async_trait::async_trait;
use aws_config::Region;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response};
use serde_json::Value;
use tracing::debug;

use super::{DestinationCategory, UploadRequest, UploadResult, UploadStrategy};
use crate::api_client::ApiClient;
use crate::config::Config;
use crate::errors::AppError;

/// Bucket identity per destination category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Buckets {
    pub resume: String,
    pub job: String,
    pub region: String,
}

impl Buckets {
    pub fn from_config(config: &Config) -> Self {
        Self {
            resume: config.resume_bucket.clone(),
            job: config.jobdesc_bucket.clone(),
            region: config.region.clone(),
        }
    }

    pub fn bucket(&self, category: DestinationCategory) -> &str {
        match category {
            DestinationCategory::Resume => &self.resume,
            DestinationCategory::Job => &self.job,
        }
    }

    /// Virtual-hosted style object URL.
    pub fn object_url(&self, category: DestinationCategory, key: &str) -> String {
        format!(
            "https://{}.s3.{}.amazonaws.com/{}",
            self.bucket(category),
            self.region,
            key
        )
    }
}

/// Constructs an S3 client for AWS, or for MinIO / localstack when a custom
/// endpoint is configured. Credentials come from the default provider chain.
pub async fn build_s3_client(config: &Config) -> aws_sdk_s3::Client {
    let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
        .region(Region::new(config.region.clone()));
    if let Some(endpoint) = &config.s3_endpoint {
        loader = loader.endpoint_url(endpoint);
    }
    let sdk_config = loader.load().await;

    let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
        .force_path_style(config.s3_endpoint.is_some())
        .build();
    aws_sdk_s3::Client::from_conf(s3_config)
}

async fn ensure_success(response: Response, what: &str) -> Result<Response, AppError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AppError::Storage(format!("{what} returned {status}: {body}")))
}

// ────────────────────────────────────────────────────────────────────────────
// Simulated
// ────────────────────────────────────────────────────────────────────────────

/// Development-only transport: reports success without moving any bytes.
/// Never installed when the environment is `production`.
pub struct SimulatedUpload {
    buckets: Buckets,
}

impl SimulatedUpload {
    pub fn new(buckets: Buckets) -> Self {
        Self { buckets }
    }
}

#[async_trait]
impl UploadStrategy for SimulatedUpload {
    fn name(&self) -> &'static str {
        "simulated"
    }

    async fn upload(&self, request: &UploadRequest) -> Result<UploadResult, AppError> {
        let key = request.storage_key();
        debug!("Simulating upload of {} bytes to {key}", request.payload.len());
        Ok(UploadResult {
            success: true,
            location_uri: format!(
                "https://{}.s3.amazonaws.com/{key}",
                self.buckets.bucket(request.category)
            ),
            bucket: Some(self.buckets.bucket(request.category).to_string()),
            storage_key: key,
            strategy: self.name(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Direct S3
// ────────────────────────────────────────────────────────────────────────────

pub struct DirectS3Upload {
    s3: aws_sdk_s3::Client,
    buckets: Buckets,
}

impl DirectS3Upload {
    pub fn new(s3: aws_sdk_s3::Client, buckets: Buckets) -> Self {
        Self { s3, buckets }
    }
}

#[async_trait]
impl UploadStrategy for DirectS3Upload {
    fn name(&self) -> &'static str {
        "direct-s3"
    }

    async fn upload(&self, request: &UploadRequest) -> Result<UploadResult, AppError> {
        let bucket = self.buckets.bucket(request.category);
        let key = request.storage_key();

        self.s3
            .put_object()
            .bucket(bucket)
            .key(&key)
            .body(ByteStream::from(request.payload.clone()))
            .content_type(request.content_type())
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("S3 upload failed: {}", DisplayErrorContext(&e))))?;

        Ok(UploadResult {
            success: true,
            location_uri: self.buckets.object_url(request.category, &key),
            bucket: Some(bucket.to_string()),
            storage_key: key,
            strategy: self.name(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Configured endpoint
// ────────────────────────────────────────────────────────────────────────────

/// Multipart POST to an upload service. The response may name the stored key
/// and location; otherwise they are derived from the request.
pub struct ConfiguredEndpointUpload {
    http: Client,
    url: String,
}

impl ConfiguredEndpointUpload {
    pub fn new(http: Client, url: impl Into<String>) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }
}

#[async_trait]
impl UploadStrategy for ConfiguredEndpointUpload {
    fn name(&self) -> &'static str {
        "configured-endpoint"
    }

    async fn upload(&self, request: &UploadRequest) -> Result<UploadResult, AppError> {
        let part = reqwest::multipart::Part::bytes(request.payload.to_vec())
            .file_name(request.generated_name.clone())
            .mime_str(request.content_type())?;
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("prefix", request.category.prefix());

        let response = self.http.post(&self.url).multipart(form).send().await?;
        let response = ensure_success(response, "upload endpoint").await?;
        let body: Value = response.json().await.unwrap_or(Value::Null);

        let key = body
            .get("key")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| request.storage_key());
        let location_uri = ["location", "url"]
            .iter()
            .find_map(|k| body.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| format!("{}/{}", self.url.trim_end_matches('/'), key));

        Ok(UploadResult {
            success: true,
            storage_key: key,
            location_uri,
            bucket: None,
            strategy: self.name(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Path-relative PUT
// ────────────────────────────────────────────────────────────────────────────

/// PUT of the raw bytes to `{origin}/{prefix}{generated name}`.
pub struct RelativePathUpload {
    http: Client,
    origin: String,
}

impl RelativePathUpload {
    pub fn new(http: Client, origin: impl Into<String>) -> Self {
        Self {
            http,
            origin: origin.into().trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl UploadStrategy for RelativePathUpload {
    fn name(&self) -> &'static str {
        "relative-path"
    }

    async fn upload(&self, request: &UploadRequest) -> Result<UploadResult, AppError> {
        let key = request.storage_key();
        let url = format!("{}/{}", self.origin, key);

        let response = self
            .http
            .put(&url)
            .header(CONTENT_TYPE, request.content_type())
            .body(request.payload.clone())
            .send()
            .await?;
        ensure_success(response, "relative PUT").await?;

        Ok(UploadResult {
            success: true,
            storage_key: key,
            location_uri: url,
            bucket: None,
            strategy: self.name(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Backend form upload
// ────────────────────────────────────────────────────────────────────────────

/// Hands the resume to the backend as a multipart form (`resume` field).
/// Job descriptions are refused.
pub struct BackendFormUpload {
    api: ApiClient,
}

impl BackendFormUpload {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl UploadStrategy for BackendFormUpload {
    fn name(&self) -> &'static str {
        "backend-form"
    }

    async fn upload(&self, request: &UploadRequest) -> Result<UploadResult, AppError> {
        if request.category != DestinationCategory::Resume {
            return Err(AppError::Storage(
                "backend form upload only accepts resumes".to_string(),
            ));
        }

        let body = self
            .api
            .upload_resume_form(
                &request.generated_name,
                request.content_type(),
                request.payload.clone(),
            )
            .await?;

        let storage_key = ["key", "fileKey"]
            .iter()
            .find_map(|k| body.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| request.storage_key());
        let location_uri = ["location", "url", "downloadUrl"]
            .iter()
            .find_map(|k| body.get(*k).and_then(Value::as_str))
            .map(str::to_string)
            .unwrap_or_else(|| self.api.url("/user/resume"));

        Ok(UploadResult {
            success: body.get("success").and_then(Value::as_bool).unwrap_or(true),
            storage_key,
            location_uri,
            bucket: None,
            strategy: self.name(),
        })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Presigned URL
// ────────────────────────────────────────────────────────────────────────────

/// Asks the backend for a presigned PUT URL, then uploads straight to it.
pub struct PresignedUrlUpload {
    api: ApiClient,
}

impl PresignedUrlUpload {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl UploadStrategy for PresignedUrlUpload {
    fn name(&self) -> &'static str {
        "presigned-url"
    }

    async fn upload(&self, request: &UploadRequest) -> Result<UploadResult, AppError> {
        let presigned = self
            .api
            .presigned_url(request.content_type(), &request.generated_name)
            .await?;

        let response = self
            .api
            .http()
            .put(&presigned.upload_url)
            .header(CONTENT_TYPE, request.content_type())
            .body(request.payload.clone())
            .send()
            .await?;
        ensure_success(response, "presigned PUT").await?;

        let location_uri = presigned
            .upload_url
            .split('?')
            .next()
            .unwrap_or(&presigned.upload_url)
            .to_string();

        Ok(UploadResult {
            success: true,
            storage_key: presigned.key.unwrap_or_else(|| request.storage_key()),
            location_uri,
            bucket: None,
            strategy: self.name(),
        })
    }
}
