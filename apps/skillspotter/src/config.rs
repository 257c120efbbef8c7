use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

const DEFAULT_API_URL: &str = "http://localhost:5000/api";
const DEFAULT_RESUME_BUCKET: &str = "skillspotter-resumes-b01006794";
const DEFAULT_JOBDESC_BUCKET: &str = "skillspotter-jobdesc-b01006794";
const DEFAULT_REGION: &str = "us-east-1";
const DEFAULT_ENVIRONMENT: &str = "development";
const DEFAULT_CACHE_PATH: &str = ".skillspotter/cache.json";

/// Token refresh fires this long after every successful login, register or refresh.
pub const DEFAULT_REFRESH_DELAY: Duration = Duration::from_secs(45 * 60);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureFlags {
    pub real_time_analytics: bool,
    pub skill_recommendations: bool,
    pub notifications_enabled: bool,
}

impl Default for FeatureFlags {
    fn default() -> Self {
        Self {
            real_time_analytics: true,
            skill_recommendations: true,
            notifications_enabled: true,
        }
    }
}

/// Client configuration loaded from environment variables.
/// Every value has a hardcoded fallback; only malformed values are rejected.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub resume_bucket: String,
    pub jobdesc_bucket: String,
    pub region: String,
    pub environment: String,
    /// Multipart upload endpoint tried after the direct bucket PUT.
    pub s3_upload_url: Option<String>,
    /// Custom S3 endpoint (MinIO / localstack).
    pub s3_endpoint: Option<String>,
    /// Origin used by the path-relative PUT strategy.
    pub app_origin: Option<String>,
    pub simulate_uploads: bool,
    pub cache_path: PathBuf,
    pub redis_url: Option<String>,
    pub refresh_delay: Duration,
    pub features: FeatureFlags,
    pub rust_log: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            resume_bucket: DEFAULT_RESUME_BUCKET.to_string(),
            jobdesc_bucket: DEFAULT_JOBDESC_BUCKET.to_string(),
            region: DEFAULT_REGION.to_string(),
            environment: DEFAULT_ENVIRONMENT.to_string(),
            s3_upload_url: None,
            s3_endpoint: None,
            app_origin: None,
            simulate_uploads: false,
            cache_path: PathBuf::from(DEFAULT_CACHE_PATH),
            redis_url: None,
            refresh_delay: DEFAULT_REFRESH_DELAY,
            features: FeatureFlags::default(),
            rust_log: "info".to_string(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup so tests never touch the process env.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Config::default();
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_url = match get("SKILLSPOTTER_API_URL") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => {
                tracing::warn!("No API URL configured, falling back to {DEFAULT_API_URL}");
                defaults.api_url
            }
        };

        let refresh_delay = match get("SKILLSPOTTER_REFRESH_SECS") {
            Some(raw) => Duration::from_secs(
                raw.parse::<u64>()
                    .context("SKILLSPOTTER_REFRESH_SECS must be a whole number of seconds")?,
            ),
            None => defaults.refresh_delay,
        };

        Ok(Config {
            api_url,
            resume_bucket: get("SKILLSPOTTER_RESUME_BUCKET").unwrap_or(defaults.resume_bucket),
            jobdesc_bucket: get("SKILLSPOTTER_JOBDESC_BUCKET").unwrap_or(defaults.jobdesc_bucket),
            region: get("SKILLSPOTTER_REGION").unwrap_or(defaults.region),
            environment: get("SKILLSPOTTER_ENV").unwrap_or(defaults.environment),
            s3_upload_url: get("SKILLSPOTTER_S3_UPLOAD_URL"),
            s3_endpoint: get("SKILLSPOTTER_S3_ENDPOINT"),
            app_origin: get("SKILLSPOTTER_APP_ORIGIN").map(|o| o.trim_end_matches('/').to_string()),
            simulate_uploads: parse_flag(
                "SKILLSPOTTER_SIMULATE_UPLOADS",
                get("SKILLSPOTTER_SIMULATE_UPLOADS"),
                false,
            )?,
            cache_path: get("SKILLSPOTTER_CACHE_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_path),
            redis_url: get("SKILLSPOTTER_REDIS_URL"),
            refresh_delay,
            features: FeatureFlags {
                real_time_analytics: parse_flag(
                    "SKILLSPOTTER_FEATURE_REAL_TIME_ANALYTICS",
                    get("SKILLSPOTTER_FEATURE_REAL_TIME_ANALYTICS"),
                    true,
                )?,
                skill_recommendations: parse_flag(
                    "SKILLSPOTTER_FEATURE_SKILL_RECOMMENDATIONS",
                    get("SKILLSPOTTER_FEATURE_SKILL_RECOMMENDATIONS"),
                    true,
                )?,
                notifications_enabled: parse_flag(
                    "SKILLSPOTTER_FEATURE_NOTIFICATIONS",
                    get("SKILLSPOTTER_FEATURE_NOTIFICATIONS"),
                    true,
                )?,
            },
            rust_log: get("RUST_LOG").unwrap_or(defaults.rust_log),
        })
    }

    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    /// The simulated transport is a development aid and never runs in production.
    pub fn simulation_enabled(&self) -> bool {
        self.simulate_uploads && !self.is_production()
    }
}

fn parse_flag(key: &str, raw: Option<String>, default: bool) -> Result<bool> {
    match raw.as_deref().map(|v| v.trim().to_ascii_lowercase()) {
        None => Ok(default),
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => Ok(true),
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => Ok(false),
        Some(v) => anyhow::bail!("{key} must be a boolean, got '{v}'"),
    }
}
