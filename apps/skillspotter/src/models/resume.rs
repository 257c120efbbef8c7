use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::models::parse_timestamp;

/// Metadata about the user's uploaded resume, as shown on the resume page and
/// kept in the fallback cache under `resumeData`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeMeta {
    pub file_name: String,
    #[serde(default)]
    pub file_size_kb: Option<u64>,
    pub upload_timestamp: DateTime<Utc>,
    #[serde(default)]
    pub download_url: Option<String>,
    pub key: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extracted_skills: Vec<String>,
}

impl ResumeMeta {
    pub fn file_size_label(&self) -> String {
        match self.file_size_kb {
            Some(kb) => format!("{kb} KB"),
            None => "unknown size".to_string(),
        }
    }
}

/// `GET /user/resume` body: `{ "resume": { ... } }`, with `resume` absent when
/// nothing has been uploaded yet.
#[derive(Debug, Default, Deserialize)]
pub struct ResumeEnvelope {
    #[serde(default)]
    pub resume: Option<RawResume>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawResume {
    #[serde(default)]
    pub file_name: Option<String>,
    /// Bytes as a number, or an already formatted "123 KB" string.
    #[serde(default)]
    pub file_size: Option<Value>,
    #[serde(default)]
    pub upload_timestamp: Option<String>,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default, alias = "key")]
    pub original_key: Option<String>,
    #[serde(default)]
    pub extracted_skills: Option<Vec<String>>,
}

impl From<RawResume> for ResumeMeta {
    fn from(raw: RawResume) -> Self {
        let file_size_kb = match raw.file_size {
            Some(Value::Number(n)) => n.as_f64().map(|bytes| (bytes / 1024.0).round() as u64),
            Some(Value::String(s)) => s
                .trim()
                .trim_end_matches("KB")
                .trim()
                .parse::<u64>()
                .ok(),
            _ => None,
        };

        ResumeMeta {
            file_name: raw.file_name.unwrap_or_else(|| "Resume.pdf".to_string()),
            file_size_kb,
            upload_timestamp: parse_timestamp(raw.upload_timestamp.as_deref())
                .unwrap_or_else(Utc::now),
            download_url: raw.download_url.filter(|u| u != "#"),
            key: raw.original_key.unwrap_or_default(),
            extracted_skills: raw.extracted_skills.unwrap_or_default(),
        }
    }
}

/// Skills response: `{ "skills": [...] }` or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SkillsPayload {
    Wrapped {
        #[serde(default)]
        skills: Vec<String>,
    },
    Bare(Vec<String>),
}

impl SkillsPayload {
    pub fn into_skills(self) -> Vec<String> {
        match self {
            SkillsPayload::Wrapped { skills } => skills,
            SkillsPayload::Bare(skills) => skills,
        }
    }
}

/// `GET /user/resume/status` body.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResumeStatus {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub has_resume: bool,
    #[serde(default)]
    pub message: Option<String>,
}
