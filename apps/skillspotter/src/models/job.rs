use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{de_opt_id, parse_timestamp};
use crate::pagination::{Page, DEFAULT_LIMIT, DEFAULT_PAGE};

pub type SkillSet = BTreeSet<String>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum JobStatus {
    #[default]
    Active,
    Draft,
    Expired,
    Closed,
}

impl JobStatus {
    pub fn parse(raw: &str) -> Option<JobStatus> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "ACTIVE" => Some(JobStatus::Active),
            "DRAFT" => Some(JobStatus::Draft),
            "EXPIRED" => Some(JobStatus::Expired),
            "CLOSED" => Some(JobStatus::Closed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Active => "ACTIVE",
            JobStatus::Draft => "DRAFT",
            JobStatus::Expired => "EXPIRED",
            JobStatus::Closed => "CLOSED",
        }
    }
}

/// Canonical job posting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawJob")]
pub struct Job {
    pub id: String,
    pub title: String,
    pub company: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    pub description: String,
    pub required_skills: SkillSet,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub posted_date: Option<DateTime<Utc>>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub job_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub salary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote: Option<bool>,
    /// Object key of the posting when it was stored as a job description file.
    #[serde(rename = "key", skip_serializing_if = "Option::is_none")]
    pub storage_key: Option<String>,
}

impl Job {
    pub fn new(title: impl Into<String>, company: impl Into<String>) -> Self {
        Job {
            id: String::new(),
            title: title.into(),
            company: company.into(),
            location: None,
            description: String::new(),
            required_skills: SkillSet::new(),
            status: JobStatus::Active,
            posted_date: None,
            job_type: None,
            salary: None,
            remote: None,
            storage_key: None,
        }
    }

    pub fn with_skills<I, S>(mut self, skills: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_skills = skills.into_iter().map(Into::into).collect();
        self
    }

    /// Case-insensitive search over title, company and description.
    pub fn matches_search(&self, term: &str) -> bool {
        let term = term.to_lowercase();
        self.title.to_lowercase().contains(&term)
            || self.company.to_lowercase().contains(&term)
            || self.description.to_lowercase().contains(&term)
    }
}

/// A job scored against the current user's skills.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "RawJob")]
pub struct JobMatch {
    #[serde(flatten)]
    pub job: Job,
    pub match_percentage: u8,
    pub matching_skills: Vec<String>,
}

/// Every job shape the backend (or an older cache) has produced.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawJob {
    #[serde(default, alias = "jobId", alias = "_id", deserialize_with = "de_opt_id")]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub skills: Option<Vec<String>>,
    #[serde(default, alias = "required_skills")]
    pub required_skills: Option<Vec<String>>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default, alias = "createdAt")]
    pub posted_date: Option<String>,
    #[serde(default, rename = "type", alias = "jobType")]
    pub job_type: Option<String>,
    #[serde(default)]
    pub salary: Option<String>,
    #[serde(default)]
    pub remote: Option<bool>,
    #[serde(default, alias = "storageKey")]
    pub key: Option<String>,
    #[serde(default)]
    pub match_percentage: Option<f64>,
    #[serde(default)]
    pub matching_skills: Option<Vec<String>>,
}

impl From<RawJob> for Job {
    fn from(raw: RawJob) -> Self {
        // `skills` wins when present, even if empty; `requiredSkills` is the fallback.
        let required_skills = raw
            .skills
            .or(raw.required_skills)
            .unwrap_or_default()
            .into_iter()
            .collect();

        Job {
            id: raw.id.unwrap_or_default(),
            title: raw.title.unwrap_or_default(),
            company: raw.company.unwrap_or_default(),
            location: raw.location,
            description: raw.description.unwrap_or_default(),
            required_skills,
            status: raw
                .status
                .as_deref()
                .and_then(JobStatus::parse)
                .unwrap_or_default(),
            posted_date: parse_timestamp(raw.posted_date.as_deref()),
            job_type: raw.job_type,
            salary: raw.salary,
            remote: raw.remote,
            storage_key: raw.key,
        }
    }
}

impl From<RawJob> for JobMatch {
    fn from(mut raw: RawJob) -> Self {
        let match_percentage = raw
            .match_percentage
            .take()
            .map(|p| p.round().clamp(0.0, 100.0) as u8)
            .unwrap_or(0);
        let matching_skills = raw.matching_skills.take().unwrap_or_default();
        JobMatch {
            job: Job::from(raw),
            match_percentage,
            matching_skills,
        }
    }
}

/// Job list response: either the paged envelope or a bare array.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ListPayload<T> {
    Paged {
        #[serde(alias = "items", alias = "users")]
        jobs: Vec<T>,
        #[serde(default)]
        page: Option<u32>,
        #[serde(default)]
        limit: Option<u32>,
        #[serde(default, rename = "totalPages")]
        total_pages: Option<u32>,
        #[serde(default, rename = "totalResults")]
        total_results: Option<usize>,
        #[serde(default)]
        message: Option<String>,
    },
    Bare(Vec<T>),
}

impl<T> ListPayload<T> {
    pub fn into_page(self) -> Page<T> {
        match self {
            ListPayload::Paged {
                jobs,
                page,
                limit,
                total_pages,
                total_results,
                message,
            } => {
                let limit = limit.unwrap_or(DEFAULT_LIMIT).max(1);
                let total_results = total_results.unwrap_or(jobs.len());
                Page {
                    total_pages: total_pages
                        .unwrap_or_else(|| total_results.div_ceil(limit as usize) as u32),
                    items: jobs,
                    page: page.unwrap_or(DEFAULT_PAGE),
                    limit,
                    total_results,
                    message,
                }
            }
            ListPayload::Bare(items) => {
                let total_results = items.len();
                Page {
                    items,
                    page: DEFAULT_PAGE,
                    limit: total_results.max(1) as u32,
                    total_pages: u32::from(total_results > 0),
                    total_results,
                    message: None,
                }
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobFilters {
    pub search: Option<String>,
    pub status: Option<JobStatus>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub min_match: Option<u8>,
}

impl JobFilters {
    pub fn to_query(&self) -> Vec<(String, String)> {
        let mut query = Vec::new();
        if let Some(search) = self.search.as_ref().filter(|s| !s.is_empty()) {
            query.push(("search".to_string(), search.clone()));
        }
        if let Some(status) = self.status {
            query.push(("status".to_string(), status.as_str().to_string()));
        }
        if let Some(page) = self.page {
            query.push(("page".to_string(), page.to_string()));
        }
        if let Some(limit) = self.limit {
            query.push(("limit".to_string(), limit.to_string()));
        }
        if let Some(min_match) = self.min_match {
            query.push(("minMatch".to_string(), min_match.to_string()));
        }
        query
    }
}
