//! Skills: the user's skill profile against what cached job postings ask for.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde_json::Value;
use tracing::warn;

use crate::api_client::ApiClient;
use crate::cache::{self, keys, FallbackCache};
use crate::errors::AppError;
use crate::models::analytics::{
    IndustryComparison, SkillCount, SkillRecommendation, SkillsAnalysis,
};
use crate::models::job::Job;
use crate::resume::cached_skills;

const TOP_IN_DEMAND: usize = 10;
const MAX_GAPS: usize = 5;
const POPULAR_LIMIT: usize = 15;

#[derive(Clone)]
pub struct SkillsService {
    api: ApiClient,
    cache: Arc<dyn FallbackCache>,
}

impl SkillsService {
    pub fn new(api: ApiClient, cache: Arc<dyn FallbackCache>) -> Self {
        Self { api, cache }
    }

    pub async fn analysis(&self) -> Result<SkillsAnalysis, AppError> {
        match self.api.skills_analysis().await {
            Ok(analysis) => Ok(analysis),
            Err(e) if e.is_fallback_eligible() => {
                warn!("Skills analysis unavailable, analysing cached jobs: {e}");
                let user_skills = cached_skills(self.cache.as_ref()).await?;
                Ok(analyze(&user_skills, &self.cached_jobs().await?))
            }
            Err(e) => Err(e),
        }
    }

    pub async fn gaps(&self) -> Result<Value, AppError> {
        self.api.skill_gaps().await
    }

    pub async fn industry_demand(&self) -> Result<Value, AppError> {
        self.api.industry_demand().await
    }

    /// Dashboard headline numbers and recent activity, as the backend reports them.
    pub async fn dashboard(&self) -> Result<Value, AppError> {
        let overview = self.api.dashboard_overview().await?;
        let activity = self.api.dashboard_activity().await?;
        Ok(serde_json::json!({ "overview": overview, "activity": activity }))
    }

    pub async fn popular_skills(&self) -> Result<Vec<SkillCount>, AppError> {
        match self.api.popular_skills().await {
            Ok(skills) => Ok(skills),
            Err(e) if e.is_fallback_eligible() => {
                warn!("Popular skills unavailable, counting cached jobs: {e}");
                let mut counts = skill_counts(&self.cached_jobs().await?);
                counts.truncate(POPULAR_LIMIT);
                Ok(counts)
            }
            Err(e) => Err(e),
        }
    }

    async fn cached_jobs(&self) -> Result<Vec<Job>, AppError> {
        Ok(cache::get_json::<Vec<Job>>(self.cache.as_ref(), keys::MOCK_JOBS)
            .await?
            .unwrap_or_default())
    }
}

/// How often each skill is required across `jobs`, most requested first.
/// Equal counts are ordered by name.
pub fn skill_counts(jobs: &[Job]) -> Vec<SkillCount> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for skill in jobs.iter().flat_map(|j| j.required_skills.iter()) {
        *counts.entry(skill.as_str()).or_default() += 1;
    }

    let mut counts: Vec<SkillCount> = counts
        .into_iter()
        .map(|(skill, count)| SkillCount {
            skill: skill.to_string(),
            count,
        })
        .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.skill.cmp(&b.skill)));
    counts
}

/// Local analysis: the most requested skills the user lacks become gaps and
/// recommendations.
pub fn analyze(user_skills: &[String], jobs: &[Job]) -> SkillsAnalysis {
    let owned: BTreeSet<&str> = user_skills.iter().map(String::as_str).collect();
    let mut in_demand = skill_counts(jobs);
    in_demand.truncate(TOP_IN_DEMAND);

    let missing: Vec<&SkillCount> = in_demand
        .iter()
        .filter(|c| !owned.contains(c.skill.as_str()))
        .take(MAX_GAPS)
        .collect();

    SkillsAnalysis {
        user_skills: user_skills.to_vec(),
        skill_gaps: missing.iter().map(|c| c.skill.clone()).collect(),
        recommended_skills: missing
            .iter()
            .map(|c| SkillRecommendation {
                skill: c.skill.clone(),
                demand_score: c.count,
                reason: format!("In high demand (found in {} job postings)", c.count),
            })
            .collect(),
        top_skills_in_demand: in_demand.into_iter().map(|c| c.skill).collect(),
        industry_comparison: IndustryComparison {
            user_skill_count: owned.len(),
        },
    }
}
