use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Week,
    Month,
    Year,
    #[default]
    All,
}

impl TimeRange {
    pub fn parse(raw: &str) -> TimeRange {
        match raw.trim().to_ascii_lowercase().as_str() {
            "week" => TimeRange::Week,
            "month" => TimeRange::Month,
            "year" => TimeRange::Year,
            _ => TimeRange::All,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TimeRange::Week => "week",
            TimeRange::Month => "month",
            TimeRange::Year => "year",
            TimeRange::All => "all",
        }
    }

    /// Earliest instant inside the range, or `None` for an unbounded range.
    pub fn start(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            TimeRange::Week => Some(now - Duration::days(7)),
            TimeRange::Month => Some(now - Duration::days(30)),
            TimeRange::Year => Some(now - Duration::days(365)),
            TimeRange::All => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillCount {
    #[serde(alias = "name")]
    pub skill: String,
    #[serde(default)]
    pub count: usize,
}

/// Skill frequency list: counted entries or bare names.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SkillCountsPayload {
    Counted(Vec<SkillCount>),
    Names(Vec<String>),
}

impl SkillCountsPayload {
    pub fn into_counts(self) -> Vec<SkillCount> {
        match self {
            SkillCountsPayload::Counted(counts) => counts,
            SkillCountsPayload::Names(names) => names
                .into_iter()
                .map(|skill| SkillCount { skill, count: 0 })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct JobStats {
    pub total: usize,
    pub active: usize,
    pub draft: usize,
    pub expired: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserStats {
    pub total: usize,
    pub active: usize,
    pub admins: usize,
    pub new_users: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkillStats {
    pub most_popular: Vec<SkillCount>,
}

/// Admin dashboard headline numbers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AnalyticsOverview {
    pub jobs: JobStats,
    pub users: UserStats,
    pub skills: SkillStats,
    /// True when the numbers were computed from the fallback cache.
    #[serde(skip_deserializing)]
    pub from_cache: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SkillRecommendation {
    pub skill: String,
    pub demand_score: usize,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IndustryComparison {
    pub user_skill_count: usize,
}

/// Skills page: what the user has, what the market wants, and the gap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SkillsAnalysis {
    pub user_skills: Vec<String>,
    pub skill_gaps: Vec<String>,
    pub recommended_skills: Vec<SkillRecommendation>,
    pub top_skills_in_demand: Vec<String>,
    pub industry_comparison: IndustryComparison,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_range_start() {
        let now = Utc::now();
        assert_eq!(TimeRange::Week.start(now), Some(now - Duration::days(7)));
        assert_eq!(TimeRange::Year.start(now), Some(now - Duration::days(365)));
        assert!(TimeRange::All.start(now).is_none());
        assert_eq!(TimeRange::parse("MONTH"), TimeRange::Month);
        assert_eq!(TimeRange::parse("quarter"), TimeRange::All);
    }

    #[test]
    fn test_skill_counts_payload_shapes() {
        let counted: SkillCountsPayload =
            serde_json::from_str(r#"[{"name":"Rust","count":4}]"#).unwrap();
        assert_eq!(
            counted.into_counts(),
            vec![SkillCount {
                skill: "Rust".into(),
                count: 4
            }]
        );

        let names: SkillCountsPayload = serde_json::from_str(r#"["Go","SQL"]"#).unwrap();
        assert_eq!(names.into_counts().len(), 2);
    }

    #[test]
    fn test_overview_parses_partial_payload() {
        let overview: AnalyticsOverview =
            serde_json::from_str(r#"{"jobs":{"total":4,"active":3},"activity":{"x":1}}"#).unwrap();
        assert_eq!(overview.jobs.total, 4);
        assert_eq!(overview.users, UserStats::default());
        assert!(!overview.from_cache);
    }
}
