//! Match Scorer: how much of a job's required skill set a user already covers.
//!
//! Default: `ExactMatchScorer` (case-sensitive string equality, no synonyms).
//! Services hold an `Arc<dyn MatchScorer>` so a smarter matcher can be swapped in.

use std::cmp::Reverse;

use serde::{Deserialize, Serialize};

use crate::models::job::{Job, JobMatch, SkillSet};

// ────────────────────────────────────────────────────────────────────────────
// Output data model
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchScore {
    pub percentage: u8, // 0 – 100
    /// Required skills the user has, in sorted order.
    pub matching_skills: Vec<String>,
}

// ────────────────────────────────────────────────────────────────────────────
// Trait definition
// ────────────────────────────────────────────────────────────────────────────

pub trait MatchScorer: Send + Sync {
    fn score(&self, user_skills: &SkillSet, required_skills: &SkillSet) -> MatchScore;

    fn name(&self) -> &'static str;
}

// ────────────────────────────────────────────────────────────────────────────
// ExactMatchScorer (default)
// ────────────────────────────────────────────────────────────────────────────

pub struct ExactMatchScorer;

impl MatchScorer for ExactMatchScorer {
    fn score(&self, user_skills: &SkillSet, required_skills: &SkillSet) -> MatchScore {
        score(user_skills, required_skills)
    }

    fn name(&self) -> &'static str {
        "exact"
    }
}

/// `round(|user ∩ required| / |required| * 100)`, or 0 when nothing is required.
pub fn score(user_skills: &SkillSet, required_skills: &SkillSet) -> MatchScore {
    if required_skills.is_empty() {
        return MatchScore {
            percentage: 0,
            matching_skills: Vec::new(),
        };
    }

    let matching_skills: Vec<String> = required_skills
        .intersection(user_skills)
        .cloned()
        .collect();
    let ratio = matching_skills.len() as f64 / required_skills.len() as f64;

    MatchScore {
        percentage: (ratio * 100.0).round() as u8,
        matching_skills,
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Ranking
// ────────────────────────────────────────────────────────────────────────────

/// Scores every job, drops those below `min_match`, best match first.
/// Ties keep their input order.
pub fn rank_jobs(
    scorer: &dyn MatchScorer,
    user_skills: &SkillSet,
    jobs: Vec<Job>,
    min_match: u8,
) -> Vec<JobMatch> {
    let mut ranked: Vec<JobMatch> = jobs
        .into_iter()
        .map(|job| {
            let MatchScore {
                percentage,
                matching_skills,
            } = scorer.score(user_skills, &job.required_skills);
            JobMatch {
                job,
                match_percentage: percentage,
                matching_skills,
            }
        })
        .filter(|m| m.match_percentage >= min_match)
        .collect();

    ranked.sort_by_key(|m| Reverse(m.match_percentage));
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;

    fn skills(items: &[&str]) -> SkillSet {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_two_of_three_rounds_to_67() {
        let result = score(&skills(&["A", "B"]), &skills(&["A", "B", "C"]));
        assert_eq!(result.percentage, 67);
        assert_eq!(result.matching_skills, vec!["A", "B"]);
    }

    #[test]
    fn test_empty_required_is_zero() {
        let result = score(&skills(&["A"]), &SkillSet::new());
        assert_eq!(result.percentage, 0);
        assert!(result.matching_skills.is_empty());
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let result = score(&skills(&["rust"]), &skills(&["Rust"]));
        assert_eq!(result.percentage, 0);
    }

    #[test]
    fn test_percentage_bounds() {
        let required = skills(&["A", "B", "C", "D", "E", "F", "G"]);
        for n in 0..=required.len() {
            let user: SkillSet = required.iter().take(n).cloned().collect();
            let result = score(&user, &required);
            assert!(result.percentage <= 100);
            assert_eq!(result.matching_skills.len(), n);
        }
        assert_eq!(score(&required, &required).percentage, 100);
        // 1/7 = 14.28..., 4/7 = 57.14...
        assert_eq!(score(&skills(&["A"]), &required).percentage, 14);
        assert_eq!(score(&skills(&["A", "B", "C", "D"]), &required).percentage, 57);
    }

    #[test]
    fn test_extra_user_skills_do_not_count() {
        let result = score(&skills(&["A", "X", "Y", "Z"]), &skills(&["A", "B"]));
        assert_eq!(result.percentage, 50);
        assert_eq!(result.matching_skills, vec!["A"]);
    }

    #[test]
    fn test_rank_jobs_filters_and_sorts() {
        let user = skills(&["Rust", "SQL"]);
        let jobs = vec![
            Job::new("Frontend", "A").with_skills(["React", "CSS"]),
            Job::new("Data", "B").with_skills(["SQL", "Python"]),
            Job::new("Backend", "C").with_skills(["Rust", "SQL"]),
            Job::new("Anything", "D"),
        ];

        let ranked = rank_jobs(&ExactMatchScorer, &user, jobs, 1);
        let titles: Vec<&str> = ranked.iter().map(|m| m.job.title.as_str()).collect();
        assert_eq!(titles, vec!["Backend", "Data"]);
        assert_eq!(ranked[0].match_percentage, 100);
        assert_eq!(ranked[1].matching_skills, vec!["SQL"]);
    }
}
