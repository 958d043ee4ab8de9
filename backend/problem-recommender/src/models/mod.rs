use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Verdict string the problem source uses for accepted submissions
pub const ACCEPTED_VERDICT: &str = "OK";

/// Build the identity key of a problem (`contestId_index`)
pub fn problem_key(contest_id: Option<i64>, index: &str) -> String {
    match contest_id {
        Some(id) => format!("{}_{}", id, index),
        None => format!("_{}", index),
    }
}

/// Problem metadata as returned by the problemset endpoint, enriched with
/// its solved count once statistics are merged in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Problem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contest_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub problemset_name: Option<String>,
    pub index: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub problem_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub points: Option<f64>,
    #[serde(default)]
    pub rating: Option<i32>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub solved_count: u64,
}

impl Problem {
    pub fn key(&self) -> String {
        problem_key(self.contest_id, &self.index)
    }

    /// Tags joined into one whitespace-separated document
    pub fn tags_text(&self) -> String {
        self.tags.join(" ")
    }

    pub fn has_any_tag(&self, wanted: &[String]) -> bool {
        wanted.iter().any(|tag| self.tags.contains(tag))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemStatistic {
    #[serde(default)]
    pub contest_id: Option<i64>,
    pub index: String,
    #[serde(default)]
    pub solved_count: u64,
}

impl ProblemStatistic {
    pub fn key(&self) -> String {
        problem_key(self.contest_id, &self.index)
    }
}

/// `result` payload of `problemset.problems`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemSet {
    #[serde(default)]
    pub problems: Vec<Problem>,
    #[serde(default)]
    pub problem_statistics: Vec<ProblemStatistic>,
}

impl ProblemSet {
    /// Join solve statistics onto problems by identity key.
    /// Problems without statistics get a solved count of zero.
    pub fn into_problems(self) -> Vec<Problem> {
        let solved: HashMap<String, u64> = self
            .problem_statistics
            .iter()
            .map(|stat| (stat.key(), stat.solved_count))
            .collect();

        self.problems
            .into_iter()
            .map(|mut problem| {
                problem.solved_count = solved.get(&problem.key()).copied().unwrap_or(0);
                problem
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProblemRef {
    #[serde(default)]
    pub contest_id: Option<i64>,
    pub index: String,
}

/// One entry of `user.status`. Submissions still in the judge queue carry no verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    #[serde(default)]
    pub verdict: Option<String>,
    pub problem: ProblemRef,
}

impl Submission {
    pub fn is_accepted(&self) -> bool {
        self.verdict.as_deref() == Some(ACCEPTED_VERDICT)
    }
}

/// Identity keys of every problem with at least one accepted submission
pub fn solved_problem_ids(submissions: &[Submission]) -> HashSet<String> {
    submissions
        .iter()
        .filter(|sub| sub.is_accepted())
        .map(|sub| problem_key(sub.problem.contest_id, &sub.problem.index))
        .collect()
}

/// Status envelope shared by every problem-source endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct ApiEnvelope<T> {
    pub status: String,
    #[serde(default)]
    pub comment: Option<String>,
    pub result: Option<T>,
}

/// Problem plus the similarity it scored against a user profile
#[derive(Debug, Clone, Serialize)]
pub struct RecommendedProblem {
    #[serde(flatten)]
    pub problem: Problem,
    pub problem_id: String,
    pub similarity: f64,
}

/// Optional constraints applied to ranked candidates
#[derive(Debug, Clone, Default)]
pub struct RecommendationFilters {
    pub min_rating: Option<i32>,
    pub max_rating: Option<i32>,
    /// Keep problems sharing at least one of these tags
    pub tags: Option<Vec<String>>,
}

impl RecommendationFilters {
    /// Problems without a rating fail any supplied bound.
    pub fn accepts(&self, problem: &Problem) -> bool {
        if let Some(min) = self.min_rating {
            match problem.rating {
                Some(rating) if rating >= min => {}
                _ => return false,
            }
        }

        if let Some(max) = self.max_rating {
            match problem.rating {
                Some(rating) if rating <= max => {}
                _ => return false,
            }
        }

        if let Some(tags) = &self.tags {
            if !problem.has_any_tag(tags) {
                return false;
            }
        }

        true
    }
}
