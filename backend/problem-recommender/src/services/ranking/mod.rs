//! Recommendation Ranker
//!
//! Scores every corpus problem against a user profile and keeps the best
//! unsolved candidates.
//!
//! # Workflow
//! 1. Cosine similarity between the profile and each feature row
//! 2. Drop solved problems
//! 3. Apply rating bounds and the tag filter
//! 4. Stable sort by similarity (descending), ties keep corpus order
//! 5. Truncate to the requested count

use crate::models::{Problem, RecommendationFilters, RecommendedProblem};
use crate::services::features::FeatureMatrix;
use crate::utils::cosine_similarity;
use ndarray::ArrayView1;
use std::cmp::Ordering;
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum RankingError {
    #[error("User vector has {actual} dimensions, feature matrix has {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Feature matrix has {rows} rows for a corpus of {problems} problems")]
    CorpusMismatch { rows: usize, problems: usize },
}

pub type Result<T> = std::result::Result<T, RankingError>;

#[derive(Debug, Clone, Default)]
pub struct RecommendationRanker;

impl RecommendationRanker {
    pub fn new() -> Self {
        Self
    }

    /// Rank corpus problems for a user profile.
    ///
    /// `corpus` must be the problem list `features` was composed from.
    pub fn rank(
        &self,
        user_vector: ArrayView1<f64>,
        features: &FeatureMatrix,
        corpus: &[Problem],
        solved_ids: &HashSet<String>,
        count: usize,
        filters: &RecommendationFilters,
    ) -> Result<Vec<RecommendedProblem>> {
        if user_vector.len() != features.dimension() {
            return Err(RankingError::DimensionMismatch {
                expected: features.dimension(),
                actual: user_vector.len(),
            });
        }
        if features.rows() != corpus.len() {
            return Err(RankingError::CorpusMismatch {
                rows: features.rows(),
                problems: corpus.len(),
            });
        }

        let mut candidates: Vec<RecommendedProblem> = corpus
            .iter()
            .enumerate()
            .filter_map(|(idx, problem)| {
                let problem_id = problem.key();
                if solved_ids.contains(&problem_id) || !filters.accepts(problem) {
                    return None;
                }

                Some(RecommendedProblem {
                    problem: problem.clone(),
                    problem_id,
                    similarity: cosine_similarity(user_vector, features.row(idx)),
                })
            })
            .collect();

        let survivors = candidates.len();

        // sort_by is stable: equal scores keep corpus order
        candidates.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
        });
        candidates.truncate(count);

        debug!(
            corpus = corpus.len(),
            survivors,
            returned = candidates.len(),
            "Ranked recommendation candidates"
        );

        Ok(candidates)
    }
}
