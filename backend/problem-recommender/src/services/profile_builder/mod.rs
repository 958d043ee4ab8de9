// ============================================
// User Profile Builder
// ============================================
//
// A user profile is the column-wise mean of the feature rows of the
// problems the user solved. Users with no solves, or whose solves are all
// outside the corpus, get the mean of the whole matrix instead.

use crate::models::Problem;
use crate::services::features::FeatureMatrix;
use ndarray::Array1;
use std::collections::HashSet;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct UserProfileBuilder;

impl UserProfileBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Build the profile vector for `handle`.
    ///
    /// `corpus` must be the problem list `features` was composed from.
    /// Returns `None` only when the feature matrix is empty.
    pub fn build(
        &self,
        handle: &str,
        solved_ids: &HashSet<String>,
        features: &FeatureMatrix,
        corpus: &[Problem],
    ) -> Option<Array1<f64>> {
        let matched: Vec<usize> = if solved_ids.is_empty() {
            Vec::new()
        } else {
            corpus
                .iter()
                .enumerate()
                .filter(|(_, problem)| solved_ids.contains(&problem.key()))
                .map(|(idx, _)| idx)
                .collect()
        };

        if matched.is_empty() {
            debug!(
                handle = %handle,
                solved = solved_ids.len(),
                "No solved problems in corpus, using default profile"
            );
            return features.column_mean();
        }

        debug!(
            handle = %handle,
            solved = solved_ids.len(),
            matched = matched.len(),
            "Built user profile from solved problems"
        );

        features.mean_of_rows(&matched)
    }
}
