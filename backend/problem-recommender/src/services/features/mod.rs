// ============================================
// Feature Composer
// ============================================
//
// Builds the problem feature matrix:
//   [tag TF-IDF dims..., scaled rating, scaled solved count]
//
// Rating and solved count are min-max scaled over the corpus snapshot the
// matrix is built from. The scaling parameters are not kept, so a matrix is
// only comparable with vectors derived from the same snapshot.

use crate::models::Problem;
use crate::services::vectorizer::TagVectorizer;
use crate::utils::min_max_scale;
use ndarray::{concatenate, Array1, Array2, ArrayView1, Axis};
use thiserror::Error;
use tracing::debug;

/// Rating used for unrated problems before scaling
pub const DEFAULT_RATING: i32 = 1500;

#[derive(Debug, Error)]
pub enum FeatureError {
    #[error("Corpus is empty")]
    EmptyCorpus,

    #[error("Feature shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, FeatureError>;

/// One feature row per corpus problem, in corpus order
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    matrix: Array2<f64>,
    tag_dimension: usize,
}

impl FeatureMatrix {
    pub fn rows(&self) -> usize {
        self.matrix.nrows()
    }

    /// Width of every row (tag dims + rating + solved count)
    pub fn dimension(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn tag_dimension(&self) -> usize {
        self.tag_dimension
    }

    pub fn row(&self, index: usize) -> ArrayView1<f64> {
        self.matrix.row(index)
    }

    /// Column-wise mean of the selected rows; `None` when nothing is selected
    pub fn mean_of_rows(&self, indices: &[usize]) -> Option<Array1<f64>> {
        if indices.is_empty() {
            return None;
        }
        self.matrix.select(Axis(0), indices).mean_axis(Axis(0))
    }

    /// Column-wise mean of the whole matrix; `None` for an empty matrix
    pub fn column_mean(&self) -> Option<Array1<f64>> {
        if self.matrix.nrows() == 0 {
            return None;
        }
        self.matrix.mean_axis(Axis(0))
    }
}

#[derive(Debug, Clone)]
pub struct FeatureComposer {
    default_rating: i32,
}

impl Default for FeatureComposer {
    fn default() -> Self {
        Self::new(DEFAULT_RATING)
    }
}

impl FeatureComposer {
    pub fn new(default_rating: i32) -> Self {
        Self { default_rating }
    }

    /// Compose the feature matrix for `problems` with a fitted vectorizer
    pub fn compose(
        &self,
        problems: &[Problem],
        vectorizer: &TagVectorizer,
    ) -> Result<FeatureMatrix> {
        if problems.is_empty() {
            return Err(FeatureError::EmptyCorpus);
        }

        let n = problems.len();
        let documents: Vec<String> = problems.iter().map(Problem::tags_text).collect();
        let tags = vectorizer.transform(&documents);

        let ratings: Vec<f64> = problems
            .iter()
            .map(|p| f64::from(p.rating.unwrap_or(self.default_rating)))
            .collect();
        let solved_counts: Vec<f64> = problems.iter().map(|p| p.solved_count as f64).collect();

        let rating_column = Array2::from_shape_vec((n, 1), min_max_scale(&ratings))?;
        let solved_column = Array2::from_shape_vec((n, 1), min_max_scale(&solved_counts))?;

        let matrix = concatenate(
            Axis(1),
            &[tags.view(), rating_column.view(), solved_column.view()],
        )?;

        debug!(
            rows = matrix.nrows(),
            columns = matrix.ncols(),
            "Composed problem feature matrix"
        );

        Ok(FeatureMatrix {
            matrix,
            tag_dimension: vectorizer.dimension(),
        })
    }
}
