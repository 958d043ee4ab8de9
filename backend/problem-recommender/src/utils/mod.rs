// Numeric helpers shared by the feature and ranking layers

use ndarray::{ArrayView1, ArrayViewMut1};

/// Min-max scale a column into [0, 1].
/// A column whose values are all equal scales to zeros.
pub fn min_max_scale(values: &[f64]) -> Vec<f64> {
    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;

    values
        .iter()
        .map(|v| {
            if range > 0.0 {
                ((v - min) / range).clamp(0.0, 1.0)
            } else {
                0.0
            }
        })
        .collect()
}

/// Cosine similarity; zero when either side has zero norm
pub fn cosine_similarity(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    let norm_a = a.dot(&a).sqrt();
    let norm_b = b.dot(&b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    a.dot(&b) / (norm_a * norm_b)
}

/// Scale a vector to unit L2 norm in place (zero vectors are left untouched)
pub fn l2_normalize(mut vector: ArrayViewMut1<f64>) {
    let norm = vector.iter().map(|v| v * v).sum::<f64>().sqrt();
    if norm > 0.0 {
        vector.mapv_inplace(|v| v / norm);
    }
}
