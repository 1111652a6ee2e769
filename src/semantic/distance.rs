//! Distance functions over equal-length embedding vectors.
//!
//! The HNSW graph only ever sees a [`DistanceFn`]; which concrete function
//! backs it is picked from configuration through [`DistanceMetric`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Shared distance function used by the index.
pub type DistanceFn = Arc<dyn Fn(&[f32], &[f32]) -> f32 + Send + Sync>;

/// Selectable distance metric.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cosine_similarity`, valid for vectors of any magnitude.
    #[default]
    Cosine,
    /// `1 - dot(a, b)`, only correct for unit-length vectors.
    CosineForUnits,
}

impl DistanceMetric {
    pub fn distance_fn(self) -> DistanceFn {
        match self {
            DistanceMetric::Cosine => Arc::new(cosine_distance),
            DistanceMetric::CosineForUnits => Arc::new(cosine_distance_for_units),
        }
    }
}

/// Cosine distance in `[0, 2]`.
///
/// A zero-norm operand has no direction; it is treated as orthogonal to
/// everything (distance 1).
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 1.0;
    }

    1.0 - dot / denom
}

/// Cosine distance for vectors already normalised to unit length.
pub fn cosine_distance_for_units(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    1.0 - dot
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_vectors_have_zero_distance() {
        let v = vec![0.3, -1.2, 4.0];
        assert!(cosine_distance(&v, &v).abs() < 1e-6);
    }

    #[test]
    fn test_opposite_vectors_have_distance_two() {
        let a = vec![1.0, 0.0];
        let b = vec![-1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_orthogonal_vectors() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_magnitude_invariance() {
        let a = vec![1.0, 2.0, 3.0];
        let b = vec![10.0, 20.0, 30.0];
        assert!(cosine_distance(&a, &b).abs() < 1e-6);
    }

    #[test]
    fn test_zero_vector_is_orthogonal() {
        let a = vec![0.0, 0.0];
        let b = vec![1.0, 1.0];
        assert_eq!(cosine_distance(&a, &b), 1.0);
    }

    #[test]
    fn test_units_variant_matches_full_cosine_on_unit_vectors() {
        let a = vec![0.6, 0.8];
        let b = vec![1.0, 0.0];
        let full = cosine_distance(&a, &b);
        let units = cosine_distance_for_units(&a, &b);
        assert!((full - units).abs() < 1e-6);
    }

    #[test]
    fn test_metric_selects_function() {
        let f = DistanceMetric::Cosine.distance_fn();
        assert!((f(&[2.0, 0.0], &[1.0, 0.0])).abs() < 1e-6);

        // units variant trusts the caller; non-unit input gives a skewed result
        let g = DistanceMetric::CosineForUnits.distance_fn();
        assert!((g(&[2.0, 0.0], &[1.0, 0.0]) + 1.0).abs() < 1e-6);
    }
}
