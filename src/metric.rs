//! Distance metric selection.
//!
//! The metric is a closed enum dispatched by `match` at the kernel sites, so
//! each kernel stays monomorphic and inlineable. Engines pick a metric at
//! construction and never change it.

use crate::distance;
use crate::simd;

/// Distance metric for vector comparison.
///
/// Chosen at engine construction; immutable thereafter. `CosineDistance`
/// assumes (but does not enforce) unit-norm inputs when used as a pure dot
/// complement; the kernel here divides by the norms so unnormalized inputs
/// still rank correctly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Metric {
    /// Euclidean distance.
    L2,
    /// `1 - cos(a, b)`; zero-norm inputs score distance 1.
    CosineDistance,
    /// Negated inner product (minimize to maximize the dot product).
    NegDotProduct,
}

impl Metric {
    /// Ranking score between two equal-length vectors.
    ///
    /// For `L2` this is the squared distance: cheaper than the true distance
    /// and order-preserving, so partial sorts use it directly. Call
    /// [`Metric::finalize`] once on a score that leaves the engine.
    #[inline]
    pub(crate) fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Metric::L2 => simd::l2_sq(a, b),
            Metric::CosineDistance => distance::cosine_distance_unchecked(a, b),
            Metric::NegDotProduct => -simd::dot(a, b),
        }
    }

    /// Convert a ranking score into the user-visible distance.
    #[inline]
    pub(crate) fn finalize(&self, score: f32) -> f32 {
        match self {
            // Scores are sums of squares; tiny negative drift from FMA is clamped.
            Metric::L2 => score.max(0.0).sqrt(),
            Metric::CosineDistance | Metric::NegDotProduct => score,
        }
    }

    /// Full checked distance between two vectors.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` when lengths differ.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f32, crate::IndexError> {
        match self {
            Metric::L2 => distance::l2(a, b),
            Metric::CosineDistance => distance::cosine_distance(a, b),
            Metric::NegDotProduct => distance::neg_dot(a, b),
        }
    }

    /// Stable tag for serialization.
    pub(crate) fn tag(&self) -> u8 {
        match self {
            Metric::L2 => 0,
            Metric::CosineDistance => 1,
            Metric::NegDotProduct => 2,
        }
    }

    /// Inverse of [`Metric::tag`].
    pub(crate) fn from_tag(tag: u8) -> Option<Metric> {
        match tag {
            0 => Some(Metric::L2),
            1 => Some(Metric::CosineDistance),
            2 => Some(Metric::NegDotProduct),
            _ => None,
        }
    }
}

/// Sort `(id, score)` candidates ascending by score, ties broken by ascending
/// id, so results are deterministic for equal inputs.
#[inline]
pub(crate) fn sort_by_score(results: &mut [(u32, f32)]) {
    results.sort_unstable_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_l2_score_is_squared() {
        let s = Metric::L2.score(&[0.0, 0.0], &[3.0, 4.0]);
        assert!((s - 25.0).abs() < 1e-4);
        assert!((Metric::L2.finalize(s) - 5.0).abs() < 1e-5);
    }

    #[test]
    fn test_finalize_clamps_negative_drift() {
        assert_eq!(Metric::L2.finalize(-1e-9), 0.0);
    }

    #[test]
    fn test_neg_dot_score() {
        let s = Metric::NegDotProduct.score(&[1.0, 1.0], &[2.0, 3.0]);
        assert!((s + 5.0).abs() < 1e-5);
        assert_eq!(Metric::NegDotProduct.finalize(s), s);
    }

    #[test]
    fn test_tag_roundtrip() {
        for m in [Metric::L2, Metric::CosineDistance, Metric::NegDotProduct] {
            assert_eq!(Metric::from_tag(m.tag()), Some(m));
        }
        assert_eq!(Metric::from_tag(9), None);
    }

    #[test]
    fn test_sort_by_score_tie_break() {
        let mut results = vec![(5u32, 1.0f32), (2, 1.0), (7, 0.5)];
        sort_by_score(&mut results);
        assert_eq!(results, vec![(7, 0.5), (2, 1.0), (5, 1.0)]);
    }
}
