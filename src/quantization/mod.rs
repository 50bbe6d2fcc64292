//! Vector compression: scalar, product, and anisotropic product quantization.
//!
//! All quantizers are immutable after training, so the hot paths (`encode`,
//! `build_table`, [`DistanceTable::distance`]) take `&self` and need no
//! locking. Distance tables are owned by the calling query and never shared.

mod anisotropic;
mod pq;
mod scalar;

pub use anisotropic::AnisotropicQuantizer;
pub use pq::{PqParams, ProductQuantizer};
pub use scalar::ScalarQuantizer;

use crate::error::IndexError;
use crate::kmeans::KMeans;
use crate::metric::Metric;
use crate::simd;
use rand::rngs::StdRng;

/// Common quantizer capabilities.
pub trait Quantizer {
    /// Compressed representation of one vector.
    type Code;

    /// Compress a vector.
    fn encode(&self, vector: &[f32]) -> Result<Self::Code, IndexError>;

    /// Reconstruct an approximation of the original vector.
    fn decode(&self, code: &Self::Code) -> Result<Vec<f32>, IndexError>;

    /// Ratio of uncompressed to compressed bytes per vector.
    fn compression_ratio(&self) -> f32;
}

/// Extension for quantizers that support table-based asymmetric distance.
pub trait AsymmetricQuantizer: Quantizer {
    /// Precompute the per-subspace distance table for a query.
    fn build_table(&self, query: &[f32]) -> Result<DistanceTable, IndexError>;

    /// Code-to-code distance via codebook centroids.
    ///
    /// Strictly slower and less accurate than asymmetric scoring; provided for
    /// code-only comparisons.
    fn sym_dist(&self, a: &[u8], b: &[u8]) -> Result<f32, IndexError>;
}

/// Per-query lookup table for asymmetric distance.
///
/// Layout: `m` subspaces by `2^b` centroids, row-major. Scoring a code is
/// `m` lookups plus one reduction, independent of the vector dimension.
#[derive(Clone, Debug)]
pub struct DistanceTable {
    entries: Vec<f32>,
    m: usize,
    ksub: usize,
    bias: f32,
    metric: Metric,
}

impl DistanceTable {
    /// Asymmetric distance from the table's query to a coded vector.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` when the code length differs from `m` and
    /// `InvalidParameter` when a byte exceeds the codebook size.
    #[inline]
    pub fn distance(&self, code: &[u8]) -> Result<f32, IndexError> {
        if code.len() != self.m {
            return Err(IndexError::DimensionMismatch {
                expected: self.m,
                actual: code.len(),
            });
        }
        let mut sum = self.bias;
        for (sub, &c) in code.iter().enumerate() {
            let c = c as usize;
            if c >= self.ksub {
                return Err(IndexError::invalid(format!(
                    "code byte {} out of range for codebook size {}",
                    c, self.ksub
                )));
            }
            sum += self.entries[sub * self.ksub + c];
        }
        Ok(self.metric.finalize(sum))
    }

    /// Number of subspaces.
    pub fn subspaces(&self) -> usize {
        self.m
    }
}

/// Half-open component ranges of each subspace.
pub(crate) type SubspaceBounds = Vec<(usize, usize)>;

/// Train one codebook per subspace slice of the training vectors.
///
/// `bounds` defines the slice of each subspace; every codebook gets exactly
/// `ksub` centroids or training fails.
pub(crate) fn train_codebooks(
    vectors: &[Vec<f32>],
    bounds: &SubspaceBounds,
    ksub: usize,
    metric: Metric,
    train_iter: usize,
    rng: &mut StdRng,
) -> Result<Vec<Vec<Vec<f32>>>, IndexError> {
    let mut codebooks = Vec::with_capacity(bounds.len());

    for &(start, end) in bounds.iter() {
        let sub_dim = end - start;
        let mut flat = Vec::with_capacity(vectors.len() * sub_dim);
        for v in vectors {
            flat.extend_from_slice(&v[start..end]);
        }

        let mut km = KMeans::new(sub_dim, ksub, train_iter, metric, false)?;
        km.fit(&flat, vectors.len(), rng)?;
        codebooks.push(km.into_centroids());
    }

    Ok(codebooks)
}

/// Encode a vector: nearest centroid per subspace under the metric, ties to
/// the lowest code.
pub(crate) fn encode_with(
    metric: Metric,
    vector: &[f32],
    codebooks: &[Vec<Vec<f32>>],
    bounds: &SubspaceBounds,
) -> Vec<u8> {
    let mut code = Vec::with_capacity(bounds.len());
    for (sub, &(start, end)) in bounds.iter().enumerate() {
        let slice = &vector[start..end];
        let mut best = 0u8;
        let mut best_score = f32::INFINITY;
        for (c, centroid) in codebooks[sub].iter().enumerate() {
            let s = metric.score(slice, centroid);
            if s < best_score {
                best_score = s;
                best = c as u8;
            }
        }
        code.push(best);
    }
    code
}

/// Reconstruct a vector by concatenating the coded centroids.
pub(crate) fn decode_with(
    code: &[u8],
    codebooks: &[Vec<Vec<f32>>],
    bounds: &SubspaceBounds,
    dimension: usize,
) -> Result<Vec<f32>, IndexError> {
    if code.len() != bounds.len() {
        return Err(IndexError::DimensionMismatch {
            expected: bounds.len(),
            actual: code.len(),
        });
    }
    let mut out = vec![0.0f32; dimension];
    for (sub, (&c, &(start, end))) in code.iter().zip(bounds.iter()).enumerate() {
        let book = &codebooks[sub];
        let c = c as usize;
        if c >= book.len() {
            return Err(IndexError::invalid(format!(
                "code byte {} out of range for codebook size {}",
                c,
                book.len()
            )));
        }
        out[start..end].copy_from_slice(&book[c]);
    }
    Ok(out)
}

/// Build the per-query table: squared L2 per subspace for the L2 metric,
/// negated dot otherwise (cosine carries a `+1` bias so the reduced value is
/// the cosine distance of the reconstructed, unit-norm vector).
pub(crate) fn build_table_with(
    metric: Metric,
    query: &[f32],
    codebooks: &[Vec<Vec<f32>>],
    bounds: &SubspaceBounds,
    ksub: usize,
) -> DistanceTable {
    let m = bounds.len();
    let mut entries = Vec::with_capacity(m * ksub);
    for (sub, &(start, end)) in bounds.iter().enumerate() {
        let slice = &query[start..end];
        for centroid in codebooks[sub].iter() {
            let e = match metric {
                Metric::L2 => simd::l2_sq(slice, centroid),
                Metric::CosineDistance | Metric::NegDotProduct => -simd::dot(slice, centroid),
            };
            entries.push(e);
        }
    }
    let bias = match metric {
        Metric::CosineDistance => 1.0,
        Metric::L2 | Metric::NegDotProduct => 0.0,
    };
    DistanceTable {
        entries,
        m,
        ksub,
        bias,
        metric,
    }
}

/// Symmetric code-to-code distance: squared-sum-then-sqrt for L2, additive
/// scalars for the dot-based metrics.
pub(crate) fn sym_dist_with(
    metric: Metric,
    a: &[u8],
    b: &[u8],
    codebooks: &[Vec<Vec<f32>>],
    bounds: &SubspaceBounds,
) -> Result<f32, IndexError> {
    if a.len() != bounds.len() || b.len() != bounds.len() {
        return Err(IndexError::DimensionMismatch {
            expected: bounds.len(),
            actual: a.len().max(b.len()),
        });
    }
    let mut sum = match metric {
        Metric::CosineDistance => 1.0,
        Metric::L2 | Metric::NegDotProduct => 0.0,
    };
    for (sub, (&ca, &cb)) in a.iter().zip(b.iter()).enumerate() {
        let book = &codebooks[sub];
        let (ca, cb) = (ca as usize, cb as usize);
        if ca >= book.len() || cb >= book.len() {
            return Err(IndexError::invalid(format!(
                "code byte out of range for codebook size {}",
                book.len()
            )));
        }
        sum += match metric {
            Metric::L2 => simd::l2_sq(&book[ca], &book[cb]),
            Metric::CosineDistance | Metric::NegDotProduct => -simd::dot(&book[ca], &book[cb]),
        };
    }
    Ok(metric.finalize(sum))
}

/// Validate shared PQ-family parameters.
pub(crate) fn check_code_params(m: usize, bits: u8) -> Result<(), IndexError> {
    if m == 0 {
        return Err(IndexError::invalid("m must be greater than 0"));
    }
    if bits == 0 || bits > 8 {
        return Err(IndexError::invalid("bits must be in 1..=8"));
    }
    Ok(())
}
