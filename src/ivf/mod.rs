//! Inverted-file (IVF) partition indexes.
//!
//! Vectors are partitioned by a coarse k-means quantizer into `nlist` inverted
//! lists; a search ranks the centroids against the query and scans only the
//! `nprobe` nearest lists. Three variants share the control flow:
//!
//! - [`IvfFlatIndex`]: lists hold raw vectors, scored exactly
//! - [`IvfPqIndex`]: lists hold PQ codes of residuals, scored through
//!   per-list asymmetric distance tables
//! - [`ScannIndex`]: learned (optionally spherical) partitioning with an
//!   anisotropic quantizer over residuals and optional exact rescoring

mod flat;
mod pq;
mod scann;

pub use flat::IvfFlatIndex;
pub use pq::IvfPqIndex;
pub use scann::{ScannIndex, ScannParams};

pub(crate) use flat::FlatEntry;
pub(crate) use pq::CodeEntry;
pub(crate) use scann::ScannEntry;

use crate::error::IndexError;
use crate::metric::Metric;

/// Coarse-quantizer parameters shared by the IVF variants.
#[derive(Clone, Debug)]
pub struct IvfParams {
    /// Number of partitions (inverted lists).
    pub nlist: usize,

    /// Default number of lists probed per search.
    pub nprobe: usize,

    /// Lloyd iteration cap for centroid training.
    pub train_iter: usize,

    /// Seed for centroid k-means.
    pub seed: u64,
}

impl Default for IvfParams {
    fn default() -> Self {
        Self {
            nlist: 1024,
            nprobe: 100,
            train_iter: 25,
            seed: 0,
        }
    }
}

pub(crate) fn check_ivf_params(params: &IvfParams) -> Result<(), IndexError> {
    if params.nlist == 0 {
        return Err(IndexError::invalid("nlist must be greater than 0"));
    }
    if params.nprobe == 0 || params.nprobe > params.nlist {
        return Err(IndexError::invalid(format!(
            "nprobe {} must be in 1..={}",
            params.nprobe, params.nlist
        )));
    }
    if params.train_iter == 0 {
        return Err(IndexError::invalid("train_iter must be greater than 0"));
    }
    Ok(())
}

/// Validate per-search arguments against the trained list count.
pub(crate) fn check_search_args(k: usize, nprobe: usize, nlist: usize) -> Result<(), IndexError> {
    if k == 0 {
        return Err(IndexError::invalid("k must be greater than 0"));
    }
    if nprobe == 0 || nprobe > nlist {
        return Err(IndexError::invalid(format!(
            "nprobe {} must be in 1..={}",
            nprobe, nlist
        )));
    }
    Ok(())
}

/// Rank all centroids against the query: `(list index, score)` sorted
/// ascending by score, ties by index.
pub(crate) fn rank_centroids(
    metric: Metric,
    query: &[f32],
    centroids: &[Vec<f32>],
) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = centroids
        .iter()
        .enumerate()
        .map(|(idx, centroid)| (idx, metric.score(query, centroid)))
        .collect();
    ranked.sort_unstable_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    ranked
}

/// Componentwise residual `v - centroid`.
pub(crate) fn residual(v: &[f32], centroid: &[f32]) -> Vec<f32> {
    v.iter().zip(centroid.iter()).map(|(a, b)| a - b).collect()
}

/// Validate a batch of vectors/ids/metadata against each other.
pub(crate) fn check_batch(
    vectors: &[Vec<f32>],
    ids: &[u32],
    metadata: Option<&[crate::filtering::Metadata]>,
) -> Result<(), IndexError> {
    if vectors.len() != ids.len() {
        return Err(IndexError::invalid(format!(
            "{} vectors but {} ids",
            vectors.len(),
            ids.len()
        )));
    }
    if let Some(metadata) = metadata {
        if metadata.len() != vectors.len() {
            return Err(IndexError::invalid(format!(
                "{} vectors but {} metadata entries",
                vectors.len(),
                metadata.len()
            )));
        }
    }
    Ok(())
}
