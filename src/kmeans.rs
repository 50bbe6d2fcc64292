//! k-means clustering with k-means++ seeding.
//!
//! Used for IVF partitioning and for the per-subspace codebooks of the
//! product quantizers. The RNG is threaded in explicitly, so two runs with the
//! same seed, inputs, and metric produce bit-identical centroids.
//!
//! The spherical variant (learned partitioning over unit vectors) normalizes
//! every input once, assigns by dot product, and renormalizes centroids after
//! each mean step.

use rand::rngs::StdRng;
use rand::Rng;

use crate::error::IndexError;
use crate::metric::Metric;
use crate::simd;

/// Centroid movement below which Lloyd iteration terminates.
const CONVERGENCE_EPS: f32 = 1e-6;

/// k-means clustering over vectors stored in SoA layout.
pub struct KMeans {
    dimension: usize,
    k: usize,
    max_iter: usize,
    spherical: bool,
    metric: Metric,
    centroids: Vec<Vec<f32>>,
}

impl KMeans {
    /// Create a new k-means instance with `k` clusters.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` if `dimension`, `k`, or `max_iter` is zero.
    pub fn new(
        dimension: usize,
        k: usize,
        max_iter: usize,
        metric: Metric,
        spherical: bool,
    ) -> Result<Self, IndexError> {
        if dimension == 0 || k == 0 {
            return Err(IndexError::invalid(
                "dimension and k must be greater than 0",
            ));
        }
        if max_iter == 0 {
            return Err(IndexError::invalid("max_iter must be greater than 0"));
        }

        Ok(Self {
            dimension,
            k,
            max_iter,
            spherical,
            metric,
            centroids: Vec::new(),
        })
    }

    /// Train on `num_vectors` vectors packed contiguously in `vectors`.
    ///
    /// # Errors
    ///
    /// Returns `InsufficientTrainingData` when `num_vectors < k` and
    /// `DimensionMismatch` when the buffer length disagrees with the layout.
    pub fn fit(
        &mut self,
        vectors: &[f32],
        num_vectors: usize,
        rng: &mut StdRng,
    ) -> Result<(), IndexError> {
        if num_vectors < self.k {
            return Err(IndexError::InsufficientTrainingData {
                required: self.k,
                actual: num_vectors,
            });
        }
        if vectors.len() != num_vectors * self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: num_vectors * self.dimension,
                actual: vectors.len(),
            });
        }

        // Spherical clustering works on unit vectors throughout.
        let normalized;
        let data: &[f32] = if self.spherical {
            let mut copy = vectors.to_vec();
            for i in 0..num_vectors {
                normalize(&mut copy[i * self.dimension..(i + 1) * self.dimension]);
            }
            normalized = copy;
            &normalized
        } else {
            vectors
        };

        self.centroids = self.seed_plus_plus(data, num_vectors, rng);

        for _ in 0..self.max_iter {
            let assignments = self.assign_all(data, num_vectors);
            let new_centroids = self.mean_step(data, num_vectors, &assignments);

            let mut converged = true;
            for (old, new) in self.centroids.iter().zip(new_centroids.iter()) {
                if simd::l2_sq(old, new).sqrt() >= CONVERGENCE_EPS {
                    converged = false;
                    break;
                }
            }

            self.centroids = new_centroids;
            if converged {
                break;
            }
        }

        Ok(())
    }

    /// k-means++ seeding: first centroid uniform, the rest D²-weighted.
    fn seed_plus_plus(
        &self,
        vectors: &[f32],
        num_vectors: usize,
        rng: &mut StdRng,
    ) -> Vec<Vec<f32>> {
        let mut centroids: Vec<Vec<f32>> = Vec::with_capacity(self.k);

        let first = rng.gen_range(0..num_vectors);
        centroids.push(self.get_vector(vectors, first).to_vec());

        // Nearest-centroid distance per candidate, updated incrementally as
        // centroids are added.
        let mut best = vec![f32::INFINITY; num_vectors];

        for _ in 1..self.k {
            let latest = centroids.last().expect("at least one centroid");
            let mut total = 0.0f64;
            for i in 0..num_vectors {
                let v = self.get_vector(vectors, i);
                let d = self
                    .metric
                    .finalize(self.assignment_score(v, latest))
                    .max(0.0);
                let w = d * d;
                if w < best[i] {
                    best[i] = w;
                }
                total += best[i] as f64;
            }

            let idx = if total > 0.0 {
                let threshold = rng.gen::<f64>() * total;
                let mut cumulative = 0.0f64;
                let mut chosen = num_vectors - 1;
                for (i, &w) in best.iter().enumerate() {
                    cumulative += w as f64;
                    if cumulative >= threshold {
                        chosen = i;
                        break;
                    }
                }
                chosen
            } else {
                // All mass collapsed onto existing centroids (duplicate-heavy
                // data); fall back to a uniform draw from the same stream.
                rng.gen_range(0..num_vectors)
            };

            centroids.push(self.get_vector(vectors, idx).to_vec());
        }

        centroids
    }

    /// Assign every vector to its nearest centroid.
    fn assign_all(&self, vectors: &[f32], num_vectors: usize) -> Vec<usize> {
        (0..num_vectors)
            .map(|i| self.assign(self.get_vector(vectors, i)).0)
            .collect()
    }

    /// Nearest centroid for one vector: `(cluster index, ranking score)`.
    ///
    /// The vector must already be normalized when the instance is spherical.
    pub fn assign(&self, v: &[f32]) -> (usize, f32) {
        let mut best_cluster = 0;
        let mut best_score = f32::INFINITY;
        for (idx, centroid) in self.centroids.iter().enumerate() {
            let s = self.assignment_score(v, centroid);
            if s < best_score {
                best_score = s;
                best_cluster = idx;
            }
        }
        (best_cluster, best_score)
    }

    /// Recompute centroids as per-cluster means; empty clusters keep their
    /// previous centroid. Spherical centroids are renormalized.
    fn mean_step(
        &self,
        vectors: &[f32],
        num_vectors: usize,
        assignments: &[usize],
    ) -> Vec<Vec<f32>> {
        let mut sums = vec![vec![0.0f32; self.dimension]; self.k];
        let mut counts = vec![0usize; self.k];

        for i in 0..num_vectors {
            let cluster = assignments[i];
            counts[cluster] += 1;
            let v = self.get_vector(vectors, i);
            for (j, &val) in v.iter().enumerate() {
                sums[cluster][j] += val;
            }
        }

        let mut new_centroids = Vec::with_capacity(self.k);
        for (cluster, (sum, &count)) in sums.iter().zip(counts.iter()).enumerate() {
            if count > 0 {
                let mut centroid: Vec<f32> = sum.iter().map(|&s| s / count as f32).collect();
                if self.spherical {
                    normalize(&mut centroid);
                }
                new_centroids.push(centroid);
            } else {
                new_centroids.push(self.centroids[cluster].clone());
            }
        }

        new_centroids
    }

    /// Ranking score used for assignment.
    #[inline]
    fn assignment_score(&self, v: &[f32], centroid: &[f32]) -> f32 {
        if self.spherical {
            // Unit vectors on both sides: maximize the dot product.
            -simd::dot(v, centroid)
        } else {
            self.metric.score(v, centroid)
        }
    }

    /// Get vector from SoA storage.
    fn get_vector<'a>(&self, vectors: &'a [f32], idx: usize) -> &'a [f32] {
        let start = idx * self.dimension;
        &vectors[start..start + self.dimension]
    }

    /// Trained centroids.
    pub fn centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    /// Consume the instance, returning its centroids.
    pub fn into_centroids(self) -> Vec<Vec<f32>> {
        self.centroids
    }
}

/// Scale a vector to unit length in place. Zero vectors are left unchanged.
pub(crate) fn normalize(v: &mut [f32]) {
    let n = simd::norm(v);
    if n > 0.0 {
        for x in v.iter_mut() {
            *x /= n;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn flat(vectors: &[Vec<f32>]) -> Vec<f32> {
        vectors.iter().flatten().copied().collect()
    }

    #[test]
    fn test_two_well_separated_clusters() {
        let mut vectors = Vec::new();
        for i in 0..10 {
            vectors.push(vec![0.0 + i as f32 * 0.01, 0.0]);
            vectors.push(vec![10.0 + i as f32 * 0.01, 10.0]);
        }
        let data = flat(&vectors);

        let mut km = KMeans::new(2, 2, 50, Metric::L2, false).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        km.fit(&data, vectors.len(), &mut rng).unwrap();

        // One centroid near each blob
        let c = km.centroids();
        let near_origin = c.iter().any(|c| simd::l2_sq(c, &[0.05, 0.0]) < 1.0);
        let near_far = c.iter().any(|c| simd::l2_sq(c, &[10.05, 10.0]) < 1.0);
        assert!(near_origin && near_far);
    }

    #[test]
    fn test_deterministic_given_seed() {
        let vectors: Vec<Vec<f32>> = (0..50)
            .map(|i| vec![(i % 7) as f32, (i % 11) as f32, (i % 5) as f32])
            .collect();
        let data = flat(&vectors);

        let mut a = KMeans::new(3, 4, 25, Metric::L2, false).unwrap();
        let mut b = KMeans::new(3, 4, 25, Metric::L2, false).unwrap();
        a.fit(&data, 50, &mut StdRng::seed_from_u64(42)).unwrap();
        b.fit(&data, 50, &mut StdRng::seed_from_u64(42)).unwrap();

        assert_eq!(a.centroids(), b.centroids());
    }

    #[test]
    fn test_insufficient_training_data() {
        let mut km = KMeans::new(2, 5, 10, Metric::L2, false).unwrap();
        let mut rng = StdRng::seed_from_u64(0);
        let err = km.fit(&[1.0, 2.0, 3.0, 4.0], 2, &mut rng).unwrap_err();
        assert!(matches!(
            err,
            IndexError::InsufficientTrainingData {
                required: 5,
                actual: 2
            }
        ));
    }

    #[test]
    fn test_spherical_centroids_unit_norm() {
        let vectors: Vec<Vec<f32>> = (0..40)
            .map(|i| {
                let angle = i as f32 * 0.3;
                vec![angle.cos() * 3.0, angle.sin() * 3.0]
            })
            .collect();
        let data = flat(&vectors);

        let mut km = KMeans::new(2, 4, 20, Metric::CosineDistance, true).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        km.fit(&data, 40, &mut rng).unwrap();

        for c in km.centroids() {
            let n = simd::norm(c);
            assert!((n - 1.0).abs() < 1e-4, "centroid norm {}", n);
        }
    }

    #[test]
    fn test_duplicate_heavy_data() {
        // Every point identical: seeding must not loop or divide by zero.
        let data = vec![1.0f32; 4 * 8];
        let mut km = KMeans::new(4, 3, 10, Metric::L2, false).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        km.fit(&data, 8, &mut rng).unwrap();
        assert_eq!(km.centroids().len(), 3);
    }
}
