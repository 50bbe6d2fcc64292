//! Product quantization.
//!
//! Vectors split into `m` equal-width subspaces, each vector-quantized against
//! its own `2^b`-centroid codebook. The asymmetric distance path precomputes a
//! per-query table so scoring a candidate costs `m` lookups regardless of the
//! dimension.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::IndexError;
use crate::metric::Metric;
use crate::quantization::{
    build_table_with, check_code_params, decode_with, encode_with, sym_dist_with,
    train_codebooks, AsymmetricQuantizer, DistanceTable, Quantizer, SubspaceBounds,
};

/// Product quantizer parameters.
#[derive(Clone, Debug)]
pub struct PqParams {
    /// Number of subspaces; must divide the dimension.
    pub m: usize,
    /// Bits per code, `1..=8`; codebooks hold `2^bits` centroids.
    pub bits: u8,
    /// Lloyd iteration cap for codebook training.
    pub train_iter: usize,
    /// Seed for codebook k-means.
    pub seed: u64,
}

impl Default for PqParams {
    fn default() -> Self {
        Self {
            m: 8,
            bits: 8,
            train_iter: 25,
            seed: 0,
        }
    }
}

/// Product quantizer with asymmetric distance tables.
#[derive(Clone, Debug)]
pub struct ProductQuantizer {
    dimension: usize,
    metric: Metric,
    params: PqParams,
    /// `[subspace][centroid][component]`; every codebook has exactly `2^bits`
    /// centroids once trained.
    codebooks: Vec<Vec<Vec<f32>>>,
    bounds: SubspaceBounds,
    trained: bool,
}

impl ProductQuantizer {
    /// Create an untrained product quantizer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` when the dimension is zero or not divisible
    /// by `m`, or when `bits` is outside `1..=8`.
    pub fn new(dimension: usize, metric: Metric, params: PqParams) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::invalid("dimension must be greater than 0"));
        }
        check_code_params(params.m, params.bits)?;
        if dimension % params.m != 0 {
            return Err(IndexError::invalid(format!(
                "dimension {} not divisible by m {}",
                dimension, params.m
            )));
        }
        if params.train_iter == 0 {
            return Err(IndexError::invalid("train_iter must be greater than 0"));
        }

        let sub_dim = dimension / params.m;
        let bounds = (0..params.m)
            .map(|s| (s * sub_dim, (s + 1) * sub_dim))
            .collect();

        Ok(Self {
            dimension,
            metric,
            params,
            codebooks: Vec::new(),
            bounds,
            trained: false,
        })
    }

    /// Train the per-subspace codebooks.
    ///
    /// # Errors
    ///
    /// Returns `EmptyInput` for an empty set, `DimensionMismatch` for a
    /// mis-sized vector, and `InsufficientTrainingData` when fewer than
    /// `2^bits` vectors are supplied.
    pub fn train(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        if vectors.is_empty() {
            return Err(IndexError::EmptyInput);
        }
        for v in vectors {
            if v.len() != self.dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimension,
                    actual: v.len(),
                });
            }
        }

        let mut rng = StdRng::seed_from_u64(self.params.seed);
        self.codebooks = train_codebooks(
            vectors,
            &self.bounds,
            self.ksub(),
            self.metric,
            self.params.train_iter,
            &mut rng,
        )?;
        self.trained = true;
        Ok(())
    }

    /// Codebook size `2^bits`.
    pub fn ksub(&self) -> usize {
        1usize << self.params.bits
    }

    /// Number of subspaces.
    pub fn num_subspaces(&self) -> usize {
        self.params.m
    }

    /// Vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Whether codebooks have been trained.
    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Metric the quantizer scores under.
    pub fn metric(&self) -> Metric {
        self.metric
    }

    pub(crate) fn params(&self) -> &PqParams {
        &self.params
    }

    pub(crate) fn codebooks(&self) -> &[Vec<Vec<f32>>] {
        &self.codebooks
    }

    pub(crate) fn from_parts(
        dimension: usize,
        metric: Metric,
        params: PqParams,
        codebooks: Vec<Vec<Vec<f32>>>,
    ) -> Result<Self, IndexError> {
        let mut pq = Self::new(dimension, metric, params)?;
        pq.codebooks = codebooks;
        pq.trained = true;
        Ok(pq)
    }

    fn ensure_trained(&self) -> Result<(), IndexError> {
        if self.trained {
            Ok(())
        } else {
            Err(IndexError::NotTrained)
        }
    }

    fn check_dimension(&self, len: usize) -> Result<(), IndexError> {
        if len != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: len,
            });
        }
        Ok(())
    }
}

impl Quantizer for ProductQuantizer {
    type Code = Vec<u8>;

    fn encode(&self, vector: &[f32]) -> Result<Vec<u8>, IndexError> {
        self.ensure_trained()?;
        self.check_dimension(vector.len())?;
        Ok(encode_with(self.metric, vector, &self.codebooks, &self.bounds))
    }

    fn decode(&self, code: &Vec<u8>) -> Result<Vec<f32>, IndexError> {
        self.ensure_trained()?;
        decode_with(code, &self.codebooks, &self.bounds, self.dimension)
    }

    fn compression_ratio(&self) -> f32 {
        (self.dimension * 4) as f32 / self.params.m as f32
    }
}

impl AsymmetricQuantizer for ProductQuantizer {
    fn build_table(&self, query: &[f32]) -> Result<DistanceTable, IndexError> {
        self.ensure_trained()?;
        self.check_dimension(query.len())?;
        Ok(build_table_with(
            self.metric,
            query,
            &self.codebooks,
            &self.bounds,
            self.ksub(),
        ))
    }

    fn sym_dist(&self, a: &[u8], b: &[u8]) -> Result<f32, IndexError> {
        self.ensure_trained()?;
        sym_dist_with(self.metric, a, b, &self.codebooks, &self.bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn uniform_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| (0..dim).map(|_| rng.gen::<f32>()).collect())
            .collect()
    }

    #[test]
    fn test_dimension_not_divisible() {
        let params = PqParams {
            m: 3,
            ..Default::default()
        };
        assert!(ProductQuantizer::new(8, Metric::L2, params).is_err());
    }

    #[test]
    fn test_bits_out_of_range() {
        let params = PqParams {
            m: 2,
            bits: 9,
            ..Default::default()
        };
        assert!(ProductQuantizer::new(8, Metric::L2, params).is_err());
    }

    #[test]
    fn test_encode_before_train_fails() {
        let pq = ProductQuantizer::new(8, Metric::L2, PqParams { m: 2, ..Default::default() })
            .unwrap();
        assert!(matches!(pq.encode(&[0.0; 8]), Err(IndexError::NotTrained)));
    }

    #[test]
    fn test_train_encode_decode() {
        let params = PqParams {
            m: 4,
            bits: 4,
            train_iter: 10,
            seed: 3,
        };
        let mut pq = ProductQuantizer::new(16, Metric::L2, params).unwrap();
        let vectors = uniform_vectors(200, 16, 1);
        pq.train(&vectors).unwrap();

        let code = pq.encode(&vectors[0]).unwrap();
        assert_eq!(code.len(), 4);
        let decoded = pq.decode(&code).unwrap();
        assert_eq!(decoded.len(), 16);

        // Reconstruction beats a random codeword by a wide margin on average
        let mse: f32 = vectors[0]
            .iter()
            .zip(decoded.iter())
            .map(|(a, b)| (a - b) * (a - b))
            .sum::<f32>()
            / 16.0;
        assert!(mse < 0.2, "mse {}", mse);
    }

    #[test]
    fn test_asym_dist_tracks_exact_distance() {
        let params = PqParams {
            m: 4,
            bits: 6,
            train_iter: 15,
            seed: 9,
        };
        let mut pq = ProductQuantizer::new(32, Metric::L2, params).unwrap();
        let vectors = uniform_vectors(300, 32, 2);
        pq.train(&vectors).unwrap();

        let query = &vectors[7];
        let table = pq.build_table(query).unwrap();

        for v in vectors.iter().take(50) {
            let code = pq.encode(v).unwrap();
            let approx = table.distance(&code).unwrap();
            let exact = crate::distance::l2(query, v).unwrap();
            assert!(
                (approx - exact).abs() < 1.5,
                "approx {} vs exact {}",
                approx,
                exact
            );
        }
    }

    #[test]
    fn test_sym_dist_self_is_zero() {
        let params = PqParams {
            m: 2,
            bits: 4,
            train_iter: 10,
            seed: 4,
        };
        let mut pq = ProductQuantizer::new(8, Metric::L2, params).unwrap();
        let vectors = uniform_vectors(64, 8, 3);
        pq.train(&vectors).unwrap();

        let code = pq.encode(&vectors[0]).unwrap();
        let d = pq.sym_dist(&code, &code).unwrap();
        assert!(d.abs() < 1e-6);
    }

    #[test]
    fn test_compression_ratio_exact() {
        let params = PqParams {
            m: 16,
            ..Default::default()
        };
        let pq = ProductQuantizer::new(768, Metric::L2, params).unwrap();
        assert_eq!(pq.compression_ratio(), (768.0 * 4.0) / 16.0);
    }

    #[test]
    fn test_insufficient_training_data() {
        let params = PqParams {
            m: 2,
            bits: 8,
            train_iter: 5,
            seed: 0,
        };
        let mut pq = ProductQuantizer::new(8, Metric::L2, params).unwrap();
        // 2^8 = 256 centroids per subspace need at least 256 vectors
        let vectors = uniform_vectors(100, 8, 4);
        assert!(matches!(
            pq.train(&vectors),
            Err(IndexError::InsufficientTrainingData { .. })
        ));
    }

    #[test]
    fn test_table_rejects_foreign_code_length() {
        let params = PqParams {
            m: 4,
            bits: 4,
            train_iter: 5,
            seed: 0,
        };
        let mut pq = ProductQuantizer::new(16, Metric::L2, params).unwrap();
        pq.train(&uniform_vectors(64, 16, 5)).unwrap();
        let table = pq.build_table(&vec![0.5; 16]).unwrap();
        assert!(table.distance(&[0u8; 3]).is_err());
    }
}
