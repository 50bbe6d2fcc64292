//! Anisotropic product quantization over residuals.
//!
//! Differs from [`ProductQuantizer`](crate::quantization::ProductQuantizer)
//! only in the subspace split: widths may be uneven
//! (`⌊D/m⌋ + 1` for the first `D mod m` subspaces), so `m` need not divide the
//! dimension. The enclosing partitioning layer trains it on residuals
//! `v − centroid(v)` and scores residual queries against it.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::IndexError;
use crate::metric::Metric;
use crate::quantization::{
    build_table_with, check_code_params, decode_with, encode_with, sym_dist_with,
    train_codebooks, AsymmetricQuantizer, DistanceTable, Quantizer, SubspaceBounds,
};

/// Product quantizer with per-subspace widths, trained on residuals.
#[derive(Clone, Debug)]
pub struct AnisotropicQuantizer {
    dimension: usize,
    metric: Metric,
    m: usize,
    bits: u8,
    train_iter: usize,
    seed: u64,
    codebooks: Vec<Vec<Vec<f32>>>,
    bounds: SubspaceBounds,
    trained: bool,
}

/// Subspace ranges for an uneven split: the first `D mod m` subspaces are one
/// component wider.
fn uneven_bounds(dimension: usize, m: usize) -> SubspaceBounds {
    let base = dimension / m;
    let extra = dimension % m;
    let mut bounds = Vec::with_capacity(m);
    let mut start = 0;
    for s in 0..m {
        let width = base + usize::from(s < extra);
        bounds.push((start, start + width));
        start += width;
    }
    bounds
}

impl AnisotropicQuantizer {
    /// Create an untrained anisotropic quantizer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` when `m` exceeds the dimension or `bits` is
    /// outside `1..=8`.
    pub fn new(
        dimension: usize,
        metric: Metric,
        m: usize,
        bits: u8,
        train_iter: usize,
        seed: u64,
    ) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::invalid("dimension must be greater than 0"));
        }
        check_code_params(m, bits)?;
        if m > dimension {
            return Err(IndexError::invalid(format!(
                "m {} exceeds dimension {}",
                m, dimension
            )));
        }
        if train_iter == 0 {
            return Err(IndexError::invalid("train_iter must be greater than 0"));
        }

        Ok(Self {
            dimension,
            metric,
            m,
            bits,
            train_iter,
            seed,
            codebooks: Vec::new(),
            bounds: uneven_bounds(dimension, m),
            trained: false,
        })
    }

    /// Train the codebooks on residual vectors.
    ///
    /// # Errors
    ///
    /// As [`ProductQuantizer::train`](crate::quantization::ProductQuantizer::train).
    pub fn train(&mut self, residuals: &[Vec<f32>]) -> Result<(), IndexError> {
        if residuals.is_empty() {
            return Err(IndexError::EmptyInput);
        }
        for v in residuals {
            if v.len() != self.dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimension,
                    actual: v.len(),
                });
            }
        }

        let mut rng = StdRng::seed_from_u64(self.seed);
        self.codebooks = train_codebooks(
            residuals,
            &self.bounds,
            self.ksub(),
            self.metric,
            self.train_iter,
            &mut rng,
        )?;
        self.trained = true;
        Ok(())
    }

    /// Codebook size `2^bits`.
    pub fn ksub(&self) -> usize {
        1usize << self.bits
    }

    /// Number of subspaces.
    pub fn num_subspaces(&self) -> usize {
        self.m
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

    /// Width of subspace `s`.
    pub fn subspace_width(&self, s: usize) -> usize {
        let (start, end) = self.bounds[s];
        end - start
    }

    pub(crate) fn bits(&self) -> u8 {
        self.bits
    }

    pub(crate) fn train_iter(&self) -> usize {
        self.train_iter
    }

    pub(crate) fn seed(&self) -> u64 {
        self.seed
    }

    pub(crate) fn codebooks(&self) -> &[Vec<Vec<f32>>] {
        &self.codebooks
    }

    pub(crate) fn from_parts(
        dimension: usize,
        metric: Metric,
        m: usize,
        bits: u8,
        train_iter: usize,
        seed: u64,
        codebooks: Vec<Vec<Vec<f32>>>,
    ) -> Result<Self, IndexError> {
        let mut aq = Self::new(dimension, metric, m, bits, train_iter, seed)?;
        aq.codebooks = codebooks;
        aq.trained = true;
        Ok(aq)
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

impl Quantizer for AnisotropicQuantizer {
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
        (self.dimension * 4) as f32 / self.m as f32
    }
}

impl AsymmetricQuantizer for AnisotropicQuantizer {
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

    #[test]
    fn test_uneven_bounds_cover_dimension() {
        // 10 components over 3 subspaces: widths 4, 3, 3
        let bounds = uneven_bounds(10, 3);
        assert_eq!(bounds, vec![(0, 4), (4, 7), (7, 10)]);

        // Even split stays even
        let bounds = uneven_bounds(8, 4);
        assert_eq!(bounds, vec![(0, 2), (2, 4), (4, 6), (6, 8)]);
    }

    #[test]
    fn test_widths_sum_to_dimension() {
        for (d, m) in [(7, 3), (100, 7), (768, 16), (5, 5)] {
            let bounds = uneven_bounds(d, m);
            let total: usize = bounds.iter().map(|(s, e)| e - s).sum();
            assert_eq!(total, d);
            assert_eq!(bounds.len(), m);
        }
    }

    #[test]
    fn test_m_need_not_divide_dimension() {
        let aq = AnisotropicQuantizer::new(10, Metric::L2, 3, 4, 10, 0).unwrap();
        assert_eq!(aq.subspace_width(0), 4);
        assert_eq!(aq.subspace_width(2), 3);
    }

    #[test]
    fn test_train_encode_on_residuals() {
        let mut rng = StdRng::seed_from_u64(8);
        // Residuals are centered around zero
        let residuals: Vec<Vec<f32>> = (0..100)
            .map(|_| (0..10).map(|_| rng.gen::<f32>() - 0.5).collect())
            .collect();

        let mut aq = AnisotropicQuantizer::new(10, Metric::L2, 3, 4, 10, 1).unwrap();
        aq.train(&residuals).unwrap();

        let code = aq.encode(&residuals[0]).unwrap();
        assert_eq!(code.len(), 3);
        let decoded = aq.decode(&code).unwrap();
        assert_eq!(decoded.len(), 10);
    }

    #[test]
    fn test_table_distance_matches_decoded_distance() {
        let mut rng = StdRng::seed_from_u64(13);
        let residuals: Vec<Vec<f32>> = (0..150)
            .map(|_| (0..9).map(|_| rng.gen::<f32>() - 0.5).collect())
            .collect();

        let mut aq = AnisotropicQuantizer::new(9, Metric::L2, 4, 5, 12, 2).unwrap();
        aq.train(&residuals).unwrap();

        let query: Vec<f32> = (0..9).map(|_| rng.gen::<f32>() - 0.5).collect();
        let table = aq.build_table(&query).unwrap();

        for v in residuals.iter().take(20) {
            let code = aq.encode(v).unwrap();
            let via_table = table.distance(&code).unwrap();
            let via_decode =
                crate::distance::l2(&query, &aq.decode(&code).unwrap()).unwrap();
            assert!(
                (via_table - via_decode).abs() < 1e-4,
                "table {} decode {}",
                via_table,
                via_decode
            );
        }
    }

    #[test]
    fn test_compression_ratio() {
        let aq = AnisotropicQuantizer::new(768, Metric::L2, 16, 8, 10, 0).unwrap();
        assert_eq!(aq.compression_ratio(), (768.0 * 4.0) / 16.0);
    }

    #[test]
    fn test_m_exceeding_dimension_rejected() {
        assert!(AnisotropicQuantizer::new(4, Metric::L2, 8, 4, 10, 0).is_err());
    }
}
