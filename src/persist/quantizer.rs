//! Binary codecs for the quantizers.

use crate::error::IndexError;
use crate::persist::format::{self, Reader};
use crate::quantization::{AnisotropicQuantizer, PqParams, ProductQuantizer, ScalarQuantizer};

impl ScalarQuantizer {
    /// Serialize to a versioned byte blob.
    ///
    /// # Errors
    ///
    /// Returns `NotTrained` before calibration.
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        if !self.is_trained() {
            return Err(IndexError::NotTrained);
        }
        let mut buf = format::begin(format::KIND_SCALAR);
        format::write_u32(&mut buf, self.dimension() as u32);
        format::write_f32(&mut buf, self.scale());
        format::write_f32(&mut buf, self.offset());
        Ok(format::finish(buf))
    }

    /// Deserialize from a blob produced by [`ScalarQuantizer::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns `CorruptData` / `VersionUnsupported` for malformed input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        let mut r = format::open(bytes, format::KIND_SCALAR)?;
        let dimension = format::read_u32(&mut r)? as usize;
        if dimension == 0 {
            return Err(IndexError::corrupt("zero dimension"));
        }
        let scale = format::read_f32(&mut r)?;
        let offset = format::read_f32(&mut r)?;
        if !scale.is_finite() || scale == 0.0 || !offset.is_finite() {
            return Err(IndexError::corrupt("non-finite affine parameters"));
        }
        format::expect_end(&r)?;
        Ok(ScalarQuantizer::from_parts(dimension, scale, offset))
    }
}

fn read_pq_params(r: &mut Reader<'_>) -> Result<PqParams, IndexError> {
    let m = format::read_u32(r)? as usize;
    let bits = format::read_u8(r)?;
    let train_iter = format::read_u32(r)? as usize;
    let seed = format::read_u64(r)?;
    Ok(PqParams {
        m,
        bits,
        train_iter,
        seed,
    })
}

pub(crate) fn write_pq_params(buf: &mut Vec<u8>, params: &PqParams) {
    format::write_u32(buf, params.m as u32);
    format::write_u8(buf, params.bits);
    format::write_u32(buf, params.train_iter as u32);
    format::write_u64(buf, params.seed);
}

pub(crate) fn write_pq_body(buf: &mut Vec<u8>, pq: &ProductQuantizer) {
    format::write_metric(buf, pq.metric());
    format::write_u32(buf, pq.dimension() as u32);
    write_pq_params(buf, pq.params());
    format::write_codebooks(buf, pq.codebooks());
}

pub(crate) fn read_pq_body(r: &mut Reader<'_>) -> Result<ProductQuantizer, IndexError> {
    let metric = format::read_metric(r)?;
    let dimension = format::read_u32(r)? as usize;
    let params = read_pq_params(r)?;

    // Parameter validation (divisibility, bit range) happens in the
    // constructor; shape validation happens while reading the codebooks.
    let probe = ProductQuantizer::new(dimension, metric, params.clone())?;
    let widths = vec![dimension / params.m; params.m];
    let codebooks = format::read_codebooks(r, params.m, probe.ksub(), &widths)?;
    ProductQuantizer::from_parts(dimension, metric, params, codebooks)
}

impl ProductQuantizer {
    /// Serialize to a versioned byte blob.
    ///
    /// # Errors
    ///
    /// Returns `NotTrained` before training.
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        if !self.is_trained() {
            return Err(IndexError::NotTrained);
        }
        let mut buf = format::begin(format::KIND_PQ);
        write_pq_body(&mut buf, self);
        Ok(format::finish(buf))
    }

    /// Deserialize from a blob produced by [`ProductQuantizer::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns `CorruptData` / `VersionUnsupported` for malformed input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        let mut r = format::open(bytes, format::KIND_PQ)?;
        let pq = read_pq_body(&mut r)?;
        format::expect_end(&r)?;
        Ok(pq)
    }
}

pub(crate) fn write_aq_body(buf: &mut Vec<u8>, aq: &AnisotropicQuantizer) {
    format::write_metric(buf, aq.metric());
    format::write_u32(buf, aq.dimension() as u32);
    format::write_u32(buf, aq.num_subspaces() as u32);
    format::write_u8(buf, aq.bits());
    format::write_u32(buf, aq.train_iter() as u32);
    format::write_u64(buf, aq.seed());
    format::write_codebooks(buf, aq.codebooks());
}

pub(crate) fn read_aq_body(r: &mut Reader<'_>) -> Result<AnisotropicQuantizer, IndexError> {
    let metric = format::read_metric(r)?;
    let dimension = format::read_u32(r)? as usize;
    let m = format::read_u32(r)? as usize;
    let bits = format::read_u8(r)?;
    let train_iter = format::read_u32(r)? as usize;
    let seed = format::read_u64(r)?;

    let probe = AnisotropicQuantizer::new(dimension, metric, m, bits, train_iter, seed)?;
    let widths: Vec<usize> = (0..m).map(|s| probe.subspace_width(s)).collect();
    let codebooks = format::read_codebooks(r, m, probe.ksub(), &widths)?;
    AnisotropicQuantizer::from_parts(dimension, metric, m, bits, train_iter, seed, codebooks)
}

impl AnisotropicQuantizer {
    /// Serialize to a versioned byte blob.
    ///
    /// # Errors
    ///
    /// Returns `NotTrained` before training.
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        if !self.is_trained() {
            return Err(IndexError::NotTrained);
        }
        let mut buf = format::begin(format::KIND_AQ);
        write_aq_body(&mut buf, self);
        Ok(format::finish(buf))
    }

    /// Deserialize from a blob produced by [`AnisotropicQuantizer::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns `CorruptData` / `VersionUnsupported` for malformed input.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        let mut r = format::open(bytes, format::KIND_AQ)?;
        let aq = read_aq_body(&mut r)?;
        format::expect_end(&r)?;
        Ok(aq)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Metric;
    use crate::quantization::Quantizer;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn uniform_vectors(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| (0..dim).map(|_| rng.gen::<f32>()).collect())
            .collect()
    }

    #[test]
    fn test_scalar_roundtrip() {
        let mut sq = ScalarQuantizer::new(4).unwrap();
        sq.train(&uniform_vectors(50, 4, 1)).unwrap();

        let blob = sq.to_bytes().unwrap();
        let loaded = ScalarQuantizer::from_bytes(&blob).unwrap();

        let v = vec![0.3, 0.7, 0.1, 0.9];
        assert_eq!(sq.encode(&v).unwrap(), loaded.encode(&v).unwrap());
    }

    #[test]
    fn test_scalar_untrained_rejected() {
        let sq = ScalarQuantizer::new(4).unwrap();
        assert!(matches!(sq.to_bytes(), Err(IndexError::NotTrained)));
    }

    #[test]
    fn test_pq_roundtrip_identical_codes() {
        let mut pq = ProductQuantizer::new(
            16,
            Metric::L2,
            PqParams {
                m: 4,
                bits: 4,
                train_iter: 10,
                seed: 2,
            },
        )
        .unwrap();
        let vectors = uniform_vectors(100, 16, 2);
        pq.train(&vectors).unwrap();

        let blob = pq.to_bytes().unwrap();
        let loaded = ProductQuantizer::from_bytes(&blob).unwrap();

        for v in vectors.iter().take(20) {
            assert_eq!(pq.encode(v).unwrap(), loaded.encode(v).unwrap());
        }
    }

    #[test]
    fn test_pq_blob_flipped_byte_rejected() {
        let mut pq = ProductQuantizer::new(
            8,
            Metric::L2,
            PqParams {
                m: 2,
                bits: 4,
                train_iter: 5,
                seed: 0,
            },
        )
        .unwrap();
        pq.train(&uniform_vectors(40, 8, 3)).unwrap();

        let mut blob = pq.to_bytes().unwrap();
        let mid = blob.len() / 2;
        blob[mid] ^= 0x01;
        assert!(ProductQuantizer::from_bytes(&blob).is_err());
    }

    #[test]
    fn test_aq_roundtrip_uneven_widths() {
        let mut aq = AnisotropicQuantizer::new(10, Metric::L2, 3, 4, 10, 4).unwrap();
        let vectors = uniform_vectors(80, 10, 4);
        aq.train(&vectors).unwrap();

        let blob = aq.to_bytes().unwrap();
        let loaded = AnisotropicQuantizer::from_bytes(&blob).unwrap();

        for v in vectors.iter().take(20) {
            assert_eq!(aq.encode(v).unwrap(), loaded.encode(v).unwrap());
        }
        assert_eq!(loaded.subspace_width(0), 4);
        assert_eq!(loaded.subspace_width(2), 3);
    }
}
