//! Binary codecs for the IVF family.

use crate::error::IndexError;
use crate::ivf::{
    CodeEntry, FlatEntry, IvfFlatIndex, IvfParams, IvfPqIndex, ScannEntry, ScannIndex,
    ScannParams,
};
use crate::persist::format::{self, Reader};
use crate::persist::quantizer::{read_aq_body, read_pq_body, write_aq_body, write_pq_body};

fn write_ivf_params(buf: &mut Vec<u8>, params: &IvfParams) {
    format::write_u32(buf, params.nlist as u32);
    format::write_u32(buf, params.nprobe as u32);
    format::write_u32(buf, params.train_iter as u32);
    format::write_u64(buf, params.seed);
}

fn read_ivf_params(r: &mut Reader<'_>) -> Result<IvfParams, IndexError> {
    Ok(IvfParams {
        nlist: format::read_u32(r)? as usize,
        nprobe: format::read_u32(r)? as usize,
        train_iter: format::read_u32(r)? as usize,
        seed: format::read_u64(r)?,
    })
}

/// Centroids are written as `nlist` vectors of the engine dimension.
fn write_centroids(buf: &mut Vec<u8>, centroids: &[Vec<f32>]) {
    format::write_u32(buf, centroids.len() as u32);
    for c in centroids {
        format::write_f32_slice(buf, c);
    }
}

fn read_centroids(
    r: &mut Reader<'_>,
    nlist: usize,
    dimension: usize,
) -> Result<Vec<Vec<f32>>, IndexError> {
    let count = format::read_len(r, 4)?;
    if count != nlist {
        return Err(IndexError::CorruptData {
            message: "centroid count contradicts nlist".to_string(),
            expected: Some(nlist.to_string()),
            actual: Some(count.to_string()),
        });
    }
    let mut centroids = Vec::with_capacity(nlist);
    for _ in 0..nlist {
        centroids.push(format::read_f32_vec_exact(r, dimension)?);
    }
    Ok(centroids)
}

impl IvfFlatIndex {
    /// Serialize the trained index to a versioned blob.
    ///
    /// # Errors
    ///
    /// Returns `NotTrained` before training.
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        if !self.is_trained() {
            return Err(IndexError::NotTrained);
        }
        let mut buf = format::begin(format::KIND_IVF_FLAT);
        format::write_metric(&mut buf, self.metric());
        write_ivf_params(&mut buf, self.params());
        format::write_u32(&mut buf, self.dimension().expect("trained") as u32);
        write_centroids(&mut buf, &self.centroids);
        for list in &self.lists {
            format::write_u32(&mut buf, list.len() as u32);
            for entry in list {
                format::write_u32(&mut buf, entry.id);
                format::write_f32_slice(&mut buf, &entry.vector);
            }
        }
        format::write_metadata_store(&mut buf, &self.metadata);
        Ok(format::finish(buf))
    }

    /// Deserialize a blob produced by [`IvfFlatIndex::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        let mut r = format::open(bytes, format::KIND_IVF_FLAT)?;
        let metric = format::read_metric(&mut r)?;
        let params = read_ivf_params(&mut r)?;
        let dimension = format::read_u32(&mut r)? as usize;
        if dimension == 0 {
            return Err(IndexError::corrupt("zero dimension"));
        }
        let centroids = read_centroids(&mut r, params.nlist, dimension)?;

        let mut lists = Vec::with_capacity(params.nlist);
        for _ in 0..params.nlist {
            let count = format::read_len(&mut r, 8)?;
            let mut list = Vec::with_capacity(count);
            for _ in 0..count {
                let id = format::read_u32(&mut r)?;
                let vector = format::read_f32_vec_exact(&mut r, dimension)?;
                list.push(FlatEntry { id, vector });
            }
            lists.push(list);
        }

        let metadata = format::read_metadata_store(&mut r)?;
        format::expect_end(&r)?;
        IvfFlatIndex::from_parts(metric, params, dimension, centroids, lists, metadata)
    }
}

impl IvfPqIndex {
    /// Serialize the trained index to a versioned blob.
    ///
    /// # Errors
    ///
    /// Returns `NotTrained` before training.
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        if !self.is_trained() {
            return Err(IndexError::NotTrained);
        }
        let pq = self.pq.as_ref().expect("trained");

        let mut buf = format::begin(format::KIND_IVF_PQ);
        format::write_metric(&mut buf, self.metric());
        write_ivf_params(&mut buf, self.params());
        format::write_u32(&mut buf, self.dimension().expect("trained") as u32);
        write_centroids(&mut buf, &self.centroids);
        write_pq_body(&mut buf, pq);
        for list in &self.lists {
            format::write_u32(&mut buf, list.len() as u32);
            for entry in list {
                format::write_u32(&mut buf, entry.id);
                format::write_byte_slice(&mut buf, &entry.code);
            }
        }
        format::write_metadata_store(&mut buf, &self.metadata);
        Ok(format::finish(buf))
    }

    /// Deserialize a blob produced by [`IvfPqIndex::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        let mut r = format::open(bytes, format::KIND_IVF_PQ)?;
        let metric = format::read_metric(&mut r)?;
        let params = read_ivf_params(&mut r)?;
        let dimension = format::read_u32(&mut r)? as usize;
        if dimension == 0 {
            return Err(IndexError::corrupt("zero dimension"));
        }
        let centroids = read_centroids(&mut r, params.nlist, dimension)?;
        let pq = read_pq_body(&mut r)?;
        if pq.dimension() != dimension {
            return Err(IndexError::CorruptData {
                message: "embedded quantizer dimension contradicts index".to_string(),
                expected: Some(dimension.to_string()),
                actual: Some(pq.dimension().to_string()),
            });
        }
        let code_len = pq.num_subspaces();

        let mut lists = Vec::with_capacity(params.nlist);
        for _ in 0..params.nlist {
            let count = format::read_len(&mut r, 8)?;
            let mut list = Vec::with_capacity(count);
            for _ in 0..count {
                let id = format::read_u32(&mut r)?;
                let code = format::read_byte_vec(&mut r)?;
                if code.len() != code_len {
                    return Err(IndexError::CorruptData {
                        message: "code length contradicts m".to_string(),
                        expected: Some(code_len.to_string()),
                        actual: Some(code.len().to_string()),
                    });
                }
                list.push(CodeEntry { id, code });
            }
            lists.push(list);
        }

        let metadata = format::read_metadata_store(&mut r)?;
        format::expect_end(&r)?;
        let pq_params = pq.params().clone();
        IvfPqIndex::from_parts(
            metric, params, pq_params, dimension, centroids, lists, pq, metadata,
        )
    }
}

fn write_scann_params(buf: &mut Vec<u8>, params: &ScannParams) {
    format::write_u32(buf, params.nlist as u32);
    format::write_u32(buf, params.nprobe as u32);
    format::write_u32(buf, params.m as u32);
    format::write_u8(buf, params.bits);
    format::write_bool(buf, params.spherical);
    format::write_u32(buf, params.reorder_top_k as u32);
    format::write_bool(buf, params.use_rescoring);
    format::write_u32(buf, params.train_iter as u32);
    format::write_u64(buf, params.seed);
}

fn read_scann_params(r: &mut Reader<'_>) -> Result<ScannParams, IndexError> {
    Ok(ScannParams {
        nlist: format::read_u32(r)? as usize,
        nprobe: format::read_u32(r)? as usize,
        m: format::read_u32(r)? as usize,
        bits: format::read_u8(r)?,
        spherical: format::read_bool(r)?,
        reorder_top_k: format::read_u32(r)? as usize,
        use_rescoring: format::read_bool(r)?,
        train_iter: format::read_u32(r)? as usize,
        seed: format::read_u64(r)?,
    })
}

impl ScannIndex {
    /// Serialize the trained index to a versioned blob.
    ///
    /// # Errors
    ///
    /// Returns `NotTrained` before training.
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        if !self.is_trained() {
            return Err(IndexError::NotTrained);
        }
        let aq = self.aq.as_ref().expect("trained");

        let mut buf = format::begin(format::KIND_SCANN);
        format::write_metric(&mut buf, self.metric());
        write_scann_params(&mut buf, self.params());
        format::write_u32(&mut buf, self.dimension().expect("trained") as u32);
        write_centroids(&mut buf, &self.centroids);
        write_aq_body(&mut buf, aq);
        for list in &self.lists {
            format::write_u32(&mut buf, list.len() as u32);
            for entry in list {
                format::write_u32(&mut buf, entry.id);
                format::write_byte_slice(&mut buf, &entry.code);
                format::write_f32_slice(&mut buf, &entry.vector);
            }
        }
        format::write_metadata_store(&mut buf, &self.metadata);
        Ok(format::finish(buf))
    }

    /// Deserialize a blob produced by [`ScannIndex::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        let mut r = format::open(bytes, format::KIND_SCANN)?;
        let metric = format::read_metric(&mut r)?;
        let params = read_scann_params(&mut r)?;
        let dimension = format::read_u32(&mut r)? as usize;
        if dimension == 0 {
            return Err(IndexError::corrupt("zero dimension"));
        }
        let centroids = read_centroids(&mut r, params.nlist, dimension)?;
        let aq = read_aq_body(&mut r)?;
        if aq.dimension() != dimension {
            return Err(IndexError::CorruptData {
                message: "embedded quantizer dimension contradicts index".to_string(),
                expected: Some(dimension.to_string()),
                actual: Some(aq.dimension().to_string()),
            });
        }
        let code_len = aq.num_subspaces();

        let mut lists = Vec::with_capacity(params.nlist);
        for _ in 0..params.nlist {
            let count = format::read_len(&mut r, 8)?;
            let mut list = Vec::with_capacity(count);
            for _ in 0..count {
                let id = format::read_u32(&mut r)?;
                let code = format::read_byte_vec(&mut r)?;
                if code.len() != code_len {
                    return Err(IndexError::CorruptData {
                        message: "code length contradicts m".to_string(),
                        expected: Some(code_len.to_string()),
                        actual: Some(code.len().to_string()),
                    });
                }
                let vector = format::read_f32_vec_exact(&mut r, dimension)?;
                list.push(ScannEntry { id, code, vector });
            }
            lists.push(list);
        }

        let metadata = format::read_metadata_store(&mut r)?;
        format::expect_end(&r)?;
        ScannIndex::from_parts(metric, params, dimension, centroids, lists, aq, metadata)
    }
}
