//! Binary codec for the NSG index.

use smallvec::SmallVec;

use crate::error::IndexError;
use crate::nsg::{NsgIndex, NsgParams};
use crate::persist::format;

impl NsgIndex {
    /// Serialize the index, built or not, to a versioned blob.
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        let mut buf = format::begin(format::KIND_NSG);
        format::write_metric(&mut buf, self.metric());

        let params = self.params();
        format::write_u32(&mut buf, params.r as u32);
        format::write_u32(&mut buf, params.l as u32);
        format::write_u32(&mut buf, params.c as u32);

        format::write_bool(&mut buf, self.is_built());
        format::write_u32(&mut buf, self.dimension.unwrap_or(0) as u32);
        format::write_u32(&mut buf, self.num_vectors as u32);
        for &x in &self.vectors {
            format::write_f32(&mut buf, x);
        }
        if self.is_built() {
            for list in &self.neighbors {
                format::write_u32_slice(&mut buf, list);
            }
            format::write_u32(&mut buf, self.navigating);
        }
        format::write_metadata_store(&mut buf, &self.metadata);
        Ok(format::finish(buf))
    }

    /// Deserialize a blob produced by [`NsgIndex::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns `CorruptData` / `VersionUnsupported` for malformed input,
    /// including neighbor lists that exceed `R` or point out of range.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        let mut r = format::open(bytes, format::KIND_NSG)?;
        let metric = format::read_metric(&mut r)?;
        let params = NsgParams {
            r: format::read_u32(&mut r)? as usize,
            l: format::read_u32(&mut r)? as usize,
            c: format::read_u32(&mut r)? as usize,
        };

        let built = format::read_bool(&mut r)?;
        let dimension = match format::read_u32(&mut r)? as usize {
            0 => None,
            d => Some(d),
        };
        let num_vectors = format::read_len(&mut r, 1)?;
        if num_vectors > 0 && dimension.is_none() {
            return Err(IndexError::corrupt("vectors present but dimension unset"));
        }

        let total = num_vectors.saturating_mul(dimension.unwrap_or(0));
        if format::remaining(&r) < total.saturating_mul(4) {
            return Err(IndexError::corrupt("truncated vector payload"));
        }
        let mut vectors = Vec::with_capacity(total);
        for _ in 0..total {
            vectors.push(format::read_f32(&mut r)?);
        }

        let mut neighbors = Vec::new();
        let mut navigating = 0u32;
        if built {
            if num_vectors == 0 {
                return Err(IndexError::corrupt("built index without vectors"));
            }
            neighbors.reserve(num_vectors);
            for node in 0..num_vectors {
                let list = format::read_u32_vec(&mut r)?;
                if list.len() > params.r {
                    return Err(IndexError::CorruptData {
                        message: format!("node {} neighbor count exceeds R", node),
                        expected: Some(format!("<= {}", params.r)),
                        actual: Some(list.len().to_string()),
                    });
                }
                for &id in &list {
                    if id as usize >= num_vectors {
                        return Err(IndexError::CorruptData {
                            message: "neighbor id out of range".to_string(),
                            expected: Some(format!("< {}", num_vectors)),
                            actual: Some(id.to_string()),
                        });
                    }
                }
                neighbors.push(SmallVec::from_vec(list));
            }
            navigating = format::read_u32(&mut r)?;
            if navigating as usize >= num_vectors {
                return Err(IndexError::CorruptData {
                    message: "navigating node out of range".to_string(),
                    expected: Some(format!("< {}", num_vectors)),
                    actual: Some(navigating.to_string()),
                });
            }
        }

        let metadata = format::read_metadata_store(&mut r)?;
        format::expect_end(&r)?;

        NsgIndex::from_parts(
            metric, params, vectors, dimension, num_vectors, neighbors, navigating, built,
            metadata,
        )
    }
}
