//! Binary codec for the HNSW index.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::IndexError;
use crate::hnsw::{HnswIndex, HnswNode, HnswParams, MAX_LAYER};
use crate::persist::format;

impl HnswIndex {
    /// Serialize the whole graph (tombstones included) to a versioned blob.
    ///
    /// Takes the index lock in shared mode; a snapshot taken concurrently
    /// with writes reflects some consistent interleaving of them.
    pub fn to_bytes(&self) -> Result<Vec<u8>, IndexError> {
        let state = self.read_state();
        let params = self.params();

        let mut buf = format::begin(format::KIND_HNSW);
        format::write_metric(&mut buf, self.metric());
        format::write_u32(&mut buf, params.m as u32);
        format::write_u32(&mut buf, params.ef_construction as u32);
        format::write_u32(&mut buf, params.ef_search as u32);
        format::write_f64(&mut buf, params.level_mult);
        format::write_u64(&mut buf, params.seed);

        format::write_u32(&mut buf, state.dimension.unwrap_or(0) as u32);
        format::write_u32(&mut buf, state.nodes.len() as u32);
        for node in &state.nodes {
            format::write_u8(&mut buf, node.level() as u8);
            format::write_bool(&mut buf, node.is_deleted());
            format::write_f32_slice(&mut buf, node.vector());
            for layer in 0..=node.level() {
                format::write_u32_slice(&mut buf, &node.neighbors(layer));
            }
        }

        format::write_bool(&mut buf, state.entry_point.is_some());
        format::write_u32(&mut buf, state.entry_point.unwrap_or(0));
        format::write_metadata_store(&mut buf, &state.metadata);
        Ok(format::finish(buf))
    }

    /// Deserialize a blob produced by [`HnswIndex::to_bytes`].
    ///
    /// # Errors
    ///
    /// Returns `CorruptData` / `VersionUnsupported` for malformed input,
    /// including out-of-range neighbor ids and entry points.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, IndexError> {
        let mut r = format::open(bytes, format::KIND_HNSW)?;
        let metric = format::read_metric(&mut r)?;
        let params = HnswParams {
            m: format::read_u32(&mut r)? as usize,
            ef_construction: format::read_u32(&mut r)? as usize,
            ef_search: format::read_u32(&mut r)? as usize,
            level_mult: format::read_f64(&mut r)?,
            seed: format::read_u64(&mut r)?,
        };

        let dimension = match format::read_u32(&mut r)? as usize {
            0 => None,
            d => Some(d),
        };
        let node_count = format::read_len(&mut r, 1)?;
        if node_count > 0 && dimension.is_none() {
            return Err(IndexError::corrupt("nodes present but dimension unset"));
        }

        let mut nodes = Vec::with_capacity(node_count);
        for _ in 0..node_count {
            let level = format::read_u8(&mut r)? as usize;
            if level > MAX_LAYER {
                return Err(IndexError::CorruptData {
                    message: "node level exceeds cap".to_string(),
                    expected: Some(format!("<= {}", MAX_LAYER)),
                    actual: Some(level.to_string()),
                });
            }
            let deleted = format::read_bool(&mut r)?;
            let vector =
                format::read_f32_vec_exact(&mut r, dimension.expect("checked above"))?;

            let node = HnswNode::new(vector, level);
            if deleted {
                node.mark_deleted();
            }
            for layer in 0..=level {
                let list = format::read_u32_vec(&mut r)?;
                for &id in &list {
                    if id as usize >= node_count {
                        return Err(IndexError::CorruptData {
                            message: "neighbor id out of range".to_string(),
                            expected: Some(format!("< {}", node_count)),
                            actual: Some(id.to_string()),
                        });
                    }
                }
                *node.neighbors_mut(layer) = SmallVec::from_vec(list);
            }
            nodes.push(Arc::new(node));
        }

        let has_entry = format::read_bool(&mut r)?;
        let entry_raw = format::read_u32(&mut r)?;
        let entry_point = if has_entry {
            if entry_raw as usize >= node_count {
                return Err(IndexError::CorruptData {
                    message: "entry point out of range".to_string(),
                    expected: Some(format!("< {}", node_count)),
                    actual: Some(entry_raw.to_string()),
                });
            }
            Some(entry_raw)
        } else {
            None
        };

        let metadata = format::read_metadata_store(&mut r)?;
        format::expect_end(&r)?;

        HnswIndex::from_parts(metric, params, nodes, entry_point, dimension, metadata)
    }
}
