//! NSG graph structure and batch construction.

use smallvec::SmallVec;

use crate::error::IndexError;
use crate::filtering::{Metadata, MetadataStore};
use crate::metric::Metric;

/// NSG parameters.
#[derive(Clone, Debug)]
pub struct NsgParams {
    /// Maximum out-degree per node.
    pub r: usize,

    /// Candidate pool size for the intermediate k-NN graph.
    pub l: usize,

    /// Base visited-node budget during search; the effective cap is
    /// `max(c, 20k)`.
    pub c: usize,
}

impl Default for NsgParams {
    fn default() -> Self {
        Self {
            r: 32,
            l: 100,
            c: 300,
        }
    }
}

/// Batch-built single-layer proximity graph.
pub struct NsgIndex {
    pub(crate) metric: Metric,
    pub(crate) params: NsgParams,

    /// Vectors stored in SoA format.
    pub(crate) vectors: Vec<f32>,
    pub(crate) dimension: Option<usize>,
    pub(crate) num_vectors: usize,

    /// Out-neighbors per node, populated by `build`.
    pub(crate) neighbors: Vec<SmallVec<[u32; 16]>>,

    /// Fixed search entry point: the node closest to the dataset mean.
    pub(crate) navigating: u32,
    pub(crate) built: bool,

    pub(crate) metadata: MetadataStore,
}

impl NsgIndex {
    /// Create an empty index. The dimension is fixed by the first vector.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` when `r`, `l`, or `c` is zero.
    pub fn new(metric: Metric, params: NsgParams) -> Result<Self, IndexError> {
        if params.r == 0 || params.l == 0 || params.c == 0 {
            return Err(IndexError::invalid("r, l, and c must be greater than 0"));
        }

        Ok(Self {
            metric,
            params,
            vectors: Vec::new(),
            dimension: None,
            num_vectors: 0,
            neighbors: Vec::new(),
            navigating: 0,
            built: false,
            metadata: MetadataStore::new(),
        })
    }

    /// Queue a vector for the next build, returning its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyBuilt` once the index is frozen, `EmptyInput` for a
    /// zero-length vector, and `DimensionMismatch` on disagreement with the
    /// first vector.
    pub fn add_vector(
        &mut self,
        vector: Vec<f32>,
        metadata: Option<Metadata>,
    ) -> Result<u32, IndexError> {
        if self.built {
            return Err(IndexError::AlreadyBuilt);
        }
        if vector.is_empty() {
            return Err(IndexError::EmptyInput);
        }
        match self.dimension {
            Some(d) if d != vector.len() => {
                return Err(IndexError::DimensionMismatch {
                    expected: d,
                    actual: vector.len(),
                });
            }
            Some(_) => {}
            None => self.dimension = Some(vector.len()),
        }

        let id = self.num_vectors as u32;
        self.vectors.extend_from_slice(&vector);
        self.num_vectors += 1;
        if let Some(metadata) = metadata {
            self.metadata.insert(id, metadata);
        }
        Ok(id)
    }

    /// Build the graph and freeze the index.
    ///
    /// # Errors
    ///
    /// Returns `EmptyInput` when nothing was queued and `AlreadyBuilt` on a
    /// second call.
    pub fn build(&mut self) -> Result<(), IndexError> {
        if self.built {
            return Err(IndexError::AlreadyBuilt);
        }
        if self.num_vectors == 0 {
            return Err(IndexError::EmptyInput);
        }

        let dimension = self.dimension.expect("dimension set with first vector");

        // Navigating node: closest to the componentwise mean, ties to the
        // smaller id.
        let mut mean = vec![0.0f32; dimension];
        for i in 0..self.num_vectors {
            for (j, &x) in self.get_vector(i).iter().enumerate() {
                mean[j] += x;
            }
        }
        for x in mean.iter_mut() {
            *x /= self.num_vectors as f32;
        }

        let mut best = (f32::INFINITY, 0u32);
        for i in 0..self.num_vectors {
            let s = self.metric.score(self.get_vector(i), &mean);
            if s < best.0 {
                best = (s, i as u32);
            }
        }
        self.navigating = best.1;

        // Intermediate k-NN graph by brute-force scan, then occlusion-pruned
        // neighbor selection.
        self.neighbors = vec![SmallVec::new(); self.num_vectors];
        for u in 0..self.num_vectors {
            let u_vec = self.get_vector(u);
            let mut candidates: Vec<(u32, f32)> = (0..self.num_vectors)
                .filter(|&other| other != u)
                .map(|other| (other as u32, self.metric.score(u_vec, self.get_vector(other))))
                .collect();
            candidates.sort_unstable_by(|a, b| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.0.cmp(&b.0))
            });
            candidates.truncate(self.params.l);

            self.neighbors[u] = self.select_occluded(&candidates);
        }

        self.built = true;
        Ok(())
    }

    /// Occlusion rule: a candidate is kept only when no already-selected
    /// neighbor is closer to it than the node itself; remaining slots fill
    /// nearest-first so every node keeps at least one neighbor.
    fn select_occluded(&self, candidates: &[(u32, f32)]) -> SmallVec<[u32; 16]> {
        let r = self.params.r;
        let mut selected: SmallVec<[u32; 16]> = SmallVec::new();

        for &(candidate_id, to_node) in candidates.iter() {
            if selected.len() >= r {
                break;
            }
            let candidate_vec = self.get_vector(candidate_id as usize);
            let occluded = selected.iter().any(|&s| {
                self.metric.score(candidate_vec, self.get_vector(s as usize)) < to_node
            });
            if !occluded {
                selected.push(candidate_id);
            }
        }

        for &(candidate_id, _) in candidates.iter() {
            if selected.len() >= r {
                break;
            }
            if !selected.contains(&candidate_id) {
                selected.push(candidate_id);
            }
        }

        selected
    }

    /// Vector dimension, once fixed.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Number of vectors.
    pub fn len(&self) -> usize {
        self.num_vectors
    }

    /// Whether no vector was added.
    pub fn is_empty(&self) -> bool {
        self.num_vectors == 0
    }

    /// Whether the graph has been built.
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// The navigating (entry) node id.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotBuilt` before `build`.
    pub fn navigating_node(&self) -> Result<u32, IndexError> {
        if !self.built {
            return Err(IndexError::IndexNotBuilt);
        }
        Ok(self.navigating)
    }

    /// Copy of a node's out-neighbors.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotBuilt` before `build` and `InvalidParameter` for an
    /// unknown id.
    pub fn node_neighbors(&self, id: u32) -> Result<Vec<u32>, IndexError> {
        if !self.built {
            return Err(IndexError::IndexNotBuilt);
        }
        self.neighbors
            .get(id as usize)
            .map(|n| n.to_vec())
            .ok_or_else(|| IndexError::invalid(format!("unknown id {}", id)))
    }

    /// Metric the index ranks under.
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Construction parameters.
    pub fn params(&self) -> &NsgParams {
        &self.params
    }

    /// Get vector from SoA storage.
    pub(crate) fn get_vector(&self, idx: usize) -> &[f32] {
        let dimension = self.dimension.expect("vectors present");
        let start = idx * dimension;
        &self.vectors[start..start + dimension]
    }

    pub(crate) fn check_query(&self, query: &[f32]) -> Result<(), IndexError> {
        if !self.built {
            return Err(IndexError::IndexNotBuilt);
        }
        if let Some(d) = self.dimension {
            if query.len() != d {
                return Err(IndexError::DimensionMismatch {
                    expected: d,
                    actual: query.len(),
                });
            }
        }
        Ok(())
    }

    /// Reconstruct an index from deserialized parts.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        metric: Metric,
        params: NsgParams,
        vectors: Vec<f32>,
        dimension: Option<usize>,
        num_vectors: usize,
        neighbors: Vec<SmallVec<[u32; 16]>>,
        navigating: u32,
        built: bool,
        metadata: MetadataStore,
    ) -> Result<Self, IndexError> {
        let mut index = Self::new(metric, params)?;
        index.vectors = vectors;
        index.dimension = dimension;
        index.num_vectors = num_vectors;
        index.neighbors = neighbors;
        index.navigating = navigating;
        index.built = built;
        index.metadata = metadata;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_index() -> NsgIndex {
        let mut index = NsgIndex::new(
            Metric::L2,
            NsgParams { r: 4, l: 8, c: 32 },
        )
        .unwrap();
        for i in 0..3 {
            for j in 0..3 {
                index.add_vector(vec![i as f32, j as f32], None).unwrap();
            }
        }
        index
    }

    #[test]
    fn test_add_after_build_fails() {
        let mut index = grid_index();
        index.build().unwrap();
        assert!(matches!(
            index.add_vector(vec![0.0, 0.0], None),
            Err(IndexError::AlreadyBuilt)
        ));
    }

    #[test]
    fn test_build_empty_fails() {
        let mut index = NsgIndex::new(Metric::L2, NsgParams::default()).unwrap();
        assert!(matches!(index.build(), Err(IndexError::EmptyInput)));
    }

    #[test]
    fn test_build_twice_fails() {
        let mut index = grid_index();
        index.build().unwrap();
        assert!(matches!(index.build(), Err(IndexError::AlreadyBuilt)));
    }

    #[test]
    fn test_navigating_node_is_center_of_grid() {
        let mut index = grid_index();
        index.build().unwrap();
        // Mean of the 3x3 unit grid is (1, 1), which is id 4 in row-major order
        assert_eq!(index.navigating_node().unwrap(), 4);
    }

    #[test]
    fn test_degree_bounds_after_build() {
        let mut index = grid_index();
        index.build().unwrap();
        for id in 0..9u32 {
            let n = index.node_neighbors(id).unwrap();
            assert!(!n.is_empty(), "node {} has no neighbors", id);
            assert!(n.len() <= 4, "node {} exceeds R", id);
        }
    }

    #[test]
    fn test_search_before_build_fails() {
        let index = grid_index();
        assert!(matches!(
            index.search(&[1.0, 1.0], 3),
            Err(IndexError::IndexNotBuilt)
        ));
    }

    #[test]
    fn test_dimension_mismatch_on_add() {
        let mut index = NsgIndex::new(Metric::L2, NsgParams::default()).unwrap();
        index.add_vector(vec![0.0, 0.0], None).unwrap();
        assert!(index.add_vector(vec![0.0], None).is_err());
    }

    #[test]
    fn test_single_vector_build() {
        let mut index = NsgIndex::new(Metric::L2, NsgParams::default()).unwrap();
        index.add_vector(vec![1.0, 2.0], None).unwrap();
        index.build().unwrap();
        let results = index.search(&[1.0, 2.0], 1).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 0);
    }
}
