//! IVF-Flat: inverted lists of raw vectors with exact scoring.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::IndexError;
use crate::filtering::{FilterPredicate, Metadata, MetadataStore};
use crate::ivf::{check_batch, check_ivf_params, check_search_args, rank_centroids, IvfParams};
use crate::kmeans::KMeans;
use crate::metric::{sort_by_score, Metric};

/// One inverted-list entry: user id plus the stored vector.
#[derive(Clone, Debug)]
pub(crate) struct FlatEntry {
    pub(crate) id: u32,
    pub(crate) vector: Vec<f32>,
}

/// Partition-and-probe index storing uncompressed vectors.
pub struct IvfFlatIndex {
    pub(crate) metric: Metric,
    pub(crate) params: IvfParams,
    pub(crate) dimension: Option<usize>,
    pub(crate) centroids: Vec<Vec<f32>>,
    pub(crate) lists: Vec<Vec<FlatEntry>>,
    pub(crate) trained: bool,
    pub(crate) num_entries: usize,
    pub(crate) metadata: MetadataStore,
}

impl IvfFlatIndex {
    /// Create an untrained index.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for a zero `nlist`/`train_iter` or an
    /// out-of-range default `nprobe`.
    pub fn new(metric: Metric, params: IvfParams) -> Result<Self, IndexError> {
        check_ivf_params(&params)?;
        Ok(Self {
            metric,
            params,
            dimension: None,
            centroids: Vec::new(),
            lists: Vec::new(),
            trained: false,
            num_entries: 0,
            metadata: MetadataStore::new(),
        })
    }

    /// Train the coarse quantizer. All-or-nothing; callable once.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyBuilt` when already trained, `EmptyInput` for an empty
    /// set, `InsufficientTrainingData` when `|V| < nlist`, and
    /// `DimensionMismatch` for inconsistent vectors.
    pub fn train(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        if self.trained {
            return Err(IndexError::AlreadyBuilt);
        }
        if vectors.is_empty() {
            return Err(IndexError::EmptyInput);
        }
        if vectors.len() < self.params.nlist {
            return Err(IndexError::InsufficientTrainingData {
                required: self.params.nlist,
                actual: vectors.len(),
            });
        }
        let dimension = vectors[0].len();
        if dimension == 0 {
            return Err(IndexError::EmptyInput);
        }
        let mut flat = Vec::with_capacity(vectors.len() * dimension);
        for v in vectors {
            if v.len() != dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: dimension,
                    actual: v.len(),
                });
            }
            flat.extend_from_slice(v);
        }

        let mut km = KMeans::new(
            dimension,
            self.params.nlist,
            self.params.train_iter,
            self.metric,
            false,
        )?;
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        km.fit(&flat, vectors.len(), &mut rng)?;

        self.centroids = km.into_centroids();
        self.lists = vec![Vec::new(); self.params.nlist];
        self.dimension = Some(dimension);
        self.trained = true;
        Ok(())
    }

    /// Append a batch of vectors to their nearest lists.
    ///
    /// Earlier entries stay in place when a later vector fails; the error
    /// names the offending batch position.
    ///
    /// # Errors
    ///
    /// Returns `NotTrained` before training, `InvalidParameter` for length
    /// disagreements between the slices, and `BatchItem` for a per-vector
    /// failure.
    pub fn add(
        &mut self,
        vectors: &[Vec<f32>],
        ids: &[u32],
        metadata: Option<&[Metadata]>,
    ) -> Result<(), IndexError> {
        if !self.trained {
            return Err(IndexError::NotTrained);
        }
        check_batch(vectors, ids, metadata)?;
        let dimension = self.dimension.expect("trained");

        for (i, (v, &id)) in vectors.iter().zip(ids.iter()).enumerate() {
            if v.len() != dimension {
                return Err(IndexError::BatchItem {
                    index: i,
                    source: Box::new(IndexError::DimensionMismatch {
                        expected: dimension,
                        actual: v.len(),
                    }),
                });
            }
            let list = self.nearest_list(v);
            self.lists[list].push(FlatEntry {
                id,
                vector: v.clone(),
            });
            self.num_entries += 1;
            if let Some(metadata) = metadata {
                self.metadata.insert(id, metadata[i].clone());
            }
        }
        Ok(())
    }

    /// Search the `nprobe` nearest lists with the engine's default probe
    /// count.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, IndexError> {
        self.search_with_nprobe(query, k, self.params.nprobe.min(self.params.nlist))
    }

    /// Search with an explicit probe count.
    ///
    /// Returns `(id, distance)` pairs sorted ascending, ties by id, at most
    /// `min(k, stored)` long.
    ///
    /// # Errors
    ///
    /// Returns `NotTrained` before training, `InvalidParameter` for `k == 0`
    /// or `nprobe` outside `1..=nlist`, and `DimensionMismatch` for a
    /// mis-sized query.
    pub fn search_with_nprobe(
        &self,
        query: &[f32],
        k: usize,
        nprobe: usize,
    ) -> Result<Vec<(u32, f32)>, IndexError> {
        self.search_inner(query, k, nprobe, None)
    }

    /// Filtered search: entries failing the predicate are skipped before
    /// scoring.
    pub fn search_with_filter(
        &self,
        query: &[f32],
        k: usize,
        nprobe: usize,
        filter: &FilterPredicate,
    ) -> Result<Vec<(u32, f32)>, IndexError> {
        self.search_inner(query, k, nprobe, Some(filter))
    }

    fn search_inner(
        &self,
        query: &[f32],
        k: usize,
        nprobe: usize,
        filter: Option<&FilterPredicate>,
    ) -> Result<Vec<(u32, f32)>, IndexError> {
        if !self.trained {
            return Err(IndexError::NotTrained);
        }
        check_search_args(k, nprobe, self.params.nlist)?;
        let dimension = self.dimension.expect("trained");
        if query.len() != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let ranked = rank_centroids(self.metric, query, &self.centroids);
        let mut candidates: Vec<(u32, f32)> = Vec::new();
        for &(list, _) in ranked.iter().take(nprobe) {
            for entry in &self.lists[list] {
                if let Some(filter) = filter {
                    if !self.metadata.matches(entry.id, filter) {
                        continue;
                    }
                }
                let score = self.metric.score(query, &entry.vector);
                candidates.push((entry.id, self.metric.finalize(score)));
            }
        }

        sort_by_score(&mut candidates);
        candidates.truncate(k);
        Ok(candidates)
    }

    /// Which list a vector falls into.
    fn nearest_list(&self, v: &[f32]) -> usize {
        rank_centroids(self.metric, v, &self.centroids)[0].0
    }

    /// Trained centroids.
    pub fn centroids(&self) -> &[Vec<f32>] {
        &self.centroids
    }

    /// Stored entry count.
    pub fn len(&self) -> usize {
        self.num_entries
    }

    /// Whether no entries are stored.
    pub fn is_empty(&self) -> bool {
        self.num_entries == 0
    }

    /// Vector dimension, once trained.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Whether the coarse quantizer has been trained.
    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Metric the index ranks under.
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Construction parameters.
    pub fn params(&self) -> &IvfParams {
        &self.params
    }

    /// Entries per list (occupancy diagnostics).
    pub fn list_sizes(&self) -> Vec<usize> {
        self.lists.iter().map(|l| l.len()).collect()
    }

    pub(crate) fn from_parts(
        metric: Metric,
        params: IvfParams,
        dimension: usize,
        centroids: Vec<Vec<f32>>,
        lists: Vec<Vec<FlatEntry>>,
        metadata: MetadataStore,
    ) -> Result<Self, IndexError> {
        let num_entries = lists.iter().map(|l| l.len()).sum();
        let mut index = Self::new(metric, params)?;
        index.dimension = Some(dimension);
        index.centroids = centroids;
        index.lists = lists;
        index.trained = true;
        index.num_entries = num_entries;
        index.metadata = metadata;
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corner_trained() -> IvfFlatIndex {
        let params = IvfParams {
            nlist: 4,
            nprobe: 4,
            train_iter: 20,
            seed: 2,
        };
        let mut index = IvfFlatIndex::new(Metric::L2, params).unwrap();
        // Four well-separated corners, replicated to satisfy |V| >= nlist
        let mut training = Vec::new();
        for _ in 0..4 {
            training.push(vec![0.0, 0.0]);
            training.push(vec![10.0, 0.0]);
            training.push(vec![0.0, 10.0]);
            training.push(vec![10.0, 10.0]);
        }
        index.train(&training).unwrap();
        index
    }

    #[test]
    fn test_add_before_train_fails() {
        let mut index = IvfFlatIndex::new(Metric::L2, IvfParams::default()).unwrap();
        let err = index.add(&[vec![0.0, 0.0]], &[0], None).unwrap_err();
        assert!(matches!(err, IndexError::NotTrained));
    }

    #[test]
    fn test_train_requires_nlist_vectors() {
        let params = IvfParams {
            nlist: 8,
            nprobe: 1,
            train_iter: 5,
            seed: 0,
        };
        let mut index = IvfFlatIndex::new(Metric::L2, params).unwrap();
        let vectors = vec![vec![0.0, 0.0]; 3];
        assert!(matches!(
            index.train(&vectors),
            Err(IndexError::InsufficientTrainingData { required: 8, .. })
        ));
    }

    #[test]
    fn test_train_twice_fails() {
        let mut index = corner_trained();
        assert!(matches!(
            index.train(&vec![vec![0.0, 0.0]; 4]),
            Err(IndexError::AlreadyBuilt)
        ));
    }

    #[test]
    fn test_search_finds_exact_match() {
        let mut index = corner_trained();
        let vectors: Vec<Vec<f32>> = (0..20).map(|i| vec![i as f32 * 0.5, 1.0]).collect();
        let ids: Vec<u32> = (0..20).collect();
        index.add(&vectors, &ids, None).unwrap();

        let results = index.search_with_nprobe(&[2.5, 1.0], 1, 4).unwrap();
        assert_eq!(results[0].0, 5);
        assert!(results[0].1 < 1e-6);
    }

    #[test]
    fn test_nprobe_out_of_range() {
        let index = corner_trained();
        assert!(index.search_with_nprobe(&[0.0, 0.0], 1, 0).is_err());
        assert!(index.search_with_nprobe(&[0.0, 0.0], 1, 5).is_err());
    }

    #[test]
    fn test_batch_error_names_offending_index() {
        let mut index = corner_trained();
        let vectors = vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![9.0]];
        let ids = vec![0, 1, 2];
        let err = index.add(&vectors, &ids, None).unwrap_err();
        match err {
            IndexError::BatchItem { index: i, .. } => assert_eq!(i, 2),
            other => panic!("unexpected error {:?}", other),
        }
        // Earlier entries were kept
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_mismatched_ids_length() {
        let mut index = corner_trained();
        assert!(index.add(&[vec![0.0, 0.0]], &[0, 1], None).is_err());
    }

    #[test]
    fn test_filtered_search() {
        let mut index = corner_trained();
        let vectors: Vec<Vec<f32>> = (0..10).map(|i| vec![i as f32 * 0.1, 0.0]).collect();
        let ids: Vec<u32> = (0..10).collect();
        let metadata: Vec<Metadata> = (0..10)
            .map(|i| {
                let mut m = Metadata::new();
                m.insert("parity".to_string(), i % 2);
                m
            })
            .collect();
        index.add(&vectors, &ids, Some(&metadata)).unwrap();

        let results = index
            .search_with_filter(&[0.0, 0.0], 10, 4, &FilterPredicate::equals("parity", 1))
            .unwrap();
        assert_eq!(results.len(), 5);
        for (id, _) in results {
            assert_eq!(id % 2, 1);
        }
    }
}
