//! IVF-PQ: inverted lists of product-quantized residuals.
//!
//! Each stored vector is coded as the PQ code of its residual against the
//! assigned centroid. At query time every probed list gets its own asymmetric
//! distance table, built from the query's residual against that list's
//! centroid, so scoring a candidate is `m` table lookups.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::IndexError;
use crate::filtering::{FilterPredicate, Metadata, MetadataStore};
use crate::ivf::{
    check_batch, check_ivf_params, check_search_args, rank_centroids, residual, IvfParams,
};
use crate::kmeans::KMeans;
use crate::metric::{sort_by_score, Metric};
use crate::quantization::{AsymmetricQuantizer, PqParams, ProductQuantizer, Quantizer};

/// One inverted-list entry: user id plus the residual PQ code.
#[derive(Clone, Debug)]
pub(crate) struct CodeEntry {
    pub(crate) id: u32,
    pub(crate) code: Vec<u8>,
}

/// Partition-and-probe index with product-quantized residual storage.
pub struct IvfPqIndex {
    pub(crate) metric: Metric,
    pub(crate) params: IvfParams,
    pub(crate) pq_params: PqParams,
    pub(crate) dimension: Option<usize>,
    pub(crate) centroids: Vec<Vec<f32>>,
    pub(crate) lists: Vec<Vec<CodeEntry>>,
    pub(crate) pq: Option<ProductQuantizer>,
    pub(crate) trained: bool,
    pub(crate) num_entries: usize,
    pub(crate) metadata: MetadataStore,
}

impl IvfPqIndex {
    /// Create an untrained index.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for out-of-range IVF or PQ parameters
    /// (bits outside `1..=8`, zero `m`, zero `nlist`).
    pub fn new(
        metric: Metric,
        params: IvfParams,
        pq_params: PqParams,
    ) -> Result<Self, IndexError> {
        check_ivf_params(&params)?;
        crate::quantization::check_code_params(pq_params.m, pq_params.bits)?;
        Ok(Self {
            metric,
            params,
            pq_params,
            dimension: None,
            centroids: Vec::new(),
            lists: Vec::new(),
            pq: None,
            trained: false,
            num_entries: 0,
            metadata: MetadataStore::new(),
        })
    }

    /// Train the coarse quantizer, then the embedded PQ on the training
    /// residuals. All-or-nothing; callable once.
    ///
    /// # Errors
    ///
    /// As [`IvfFlatIndex::train`](crate::ivf::IvfFlatIndex::train), plus
    /// `InvalidParameter` when the dimension is not divisible by the PQ's `m`
    /// and `InsufficientTrainingData` when fewer than `2^bits` vectors are
    /// supplied.
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

        // The PQ is constructed against the now-known dimension so parameter
        // problems surface before any clustering work happens.
        let mut pq = ProductQuantizer::new(dimension, self.metric, self.pq_params.clone())?;

        let mut km = KMeans::new(
            dimension,
            self.params.nlist,
            self.params.train_iter,
            self.metric,
            false,
        )?;
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        km.fit(&flat, vectors.len(), &mut rng)?;

        let residuals: Vec<Vec<f32>> = vectors
            .iter()
            .map(|v| {
                let (list, _) = km.assign(v);
                residual(v, &km.centroids()[list])
            })
            .collect();
        pq.train(&residuals)?;

        self.centroids = km.into_centroids();
        self.lists = vec![Vec::new(); self.params.nlist];
        self.pq = Some(pq);
        self.dimension = Some(dimension);
        self.trained = true;
        Ok(())
    }

    /// Append a batch of vectors: assign, compute the residual, code it.
    ///
    /// Earlier entries stay when a later vector fails; the error names the
    /// offending batch position.
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
        let pq = self.pq.as_ref().expect("trained");

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
            let list = rank_centroids(self.metric, v, &self.centroids)[0].0;
            let code = pq
                .encode(&residual(v, &self.centroids[list]))
                .map_err(|e| IndexError::BatchItem {
                    index: i,
                    source: Box::new(e),
                })?;
            self.lists[list].push(CodeEntry { id, code });
            self.num_entries += 1;
            if let Some(metadata) = metadata {
                self.metadata.insert(id, metadata[i].clone());
            }
        }
        Ok(())
    }

    /// Search with the engine's default probe count.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, IndexError> {
        self.search_with_nprobe(query, k, self.params.nprobe.min(self.params.nlist))
    }

    /// Search with an explicit probe count.
    ///
    /// For each probed list an asymmetric table is built from the query's
    /// residual against that list's centroid; candidates are scored through
    /// it and merged across lists.
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
        let pq = self.pq.as_ref().expect("trained");
        if query.len() != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let ranked = rank_centroids(self.metric, query, &self.centroids);
        let mut candidates: Vec<(u32, f32)> = Vec::new();
        for &(list, _) in ranked.iter().take(nprobe) {
            if self.lists[list].is_empty() {
                continue;
            }
            let table = pq.build_table(&residual(query, &self.centroids[list]))?;
            for entry in &self.lists[list] {
                if let Some(filter) = filter {
                    if !self.metadata.matches(entry.id, filter) {
                        continue;
                    }
                }
                candidates.push((entry.id, table.distance(&entry.code)?));
            }
        }

        sort_by_score(&mut candidates);
        candidates.truncate(k);
        Ok(candidates)
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

    /// Whether the index has been trained.
    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Metric the index ranks under.
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// IVF parameters.
    pub fn params(&self) -> &IvfParams {
        &self.params
    }

    /// Embedded PQ parameters.
    pub fn pq_params(&self) -> &PqParams {
        &self.pq_params
    }

    /// Compression ratio of the embedded quantizer.
    ///
    /// # Errors
    ///
    /// Returns `NotTrained` before training.
    pub fn compression_ratio(&self) -> Result<f32, IndexError> {
        self.pq
            .as_ref()
            .map(|pq| pq.compression_ratio())
            .ok_or(IndexError::NotTrained)
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        metric: Metric,
        params: IvfParams,
        pq_params: PqParams,
        dimension: usize,
        centroids: Vec<Vec<f32>>,
        lists: Vec<Vec<CodeEntry>>,
        pq: ProductQuantizer,
        metadata: MetadataStore,
    ) -> Result<Self, IndexError> {
        let num_entries = lists.iter().map(|l| l.len()).sum();
        let mut index = Self::new(metric, params, pq_params)?;
        index.dimension = Some(dimension);
        index.centroids = centroids;
        index.lists = lists;
        index.pq = Some(pq);
        index.trained = true;
        index.num_entries = num_entries;
        index.metadata = metadata;
        Ok(index)
    }
}
