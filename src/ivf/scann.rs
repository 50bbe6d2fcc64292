//! Learned-partition IVF over anisotropic quantization.
//!
//! Three-stage search: partition (optionally spherical k-means), quantized
//! scoring (anisotropic codes of residuals through asymmetric tables), and an
//! optional exact rescoring pass over the stored raw vectors.
//!
//! When `spherical` is set, vectors and queries are normalized once on entry
//! and centroids are stored unit-length, so partition assignment reduces to a
//! dot product.

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::IndexError;
use crate::filtering::{FilterPredicate, Metadata, MetadataStore};
use crate::ivf::{check_batch, check_search_args, rank_centroids, residual};
use crate::kmeans::{normalize, KMeans};
use crate::metric::{sort_by_score, Metric};
use crate::quantization::{AnisotropicQuantizer, AsymmetricQuantizer, Quantizer};

/// Learned-partition parameters.
#[derive(Clone, Debug)]
pub struct ScannParams {
    /// Number of partitions.
    pub nlist: usize,

    /// Default number of partitions probed per search.
    pub nprobe: usize,

    /// Subspace count for the anisotropic quantizer; need not divide the
    /// dimension.
    pub m: usize,

    /// Bits per code, `1..=8`.
    pub bits: u8,

    /// Use spherical k-means (unit-normalized data and centroids).
    pub spherical: bool,

    /// Candidate pool handed to the rescoring stage.
    pub reorder_top_k: usize,

    /// Rescore the candidate pool with exact distances before the final cut.
    pub use_rescoring: bool,

    /// Lloyd iteration cap for partition training.
    pub train_iter: usize,

    /// Seed for partition and codebook k-means.
    pub seed: u64,
}

impl Default for ScannParams {
    fn default() -> Self {
        Self {
            nlist: 256,
            nprobe: 32,
            m: 16,
            bits: 8,
            spherical: true,
            reorder_top_k: 100,
            use_rescoring: true,
            train_iter: 25,
            seed: 0,
        }
    }
}

/// One partition entry: id, residual code, and the stored vector for
/// rescoring.
#[derive(Clone, Debug)]
pub(crate) struct ScannEntry {
    pub(crate) id: u32,
    pub(crate) code: Vec<u8>,
    pub(crate) vector: Vec<f32>,
}

/// Learned-partition index with anisotropic residual quantization.
pub struct ScannIndex {
    pub(crate) metric: Metric,
    pub(crate) params: ScannParams,
    pub(crate) dimension: Option<usize>,
    pub(crate) centroids: Vec<Vec<f32>>,
    pub(crate) lists: Vec<Vec<ScannEntry>>,
    pub(crate) aq: Option<AnisotropicQuantizer>,
    pub(crate) trained: bool,
    pub(crate) num_entries: usize,
    pub(crate) metadata: MetadataStore,
}

impl ScannIndex {
    /// Create an untrained index.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for out-of-range parameters.
    pub fn new(metric: Metric, params: ScannParams) -> Result<Self, IndexError> {
        if params.nlist == 0 {
            return Err(IndexError::invalid("nlist must be greater than 0"));
        }
        if params.nprobe == 0 || params.nprobe > params.nlist {
            return Err(IndexError::invalid(format!(
                "nprobe {} must be in 1..={}",
                params.nprobe, params.nlist
            )));
        }
        crate::quantization::check_code_params(params.m, params.bits)?;
        if params.train_iter == 0 {
            return Err(IndexError::invalid("train_iter must be greater than 0"));
        }
        if params.use_rescoring && params.reorder_top_k == 0 {
            return Err(IndexError::invalid(
                "reorder_top_k must be greater than 0 when rescoring",
            ));
        }

        Ok(Self {
            metric,
            params,
            dimension: None,
            centroids: Vec::new(),
            lists: Vec::new(),
            aq: None,
            trained: false,
            num_entries: 0,
            metadata: MetadataStore::new(),
        })
    }

    /// Train the partitioner and the residual quantizer. All-or-nothing;
    /// callable once.
    ///
    /// # Errors
    ///
    /// Returns `AlreadyBuilt` when already trained, `EmptyInput` for an empty
    /// set, `InsufficientTrainingData` when `|V| < nlist` or `< 2^bits`, and
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

        let mut aq = AnisotropicQuantizer::new(
            dimension,
            self.metric,
            self.params.m,
            self.params.bits,
            self.params.train_iter,
            self.params.seed,
        )?;

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
            self.params.spherical,
        )?;
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        km.fit(&flat, vectors.len(), &mut rng)?;

        // Residuals are taken in the same space the assignment ran in.
        let residuals: Vec<Vec<f32>> = vectors
            .iter()
            .map(|v| {
                let prepared = self.prepare(v);
                let (list, _) = km.assign(&prepared);
                residual(&prepared, &km.centroids()[list])
            })
            .collect();
        aq.train(&residuals)?;

        self.centroids = km.into_centroids();
        self.lists = vec![Vec::new(); self.params.nlist];
        self.aq = Some(aq);
        self.dimension = Some(dimension);
        self.trained = true;
        Ok(())
    }

    /// Append a batch of vectors: normalize (spherical), assign, code the
    /// residual, and keep the prepared vector for rescoring.
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
        let aq = self.aq.as_ref().expect("trained");

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
            let prepared = self.prepare(v);
            let list = rank_centroids(self.assignment_metric(), &prepared, &self.centroids)[0].0;
            let code = aq
                .encode(&residual(&prepared, &self.centroids[list]))
                .map_err(|e| IndexError::BatchItem {
                    index: i,
                    source: Box::new(e),
                })?;
            self.lists[list].push(ScannEntry {
                id,
                code,
                vector: prepared,
            });
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
    /// Candidates are scored under the anisotropic asymmetric distance; when
    /// rescoring is enabled, the best `max(reorder_top_k, k)` are re-ranked by
    /// exact distance against the stored vectors before the final cut.
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
        let aq = self.aq.as_ref().expect("trained");
        if query.len() != dimension {
            return Err(IndexError::DimensionMismatch {
                expected: dimension,
                actual: query.len(),
            });
        }

        let prepared = self.prepare(query);
        let ranked = rank_centroids(self.assignment_metric(), &prepared, &self.centroids);

        let mut candidates: Vec<(u32, f32, usize, usize)> = Vec::new();
        for &(list, _) in ranked.iter().take(nprobe) {
            if self.lists[list].is_empty() {
                continue;
            }
            let table = aq.build_table(&residual(&prepared, &self.centroids[list]))?;
            for (slot, entry) in self.lists[list].iter().enumerate() {
                if let Some(filter) = filter {
                    if !self.metadata.matches(entry.id, filter) {
                        continue;
                    }
                }
                candidates.push((entry.id, table.distance(&entry.code)?, list, slot));
            }
        }

        candidates.sort_unstable_by(|a, b| {
            a.1.partial_cmp(&b.1)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.0.cmp(&b.0))
        });

        let mut results: Vec<(u32, f32)> = if self.params.use_rescoring {
            let pool = self.params.reorder_top_k.max(k);
            candidates
                .into_iter()
                .take(pool)
                .map(|(id, _, list, slot)| {
                    let stored = &self.lists[list][slot].vector;
                    let exact = self.metric.finalize(self.metric.score(&prepared, stored));
                    (id, exact)
                })
                .collect()
        } else {
            candidates
                .into_iter()
                .map(|(id, approx, _, _)| (id, approx))
                .collect()
        };

        sort_by_score(&mut results);
        results.truncate(k);
        Ok(results)
    }

    /// Unit-normalize under spherical partitioning, otherwise pass through.
    fn prepare(&self, v: &[f32]) -> Vec<f32> {
        let mut out = v.to_vec();
        if self.params.spherical {
            normalize(&mut out);
        }
        out
    }

    /// Partition assignment ranks by dot product when spherical.
    fn assignment_metric(&self) -> Metric {
        if self.params.spherical {
            Metric::NegDotProduct
        } else {
            self.metric
        }
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

    /// Construction parameters.
    pub fn params(&self) -> &ScannParams {
        &self.params
    }

    /// Compression ratio of the embedded quantizer (codes only; the stored
    /// rescoring vectors are extra).
    ///
    /// # Errors
    ///
    /// Returns `NotTrained` before training.
    pub fn compression_ratio(&self) -> Result<f32, IndexError> {
        self.aq
            .as_ref()
            .map(|aq| aq.compression_ratio())
            .ok_or(IndexError::NotTrained)
    }

    pub(crate) fn from_parts(
        metric: Metric,
        params: ScannParams,
        dimension: usize,
        centroids: Vec<Vec<f32>>,
        lists: Vec<Vec<ScannEntry>>,
        aq: AnisotropicQuantizer,
        metadata: MetadataStore,
    ) -> Result<Self, IndexError> {
        let num_entries = lists.iter().map(|l| l.len()).sum();
        let mut index = Self::new(metric, params)?;
        index.dimension = Some(dimension);
        index.centroids = centroids;
        index.lists = lists;
        index.aq = Some(aq);
        index.trained = true;
        index.num_entries = num_entries;
        index.metadata = metadata;
        Ok(index)
    }
}
