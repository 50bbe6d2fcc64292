//! Exhaustive-scan baseline index.
//!
//! Scores the query against every stored vector. O(n·d) per query, exact by
//! construction; the approximate indexes are measured against it in the
//! recall tests and it is the right choice below a few thousand vectors.

use crate::error::IndexError;
use crate::filtering::{FilterPredicate, Metadata, MetadataStore};
use crate::metric::{sort_by_score, Metric};

/// Brute-force index over raw vectors.
pub struct FlatIndex {
    metric: Metric,
    dimension: Option<usize>,
    entries: Vec<(u32, Vec<f32>)>,
    metadata: MetadataStore,
}

impl FlatIndex {
    /// Create an empty index. The dimension is fixed by the first vector.
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            dimension: None,
            entries: Vec::new(),
            metadata: MetadataStore::new(),
        }
    }

    /// Store a vector under a caller-chosen id.
    ///
    /// # Errors
    ///
    /// Returns `EmptyInput` for a zero-length vector and `DimensionMismatch`
    /// on disagreement with the first vector.
    pub fn add(
        &mut self,
        id: u32,
        vector: Vec<f32>,
        metadata: Option<Metadata>,
    ) -> Result<(), IndexError> {
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
        self.entries.push((id, vector));
        if let Some(metadata) = metadata {
            self.metadata.insert(id, metadata);
        }
        Ok(())
    }

    /// Exact k-nearest search over all stored vectors.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` when `k` is zero and `DimensionMismatch`
    /// for a mis-sized query.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, IndexError> {
        self.search_inner(query, k, None)
    }

    /// Exact filtered search.
    pub fn search_with_filter(
        &self,
        query: &[f32],
        k: usize,
        filter: &FilterPredicate,
    ) -> Result<Vec<(u32, f32)>, IndexError> {
        self.search_inner(query, k, Some(filter))
    }

    fn search_inner(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&FilterPredicate>,
    ) -> Result<Vec<(u32, f32)>, IndexError> {
        if k == 0 {
            return Err(IndexError::invalid("k must be greater than 0"));
        }
        if let Some(d) = self.dimension {
            if query.len() != d {
                return Err(IndexError::DimensionMismatch {
                    expected: d,
                    actual: query.len(),
                });
            }
        }

        let mut results: Vec<(u32, f32)> = self
            .entries
            .iter()
            .filter(|(id, _)| filter.map_or(true, |f| self.metadata.matches(*id, f)))
            .map(|(id, v)| (*id, self.metric.finalize(self.metric.score(query, v))))
            .collect();
        sort_by_score(&mut results);
        results.truncate(k);
        Ok(results)
    }

    /// Stored vector count.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no vector is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Vector dimension, once fixed.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    /// Metric the index ranks under.
    pub fn metric(&self) -> Metric {
        self.metric
    }
}
