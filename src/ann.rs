//! Unified read-side trait over the index engines.

use crate::error::IndexError;

/// Statistics about an index.
#[derive(Debug, Clone)]
pub struct AnnStats {
    pub num_vectors: usize,
    pub dimension: usize,
    pub size_bytes: usize,
    pub algorithm: String,
}

/// Read-side surface shared by every engine.
///
/// Mutation is deliberately not unified: HNSW inserts online, the graph and
/// partition indexes batch-build or train first. `search` uses each engine's
/// configured default width (`ef_search`, `nprobe`).
pub trait AnnIndex {
    /// Search for the `k` nearest vectors with the engine's default
    /// parameters.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, IndexError>;

    /// Vector dimension, once fixed by the first insert or by training.
    fn dimension(&self) -> Option<usize>;

    /// Number of stored (live) vectors.
    fn num_vectors(&self) -> usize;

    /// Approximate resident size in bytes.
    fn size_bytes(&self) -> usize;

    /// Index statistics.
    fn stats(&self) -> AnnStats;
}

impl AnnIndex for crate::hnsw::HnswIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, IndexError> {
        self.search(query, k)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension()
    }

    fn num_vectors(&self) -> usize {
        self.live_count()
    }

    fn size_bytes(&self) -> usize {
        let d = self.dimension().unwrap_or(0);
        // Vectors dominate; edges add roughly 2m links per node
        self.len() * (d * std::mem::size_of::<f32>()
            + 2 * self.params().m * std::mem::size_of::<u32>())
    }

    fn stats(&self) -> AnnStats {
        AnnStats {
            num_vectors: self.live_count(),
            dimension: self.dimension().unwrap_or(0),
            size_bytes: AnnIndex::size_bytes(self),
            algorithm: "HNSW".to_string(),
        }
    }
}

impl AnnIndex for crate::nsg::NsgIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, IndexError> {
        self.search(query, k)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension()
    }

    fn num_vectors(&self) -> usize {
        self.len()
    }

    fn size_bytes(&self) -> usize {
        let d = self.dimension().unwrap_or(0);
        self.len() * (d * std::mem::size_of::<f32>()
            + self.params().r * std::mem::size_of::<u32>())
    }

    fn stats(&self) -> AnnStats {
        AnnStats {
            num_vectors: self.len(),
            dimension: self.dimension().unwrap_or(0),
            size_bytes: AnnIndex::size_bytes(self),
            algorithm: "NSG".to_string(),
        }
    }
}

impl AnnIndex for crate::ivf::IvfFlatIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, IndexError> {
        self.search(query, k)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension()
    }

    fn num_vectors(&self) -> usize {
        self.len()
    }

    fn size_bytes(&self) -> usize {
        let d = self.dimension().unwrap_or(0);
        (self.len() + self.params().nlist) * d * std::mem::size_of::<f32>()
    }

    fn stats(&self) -> AnnStats {
        AnnStats {
            num_vectors: self.len(),
            dimension: self.dimension().unwrap_or(0),
            size_bytes: AnnIndex::size_bytes(self),
            algorithm: "IVF-Flat".to_string(),
        }
    }
}

impl AnnIndex for crate::ivf::IvfPqIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, IndexError> {
        self.search(query, k)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension()
    }

    fn num_vectors(&self) -> usize {
        self.len()
    }

    fn size_bytes(&self) -> usize {
        let d = self.dimension().unwrap_or(0);
        self.len() * self.pq_params().m
            + self.params().nlist * d * std::mem::size_of::<f32>()
    }

    fn stats(&self) -> AnnStats {
        AnnStats {
            num_vectors: self.len(),
            dimension: self.dimension().unwrap_or(0),
            size_bytes: AnnIndex::size_bytes(self),
            algorithm: "IVF-PQ".to_string(),
        }
    }
}

impl AnnIndex for crate::ivf::ScannIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, IndexError> {
        self.search(query, k)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension()
    }

    fn num_vectors(&self) -> usize {
        self.len()
    }

    fn size_bytes(&self) -> usize {
        let d = self.dimension().unwrap_or(0);
        // Codes plus the raw vectors retained for rescoring
        self.len() * (self.params().m + d * std::mem::size_of::<f32>())
            + self.params().nlist * d * std::mem::size_of::<f32>()
    }

    fn stats(&self) -> AnnStats {
        AnnStats {
            num_vectors: self.len(),
            dimension: self.dimension().unwrap_or(0),
            size_bytes: AnnIndex::size_bytes(self),
            algorithm: "SCANN".to_string(),
        }
    }
}

impl AnnIndex for crate::flat::FlatIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, IndexError> {
        self.search(query, k)
    }

    fn dimension(&self) -> Option<usize> {
        self.dimension()
    }

    fn num_vectors(&self) -> usize {
        self.len()
    }

    fn size_bytes(&self) -> usize {
        self.len() * self.dimension().unwrap_or(0) * std::mem::size_of::<f32>()
    }

    fn stats(&self) -> AnnStats {
        AnnStats {
            num_vectors: self.len(),
            dimension: self.dimension().unwrap_or(0),
            size_bytes: AnnIndex::size_bytes(self),
            algorithm: "Flat".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Metric;

    #[test]
    fn test_trait_object_over_engines() {
        let mut flat = crate::flat::FlatIndex::new(Metric::L2);
        flat.add(0, vec![0.0, 0.0], None).unwrap();
        flat.add(1, vec![1.0, 0.0], None).unwrap();

        let hnsw =
            crate::hnsw::HnswIndex::new(Metric::L2, crate::hnsw::HnswParams::default()).unwrap();
        hnsw.insert(vec![0.0, 0.0], None).unwrap();
        hnsw.insert(vec![1.0, 0.0], None).unwrap();

        let engines: Vec<Box<dyn AnnIndex>> = vec![Box::new(flat), Box::new(hnsw)];
        for engine in &engines {
            let results = engine.search(&[0.1, 0.0], 1).unwrap();
            assert_eq!(results[0].0, 0);
            assert_eq!(engine.num_vectors(), 2);
            assert_eq!(engine.dimension(), Some(2));
            assert!(engine.size_bytes() > 0);
        }
    }
}
