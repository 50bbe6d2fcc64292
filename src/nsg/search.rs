//! Best-first traversal over the built NSG.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};

use crate::error::IndexError;
use crate::filtering::FilterPredicate;
use crate::metric::sort_by_score;
use crate::nsg::graph::NsgIndex;

/// Candidate ordered by `(score, id)`.
#[derive(Clone, Copy, PartialEq)]
struct Candidate {
    score: f32,
    id: u32,
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.score
            .partial_cmp(&other.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl NsgIndex {
    /// Search for the `k` nearest vectors.
    ///
    /// Returns `(id, distance)` pairs sorted ascending by distance, ties by
    /// id.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotBuilt` before build, `InvalidParameter` when `k` is
    /// zero, and `DimensionMismatch` for a mis-sized query.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, IndexError> {
        self.traverse(query, k, None)
    }

    /// Search restricted to entries whose metadata satisfies `filter`.
    ///
    /// Only admission to the result set is gated; traversal crosses
    /// non-matching nodes so connectivity is preserved.
    pub fn search_with_filter(
        &self,
        query: &[f32],
        k: usize,
        filter: &FilterPredicate,
    ) -> Result<Vec<(u32, f32)>, IndexError> {
        self.traverse(query, k, Some(filter))
    }

    fn traverse(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&FilterPredicate>,
    ) -> Result<Vec<(u32, f32)>, IndexError> {
        if k == 0 {
            return Err(IndexError::invalid("k must be greater than 0"));
        }
        self.check_query(query)?;

        let visit_cap = self.params.c.max(20 * k);

        let mut candidates: BinaryHeap<Reverse<Candidate>> = BinaryHeap::new();
        let mut results: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
        let mut visited: HashSet<u32> = HashSet::with_capacity(visit_cap);

        let entry = self.navigating;
        let entry_score = self.metric.score(query, self.get_vector(entry as usize));
        candidates.push(Reverse(Candidate {
            score: entry_score,
            id: entry,
        }));
        visited.insert(entry);
        let admit = |c: Candidate, results: &mut BinaryHeap<Candidate>| {
            if filter.map_or(true, |f| self.metadata.matches(c.id, f)) {
                results.push(c);
                if results.len() > k {
                    results.pop();
                }
            }
        };
        admit(
            Candidate {
                score: entry_score,
                id: entry,
            },
            &mut results,
        );

        let mut expanded = 0usize;
        while let Some(Reverse(current)) = candidates.pop() {
            if results.len() >= k {
                let worst = results.peek().map(|c| c.score).unwrap_or(f32::INFINITY);
                if current.score > worst {
                    break;
                }
            }
            if expanded >= visit_cap {
                break;
            }
            expanded += 1;

            for &neighbor_id in self.neighbors[current.id as usize].iter() {
                if !visited.insert(neighbor_id) {
                    continue;
                }
                let score = self.metric.score(query, self.get_vector(neighbor_id as usize));
                candidates.push(Reverse(Candidate {
                    score,
                    id: neighbor_id,
                }));
                admit(
                    Candidate {
                        score,
                        id: neighbor_id,
                    },
                    &mut results,
                );
            }
        }

        let mut out: Vec<(u32, f32)> = results
            .into_vec()
            .into_iter()
            .map(|c| (c.id, self.metric.finalize(c.score)))
            .collect();
        sort_by_score(&mut out);
        Ok(out)
    }

    /// Radius search: every node within `radius` of the query, ascending.
    ///
    /// Traversal starts at the navigating node and explores any neighbor
    /// within `2 * radius`, a loose triangle-inequality bound that keeps the
    /// frontier from collapsing at cluster borders.
    ///
    /// # Errors
    ///
    /// Returns `IndexNotBuilt` before build, `InvalidParameter` for a
    /// non-finite or negative radius, and `DimensionMismatch` for a mis-sized
    /// query.
    pub fn range_search(&self, query: &[f32], radius: f32) -> Result<Vec<(u32, f32)>, IndexError> {
        if !radius.is_finite() || radius < 0.0 {
            return Err(IndexError::invalid("radius must be finite and non-negative"));
        }
        self.check_query(query)?;

        let mut results: Vec<(u32, f32)> = Vec::new();
        let mut visited: HashSet<u32> = HashSet::new();
        let mut frontier: Vec<u32> = vec![self.navigating];
        visited.insert(self.navigating);

        while let Some(id) = frontier.pop() {
            let distance = self
                .metric
                .finalize(self.metric.score(query, self.get_vector(id as usize)));
            if distance <= radius {
                results.push((id, distance));
            }
            if distance <= 2.0 * radius {
                for &neighbor_id in self.neighbors[id as usize].iter() {
                    if visited.insert(neighbor_id) {
                        frontier.push(neighbor_id);
                    }
                }
            }
        }

        sort_by_score(&mut results);
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use crate::metric::Metric;
    use crate::nsg::{NsgIndex, NsgParams};

    fn line_index(n: usize) -> NsgIndex {
        let mut index = NsgIndex::new(
            Metric::L2,
            NsgParams { r: 4, l: 8, c: 64 },
        )
        .unwrap();
        for i in 0..n {
            index.add_vector(vec![i as f32], None).unwrap();
        }
        index.build().unwrap();
        index
    }

    #[test]
    fn test_knn_on_line() {
        let index = line_index(20);
        let results = index.search(&[7.2], 3).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].0, 7);
        assert!((results[0].1 - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_results_sorted_with_id_ties() {
        let mut index = NsgIndex::new(
            Metric::L2,
            NsgParams { r: 4, l: 8, c: 64 },
        )
        .unwrap();
        // Two coincident points: equal distance, smaller id first
        index.add_vector(vec![1.0, 0.0], None).unwrap();
        index.add_vector(vec![1.0, 0.0], None).unwrap();
        index.add_vector(vec![0.0, 0.0], None).unwrap();
        index.build().unwrap();

        let results = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(results[0].0, 0);
        assert_eq!(results[1].0, 1);
        assert_eq!(results[2].0, 2);
    }

    #[test]
    fn test_k_larger_than_dataset() {
        let index = line_index(5);
        let results = index.search(&[0.0], 50).unwrap();
        assert_eq!(results.len(), 5);
    }

    #[test]
    fn test_range_search_zero_radius() {
        let index = line_index(10);
        let results = index.range_search(&[4.0], 0.0).unwrap();
        // Radius 0 from the navigating region still finds the exact point
        assert_eq!(results, vec![(4, 0.0)]);
    }

    #[test]
    fn test_range_search_negative_radius_rejected() {
        let index = line_index(5);
        assert!(index.range_search(&[0.0], -1.0).is_err());
    }

    #[test]
    fn test_filtered_search_only_matching() {
        use crate::filtering::{FilterPredicate, Metadata};

        let mut index = NsgIndex::new(
            Metric::L2,
            NsgParams { r: 4, l: 16, c: 64 },
        )
        .unwrap();
        for i in 0..20u32 {
            let mut metadata = Metadata::new();
            metadata.insert("parity".to_string(), i % 2);
            index.add_vector(vec![i as f32], Some(metadata)).unwrap();
        }
        index.build().unwrap();

        let results = index
            .search_with_filter(&[9.0], 5, &FilterPredicate::equals("parity", 0))
            .unwrap();
        assert!(!results.is_empty());
        for (id, _) in results {
            assert_eq!(id % 2, 0);
        }
    }
}
