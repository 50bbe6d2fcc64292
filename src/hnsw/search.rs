//! Layer-local search for the HNSW graph.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashSet};
use std::sync::Arc;

use crate::hnsw::graph::HnswNode;
use crate::metric::Metric;

/// Candidate node during search, ordered by `(score, id)` so equal distances
/// resolve to the smaller id deterministically.
#[derive(Clone, Copy, PartialEq)]
pub(crate) struct Candidate {
    pub(crate) score: f32,
    pub(crate) id: u32,
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

/// Beam search within one layer.
///
/// Maintains a min-heap of unexpanded candidates and a bounded max-heap of the
/// best `ef` nodes seen; stops when the nearest unexpanded candidate is
/// farther than the worst retained result. Returns `(id, score)` pairs sorted
/// ascending by `(score, id)`. Tombstoned nodes are traversed and returned;
/// the caller filters them at emission.
pub(crate) fn search_layer(
    nodes: &[Arc<HnswNode>],
    metric: Metric,
    query: &[f32],
    entries: &[u32],
    ef: usize,
    layer: usize,
) -> Vec<(u32, f32)> {
    let mut candidates: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(ef * 2);
    let mut results: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef + 1);
    let mut visited: HashSet<u32> = HashSet::with_capacity(ef * 2);

    for &entry in entries {
        if !visited.insert(entry) {
            continue;
        }
        let score = metric.score(query, nodes[entry as usize].vector());
        candidates.push(Reverse(Candidate { score, id: entry }));
        results.push(Candidate { score, id: entry });
        if results.len() > ef {
            results.pop();
        }
    }

    while let Some(Reverse(current)) = candidates.pop() {
        let worst = results.peek().map(|c| c.score).unwrap_or(f32::INFINITY);
        if results.len() >= ef && current.score > worst {
            break;
        }

        let neighbors = nodes[current.id as usize].neighbors(layer);
        for &neighbor_id in neighbors.iter() {
            if !visited.insert(neighbor_id) {
                continue;
            }
            let score = metric.score(query, nodes[neighbor_id as usize].vector());
            let worst = results.peek().map(|c| c.score).unwrap_or(f32::INFINITY);
            if results.len() < ef || score < worst {
                candidates.push(Reverse(Candidate {
                    score,
                    id: neighbor_id,
                }));
                results.push(Candidate {
                    score,
                    id: neighbor_id,
                });
                if results.len() > ef {
                    results.pop();
                }
            }
        }
    }

    let mut sorted: Vec<Candidate> = results.into_vec();
    sorted.sort_unstable();
    sorted.into_iter().map(|c| (c.id, c.score)).collect()
}

/// Greedy descent step: from `entry`, repeatedly move to the strictly closest
/// layer-`layer` neighbor until no neighbor improves. Returns the local
/// minimum and its score.
pub(crate) fn greedy_step(
    nodes: &[Arc<HnswNode>],
    metric: Metric,
    query: &[f32],
    entry: u32,
    layer: usize,
) -> (u32, f32) {
    let mut current = entry;
    let mut current_score = metric.score(query, nodes[current as usize].vector());

    let mut changed = true;
    while changed {
        changed = false;
        let neighbors = nodes[current as usize].neighbors(layer);
        for &neighbor_id in neighbors.iter() {
            let score = metric.score(query, nodes[neighbor_id as usize].vector());
            if score < current_score {
                current_score = score;
                current = neighbor_id;
                changed = true;
            }
        }
    }

    (current, current_score)
}
