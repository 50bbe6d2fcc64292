//! Neighbor selection and pruning for HNSW construction.

use std::sync::Arc;

use smallvec::SmallVec;

use crate::hnsw::graph::HnswNode;
use crate::metric::Metric;

/// Select up to `m` neighbors from score-sorted candidates, preferring
/// diversity: a candidate is accepted when it is closer to the query than to
/// every already-selected neighbor. Remaining slots are filled nearest-first.
pub(crate) fn select_diverse(
    nodes: &[Arc<HnswNode>],
    metric: Metric,
    candidates: &[(u32, f32)],
    m: usize,
) -> Vec<u32> {
    if candidates.is_empty() {
        return Vec::new();
    }

    let mut selected: Vec<u32> = Vec::with_capacity(m.min(candidates.len()));
    selected.push(candidates[0].0);

    for &(candidate_id, query_score) in candidates.iter().skip(1) {
        if selected.len() >= m {
            break;
        }

        let candidate_vec = nodes[candidate_id as usize].vector();
        let mut diverse = true;
        for &selected_id in &selected {
            let inter = metric.score(candidate_vec, nodes[selected_id as usize].vector());
            if query_score >= inter {
                diverse = false;
                break;
            }
        }

        if diverse {
            selected.push(candidate_id);
        }
    }

    // Fill remaining slots with the closest rejected candidates
    for &(candidate_id, _) in candidates.iter() {
        if selected.len() >= m {
            break;
        }
        if !selected.contains(&candidate_id) {
            selected.push(candidate_id);
        }
    }

    selected
}

/// Prune `node_id`'s layer-`layer` neighbor list down to `cap` entries.
///
/// Keeps the nearest neighbors, except that a neighbor whose only edge at this
/// layer is the one being cut is retained in place of the farthest removable
/// one. Every dropped edge is removed from both endpoints so the relation
/// stays symmetric.
pub(crate) fn prune_node(
    nodes: &[Arc<HnswNode>],
    metric: Metric,
    node_id: u32,
    layer: usize,
    cap: usize,
) {
    let node = &nodes[node_id as usize];
    let current = node.neighbors(layer);
    if current.len() <= cap {
        return;
    }

    let mut scored: Vec<(u32, f32)> = current
        .iter()
        .map(|&id| {
            (
                id,
                metric.score(node.vector(), nodes[id as usize].vector()),
            )
        })
        .collect();
    scored.sort_unstable_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });

    // A dropped neighbor must keep at least one edge at this layer; an edge to
    // this node that is the neighbor's last one cannot be cut.
    let is_last_edge = |id: u32| -> bool {
        let list = nodes[id as usize].neighbors(layer);
        list.len() == 1 && list[0] == node_id
    };

    let mut kept: Vec<u32> = Vec::with_capacity(cap);
    let mut removable: Vec<u32> = Vec::new();
    for &(id, _) in scored.iter() {
        if kept.len() < cap {
            kept.push(id);
        } else if is_last_edge(id) {
            // Swap out the farthest kept neighbor that can afford the cut;
            // if every kept neighbor is also on its last edge, exceed the cap
            // rather than orphan this one.
            if let Some(pos) = kept.iter().rposition(|&k| !is_last_edge(k)) {
                removable.push(kept[pos]);
                kept.remove(pos);
            }
            kept.push(id);
        } else {
            removable.push(id);
        }
    }

    let kept_list: SmallVec<[u32; 16]> = kept.iter().copied().collect();
    *node.neighbors_mut(layer) = kept_list;

    for dropped in removable {
        let mut list = nodes[dropped as usize].neighbors_mut(layer);
        if let Some(pos) = list.iter().position(|&id| id == node_id) {
            list.swap_remove(pos);
        }
    }
}
