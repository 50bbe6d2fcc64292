//! HNSW graph structure and the online index operations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallvec::SmallVec;

use crate::error::IndexError;
use crate::filtering::{FilterPredicate, Metadata, MetadataStore};
use crate::hnsw::search::{greedy_step, search_layer};
use crate::hnsw::select::{prune_node, select_diverse};
use crate::metric::{sort_by_score, Metric};

/// Hard cap on the layer a node can be born at.
pub(crate) const MAX_LAYER: usize = 16;

/// HNSW parameters controlling graph structure and search behavior.
#[derive(Clone, Debug)]
pub struct HnswParams {
    /// Maximum connections per node on upper layers; the base layer allows `2m`.
    pub m: usize,

    /// Beam width during construction (typically 200).
    pub ef_construction: usize,

    /// Default beam width during search (typically 50-200).
    pub ef_search: usize,

    /// Layer assignment multiplier (typically 1/ln(2) ≈ 1.44).
    /// Higher values place more nodes on upper layers.
    pub level_mult: f64,

    /// Seed for the layer-assignment RNG.
    pub seed: u64,
}

impl Default for HnswParams {
    fn default() -> Self {
        Self {
            m: 16,
            ef_construction: 200,
            ef_search: 50,
            level_mult: 1.0 / 2.0_f64.ln(),
            seed: 0,
        }
    }
}

/// One graph node: its vector, tombstone flag, and per-layer neighbor lists.
///
/// Neighbor lists are individually locked; readers get copies so no lock is
/// held during traversal.
pub(crate) struct HnswNode {
    vector: Vec<f32>,
    deleted: AtomicBool,
    layers: Vec<RwLock<SmallVec<[u32; 16]>>>,
}

impl HnswNode {
    pub(crate) fn new(vector: Vec<f32>, level: usize) -> Self {
        Self {
            vector,
            deleted: AtomicBool::new(false),
            layers: (0..=level).map(|_| RwLock::new(SmallVec::new())).collect(),
        }
    }

    pub(crate) fn vector(&self) -> &[f32] {
        &self.vector
    }

    /// Highest layer this node participates in.
    pub(crate) fn level(&self) -> usize {
        self.layers.len() - 1
    }

    pub(crate) fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    pub(crate) fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }

    /// Copy of the layer-`layer` neighbor list; empty when the node does not
    /// participate in that layer.
    pub(crate) fn neighbors(&self, layer: usize) -> SmallVec<[u32; 16]> {
        match self.layers.get(layer) {
            Some(list) => list.read().expect("neighbor lock poisoned").clone(),
            None => SmallVec::new(),
        }
    }

    pub(crate) fn neighbors_mut(&self, layer: usize) -> RwLockWriteGuard<'_, SmallVec<[u32; 16]>> {
        self.layers[layer].write().expect("neighbor lock poisoned")
    }
}

/// Mutable engine state behind the top-level lock.
pub(crate) struct HnswState {
    pub(crate) nodes: Vec<Arc<HnswNode>>,
    pub(crate) entry_point: Option<u32>,
    pub(crate) dimension: Option<usize>,
    pub(crate) live_count: usize,
    pub(crate) metadata: MetadataStore,
    rng: StdRng,
}

/// HNSW index with online insert, delete, and search.
///
/// Searches take the top-level lock in shared mode; `insert` holds it
/// exclusively only while allocating the node and promoting the entry point,
/// and links neighbors under the shared mode with per-node locks.
pub struct HnswIndex {
    metric: Metric,
    params: HnswParams,
    state: RwLock<HnswState>,
}

impl HnswIndex {
    /// Create an empty index. The dimension is fixed by the first insert.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for a zero `m`, `ef_construction`,
    /// `ef_search`, or non-positive `level_mult`.
    pub fn new(metric: Metric, params: HnswParams) -> Result<Self, IndexError> {
        if params.m == 0 {
            return Err(IndexError::invalid("m must be greater than 0"));
        }
        if params.ef_construction == 0 || params.ef_search == 0 {
            return Err(IndexError::invalid(
                "ef_construction and ef_search must be greater than 0",
            ));
        }
        if !params.level_mult.is_finite() || params.level_mult <= 0.0 {
            return Err(IndexError::invalid("level_mult must be finite and positive"));
        }

        let rng = StdRng::seed_from_u64(params.seed);
        Ok(Self {
            metric,
            params,
            state: RwLock::new(HnswState {
                nodes: Vec::new(),
                entry_point: None,
                dimension: None,
                live_count: 0,
                metadata: MetadataStore::new(),
                rng,
            }),
        })
    }

    /// Maximum connections at `layer`: `2m` on the base layer, `m` above.
    #[inline]
    pub(crate) fn max_connections(&self, layer: usize) -> usize {
        if layer == 0 {
            self.params.m * 2
        } else {
            self.params.m
        }
    }

    /// Insert a vector, returning its assigned id.
    ///
    /// The first insert fixes the engine dimension. Ids are dense and never
    /// reused.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` when the vector length differs from the
    /// engine dimension and `EmptyInput` for a zero-length vector.
    pub fn insert(&self, vector: Vec<f32>, metadata: Option<Metadata>) -> Result<u32, IndexError> {
        if vector.is_empty() {
            return Err(IndexError::EmptyInput);
        }

        // Allocation and layer draw happen under the exclusive lock.
        let (id, level, entry) = {
            let mut state = self.write_state();
            match state.dimension {
                Some(d) if d != vector.len() => {
                    return Err(IndexError::DimensionMismatch {
                        expected: d,
                        actual: vector.len(),
                    });
                }
                Some(_) => {}
                None => state.dimension = Some(vector.len()),
            }

            let id = state.nodes.len() as u32;
            let level = draw_level(&mut state.rng, self.params.level_mult);
            state.nodes.push(Arc::new(HnswNode::new(vector, level)));
            state.live_count += 1;
            if let Some(metadata) = metadata {
                state.metadata.insert(id, metadata);
            }

            let entry = state.entry_point;
            if entry.is_none() {
                state.entry_point = Some(id);
                return Ok(id);
            }
            (id, level, entry)
        };

        // Linking proceeds under the shared lock; neighbor lists are guarded
        // per node.
        {
            let state = self.read_state();
            let entry = match state.entry_point.or(entry) {
                Some(e) => e,
                None => return Ok(id),
            };
            if entry != id {
                self.link_node(&state, id, level, entry);
            }
        }

        // Promote to entry point after linking so searches that land on the
        // new node can already leave it.
        {
            let mut state = self.write_state();
            let current_top = state
                .entry_point
                .map(|e| state.nodes[e as usize].level())
                .unwrap_or(0);
            if state.entry_point.is_none() || level > current_top {
                state.entry_point = Some(id);
            }
        }

        Ok(id)
    }

    /// Connect a freshly allocated node into every layer it participates in.
    fn link_node(&self, state: &HnswState, id: u32, level: usize, entry: u32) {
        let nodes = &state.nodes;
        let query = nodes[id as usize].vector().to_vec();
        let entry_level = nodes[entry as usize].level();

        // Greedy descent through the layers above the new node's level.
        let mut current = entry;
        if entry_level > level {
            for layer in ((level + 1)..=entry_level).rev() {
                let (closest, _) = greedy_step(nodes, self.metric, &query, current, layer);
                current = closest;
            }
        }

        // Beam search and link on each shared layer, top down. All edges of a
        // layer are installed before any pruning happens on that layer.
        for layer in (0..=level.min(entry_level)).rev() {
            let candidates = search_layer(
                nodes,
                self.metric,
                &query,
                &[current],
                self.params.ef_construction,
                layer,
            );
            if candidates.is_empty() {
                continue;
            }
            current = candidates[0].0;

            let cap = self.max_connections(layer);
            let selected = select_diverse(nodes, self.metric, &candidates, cap);

            for &neighbor_id in &selected {
                let mut own = nodes[id as usize].neighbors_mut(layer);
                if !own.contains(&neighbor_id) {
                    own.push(neighbor_id);
                }
                drop(own);

                let mut theirs = nodes[neighbor_id as usize].neighbors_mut(layer);
                if !theirs.contains(&id) {
                    theirs.push(id);
                }
            }

            for &neighbor_id in &selected {
                prune_node(nodes, self.metric, neighbor_id, layer, cap);
            }
            prune_node(nodes, self.metric, id, layer, cap);
        }
    }

    /// Search for the `k` nearest live vectors with the default beam width.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(u32, f32)>, IndexError> {
        self.search_with_ef(query, k, self.params.ef_search)
    }

    /// Search with an explicit beam width (`ef` is widened to `k` if smaller).
    ///
    /// Returns `(id, distance)` pairs sorted ascending by distance, ties by
    /// id. Tombstoned nodes are traversed but never returned.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` when `k` is zero and `DimensionMismatch` for
    /// a mis-sized query.
    pub fn search_with_ef(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
    ) -> Result<Vec<(u32, f32)>, IndexError> {
        self.search_inner(query, k, ef, None)
    }

    /// Search restricted to entries whose metadata satisfies `filter`.
    ///
    /// The predicate gates emission only; traversal ignores it so the graph
    /// stays navigable through non-matching regions.
    pub fn search_with_filter(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        filter: &FilterPredicate,
    ) -> Result<Vec<(u32, f32)>, IndexError> {
        self.search_inner(query, k, ef, Some(filter))
    }

    fn search_inner(
        &self,
        query: &[f32],
        k: usize,
        ef: usize,
        filter: Option<&FilterPredicate>,
    ) -> Result<Vec<(u32, f32)>, IndexError> {
        if k == 0 {
            return Err(IndexError::invalid("k must be greater than 0"));
        }

        let state = self.read_state();
        if let Some(d) = state.dimension {
            if query.len() != d {
                return Err(IndexError::DimensionMismatch {
                    expected: d,
                    actual: query.len(),
                });
            }
        }
        if state.live_count == 0 {
            return Ok(Vec::new());
        }

        let entry = match state.entry_point {
            Some(e) => e,
            None => return Ok(Vec::new()),
        };
        if state.nodes[entry as usize].is_deleted() && state.live_count > 0 {
            return Err(IndexError::DeletedEntryPoint);
        }

        let nodes = &state.nodes;
        let entry_level = nodes[entry as usize].level();

        let mut current = entry;
        for layer in (1..=entry_level).rev() {
            let (closest, _) = greedy_step(nodes, self.metric, query, current, layer);
            current = closest;
        }

        let width = ef.max(k);
        let found = search_layer(nodes, self.metric, query, &[current], width, 0);

        let mut results: Vec<(u32, f32)> = found
            .into_iter()
            .filter(|&(id, _)| !nodes[id as usize].is_deleted())
            .filter(|&(id, _)| filter.map_or(true, |f| state.metadata.matches(id, f)))
            .map(|(id, score)| (id, self.metric.finalize(score)))
            .collect();
        sort_by_score(&mut results);
        results.truncate(k);
        Ok(results)
    }

    /// Tombstone a node. Its edges stay traversable; it is skipped at result
    /// emission. If it was the entry point, the live node with the highest
    /// layer takes over.
    ///
    /// Deleting an already-tombstoned id is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for an unknown id.
    pub fn delete(&self, id: u32) -> Result<(), IndexError> {
        let mut state = self.write_state();
        let node = state
            .nodes
            .get(id as usize)
            .ok_or_else(|| IndexError::invalid(format!("unknown id {}", id)))?;

        if node.is_deleted() {
            return Ok(());
        }
        node.mark_deleted();
        state.live_count -= 1;

        if state.entry_point == Some(id) {
            let promoted = promote_entry(&state.nodes);
            state.entry_point = promoted;
        }
        Ok(())
    }

    /// Replace a vector: tombstone `id` and insert `vector` under a fresh id,
    /// carrying the old metadata unless new metadata is supplied.
    ///
    /// # Errors
    ///
    /// As [`HnswIndex::delete`] and [`HnswIndex::insert`].
    pub fn update(
        &self,
        id: u32,
        vector: Vec<f32>,
        metadata: Option<Metadata>,
    ) -> Result<u32, IndexError> {
        let carried = metadata.or_else(|| {
            let state = self.read_state();
            state.metadata.get(id).cloned()
        });
        self.delete(id)?;
        self.insert(vector, carried)
    }

    /// Engine dimension, once fixed by the first insert.
    pub fn dimension(&self) -> Option<usize> {
        self.read_state().dimension
    }

    /// Total nodes ever inserted, tombstones included.
    pub fn len(&self) -> usize {
        self.read_state().nodes.len()
    }

    /// Whether no node was ever inserted.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Live (non-tombstoned) node count.
    pub fn live_count(&self) -> usize {
        self.read_state().live_count
    }

    /// Copy of a node's neighbor ids at `layer`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` for an unknown id.
    pub fn neighbors(&self, id: u32, layer: usize) -> Result<Vec<u32>, IndexError> {
        let state = self.read_state();
        let node = state
            .nodes
            .get(id as usize)
            .ok_or_else(|| IndexError::invalid(format!("unknown id {}", id)))?;
        Ok(node.neighbors(layer).to_vec())
    }

    /// Highest layer of a node.
    pub fn node_level(&self, id: u32) -> Result<usize, IndexError> {
        let state = self.read_state();
        state
            .nodes
            .get(id as usize)
            .map(|n| n.level())
            .ok_or_else(|| IndexError::invalid(format!("unknown id {}", id)))
    }

    /// Whether a node is tombstoned.
    pub fn is_deleted(&self, id: u32) -> Result<bool, IndexError> {
        let state = self.read_state();
        state
            .nodes
            .get(id as usize)
            .map(|n| n.is_deleted())
            .ok_or_else(|| IndexError::invalid(format!("unknown id {}", id)))
    }

    /// Metric the index ranks under.
    pub fn metric(&self) -> Metric {
        self.metric
    }

    /// Construction parameters.
    pub fn params(&self) -> &HnswParams {
        &self.params
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, HnswState> {
        self.state.read().expect("index lock poisoned")
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, HnswState> {
        self.state.write().expect("index lock poisoned")
    }

    /// Reconstruct an index from deserialized parts.
    pub(crate) fn from_parts(
        metric: Metric,
        params: HnswParams,
        nodes: Vec<Arc<HnswNode>>,
        entry_point: Option<u32>,
        dimension: Option<usize>,
        metadata: MetadataStore,
    ) -> Result<Self, IndexError> {
        let live_count = nodes.iter().filter(|n| !n.is_deleted()).count();
        let index = Self::new(metric, params)?;
        {
            let mut state = index.state.write().expect("index lock poisoned");
            // The RNG resumes from the node count so reloaded engines keep
            // drawing fresh layers rather than replaying consumed ones.
            let consumed = nodes.len() as u64;
            for _ in 0..consumed {
                let _ = draw_level(&mut state.rng, index.params.level_mult);
            }
            state.nodes = nodes;
            state.entry_point = entry_point;
            state.dimension = dimension;
            state.live_count = live_count;
            state.metadata = metadata;
        }
        Ok(index)
    }
}

/// Layer for a new node: `⌊−ln(U(0,1)) · level_mult⌋`, capped.
fn draw_level(rng: &mut StdRng, level_mult: f64) -> usize {
    // 1.0 - gen::<f64>() lies in (0, 1], keeping ln() finite.
    let u: f64 = 1.0 - rng.gen::<f64>();
    let level = (-u.ln() * level_mult).floor() as usize;
    level.min(MAX_LAYER)
}

/// Live node with the highest layer (ties to the smaller id), if any.
fn promote_entry(nodes: &[Arc<HnswNode>]) -> Option<u32> {
    let mut best: Option<(usize, u32)> = None;
    for (idx, node) in nodes.iter().enumerate() {
        if node.is_deleted() {
            continue;
        }
        let level = node.level();
        match best {
            Some((b, _)) if b >= level => {}
            _ => best = Some((level, idx as u32)),
        }
    }
    best.map(|(_, id)| id)
}
