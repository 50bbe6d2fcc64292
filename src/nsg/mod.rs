//! Navigating spreading-out graph (NSG) approximate nearest neighbor search.
//!
//! A single-layer proximity graph built in one batch pass: vectors are queued
//! with [`NsgIndex::add_vector`], then [`NsgIndex::build`] computes an
//! intermediate k-NN graph by brute force, selects up to `R` neighbors per
//! node with an occlusion rule, and fixes the navigating node (the vector
//! closest to the dataset mean) as the single search entry point. After build
//! the index is frozen.
//!
//! Supports k-NN search, radius search, and filtered search.
//!
//! # References
//!
//! - Fu et al. (2019): "Fast approximate nearest neighbor search with the
//!   navigating spreading-out graph"

mod graph;
mod search;

pub use graph::{NsgIndex, NsgParams};
