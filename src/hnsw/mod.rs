//! Hierarchical Navigable Small World (HNSW) approximate nearest neighbor
//! search.
//!
//! # Algorithm
//!
//! HNSW maintains a multi-layer graph where:
//! - **Upper layers**: sparse, long-range connections for fast navigation
//! - **Base layer**: dense, local connections for precise search
//! - **Search**: descend greedily from the top layer, then beam-search the
//!   base layer
//!
//! Unlike the batch-built graphs in this crate, HNSW is online: vectors are
//! inserted, tombstone-deleted, and searched concurrently. The node arena is
//! guarded by a top-level readers-writer lock; each node guards its own
//! per-layer neighbor lists, and every read of a neighbor list returns a copy,
//! so traversal never holds a node lock.
//!
//! # Usage
//!
//! ```rust
//! use vicinity::{HnswIndex, HnswParams, Metric};
//!
//! # fn main() -> Result<(), vicinity::IndexError> {
//! let index = HnswIndex::new(Metric::L2, HnswParams::default())?;
//! let a = index.insert(vec![1.0, 0.0], None)?;
//! index.insert(vec![0.0, 1.0], None)?;
//!
//! let results = index.search(&[1.0, 0.1], 1)?;
//! assert_eq!(results[0].0, a);
//! # Ok(())
//! # }
//! ```
//!
//! # References
//!
//! - Malkov & Yashunin (2016): "Efficient and robust approximate nearest
//!   neighbor search using Hierarchical Navigable Small World graphs"

mod graph;
mod search;
mod select;

pub use graph::{HnswIndex, HnswParams};
pub(crate) use graph::{HnswNode, MAX_LAYER};
