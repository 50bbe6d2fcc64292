//! In-process approximate nearest neighbor search.
//!
//! This crate provides the index engines and quantization substrate for dense
//! vector similarity search: given a collection of `f32` vectors of fixed
//! dimension, return the `k` approximate nearest neighbors of a query under a
//! chosen metric, optionally compressing stored vectors to shrink memory.
//!
//! # Engines
//!
//! - **HNSW** ([`HnswIndex`]): multi-layer proximity graph with online
//!   insert, tombstone delete, and k-NN search; recall/latency tuned by
//!   `ef_search`
//! - **NSG** ([`NsgIndex`]): single-layer graph built in one batch pass;
//!   k-NN, radius, and filtered search
//! - **IVF-Flat / IVF-PQ** ([`IvfFlatIndex`], [`IvfPqIndex`]):
//!   partition-and-probe inverted lists, raw or with product-quantized
//!   residuals
//! - **SCANN** ([`ScannIndex`]): learned (optionally spherical) partitioning
//!   over anisotropic-quantized residuals with optional exact rescoring
//! - **Flat** ([`FlatIndex`]): exhaustive scan, the exact baseline
//!
//! All engines share the distance kernels, the k-means substrate, and the
//! filtering vocabulary; every index and quantizer round-trips through a
//! versioned binary format (`to_bytes` / `from_bytes`).
//!
//! # Quick Start
//!
//! ```rust
//! use vicinity::{HnswIndex, HnswParams, Metric};
//!
//! # fn main() -> Result<(), vicinity::IndexError> {
//! let index = HnswIndex::new(Metric::L2, HnswParams::default())?;
//! index.insert(vec![1.0, 0.0, 0.0, 0.0], None)?;
//! index.insert(vec![0.0, 1.0, 0.0, 0.0], None)?;
//!
//! let results = index.search(&[0.9, 0.1, 0.0, 0.0], 1)?;
//! assert_eq!(results[0].0, 0);
//! # Ok(())
//! # }
//! ```
//!
//! # Determinism
//!
//! Every stochastic site (HNSW layer draws, k-means++ seeding, empty-cluster
//! fallbacks) runs off an explicit seed carried in the engine parameters, so
//! two runs with equal seeds, inputs, and metric produce identical indexes.
//! Concurrent writers must be serialized by the caller for reproducibility;
//! searches may run concurrently with each other and with HNSW inserts.
//!
//! # Scope
//!
//! The crate is the in-process core only: no wire protocol, no persistence
//! beyond byte blobs, no logging, no background threads. Hosts layer those
//! concerns on top.

/// Unified read-side trait over the engines.
pub mod ann;

/// Distance kernels over `f32` slices and packed `i8` buffers.
pub mod distance;

/// Error types for index operations.
pub mod error;

/// Metadata filtering for search.
pub mod filtering;

/// Exhaustive-scan baseline index.
pub mod flat;

/// Hierarchical navigable small world graph index.
pub mod hnsw;

/// Inverted-file partition indexes (flat, PQ, SCANN).
pub mod ivf;

/// k-means clustering with k-means++ seeding.
pub mod kmeans;

/// Distance metric selection.
pub mod metric;

/// Navigating spreading-out graph index.
pub mod nsg;

/// Quantizers: scalar, product, anisotropic.
pub mod quantization;

/// SIMD-accelerated vector primitives.
pub mod simd;

mod persist;

pub use ann::{AnnIndex, AnnStats};
pub use error::IndexError;
pub use filtering::{FilterPredicate, Metadata, MetadataStore};
pub use flat::FlatIndex;
pub use hnsw::{HnswIndex, HnswParams};
pub use ivf::{IvfFlatIndex, IvfParams, IvfPqIndex, ScannIndex, ScannParams};
pub use metric::Metric;
pub use nsg::{NsgIndex, NsgParams};
pub use quantization::{
    AnisotropicQuantizer, AsymmetricQuantizer, DistanceTable, PqParams, ProductQuantizer,
    Quantizer, ScalarQuantizer,
};

/// Re-export of commonly used types.
pub mod prelude {
    pub use crate::ann::{AnnIndex, AnnStats};
    pub use crate::error::IndexError;
    pub use crate::filtering::{FilterPredicate, Metadata};
    pub use crate::flat::FlatIndex;
    pub use crate::hnsw::{HnswIndex, HnswParams};
    pub use crate::ivf::{IvfFlatIndex, IvfParams, IvfPqIndex, ScannIndex, ScannParams};
    pub use crate::metric::Metric;
    pub use crate::nsg::{NsgIndex, NsgParams};
    pub use crate::quantization::{
        AnisotropicQuantizer, AsymmetricQuantizer, PqParams, ProductQuantizer, Quantizer,
        ScalarQuantizer,
    };
}
