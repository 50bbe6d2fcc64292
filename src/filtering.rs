//! Metadata filtering for search.
//!
//! Entries may carry an opaque attribute map. The engines never interpret it;
//! only user-supplied [`FilterPredicate`]s do, and only at scoring or emission
//! time. Predicates must be cheap and side-effect free: the graph indexes
//! evaluate them while traversing.

use std::collections::HashMap;

/// Opaque per-entry attribute map: field name to categorical value.
pub type Metadata = HashMap<String, u32>;

/// Filter predicate over entry metadata.
///
/// Supports categorical equality plus boolean combination. An entry with no
/// metadata matches nothing.
#[derive(Clone, Debug)]
pub enum FilterPredicate {
    /// Field must equal the value.
    Equals { field: String, value: u32 },
    /// All sub-predicates must hold.
    And(Vec<FilterPredicate>),
    /// At least one sub-predicate must hold.
    Or(Vec<FilterPredicate>),
}

impl FilterPredicate {
    /// Create an equality filter.
    pub fn equals(field: impl Into<String>, value: u32) -> Self {
        Self::Equals {
            field: field.into(),
            value,
        }
    }

    /// Check whether metadata satisfies this predicate.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        match self {
            Self::Equals { field, value } => metadata.get(field).is_some_and(|&v| v == *value),
            Self::And(predicates) => predicates.iter().all(|p| p.matches(metadata)),
            Self::Or(predicates) => predicates.iter().any(|p| p.matches(metadata)),
        }
    }
}

/// Metadata for a collection of entries, keyed by id.
#[derive(Clone, Debug, Default)]
pub struct MetadataStore {
    metadata: HashMap<u32, Metadata>,
}

impl MetadataStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach metadata to an entry.
    pub fn insert(&mut self, id: u32, metadata: Metadata) {
        self.metadata.insert(id, metadata);
    }

    /// Metadata for an entry, if any.
    pub fn get(&self, id: u32) -> Option<&Metadata> {
        self.metadata.get(&id)
    }

    /// Whether the entry's metadata satisfies the predicate.
    ///
    /// Entries without metadata never match.
    pub fn matches(&self, id: u32, filter: &FilterPredicate) -> bool {
        self.metadata
            .get(&id)
            .is_some_and(|metadata| filter.matches(metadata))
    }

    /// Number of entries with metadata.
    pub fn len(&self) -> usize {
        self.metadata.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.metadata.is_empty()
    }

    /// Iterate over `(id, metadata)` pairs (serialization support).
    pub(crate) fn iter(&self) -> impl Iterator<Item = (&u32, &Metadata)> {
        self.metadata.iter()
    }
}
