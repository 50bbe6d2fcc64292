//! Error types for index operations.

use std::fmt;

/// Errors that can occur during index and quantizer operations.
///
/// All fallible operations surface errors synchronously; nothing is recovered
/// internally. A batch `add` that fails partway leaves earlier entries in
/// place and reports the offending position via [`IndexError::BatchItem`].
#[derive(Debug)]
pub enum IndexError {
    /// Vector length differs from the engine-wide dimension.
    DimensionMismatch {
        expected: usize,
        actual: usize,
    },
    /// Operation requires a trained quantizer or partitioner.
    NotTrained,
    /// Mutation attempted after the index was built or frozen.
    AlreadyBuilt,
    /// Search attempted before the index was built.
    IndexNotBuilt,
    /// Empty input where at least one vector is required.
    EmptyInput,
    /// Invalid parameter value.
    InvalidParameter(String),
    /// Too few training vectors for the requested cluster or codebook count.
    InsufficientTrainingData {
        required: usize,
        actual: usize,
    },
    /// The graph entry point refers to a tombstoned node while live nodes exist.
    DeletedEntryPoint,
    /// A per-vector failure inside a batch operation, naming the batch position.
    BatchItem {
        index: usize,
        source: Box<IndexError>,
    },
    /// Serialized data is malformed (bad magic, truncation, inconsistent lengths).
    CorruptData {
        message: String,
        expected: Option<String>,
        actual: Option<String>,
    },
    /// Serialized data uses an incompatible format version.
    VersionUnsupported {
        found: u16,
        supported: u16,
    },
}

impl IndexError {
    /// Shorthand for a corrupt-data error without expected/actual diagnostics.
    pub(crate) fn corrupt(message: impl Into<String>) -> Self {
        IndexError::CorruptData {
            message: message.into(),
            expected: None,
            actual: None,
        }
    }

    /// Shorthand for an invalid-parameter error.
    pub(crate) fn invalid(message: impl Into<String>) -> Self {
        IndexError::InvalidParameter(message.into())
    }
}

impl fmt::Display for IndexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexError::DimensionMismatch { expected, actual } => {
                write!(
                    f,
                    "Dimension mismatch: engine dimension is {}, vector has {}",
                    expected, actual
                )
            }
            IndexError::NotTrained => write!(f, "Not trained: call train() first"),
            IndexError::AlreadyBuilt => write!(f, "Index is already built and frozen"),
            IndexError::IndexNotBuilt => write!(f, "Index must be built before search"),
            IndexError::EmptyInput => write!(f, "Input is empty"),
            IndexError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            IndexError::InsufficientTrainingData { required, actual } => {
                write!(
                    f,
                    "Insufficient training data: need at least {} vectors, got {}",
                    required, actual
                )
            }
            IndexError::DeletedEntryPoint => {
                write!(f, "Entry point is tombstoned while live nodes remain")
            }
            IndexError::BatchItem { index, source } => {
                write!(f, "Batch item {} failed: {}", index, source)
            }
            IndexError::CorruptData {
                message,
                expected,
                actual,
            } => {
                write!(f, "Corrupt data: {}", message)?;
                if let Some(e) = expected {
                    write!(f, " (expected: {})", e)?;
                }
                if let Some(a) = actual {
                    write!(f, " (actual: {})", a)?;
                }
                Ok(())
            }
            IndexError::VersionUnsupported { found, supported } => {
                write!(
                    f,
                    "Unsupported format version {} (supported: {})",
                    found, supported
                )
            }
        }
    }
}

impl std::error::Error for IndexError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IndexError::BatchItem { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}
