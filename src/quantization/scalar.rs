//! Scalar quantization: a global affine map from `f32` to `i8`.

use crate::error::IndexError;
use crate::quantization::Quantizer;

/// Scalar quantizer with min/max calibration.
///
/// Training scans every component of the training set for the global range;
/// encoding maps each component through `round(clamp(v * scale + offset))`
/// into `[-127, 127]`. Memory shrinks by exactly 4x.
#[derive(Clone, Debug)]
pub struct ScalarQuantizer {
    dimension: usize,
    scale: f32,
    offset: f32,
    trained: bool,
}

impl ScalarQuantizer {
    /// Create an untrained quantizer for `dimension`-component vectors.
    ///
    /// # Errors
    ///
    /// Returns `InvalidParameter` when `dimension` is zero.
    pub fn new(dimension: usize) -> Result<Self, IndexError> {
        if dimension == 0 {
            return Err(IndexError::invalid("dimension must be greater than 0"));
        }
        Ok(Self {
            dimension,
            scale: 1.0,
            offset: 0.0,
            trained: false,
        })
    }

    /// Calibrate the affine map from the global min/max of the training set.
    ///
    /// # Errors
    ///
    /// Returns `EmptyInput` for an empty set and `DimensionMismatch` for a
    /// vector of the wrong length.
    pub fn train(&mut self, vectors: &[Vec<f32>]) -> Result<(), IndexError> {
        if vectors.is_empty() {
            return Err(IndexError::EmptyInput);
        }

        let mut min = f32::INFINITY;
        let mut max = f32::NEG_INFINITY;
        for v in vectors {
            if v.len() != self.dimension {
                return Err(IndexError::DimensionMismatch {
                    expected: self.dimension,
                    actual: v.len(),
                });
            }
            for &x in v {
                min = min.min(x);
                max = max.max(x);
            }
        }

        // Degenerate range (all components equal): identity slope.
        self.scale = if max > min { 254.0 / (max - min) } else { 1.0 };
        self.offset = -127.0 - min * self.scale;
        self.trained = true;
        Ok(())
    }

    /// Whether the quantizer has been trained.
    pub fn is_trained(&self) -> bool {
        self.trained
    }

    /// Vector dimension.
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub(crate) fn scale(&self) -> f32 {
        self.scale
    }

    pub(crate) fn offset(&self) -> f32 {
        self.offset
    }

    pub(crate) fn from_parts(dimension: usize, scale: f32, offset: f32) -> Self {
        Self {
            dimension,
            scale,
            offset,
            trained: true,
        }
    }
}

impl Quantizer for ScalarQuantizer {
    type Code = Vec<i8>;

    fn encode(&self, vector: &[f32]) -> Result<Vec<i8>, IndexError> {
        if !self.trained {
            return Err(IndexError::NotTrained);
        }
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(vector
            .iter()
            .map(|&x| (x * self.scale + self.offset).clamp(-127.0, 127.0).round() as i8)
            .collect())
    }

    fn decode(&self, code: &Vec<i8>) -> Result<Vec<f32>, IndexError> {
        if !self.trained {
            return Err(IndexError::NotTrained);
        }
        if code.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: code.len(),
            });
        }
        Ok(code
            .iter()
            .map(|&q| (q as f32 - self.offset) / self.scale)
            .collect())
    }

    fn compression_ratio(&self) -> f32 {
        4.0
    }
}
