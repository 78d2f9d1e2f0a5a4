//! Error types for tensorlogic-kernel-mvm.

use scirs2_core::ndarray::ShapeError;
use thiserror::Error;

/// Errors that can occur in chunked kernel matrix-vector products.
#[derive(Error, Debug, Clone)]
pub enum KernelMvmError {
    /// Mismatched dimensions between operands
    #[error("Dimension mismatch in {context}: expected {expected:?}, got {got:?}")]
    DimensionMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
        context: String,
    },

    /// Invalid configuration or hyperparameter value
    #[error("Invalid parameter '{parameter}' = '{value}': {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },

    /// The requested execution device cannot run the computation
    #[error("Device not available: {0}")]
    DeviceNotAvailable(String),

    /// Array assembly failed (chunk concatenation, reshaping)
    #[error("Shape error: {0}")]
    Shape(#[from] ShapeError),

    /// Analytical and numeric derivatives disagree
    #[error("Gradient check failed: {0}")]
    GradientCheck(String),
}

impl KernelMvmError {
    /// Shorthand for a length mismatch between two 1-D/2-D operands.
    pub(crate) fn mismatch(expected: usize, got: usize, context: impl Into<String>) -> Self {
        Self::DimensionMismatch {
            expected: vec![expected],
            got: vec![got],
            context: context.into(),
        }
    }
}

/// Result type for kernel MVM operations
pub type Result<T> = std::result::Result<T, KernelMvmError>;
