use thiserror::Error;

use crate::device::Device;
use crate::dtype::DType;

/// Validation failure raised by a primitive's metadata function before any
/// backend work happens.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PrimError {
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("dtype mismatch: expected {expected:?}, got {got:?}")]
    DtypeMismatch { expected: DType, got: DType },

    #[error("device mismatch: expected {expected}, got {got}")]
    DeviceMismatch { expected: Device, got: Device },

    #[error("index {index} out of range for rank {rank}")]
    IndexOutOfRange { index: usize, rank: usize },

    /// Structural shape violation (non-nested collapse, uneven split, bad
    /// broadcast dimensions, and the like).
    #[error("invalid shape: {reason}")]
    Shape { reason: String },

    #[error("element count mismatch: expected {expected}, got {got}")]
    NumelMismatch { expected: usize, got: usize },

    #[error("unsafe cast from {from:?} to {to:?}")]
    UnsafeCast { from: DType, to: DType },

    #[error("{op} is not implemented: {reason}")]
    NotImplemented { op: &'static str, reason: String },

    #[error("invalid device string {spec:?}")]
    InvalidDevice { spec: String },

    #[error("{op} expects at least one argument")]
    EmptyArgs { op: &'static str },

    #[error("{op} requires a tensor argument, got a scalar")]
    NotATensor { op: &'static str },
}

impl PrimError {
    pub fn shape(reason: impl Into<String>) -> Self {
        PrimError::Shape {
            reason: reason.into(),
        }
    }

    pub fn not_implemented(op: &'static str, reason: impl Into<String>) -> Self {
        PrimError::NotImplemented {
            op,
            reason: reason.into(),
        }
    }
}

/// Convenience alias for results returned by validation routines.
pub type PrimResult<T> = Result<T, PrimError>;
