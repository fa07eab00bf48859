//! Eager backend contract.

use thiserror::Error;

use crate::meta::TensorLike;
use crate::ops::PrimOp;
use crate::prim::{CustomDispatch, Value};

/// Failure raised by an executor. Validation has already accepted the call by
/// the time a backend runs, so these report runtime conditions only.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    #[error("{op} is not implemented by this backend: {reason}")]
    Unimplemented { op: &'static str, reason: String },

    #[error("integer division by zero")]
    DivisionByZero,

    #[error("backend execution failure: {message}")]
    Execution { message: String },
}

impl BackendError {
    pub fn unimplemented(op: &'static str, reason: impl Into<String>) -> Self {
        BackendError::Unimplemented {
            op,
            reason: reason.into(),
        }
    }

    pub fn execution(message: impl Into<String>) -> Self {
        BackendError::Execution {
            message: message.into(),
        }
    }
}

/// Convenience alias for results returned by backend routines.
pub type BackendResult<T> = Result<T, BackendError>;

/// An executor of primitive operations over its own tensor representation.
///
/// Backends may accept inputs the metadata functions would reject; validation
/// stays the strict gate and runs before `execute` on the normal dispatch
/// path. In-place prims mutate `args[0]` through the handle and return it.
pub trait EagerBackend {
    type Tensor: TensorLike + CustomDispatch + Clone;

    /// Returns a human-readable backend identifier (e.g. `"ref-cpu"`).
    fn backend_name(&self) -> &str;

    /// Executes a single primitive over already-validated arguments.
    fn execute(&self, op: &PrimOp, args: &mut [Value<Self::Tensor>])
        -> BackendResult<Self::Tensor>;
}
