//! Primitive tensor operations.
//!
//! This crate defines a closed set of primitive operations over strided
//! tensors, each coupling a metadata (validation) function with execution
//! backends:
//!
//! - [`ops::PrimOp`] describes one operation and its static attributes;
//! - [`registry`] holds the immutable process-wide table of [`prim::Prim`]
//!   records;
//! - [`prim::dispatch`] runs a call end to end: interception, validation,
//!   then execution on an [`backend::EagerBackend`];
//! - [`fusion`] records the fuseable subset into an SSA graph instead of
//!   executing it.
//!
//! Validation is the strict gate: a call a metadata function rejects never
//! reaches a backend, and the descriptor it returns is exact for shape,
//! strides, dtype, and device. Tensor data never lives in this crate; a
//! reference executor ships separately as `prims-rs-backend-ref-cpu`.

pub mod backend;
pub mod device;
pub mod dtype;
pub mod error;
pub mod fusion;
pub mod meta;
pub mod ops;
pub mod prim;
pub mod registry;
pub mod shape;

mod elementwise;
mod memory;
mod reduction;
mod views;

pub use backend::{BackendError, BackendResult, EagerBackend};
pub use device::Device;
pub use dtype::{higher_category, DType, TypeCategory};
pub use error::{PrimError, PrimResult};
pub use meta::{ArgMeta, Scalar, TensorLike, TensorMeta};
pub use ops::{BinaryOp, PrimOp, ReduceKind, UnaryOp};
pub use prim::{
    arg_metas, collapse, dispatch, CustomDispatch, DispatchError, Prim, Promotion, ReturnType,
    Value,
};
