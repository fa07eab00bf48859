//! Primitive records and the uniform dispatch path.
//!
//! Every primitive couples a metadata function with executors. Invoking one
//! always follows the same order:
//!
//! 1. interception: any tensor argument may claim the call via
//!    [`CustomDispatch::try_dispatch`];
//! 2. validation: the metadata function either returns the result descriptor
//!    or fails, and a failure never reaches a backend;
//! 3. execution: the eager backend runs the op over the live arguments.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::backend::{BackendError, BackendResult, EagerBackend};
use crate::error::{PrimError, PrimResult};
use crate::fusion::{FusedValue, FusionGraph};
use crate::meta::{ArgMeta, Scalar, TensorLike, TensorMeta};
use crate::ops::PrimOp;
use crate::registry;
use crate::shape::{validate_exclusive_idx, validate_idx};

/// How a primitive's result relates to its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReturnType {
    /// Freshly allocated tensor.
    New,
    /// Aliases the storage of the first argument.
    View,
    /// Mutates the first argument and returns it.
    Inplace,
}

/// Result dtype policy applied by the shared elementwise metadata function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Promotion {
    /// Result keeps the common input dtype.
    Default,
    /// Result is boolean regardless of the input dtype.
    AlwaysBool,
    /// Complex inputs produce the corresponding real float dtype.
    ComplexToFloat,
}

pub type MetaFn = fn(&Prim, &PrimOp, &[ArgMeta]) -> PrimResult<TensorMeta>;
pub type FusedFn = fn(&mut FusionGraph, &PrimOp, &[FusedValue]) -> PrimResult<FusedValue>;

/// Immutable record describing one registered primitive.
#[derive(Clone)]
pub struct Prim {
    pub name: &'static str,
    pub return_type: ReturnType,
    pub promotion: Option<Promotion>,
    pub doc: &'static str,
    meta: MetaFn,
    fused: Option<FusedFn>,
}

impl Prim {
    pub fn new(name: &'static str, return_type: ReturnType, doc: &'static str, meta: MetaFn) -> Self {
        Prim {
            name,
            return_type,
            promotion: None,
            doc,
            meta,
            fused: None,
        }
    }

    pub fn with_promotion(mut self, promotion: Promotion) -> Self {
        self.promotion = Some(promotion);
        self
    }

    pub fn with_fused(mut self, fused: FusedFn) -> Self {
        self.fused = Some(fused);
        self
    }

    /// Validates a call and computes the result descriptor without executing.
    pub fn meta(&self, op: &PrimOp, args: &[ArgMeta]) -> PrimResult<TensorMeta> {
        (self.meta)(self, op, args)
    }

    pub fn has_fused(&self) -> bool {
        self.fused.is_some()
    }

    /// Records the op into a fusion graph; fails for prims outside the fused
    /// subset.
    pub fn emit_fused(
        &self,
        graph: &mut FusionGraph,
        op: &PrimOp,
        inputs: &[FusedValue],
    ) -> PrimResult<FusedValue> {
        match self.fused {
            Some(emit) => emit(graph, op, inputs),
            None => Err(PrimError::not_implemented(
                self.name,
                "no fused lowering is registered",
            )),
        }
    }
}

impl std::fmt::Debug for Prim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Prim")
            .field("name", &self.name)
            .field("return_type", &self.return_type)
            .field("promotion", &self.promotion)
            .field("fused", &self.fused.is_some())
            .finish()
    }
}

/// One live prim argument: a backend tensor handle or an untyped scalar.
#[derive(Debug, Clone)]
pub enum Value<T> {
    Tensor(T),
    Scalar(Scalar),
}

impl<T: TensorLike> Value<T> {
    pub fn arg_meta(&self) -> ArgMeta {
        match self {
            Value::Tensor(tensor) => ArgMeta::Tensor(tensor.meta()),
            Value::Scalar(scalar) => ArgMeta::Scalar(*scalar),
        }
    }

    pub fn as_tensor(&self) -> Option<&T> {
        match self {
            Value::Tensor(tensor) => Some(tensor),
            Value::Scalar(_) => None,
        }
    }
}

/// Metadata views of a full argument list.
pub fn arg_metas<T: TensorLike>(args: &[Value<T>]) -> Vec<ArgMeta> {
    args.iter().map(Value::arg_meta).collect()
}

/// Interception hook checked before validation. A tensor type that overrides
/// [`try_dispatch`](CustomDispatch::try_dispatch) can claim any call it
/// participates in; the first argument to return `Some` short-circuits both
/// validation and execution.
pub trait CustomDispatch: Sized {
    fn try_dispatch(
        &self,
        _prim: &Prim,
        _op: &PrimOp,
        _args: &[Value<Self>],
    ) -> Option<BackendResult<Self>> {
        None
    }
}

/// Failure of a dispatched prim call, keeping validation and execution
/// failures distinguishable.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no primitive registered under {0:?}")]
    UnknownPrim(String),

    #[error(transparent)]
    Validation(#[from] PrimError),

    #[error(transparent)]
    Backend(#[from] BackendError),
}

/// Invokes a primitive end to end: interception, validation, execution.
pub fn dispatch<B: EagerBackend>(
    backend: &B,
    op: &PrimOp,
    args: &mut [Value<B::Tensor>],
) -> Result<B::Tensor, DispatchError> {
    let prim = registry::get(op.name())
        .ok_or_else(|| DispatchError::UnknownPrim(op.name().to_string()))?;

    for value in args.iter() {
        if let Value::Tensor(tensor) = value {
            if let Some(result) = tensor.try_dispatch(prim, op, &*args) {
                return result.map_err(DispatchError::from);
            }
        }
    }

    let metas = arg_metas(args);
    prim.meta(op, &metas)?;

    backend.execute(op, args).map_err(DispatchError::from)
}

/// Flattens dimensions `[start, end)` of `a` into one, copying. Unlike
/// `collapse_view` this is a composite over `reshape` and works for any
/// layout.
pub fn collapse<B: EagerBackend>(
    backend: &B,
    a: B::Tensor,
    start: usize,
    end: usize,
) -> Result<B::Tensor, DispatchError> {
    let shape = a.shape();
    validate_idx(shape.len(), start)?;
    validate_exclusive_idx(shape.len(), end)?;
    if end <= start {
        return Err(PrimError::shape(format!(
            "collapse range [{start}, {end}) is empty"
        ))
        .into());
    }

    let mut collapsed: Vec<i64> = Vec::with_capacity(shape.len() - (end - start) + 1);
    collapsed.extend(shape[..start].iter().map(|&length| length as i64));
    collapsed.push(shape[start..end].iter().product::<usize>() as i64);
    collapsed.extend(shape[end..].iter().map(|&length| length as i64));

    dispatch(
        backend,
        &PrimOp::Reshape { shape: collapsed },
        &mut [Value::Tensor(a)],
    )
}
