//! Tensor metadata descriptors and argument views used by validation.

use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::dtype::DType;
use crate::error::{PrimError, PrimResult};
use crate::shape::contiguous_strides_for;

/// Describes a tensor without owning its data: shape, strides, dtype, device.
///
/// Metadata functions return one of these for every successful validation; in
/// non-executing contexts (tracing, shape inference) the descriptor also
/// stands in for the result itself, which is why it implements [`TensorLike`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorMeta {
    pub shape: Vec<usize>,
    pub strides: Vec<usize>,
    pub dtype: DType,
    pub device: Device,
}

impl TensorMeta {
    /// Builds a contiguous descriptor from scratch.
    pub fn contiguous(shape: Vec<usize>, dtype: DType, device: Device) -> Self {
        let strides = contiguous_strides_for(&shape);
        TensorMeta {
            shape,
            strides,
            dtype,
            device,
        }
    }

    /// Starts a descriptor derived from a reference value; fields not
    /// overridden by the `with_*` methods are inherited from it.
    pub fn derived_from<T: TensorLike + ?Sized>(reference: &T) -> Self {
        TensorMeta {
            shape: reference.shape().to_vec(),
            strides: reference.strides().to_vec(),
            dtype: reference.dtype(),
            device: reference.device(),
        }
    }

    /// Replaces the shape and resets strides to the contiguous layout for it.
    pub fn with_shape(mut self, shape: Vec<usize>) -> Self {
        self.strides = contiguous_strides_for(&shape);
        self.shape = shape;
        self
    }

    pub fn with_strides(mut self, strides: Vec<usize>) -> Self {
        self.strides = strides;
        self
    }

    pub fn with_dtype(mut self, dtype: DType) -> Self {
        self.dtype = dtype;
        self
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_contiguous(&self) -> bool {
        self.strides == contiguous_strides_for(&self.shape)
    }
}

/// Read-only view of tensor metadata, implemented by backend tensors and by
/// [`TensorMeta`] itself.
pub trait TensorLike {
    fn shape(&self) -> &[usize];
    fn strides(&self) -> &[usize];
    fn dtype(&self) -> DType;
    fn device(&self) -> Device;

    fn meta(&self) -> TensorMeta {
        TensorMeta {
            shape: self.shape().to_vec(),
            strides: self.strides().to_vec(),
            dtype: self.dtype(),
            device: self.device(),
        }
    }
}

impl TensorLike for TensorMeta {
    fn shape(&self) -> &[usize] {
        &self.shape
    }

    fn strides(&self) -> &[usize] {
        &self.strides
    }

    fn dtype(&self) -> DType {
        self.dtype
    }

    fn device(&self) -> Device {
        self.device
    }

    fn meta(&self) -> TensorMeta {
        self.clone()
    }
}

/// Untyped scalar operand. Scalars carry a canonical dtype per category and
/// are exempt from the cross-argument dtype and shape checks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Complex { re: f64, im: f64 },
}

impl Scalar {
    pub fn dtype(self) -> DType {
        match self {
            Scalar::Bool(_) => DType::Bool,
            Scalar::Int(_) => DType::Si64,
            Scalar::Float(_) => DType::F64,
            Scalar::Complex { .. } => DType::Cf64,
        }
    }
}

/// Metadata view of one prim argument.
#[derive(Debug, Clone, PartialEq)]
pub enum ArgMeta {
    Tensor(TensorMeta),
    Scalar(Scalar),
}

impl ArgMeta {
    pub fn as_tensor(&self) -> Option<&TensorMeta> {
        match self {
            ArgMeta::Tensor(meta) => Some(meta),
            ArgMeta::Scalar(_) => None,
        }
    }
}

fn tensors(args: &[ArgMeta]) -> impl Iterator<Item = &TensorMeta> {
    args.iter().filter_map(ArgMeta::as_tensor)
}

/// Fails unless every tensor argument has the same shape as the first.
pub fn check_same_shape(args: &[ArgMeta]) -> PrimResult<()> {
    let mut iter = tensors(args);
    let Some(first) = iter.next() else {
        return Ok(());
    };
    for meta in iter {
        if meta.shape != first.shape {
            return Err(PrimError::ShapeMismatch {
                expected: first.shape.clone(),
                got: meta.shape.clone(),
            });
        }
    }
    Ok(())
}

/// Fails unless every tensor argument has the same dtype as the first.
pub fn check_same_dtype(args: &[ArgMeta]) -> PrimResult<()> {
    let mut iter = tensors(args);
    let Some(first) = iter.next() else {
        return Ok(());
    };
    for meta in iter {
        if meta.dtype != first.dtype {
            return Err(PrimError::DtypeMismatch {
                expected: first.dtype,
                got: meta.dtype,
            });
        }
    }
    Ok(())
}

/// Fails unless every tensor argument lives on the same device as the first.
/// Scalar arguments are rejected unless `allow_scalars` is set.
pub fn check_same_device(op: &'static str, args: &[ArgMeta], allow_scalars: bool) -> PrimResult<()> {
    let mut first: Option<&TensorMeta> = None;
    for arg in args {
        match arg {
            ArgMeta::Scalar(_) if !allow_scalars => {
                return Err(PrimError::NotATensor { op });
            }
            ArgMeta::Scalar(_) => {}
            ArgMeta::Tensor(meta) => match first {
                None => first = Some(meta),
                Some(reference) if meta.device != reference.device => {
                    return Err(PrimError::DeviceMismatch {
                        expected: reference.device,
                        got: meta.device,
                    });
                }
                Some(_) => {}
            },
        }
    }
    Ok(())
}
