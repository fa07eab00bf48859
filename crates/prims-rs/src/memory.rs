//! Metadata functions for dtype conversion, device transfer, and the
//! in-place primitives.

use crate::dtype::higher_category;
use crate::error::{PrimError, PrimResult};
use crate::meta::{ArgMeta, TensorMeta};
use crate::ops::PrimOp;
use crate::prim::Prim;
use crate::shape::validate_shape;
use crate::views::tensor_arg;

/// `convert_element_type(a; dtype)`: reinterprets every element in the target
/// dtype. Any conversion is permitted here, including narrowing.
pub(crate) fn convert_element_type_meta(
    prim: &Prim,
    op: &PrimOp,
    args: &[ArgMeta],
) -> PrimResult<TensorMeta> {
    let PrimOp::ConvertElementType { dtype } = *op else {
        return Err(PrimError::shape(
            "convert_element_type expects its own attributes",
        ));
    };
    let a = tensor_arg(prim, args, 0)?;
    Ok(TensorMeta::derived_from(a).with_dtype(dtype))
}

/// `device_put(a; device)`: moves `a` to the target device.
pub(crate) fn device_put_meta(prim: &Prim, op: &PrimOp, args: &[ArgMeta]) -> PrimResult<TensorMeta> {
    let PrimOp::DevicePut { device } = *op else {
        return Err(PrimError::shape("device_put expects its own attributes"));
    };
    let a = tensor_arg(prim, args, 0)?;
    Ok(TensorMeta::derived_from(a).with_device(device))
}

/// `copy_to(a, b)`: overwrites `a`'s elements with `b`'s, converting dtype.
/// The conversion must be safe — `b`'s type category may not exceed `a`'s —
/// and the element counts must match. The caller holds exclusive access to
/// `a` for the duration of the call.
pub(crate) fn copy_to_meta(prim: &Prim, _op: &PrimOp, args: &[ArgMeta]) -> PrimResult<TensorMeta> {
    let a = tensor_arg(prim, args, 0)?;
    let b = tensor_arg(prim, args, 1)?;

    if higher_category(a.dtype, b.dtype) != a.dtype.category() {
        return Err(PrimError::UnsafeCast {
            from: b.dtype,
            to: a.dtype,
        });
    }
    if a.numel() != b.numel() {
        return Err(PrimError::NumelMismatch {
            expected: a.numel(),
            got: b.numel(),
        });
    }

    Ok(a.clone())
}

/// `resize(a; shape)`: gives `a` a new geometry in place. Only currently
/// empty tensors may be resized; new elements are uninitialized and callers
/// must not rely on their contents.
pub(crate) fn resize_meta(prim: &Prim, op: &PrimOp, args: &[ArgMeta]) -> PrimResult<TensorMeta> {
    let PrimOp::Resize { shape } = op else {
        return Err(PrimError::shape("resize expects its own attributes"));
    };
    let a = tensor_arg(prim, args, 0)?;
    let shape = validate_shape(shape)?;

    if a.numel() != 0 {
        return Err(PrimError::shape(format!(
            "resize only accepts empty tensors, got {} elements",
            a.numel()
        )));
    }

    Ok(TensorMeta::derived_from(a).with_shape(shape))
}
