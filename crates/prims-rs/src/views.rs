//! Metadata functions for the view and shape primitives.

use crate::error::{PrimError, PrimResult};
use crate::meta::{check_same_device, check_same_dtype, check_same_shape, ArgMeta, TensorMeta};
use crate::ops::PrimOp;
use crate::prim::Prim;
use crate::shape::{validate_dim_length, validate_exclusive_idx, validate_idx, validate_shape};

pub(crate) fn tensor_arg<'a>(
    prim: &Prim,
    args: &'a [ArgMeta],
    index: usize,
) -> PrimResult<&'a TensorMeta> {
    match args.get(index) {
        Some(ArgMeta::Tensor(meta)) => Ok(meta),
        Some(ArgMeta::Scalar(_)) => Err(PrimError::NotATensor { op: prim.name }),
        None => Err(PrimError::EmptyArgs { op: prim.name }),
    }
}

/// `broadcast_in_dim(a; shape, broadcast_dims)`: embeds `a`'s dimensions at
/// the positions named by `broadcast_dims` inside the target shape. Broadcast
/// (inserted or stretched) dimensions get stride zero, so the result aliases
/// `a` without copying.
pub(crate) fn broadcast_in_dim_meta(
    prim: &Prim,
    op: &PrimOp,
    args: &[ArgMeta],
) -> PrimResult<TensorMeta> {
    let PrimOp::BroadcastInDim {
        shape,
        broadcast_dims,
    } = op
    else {
        return Err(PrimError::shape("broadcast_in_dim expects its own attributes"));
    };
    let a = tensor_arg(prim, args, 0)?;
    let shape = validate_shape(shape)?;

    if broadcast_dims.len() != a.rank() {
        return Err(PrimError::shape(format!(
            "broadcast_dims has {} entries for a rank-{} input",
            broadcast_dims.len(),
            a.rank()
        )));
    }
    if shape.len() < a.rank() {
        return Err(PrimError::shape(format!(
            "target rank {} is lower than input rank {}",
            shape.len(),
            a.rank()
        )));
    }

    for (i, &dim) in broadcast_dims.iter().enumerate() {
        validate_idx(shape.len(), dim)?;
        if i > 0 && dim <= broadcast_dims[i - 1] {
            return Err(PrimError::shape(format!(
                "broadcast_dims {broadcast_dims:?} must be strictly ascending"
            )));
        }
        if a.shape[i] != shape[dim] && a.shape[i] != 1 {
            return Err(PrimError::shape(format!(
                "input length {} at dimension {i} maps to target length {} and is not 1",
                a.shape[i], shape[dim]
            )));
        }
    }

    let mut strides = vec![0usize; shape.len()];
    for (i, &dim) in broadcast_dims.iter().enumerate() {
        if a.shape[i] == shape[dim] {
            strides[dim] = a.strides[i];
        }
    }

    Ok(TensorMeta::derived_from(a)
        .with_shape(shape)
        .with_strides(strides))
}

/// `collapse_view(a; start, end)`: flattens the dimension range `[start, end)`
/// into one without copying. Requires the range's strides to nest densely:
/// `stride[i] == stride[i + 1] * shape[i + 1]`.
pub(crate) fn collapse_view_meta(
    prim: &Prim,
    op: &PrimOp,
    args: &[ArgMeta],
) -> PrimResult<TensorMeta> {
    let PrimOp::CollapseView { start, end } = *op else {
        return Err(PrimError::shape("collapse_view expects its own attributes"));
    };
    let a = tensor_arg(prim, args, 0)?;
    validate_idx(a.rank(), start)?;
    validate_exclusive_idx(a.rank(), end)?;
    if end <= start {
        return Err(PrimError::shape(format!(
            "collapse range [{start}, {end}) is empty"
        )));
    }

    for idx in start..end - 1 {
        if a.strides[idx] != a.strides[idx + 1] * a.shape[idx + 1] {
            return Err(PrimError::shape(format!(
                "dimensions {idx} and {} are not densely nested and cannot collapse into a view",
                idx + 1
            )));
        }
    }

    let mut shape = Vec::with_capacity(a.rank() - (end - start) + 1);
    let mut strides = Vec::with_capacity(shape.capacity());
    shape.extend_from_slice(&a.shape[..start]);
    strides.extend_from_slice(&a.strides[..start]);
    shape.push(a.shape[start..end].iter().product());
    strides.push(a.strides[end - 1]);
    shape.extend_from_slice(&a.shape[end..]);
    strides.extend_from_slice(&a.strides[end..]);

    Ok(TensorMeta::derived_from(a)
        .with_shape(shape)
        .with_strides(strides))
}

/// `split_dim(a; dim, outer_length)`: splits dimension `dim` into
/// `[outer_length, inner]` without copying. The split must be exact.
pub(crate) fn split_dim_meta(prim: &Prim, op: &PrimOp, args: &[ArgMeta]) -> PrimResult<TensorMeta> {
    let PrimOp::SplitDim { dim, outer_length } = *op else {
        return Err(PrimError::shape("split_dim expects its own attributes"));
    };
    let a = tensor_arg(prim, args, 0)?;
    validate_idx(a.rank(), dim)?;
    let outer = validate_dim_length(outer_length)?;

    let length = a.shape[dim];
    let inner = match outer {
        0 => None,
        outer if length % outer == 0 => Some(length / outer),
        _ => None,
    }
    .ok_or_else(|| {
        PrimError::shape(format!(
            "dimension {dim} of length {length} does not split evenly into outer length {outer}"
        ))
    })?;

    let mut shape = a.shape.clone();
    let mut strides = a.strides.clone();
    shape[dim] = inner;
    shape.insert(dim, outer);
    strides[dim] = a.strides[dim];
    strides.insert(dim, a.strides[dim] * inner);

    Ok(TensorMeta::derived_from(a)
        .with_shape(shape)
        .with_strides(strides))
}

/// `squeeze(a; dims)`: removes the named length-1 dimensions without copying.
/// Repeated entries are tolerated and applied once.
pub(crate) fn squeeze_meta(prim: &Prim, op: &PrimOp, args: &[ArgMeta]) -> PrimResult<TensorMeta> {
    let PrimOp::Squeeze { dims } = op else {
        return Err(PrimError::shape("squeeze expects its own attributes"));
    };
    let a = tensor_arg(prim, args, 0)?;

    let mut drop = vec![false; a.rank()];
    for &dim in dims {
        validate_idx(a.rank(), dim)?;
        if a.shape[dim] != 1 {
            return Err(PrimError::shape(format!(
                "cannot squeeze dimension {dim} of length {}",
                a.shape[dim]
            )));
        }
        drop[dim] = true;
    }

    let mut shape = Vec::with_capacity(a.rank());
    let mut strides = Vec::with_capacity(a.rank());
    for idx in 0..a.rank() {
        if !drop[idx] {
            shape.push(a.shape[idx]);
            strides.push(a.strides[idx]);
        }
    }

    Ok(TensorMeta::derived_from(a)
        .with_shape(shape)
        .with_strides(strides))
}

/// `concatenate(tensors...; dim)`: joins tensors along `dim`. All inputs must
/// be tensors on one device with one dtype, agreeing on every dimension except
/// `dim`. The result is freshly allocated and contiguous.
pub(crate) fn concatenate_meta(
    prim: &Prim,
    op: &PrimOp,
    args: &[ArgMeta],
) -> PrimResult<TensorMeta> {
    let PrimOp::Concatenate { dim } = *op else {
        return Err(PrimError::shape("concatenate expects its own attributes"));
    };
    if args.is_empty() {
        return Err(PrimError::EmptyArgs { op: prim.name });
    }
    check_same_device(prim.name, args, false)?;
    check_same_dtype(args)?;

    let first = tensor_arg(prim, args, 0)?;
    validate_idx(first.rank(), dim)?;

    let mut concat_length = 0usize;
    for index in 0..args.len() {
        let meta = tensor_arg(prim, args, index)?;
        if meta.rank() != first.rank() {
            return Err(PrimError::ShapeMismatch {
                expected: first.shape.clone(),
                got: meta.shape.clone(),
            });
        }
        for idx in 0..first.rank() {
            if idx != dim && meta.shape[idx] != first.shape[idx] {
                return Err(PrimError::ShapeMismatch {
                    expected: first.shape.clone(),
                    got: meta.shape.clone(),
                });
            }
        }
        concat_length += meta.shape[dim];
    }

    let mut shape = first.shape.clone();
    shape[dim] = concat_length;
    Ok(TensorMeta::derived_from(first).with_shape(shape))
}

/// `reshape(a; shape)`: reinterprets `a` with a new shape of equal element
/// count. Always materializes a fresh contiguous tensor.
pub(crate) fn reshape_meta(prim: &Prim, op: &PrimOp, args: &[ArgMeta]) -> PrimResult<TensorMeta> {
    let PrimOp::Reshape { shape } = op else {
        return Err(PrimError::shape("reshape expects its own attributes"));
    };
    let a = tensor_arg(prim, args, 0)?;
    let shape = validate_shape(shape)?;

    let numel: usize = shape.iter().product();
    if numel != a.numel() {
        return Err(PrimError::NumelMismatch {
            expected: a.numel(),
            got: numel,
        });
    }

    Ok(TensorMeta::derived_from(a).with_shape(shape))
}

/// `select(pred, a, b)`: chooses elementwise from `a` where `pred` holds,
/// otherwise from `b`. The predicate must be a boolean tensor; dtype and
/// stride inference delegate to the elementwise rule over `(a, b)`.
pub(crate) fn select_meta(prim: &Prim, op: &PrimOp, args: &[ArgMeta]) -> PrimResult<TensorMeta> {
    let pred = tensor_arg(prim, args, 0)?;
    if pred.dtype != crate::dtype::DType::Bool {
        return Err(PrimError::DtypeMismatch {
            expected: crate::dtype::DType::Bool,
            got: pred.dtype,
        });
    }
    if args.len() != 3 {
        return Err(PrimError::shape(format!(
            "select expects (pred, a, b), got {} arguments",
            args.len()
        )));
    }
    check_same_device(prim.name, args, true)?;
    check_same_shape(args)?;

    crate::elementwise::elementwise_meta(prim, op, &args[1..])
}
