//! Metadata function shared by the reduction primitives.

use crate::dtype::DType;
use crate::error::{PrimError, PrimResult};
use crate::meta::{ArgMeta, TensorMeta};
use crate::ops::PrimOp;
use crate::prim::Prim;
use crate::shape::reduction_output_shape;
use crate::views::tensor_arg;

/// Validates a reduction over the listed dimensions. Reduced dimensions are
/// removed from the shape; `all`/`any` force a boolean result dtype, the rest
/// keep the input dtype. The result is freshly allocated and contiguous.
pub(crate) fn reduction_meta(prim: &Prim, op: &PrimOp, args: &[ArgMeta]) -> PrimResult<TensorMeta> {
    let PrimOp::Reduce { kind, dims } = op else {
        return Err(PrimError::shape("reductions expect their own attributes"));
    };
    let a = tensor_arg(prim, args, 0)?;
    let shape = reduction_output_shape(&a.shape, dims)?;

    let dtype = if kind.forces_bool() {
        DType::Bool
    } else {
        a.dtype
    };

    Ok(TensorMeta::derived_from(a)
        .with_shape(shape)
        .with_dtype(dtype))
}

#[cfg(test)]
mod tests {
    use crate::device::Device;
    use crate::dtype::DType;
    use crate::error::PrimError;
    use crate::meta::{ArgMeta, TensorMeta};
    use crate::ops::{PrimOp, ReduceKind};
    use crate::registry;

    fn tensor(shape: &[usize], dtype: DType) -> ArgMeta {
        ArgMeta::Tensor(TensorMeta::contiguous(shape.to_vec(), dtype, Device::Cpu))
    }

    fn meta_of(op: PrimOp, args: &[ArgMeta]) -> Result<TensorMeta, PrimError> {
        registry::get(op.name()).expect("registered prim").meta(&op, args)
    }

    #[test]
    fn sum_drops_reduced_dims_and_keeps_dtype() {
        let out = meta_of(
            PrimOp::Reduce {
                kind: ReduceKind::Sum,
                dims: vec![1],
            },
            &[tensor(&[2, 3, 4], DType::F32)],
        )
        .expect("valid sum");
        assert_eq!(out.shape, vec![2, 4]);
        assert_eq!(out.dtype, DType::F32);
        assert!(out.is_contiguous());
    }

    #[test]
    fn full_reduction_yields_rank_zero() {
        let out = meta_of(
            PrimOp::Reduce {
                kind: ReduceKind::Amax,
                dims: vec![0, 1],
            },
            &[tensor(&[2, 3], DType::Si64)],
        )
        .expect("valid amax");
        assert_eq!(out.rank(), 0);
        assert_eq!(out.dtype, DType::Si64);
    }

    #[test]
    fn boolean_reductions_force_bool_dtype() {
        for kind in [ReduceKind::All, ReduceKind::Any] {
            let out = meta_of(
                PrimOp::Reduce {
                    kind,
                    dims: vec![0],
                },
                &[tensor(&[5], DType::F64)],
            )
            .expect("valid reduction");
            assert_eq!(out.dtype, DType::Bool);
        }
    }

    #[test]
    fn repeated_or_out_of_range_dims_fail() {
        let repeated = meta_of(
            PrimOp::Reduce {
                kind: ReduceKind::Sum,
                dims: vec![0, 0],
            },
            &[tensor(&[2, 3], DType::F32)],
        );
        assert!(matches!(repeated, Err(PrimError::Shape { .. })));

        let out_of_range = meta_of(
            PrimOp::Reduce {
                kind: ReduceKind::Sum,
                dims: vec![2],
            },
            &[tensor(&[2, 3], DType::F32)],
        );
        assert!(matches!(out_of_range, Err(PrimError::IndexOutOfRange { .. })));
    }
}
