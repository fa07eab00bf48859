//! Shared metadata function for the elementwise primitives.

use crate::error::{PrimError, PrimResult};
use crate::meta::{check_same_device, check_same_dtype, check_same_shape, ArgMeta, TensorMeta};
use crate::prim::{Prim, Promotion};
use crate::ops::PrimOp;
use crate::shape::contiguous_strides_for;

/// Validates an elementwise call: all tensor arguments must agree on device,
/// shape, and dtype; scalars are exempt. The result descriptor derives from
/// the first tensor argument, or from the first scalar when no tensors are
/// present.
pub(crate) fn elementwise_meta(
    prim: &Prim,
    _op: &PrimOp,
    args: &[ArgMeta],
) -> PrimResult<TensorMeta> {
    if args.is_empty() {
        return Err(PrimError::EmptyArgs { op: prim.name });
    }

    check_same_device(prim.name, args, true)?;
    check_same_shape(args)?;
    check_same_dtype(args)?;

    let promotion = prim.promotion.unwrap_or(Promotion::Default);

    match args.iter().find_map(ArgMeta::as_tensor) {
        Some(first) => {
            let dtype = promote(first.dtype, promotion);
            let strides = inferred_strides(first, args);
            Ok(TensorMeta::derived_from(first)
                .with_strides(strides)
                .with_dtype(dtype))
        }
        None => {
            // All-scalar call: rank-zero CPU result typed after the first
            // scalar.
            let scalar = match &args[0] {
                ArgMeta::Scalar(scalar) => *scalar,
                ArgMeta::Tensor(_) => unreachable!("no tensor arguments present"),
            };
            let dtype = promote(scalar.dtype(), promotion);
            Ok(TensorMeta::contiguous(
                Vec::new(),
                dtype,
                crate::device::Device::Cpu,
            ))
        }
    }
}

fn promote(dtype: crate::dtype::DType, promotion: Promotion) -> crate::dtype::DType {
    match promotion {
        Promotion::Default => dtype,
        Promotion::AlwaysBool => crate::dtype::DType::Bool,
        Promotion::ComplexToFloat => dtype.corresponding_real_dtype(),
    }
}

// Placeholder stride rule: keep the first tensor's strides when every tensor
// agrees on them and none are zero; otherwise fall back to the contiguous
// layout. This is a known approximation of real layout propagation and is
// expected to be replaced wholesale.
fn inferred_strides(first: &TensorMeta, args: &[ArgMeta]) -> Vec<usize> {
    let strides_disagree = args
        .iter()
        .filter_map(ArgMeta::as_tensor)
        .any(|meta| meta.strides != first.strides);
    let has_zero_stride = first.numel() > 0 && first.strides.iter().any(|&stride| stride == 0);

    if strides_disagree || has_zero_stride {
        contiguous_strides_for(&first.shape)
    } else {
        first.strides.clone()
    }
}

#[cfg(test)]
mod tests {
    use crate::device::Device;
    use crate::dtype::DType;
    use crate::error::PrimError;
    use crate::meta::{ArgMeta, Scalar, TensorMeta};
    use crate::ops::{BinaryOp, PrimOp, UnaryOp};
    use crate::registry;

    fn tensor(shape: &[usize], dtype: DType) -> ArgMeta {
        ArgMeta::Tensor(TensorMeta::contiguous(shape.to_vec(), dtype, Device::Cpu))
    }

    fn meta_of(op: PrimOp, args: &[ArgMeta]) -> Result<TensorMeta, PrimError> {
        registry::get(op.name()).expect("registered prim").meta(&op, args)
    }

    #[test]
    fn default_promotion_keeps_input_dtype() {
        let out = meta_of(
            PrimOp::ElementwiseBinary(BinaryOp::Add),
            &[tensor(&[2, 3], DType::F32), tensor(&[2, 3], DType::F32)],
        )
        .expect("valid add");
        assert_eq!(out.dtype, DType::F32);
        assert_eq!(out.shape, vec![2, 3]);
    }

    #[test]
    fn comparison_promotion_forces_bool() {
        let out = meta_of(
            PrimOp::ElementwiseBinary(BinaryOp::Lt),
            &[tensor(&[4], DType::Si32), tensor(&[4], DType::Si32)],
        )
        .expect("valid lt");
        assert_eq!(out.dtype, DType::Bool);
    }

    #[test]
    fn complex_to_float_promotion_maps_abs() {
        let out = meta_of(
            PrimOp::ElementwiseUnary(UnaryOp::Abs),
            &[tensor(&[3], DType::Cf64)],
        )
        .expect("valid abs");
        assert_eq!(out.dtype, DType::F64);

        let real = meta_of(
            PrimOp::ElementwiseUnary(UnaryOp::Abs),
            &[tensor(&[3], DType::F32)],
        )
        .expect("valid abs");
        assert_eq!(real.dtype, DType::F32);
    }

    #[test]
    fn mismatched_shapes_fail() {
        let err = meta_of(
            PrimOp::ElementwiseBinary(BinaryOp::Add),
            &[tensor(&[2, 3], DType::F32), tensor(&[3, 2], DType::F32)],
        )
        .expect_err("shape mismatch");
        assert!(matches!(err, PrimError::ShapeMismatch { .. }));
    }

    #[test]
    fn mismatched_devices_fail() {
        let cuda = ArgMeta::Tensor(TensorMeta::contiguous(
            vec![2],
            DType::F32,
            Device::Cuda { index: 0 },
        ));
        let err = meta_of(
            PrimOp::ElementwiseBinary(BinaryOp::Mul),
            &[tensor(&[2], DType::F32), cuda],
        )
        .expect_err("device mismatch");
        assert!(matches!(err, PrimError::DeviceMismatch { .. }));
    }

    #[test]
    fn scalar_operands_are_exempt_from_checks() {
        let out = meta_of(
            PrimOp::ElementwiseBinary(BinaryOp::Mul),
            &[tensor(&[2, 2], DType::F64), ArgMeta::Scalar(Scalar::Int(3))],
        )
        .expect("tensor-scalar mul");
        assert_eq!(out.dtype, DType::F64);
        assert_eq!(out.shape, vec![2, 2]);
    }

    #[test]
    fn all_scalar_call_yields_rank_zero_descriptor() {
        let out = meta_of(
            PrimOp::ElementwiseBinary(BinaryOp::Add),
            &[
                ArgMeta::Scalar(Scalar::Float(1.0)),
                ArgMeta::Scalar(Scalar::Float(2.0)),
            ],
        )
        .expect("scalar add");
        assert_eq!(out.rank(), 0);
        assert_eq!(out.dtype, DType::F64);
        assert_eq!(out.device, Device::Cpu);
    }

    #[test]
    fn disagreeing_strides_fall_back_to_contiguous() {
        let transposed = ArgMeta::Tensor(
            TensorMeta::contiguous(vec![2, 3], DType::F32, Device::Cpu)
                .with_strides(vec![1, 2]),
        );
        let out = meta_of(
            PrimOp::ElementwiseBinary(BinaryOp::Add),
            &[transposed, tensor(&[2, 3], DType::F32)],
        )
        .expect("valid add");
        assert_eq!(out.strides, vec![3, 1]);
    }

    #[test]
    fn zero_strides_fall_back_to_contiguous() {
        let broadcast = ArgMeta::Tensor(
            TensorMeta::contiguous(vec![2, 3], DType::F32, Device::Cpu)
                .with_strides(vec![0, 1]),
        );
        let out = meta_of(PrimOp::ElementwiseUnary(UnaryOp::Neg), &[broadcast])
            .expect("valid neg");
        assert_eq!(out.strides, vec![3, 1]);
    }

    #[test]
    fn agreeing_strides_are_preserved() {
        let a = ArgMeta::Tensor(
            TensorMeta::contiguous(vec![2, 3], DType::F32, Device::Cpu)
                .with_strides(vec![1, 2]),
        );
        let b = a.clone();
        let out = meta_of(PrimOp::ElementwiseBinary(BinaryOp::Add), &[a, b])
            .expect("valid add");
        assert_eq!(out.strides, vec![1, 2]);
    }

    #[test]
    fn empty_argument_list_fails() {
        let err = meta_of(PrimOp::ElementwiseBinary(BinaryOp::Add), &[])
            .expect_err("no arguments");
        assert!(matches!(err, PrimError::EmptyArgs { op: "add" }));
    }
}
