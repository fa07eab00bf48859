//! Reductions on the reference backend.

use prims_rs::meta::TensorLike;
use prims_rs::ops::{PrimOp, ReduceKind};
use prims_rs::prim::{dispatch, Value};
use prims_rs::DType;
use prims_rs_backend_ref_cpu::{CpuBackend, CpuTensor};

fn reduce(kind: ReduceKind, dims: Vec<usize>, input: CpuTensor) -> CpuTensor {
    dispatch(
        &CpuBackend::new(),
        &PrimOp::Reduce { kind, dims },
        &mut [Value::Tensor(input)],
    )
    .expect("valid reduction")
}

#[test]
fn sum_over_one_dim() {
    let a = CpuTensor::from_f64s(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).expect("a");
    let summed = reduce(ReduceKind::Sum, vec![1], a);
    assert_eq!(summed.shape(), &[2]);
    assert_eq!(summed.to_f64_vec().expect("readback"), vec![6.0, 15.0]);
}

#[test]
fn sum_over_the_leading_dim() {
    let a = CpuTensor::from_f64s(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).expect("a");
    let summed = reduce(ReduceKind::Sum, vec![0], a);
    assert_eq!(summed.shape(), &[3]);
    assert_eq!(summed.to_f64_vec().expect("readback"), vec![5.0, 7.0, 9.0]);
}

#[test]
fn full_reduction_produces_rank_zero() {
    let a = CpuTensor::from_f64s(&[2, 2], &[1.0, -3.0, 7.0, 2.0]).expect("a");
    let peak = reduce(ReduceKind::Amax, vec![0, 1], a);
    assert_eq!(peak.shape(), &[] as &[usize]);
    assert_eq!(peak.to_f64_vec().expect("readback"), vec![7.0]);
}

#[test]
fn amin_tracks_minimums_per_slice() {
    let a = CpuTensor::from_i64s(&[2, 3], &[5, 1, 9, -2, 8, 3]).expect("a");
    let low = reduce(ReduceKind::Amin, vec![1], a);
    assert_eq!(low.to_i64_vec().expect("readback"), vec![1, -2]);
}

#[test]
fn prod_multiplies_integer_slices() {
    let a = CpuTensor::from_i64s(&[3], &[2, 3, 4]).expect("a");
    let product = reduce(ReduceKind::Prod, vec![0], a);
    assert_eq!(product.to_i64_vec().expect("readback"), vec![24]);
}

#[test]
fn boolean_reductions_force_bool_results() {
    let a = CpuTensor::from_f64s(&[2, 2], &[1.0, 0.0, 2.0, 3.0]).expect("a");
    let every = reduce(ReduceKind::All, vec![1], a);
    assert_eq!(every.dtype(), DType::Bool);
    assert_eq!(every.to_bool_vec().expect("readback"), vec![false, true]);

    let b = CpuTensor::from_bools(&[2, 2], &[false, false, true, false]).expect("b");
    let some = reduce(ReduceKind::Any, vec![1], b);
    assert_eq!(some.to_bool_vec().expect("readback"), vec![false, true]);
}

#[test]
fn empty_dims_reduce_nothing() {
    let a = CpuTensor::from_f64s(&[2, 2], &[1.0, 2.0, 3.0, 4.0]).expect("a");
    let same = reduce(ReduceKind::Sum, vec![], a);
    assert_eq!(same.shape(), &[2, 2]);
    assert_eq!(same.to_f64_vec().expect("readback"), vec![1.0, 2.0, 3.0, 4.0]);
}
