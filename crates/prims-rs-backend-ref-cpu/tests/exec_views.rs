//! View semantics: aliasing, stride laws, and the shape composites.

use prims_rs::meta::TensorLike;
use prims_rs::ops::PrimOp;
use prims_rs::prim::{collapse, dispatch, Value};
use prims_rs_backend_ref_cpu::{CpuBackend, CpuTensor};

fn run(op: PrimOp, args: Vec<Value<CpuTensor>>) -> CpuTensor {
    let mut args = args;
    dispatch(&CpuBackend::new(), &op, &mut args).expect("valid prim call")
}

#[test]
fn broadcast_in_dim_repeats_through_zero_strides() {
    let a = CpuTensor::from_f64s(&[2], &[1.0, 2.0]).expect("a");
    let broadcast = run(
        PrimOp::BroadcastInDim {
            shape: vec![3, 2],
            broadcast_dims: vec![1],
        },
        vec![Value::Tensor(a)],
    );
    assert_eq!(broadcast.shape(), &[3, 2]);
    assert_eq!(broadcast.strides(), &[0, 1]);
    assert_eq!(
        broadcast.to_f64_vec().expect("readback"),
        vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0]
    );
}

#[test]
fn collapse_view_aliases_the_source_storage() {
    let a = CpuTensor::from_f64s(&[2, 3], &[0.0; 6]).expect("a");
    let flat = run(
        PrimOp::CollapseView { start: 0, end: 2 },
        vec![Value::Tensor(a.clone())],
    );
    assert_eq!(flat.shape(), &[6]);

    // Writing through the view must be visible through the source handle.
    let src = CpuTensor::from_f64s(&[6], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).expect("src");
    run(PrimOp::CopyTo, vec![Value::Tensor(flat), Value::Tensor(src)]);
    assert_eq!(
        a.to_f64_vec().expect("readback"),
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
    );
}

#[test]
fn collapse_then_split_restores_the_geometry() {
    let a = CpuTensor::from_f64s(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).expect("a");
    let flat = run(
        PrimOp::CollapseView { start: 0, end: 2 },
        vec![Value::Tensor(a.clone())],
    );
    let restored = run(
        PrimOp::SplitDim {
            dim: 0,
            outer_length: 2,
        },
        vec![Value::Tensor(flat)],
    );
    assert_eq!(restored.shape(), a.shape());
    assert_eq!(restored.strides(), a.strides());
    assert_eq!(
        restored.to_f64_vec().expect("readback"),
        a.to_f64_vec().expect("readback")
    );
}

#[test]
fn squeeze_drops_unit_dimensions() {
    let a = CpuTensor::from_f64s(&[1, 3, 1], &[1.0, 2.0, 3.0]).expect("a");
    let squeezed = run(
        PrimOp::Squeeze { dims: vec![0, 2] },
        vec![Value::Tensor(a)],
    );
    assert_eq!(squeezed.shape(), &[3]);
    assert_eq!(squeezed.to_f64_vec().expect("readback"), vec![1.0, 2.0, 3.0]);
}

#[test]
fn concatenate_joins_along_the_requested_dim() {
    let a = CpuTensor::from_f64s(&[2, 1], &[1.0, 2.0]).expect("a");
    let b = CpuTensor::from_f64s(&[2, 2], &[3.0, 4.0, 5.0, 6.0]).expect("b");
    let joined = run(
        PrimOp::Concatenate { dim: 1 },
        vec![Value::Tensor(a), Value::Tensor(b)],
    );
    assert_eq!(joined.shape(), &[2, 3]);
    assert_eq!(
        joined.to_f64_vec().expect("readback"),
        vec![1.0, 3.0, 4.0, 2.0, 5.0, 6.0]
    );
}

#[test]
fn reshape_copies_in_logical_order() {
    let a = CpuTensor::from_f64s(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).expect("a");
    let reshaped = run(PrimOp::Reshape { shape: vec![3, 2] }, vec![Value::Tensor(a)]);
    assert_eq!(reshaped.shape(), &[3, 2]);
    assert_eq!(
        reshaped.to_f64_vec().expect("readback"),
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]
    );
}

#[test]
fn reshape_materializes_broadcast_views() {
    let a = CpuTensor::from_f64s(&[2], &[1.0, 2.0]).expect("a");
    let broadcast = run(
        PrimOp::BroadcastInDim {
            shape: vec![3, 2],
            broadcast_dims: vec![1],
        },
        vec![Value::Tensor(a)],
    );
    let flat = run(PrimOp::Reshape { shape: vec![6] }, vec![Value::Tensor(broadcast)]);
    assert_eq!(
        flat.to_f64_vec().expect("readback"),
        vec![1.0, 2.0, 1.0, 2.0, 1.0, 2.0]
    );
}

#[test]
fn collapse_composite_works_on_any_layout() {
    let a = CpuTensor::from_f64s(&[2, 2, 2], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0])
        .expect("a");
    let collapsed = collapse(&CpuBackend::new(), a, 1, 3).expect("collapse");
    assert_eq!(collapsed.shape(), &[2, 4]);
    assert_eq!(
        collapsed.to_f64_vec().expect("readback"),
        vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]
    );
}
