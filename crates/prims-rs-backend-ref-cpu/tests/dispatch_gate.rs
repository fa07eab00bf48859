//! Dispatch-order guarantees: validation gates execution, interception
//! precedes validation.

use std::sync::Mutex;

use prims_rs::backend::{BackendError, BackendResult, EagerBackend};
use prims_rs::meta::{TensorLike, TensorMeta};
use prims_rs::ops::{BinaryOp, PrimOp};
use prims_rs::prim::{dispatch, CustomDispatch, DispatchError, Prim, Value};
use prims_rs::{DType, Device, PrimError};
use prims_rs_backend_ref_cpu::{CpuBackend, CpuTensor};

/// Wraps the reference backend and records every `execute` call.
struct SpyBackend {
    inner: CpuBackend,
    calls: Mutex<Vec<String>>,
}

impl SpyBackend {
    fn new() -> Self {
        SpyBackend {
            inner: CpuBackend::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("spy calls lock").clone()
    }
}

impl EagerBackend for SpyBackend {
    type Tensor = CpuTensor;

    fn backend_name(&self) -> &str {
        "spy"
    }

    fn execute(&self, op: &PrimOp, args: &mut [Value<CpuTensor>]) -> BackendResult<CpuTensor> {
        self.calls
            .lock()
            .expect("spy calls lock")
            .push(op.name().to_string());
        self.inner.execute(op, args)
    }
}

#[test]
fn validation_failure_never_reaches_the_backend() {
    let spy = SpyBackend::new();
    let a = CpuTensor::from_f64s(&[2, 3], &[1.0; 6]).expect("tensor a");
    let b = CpuTensor::from_f64s(&[3, 2], &[1.0; 6]).expect("tensor b");

    let err = dispatch(
        &spy,
        &PrimOp::ElementwiseBinary(BinaryOp::Add),
        &mut [Value::Tensor(a), Value::Tensor(b)],
    )
    .expect_err("mismatched shapes must fail validation");

    match err {
        DispatchError::Validation(PrimError::ShapeMismatch { expected, got }) => {
            assert_eq!(expected, vec![2, 3]);
            assert_eq!(got, vec![3, 2]);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(spy.calls().is_empty(), "backend ran on invalid arguments");
}

#[test]
fn valid_call_executes_exactly_once() {
    let spy = SpyBackend::new();
    let a = CpuTensor::from_f64s(&[2], &[1.0, 2.0]).expect("tensor a");
    let b = CpuTensor::from_f64s(&[2], &[3.0, 4.0]).expect("tensor b");

    let sum = dispatch(
        &spy,
        &PrimOp::ElementwiseBinary(BinaryOp::Add),
        &mut [Value::Tensor(a), Value::Tensor(b)],
    )
    .expect("valid add");

    assert_eq!(sum.to_f64_vec().expect("readback"), vec![4.0, 6.0]);
    assert_eq!(spy.calls(), vec!["add".to_string()]);
}

#[test]
fn unimplemented_prims_fail_during_validation() {
    let spy = SpyBackend::new();
    let a = CpuTensor::from_i64s(&[2], &[8, 16]).expect("tensor a");
    let b = CpuTensor::from_i64s(&[2], &[1, 2]).expect("tensor b");

    let err = dispatch(
        &spy,
        &PrimOp::ElementwiseBinary(BinaryOp::ShiftRightLogical),
        &mut [Value::Tensor(a), Value::Tensor(b)],
    )
    .expect_err("shift_right_logical is not implemented");

    assert!(matches!(
        err,
        DispatchError::Validation(PrimError::NotImplemented {
            op: "shift_right_logical",
            ..
        })
    ));
    assert!(spy.calls().is_empty());
}

/// Tensor wrapper whose `try_dispatch` claims every call it appears in.
#[derive(Debug, Clone)]
struct ClaimingTensor {
    meta: TensorMeta,
    claims: bool,
}

impl TensorLike for ClaimingTensor {
    fn shape(&self) -> &[usize] {
        &self.meta.shape
    }

    fn strides(&self) -> &[usize] {
        &self.meta.strides
    }

    fn dtype(&self) -> DType {
        self.meta.dtype
    }

    fn device(&self) -> Device {
        self.meta.device
    }
}

impl CustomDispatch for ClaimingTensor {
    fn try_dispatch(
        &self,
        _prim: &Prim,
        _op: &PrimOp,
        _args: &[Value<Self>],
    ) -> Option<BackendResult<Self>> {
        self.claims.then(|| Ok(self.clone()))
    }
}

/// Backend for [`ClaimingTensor`] that must never run.
struct RefusingBackend {
    executions: Mutex<u32>,
}

impl EagerBackend for RefusingBackend {
    type Tensor = ClaimingTensor;

    fn backend_name(&self) -> &str {
        "refusing"
    }

    fn execute(
        &self,
        _op: &PrimOp,
        _args: &mut [Value<ClaimingTensor>],
    ) -> BackendResult<ClaimingTensor> {
        *self.executions.lock().expect("executions lock") += 1;
        Err(BackendError::execution("this backend must not run"))
    }
}

#[test]
fn interception_precedes_validation_and_execution() {
    let backend = RefusingBackend {
        executions: Mutex::new(0),
    };
    // Shapes deliberately disagree: interception must win before validation
    // gets a chance to reject the call.
    let quiet = ClaimingTensor {
        meta: TensorMeta::contiguous(vec![2, 3], DType::F32, Device::Cpu),
        claims: false,
    };
    let claiming = ClaimingTensor {
        meta: TensorMeta::contiguous(vec![7], DType::F32, Device::Cpu),
        claims: true,
    };

    let result = dispatch(
        &backend,
        &PrimOp::ElementwiseBinary(BinaryOp::Add),
        &mut [Value::Tensor(quiet), Value::Tensor(claiming)],
    )
    .expect("the claiming argument handles the call");

    assert_eq!(result.shape(), &[7]);
    assert_eq!(*backend.executions.lock().expect("executions lock"), 0);
}

#[test]
fn without_a_claim_validation_still_applies() {
    let backend = RefusingBackend {
        executions: Mutex::new(0),
    };
    let a = ClaimingTensor {
        meta: TensorMeta::contiguous(vec![2], DType::F32, Device::Cpu),
        claims: false,
    };
    let b = ClaimingTensor {
        meta: TensorMeta::contiguous(vec![3], DType::F32, Device::Cpu),
        claims: false,
    };

    let err = dispatch(
        &backend,
        &PrimOp::ElementwiseBinary(BinaryOp::Add),
        &mut [Value::Tensor(a), Value::Tensor(b)],
    )
    .expect_err("no claim, so validation rejects the shapes");

    assert!(matches!(
        err,
        DispatchError::Validation(PrimError::ShapeMismatch { .. })
    ));
    assert_eq!(*backend.executions.lock().expect("executions lock"), 0);
}
