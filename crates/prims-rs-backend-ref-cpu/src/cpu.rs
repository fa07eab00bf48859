//! Dense strided execution of the primitive set.

use std::sync::{Arc, RwLock};

use half::{bf16, f16};
use prims_rs::backend::{BackendError, BackendResult, EagerBackend};
use prims_rs::dtype::{DType, TypeCategory};
use prims_rs::meta::{Scalar, TensorLike, TensorMeta};
use prims_rs::ops::{BinaryOp, PrimOp, ReduceKind, UnaryOp};
use prims_rs::prim::{arg_metas, CustomDispatch, Value};
use prims_rs::registry;
use prims_rs::Device;

/// Element buffer holding the canonical representation of one type category.
///
/// The descriptor dtype stays exact; narrow dtypes round through their real
/// precision on `convert_element_type` but are stored widened.
#[derive(Debug, Clone, PartialEq)]
pub enum Storage {
    Bool(Vec<bool>),
    Int(Vec<i64>),
    Float(Vec<f64>),
    Complex(Vec<(f64, f64)>),
}

impl Storage {
    pub fn len(&self) -> usize {
        match self {
            Storage::Bool(data) => data.len(),
            Storage::Int(data) => data.len(),
            Storage::Float(data) => data.len(),
            Storage::Complex(data) => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn category(&self) -> TypeCategory {
        match self {
            Storage::Bool(_) => TypeCategory::Boolean,
            Storage::Int(_) => TypeCategory::Integral,
            Storage::Float(_) => TypeCategory::Floating,
            Storage::Complex(_) => TypeCategory::Complex,
        }
    }

    fn zeroed(category: TypeCategory, len: usize) -> Storage {
        match category {
            TypeCategory::Boolean => Storage::Bool(vec![false; len]),
            TypeCategory::Integral => Storage::Int(vec![0; len]),
            TypeCategory::Floating => Storage::Float(vec![0.0; len]),
            TypeCategory::Complex => Storage::Complex(vec![(0.0, 0.0); len]),
        }
    }
}

/// Host tensor: an immutable descriptor plus shared, lockable storage.
/// Views hand out new descriptors over the same storage, so in-place writes
/// through one handle are visible through every alias.
#[derive(Debug, Clone)]
pub struct CpuTensor {
    meta: TensorMeta,
    storage: Arc<RwLock<Storage>>,
}

impl CpuTensor {
    /// Wraps contiguous element data in a tensor. The storage category must
    /// match the dtype and the length must match the shape.
    pub fn with_storage(meta: TensorMeta, storage: Storage) -> BackendResult<Self> {
        if storage.category() != meta.dtype.category() {
            return Err(BackendError::execution(format!(
                "storage category {:?} does not match dtype {:?}",
                storage.category(),
                meta.dtype
            )));
        }
        if !meta.is_contiguous() {
            return Err(BackendError::execution(
                "with_storage expects a contiguous descriptor",
            ));
        }
        if storage.len() != meta.numel() {
            return Err(BackendError::execution(format!(
                "storage holds {} elements for a shape of {}",
                storage.len(),
                meta.numel()
            )));
        }
        Ok(CpuTensor {
            meta,
            storage: Arc::new(RwLock::new(storage)),
        })
    }

    pub fn from_f64s(shape: &[usize], values: &[f64]) -> BackendResult<Self> {
        Self::with_storage(
            TensorMeta::contiguous(shape.to_vec(), DType::F64, Device::Cpu),
            Storage::Float(values.to_vec()),
        )
    }

    pub fn from_i64s(shape: &[usize], values: &[i64]) -> BackendResult<Self> {
        Self::with_storage(
            TensorMeta::contiguous(shape.to_vec(), DType::Si64, Device::Cpu),
            Storage::Int(values.to_vec()),
        )
    }

    pub fn from_bools(shape: &[usize], values: &[bool]) -> BackendResult<Self> {
        Self::with_storage(
            TensorMeta::contiguous(shape.to_vec(), DType::Bool, Device::Cpu),
            Storage::Bool(values.to_vec()),
        )
    }

    pub fn from_complex(shape: &[usize], values: &[(f64, f64)]) -> BackendResult<Self> {
        Self::with_storage(
            TensorMeta::contiguous(shape.to_vec(), DType::Cf64, Device::Cpu),
            Storage::Complex(values.to_vec()),
        )
    }

    pub fn zeros(shape: &[usize], dtype: DType) -> BackendResult<Self> {
        let meta = TensorMeta::contiguous(shape.to_vec(), dtype, Device::Cpu);
        let storage = Storage::zeroed(dtype.category(), meta.numel());
        Self::with_storage(meta, storage)
    }

    fn read_storage(&self) -> BackendResult<std::sync::RwLockReadGuard<'_, Storage>> {
        self.storage
            .read()
            .map_err(|_| BackendError::execution("tensor storage lock poisoned"))
    }

    fn write_storage(&self) -> BackendResult<std::sync::RwLockWriteGuard<'_, Storage>> {
        self.storage
            .write()
            .map_err(|_| BackendError::execution("tensor storage lock poisoned"))
    }

    /// Materializes the logical elements in row-major order, honoring the
    /// descriptor's strides (including zero strides of broadcast views).
    pub fn gather(&self) -> BackendResult<Storage> {
        let guard = self.read_storage()?;
        let offs = offsets(&self.meta);
        Ok(match &*guard {
            Storage::Bool(data) => Storage::Bool(pick(data, &offs)?),
            Storage::Int(data) => Storage::Int(pick(data, &offs)?),
            Storage::Float(data) => Storage::Float(pick(data, &offs)?),
            Storage::Complex(data) => Storage::Complex(pick(data, &offs)?),
        })
    }

    pub fn to_f64_vec(&self) -> BackendResult<Vec<f64>> {
        match self.gather()? {
            Storage::Float(data) => Ok(data),
            Storage::Int(data) => Ok(data.into_iter().map(|v| v as f64).collect()),
            Storage::Bool(data) => Ok(data.into_iter().map(|v| if v { 1.0 } else { 0.0 }).collect()),
            Storage::Complex(_) => Err(BackendError::execution(
                "complex tensors cannot read back as f64",
            )),
        }
    }

    pub fn to_i64_vec(&self) -> BackendResult<Vec<i64>> {
        match self.gather()? {
            Storage::Int(data) => Ok(data),
            Storage::Bool(data) => Ok(data.into_iter().map(i64::from).collect()),
            other => Err(BackendError::execution(format!(
                "{:?} tensors cannot read back as i64",
                other.category()
            ))),
        }
    }

    pub fn to_bool_vec(&self) -> BackendResult<Vec<bool>> {
        match self.gather()? {
            Storage::Bool(data) => Ok(data),
            other => Err(BackendError::execution(format!(
                "{:?} tensors cannot read back as bool",
                other.category()
            ))),
        }
    }

    /// Builds a freshly allocated tensor from logical-order elements,
    /// scattering when the descriptor is not contiguous.
    fn from_logical(meta: TensorMeta, logical: Storage) -> BackendResult<CpuTensor> {
        if meta.is_contiguous() {
            return Ok(CpuTensor {
                meta,
                storage: Arc::new(RwLock::new(logical)),
            });
        }
        let offs = offsets(&meta);
        let size = offs.iter().max().map_or(0, |max| max + 1);
        let mut storage = Storage::zeroed(logical.category(), size);
        scatter(&mut storage, &offs, &logical)?;
        Ok(CpuTensor {
            meta,
            storage: Arc::new(RwLock::new(storage)),
        })
    }
}

impl TensorLike for CpuTensor {
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

impl CustomDispatch for CpuTensor {}

/// Physical offset of every logical element, row-major iteration order.
fn offsets(meta: &TensorMeta) -> Vec<usize> {
    let numel = meta.numel();
    let mut result = Vec::with_capacity(numel);
    if numel == 0 {
        return result;
    }
    let mut index = vec![0usize; meta.rank()];
    loop {
        result.push(
            index
                .iter()
                .zip(meta.strides.iter())
                .map(|(&i, &s)| i * s)
                .sum(),
        );
        let mut dim = meta.rank();
        loop {
            if dim == 0 {
                return result;
            }
            dim -= 1;
            index[dim] += 1;
            if index[dim] < meta.shape[dim] {
                break;
            }
            index[dim] = 0;
        }
    }
}

fn pick<T: Copy>(data: &[T], offsets: &[usize]) -> BackendResult<Vec<T>> {
    offsets
        .iter()
        .map(|&offset| {
            data.get(offset)
                .copied()
                .ok_or_else(|| BackendError::execution("stride reaches outside storage"))
        })
        .collect()
}

fn scatter(storage: &mut Storage, offsets: &[usize], logical: &Storage) -> BackendResult<()> {
    fn place<T: Copy>(dst: &mut [T], offsets: &[usize], src: &[T]) -> BackendResult<()> {
        for (&offset, &value) in offsets.iter().zip(src.iter()) {
            *dst.get_mut(offset)
                .ok_or_else(|| BackendError::execution("stride reaches outside storage"))? = value;
        }
        Ok(())
    }
    match (storage, logical) {
        (Storage::Bool(dst), Storage::Bool(src)) => place(dst, offsets, src),
        (Storage::Int(dst), Storage::Int(src)) => place(dst, offsets, src),
        (Storage::Float(dst), Storage::Float(src)) => place(dst, offsets, src),
        (Storage::Complex(dst), Storage::Complex(src)) => place(dst, offsets, src),
        _ => Err(BackendError::execution("storage categories diverge")),
    }
}

/// Recomputes the validated result descriptor. Dispatch has already run the
/// metadata function by the time `execute` is called, so a failure here means
/// the backend was driven outside the normal path.
fn output_meta(op: &PrimOp, args: &[Value<CpuTensor>]) -> BackendResult<TensorMeta> {
    let prim = registry::get(op.name())
        .ok_or_else(|| BackendError::unimplemented(op.name(), "unknown primitive"))?;
    prim.meta(op, &arg_metas(args))
        .map_err(|err| BackendError::execution(format!("arguments failed validation: {err}")))
}

fn scalar_as_storage(scalar: Scalar, category: TypeCategory, len: usize) -> BackendResult<Storage> {
    Ok(match category {
        TypeCategory::Boolean => Storage::Bool(vec![scalar_truthy(scalar); len]),
        TypeCategory::Integral => {
            let value = match scalar {
                Scalar::Bool(v) => i64::from(v),
                Scalar::Int(v) => v,
                Scalar::Float(v) => v as i64,
                Scalar::Complex { .. } => {
                    return Err(BackendError::execution(
                        "complex scalar in an integral operation",
                    ))
                }
            };
            Storage::Int(vec![value; len])
        }
        TypeCategory::Floating => {
            let value = match scalar {
                Scalar::Bool(v) => {
                    if v {
                        1.0
                    } else {
                        0.0
                    }
                }
                Scalar::Int(v) => v as f64,
                Scalar::Float(v) => v,
                Scalar::Complex { .. } => {
                    return Err(BackendError::execution(
                        "complex scalar in a floating operation",
                    ))
                }
            };
            Storage::Float(vec![value; len])
        }
        TypeCategory::Complex => {
            let value = match scalar {
                Scalar::Bool(v) => (if v { 1.0 } else { 0.0 }, 0.0),
                Scalar::Int(v) => (v as f64, 0.0),
                Scalar::Float(v) => (v, 0.0),
                Scalar::Complex { re, im } => (re, im),
            };
            Storage::Complex(vec![value; len])
        }
    })
}

fn scalar_truthy(scalar: Scalar) -> bool {
    match scalar {
        Scalar::Bool(v) => v,
        Scalar::Int(v) => v != 0,
        Scalar::Float(v) => v != 0.0,
        Scalar::Complex { re, im } => re != 0.0 || im != 0.0,
    }
}

/// Materializes one operand in logical order, splatting scalars to the
/// compute category.
fn operand(
    value: &Value<CpuTensor>,
    category: TypeCategory,
    len: usize,
) -> BackendResult<Storage> {
    match value {
        Value::Tensor(tensor) => tensor.gather(),
        Value::Scalar(scalar) => scalar_as_storage(*scalar, category, len),
    }
}

fn compute_category(args: &[Value<CpuTensor>]) -> BackendResult<TypeCategory> {
    for value in args {
        if let Value::Tensor(tensor) = value {
            return Ok(tensor.meta.dtype.category());
        }
    }
    match args.first() {
        Some(Value::Scalar(scalar)) => Ok(scalar.dtype().category()),
        _ => Err(BackendError::execution("operation has no arguments")),
    }
}

/// The reference executor.
#[derive(Debug, Default, Clone)]
pub struct CpuBackend;

impl CpuBackend {
    pub fn new() -> Self {
        CpuBackend
    }
}

impl EagerBackend for CpuBackend {
    type Tensor = CpuTensor;

    fn backend_name(&self) -> &str {
        "ref-cpu"
    }

    fn execute(&self, op: &PrimOp, args: &mut [Value<CpuTensor>]) -> BackendResult<CpuTensor> {
        match op {
            PrimOp::ElementwiseUnary(unary) => op_unary(*unary, op, args),
            PrimOp::ElementwiseBinary(binary) => op_binary(*binary, op, args),
            PrimOp::BroadcastInDim { .. }
            | PrimOp::CollapseView { .. }
            | PrimOp::SplitDim { .. }
            | PrimOp::Squeeze { .. } => op_view(op, args),
            PrimOp::Concatenate { dim } => op_concatenate(*dim, op, args),
            PrimOp::Reshape { .. } => op_reshape(op, args),
            PrimOp::Select => op_select(op, args),
            PrimOp::ConvertElementType { .. } => op_convert(op, args),
            PrimOp::DevicePut { device } => op_device_put(*device, op, args),
            PrimOp::CopyTo => op_copy_to(op, args),
            PrimOp::Resize { .. } => op_resize(op, args),
            PrimOp::Reduce { kind, dims } => op_reduce(*kind, dims, op, args),
        }
    }
}

fn op_unary(
    unary: UnaryOp,
    op: &PrimOp,
    args: &[Value<CpuTensor>],
) -> BackendResult<CpuTensor> {
    let out_meta = output_meta(op, args)?;
    let category = compute_category(args)?;
    let input = operand(
        args.first()
            .ok_or_else(|| BackendError::execution("unary op without an argument"))?,
        category,
        out_meta.numel(),
    )?;

    let storage = match input {
        Storage::Float(data) => unary_float(unary, &data)?,
        Storage::Int(data) => unary_int(unary, &data)?,
        Storage::Bool(data) => unary_bool(unary, &data)?,
        Storage::Complex(data) => unary_complex(unary, &data)?,
    };
    CpuTensor::from_logical(out_meta, storage)
}

fn unary_float(op: UnaryOp, data: &[f64]) -> BackendResult<Storage> {
    let map = |f: fn(f64) -> f64| Storage::Float(data.iter().map(|&x| f(x)).collect());
    Ok(match op {
        UnaryOp::Abs => map(f64::abs),
        UnaryOp::Acos => map(f64::acos),
        UnaryOp::Acosh => map(f64::acosh),
        UnaryOp::Asin => map(f64::asin),
        UnaryOp::Atan => map(f64::atan),
        UnaryOp::Cbrt => map(f64::cbrt),
        UnaryOp::Ceil => map(f64::ceil),
        UnaryOp::Cos => map(f64::cos),
        UnaryOp::Cosh => map(f64::cosh),
        UnaryOp::Erf => map(erf),
        UnaryOp::Erfc => map(|x| 1.0 - erf(x)),
        UnaryOp::Exp => map(f64::exp),
        UnaryOp::Expm1 => map(f64::exp_m1),
        UnaryOp::Floor => map(f64::floor),
        UnaryOp::IsFinite => Storage::Bool(data.iter().map(|x| x.is_finite()).collect()),
        UnaryOp::Log => map(f64::ln),
        UnaryOp::Log1p => map(f64::ln_1p),
        UnaryOp::Neg => map(|x| -x),
        UnaryOp::Reciprocal => map(|x| 1.0 / x),
        UnaryOp::Round => map(f64::round_ties_even),
        UnaryOp::Rsqrt => map(|x| 1.0 / x.sqrt()),
        UnaryOp::Sign => map(|x| {
            if x == 0.0 {
                0.0
            } else if x.is_nan() {
                f64::NAN
            } else {
                x.signum()
            }
        }),
        UnaryOp::Sin => map(f64::sin),
        UnaryOp::Sinh => map(f64::sinh),
        UnaryOp::Sqrt => map(f64::sqrt),
        UnaryOp::Square => map(|x| x * x),
        UnaryOp::Tan => map(f64::tan),
        UnaryOp::BesselI0e
        | UnaryOp::BesselI1e
        | UnaryOp::Digamma
        | UnaryOp::ErfInv
        | UnaryOp::Lgamma => {
            return Err(BackendError::unimplemented(
                op.name(),
                "special function is not lowered in the reference backend",
            ))
        }
        UnaryOp::BitwiseNot => {
            return Err(BackendError::unimplemented(
                op.name(),
                "bitwise negation of floating-point elements",
            ))
        }
    })
}

fn unary_int(op: UnaryOp, data: &[i64]) -> BackendResult<Storage> {
    Ok(match op {
        UnaryOp::Abs => Storage::Int(data.iter().map(|&x| x.wrapping_abs()).collect()),
        UnaryOp::Neg => Storage::Int(data.iter().map(|&x| x.wrapping_neg()).collect()),
        UnaryOp::Sign => Storage::Int(data.iter().map(|&x| x.signum()).collect()),
        UnaryOp::Square => Storage::Int(data.iter().map(|&x| x.wrapping_mul(x)).collect()),
        UnaryOp::BitwiseNot => Storage::Int(data.iter().map(|&x| !x).collect()),
        // Integers are already integral and always finite.
        UnaryOp::Ceil | UnaryOp::Floor | UnaryOp::Round => Storage::Int(data.to_vec()),
        UnaryOp::IsFinite => Storage::Bool(vec![true; data.len()]),
        _ => {
            return Err(BackendError::unimplemented(
                op.name(),
                "integral inputs are not lowered for this operation",
            ))
        }
    })
}

fn unary_bool(op: UnaryOp, data: &[bool]) -> BackendResult<Storage> {
    Ok(match op {
        UnaryOp::BitwiseNot => Storage::Bool(data.iter().map(|&x| !x).collect()),
        UnaryOp::IsFinite => Storage::Bool(vec![true; data.len()]),
        _ => {
            return Err(BackendError::unimplemented(
                op.name(),
                "boolean inputs are not lowered for this operation",
            ))
        }
    })
}

fn unary_complex(op: UnaryOp, data: &[(f64, f64)]) -> BackendResult<Storage> {
    Ok(match op {
        UnaryOp::Abs => Storage::Float(data.iter().map(|&(re, im)| re.hypot(im)).collect()),
        UnaryOp::Neg => Storage::Complex(data.iter().map(|&(re, im)| (-re, -im)).collect()),
        UnaryOp::IsFinite => Storage::Bool(
            data.iter()
                .map(|&(re, im)| re.is_finite() && im.is_finite())
                .collect(),
        ),
        _ => {
            return Err(BackendError::unimplemented(
                op.name(),
                "complex inputs are not lowered for this operation",
            ))
        }
    })
}

fn op_binary(
    binary: BinaryOp,
    op: &PrimOp,
    args: &[Value<CpuTensor>],
) -> BackendResult<CpuTensor> {
    if args.len() != 2 {
        return Err(BackendError::execution(format!(
            "{} expects two arguments, got {}",
            op.name(),
            args.len()
        )));
    }
    let out_meta = output_meta(op, args)?;
    let category = compute_category(args)?;
    let lhs = operand(&args[0], category, out_meta.numel())?;
    let rhs = operand(&args[1], category, out_meta.numel())?;

    let storage = match (lhs, rhs) {
        (Storage::Float(a), Storage::Float(b)) => binary_float(binary, &a, &b)?,
        (Storage::Int(a), Storage::Int(b)) => binary_int(binary, &a, &b)?,
        (Storage::Bool(a), Storage::Bool(b)) => binary_bool(binary, &a, &b)?,
        (Storage::Complex(a), Storage::Complex(b)) => binary_complex(binary, &a, &b)?,
        _ => return Err(BackendError::execution("operand categories diverge")),
    };
    CpuTensor::from_logical(out_meta, storage)
}

fn binary_float(op: BinaryOp, a: &[f64], b: &[f64]) -> BackendResult<Storage> {
    let zip = |f: fn(f64, f64) -> f64| {
        Storage::Float(a.iter().zip(b.iter()).map(|(&x, &y)| f(x, y)).collect())
    };
    let cmp = |f: fn(&f64, &f64) -> bool| {
        Storage::Bool(a.iter().zip(b.iter()).map(|(x, y)| f(x, y)).collect())
    };
    Ok(match op {
        BinaryOp::Add => zip(|x, y| x + y),
        BinaryOp::Atan2 => zip(f64::atan2),
        BinaryOp::Div => zip(|x, y| x / y),
        BinaryOp::Max => zip(f64::max),
        BinaryOp::Min => zip(f64::min),
        BinaryOp::Mul => zip(|x, y| x * y),
        BinaryOp::Nextafter => zip(nextafter),
        BinaryOp::Pow => zip(f64::powf),
        BinaryOp::Sub => zip(|x, y| x - y),
        BinaryOp::Eq => cmp(|x, y| x == y),
        BinaryOp::Ne => cmp(|x, y| x != y),
        BinaryOp::Ge => cmp(|x, y| x >= y),
        BinaryOp::Gt => cmp(|x, y| x > y),
        BinaryOp::Le => cmp(|x, y| x <= y),
        BinaryOp::Lt => cmp(|x, y| x < y),
        BinaryOp::Igamma | BinaryOp::Igammac => {
            return Err(BackendError::unimplemented(
                op.name(),
                "special function is not lowered in the reference backend",
            ))
        }
        BinaryOp::BitwiseAnd
        | BinaryOp::BitwiseOr
        | BinaryOp::BitwiseXor
        | BinaryOp::ShiftLeft
        | BinaryOp::ShiftRightArithmetic
        | BinaryOp::ShiftRightLogical => {
            return Err(BackendError::unimplemented(
                op.name(),
                "bit manipulation of floating-point elements",
            ))
        }
    })
}

fn binary_int(op: BinaryOp, a: &[i64], b: &[i64]) -> BackendResult<Storage> {
    let pairs = a.iter().zip(b.iter());
    Ok(match op {
        BinaryOp::Add => Storage::Int(pairs.map(|(&x, &y)| x.wrapping_add(y)).collect()),
        BinaryOp::Sub => Storage::Int(pairs.map(|(&x, &y)| x.wrapping_sub(y)).collect()),
        BinaryOp::Mul => Storage::Int(pairs.map(|(&x, &y)| x.wrapping_mul(y)).collect()),
        // Truncating division, matching the integral division contract.
        BinaryOp::Div => {
            let mut out = Vec::with_capacity(a.len());
            for (&x, &y) in pairs {
                if y == 0 {
                    return Err(BackendError::DivisionByZero);
                }
                out.push(x.wrapping_div(y));
            }
            Storage::Int(out)
        }
        BinaryOp::Max => Storage::Int(pairs.map(|(&x, &y)| x.max(y)).collect()),
        BinaryOp::Min => Storage::Int(pairs.map(|(&x, &y)| x.min(y)).collect()),
        BinaryOp::BitwiseAnd => Storage::Int(pairs.map(|(&x, &y)| x & y).collect()),
        BinaryOp::BitwiseOr => Storage::Int(pairs.map(|(&x, &y)| x | y).collect()),
        BinaryOp::BitwiseXor => Storage::Int(pairs.map(|(&x, &y)| x ^ y).collect()),
        BinaryOp::ShiftLeft | BinaryOp::ShiftRightArithmetic => {
            let mut out = Vec::with_capacity(a.len());
            for (&x, &y) in pairs {
                let amount = u32::try_from(y).ok().filter(|&v| v < 64).ok_or_else(|| {
                    BackendError::execution(format!("shift amount {y} out of range"))
                })?;
                out.push(if op == BinaryOp::ShiftLeft {
                    x.wrapping_shl(amount)
                } else {
                    x >> amount
                });
            }
            Storage::Int(out)
        }
        BinaryOp::Pow => {
            let mut out = Vec::with_capacity(a.len());
            for (&x, &y) in pairs {
                let exponent = u32::try_from(y).map_err(|_| {
                    BackendError::execution(format!("integer exponent {y} out of range"))
                })?;
                out.push(x.checked_pow(exponent).ok_or_else(|| {
                    BackendError::execution(format!("{x}^{y} overflows i64"))
                })?);
            }
            Storage::Int(out)
        }
        BinaryOp::Eq => Storage::Bool(pairs.map(|(x, y)| x == y).collect()),
        BinaryOp::Ne => Storage::Bool(pairs.map(|(x, y)| x != y).collect()),
        BinaryOp::Ge => Storage::Bool(pairs.map(|(x, y)| x >= y).collect()),
        BinaryOp::Gt => Storage::Bool(pairs.map(|(x, y)| x > y).collect()),
        BinaryOp::Le => Storage::Bool(pairs.map(|(x, y)| x <= y).collect()),
        BinaryOp::Lt => Storage::Bool(pairs.map(|(x, y)| x < y).collect()),
        _ => {
            return Err(BackendError::unimplemented(
                op.name(),
                "integral inputs are not lowered for this operation",
            ))
        }
    })
}

fn binary_bool(op: BinaryOp, a: &[bool], b: &[bool]) -> BackendResult<Storage> {
    let pairs = a.iter().zip(b.iter());
    Ok(match op {
        BinaryOp::BitwiseAnd => Storage::Bool(pairs.map(|(&x, &y)| x & y).collect()),
        BinaryOp::BitwiseOr => Storage::Bool(pairs.map(|(&x, &y)| x | y).collect()),
        BinaryOp::BitwiseXor => Storage::Bool(pairs.map(|(&x, &y)| x ^ y).collect()),
        BinaryOp::Eq => Storage::Bool(pairs.map(|(x, y)| x == y).collect()),
        BinaryOp::Ne => Storage::Bool(pairs.map(|(x, y)| x != y).collect()),
        BinaryOp::Ge => Storage::Bool(pairs.map(|(x, y)| x >= y).collect()),
        BinaryOp::Gt => Storage::Bool(pairs.map(|(x, y)| x > y).collect()),
        BinaryOp::Le => Storage::Bool(pairs.map(|(x, y)| x <= y).collect()),
        BinaryOp::Lt => Storage::Bool(pairs.map(|(x, y)| x < y).collect()),
        BinaryOp::Max => Storage::Bool(pairs.map(|(&x, &y)| x | y).collect()),
        BinaryOp::Min => Storage::Bool(pairs.map(|(&x, &y)| x & y).collect()),
        _ => {
            return Err(BackendError::unimplemented(
                op.name(),
                "boolean inputs are not lowered for this operation",
            ))
        }
    })
}

fn binary_complex(op: BinaryOp, a: &[(f64, f64)], b: &[(f64, f64)]) -> BackendResult<Storage> {
    let pairs = a.iter().zip(b.iter());
    Ok(match op {
        BinaryOp::Add => Storage::Complex(pairs.map(|(&(x, xi), &(y, yi))| (x + y, xi + yi)).collect()),
        BinaryOp::Sub => Storage::Complex(pairs.map(|(&(x, xi), &(y, yi))| (x - y, xi - yi)).collect()),
        BinaryOp::Mul => Storage::Complex(
            pairs
                .map(|(&(x, xi), &(y, yi))| (x * y - xi * yi, x * yi + xi * y))
                .collect(),
        ),
        BinaryOp::Div => Storage::Complex(
            pairs
                .map(|(&(x, xi), &(y, yi))| {
                    let denom = y * y + yi * yi;
                    ((x * y + xi * yi) / denom, (xi * y - x * yi) / denom)
                })
                .collect(),
        ),
        BinaryOp::Eq => Storage::Bool(pairs.map(|(x, y)| x == y).collect()),
        BinaryOp::Ne => Storage::Bool(pairs.map(|(x, y)| x != y).collect()),
        _ => {
            return Err(BackendError::unimplemented(
                op.name(),
                "complex inputs are not lowered for this operation",
            ))
        }
    })
}

fn first_tensor<'a>(
    op: &PrimOp,
    args: &'a [Value<CpuTensor>],
) -> BackendResult<&'a CpuTensor> {
    args.iter()
        .find_map(Value::as_tensor)
        .ok_or_else(|| BackendError::execution(format!("{} expects a tensor argument", op.name())))
}

fn op_view(op: &PrimOp, args: &[Value<CpuTensor>]) -> BackendResult<CpuTensor> {
    let out_meta = output_meta(op, args)?;
    let a = first_tensor(op, args)?;
    Ok(CpuTensor {
        meta: out_meta,
        storage: Arc::clone(&a.storage),
    })
}

fn op_concatenate(dim: usize, op: &PrimOp, args: &[Value<CpuTensor>]) -> BackendResult<CpuTensor> {
    let out_meta = output_meta(op, args)?;
    let first = first_tensor(op, args)?;
    let outer: usize = first.meta.shape[..dim].iter().product();
    let inner: usize = first.meta.shape[dim + 1..].iter().product();

    fn concat_typed<T: Copy>(parts: &[(Vec<T>, usize)], outer: usize, inner: usize) -> Vec<T> {
        let total: usize = parts.iter().map(|(data, _)| data.len()).sum();
        let mut out = Vec::with_capacity(total);
        for outer_idx in 0..outer {
            for (data, length) in parts {
                let block = length * inner;
                out.extend_from_slice(&data[outer_idx * block..(outer_idx + 1) * block]);
            }
        }
        out
    }

    macro_rules! concat_as {
        ($variant:ident) => {{
            let mut parts = Vec::with_capacity(args.len());
            for value in args {
                let tensor = value.as_tensor().ok_or_else(|| {
                    BackendError::execution("concatenate expects tensor arguments")
                })?;
                match tensor.gather()? {
                    Storage::$variant(data) => parts.push((data, tensor.meta.shape[dim])),
                    _ => return Err(BackendError::execution("storage categories diverge")),
                }
            }
            Storage::$variant(concat_typed(&parts, outer, inner))
        }};
    }

    let storage = match first.meta.dtype.category() {
        TypeCategory::Boolean => concat_as!(Bool),
        TypeCategory::Integral => concat_as!(Int),
        TypeCategory::Floating => concat_as!(Float),
        TypeCategory::Complex => concat_as!(Complex),
    };
    CpuTensor::from_logical(out_meta, storage)
}

fn op_reshape(op: &PrimOp, args: &[Value<CpuTensor>]) -> BackendResult<CpuTensor> {
    let out_meta = output_meta(op, args)?;
    let a = first_tensor(op, args)?;
    CpuTensor::from_logical(out_meta, a.gather()?)
}

fn op_select(op: &PrimOp, args: &[Value<CpuTensor>]) -> BackendResult<CpuTensor> {
    if args.len() != 3 {
        return Err(BackendError::execution("select expects (pred, a, b)"));
    }
    let out_meta = output_meta(op, args)?;
    let pred = match first_tensor(op, &args[..1])?.gather()? {
        Storage::Bool(data) => data,
        _ => return Err(BackendError::execution("select predicate must be boolean")),
    };
    let category = compute_category(&args[1..])?;
    let lhs = operand(&args[1], category, pred.len())?;
    let rhs = operand(&args[2], category, pred.len())?;

    fn choose<T: Copy>(pred: &[bool], a: &[T], b: &[T]) -> Vec<T> {
        pred.iter()
            .zip(a.iter().zip(b.iter()))
            .map(|(&take_a, (&x, &y))| if take_a { x } else { y })
            .collect()
    }

    let storage = match (lhs, rhs) {
        (Storage::Bool(a), Storage::Bool(b)) => Storage::Bool(choose(&pred, &a, &b)),
        (Storage::Int(a), Storage::Int(b)) => Storage::Int(choose(&pred, &a, &b)),
        (Storage::Float(a), Storage::Float(b)) => Storage::Float(choose(&pred, &a, &b)),
        (Storage::Complex(a), Storage::Complex(b)) => Storage::Complex(choose(&pred, &a, &b)),
        _ => return Err(BackendError::execution("storage categories diverge")),
    };
    CpuTensor::from_logical(out_meta, storage)
}

fn convert_storage(logical: Storage, dtype: DType) -> Storage {
    fn to_f64s(storage: &Storage) -> Vec<f64> {
        match storage {
            Storage::Bool(data) => data.iter().map(|&v| if v { 1.0 } else { 0.0 }).collect(),
            Storage::Int(data) => data.iter().map(|&v| v as f64).collect(),
            Storage::Float(data) => data.clone(),
            // Narrowing from complex keeps the real component.
            Storage::Complex(data) => data.iter().map(|&(re, _)| re).collect(),
        }
    }

    match dtype.category() {
        TypeCategory::Boolean => Storage::Bool(match logical {
            Storage::Bool(data) => data,
            Storage::Int(data) => data.into_iter().map(|v| v != 0).collect(),
            Storage::Float(data) => data.into_iter().map(|v| v != 0.0).collect(),
            Storage::Complex(data) => data
                .into_iter()
                .map(|(re, im)| re != 0.0 || im != 0.0)
                .collect(),
        }),
        TypeCategory::Integral => {
            let wide: Vec<i64> = match logical {
                Storage::Bool(data) => data.into_iter().map(i64::from).collect(),
                Storage::Int(data) => data,
                Storage::Float(data) => data.into_iter().map(|v| v as i64).collect(),
                Storage::Complex(data) => data.into_iter().map(|(re, _)| re as i64).collect(),
            };
            Storage::Int(wide.into_iter().map(|v| narrow_int(v, dtype)).collect())
        }
        TypeCategory::Floating => Storage::Float(
            to_f64s(&logical)
                .into_iter()
                .map(|v| round_float(v, dtype))
                .collect(),
        ),
        TypeCategory::Complex => Storage::Complex(match logical {
            Storage::Complex(data) => data,
            other => to_f64s(&other).into_iter().map(|re| (re, 0.0)).collect(),
        }),
    }
}

/// Wraps a widened integer into the value range of the target dtype.
fn narrow_int(value: i64, dtype: DType) -> i64 {
    match dtype {
        DType::Ui8 => value as u8 as i64,
        DType::Si8 => value as i8 as i64,
        DType::Si16 => value as i16 as i64,
        DType::Si32 => value as i32 as i64,
        _ => value,
    }
}

/// Rounds a widened float through the precision of the target dtype.
fn round_float(value: f64, dtype: DType) -> f64 {
    match dtype {
        DType::F16 => f16::from_f64(value).to_f64(),
        DType::Bf16 => bf16::from_f64(value).to_f64(),
        DType::F32 => value as f32 as f64,
        _ => value,
    }
}

fn op_convert(op: &PrimOp, args: &[Value<CpuTensor>]) -> BackendResult<CpuTensor> {
    let out_meta = output_meta(op, args)?;
    let a = first_tensor(op, args)?;
    let converted = convert_storage(a.gather()?, out_meta.dtype);
    CpuTensor::from_logical(out_meta, converted)
}

fn op_device_put(
    device: Device,
    op: &PrimOp,
    args: &[Value<CpuTensor>],
) -> BackendResult<CpuTensor> {
    if !device.is_cpu() {
        return Err(BackendError::unimplemented(
            op.name(),
            format!("this backend owns host memory only, cannot reach {device}"),
        ));
    }
    let out_meta = output_meta(op, args)?;
    let a = first_tensor(op, args)?;
    let storage = a.read_storage()?.clone();
    Ok(CpuTensor {
        meta: out_meta,
        storage: Arc::new(RwLock::new(storage)),
    })
}

fn op_copy_to(op: &PrimOp, args: &mut [Value<CpuTensor>]) -> BackendResult<CpuTensor> {
    output_meta(op, &*args)?;
    let dst = first_tensor(op, &args[..1])?.clone();
    let src = first_tensor(op, &args[1..2])?;

    let converted = convert_storage(src.gather()?, dst.meta.dtype);
    let offs = offsets(&dst.meta);
    let mut guard = dst.write_storage()?;
    scatter(&mut guard, &offs, &converted)?;
    drop(guard);
    Ok(dst)
}

fn op_resize(op: &PrimOp, args: &mut [Value<CpuTensor>]) -> BackendResult<CpuTensor> {
    let out_meta = output_meta(op, &*args)?;
    let a = first_tensor(op, &*args)?.clone();

    // Fresh elements are formally uninitialized; this backend zero-fills so
    // readbacks stay deterministic.
    let storage = Storage::zeroed(out_meta.dtype.category(), out_meta.numel());
    let mut guard = a.write_storage()?;
    *guard = storage;
    drop(guard);

    let resized = CpuTensor {
        meta: out_meta,
        storage: Arc::clone(&a.storage),
    };
    args[0] = Value::Tensor(resized.clone());
    Ok(resized)
}

fn op_reduce(
    kind: ReduceKind,
    dims: &[usize],
    op: &PrimOp,
    args: &[Value<CpuTensor>],
) -> BackendResult<CpuTensor> {
    let out_meta = output_meta(op, args)?;
    let a = first_tensor(op, args)?;
    let input = a.gather()?;
    let shape = &a.meta.shape;

    let mut reduced = vec![false; shape.len()];
    for &dim in dims {
        reduced[dim] = true;
    }
    let out_strides = {
        let mut strides = Vec::with_capacity(out_meta.rank());
        let mut acc = 1usize;
        for (idx, &length) in shape.iter().enumerate().rev() {
            if !reduced[idx] {
                strides.push(acc);
                acc *= length.max(1);
            } else {
                strides.push(0);
            }
        }
        strides.reverse();
        strides
    };

    // Maps each input element (logical order) to its output slot.
    let targets: Vec<usize> = {
        let numel: usize = shape.iter().product();
        let mut result = Vec::with_capacity(numel);
        let mut index = vec![0usize; shape.len()];
        for _ in 0..numel {
            let out_linear: usize = index
                .iter()
                .zip(out_strides.iter())
                .map(|(&coord, &stride)| coord * stride)
                .sum();
            result.push(out_linear);
            let mut dim = shape.len();
            loop {
                if dim == 0 {
                    break;
                }
                dim -= 1;
                index[dim] += 1;
                if index[dim] < shape[dim] {
                    break;
                }
                index[dim] = 0;
            }
        }
        result
    };
    let out_numel = out_meta.numel();

    let storage = match (kind, input) {
        (ReduceKind::Sum, Storage::Float(data)) => {
            Storage::Float(accumulate(&data, &targets, out_numel, 0.0, |acc, v| acc + v))
        }
        (ReduceKind::Prod, Storage::Float(data)) => {
            Storage::Float(accumulate(&data, &targets, out_numel, 1.0, |acc, v| acc * v))
        }
        (ReduceKind::Amax, Storage::Float(data)) => Storage::Float(accumulate(
            &data,
            &targets,
            out_numel,
            f64::NEG_INFINITY,
            f64::max,
        )),
        (ReduceKind::Amin, Storage::Float(data)) => Storage::Float(accumulate(
            &data,
            &targets,
            out_numel,
            f64::INFINITY,
            f64::min,
        )),
        (ReduceKind::Sum, Storage::Int(data)) => {
            Storage::Int(accumulate(&data, &targets, out_numel, 0, i64::wrapping_add))
        }
        (ReduceKind::Prod, Storage::Int(data)) => {
            Storage::Int(accumulate(&data, &targets, out_numel, 1, i64::wrapping_mul))
        }
        (ReduceKind::Amax, Storage::Int(data)) => {
            Storage::Int(accumulate(&data, &targets, out_numel, i64::MIN, i64::max))
        }
        (ReduceKind::Amin, Storage::Int(data)) => {
            Storage::Int(accumulate(&data, &targets, out_numel, i64::MAX, i64::min))
        }
        (ReduceKind::Sum, Storage::Complex(data)) => Storage::Complex(accumulate(
            &data,
            &targets,
            out_numel,
            (0.0, 0.0),
            |(re, im), (vre, vim)| (re + vre, im + vim),
        )),
        (ReduceKind::All, input) => Storage::Bool(accumulate(
            &truthiness(&input),
            &targets,
            out_numel,
            true,
            |acc, v| acc && v,
        )),
        (ReduceKind::Any, input) => Storage::Bool(accumulate(
            &truthiness(&input),
            &targets,
            out_numel,
            false,
            |acc, v| acc || v,
        )),
        (ReduceKind::Amax, Storage::Bool(data)) => {
            Storage::Bool(accumulate(&data, &targets, out_numel, false, |acc, v| acc | v))
        }
        (ReduceKind::Amin, Storage::Bool(data)) => {
            Storage::Bool(accumulate(&data, &targets, out_numel, true, |acc, v| acc & v))
        }
        (kind, input) => {
            return Err(BackendError::unimplemented(
                kind.name(),
                format!("{:?} inputs are not lowered for this reduction", input.category()),
            ))
        }
    };
    CpuTensor::from_logical(out_meta, storage)
}

fn accumulate<T: Copy>(
    data: &[T],
    targets: &[usize],
    out_numel: usize,
    init: T,
    fold: impl Fn(T, T) -> T,
) -> Vec<T> {
    let mut out = vec![init; out_numel];
    for (&value, &target) in data.iter().zip(targets.iter()) {
        out[target] = fold(out[target], value);
    }
    out
}

fn truthiness(storage: &Storage) -> Vec<bool> {
    match storage {
        Storage::Bool(data) => data.clone(),
        Storage::Int(data) => data.iter().map(|&v| v != 0).collect(),
        Storage::Float(data) => data.iter().map(|&v| v != 0.0).collect(),
        Storage::Complex(data) => data.iter().map(|&(re, im)| re != 0.0 || im != 0.0).collect(),
    }
}

// Abramowitz & Stegun 7.1.26, good to ~1.5e-7 absolute error.
fn erf(x: f64) -> f64 {
    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = t
        * (0.254_829_592
            + t * (-0.284_496_736 + t * (1.421_413_741 + t * (-1.453_152_027 + t * 1.061_405_429))));
    sign * (1.0 - poly * (-x * x).exp())
}

fn nextafter(a: f64, b: f64) -> f64 {
    if a.is_nan() || b.is_nan() {
        return f64::NAN;
    }
    if a == b {
        return b;
    }
    if a == 0.0 {
        return if b > 0.0 {
            f64::from_bits(1)
        } else {
            -f64::from_bits(1)
        };
    }
    let bits = a.to_bits();
    let toward_larger = b > a;
    if toward_larger == (a > 0.0) {
        f64::from_bits(bits + 1)
    } else {
        f64::from_bits(bits - 1)
    }
}
