//! Declarative description of every primitive operation.
//!
//! A [`PrimOp`] value carries the operation identity plus its static
//! attributes (target shapes, dimension lists, dtypes). Argument tensors and
//! scalars travel separately, so the same `PrimOp` value can be validated,
//! executed eagerly, or recorded into a fusion graph.

use serde::{Deserialize, Serialize};

use crate::device::Device;
use crate::dtype::DType;

/// Elementwise operations of one tensor or scalar argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Abs,
    Acos,
    Acosh,
    Asin,
    Atan,
    BesselI0e,
    BesselI1e,
    BitwiseNot,
    Cbrt,
    Ceil,
    Cos,
    Cosh,
    Digamma,
    Erf,
    ErfInv,
    Erfc,
    Exp,
    Expm1,
    Floor,
    IsFinite,
    Lgamma,
    Log,
    Log1p,
    Neg,
    Reciprocal,
    Round,
    Rsqrt,
    Sign,
    Sin,
    Sinh,
    Sqrt,
    Square,
    Tan,
}

impl UnaryOp {
    pub const ALL: [UnaryOp; 33] = [
        UnaryOp::Abs,
        UnaryOp::Acos,
        UnaryOp::Acosh,
        UnaryOp::Asin,
        UnaryOp::Atan,
        UnaryOp::BesselI0e,
        UnaryOp::BesselI1e,
        UnaryOp::BitwiseNot,
        UnaryOp::Cbrt,
        UnaryOp::Ceil,
        UnaryOp::Cos,
        UnaryOp::Cosh,
        UnaryOp::Digamma,
        UnaryOp::Erf,
        UnaryOp::ErfInv,
        UnaryOp::Erfc,
        UnaryOp::Exp,
        UnaryOp::Expm1,
        UnaryOp::Floor,
        UnaryOp::IsFinite,
        UnaryOp::Lgamma,
        UnaryOp::Log,
        UnaryOp::Log1p,
        UnaryOp::Neg,
        UnaryOp::Reciprocal,
        UnaryOp::Round,
        UnaryOp::Rsqrt,
        UnaryOp::Sign,
        UnaryOp::Sin,
        UnaryOp::Sinh,
        UnaryOp::Sqrt,
        UnaryOp::Square,
        UnaryOp::Tan,
    ];

    pub fn name(self) -> &'static str {
        match self {
            UnaryOp::Abs => "abs",
            UnaryOp::Acos => "acos",
            UnaryOp::Acosh => "acosh",
            UnaryOp::Asin => "asin",
            UnaryOp::Atan => "atan",
            UnaryOp::BesselI0e => "bessel_i0e",
            UnaryOp::BesselI1e => "bessel_i1e",
            UnaryOp::BitwiseNot => "bitwise_not",
            UnaryOp::Cbrt => "cbrt",
            UnaryOp::Ceil => "ceil",
            UnaryOp::Cos => "cos",
            UnaryOp::Cosh => "cosh",
            UnaryOp::Digamma => "digamma",
            UnaryOp::Erf => "erf",
            UnaryOp::ErfInv => "erf_inv",
            UnaryOp::Erfc => "erfc",
            UnaryOp::Exp => "exp",
            UnaryOp::Expm1 => "expm1",
            UnaryOp::Floor => "floor",
            UnaryOp::IsFinite => "is_finite",
            UnaryOp::Lgamma => "lgamma",
            UnaryOp::Log => "log",
            UnaryOp::Log1p => "log1p",
            UnaryOp::Neg => "neg",
            UnaryOp::Reciprocal => "reciprocal",
            UnaryOp::Round => "round",
            UnaryOp::Rsqrt => "rsqrt",
            UnaryOp::Sign => "sign",
            UnaryOp::Sin => "sin",
            UnaryOp::Sinh => "sinh",
            UnaryOp::Sqrt => "sqrt",
            UnaryOp::Square => "square",
            UnaryOp::Tan => "tan",
        }
    }
}

/// Elementwise operations of two tensor or scalar arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Atan2,
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    Div,
    Eq,
    Ge,
    Gt,
    Igamma,
    Igammac,
    Le,
    Lt,
    Max,
    Min,
    Mul,
    Ne,
    Nextafter,
    Pow,
    ShiftLeft,
    ShiftRightArithmetic,
    ShiftRightLogical,
    Sub,
}

impl BinaryOp {
    pub const ALL: [BinaryOp; 23] = [
        BinaryOp::Add,
        BinaryOp::Atan2,
        BinaryOp::BitwiseAnd,
        BinaryOp::BitwiseOr,
        BinaryOp::BitwiseXor,
        BinaryOp::Div,
        BinaryOp::Eq,
        BinaryOp::Ge,
        BinaryOp::Gt,
        BinaryOp::Igamma,
        BinaryOp::Igammac,
        BinaryOp::Le,
        BinaryOp::Lt,
        BinaryOp::Max,
        BinaryOp::Min,
        BinaryOp::Mul,
        BinaryOp::Ne,
        BinaryOp::Nextafter,
        BinaryOp::Pow,
        BinaryOp::ShiftLeft,
        BinaryOp::ShiftRightArithmetic,
        BinaryOp::ShiftRightLogical,
        BinaryOp::Sub,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::Add => "add",
            BinaryOp::Atan2 => "atan2",
            BinaryOp::BitwiseAnd => "bitwise_and",
            BinaryOp::BitwiseOr => "bitwise_or",
            BinaryOp::BitwiseXor => "bitwise_xor",
            BinaryOp::Div => "div",
            BinaryOp::Eq => "eq",
            BinaryOp::Ge => "ge",
            BinaryOp::Gt => "gt",
            BinaryOp::Igamma => "igamma",
            BinaryOp::Igammac => "igammac",
            BinaryOp::Le => "le",
            BinaryOp::Lt => "lt",
            BinaryOp::Max => "max",
            BinaryOp::Min => "min",
            BinaryOp::Mul => "mul",
            BinaryOp::Ne => "ne",
            BinaryOp::Nextafter => "nextafter",
            BinaryOp::Pow => "pow",
            BinaryOp::ShiftLeft => "shift_left",
            BinaryOp::ShiftRightArithmetic => "shift_right_arithmetic",
            BinaryOp::ShiftRightLogical => "shift_right_logical",
            BinaryOp::Sub => "sub",
        }
    }

    /// Comparison ops force a boolean result dtype.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ge | BinaryOp::Gt | BinaryOp::Le | BinaryOp::Ne | BinaryOp::Lt
        )
    }
}

/// Reduction flavors over one tensor argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReduceKind {
    Sum,
    Prod,
    Amax,
    Amin,
    All,
    Any,
}

impl ReduceKind {
    pub const ALL: [ReduceKind; 6] = [
        ReduceKind::Sum,
        ReduceKind::Prod,
        ReduceKind::Amax,
        ReduceKind::Amin,
        ReduceKind::All,
        ReduceKind::Any,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ReduceKind::Sum => "sum",
            ReduceKind::Prod => "prod",
            ReduceKind::Amax => "amax",
            ReduceKind::Amin => "amin",
            ReduceKind::All => "all",
            ReduceKind::Any => "any",
        }
    }

    /// `all`/`any` reduce to booleans regardless of the input dtype.
    pub fn forces_bool(self) -> bool {
        matches!(self, ReduceKind::All | ReduceKind::Any)
    }
}

/// One primitive operation together with its static attributes.
///
/// Target shapes and dimension lengths arrive as signed integers, the way
/// frontends carry sizes; validation converts and range-checks them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrimOp {
    ElementwiseUnary(UnaryOp),
    ElementwiseBinary(BinaryOp),
    BroadcastInDim {
        shape: Vec<i64>,
        broadcast_dims: Vec<usize>,
    },
    CollapseView {
        start: usize,
        end: usize,
    },
    SplitDim {
        dim: usize,
        outer_length: i64,
    },
    Squeeze {
        dims: Vec<usize>,
    },
    Concatenate {
        dim: usize,
    },
    Reshape {
        shape: Vec<i64>,
    },
    Select,
    ConvertElementType {
        dtype: DType,
    },
    DevicePut {
        device: Device,
    },
    CopyTo,
    Resize {
        shape: Vec<i64>,
    },
    Reduce {
        kind: ReduceKind,
        dims: Vec<usize>,
    },
}

impl PrimOp {
    /// Stable registry name of the primitive this op invokes.
    pub fn name(&self) -> &'static str {
        match self {
            PrimOp::ElementwiseUnary(op) => op.name(),
            PrimOp::ElementwiseBinary(op) => op.name(),
            PrimOp::BroadcastInDim { .. } => "broadcast_in_dim",
            PrimOp::CollapseView { .. } => "collapse_view",
            PrimOp::SplitDim { .. } => "split_dim",
            PrimOp::Squeeze { .. } => "squeeze",
            PrimOp::Concatenate { .. } => "concatenate",
            PrimOp::Reshape { .. } => "reshape",
            PrimOp::Select => "select",
            PrimOp::ConvertElementType { .. } => "convert_element_type",
            PrimOp::DevicePut { .. } => "device_put",
            PrimOp::CopyTo => "copy_to",
            PrimOp::Resize { .. } => "resize",
            PrimOp::Reduce { kind, .. } => kind.name(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_across_the_surface() {
        let mut names: Vec<&str> = UnaryOp::ALL.iter().map(|op| op.name()).collect();
        names.extend(BinaryOp::ALL.iter().map(|op| op.name()));
        names.extend(ReduceKind::ALL.iter().map(|kind| kind.name()));
        names.extend([
            "broadcast_in_dim",
            "collapse_view",
            "split_dim",
            "squeeze",
            "concatenate",
            "reshape",
            "select",
            "convert_element_type",
            "device_put",
            "copy_to",
            "resize",
        ]);
        let total = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), total);
    }

    #[test]
    fn op_json_round_trip_preserves_attributes() {
        let op = PrimOp::BroadcastInDim {
            shape: vec![2, 3, 4],
            broadcast_dims: vec![0, 2],
        };
        let json = serde_json::to_string(&op).expect("json serialization");
        let parsed: PrimOp = serde_json::from_str(&json).expect("json deserialization");
        assert_eq!(parsed, op);
    }

    #[test]
    fn reduce_ops_take_their_kind_name() {
        let op = PrimOp::Reduce {
            kind: ReduceKind::Amax,
            dims: vec![0],
        };
        assert_eq!(op.name(), "amax");
    }
}
