//! Process-wide registry of the built-in primitives.
//!
//! Built lazily on first access and immutable afterwards. Every prim is
//! reachable by its stable name, which is also what [`PrimOp::name`] returns,
//! so dispatch is a single map lookup.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;

use crate::elementwise::elementwise_meta;
use crate::error::{PrimError, PrimResult};
use crate::fusion::emit_validated;
use crate::memory::{convert_element_type_meta, copy_to_meta, device_put_meta, resize_meta};
use crate::meta::{ArgMeta, TensorMeta};
use crate::ops::{BinaryOp, PrimOp, ReduceKind, UnaryOp};
use crate::prim::{Prim, Promotion, ReturnType};
use crate::reduction::reduction_meta;
use crate::views::{
    broadcast_in_dim_meta, collapse_view_meta, concatenate_meta, reshape_meta, select_meta,
    split_dim_meta, squeeze_meta,
};

static REGISTRY: Lazy<BTreeMap<&'static str, Prim>> = Lazy::new(build_registry);

/// Returns the full name-to-prim map.
pub fn registry() -> &'static BTreeMap<&'static str, Prim> {
    &REGISTRY
}

/// Looks up a prim by its stable name.
pub fn get(name: &str) -> Option<&'static Prim> {
    REGISTRY.get(name)
}

fn not_implemented_meta(prim: &Prim, _op: &PrimOp, _args: &[ArgMeta]) -> PrimResult<TensorMeta> {
    Err(PrimError::not_implemented(
        prim.name,
        "no lowering is registered for this primitive",
    ))
}

fn unary_prim(op: UnaryOp) -> Prim {
    let promotion = match op {
        UnaryOp::Abs => Promotion::ComplexToFloat,
        UnaryOp::IsFinite => Promotion::AlwaysBool,
        _ => Promotion::Default,
    };
    Prim::new(op.name(), ReturnType::New, unary_doc(op), elementwise_meta)
        .with_promotion(promotion)
}

fn binary_prim(op: BinaryOp) -> Prim {
    let promotion = if op.is_comparison() {
        Promotion::AlwaysBool
    } else {
        Promotion::Default
    };
    let meta = if op == BinaryOp::ShiftRightLogical {
        not_implemented_meta
    } else {
        elementwise_meta
    };
    let prim = Prim::new(op.name(), ReturnType::New, binary_doc(op), meta)
        .with_promotion(promotion);
    if matches!(
        op,
        BinaryOp::Add
            | BinaryOp::Div
            | BinaryOp::Mul
            | BinaryOp::Ge
            | BinaryOp::Gt
            | BinaryOp::Le
            | BinaryOp::Lt
    ) {
        prim.with_fused(emit_validated)
    } else {
        prim
    }
}

fn reduce_prim(kind: ReduceKind) -> Prim {
    Prim::new(kind.name(), ReturnType::New, reduce_doc(kind), reduction_meta)
}

fn build_registry() -> BTreeMap<&'static str, Prim> {
    let mut prims = Vec::with_capacity(72);

    prims.extend(UnaryOp::ALL.into_iter().map(unary_prim));
    prims.extend(BinaryOp::ALL.into_iter().map(binary_prim));
    prims.extend(ReduceKind::ALL.into_iter().map(reduce_prim));

    prims.push(
        Prim::new(
            "broadcast_in_dim",
            ReturnType::View,
            "Creates a view of a tensor embedded in a broader shape; broadcast dimensions read the same elements through zero strides.",
            broadcast_in_dim_meta,
        )
        .with_fused(emit_validated),
    );
    prims.push(Prim::new(
        "collapse_view",
        ReturnType::View,
        "Creates a view flattening a densely nested range of dimensions into one.",
        collapse_view_meta,
    ));
    prims.push(Prim::new(
        "split_dim",
        ReturnType::View,
        "Creates a view splitting one dimension into an outer and inner pair.",
        split_dim_meta,
    ));
    prims.push(Prim::new(
        "squeeze",
        ReturnType::View,
        "Creates a view with the named length-1 dimensions removed.",
        squeeze_meta,
    ));
    prims.push(Prim::new(
        "concatenate",
        ReturnType::New,
        "Concatenates tensors along an existing dimension.",
        concatenate_meta,
    ));
    prims.push(Prim::new(
        "reshape",
        ReturnType::New,
        "Copies a tensor into a new shape with the same element count.",
        reshape_meta,
    ));
    prims.push(Prim::new(
        "select",
        ReturnType::New,
        "Chooses elementwise between two tensors under a boolean predicate.",
        select_meta,
    ));
    prims.push(
        Prim::new(
            "convert_element_type",
            ReturnType::New,
            "Converts every element to a target dtype, including narrowing conversions.",
            convert_element_type_meta,
        )
        .with_fused(emit_validated),
    );
    prims.push(Prim::new(
        "device_put",
        ReturnType::New,
        "Moves a tensor to a target device.",
        device_put_meta,
    ));
    prims.push(Prim::new(
        "copy_to",
        ReturnType::Inplace,
        "Overwrites the first tensor's elements with the second's, converting safely.",
        copy_to_meta,
    ));
    prims.push(Prim::new(
        "resize",
        ReturnType::Inplace,
        "Gives an empty tensor a new geometry in place; contents are uninitialized.",
        resize_meta,
    ));

    let mut map = BTreeMap::new();
    for prim in prims {
        let name = prim.name;
        if map.insert(name, prim).is_some() {
            panic!("duplicate prim registration: {name}");
        }
    }
    map
}

fn unary_doc(op: UnaryOp) -> &'static str {
    match op {
        UnaryOp::Abs => "Elementwise absolute value; complex inputs yield their real magnitude.",
        UnaryOp::Acos => "Elementwise arccosine.",
        UnaryOp::Acosh => "Elementwise inverse hyperbolic cosine.",
        UnaryOp::Asin => "Elementwise arcsine.",
        UnaryOp::Atan => "Elementwise arctangent.",
        UnaryOp::BesselI0e => "Elementwise exponentially scaled modified Bessel function of order 0.",
        UnaryOp::BesselI1e => "Elementwise exponentially scaled modified Bessel function of order 1.",
        UnaryOp::BitwiseNot => "Elementwise bitwise negation; logical negation for booleans.",
        UnaryOp::Cbrt => "Elementwise cube root.",
        UnaryOp::Ceil => "Elementwise ceiling.",
        UnaryOp::Cos => "Elementwise cosine.",
        UnaryOp::Cosh => "Elementwise hyperbolic cosine.",
        UnaryOp::Digamma => "Elementwise digamma function.",
        UnaryOp::Erf => "Elementwise error function.",
        UnaryOp::ErfInv => "Elementwise inverse error function.",
        UnaryOp::Erfc => "Elementwise complementary error function.",
        UnaryOp::Exp => "Elementwise natural exponential.",
        UnaryOp::Expm1 => "Elementwise exp(x) - 1, accurate near zero.",
        UnaryOp::Floor => "Elementwise floor.",
        UnaryOp::IsFinite => "Elementwise finiteness test; always boolean.",
        UnaryOp::Lgamma => "Elementwise log of the absolute gamma function.",
        UnaryOp::Log => "Elementwise natural logarithm.",
        UnaryOp::Log1p => "Elementwise log(1 + x), accurate near zero.",
        UnaryOp::Neg => "Elementwise negation.",
        UnaryOp::Reciprocal => "Elementwise reciprocal.",
        UnaryOp::Round => "Elementwise rounding to nearest, ties to even.",
        UnaryOp::Rsqrt => "Elementwise reciprocal square root.",
        UnaryOp::Sign => "Elementwise sign.",
        UnaryOp::Sin => "Elementwise sine.",
        UnaryOp::Sinh => "Elementwise hyperbolic sine.",
        UnaryOp::Sqrt => "Elementwise square root.",
        UnaryOp::Square => "Elementwise square.",
        UnaryOp::Tan => "Elementwise tangent.",
    }
}

fn binary_doc(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Add => "Elementwise sum.",
        BinaryOp::Atan2 => "Elementwise two-argument arctangent.",
        BinaryOp::BitwiseAnd => "Elementwise bitwise and; logical and for booleans.",
        BinaryOp::BitwiseOr => "Elementwise bitwise or; logical or for booleans.",
        BinaryOp::BitwiseXor => "Elementwise bitwise xor; logical xor for booleans.",
        BinaryOp::Div => "Elementwise division; truncating for integral and boolean dtypes.",
        BinaryOp::Eq => "Elementwise equality; always boolean.",
        BinaryOp::Ge => "Elementwise greater-or-equal; always boolean.",
        BinaryOp::Gt => "Elementwise greater-than; always boolean.",
        BinaryOp::Igamma => "Elementwise regularized lower incomplete gamma function.",
        BinaryOp::Igammac => "Elementwise regularized upper incomplete gamma function.",
        BinaryOp::Le => "Elementwise less-or-equal; always boolean.",
        BinaryOp::Lt => "Elementwise less-than; always boolean.",
        BinaryOp::Max => "Elementwise maximum.",
        BinaryOp::Min => "Elementwise minimum.",
        BinaryOp::Mul => "Elementwise product.",
        BinaryOp::Ne => "Elementwise inequality; always boolean.",
        BinaryOp::Nextafter => "Elementwise next representable float toward the second argument.",
        BinaryOp::Pow => "Elementwise power.",
        BinaryOp::ShiftLeft => "Elementwise left shift.",
        BinaryOp::ShiftRightArithmetic => "Elementwise arithmetic (sign-preserving) right shift.",
        BinaryOp::ShiftRightLogical => "Elementwise logical right shift; not implemented.",
        BinaryOp::Sub => "Elementwise difference.",
    }
}

fn reduce_doc(kind: ReduceKind) -> &'static str {
    match kind {
        ReduceKind::Sum => "Sums over the reduced dimensions.",
        ReduceKind::Prod => "Multiplies over the reduced dimensions.",
        ReduceKind::Amax => "Maximum over the reduced dimensions.",
        ReduceKind::Amin => "Minimum over the reduced dimensions.",
        ReduceKind::All => "True when every reduced element is truthy; always boolean.",
        ReduceKind::Any => "True when any reduced element is truthy; always boolean.",
    }
}
