//! Recording surface for the fused (graph-building) backend.
//!
//! Instead of executing eagerly, a subset of the primitives can emit into a
//! [`FusionGraph`]: an SSA list of instructions whose values carry full
//! result descriptors. A fusing runtime consumes the graph; this crate only
//! defines the recording contract and validates every emission with the same
//! metadata functions the eager path uses.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{PrimError, PrimResult};
use crate::meta::{ArgMeta, TensorMeta};
use crate::ops::PrimOp;
use crate::registry;

/// SSA identifier of a value inside one [`FusionGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ValueId(pub u32);

impl fmt::Display for ValueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%{}", self.0)
    }
}

/// A recorded value: its SSA id plus the descriptor of the tensor it will
/// hold at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusedValue {
    pub id: ValueId,
    pub meta: TensorMeta,
}

/// One recorded operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionInstr {
    pub id: ValueId,
    pub op: PrimOp,
    pub operands: Vec<ValueId>,
    pub output: TensorMeta,
}

/// An in-progress fusion region: parameters followed by instructions in
/// emission order.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionGraph {
    next_value_id: u32,
    parameters: Vec<FusedValue>,
    instructions: Vec<FusionInstr>,
}

impl FusionGraph {
    pub fn new() -> Self {
        Self::default()
    }

    fn fresh_id(&mut self) -> ValueId {
        let id = ValueId(self.next_value_id);
        self.next_value_id += 1;
        id
    }

    /// Introduces a graph input with the given descriptor.
    pub fn add_parameter(&mut self, meta: TensorMeta) -> FusedValue {
        let id = self.fresh_id();
        let value = FusedValue { id, meta };
        self.parameters.push(value.clone());
        value
    }

    /// Records one instruction and returns its result value. Callers are
    /// expected to have validated the op already; [`emit_validated`] does
    /// both.
    pub fn emit(&mut self, op: PrimOp, operands: &[FusedValue], output: TensorMeta) -> FusedValue {
        let id = self.fresh_id();
        self.instructions.push(FusionInstr {
            id,
            op,
            operands: operands.iter().map(|value| value.id).collect(),
            output: output.clone(),
        });
        FusedValue { id, meta: output }
    }

    pub fn parameters(&self) -> &[FusedValue] {
        &self.parameters
    }

    pub fn instructions(&self) -> &[FusionInstr] {
        &self.instructions
    }
}

impl fmt::Display for FusionGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "fusion {{")?;
        for parameter in &self.parameters {
            writeln!(
                f,
                "  {} = parameter -> {}",
                parameter.id,
                render_meta(&parameter.meta)
            )?;
        }
        for instruction in &self.instructions {
            let operands: Vec<String> = instruction
                .operands
                .iter()
                .map(ValueId::to_string)
                .collect();
            writeln!(
                f,
                "  {} = {}({}) -> {}",
                instruction.id,
                instruction.op.name(),
                operands.join(", "),
                render_meta(&instruction.output)
            )?;
        }
        write!(f, "}}")
    }
}

fn render_meta(meta: &TensorMeta) -> String {
    let dims: Vec<String> = meta.shape.iter().map(usize::to_string).collect();
    if dims.is_empty() {
        format!("tensor<{:?}>", meta.dtype)
    } else {
        format!("tensor<{:?} x {}>", meta.dtype, dims.join("x"))
    }
}

/// Shared emitter for every prim in the fused subset: validates the call with
/// the prim's own metadata function, then records it. A validation failure
/// leaves the graph untouched.
pub(crate) fn emit_validated(
    graph: &mut FusionGraph,
    op: &PrimOp,
    inputs: &[FusedValue],
) -> PrimResult<FusedValue> {
    let prim = registry::get(op.name())
        .ok_or_else(|| PrimError::not_implemented("fusion", format!("unknown prim {}", op.name())))?;
    let metas: Vec<ArgMeta> = inputs
        .iter()
        .map(|value| ArgMeta::Tensor(value.meta.clone()))
        .collect();
    let output = prim.meta(op, &metas)?;
    Ok(graph.emit(op.clone(), inputs, output))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::Device;
    use crate::dtype::DType;
    use crate::ops::BinaryOp;

    fn param(graph: &mut FusionGraph, shape: &[usize], dtype: DType) -> FusedValue {
        graph.add_parameter(TensorMeta::contiguous(shape.to_vec(), dtype, Device::Cpu))
    }

    #[test]
    fn fused_prims_record_validated_instructions() {
        let mut graph = FusionGraph::new();
        let a = param(&mut graph, &[2, 3], DType::F32);
        let b = param(&mut graph, &[2, 3], DType::F32);

        let op = PrimOp::ElementwiseBinary(BinaryOp::Add);
        let prim = registry::get("add").expect("add is registered");
        let sum = prim
            .emit_fused(&mut graph, &op, &[a.clone(), b.clone()])
            .expect("valid add emission");

        assert_eq!(sum.id, ValueId(2));
        assert_eq!(sum.meta.dtype, DType::F32);
        assert_eq!(graph.instructions().len(), 1);
        assert_eq!(graph.instructions()[0].operands, vec![a.id, b.id]);
    }

    #[test]
    fn emission_chains_assign_fresh_ids() {
        let mut graph = FusionGraph::new();
        let a = param(&mut graph, &[4], DType::F32);
        let op = PrimOp::ElementwiseBinary(BinaryOp::Mul);
        let prim = registry::get("mul").expect("mul is registered");

        let squared = prim
            .emit_fused(&mut graph, &op, &[a.clone(), a.clone()])
            .expect("first emission");
        let fourth = prim
            .emit_fused(&mut graph, &op, &[squared.clone(), squared.clone()])
            .expect("second emission");

        assert!(squared.id < fourth.id);
        assert_eq!(graph.instructions()[1].operands, vec![squared.id, squared.id]);
    }

    #[test]
    fn invalid_emission_leaves_graph_untouched() {
        let mut graph = FusionGraph::new();
        let a = param(&mut graph, &[2], DType::F32);
        let b = param(&mut graph, &[3], DType::F32);

        let op = PrimOp::ElementwiseBinary(BinaryOp::Add);
        let prim = registry::get("add").expect("add is registered");
        let err = prim
            .emit_fused(&mut graph, &op, &[a, b])
            .expect_err("shape mismatch");
        assert!(matches!(err, PrimError::ShapeMismatch { .. }));
        assert!(graph.instructions().is_empty());
    }

    #[test]
    fn prims_outside_the_subset_refuse_to_emit() {
        let mut graph = FusionGraph::new();
        let a = param(&mut graph, &[2], DType::F32);

        let op = PrimOp::ElementwiseBinary(BinaryOp::Sub);
        let prim = registry::get("sub").expect("sub is registered");
        let err = prim
            .emit_fused(&mut graph, &op, &[a.clone(), a])
            .expect_err("sub has no fused lowering");
        assert!(matches!(err, PrimError::NotImplemented { op: "sub", .. }));
    }

    #[test]
    fn display_renders_parameters_and_instructions() {
        let mut graph = FusionGraph::new();
        let a = param(&mut graph, &[2, 3], DType::F32);
        let op = PrimOp::ElementwiseBinary(BinaryOp::Mul);
        registry::get("mul")
            .expect("mul is registered")
            .emit_fused(&mut graph, &op, &[a.clone(), a])
            .expect("valid emission");

        let rendered = graph.to_string();
        assert!(rendered.contains("%0 = parameter -> tensor<F32 x 2x3>"), "{rendered}");
        assert!(rendered.contains("%1 = mul(%0, %0) -> tensor<F32 x 2x3>"), "{rendered}");
    }
}
