//! Element-wise ops over buffers (`lhlo` dialect).
//!
//! Binary ops take `(lhs, rhs, out)` memrefs of identical shape and write
//! `out[i] = lhs[i] <op> rhs[i]`; `copy` takes `(in, out)`.

use crate::ops::{OpDef, OpData, OperationState, Val};
use crate::Op;

#[derive(Op)]
#[operation(dialect = "lhlo", name = "add", traits = "ElementWise", operands = 3, results = 0)]
pub struct AddOp;

#[derive(Op)]
#[operation(dialect = "lhlo", name = "sub", traits = "ElementWise", operands = 3, results = 0)]
pub struct SubOp;

#[derive(Op)]
#[operation(dialect = "lhlo", name = "mul", traits = "ElementWise", operands = 3, results = 0)]
pub struct MulOp;

#[derive(Op)]
#[operation(dialect = "lhlo", name = "div", traits = "ElementWise", operands = 3, results = 0)]
pub struct DivOp;

#[derive(Op)]
#[operation(dialect = "lhlo", name = "max", traits = "ElementWise", operands = 3, results = 0)]
pub struct MaxOp;

#[derive(Op)]
#[operation(dialect = "lhlo", name = "min", traits = "ElementWise", operands = 3, results = 0)]
pub struct MinOp;

#[derive(Op)]
#[operation(dialect = "lhlo", name = "and", traits = "ElementWise", operands = 3, results = 0)]
pub struct AndOp;

#[derive(Op)]
#[operation(dialect = "lhlo", name = "copy", traits = "ElementWise", operands = 2, results = 0)]
pub struct CopyOp;

/// Scalar computation an element-wise op performs per element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementKind {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
    And,
    Copy,
}

impl ElementKind {
    pub fn of(op: &OpData) -> Option<Self> {
        const KINDS: [(&str, ElementKind); 8] = [
            (AddOp::NAME, ElementKind::Add),
            (SubOp::NAME, ElementKind::Sub),
            (MulOp::NAME, ElementKind::Mul),
            (DivOp::NAME, ElementKind::Div),
            (MaxOp::NAME, ElementKind::Max),
            (MinOp::NAME, ElementKind::Min),
            (AndOp::NAME, ElementKind::And),
            (CopyOp::NAME, ElementKind::Copy),
        ];
        KINDS
            .iter()
            .find(|(name, _)| *name == op.name())
            .map(|&(_, kind)| kind)
    }

    pub fn is_binary(self) -> bool {
        self != ElementKind::Copy
    }
}

pub fn binary<T: OpDef>(lhs: Val, rhs: Val, out: Val) -> OperationState {
    OperationState::new::<T>().operands([lhs, rhs, out])
}

pub fn copy(input: Val, out: Val) -> OperationState {
    OperationState::new::<CopyOp>().operands([input, out])
}
